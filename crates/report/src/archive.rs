use anyhow::{anyhow, Context, Result};
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};
use tracing::info;
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

/// Zip the whole report directory into `<dir>.zip` next to it.
pub fn compress_dir(dir: &Path) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .ok_or_else(|| anyhow!("cannot archive {}: no directory name", dir.display()))?;
    let zip_path = dir.with_file_name(format!("{}.zip", name.to_string_lossy()));

    let file = File::create(&zip_path)
        .with_context(|| format!("create archive {}", zip_path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut files = 0usize;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let rel = entry.path().strip_prefix(dir)?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let entry_name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            zip.add_directory(entry_name, options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(entry_name, options)?;
            let mut src = File::open(entry.path())
                .with_context(|| format!("open {}", entry.path().display()))?;
            io::copy(&mut src, &mut zip)?;
            files += 1;
        }
    }
    zip.finish()?;

    info!(files, "archived report to {}", zip_path.display());
    Ok(zip_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, io::Read};

    #[test]
    fn archive_holds_every_file_with_relative_names() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("out");
        fs::create_dir_all(root.join("screens"))?;
        fs::write(root.join("report.html"), "<html></html>")?;
        fs::write(root.join("screens").join("a.png"), [137u8, 80, 78, 71])?;

        let zip_path = compress_dir(&root)?;
        assert_eq!(zip_path, tmp.path().join("out.zip"));

        let mut archive = zip::ZipArchive::new(File::open(&zip_path)?)?;
        let mut html = String::new();
        archive.by_name("report.html")?.read_to_string(&mut html)?;
        assert_eq!(html, "<html></html>");
        assert!(archive.by_name("screens/a.png").is_ok());
        Ok(())
    }
}
