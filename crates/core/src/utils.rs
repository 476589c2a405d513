use anyhow::Result as AnyResult;
use sha2::{Digest, Sha256};
use std::{
    fs::{self, File},
    io::Write,
    path::Path,
};
use tokio::{
    fs::File as AsyncFile,
    io::{AsyncBufReadExt, BufReader},
};
use url::Url;

const SAVED_NAME_SEPARATOR: char = '.';
const SAVED_NAME_MAX_PREFIX: usize = 80;

/// Write a string to a file, creating parent directories.
pub fn write_str_to_file(path: &Path, content: &str) -> AnyResult<()> {
    save_bytes(path, content.as_bytes())
}

/// Read a URL list, one per line. Blank lines and `#` comments are skipped.
pub async fn read_urls(file_path: &Path) -> AnyResult<Vec<String>> {
    let mut urls = Vec::new();
    let file = AsyncFile::open(file_path).await?;
    let mut reader = BufReader::new(file).lines();

    while let Some(line) = reader.next_line().await? {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            urls.push(trimmed.to_string());
        }
    }
    Ok(urls)
}

/// Save arbitrary bytes, creating parent directories.
pub fn save_bytes(path: &Path, data: &[u8]) -> AnyResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data)?;
    Ok(())
}

/// Filesystem-safe artifact name for a URL.
///
/// The readable part swaps `:`, `/`, `?`, `&` (and other characters that are
/// awkward in filenames) for a dot; the sha256 suffix keeps URLs that differ
/// only in those characters, a trailing slash or the query apart.
pub fn saved_name(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    let short = &hex[..12];

    let readable = url.replacen("://", ".", 1);
    let mut base: String = readable
        .chars()
        .map(|c| {
            if r#":/?&=%+#\*"<>| "#.contains(c) || c.is_control() {
                SAVED_NAME_SEPARATOR
            } else {
                c
            }
        })
        .take(SAVED_NAME_MAX_PREFIX)
        .collect();
    while base.ends_with(SAVED_NAME_SEPARATOR) {
        base.pop();
    }
    format!("{base}_{short}")
}

/// Turn operator input into an absolute URL.
///
/// Missing schemes default to `http://`, or `https://` when the input names
/// port 443/8443 or `prepend_https` is set. Default ports are dropped.
pub fn normalize_url(raw: &str, prepend_https: bool) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty URL".to_string());
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else if prepend_https || trimmed.contains(":443") || trimmed.contains(":8443") {
        format!("https://{trimmed}")
    } else {
        format!("http://{trimmed}")
    };

    let parsed = Url::parse(&with_scheme).map_err(|e| format!("{with_scheme}: {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme {}", parsed.scheme()));
    }
    if parsed.host_str().is_none() {
        return Err(format!("{with_scheme}: missing host"));
    }

    let had_path = with_scheme
        .split_once("://")
        .map(|(_, rest)| rest.contains('/'))
        .unwrap_or(false);

    let mut out = parsed.to_string();
    if !had_path && parsed.path() == "/" && parsed.query().is_none() && out.ends_with('/') {
        out.pop();
    }
    Ok(out)
}
