use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

// common path interface so runners and tests can point artifacts anywhere
pub trait PathsLike {
    fn root_dir(&self) -> &Path;
    fn screenshots_dir(&self) -> &Path;
    fn source_dir(&self) -> &Path;
    fn headers_dir(&self) -> &Path;
}

/// The report directory tree.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    screens: PathBuf,
    source: PathBuf,
    headers: PathBuf,
}

impl OutputLayout {
    pub const SCREENS: &'static str = "screens";
    pub const SOURCE: &'static str = "source";
    pub const HEADERS: &'static str = "headers";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            screens: root.join(Self::SCREENS),
            source: root.join(Self::SOURCE),
            headers: root.join(Self::HEADERS),
            root,
        }
    }

    /// Create every directory of the tree. Fails the run if any is uncreatable.
    pub fn create(&self) -> Result<()> {
        for dir in [&self.root, &self.screens, &self.source, &self.headers] {
            fs::create_dir_all(dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        }
        Ok(())
    }
}

impl PathsLike for OutputLayout {
    fn root_dir(&self) -> &Path {
        &self.root
    }

    fn screenshots_dir(&self) -> &Path {
        &self.screens
    }

    fn source_dir(&self) -> &Path {
        &self.source
    }

    fn headers_dir(&self) -> &Path {
        &self.headers
    }
}
