//! Local upload directory.
//!
//! Uploaded bytes are written under a single directory. Client-supplied names
//! are reduced to their final path component so nothing lands outside it.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    /// Open `root`, creating it when missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create upload dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` as `filename` and return the path written. An existing
    /// file with the same name is replaced.
    pub fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = sanitize_filename(filename)?;
        let path = self.root.join(name);
        std::fs::write(&path, bytes).with_context(|| format!("write upload {}", path.display()))?;
        Ok(path)
    }
}

/// Last path component of `filename`, rejecting names that are empty or
/// refer to a directory.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        return Err(anyhow!("invalid upload filename '{}'", filename));
    }
    if last.chars().any(|c| c.is_control()) {
        return Err(anyhow!("upload filename contains control characters"));
    }
    Ok(last.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_reduced_to_last_component() {
        assert_eq!(sanitize_filename("site.jpg").unwrap(), "site.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("C:\\photos\\gate.png").unwrap(), "gate.png");
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("dir/").is_err());
        assert!(sanitize_filename("..").is_err());
    }

    #[test]
    fn save_writes_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::open(dir.path().join("uploads")).unwrap();
        let path = uploads.save("../escape.bin", b"abc").unwrap();
        assert_eq!(path, uploads.root().join("escape.bin"));
        assert_eq!(std::fs::read(path).unwrap(), b"abc");
    }
}
