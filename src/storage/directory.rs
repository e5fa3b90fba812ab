use super::EvidenceStore;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Writes each key as a file in one directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create evidence directory {}", root.display()))?;
        tracing::info!("Saving alert evidence to {}", root.display());
        Ok(Self { root })
    }
}

impl EvidenceStore for DirectoryStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            bail!("Invalid evidence key {key:?}");
        }
        let path = self.root.join(key);
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}
