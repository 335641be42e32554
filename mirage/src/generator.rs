//! Generator placeholder of the dataset manager.
use anyhow::{bail, Result};
use log::info;
use mirage_dataset::GenerativeModel;
use std::path::{Path, PathBuf};

/// Keeps track of the generator checkpoint to sample synthetic transitions from.
///
/// Network internals live with the WGAN trainer. This model checks that the
/// checkpoint exists and remembers its path.
#[derive(Debug, Default, Clone)]
pub struct CheckpointTracker {
    current: Option<PathBuf>,
    n_reloads: usize,
}

impl CheckpointTracker {
    /// Creates a tracker without checkpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checkpoint loaded last.
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    /// Number of successful reloads.
    pub fn n_reloads(&self) -> usize {
        self.n_reloads
    }
}

impl GenerativeModel for CheckpointTracker {
    fn reload(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            bail!("Generator checkpoint {:?} not found", path);
        }
        if self.current.as_deref() != Some(path) {
            info!("Generator switched to {:?}", path);
        }
        self.current = Some(path.to_path_buf());
        self.n_reloads += 1;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_reload() -> Result<()> {
        let dir = TempDir::new("generator")?;
        let path = dir.path().join("netG_epoch_3.pth");
        let mut generator = CheckpointTracker::new();
        assert!(generator.reload(&path).is_err());
        assert_eq!(generator.current(), None);

        std::fs::write(&path, b"weights")?;
        generator.reload(&path)?;
        generator.reload(&path)?;
        assert_eq!(generator.current(), Some(path.as_path()));
        assert_eq!(generator.n_reloads(), 2);
        Ok(())
    }
}
