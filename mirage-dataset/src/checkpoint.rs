//! Discovery of generator checkpoints.
//!
//! The WGAN trainer saves a pair of files per epoch in its experiment directory,
//! `netG_epoch_<n>.<ext>` for the generator and `netD_epoch_<n>.<ext>` for the
//! critic.
use anyhow::Result;
use std::{
    fs,
    path::{Path, PathBuf},
};

const GENERATOR_PREFIX: &str = "netG_epoch_";
const CRITIC_PREFIX: &str = "netD_epoch_";

/// A generative model that can load the parameters of a checkpoint.
pub trait GenerativeModel {
    /// Loads the generator parameters saved at `path`.
    fn reload(&mut self, path: &Path) -> Result<()>;
}

/// A directory of generator and critic checkpoints.
#[derive(Debug, Clone)]
pub struct CheckpointDir {
    dir: PathBuf,
    ext: String,
}

impl CheckpointDir {
    /// Checkpoints in `dir` with extension `ext`.
    pub fn new(dir: impl AsRef<Path>, ext: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ext: ext.into(),
        }
    }

    /// Directory of the checkpoints.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths of the generator and critic checkpoints of `epoch`.
    pub fn paths(&self, epoch: usize) -> (PathBuf, PathBuf) {
        (
            self.dir
                .join(format!("{}{}.{}", GENERATOR_PREFIX, epoch, self.ext)),
            self.dir
                .join(format!("{}{}.{}", CRITIC_PREFIX, epoch, self.ext)),
        )
    }

    /// Returns the epoch and path of the newest generator checkpoint.
    ///
    /// Files whose names do not follow the checkpoint pattern are ignored.
    /// A missing directory has no checkpoint.
    pub fn latest(&self) -> Result<Option<(usize, PathBuf)>> {
        if !self.dir.exists() {
            return Ok(None);
        }

        let mut latest: Option<(usize, PathBuf)> = None;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let epoch = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => self.parse_epoch(name),
                None => None,
            };
            if let Some(epoch) = epoch {
                if latest.as_ref().map_or(true, |(e, _)| epoch > *e) {
                    latest = Some((epoch, path));
                }
            }
        }
        Ok(latest)
    }

    fn parse_epoch(&self, name: &str) -> Option<usize> {
        let stem = name
            .strip_prefix(GENERATOR_PREFIX)?
            .strip_suffix(self.ext.as_str())?
            .strip_suffix('.')?;
        stem.parse().ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_latest_picks_highest_epoch() -> Result<()> {
        let dir = TempDir::new("checkpoint_dir")?;
        let ckpt = CheckpointDir::new(dir.path(), "pth");
        assert!(ckpt.latest()?.is_none());

        for name in [
            "netG_epoch_2.pth",
            "netG_epoch_10.pth",
            "netD_epoch_11.pth",
            "netG_epoch_x.pth",
            "netG_epoch_12.tmp",
            "notes.txt",
        ]
        .iter()
        {
            fs::write(dir.path().join(name), b"")?;
        }

        let (epoch, path) = ckpt.latest()?.unwrap();
        assert_eq!(epoch, 10);
        assert_eq!(path, dir.path().join("netG_epoch_10.pth"));
        Ok(())
    }

    #[test]
    fn test_missing_dir_has_no_checkpoint() -> Result<()> {
        let dir = TempDir::new("checkpoint_dir")?;
        let ckpt = CheckpointDir::new(dir.path().join("none"), "pth");
        assert!(ckpt.latest()?.is_none());
        Ok(())
    }

    #[test]
    fn test_paths() {
        let ckpt = CheckpointDir::new("exp", "bin");
        let (g, d) = ckpt.paths(3);
        assert_eq!(g, Path::new("exp").join("netG_epoch_3.bin"));
        assert_eq!(d, Path::new("exp").join("netD_epoch_3.bin"));
    }
}
