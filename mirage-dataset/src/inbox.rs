//! Directory-based exchange of frame histories with external simulators.
//!
//! A simulator asks for a reward by writing `<id>__requiring.bin`, a bincode
//! encoded [`FrameHistoryRecord`]. The WGAN trainer consumes the request,
//! renaming it to `<id>__done.bin`, and answers with `<id>__waiting.bin`
//! holding the reward derived from the critic output.
use anyhow::Result;
use log::{debug, warn};
use mirage_core::FrameHistoryRecord;
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

const REQUIRING: &str = "__requiring.bin";
const DONE: &str = "__done.bin";
const WAITING: &str = "__waiting.bin";

/// Reward given for a request whose record got critic output `critic_output`.
pub fn critic_reward(critic_output: f32) -> f32 {
    (1.0 - critic_output) * 0.1
}

/// Request and reward directories.
#[derive(Debug, Clone)]
pub struct RequestInbox {
    request_dir: PathBuf,
    reward_dir: PathBuf,
}

impl RequestInbox {
    /// Reads requests from `request_dir` and writes rewards to `reward_dir`.
    pub fn new(request_dir: impl AsRef<Path>, reward_dir: impl AsRef<Path>) -> Self {
        Self {
            request_dir: request_dir.as_ref().to_path_buf(),
            reward_dir: reward_dir.as_ref().to_path_buf(),
        }
    }

    /// Consumes pending requests and returns their ids and records.
    ///
    /// Files that fail to decode are left in place.
    pub fn scan(&self) -> Result<Vec<(String, FrameHistoryRecord)>> {
        let mut paths = vec![];
        for entry in fs::read_dir(&self.request_dir)? {
            let path = entry?.path();
            let id = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(REQUIRING))
                .map(|id| id.to_string());
            if let Some(id) = id {
                paths.push((id, path));
            }
        }
        paths.sort();

        let mut requests = vec![];
        for (id, path) in paths {
            let record = match File::open(&path) {
                Ok(file) => bincode::deserialize_from::<_, FrameHistoryRecord>(BufReader::new(file)),
                Err(e) => {
                    warn!("Failed to open {}: {}", path.display(), e);
                    continue;
                }
            };
            match record {
                Ok(record) => {
                    fs::rename(&path, self.request_dir.join(format!("{}{}", id, DONE)))?;
                    requests.push((id, record));
                }
                Err(e) => warn!("Failed to decode {}: {}", path.display(), e),
            }
        }
        debug!("{} requests consumed", requests.len());
        Ok(requests)
    }

    /// Writes the reward of request `id` given the critic output of its record.
    pub fn write_reward(&self, id: &str, critic_output: f32) -> Result<PathBuf> {
        fs::create_dir_all(&self.reward_dir)?;
        let path = self.reward_dir.join(format!("{}{}", id, WAITING));
        let tmp = path.with_extension("bin.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            bincode::serialize_into(&mut writer, &critic_reward(critic_output))?;
        }
        fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Reads a reward written by [`RequestInbox::write_reward`].
    pub fn read_reward(path: impl AsRef<Path>) -> Result<f32> {
        let file = File::open(path)?;
        Ok(bincode::deserialize_from(BufReader::new(file))?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use mirage_core::Image;
    use tempdir::TempDir;

    fn write_request(dir: &Path, name: &str, v: f32) -> Result<()> {
        let f = Image::from_elem((1, 2, 2), v);
        let record = FrameHistoryRecord::new([f.clone(), f.clone(), f.clone(), f], 2, 4);
        fs::write(dir.join(name), bincode::serialize(&record)?)?;
        Ok(())
    }

    #[test]
    fn test_scan_consumes_requests() -> Result<()> {
        let dir = TempDir::new("request_inbox")?;
        write_request(dir.path(), "a__requiring.bin", 1.0)?;
        write_request(dir.path(), "b__requiring.bin", 2.0)?;
        write_request(dir.path(), "c__requiring.bin.tmp", 3.0)?;
        fs::write(dir.path().join("d__requiring.bin"), b"xx")?;

        let inbox = RequestInbox::new(dir.path(), dir.path());
        let requests = inbox.scan()?;
        let ids: Vec<&str> = requests.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(requests[1].1.frames[0][[0, 0, 0]], 2.0);
        assert!((requests[0].1.normalized_action() - 0.5).abs() < 1e-6);

        assert!(dir.path().join("a__done.bin").exists());
        assert!(!dir.path().join("a__requiring.bin").exists());
        assert!(dir.path().join("c__requiring.bin.tmp").exists());
        assert!(dir.path().join("d__requiring.bin").exists());

        assert!(inbox.scan()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_write_reward() -> Result<()> {
        let dir = TempDir::new("request_inbox")?;
        let inbox = RequestInbox::new(dir.path(), dir.path().join("rewards"));
        let path = inbox.write_reward("a", 0.5)?;
        assert_eq!(path, dir.path().join("rewards").join("a__waiting.bin"));
        assert!((RequestInbox::read_reward(&path)? - 0.05).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_critic_reward() {
        assert!((critic_reward(1.0)).abs() < 1e-6);
        assert!((critic_reward(-1.0) - 0.2).abs() < 1e-6);
    }
}
