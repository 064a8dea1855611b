use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;
use crate::core::error::{Error, Result};

type ReadyFlags = BTreeMap<String, BTreeMap<String, bool>>;

/// Persisted ready flag per (entity type, schema version).
///
/// Stored as TOML:
/// ```toml
/// [changes]
/// "3" = true
/// "4" = false
/// ```
pub struct IndexStatus {
    path: Option<PathBuf>,
    flags: Mutex<ReadyFlags>,
}

impl IndexStatus {
    pub const FILE_NAME: &'static str = "index_status.toml";

    /// Read the status file under `index_dir`; a missing file means nothing is ready
    pub fn load(index_dir: &Path) -> Result<Self> {
        let path = index_dir.join(Self::FILE_NAME);
        let flags = if path.exists() {
            let text = fs::read_to_string(&path)?;
            toml::from_str(&text)?
        } else {
            ReadyFlags::new()
        };

        Ok(IndexStatus {
            path: Some(path),
            flags: Mutex::new(flags),
        })
    }

    /// Status that is never written to disk
    pub fn in_memory() -> Self {
        IndexStatus {
            path: None,
            flags: Mutex::new(ReadyFlags::new()),
        }
    }

    pub fn is_ready(&self, name: &str, version: u32) -> bool {
        self.flags
            .lock()
            .get(name)
            .and_then(|versions| versions.get(&version.to_string()))
            .copied()
            .unwrap_or(false)
    }

    pub fn ready_versions(&self, name: &str) -> Vec<u32> {
        let flags = self.flags.lock();
        let mut versions: Vec<u32> = flags
            .get(name)
            .map(|vs| {
                vs.iter()
                    .filter(|(_, ready)| **ready)
                    .filter_map(|(v, _)| v.parse().ok())
                    .collect()
            })
            .unwrap_or_default();
        versions.sort_unstable();
        versions
    }

    /// Memory only changes once the file is written, so a failed write
    /// leaves the flag as it was.
    pub fn set_ready(&self, name: &str, version: u32, ready: bool) -> Result<()> {
        let mut flags = self.flags.lock();
        let mut next = flags.clone();
        next.entry(name.to_string())
            .or_default()
            .insert(version.to_string(), ready);
        self.persist(&next)?;
        *flags = next;
        debug!(index = name, version, ready, "index ready flag updated");
        Ok(())
    }

    // Written through a temp file so readers never see a torn file.
    fn persist(&self, flags: &ReadyFlags) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = path
            .parent()
            .ok_or_else(|| Error::configuration(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(dir)?;

        let text = toml::to_string(flags)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.persist(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_survive_reload() {
        let dir = tempfile::tempdir().unwrap();

        let status = IndexStatus::load(dir.path()).unwrap();
        assert!(!status.is_ready("changes", 3));
        status.set_ready("changes", 3, true).unwrap();
        status.set_ready("changes", 4, false).unwrap();
        status.set_ready("accounts", 1, true).unwrap();

        let reloaded = IndexStatus::load(dir.path()).unwrap();
        assert!(reloaded.is_ready("changes", 3));
        assert!(!reloaded.is_ready("changes", 4));
        assert_eq!(reloaded.ready_versions("changes"), vec![3]);
        assert_eq!(reloaded.ready_versions("accounts"), vec![1]);
        assert!(reloaded.ready_versions("groups").is_empty());
    }

    #[test]
    fn failed_write_keeps_the_previous_flag() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("index");

        let status = IndexStatus::load(&dir).unwrap();
        status.set_ready("changes", 3, true).unwrap();

        // the index directory turns into a plain file
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, "").unwrap();

        assert!(status.set_ready("changes", 3, false).is_err());
        assert!(status.set_ready("changes", 4, true).is_err());
        assert!(status.is_ready("changes", 3));
        assert!(!status.is_ready("changes", 4));
        assert_eq!(status.ready_versions("changes"), vec![3]);
    }

    #[test]
    fn corrupt_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(IndexStatus::FILE_NAME), "[changes\n").unwrap();

        let err = IndexStatus::load(dir.path()).err().unwrap();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Configuration);
    }
}
