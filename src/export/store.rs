use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::json::{LoadedSession, deserialize, serialize};
use crate::config::SessionConfig;
use crate::state::HopRecord;

/// Largest session file that will be loaded
pub const MAX_SESSION_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Where session files are read from and written to
pub trait FileClient {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;
}

/// The local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFiles;

impl FileClient for LocalFiles {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open session file: {}", path.display()))?;

        // Check size up front rather than reading a huge file into memory
        let metadata = file
            .metadata()
            .with_context(|| format!("Failed to read session file metadata: {}", path.display()))?;
        if metadata.len() > MAX_SESSION_FILE_SIZE {
            anyhow::bail!("Session file too large (max 10MB): {}", path.display());
        }

        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        file.take(MAX_SESSION_FILE_SIZE + 1)
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        Ok(bytes)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write session file: {}", path.display()))
    }
}

pub fn save_session(
    files: &impl FileClient,
    path: &Path,
    config: &SessionConfig,
    hops: &[HopRecord],
) -> Result<()> {
    let bytes = serialize(config, hops).context("Failed to encode session")?;
    files.write(path, &bytes)
}

pub fn load_session(files: &impl FileClient, path: &Path) -> Result<LoadedSession> {
    let bytes = files.read(path)?;
    if bytes.len() as u64 > MAX_SESSION_FILE_SIZE {
        anyhow::bail!("Session file too large (max 10MB): {}", path.display());
    }
    deserialize(&bytes).with_context(|| format!("Failed to load session file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::CodecError;
    use crate::state::PingEvent;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut hop = HopRecord::new(1, "10.0.0.1".parse().unwrap());
        hop.record(PingEvent::success(1000, 3.0));
        save_session(&LocalFiles, &path, &SessionConfig::new("10.0.0.1"), &[hop]).unwrap();

        let loaded = load_session(&LocalFiles, &path).unwrap();
        assert_eq!(loaded.hops.len(), 1);
        assert_eq!(loaded.hops[0].mean_rtt(), Some(3.0));
    }

    #[test]
    fn test_version_error_survives_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        std::fs::write(
            &path,
            r#"{"version": "9.0.0", "config": {}, "hops": [], "exportDate": ""}"#,
        )
        .unwrap();

        let err = load_session(&LocalFiles, &path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CodecError>(),
            Some(CodecError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_oversized_file_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.json");
        let file = File::create(&path).unwrap();
        file.set_len(MAX_SESSION_FILE_SIZE + 1).unwrap();

        let err = load_session(&LocalFiles, &path).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_session(&LocalFiles, &dir.path().join("nope.json")).is_err());
    }
}
