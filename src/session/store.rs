use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    pub token: String,
    pub username: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Session file on disk, so a login survives between CLI invocations.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::data_local_dir()?;
        path.push("taskboard");
        path.push(SESSION_FILE_NAME);
        Some(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<PersistedSession>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read session file '{}'", self.path.display()))?;
        match serde_json::from_str::<PersistedSession>(&contents) {
            Ok(session) if !session.token.trim().is_empty() => Ok(Some(session)),
            Ok(_) => Ok(None),
            Err(error) => {
                warn!(
                    "ignoring unreadable session file '{}': {}",
                    self.path.display(),
                    error
                );
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &PersistedSession) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| anyhow!("invalid session file path"))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create data directory '{}'", parent.display()))?;

        let contents =
            serde_json::to_string_pretty(session).context("failed to serialize session")?;
        let tmp_path = self.path.with_file_name(format!(".{SESSION_FILE_NAME}.tmp"));

        write_private(&tmp_path, contents.as_bytes()).with_context(|| {
            format!(
                "failed to write temporary session file '{}'",
                tmp_path.display()
            )
        })?;
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "failed to move session file into place at '{}'",
                self.path.display()
            )
        })?;

        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to remove session file '{}'", self.path.display())),
        }
    }
}

/// Creates `path` readable by the owner only. A leftover file is removed
/// first so its permissions are never reused.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PersistedSession {
        PersistedSession {
            token: "header.payload.sig".to_string(),
            username: Some("ana".to_string()),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        }
    }

    #[test]
    fn test_missing_file_loads_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path().join("session.json"));
        assert!(store.load().expect("load should succeed").is_none());
    }

    #[test]
    fn test_save_then_load_and_clear() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path().join("nested").join("session.json"));
        let session = sample();

        store.save(&session).expect("save should succeed");
        assert_eq!(store.load().expect("load"), Some(session));

        store.clear().expect("clear should succeed");
        assert!(!store.path().exists());
        store.clear().expect("clearing twice is fine");
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("session.json");
        fs::write(&path, "{ not json").expect("write");

        let store = SessionStore::new(&path);
        assert!(store.load().expect("load").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_owner_only_even_over_stale_temp_file() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("session.json");
        let stale = temp.path().join(".session.json.tmp");
        fs::write(&stale, "old").expect("write stale temp file");
        fs::set_permissions(&stale, fs::Permissions::from_mode(0o644)).expect("chmod");

        SessionStore::new(&path).save(&sample()).expect("save should succeed");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!stale.exists());
    }
}
