//! Writes the server-rendered PDF board report to disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tracing::{info, warn};

pub const EXPORT_FILE_NAME: &str = "kanban-tasks.pdf";

/// Path the report lands at inside `dir`.
pub fn export_path(dir: &Path) -> PathBuf {
    dir.join(EXPORT_FILE_NAME)
}

/// Writes `bytes` to `<dir>/kanban-tasks.pdf`, replacing any earlier export.
pub fn write_export(dir: &Path, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    if bytes.is_empty() {
        bail!("server returned an empty report");
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory '{}'", dir.display()))?;

    let path = export_path(dir);
    let tmp_path = dir.join(format!(".{EXPORT_FILE_NAME}.tmp"));
    fs::write(&tmp_path, bytes).with_context(|| {
        format!(
            "failed to write temporary export file '{}'",
            tmp_path.display()
        )
    })?;
    fs::rename(&tmp_path, &path).with_context(|| {
        format!(
            "failed to atomically rename export file '{}' to '{}'",
            tmp_path.display(),
            path.display()
        )
    })?;

    info!(path = %path.display(), size = bytes.len(), "task report exported");
    Ok(path)
}

/// Opens the exported file in the default viewer. Failure is logged only.
pub fn open_export(path: &Path) -> bool {
    match open::that(path) {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to open exported report");
            false
        }
    }
}
