use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::notification::NotificationBackend;

const API_BASE_URL_ENV: &str = "TASKBOARD_API_BASE_URL";
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
const MIN_REQUEST_TIMEOUT_MS: u64 = 500;
const MAX_REQUEST_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const MIN_DUE_SOON_DAYS: u32 = 1;
const MAX_DUE_SOON_DAYS: u32 = 30;
const DEFAULT_DUE_SOON_DAYS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub notification_backend: String,
    pub export_dir: Option<PathBuf>,
    pub due_soon_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            notification_backend: NotificationBackend::default().as_str().to_string(),
            export_dir: None,
            due_soon_days: DEFAULT_DUE_SOON_DAYS,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("taskboard");
        path.push("settings.toml");
        Some(path)
    }

    /// Loads the settings file, then applies the base URL environment
    /// override.
    pub fn load() -> Self {
        let mut settings = match Self::config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Self::default(),
        };

        if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
            settings.api_base_url = url;
            settings.validate();
        }
        settings
    }

    fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(mut settings) => {
                    settings.validate();
                    settings
                }
                Err(error) => {
                    warn!(
                        "failed to parse settings config '{}': {}",
                        path.display(),
                        error
                    );
                    Self::default()
                }
            },
            Err(error) => {
                warn!(
                    "failed to read settings config '{}': {}",
                    path.display(),
                    error
                );
                Self::default()
            }
        }
    }

    /// Applies `edit` to the saved settings file and writes it back.
    /// Environment overrides are not persisted.
    pub fn update_saved(edit: impl FnOnce(&mut Settings)) -> anyhow::Result<Self> {
        let path = Self::config_path().ok_or_else(|| anyhow!("unable to determine config path"))?;
        Self::update_at(&path, edit)
    }

    fn update_at(path: &Path, edit: impl FnOnce(&mut Settings)) -> anyhow::Result<Self> {
        let mut settings = Self::load_from_path(path);
        edit(&mut settings);
        settings.validate();
        settings.save_to_path(path)?;
        Ok(settings)
    }

    fn save_to_path(&self, path: &Path) -> anyhow::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("invalid settings config path"))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory '{}'", parent.display()))?;

        let mut validated = self.clone();
        validated.validate();
        let contents =
            toml::to_string_pretty(&validated).context("failed to serialize settings to TOML")?;

        let tmp_path = path.with_file_name(".settings.toml.tmp");
        fs::write(&tmp_path, contents).with_context(|| {
            format!(
                "failed to write temporary settings file '{}'",
                tmp_path.display()
            )
        })?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "failed to atomically rename settings file '{}' to '{}'",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn notification_backend(&self) -> NotificationBackend {
        NotificationBackend::from_str(&self.notification_backend).unwrap_or_default()
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn validate(&mut self) {
        self.request_timeout_ms = self
            .request_timeout_ms
            .clamp(MIN_REQUEST_TIMEOUT_MS, MAX_REQUEST_TIMEOUT_MS);
        self.due_soon_days = self
            .due_soon_days
            .clamp(MIN_DUE_SOON_DAYS, MAX_DUE_SOON_DAYS);

        let url = self.api_base_url.trim().trim_end_matches('/');
        self.api_base_url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            warn!(
                "invalid api_base_url '{}' in settings config; falling back to {}",
                self.api_base_url, DEFAULT_API_BASE_URL
            );
            DEFAULT_API_BASE_URL.to_string()
        };

        self.notification_backend = match NotificationBackend::from_str(&self.notification_backend)
        {
            Ok(backend) => backend.as_str().to_string(),
            Err(()) => {
                warn!(
                    "invalid notification_backend '{}' in settings config; falling back to default",
                    self.notification_backend
                );
                NotificationBackend::default().as_str().to_string()
            }
        };
    }
}
