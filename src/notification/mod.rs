//! Transient user feedback for board mutations.

use std::str::FromStr;
use std::sync::Mutex;

use tracing::{debug, warn};

const DEFAULT_DISPLAY_DURATION_MS: u64 = 4_000;

/// Notification backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationBackend {
    /// No notifications
    None,
    /// Printed to stderr
    #[default]
    Terminal,
    /// Desktop notifications (via notify-rust)
    System,
    /// Both terminal and desktop notifications
    Both,
}

impl NotificationBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Terminal => "terminal",
            Self::System => "system",
            Self::Both => "both",
        }
    }
}

impl FromStr for NotificationBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "terminal" => Ok(Self::Terminal),
            "system" => Ok(Self::System),
            "both" => Ok(Self::Both),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Receives feedback after each mutation.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone)]
pub struct BackendNotifier {
    backend: NotificationBackend,
    display_duration_ms: u64,
}

impl BackendNotifier {
    pub fn new(backend: NotificationBackend) -> Self {
        Self {
            backend,
            display_duration_ms: DEFAULT_DISPLAY_DURATION_MS,
        }
    }
}

impl Notifier for BackendNotifier {
    fn notify(&self, notice: Notice) {
        let (send_terminal, send_system) = backend_targets(self.backend);
        if !send_terminal && !send_system {
            debug!(message = %notice.message, "notification skipped (backend is none)");
            return;
        }

        if send_terminal {
            eprintln!("{}", terminal_line(&notice));
        }
        if send_system {
            send_system_notification(&notice, self.display_duration_ms);
        }
    }
}

/// Collects notices in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl MemoryNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notice: Notice) {
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
    }
}

fn backend_targets(backend: NotificationBackend) -> (bool, bool) {
    match backend {
        NotificationBackend::None => (false, false),
        NotificationBackend::Terminal => (true, false),
        NotificationBackend::System => (false, true),
        NotificationBackend::Both => (true, true),
    }
}

fn terminal_line(notice: &Notice) -> String {
    match notice.level {
        NoticeLevel::Success => format!("✓ {}", notice.message),
        NoticeLevel::Error => format!("✗ {}", notice.message),
    }
}

fn send_system_notification(notice: &Notice, display_duration_ms: u64) {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        let timeout_ms = display_duration_ms.min(u32::MAX as u64) as u32;
        let icon = match notice.level {
            NoticeLevel::Success => "dialog-information",
            NoticeLevel::Error => "dialog-error",
        };

        let result = notify_rust::Notification::new()
            .summary("Task Board")
            .body(&notice.message)
            .icon(icon)
            .timeout(notify_rust::Timeout::Milliseconds(timeout_ms))
            .show();

        if let Err(err) = result {
            warn!(error = %err, "failed to send system notification");
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = display_duration_ms;
        debug!(message = %notice.message, "system notifications not supported on this OS");
    }
}
