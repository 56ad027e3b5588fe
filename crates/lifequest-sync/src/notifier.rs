//! User-facing notices.
//!
//! The manager never talks to the UI directly; it hands [`Notice`]s to a
//! [`Notifier`]. Headless hosts use [`LogNotifier`], tests use
//! [`RecordingNotifier`].

use lifequest_core::{Notice, NoticeLevel};
use parking_lot::Mutex;

/// Sink for blocking notifications.
pub trait Notifier: Send + Sync {
    /// Show `notice` to the user.
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => tracing::info!(notice = %notice, "user notice"),
            NoticeLevel::Warning => tracing::warn!(notice = %notice, "user notice"),
            NoticeLevel::Error => tracing::error!(notice = %notice, "user notice"),
        }
    }
}

/// Keeps every notice for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All notices so far, oldest first.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    /// Most recent notice.
    pub fn last(&self) -> Option<Notice> {
        self.notices.lock().last().cloned()
    }

    /// Forget recorded notices.
    pub fn clear(&self) {
        self.notices.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}
