//! Cancellable listener registrations.

use std::fmt;

type CancelFn = Box<dyn FnOnce() + Send>;

/// A live listener registration.
///
/// Cancelling (explicitly or by dropping the handle) unregisters the
/// listener; no callback fires afterwards. Cancelling twice is a no-op.
pub struct ListenerHandle {
    target: String,
    cancel: Option<CancelFn>,
}

impl ListenerHandle {
    /// Wrap a backend-specific cancel function.
    pub fn new(target: impl Into<String>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            target: target.into(),
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Resource this listener watches (document or collection path).
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Unregister the listener.
    pub fn cancel(mut self) {
        self.cancel_in_place();
    }

    fn cancel_in_place(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            tracing::trace!(target_path = %self.target, "listener cancelled");
            cancel();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel_in_place();
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("target", &self.target)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
