//! Single-listener slots.
//!
//! A [`SubscriptionSlot`] owns at most one [`ListenerHandle`] for a logical
//! resource (the signed-in user's record, the open chat room, the community
//! list). States are `Unbound` and `Bound(handle)`; rebinding always cancels
//! the old handle before the new listener is started, so two handles for the
//! same resource never coexist.
//!
//! Each binding gets a number. Error callbacks capture it so a late failure
//! from an already-replaced listener can't tear down its successor
//! (see [`SubscriptionSlot::release_if`]).

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::backend::ListenerHandle;

/// Observable state of a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// No live listener.
    Unbound,
    /// One live listener.
    Bound {
        /// Binding number.
        binding: u64,
        /// Watched resource.
        target: String,
    },
}

struct Binding {
    id: u64,
    handle: ListenerHandle,
}

/// Holder of at most one live listener.
pub struct SubscriptionSlot {
    name: &'static str,
    next_binding: AtomicU64,
    current: Mutex<Option<Binding>>,
}

impl SubscriptionSlot {
    /// Empty slot; `name` is used in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_binding: AtomicU64::new(1),
            current: Mutex::new(None),
        }
    }

    /// Cancel the current listener (if any), then start a new one.
    ///
    /// `start` receives the binding number the new listener will carry. If it
    /// fails the slot is left unbound. The lock is not held while `start` or
    /// any cancel function runs, so listener callbacks fired synchronously
    /// during start-up may inspect the slot.
    pub fn rebind<E>(
        &self,
        start: impl FnOnce(u64) -> Result<ListenerHandle, E>,
    ) -> Result<u64, E> {
        let _ = self.release();

        let id = self.next_binding.fetch_add(1, Ordering::Relaxed);
        let handle = start(id)?;
        debug!(slot = self.name, binding = id, target_path = %handle.target(), "listener bound");

        let displaced = self.current.lock().replace(Binding { id, handle });
        if let Some(displaced) = displaced {
            warn!(
                slot = self.name,
                binding = displaced.id,
                "listener bound concurrently, cancelling the older one"
            );
            displaced.handle.cancel();
        }
        Ok(id)
    }

    /// Cancel the current listener. Returns whether one was bound.
    pub fn release(&self) -> bool {
        let old = self.current.lock().take();
        match old {
            Some(binding) => {
                debug!(slot = self.name, binding = binding.id, "listener released");
                binding.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel the current listener only if it is still binding `binding`.
    pub fn release_if(&self, binding: u64) -> bool {
        let old = {
            let mut current = self.current.lock();
            if current.as_ref().is_some_and(|b| b.id == binding) {
                current.take()
            } else {
                None
            }
        };
        match old {
            Some(old) => {
                debug!(slot = self.name, binding, "listener released after failure");
                old.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Current state.
    pub fn state(&self) -> SlotState {
        match &*self.current.lock() {
            Some(b) => SlotState::Bound {
                binding: b.id,
                target: b.handle.target().to_owned(),
            },
            None => SlotState::Unbound,
        }
    }

    /// Whether a listener is live.
    pub fn is_bound(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Target of the live listener.
    pub fn target(&self) -> Option<String> {
        self.current
            .lock()
            .as_ref()
            .map(|b| b.handle.target().to_owned())
    }
}

impl std::fmt::Debug for SubscriptionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSlot")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
