//! In-memory auth provider.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use lifequest_core::Identity;
use parking_lot::Mutex;
use tracing::debug;

use crate::backend::{AuthCallback, AuthProvider, ListenerHandle};
use crate::errors::{BackendError, BackendResult};

type Observer = Arc<dyn Fn(Option<Identity>) + Send + Sync>;

#[derive(Default)]
struct Inner {
    user: Option<Identity>,
    observers: HashMap<u64, Observer>,
    next_observer: u64,
    popup_identity: Option<Identity>,
    fail_sign_in: Option<BackendError>,
    fail_sign_out: Option<BackendError>,
}

/// Scriptable [`AuthProvider`].
///
/// The popup "selects" the identity configured with
/// [`with_popup_identity`](Self::with_popup_identity); without one it behaves
/// like a dismissed popup.
#[derive(Clone, Default)]
pub struct MemoryAuth {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryAuth {
    /// Signed-out provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity returned by the next popup sign-ins.
    #[must_use]
    pub fn with_popup_identity(self, identity: Identity) -> Self {
        self.inner.lock().popup_identity = Some(identity);
        self
    }

    /// Force an auth transition and notify observers.
    pub fn set_user(&self, user: Option<Identity>) {
        let observers = {
            let mut inner = self.inner.lock();
            inner.user.clone_from(&user);
            inner.observers.values().cloned().collect::<Vec<_>>()
        };
        debug!(uid = ?user.as_ref().map(|u| u.uid.as_str()), observers = observers.len(), "auth state changed");
        for observer in observers {
            observer(user.clone());
        }
    }

    /// Make the next popup sign-in fail.
    pub fn fail_next_sign_in(&self, err: BackendError) {
        self.inner.lock().fail_sign_in = Some(err);
    }

    /// Make the next sign-out fail.
    pub fn fail_next_sign_out(&self, err: BackendError) {
        self.inner.lock().fail_sign_out = Some(err);
    }

    /// Registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    fn on_auth_state_changed(&self, callback: AuthCallback) -> ListenerHandle {
        let callback: Observer = Arc::from(callback);
        let (id, current) = {
            let mut inner = self.inner.lock();
            inner.next_observer += 1;
            let id = inner.next_observer;
            let _ = inner.observers.insert(id, Arc::clone(&callback));
            (id, inner.user.clone())
        };

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        let handle = ListenerHandle::new("auth", move || {
            if let Some(inner) = weak.upgrade() {
                let _ = inner.lock().observers.remove(&id);
            }
        });
        callback(current);
        handle
    }

    async fn sign_in_with_popup(&self) -> BackendResult<Identity> {
        let identity = {
            let mut inner = self.inner.lock();
            if let Some(err) = inner.fail_sign_in.take() {
                return Err(err);
            }
            inner
                .popup_identity
                .clone()
                .ok_or_else(|| BackendError::SignInCancelled("popup closed by user".into()))?
        };
        self.set_user(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> BackendResult<()> {
        if let Some(err) = self.inner.lock().fail_sign_out.take() {
            return Err(err);
        }
        self.set_user(None);
        Ok(())
    }

    fn current_user(&self) -> Option<Identity> {
        self.inner.lock().user.clone()
    }
}

impl std::fmt::Debug for MemoryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryAuth")
            .field("user", &inner.user)
            .field("observers", &inner.observers.len())
            .finish_non_exhaustive()
    }
}
