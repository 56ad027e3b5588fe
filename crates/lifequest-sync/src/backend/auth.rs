//! Auth provider boundary.

use async_trait::async_trait;
use lifequest_core::Identity;

use super::listener::ListenerHandle;
use crate::errors::BackendResult;

/// Called with the new identity (or `None` after sign-out) on every change.
pub type AuthCallback = Box<dyn Fn(Option<Identity>) + Send + Sync>;

/// Hosted authentication provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Observe auth state. The callback fires once with the current state,
    /// then on every transition, until the handle is cancelled.
    fn on_auth_state_changed(&self, callback: AuthCallback) -> ListenerHandle;

    /// Interactive popup sign-in.
    async fn sign_in_with_popup(&self) -> BackendResult<Identity>;

    /// End the current session.
    async fn sign_out(&self) -> BackendResult<()>;

    /// Identity of the current session, if any.
    fn current_user(&self) -> Option<Identity>;
}
