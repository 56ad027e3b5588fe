//! Shared application context.
//!
//! [`AppContext`] replaces the page-global state object: it owns the
//! [`AppState`] record behind a lock and an optional [`RenderHook`] that the
//! UI installs once it is ready. Backend pushes are folded in with
//! [`merge_snapshot`]; the state is never replaced wholesale.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use lifequest_core::{AppState, StateDefaults, merge_snapshot};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{trace, warn};

/// UI refresh callback.
pub trait RenderHook: Send + Sync {
    /// Redraw from the current state.
    fn render(&self);
}

impl<F> RenderHook for F
where
    F: Fn() + Send + Sync,
{
    fn render(&self) {
        self();
    }
}

/// Shared state plus the render hook.
pub struct AppContext {
    state: RwLock<AppState>,
    render_hook: RwLock<Option<Arc<dyn RenderHook>>>,
}

impl AppContext {
    /// Context seeded with `state` and no render hook.
    pub fn new(state: AppState) -> Self {
        Self {
            state: RwLock::new(state),
            render_hook: RwLock::new(None),
        }
    }

    /// Context seeded with the default progress values.
    pub fn with_defaults(defaults: &StateDefaults) -> Self {
        Self::new(AppState::with_defaults(defaults))
    }

    /// Builder-style render hook.
    #[must_use]
    pub fn with_render_hook(self, hook: Arc<dyn RenderHook>) -> Self {
        *self.render_hook.write() = Some(hook);
        self
    }

    /// Install or remove the render hook.
    pub fn set_render_hook(&self, hook: Option<Arc<dyn RenderHook>>) {
        *self.render_hook.write() = hook;
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AppState {
        self.state.read().clone()
    }

    /// Read the state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&self.state.read())
    }

    /// Mutate the state in place (UI-owned fields).
    pub fn update<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        f(&mut self.state.write())
    }

    /// Fold a pushed user document into the state.
    pub fn apply_snapshot(&self, incoming: &Map<String, Value>, defaults: &StateDefaults) {
        let mut state = self.state.write();
        let next = merge_snapshot(&state, incoming, defaults);
        *state = next;
    }

    /// Call the render hook if one is installed.
    ///
    /// Returns whether a hook ran to completion. A panicking hook is logged
    /// and swallowed so a UI bug can't take the listener down with it.
    pub fn request_render(&self) -> bool {
        let hook = self.render_hook.read().clone();
        let Some(hook) = hook else {
            trace!("no render hook installed");
            return false;
        };
        match catch_unwind(AssertUnwindSafe(|| hook.render())) {
            Ok(()) => true,
            Err(_) => {
                warn!("render hook panicked");
                false
            }
        }
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::with_defaults(&StateDefaults::default())
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("state", &*self.state.read())
            .field("render_hook", &self.render_hook.read().is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
