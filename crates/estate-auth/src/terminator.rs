//! Session termination.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::credentials::CredentialStore;

/// Sends the user to the unauthenticated entry point.
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self);
}

/// Redirect that only records the event in the log.
#[derive(Debug, Clone)]
pub struct TracingRedirect {
    login_url: String,
}

impl TracingRedirect {
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
        }
    }
}

impl LoginRedirect for TracingRedirect {
    fn redirect_to_login(&self) {
        warn!(login = %self.login_url, "Session ended, login required");
    }
}

/// Clears credentials and redirects to login once per session.
pub struct SessionTerminator {
    store: Arc<dyn CredentialStore>,
    redirect: Arc<dyn LoginRedirect>,
    terminated: AtomicBool,
}

impl SessionTerminator {
    pub fn new(store: Arc<dyn CredentialStore>, redirect: Arc<dyn LoginRedirect>) -> Self {
        Self {
            store,
            redirect,
            terminated: AtomicBool::new(false),
        }
    }

    /// End the session.
    ///
    /// Concurrent and repeated calls clear the store and redirect exactly once
    /// until [`rearm`](Self::rearm) is called.
    pub fn terminate(&self) {
        self.store.clear();
        self.redirect_once();
    }

    /// End the session whose refresh with `refresh_token` failed.
    ///
    /// If the store has meanwhile been given a different pair (a new login),
    /// that session is left alone.
    pub fn terminate_session(&self, refresh_token: &str) {
        if !self.store.clear_matching(refresh_token) && self.store.get().is_some() {
            debug!("Credentials replaced since the failed refresh, keeping session");
            return;
        }
        self.redirect_once();
    }

    fn redirect_once(&self) {
        if self
            .terminated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            warn!("Terminating session");
            self.redirect.redirect_to_login();
        }
    }

    /// Start tracking a new session, called after a successful login.
    pub fn rearm(&self) {
        self.terminated.store(false, Ordering::Release);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}
