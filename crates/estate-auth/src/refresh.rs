//! Single-flight access token refresh.
//!
//! Any number of requests may observe an expired access token at the same
//! time. The first one to reach the coordinator while it is idle starts the
//! refresh call; everyone arriving while that call is outstanding waits on
//! the same in-flight cell and receives the same outcome. A successful pair is
//! written to the credential store before the coordinator returns to idle and
//! before any waiter is woken.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, Url};
use serde::Deserialize;
use tokio::sync::{Notify, OnceCell};
use tracing::{debug, error, info, instrument};

use crate::credentials::{CredentialPair, CredentialStore};
use crate::error::{AuthError, RefreshError, TransportError};
use crate::request::RequestDescriptor;
use crate::transport::Transport;

/// Longest rejection body kept in [`RefreshError::Rejected`].
const MAX_REJECTION_BODY: usize = 512;

type RefreshOutcome = Result<CredentialPair, RefreshError>;

/// The network call that exchanges a refresh token for a new pair.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> RefreshOutcome;
}

/// Body returned by the refresh endpoint.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(alias = "accessToken", alias = "token")]
    access_token: String,
    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,
}

/// Refresher that calls the backend's refresh endpoint with the refresh token
/// as the bearer credential.
pub struct HttpRefresher {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    method: Method,
}

impl HttpRefresher {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Url, method: Method) -> Self {
        Self {
            transport,
            endpoint,
            method,
        }
    }
}

#[async_trait]
impl Refresher for HttpRefresher {
    async fn refresh(&self, refresh_token: &str) -> RefreshOutcome {
        let mut request = RequestDescriptor::new(self.method.clone(), self.endpoint.clone());
        let mut bearer = HeaderValue::from_str(&format!("Bearer {refresh_token}"))
            .map_err(|_| RefreshError::InvalidRefreshToken)?;
        bearer.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let response = self.transport.send(&request).await?;

        if !response.is_success() {
            let mut body = response.text();
            if body.len() > MAX_REJECTION_BODY {
                let mut cut = MAX_REJECTION_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(RefreshError::Rejected {
                status: response.status,
                body,
            });
        }

        let parsed: RefreshResponse = serde_json::from_slice(&response.body)
            .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;

        if parsed.access_token.is_empty() {
            return Err(RefreshError::MalformedResponse(
                "empty access token".to_string(),
            ));
        }

        // Servers that do not rotate refresh tokens omit it from the response.
        let refresh_token = parsed
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| refresh_token.to_string());

        Ok(CredentialPair::new(parsed.access_token, refresh_token))
    }
}

/// A failed refresh, with the refresh token it was attempted with.
#[derive(Debug, Clone)]
pub(crate) struct RefreshFailure {
    pub(crate) reason: RefreshError,
    /// `None` when no refresh was attempted because the store had no token.
    pub(crate) refresh_token: Option<String>,
}

impl From<RefreshFailure> for AuthError {
    fn from(failure: RefreshFailure) -> Self {
        AuthError::AuthExpired {
            reason: failure.reason,
        }
    }
}

/// Outcome cell shared by the refresh leader and every waiter.
struct InFlightRefresh {
    refresh_token: String,
    result: OnceCell<RefreshOutcome>,
    notify: Notify,
}

impl InFlightRefresh {
    fn new(refresh_token: String) -> Self {
        Self {
            refresh_token,
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn set_result(&self, result: RefreshOutcome) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> RefreshOutcome {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            notified.await;
        }
    }
}

enum RefreshState {
    Idle,
    Refreshing(Arc<InFlightRefresh>),
}

struct RefreshSlot {
    state: RefreshState,
    /// Refresh token whose last refresh failed. Never sent again.
    rejected: Option<(String, RefreshError)>,
}

/// What a caller should do after inspecting the state.
enum Admission {
    Wait(Arc<InFlightRefresh>),
    Ready(CredentialPair),
    Rejected(RefreshFailure),
}

/// Publishes the refresh outcome and returns the coordinator to idle when the
/// refresh task ends, including when it panics or is dropped by a runtime
/// shutdown.
struct PublishOnDrop {
    slot: Arc<Mutex<RefreshSlot>>,
    in_flight: Arc<InFlightRefresh>,
    outcome: Option<RefreshOutcome>,
}

impl Drop for PublishOnDrop {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| {
            Err(RefreshError::Aborted(
                "refresh task ended without a result".to_string(),
            ))
        });

        {
            let mut slot = self.slot.lock();
            if let RefreshState::Refreshing(current) = &slot.state {
                if Arc::ptr_eq(current, &self.in_flight) {
                    slot.state = RefreshState::Idle;
                }
            }
            slot.rejected = match &outcome {
                Ok(_) => None,
                Err(reason) => Some((self.in_flight.refresh_token.clone(), reason.clone())),
            };
        }

        self.in_flight.set_result(outcome);
    }
}

/// Coordinates access token refreshes so that at most one refresh call is
/// outstanding at any time.
///
/// Must be used from within a tokio runtime: the refresh call runs on a
/// spawned task so that no waiter depends on another caller staying alive.
#[derive(Clone)]
pub struct RefreshCoordinator {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn Refresher>,
    slot: Arc<Mutex<RefreshSlot>>,
    timeout: Option<Duration>,
    refresh_calls: Arc<AtomicU64>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<dyn CredentialStore>, refresher: Arc<dyn Refresher>) -> Self {
        Self {
            store,
            refresher,
            slot: Arc::new(Mutex::new(RefreshSlot {
                state: RefreshState::Idle,
                rejected: None,
            })),
            timeout: None,
            refresh_calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bound the refresh call; exceeding it counts as a failed refresh.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Obtain a new credential pair, sharing any refresh already in flight.
    pub async fn refresh(&self) -> Result<CredentialPair, AuthError> {
        let admission = self.admit(|_| false);
        Ok(self.resolve(admission).await?)
    }

    /// Like [`refresh`](Self::refresh), for a request that was rejected while
    /// carrying `sent_with` as its access token.
    ///
    /// When idle and the store already holds a different access token, a
    /// refresh completed after that request was sent; the current pair is
    /// returned without another refresh call.
    pub async fn refresh_stale(
        &self,
        sent_with: Option<&str>,
    ) -> Result<CredentialPair, AuthError> {
        Ok(self.refresh_tracked(sent_with).await?)
    }

    /// [`refresh_stale`](Self::refresh_stale), keeping the refresh token a
    /// failure belongs to.
    pub(crate) async fn refresh_tracked(
        &self,
        sent_with: Option<&str>,
    ) -> Result<CredentialPair, RefreshFailure> {
        let admission = self.admit(|current| Some(current.access_token.as_str()) != sent_with);
        self.resolve(admission).await
    }

    /// Whether a refresh call is outstanding.
    pub fn is_refreshing(&self) -> bool {
        matches!(&self.slot.lock().state, RefreshState::Refreshing(_))
    }

    /// Number of refresh calls started since creation.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_calls.load(Ordering::Relaxed)
    }

    /// Decide, atomically with respect to the Idle→Refreshing transition,
    /// whether to join, start, or skip a refresh.
    fn admit(&self, already_fresh: impl FnOnce(&CredentialPair) -> bool) -> Admission {
        let mut slot = self.slot.lock();

        if let RefreshState::Refreshing(in_flight) = &slot.state {
            debug!("Joining in-flight token refresh");
            return Admission::Wait(in_flight.clone());
        }

        let current = match self.store.get() {
            Some(pair) if !pair.refresh_token.is_empty() => pair,
            _ => {
                debug!("No refresh token available");
                return Admission::Rejected(RefreshFailure {
                    reason: RefreshError::MissingRefreshToken,
                    refresh_token: None,
                });
            }
        };

        if let Some((token, reason)) = &slot.rejected {
            if *token == current.refresh_token {
                debug!("Refresh token was already rejected");
                return Admission::Rejected(RefreshFailure {
                    reason: reason.clone(),
                    refresh_token: Some(token.clone()),
                });
            }
        }

        if already_fresh(&current) {
            debug!("Access token already replaced, skipping refresh");
            return Admission::Ready(current);
        }

        let in_flight = Arc::new(InFlightRefresh::new(current.refresh_token));
        slot.state = RefreshState::Refreshing(in_flight.clone());
        self.refresh_calls.fetch_add(1, Ordering::Relaxed);
        self.spawn_refresh(in_flight.clone());

        Admission::Wait(in_flight)
    }

    fn spawn_refresh(&self, in_flight: Arc<InFlightRefresh>) {
        let store = self.store.clone();
        let refresher = self.refresher.clone();
        let timeout = self.timeout;
        let mut publisher = PublishOnDrop {
            slot: self.slot.clone(),
            in_flight,
            outcome: None,
        };

        tokio::spawn(async move {
            info!("Refreshing access token");

            let refresh_token = publisher.in_flight.refresh_token.clone();
            let call = refresher.refresh(&refresh_token);
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RefreshError::Transport(TransportError::Timeout(format!(
                        "refresh exceeded {}ms",
                        limit.as_millis()
                    )))),
                },
                None => call.await,
            };

            match &outcome {
                Ok(pair) => {
                    store.set(pair.clone());
                    info!("Access token refreshed");
                }
                Err(e) => error!(error = %e, "Access token refresh failed"),
            }

            publisher.outcome = Some(outcome);
            drop(publisher);
        });
    }

    #[instrument(skip_all, level = "debug")]
    async fn resolve(&self, admission: Admission) -> Result<CredentialPair, RefreshFailure> {
        match admission {
            Admission::Ready(pair) => Ok(pair),
            Admission::Rejected(failure) => Err(failure),
            Admission::Wait(in_flight) => {
                in_flight.wait().await.map_err(|reason| RefreshFailure {
                    reason,
                    refresh_token: Some(in_flight.refresh_token.clone()),
                })
            }
        }
    }
}
