//! Authenticated request execution.
//!
//! Every request is stamped with the current access token and sent. A `401`
//! response triggers one refresh (shared with any other request that hit the
//! same expiry) and one resubmission; a failed refresh ends the session.
//! Everything else, including other 4xx/5xx responses and network errors,
//! passes through untouched.

use std::sync::Arc;

use reqwest::{Method, Url};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::attacher::AuthAttacher;
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::{AuthError, RefreshError, Result};
use crate::refresh::{HttpRefresher, RefreshCoordinator, RefreshFailure};
use crate::request::RequestDescriptor;
use crate::terminator::{LoginRedirect, SessionTerminator};
use crate::transport::{ReqwestTransport, Transport, TransportResponse};

#[derive(Clone)]
pub struct AuthedClient {
    base: Url,
    transport: Arc<dyn Transport>,
    attacher: AuthAttacher,
    coordinator: RefreshCoordinator,
    terminator: Arc<SessionTerminator>,
}

impl AuthedClient {
    pub fn new(
        base: Url,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        coordinator: RefreshCoordinator,
        terminator: Arc<SessionTerminator>,
    ) -> Self {
        Self {
            base,
            transport,
            attacher: AuthAttacher::new(store),
            coordinator,
            terminator,
        }
    }

    /// Wire the default pipeline: reqwest transport, HTTP refresher and the
    /// configured timeout on both.
    pub fn from_config(
        config: &ClientConfig,
        store: Arc<dyn CredentialStore>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::with_user_agent(
            config.timeout(),
            &config.user_agent,
        )?);
        Self::with_transport(config, transport, store, redirect)
    }

    /// Same as [`from_config`](Self::from_config) over a caller-supplied transport.
    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Result<Self> {
        let refresher = Arc::new(HttpRefresher::new(
            transport.clone(),
            config.refresh_url()?,
            config.refresh_method.as_method(),
        ));
        let coordinator =
            RefreshCoordinator::new(store.clone(), refresher).with_timeout(config.timeout());
        let terminator = Arc::new(SessionTerminator::new(store.clone(), redirect));

        Ok(Self::new(
            config.base()?,
            transport,
            store,
            coordinator,
            terminator,
        ))
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn terminator(&self) -> &Arc<SessionTerminator> {
        &self.terminator
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Build a descriptor for `path` relative to the base URL.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestDescriptor> {
        let url = self.base.join(path.trim_start_matches('/'))?;
        Ok(RequestDescriptor::new(method, url))
    }

    pub async fn get(&self, path: &str) -> Result<TransportResponse> {
        self.execute(self.request(Method::GET, path)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<TransportResponse> {
        self.execute(self.request(Method::DELETE, path)?).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<TransportResponse> {
        self.execute(self.request(Method::POST, path)?.with_json(body)?)
            .await
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<TransportResponse> {
        self.execute(self.request(Method::PUT, path)?.with_json(body)?)
            .await
    }

    /// Send a request, recovering once from an expired access token.
    ///
    /// Returns the server's response for anything that is not an
    /// authentication failure. Errors:
    /// - [`AuthError::Transport`] for network failures (never refreshed)
    /// - [`AuthError::RetryExhausted`] when the request is rejected again
    ///   after its one retry
    /// - [`AuthError::AuthExpired`] when the refresh failed; the session has
    ///   been terminated
    /// - [`AuthError::Unauthenticated`] when no credential existed at all
    #[instrument(skip(self, request), fields(method = %request.method(), url = %request.url()))]
    pub async fn execute(&self, mut request: RequestDescriptor) -> Result<TransportResponse> {
        let sent_with = self.attacher.attach(&mut request);
        let response = self.transport.send(&request).await?;

        if !response.is_unauthorized() {
            debug!(status = %response.status, "Passing response through");
            return Ok(response);
        }

        self.recover(request, sent_with).await
    }

    async fn recover(
        &self,
        mut request: RequestDescriptor,
        sent_with: Option<String>,
    ) -> Result<TransportResponse> {
        if !request.mark_retried() {
            warn!("Rejected request was already retried");
            return Err(retry_exhausted(&request));
        }

        debug!("Access token rejected, refreshing");
        if let Err(failure) = self.coordinator.refresh_tracked(sent_with.as_deref()).await {
            return Err(self.end_session(failure, sent_with.is_some()));
        }

        self.attacher.attach(&mut request);
        let response = self.transport.send(&request).await?;

        if response.is_unauthorized() {
            warn!("Request rejected again after token refresh");
            return Err(retry_exhausted(&request));
        }

        debug!(status = %response.status, "Retry completed");
        Ok(response)
    }

    fn end_session(&self, failure: RefreshFailure, had_credential: bool) -> AuthError {
        match failure.refresh_token.as_deref() {
            Some(refresh_token) => self.terminator.terminate_session(refresh_token),
            None => self.terminator.terminate(),
        }

        if !had_credential && matches!(failure.reason, RefreshError::MissingRefreshToken) {
            AuthError::Unauthenticated
        } else {
            failure.into()
        }
    }
}

fn retry_exhausted(request: &RequestDescriptor) -> AuthError {
    AuthError::RetryExhausted {
        method: request.method().clone(),
        url: request.url().to_string(),
    }
}
