//! HTTP transport.
//!
//! A trait sits here so the pipeline can be driven by any client (and by
//! scripted transports in tests). [`ReqwestTransport`] is the default.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::error::{AuthError, TransportError};
use crate::request::RequestDescriptor;

/// Default user agent sent by [`ReqwestTransport`].
pub const DEFAULT_USER_AGENT: &str = concat!("estate-auth/", env!("CARGO_PKG_VERSION"));

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Whether the server rejected the request's credentials.
    #[inline]
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request as currently described and buffer the response.
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        Self::with_user_agent(timeout, DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        trace!(
            method = %request.method(),
            url = %request.url(),
            %status,
            bytes = body.len(),
            "Response received"
        );

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_helpers() {
        let response = TransportResponse::new(StatusCode::UNAUTHORIZED, "expired");
        assert!(response.is_unauthorized());
        assert!(!response.is_success());
        assert_eq!(response.text(), "expired");

        let response = TransportResponse::new(StatusCode::OK, r#"{"id":3}"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], 3);
    }

    #[test]
    fn test_forbidden_is_not_unauthorized() {
        let response = TransportResponse::new(StatusCode::FORBIDDEN, "");
        assert!(!response.is_unauthorized());
    }
}
