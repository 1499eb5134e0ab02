//! Error types for the authenticated request pipeline.

use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Pipeline result type.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Network-level failures unrelated to authentication.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The connection to the server could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Any other failure while sending the request or reading the response.
    #[error("Request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Why a refresh call could not produce a new credential pair.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    /// The store holds no refresh token, so no call was made.
    #[error("Missing refresh token - re-login required")]
    MissingRefreshToken,

    /// The stored refresh token cannot be sent as a header value.
    #[error("Refresh token is not a valid header value - re-login required")]
    InvalidRefreshToken,

    /// The refresh endpoint answered with a non-success status.
    #[error("Refresh rejected (HTTP {status}): {body}")]
    Rejected { status: StatusCode, body: String },

    /// The refresh call failed at the network level (timeouts included).
    #[error("Refresh transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The refresh endpoint answered 2xx but the body was not a credential pair.
    #[error("Malformed refresh response: {0}")]
    MalformedResponse(String),

    /// The refresh task ended without publishing an outcome.
    #[error("Refresh task aborted: {0}")]
    Aborted(String),
}

/// Errors surfaced to callers of the pipeline.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was present and the server required one.
    #[error("Not authenticated - login required")]
    Unauthenticated,

    /// The server rejected the access token.
    ///
    /// The pipeline always recovers from this by refresh and retry, so it
    /// never returns it. Kept to name the condition in the taxonomy.
    #[error("Access token rejected by server")]
    AuthFailure,

    /// Refreshing the session failed; the session has been terminated.
    #[error("Session expired: {reason}")]
    AuthExpired { reason: RefreshError },

    /// A request that was already retried once was rejected again.
    #[error("Request {method} {url} rejected after token refresh")]
    RetryExhausted { method: Method, url: String },

    /// Network-level failure, passed through untouched.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Login was refused by the server.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The server answered with a status the operation cannot handle.
    #[error("Unexpected response (HTTP {status}): {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    /// A path or base URL could not be turned into a request URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A header value contained characters HTTP does not allow.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration could not be applied.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Check if this error requires the user to log in again.
    pub fn requires_relogin(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated | Self::AuthExpired { .. } | Self::InvalidCredentials
        )
    }

    /// Check if this error is transient and the call may be attempted again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::Timeout(_) | TransportError::Connect(_))
        )
    }
}

impl From<RefreshError> for AuthError {
    fn from(reason: RefreshError) -> Self {
        Self::AuthExpired { reason }
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relogin_classification() {
        assert!(AuthError::Unauthenticated.requires_relogin());
        assert!(AuthError::from(RefreshError::MissingRefreshToken).requires_relogin());
        assert!(AuthError::InvalidCredentials.requires_relogin());

        let exhausted = AuthError::RetryExhausted {
            method: Method::GET,
            url: "https://api.example.com/a".to_string(),
        };
        assert!(!exhausted.requires_relogin());
        assert!(!AuthError::Transport(TransportError::Timeout("slow".into())).requires_relogin());
    }

    #[test]
    fn test_auth_failure_is_recoverable() {
        let err = AuthError::AuthFailure;
        assert!(!err.requires_relogin());
        assert!(!err.is_transient());
        assert!(AuthError::from(RefreshError::InvalidRefreshToken).requires_relogin());
    }

    #[test]
    fn test_transient_classification() {
        assert!(AuthError::Transport(TransportError::Timeout("t".into())).is_transient());
        assert!(AuthError::Transport(TransportError::Connect("c".into())).is_transient());
        assert!(!AuthError::Transport(TransportError::Request("r".into())).is_transient());
        assert!(!AuthError::from(RefreshError::MissingRefreshToken).is_transient());
    }

    #[test]
    fn test_refresh_error_becomes_auth_expired() {
        let err: AuthError = RefreshError::Rejected {
            status: StatusCode::FORBIDDEN,
            body: "invalid_grant".to_string(),
        }
        .into();

        match err {
            AuthError::AuthExpired {
                reason: RefreshError::Rejected { status, body },
            } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
