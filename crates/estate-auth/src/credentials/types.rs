//! Core credential types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Access and refresh token, created and destroyed together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Short-lived token sent as `Authorization: Bearer`.
    #[serde(alias = "accessToken")]
    pub access_token: String,
    /// Longer-lived token used only to mint a new access token.
    #[serde(alias = "refreshToken")]
    pub refresh_token: String,
}

impl CredentialPair {
    /// Create a new credential pair.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_tokens() {
        let pair = CredentialPair::new("secret-access", "secret-refresh");
        let debug = format!("{pair:?}");
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }

    #[test]
    fn test_deserialize_accepts_camel_case() {
        let pair: CredentialPair =
            serde_json::from_str(r#"{"accessToken":"T1","refreshToken":"R1"}"#).unwrap();
        assert_eq!(pair, CredentialPair::new("T1", "R1"));

        let pair: CredentialPair =
            serde_json::from_str(r#"{"access_token":"T2","refresh_token":"R2"}"#).unwrap();
        assert_eq!(pair.bearer(), "Bearer T2");
    }

    #[test]
    fn test_deserialize_rejects_partial_pair() {
        let result = serde_json::from_str::<CredentialPair>(r#"{"access_token":"T1"}"#);
        assert!(result.is_err());
    }
}
