//! Pre-send step that stamps the bearer header.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use tracing::{debug, warn};

use crate::credentials::CredentialStore;
use crate::request::RequestDescriptor;

#[derive(Clone)]
pub struct AuthAttacher {
    store: Arc<dyn CredentialStore>,
}

impl AuthAttacher {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Stamp `Authorization: Bearer <access token>` on the request.
    ///
    /// Returns the access token that was attached, or `None` if the store is
    /// empty, in which case any stale header is removed and the request goes
    /// out unauthenticated.
    pub fn attach(&self, request: &mut RequestDescriptor) -> Option<String> {
        let Some(pair) = self.store.get() else {
            request.headers_mut().remove(AUTHORIZATION);
            debug!(url = %request.url(), "No access token, sending unauthenticated");
            return None;
        };

        match HeaderValue::from_str(&pair.bearer()) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
                Some(pair.access_token)
            }
            Err(_) => {
                // Not representable as a header; the server will treat it as unauthenticated.
                warn!("Access token contains invalid header characters");
                request.headers_mut().remove(AUTHORIZATION);
                None
            }
        }
    }
}
