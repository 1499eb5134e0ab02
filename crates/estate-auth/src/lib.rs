//! Authenticated request pipeline for the estate marketplace REST backend.
//!
//! Every outbound call goes through the same steps:
//!
//! 1. [`AuthAttacher`] stamps `Authorization: Bearer <access token>` from the
//!    [`CredentialStore`].
//! 2. The [`Transport`] sends the request.
//! 3. On `401 Unauthorized`, [`AuthedClient`] asks the [`RefreshCoordinator`]
//!    for a new pair. Concurrent failures share a single refresh call.
//! 4. The request is resubmitted once with the new token. If the refresh
//!    failed, the [`SessionTerminator`] clears the store and redirects to the
//!    login boundary.
//!
//! ```ignore
//! use std::sync::Arc;
//! use estate_auth::{ClientConfig, SessionClient, TracingRedirect};
//!
//! let config = ClientConfig::from_env();
//! let redirect = Arc::new(TracingRedirect::new(config.login_redirect.clone()));
//! let session = SessionClient::open(config, redirect)?;
//!
//! session.login("owner@example.com", "hunter2").await?;
//! let response = session.client().get("properties?page=1").await?;
//! ```

pub mod attacher;
pub mod config;
pub mod credentials;
pub mod error;
pub mod interceptor;
pub mod refresh;
pub mod request;
pub mod session;
pub mod terminator;
pub mod transport;

pub use attacher::AuthAttacher;
pub use config::{ClientConfig, RefreshMethod};
pub use credentials::{CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{AuthError, RefreshError, Result, TransportError};
pub use interceptor::AuthedClient;
pub use refresh::{HttpRefresher, RefreshCoordinator, Refresher};
pub use request::RequestDescriptor;
pub use session::{Identity, Role, SessionClient};
pub use terminator::{LoginRedirect, SessionTerminator, TracingRedirect};
pub use transport::{ReqwestTransport, Transport, TransportResponse};
