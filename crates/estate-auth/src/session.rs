//! Login and logout.
//!
//! [`SessionClient`] owns the credential store and the authenticated
//! pipeline. Login is sent straight to the transport: a rejected login means
//! bad credentials, not an expired token.
//!
//! When credentials are persisted, the login identity is kept in a sibling
//! file (`credentials.json` -> `credentials.identity.json`) so a later process
//! can tell who is signed in.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::credentials::{
    CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore,
};
use crate::error::{AuthError, Result};
use crate::interceptor::AuthedClient;
use crate::request::RequestDescriptor;
use crate::terminator::LoginRedirect;
use crate::transport::Transport;

/// Dashboard role granted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    Agent,
    Owner,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Agent => "agent",
            Self::Owner => "owner",
            Self::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "agent" => Ok(Self::Agent),
            "owner" => Ok(Self::Owner),
            "customer" => Ok(Self::Customer),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Who the current session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub role: Role,
    pub user_id: Option<String>,
    pub email: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct LoginUser {
    #[serde(default, alias = "_id")]
    id: Option<serde_json::Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<Role>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(flatten)]
    credentials: CredentialPair,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default, alias = "userId")]
    user_id: Option<serde_json::Value>,
    #[serde(default)]
    user: Option<LoginUser>,
}

impl LoginResponse {
    fn into_parts(self, email: &str) -> Result<(CredentialPair, Identity)> {
        let user = self.user.unwrap_or_default();
        let role = self
            .role
            .or(user.role)
            .ok_or_else(|| AuthError::Decode("login response carries no role".to_string()))?;
        let user_id = self.user_id.or(user.id).map(|id| match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        let identity = Identity {
            role,
            user_id,
            email: user.email.or_else(|| Some(email.to_string())),
        };
        Ok((self.credentials, identity))
    }
}

/// Identity mirrored to disk next to the credential file.
struct IdentityFile {
    path: PathBuf,
}

impl IdentityFile {
    fn beside(credentials: &Path) -> Self {
        Self {
            path: credentials.with_extension("identity.json"),
        }
    }

    fn load(&self) -> Option<Identity> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read identity file");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt identity file");
                None
            }
        }
    }

    fn save(&self, identity: &Identity) {
        let result = serde_json::to_vec_pretty(identity)
            .map_err(std::io::Error::other)
            .and_then(|json| {
                if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
                std::fs::write(&self.path, json)
            });
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to persist identity (non-fatal)");
        }
    }

    fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove identity file (non-fatal)");
            }
            _ => {}
        }
    }
}

pub struct SessionClient {
    config: ClientConfig,
    store: Arc<dyn CredentialStore>,
    client: AuthedClient,
    identity: RwLock<Option<Identity>>,
    identity_file: Option<IdentityFile>,
}

impl SessionClient {
    /// Build the default pipeline, persisting credentials to
    /// `config.credentials_file` when set.
    pub fn open(config: ClientConfig, redirect: Arc<dyn LoginRedirect>) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match &config.credentials_file {
            Some(path) => Arc::new(FileCredentialStore::open(path)),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        let client = AuthedClient::from_config(&config, store.clone(), redirect)?;
        Ok(Self::from_parts(config, store, client))
    }

    /// Build over a caller-supplied transport and store.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Result<Self> {
        let client = AuthedClient::with_transport(&config, transport, store.clone(), redirect)?;
        Ok(Self::from_parts(config, store, client))
    }

    fn from_parts(config: ClientConfig, store: Arc<dyn CredentialStore>, client: AuthedClient) -> Self {
        let identity_file = config.credentials_file.as_deref().map(IdentityFile::beside);
        let identity = identity_file.as_ref().and_then(IdentityFile::load);
        debug!(restored = identity.is_some(), "Session client opened");

        Self {
            config,
            store,
            client,
            identity: RwLock::new(identity),
            identity_file,
        }
    }

    /// Exchange email and password for a credential pair.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity> {
        let request = RequestDescriptor::post(self.config.login_url()?)
            .with_json(&LoginRequest { email, password })?;
        let response = self.client.transport().send(&request).await?;

        if matches!(
            response.status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            warn!(status = %response.status, "Login rejected");
            return Err(AuthError::InvalidCredentials);
        }
        if !response.is_success() {
            return Err(AuthError::UnexpectedStatus {
                status: response.status,
                body: response.text(),
            });
        }

        let (credentials, identity) = response.json::<LoginResponse>()?.into_parts(email)?;
        self.store.set(credentials);
        self.client.terminator().rearm();
        if let Some(file) = &self.identity_file {
            file.save(&identity);
        }
        *self.identity.write() = Some(identity.clone());

        info!(role = %identity.role, "Logged in");
        Ok(identity)
    }

    /// Drop the current session without redirecting.
    pub fn logout(&self) {
        self.store.clear();
        self.identity.write().take();
        if let Some(file) = &self.identity_file {
            file.remove();
        }
        info!("Logged out");
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_some()
    }

    /// Identity from the last login, restored from disk when credentials
    /// are persisted. `None` once the session has ended.
    pub fn identity(&self) -> Option<Identity> {
        if !self.is_authenticated() {
            return None;
        }
        self.identity.read().clone()
    }

    pub fn client(&self) -> &AuthedClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
