//! Credential storage.
//!
//! - [`CredentialPair`]: the access/refresh token pair, always held as a unit
//! - [`CredentialStore`]: owner of the current pair
//! - [`MemoryCredentialStore`]: process-lifetime store
//! - [`FileCredentialStore`]: store that survives restarts via a JSON file

mod file;
mod store;
mod types;

pub use file::FileCredentialStore;
pub use store::{CredentialStore, MemoryCredentialStore};
pub use types::CredentialPair;
