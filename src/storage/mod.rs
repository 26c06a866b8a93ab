//! Durable session state: credentials, signal keys, session identity.
//!
//! Records are CBOR-encoded (raw key bytes survive without escaping) and
//! kept in SQLite under a per-session namespace.

pub mod auth;
pub mod records;
pub mod session_id;
pub mod store;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub use auth::AuthState;
pub use records::{AuthCreds, KeyCategory};
pub use session_id::persistent_session_id;
pub use store::CredentialStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("record encoding failed: {0}")]
    Encode(String),

    #[error("record decoding failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("credential persistence failed {failures} times in a row")]
    CredsPersistence { failures: u32 },
}

/// Encode a record to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StoreError::Encode(format!("{e:?}")))?;
    Ok(bytes)
}

/// Decode a record from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Decode(format!("{e:?}")))
}
