//! Credential and signal-key record shapes.
//!
//! These are opaque payloads to the bridge: the protocol client produces
//! them, the store round-trips them losslessly. CBOR keeps raw key bytes
//! intact without any base64 detour.

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Store key the account credential blob lives under.
pub const CREDS_KEY: &str = "creds";

/// An asymmetric key pair, raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

impl KeyPair {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut public = vec![0u8; 32];
        let mut private = vec![0u8; 32];
        rng.fill_bytes(&mut public);
        rng.fill_bytes(&mut private);
        Self { public, private }
    }
}

/// A pre-key signed by the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPreKey {
    pub key_pair: KeyPair,
    pub signature: Vec<u8>,
    pub key_id: u32,
}

/// Long-lived account credentials.
///
/// Schema evolution happens through `#[serde(default)]` on new fields, so
/// blobs written by older builds keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCreds {
    pub noise_key: KeyPair,
    pub signed_identity_key: KeyPair,
    pub signed_pre_key: SignedPreKey,
    pub registration_id: u32,
    #[serde(default)]
    pub me: Option<AccountIdentity>,
    #[serde(default)]
    pub account_settings: AccountSettings,
}

/// The paired account, once registration completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSettings {
    pub unarchive_chats: bool,
}

/// Fresh credentials for a never-paired session.
pub fn init_auth_creds() -> AuthCreds {
    let identity = KeyPair::generate();
    let pre_key = KeyPair::generate();
    AuthCreds {
        noise_key: KeyPair::generate(),
        signed_identity_key: identity,
        signed_pre_key: SignedPreKey {
            key_pair: pre_key,
            signature: vec![0u8; 64],
            key_id: 1,
        },
        registration_id: rand::thread_rng().next_u32() % 16_384,
        me: None,
        account_settings: AccountSettings::default(),
    }
}

/// Signal-key record categories. Each category is a flat id-to-record map
/// in the underlying store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCategory {
    PreKey,
    Session,
    SenderKey,
    AppStateSyncKey,
    AppStateSyncVersion,
}

impl KeyCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyCategory::PreKey => "pre-key",
            KeyCategory::Session => "session",
            KeyCategory::SenderKey => "sender-key",
            KeyCategory::AppStateSyncKey => "app-state-sync-key",
            KeyCategory::AppStateSyncVersion => "app-state-sync-version",
        }
    }
}

/// Store key for one record within a category.
pub fn record_key(category: KeyCategory, id: &str) -> String {
    format!("{}-{}", category.as_str(), id)
}

/// App-state sync key material, the one category with a typed shape the
/// bridge itself reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStateSyncKeyData {
    pub key_data: Vec<u8>,
    pub fingerprint: Vec<u8>,
    pub timestamp: i64,
}
