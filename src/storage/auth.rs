//! Session authentication state: credentials plus the signal-key interface
//! the protocol client persists through.

use super::records::{
    init_auth_creds, record_key, AppStateSyncKeyData, AuthCreds, KeyCategory, CREDS_KEY,
};
use super::store::CredentialStore;
use super::StoreError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use tracing::{info, warn};

/// Consecutive credential-write failures tolerated before the condition is
/// surfaced as fatal.
const MAX_CREDS_WRITE_FAILURES: u32 = 5;

/// Loaded authentication state for one session.
pub struct AuthState {
    store: CredentialStore,
    creds: RwLock<AuthCreds>,
    write_failures: AtomicU32,
}

impl AuthState {
    /// Load credentials from the store, minting fresh ones for a session
    /// that has never paired.
    pub async fn load(store: CredentialStore) -> Self {
        let creds = match store.read::<AuthCreds>(CREDS_KEY).await {
            Some(creds) => creds,
            None => {
                info!(session = store.session_id(), "no stored credentials, starting unpaired");
                init_auth_creds()
            }
        };
        Self {
            store,
            creds: RwLock::new(creds),
            write_failures: AtomicU32::new(0),
        }
    }

    pub fn creds(&self) -> AuthCreds {
        self.creds.read().unwrap().clone()
    }

    pub fn update_creds(&self, creds: AuthCreds) {
        *self.creds.write().unwrap() = creds;
    }

    /// Persist the current credentials. A single failed write is tolerated
    /// and logged; a run of consecutive failures means the session can no
    /// longer survive a restart and becomes an error.
    pub async fn save_creds(&self) -> Result<(), StoreError> {
        let creds = self.creds();
        match self.store.write(CREDS_KEY, &creds).await {
            Ok(()) => {
                self.write_failures.store(0, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                let failures = self.write_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(failures, error = %e, "credential write failed");
                if failures >= MAX_CREDS_WRITE_FAILURES {
                    Err(StoreError::CredsPersistence { failures })
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Fetch records of one category by bare id.
    pub async fn get_keys(
        &self,
        category: KeyCategory,
        ids: &[String],
    ) -> HashMap<String, Option<Vec<u8>>> {
        let keys: Vec<String> = ids.iter().map(|id| record_key(category, id)).collect();
        let raw = self.store.read_batch::<Vec<u8>>(&keys).await;

        // Map back to bare ids for the caller.
        ids.iter()
            .map(|id| {
                let value = raw.get(&record_key(category, id)).cloned().flatten();
                (id.clone(), value)
            })
            .collect()
    }

    /// Upsert (or, with `None`, delete) records of one category.
    pub async fn set_keys(
        &self,
        category: KeyCategory,
        entries: &HashMap<String, Option<Vec<u8>>>,
    ) -> Result<(), StoreError> {
        let namespaced: HashMap<String, Option<Vec<u8>>> = entries
            .iter()
            .map(|(id, value)| (record_key(category, id), value.clone()))
            .collect();
        self.store.write_batch(&namespaced).await
    }

    /// Typed accessor for app-state sync keys, the one category the bridge
    /// reads structurally.
    pub async fn app_state_sync_key(&self, id: &str) -> Option<AppStateSyncKeyData> {
        self.store
            .read(&record_key(KeyCategory::AppStateSyncKey, id))
            .await
    }

    pub async fn set_app_state_sync_key(
        &self,
        id: &str,
        data: &AppStateSyncKeyData,
    ) -> Result<(), StoreError> {
        self.store
            .write(&record_key(KeyCategory::AppStateSyncKey, id), data)
            .await
    }
}
