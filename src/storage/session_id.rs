//! Stable per-installation session identifier.

use super::StoreError;
use rand::RngCore;
use std::path::Path;
use tracing::info;

/// Load the session id from `path`, minting and persisting a fresh one on
/// first run. The id namespaces all stored records, so it must stay stable
/// across restarts.
pub fn persistent_session_id(path: &Path) -> Result<String, StoreError> {
    if path.exists() {
        let id = std::fs::read_to_string(path)?.trim().to_string();
        if !id.is_empty() {
            return Ok(id);
        }
    }

    let mut bytes = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut bytes);
    let id = hex::encode(bytes);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &id)?;
    info!(session = %id, "minted new session id");
    Ok(id)
}
