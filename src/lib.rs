//! WhatsApp bridge for a generic messaging backend.
//!
//! Normalizes chat events from the WhatsApp-side protocol client into a
//! canonical message model, relays them over a websocket to the backend,
//! and renders backend send requests into native protocol calls.
//!
//! Key principles:
//! - NO message history (the bridge relays, it never archives)
//! - Translation is pure; side effects are explicit effect lists
//! - Credentials round-trip losslessly through the store

pub mod bridge;
pub mod storage;
pub mod whatsapp;
