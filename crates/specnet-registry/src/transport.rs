//! Router message encode/decode helpers.
//!
//! Messages are serialized with bincode (`config::standard()`), the framing
//! the transport layer puts on the wire between nodes and the router.

use serde::de::DeserializeOwned;
use serde::Serialize;

use specnet_types::protocol::{RouterRequest, RouterResponse};

use crate::error::{RegistryError, Result};

fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(msg, bincode::config::standard())
        .map_err(|e| RegistryError::Serialization(e.to_string()))
}

/// Trailing bytes after a complete message are rejected.
fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    let (msg, read) = bincode::serde::decode_from_slice(data, bincode::config::standard())
        .map_err(|e| RegistryError::Serialization(e.to_string()))?;
    if read != data.len() {
        return Err(RegistryError::Serialization(format!(
            "{} trailing bytes after message",
            data.len() - read
        )));
    }
    Ok(msg)
}

pub fn encode_request(msg: &RouterRequest) -> Result<Vec<u8>> {
    encode(msg)
}

pub fn decode_request(data: &[u8]) -> Result<RouterRequest> {
    decode(data)
}

pub fn encode_response(msg: &RouterResponse) -> Result<Vec<u8>> {
    encode(msg)
}

pub fn decode_response(data: &[u8]) -> Result<RouterResponse> {
    decode(data)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
