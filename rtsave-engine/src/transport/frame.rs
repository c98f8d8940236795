//! Wire frame for the in-process hub.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌───────────┬────────────────┬──────────────┐
//! │ peer_id   │ channel        │ yrs update   │
//! │ 16 bytes  │ len + utf-8    │ len + bytes  │
//! └───────────┴────────────────┴──────────────┘
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SaverError;

/// One yrs update travelling through a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubFrame {
    pub peer_id: Uuid,
    pub channel: String,
    /// yrs v1 update
    pub update: Vec<u8>,
}

impl HubFrame {
    pub fn new(peer_id: Uuid, channel: impl Into<String>, update: Vec<u8>) -> Self {
        Self {
            peer_id,
            channel: channel.into(),
            update,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, SaverError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| SaverError::Realtime(format!("frame encode: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SaverError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| SaverError::Realtime(format!("frame decode: {e}")))?;
        Ok(frame)
    }
}
