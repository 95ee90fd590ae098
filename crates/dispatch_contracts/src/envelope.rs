use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// Addressed, opaque message unit exchanged through the broker.
///
/// `payload` holds JSON bytes; an empty payload is allowed for events that
/// carry nothing beyond their routing key and owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub routing_key: String,
    pub owner_id: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Build an envelope, serializing `payload` to JSON.
    pub fn new<T: Serialize>(
        routing_key: impl Into<String>,
        owner_id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, ContractError> {
        let payload = serde_json::to_vec(payload).map_err(ContractError::Encode)?;
        Ok(Self::from_raw(routing_key, owner_id, payload))
    }

    /// Build an envelope around payload bytes that are already encoded.
    pub fn from_raw(
        routing_key: impl Into<String>,
        owner_id: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            owner_id: owner_id.into(),
            payload,
        }
    }

    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, ContractError> {
        serde_json::from_slice(&self.payload).map_err(ContractError::Decode)
    }

    /// Decode the payload as untyped JSON; an empty payload decodes to `null`.
    pub fn payload_json(&self) -> Result<serde_json::Value, ContractError> {
        if self.payload.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        self.decode_payload()
    }
}
