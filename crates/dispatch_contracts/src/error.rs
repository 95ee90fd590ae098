use thiserror::Error;

/// Failures while encoding or decoding contract types.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("missing required connection parameter `{0}`")]
    MissingParam(&'static str),
}
