use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::ContractError;

/// Message exchanged over a participant's live session, in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SessionMessage {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn to_text(&self) -> Result<String, ContractError> {
        serde_json::to_string(self).map_err(ContractError::Encode)
    }

    pub fn from_text(text: &str) -> Result<Self, ContractError> {
        serde_json::from_str(text).map_err(ContractError::Decode)
    }
}

/// Identity a participant presents when its session is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub participant_id: String,
    pub package_slug: Option<String>,
}

impl SessionParams {
    pub const PARTICIPANT_ID: &'static str = "participant_id";
    pub const PACKAGE_SLUG: &'static str = "package_slug";

    /// Parse `participant_id` and `package_slug` from a URL query string.
    /// A leading `?` is accepted. Empty values count as missing.
    pub fn from_query(query: &str) -> Result<Self, ContractError> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut participant_id = None;
        let mut package_slug = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            if key == Self::PARTICIPANT_ID {
                participant_id = Some(value.into_owned());
            } else if key == Self::PACKAGE_SLUG {
                package_slug = Some(value.into_owned());
            }
        }
        let participant_id =
            participant_id.ok_or(ContractError::MissingParam(Self::PARTICIPANT_ID))?;
        Ok(Self {
            participant_id,
            package_slug,
        })
    }

    /// Package slug, required for driver sessions.
    pub fn require_package(&self) -> Result<&str, ContractError> {
        self.package_slug
            .as_deref()
            .ok_or(ContractError::MissingParam(Self::PACKAGE_SLUG))
    }
}
