//! Binary ⇄ text adapter for key-value backends that only keep strings
//! reliably.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rv_core::error::{Result, RvError};

/// Encode a blob as standard base64.
pub fn to_storable(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a blob produced by [`to_storable`].
pub fn from_storable(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| RvError::corrupt(format!("invalid base64: {e}")))
}

/// `#[serde(with = "serde_base64")]` for `Option<Vec<u8>>` fields.
pub mod serde_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&super::to_storable(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| super::from_storable(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
