use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from decoding a handshake configuration line.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid handshake record: {0}")]
    Json(#[from] serde_json::Error),
}

/// The record a plugin process emits so its supervisor can locate the
/// auxiliary stdout/stderr relay endpoints.
///
/// The addresses are opaque locators filled in by whatever relay mechanism
/// stands up those endpoints; this type only carries and serializes them.
/// Field names are part of the wire contract and must not change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    pub stdout_addr: String,
    pub stderr_addr: String,
}

impl HandshakeConfig {
    /// Encode the record as a single line: standard base64 over the JSON
    /// serialization. Deterministic for a given value.
    ///
    /// # Panics
    ///
    /// Panics if JSON serialization fails. The shape is fixed and fully
    /// controlled by this crate, so a failure here is a programming defect,
    /// not a runtime condition, and is deliberately not surfaced as a
    /// recoverable error.
    pub fn encode(&self) -> String {
        #[allow(clippy::expect_used)]
        let json = serde_json::to_vec(self).expect("handshake config shape always serializes");
        BASE64.encode(json)
    }

    /// Decode a line previously produced by [`HandshakeConfig::encode`].
    pub fn decode(line: &str) -> Result<Self, HandshakeError> {
        let bytes = BASE64.decode(line.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_is_idempotent() {
        let config = HandshakeConfig {
            stdout_addr: "127.0.0.1:41001".to_string(),
            stderr_addr: "127.0.0.1:41002".to_string(),
        };
        assert_eq!(config.encode(), config.encode());
    }

    #[test]
    fn round_trip_preserves_addresses() {
        let config = HandshakeConfig {
            stdout_addr: "/tmp/plug-stdout.sock".to_string(),
            stderr_addr: "/tmp/plug-stderr.sock".to_string(),
        };
        let decoded = HandshakeConfig::decode(&config.encode()).expect("decodes");
        assert_eq!(decoded, config);
    }

    #[test]
    fn default_encodes_empty_addresses() {
        let decoded = HandshakeConfig::decode(&HandshakeConfig::default().encode()).expect("decodes");
        assert_eq!(decoded.stdout_addr, "");
        assert_eq!(decoded.stderr_addr, "");
    }

    #[test]
    fn field_names_are_stable() {
        let config = HandshakeConfig {
            stdout_addr: "a".to_string(),
            stderr_addr: "b".to_string(),
        };
        let json = serde_json::to_value(&config).expect("serializes");
        assert_eq!(json["stdout_addr"], "a");
        assert_eq!(json["stderr_addr"], "b");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            HandshakeConfig::decode("not//base64!!"),
            Err(HandshakeError::Base64(_))
        ));
        // Valid base64, invalid record.
        let line = BASE64.encode(b"[1,2,3]");
        assert!(matches!(
            HandshakeConfig::decode(&line),
            Err(HandshakeError::Json(_))
        ));
    }

    proptest! {
        #[test]
        fn round_trip_holds_for_arbitrary_addresses(stdout_addr in ".*", stderr_addr in ".*") {
            let config = HandshakeConfig { stdout_addr, stderr_addr };
            let decoded = HandshakeConfig::decode(&config.encode()).expect("decodes");
            prop_assert_eq!(decoded, config);
        }
    }
}
