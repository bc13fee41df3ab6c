//! The `{"telegram":"HH HH …"}` JSON envelope shared by broker requests and
//! published telegrams.

use ebus_link::Telegram;
use serde::{Deserialize, Serialize};

use crate::errors::RequestError;

#[derive(Debug, Serialize, Deserialize)]
struct RawEnvelope {
    telegram: String,
}

/// A request to send a telegram, as received from the broker.
#[derive(Debug, Clone)]
pub struct TelegramRequest {
    /// The telegram to submit to the TX engine.
    pub telegram: Telegram,
}

impl TelegramRequest {
    /// Parse a JSON payload of the form `{"telegram":"HH HH …"}`.
    ///
    /// A missing `telegram` key or malformed JSON is reported as
    /// [`RequestError::Malformed`]; unparsable hex octets as
    /// [`RequestError::BadHex`]. Neither case panics — a broker request is
    /// untrusted external input.
    pub fn parse(payload: &str) -> Result<Self, RequestError> {
        let raw: RawEnvelope =
            serde_json::from_str(payload).map_err(|e| RequestError::Malformed(e.to_string()))?;
        let telegram = Telegram::from_hex_string(&raw.telegram).ok_or(RequestError::BadHex)?;
        Ok(Self { telegram })
    }
}

/// A telegram to publish to the broker, wrapped in the same envelope shape.
#[derive(Debug, Clone)]
pub struct TelegramPayload {
    /// The telegram bytes to publish.
    pub telegram: Telegram,
}

impl TelegramPayload {
    /// Wrap a telegram for publication.
    pub fn new(telegram: Telegram) -> Self {
        Self { telegram }
    }

    /// Render as the `{"telegram":"HH HH …"}` JSON envelope.
    pub fn to_json(&self) -> String {
        let raw = RawEnvelope { telegram: self.telegram.to_hex_string() };
        serde_json::to_string(&raw).unwrap_or_else(|_| "{}".to_string())
    }
}
