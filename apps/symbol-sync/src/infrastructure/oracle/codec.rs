//! Oracle Frame Codec
//!
//! Decodes inbound text (or binary UTF-8) frames into `InboundFrame`s.
//!
//! Frames are classified by their `type` field, compared case-insensitively.
//! Control characters are stripped before parsing; the server has been seen
//! to pad frames with them.

use std::borrow::Cow;

use serde_json::{Map, Value};

use super::messages::{DoorbellKind, HydrationPayload, InboundFrame, RegisterAck};
use crate::domain::feed::FeedItem;
use crate::domain::symbol::{normalize_symbol, value_as_u64};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame was not valid JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame was JSON but not a usable message.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// Remove control characters, borrowing when there are none.
#[must_use]
pub fn sanitize(text: &str) -> Cow<'_, str> {
    if text.chars().any(char::is_control) {
        Cow::Owned(text.chars().filter(|c| !c.is_control()).collect())
    } else {
        Cow::Borrowed(text)
    }
}

/// JSON codec for oracle frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a binary frame as lossy UTF-8 text.
    ///
    /// # Errors
    ///
    /// Same as [`FrameCodec::decode`].
    pub fn decode_bytes(&self, data: &[u8]) -> Result<InboundFrame, CodecError> {
        self.decode(&String::from_utf8_lossy(data))
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object with a string
    /// `type`, or if a recognized frame is missing its payload.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, CodecError> {
        let clean = sanitize(text);
        let value: Value = serde_json::from_str(clean.trim())?;

        let Value::Object(mut obj) = value else {
            return Err(CodecError::InvalidFormat("expected JSON object".to_string()));
        };

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::InvalidFormat("missing type".to_string()))?
            .to_string();

        let frame = match kind.to_ascii_lowercase().as_str() {
            "ping" => InboundFrame::Ping,
            "register_ack" => {
                let ack: RegisterAck = serde_json::from_value(Value::Object(obj))?;
                InboundFrame::RegisterAck(ack)
            }
            "symbols_upsert" => InboundFrame::SymbolDoorbell {
                kind: DoorbellKind::Upsert,
                cursor: obj.get("cursor").and_then(value_as_u64),
            },
            "symbols_delete" => InboundFrame::SymbolDoorbell {
                kind: DoorbellKind::Delete,
                cursor: obj.get("cursor").and_then(value_as_u64),
            },
            "symbols_invalidate" | "symbols_invalidation" | "symbols_invalidate_universe" => {
                InboundFrame::SymbolInvalidate {
                    items: invalidated_symbols(obj.get("items")),
                    version: obj.remove("version"),
                }
            }
            "hydration_response" => {
                let payload = match obj.remove("payload") {
                    Some(Value::Null) | None => HydrationPayload::default(),
                    Some(payload) => serde_json::from_value(payload)?,
                };
                InboundFrame::HydrationResponse(payload)
            }
            "news_delta" => InboundFrame::NewsDelta(FeedItem::new(take_payload(&mut obj, &kind)?)),
            "filing_delta" => {
                InboundFrame::FilingDelta(FeedItem::new(take_payload(&mut obj, &kind)?))
            }
            "session_update" => match take_payload(&mut obj, &kind)? {
                Value::Object(patch) => InboundFrame::SessionUpdate(patch),
                _ => {
                    return Err(CodecError::InvalidFormat(
                        "session_update payload must be an object".to_string(),
                    ));
                }
            },
            _ => InboundFrame::Unknown { kind },
        };

        Ok(frame)
    }
}

fn take_payload(obj: &mut Map<String, Value>, kind: &str) -> Result<Value, CodecError> {
    match obj.remove("payload") {
        Some(Value::Null) | None => Err(CodecError::InvalidFormat(format!(
            "{kind} frame without payload"
        ))),
        Some(payload) => Ok(payload),
    }
}

/// Tickers named by an invalidation `items` list: strings or `{symbol}`.
fn invalidated_symbols(items: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = items else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(o) => o.get("symbol").and_then(Value::as_str),
            _ => None,
        })
        .filter_map(normalize_symbol)
        .collect()
}
