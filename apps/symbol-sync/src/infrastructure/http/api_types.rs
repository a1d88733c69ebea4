//! Symbols REST response shapes not covered by the domain types.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::symbol::lenient_u64;

/// `GET /symbols/cursor` body: `{cursor}` or a bare number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CursorResponse {
    /// `{ "cursor": 42 }`
    Wrapped {
        /// Current op-log head.
        #[serde(default, deserialize_with = "lenient_u64")]
        cursor: Option<u64>,
    },
    /// `42`
    Bare(u64),
}

impl CursorResponse {
    /// Cursor value; a missing field reads as 0.
    #[must_use]
    pub fn value(&self) -> u64 {
        match self {
            Self::Wrapped { cursor } => cursor.unwrap_or_default(),
            Self::Bare(cursor) => *cursor,
        }
    }
}

/// `GET /symbols/batch` body: `{items[]}` or a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchResponse {
    /// `{ "items": [...] }`
    Wrapped {
        /// Symbol documents.
        #[serde(default)]
        items: Vec<Value>,
    },
    /// `[...]`
    Bare(Vec<Value>),
}

impl BatchResponse {
    /// Raw symbol documents.
    #[must_use]
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Wrapped { items } | Self::Bare(items) => items,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn cursor_shapes() {
        let wrapped: CursorResponse = serde_json::from_value(json!({"cursor": "17"})).unwrap();
        assert_eq!(wrapped.value(), 17);

        let bare: CursorResponse = serde_json::from_value(json!(9)).unwrap();
        assert_eq!(bare.value(), 9);

        let missing: CursorResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.value(), 0);
    }

    #[test]
    fn batch_shapes() {
        let wrapped: BatchResponse =
            serde_json::from_value(json!({"items": [{"symbol": "AAPL"}]})).unwrap();
        assert_eq!(wrapped.into_items().len(), 1);

        let bare: BatchResponse =
            serde_json::from_value(json!([{"symbol": "A"}, {"symbol": "B"}])).unwrap();
        assert_eq!(bare.into_items().len(), 2);
    }
}
