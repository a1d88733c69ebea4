//! Symbol Records and the Op Log
//!
//! Domain types for the mirrored symbol universe and the server's
//! incremental change log.
//!
//! # Versioning
//!
//! Every op carries a `ver` assigned by the server. Versions are
//! monotonically non-decreasing across the whole log (not per symbol), and
//! pages of ops arrive ordered by `ver`. The local cursor tracks the highest
//! applied version.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Symbols
// =============================================================================

/// Open document of server-supplied symbol fields.
pub type SymbolDoc = Map<String, Value>;

/// Normalize a ticker: trimmed and upper-cased.
///
/// Returns `None` for blank input.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// One mirrored symbol: normalized ticker plus its field document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    /// Upper-cased ticker.
    pub symbol: String,
    /// Server-supplied fields (includes `symbol`).
    pub fields: SymbolDoc,
}

impl SymbolRecord {
    /// Build a record from a ticker and a field document.
    ///
    /// The `symbol` field of the document is overwritten with the
    /// normalized ticker. Returns `None` if the ticker is blank.
    #[must_use]
    pub fn new(symbol: &str, mut fields: SymbolDoc) -> Option<Self> {
        let symbol = normalize_symbol(symbol)?;
        fields.insert("symbol".to_string(), Value::String(symbol.clone()));
        Some(Self { symbol, fields })
    }

    /// Build a record from a raw snapshot/batch item.
    ///
    /// The ticker is read from `symbol` (or `Symbol`). Items that are not
    /// objects or carry no ticker yield `None`.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(fields) = value else {
            return None;
        };
        let symbol = fields
            .get("symbol")
            .or_else(|| fields.get("Symbol"))
            .and_then(Value::as_str)?
            .to_string();
        Self::new(&symbol, fields)
    }
}

// =============================================================================
// Ops
// =============================================================================

/// Kind of change carried by an op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Create or merge a symbol document.
    Upsert,
    /// Delete a symbol.
    Remove,
    /// Kind this client does not understand.
    #[default]
    #[serde(other)]
    Unknown,
}

/// A single entry of the server's op log.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "upsert", "symbol": "aapl", "doc": {"price": 187.2}, "ver": 1042}
/// {"type": "remove", "symbol": "XYZ", "ver": 1043}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Op {
    /// Upsert or remove.
    #[serde(rename = "type", default)]
    pub kind: OpKind,
    /// Affected ticker (not yet normalized).
    #[serde(default)]
    pub symbol: Option<String>,
    /// Field document for upserts.
    #[serde(default)]
    pub doc: Option<SymbolDoc>,
    /// Server-assigned log version.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub ver: Option<u64>,
}

/// A page of ops returned by `GET /symbols/ops`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpsPage {
    /// Version the page starts after.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub from: Option<u64>,
    /// Highest version in the page.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub to: Option<u64>,
    /// Raw ops; each one is decoded individually so a single bad entry
    /// cannot poison the page.
    #[serde(default)]
    pub ops: Vec<Value>,
    /// Whether the server holds more ops past this page.
    #[serde(default, rename = "hasMore")]
    pub has_more: bool,
}

impl OpsPage {
    /// Whether the page carries no ops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A page split into the mutations it implies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PagePartition {
    /// Symbols to create or merge, in page order.
    pub upserts: Vec<SymbolRecord>,
    /// Tickers to delete, in page order.
    pub removes: Vec<String>,
    /// Highest `ver` observed (never below the starting cursor).
    pub max_ver: u64,
    /// Entries that could not be decoded.
    pub skipped: usize,
}

impl PagePartition {
    /// Partition a page of raw ops, starting from `cursor`.
    ///
    /// An op without a `ver` inherits the running maximum. Malformed ops and
    /// ops missing the data their kind requires are skipped, but their `ver`
    /// still advances the maximum so the cursor moves past them.
    #[must_use]
    pub fn from_ops(ops: &[Value], cursor: u64) -> Self {
        let mut partition = Self {
            max_ver: cursor,
            ..Self::default()
        };

        for raw in ops {
            let op: Op = match serde_json::from_value(raw.clone()) {
                Ok(op) => op,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed op");
                    partition.skipped += 1;
                    continue;
                }
            };

            let ver = op.ver.unwrap_or(partition.max_ver);
            partition.max_ver = partition.max_ver.max(ver);

            match (op.kind, op.symbol.as_deref(), op.doc) {
                (OpKind::Upsert, Some(symbol), Some(doc)) => {
                    match SymbolRecord::new(symbol, doc) {
                        Some(record) => partition.upserts.push(record),
                        None => partition.skipped += 1,
                    }
                }
                (OpKind::Remove, Some(symbol), _) => match normalize_symbol(symbol) {
                    Some(symbol) => partition.removes.push(symbol),
                    None => partition.skipped += 1,
                },
                _ => partition.skipped += 1,
            }
        }

        partition
    }

    /// Whether the page implies no mirror mutation.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.upserts.is_empty() && self.removes.is_empty()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// A page of the full snapshot returned by `GET /symbols/snapshot`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotPage {
    /// Raw symbol items.
    #[serde(default)]
    pub items: Vec<Value>,
    /// Total number of symbols in the snapshot.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub count: Option<u64>,
    /// Op-log version the snapshot is consistent with.
    #[serde(default, rename = "currentCursor", deserialize_with = "lenient_u64")]
    pub current_cursor: Option<u64>,
}

impl SnapshotPage {
    /// Total item count, falling back to the page length.
    #[must_use]
    pub fn total(&self) -> usize {
        self.count.map_or(self.items.len(), |c| {
            usize::try_from(c).unwrap_or(usize::MAX)
        })
    }

    /// Snapshot cursor, 0 when absent.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.current_cursor.unwrap_or(0)
    }
}

// =============================================================================
// Serde Helpers
// =============================================================================

/// Accept a non-negative integer given as a JSON number or numeric string.
///
/// Anything else (null, negative, fractional, garbage) decodes as `None`.
///
/// # Errors
///
/// Only fails if the underlying deserializer cannot produce a JSON value.
pub fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_u64))
}

/// Read a JSON value as a non-negative integer.
#[must_use]
pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    let v = f as u64;
                    v
                })
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
