//! Inbound execution item.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One trade execution as submitted by a client.
///
/// Every field is optional on the wire so that a missing field becomes a
/// per-item validation failure instead of rejecting the whole batch at
/// deserialization time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Execution status (see `ExecutionStatus::ALLOWED`).
    #[serde(default)]
    pub status: Option<String>,
    /// Trade direction (`BUY` or `SELL`).
    #[serde(default)]
    pub trade_type: Option<String>,
    /// Routing destination (venue or broker code).
    #[serde(default)]
    pub destination: Option<String>,
    /// Instrument key.
    #[serde(default)]
    pub security_id: Option<String>,
    /// Quantity; must be strictly positive.
    #[serde(default)]
    pub quantity: Option<Decimal>,
    /// Limit price; must be strictly positive when present.
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    /// Client-side reference, unique across stored executions when present.
    #[serde(default)]
    pub external_reference_id: Option<String>,
    /// Optimistic-lock version supplied by the client; defaults to 0.
    #[serde(default)]
    pub version: Option<i32>,
}
