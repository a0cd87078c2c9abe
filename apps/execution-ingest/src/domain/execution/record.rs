//! Validated and persisted execution records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::{ExecutionStatus, TradeType};
use crate::domain::shared::{ExecutionId, Timestamp};

/// An execution that passed validation and is ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExecution {
    /// Execution status.
    pub status: ExecutionStatus,
    /// Trade direction.
    pub trade_type: TradeType,
    /// Routing destination.
    pub destination: String,
    /// Instrument key.
    pub security_id: String,
    /// Quantity (> 0).
    pub quantity: Decimal,
    /// Limit price (> 0 when present).
    pub limit_price: Option<Decimal>,
    /// Client-side reference.
    pub external_reference_id: Option<String>,
    /// Optimistic-lock version.
    pub version: i32,
    /// Set when the item passed validation.
    pub received_at: Timestamp,
}

/// A stored execution row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedExecution {
    /// Server-assigned identity.
    pub id: ExecutionId,
    /// Execution status.
    pub status: ExecutionStatus,
    /// Trade direction.
    pub trade_type: TradeType,
    /// Routing destination.
    pub destination: String,
    /// Instrument key.
    pub security_id: String,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price.
    pub limit_price: Option<Decimal>,
    /// Client-side reference.
    pub external_reference_id: Option<String>,
    /// When the item passed validation.
    pub received_at: Timestamp,
    /// When the record was published downstream; `None` until then.
    pub sent_at: Option<Timestamp>,
    /// Filled quantity, zero at creation.
    pub quantity_filled: Decimal,
    /// Average fill price, zero at creation.
    pub average_price: Decimal,
    /// Optimistic-lock version; incremented by every later update.
    pub version: i32,
}

impl PersistedExecution {
    /// Materialize a stored row from a validated record and its identity.
    #[must_use]
    pub fn from_new(id: ExecutionId, record: NewExecution) -> Self {
        Self {
            id,
            status: record.status,
            trade_type: record.trade_type,
            destination: record.destination,
            security_id: record.security_id,
            quantity: record.quantity,
            limit_price: record.limit_price,
            external_reference_id: record.external_reference_id,
            received_at: record.received_at,
            sent_at: None,
            quantity_filled: Decimal::ZERO,
            average_price: Decimal::ZERO,
            version: record.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn from_new_initializes_fill_state() {
        let record = NewExecution {
            status: ExecutionStatus::New,
            trade_type: TradeType::Buy,
            destination: "NYSE".to_string(),
            security_id: "AAPL".to_string(),
            quantity: dec!(100),
            limit_price: Some(dec!(187.25)),
            external_reference_id: Some("ext-1".to_string()),
            version: 0,
            received_at: Timestamp::now(),
        };

        let persisted = PersistedExecution::from_new(ExecutionId::new(42), record.clone());

        assert_eq!(persisted.id, ExecutionId::new(42));
        assert_eq!(persisted.quantity, record.quantity);
        assert_eq!(persisted.quantity_filled, Decimal::ZERO);
        assert_eq!(persisted.average_price, Decimal::ZERO);
        assert!(persisted.sent_at.is_none());
        assert_eq!(persisted.received_at, record.received_at);
    }
}
