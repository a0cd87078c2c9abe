//! Event DTOs
//!
//! Payloads written to the event stream.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::execution::{ExecutionStatus, PersistedExecution, TradeType};
use crate::domain::shared::{ExecutionId, Timestamp};

/// Execution event published after a record is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    /// Execution id; also the record key.
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
    /// When the event was handed to the stream; null in dead-letter
    /// payloads, which were never accepted.
    pub sent_at: Option<Timestamp>,
    /// Filled quantity.
    pub quantity_filled: Decimal,
    /// Average fill price.
    pub average_price: Decimal,
    /// Optimistic-lock version.
    pub version: i32,
}

impl ExecutionEvent {
    /// Build the event for a stored record, stamping `sent_at`.
    #[must_use]
    pub fn from_record(record: &PersistedExecution, sent_at: Timestamp) -> Self {
        Self {
            sent_at: Some(sent_at),
            ..Self::unsent(record)
        }
    }

    /// Build the event body as stored, with the record's own `sent_at`.
    #[must_use]
    pub fn unsent(record: &PersistedExecution) -> Self {
        Self {
            id: record.id,
            status: record.status,
            trade_type: record.trade_type,
            destination: record.destination.clone(),
            security_id: record.security_id.clone(),
            quantity: record.quantity,
            limit_price: record.limit_price,
            external_reference_id: record.external_reference_id.clone(),
            received_at: record.received_at,
            sent_at: record.sent_at,
            quantity_filled: record.quantity_filled,
            average_price: record.average_price,
            version: record.version,
        }
    }

    /// Record key on the stream.
    #[must_use]
    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Envelope emitted to the dead-letter destination when publication fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    /// Execution that failed to publish.
    pub execution_id: ExecutionId,
    /// Payload that was being sent.
    pub original_payload: String,
    /// Last error.
    pub failure_reason: String,
    /// When the record was dead-lettered.
    pub failed_at: Timestamp,
    /// Destination the payload was meant for.
    pub origin_destination: String,
    /// Send attempts made.
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::NewExecution;
    use rust_decimal_macros::dec;

    fn record() -> PersistedExecution {
        PersistedExecution::from_new(
            ExecutionId::new(12),
            NewExecution {
                status: ExecutionStatus::Filled,
                trade_type: TradeType::Sell,
                destination: "ARCA".to_string(),
                security_id: "MSFT".to_string(),
                quantity: dec!(25),
                limit_price: None,
                external_reference_id: None,
                version: 1,
                received_at: Timestamp::now(),
            },
        )
    }

    #[test]
    fn event_carries_record_fields_and_sent_at() {
        let sent_at = Timestamp::now();
        let event = ExecutionEvent::from_record(&record(), sent_at);

        assert_eq!(event.key(), "12");
        assert_eq!(event.sent_at, Some(sent_at));
        assert_eq!(event.trade_type, TradeType::Sell);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], 12);
        assert_eq!(json["tradeType"], "SELL");
        assert!(json["sentAt"].is_string());
    }

    #[test]
    fn unsent_event_has_null_sent_at() {
        let event = ExecutionEvent::unsent(&record());

        assert_eq!(event.sent_at, None);
        let json = serde_json::to_value(&event).unwrap();
        assert!(json["sentAt"].is_null());
        assert_eq!(json["securityId"], "MSFT");
    }
}
