//! Account operations: the untrusted raw row and the classified record.

use crate::domain::{Decimal, InstrumentId, OperationKind};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// An operation as delivered by a data source, before classification.
///
/// `kind` is the broker's free-form operation type; `payment` is the cash
/// impact with whatever sign convention the source used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOperation {
    /// Broker operation id; empty when the source has none.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub instrument_id: String,
    pub kind: String,
    pub quantity: i64,
    pub price: Decimal,
    pub payment: Decimal,
}

impl RawOperation {
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        instrument_id: impl Into<String>,
        kind: impl Into<String>,
        quantity: i64,
        price: Decimal,
        payment: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            instrument_id: instrument_id.into(),
            kind: kind.into(),
            quantity,
            price,
            payment,
        }
    }

    /// Stable identifier for this row.
    ///
    /// Priority: broker `id` (if present) > hash of deterministic fields.
    pub fn operation_key(&self) -> String {
        let id = self.id.trim();
        if !id.is_empty() {
            return id.to_string();
        }

        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.timestamp.timestamp_micros().to_le_bytes());
        hasher.update(self.instrument_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.kind.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.quantity.to_le_bytes());
        hasher.update(self.price.to_canonical_string());
        hasher.update([0u8]);
        hasher.update(self.payment.to_canonical_string());
        let hash = hasher.finalize();
        format!("hash:{}", hex::encode(&hash[..16]))
    }
}

/// A classified, normalized account operation. Immutable input to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Empty for margin events.
    pub instrument_id: InstrumentId,
    pub kind: OperationKind,
    /// Lots; 0 for Fee and Margin.
    pub quantity: i64,
    /// 0 for Fee and Margin.
    pub unit_price: Decimal,
    /// Signed cash impact: negative for Buy/Fee/MarginDebit, positive for Sell/MarginCredit.
    pub amount: Decimal,
}

impl Operation {
    pub fn buy(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        instrument_id: impl Into<InstrumentId>,
        quantity: i64,
        unit_price: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            instrument_id: instrument_id.into(),
            kind: OperationKind::Buy,
            quantity,
            unit_price,
            amount: -(unit_price * Decimal::from_i64(quantity)),
        }
    }

    pub fn sell(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        instrument_id: impl Into<InstrumentId>,
        quantity: i64,
        unit_price: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            instrument_id: instrument_id.into(),
            kind: OperationKind::Sell,
            quantity,
            unit_price,
            amount: unit_price * Decimal::from_i64(quantity),
        }
    }

    /// Broker fee debit; `amount` is stored negative regardless of the sign given.
    pub fn fee(id: impl Into<String>, timestamp: DateTime<Utc>, amount: Decimal) -> Self {
        Self {
            id: id.into(),
            timestamp,
            instrument_id: InstrumentId::none(),
            kind: OperationKind::Fee,
            quantity: 0,
            unit_price: Decimal::zero(),
            amount: -amount.abs(),
        }
    }

    /// Variation margin; the sign of `amount` picks credit or debit.
    pub fn margin(id: impl Into<String>, timestamp: DateTime<Utc>, amount: Decimal) -> Self {
        let kind = if amount.is_negative() {
            OperationKind::MarginDebit
        } else {
            OperationKind::MarginCredit
        };
        Self {
            id: id.into(),
            timestamp,
            instrument_id: InstrumentId::none(),
            kind,
            quantity: 0,
            unit_price: Decimal::zero(),
            amount,
        }
    }

    /// Attach an instrument to a cash event (fees may carry one).
    pub fn with_instrument(mut self, instrument_id: impl Into<InstrumentId>) -> Self {
        self.instrument_id = instrument_id.into();
        self
    }

    /// +quantity for Buy, -quantity for Sell, 0 otherwise.
    pub fn signed_quantity(&self) -> i64 {
        self.kind.position_sign() * self.quantity
    }
}
