//! Completed trade: one closed excursion with its attributed costs.

use crate::domain::{Decimal, Direction, InstrumentId};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// The reconstructed unit of P&L.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub trade_id: String,
    pub instrument_id: InstrumentId,
    pub direction: Direction,
    /// Display-shifted; never the synthetic opening timestamp.
    pub entry_time: DateTime<FixedOffset>,
    pub exit_time: DateTime<FixedOffset>,
    /// Lots closed. Always > 0.
    pub quantity: i64,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub gross_profit: Decimal,
    pub fees: Decimal,
    pub margin: Decimal,
    /// gross_profit - fees + margin
    pub net_profit: Decimal,
    pub entry_operation_id: String,
    pub exit_operation_id: String,
}

impl Trade {
    /// Stable trade identifier derived from the instrument and the ids of the
    /// first and last real operation of the excursion.
    pub fn compute_trade_id(
        instrument_id: &InstrumentId,
        entry_operation_id: &str,
        exit_operation_id: &str,
    ) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(instrument_id.as_str());
        hasher.update([0u8]);
        hasher.update(entry_operation_id);
        hasher.update([0u8]);
        hasher.update(exit_operation_id);
        let hash = hasher.finalize();
        format!("trade:{}", hex::encode(&hash[..12]))
    }

    /// Record attributed fees and margin and recompute `net_profit`.
    pub fn apply_costs(&mut self, fees: Decimal, margin: Decimal) {
        self.fees = fees;
        self.margin = margin;
        self.net_profit = self.gross_profit - fees + margin;
    }

    pub fn is_winning(&self) -> bool {
        self.net_profit.is_positive()
    }

    pub fn is_losing(&self) -> bool {
        self.net_profit.is_negative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn sample() -> Trade {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        let t = tz.timestamp_opt(1_735_725_600, 0).unwrap();
        Trade {
            trade_id: Trade::compute_trade_id(&InstrumentId::new("FIGI001"), "b1", "s1"),
            instrument_id: InstrumentId::new("FIGI001"),
            direction: Direction::Long,
            entry_time: t,
            exit_time: t,
            quantity: 100,
            entry_price: d("10"),
            exit_price: d("12"),
            gross_profit: d("200"),
            fees: Decimal::zero(),
            margin: Decimal::zero(),
            net_profit: d("200"),
            entry_operation_id: "b1".to_string(),
            exit_operation_id: "s1".to_string(),
        }
    }

    #[test]
    fn test_apply_costs_recomputes_net() {
        let mut trade = sample();
        trade.apply_costs(d("5"), d("-15.5"));
        assert_eq!(trade.net_profit, d("179.5"));
        assert!(trade.is_winning());
        assert!(!trade.is_losing());
    }

    #[test]
    fn test_trade_id_is_stable_and_distinct() {
        let id = InstrumentId::new("FIGI001");
        let a = Trade::compute_trade_id(&id, "b1", "s1");
        assert_eq!(a, Trade::compute_trade_id(&id, "b1", "s1"));
        assert_ne!(a, Trade::compute_trade_id(&id, "s1", "b2"));
        assert!(a.starts_with("trade:"));
        assert_eq!(a.len(), 6 + 24);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["instrumentId"], "FIGI001");
        assert_eq!(json["direction"], "long");
        assert_eq!(json["entryTime"], "2025-01-01T13:00:00+03:00");
    }
}
