//! Pure computation engine for deterministic trade reconstruction.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub mod attribution;
pub mod classifier;
pub mod periods;
pub mod position_tracker;
pub mod starting_position;
pub mod validator;

pub use attribution::{allocate, attribute_costs, Allocation, CostPools};
pub use classifier::{classify, classify_all, kind_from_raw};
pub use periods::{
    monthly_profit, period_profit, profit_series, weekly_profit, Granularity, PeriodProfit,
};
pub use position_tracker::{
    build_trades, track_instrument, InstrumentOutcome, PositionState, PositionTracker,
    TrackingResult,
};
pub use starting_position::{
    analyze_starting_positions, auto_detect, check_positions, from_current_positions,
    replay_positions,
    PositionScenario, StartingPositionAnalysis,
};
pub use validator::{
    detect_problematic, position_history, validate, PositionEvent, PositionHistoryEntry,
    ProblemSeverity, ProblematicTrade, ValidationReport, DEFAULT_LOSS_THRESHOLD,
};

/// Display shift applied to trade entry/exit times unless configured otherwise.
pub const DEFAULT_DISPLAY_OFFSET_HOURS: i32 = 3;

/// Largest lot count accepted for one operation or one position.
///
/// Running sums stay in `i64` range for any window that fits in memory.
pub const MAX_LOTS: i64 = i32::MAX as i64;

/// Fatal input errors. Everything else is reported as diagnostics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconstructError {
    #[error("operation {id}: unclassified operation kind {kind:?}")]
    UnclassifiedOperation { id: String, kind: String },

    #[error("operation {id}: negative quantity {quantity}")]
    NegativeQuantity { id: String, quantity: i64 },

    #[error("operation {id}: buy/sell without instrument id")]
    MissingInstrument { id: String },

    #[error("operation {id}: quantity {quantity} exceeds {MAX_LOTS} lots")]
    QuantityOutOfRange { id: String, quantity: i64 },

    #[error("instrument {instrument_id}: position {position} exceeds {MAX_LOTS} lots")]
    PositionOutOfRange { instrument_id: String, position: i64 },
}

/// How an operation that overshoots zero is booked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossingMode {
    /// The whole operation closes the old excursion and seeds the new one.
    #[default]
    Literal,
    /// The operation is sliced: `|old position|` lots close, the rest open.
    Split,
}

impl FromStr for CrossingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "literal" => Ok(CrossingMode::Literal),
            "split" => Ok(CrossingMode::Split),
            other => Err(format!("unknown crossing mode {other:?}")),
        }
    }
}

/// What to do with a closed excursion whose real legs are all on one side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OneSidedPolicy {
    /// Emit nothing: a trade needs a real Buy and a real Sell.
    #[default]
    Drop,
    /// Price from the first and last unit price on the one side present.
    Estimate,
}

impl FromStr for OneSidedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(OneSidedPolicy::Drop),
            "estimate" => Ok(OneSidedPolicy::Estimate),
            other => Err(format!("unknown one-sided policy {other:?}")),
        }
    }
}

/// Engine knobs. Cheap to copy into every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconstructConfig {
    /// Applied to `entry_time`/`exit_time` only, never to ordering.
    pub display_offset: FixedOffset,
    pub crossing_mode: CrossingMode,
    pub one_sided: OneSidedPolicy,
}

impl ReconstructConfig {
    /// Offset from whole hours; None outside -23..=23.
    pub fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
        if !(-23..=23).contains(&hours) {
            return None;
        }
        FixedOffset::east_opt(hours * 3600)
    }

    pub fn with_offset_hours(mut self, hours: i32) -> Option<Self> {
        self.display_offset = Self::offset_from_hours(hours)?;
        Some(self)
    }

    pub fn with_crossing_mode(mut self, mode: CrossingMode) -> Self {
        self.crossing_mode = mode;
        self
    }

    pub fn with_one_sided(mut self, policy: OneSidedPolicy) -> Self {
        self.one_sided = policy;
        self
    }
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            display_offset: Self::offset_from_hours(DEFAULT_DISPLAY_OFFSET_HOURS)
                .unwrap_or_else(|| Utc.fix()),
            crossing_mode: CrossingMode::default(),
            one_sided: OneSidedPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReconstructConfig::default();
        assert_eq!(config.display_offset.local_minus_utc(), 3 * 3600);
        assert_eq!(config.crossing_mode, CrossingMode::Literal);
        assert_eq!(config.one_sided, OneSidedPolicy::Drop);
    }

    #[test]
    fn test_offset_bounds() {
        assert!(ReconstructConfig::offset_from_hours(-23).is_some());
        assert!(ReconstructConfig::offset_from_hours(24).is_none());
        let config = ReconstructConfig::default().with_offset_hours(0).unwrap();
        assert_eq!(config.display_offset.local_minus_utc(), 0);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Split".parse::<CrossingMode>(), Ok(CrossingMode::Split));
        assert_eq!(" drop ".parse::<OneSidedPolicy>(), Ok(OneSidedPolicy::Drop));
        assert!("fifo".parse::<CrossingMode>().is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = ReconstructError::UnclassifiedOperation {
            id: "op-9".to_string(),
            kind: "OPERATION_TYPE_COUPON".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation op-9: unclassified operation kind \"OPERATION_TYPE_COUPON\""
        );

        let err = ReconstructError::QuantityOutOfRange {
            id: "op-1".to_string(),
            quantity: MAX_LOTS + 1,
        };
        assert_eq!(
            err.to_string(),
            "operation op-1: quantity 2147483648 exceeds 2147483647 lots"
        );
    }
}
