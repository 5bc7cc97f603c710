//! Domain primitives: InstrumentId, OperationKind, Direction.

use serde::{Deserialize, Serialize};

/// Tradable instrument identifier (the broker's FIGI).
///
/// Margin events carry an empty id: they are account-scoped.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        InstrumentId(id.into())
    }

    /// The id used for account-scoped events.
    pub fn none() -> Self {
        InstrumentId(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(value: &str) -> Self {
        InstrumentId::new(value)
    }
}

impl From<String> for InstrumentId {
    fn from(value: String) -> Self {
        InstrumentId(value)
    }
}

/// Closed set of account operation kinds the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Buy,
    Sell,
    Fee,
    MarginCredit,
    MarginDebit,
}

impl OperationKind {
    /// Buy and Sell move the position; everything else is cash only.
    pub fn is_trade(&self) -> bool {
        matches!(self, OperationKind::Buy | OperationKind::Sell)
    }

    pub fn is_margin(&self) -> bool {
        matches!(self, OperationKind::MarginCredit | OperationKind::MarginDebit)
    }

    /// Signed lot multiplier: +1 for Buy, -1 for Sell, 0 for cash events.
    pub fn position_sign(&self) -> i64 {
        match self {
            OperationKind::Buy => 1,
            OperationKind::Sell => -1,
            _ => 0,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationKind::Buy => "buy",
            OperationKind::Sell => "sell",
            OperationKind::Fee => "fee",
            OperationKind::MarginCredit => "marginCredit",
            OperationKind::MarginDebit => "marginDebit",
        };
        write!(f, "{}", s)
    }
}

/// Direction of a completed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Direction implied by the sign of a position; None when flat.
    pub fn from_position(position: i64) -> Option<Self> {
        match position.signum() {
            1 => Some(Direction::Long),
            -1 => Some(Direction::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "Long"),
            Direction::Short => write!(f, "Short"),
        }
    }
}
