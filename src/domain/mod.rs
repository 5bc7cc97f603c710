//! Domain types and determinism layer for trade reconstruction.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Domain primitives: InstrumentId, OperationKind, Direction
//! - Raw and classified account operations
//! - Completed trades and position maps
//! - Stable operation ordering for deterministic processing

pub mod decimal;
pub mod operation;
pub mod ordering;
pub mod positions;
pub mod primitives;
pub mod trade;

pub use decimal::Decimal;
pub use operation::{Operation, RawOperation};
pub use ordering::OperationOrderingKey;
pub use positions::{
    parse_position_list, position_of, OpenPosition, PositionMap, PositionParseError,
};
pub use primitives::{Direction, InstrumentId, OperationKind};
pub use trade::Trade;
