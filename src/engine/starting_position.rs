//! Starting-position estimation.
//!
//! Two strategies produce a `PositionMap` describing the position held
//! immediately before the first operation of the window:
//! - `from_current_positions`: exact, derived backwards from a broker snapshot
//! - `auto_detect`: a guess from each instrument's first trade
//!
//! `replay_positions` is the forward counterpart used by validation and by
//! period analysis to roll a starting map up to a later instant.

use super::{ReconstructError, MAX_LOTS};
use crate::domain::ordering::sorted_refs;
use crate::domain::{Decimal, InstrumentId, Operation, OperationKind, PositionMap};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Reverse the window from an authoritative snapshot.
///
/// Walks operations newest to oldest: a Buy is undone by subtracting its
/// quantity, a Sell by adding it back. Instruments in the snapshot without
/// operations keep their snapshot value.
pub fn from_current_positions(operations: &[Operation], current: &PositionMap) -> PositionMap {
    let mut positions = current.clone();
    for op in sorted_refs(operations).into_iter().rev() {
        if !op.kind.is_trade() {
            continue;
        }
        *positions.entry(op.instrument_id.clone()).or_insert(0) -= op.signed_quantity();
    }
    positions
}

/// Reject maps holding a position beyond `MAX_LOTS` either way.
pub fn check_positions(positions: &PositionMap) -> Result<(), ReconstructError> {
    match positions
        .iter()
        .find(|(_, position)| position.unsigned_abs() > MAX_LOTS as u64)
    {
        Some((instrument_id, &position)) => Err(ReconstructError::PositionOutOfRange {
            instrument_id: instrument_id.to_string(),
            position,
        }),
        None => Ok(()),
    }
}

/// Heuristic: the first trade of each instrument is assumed to close a
/// pre-existing position of exactly its size.
///
/// First Buy of `q` lots yields `-q`, first Sell yields `+q`. Instruments with
/// no Buy/Sell operations are absent (flat).
pub fn auto_detect(operations: &[Operation]) -> PositionMap {
    let mut positions = PositionMap::new();
    for op in sorted_refs(operations) {
        if !op.kind.is_trade() || positions.contains_key(&op.instrument_id) {
            continue;
        }
        positions.insert(op.instrument_id.clone(), -op.signed_quantity());
    }
    positions
}

/// Forward-replay Buy/Sell operations from `starting`.
///
/// Only operations strictly before `until` are applied when it is given.
pub fn replay_positions(
    operations: &[Operation],
    starting: &PositionMap,
    until: Option<DateTime<Utc>>,
) -> PositionMap {
    let mut positions = starting.clone();
    for op in sorted_refs(operations) {
        if until.is_some_and(|limit| op.timestamp >= limit) {
            break;
        }
        if op.kind.is_trade() {
            *positions.entry(op.instrument_id.clone()).or_insert(0) += op.signed_quantity();
        }
    }
    positions
}

/// One hypothesis about the opening position of an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionScenario {
    pub starting_position: i64,
    /// Position right after the first operation under this hypothesis.
    pub first_operation_result: i64,
    pub crosses_zero: bool,
    pub description: String,
}

/// Diagnostic view of an instrument's first trade and what it implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartingPositionAnalysis {
    pub instrument_id: InstrumentId,
    pub first_operation_id: String,
    pub first_kind: OperationKind,
    pub first_quantity: i64,
    pub first_unit_price: Decimal,
    pub first_amount: Decimal,
    pub first_timestamp: DateTime<Utc>,
    /// Buy/Sell operations for the instrument in the window.
    pub trade_operation_count: usize,
    pub scenarios: Vec<PositionScenario>,
}

/// Enumerate the plausible starting positions for every traded instrument.
///
/// Three scenarios per instrument: flat, exactly closed by the first trade,
/// and twice its size (partially closed).
pub fn analyze_starting_positions(
    operations: &[Operation],
) -> BTreeMap<InstrumentId, StartingPositionAnalysis> {
    let mut by_instrument: BTreeMap<InstrumentId, Vec<&Operation>> = BTreeMap::new();
    for op in sorted_refs(operations) {
        if op.kind.is_trade() {
            by_instrument
                .entry(op.instrument_id.clone())
                .or_default()
                .push(op);
        }
    }

    by_instrument
        .into_iter()
        .filter_map(|(instrument_id, ops)| {
            let first = *ops.first()?;
            let delta = first.signed_quantity();
            let q = first.quantity;
            let side = if delta >= 0 { "short" } else { "long" };

            let scenarios = vec![
                PositionScenario {
                    starting_position: 0,
                    first_operation_result: delta,
                    crosses_zero: false,
                    description: "flat before the window".to_string(),
                },
                PositionScenario {
                    starting_position: -delta,
                    first_operation_result: 0,
                    crosses_zero: true,
                    description: format!("{side} {q} lots, closed by the first operation"),
                },
                PositionScenario {
                    starting_position: -2 * delta,
                    first_operation_result: -delta,
                    crosses_zero: false,
                    description: format!(
                        "{side} {} lots, partially closed by the first operation",
                        2 * q
                    ),
                },
            ];

            let analysis = StartingPositionAnalysis {
                instrument_id: instrument_id.clone(),
                first_operation_id: first.id.clone(),
                first_kind: first.kind,
                first_quantity: q,
                first_unit_price: first.unit_price,
                first_amount: first.amount,
                first_timestamp: first.timestamp,
                trade_operation_count: ops.len(),
                scenarios,
            };
            Some((instrument_id, analysis))
        })
        .collect()
}
