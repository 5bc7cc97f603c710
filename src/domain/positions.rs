//! Per-instrument signed position maps and open-position records.

use crate::domain::InstrumentId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// `instrument -> signed lots`. Absent instruments are flat.
///
/// BTreeMap keeps iteration (and therefore every report) deterministic.
pub type PositionMap = BTreeMap<InstrumentId, i64>;

/// An excursion still open when the input window ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPosition {
    pub instrument_id: InstrumentId,
    pub signed_quantity: i64,
    /// First real operation of the open excursion, if any.
    pub opened_at: Option<DateTime<Utc>>,
    /// Real operations accumulated since the position last left zero.
    pub operation_count: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PositionParseError {
    #[error("expected INSTRUMENT=QTY, got {0:?}")]
    MissingSeparator(String),
    #[error("empty instrument id in {0:?}")]
    EmptyInstrument(String),
    #[error("invalid quantity in {0:?}")]
    InvalidQuantity(String),
}

/// Parse `FIGI=20,FIGI2=-5` (commas or newlines) into a map.
///
/// Blank entries are skipped; a repeated instrument keeps its last value.
pub fn parse_position_list(input: &str) -> Result<PositionMap, PositionParseError> {
    let mut map = PositionMap::new();
    for entry in input
        .split(|c| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let (id, qty) = entry
            .split_once('=')
            .ok_or_else(|| PositionParseError::MissingSeparator(entry.to_string()))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(PositionParseError::EmptyInstrument(entry.to_string()));
        }
        let qty = qty
            .trim()
            .parse::<i64>()
            .map_err(|_| PositionParseError::InvalidQuantity(entry.to_string()))?;
        map.insert(InstrumentId::new(id), qty);
    }
    Ok(map)
}

/// Signed position for `instrument`, 0 when absent.
pub fn position_of(map: &PositionMap, instrument: &InstrumentId) -> i64 {
    map.get(instrument).copied().unwrap_or(0)
}
