use crate::domain::ordering::sorted_refs;
use crate::domain::{
    Decimal, Direction, InstrumentId, OpenPosition, Operation, OperationKind, PositionMap, Trade,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use super::{CrossingMode, OneSidedPolicy, ReconstructConfig};

/// One entry of the open excursion buffer.
///
/// A leg is either a whole real operation, a slice of one (split crossings),
/// or the synthetic opening leg standing in for the starting position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Leg<'a> {
    /// None for the synthetic opening leg.
    operation: Option<&'a Operation>,
    timestamp: DateTime<Utc>,
    kind: OperationKind,
    quantity: i64,
    /// Absolute cash moved by this leg.
    notional: Decimal,
}

impl<'a> Leg<'a> {
    fn real(op: &'a Operation) -> Self {
        Self {
            operation: Some(op),
            timestamp: op.timestamp,
            kind: op.kind,
            quantity: op.quantity,
            notional: op.amount.abs(),
        }
    }

    /// `quantity` lots of `op`, with the cash pro-rated.
    fn slice(op: &'a Operation, quantity: i64) -> Self {
        let notional = if op.quantity == 0 {
            Decimal::zero()
        } else {
            op.amount.abs() * Decimal::from_i64(quantity) / Decimal::from_i64(op.quantity)
        };
        Self {
            operation: Some(op),
            timestamp: op.timestamp,
            kind: op.kind,
            quantity,
            notional,
        }
    }

    /// Zero-priced opening leg placed just before the first real operation.
    fn synthetic(position: i64, first_timestamp: DateTime<Utc>) -> Self {
        Self {
            operation: None,
            timestamp: first_timestamp - Duration::microseconds(1),
            kind: if position > 0 {
                OperationKind::Buy
            } else {
                OperationKind::Sell
            },
            quantity: position.abs(),
            notional: Decimal::zero(),
        }
    }
}

/// Current state of one instrument's position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PositionState<'a> {
    pub instrument_id: InstrumentId,

    /// Positive = long, negative = short, zero = flat.
    pub signed_quantity: i64,

    /// Signed position the current excursion opened from. Non-zero only while
    /// the excursion seeded from the starting position is still open.
    pub opening_position: i64,

    buffer: Vec<Leg<'a>>,
}

impl<'a> PositionState<'a> {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            ..Default::default()
        }
    }

    pub fn is_flat(&self) -> bool {
        self.signed_quantity == 0
    }

    pub fn is_long(&self) -> bool {
        self.signed_quantity > 0
    }

    pub fn is_short(&self) -> bool {
        self.signed_quantity < 0
    }

    /// Real legs accumulated since the position last left zero.
    pub fn real_leg_count(&self) -> usize {
        self.buffer.iter().filter(|l| l.operation.is_some()).count()
    }

    fn first_real_timestamp(&self) -> Option<DateTime<Utc>> {
        self.buffer
            .iter()
            .find(|l| l.operation.is_some())
            .map(|l| l.timestamp)
    }
}

/// Per-instrument excursion state machine.
///
/// Operations must be fed in `(timestamp, id)` order. Cash events are ignored.
pub struct PositionTracker<'a> {
    pub state: PositionState<'a>,
    config: ReconstructConfig,
    /// Starting position still waiting for the first real operation.
    pending_opening: i64,

    trades: Vec<Trade>,
    dropped_excursions: usize,
}

impl<'a> PositionTracker<'a> {
    pub fn new(
        instrument_id: InstrumentId,
        starting_position: i64,
        config: ReconstructConfig,
    ) -> Self {
        let mut state = PositionState::new(instrument_id);
        state.signed_quantity = starting_position;
        state.opening_position = starting_position;
        Self {
            state,
            config,
            pending_opening: starting_position,
            trades: Vec::new(),
            dropped_excursions: 0,
        }
    }

    /// Process a single operation, closing an excursion if it crosses zero.
    pub fn process_operation(&mut self, op: &'a Operation) {
        if !op.kind.is_trade() {
            return;
        }
        self.seed_opening(op.timestamp);

        let old_position = self.state.signed_quantity;
        let new_position = old_position + op.signed_quantity();

        if Self::is_crossing(old_position, new_position) {
            if new_position != 0 && self.config.crossing_mode == CrossingMode::Split {
                self.handle_split_crossing(op, old_position, new_position);
            } else {
                self.handle_crossing(op, new_position);
            }
        } else {
            self.state.buffer.push(Leg::real(op));
        }

        self.state.signed_quantity = new_position;
    }

    /// Long to flat/short, or short to flat/long.
    fn is_crossing(old_position: i64, new_position: i64) -> bool {
        (old_position > 0 && new_position <= 0) || (old_position < 0 && new_position >= 0)
    }

    fn seed_opening(&mut self, first_timestamp: DateTime<Utc>) {
        if self.pending_opening != 0 {
            self.state
                .buffer
                .push(Leg::synthetic(self.pending_opening, first_timestamp));
            self.pending_opening = 0;
        }
    }

    /// The whole operation closes the excursion; on overshoot it also opens
    /// the next one.
    fn handle_crossing(&mut self, op: &'a Operation, new_position: i64) {
        self.state.buffer.push(Leg::real(op));
        self.close_excursion();
        if new_position != 0 {
            self.state.buffer.push(Leg::real(op));
        }
    }

    /// `|old|` lots close the excursion, the remainder opens the next one.
    fn handle_split_crossing(&mut self, op: &'a Operation, old_position: i64, new_position: i64) {
        self.state
            .buffer
            .push(Leg::slice(op, old_position.abs()));
        self.close_excursion();
        self.state
            .buffer
            .push(Leg::slice(op, new_position.abs()));
    }

    fn close_excursion(&mut self) {
        let legs = std::mem::take(&mut self.state.buffer);
        let opening_position = std::mem::replace(&mut self.state.opening_position, 0);

        match finalize_trade(&self.state.instrument_id, opening_position, &legs, &self.config) {
            Some(trade) => self.trades.push(trade),
            None => self.dropped_excursions += 1,
        }
    }

    /// Consume the tracker, returning trades and whatever is left open.
    pub fn into_outcome(self) -> InstrumentOutcome {
        let open_position = if self.state.is_flat() {
            None
        } else {
            Some(OpenPosition {
                instrument_id: self.state.instrument_id.clone(),
                signed_quantity: self.state.signed_quantity,
                opened_at: self.state.first_real_timestamp(),
                operation_count: self.state.real_leg_count(),
            })
        };

        InstrumentOutcome {
            instrument_id: self.state.instrument_id,
            trades: self.trades,
            open_position,
            final_position: self.state.signed_quantity,
            dropped_excursions: self.dropped_excursions,
        }
    }
}

/// Turn a closed excursion into a trade, or None if it is degenerate.
///
/// Direction comes from the opening sign, or from the first real leg when the
/// excursion started flat. Quantity is `|opening|`, or `min(bought, sold)`.
fn finalize_trade(
    instrument_id: &InstrumentId,
    opening_position: i64,
    legs: &[Leg<'_>],
    config: &ReconstructConfig,
) -> Option<Trade> {
    let real: Vec<(&Operation, &Leg<'_>)> = legs
        .iter()
        .filter_map(|leg| leg.operation.map(|op| (op, leg)))
        .collect();
    let (first_op, first_leg) = *real.first()?;
    let (last_op, last_leg) = *real.last()?;

    let side_totals = |kind: OperationKind| {
        real.iter()
            .filter(|(_, leg)| leg.kind == kind)
            .fold((0i64, Decimal::zero()), |(qty, cash), (_, leg)| {
                (qty + leg.quantity, cash + leg.notional)
            })
    };
    let (bought, buy_cash) = side_totals(OperationKind::Buy);
    let (sold, sell_cash) = side_totals(OperationKind::Sell);

    let direction = Direction::from_position(opening_position).unwrap_or(
        if first_leg.kind == OperationKind::Buy {
            Direction::Long
        } else {
            Direction::Short
        },
    );

    let quantity = if opening_position != 0 {
        opening_position.abs()
    } else {
        bought.min(sold)
    };
    if quantity == 0 {
        return None;
    }

    let (entry_price, exit_price) = if bought > 0 && sold > 0 {
        let avg_buy = buy_cash / Decimal::from_i64(bought);
        let avg_sell = sell_cash / Decimal::from_i64(sold);
        match direction {
            Direction::Long => (avg_buy, avg_sell),
            Direction::Short => (avg_sell, avg_buy),
        }
    } else {
        match config.one_sided {
            OneSidedPolicy::Drop => return None,
            OneSidedPolicy::Estimate => (first_op.unit_price, last_op.unit_price),
        }
    };

    let lots = Decimal::from_i64(quantity);
    let gross_profit = match direction {
        Direction::Long => (exit_price - entry_price) * lots,
        Direction::Short => (entry_price - exit_price) * lots,
    };

    Some(Trade {
        trade_id: Trade::compute_trade_id(instrument_id, &first_op.id, &last_op.id),
        instrument_id: instrument_id.clone(),
        direction,
        entry_time: first_leg.timestamp.with_timezone(&config.display_offset),
        exit_time: last_leg.timestamp.with_timezone(&config.display_offset),
        quantity,
        entry_price,
        exit_price,
        gross_profit,
        fees: Decimal::zero(),
        margin: Decimal::zero(),
        net_profit: gross_profit,
        entry_operation_id: first_op.id.clone(),
        exit_operation_id: last_op.id.clone(),
    })
}

/// Everything the tracker learned about one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentOutcome {
    pub instrument_id: InstrumentId,
    pub trades: Vec<Trade>,
    pub open_position: Option<OpenPosition>,
    pub final_position: i64,
    /// Closed excursions that produced no trade.
    pub dropped_excursions: usize,
}

/// Run one instrument's operations (already ordered) through a fresh tracker.
pub fn track_instrument<'a>(
    instrument_id: &InstrumentId,
    operations: &[&'a Operation],
    starting_position: i64,
    config: &ReconstructConfig,
) -> InstrumentOutcome {
    let mut tracker = PositionTracker::new(instrument_id.clone(), starting_position, *config);
    for op in operations {
        tracker.process_operation(op);
    }
    tracker.into_outcome()
}

/// Tracker output across all instruments, before cost attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingResult {
    /// Grouped by instrument in id order, each group in close order.
    pub trades: Vec<Trade>,
    pub open_positions: Vec<OpenPosition>,
    pub final_positions: PositionMap,
    pub dropped_excursions: usize,
}

/// Track every instrument that has Buy/Sell operations or a starting position.
pub fn build_trades(
    operations: &[Operation],
    starting_positions: &PositionMap,
    config: &ReconstructConfig,
) -> TrackingResult {
    let mut by_instrument: BTreeMap<InstrumentId, Vec<&Operation>> = starting_positions
        .keys()
        .map(|id| (id.clone(), Vec::new()))
        .collect();
    for op in sorted_refs(operations) {
        if op.kind.is_trade() {
            by_instrument
                .entry(op.instrument_id.clone())
                .or_default()
                .push(op);
        }
    }

    let mut result = TrackingResult::default();
    for (instrument_id, ops) in &by_instrument {
        let starting = starting_positions.get(instrument_id).copied().unwrap_or(0);
        let outcome = track_instrument(instrument_id, ops, starting, config);

        result.trades.extend(outcome.trades);
        result.open_positions.extend(outcome.open_position);
        result
            .final_positions
            .insert(outcome.instrument_id, outcome.final_position);
        result.dropped_excursions += outcome.dropped_excursions;
    }
    result
}
