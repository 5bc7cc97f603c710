//! Period profit: weekly and monthly slices of a window.
//!
//! Every period is reconstructed on its own, starting from the positions
//! replayed up to the period start, so excursions that straddle a boundary are
//! handled the same way as at the edge of any window.

use super::attribution::{attribute_costs, CostPools};
use super::position_tracker::build_trades;
use super::starting_position::replay_positions;
use super::ReconstructConfig;
use crate::domain::{Decimal, Operation, PositionMap};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodProfit {
    pub start: DateTime<Utc>,
    /// Exclusive.
    pub end: DateTime<Utc>,
    pub starting_balance: Decimal,
    pub ending_balance: Decimal,
    /// Σ gross profit of the period's trades.
    pub total_profit: Decimal,
    pub total_fees: Decimal,
    pub net_profit: Decimal,
    /// 0 when the starting balance is not positive.
    pub profit_percentage: Decimal,
    pub trades_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Σ amount of every operation in the period.
    pub cash_flow: Decimal,
}

/// Reconstruct `[from, to)` on its own.
pub fn period_profit(
    operations: &[Operation],
    starting: &PositionMap,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    starting_balance: Decimal,
    config: &ReconstructConfig,
) -> PeriodProfit {
    let period_start_positions = replay_positions(operations, starting, Some(from));
    let period_ops: Vec<Operation> = operations
        .iter()
        .filter(|op| op.timestamp >= from && op.timestamp < to)
        .cloned()
        .collect();

    let tracked = build_trades(&period_ops, &period_start_positions, config);
    let trades = attribute_costs(tracked.trades, &CostPools::from_operations(&period_ops));

    let total_profit: Decimal = trades.iter().map(|t| t.gross_profit).sum();
    let total_fees: Decimal = trades.iter().map(|t| t.fees).sum();
    let net_profit: Decimal = trades.iter().map(|t| t.net_profit).sum();
    let profit_percentage = if starting_balance.is_positive() {
        net_profit / starting_balance * Decimal::hundred()
    } else {
        Decimal::zero()
    };

    PeriodProfit {
        start: from,
        end: to,
        starting_balance,
        ending_balance: starting_balance + net_profit,
        total_profit,
        total_fees,
        net_profit,
        profit_percentage,
        trades_count: trades.len(),
        winning_trades: trades.iter().filter(|t| t.is_winning()).count(),
        losing_trades: trades.iter().filter(|t| t.is_losing()).count(),
        cash_flow: period_ops.iter().map(|op| op.amount).sum(),
    }
}

/// Dispatch on granularity.
pub fn profit_series(
    operations: &[Operation],
    starting: &PositionMap,
    granularity: Granularity,
    starting_balance: Decimal,
    config: &ReconstructConfig,
) -> Vec<PeriodProfit> {
    match granularity {
        Granularity::Week => weekly_profit(operations, starting, starting_balance, config),
        Granularity::Month => monthly_profit(operations, starting, starting_balance, config),
    }
}

/// Weeks starting Monday 00:00 UTC, covering the first to last operation.
pub fn weekly_profit(
    operations: &[Operation],
    starting: &PositionMap,
    starting_balance: Decimal,
    config: &ReconstructConfig,
) -> Vec<PeriodProfit> {
    chained_periods(operations, starting, starting_balance, config, week_start, |start| {
        Some(start + Duration::days(7))
    })
}

/// Calendar months (UTC), covering the first to last operation.
pub fn monthly_profit(
    operations: &[Operation],
    starting: &PositionMap,
    starting_balance: Decimal,
    config: &ReconstructConfig,
) -> Vec<PeriodProfit> {
    chained_periods(operations, starting, starting_balance, config, month_start, next_month)
}

fn chained_periods(
    operations: &[Operation],
    starting: &PositionMap,
    starting_balance: Decimal,
    config: &ReconstructConfig,
    align: impl Fn(DateTime<Utc>) -> Option<DateTime<Utc>>,
    advance: impl Fn(DateTime<Utc>) -> Option<DateTime<Utc>>,
) -> Vec<PeriodProfit> {
    let Some(first) = operations.iter().map(|op| op.timestamp).min() else {
        return Vec::new();
    };
    let Some(last) = operations.iter().map(|op| op.timestamp).max() else {
        return Vec::new();
    };

    let mut periods = Vec::new();
    let mut balance = starting_balance;
    let mut cursor = align(first);

    while let Some(start) = cursor {
        if start > last {
            break;
        }
        let Some(end) = advance(start) else {
            break;
        };
        let period = period_profit(operations, starting, start, end, balance, config);
        balance = period.ending_balance;
        periods.push(period);
        cursor = Some(end);
    }

    periods
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn week_start(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let date = at.date_naive();
    midnight(date - Duration::days(i64::from(date.weekday().num_days_from_monday())))
}

fn month_start(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    midnight(NaiveDate::from_ymd_opt(at.year(), at.month(), 1)?)
}

fn next_month(start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    midnight(NaiveDate::from_ymd_opt(year, month, 1)?)
}
