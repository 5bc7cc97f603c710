//! Window-level cost attribution.
//!
//! Fees and variation margin are pooled over the whole window and split across
//! all closed trades in one pass. Shares are computed from fixed pool totals;
//! the last trade takes the remainder so the pools are preserved exactly.

use crate::domain::{Decimal, Operation, OperationKind, Trade};
use serde::Serialize;

/// Cash pools collected from a window's Fee and Margin operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostPools {
    /// Σ |Fee.amount|, always >= 0.
    pub fee_pool: Decimal,
    /// Σ MarginCredit.amount + Σ MarginDebit.amount (signed).
    pub margin_pool: Decimal,
    pub fee_operations: usize,
    pub margin_operations: usize,
}

impl CostPools {
    pub fn from_operations(operations: &[Operation]) -> Self {
        operations
            .iter()
            .fold(CostPools::default(), |mut pools, op| {
                match op.kind {
                    OperationKind::Fee => {
                        pools.fee_pool += op.amount.abs();
                        pools.fee_operations += 1;
                    }
                    OperationKind::MarginCredit | OperationKind::MarginDebit => {
                        pools.margin_pool += op.amount;
                        pools.margin_operations += 1;
                    }
                    OperationKind::Buy | OperationKind::Sell => {}
                }
                pools
            })
    }

    pub fn is_empty(&self) -> bool {
        self.fee_pool.is_zero() && self.margin_pool.is_zero()
    }
}

/// Costs assigned to one trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Allocation {
    pub fees: Decimal,
    pub margin: Decimal,
}

/// Split `pools` across trades with the given gross profits.
///
/// Fees go by `|gross|` share (evenly if every gross is zero); margin is split
/// evenly. Returns one allocation per input, empty for no trades.
pub fn allocate(gross_profits: &[Decimal], pools: &CostPools) -> Vec<Allocation> {
    let count = gross_profits.len();
    if count == 0 {
        return Vec::new();
    }

    let total_abs_gross: Decimal = gross_profits.iter().map(Decimal::abs).sum();
    let trade_count = Decimal::from_i64(count as i64);

    let mut allocations = Vec::with_capacity(count);
    let mut fees_left = pools.fee_pool;
    let mut margin_left = pools.margin_pool;

    for (i, gross) in gross_profits.iter().enumerate() {
        if i + 1 == count {
            allocations.push(Allocation {
                fees: fees_left,
                margin: margin_left,
            });
            break;
        }

        let fees = if total_abs_gross.is_zero() {
            pools.fee_pool / trade_count
        } else {
            pools.fee_pool * gross.abs() / total_abs_gross
        };
        let margin = pools.margin_pool / trade_count;

        fees_left -= fees;
        margin_left -= margin;
        allocations.push(Allocation { fees, margin });
    }

    allocations
}

/// Globally order trades by close time, then apply the pool allocation.
///
/// Ties on `exit_time` resolve by instrument, then entry time, then id.
pub fn attribute_costs(mut trades: Vec<Trade>, pools: &CostPools) -> Vec<Trade> {
    trades.sort_by(|a, b| {
        a.exit_time
            .cmp(&b.exit_time)
            .then_with(|| a.instrument_id.cmp(&b.instrument_id))
            .then_with(|| a.entry_time.cmp(&b.entry_time))
            .then_with(|| a.trade_id.cmp(&b.trade_id))
    });

    let gross: Vec<Decimal> = trades.iter().map(|t| t.gross_profit).collect();
    for (trade, allocation) in trades.iter_mut().zip(allocate(&gross, pools)) {
        trade.apply_costs(allocation.fees, allocation.margin);
    }
    trades
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn pools(fee: &str, margin: &str) -> CostPools {
        CostPools {
            fee_pool: d(fee),
            margin_pool: d(margin),
            fee_operations: 1,
            margin_operations: 1,
        }
    }

    #[test]
    fn test_pools_from_operations() {
        let t = Utc.timestamp_opt(1_735_725_600, 0).unwrap();
        let ops = vec![
            Operation::fee("f1", t, d("5")),
            Operation::fee("f2", t, d("-2.5")),
            Operation::margin("m1", t, d("902.59")),
            Operation::margin("m2", t, d("-234.10")),
            Operation::buy("b1", t, "X", 1, d("10")),
        ];
        let pools = CostPools::from_operations(&ops);
        assert_eq!(pools.fee_pool, d("7.5"));
        assert_eq!(pools.margin_pool, d("668.49"));
        assert_eq!(pools.fee_operations, 2);
        assert_eq!(pools.margin_operations, 2);
    }

    #[test]
    fn test_single_trade_takes_everything() {
        let allocations = allocate(&[d("200")], &pools("5", "-3"));
        assert_eq!(allocations, vec![Allocation { fees: d("5"), margin: d("-3") }]);
    }

    #[test]
    fn test_fees_follow_absolute_gross_share() {
        let allocations = allocate(&[d("300"), d("-100")], &pools("8", "10"));
        assert_eq!(allocations[0].fees, d("6"));
        assert_eq!(allocations[1].fees, d("2"));
        assert_eq!(allocations[0].margin, d("5"));
        assert_eq!(allocations[1].margin, d("5"));
    }

    #[test]
    fn test_all_zero_gross_splits_evenly() {
        let allocations = allocate(&[d("0"), d("0")], &pools("3", "0"));
        assert_eq!(allocations[0].fees, d("1.5"));
        assert_eq!(allocations[1].fees, d("1.5"));
    }

    #[test]
    fn test_remainder_keeps_pool_exact() {
        let gross = vec![d("1"), d("1"), d("1")];
        let pools = pools("10", "-0.01");
        let allocations = allocate(&gross, &pools);
        let fees: Decimal = allocations.iter().map(|a| a.fees).sum();
        let margin: Decimal = allocations.iter().map(|a| a.margin).sum();
        assert_eq!(fees, pools.fee_pool);
        assert_eq!(margin, pools.margin_pool);
    }

    #[test]
    fn test_no_trades_no_allocations() {
        assert!(allocate(&[], &pools("5", "5")).is_empty());
    }
}
