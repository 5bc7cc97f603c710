//! Consistency checks and diagnostics over a reconstruction.
//!
//! Nothing here fails: mismatches and suspicious trades come back as data so
//! callers can render them without aborting the analysis.

use super::starting_position::replay_positions;
use crate::domain::ordering::sorted_refs;
use crate::domain::{
    position_of, Decimal, Direction, InstrumentId, Operation, OperationKind, PositionMap, Trade,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Net profit below which a trade is flagged.
pub const DEFAULT_LOSS_THRESHOLD: i64 = -10_000;
const HIGH_SEVERITY_LOSS: i64 = -50_000;
const LARGE_GROSS_PROFIT: i64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<String>,
    pub simulated_final_positions: PositionMap,
    /// The snapshot compared against, when one was supplied.
    pub expected_positions: Option<PositionMap>,
}

/// Replay Buy/Sell operations from `starting` and compare with `current`.
///
/// Only instruments present in `current` are compared.
pub fn validate(
    operations: &[Operation],
    starting: &PositionMap,
    current: Option<&PositionMap>,
) -> ValidationReport {
    let simulated = replay_positions(operations, starting, None);

    let issues: Vec<String> = current
        .into_iter()
        .flatten()
        .filter_map(|(id, &expected)| {
            let got = position_of(&simulated, id);
            (got != expected).then(|| format!("instrument {id}: expected {expected}, got {got}"))
        })
        .collect();

    ValidationReport {
        valid: issues.is_empty(),
        issues,
        simulated_final_positions: simulated,
        expected_positions: current.cloned(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProblemSeverity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblematicTrade {
    pub trade: Trade,
    pub reasons: Vec<String>,
    pub severity: ProblemSeverity,
}

/// Flag every trade with `net_profit < threshold`.
pub fn detect_problematic(trades: &[Trade], threshold: Decimal) -> Vec<ProblematicTrade> {
    let large_gross = Decimal::from_i64(LARGE_GROSS_PROFIT);
    let high_loss = Decimal::from_i64(HIGH_SEVERITY_LOSS);

    trades
        .iter()
        .filter(|t| t.net_profit < threshold)
        .map(|trade| {
            let mut reasons = Vec::new();
            match trade.direction {
                Direction::Short if trade.entry_price < trade.exit_price => {
                    reasons.push("direction=Short but entry_price<exit_price".to_string());
                }
                Direction::Long if trade.entry_price > trade.exit_price => {
                    reasons.push("direction=Long but entry_price>exit_price".to_string());
                }
                _ => {}
            }
            if trade.gross_profit.abs() > large_gross {
                reasons.push(format!("|gross_profit| > {LARGE_GROSS_PROFIT}"));
            }
            if reasons.is_empty() {
                reasons.push("unexplained large loss".to_string());
            }

            let severity = if trade.net_profit < high_loss {
                ProblemSeverity::High
            } else {
                ProblemSeverity::Medium
            };

            ProblematicTrade {
                trade: trade.clone(),
                reasons,
                severity,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionEvent {
    Initial,
    Buy,
    Sell,
}

/// One step of an instrument's position audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionHistoryEntry {
    /// None for the initial entry.
    pub timestamp: Option<DateTime<Utc>>,
    pub operation_id: Option<String>,
    pub kind: PositionEvent,
    pub delta: i64,
    pub position: i64,
    pub crosses_zero: bool,
}

/// Per-instrument position trail, each seeded with an `Initial` entry.
pub fn position_history(
    operations: &[Operation],
    starting: &PositionMap,
) -> BTreeMap<InstrumentId, Vec<PositionHistoryEntry>> {
    let initial = |position: i64| PositionHistoryEntry {
        timestamp: None,
        operation_id: None,
        kind: PositionEvent::Initial,
        delta: 0,
        position,
        crosses_zero: false,
    };

    let mut history: BTreeMap<InstrumentId, Vec<PositionHistoryEntry>> = starting
        .iter()
        .map(|(id, &position)| (id.clone(), vec![initial(position)]))
        .collect();

    for op in sorted_refs(operations) {
        let kind = match op.kind {
            OperationKind::Buy => PositionEvent::Buy,
            OperationKind::Sell => PositionEvent::Sell,
            _ => continue,
        };
        let trail = history
            .entry(op.instrument_id.clone())
            .or_insert_with(|| vec![initial(0)]);
        let before = trail.last().map(|e| e.position).unwrap_or(0);
        let delta = op.signed_quantity();
        let after = before + delta;

        trail.push(PositionHistoryEntry {
            timestamp: Some(op.timestamp),
            operation_id: Some(op.id.clone()),
            kind,
            delta,
            position: after,
            crosses_zero: (before > 0 && after <= 0) || (before < 0 && after >= 0),
        });
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_735_725_600 + secs, 0).unwrap()
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn id(s: &str) -> InstrumentId {
        InstrumentId::new(s)
    }

    fn trade(direction: Direction, entry: &str, exit: &str, gross: &str, net: &str) -> Trade {
        let t = ts(0).with_timezone(&FixedOffset::east_opt(0).unwrap());
        Trade {
            trade_id: "trade:test".to_string(),
            instrument_id: id("X"),
            direction,
            entry_time: t,
            exit_time: t,
            quantity: 1,
            entry_price: d(entry),
            exit_price: d(exit),
            gross_profit: d(gross),
            fees: Decimal::zero(),
            margin: Decimal::zero(),
            net_profit: d(net),
            entry_operation_id: "a".to_string(),
            exit_operation_id: "b".to_string(),
        }
    }

    #[test]
    fn test_validate_matches_snapshot() {
        let ops = vec![Operation::sell("s1", ts(0), "X", 20, d("10"))];
        let starting: PositionMap = [(id("X"), 40)].into_iter().collect();
        let current: PositionMap = [(id("X"), 20)].into_iter().collect();
        let report = validate(&ops, &starting, Some(&current));
        assert!(report.valid);
        assert!(report.issues.is_empty());
        assert_eq!(report.simulated_final_positions.get(&id("X")), Some(&20));
    }

    #[test]
    fn test_validate_reports_mismatch() {
        let ops = vec![Operation::buy("b1", ts(0), "X", 5, d("10"))];
        let current: PositionMap = [(id("X"), 3), (id("Y"), 1)].into_iter().collect();
        let report = validate(&ops, &PositionMap::new(), Some(&current));
        assert!(!report.valid);
        assert_eq!(
            report.issues,
            vec![
                "instrument X: expected 3, got 5".to_string(),
                "instrument Y: expected 1, got 0".to_string(),
            ]
        );
    }

    #[test]
    fn test_validate_without_snapshot_is_valid() {
        let report = validate(&[], &PositionMap::new(), None);
        assert!(report.valid);
        assert!(report.expected_positions.is_none());
    }

    #[test]
    fn test_detect_problematic_reasons_and_severity() {
        let trades = vec![
            trade(Direction::Short, "10", "12", "-20000", "-20000"),
            trade(Direction::Long, "10", "12", "-200000", "-200000"),
            trade(Direction::Long, "12", "10", "-60000", "-60000"),
            trade(Direction::Long, "10", "12", "200", "195"),
        ];
        let flagged = detect_problematic(&trades, Decimal::from_i64(DEFAULT_LOSS_THRESHOLD));
        assert_eq!(flagged.len(), 3);

        assert_eq!(flagged[0].reasons, vec!["direction=Short but entry_price<exit_price"]);
        assert_eq!(flagged[0].severity, ProblemSeverity::Medium);

        assert_eq!(flagged[1].reasons, vec!["|gross_profit| > 100000"]);
        assert_eq!(flagged[1].severity, ProblemSeverity::High);

        assert_eq!(flagged[2].reasons, vec!["direction=Long but entry_price>exit_price"]);
        assert_eq!(flagged[2].severity, ProblemSeverity::High);
    }

    #[test]
    fn test_unexplained_loss_is_default_reason() {
        let trades = vec![trade(Direction::Long, "12", "12", "0", "-15000")];
        let flagged = detect_problematic(&trades, Decimal::from_i64(DEFAULT_LOSS_THRESHOLD));
        assert_eq!(flagged[0].reasons, vec!["unexplained large loss"]);
    }

    #[test]
    fn test_position_history_marks_crossings() {
        let ops = vec![
            Operation::buy("b1", ts(0), "X", 10, d("10")),
            Operation::sell("s1", ts(60), "X", 15, d("11")),
            Operation::fee("f1", ts(61), d("1")),
            Operation::buy("b2", ts(120), "X", 5, d("10")),
        ];
        let history = position_history(&ops, &PositionMap::new());
        let trail = &history[&id("X")];

        assert_eq!(trail.len(), 4);
        assert_eq!(trail[0].kind, PositionEvent::Initial);
        assert_eq!(trail[0].timestamp, None);
        let positions: Vec<_> = trail.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![0, 10, -5, 0]);
        let crossings: Vec<_> = trail.iter().map(|e| e.crosses_zero).collect();
        assert_eq!(crossings, vec![false, false, true, true]);
        assert!(!history.contains_key(&InstrumentId::none()));
    }

    #[test]
    fn test_position_history_seeds_from_starting_map() {
        let starting: PositionMap = [(id("Y"), -4)].into_iter().collect();
        let history = position_history(&[], &starting);
        assert_eq!(history[&id("Y")].len(), 1);
        assert_eq!(history[&id("Y")][0].position, -4);
    }
}
