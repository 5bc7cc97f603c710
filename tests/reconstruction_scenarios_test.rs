use chrono::{DateTime, Duration, TimeZone, Utc};
use tradebook::engine::{auto_detect, from_current_positions, validate, OneSidedPolicy};
use tradebook::{
    CrossingMode, Decimal, Direction, InstrumentId, Operation, PositionMap, ReconstructConfig,
    Reconstructor, StartingPositions,
};

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 7, 0, 0).unwrap()
}

fn at(minutes: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(minutes)
}

fn buy(id: &str, minutes: i64, instrument: &str, qty: i64, px: &str) -> Operation {
    Operation::buy(id, at(minutes), instrument, qty, d(px))
}

fn sell(id: &str, minutes: i64, instrument: &str, qty: i64, px: &str) -> Operation {
    Operation::sell(id, at(minutes), instrument, qty, d(px))
}

fn positions(entries: &[(&str, i64)]) -> PositionMap {
    entries
        .iter()
        .map(|(id, qty)| (InstrumentId::new(*id), *qty))
        .collect()
}

fn reconstructor() -> Reconstructor {
    Reconstructor::new(ReconstructConfig::default())
}

#[test]
fn scenario_a_simple_long_with_fee() {
    let ops = vec![
        buy("b1", 0, "X", 100, "10.00"),
        sell("s1", 60, "X", 100, "12.00"),
        Operation::fee("f1", at(61), d("5.00")),
    ];

    let result = reconstructor().reconstruct(&ops, StartingPositions::flat(), None);

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.direction, Direction::Long);
    assert_eq!(trade.quantity, 100);
    assert_eq!(trade.gross_profit, d("200"));
    assert_eq!(trade.fees, d("5"));
    assert_eq!(trade.net_profit, d("195"));
    assert_eq!(result.total_net_profit, d("195"));
}

#[test]
fn scenario_b_simple_short() {
    let ops = vec![
        sell("s1", 0, "X", 100, "12.00"),
        buy("b1", 60, "X", 100, "10.00"),
    ];

    let trades = reconstructor().trades(&ops, &PositionMap::new());

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].direction, Direction::Short);
    assert_eq!(trades[0].entry_price, d("12"));
    assert_eq!(trades[0].exit_price, d("10"));
    assert_eq!(trades[0].gross_profit, d("200"));
}

fn flip_ops() -> Vec<Operation> {
    vec![
        buy("b1", 0, "X", 100, "10"),
        sell("s1", 60, "X", 150, "12"),
        buy("b2", 120, "X", 50, "11"),
    ]
}

#[test]
fn scenario_c_zero_crossing_flip_literal() {
    let trades = reconstructor().trades(&flip_ops(), &PositionMap::new());

    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].direction, Direction::Long);
    assert_eq!(trades[0].quantity, 100);
    assert_eq!(trades[0].gross_profit, d("200"));
    assert_eq!(trades[0].exit_operation_id, "s1");

    // The overshooting sell opens the short it belongs to.
    assert_eq!(trades[1].direction, Direction::Short);
    assert_eq!(trades[1].quantity, 50);
    assert_eq!(trades[1].entry_operation_id, "s1");
    assert_eq!(trades[1].exit_operation_id, "b2");
    assert_eq!(trades[1].gross_profit, d("50"));
}

#[test]
fn scenario_c_zero_crossing_flip_split() {
    let config = ReconstructConfig::default().with_crossing_mode(CrossingMode::Split);
    let trades = Reconstructor::new(config).trades(&flip_ops(), &PositionMap::new());

    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].quantity, 100);
    assert_eq!(trades[0].exit_price, d("12"));
    assert_eq!(trades[1].quantity, 50);
    assert_eq!(trades[1].entry_price, d("12"));
    assert_eq!(trades[1].gross_profit, d("50"));
}

#[test]
fn flip_without_close_leaves_open_short() {
    let ops = vec![buy("b1", 0, "X", 100, "10"), sell("s1", 60, "X", 150, "12")];

    let result = reconstructor().reconstruct(&ops, StartingPositions::flat(), None);

    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.open_positions.len(), 1);
    assert_eq!(result.open_positions[0].signed_quantity, -50);
    assert_eq!(result.open_positions[0].opened_at, Some(at(60)));
}

#[test]
fn scenario_d_authoritative_starting_position() {
    let ops = vec![sell("s1", 0, "X", 20, "100")];
    let current = positions(&[("X", 20)]);

    let starting = from_current_positions(&ops, &current);
    assert_eq!(starting, positions(&[("X", 40)]));

    let result = reconstructor().reconstruct(
        &ops,
        StartingPositions::FromSnapshot(current.clone()),
        None,
    );
    assert_eq!(result.starting_positions, positions(&[("X", 40)]));
    assert!(result.trades.is_empty());
    assert_eq!(result.open_positions[0].signed_quantity, 20);
    assert!(result.validation.map(|v| v.valid).unwrap_or(false));
}

#[test]
fn scenario_e_empty_input() {
    let result = reconstructor().reconstruct(&[], StartingPositions::AutoDetect, None);

    assert!(result.trades.is_empty());
    assert_eq!(result.total_net_profit, Decimal::zero());
    assert!(result.starting_positions.is_empty());
    assert!(result.open_positions.is_empty());
    assert!(result.validation.is_none());
}

#[test]
fn auto_detect_uses_first_trade_per_instrument() {
    let ops = vec![
        buy("b1", 30, "X", 3, "10"),
        sell("s1", 10, "Y", 5, "20"),
        sell("s2", 40, "X", 7, "10"),
        Operation::fee("f1", at(0), d("1")),
    ];

    assert_eq!(auto_detect(&ops), positions(&[("X", -3), ("Y", 5)]));

    let (trades, starting) = reconstructor()
        .trades_with_starting_positions(&ops, StartingPositions::AutoDetect);
    assert_eq!(starting, positions(&[("X", -3), ("Y", 5)]));
    // Both first trades only close an unseen position.
    assert!(trades.is_empty());
}

#[test]
fn one_sided_close_of_starting_position_estimate_mode() {
    let ops = vec![sell("s1", 5, "X", 10, "50")];
    let config = ReconstructConfig::default().with_one_sided(OneSidedPolicy::Estimate);

    let trades = Reconstructor::new(config).trades(&ops, &positions(&[("X", 10)]));

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].direction, Direction::Long);
    assert_eq!(trades[0].quantity, 10);
    // Never the synthetic opening time.
    assert_eq!(trades[0].entry_time, at(5));
    assert_eq!(trades[0].exit_time, at(5));

    let dropped = reconstructor().report(
        &ops,
        StartingPositions::Explicit(positions(&[("X", 10)])),
        None,
    );
    assert!(dropped.reconstruction.trades.is_empty());
    assert_eq!(dropped.summary.dropped_excursions, 1);
}

#[test]
fn attribution_preserves_pools_across_instruments() {
    let ops = vec![
        buy("b1", 0, "X", 10, "100"),
        sell("s1", 10, "X", 10, "120"),
        sell("s2", 20, "Y", 5, "50"),
        buy("b2", 30, "Y", 5, "70"),
        Operation::fee("f1", at(11), d("20")),
        Operation::fee("f2", at(31), d("10")),
        Operation::margin("m1", at(40), d("10")),
        Operation::margin("m2", at(41), d("-4")),
    ];

    let result = reconstructor().reconstruct(&ops, StartingPositions::flat(), None);

    assert_eq!(result.trades.len(), 2);
    assert_eq!(result.trades[0].instrument_id, InstrumentId::new("X"));
    assert_eq!(result.trades[0].gross_profit, d("200"));
    assert_eq!(result.trades[1].gross_profit, d("-100"));

    assert_eq!(result.trades[0].fees, d("20"));
    assert_eq!(result.trades[1].fees, d("10"));
    assert_eq!(result.trades[0].margin, d("3"));
    assert_eq!(result.trades[1].margin, d("3"));

    let fees: Decimal = result.trades.iter().map(|t| t.fees).sum();
    let margin: Decimal = result.trades.iter().map(|t| t.margin).sum();
    assert_eq!(fees, d("30"));
    assert_eq!(margin, d("6"));
    assert_eq!(result.total_net_profit, d("76"));
}

#[test]
fn unsorted_input_gives_same_trades() {
    let mut ops = flip_ops();
    let sorted = reconstructor().trades(&ops, &PositionMap::new());
    ops.reverse();
    let reversed = reconstructor().trades(&ops, &PositionMap::new());
    assert_eq!(sorted, reversed);
}

#[test]
fn validation_reports_mismatch() {
    let ops = vec![buy("b1", 0, "X", 3, "10")];
    let report = validate(&ops, &PositionMap::new(), Some(&positions(&[("X", 5)])));

    assert!(!report.valid);
    assert_eq!(report.issues, vec!["instrument X: expected 5, got 3".to_string()]);
    assert_eq!(report.simulated_final_positions, positions(&[("X", 3)]));

    let result = reconstructor().reconstruct(
        &ops,
        StartingPositions::flat(),
        Some(&positions(&[("X", 5)])),
    );
    assert!(!result.validation.unwrap().valid);
}

#[test]
fn display_offset_only_shifts_reported_times() {
    let ops = vec![buy("b1", 0, "X", 1, "10"), sell("s1", 60, "X", 1, "11")];
    let config = ReconstructConfig::default().with_offset_hours(-5).unwrap();

    let trades = Reconstructor::new(config).trades(&ops, &PositionMap::new());

    assert_eq!(trades[0].entry_time.offset().local_minus_utc(), -5 * 3600);
    assert_eq!(trades[0].entry_time, t0());
    assert_eq!(trades[0].entry_time.to_rfc3339(), "2025-03-03T02:00:00-05:00");
}

#[test]
fn diagnose_flags_strategy_disagreement() {
    let ops = vec![
        buy("b1", 0, "X", 10, "1000"),
        sell("s1", 60, "X", 10, "3000"),
    ];
    let current = positions(&[("X", 0)]);

    let comparison = reconstructor().diagnose(&ops, &current);

    // Authoritative: flat start, one 20000 winner. Heuristic: -10 start, no trade.
    assert_eq!(comparison.authoritative_profit, d("20000"));
    assert_eq!(comparison.heuristic_profit, Decimal::zero());
    assert_eq!(comparison.difference, d("20000"));
    assert_eq!(
        comparison.severity,
        tradebook::orchestration::DiscrepancySeverity::High
    );
    assert_eq!(comparison.differing_instruments.len(), 1);
}
