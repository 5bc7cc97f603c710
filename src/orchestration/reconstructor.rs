use crate::domain::{
    position_of, Decimal, InstrumentId, OpenPosition, Operation, OperationKind, PositionMap,
    RawOperation, Trade,
};
use crate::engine::{
    analyze_starting_positions, attribute_costs, auto_detect, build_trades, check_positions,
    classify_all,
    detect_problematic, from_current_positions, position_history, profit_series, validate,
    CostPools, Granularity, PeriodProfit, PositionHistoryEntry, ProblematicTrade,
    ReconstructConfig, ReconstructError, StartingPositionAnalysis, ValidationReport,
    DEFAULT_LOSS_THRESHOLD,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Where the opening position of each instrument comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartingPositions {
    /// Caller-supplied map, used as is.
    Explicit(PositionMap),
    /// First-trade heuristic.
    AutoDetect,
    /// Reverse the window from an authoritative current-position snapshot.
    FromSnapshot(PositionMap),
}

impl StartingPositions {
    /// Flat start for every instrument.
    pub fn flat() -> Self {
        StartingPositions::Explicit(PositionMap::new())
    }

    fn snapshot(&self) -> Option<&PositionMap> {
        match self {
            StartingPositions::FromSnapshot(current) => Some(current),
            _ => None,
        }
    }

    fn positions(&self) -> Option<&PositionMap> {
        match self {
            StartingPositions::Explicit(positions) | StartingPositions::FromSnapshot(positions) => {
                Some(positions)
            }
            StartingPositions::AutoDetect => None,
        }
    }
}

/// Result of one reconstruction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconstruction {
    /// Ordered by exit time.
    pub trades: Vec<Trade>,
    pub total_net_profit: Decimal,
    pub starting_positions: PositionMap,
    pub open_positions: Vec<OpenPosition>,
    pub validation: Option<ValidationReport>,
    #[serde(skip)]
    pub(crate) pools: CostPools,
    #[serde(skip)]
    pub(crate) dropped_excursions: usize,
}

/// Operation counts and pool totals for a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub total_operations: usize,
    pub buy_operations: usize,
    pub sell_operations: usize,
    pub fee_operations: usize,
    pub margin_credit_operations: usize,
    pub margin_debit_operations: usize,
    pub instruments_traded: Vec<InstrumentId>,
    pub trades_count: usize,
    pub fee_pool: Decimal,
    pub margin_pool: Decimal,
    /// Pools left with no trade to absorb them.
    pub unattributed_fees: Decimal,
    pub unattributed_margin: Decimal,
    pub open_positions: usize,
    /// Closed excursions that produced no trade.
    pub dropped_excursions: usize,
}

/// Full diagnostic report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    #[serde(flatten)]
    pub reconstruction: Reconstruction,
    pub summary: AnalysisSummary,
    pub problematic_trades: Vec<ProblematicTrade>,
    pub starting_position_analysis: BTreeMap<InstrumentId, StartingPositionAnalysis>,
    pub position_history: BTreeMap<InstrumentId, Vec<PositionHistoryEntry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscrepancySeverity {
    Low,
    Moderate,
    High,
}

impl DiscrepancySeverity {
    fn from_difference(difference: Decimal) -> Self {
        let difference = difference.abs();
        if difference > Decimal::from_i64(10_000) {
            DiscrepancySeverity::High
        } else if difference > Decimal::from_i64(1_000) {
            DiscrepancySeverity::Moderate
        } else {
            DiscrepancySeverity::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartingPositionDiff {
    pub instrument_id: InstrumentId,
    pub authoritative: i64,
    pub heuristic: i64,
}

/// Authoritative vs heuristic starting positions over the same window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyComparison {
    pub authoritative_profit: Decimal,
    pub heuristic_profit: Decimal,
    /// authoritative - heuristic
    pub difference: Decimal,
    pub severity: DiscrepancySeverity,
    pub differing_instruments: Vec<StartingPositionDiff>,
    pub authoritative: Reconstruction,
    pub heuristic: Reconstruction,
}

/// Reporting façade over the engine.
///
/// Holds only configuration; every call builds its state from scratch.
#[derive(Debug, Clone, Copy)]
pub struct Reconstructor {
    config: ReconstructConfig,
    loss_threshold: Decimal,
}

impl Default for Reconstructor {
    fn default() -> Self {
        Self::new(ReconstructConfig::default())
    }
}

impl Reconstructor {
    pub fn new(config: ReconstructConfig) -> Self {
        Self {
            config,
            loss_threshold: Decimal::from_i64(DEFAULT_LOSS_THRESHOLD),
        }
    }

    pub fn with_loss_threshold(mut self, threshold: Decimal) -> Self {
        self.loss_threshold = threshold;
        self
    }

    pub fn config(&self) -> &ReconstructConfig {
        &self.config
    }

    /// Plain trade list from known starting positions.
    pub fn trades(&self, operations: &[Operation], starting: &PositionMap) -> Vec<Trade> {
        self.reconstruct(
            operations,
            StartingPositions::Explicit(starting.clone()),
            None,
        )
        .trades
    }

    /// Trades plus the starting positions that were used.
    pub fn trades_with_starting_positions(
        &self,
        operations: &[Operation],
        starting: StartingPositions,
    ) -> (Vec<Trade>, PositionMap) {
        let reconstruction = self.reconstruct(operations, starting, None);
        (reconstruction.trades, reconstruction.starting_positions)
    }

    /// Classify raw rows, then reconstruct.
    ///
    /// Lot counts and supplied positions are bounded by `MAX_LOTS`, so
    /// position arithmetic cannot overflow for untrusted input.
    pub fn reconstruct_raw(
        &self,
        raw: &[RawOperation],
        starting: StartingPositions,
        current: Option<&PositionMap>,
    ) -> Result<Reconstruction, ReconstructError> {
        let operations = classify_all(raw)?;
        for positions in starting.positions().into_iter().chain(current) {
            check_positions(positions)?;
        }
        Ok(self.reconstruct(&operations, starting, current))
    }

    /// Estimate, track, attribute, validate.
    ///
    /// Operations are trusted here; rows from outside go through
    /// `reconstruct_raw`, which bounds lot counts.
    ///
    /// Validation runs against `current` or, failing that, the snapshot carried
    /// by `StartingPositions::FromSnapshot`.
    pub fn reconstruct(
        &self,
        operations: &[Operation],
        starting: StartingPositions,
        current: Option<&PositionMap>,
    ) -> Reconstruction {
        let starting_positions = self.resolve_starting_positions(operations, &starting);
        let tracked = build_trades(operations, &starting_positions, &self.config);

        for (instrument, position) in &tracked.final_positions {
            tracing::debug!(
                "Instrument {}: start {} end {}",
                instrument,
                position_of(&starting_positions, instrument),
                position
            );
        }

        let pools = CostPools::from_operations(operations);
        let trades = attribute_costs(tracked.trades, &pools);
        let total_net_profit: Decimal = trades.iter().map(|t| t.net_profit).sum();

        if trades.is_empty() && !pools.is_empty() {
            tracing::warn!(
                "No closed trades to absorb costs: fees {} margin {} left unattributed",
                pools.fee_pool,
                pools.margin_pool
            );
        }
        for open in &tracked.open_positions {
            tracing::warn!(
                "Open position at window end: {} {} lots",
                open.instrument_id,
                open.signed_quantity
            );
        }

        let validation = current
            .or_else(|| starting.snapshot())
            .map(|snapshot| validate(operations, &starting_positions, Some(snapshot)));
        if let Some(report) = validation.as_ref().filter(|r| !r.valid) {
            for issue in &report.issues {
                tracing::warn!("Position mismatch: {}", issue);
            }
        }

        tracing::info!(
            "Reconstructed {} trades from {} operations (net {})",
            trades.len(),
            operations.len(),
            total_net_profit
        );

        Reconstruction {
            trades,
            total_net_profit,
            starting_positions,
            open_positions: tracked.open_positions,
            validation,
            pools,
            dropped_excursions: tracked.dropped_excursions,
        }
    }

    /// Reconstruction plus summary, anomaly flags and audit trails.
    pub fn report(
        &self,
        operations: &[Operation],
        starting: StartingPositions,
        current: Option<&PositionMap>,
    ) -> DiagnosticReport {
        let reconstruction = self.reconstruct(operations, starting, current);
        let summary = summarize(operations, &reconstruction);
        let problematic_trades = detect_problematic(&reconstruction.trades, self.loss_threshold);
        let history = position_history(operations, &reconstruction.starting_positions);

        DiagnosticReport {
            summary,
            problematic_trades,
            starting_position_analysis: analyze_starting_positions(operations),
            position_history: history,
            reconstruction,
        }
    }

    /// Compare snapshot-derived starting positions with the heuristic.
    pub fn diagnose(&self, operations: &[Operation], current: &PositionMap) -> StrategyComparison {
        let authoritative = self.reconstruct(
            operations,
            StartingPositions::FromSnapshot(current.clone()),
            None,
        );
        let heuristic = self.reconstruct(operations, StartingPositions::AutoDetect, None);

        let mut instruments: Vec<&InstrumentId> = authoritative
            .starting_positions
            .keys()
            .chain(heuristic.starting_positions.keys())
            .collect();
        instruments.sort();
        instruments.dedup();

        let differing_instruments = instruments
            .into_iter()
            .filter_map(|id| {
                let a = position_of(&authoritative.starting_positions, id);
                let h = position_of(&heuristic.starting_positions, id);
                (a != h).then(|| StartingPositionDiff {
                    instrument_id: id.clone(),
                    authoritative: a,
                    heuristic: h,
                })
            })
            .collect();

        let difference = authoritative.total_net_profit - heuristic.total_net_profit;
        let severity = DiscrepancySeverity::from_difference(difference);
        if severity != DiscrepancySeverity::Low {
            tracing::warn!(
                "Starting position strategies disagree by {} ({:?})",
                difference,
                severity
            );
        }

        StrategyComparison {
            authoritative_profit: authoritative.total_net_profit,
            heuristic_profit: heuristic.total_net_profit,
            difference,
            severity,
            differing_instruments,
            authoritative,
            heuristic,
        }
    }

    /// Weekly or monthly profit series with chained balances.
    pub fn profit_series(
        &self,
        operations: &[Operation],
        starting: StartingPositions,
        granularity: Granularity,
        starting_balance: Decimal,
    ) -> Vec<PeriodProfit> {
        let starting_positions = self.resolve_starting_positions(operations, &starting);
        profit_series(
            operations,
            &starting_positions,
            granularity,
            starting_balance,
            &self.config,
        )
    }

    fn resolve_starting_positions(
        &self,
        operations: &[Operation],
        starting: &StartingPositions,
    ) -> PositionMap {
        match starting {
            StartingPositions::Explicit(map) => map.clone(),
            StartingPositions::AutoDetect => auto_detect(operations),
            StartingPositions::FromSnapshot(current) => from_current_positions(operations, current),
        }
    }
}

fn summarize(operations: &[Operation], reconstruction: &Reconstruction) -> AnalysisSummary {
    let count = |kind: OperationKind| operations.iter().filter(|op| op.kind == kind).count();

    let mut instruments_traded: Vec<InstrumentId> = operations
        .iter()
        .filter(|op| op.kind.is_trade())
        .map(|op| op.instrument_id.clone())
        .collect();
    instruments_traded.sort();
    instruments_traded.dedup();

    let pools = reconstruction.pools;
    let (unattributed_fees, unattributed_margin) = if reconstruction.trades.is_empty() {
        (pools.fee_pool, pools.margin_pool)
    } else {
        (Decimal::zero(), Decimal::zero())
    };

    AnalysisSummary {
        total_operations: operations.len(),
        buy_operations: count(OperationKind::Buy),
        sell_operations: count(OperationKind::Sell),
        fee_operations: count(OperationKind::Fee),
        margin_credit_operations: count(OperationKind::MarginCredit),
        margin_debit_operations: count(OperationKind::MarginDebit),
        instruments_traded,
        trades_count: reconstruction.trades.len(),
        fee_pool: pools.fee_pool,
        margin_pool: pools.margin_pool,
        unattributed_fees,
        unattributed_margin,
        open_positions: reconstruction.open_positions.len(),
        dropped_excursions: reconstruction.dropped_excursions,
    }
}
