use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{InstrumentId, OperationKind};
use crate::engine::{
    PositionHistoryEntry, PositionScenario, ProblemSeverity, StartingPositionAnalysis,
};
use crate::error::AppError;
use crate::orchestration::{
    AnalysisSummary, DiscrepancySeverity, StartingPositionDiff, StrategyComparison,
};
use super::trades::{TradeDto, TradesResponse};
use super::{load_window, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    #[serde(flatten)]
    pub reconstruction: TradesResponse,
    pub summary: SummaryDto,
    pub problematic_trades: Vec<ProblematicTradeDto>,
    pub starting_position_analysis: BTreeMap<InstrumentId, StartingAnalysisDto>,
    pub position_history: BTreeMap<InstrumentId, Vec<PositionHistoryEntry>>,
    /// Present when the source has a current-position snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDto {
    pub total_operations: usize,
    pub buy_operations: usize,
    pub sell_operations: usize,
    pub fee_operations: usize,
    pub margin_credit_operations: usize,
    pub margin_debit_operations: usize,
    pub instruments_traded: Vec<InstrumentId>,
    pub trades_count: usize,
    pub fee_pool: String,
    pub margin_pool: String,
    pub unattributed_fees: String,
    pub unattributed_margin: String,
    pub open_positions: usize,
    pub dropped_excursions: usize,
}

impl From<&AnalysisSummary> for SummaryDto {
    fn from(s: &AnalysisSummary) -> Self {
        Self {
            total_operations: s.total_operations,
            buy_operations: s.buy_operations,
            sell_operations: s.sell_operations,
            fee_operations: s.fee_operations,
            margin_credit_operations: s.margin_credit_operations,
            margin_debit_operations: s.margin_debit_operations,
            instruments_traded: s.instruments_traded.clone(),
            trades_count: s.trades_count,
            fee_pool: s.fee_pool.to_canonical_string(),
            margin_pool: s.margin_pool.to_canonical_string(),
            unattributed_fees: s.unattributed_fees.to_canonical_string(),
            unattributed_margin: s.unattributed_margin.to_canonical_string(),
            open_positions: s.open_positions,
            dropped_excursions: s.dropped_excursions,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblematicTradeDto {
    pub trade: TradeDto,
    pub reasons: Vec<String>,
    pub severity: ProblemSeverity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartingAnalysisDto {
    pub first_operation_id: String,
    pub first_kind: OperationKind,
    pub first_quantity: i64,
    pub first_unit_price: String,
    pub first_amount: String,
    pub first_time_ms: i64,
    pub trade_operation_count: usize,
    pub scenarios: Vec<PositionScenario>,
}

impl From<&StartingPositionAnalysis> for StartingAnalysisDto {
    fn from(a: &StartingPositionAnalysis) -> Self {
        Self {
            first_operation_id: a.first_operation_id.clone(),
            first_kind: a.first_kind,
            first_quantity: a.first_quantity,
            first_unit_price: a.first_unit_price.to_canonical_string(),
            first_amount: a.first_amount.to_canonical_string(),
            first_time_ms: a.first_timestamp.timestamp_millis(),
            trade_operation_count: a.trade_operation_count,
            scenarios: a.scenarios.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonDto {
    pub authoritative_profit: String,
    pub heuristic_profit: String,
    pub difference: String,
    pub severity: DiscrepancySeverity,
    pub differing_instruments: Vec<StartingPositionDiff>,
}

impl From<&StrategyComparison> for ComparisonDto {
    fn from(c: &StrategyComparison) -> Self {
        Self {
            authoritative_profit: c.authoritative_profit.to_canonical_string(),
            heuristic_profit: c.heuristic_profit.to_canonical_string(),
            difference: c.difference.to_canonical_string(),
            severity: c.severity,
            differing_instruments: c.differing_instruments.clone(),
        }
    }
}

pub async fn get_report(
    Query(params): Query<ReportQuery>,
    State(state): State<AppState>,
) -> Result<Json<ReportResponse>, AppError> {
    let (operations, snapshot) = load_window(&state, params.from_ms, params.to_ms).await?;
    let starting = state
        .config
        .starting_position_mode
        .resolve(snapshot.clone());

    let reconstructor = state.reconstructor();
    let report = reconstructor.report(&operations, starting, snapshot.as_ref());
    let comparison = snapshot
        .as_ref()
        .map(|current| ComparisonDto::from(&reconstructor.diagnose(&operations, current)));

    Ok(Json(ReportResponse {
        reconstruction: TradesResponse::from(&report.reconstruction),
        summary: SummaryDto::from(&report.summary),
        problematic_trades: report
            .problematic_trades
            .iter()
            .map(|p| ProblematicTradeDto {
                trade: TradeDto::from(&p.trade),
                reasons: p.reasons.clone(),
                severity: p.severity,
            })
            .collect(),
        starting_position_analysis: report
            .starting_position_analysis
            .iter()
            .map(|(id, analysis)| (id.clone(), StartingAnalysisDto::from(analysis)))
            .collect(),
        position_history: report.position_history,
        comparison,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::config::StartingPositionMode;
    use crate::datasource::MockOperationSource;
    use crate::domain::{Decimal, PositionMap, RawOperation};
    use chrono::{TimeZone, Utc};

    fn trade(id: &str, hour: u32, kind: &str, qty: i64, price: i64) -> RawOperation {
        let notional = price * qty;
        RawOperation::new(
            id,
            Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap(),
            "FIGI001",
            kind,
            qty,
            Decimal::from_i64(price),
            Decimal::from_i64(if kind == "sell" { notional } else { -notional }),
        )
    }

    fn source() -> MockOperationSource {
        MockOperationSource::new().with_operations(vec![
            trade("b1", 10, "buy", 1, 100),
            trade("s1", 11, "sell", 1, 90),
            trade("b2", 12, "buy", 3, 95),
        ])
    }

    #[tokio::test]
    async fn test_report_without_snapshot() {
        let query = ReportQuery {
            from_ms: None,
            to_ms: None,
        };
        let mut state = test_state(source());
        state.config.starting_position_mode = StartingPositionMode::Flat;
        let Json(resp) = get_report(Query(query), State(state)).await.unwrap();

        assert_eq!(resp.summary.total_operations, 3);
        assert_eq!(resp.summary.buy_operations, 2);
        assert_eq!(resp.summary.open_positions, 1);
        assert_eq!(resp.reconstruction.trades.len(), 1);
        assert_eq!(resp.reconstruction.trades[0].gross_profit, "-10");
        assert!(resp.problematic_trades.is_empty());
        assert!(resp.comparison.is_none());

        let history = &resp.position_history[&InstrumentId::new("FIGI001")];
        assert_eq!(history.len(), 4);
        assert_eq!(history.last().map(|e| e.position), Some(3));

        let analysis = &resp.starting_position_analysis[&InstrumentId::new("FIGI001")];
        assert_eq!(analysis.first_operation_id, "b1");
        assert_eq!(analysis.scenarios.len(), 3);
    }

    #[tokio::test]
    async fn test_report_with_snapshot_compares_strategies() {
        let current: PositionMap = [(InstrumentId::new("FIGI001"), 3)].into_iter().collect();
        let query = ReportQuery {
            from_ms: None,
            to_ms: None,
        };
        let mut state = test_state(source().with_current_positions(current));
        state.config.starting_position_mode = StartingPositionMode::Snapshot;
        let Json(resp) = get_report(Query(query), State(state)).await.unwrap();

        assert_eq!(
            resp.reconstruction.starting_positions.get(&InstrumentId::new("FIGI001")),
            Some(&0)
        );
        let validation = resp.reconstruction.validation.as_ref().unwrap();
        assert!(validation.valid);

        // The heuristic guesses a 1-lot short and books the Sell->Buy leg instead.
        let comparison = resp.comparison.unwrap();
        assert_eq!(comparison.authoritative_profit, "-10");
        assert_eq!(comparison.heuristic_profit, "-5");
        assert_eq!(comparison.difference, "-5");
        assert_eq!(comparison.severity, DiscrepancySeverity::Low);
        assert_eq!(comparison.differing_instruments.len(), 1);
        assert_eq!(comparison.differing_instruments[0].heuristic, -1);
    }
}
