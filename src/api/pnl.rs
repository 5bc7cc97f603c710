use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{load_window, AppState};
use crate::domain::Decimal;
use crate::engine::{Granularity, PeriodProfit};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlQuery {
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub granularity: Option<Granularity>,
    pub starting_balance: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlResponse {
    pub granularity: Granularity,
    pub periods: Vec<PeriodDto>,
    pub total_net_profit: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodDto {
    pub start_ms: i64,
    pub end_ms: i64,
    pub starting_balance: String,
    pub ending_balance: String,
    pub total_profit: String,
    pub total_fees: String,
    pub net_profit: String,
    pub profit_percentage: String,
    pub trades_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub cash_flow: String,
}

impl From<&PeriodProfit> for PeriodDto {
    fn from(p: &PeriodProfit) -> Self {
        Self {
            start_ms: p.start.timestamp_millis(),
            end_ms: p.end.timestamp_millis(),
            starting_balance: p.starting_balance.to_canonical_string(),
            ending_balance: p.ending_balance.to_canonical_string(),
            total_profit: p.total_profit.to_canonical_string(),
            total_fees: p.total_fees.to_canonical_string(),
            net_profit: p.net_profit.to_canonical_string(),
            profit_percentage: p.profit_percentage.round_dp(4).to_canonical_string(),
            trades_count: p.trades_count,
            winning_trades: p.winning_trades,
            losing_trades: p.losing_trades,
            cash_flow: p.cash_flow.to_canonical_string(),
        }
    }
}

pub async fn get_pnl(
    Query(params): Query<PnlQuery>,
    State(state): State<AppState>,
) -> Result<Json<PnlResponse>, AppError> {
    let starting_balance = params
        .starting_balance
        .as_deref()
        .map(Decimal::from_str_canonical)
        .transpose()
        .map_err(|_| AppError::BadRequest("Invalid startingBalance".to_string()))?
        .unwrap_or_else(Decimal::zero);
    let granularity = params.granularity.unwrap_or_default();

    let (operations, snapshot) = load_window(&state, params.from_ms, params.to_ms).await?;
    let starting = state.config.starting_position_mode.resolve(snapshot);

    let periods = state.reconstructor().profit_series(
        &operations,
        starting,
        granularity,
        starting_balance,
    );
    let total_net_profit: Decimal = periods.iter().map(|p| p.net_profit).sum();

    Ok(Json(PnlResponse {
        granularity,
        periods: periods.iter().map(PeriodDto::from).collect(),
        total_net_profit: total_net_profit.to_canonical_string(),
    }))
}
