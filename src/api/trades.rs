use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::{Direction, OpenPosition, PositionMap, Trade};
use crate::engine::ValidationReport;
use crate::error::AppError;
use crate::orchestration::Reconstruction;
use super::{load_window, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesQuery {
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesResponse {
    pub trades: Vec<TradeDto>,
    pub total_net_profit: String,
    pub starting_positions: PositionMap,
    pub open_positions: Vec<OpenPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

impl From<&Reconstruction> for TradesResponse {
    fn from(reconstruction: &Reconstruction) -> Self {
        Self {
            trades: reconstruction.trades.iter().map(TradeDto::from).collect(),
            total_net_profit: reconstruction.total_net_profit.to_canonical_string(),
            starting_positions: reconstruction.starting_positions.clone(),
            open_positions: reconstruction.open_positions.clone(),
            validation: reconstruction.validation.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDto {
    pub trade_id: String,
    pub instrument_id: String,
    pub direction: Direction,
    pub entry_time: String,
    pub exit_time: String,
    pub quantity: i64,
    pub entry_price: String,
    pub exit_price: String,
    pub gross_profit: String,
    pub fees: String,
    pub margin: String,
    pub net_profit: String,
    pub entry_operation_id: String,
    pub exit_operation_id: String,
}

impl From<&Trade> for TradeDto {
    fn from(t: &Trade) -> Self {
        Self {
            trade_id: t.trade_id.clone(),
            instrument_id: t.instrument_id.as_str().to_string(),
            direction: t.direction,
            entry_time: t.entry_time.to_rfc3339(),
            exit_time: t.exit_time.to_rfc3339(),
            quantity: t.quantity,
            entry_price: t.entry_price.to_canonical_string(),
            exit_price: t.exit_price.to_canonical_string(),
            gross_profit: t.gross_profit.to_canonical_string(),
            fees: t.fees.to_canonical_string(),
            margin: t.margin.to_canonical_string(),
            net_profit: t.net_profit.to_canonical_string(),
            entry_operation_id: t.entry_operation_id.clone(),
            exit_operation_id: t.exit_operation_id.clone(),
        }
    }
}

pub async fn get_trades(
    Query(params): Query<TradesQuery>,
    State(state): State<AppState>,
) -> Result<Json<TradesResponse>, AppError> {
    let (operations, snapshot) = load_window(&state, params.from_ms, params.to_ms).await?;
    let starting = state
        .config
        .starting_position_mode
        .resolve(snapshot.clone());

    let reconstruction = state
        .reconstructor()
        .reconstruct(&operations, starting, snapshot.as_ref());

    Ok(Json(TradesResponse::from(&reconstruction)))
}
