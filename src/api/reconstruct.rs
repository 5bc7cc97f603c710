//! Stateless reconstruction of caller-supplied operations.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::trades::TradesResponse;
use super::AppState;
use crate::domain::{Decimal, PositionMap, RawOperation};
use crate::error::AppError;
use crate::orchestration::StartingPositions;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructRequest {
    pub operations: Vec<OperationInput>,
    pub starting_positions: Option<PositionMap>,
    pub current_positions: Option<PositionMap>,
}

/// One operation row; money travels as decimal strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationInput {
    #[serde(default)]
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub instrument_id: String,
    pub kind: String,
    #[serde(default)]
    pub quantity: i64,
    pub price: Option<String>,
    pub payment: String,
}

impl OperationInput {
    fn into_raw(self, index: usize) -> Result<RawOperation, AppError> {
        let parse = |field: &str, value: &str| {
            Decimal::from_str_canonical(value).map_err(|_| {
                AppError::BadRequest(format!("operations[{}]: invalid {}", index, field))
            })
        };
        let price = match self.price.as_deref() {
            Some(px) => parse("price", px)?,
            None => Decimal::zero(),
        };
        let payment = parse("payment", &self.payment)?;

        Ok(RawOperation::new(
            self.id,
            self.timestamp,
            self.instrument_id,
            self.kind,
            self.quantity,
            price,
            payment,
        ))
    }
}

pub async fn post_reconstruct(
    State(state): State<AppState>,
    Json(body): Json<ReconstructRequest>,
) -> Result<Json<TradesResponse>, AppError> {
    let raw = body
        .operations
        .into_iter()
        .enumerate()
        .map(|(index, op)| op.into_raw(index))
        .collect::<Result<Vec<_>, _>>()?;

    let starting = match (body.starting_positions, body.current_positions.as_ref()) {
        (Some(explicit), _) => StartingPositions::Explicit(explicit),
        (None, Some(current)) => StartingPositions::FromSnapshot(current.clone()),
        (None, None) => StartingPositions::AutoDetect,
    };

    let reconstruction =
        state
            .reconstructor()
            .reconstruct_raw(&raw, starting, body.current_positions.as_ref())?;

    Ok(Json(TradesResponse::from(&reconstruction)))
}
