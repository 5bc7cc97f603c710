pub mod health;
pub mod pnl;
pub mod reconstruct;
pub mod report;
pub mod trades;

use crate::config::Config;
use crate::datasource::OperationSource;
use crate::domain::ordering::sort_operations_deterministic;
use crate::domain::{Operation, PositionMap};
use crate::engine::{check_positions, classify_all};
use crate::error::AppError;
use crate::orchestration::Reconstructor;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn OperationSource>,
    pub config: Config,
}

impl AppState {
    pub fn new(source: Arc<dyn OperationSource>, config: Config) -> Self {
        Self { source, config }
    }

    /// Façade configured from the service settings; built per request.
    pub fn reconstructor(&self) -> Reconstructor {
        Reconstructor::new(self.config.reconstruct).with_loss_threshold(self.config.loss_threshold)
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/trades", get(trades::get_trades))
        .route("/v1/report", get(report::get_report))
        .route("/v1/pnl", get(pnl::get_pnl))
        .route("/v1/reconstruct", post(reconstruct::post_reconstruct))
        .layer(cors)
        .with_state(state)
}

/// Operations in `[from_ms, to_ms]` plus the source's position snapshot.
pub(crate) async fn load_window(
    state: &AppState,
    from_ms: Option<i64>,
    to_ms: Option<i64>,
) -> Result<(Vec<Operation>, Option<PositionMap>), AppError> {
    let from_ms = from_ms.unwrap_or(0);
    let to_ms = to_ms.unwrap_or(i64::MAX);
    if from_ms > to_ms {
        return Err(AppError::BadRequest("fromMs must be <= toMs".to_string()));
    }

    let raw = state.source.fetch_operations(from_ms, to_ms).await?;
    let mut operations = classify_all(&raw)?;
    sort_operations_deterministic(&mut operations);
    let snapshot = state.source.fetch_current_positions().await?;
    if let Some(current) = &snapshot {
        check_positions(current)?;
    }

    tracing::debug!(
        "Loaded {} operations for window [{}, {}]",
        operations.len(),
        from_ms,
        to_ms
    );

    Ok((operations, snapshot))
}
