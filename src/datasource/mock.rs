//! In-memory operation source for tests.

use super::{DataSourceError, OperationSource};
use crate::domain::{PositionMap, RawOperation};
use async_trait::async_trait;

/// Mock source that returns predefined operations and an optional snapshot.
#[derive(Debug, Clone, Default)]
pub struct MockOperationSource {
    operations: Vec<RawOperation>,
    current_positions: Option<PositionMap>,
    failure: Option<DataSourceError>,
}

impl MockOperationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operation(mut self, operation: RawOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn with_operations(mut self, operations: Vec<RawOperation>) -> Self {
        self.operations.extend(operations);
        self
    }

    /// Set the snapshot returned by fetch_current_positions.
    pub fn with_current_positions(mut self, positions: PositionMap) -> Self {
        self.current_positions = Some(positions);
        self
    }

    /// Make every fetch fail with `error`.
    pub fn with_failure(mut self, error: DataSourceError) -> Self {
        self.failure = Some(error);
        self
    }
}

#[async_trait]
impl OperationSource for MockOperationSource {
    async fn fetch_operations(
        &self,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<RawOperation>, DataSourceError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(self
            .operations
            .iter()
            .filter(|op| {
                let ms = op.timestamp.timestamp_millis();
                ms >= from_ms && ms <= to_ms
            })
            .cloned()
            .collect())
    }

    async fn fetch_current_positions(&self) -> Result<Option<PositionMap>, DataSourceError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        Ok(self.current_positions.clone())
    }
}
