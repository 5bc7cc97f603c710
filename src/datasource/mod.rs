//! Data source abstraction for fetching account operations and position snapshots.

use crate::domain::{PositionMap, RawOperation};
use async_trait::async_trait;
use std::fmt;

pub mod csv_file;
pub mod mock;

pub use csv_file::CsvOperationSource;
pub use mock::MockOperationSource;

/// Source of raw account operations.
///
/// Implementations own pagination and retries; the engine only ever sees a
/// finite, already-fetched list.
#[async_trait]
pub trait OperationSource: Send + Sync + fmt::Debug {
    /// Fetch operations within a time range.
    ///
    /// # Arguments
    /// * `from_ms` - Start time in milliseconds (inclusive)
    /// * `to_ms` - End time in milliseconds (inclusive)
    ///
    /// # Returns
    /// Raw operations in source order; callers must not rely on ordering.
    async fn fetch_operations(
        &self,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<RawOperation>, DataSourceError>;

    /// Authoritative current position per instrument, if the source has one.
    async fn fetch_current_positions(&self) -> Result<Option<PositionMap>, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    /// Reading the underlying file or stream failed
    Io(String),
    /// A row could not be parsed
    ParseError(String),
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::Io(msg) => write!(f, "IO error: {}", msg),
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}
