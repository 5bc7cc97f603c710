//! Operation source backed by a CSV export of the account's operations.
//!
//! Expected header: `id,timestamp,instrument_id,kind,quantity,price,payment`.
//! `timestamp` is RFC 3339 or epoch milliseconds; money columns are parsed
//! from their text so no float ever touches them.

use super::{DataSourceError, OperationSource};
use crate::domain::{Decimal, PositionMap, RawOperation};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CsvOperationSource {
    path: PathBuf,
    current_positions: Option<PositionMap>,
}

impl CsvOperationSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current_positions: None,
        }
    }

    /// Attach the broker's current-position snapshot.
    pub fn with_current_positions(mut self, positions: PositionMap) -> Self {
        self.current_positions = Some(positions);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse_csv(csv_bytes: &[u8]) -> Result<Vec<RawOperation>, DataSourceError> {
        #[derive(Debug, serde::Deserialize)]
        struct Row {
            id: Option<String>,
            timestamp: String,
            instrument_id: Option<String>,
            kind: String,
            quantity: Option<i64>,
            price: Option<String>,
            payment: String,
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(csv_bytes);

        let mut operations = Vec::new();
        for (index, record) in reader.deserialize::<Row>().enumerate() {
            let line = index + 2;
            let row = record
                .map_err(|e| DataSourceError::ParseError(format!("line {}: {}", line, e)))?;

            let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| {
                DataSourceError::ParseError(format!(
                    "line {}: invalid timestamp: {}",
                    line, row.timestamp
                ))
            })?;
            let price = match row.price.as_deref() {
                Some(px) => Decimal::from_str_canonical(px).map_err(|e| {
                    DataSourceError::ParseError(format!("line {}: invalid price: {}", line, e))
                })?,
                None => Decimal::zero(),
            };
            let payment = Decimal::from_str_canonical(&row.payment).map_err(|e| {
                DataSourceError::ParseError(format!("line {}: invalid payment: {}", line, e))
            })?;

            operations.push(RawOperation::new(
                row.id.unwrap_or_default(),
                timestamp,
                row.instrument_id.unwrap_or_default(),
                row.kind,
                row.quantity.unwrap_or(0),
                price,
                payment,
            ));
        }

        Ok(operations)
    }
}

/// RFC 3339 (any offset) or integer epoch milliseconds.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ms) = s.parse::<i64>() {
        return Utc.timestamp_millis_opt(ms).single();
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl OperationSource for CsvOperationSource {
    async fn fetch_operations(
        &self,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<RawOperation>, DataSourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| DataSourceError::Io(format!("{}: {}", self.path.display(), e)))?;
        let operations = Self::parse_csv(&bytes)?;

        Ok(operations
            .into_iter()
            .filter(|op| {
                let ms = op.timestamp.timestamp_millis();
                ms >= from_ms && ms <= to_ms
            })
            .collect())
    }

    async fn fetch_current_positions(&self) -> Result<Option<PositionMap>, DataSourceError> {
        Ok(self.current_positions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "id,timestamp,instrument_id,kind,quantity,price,payment\n";

    #[test]
    fn csv_parsing_valid_rows() {
        let csv = format!(
            "{HEADER}op-1,2025-01-01T10:00:00+03:00,FIGI001,OPERATION_TYPE_BUY,100,10.00,-1000.00\n\
             ,1735725600000,,OPERATION_TYPE_BROKER_FEE,,,-5.00\n"
        );
        let ops = CsvOperationSource::parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(ops.len(), 2);

        assert_eq!(ops[0].id, "op-1");
        assert_eq!(ops[0].timestamp, Utc.timestamp_opt(1_735_714_800, 0).unwrap());
        assert_eq!(ops[0].instrument_id, "FIGI001");
        assert_eq!(ops[0].quantity, 100);
        assert_eq!(ops[0].price.to_canonical_string(), "10");
        assert_eq!(ops[0].payment.to_canonical_string(), "-1000");

        assert_eq!(ops[1].id, "");
        assert_eq!(ops[1].timestamp.timestamp_millis(), 1_735_725_600_000);
        assert_eq!(ops[1].quantity, 0);
        assert_eq!(ops[1].price, Decimal::zero());
        assert!(ops[1].operation_key().starts_with("hash:"));
    }

    #[test]
    fn csv_parsing_invalid_timestamp_errors() {
        let csv = format!("{HEADER}op-1,yesterday,FIGI001,buy,1,10,-10\n");
        let err = CsvOperationSource::parse_csv(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, DataSourceError::ParseError(msg) if msg.contains("line 2")));
    }

    #[test]
    fn csv_parsing_invalid_payment_errors() {
        let csv = format!("{HEADER}op-1,1735725600000,FIGI001,buy,1,10,ten\n");
        let err = CsvOperationSource::parse_csv(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, DataSourceError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let source = CsvOperationSource::new("/nonexistent/operations.csv");
        let err = source.fetch_operations(0, i64::MAX).await.unwrap_err();
        assert!(matches!(err, DataSourceError::Io(_)));
    }
}
