pub mod api;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{CsvOperationSource, DataSourceError, MockOperationSource, OperationSource};
pub use domain::{
    Decimal, Direction, InstrumentId, OpenPosition, Operation, OperationKind, PositionMap,
    RawOperation, Trade,
};
pub use engine::{CrossingMode, OneSidedPolicy, ReconstructConfig, ReconstructError};
pub use error::AppError;
pub use orchestration::{Reconstruction, Reconstructor, StartingPositions};
