//! Reporting façade: the only entry point collaborators use.

pub mod reconstructor;

pub use reconstructor::{
    AnalysisSummary, DiagnosticReport, DiscrepancySeverity, Reconstruction, Reconstructor,
    StartingPositionDiff, StartingPositions, StrategyComparison,
};
