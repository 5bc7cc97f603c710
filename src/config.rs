use crate::domain::{parse_position_list, Decimal, PositionMap};
use crate::engine::{CrossingMode, OneSidedPolicy, ReconstructConfig, DEFAULT_LOSS_THRESHOLD};
use crate::orchestration::StartingPositions;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub operations_path: String,
    pub current_positions: Option<PositionMap>,
    pub starting_position_mode: StartingPositionMode,
    pub reconstruct: ReconstructConfig,
    pub loss_threshold: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartingPositionMode {
    Heuristic,
    Snapshot,
    Flat,
}

impl StartingPositionMode {
    /// Strategy for one request, given whatever snapshot the source returned.
    ///
    /// Snapshot mode without a snapshot falls back to the heuristic.
    pub fn resolve(self, snapshot: Option<PositionMap>) -> StartingPositions {
        match (self, snapshot) {
            (StartingPositionMode::Snapshot, Some(current)) => {
                StartingPositions::FromSnapshot(current)
            }
            (StartingPositionMode::Snapshot, None) => {
                tracing::warn!(
                    "Snapshot mode without a snapshot, using heuristic starting positions"
                );
                StartingPositions::AutoDetect
            }
            (StartingPositionMode::Heuristic, _) => StartingPositions::AutoDetect,
            (StartingPositionMode::Flat, _) => StartingPositions::flat(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let operations_path = env_map
            .get("OPERATIONS_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("OPERATIONS_PATH".to_string()))?;

        let current_positions = parse_current_positions_from_map(&env_map)?;

        let starting_position_mode = match env_map
            .get("STARTING_POSITION_MODE")
            .map(|s| s.as_str())
            .unwrap_or("heuristic")
        {
            "heuristic" => StartingPositionMode::Heuristic,
            "snapshot" => StartingPositionMode::Snapshot,
            "flat" => StartingPositionMode::Flat,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STARTING_POSITION_MODE".to_string(),
                    format!("must be heuristic, snapshot, or flat, got {}", other),
                ))
            }
        };
        if starting_position_mode == StartingPositionMode::Snapshot && current_positions.is_none()
        {
            return Err(ConfigError::InvalidValue(
                "STARTING_POSITION_MODE".to_string(),
                "snapshot requires CURRENT_POSITIONS or CURRENT_POSITIONS_FILE".to_string(),
            ));
        }

        let offset_hours = env_map
            .get("TIMEZONE_OFFSET_HOURS")
            .map(|s| s.as_str())
            .unwrap_or("3")
            .parse::<i32>()
            .ok()
            .and_then(ReconstructConfig::offset_from_hours)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "TIMEZONE_OFFSET_HOURS".to_string(),
                    "must be an integer in -23..=23".to_string(),
                )
            })?;

        let crossing_mode = env_map
            .get("CROSSING_MODE")
            .map(|s| s.parse::<CrossingMode>())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue("CROSSING_MODE".to_string(), e))?
            .unwrap_or_default();

        let one_sided = env_map
            .get("ONE_SIDED_EXCURSIONS")
            .map(|s| s.parse::<OneSidedPolicy>())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue("ONE_SIDED_EXCURSIONS".to_string(), e))?
            .unwrap_or_default();

        let loss_threshold = match env_map.get("LOSS_THRESHOLD") {
            Some(s) => Decimal::from_str_canonical(s).map_err(|_| {
                ConfigError::InvalidValue(
                    "LOSS_THRESHOLD".to_string(),
                    "must be a decimal number".to_string(),
                )
            })?,
            None => Decimal::from_i64(DEFAULT_LOSS_THRESHOLD),
        };

        Ok(Config {
            port,
            operations_path,
            current_positions,
            starting_position_mode,
            reconstruct: ReconstructConfig {
                display_offset: offset_hours,
                crossing_mode,
                one_sided,
            },
            loss_threshold,
        })
    }
}

fn parse_current_positions_from_map(
    env_map: &HashMap<String, String>,
) -> Result<Option<PositionMap>, ConfigError> {
    if let Some(inline) = env_map.get("CURRENT_POSITIONS") {
        parse_position_list(inline)
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue("CURRENT_POSITIONS".to_string(), e.to_string()))
    } else if let Some(file_path) = env_map.get("CURRENT_POSITIONS_FILE") {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "CURRENT_POSITIONS_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        parse_position_list(&content).map(Some).map_err(|e| {
            ConfigError::InvalidValue("CURRENT_POSITIONS_FILE".to_string(), e.to_string())
        })
    } else {
        Ok(None)
    }
}
