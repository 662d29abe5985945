//! Errors of the reconstruction driver.

use svdcore::{ClusterError, SensorId, Side};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecError {
    #[error("Clustering error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("No noise calibration for sensor {sensor} side {side} strip {strip}")]
    MissingNoise { sensor: SensorId, side: Side, strip: usize },

    #[error("Unsupported cluster file version {0}")]
    FileVersion(u32),

    #[error("Invalid generator settings: {0}")]
    Generator(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Scan of sensor {sensor} side {side} failed: {source}")]
    Scan { sensor: SensorId, side: Side, source: ClusterError },
}

pub type Result<T> = std::result::Result<T, RecError>;
