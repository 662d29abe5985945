//! Run configuration, read from a JSON file where every field is optional.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use svdcore::{ClusterizerConfig, UniformGeometry};

use crate::error::Result;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecConfig {
    pub clusterizer: ClusterizerConfig,
    /// worker threads for the per sensor/side scans
    pub num_threads: usize,
    /// drop samples below this SNR when reading the store
    pub zero_suppression_snr: Option<f32>,
    /// fail instead of skipping samples of strips without noise calibration
    pub require_noise: bool,
    pub geometry: UniformGeometry,
}

impl Default for RecConfig {
    fn default() -> Self {
        Self {
            clusterizer: ClusterizerConfig::default(),
            num_threads: 4,
            zero_suppression_snr: None,
            require_noise: false,
            geometry: UniformGeometry::default(),
        }
    }
}

impl RecConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: RecConfig = serde_json::from_reader(reader)?;
        config.clusterizer.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
