use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::driver::EventClusters;
use crate::error::{RecError, Result};

pub const FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterFormat {
    Bincode,
    Json,
}

#[derive(Serialize, Deserialize)]
pub struct ClusterFile {
    pub version: u32,
    pub clusters: Vec<EventClusters>,
}

impl ClusterFile {
    pub fn new(clusters: Vec<EventClusters>) -> Self {
        Self { version: FILE_VERSION, clusters }
    }

    fn into_checked(self) -> Result<Vec<EventClusters>> {
        if self.version != FILE_VERSION {
            return Err(RecError::FileVersion(self.version));
        }
        Ok(self.clusters)
    }
}

// --- JSON (human-readable) ---
pub fn save_json(path: &Path, clusters: &[EventClusters]) -> Result<()> {
    let f = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(f, &ClusterFile::new(clusters.to_vec()))?;
    Ok(())
}

pub fn load_json(path: &Path) -> Result<Vec<EventClusters>> {
    let f = BufReader::new(File::open(path)?);
    let cf: ClusterFile = serde_json::from_reader(f)?;
    cf.into_checked()
}

// --- Bincode + optional zstd compression ---
pub fn save_bincode(path: &Path, clusters: &[EventClusters], compress: bool) -> Result<()> {
    let f = File::create(path)?;
    let cf = ClusterFile::new(clusters.to_vec());
    if compress {
        let mut zw = zstd::Encoder::new(f, 3)?;
        bincode::serialize_into(&mut zw, &cf)?;
        zw.finish()?;
    } else {
        let mut bw = BufWriter::new(f);
        bincode::serialize_into(&mut bw, &cf)?;
    }
    Ok(())
}

pub fn load_bincode(path: &Path) -> Result<Vec<EventClusters>> {
    // zstd frame first, plain bincode otherwise
    let f = BufReader::new(File::open(path)?);
    if let Ok(mut zr) = zstd::Decoder::with_buffer(f) {
        if let Ok(cf) = bincode::deserialize_from::<_, ClusterFile>(&mut zr) {
            return cf.into_checked();
        }
    }
    let f = BufReader::new(File::open(path)?);
    let cf: ClusterFile = bincode::deserialize_from(f)?;
    cf.into_checked()
}

pub fn save(path: &Path, clusters: &[EventClusters], format: ClusterFormat, compress: bool) -> Result<()> {
    match format {
        ClusterFormat::Bincode => save_bincode(path, clusters, compress),
        ClusterFormat::Json => save_json(path, clusters),
    }
}

/// Load by extension: `.json` is read as JSON, anything else as bincode.
pub fn load(path: &Path) -> Result<Vec<EventClusters>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_json(path),
        _ => load_bincode(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use svdcore::{Clusterizer, ClusterizerConfig, Sample, SensorId, Side};

    fn clusters() -> Vec<EventClusters> {
        let samples: Vec<Sample> = [(5, 10, 50.0, 5.0), (5, 11, 40.0, 5.0), (6, 11, 8.0, 4.0), (6, 12, 6.0, 4.0)]
            .iter()
            .map(|&(st, t, a, n)| Sample::new(st, t, a, n).unwrap())
            .collect();
        let mut clusterizer = Clusterizer::new(ClusterizerConfig::default()).unwrap();
        let found = clusterizer.cluster(SensorId::new(3, 1, 1), Side::U, &samples).unwrap();
        vec![EventClusters { event: 3, clusters: found, hits: Vec::new(), stats: clusterizer.stats().clone() }]
    }

    #[test]
    fn test_bincode_plain_and_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let written = clusters();
        for compress in [false, true] {
            let path = dir.path().join(format!("clusters_{}.bin", compress));
            save_bincode(&path, &written, compress).unwrap();
            assert_eq!(load_bincode(&path).unwrap(), written);
            assert_eq!(load(&path).unwrap(), written);
        }
    }

    #[test]
    fn test_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clusters.json");
        let written = clusters();
        save(&path, &written, ClusterFormat::Json, false).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded[0].clusters[0].size(), 2);
        assert_eq!(loaded[0].stats, written[0].stats);
    }

    #[test]
    fn test_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        std::fs::write(&path, r#"{"version": 0, "clusters": []}"#).unwrap();
        assert!(matches!(load_json(&path), Err(RecError::FileVersion(0))));
    }
}
