pub mod error;

// detector module
pub mod detector {
    pub mod sensor;
    pub mod sample;
}

// cluster module
pub mod cluster {
    pub mod candidate;
    pub mod cache;
    pub mod raw_cluster;
    pub mod position;
    pub mod clusterizer;
}

// Re-export commonly used types
pub use error::{ClusterError, Result};
pub use detector::sensor::{SensorId, Side};
pub use detector::sample::Sample;
pub use cluster::candidate::{CandidateId, CandidateRegistry, CandidateState, ClusterCandidate};
pub use cluster::cache::ClusterCache;
pub use cluster::raw_cluster::{RawCluster, StripRecord};
pub use cluster::position::{ClusterHit, SensorGeometry, UniformGeometry};
pub use cluster::clusterizer::{ClusterSink, Clusterizer, ClusterizerConfig, ScanStats};
