//! Per sensor/side scan driving the cluster cache.
//!
//! A `Clusterizer` owns one `ClusterCache` and one `CandidateRegistry` and is
//! reused across scans through `begin`. Scans of different sensors or sides
//! share nothing, so independent clusterizers can run on different threads.

use serde::{Deserialize, Serialize};

use crate::cluster::cache::ClusterCache;
use crate::cluster::candidate::{CandidateId, CandidateRegistry};
use crate::cluster::raw_cluster::RawCluster;
use crate::detector::sample::Sample;
use crate::detector::sensor::{SensorId, Side};
use crate::error::{ClusterError, Result};

/// Cuts and limits of the cluster finder, all SNR values in units of strip noise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterizerConfig {
    pub cut_seed: f32,
    pub cut_adjacent: f32,
    /// optional cut on the total cluster SNR
    pub cut_cluster: Option<f32>,
    pub max_samples_per_strip: usize,
}

impl Default for ClusterizerConfig {
    fn default() -> Self {
        Self {
            cut_seed: 5.0,
            cut_adjacent: 3.0,
            cut_cluster: None,
            max_samples_per_strip: 32,
        }
    }
}

impl ClusterizerConfig {
    /// Looser cuts, keeps low-charge clusters for efficiency studies.
    pub fn permissive() -> Self {
        Self {
            cut_seed: 4.0,
            cut_adjacent: 2.0,
            cut_cluster: None,
            max_samples_per_strip: 64,
        }
    }

    /// Tighter cuts for noisy running conditions.
    pub fn strict() -> Self {
        Self {
            cut_seed: 6.0,
            cut_adjacent: 4.0,
            cut_cluster: Some(8.0),
            max_samples_per_strip: 32,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let finite_non_negative = |v: f32| v.is_finite() && v >= 0.0;
        if !finite_non_negative(self.cut_seed) {
            return Err(ClusterError::InvalidConfig(format!("cut_seed must be >= 0, got {}", self.cut_seed)));
        }
        if !finite_non_negative(self.cut_adjacent) {
            return Err(ClusterError::InvalidConfig(format!("cut_adjacent must be >= 0, got {}", self.cut_adjacent)));
        }
        if let Some(cut) = self.cut_cluster {
            if !finite_non_negative(cut) {
                return Err(ClusterError::InvalidConfig(format!("cut_cluster must be >= 0, got {}", cut)));
            }
        }
        if self.max_samples_per_strip == 0 {
            return Err(ClusterError::InvalidConfig("max_samples_per_strip must be positive".to_string()));
        }
        Ok(())
    }
}

/// Receives the accepted clusters of a scan.
pub trait ClusterSink {
    fn accept(&mut self, cluster: RawCluster);
}

impl ClusterSink for Vec<RawCluster> {
    fn accept(&mut self, cluster: RawCluster) {
        self.push(cluster);
    }
}

/// Counters of one scan, or summed over many.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub samples: usize,
    pub truncated: usize,
    pub candidates: usize,
    pub merges: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub dropped_strips: usize,
}

impl ScanStats {
    pub fn add(&mut self, other: &ScanStats) {
        self.samples += other.samples;
        self.truncated += other.truncated;
        self.candidates += other.candidates;
        self.merges += other.merges;
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.dropped_strips += other.dropped_strips;
    }

    /// Candidates that survived all merges, i.e. the connected components found.
    pub fn components(&self) -> usize {
        self.accepted + self.rejected
    }
}

#[derive(Clone, Debug)]
pub struct Clusterizer {
    config: ClusterizerConfig,
    cache: ClusterCache,
    registry: CandidateRegistry,
    sensor_id: SensorId,
    side: Side,
    stats: ScanStats,
}

impl Clusterizer {
    pub fn new(config: ClusterizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Clusterizer {
            cache: ClusterCache::new(config.max_samples_per_strip),
            config,
            registry: CandidateRegistry::new(),
            sensor_id: SensorId::new(0, 0, 0),
            side: Side::U,
            stats: ScanStats::default(),
        })
    }

    pub fn config(&self) -> &ClusterizerConfig {
        &self.config
    }

    /// Candidates of the current (or last finished) scan.
    pub fn registry(&self) -> &CandidateRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Start a new sensor/side scan, dropping all state of the previous one.
    pub fn begin(&mut self, sensor_id: SensorId, side: Side) {
        self.cache.clear();
        self.registry.clear();
        self.sensor_id = sensor_id;
        self.side = side;
        self.stats = ScanStats::default();
    }

    /// Feed the next sample of the scan.
    ///
    /// Samples must come strip-major, time-minor. Candidates that can no
    /// longer grow are finalized and handed to `sink` as soon as the scan
    /// moves two strips past them.
    pub fn process<S: ClusterSink + ?Sized>(&mut self, sample: Sample, sink: &mut S) -> Result<()> {
        let (strip, time) = sample.scan_key();
        self.cache.check_order(time, strip)?;
        self.stats.samples += 1;

        if !self.cache.accepts(time) {
            log::warn!(
                "sensor {} side {}: time bin {} on strip {} outside window of {} bins, sample dropped",
                self.sensor_id, self.side, time, strip, self.cache.capacity()
            );
            self.stats.truncated += 1;
            return Ok(());
        }

        if self.cache.current_strip().is_some_and(|cur| strip > cur) {
            let done = self.registry.finalize_before(strip);
            self.emit(&done, sink);
        }

        let neighbours = self.cache.find_clusters(time, strip);
        let target = match neighbours.split_first() {
            None => {
                self.stats.candidates += 1;
                self.registry.create(sample)
            }
            Some((&first, rest)) => {
                let mut survivor = first;
                for &other in rest {
                    let merged = self.registry.merge(strip, survivor, other)?;
                    let absorbed = if merged == survivor { other } else { survivor };
                    self.cache.replace(absorbed, merged);
                    survivor = merged;
                    self.stats.merges += 1;
                }
                self.registry.add(survivor, sample)?;
                survivor
            }
        };

        self.cache.set_last(time, strip, target)
    }

    /// Finalize every remaining candidate at the end of the scan.
    pub fn finish<S: ClusterSink + ?Sized>(&mut self, sink: &mut S) -> ScanStats {
        let done = self.registry.finalize_all();
        self.emit(&done, sink);
        self.cache.clear();
        log::debug!(
            "sensor {} side {}: {} samples, {} candidates, {} merges, {} accepted, {} rejected",
            self.sensor_id, self.side, self.stats.samples, self.stats.candidates,
            self.stats.merges, self.stats.accepted, self.stats.rejected
        );
        self.stats.clone()
    }

    fn emit<S: ClusterSink + ?Sized>(&mut self, done: &[CandidateId], sink: &mut S) {
        for &id in done {
            let raw = match self.registry.get(id) {
                Some(candidate) => RawCluster::from_candidate(
                    self.sensor_id,
                    self.side,
                    candidate,
                    self.config.cut_seed,
                    self.config.cut_adjacent,
                    self.config.cut_cluster,
                ),
                None => continue,
            };
            let good = raw.is_good_raw_cluster();
            self.registry.resolve(id, good);
            self.stats.dropped_strips += raw.dropped_strips;
            if good {
                self.stats.accepted += 1;
                sink.accept(raw);
            } else {
                self.stats.rejected += 1;
            }
        }
    }

    /// Run a full scan over sorted samples.
    ///
    /// A contract violation aborts the scan; clusters already handed to
    /// `sink` before the violation stay there.
    pub fn scan<S: ClusterSink + ?Sized>(
        &mut self,
        sensor_id: SensorId,
        side: Side,
        samples: &[Sample],
        sink: &mut S,
    ) -> Result<ScanStats> {
        self.begin(sensor_id, side);
        for sample in samples {
            if let Err(e) = self.process(*sample, sink) {
                log::error!("sensor {} side {}: scan aborted: {}", sensor_id, side, e);
                return Err(e);
            }
        }
        Ok(self.finish(sink))
    }

    /// Convenience wrapper collecting the accepted clusters of one scan.
    pub fn cluster(&mut self, sensor_id: SensorId, side: Side, samples: &[Sample]) -> Result<Vec<RawCluster>> {
        let mut out = Vec::new();
        self.scan(sensor_id, side, samples, &mut out)?;
        Ok(out)
    }
}
