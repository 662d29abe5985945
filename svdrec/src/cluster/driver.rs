use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use svdcore::{ClusterHit, Clusterizer, RawCluster, ScanStats};

use crate::config::RecConfig;
use crate::data::calibration::NoiseSource;
use crate::data::event::{EventData, SensorScan};
use crate::data::handle::SampleStore;
use crate::error::{RecError, Result};

/// Accepted clusters of one event, ordered by sensor, side and first strip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventClusters {
    pub event: u32,
    pub clusters: Vec<RawCluster>,
    pub hits: Vec<ClusterHit>,
    pub stats: ScanStats,
}

/// Runs one cluster finder per sensor/side scan on a dedicated rayon pool.
pub struct ClusterDriver {
    config: RecConfig,
    pool: ThreadPool,
}

impl ClusterDriver {
    pub fn new(config: RecConfig) -> Result<Self> {
        config.clusterizer.validate()?;
        let pool = ThreadPoolBuilder::new().num_threads(config.num_threads).build()?;
        Ok(ClusterDriver { config, pool })
    }

    pub fn config(&self) -> &RecConfig {
        &self.config
    }

    fn scan(&self, scan: &SensorScan) -> Result<(Vec<RawCluster>, ScanStats)> {
        let mut clusterizer = Clusterizer::new(self.config.clusterizer.clone())?;
        let mut clusters = Vec::new();
        let stats = clusterizer
            .scan(scan.sensor_id, scan.side, &scan.samples, &mut clusters)
            .map_err(|source| RecError::Scan { sensor: scan.sensor_id, side: scan.side, source })?;
        Ok((clusters, stats))
    }

    pub fn cluster_event(&self, event: &EventData) -> Result<EventClusters> {
        let results: Vec<(Vec<RawCluster>, ScanStats)> = self.pool.install(|| {
            event.scans.par_iter().map(|scan| self.scan(scan)).collect::<Result<Vec<_>>>()
        })?;

        let mut stats = ScanStats::default();
        let mut clusters = Vec::new();
        for (found, scan_stats) in results {
            stats.add(&scan_stats);
            clusters.extend(found);
        }
        clusters.sort_by_key(|c| (c.sensor_id, c.side, c.first_strip()));

        let hits = self.hits(&clusters);
        log::info!(
            "event {}: {} scans, {} samples, {} clusters accepted, {} rejected, {} truncated",
            event.event,
            event.scans.len(),
            stats.samples,
            stats.accepted,
            stats.rejected,
            stats.truncated
        );
        Ok(EventClusters { event: event.event, clusters, hits, stats })
    }

    /// Read and cluster the given events one after the other.
    pub fn cluster_store<N: NoiseSource + ?Sized>(
        &self,
        store: &SampleStore,
        events: &[u32],
        noise: &N,
    ) -> Result<Vec<EventClusters>> {
        let mut out = Vec::with_capacity(events.len());
        for &event in events {
            let (data, _) = store.read_event(
                event,
                noise,
                self.config.zero_suppression_snr,
                self.config.require_noise,
            )?;
            out.push(self.cluster_event(&data)?);
        }
        Ok(out)
    }

    /// Position summaries; clusters outside the configured geometry are skipped.
    pub fn hits(&self, clusters: &[RawCluster]) -> Vec<ClusterHit> {
        clusters
            .iter()
            .filter_map(|c| {
                let hit = ClusterHit::from_raw(c, &self.config.geometry);
                if hit.is_none() {
                    log::warn!(
                        "sensor {} side {}: cluster at strip {:?} outside geometry, no hit",
                        c.sensor_id, c.side, c.first_strip()
                    );
                }
                hit
            })
            .collect()
    }
}

/// Total counters over several events.
pub fn total_stats(events: &[EventClusters]) -> ScanStats {
    let mut total = ScanStats::default();
    for e in events {
        total.add(&e.stats);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::calibration::ConstantNoise;
    use svdcore::{ClusterError, Sample, SensorId, Side};

    fn scan(sensor: SensorId, side: Side, raw: &[(usize, usize, f32)]) -> SensorScan {
        SensorScan {
            sensor_id: sensor,
            side,
            samples: raw.iter().map(|&(st, t, a)| Sample::new(st, t, a, 2.0).unwrap()).collect(),
        }
    }

    fn driver() -> ClusterDriver {
        let mut config = RecConfig::default();
        config.num_threads = 2;
        ClusterDriver::new(config).unwrap()
    }

    #[test]
    fn test_event_ordering_and_stats() {
        let a = SensorId::new(3, 1, 1);
        let b = SensorId::new(3, 1, 2);
        let event = EventData {
            event: 5,
            scans: vec![
                scan(a, Side::U, &[(10, 0, 20.0), (10, 1, 30.0), (40, 2, 12.0), (41, 2, 7.0)]),
                scan(a, Side::V, &[(2, 0, 4.0)]),
                scan(b, Side::U, &[(0, 0, 50.0)]),
            ],
        };
        let result = driver().cluster_event(&event).unwrap();

        assert_eq!(result.event, 5);
        assert_eq!(result.clusters.len(), 3);
        assert_eq!(result.stats.samples, 6);
        assert_eq!(result.stats.rejected, 1);
        let keys: Vec<_> = result.clusters.iter().map(|c| (c.sensor_id, c.side, c.first_strip())).collect();
        assert_eq!(keys, vec![(a, Side::U, Some(10)), (a, Side::U, Some(40)), (b, Side::U, Some(0))]);
        assert_eq!(result.hits.len(), 3);
    }

    #[test]
    fn test_unsorted_scan_reports_sensor() {
        let a = SensorId::new(4, 2, 1);
        let event = EventData { event: 1, scans: vec![scan(a, Side::V, &[(5, 0, 20.0), (4, 0, 20.0)])] };
        match driver().cluster_event(&event) {
            Err(RecError::Scan { sensor, side, source }) => {
                assert_eq!(sensor, a);
                assert_eq!(side, Side::V);
                assert_eq!(source, ClusterError::UnsortedStrip { previous: 5, got: 4 });
            }
            other => panic!("expected scan error, got {:?}", other),
        }
    }

    #[test]
    fn test_cluster_store() {
        let mut store = SampleStore::in_memory().unwrap();
        store.create_schema().unwrap();
        let a = SensorId::new(3, 1, 1);
        for n in [1, 2] {
            let event = EventData { event: n, scans: vec![scan(a, Side::U, &[(10, 0, 20.0), (11, 0, 8.0)])] };
            store.write_event(&event).unwrap();
        }
        let events = store.read_events().unwrap();
        let results = driver().cluster_store(&store, &events, &ConstantNoise(2.0)).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[1].event, 2);
        assert_eq!(results[0].clusters[0].size(), 2);
        assert_eq!(total_stats(&results).accepted, 2);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = RecConfig::default();
        config.clusterizer.max_samples_per_strip = 0;
        assert!(ClusterDriver::new(config).is_err());
    }
}
