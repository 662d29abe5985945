use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::cluster::candidate::ClusterCandidate;
use crate::detector::sample::Sample;
use crate::detector::sensor::{SensorId, Side};

/// One strip of a raw cluster: the waveform summed per time bin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StripRecord {
    pub cell_id: usize,
    pub first_time: usize,
    pub waveform: Vec<f32>,   // dense from first_time, empty bins are zero
    pub max_sample: f32,
    pub noise: f32,
    pub is_seed: bool,
}

impl StripRecord {
    /// Build the record of one strip from its samples (all on `cell_id`, any order).
    ///
    /// The strip noise is the largest noise among the samples.
    pub fn from_samples(cell_id: usize, samples: &[Sample], is_seed: bool) -> Self {
        let first_time = samples.iter().map(|s| s.time_index).min().unwrap_or(0);
        let last_time = samples.iter().map(|s| s.time_index).max().unwrap_or(first_time);

        let mut waveform = vec![0.0f32; last_time - first_time + 1];
        for s in samples {
            waveform[s.time_index - first_time] += s.amplitude;
        }
        let max_sample = waveform.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let noise = samples.iter().map(|s| s.noise).fold(f32::NEG_INFINITY, f32::max);
        let noise = if noise.is_finite() { noise } else { 1.0 };

        StripRecord { cell_id, first_time, waveform, max_sample, noise, is_seed }
    }

    #[inline]
    pub fn snr(&self) -> f32 {
        self.max_sample / self.noise
    }

    /// Time bin of the waveform maximum (first one on ties).
    pub fn peak_time(&self) -> usize {
        let mut best = 0;
        for (i, v) in self.waveform.iter().enumerate() {
            if *v > self.waveform[best] {
                best = i;
            }
        }
        self.first_time + best
    }

    /// Amplitude-weighted mean time bin, positive bins only.
    pub fn mean_time(&self) -> f32 {
        let (mut wsum, mut tsum) = (0.0f64, 0.0f64);
        for (i, v) in self.waveform.iter().enumerate() {
            if *v > 0.0 {
                wsum += *v as f64;
                tsum += (*v as f64) * (self.first_time + i) as f64;
            }
        }
        if wsum > 0.0 { (tsum / wsum) as f32 } else { self.peak_time() as f32 }
    }
}

/// A finalized candidate converted to per-strip form, with the cuts it is judged by.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawCluster {
    pub sensor_id: SensorId,
    pub side: Side,
    pub strips: Vec<StripRecord>,
    pub seed_max_sample: f32,
    pub seed_internal_index: Option<usize>,
    pub cut_seed: f32,
    pub cut_adjacent: f32,
    pub cut_cluster: Option<f32>,
    pub dropped_strips: usize,
}

impl RawCluster {
    pub fn new(sensor_id: SensorId, side: Side, cut_seed: f32, cut_adjacent: f32, cut_cluster: Option<f32>) -> Self {
        RawCluster {
            sensor_id,
            side,
            strips: Vec::new(),
            seed_max_sample: 0.0,
            seed_internal_index: None,
            cut_seed,
            cut_adjacent,
            cut_cluster,
            dropped_strips: 0,
        }
    }

    /// Group the candidate's samples by strip and admit the strips.
    ///
    /// The seed strip is judged with the noise of the seed sample itself.
    pub fn from_candidate(
        sensor_id: SensorId,
        side: Side,
        candidate: &ClusterCandidate,
        cut_seed: f32,
        cut_adjacent: f32,
        cut_cluster: Option<f32>,
    ) -> Self {
        let mut cluster = RawCluster::new(sensor_id, side, cut_seed, cut_adjacent, cut_cluster);
        let seed = candidate.seed_sample();

        let mut samples = candidate.samples().to_vec();
        samples.sort_by_key(Sample::scan_key);

        let records: Vec<StripRecord> = samples
            .iter()
            .chunk_by(|s| s.strip_index)
            .into_iter()
            .map(|(strip, group)| {
                let strip_samples: Vec<Sample> = group.copied().collect();
                let is_seed = strip == seed.strip_index;
                let mut record = StripRecord::from_samples(strip, &strip_samples, is_seed);
                if is_seed {
                    record.noise = seed.noise;
                }
                record
            })
            .collect();

        cluster.admit_strips(records);
        cluster
    }

    fn is_strong(&self, record: &StripRecord) -> bool {
        record.is_seed || record.snr() >= self.cut_adjacent
    }

    /// Apply the adjacent cut to the strips of one candidate, sorted by strip.
    ///
    /// The seed strip and strips at or above `cut_adjacent` are always taken.
    /// A weaker strip is taken only when a direct neighbour on either side is
    /// one of those. Everything else counts as dropped.
    pub fn admit_strips(&mut self, records: Vec<StripRecord>) {
        let strong: Vec<usize> = records.iter().filter(|r| self.is_strong(r)).map(|r| r.cell_id).collect();
        for record in records {
            let admitted = self.is_strong(&record)
                || strong.iter().any(|&cell| cell.abs_diff(record.cell_id) == 1);
            if !(admitted && self.add_strip(record)) {
                self.dropped_strips += 1;
            }
        }
    }

    /// Append a strip without applying any cut, strips must come in increasing order.
    /// Returns whether it was added.
    pub fn add_strip(&mut self, record: StripRecord) -> bool {
        if self.strips.last().is_some_and(|l| record.cell_id <= l.cell_id) {
            return false;
        }
        if record.is_seed {
            debug_assert!(self.seed_internal_index.is_none(), "second seed strip on {}", record.cell_id);
            self.seed_internal_index = Some(self.strips.len());
            self.seed_max_sample = record.max_sample;
        }
        self.strips.push(record);
        true
    }

    pub fn seed_strip(&self) -> Option<&StripRecord> {
        self.seed_internal_index.and_then(|i| self.strips.get(i))
    }

    pub fn seed_snr(&self) -> f32 {
        match self.seed_strip() {
            Some(s) => self.seed_max_sample / s.noise,
            None => 0.0,
        }
    }

    /// Sum of strip peak ADCs.
    pub fn charge(&self) -> f32 {
        self.strips.iter().map(|s| s.max_sample).sum()
    }

    /// Cluster SNR: summed charge over the quadratic sum of strip noises.
    pub fn cluster_snr(&self) -> f32 {
        let noise2: f32 = self.strips.iter().map(|s| s.noise * s.noise).sum();
        if noise2 > 0.0 { self.charge() / noise2.sqrt() } else { 0.0 }
    }

    pub fn size(&self) -> usize {
        self.strips.len()
    }

    pub fn first_strip(&self) -> Option<usize> {
        self.strips.first().map(|s| s.cell_id)
    }

    pub fn last_strip(&self) -> Option<usize> {
        self.strips.last().map(|s| s.cell_id)
    }

    /// Cluster time from the seed strip waveform.
    pub fn time(&self) -> Option<f32> {
        self.seed_strip().map(StripRecord::mean_time)
    }

    pub fn is_good_raw_cluster(&self) -> bool {
        if self.seed_strip().is_none() || !(self.seed_max_sample > 0.0) {
            return false;
        }
        if self.seed_snr() < self.cut_seed {
            return false;
        }
        match self.cut_cluster {
            Some(cut) => self.cluster_snr() >= cut,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::candidate::CandidateRegistry;

    fn candidate(reg: &mut CandidateRegistry, samples: &[(usize, usize, f32, f32)]) -> ClusterCandidate {
        let mut it = samples.iter().map(|&(st, t, a, n)| Sample::new(st, t, a, n).unwrap());
        let id = reg.create(it.next().unwrap());
        for s in it {
            reg.add(id, s).unwrap();
        }
        reg.get(id).unwrap().clone()
    }

    #[test]
    fn test_accepted_scenario() {
        let mut reg = CandidateRegistry::new();
        let c = candidate(&mut reg, &[(5, 10, 50.0, 5.0), (5, 11, 40.0, 5.0), (6, 11, 8.0, 4.0), (6, 12, 6.0, 4.0)]);
        let raw = RawCluster::from_candidate(SensorId::new(3, 1, 1), Side::U, &c, 5.0, 3.0, None);

        assert_eq!(raw.size(), 2);
        assert_eq!(raw.seed_internal_index, Some(0));
        assert!((raw.seed_max_sample - 50.0).abs() < 1e-6);
        assert!((raw.seed_snr() - 10.0).abs() < 1e-6);
        assert_eq!(raw.strips[0].waveform, vec![50.0, 40.0]);
        assert_eq!(raw.strips[1].first_time, 11);
        assert_eq!(raw.strips[1].waveform, vec![8.0, 6.0]);
        assert_eq!(raw.strips.iter().filter(|s| s.is_seed).count(), 1);
        assert!(raw.is_good_raw_cluster());
    }

    #[test]
    fn test_rejected_scenario() {
        let mut reg = CandidateRegistry::new();
        let c = candidate(&mut reg, &[(3, 4, 10.0, 10.0)]);
        let raw = RawCluster::from_candidate(SensorId::new(3, 1, 1), Side::V, &c, 5.0, 3.0, None);
        assert_eq!(raw.size(), 1);
        assert!(!raw.is_good_raw_cluster());
    }

    #[test]
    fn test_strips_sorted_and_duplicate_bins_summed() {
        let mut reg = CandidateRegistry::new();
        let c = candidate(&mut reg, &[(8, 2, 30.0, 1.0), (7, 3, 20.0, 1.0), (7, 3, 5.0, 1.0), (7, 5, 1.0, 1.0)]);
        let raw = RawCluster::from_candidate(SensorId::new(3, 1, 1), Side::U, &c, 5.0, 3.0, None);

        assert_eq!(raw.first_strip(), Some(7));
        assert_eq!(raw.last_strip(), Some(8));
        assert_eq!(raw.strips[0].waveform, vec![25.0, 0.0, 1.0]);
        assert!((raw.strips[0].max_sample - 25.0).abs() < 1e-6);
        assert_eq!(raw.strips[0].peak_time(), 3);
        assert_eq!(raw.seed_internal_index, Some(1));
    }

    #[test]
    fn test_adjacent_cut_limits_plateau() {
        let mut reg = CandidateRegistry::new();
        // low plateau on both sides of the seed, only the direct neighbours stay
        let c = candidate(
            &mut reg,
            &[
                (1, 0, 2.0, 1.0),
                (2, 0, 2.0, 1.0),
                (3, 0, 20.0, 1.0),
                (4, 0, 2.0, 1.0),
                (5, 0, 2.0, 1.0),
                (6, 0, 2.0, 1.0),
            ],
        );
        let raw = RawCluster::from_candidate(SensorId::new(3, 1, 1), Side::U, &c, 5.0, 3.0, None);
        let cells: Vec<usize> = raw.strips.iter().map(|s| s.cell_id).collect();
        assert_eq!(cells, vec![2, 3, 4]);
        assert_eq!(raw.dropped_strips, 3);
        assert!(raw.is_good_raw_cluster());
    }

    #[test]
    fn test_strong_neighbours_are_kept() {
        let mut reg = CandidateRegistry::new();
        let c = candidate(&mut reg, &[(1, 0, 4.0, 1.0), (2, 0, 20.0, 1.0), (3, 0, 4.0, 1.0), (4, 0, 1.0, 1.0)]);
        let raw = RawCluster::from_candidate(SensorId::new(3, 1, 1), Side::U, &c, 5.0, 3.0, None);
        let cells: Vec<usize> = raw.strips.iter().map(|s| s.cell_id).collect();
        assert_eq!(cells, vec![1, 2, 3, 4]);
        assert_eq!(raw.seed_internal_index, Some(1));
    }

    #[test]
    fn test_add_strip_requires_increasing_order() {
        let mut raw = RawCluster::new(SensorId::new(3, 1, 1), Side::U, 5.0, 3.0, None);
        let s = |cell: usize, amp: f32, seed: bool| {
            StripRecord::from_samples(cell, &[Sample::new(cell, 0, amp, 1.0).unwrap()], seed)
        };
        assert!(raw.add_strip(s(4, 10.0, true)));
        assert!(!raw.add_strip(s(4, 10.0, false)));
        assert!(!raw.add_strip(s(2, 10.0, false)));
        assert!(raw.add_strip(s(5, 10.0, false)));
        assert_eq!(raw.size(), 2);
    }

    #[test]
    fn test_cluster_charge_cut() {
        let mut reg = CandidateRegistry::new();
        let c = candidate(&mut reg, &[(1, 0, 6.0, 1.0), (2, 0, 1.0, 1.0)]);
        let loose = RawCluster::from_candidate(SensorId::new(3, 1, 1), Side::U, &c, 5.0, 3.0, Some(4.0));
        let tight = RawCluster::from_candidate(SensorId::new(3, 1, 1), Side::U, &c, 5.0, 3.0, Some(8.0));

        // (6 + 1) / sqrt(2)
        assert!((loose.cluster_snr() - 7.0 / 2.0f32.sqrt()).abs() < 1e-4);
        assert!(loose.is_good_raw_cluster());
        assert!(!tight.is_good_raw_cluster());
    }

    #[test]
    fn test_weak_neighbour_kept_on_either_side() {
        let mut reg = CandidateRegistry::new();
        let right = candidate(&mut reg, &[(10, 0, 50.0, 5.0), (11, 0, 10.0, 5.0)]);
        let left = candidate(&mut reg, &[(9, 0, 10.0, 5.0), (10, 0, 50.0, 5.0)]);
        let right = RawCluster::from_candidate(SensorId::new(3, 1, 1), Side::U, &right, 5.0, 3.0, None);
        let left = RawCluster::from_candidate(SensorId::new(3, 1, 1), Side::U, &left, 5.0, 3.0, None);

        assert_eq!(right.size(), 2);
        assert_eq!(left.size(), 2);
        assert_eq!(left.seed_internal_index, Some(1));
        assert_eq!(left.dropped_strips, 0);
    }

    #[test]
    fn test_weak_strip_between_weak_strips_dropped() {
        let mut reg = CandidateRegistry::new();
        let c = candidate(&mut reg, &[(1, 0, 20.0, 1.0), (2, 0, 1.0, 1.0), (3, 0, 1.0, 1.0), (4, 0, 1.0, 1.0), (5, 0, 10.0, 1.0)]);
        let raw = RawCluster::from_candidate(SensorId::new(3, 1, 1), Side::U, &c, 5.0, 3.0, None);
        let cells: Vec<usize> = raw.strips.iter().map(|s| s.cell_id).collect();
        assert_eq!(cells, vec![1, 2, 4, 5]);
        assert_eq!(raw.dropped_strips, 1);
    }

    #[test]
    fn test_seed_judged_with_its_own_noise() {
        let mut reg = CandidateRegistry::new();
        // the seed (20 ADC, noise 5) has SNR 4, the weak sample before it has noise 1
        let c = candidate(&mut reg, &[(1, 0, 2.0, 1.0), (1, 1, 20.0, 5.0)]);
        let raw = RawCluster::from_candidate(SensorId::new(3, 1, 1), Side::U, &c, 5.0, 3.0, None);

        assert!((raw.seed_snr() - 4.0).abs() < 1e-6);
        assert!(!raw.is_good_raw_cluster());
    }

    #[test]
    fn test_strip_noise_is_largest_sample_noise() {
        let rec = StripRecord::from_samples(
            0,
            &[Sample::new(0, 0, 10.0, 1.0).unwrap(), Sample::new(0, 1, 12.0, 3.0).unwrap()],
            false,
        );
        assert!((rec.noise - 3.0).abs() < 1e-6);
        assert!((rec.snr() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_mean_time() {
        let rec = StripRecord::from_samples(
            0,
            &[Sample::new(0, 2, 10.0, 1.0).unwrap(), Sample::new(0, 3, 30.0, 1.0).unwrap()],
            true,
        );
        assert!((rec.mean_time() - 2.75).abs() < 1e-5);
    }
}
