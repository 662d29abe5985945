//! Cluster candidates and the arena that owns them during one scan.
//!
//! The cache never holds candidates, only `CandidateId`s into the
//! `CandidateRegistry`. A merge moves the samples of the younger candidate
//! into the older one and leaves the younger one behind as `Absorbed`.

use std::fmt;

use crate::detector::sample::Sample;
use crate::error::{ClusterError, Result};

/// Index of a candidate in the registry of the current scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId(pub usize);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateState {
    /// still accepting adjacent samples
    Open,
    /// the scan moved past every strip that could extend it
    Finalized,
    Accepted,
    Rejected,
    Absorbed { into: CandidateId },
}

#[derive(Clone, Debug)]
pub struct ClusterCandidate {
    id: CandidateId,
    samples: Vec<Sample>,
    seed: usize,          // index into samples
    seed_order: usize,    // scan position of the seed, used for tie-breaks
    charge: f32,
    strip_bounds: (usize, usize),
    time_bounds: (usize, usize),
    state: CandidateState,
}

impl ClusterCandidate {
    fn new(id: CandidateId, sample: Sample, order: usize) -> Self {
        ClusterCandidate {
            id,
            samples: vec![sample],
            seed: 0,
            seed_order: order,
            charge: sample.amplitude,
            strip_bounds: (sample.strip_index, sample.strip_index),
            time_bounds: (sample.time_index, sample.time_index),
            state: CandidateState::Open,
        }
    }

    fn add(&mut self, sample: Sample, order: usize) {
        // strictly greater: on ties the earlier sample keeps the seed
        if sample.amplitude > self.seed_sample().amplitude {
            self.seed = self.samples.len();
            self.seed_order = order;
        }
        self.charge += sample.amplitude;
        self.strip_bounds = (
            self.strip_bounds.0.min(sample.strip_index),
            self.strip_bounds.1.max(sample.strip_index),
        );
        self.time_bounds = (
            self.time_bounds.0.min(sample.time_index),
            self.time_bounds.1.max(sample.time_index),
        );
        self.samples.push(sample);
    }

    fn absorb(&mut self, mut other: ClusterCandidate) {
        let other_seed = other.seed_sample();
        let take_other_seed = other_seed.amplitude > self.seed_sample().amplitude
            || (other_seed.amplitude == self.seed_sample().amplitude && other.seed_order < self.seed_order);

        if take_other_seed {
            self.seed = self.samples.len() + other.seed;
            self.seed_order = other.seed_order;
        }
        self.charge += other.charge;
        self.strip_bounds = (
            self.strip_bounds.0.min(other.strip_bounds.0),
            self.strip_bounds.1.max(other.strip_bounds.1),
        );
        self.time_bounds = (
            self.time_bounds.0.min(other.time_bounds.0),
            self.time_bounds.1.max(other.time_bounds.1),
        );
        self.samples.append(&mut other.samples);
    }

    pub fn id(&self) -> CandidateId {
        self.id
    }

    /// Samples in discovery order, not geometric order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn seed_sample(&self) -> &Sample {
        &self.samples[self.seed]
    }

    pub fn charge(&self) -> f32 {
        self.charge
    }

    pub fn strip_bounds(&self) -> (usize, usize) {
        self.strip_bounds
    }

    pub fn time_bounds(&self) -> (usize, usize) {
        self.time_bounds
    }

    pub fn state(&self) -> CandidateState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == CandidateState::Open
    }

    pub fn is_alive(&self) -> bool {
        !matches!(self.state, CandidateState::Absorbed { .. })
    }

    /// Largest per-sample SNR, which is what the seed cut ultimately sees per strip.
    pub fn max_snr(&self) -> f32 {
        self.samples.iter().map(Sample::snr).fold(f32::NEG_INFINITY, f32::max)
    }

    fn finalize(&mut self) {
        if self.state == CandidateState::Open {
            self.state = CandidateState::Finalized;
        }
    }

    fn resolve(&mut self, accepted: bool) {
        debug_assert_eq!(self.state, CandidateState::Finalized, "candidate {} resolved twice", self.id);
        if self.state == CandidateState::Finalized {
            self.state = if accepted { CandidateState::Accepted } else { CandidateState::Rejected };
        }
    }
}

/// Arena of every candidate created during one sensor/side scan.
#[derive(Clone, Debug, Default)]
pub struct CandidateRegistry {
    candidates: Vec<ClusterCandidate>,
    open: Vec<CandidateId>,
    next_order: usize,
}

impl CandidateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
        self.open.clear();
        self.next_order = 0;
    }

    fn next_order(&mut self) -> usize {
        let order = self.next_order;
        self.next_order += 1;
        order
    }

    pub fn create(&mut self, sample: Sample) -> CandidateId {
        let id = CandidateId(self.candidates.len());
        let order = self.next_order();
        self.candidates.push(ClusterCandidate::new(id, sample, order));
        self.open.push(id);
        id
    }

    pub fn add(&mut self, id: CandidateId, sample: Sample) -> Result<()> {
        let order = self.next_order();
        let candidate = self.open_mut(id)?;
        candidate.add(sample, order);
        Ok(())
    }

    /// Merge two open candidates found next to `strip_index`.
    ///
    /// The older candidate (lower id) survives and receives the samples of
    /// the younger one. Returns the surviving id; the caller is responsible
    /// for rewriting cached positions of the absorbed id.
    pub fn merge(&mut self, strip_index: usize, a: CandidateId, b: CandidateId) -> Result<CandidateId> {
        if a == b {
            self.open_mut(a)?;
            return Ok(a);
        }
        let (survivor, absorbed) = if a < b { (a, b) } else { (b, a) };
        self.open_mut(survivor)?;
        let donor = {
            let c = self.open_mut(absorbed)?;
            let donor = ClusterCandidate { samples: std::mem::take(&mut c.samples), ..*c };
            c.seed = 0;
            c.charge = 0.0;
            c.state = CandidateState::Absorbed { into: survivor };
            donor
        };
        log::trace!("strip {}: merging candidate {} into {}", strip_index, absorbed, survivor);

        self.candidates[survivor.0].absorb(donor);
        self.open.retain(|&c| c != absorbed);
        Ok(survivor)
    }

    pub fn get(&self, id: CandidateId) -> Option<&ClusterCandidate> {
        self.candidates.get(id.0).filter(|c| c.is_alive())
    }

    fn open_mut(&mut self, id: CandidateId) -> Result<&mut ClusterCandidate> {
        match self.candidates.get_mut(id.0) {
            Some(c) if c.is_open() => Ok(c),
            _ => Err(ClusterError::DeadCandidate(id.0)),
        }
    }

    /// Finalize every open candidate that no sample on `strip_index` or later can reach.
    pub fn finalize_before(&mut self, strip_index: usize) -> Vec<CandidateId> {
        let candidates = &mut self.candidates;
        let mut done = Vec::new();
        self.open.retain(|&id| {
            let c = &mut candidates[id.0];
            if c.strip_bounds.1.saturating_add(1) < strip_index {
                c.finalize();
                done.push(id);
                false
            } else {
                true
            }
        });
        done
    }

    pub fn finalize_all(&mut self) -> Vec<CandidateId> {
        let open = std::mem::take(&mut self.open);
        for id in &open {
            self.candidates[id.0].finalize();
        }
        open
    }

    pub fn resolve(&mut self, id: CandidateId, accepted: bool) {
        if let Some(c) = self.candidates.get_mut(id.0) {
            c.resolve(accepted);
        }
    }

    /// All candidates that were not absorbed by a merge.
    pub fn live(&self) -> impl Iterator<Item = &ClusterCandidate> {
        self.candidates.iter().filter(|c| c.is_alive())
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Number of candidates ever created, absorbed ones included.
    pub fn created(&self) -> usize {
        self.candidates.len()
    }
}
