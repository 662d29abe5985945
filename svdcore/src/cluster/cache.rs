//! Sliding two-strip window used by the streaming cluster finder.
//!
//! Samples arrive strip-major, time-minor. Under the adjacency rule a sample
//! can only touch the strip it sits on and the strip right below it, so the
//! cache keeps exactly two rows (time bin -> candidate id): the strip being
//! filled and the one before it.

use itertools::Itertools;

use crate::cluster::candidate::CandidateId;
use crate::error::{ClusterError, Result};

#[derive(Clone, Debug)]
pub struct ClusterCache {
    max_samples_per_strip: usize,
    current_strip: Option<usize>,
    previous_strip: Option<usize>,
    last_time: Option<usize>,
    current_row: Vec<Option<CandidateId>>,
    previous_row: Vec<Option<CandidateId>>,
}

impl ClusterCache {
    /// Create a cache addressing `max_samples_per_strip` time bins per strip (at least one).
    pub fn new(max_samples_per_strip: usize) -> Self {
        let capacity = max_samples_per_strip.max(1);
        ClusterCache {
            max_samples_per_strip: capacity,
            current_strip: None,
            previous_strip: None,
            last_time: None,
            current_row: vec![None; capacity],
            previous_row: vec![None; capacity],
        }
    }

    /// Forget every assignment, must be called before each sensor/side scan.
    pub fn clear(&mut self) {
        self.current_strip = None;
        self.previous_strip = None;
        self.last_time = None;
        self.current_row.fill(None);
        self.previous_row.fill(None);
    }

    pub fn capacity(&self) -> usize {
        self.max_samples_per_strip
    }

    pub fn current_strip(&self) -> Option<usize> {
        self.current_strip
    }

    #[inline]
    pub fn accepts(&self, time_index: usize) -> bool {
        time_index < self.max_samples_per_strip
    }

    /// Validate that `(strip_index, time_index)` continues the scan order.
    pub fn check_order(&self, time_index: usize, strip_index: usize) -> Result<()> {
        match self.current_strip {
            Some(cur) if strip_index < cur => Err(ClusterError::UnsortedStrip { previous: cur, got: strip_index }),
            Some(cur) if strip_index == cur => match self.last_time {
                Some(last) if time_index < last => Err(ClusterError::UnsortedTime {
                    strip: strip_index,
                    previous: last,
                    got: time_index,
                }),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Record that `(strip_index, time_index)` now belongs to `candidate`.
    ///
    /// Advancing to a new strip rotates the rows first. The previous row is
    /// only kept when the new strip is its direct neighbour.
    pub fn set_last(&mut self, time_index: usize, strip_index: usize, candidate: CandidateId) -> Result<()> {
        self.check_order(time_index, strip_index)?;
        if !self.accepts(time_index) {
            return Err(ClusterError::TimeOutOfWindow {
                strip: strip_index,
                time: time_index,
                capacity: self.max_samples_per_strip,
            });
        }

        if self.current_strip != Some(strip_index) {
            self.rotate(strip_index);
        }
        self.current_row[time_index] = Some(candidate);
        self.last_time = Some(time_index);
        Ok(())
    }

    fn rotate(&mut self, strip_index: usize) {
        match self.current_strip {
            Some(cur) if cur.checked_add(1) == Some(strip_index) => {
                std::mem::swap(&mut self.previous_row, &mut self.current_row);
                self.previous_strip = Some(cur);
            }
            _ => {
                self.previous_row.fill(None);
                self.previous_strip = None;
            }
        }
        self.current_row.fill(None);
        self.current_strip = Some(strip_index);
        self.last_time = None;
    }

    fn row(&self, strip_index: usize) -> Option<&[Option<CandidateId>]> {
        if self.current_strip == Some(strip_index) {
            Some(&self.current_row)
        } else if self.previous_strip == Some(strip_index) {
            Some(&self.previous_row)
        } else {
            None
        }
    }

    #[inline]
    fn lookup(&self, strip_index: usize, time_index: usize) -> Option<CandidateId> {
        self.row(strip_index)
            .and_then(|row| row.get(time_index).copied())
            .flatten()
    }

    /// Positions a sample at `(strip_index, time_index)` may connect to, in lookup order:
    /// the preceding bin and the identical bin on the same strip, then bins -1, 0, +1
    /// on the strip below.
    fn neighbours(&self, time_index: usize, strip_index: usize) -> [Option<CandidateId>; 5] {
        let before = time_index.checked_sub(1);
        let below = strip_index.checked_sub(1);

        let at = |strip: Option<usize>, time: Option<usize>| match (strip, time) {
            (Some(s), Some(t)) => self.lookup(s, t),
            _ => None,
        };

        [
            at(Some(strip_index), before),
            at(Some(strip_index), Some(time_index)),
            at(below, before),
            at(below, Some(time_index)),
            at(below, time_index.checked_add(1)),
        ]
    }

    /// First candidate adjacent to `(strip_index, time_index)`, if any.
    pub fn find_cluster(&self, time_index: usize, strip_index: usize) -> Option<CandidateId> {
        self.neighbours(time_index, strip_index).into_iter().flatten().next()
    }

    /// Every distinct candidate adjacent to `(strip_index, time_index)`, in lookup order.
    pub fn find_clusters(&self, time_index: usize, strip_index: usize) -> Vec<CandidateId> {
        self.neighbours(time_index, strip_index)
            .into_iter()
            .flatten()
            .unique()
            .collect()
    }

    /// Point every cached position of `from` at `to`.
    pub fn replace(&mut self, from: CandidateId, to: CandidateId) {
        for slot in self.current_row.iter_mut().chain(self.previous_row.iter_mut()) {
            if *slot == Some(from) {
                *slot = Some(to);
            }
        }
    }

    /// True if any cached position still points at `candidate`.
    pub fn references(&self, candidate: CandidateId) -> bool {
        self.current_row.iter().chain(self.previous_row.iter()).any(|c| *c == Some(candidate))
    }
}
