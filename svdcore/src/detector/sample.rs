use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, Result};

/// One above-threshold reading of a strip in one time bin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub strip_index: usize,
    pub time_index: usize,
    pub amplitude: f32,
    pub noise: f32,
}

impl Sample {
    /// Create a new sample
    ///
    /// # Arguments
    ///
    /// * `strip_index` - readout channel on the sensor side
    /// * `time_index` - discretized time bin
    /// * `amplitude` - measured ADC amplitude
    /// * `noise` - strip noise, must be positive and finite
    ///
    /// # Returns
    ///
    /// * `Err(ClusterError::InvalidNoise)` if the noise cannot be used for SNR
    ///
    pub fn new(strip_index: usize, time_index: usize, amplitude: f32, noise: f32) -> Result<Self> {
        if !(noise.is_finite() && noise > 0.0) {
            return Err(ClusterError::InvalidNoise { strip: strip_index, noise });
        }
        Ok(Sample { strip_index, time_index, amplitude, noise })
    }

    #[inline]
    pub fn snr(&self) -> f32 {
        self.amplitude / self.noise
    }

    /// Same strip with consecutive time bins, or neighbouring strips at most one bin apart.
    pub fn is_adjacent(&self, other: &Sample) -> bool {
        let d_strip = self.strip_index.abs_diff(other.strip_index);
        let d_time = self.time_index.abs_diff(other.time_index);
        match d_strip {
            0 => d_time == 1,
            1 => d_time <= 1,
            _ => false,
        }
    }

    #[inline]
    pub fn same_position(&self, other: &Sample) -> bool {
        self.strip_index == other.strip_index && self.time_index == other.time_index
    }

    /// Sort key of the scan order: strip major, time minor.
    #[inline]
    pub fn scan_key(&self) -> (usize, usize) {
        (self.strip_index, self.time_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snr() {
        let s = Sample::new(5, 10, 50.0, 5.0).unwrap();
        assert!((s.snr() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_bad_noise() {
        assert_eq!(
            Sample::new(3, 1, 10.0, 0.0),
            Err(ClusterError::InvalidNoise { strip: 3, noise: 0.0 })
        );
        assert!(Sample::new(3, 1, 10.0, -1.0).is_err());
        assert!(Sample::new(3, 1, 10.0, f32::NAN).is_err());
    }

    #[test]
    fn test_adjacency() {
        let a = Sample::new(5, 10, 1.0, 1.0).unwrap();
        let same_strip_next = Sample::new(5, 11, 1.0, 1.0).unwrap();
        let same_strip_gap = Sample::new(5, 12, 1.0, 1.0).unwrap();
        let next_strip_same = Sample::new(6, 10, 1.0, 1.0).unwrap();
        let next_strip_early = Sample::new(6, 9, 1.0, 1.0).unwrap();
        let next_strip_gap = Sample::new(6, 12, 1.0, 1.0).unwrap();
        let far_strip = Sample::new(7, 10, 1.0, 1.0).unwrap();

        assert!(a.is_adjacent(&same_strip_next));
        assert!(!a.is_adjacent(&same_strip_gap));
        assert!(a.is_adjacent(&next_strip_same));
        assert!(a.is_adjacent(&next_strip_early));
        assert!(!a.is_adjacent(&next_strip_gap));
        assert!(!a.is_adjacent(&far_strip));
        assert!(!a.is_adjacent(&a));
        assert!(a.same_position(&a));
    }
}
