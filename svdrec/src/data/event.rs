use serde::{Deserialize, Serialize};
use svdcore::{Sample, SensorId, Side};

use crate::data::calibration::NoiseSource;
use crate::error::{RecError, Result};

/// One digitized readout as stored, before calibration is attached.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub sensor_id: SensorId,
    pub side: Side,
    pub strip: usize,
    pub time: usize,
    pub amplitude: f32,
}

impl SampleRow {
    fn scan_key(&self) -> (SensorId, Side, usize, usize) {
        (self.sensor_id, self.side, self.strip, self.time)
    }
}

/// Sorted samples of one sensor side, the unit of work of the cluster finder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorScan {
    pub sensor_id: SensorId,
    pub side: Side,
    pub samples: Vec<Sample>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub event: u32,
    pub scans: Vec<SensorScan>,
}

/// What happened to the rows while building an event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub rows: usize,
    pub suppressed: usize,
    pub missing_noise: usize,
}

impl EventData {
    /// Attach noise to the rows and split them into sorted per sensor/side scans.
    ///
    /// Rows below `zero_suppression_snr` are dropped. Rows of strips without
    /// noise are dropped with a warning, or fail the event when `require_noise` is set.
    pub fn from_rows<N: NoiseSource + ?Sized>(
        event: u32,
        mut rows: Vec<SampleRow>,
        noise: &N,
        zero_suppression_snr: Option<f32>,
        require_noise: bool,
    ) -> Result<(Self, ReadStats)> {
        rows.sort_by(|a, b| a.scan_key().cmp(&b.scan_key()));

        let mut stats = ReadStats { rows: rows.len(), ..ReadStats::default() };
        let mut scans: Vec<SensorScan> = Vec::new();

        for row in rows {
            let n = match noise.noise(row.sensor_id, row.side, row.strip) {
                Some(n) => n,
                None if require_noise => {
                    return Err(RecError::MissingNoise { sensor: row.sensor_id, side: row.side, strip: row.strip });
                }
                None => {
                    log::warn!(
                        "event {}: no noise for sensor {} side {} strip {}, sample skipped",
                        event, row.sensor_id, row.side, row.strip
                    );
                    stats.missing_noise += 1;
                    continue;
                }
            };
            let sample = Sample::new(row.strip, row.time, row.amplitude, n)?;
            if zero_suppression_snr.is_some_and(|cut| sample.snr() < cut) {
                stats.suppressed += 1;
                continue;
            }

            match scans.last_mut() {
                Some(scan) if scan.sensor_id == row.sensor_id && scan.side == row.side => scan.samples.push(sample),
                _ => scans.push(SensorScan { sensor_id: row.sensor_id, side: row.side, samples: vec![sample] }),
            }
        }

        Ok((EventData { event, scans }, stats))
    }

    pub fn n_samples(&self) -> usize {
        self.scans.iter().map(|s| s.samples.len()).sum()
    }

    /// Flatten back into rows, noise is not kept.
    pub fn to_rows(&self) -> Vec<SampleRow> {
        self.scans
            .iter()
            .flat_map(|scan| {
                scan.samples.iter().map(move |s| SampleRow {
                    sensor_id: scan.sensor_id,
                    side: scan.side,
                    strip: s.strip_index,
                    time: s.time_index,
                    amplitude: s.amplitude,
                })
            })
            .collect()
    }
}
