//! Synthetic readout: Gaussian electronic noise plus particle hits sharing
//! charge over neighbouring strips and a few time bins.

use std::collections::BTreeMap;

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use svdcore::{SensorId, Side};

use crate::data::calibration::{NoiseSource, NoiseTable};
use crate::data::event::{EventData, SampleRow};
use crate::data::handle::SampleStore;
use crate::error::{RecError, Result};

// relative pulse height per time bin after the hit
const PULSE_SHAPE: [f32; 4] = [0.6, 1.0, 0.8, 0.5];

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub sensors: Vec<SensorId>,
    pub u_strips: usize,
    pub v_strips: usize,
    pub time_bins: usize,
    /// mean strip noise in ADC counts
    pub noise_sigma: f32,
    /// fraction of strip/time cells carrying a noise sample
    pub noise_occupancy: f64,
    pub hits_per_side: usize,
    pub hit_charge_mean: f32,
    pub hit_charge_sigma: f32,
    /// cells below this SNR are not read out
    pub zero_suppression_snr: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            sensors: vec![SensorId::new(3, 1, 1), SensorId::new(3, 1, 2), SensorId::new(4, 1, 1)],
            u_strips: 768,
            v_strips: 512,
            time_bins: 32,
            noise_sigma: 2.0,
            noise_occupancy: 0.01,
            hits_per_side: 3,
            hit_charge_mean: 60.0,
            hit_charge_sigma: 15.0,
            zero_suppression_snr: 3.0,
        }
    }
}

pub struct EventGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    noise: NoiseTable,
    unit_normal: Normal,
    charge: Normal,
}

impl EventGenerator {
    pub fn new(config: GeneratorConfig, seed: u64) -> Result<Self> {
        if config.time_bins < PULSE_SHAPE.len() || config.u_strips == 0 || config.v_strips == 0 {
            return Err(RecError::Generator(format!(
                "need at least one strip per side and {} time bins",
                PULSE_SHAPE.len()
            )));
        }
        if !(0.0..=1.0).contains(&config.noise_occupancy) || config.noise_sigma <= 0.0 {
            return Err(RecError::Generator("noise occupancy must be in [0, 1], noise sigma positive".to_string()));
        }
        if !(config.zero_suppression_snr > 0.0) {
            return Err(RecError::Generator("zero suppression SNR must be positive".to_string()));
        }
        let unit_normal = Normal::new(0.0, 1.0).map_err(|e| RecError::Generator(e.to_string()))?;
        let charge = Normal::new(config.hit_charge_mean as f64, config.hit_charge_sigma as f64)
            .map_err(|e| RecError::Generator(e.to_string()))?;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut noise = NoiseTable::new();
        for &sensor in &config.sensors {
            for side in Side::both() {
                for strip in 0..Self::strips(&config, side) {
                    let n = config.noise_sigma * rng.gen_range(0.8f32..1.2);
                    noise.insert(sensor, side, strip, n);
                }
            }
        }

        Ok(EventGenerator { config, rng, noise, unit_normal, charge })
    }

    fn strips(config: &GeneratorConfig, side: Side) -> usize {
        match side {
            Side::U => config.u_strips,
            Side::V => config.v_strips,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Per-strip noise the events are generated with.
    pub fn noise_table(&self) -> &NoiseTable {
        &self.noise
    }

    fn strip_noise(&self, sensor: SensorId, side: Side, strip: usize) -> f32 {
        self.noise.noise(sensor, side, strip).unwrap_or(self.config.noise_sigma)
    }

    pub fn generate(&mut self, event: u32) -> Result<EventData> {
        let mut cells: BTreeMap<(SensorId, Side, usize, usize), f32> = BTreeMap::new();
        let sensors = self.config.sensors.clone();

        for sensor in sensors {
            for side in Side::both() {
                let n_strips = Self::strips(&self.config, side);
                let n_cells = (n_strips * self.config.time_bins) as f64 * self.config.noise_occupancy;

                for _ in 0..n_cells.round() as usize {
                    let strip = self.rng.gen_range(0..n_strips);
                    let time = self.rng.gen_range(0..self.config.time_bins);
                    let a = self.unit_normal.sample(&mut self.rng) as f32 * self.strip_noise(sensor, side, strip);
                    *cells.entry((sensor, side, strip, time)).or_insert(0.0) += a;
                }

                for _ in 0..self.config.hits_per_side {
                    self.add_hit(&mut cells, sensor, side, n_strips);
                }
            }
        }

        let rows: Vec<SampleRow> = cells
            .into_iter()
            .map(|((sensor_id, side, strip, time), amplitude)| SampleRow { sensor_id, side, strip, time, amplitude })
            .collect();
        let (data, stats) =
            EventData::from_rows(event, rows, &self.noise, Some(self.config.zero_suppression_snr), true)?;
        log::trace!("event {}: {} of {} cells suppressed", event, stats.suppressed, stats.rows);
        Ok(data)
    }

    fn add_hit(&mut self, cells: &mut BTreeMap<(SensorId, Side, usize, usize), f32>, sensor: SensorId, side: Side, n_strips: usize) {
        let charge = (self.charge.sample(&mut self.rng) as f32).max(0.0);
        let width = self.rng.gen_range(1..=4usize).min(n_strips);
        let first = self.rng.gen_range(0..=n_strips - width);
        let duration = self.rng.gen_range(2..=PULSE_SHAPE.len());
        let t0 = self.rng.gen_range(0..=self.config.time_bins - duration);

        // triangular sharing, peaked in the middle of the hit strips
        let weights: Vec<f32> = (0..width)
            .map(|i| {
                let d = (i as f32 + 0.5 - 0.5 * width as f32).abs();
                1.0 + 0.5 * width as f32 - d
            })
            .collect();
        let norm: f32 = weights.iter().sum();

        for (i, w) in weights.iter().enumerate() {
            let strip = first + i;
            for (dt, shape) in PULSE_SHAPE.iter().take(duration).enumerate() {
                let smear = self.unit_normal.sample(&mut self.rng) as f32 * self.strip_noise(sensor, side, strip);
                *cells.entry((sensor, side, strip, t0 + dt)).or_insert(0.0) += charge * w / norm * shape + smear;
            }
        }
    }

    /// Generate `n_events` events into the store, numbered from 1, together with the noise table.
    pub fn write(&mut self, store: &mut SampleStore, n_events: u32) -> Result<usize> {
        store.create_schema()?;
        store.write_noise(&self.noise)?;
        let mut total = 0;
        for event in 1..=n_events {
            let data = self.generate(event)?;
            total += data.n_samples();
            store.write_event(&data)?;
        }
        log::info!("generated {} events with {} samples", n_events, total);
        Ok(total)
    }
}
