//! Local cluster position from charge sharing between strips.

use serde::{Deserialize, Serialize};

use crate::cluster::raw_cluster::RawCluster;
use crate::detector::sensor::{SensorId, Side};

/// Strip layout of the sensors, looked up per sensor and side.
pub trait SensorGeometry: Send + Sync {
    fn n_strips(&self, sensor: SensorId, side: Side) -> usize;

    fn pitch(&self, sensor: SensorId, side: Side) -> f32;

    fn thickness(&self, sensor: SensorId) -> f32;

    /// Tangent of the Lorentz angle of the charge carriers read out on `side`.
    fn tan_lorentz(&self, sensor: SensorId, side: Side) -> f32;

    /// Mean drift displacement of the collected charge. Only U is shifted.
    fn lorentz_shift(&self, sensor: SensorId, side: Side) -> f32 {
        match side {
            Side::U => 0.5 * self.thickness(sensor) * self.tan_lorentz(sensor, side),
            Side::V => 0.0,
        }
    }

    /// Centre of a strip in the local sensor frame, None for strips the sensor does not have.
    fn strip_position(&self, sensor: SensorId, side: Side, strip: usize) -> Option<f32> {
        let n = self.n_strips(sensor, side);
        if strip >= n {
            return None;
        }
        Some((strip as f32 + 0.5 - 0.5 * n as f32) * self.pitch(sensor, side))
    }
}

/// All sensors identical, strips centred around the sensor middle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UniformGeometry {
    pub u_pitch: f32,
    pub v_pitch: f32,
    pub u_strips: usize,
    pub v_strips: usize,
    #[serde(default = "default_thickness")]
    pub thickness: f32,
    #[serde(default)]
    pub tan_lorentz_u: f32,
}

fn default_thickness() -> f32 {
    0.032
}

impl Default for UniformGeometry {
    fn default() -> Self {
        // barrel sensor: 50 µm / 160 µm pitch in cm, 768 / 512 strips, 320 µm thick
        Self {
            u_pitch: 0.005,
            v_pitch: 0.016,
            u_strips: 768,
            v_strips: 512,
            thickness: default_thickness(),
            tan_lorentz_u: 0.0,
        }
    }
}

impl SensorGeometry for UniformGeometry {
    fn n_strips(&self, _sensor: SensorId, side: Side) -> usize {
        match side {
            Side::U => self.u_strips,
            Side::V => self.v_strips,
        }
    }

    fn pitch(&self, _sensor: SensorId, side: Side) -> f32 {
        match side {
            Side::U => self.u_pitch,
            Side::V => self.v_pitch,
        }
    }

    fn thickness(&self, _sensor: SensorId) -> f32 {
        self.thickness
    }

    fn tan_lorentz(&self, _sensor: SensorId, side: Side) -> f32 {
        match side {
            Side::U => self.tan_lorentz_u,
            Side::V => 0.0,
        }
    }
}

/// Reconstruct the cluster position.
///
/// One strip: the strip centre. Two strips: centre of gravity. Wider:
/// analog head-tail using the edge strips and the mean inner charge. The
/// extent counts strips dropped by the adjacent cut as empty.
pub fn cluster_position<G: SensorGeometry + ?Sized>(cluster: &RawCluster, geometry: &G) -> Option<f32> {
    let first = cluster.strips.first()?;
    let last = cluster.strips.last()?;
    let (lo, hi) = (first.cell_id, last.cell_id);
    let sensor = cluster.sensor_id;
    let side = cluster.side;

    let pos_lo = geometry.strip_position(sensor, side, lo)?;
    let pos_hi = geometry.strip_position(sensor, side, hi)?;
    let pitch = geometry.pitch(sensor, side);
    let (q_lo, q_hi) = (first.max_sample, last.max_sample);

    match hi - lo + 1 {
        1 => Some(pos_lo),
        2 => {
            let q = q_lo + q_hi;
            if q > 0.0 {
                Some(pos_lo + q_hi / q * pitch)
            } else {
                Some(0.5 * (pos_lo + pos_hi))
            }
        }
        extent => {
            let inner: f32 = cluster.strips[1..cluster.strips.len() - 1]
                .iter()
                .map(|s| s.max_sample)
                .sum();
            let q_centre = inner / (extent - 2) as f32;
            if q_centre > 0.0 {
                Some(0.5 * (pos_lo + pos_hi) + 0.5 * (q_hi - q_lo) / q_centre * pitch)
            } else {
                centre_of_gravity(cluster, geometry)
            }
        }
    }
}

/// Plain charge-weighted mean of the strip centres.
pub fn centre_of_gravity<G: SensorGeometry + ?Sized>(cluster: &RawCluster, geometry: &G) -> Option<f32> {
    let mut wsum = 0.0f32;
    let mut psum = 0.0f32;
    for s in &cluster.strips {
        let p = geometry.strip_position(cluster.sensor_id, cluster.side, s.cell_id)?;
        let w = s.max_sample.max(0.0);
        wsum += w;
        psum += w * p;
    }
    if wsum > 0.0 { Some(psum / wsum) } else { None }
}

/// Uncertainty of [`cluster_position`].
///
/// One strip: binary resolution `pitch / sqrt(12)`. Otherwise the strip
/// noise is propagated through the centre of gravity or the head-tail formula.
/// Falls back to the binary resolution of the whole extent when the edge
/// charges carry no information.
pub fn position_error<G: SensorGeometry + ?Sized>(cluster: &RawCluster, geometry: &G) -> Option<f32> {
    let first = cluster.strips.first()?;
    let last = cluster.strips.last()?;
    let pitch = geometry.pitch(cluster.sensor_id, cluster.side);
    let extent = last.cell_id - first.cell_id + 1;
    let binary = pitch * extent as f32 / 12.0f32.sqrt();

    let (q_lo, q_hi) = (first.max_sample, last.max_sample);
    let (n_lo, n_hi) = (first.noise, last.noise);
    let error = match extent {
        1 => binary,
        2 => {
            let q = q_lo + q_hi;
            if q > 0.0 {
                pitch / (q * q) * ((q_hi * n_lo).powi(2) + (q_lo * n_hi).powi(2)).sqrt()
            } else {
                binary
            }
        }
        _ => {
            let inner: f32 = cluster.strips[1..cluster.strips.len() - 1].iter().map(|s| s.max_sample).sum();
            let q_centre = inner / (extent - 2) as f32;
            if q_centre > 0.0 {
                0.5 * pitch / q_centre * (n_lo * n_lo + n_hi * n_hi).sqrt()
            } else {
                binary
            }
        }
    };
    Some(error.min(binary))
}

/// Compact summary of an accepted cluster for downstream reconstruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterHit {
    pub sensor_id: SensorId,
    pub side: Side,
    /// Local position, corrected for the Lorentz shift.
    pub position: f32,
    pub position_error: f32,
    pub charge: f32,
    pub snr: f32,
    pub size: usize,
    pub seed_strip: usize,
    pub seed_charge: f32,
    pub time: f32,
}

impl ClusterHit {
    pub fn from_raw<G: SensorGeometry + ?Sized>(cluster: &RawCluster, geometry: &G) -> Option<Self> {
        let seed = cluster.seed_strip()?;
        let shift = geometry.lorentz_shift(cluster.sensor_id, cluster.side);
        Some(ClusterHit {
            sensor_id: cluster.sensor_id,
            side: cluster.side,
            position: cluster_position(cluster, geometry)? - shift,
            position_error: position_error(cluster, geometry)?,
            charge: cluster.charge(),
            snr: cluster.cluster_snr(),
            size: cluster.size(),
            seed_strip: seed.cell_id,
            seed_charge: cluster.seed_max_sample,
            time: seed.mean_time(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::raw_cluster::StripRecord;
    use crate::detector::sample::Sample;

    fn geometry() -> UniformGeometry {
        UniformGeometry { u_pitch: 1.0, v_pitch: 2.0, u_strips: 10, v_strips: 10, thickness: 0.3, tan_lorentz_u: 0.0 }
    }

    fn cluster(strips: &[(usize, f32)], seed: usize) -> RawCluster {
        let mut raw = RawCluster::new(SensorId::new(3, 1, 1), Side::U, 0.0, 0.0, None);
        for &(cell, q) in strips {
            let rec = StripRecord::from_samples(cell, &[Sample::new(cell, 0, q, 1.0).unwrap()], cell == seed);
            assert!(raw.add_strip(rec));
        }
        raw
    }

    #[test]
    fn test_strip_position() {
        let g = geometry();
        let id = SensorId::new(3, 1, 1);
        assert_eq!(g.strip_position(id, Side::U, 0), Some(-4.5));
        assert_eq!(g.strip_position(id, Side::V, 9), Some(9.0));
        assert_eq!(g.strip_position(id, Side::U, 10), None);
    }

    #[test]
    fn test_single_strip() {
        let c = cluster(&[(5, 10.0)], 5);
        assert_eq!(cluster_position(&c, &geometry()), Some(0.5));
    }

    #[test]
    fn test_two_strips_cog() {
        let c = cluster(&[(5, 30.0), (6, 10.0)], 5);
        // 0.5 + 0.25 * 1.0
        let p = cluster_position(&c, &geometry()).unwrap();
        assert!((p - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_head_tail() {
        let c = cluster(&[(4, 10.0), (5, 40.0), (6, 30.0)], 5);
        // centre 0.5, 0.5 * (30 - 10) / 40 = 0.25
        let p = cluster_position(&c, &geometry()).unwrap();
        assert!((p - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_hit_summary() {
        let c = cluster(&[(5, 30.0), (6, 10.0)], 5);
        let hit = ClusterHit::from_raw(&c, &geometry()).unwrap();
        assert_eq!(hit.size, 2);
        assert_eq!(hit.seed_strip, 5);
        assert!((hit.charge - 40.0).abs() < 1e-6);
        assert!((hit.time - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_lorentz_shift_on_u_only() {
        let g = UniformGeometry { tan_lorentz_u: 0.2, ..geometry() };
        let id = SensorId::new(3, 1, 1);
        assert!((g.lorentz_shift(id, Side::U) - 0.03).abs() < 1e-6);
        assert_eq!(g.lorentz_shift(id, Side::V), 0.0);

        let u = cluster(&[(5, 30.0), (6, 10.0)], 5);
        let hit = ClusterHit::from_raw(&u, &g).unwrap();
        assert!((hit.position - 0.72).abs() < 1e-6);

        let mut v = u.clone();
        v.side = Side::V;
        let hit = ClusterHit::from_raw(&v, &g).unwrap();
        // 1.0 + 0.25 * 2.0
        assert!((hit.position - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_position_error() {
        let g = geometry();
        let single = cluster(&[(5, 10.0)], 5);
        assert!((position_error(&single, &g).unwrap() - 1.0 / 12.0f32.sqrt()).abs() < 1e-6);

        // sqrt(10^2 + 30^2) / 40^2
        let pair = cluster(&[(5, 30.0), (6, 10.0)], 5);
        assert!((position_error(&pair, &g).unwrap() - 1000.0f32.sqrt() / 1600.0).abs() < 1e-6);

        // 0.5 / 40 * sqrt(2)
        let wide = cluster(&[(4, 10.0), (5, 40.0), (6, 30.0)], 5);
        assert!((position_error(&wide, &g).unwrap() - 0.5 / 40.0 * 2.0f32.sqrt()).abs() < 1e-6);

        let hit = ClusterHit::from_raw(&pair, &g).unwrap();
        assert_eq!(Some(hit.position_error), position_error(&pair, &g));
    }

    #[test]
    fn test_geometry_without_lorentz_fields() {
        let g: UniformGeometry =
            serde_json::from_str(r#"{"u_pitch": 1.0, "v_pitch": 2.0, "u_strips": 10, "v_strips": 10}"#).unwrap();
        assert!((g.thickness - 0.032).abs() < 1e-6);
        assert_eq!(g.tan_lorentz_u, 0.0);
    }
}
