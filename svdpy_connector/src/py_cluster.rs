use std::collections::HashMap;
use std::path::Path;

use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::exceptions::{PyIOError, PyValueError};
use pyo3::prelude::*;

use svdcore::{ClusterHit, Clusterizer, ClusterizerConfig, RawCluster, Sample, SensorId, Side};
use svdrec::cluster::driver::{ClusterDriver, EventClusters};
use svdrec::cluster::io::{self as cio, ClusterFormat};
use svdrec::data::handle::SampleStore;
use svdrec::RecConfig;

fn value_error<E: std::fmt::Display>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn io_error<E: std::fmt::Display>(e: E) -> PyErr {
    PyIOError::new_err(e.to_string())
}

fn indices(name: &str, values: &[i64]) -> PyResult<Vec<usize>> {
    values
        .iter()
        .map(|&v| usize::try_from(v).map_err(|_| PyValueError::new_err(format!("negative {name} index {v}"))))
        .collect()
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct PyRawCluster {
    pub inner: RawCluster,
}

#[pymethods]
impl PyRawCluster {
    #[getter]
    fn sensor(&self) -> (u8, u8, u8) {
        let id = self.inner.sensor_id;
        (id.layer, id.ladder, id.sensor)
    }
    #[getter] fn is_u(&self) -> bool { self.inner.side.is_u() }
    #[getter] fn size(&self) -> usize { self.inner.size() }
    #[getter] fn seed_max_sample(&self) -> f32 { self.inner.seed_max_sample }
    #[getter] fn seed_snr(&self) -> f32 { self.inner.seed_snr() }
    #[getter] fn charge(&self) -> f32 { self.inner.charge() }
    #[getter] fn cluster_snr(&self) -> f32 { self.inner.cluster_snr() }
    #[getter] fn dropped_strips(&self) -> usize { self.inner.dropped_strips }
    #[getter] fn is_good(&self) -> bool { self.inner.is_good_raw_cluster() }

    #[getter]
    fn seed_strip(&self) -> Option<usize> {
        self.inner.seed_strip().map(|s| s.cell_id)
    }

    #[getter]
    fn strips<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<u32>> {
        PyArray1::from_vec_bound(py, self.inner.strips.iter().map(|s| s.cell_id as u32).collect())
    }

    #[getter]
    fn max_samples<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f32>> {
        PyArray1::from_vec_bound(py, self.inner.strips.iter().map(|s| s.max_sample).collect())
    }

    #[getter]
    fn noises<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f32>> {
        PyArray1::from_vec_bound(py, self.inner.strips.iter().map(|s| s.noise).collect())
    }

    /// Per strip (first time bin, waveform) pairs.
    #[getter]
    fn waveforms(&self) -> Vec<(usize, Vec<f32>)> {
        self.inner.strips.iter().map(|s| (s.first_time, s.waveform.clone())).collect()
    }

    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner).map_err(value_error)
    }

    fn __repr__(&self) -> String {
        format!(
            "RawCluster(sensor={}, side={}, strips={:?}..{:?}, seed_snr={:.2}, good={})",
            self.inner.sensor_id,
            self.inner.side,
            self.inner.first_strip(),
            self.inner.last_strip(),
            self.inner.seed_snr(),
            self.inner.is_good_raw_cluster()
        )
    }
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct PyClusterHit {
    pub inner: ClusterHit,
}

#[pymethods]
impl PyClusterHit {
    #[getter]
    fn sensor(&self) -> (u8, u8, u8) {
        let id = self.inner.sensor_id;
        (id.layer, id.ladder, id.sensor)
    }
    #[getter] fn is_u(&self) -> bool { self.inner.side.is_u() }
    #[getter] fn position(&self) -> f32 { self.inner.position }
    #[getter] fn position_error(&self) -> f32 { self.inner.position_error }
    #[getter] fn charge(&self) -> f32 { self.inner.charge }
    #[getter] fn snr(&self) -> f32 { self.inner.snr }
    #[getter] fn size(&self) -> usize { self.inner.size }
    #[getter] fn seed_strip(&self) -> usize { self.inner.seed_strip }
    #[getter] fn seed_charge(&self) -> f32 { self.inner.seed_charge }
    #[getter] fn time(&self) -> f32 { self.inner.time }

    fn __repr__(&self) -> String {
        format!(
            "ClusterHit(sensor={}, side={}, position={:.4}, charge={:.1}, size={})",
            self.inner.sensor_id, self.inner.side, self.inner.position, self.inner.charge, self.inner.size
        )
    }
}

#[pyclass]
#[derive(Clone, Debug)]
pub struct PyEventClusters {
    pub inner: EventClusters,
}

#[pymethods]
impl PyEventClusters {
    #[getter] fn event(&self) -> u32 { self.inner.event }

    #[getter]
    fn clusters(&self) -> Vec<PyRawCluster> {
        self.inner.clusters.iter().cloned().map(|inner| PyRawCluster { inner }).collect()
    }

    #[getter]
    fn hits(&self) -> Vec<PyClusterHit> {
        self.inner.hits.iter().cloned().map(|inner| PyClusterHit { inner }).collect()
    }

    fn __repr__(&self) -> String {
        format!("EventClusters(event={}, clusters={})", self.inner.event, self.inner.clusters.len())
    }
}

#[pyclass]
pub struct PyClusterizer {
    inner: Clusterizer,
}

#[pymethods]
impl PyClusterizer {
    #[new]
    #[pyo3(signature = (cut_seed=5.0, cut_adjacent=3.0, max_samples_per_strip=32, cut_cluster=None))]
    fn new(cut_seed: f32, cut_adjacent: f32, max_samples_per_strip: usize, cut_cluster: Option<f32>) -> PyResult<Self> {
        let config = ClusterizerConfig { cut_seed, cut_adjacent, cut_cluster, max_samples_per_strip };
        let inner = Clusterizer::new(config).map_err(value_error)?;
        Ok(PyClusterizer { inner })
    }

    #[getter] fn cut_seed(&self) -> f32 { self.inner.config().cut_seed }
    #[getter] fn cut_adjacent(&self) -> f32 { self.inner.config().cut_adjacent }
    #[getter] fn max_samples_per_strip(&self) -> usize { self.inner.config().max_samples_per_strip }

    /// Cluster one sensor side. Arrays must be sorted by strip, then time.
    #[pyo3(signature = (sensor, is_u, strips, times, amplitudes, noises))]
    fn cluster(
        &mut self,
        sensor: (u8, u8, u8),
        is_u: bool,
        strips: PyReadonlyArray1<i64>,
        times: PyReadonlyArray1<i64>,
        amplitudes: PyReadonlyArray1<f32>,
        noises: PyReadonlyArray1<f32>,
    ) -> PyResult<Vec<PyRawCluster>> {
        let strips = indices("strip", strips.as_slice()?)?;
        let times = indices("time", times.as_slice()?)?;
        let amplitudes = amplitudes.as_slice()?;
        let noises = noises.as_slice()?;
        let n = strips.len();
        if times.len() != n || amplitudes.len() != n || noises.len() != n {
            return Err(PyValueError::new_err("strips, times, amplitudes and noises must have equal length"));
        }

        let samples = (0..n)
            .map(|i| Sample::new(strips[i], times[i], amplitudes[i], noises[i]))
            .collect::<Result<Vec<_>, _>>()
            .map_err(value_error)?;

        let sensor_id = SensorId::new(sensor.0, sensor.1, sensor.2);
        let clusters = self.inner.cluster(sensor_id, Side::from_is_u(is_u), &samples).map_err(value_error)?;
        Ok(clusters.into_iter().map(|inner| PyRawCluster { inner }).collect())
    }

    /// Counters of the last scan.
    fn stats(&self) -> HashMap<&'static str, usize> {
        let s = self.inner.stats();
        HashMap::from([
            ("samples", s.samples),
            ("truncated", s.truncated),
            ("candidates", s.candidates),
            ("merges", s.merges),
            ("accepted", s.accepted),
            ("rejected", s.rejected),
            ("dropped_strips", s.dropped_strips),
        ])
    }
}

/// Cluster events of a SQLite sample store; all events when `events` is None.
#[pyfunction]
#[pyo3(signature = (path, events=None, config_path=None, num_threads=4))]
pub fn cluster_store(
    path: &str,
    events: Option<Vec<u32>>,
    config_path: Option<&str>,
    num_threads: usize,
) -> PyResult<Vec<PyEventClusters>> {
    let mut config = match config_path {
        Some(p) => RecConfig::load(Path::new(p)).map_err(value_error)?,
        None => RecConfig::default(),
    };
    config.num_threads = num_threads;

    let store = SampleStore::open_read_only(Path::new(path)).map_err(io_error)?;
    let noise = store.read_noise().map_err(io_error)?;
    let events = match events {
        Some(e) => e,
        None => store.read_events().map_err(io_error)?,
    };
    let driver = ClusterDriver::new(config).map_err(value_error)?;
    let results = driver.cluster_store(&store, &events, &noise).map_err(value_error)?;
    Ok(results.into_iter().map(|inner| PyEventClusters { inner }).collect())
}

#[pyfunction]
#[pyo3(signature = (path, clusters, format="bincode", compress=true))]
pub fn save_clusters(path: &str, clusters: Vec<PyEventClusters>, format: &str, compress: bool) -> PyResult<()> {
    let format = match format {
        "bincode" => ClusterFormat::Bincode,
        "json" => ClusterFormat::Json,
        other => return Err(PyValueError::new_err(format!("unknown format {other}, use bincode or json"))),
    };
    let rust_clusters: Vec<EventClusters> = clusters.into_iter().map(|c| c.inner).collect();
    cio::save(Path::new(path), &rust_clusters, format, compress).map_err(io_error)
}

#[pyfunction]
pub fn load_clusters(path: &str) -> PyResult<Vec<PyEventClusters>> {
    let clusters = cio::load(Path::new(path)).map_err(io_error)?;
    Ok(clusters.into_iter().map(|inner| PyEventClusters { inner }).collect())
}
