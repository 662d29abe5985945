mod py_cluster;

use pyo3::prelude::*;
use pyo3::wrap_pyfunction;

use crate::py_cluster::{PyClusterHit, PyClusterizer, PyEventClusters, PyRawCluster};

#[pymodule]
fn svdpy_connector(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyClusterizer>()?;
    m.add_class::<PyRawCluster>()?;
    m.add_class::<PyClusterHit>()?;
    m.add_class::<PyEventClusters>()?;
    m.add_function(wrap_pyfunction!(py_cluster::cluster_store, m)?)?;
    m.add_function(wrap_pyfunction!(py_cluster::save_clusters, m)?)?;
    m.add_function(wrap_pyfunction!(py_cluster::load_clusters, m)?)?;
    Ok(())
}
