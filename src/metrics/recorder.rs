//! Prometheus recorder installation.
//!
//! snowdrift is a library, so it does not own an HTTP listener; `init`
//! installs the recorder and returns the render handle for the host
//! application to expose however it serves its own metrics endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;

use crate::error::{MetricsError, PrometheusInitSnafu};

/// Install the Prometheus metrics recorder.
///
/// # Example
///
/// ```ignore
/// let handle = snowdrift::metrics::init().expect("Failed to initialize metrics");
/// // later, from the host's metrics endpoint:
/// let body = handle.render();
/// ```
pub fn init() -> Result<PrometheusHandle, MetricsError> {
    PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)
}
