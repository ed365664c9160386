//! Prometheus metrics export.
//!
//! Installs the exporter on its own port and registers the `portico_*`
//! series up-front so scrapes see them at zero before traffic arrives.

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{debug, info};

use crate::config::MonitoringConfig;

pub fn start(config: &MonitoringConfig) -> Result<()> {
    if !config.enabled {
        info!("Monitoring is disabled");
        return Ok(());
    }

    let addr: SocketAddr = ([0, 0, 0, 0], config.metrics_port).into();
    let builder = PrometheusBuilder::new().with_http_listener(addr);

    // Install is best-effort: a second instance in-process (tests) keeps
    // the already-installed recorder
    if let Err(e) = builder.install() {
        debug!("Prometheus exporter install skipped: {}", e);
        return Ok(());
    }

    register_metrics();
    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}

fn register_metrics() {
    let _ = metrics::counter!("portico_requests_total");
    let _ = metrics::counter!("portico_queue_enqueued_total");
    let _ = metrics::counter!("portico_queue_processed_total");
    let _ = metrics::counter!("portico_queue_failed_total");
    let _ = metrics::counter!("portico_queue_retried_total");
    let _ = metrics::counter!("portico_queue_dead_lettered_total");

    let _ = metrics::gauge!("portico_queue_depth", "queue" => "main");
    let _ = metrics::gauge!("portico_queue_depth", "queue" => "dead_letter");
    let _ = metrics::gauge!("portico_upstream_healthy", "service" => "none");
}
