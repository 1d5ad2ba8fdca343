//! Per-process Prometheus metrics.
//!
//! Each process (orchestrator, each fetcher, each parser) owns one
//! [`Metrics`] instance and its own `prometheus::Registry` rather than the
//! crate-global default registry, since multiprocess aggregation here is
//! file-based: when `PROMETHEUS_MULTIPROC_DIR` is set, [`Metrics::flush`]
//! writes this process's families to `<dir>/<role>-<pid>.prom` in the text
//! exposition format and an external collector coalesces on scrape.

use std::path::PathBuf;

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub pages_fetched: IntCounter,
    pub errors_by_class: IntCounterVec,
    pub backpressure_events: IntCounter,
    pub parse_failures: IntCounter,
    pub parse_drops: IntCounter,
    pub fetch_queue_depth: IntGauge,
    pub frontier_size: IntGauge,
}

impl Metrics {
    /// Builds a fresh registry and registers every family, tagging this
    /// process's identity so `role-pid.prom` filenames don't collide.
    pub fn new(role: &str, id: u32) -> Self {
        let registry = Registry::new();
        let const_labels: std::collections::HashMap<String, String> =
            [("role".to_string(), role.to_string()), ("id".to_string(), id.to_string())]
                .into_iter()
                .collect();

        let pages_fetched = IntCounter::with_opts(
            Opts::new("pages_fetched_total", "pages fetched").const_labels(const_labels.clone()),
        )
        .unwrap();
        let errors_by_class = IntCounterVec::new(
            Opts::new("fetch_errors_total", "fetch errors by class").const_labels(const_labels.clone()),
            &["class"],
        )
        .unwrap();
        let backpressure_events = IntCounter::with_opts(
            Opts::new("backpressure_events_total", "soft/hard backpressure activations")
                .const_labels(const_labels.clone()),
        )
        .unwrap();
        let parse_failures = IntCounter::with_opts(
            Opts::new("parse_failures_total", "parse exceptions").const_labels(const_labels.clone()),
        )
        .unwrap();
        let parse_drops = IntCounter::with_opts(
            Opts::new("parse_drops_total", "items dropped after repeated parse failure")
                .const_labels(const_labels.clone()),
        )
        .unwrap();
        let fetch_queue_depth = IntGauge::with_opts(
            Opts::new("fetch_queue_depth", "current fetch:queue length").const_labels(const_labels.clone()),
        )
        .unwrap();
        let frontier_size = IntGauge::with_opts(
            Opts::new("frontier_size", "sum of ready-domain queue lengths across shards")
                .const_labels(const_labels),
        )
        .unwrap();

        registry.register(Box::new(pages_fetched.clone())).unwrap();
        registry.register(Box::new(errors_by_class.clone())).unwrap();
        registry
            .register(Box::new(backpressure_events.clone()))
            .unwrap();
        registry.register(Box::new(parse_failures.clone())).unwrap();
        registry.register(Box::new(parse_drops.clone())).unwrap();
        registry
            .register(Box::new(fetch_queue_depth.clone()))
            .unwrap();
        registry.register(Box::new(frontier_size.clone())).unwrap();

        Self {
            registry,
            pages_fetched,
            errors_by_class,
            backpressure_events,
            parse_failures,
            parse_drops,
            fetch_queue_depth,
            frontier_size,
        }
    }

    /// Writes this process's families to `<dir>/<role>-<pid>.prom` when
    /// `PROMETHEUS_MULTIPROC_DIR` is set. A no-op otherwise (single-process
    /// mode: nothing external scrapes these files).
    pub fn flush(&self, role: &str, pid: u32) -> std::io::Result<()> {
        let Ok(dir) = std::env::var("PROMETHEUS_MULTIPROC_DIR") else {
            return Ok(());
        };

        let path: PathBuf = PathBuf::from(dir).join(format!("{role}-{pid}.prom"));
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(std::io::Error::other)?;
        std::fs::write(path, buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registers_every_family_without_panicking() {
        let metrics = Metrics::new("fetcher", 0);
        metrics.pages_fetched.inc();
        metrics.errors_by_class.with_label_values(&["timeout"]).inc();
        assert_eq!(metrics.pages_fetched.get(), 1);
    }

    #[test]
    fn flush_without_env_var_is_a_noop() {
        std::env::remove_var("PROMETHEUS_MULTIPROC_DIR");
        let metrics = Metrics::new("parser", 1);
        assert!(metrics.flush("parser", 1).is_ok());
    }

    #[test]
    fn flush_writes_a_prom_file_when_dir_is_set() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("PROMETHEUS_MULTIPROC_DIR", dir.path());
        let metrics = Metrics::new("fetcher", 2);
        metrics.pages_fetched.inc();
        metrics.flush("fetcher", 2).unwrap();
        let expected = dir.path().join("fetcher-2.prom");
        assert!(expected.exists());
        std::env::remove_var("PROMETHEUS_MULTIPROC_DIR");
    }
}
