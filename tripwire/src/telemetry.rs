//! OpenTelemetry metrics export module
//!
//! Exports exec tracing counters to an OpenTelemetry Collector.
//!
//! ## OTLP Endpoint Priority
//! 1. `otel_exporter_otlp_endpoint` from the settings (the environment
//!    variable of the same name overrides the configuration file)
//! 2. `OTEL_EXPORTER_OTLP_ENDPOINT` read directly, for callers without settings
//! 3. Neither set: metrics are disabled

use anyhow::{Context, Result};
use log::info;
use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};
use std::time::Duration;

/// Metric export interval in seconds
const METRIC_EXPORT_INTERVAL_SECS: u64 = 30;

/// Global metrics handle
static METRICS: OnceLock<TripwireMetrics> = OnceLock::new();

/// Global MeterProvider for graceful shutdown
static METER_PROVIDER: OnceLock<SdkMeterProvider> = OnceLock::new();

/// Global active probes count (for ObservableGauge callback)
static ACTIVE_PROBES: OnceLock<RwLock<HashMap<String, u64>>> = OnceLock::new();

fn active_probes_map() -> &'static RwLock<HashMap<String, u64>> {
    ACTIVE_PROBES.get_or_init(|| RwLock::new(HashMap::new()))
}

/// tripwire metrics collection
///
/// Note: Do NOT add _total suffix to Counter names (Prometheus adds it automatically)
pub struct TripwireMetrics {
    pub exec_records: Counter<u64>,
    pub exec_records_malformed: Counter<u64>,
    pub exec_alerts: Counter<u64>,
    pub exec_alerts_dropped: Counter<u64>,
}

impl TripwireMetrics {
    fn new(meter: &Meter) -> Self {
        Self {
            exec_records: meter
                .u64_counter("exec_records")
                .with_description("Number of exec records read from the ring buffer")
                .with_unit("events")
                .build(),
            exec_records_malformed: meter
                .u64_counter("exec_records_malformed")
                .with_description("Number of ring samples with an unexpected size")
                .with_unit("events")
                .build(),
            exec_alerts: meter
                .u64_counter("exec_alerts")
                .with_description("Number of exec records that matched a PROCESS rule")
                .with_unit("alerts")
                .build(),
            exec_alerts_dropped: meter
                .u64_counter("exec_alerts_dropped")
                .with_description("Number of alerts dropped because the alert channel was full")
                .with_unit("alerts")
                .build(),
        }
    }
}

fn get_otlp_endpoint(configured: Option<&str>) -> Option<String> {
    let endpoint = match configured {
        Some(ep) if !ep.is_empty() => ep.to_string(),
        _ => std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?,
    };
    if endpoint.is_empty() {
        return None;
    }

    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        Some(format!("http://{}", endpoint))
    } else {
        Some(endpoint)
    }
}

/// Initialize OpenTelemetry metrics provider
///
/// Configures metrics export to OTLP Collector via gRPC.
/// Skips initialization if no endpoint is configured.
pub fn init_metrics(configured_endpoint: Option<&str>) -> Result<()> {
    let endpoint = match get_otlp_endpoint(configured_endpoint) {
        Some(ep) => ep,
        None => {
            info!("No OTLP endpoint configured. Metrics export disabled.");
            return Ok(());
        }
    };

    info!("Initializing OpenTelemetry metrics exporter");
    info!("OTLP endpoint: {}", endpoint);

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint)
        .with_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create OTLP metric exporter")?;

    let reader = PeriodicReader::builder(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_interval(Duration::from_secs(METRIC_EXPORT_INTERVAL_SECS))
        .build();

    let resource = Resource::default().merge(&Resource::new(vec![
        KeyValue::new("service.name", "tripwire"),
        KeyValue::new("telemetry.sdk.language", "rust"),
    ]));

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build();

    global::set_meter_provider(provider.clone());
    let _ = METER_PROVIDER.set(provider);

    let meter = global::meter("tripwire");

    let _active_probes_gauge = meter
        .u64_observable_gauge("active_probes")
        .with_description("Number of currently attached exec tracepoints")
        .with_unit("probes")
        .with_callback(|observer| {
            if let Ok(probes) = active_probes_map().read() {
                for (probe_name, count) in probes.iter() {
                    observer.observe(*count, &[KeyValue::new("probe", probe_name.clone())]);
                }
            }
        })
        .build();

    let _ = METRICS.set(TripwireMetrics::new(&meter));

    info!("OpenTelemetry metrics initialized successfully");
    Ok(())
}

pub fn metrics() -> Option<&'static TripwireMetrics> {
    METRICS.get()
}

pub fn record_exec_record() {
    if let Some(m) = metrics() {
        m.exec_records.add(1, &[]);
    }
}

pub fn record_malformed_record(len: usize) {
    if let Some(m) = metrics() {
        m.exec_records_malformed
            .add(1, &[KeyValue::new("sample_len", len as i64)]);
    }
}

pub fn record_alert(rule: &str, severity: &str) {
    if let Some(m) = metrics() {
        let attrs = [
            KeyValue::new("rule", rule.to_string()),
            KeyValue::new("severity", severity.to_string()),
        ];
        m.exec_alerts.add(1, &attrs);
    }
}

pub fn record_alert_dropped(rule: &str) {
    if let Some(m) = metrics() {
        m.exec_alerts_dropped
            .add(1, &[KeyValue::new("rule", rule.to_string())]);
    }
}

/// Record active probe count
/// Updates the global active probes map for ObservableGauge callback
pub fn record_active_probe(probe_name: &str, count: u64) {
    if let Ok(mut probes) = active_probes_map().write() {
        probes.insert(probe_name.to_string(), count);
        info!("Active probe registered: {} = {}", probe_name, count);
    }
}

/// Shutdown OpenTelemetry (graceful shutdown)
/// Flushes pending metrics and shuts down the MeterProvider
pub fn shutdown_metrics() {
    if let Some(provider) = METER_PROVIDER.get() {
        info!("Shutting down OpenTelemetry metrics...");
        if let Err(e) = provider.shutdown() {
            log::warn!("Failed to shutdown MeterProvider: {}", e);
        } else {
            info!("OpenTelemetry metrics shutdown complete");
        }
    }
}
