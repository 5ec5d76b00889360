//! Metrics recorder initialization.

use {crate::Result, tracing::info};

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    /// Whether metrics collection is enabled.
    pub enabled: bool,
    /// Address the Prometheus scrape endpoint listens on, e.g. `127.0.0.1:9464`.
    pub listen: String,
    /// Labels added to every metric.
    pub global_labels: Vec<(String, String)>,
}

/// Install the global metrics recorder.
///
/// Call once at startup from within a tokio runtime. Without the `prometheus`
/// feature this only logs; the facade macros stay no-ops.
///
/// # Errors
///
/// Returns an error if the listen address is invalid or the exporter fails to
/// install.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<()> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(());
    }

    #[cfg(feature = "prometheus")]
    {
        install_prometheus(&config)?;
        info!(listen = %config.listen, "prometheus exporter listening");
        Ok(())
    }

    #[cfg(not(feature = "prometheus"))]
    {
        info!(
            listen = %config.listen,
            "metrics requested but the prometheus feature is not compiled in"
        );
        Ok(())
    }
}

#[cfg(feature = "prometheus")]
fn install_prometheus(config: &MetricsRecorderConfig) -> Result<()> {
    use {
        crate::{Error, buckets, plugins},
        metrics_exporter_prometheus::{Matcher, PrometheusBuilder},
        std::net::SocketAddr,
    };

    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|e: std::net::AddrParseError| Error::InvalidAddress {
            address: config.listen.clone(),
            source: Box::new(e),
        })?;

    let mut builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(plugins::INVOCATION_DURATION_SECONDS.to_string()),
            buckets::HANDLER_DURATION,
        )?;

    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    builder.install()?;
    Ok(())
}
