//! Prometheus metrics.
//!
//! When enabled, the recorder is installed globally and rendered at
//! `GET /metrics` on the API port. Setting a metrics port additionally starts
//! the exporter's own HTTP listener on that port.

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Address for a standalone exporter listener, if one was configured.
    pub listen_addr: Option<SocketAddr>,
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        Self::from_settings_with(settings, |key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_settings`], reading variables through `lookup`.
    #[must_use]
    pub fn from_settings_with(
        settings: Option<&MetricsSettings>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let enabled = lookup("SIMPLE_CRUD_METRICS_ENABLED")
            .map(|v| parse_bool(&v))
            .or_else(|| settings.and_then(|config| config.enabled))
            .unwrap_or(false);
        let port = lookup("SIMPLE_CRUD_METRICS_PORT")
            .and_then(|v| v.parse::<u16>().ok())
            .or_else(|| settings.and_then(|config| config.port));

        Self {
            enabled,
            listen_addr: port.map(|port| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)),
        }
    }
}

/// Cloneable handle onto the installed recorder.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

impl MetricsHandle {
    /// Renders the current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

impl From<PrometheusHandle> for MetricsHandle {
    fn from(prometheus: PrometheusHandle) -> Self {
        Self { prometheus }
    }
}

/// Installs the Prometheus recorder, plus its HTTP listener when
/// `listen_addr` is set.
///
/// Must be called from within a tokio runtime when a listener is configured.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new();
    let prometheus = if let Some(addr) = config.listen_addr {
        let (recorder, exporter) = builder
            .with_http_listener(addr)
            .build()
            .map_err(|e| Error::operation("metrics_exporter_build", e))?;
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder)
            .map_err(|e| Error::operation("metrics_recorder_install", e))?;
        tokio::spawn(exporter);
        tracing::info!(addr = %addr, "Prometheus metrics listener started");
        handle
    } else {
        builder
            .install_recorder()
            .map_err(|e| Error::operation("metrics_recorder_install", e))?
    };

    Ok(Some(MetricsHandle::from(prometheus)))
}

fn parse_bool(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        let config = MetricsConfig::from_settings_with(None, |_| None);
        assert!(!config.enabled);
        assert!(config.listen_addr.is_none());
    }

    #[test]
    fn test_env_overrides_settings() {
        let settings = MetricsSettings {
            enabled: Some(false),
            port: Some(9100),
        };
        let config = MetricsConfig::from_settings_with(Some(&settings), |key| match key {
            "SIMPLE_CRUD_METRICS_ENABLED" => Some("yes".to_string()),
            "SIMPLE_CRUD_METRICS_PORT" => Some("9200".to_string()),
            _ => None,
        });

        assert!(config.enabled);
        assert_eq!(config.listen_addr.map(|addr| addr.port()), Some(9200));
    }

    #[test]
    fn test_invalid_port_ignored() {
        let settings = MetricsSettings {
            enabled: Some(true),
            port: Some(9100),
        };
        let config = MetricsConfig::from_settings_with(Some(&settings), |key| {
            (key == "SIMPLE_CRUD_METRICS_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.listen_addr.map(|addr| addr.port()), Some(9100));
    }

    #[test]
    fn test_install_disabled_is_noop() {
        let config = MetricsConfig::from_settings_with(None, |_| None);
        assert!(install_prometheus(&config).unwrap().is_none());
    }

    #[test]
    fn test_render_includes_recorded_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = MetricsHandle::from(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("todo_operations_total", "operation" => "todo.create")
                .increment(2);
        });

        let rendered = handle.render();
        assert!(rendered.contains("todo_operations_total"), "{rendered}");
        assert!(rendered.contains(r#"operation="todo.create""#), "{rendered}");
    }
}
