//! Telemetry for the broker control plane.
//!
//! Logging is shaped around the control plane's threading model. All
//! cluster mutations run on one dispatcher task, so telemetry is wired
//! in two steps:
//!
//! 1. [`init_logging`] installs the process-wide subscriber once, with
//!    the output format from [`TelemetryConfig`].
//! 2. The dispatcher task enters [`TelemetryConfig::dispatcher_span`]
//!    before its first event. Every coordinator, state and ledger log
//!    line then carries the cluster name and node id without call
//!    sites repeating them.
//!
//! The wire layer logs per *frame*, which under a malformed-CONFIRM
//! flood is unbounded; the default filter clamps its target to `warn`
//! so it cannot drown the control-plane log. Opt back in with
//! `RUST_LOG=stratomq::confirm=debug` when chasing a protocol issue.
//!
//! ```rust,no_run
//! use stratomq::cluster::ClusterConfig;
//! use stratomq::telemetry::{init_logging, TelemetryConfig};
//!
//! let cluster_config = ClusterConfig::default();
//! let telemetry = TelemetryConfig::from_cluster(&cluster_config);
//! init_logging(&telemetry).expect("Failed to init logging");
//!
//! // On the dispatcher task, before the first event:
//! let _guard = telemetry.dispatcher_span().entered();
//! ```
//!
//! # Environment Variables
//!
//! - `STRATOMQ_LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
//! - `RUST_LOG`: level directives (default:
//!   `info,stratomq::confirm=warn`)

use tracing::{info_span, Span};
use tracing_subscriber::prelude::*;

use crate::cluster::ClusterConfig;
use crate::types::NodeId;

/// Level directives applied when `RUST_LOG` is unset: control plane at
/// info, per-frame wire diagnostics clamped to warn.
const DEFAULT_DIRECTIVES: &str = "info,stratomq::confirm=warn";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty-print format (default).
    #[default]
    Pretty,
    /// JSON format for log aggregators (Elasticsearch, Loki, etc.).
    Json,
}

impl LogFormat {
    /// Parse a format name. Unknown names are an error, not a silent
    /// default, so a typo in deployment config is caught at startup.
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Identity stamped onto every control-plane log line.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Output format.
    pub format: LogFormat,
    /// Cluster name, from the cluster configuration.
    pub cluster: String,
    /// This node's id.
    pub node_id: NodeId,
}

impl TelemetryConfig {
    /// Build from the cluster configuration, with the format taken from
    /// `STRATOMQ_LOG_FORMAT` when set and valid.
    pub fn from_cluster(config: &ClusterConfig) -> Self {
        let format = std::env::var("STRATOMQ_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::parse(&v).ok())
            .unwrap_or_default();
        Self {
            format,
            cluster: config.name.clone(),
            node_id: config.self_node_id,
        }
    }

    /// Root span for the cluster dispatcher task.
    ///
    /// Enter it once, before the first event, and hold the guard for
    /// the task's lifetime; coordinator, state and ledger lines inherit
    /// the `cluster` and `node_id` fields from it.
    pub fn dispatcher_span(&self) -> Span {
        info_span!("dispatcher", cluster = %self.cluster, node_id = %self.node_id)
    }
}

/// Install the process-wide subscriber.
///
/// Call once at startup, before the dispatcher task spawns. Level
/// directives come from `RUST_LOG`, defaulting to
/// [`DEFAULT_DIRECTIVES`].
///
/// Note: JSON output requires the `json` feature on
/// tracing-subscriber; without it the pretty format is used and a
/// warning is logged.
pub fn init_logging(
    config: &TelemetryConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_DIRECTIVES));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    if config.format == LogFormat::Json {
        tracing::warn!(
            "JSON logging requested but json feature not enabled, using pretty format"
        );
    }
    tracing::info!(
        cluster = %config.cluster,
        node_id = %config.node_id,
        "logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty").unwrap(), LogFormat::Pretty);
        assert!(LogFormat::parse("yaml").is_err());
        assert!(LogFormat::parse("").is_err());
    }

    #[test]
    fn test_log_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_telemetry_config_carries_cluster_identity() {
        let cluster_config = ClusterConfig {
            name: "prod-east".to_string(),
            ..ClusterConfig::default()
        };

        let telemetry = TelemetryConfig::from_cluster(&cluster_config);
        assert_eq!(telemetry.cluster, "prod-east");
        assert_eq!(telemetry.node_id, NodeId::new(0));
    }

    #[test]
    fn test_dispatcher_span_without_subscriber() {
        // With no subscriber installed the span is disabled but must
        // still be enterable (the dispatcher does not care).
        let telemetry = TelemetryConfig {
            format: LogFormat::Pretty,
            cluster: "local".into(),
            node_id: NodeId::new(0),
        };
        let span = telemetry.dispatcher_span();
        let _guard = span.entered();
    }
}
