//! Operator configuration from flags and environment

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use meshop_common::retry::RetryConfig;
use meshop_common::telemetry::{LogFormat, TelemetryConfig};
use meshop_controller::ControllerConfig;

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// One JSON object per line
    Json,
    /// Human-readable text
    Text,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Text => LogFormat::Text,
        }
    }
}

/// Settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct OperatorConfig {
    /// Directory holding `<version>/profiles` and `<version>/charts`
    #[arg(
        long,
        env = "MESHOP_RESOURCE_DIR",
        default_value = "/var/lib/meshop/resources",
        global = true
    )]
    pub resource_dir: PathBuf,

    /// Deadline for a single reconcile pass, in seconds
    #[arg(
        long,
        env = "MESHOP_RECONCILE_TIMEOUT_SECS",
        default_value_t = 60,
        global = true
    )]
    pub reconcile_timeout_secs: u64,

    /// Resync interval of a healthy control plane, in seconds
    #[arg(
        long,
        env = "MESHOP_REQUEUE_INTERVAL_SECS",
        default_value_t = 300,
        global = true
    )]
    pub requeue_interval_secs: u64,

    /// Recheck interval while a control plane is not ready, in seconds
    #[arg(
        long,
        env = "MESHOP_NOT_READY_REQUEUE_SECS",
        default_value_t = 15,
        global = true
    )]
    pub not_ready_requeue_secs: u64,

    /// Upper bound of the per-object error backoff, in seconds
    #[arg(
        long,
        env = "MESHOP_MAX_BACKOFF_SECS",
        default_value_t = 300,
        global = true
    )]
    pub max_backoff_secs: u64,

    /// Log output format
    #[arg(
        long,
        env = "MESHOP_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormatArg::Json,
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Log filter directive, overriding RUST_LOG
    #[arg(long, env = "MESHOP_LOG_FILTER", global = true)]
    pub log_filter: Option<String>,
}

impl OperatorConfig {
    /// Reconciler timing
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            reconcile_timeout: Duration::from_secs(self.reconcile_timeout_secs),
            requeue_interval: Duration::from_secs(self.requeue_interval_secs),
            not_ready_requeue: Duration::from_secs(self.not_ready_requeue_secs),
            backoff: RetryConfig {
                max_delay: Duration::from_secs(self.max_backoff_secs),
                ..RetryConfig::default()
            },
        }
    }

    /// Logging setup
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            format: self.log_format.into(),
            filter: self.log_filter.clone(),
        }
    }
}
