//! Command line and environment configuration

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

/// Reconciles crunchydata.com PostgreSQL cluster resources
#[derive(Parser, Debug, Clone)]
#[command(name = "pgcluster-operator", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub operator: OperatorConfig,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Watch every kind and reconcile until interrupted (default)
    Run,
    /// Apply policies to the primaries matching a selector, then exit
    ApplyPolicy(ApplyPolicyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ApplyPolicyArgs {
    #[arg(long, short = 'n', default_value = "default")]
    pub namespace: String,

    /// Policy names, comma separated or repeated
    #[arg(long = "policy", required = true, value_delimiter = ',')]
    pub policies: Vec<String>,

    /// Label selector narrowing the target clusters
    #[arg(long, default_value = "")]
    pub selector: String,

    /// Report the targets without applying anything
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, env = "USER", default_value = "operator")]
    pub username: String,
}

/// Settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch; all namespaces when unset
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Full resync period in seconds, 0 disables resync
    #[arg(long, env = "RESYNC_PERIOD_SECS", default_value_t = 10)]
    pub resync_period_secs: u64,

    /// Upper bound on each Kubernetes API call
    #[arg(long, env = "API_TIMEOUT_SECS", default_value_t = 30)]
    pub api_timeout_secs: u64,

    #[arg(long, env = "HEALTH_PORT", default_value_t = 8080)]
    pub health_port: u16,

    /// Attempts to establish each watch before giving up
    #[arg(long, env = "WATCH_ESTABLISH_ATTEMPTS", default_value_t = 5)]
    pub watch_establish_attempts: u32,

    #[arg(long, env = "SHUTDOWN_GRACE_PERIOD_SECS", default_value_t = 5)]
    pub shutdown_grace_period_secs: u64,
}

impl OperatorConfig {
    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_secs)
    }

    /// Namespace scope, treating an empty value as cluster-wide
    pub fn namespace(&self) -> Option<&str> {
        self.watch_namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            resync_period_secs: 10,
            api_timeout_secs: 30,
            health_port: 8080,
            watch_establish_attempts: 5,
            shutdown_grace_period_secs: 5,
        }
    }
}
