//! Command line and environment configuration

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use workspaces_common::ReconcileTiming;

/// Workspaces operator - runs Jupyter workspaces on Kubernetes
#[derive(Parser, Debug)]
#[command(name = "workspaces-operator", version, about, long_about = None)]
pub struct Cli {
    /// Print all CRD manifests as YAML and exit
    #[arg(long)]
    pub crd: bool,

    /// Controller settings
    #[command(flatten)]
    pub controller: ControllerConfig,

    /// Mode to run in
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Operator modes
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the controllers (default mode)
    Controller,
}

/// Settings shared by every controller
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Requeue delay while sub-resources converge, in milliseconds
    #[arg(long, env = "WORKSPACES_POLL_REQUEUE_MS", default_value_t = 200)]
    pub poll_requeue_ms: u64,

    /// Requeue delay while waiting on users or referencing workspaces, in seconds
    #[arg(long, env = "WORKSPACES_LONG_REQUEUE_SECS", default_value_t = 60)]
    pub long_requeue_secs: u64,

    /// Interval between idle checks of a running workspace, in seconds
    #[arg(long, env = "WORKSPACES_IDLE_CHECK_INTERVAL_SECS", default_value_t = 300)]
    pub idle_check_interval_secs: u64,

    /// Skip template compliance checks; requested checks are cleared unchecked
    #[arg(long, env = "WORKSPACES_DISABLE_COMPLIANCE_VALIDATOR")]
    pub disable_compliance_validator: bool,

    /// Do not install or update CRDs on startup
    #[arg(long, env = "WORKSPACES_SKIP_CRD_INSTALL")]
    pub skip_crd_install: bool,
}

impl ControllerConfig {
    /// Requeue delays for controller contexts
    pub fn timing(&self) -> ReconcileTiming {
        ReconcileTiming {
            poll: Duration::from_millis(self.poll_requeue_ms),
            long: Duration::from_secs(self.long_requeue_secs),
            idle_check_interval: Duration::from_secs(self.idle_check_interval_secs),
            ..ReconcileTiming::default()
        }
    }

    /// Whether the compliance validator is installed
    pub fn compliance_enabled(&self) -> bool {
        !self.disable_compliance_validator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_standard_timing() {
        let cli = Cli::try_parse_from(["workspaces-operator"]).unwrap();
        assert!(!cli.crd);
        assert_eq!(cli.command, None);
        assert_eq!(cli.controller.timing(), ReconcileTiming::default());
        assert!(cli.controller.compliance_enabled());
        assert!(!cli.controller.skip_crd_install);
    }

    #[test]
    fn flags_override_timing_and_features() {
        let cli = Cli::try_parse_from([
            "workspaces-operator",
            "--poll-requeue-ms",
            "50",
            "--long-requeue-secs",
            "10",
            "--idle-check-interval-secs",
            "30",
            "--disable-compliance-validator",
            "--skip-crd-install",
            "controller",
        ])
        .unwrap();
        let timing = cli.controller.timing();
        assert_eq!(timing.poll, Duration::from_millis(50));
        assert_eq!(timing.long, Duration::from_secs(10));
        assert_eq!(timing.idle_check_interval, Duration::from_secs(30));
        assert!(!cli.controller.compliance_enabled());
        assert!(cli.controller.skip_crd_install);
        assert_eq!(cli.command, Some(Command::Controller));
    }
}
