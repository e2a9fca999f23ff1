//! Idle detection
//!
//! A detector answers "is this workspace idle?" for one running pod. The
//! [`IdleChecker`] locates that pod, picks the detection method from the
//! idle shutdown configuration and folds the outcome into an
//! [`IdleCheckResult`] the reconciler acts on.

mod checker;
mod exec;
mod http;

pub use checker::IdleChecker;
pub use exec::{KubePodExec, PodExec};
pub use http::{curl_command, parse_curl_output, HttpProbeDetector};

#[cfg(test)]
pub use exec::MockPodExec;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[cfg(test)]
use mockall::automock;

use workspaces_common::crd::{HttpGetProbe, IdleDetectionSpec};
use workspaces_common::Error;

/// Outcome of one idle check
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdleCheckResult {
    /// The workspace has been idle longer than its timeout
    pub is_idle: bool,
    /// Checking again later makes sense
    pub should_retry: bool,
}

impl IdleCheckResult {
    /// Fold a detector outcome, classifying failures by retryability
    pub fn from_detection(outcome: &Result<bool, Error>) -> Self {
        match outcome {
            Ok(is_idle) => Self {
                is_idle: *is_idle,
                should_retry: true,
            },
            Err(e) => Self {
                is_idle: false,
                should_retry: e.is_retryable(),
            },
        }
    }
}

/// Supported detection methods
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdleDetectionMethod {
    /// Query an HTTP endpoint inside the workspace container
    HttpGet(HttpGetProbe),
}

impl IdleDetectionMethod {
    /// Method configured in the spec, None when none is set
    pub fn from_spec(spec: &IdleDetectionSpec) -> Option<Self> {
        spec.http_get.clone().map(Self::HttpGet)
    }
}

/// The pod an idle check runs against
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdleTarget {
    /// Workspace name
    pub workspace: String,
    /// Namespace of the workspace and pod
    pub namespace: String,
    /// Running pod of the workspace
    pub pod: String,
}

/// Trait for idle detection strategies
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdleDetector: Send + Sync {
    /// True when the target has been idle for longer than `timeout_minutes`
    async fn detect(
        &self,
        target: &IdleTarget,
        method: &IdleDetectionMethod,
        timeout_minutes: u32,
    ) -> Result<bool, Error>;
}

/// True when more than `timeout_minutes` passed between `last_active` and `now`
pub fn is_idle_since(last_active: DateTime<Utc>, now: DateTime<Utc>, timeout_minutes: u32) -> bool {
    now - last_active > chrono::Duration::minutes(i64::from(timeout_minutes))
}
