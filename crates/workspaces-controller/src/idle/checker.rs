//! Locating the workspace pod and running the configured detector

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, warn};

use workspaces_common::crd::{IdleShutdownSpec, Workspace};
use workspaces_common::Error;

use super::{IdleCheckResult, IdleDetectionMethod, IdleDetector, IdleTarget};
use crate::kube_client::WorkspaceKubeClient;

/// Runs idle checks for workspaces
pub struct IdleChecker {
    kube: Arc<dyn WorkspaceKubeClient>,
    detector: Arc<dyn IdleDetector>,
}

fn is_running(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_none()
        && pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            == Some("Running")
}

impl IdleChecker {
    /// Create a checker listing pods through `kube` and probing through `detector`
    pub fn new(kube: Arc<dyn WorkspaceKubeClient>, detector: Arc<dyn IdleDetector>) -> Self {
        Self { kube, detector }
    }

    /// Check whether the workspace has been idle past its configured timeout
    pub async fn check(&self, ws: &Workspace, idle: &IdleShutdownSpec) -> IdleCheckResult {
        let outcome = self.detect(ws, idle).await;
        if let Err(e) = &outcome {
            warn!(
                workspace = %ws.metadata.name.as_deref().unwrap_or_default(),
                error = %e,
                retryable = e.is_retryable(),
                "idle check failed"
            );
        }
        IdleCheckResult::from_detection(&outcome)
    }

    async fn detect(&self, ws: &Workspace, idle: &IdleShutdownSpec) -> Result<bool, Error> {
        let name = ws.metadata.name.clone().unwrap_or_default();
        let namespace = ws.metadata.namespace.clone().unwrap_or_default();

        let Some(method) = IdleDetectionMethod::from_spec(&idle.detection) else {
            return Err(Error::idle_permanent(&name, "no detection method configured"));
        };

        let pods = self
            .kube
            .list_workspace_pods(&name, &namespace)
            .await
            .map_err(|e| Error::idle_retryable(&name, format!("failed to list pods: {}", e)))?;
        let Some(pod) = pods.iter().find(|p| is_running(p)) else {
            return Err(Error::idle_retryable(&name, "no running pod found for workspace"));
        };
        let pod_name = pod.metadata.name.clone().unwrap_or_default();
        debug!(workspace = %name, pod = %pod_name, "found running workspace pod");

        let target = IdleTarget {
            workspace: name,
            namespace,
            pod: pod_name,
        };
        self.detector
            .detect(&target, &method, idle.idle_timeout_in_minutes)
            .await
    }
}
