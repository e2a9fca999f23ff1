//! Workspace sub-resource management
//!
//! The reconciler asks a [`WorkspaceResources`] implementation to converge
//! the Deployment, Service, PVC and access objects of one workspace and to
//! report how far they got. Builders are pure functions so they can be
//! tested without a cluster.

mod access;
mod builders;
mod kube;

pub use access::{render_access_resources, render_access_url, render_merge_env, RenderedAccessResource};
pub use builders::{build_deployment, build_pvc, build_service, deployment_ready, deployment_updating};
pub use kube::KubeWorkspaceResources;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use workspaces_common::crd::{AccessResourceStatus, Workspace, WorkspaceAccessStrategy};
use workspaces_common::Error;

use crate::validation::ResolvedConfig;

/// Everything needed to bring a workspace up
#[derive(Clone, Debug)]
pub struct RunningPlan {
    /// Effective configuration
    pub config: ResolvedConfig,
    /// Access strategy to expose the workspace through, if any
    pub access_strategy: Option<WorkspaceAccessStrategy>,
}

/// Readiness of a workspace's sub-resources after an ensure pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceReadiness {
    /// Deployment has its ready replica
    pub compute_ready: bool,
    /// Service exists
    pub service_ready: bool,
    /// All access objects were applied
    pub access_ready: bool,
    /// Deployment is rolling out a changed pod template
    pub compute_updating: bool,
    /// Deployment name
    pub deployment_name: Option<String>,
    /// Service name
    pub service_name: Option<String>,
    /// Applied access objects
    pub access_resources: Vec<AccessResourceStatus>,
    /// Rendered access URL
    pub access_url: Option<String>,
}

impl ResourceReadiness {
    /// True when compute, service and access are all ready
    pub fn all_ready(&self) -> bool {
        self.compute_ready && self.service_ready && self.access_ready
    }
}

/// Teardown progress of a stopping workspace
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopProgress {
    /// Access objects are gone
    pub access_stopped: bool,
    /// Deployment is gone
    pub compute_stopped: bool,
    /// Service is gone
    pub service_stopped: bool,
}

impl StopProgress {
    /// True when every sub-resource is gone
    pub fn all_stopped(&self) -> bool {
        self.access_stopped && self.compute_stopped && self.service_stopped
    }
}

/// Trait abstracting creation and teardown of workspace sub-resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkspaceResources: Send + Sync {
    /// Create or update every sub-resource and report readiness
    async fn ensure_running(
        &self,
        workspace: &Workspace,
        plan: &RunningPlan,
    ) -> Result<ResourceReadiness, Error>;

    /// Delete access objects, then Deployment and Service; storage is kept
    async fn ensure_stopped(&self, workspace: &Workspace) -> Result<StopProgress, Error>;

    /// Delete every sub-resource including storage; true once all are gone
    async fn cleanup(&self, workspace: &Workspace) -> Result<bool, Error>;
}
