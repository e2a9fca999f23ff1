//! Shared state for Workspace reconciliation

use std::sync::Arc;

use kube::Client;

use workspaces_common::events::{reporters, EventPublisher, KubeEventPublisher};
use workspaces_common::ReconcileTiming;

use crate::compliance::{ComplianceValidator, TemplateComplianceValidator};
use crate::idle::{HttpProbeDetector, IdleChecker, KubePodExec};
use crate::kube_client::{WorkspaceKubeClient, WorkspaceKubeClientImpl};
use crate::resources::{KubeWorkspaceResources, WorkspaceResources};
use crate::status::StatusManager;

/// Controller context containing shared clients and collaborators
///
/// The context is shared across all reconciliation calls. Every collaborator
/// sits behind a trait so reconcile logic can run against mocks.
pub struct WorkspaceContext {
    /// Workspace-domain API access
    pub kube: Arc<dyn WorkspaceKubeClient>,
    /// Sub-resource manager
    pub resources: Arc<dyn WorkspaceResources>,
    /// Compliance validator; None skips validation but still clears requests
    pub validator: Option<Arc<dyn ComplianceValidator>>,
    /// Idle detection
    pub idle: Arc<IdleChecker>,
    /// Event publisher for emitting Kubernetes Events
    pub events: Arc<dyn EventPublisher>,
    /// Status writer
    pub status: Arc<StatusManager>,
    /// Requeue delays
    pub timing: ReconcileTiming,
}

impl WorkspaceContext {
    /// Create a context from explicit collaborators
    pub fn new(
        kube: Arc<dyn WorkspaceKubeClient>,
        resources: Arc<dyn WorkspaceResources>,
        validator: Option<Arc<dyn ComplianceValidator>>,
        idle: Arc<IdleChecker>,
        events: Arc<dyn EventPublisher>,
        timing: ReconcileTiming,
    ) -> Self {
        Self {
            status: Arc::new(StatusManager::new(kube.clone())),
            kube,
            resources,
            validator,
            idle,
            events,
            timing,
        }
    }

    /// Create a context backed by the Kubernetes API
    ///
    /// With `compliance_enabled` false no validator is installed and
    /// compliance requests are cleared without checking.
    pub fn from_client(client: Client, timing: ReconcileTiming, compliance_enabled: bool) -> Self {
        let kube: Arc<dyn WorkspaceKubeClient> =
            Arc::new(WorkspaceKubeClientImpl::new(client.clone()));
        let validator = compliance_enabled.then(|| {
            Arc::new(TemplateComplianceValidator::new(kube.clone())) as Arc<dyn ComplianceValidator>
        });
        let detector = Arc::new(HttpProbeDetector::new(Arc::new(KubePodExec::new(
            client.clone(),
        ))));
        let events = Arc::new(KubeEventPublisher::new(client.clone(), reporters::WORKSPACE));
        Self::new(
            kube.clone(),
            Arc::new(KubeWorkspaceResources::new(client)),
            validator,
            Arc::new(IdleChecker::new(kube, detector)),
            events,
            timing,
        )
    }

    /// Create a context for testing with mock clients
    ///
    /// Resource and idle collaborators have no expectations; tests that reach
    /// them replace the fields.
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn WorkspaceKubeClient>) -> Self {
        use crate::idle::MockIdleDetector;
        use crate::resources::MockWorkspaceResources;
        use workspaces_common::events::NoopEventPublisher;

        Self::new(
            kube.clone(),
            Arc::new(MockWorkspaceResources::new()),
            None,
            Arc::new(IdleChecker::new(kube, Arc::new(MockIdleDetector::new()))),
            Arc::new(NoopEventPublisher),
            ReconcileTiming::default(),
        )
    }
}
