//! Shared state for the usage-tracking controllers

use std::sync::Arc;

use kube::Client;

use workspaces_common::events::{EventPublisher, KubeEventPublisher};
use workspaces_common::ReconcileTiming;

use crate::kube_client::{UsageKubeClient, UsageKubeClientImpl};

/// Context for the WorkspaceTemplate and WorkspaceAccessStrategy controllers
pub struct UsageContext {
    /// API access
    pub kube: Arc<dyn UsageKubeClient>,
    /// Event publisher for emitting Kubernetes Events
    pub events: Arc<dyn EventPublisher>,
    /// Requeue delays
    pub timing: ReconcileTiming,
}

impl UsageContext {
    /// Create a context from explicit collaborators
    pub fn new(
        kube: Arc<dyn UsageKubeClient>,
        events: Arc<dyn EventPublisher>,
        timing: ReconcileTiming,
    ) -> Self {
        Self {
            kube,
            events,
            timing,
        }
    }

    /// Create a context backed by the Kubernetes API, reporting events as `reporter`
    pub fn from_client(client: Client, timing: ReconcileTiming, reporter: &str) -> Self {
        let events = Arc::new(KubeEventPublisher::new(client.clone(), reporter));
        Self::new(Arc::new(UsageKubeClientImpl::new(client)), events, timing)
    }

    /// Create a context for testing with a mock client
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn UsageKubeClient>) -> Self {
        use workspaces_common::events::NoopEventPublisher;

        Self::new(kube, Arc::new(NoopEventPublisher), ReconcileTiming::default())
    }
}
