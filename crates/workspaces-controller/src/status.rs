//! Workspace status updates
//!
//! Every phase update builds the full condition set, merges it against the
//! snapshot the reconcile pass started from and performs at most one write.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use workspaces_common::crd::{AccessResourceStatus, Condition, Workspace, WorkspaceStatus};
use workspaces_common::labels::PREEMPTED_MESSAGE;
use workspaces_common::Error;

use crate::conditions::{self, merge_conditions_if_changed};
use crate::kube_client::WorkspaceKubeClient;
use crate::resources::ResourceReadiness;

/// Resource names recorded in the Workspace status
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceNames {
    /// Deployment name
    pub deployment_name: Option<String>,
    /// Service name
    pub service_name: Option<String>,
    /// Access objects
    pub access_resources: Vec<AccessResourceStatus>,
    /// Access URL
    pub access_url: Option<String>,
}

impl ResourceNames {
    /// Names currently recorded on the workspace
    pub fn recorded(ws: &Workspace) -> Self {
        match &ws.status {
            Some(status) => Self {
                deployment_name: status.deployment_name.clone(),
                service_name: status.service_name.clone(),
                access_resources: status.access_resources.clone(),
                access_url: status.access_url.clone(),
            },
            None => Self::default(),
        }
    }

    /// Names reported by an ensure pass
    pub fn from_readiness(readiness: &ResourceReadiness) -> Self {
        Self {
            deployment_name: readiness.deployment_name.clone(),
            service_name: readiness.service_name.clone(),
            access_resources: readiness.access_resources.clone(),
            access_url: readiness.access_url.clone(),
        }
    }
}

/// Writes phase-specific status to Workspaces
pub struct StatusManager {
    kube: Arc<dyn WorkspaceKubeClient>,
}

impl StatusManager {
    /// Create a status manager writing through the given client
    pub fn new(kube: Arc<dyn WorkspaceKubeClient>) -> Self {
        Self { kube }
    }

    /// Sub-resources are still coming up; `reason` names the first unready one
    pub async fn update_starting(
        &self,
        ws: &Workspace,
        readiness: &ResourceReadiness,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.write(
            ws,
            conditions::starting(reason, message),
            ResourceNames::from_readiness(readiness),
        )
        .await
    }

    /// Every sub-resource is ready
    pub async fn update_running(
        &self,
        ws: &Workspace,
        readiness: &ResourceReadiness,
    ) -> Result<(), Error> {
        self.write(
            ws,
            conditions::running(),
            ResourceNames::from_readiness(readiness),
        )
        .await
    }

    /// A ready workspace is rolling out a change
    pub async fn update_updating(
        &self,
        ws: &Workspace,
        readiness: &ResourceReadiness,
    ) -> Result<(), Error> {
        self.write(
            ws,
            conditions::updating(),
            ResourceNames::from_readiness(readiness),
        )
        .await
    }

    /// Teardown in progress; `reason` names the sub-resource still active
    pub async fn update_stopping(
        &self,
        ws: &Workspace,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.write(
            ws,
            conditions::stopping(reason, message),
            ResourceNames::recorded(ws),
        )
        .await
    }

    /// Every sub-resource is gone; recorded names are cleared
    pub async fn update_stopped(&self, ws: &Workspace, preempted: bool) -> Result<(), Error> {
        let preemption = preempted.then_some(PREEMPTED_MESSAGE);
        self.write(ws, conditions::stopped(preemption), ResourceNames::default())
            .await
    }

    /// Workspace deletion is in progress
    pub async fn update_deleting(&self, ws: &Workspace) -> Result<(), Error> {
        self.write(ws, conditions::deleting(), ResourceNames::recorded(ws))
            .await
    }

    /// Mark the workspace Degraded, keeping every other condition
    pub async fn update_error(
        &self,
        ws: &Workspace,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        let desired = conditions::error(ws.conditions(), reason, message, Utc::now());
        self.write(ws, desired, ResourceNames::recorded(ws)).await
    }

    async fn write(
        &self,
        ws: &Workspace,
        desired: Vec<Condition>,
        names: ResourceNames,
    ) -> Result<(), Error> {
        let name = ws.metadata.name.as_deref().unwrap_or_default();
        let namespace = ws.metadata.namespace.as_deref().unwrap_or_default();
        let snapshot = ws.conditions();

        let merged = merge_conditions_if_changed(snapshot, &desired, Utc::now());
        let names_changed = ResourceNames::recorded(ws) != names;
        if merged.is_empty() && !names_changed {
            debug!(workspace = %name, "status unchanged, skipping write");
            return Ok(());
        }

        let conditions = if merged.is_empty() {
            snapshot.to_vec()
        } else {
            merged
        };
        let status = WorkspaceStatus {
            conditions,
            deployment_name: names.deployment_name,
            service_name: names.service_name,
            access_resources: names.access_resources,
            access_url: names.access_url,
        };
        self.kube
            .patch_workspace_status(name, namespace, &status)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{
        reasons, CONDITION_AVAILABLE, CONDITION_DEGRADED, CONDITION_PROGRESSING,
        CONDITION_STOPPED,
    };
    use crate::kube_client::MockWorkspaceKubeClient;
    use chrono::{DateTime, Duration};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::sync::Mutex;
    use workspaces_common::crd::{ConditionStatus, WorkspaceSpec};

    fn workspace(status: Option<WorkspaceStatus>) -> Workspace {
        Workspace {
            metadata: ObjectMeta {
                name: Some("nb".into()),
                namespace: Some("team".into()),
                ..Default::default()
            },
            spec: WorkspaceSpec::default(),
            status,
        }
    }

    fn ready() -> ResourceReadiness {
        ResourceReadiness {
            compute_ready: true,
            service_ready: true,
            access_ready: true,
            deployment_name: Some("jupyter-nb".into()),
            service_name: Some("jupyter-nb-service".into()),
            ..Default::default()
        }
    }

    /// Mock that records every written status
    fn recording_kube() -> (MockWorkspaceKubeClient, Arc<Mutex<Vec<WorkspaceStatus>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = written.clone();
        let mut mock = MockWorkspaceKubeClient::new();
        mock.expect_patch_workspace_status()
            .returning(move |_, _, status| {
                sink.lock().unwrap().push(status.clone());
                Ok(())
            });
        (mock, written)
    }

    fn stamped(mut conditions: Vec<Condition>, time: DateTime<Utc>) -> Vec<Condition> {
        for c in &mut conditions {
            c.last_transition_time = time;
        }
        conditions
    }

    #[tokio::test]
    async fn story_first_running_write_records_names_and_conditions() {
        let (mock, written) = recording_kube();
        let manager = StatusManager::new(Arc::new(mock));

        manager.update_running(&workspace(None), &ready()).await.unwrap();

        let written = written.lock().unwrap();
        assert_eq!(written.len(), 1);
        let status = &written[0];
        assert_eq!(status.deployment_name.as_deref(), Some("jupyter-nb"));
        let types: Vec<&str> = status.conditions.iter().map(|c| c.type_.as_str()).collect();
        assert_eq!(
            types,
            [CONDITION_AVAILABLE, CONDITION_PROGRESSING, CONDITION_DEGRADED, CONDITION_STOPPED]
        );
        assert!(status.conditions[0].is_true());
    }

    #[tokio::test]
    async fn story_unchanged_status_is_not_written() {
        let earlier = Utc::now() - Duration::minutes(10);
        let status = WorkspaceStatus {
            conditions: stamped(conditions::running(), earlier),
            deployment_name: Some("jupyter-nb".into()),
            service_name: Some("jupyter-nb-service".into()),
            ..Default::default()
        };
        let mut mock = MockWorkspaceKubeClient::new();
        mock.expect_patch_workspace_status().never();
        let manager = StatusManager::new(Arc::new(mock));

        manager
            .update_running(&workspace(Some(status)), &ready())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn story_name_change_alone_is_written_with_old_timestamps() {
        let earlier = Utc::now() - Duration::minutes(10);
        let status = WorkspaceStatus {
            conditions: stamped(conditions::running(), earlier),
            ..Default::default()
        };
        let (mock, written) = recording_kube();
        let manager = StatusManager::new(Arc::new(mock));

        manager
            .update_running(&workspace(Some(status)), &ready())
            .await
            .unwrap();

        let written = written.lock().unwrap();
        assert_eq!(written[0].service_name.as_deref(), Some("jupyter-nb-service"));
        assert!(written[0]
            .conditions
            .iter()
            .all(|c| c.last_transition_time == earlier));
    }

    #[tokio::test]
    async fn story_stopped_clears_names_and_reports_preemption() {
        let status = WorkspaceStatus {
            conditions: conditions::running(),
            deployment_name: Some("jupyter-nb".into()),
            service_name: Some("jupyter-nb-service".into()),
            access_url: Some("https://nb".into()),
            ..Default::default()
        };
        let (mock, written) = recording_kube();
        let manager = StatusManager::new(Arc::new(mock));

        manager
            .update_stopped(&workspace(Some(status)), true)
            .await
            .unwrap();

        let written = written.lock().unwrap();
        let status = &written[0];
        assert_eq!(status.deployment_name, None);
        assert_eq!(status.access_url, None);
        assert_eq!(status.conditions[0].reason, reasons::PREEMPTED);
        assert_eq!(status.conditions[0].message, PREEMPTED_MESSAGE);
        assert!(status.condition(CONDITION_STOPPED).unwrap().is_true());
    }

    #[tokio::test]
    async fn story_error_keeps_other_conditions() {
        let earlier = Utc::now() - Duration::minutes(10);
        let status = WorkspaceStatus {
            conditions: stamped(conditions::running(), earlier),
            deployment_name: Some("jupyter-nb".into()),
            ..Default::default()
        };
        let (mock, written) = recording_kube();
        let manager = StatusManager::new(Arc::new(mock));

        manager
            .update_error(
                &workspace(Some(status)),
                reasons::COMPLIANCE_VIOLATION,
                "image not allowed",
            )
            .await
            .unwrap();

        let written = written.lock().unwrap();
        let status = &written[0];
        let degraded = status.condition(CONDITION_DEGRADED).unwrap();
        assert_eq!(degraded.status, ConditionStatus::True);
        assert_eq!(degraded.reason, reasons::COMPLIANCE_VIOLATION);
        let available = status.condition(CONDITION_AVAILABLE).unwrap();
        assert!(available.is_true());
        assert_eq!(available.last_transition_time, earlier);
        assert_eq!(status.deployment_name.as_deref(), Some("jupyter-nb"));
    }

    #[tokio::test]
    async fn story_write_failure_propagates() {
        let mut mock = MockWorkspaceKubeClient::new();
        mock.expect_patch_workspace_status()
            .returning(|_, _, _| Err(Error::internal("boom")));
        let manager = StatusManager::new(Arc::new(mock));

        let result = manager.update_deleting(&workspace(None)).await;
        assert!(result.is_err());
    }
}
