//! Kubernetes API access for the Workspace controller
//!
//! All reads and writes the reconciler makes on workspace-domain objects go
//! through [`WorkspaceKubeClient`], so reconcile logic can be tested against
//! mocks.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use workspaces_common::crd::{
    DesiredStatus, Workspace, WorkspaceAccessStrategy, WorkspaceStatus, WorkspaceTemplate,
};
use workspaces_common::kube_utils::MetadataPatch;
use workspaces_common::labels::workspace_pod_selector;
use workspaces_common::{Error, FIELD_MANAGER};

/// Trait abstracting Kubernetes client operations for Workspaces
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkspaceKubeClient: Send + Sync {
    /// Get a Workspace, None if it does not exist
    async fn get_workspace(&self, name: &str, namespace: &str) -> Result<Option<Workspace>, Error>;

    /// Replace the Workspace status (unset fields are cleared)
    async fn patch_workspace_status(
        &self,
        name: &str,
        namespace: &str,
        status: &WorkspaceStatus,
    ) -> Result<(), Error>;

    /// Apply a label/finalizer patch to a Workspace
    async fn patch_workspace_metadata(
        &self,
        name: &str,
        namespace: &str,
        patch: &MetadataPatch,
    ) -> Result<(), Error>;

    /// Set `spec.desiredStatus`
    async fn set_desired_status(
        &self,
        name: &str,
        namespace: &str,
        desired: DesiredStatus,
    ) -> Result<(), Error>;

    /// Get a WorkspaceTemplate, None if it does not exist
    async fn get_template(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<WorkspaceTemplate>, Error>;

    /// Get a WorkspaceAccessStrategy, None if it does not exist
    async fn get_access_strategy(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<WorkspaceAccessStrategy>, Error>;

    /// List the pods labelled with the workspace name
    async fn list_workspace_pods(&self, workspace: &str, namespace: &str)
        -> Result<Vec<Pod>, Error>;
}

/// Real Kubernetes client implementation
pub struct WorkspaceKubeClientImpl {
    client: Client,
}

impl WorkspaceKubeClientImpl {
    /// Create a new WorkspaceKubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Merge patch body replacing the whole status.
///
/// Fields the status leaves unset are sent as null so a merge patch clears
/// them (e.g. resource names once a workspace stopped).
pub fn status_patch_body(status: &WorkspaceStatus) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "conditions": status.conditions,
            "deploymentName": status.deployment_name,
            "serviceName": status.service_name,
            "accessResources": status.access_resources,
            "accessURL": status.access_url,
        }
    })
}

#[async_trait]
impl WorkspaceKubeClient for WorkspaceKubeClientImpl {
    async fn get_workspace(&self, name: &str, namespace: &str) -> Result<Option<Workspace>, Error> {
        let api: Api<Workspace> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_workspace_status(
        &self,
        name: &str,
        namespace: &str,
        status: &WorkspaceStatus,
    ) -> Result<(), Error> {
        let api: Api<Workspace> = Api::namespaced(self.client.clone(), namespace);
        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch_body(status)),
        )
        .await?;
        Ok(())
    }

    async fn patch_workspace_metadata(
        &self,
        name: &str,
        namespace: &str,
        patch: &MetadataPatch,
    ) -> Result<(), Error> {
        let api: Api<Workspace> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch.to_json()),
        )
        .await?;
        Ok(())
    }

    async fn set_desired_status(
        &self,
        name: &str,
        namespace: &str,
        desired: DesiredStatus,
    ) -> Result<(), Error> {
        let api: Api<Workspace> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "spec": { "desiredStatus": desired } });
        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_template(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<WorkspaceTemplate>, Error> {
        let api: Api<WorkspaceTemplate> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_access_strategy(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<WorkspaceAccessStrategy>, Error> {
        let api: Api<WorkspaceAccessStrategy> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_workspace_pods(
        &self,
        workspace: &str,
        namespace: &str,
    ) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&workspace_pod_selector(workspace));
        Ok(api.list(&params).await?.items)
    }
}
