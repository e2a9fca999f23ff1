//! Kubernetes API access for the usage-tracking controllers

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use workspaces_common::crd::{
    Workspace, WorkspaceAccessStrategy, WorkspaceTemplate, WorkspaceTemplateStatus,
};
use workspaces_common::kube_utils::{patch_resource_status, MetadataPatch};
use workspaces_common::{Error, FIELD_MANAGER};

use crate::kind::ProtectedKind;

/// One page of a Workspace list
#[derive(Clone, Debug, Default)]
pub struct WorkspacePage {
    /// Workspaces on this page
    pub items: Vec<Workspace>,
    /// Token for the next page, None on the last page
    pub continue_token: Option<String>,
}

/// Trait abstracting Kubernetes client operations for usage tracking
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UsageKubeClient: Send + Sync {
    /// List Workspaces across all namespaces matching `label_selector`
    async fn list_workspaces(
        &self,
        label_selector: &str,
        limit: u32,
        continue_token: Option<String>,
    ) -> Result<WorkspacePage, Error>;

    /// Apply a label patch to a Workspace
    async fn patch_workspace_metadata(
        &self,
        name: &str,
        namespace: &str,
        patch: &MetadataPatch,
    ) -> Result<(), Error>;

    /// Metadata of a protected object, None if it does not exist
    async fn get_metadata(
        &self,
        kind: ProtectedKind,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ObjectMeta>, Error>;

    /// Apply a finalizer patch to a protected object
    async fn patch_metadata(
        &self,
        kind: ProtectedKind,
        name: &str,
        namespace: &str,
        patch: &MetadataPatch,
    ) -> Result<(), Error>;

    /// Write a WorkspaceTemplate status
    async fn patch_template_status(
        &self,
        name: &str,
        namespace: &str,
        status: &WorkspaceTemplateStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct UsageKubeClientImpl {
    client: Client,
}

impl UsageKubeClientImpl {
    /// Create a new UsageKubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UsageKubeClient for UsageKubeClientImpl {
    async fn list_workspaces(
        &self,
        label_selector: &str,
        limit: u32,
        continue_token: Option<String>,
    ) -> Result<WorkspacePage, Error> {
        let api: Api<Workspace> = Api::all(self.client.clone());
        let mut params = ListParams::default().labels(label_selector).limit(limit);
        if let Some(token) = continue_token {
            params = params.continue_token(&token);
        }
        let list = api.list(&params).await?;
        Ok(WorkspacePage {
            continue_token: list.metadata.continue_.filter(|t| !t.is_empty()),
            items: list.items,
        })
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

    async fn get_metadata(
        &self,
        kind: ProtectedKind,
        name: &str,
        namespace: &str,
    ) -> Result<Option<ObjectMeta>, Error> {
        let meta = match kind {
            ProtectedKind::Template => {
                let api: Api<WorkspaceTemplate> = Api::namespaced(self.client.clone(), namespace);
                api.get_opt(name).await?.map(|t| t.metadata)
            }
            ProtectedKind::AccessStrategy => {
                let api: Api<WorkspaceAccessStrategy> =
                    Api::namespaced(self.client.clone(), namespace);
                api.get_opt(name).await?.map(|s| s.metadata)
            }
        };
        Ok(meta)
    }

    async fn patch_metadata(
        &self,
        kind: ProtectedKind,
        name: &str,
        namespace: &str,
        patch: &MetadataPatch,
    ) -> Result<(), Error> {
        let params = PatchParams::apply(FIELD_MANAGER);
        let body = patch.to_json();
        match kind {
            ProtectedKind::Template => {
                let api: Api<WorkspaceTemplate> = Api::namespaced(self.client.clone(), namespace);
                api.patch(name, &params, &Patch::Merge(&body)).await?;
            }
            ProtectedKind::AccessStrategy => {
                let api: Api<WorkspaceAccessStrategy> =
                    Api::namespaced(self.client.clone(), namespace);
                api.patch(name, &params, &Patch::Merge(&body)).await?;
            }
        }
        Ok(())
    }

    async fn patch_template_status(
        &self,
        name: &str,
        namespace: &str,
        status: &WorkspaceTemplateStatus,
    ) -> Result<(), Error> {
        patch_resource_status::<WorkspaceTemplate>(
            &self.client,
            name,
            namespace,
            status,
            FIELD_MANAGER,
        )
        .await?;
        Ok(())
    }
}
