//! Server-side-apply implementation of [`WorkspaceResources`]

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, DynamicObject, Patch, PatchParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use workspaces_common::crd::{AccessResourceStatus, Workspace};
use workspaces_common::kube_utils::build_api_resource;
use workspaces_common::labels::{deployment_name, pvc_name, service_name};
use workspaces_common::{Error, FIELD_MANAGER};

use super::access::{render_access_resources, render_access_url, render_merge_env};
use super::builders::{
    build_deployment, build_pvc, build_service, deployment_ready, deployment_updating,
};
use super::{ResourceReadiness, RunningPlan, StopProgress, WorkspaceResources};

/// Sub-resource manager backed by the Kubernetes API
pub struct KubeWorkspaceResources {
    client: Client,
}

impl KubeWorkspaceResources {
    /// Create a manager using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn apply_params() -> PatchParams {
        PatchParams::apply(FIELD_MANAGER).force()
    }

    async fn apply<K>(&self, namespace: &str, obj: &K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
    {
        let name = obj.meta().name.clone().unwrap_or_default();
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        debug!(kind = %K::kind(&()), name = %name, "applying resource");
        Ok(api
            .patch(&name, &Self::apply_params(), &Patch::Apply(obj))
            .await?)
    }

    /// Issue a delete if the object still exists; true once it is gone
    async fn delete_until_gone<K>(&self, api: &Api<K>, name: &str) -> Result<bool, Error>
    where
        K: Resource + Clone + DeserializeOwned + std::fmt::Debug,
    {
        if api.get_opt(name).await?.is_none() {
            return Ok(true);
        }
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(false),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    fn dynamic_api(&self, resource: &AccessResourceStatus) -> Api<DynamicObject> {
        let ar = build_api_resource(&resource.api_version, &resource.kind);
        Api::namespaced_with(self.client.clone(), &resource.namespace, &ar)
    }

    /// Delete the given access objects; true once all of them are gone
    async fn delete_access_resources(
        &self,
        resources: &[AccessResourceStatus],
    ) -> Result<bool, Error> {
        let mut all_gone = true;
        for resource in resources {
            let api = self.dynamic_api(resource);
            if !self.delete_until_gone(&api, &resource.name).await? {
                all_gone = false;
            }
        }
        Ok(all_gone)
    }

    async fn stop_compute(&self, namespace: &str, ws_name: &str) -> Result<(bool, bool), Error> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let compute = self
            .delete_until_gone(&deployments, &deployment_name(ws_name))
            .await?;
        let service = self
            .delete_until_gone(&services, &service_name(ws_name))
            .await?;
        Ok((compute, service))
    }
}

fn previous_access_resources(ws: &Workspace) -> &[AccessResourceStatus] {
    ws.status
        .as_ref()
        .map(|s| s.access_resources.as_slice())
        .unwrap_or_default()
}

#[async_trait]
impl WorkspaceResources for KubeWorkspaceResources {
    async fn ensure_running(
        &self,
        ws: &Workspace,
        plan: &RunningPlan,
    ) -> Result<ResourceReadiness, Error> {
        let ws_name = ws.metadata.name.clone().unwrap_or_default();
        let namespace = ws.metadata.namespace.clone().unwrap_or_default();

        if let Some(storage) = &plan.config.storage {
            self.apply(&namespace, &build_pvc(ws, storage)).await?;
        }

        let access_env = match &plan.access_strategy {
            Some(strategy) => render_merge_env(ws, strategy)?,
            None => Vec::new(),
        };
        let deployment = self
            .apply(&namespace, &build_deployment(ws, &plan.config, &access_env))
            .await?;
        self.apply(&namespace, &build_service(ws)).await?;

        let (rendered, access_url) = match &plan.access_strategy {
            Some(strategy) => (
                render_access_resources(ws, strategy)?,
                render_access_url(ws, strategy)?,
            ),
            None => (Vec::new(), None),
        };
        for resource in &rendered {
            let api = self.dynamic_api(&resource.status);
            api.patch(
                &resource.status.name,
                &Self::apply_params(),
                &Patch::Apply(&resource.manifest),
            )
            .await?;
        }

        let stale: Vec<AccessResourceStatus> = previous_access_resources(ws)
            .iter()
            .filter(|prev| !rendered.iter().any(|r| &r.status == *prev))
            .cloned()
            .collect();
        if !stale.is_empty() {
            info!(workspace = %ws_name, count = stale.len(), "removing stale access resources");
            self.delete_access_resources(&stale).await?;
        }

        Ok(ResourceReadiness {
            compute_ready: deployment_ready(&deployment),
            service_ready: true,
            access_ready: true,
            compute_updating: deployment_updating(&deployment),
            deployment_name: Some(deployment_name(&ws_name)),
            service_name: Some(service_name(&ws_name)),
            access_resources: rendered.into_iter().map(|r| r.status).collect(),
            access_url,
        })
    }

    async fn ensure_stopped(&self, ws: &Workspace) -> Result<StopProgress, Error> {
        let ws_name = ws.metadata.name.clone().unwrap_or_default();
        let namespace = ws.metadata.namespace.clone().unwrap_or_default();

        let access_stopped = self
            .delete_access_resources(previous_access_resources(ws))
            .await?;
        let (compute_stopped, service_stopped) = self.stop_compute(&namespace, &ws_name).await?;
        Ok(StopProgress {
            access_stopped,
            compute_stopped,
            service_stopped,
        })
    }

    async fn cleanup(&self, ws: &Workspace) -> Result<bool, Error> {
        let ws_name = ws.metadata.name.clone().unwrap_or_default();
        let namespace = ws.metadata.namespace.clone().unwrap_or_default();

        let stopped = self.ensure_stopped(ws).await?;
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &namespace);
        let storage_gone = self.delete_until_gone(&pvcs, &pvc_name(&ws_name)).await?;
        Ok(stopped.all_stopped() && storage_gone)
    }
}
