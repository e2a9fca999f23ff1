//! CRD installation utilities
//!
//! The operator installs its own CRDs on startup using server-side apply so
//! the CRD versions always match the operator version.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use workspaces_common::crd::{Workspace, WorkspaceAccessStrategy, WorkspaceTemplate};
use workspaces_common::FIELD_MANAGER;

/// Every CRD the operator serves
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        Workspace::crd(),
        WorkspaceTemplate::crd(),
        WorkspaceAccessStrategy::crd(),
    ]
}

/// All CRDs as one multi-document YAML stream
pub fn crds_yaml() -> anyhow::Result<String> {
    let docs = all_crds()
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {}", e))?;
    Ok(docs.join("---\n"))
}

/// Install or update every CRD using server-side apply
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in all_crds() {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!("Installing {} CRD...", name);
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", name, e))?;
    }

    tracing::info!("Workspace CRDs installed/updated");
    Ok(())
}
