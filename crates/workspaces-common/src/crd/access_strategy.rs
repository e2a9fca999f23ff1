//! WorkspaceAccessStrategy Custom Resource Definition
//!
//! An access strategy describes how a running workspace is exposed: which
//! routing objects to create (rendered from templates), the URL users reach
//! it on and extra environment for the workspace container.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One access object rendered per workspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessResourceTemplate {
    /// Kind of the rendered object
    pub kind: String,

    /// apiVersion of the rendered object (`group/version` or `v1`)
    pub api_version: String,

    /// Rendered object is named `{namePrefix}-{workspace}`
    pub name_prefix: String,

    /// Template for the object body below `apiVersion` and `kind` (YAML after rendering)
    pub template: String,
}

/// Environment variable whose value is rendered per workspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessEnvTemplate {
    /// Variable name
    pub name: String,
    /// Value template
    pub value_template: String,
}

/// Changes to the primary workspace container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryContainerModifications {
    /// Environment merged into the container's env by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merge_env: Vec<AccessEnvTemplate>,
}

/// Changes to the workspace pod template
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodModifications {
    /// Changes to the primary container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_container_modifications: Option<PrimaryContainerModifications>,
}

/// Changes an access strategy makes to the workspace Deployment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentModifications {
    /// Pod template changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_modifications: Option<PodModifications>,
}

/// Specification for a WorkspaceAccessStrategy
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "workspace.jupyter.org",
    version = "v1alpha1",
    kind = "WorkspaceAccessStrategy",
    plural = "workspaceaccessstrategies",
    shortname = "wsas",
    namespaced,
    printcolumn = r#"{"name":"Display Name","type":"string","jsonPath":".spec.displayName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceAccessStrategySpec {
    /// Human-readable name
    #[serde(default)]
    pub display_name: String,

    /// Objects created for every workspace using this strategy
    #[serde(default)]
    pub access_resource_templates: Vec<AccessResourceTemplate>,

    /// Template for the workspace access URL
    #[serde(default, rename = "accessURLTemplate", skip_serializing_if = "Option::is_none")]
    pub access_url_template: Option<String>,

    /// Changes to the workspace Deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_modifications: Option<DeploymentModifications>,
}

impl WorkspaceAccessStrategySpec {
    /// Env templates merged into the primary container
    pub fn merge_env(&self) -> &[AccessEnvTemplate] {
        self.deployment_modifications
            .as_ref()
            .and_then(|d| d.pod_modifications.as_ref())
            .and_then(|p| p.primary_container_modifications.as_ref())
            .map(|c| c.merge_env.as_slice())
            .unwrap_or_default()
    }
}
