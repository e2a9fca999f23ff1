//! WorkspaceTemplate Custom Resource Definition
//!
//! A template supplies defaults for workspaces that reference it and the
//! policy they are checked against: allowed images, resource and storage
//! bounds, and how far idle shutdown may be overridden.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{EnvVarSpec, IdleShutdownSpec, NamespacedRef, ResourceRequirementsSpec};

/// Resource name used for GPU bounds
pub const GPU_RESOURCE: &str = "nvidia.com/gpu";

/// Inclusive range of quantities; either end may be open
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceRange {
    /// Lower bound (quantity string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    /// Upper bound (quantity string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
}

/// Bounds on workspace resource requests
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBounds {
    /// CPU bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<ResourceRange>,

    /// Memory bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<ResourceRange>,

    /// GPU (`nvidia.com/gpu`) bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<ResourceRange>,

    /// Bounds for any other named resource
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourceRange>,
}

impl ResourceBounds {
    /// Every bounded resource as (resource name, range), named fields first
    pub fn ranges(&self) -> Vec<(String, &ResourceRange)> {
        let named = [
            ("cpu", self.cpu.as_ref()),
            ("memory", self.memory.as_ref()),
            (GPU_RESOURCE, self.gpu.as_ref()),
        ];
        let mut out: Vec<(String, &ResourceRange)> = named
            .into_iter()
            .filter_map(|(name, range)| range.map(|r| (name.to_string(), r)))
            .collect();
        for (name, range) in &self.resources {
            if !out.iter().any(|(n, _)| n == name) {
                out.push((name.clone(), range));
            }
        }
        out
    }
}

/// Primary storage defaults and bounds
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Size used when the workspace does not ask for one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_size: Option<String>,

    /// Smallest allowed size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<String>,

    /// Largest allowed size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<String>,

    /// Storage class used when the workspace does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_storage_class_name: Option<String>,

    /// Mount path used when the workspace does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mount_path: Option<String>,
}

/// How far a workspace may override the template's idle shutdown
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdleShutdownOverridePolicy {
    /// Whether workspaces may override idle shutdown at all (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<bool>,

    /// Smallest timeout a workspace may choose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_idle_timeout_in_minutes: Option<u32>,

    /// Largest timeout a workspace may choose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle_timeout_in_minutes: Option<u32>,
}

/// Status of a WorkspaceTemplate
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceTemplateStatus {
    /// Last spec generation whose referencing workspaces were flagged for a compliance check
    #[serde(default)]
    pub observed_generation: i64,
}

/// Specification for a WorkspaceTemplate
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "workspace.jupyter.org",
    version = "v1alpha1",
    kind = "WorkspaceTemplate",
    plural = "workspacetemplates",
    shortname = "wst",
    namespaced,
    status = "WorkspaceTemplateStatus",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.defaultImage"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceTemplateSpec {
    /// Human-readable name
    #[serde(default)]
    pub display_name: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Image used when the workspace does not set one
    #[serde(default)]
    pub default_image: String,

    /// Images workspaces may use; empty means unrestricted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_images: Vec<String>,

    /// Allow images outside `allowedImages`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_custom_images: Option<bool>,

    /// Requests and limits applied under the workspace's own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_resources: Option<ResourceRequirementsSpec>,

    /// Bounds on resource requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_bounds: Option<ResourceBounds>,

    /// Primary storage defaults and bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_storage: Option<StorageConfig>,

    /// Environment variables applied under the workspace's own
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_env: Vec<EnvVarSpec>,

    /// Whether workspaces may mount secondary storage (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_secondary_storages: Option<bool>,

    /// Idle shutdown used when the workspace does not set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_idle_shutdown: Option<IdleShutdownSpec>,

    /// Limits on workspace idle shutdown overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_shutdown_overrides: Option<IdleShutdownOverridePolicy>,

    /// Access strategy used when the workspace does not set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_access_strategy: Option<NamespacedRef>,
}
