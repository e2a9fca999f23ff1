//! Workspace Custom Resource Definition
//!
//! A Workspace is a user-provisioned interactive compute environment. The
//! controller converges a Deployment, a Service, optional storage and access
//! objects towards `spec.desiredStatus` and reports progress through four
//! conditions.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    Condition, EnvVarSpec, IdleShutdownSpec, NamespacedRef, ResourceRequirementsSpec,
};

/// Desired lifecycle state of a workspace
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum DesiredStatus {
    /// Sub-resources should exist and be ready
    #[default]
    Running,
    /// Sub-resources should be torn down; storage is kept
    Stopped,
}

impl std::fmt::Display for DesiredStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Primary storage of a workspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Requested volume size (quantity string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Storage class for the claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Mount path inside the workspace container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
}

/// An access object created from an access strategy template
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessResourceStatus {
    /// Object kind
    pub kind: String,
    /// Object apiVersion
    pub api_version: String,
    /// Object name
    pub name: String,
    /// Object namespace
    pub namespace: String,
}

/// Specification for a Workspace
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "workspace.jupyter.org",
    version = "v1alpha1",
    kind = "Workspace",
    plural = "workspaces",
    shortname = "ws",
    namespaced,
    status = "WorkspaceStatus",
    printcolumn = r#"{"name":"Desired","type":"string","jsonPath":".spec.desiredStatus"}"#,
    printcolumn = r#"{"name":"Available","type":"string","jsonPath":".status.conditions[?(@.type==\"Available\")].status"}"#,
    printcolumn = r#"{"name":"Template","type":"string","jsonPath":".spec.templateRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    /// Human-readable name
    #[serde(default)]
    pub display_name: String,

    /// Running or Stopped; absent means Running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_status: Option<DesiredStatus>,

    /// Template providing defaults and policy (immutable after creation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<NamespacedRef>,

    /// Container image; falls back to the template's default image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Resource requests and limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirementsSpec>,

    /// Primary storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,

    /// Extra environment variables for the workspace container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarSpec>,

    /// Access strategy used to expose the workspace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_strategy: Option<NamespacedRef>,

    /// Idle auto-shutdown override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_shutdown: Option<IdleShutdownSpec>,
}

impl WorkspaceSpec {
    /// Desired status with the Running default applied
    pub fn desired_status(&self) -> DesiredStatus {
        self.desired_status.unwrap_or_default()
    }
}

/// Status of a Workspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    /// Available, Progressing, Degraded and Stopped, in that order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Name of the workspace Deployment while running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,

    /// Name of the workspace Service while running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Access objects applied from the access strategy
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_resources: Vec<AccessResourceStatus>,

    /// URL at which the workspace can be reached
    #[serde(default, rename = "accessURL", skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
}

impl WorkspaceStatus {
    /// Find a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

impl Workspace {
    /// Conditions from the status, empty when no status was written yet
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    /// True when the named condition is currently True
    pub fn condition_is_true(&self, type_: &str) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.condition(type_))
            .is_some_and(Condition::is_true)
    }

    /// Template name and namespace, defaulting the namespace to the workspace's
    pub fn template_key(&self) -> Option<(String, String)> {
        let ns = self.metadata.namespace.as_deref().unwrap_or_default();
        self.spec
            .template_ref
            .as_ref()
            .filter(|r| !r.name.is_empty())
            .map(|r| (r.name.clone(), r.namespace_or(ns).to_string()))
    }

    /// Access strategy name and namespace, defaulting the namespace to the workspace's
    pub fn access_strategy_key(&self) -> Option<(String, String)> {
        let ns = self.metadata.namespace.as_deref().unwrap_or_default();
        self.spec
            .access_strategy
            .as_ref()
            .filter(|r| !r.name.is_empty())
            .map(|r| (r.name.clone(), r.namespace_or(ns).to_string()))
    }

    /// True once deletion was requested
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ConditionStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn parse_spec(yaml: &str) -> WorkspaceSpec {
        serde_yaml::from_str(yaml).expect("parse spec")
    }

    fn workspace(ns: &str, spec: WorkspaceSpec) -> Workspace {
        Workspace {
            metadata: ObjectMeta {
                name: Some("nb".to_string()),
                namespace: Some(ns.to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    #[test]
    fn test_workspace_spec_parses_camel_case() {
        let spec = parse_spec(
            r#"
displayName: My Notebook
desiredStatus: Stopped
templateRef:
  name: gpu-small
  namespace: shared
resources:
  requests:
    cpu: "1500m"
    nvidia.com/gpu: "1"
storage:
  size: 10Gi
  storageClassName: fast
idleShutdown:
  enabled: true
  idleTimeoutInMinutes: 30
  detection:
    httpGet:
      path: /api/idle
      port: 8888
"#,
        );
        assert_eq!(spec.display_name, "My Notebook");
        assert_eq!(spec.desired_status(), DesiredStatus::Stopped);
        let template = spec.template_ref.as_ref().unwrap();
        assert_eq!(template.namespace.as_deref(), Some("shared"));
        let resources = spec.resources.as_ref().unwrap();
        assert_eq!(resources.requests["nvidia.com/gpu"], "1");
        assert_eq!(
            spec.storage.as_ref().unwrap().storage_class_name.as_deref(),
            Some("fast")
        );
        let idle = spec.idle_shutdown.as_ref().unwrap();
        assert_eq!(idle.idle_timeout_in_minutes, 30);
        assert_eq!(idle.detection.http_get.as_ref().unwrap().port, 8888);
    }

    #[test]
    fn test_desired_status_defaults_to_running() {
        let spec = parse_spec("displayName: x\n");
        assert_eq!(spec.desired_status(), DesiredStatus::Running);
    }

    #[test]
    fn test_unknown_desired_status_is_rejected() {
        let parsed: Result<WorkspaceSpec, _> = serde_yaml::from_str("desiredStatus: Paused\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_reference_keys_default_namespace() {
        let ws = workspace(
            "team",
            WorkspaceSpec {
                template_ref: Some(NamespacedRef {
                    name: "t".into(),
                    namespace: None,
                }),
                access_strategy: Some(NamespacedRef {
                    name: "web".into(),
                    namespace: Some("shared".into()),
                }),
                ..Default::default()
            },
        );
        assert_eq!(ws.template_key(), Some(("t".into(), "team".into())));
        assert_eq!(ws.access_strategy_key(), Some(("web".into(), "shared".into())));

        let ws = workspace("team", WorkspaceSpec::default());
        assert_eq!(ws.template_key(), None);
        assert_eq!(ws.access_strategy_key(), None);
    }

    #[test]
    fn test_status_serializes_access_url() {
        let status = WorkspaceStatus {
            access_url: Some("https://nb.example.com".into()),
            conditions: vec![Condition::new(
                "Available",
                ConditionStatus::True,
                "ResourcesReady",
                "ready",
            )],
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["accessURL"], "https://nb.example.com");
        assert!(json.get("deploymentName").is_none());

        let mut ws = workspace("team", WorkspaceSpec::default());
        assert!(ws.conditions().is_empty());
        ws.status = Some(status);
        assert!(ws.condition_is_true("Available"));
        assert!(!ws.condition_is_true("Stopped"));
    }
}
