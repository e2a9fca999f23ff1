//! Types shared by the workspace CRDs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (Available, Progressing, Degraded, Stopped)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// Same status, reason and message (timestamps ignored)
    pub fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }

    /// True when the condition's status is True
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Resource requests and limits, keyed by resource name (`cpu`, `memory`, `nvidia.com/gpu`)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    /// Requested quantities
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,

    /// Limit quantities
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

impl ResourceRequirementsSpec {
    /// True when no requests or limits are set
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }

    /// Overlay `other` on top of `self`; keys present in `other` win
    pub fn overlay(&self, other: &ResourceRequirementsSpec) -> ResourceRequirementsSpec {
        let mut merged = self.clone();
        merged
            .requests
            .extend(other.requests.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
            .limits
            .extend(other.limits.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Environment variable with a literal value
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EnvVarSpec {
    /// Variable name
    pub name: String,
    /// Variable value
    #[serde(default)]
    pub value: String,
}

/// Merge env lists by name; entries of `overrides` replace same-named entries of `base`
pub fn merge_env(base: &[EnvVarSpec], overrides: &[EnvVarSpec]) -> Vec<EnvVarSpec> {
    let mut merged: Vec<EnvVarSpec> = base
        .iter()
        .filter(|b| !overrides.iter().any(|o| o.name == b.name))
        .cloned()
        .collect();
    merged.extend(overrides.iter().cloned());
    merged
}

/// HTTP endpoint probed inside the workspace container
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpGetProbe {
    /// Request path, e.g. `/api/idle`
    pub path: String,
    /// Container port
    pub port: i32,
    /// `HTTP` or `HTTPS`; defaults to HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

/// How idleness is detected. Exactly one method should be set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdleDetectionSpec {
    /// Probe an HTTP endpoint reporting the last activity time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_get: Option<HttpGetProbe>,
}

/// Idle auto-shutdown configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdleShutdownSpec {
    /// Whether idle shutdown is active
    #[serde(default)]
    pub enabled: bool,

    /// Minutes of inactivity before the workspace is stopped
    #[serde(default)]
    pub idle_timeout_in_minutes: u32,

    /// Detection method
    #[serde(default)]
    pub detection: IdleDetectionSpec,
}

/// Reference to a namespaced object; namespace defaults to the referrer's
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct NamespacedRef {
    /// Object name
    pub name: String,
    /// Object namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl NamespacedRef {
    /// Namespace of the referenced object, falling back to `default_ns`
    pub fn namespace_or<'a>(&'a self, default_ns: &'a str) -> &'a str {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(default_ns)
    }
}
