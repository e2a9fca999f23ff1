//! Template policy violations
//!
//! A violation is structured data describing one breach of a template's
//! policy. The validation engine collects them; the compliance gate turns a
//! non-empty list into an error and a Degraded condition.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a template policy breach
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum ViolationType {
    /// Effective image is not in the template's allowed list
    ImageNotAllowed,
    /// A resource request or limit falls outside the template's bounds
    ResourceExceeded,
    /// Storage size falls outside the template's bounds
    StorageExceeded,
    /// Workspace overrides idle shutdown but the template forbids it
    IdleShutdownOverrideNotAllowed,
    /// Idle timeout outside the template's override bounds
    IdleShutdownTimeoutOutOfBounds,
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageNotAllowed => write!(f, "ImageNotAllowed"),
            Self::ResourceExceeded => write!(f, "ResourceExceeded"),
            Self::StorageExceeded => write!(f, "StorageExceeded"),
            Self::IdleShutdownOverrideNotAllowed => write!(f, "IdleShutdownOverrideNotAllowed"),
            Self::IdleShutdownTimeoutOutOfBounds => write!(f, "IdleShutdownTimeoutOutOfBounds"),
        }
    }
}

/// One detected breach of template policy
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Violation {
    /// Category of the breach
    #[serde(rename = "type")]
    pub type_: ViolationType,
    /// Path of the offending field (e.g. `spec.image`)
    pub field: String,
    /// Human-readable explanation
    pub message: String,
    /// What the template allows, when meaningful
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<String>,
    /// What the workspace asked for, when meaningful
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

impl Violation {
    /// Create a violation without allowed/actual detail
    pub fn new(type_: ViolationType, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_,
            field: field.into(),
            message: message.into(),
            allowed: None,
            actual: None,
        }
    }

    /// Attach the allowed and actual values
    pub fn with_values(mut self, allowed: impl Into<String>, actual: impl Into<String>) -> Self {
        self.allowed = Some(allowed.into());
        self.actual = Some(actual.into());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.type_, self.field, self.message)
    }
}

/// Join violations into a single human-readable summary
pub fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
