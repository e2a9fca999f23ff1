//! Error types for the workspaces operator
//!
//! Errors are structured with fields to aid debugging in production. The
//! variants follow the failure taxonomy the controllers act on: malformed
//! specs, missing referenced objects, policy violations, transient
//! infrastructure faults and permanent configuration faults.

use thiserror::Error;

use crate::violation::{summarize, Violation};

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for workspace operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The workspace spec is malformed (admission should have rejected it)
    #[error("validation error for {workspace}: {message}")]
    Validation {
        /// Name of the workspace with invalid configuration
        workspace: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.image")
        field: Option<String>,
    },

    /// A referenced WorkspaceTemplate does not exist
    #[error("workspace template {namespace}/{name} not found")]
    TemplateNotFound {
        /// Template name
        name: String,
        /// Template namespace
        namespace: String,
    },

    /// A referenced WorkspaceAccessStrategy does not exist
    #[error("workspace access strategy {namespace}/{name} not found")]
    AccessStrategyNotFound {
        /// Access strategy name
        name: String,
        /// Access strategy namespace
        namespace: String,
    },

    /// The workspace breaches its template's policy
    #[error("workspace {workspace} violates its template: {}", summarize(.violations))]
    ComplianceViolation {
        /// Name of the non-compliant workspace
        workspace: String,
        /// Every detected violation
        violations: Vec<Violation>,
    },

    /// Idle detection failed
    #[error("idle detection failed for {workspace}: {message}")]
    IdleDetection {
        /// Name of the workspace being probed
        workspace: String,
        /// Description of what failed
        message: String,
        /// Whether probing again later may succeed
        retryable: bool,
    },

    /// Command execution inside a pod failed
    #[error("exec in pod {pod} failed: {message}")]
    Exec {
        /// Pod the command ran in
        pod: String,
        /// Process exit code, when the command ran and exited non-zero
        exit_code: Option<i32>,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Rendering an access strategy template failed
    #[error("render error for {template}: {message}")]
    Render {
        /// Which template failed (name prefix or env var name)
        template: String,
        /// Description of what failed
        message: String,
    },

    /// Internal error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Where the error happened
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a validation error without workspace context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            workspace: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific workspace
    pub fn validation_for(workspace: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            workspace: workspace.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error pointing at a field
    pub fn validation_for_field(
        workspace: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            workspace: workspace.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a template-not-found error
    pub fn template_not_found(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::TemplateNotFound {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Create an access-strategy-not-found error
    pub fn access_strategy_not_found(
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::AccessStrategyNotFound {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Create a compliance violation error
    pub fn compliance(workspace: impl Into<String>, violations: Vec<Violation>) -> Self {
        Self::ComplianceViolation {
            workspace: workspace.into(),
            violations,
        }
    }

    /// Create an idle detection failure that is worth retrying
    pub fn idle_retryable(workspace: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::IdleDetection {
            workspace: workspace.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create an idle detection failure that will not resolve on its own
    pub fn idle_permanent(workspace: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::IdleDetection {
            workspace: workspace.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create an exec error
    pub fn exec(pod: impl Into<String>, exit_code: Option<i32>, msg: impl Into<String>) -> Self {
        Self::Exec {
            pod: pod.into(),
            exit_code,
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error for a specific resource kind
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a render error
    pub fn render(template: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Render {
            template: template.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            context: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Conflicts resolve on re-read; other 4xx errors need a spec change
                matches!(source, kube::Error::Api(ae) if ae.code == 409)
                    || !matches!(
                        source,
                        kube::Error::Api(ae) if (400..500).contains(&ae.code)
                    )
            }
            Error::Validation { .. } => false,
            Error::TemplateNotFound { .. } => true,
            Error::AccessStrategyNotFound { .. } => true,
            Error::ComplianceViolation { .. } => false,
            Error::IdleDetection { retryable, .. } => *retryable,
            Error::Exec { .. } => true,
            Error::Serialization { .. } => false,
            Error::Render { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// True for optimistic-concurrency write conflicts (HTTP 409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }

    /// True when the API server reported the object missing (HTTP 404)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }

    /// Get the workspace name associated with this error, if any
    pub fn workspace(&self) -> Option<&str> {
        match self {
            Error::Validation { workspace, .. }
            | Error::ComplianceViolation { workspace, .. }
            | Error::IdleDetection { workspace, .. } => Some(workspace),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} error", reason),
        reason: reason.to_string(),
        code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::ViolationType;

    /// Story: a workspace without image or template is rejected as malformed
    #[test]
    fn story_malformed_spec_is_not_retried() {
        let err = Error::validation_for_field("nb", "spec.image", "image or templateRef required");
        assert!(!err.is_retryable());
        assert_eq!(err.workspace(), Some("nb"));
        assert_eq!(
            err.to_string(),
            "validation error for nb: image or templateRef required"
        );
        match err {
            Error::Validation { field, .. } => assert_eq!(field.as_deref(), Some("spec.image")),
            _ => panic!("expected Validation variant"),
        }
    }

    /// Story: a missing template is an operational fault retried with backoff
    #[test]
    fn story_missing_template_is_retryable() {
        let err = Error::template_not_found("gpu-small", "shared");
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "workspace template shared/gpu-small not found");

        let err = Error::access_strategy_not_found("web", "team");
        assert!(err.is_retryable());
    }

    /// Story: compliance violations list every breach in the message
    #[test]
    fn story_compliance_violation_summarizes_breaches() {
        let err = Error::compliance(
            "nb",
            vec![
                Violation::new(ViolationType::ImageNotAllowed, "spec.image", "image c not allowed"),
                Violation::new(ViolationType::StorageExceeded, "spec.storage.size", "too big"),
            ],
        );
        assert!(!err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("spec.image"));
        assert!(msg.contains("spec.storage.size"));
    }

    /// Story: idle detection errors carry their own retry classification
    #[test]
    fn story_idle_detection_retry_classification() {
        assert!(Error::idle_retryable("nb", "connection refused").is_retryable());
        assert!(!Error::idle_permanent("nb", "endpoint not found").is_retryable());
    }

    #[test]
    fn story_kube_error_classification() {
        let conflict = Error::from(api_error(409, "Conflict"));
        assert!(conflict.is_conflict());
        assert!(conflict.is_retryable());
        assert!(!conflict.is_not_found());

        let not_found = Error::from(api_error(404, "NotFound"));
        assert!(not_found.is_not_found());
        assert!(!not_found.is_retryable());

        let server = Error::from(api_error(500, "InternalError"));
        assert!(server.is_retryable());
        assert!(!server.is_conflict());
    }

    #[test]
    fn story_error_construction_ergonomics() {
        let err = Error::internal("boom");
        assert!(err.to_string().contains(UNKNOWN_CONTEXT));
        let err = Error::internal_with_context("status", "boom");
        assert_eq!(err.to_string(), "internal error [status]: boom");
        let err = Error::serialization_for_kind("Deployment", "bad json");
        match err {
            Error::Serialization { kind, .. } => assert_eq!(kind.as_deref(), Some("Deployment")),
            _ => panic!("expected Serialization variant"),
        }
        let err = Error::render("route-", "undefined variable");
        assert!(!err.is_retryable());
        let err = Error::exec("jupyter-nb-abc", Some(7), "exit code 7");
        assert!(err.is_retryable());
    }
}
