//! Compliance gate
//!
//! Template changes mark referencing workspaces with the compliance-check
//! label. The gate runs the injected validator for those workspaces, clears
//! the label and reports the outcome through an event and the Degraded
//! condition.

use std::sync::Arc;

use async_trait::async_trait;
use kube::runtime::events::EventType;
use kube::Resource;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use workspaces_common::crd::Workspace;
use workspaces_common::events::{actions, reasons as event_reasons};
use workspaces_common::kube_utils::MetadataPatch;
use workspaces_common::labels::{compliance_check_requested, LABEL_COMPLIANCE_CHECK_NEEDED};
use workspaces_common::violation::summarize;
use workspaces_common::{Error, Violation};

use crate::conditions::reasons;
use crate::context::WorkspaceContext;
use crate::kube_client::WorkspaceKubeClient;
use crate::validation::resolve_workspace;

/// Checks a workspace against its template's policy
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ComplianceValidator: Send + Sync {
    /// Every violation of the workspace's template; errors mean the check could not run
    async fn validate(&self, workspace: &Workspace) -> Result<Vec<Violation>, Error>;
}

/// Validator resolving the workspace against its referenced template
pub struct TemplateComplianceValidator {
    kube: Arc<dyn WorkspaceKubeClient>,
}

impl TemplateComplianceValidator {
    /// Create a validator reading templates through `kube`
    pub fn new(kube: Arc<dyn WorkspaceKubeClient>) -> Self {
        Self { kube }
    }
}

#[async_trait]
impl ComplianceValidator for TemplateComplianceValidator {
    async fn validate(&self, workspace: &Workspace) -> Result<Vec<Violation>, Error> {
        Ok(resolve_workspace(workspace, self.kube.as_ref())
            .await?
            .violations)
    }
}

async fn clear_compliance_label(ws: &Workspace, ctx: &WorkspaceContext) -> Result<(), Error> {
    let name = ws.metadata.name.as_deref().unwrap_or_default();
    let namespace = ws.metadata.namespace.as_deref().unwrap_or_default();
    let patch = MetadataPatch::new().remove_label(LABEL_COMPLIANCE_CHECK_NEEDED);
    ctx.kube
        .patch_workspace_metadata(name, namespace, &patch)
        .await
}

/// Run the compliance check if the workspace requests one.
///
/// Returns `Error::ComplianceViolation` when the workspace breaches its
/// template. A failing validator keeps the label so the check is retried.
pub async fn run_compliance_gate(ws: &Workspace, ctx: &WorkspaceContext) -> Result<(), Error> {
    if !compliance_check_requested(ws) {
        return Ok(());
    }
    let name = ws.metadata.name.as_deref().unwrap_or_default();

    let Some(validator) = &ctx.validator else {
        info!(workspace = %name, "no compliance validator configured, clearing check request");
        return clear_compliance_label(ws, ctx).await;
    };

    let violations = validator.validate(ws).await?;
    clear_compliance_label(ws, ctx).await?;

    let object_ref = ws.object_ref(&());
    if violations.is_empty() {
        info!(workspace = %name, "workspace complies with its template");
        ctx.events
            .publish(
                &object_ref,
                EventType::Normal,
                event_reasons::COMPLIANCE_CHECK_PASSED,
                actions::VALIDATE,
                Some("Workspace complies with its template".to_string()),
            )
            .await;
        return Ok(());
    }

    let summary = summarize(&violations);
    warn!(workspace = %name, violations = violations.len(), %summary, "workspace violates its template");
    ctx.events
        .publish(
            &object_ref,
            EventType::Warning,
            event_reasons::COMPLIANCE_CHECK_FAILED,
            actions::VALIDATE,
            Some(summary.clone()),
        )
        .await;
    ctx.status
        .update_error(ws, reasons::COMPLIANCE_VIOLATION, &summary)
        .await?;
    Err(Error::compliance(name, violations))
}
