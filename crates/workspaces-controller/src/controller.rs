//! Workspace controller implementation
//!
//! One pass: finish deletion if requested, converge the finalizer and link
//! labels, run the compliance gate, then drive the desired state.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use workspaces_common::crd::{Workspace, WorkspaceAccessStrategy};
use workspaces_common::kube_utils::{
    has_finalizer, retry_on_conflict, with_finalizer, without_finalizer, MetadataPatch,
};
use workspaces_common::labels::{
    LABEL_ACCESS_STRATEGY_NAME, LABEL_ACCESS_STRATEGY_NAMESPACE, LABEL_TEMPLATE_NAME,
    LABEL_TEMPLATE_NAMESPACE, WORKSPACE_FINALIZER,
};
use workspaces_common::Error;

use crate::compliance::run_compliance_gate;
use crate::conditions::reasons;
use crate::context::WorkspaceContext;
use crate::state_machine::reconcile_desired_state;

// =============================================================================
// Reconcile
// =============================================================================

/// Reconcile a Workspace
#[instrument(skip(ws, ctx), fields(workspace = %ws.name_any()))]
pub async fn reconcile(ws: Arc<Workspace>, ctx: Arc<WorkspaceContext>) -> Result<Action, Error> {
    debug!("reconciling workspace");

    if ws.is_terminating() {
        return handle_deletion(&ws, &ctx).await;
    }

    if let Some(patch) = metadata_patch(&ws) {
        let namespace = ws.namespace().unwrap_or_default();
        debug!("converging workspace finalizer and link labels");
        return match ctx
            .kube
            .patch_workspace_metadata(&ws.name_any(), &namespace, &patch)
            .await
        {
            Ok(()) => Ok(Action::requeue(ctx.timing.poll)),
            Err(e) if e.is_not_found() => Ok(Action::await_change()),
            Err(e) => Err(e),
        };
    }

    run_compliance_gate(&ws, &ctx).await?;

    match reconcile_desired_state(&ws, &ctx).await {
        Ok(action) => Ok(action),
        Err(e) => {
            if !e.is_conflict() {
                record_error(&ws, &ctx, &e).await;
            }
            Err(e)
        }
    }
}

/// Mark the workspace Degraded; failures here only get logged
async fn record_error(ws: &Workspace, ctx: &WorkspaceContext, err: &Error) {
    if let Err(status_err) = ctx
        .status
        .update_error(ws, reasons::RECONCILE_ERROR, &err.to_string())
        .await
    {
        warn!(error = %status_err, "failed to record reconcile error in status");
    }
}

/// Error policy for the Workspace controller
///
/// - Compliance violations wait for a user fix: long delay
/// - Write conflicts resolve on re-read: poll delay
/// - Everything else: default backoff
pub fn error_policy(ws: Arc<Workspace>, error: &Error, ctx: Arc<WorkspaceContext>) -> Action {
    error!(
        ?error,
        workspace = %ws.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if matches!(error, Error::ComplianceViolation { .. }) {
        Action::requeue(ctx.timing.long)
    } else if error.is_conflict() {
        Action::requeue(ctx.timing.poll)
    } else {
        Action::requeue(ctx.timing.error_backoff)
    }
}

// =============================================================================
// Deletion
// =============================================================================

async fn handle_deletion(ws: &Workspace, ctx: &WorkspaceContext) -> Result<Action, Error> {
    if !has_finalizer(ws.metadata.finalizers.as_deref(), WORKSPACE_FINALIZER) {
        return Ok(Action::await_change());
    }
    let name = ws.name_any();
    let namespace = ws.namespace().unwrap_or_default();

    ctx.status.update_deleting(ws).await?;
    if !ctx.resources.cleanup(ws).await? {
        debug!("waiting for workspace sub-resources to be deleted");
        return Ok(Action::requeue(ctx.timing.poll));
    }

    let (name, namespace) = (name.as_str(), namespace.as_str());
    retry_on_conflict("remove workspace finalizer", || async move {
        let Some(current) = ctx.kube.get_workspace(name, namespace).await? else {
            return Ok(());
        };
        let Some(finalizers) =
            without_finalizer(current.metadata.finalizers.as_deref(), WORKSPACE_FINALIZER)
        else {
            return Ok(());
        };
        let patch = MetadataPatch::new()
            .with_finalizers(finalizers)
            .with_resource_version(current.metadata.resource_version.clone());
        match ctx
            .kube
            .patch_workspace_metadata(name, namespace, &patch)
            .await
        {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    })
    .await?;

    info!("workspace cleanup complete, finalizer removed");
    Ok(Action::await_change())
}

// =============================================================================
// Metadata convergence
// =============================================================================

fn converge_link(
    patch: MetadataPatch,
    ws: &Workspace,
    key: Option<(String, String)>,
    name_label: &str,
    namespace_label: &str,
) -> MetadataPatch {
    let labels = ws.labels();
    let mut patch = patch;
    match key {
        Some((name, namespace)) => {
            if labels.get(name_label) != Some(&name) {
                patch = patch.set_label(name_label, name);
            }
            if labels.get(namespace_label) != Some(&namespace) {
                patch = patch.set_label(namespace_label, namespace);
            }
        }
        None => {
            if labels.contains_key(name_label) {
                patch = patch.remove_label(name_label);
            }
            if labels.contains_key(namespace_label) {
                patch = patch.remove_label(namespace_label);
            }
        }
    }
    patch
}

/// Patch bringing the cleanup finalizer and link labels in line with the
/// spec, None when already converged
pub fn metadata_patch(ws: &Workspace) -> Option<MetadataPatch> {
    let mut patch = MetadataPatch::new();
    if let Some(finalizers) = with_finalizer(ws.metadata.finalizers.as_deref(), WORKSPACE_FINALIZER)
    {
        patch = patch
            .with_finalizers(finalizers)
            .with_resource_version(ws.metadata.resource_version.clone());
    }
    patch = converge_link(
        patch,
        ws,
        ws.template_key(),
        LABEL_TEMPLATE_NAME,
        LABEL_TEMPLATE_NAMESPACE,
    );
    patch = converge_link(
        patch,
        ws,
        ws.access_strategy_key(),
        LABEL_ACCESS_STRATEGY_NAME,
        LABEL_ACCESS_STRATEGY_NAMESPACE,
    );
    (!patch.is_empty()).then_some(patch)
}

// =============================================================================
// Watch mapping
// =============================================================================

/// Workspaces linked to the access strategy through their labels
pub fn workspaces_for_access_strategy(
    strategy: &WorkspaceAccessStrategy,
    workspaces: &[Arc<Workspace>],
) -> Vec<ObjectRef<Workspace>> {
    let name = strategy.name_any();
    let namespace = strategy.namespace().unwrap_or_default();
    workspaces
        .iter()
        .filter(|ws| {
            let labels = ws.labels();
            labels.get(LABEL_ACCESS_STRATEGY_NAME) == Some(&name)
                && labels.get(LABEL_ACCESS_STRATEGY_NAMESPACE) == Some(&namespace)
        })
        .map(|ws| ObjectRef::from_obj(ws.as_ref()))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
