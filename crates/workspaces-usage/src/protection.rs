//! Deletion protection shared by templates and access strategies
//!
//! The kind's finalizer is held exactly while at least one active workspace
//! references the object. Deleting a referenced object leaves it terminating
//! until the last reference goes away.

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use tracing::{debug, info};

use workspaces_common::events::actions;
use workspaces_common::kube_utils::has_finalizer;
use workspaces_common::Error;

use crate::context::UsageContext;
use crate::kind::ProtectedKind;
use crate::usage::{active_workspaces, converge_finalizer};

/// Converge the finalizer of one protected object.
///
/// `meta` is the object's metadata as seen by the watch; `object_ref`
/// receives the in-use event when deletion is blocked.
pub async fn reconcile_protection(
    kind: ProtectedKind,
    meta: &ObjectMeta,
    object_ref: &ObjectReference,
    ctx: &UsageContext,
) -> Result<Action, Error> {
    let name = meta.name.as_deref().unwrap_or_default();
    let namespace = meta.namespace.as_deref().unwrap_or_default();
    let held = has_finalizer(meta.finalizers.as_deref(), kind.finalizer());

    if meta.deletion_timestamp.is_some() && !held {
        debug!(%kind, name, "no finalizer held, deletion proceeds");
        return Ok(Action::await_change());
    }

    let active = active_workspaces(ctx.kube.as_ref(), kind, name, namespace).await?;

    if meta.deletion_timestamp.is_some() {
        if !active.is_empty() {
            let message = format!("Cannot delete {kind}: in use by {} workspace(s)", active.len());
            info!(%kind, name, workspaces = active.len(), "deletion blocked while in use");
            ctx.events
                .publish(
                    object_ref,
                    EventType::Warning,
                    kind.in_use_reason(),
                    actions::DELETE,
                    Some(message),
                )
                .await;
            return Ok(Action::requeue(ctx.timing.long));
        }
        converge_finalizer(ctx.kube.as_ref(), kind, name, namespace, false).await?;
        info!(%kind, name, "no workspace references left, deletion allowed");
        return Ok(Action::await_change());
    }

    let wanted = !active.is_empty();
    if wanted != held {
        converge_finalizer(ctx.kube.as_ref(), kind, name, namespace, wanted).await?;
    }
    Ok(Action::await_change())
}
