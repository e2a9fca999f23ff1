//! Active-workspace queries and finalizer convergence

use tracing::{debug, info};

use workspaces_common::crd::Workspace;
use workspaces_common::kube_utils::{retry_on_conflict, with_finalizer, without_finalizer, MetadataPatch};
use workspaces_common::Error;

use crate::kind::ProtectedKind;
use crate::kube_client::UsageKubeClient;

/// Page size for Workspace list calls
pub const LIST_PAGE_SIZE: u32 = 100;

/// Non-terminating workspaces whose labels and spec both reference the object
pub async fn active_workspaces(
    kube: &dyn UsageKubeClient,
    kind: ProtectedKind,
    name: &str,
    namespace: &str,
) -> Result<Vec<Workspace>, Error> {
    let selector = kind.label_selector(name, namespace);
    let wanted = (name.to_string(), namespace.to_string());
    let mut active = Vec::new();
    let mut continue_token = None;

    loop {
        let page = kube
            .list_workspaces(&selector, LIST_PAGE_SIZE, continue_token)
            .await?;
        active.extend(
            page.items
                .into_iter()
                .filter(|ws| !ws.is_terminating())
                .filter(|ws| kind.spec_reference(ws).as_ref() == Some(&wanted)),
        );
        match page.continue_token {
            Some(token) => continue_token = Some(token),
            None => break,
        }
    }

    debug!(%kind, name, namespace, count = active.len(), "counted active workspaces");
    Ok(active)
}

/// Add (`wanted`) or remove the kind's finalizer on the object.
///
/// Every attempt re-reads the object and writes only when its finalizers
/// differ, so a retry after a conflict sees the winner's write. An object
/// that is gone counts as converged.
pub async fn converge_finalizer(
    kube: &dyn UsageKubeClient,
    kind: ProtectedKind,
    name: &str,
    namespace: &str,
    wanted: bool,
) -> Result<(), Error> {
    retry_on_conflict("converge finalizer", || async move {
        let Some(meta) = kube.get_metadata(kind, name, namespace).await? else {
            return Ok(());
        };
        let current = meta.finalizers.as_deref();
        let updated = if wanted {
            with_finalizer(current, kind.finalizer())
        } else {
            without_finalizer(current, kind.finalizer())
        };
        let Some(finalizers) = updated else {
            return Ok(());
        };

        let patch = MetadataPatch::new()
            .with_finalizers(finalizers)
            .with_resource_version(meta.resource_version.clone());
        match kube.patch_metadata(kind, name, namespace, &patch).await {
            Ok(()) => {
                info!(%kind, name, namespace, added = wanted, "updated finalizer");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    })
    .await
}
