//! Workspace change → protected object watch mappers
//!
//! Mapping reads the link labels rather than the spec: labels survive while
//! a workspace is terminating, so its removal still triggers the referenced
//! object's reconcile.

use kube::runtime::reflector::ObjectRef;

use workspaces_common::crd::{Workspace, WorkspaceAccessStrategy, WorkspaceTemplate};

use crate::kind::ProtectedKind;

/// Template referenced by the workspace's link labels
pub fn template_for_workspace(ws: &Workspace) -> Option<ObjectRef<WorkspaceTemplate>> {
    ProtectedKind::Template
        .label_reference(ws)
        .map(|(name, namespace)| ObjectRef::new(&name).within(&namespace))
}

/// Access strategy referenced by the workspace's link labels
pub fn access_strategy_for_workspace(ws: &Workspace) -> Option<ObjectRef<WorkspaceAccessStrategy>> {
    ProtectedKind::AccessStrategy
        .label_reference(ws)
        .map(|(name, namespace)| ObjectRef::new(&name).within(&namespace))
}
