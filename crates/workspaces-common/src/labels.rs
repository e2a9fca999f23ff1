//! Well-known labels, annotations, finalizers and sub-resource names

use crate::crd::Workspace;
use kube::ResourceExt;

/// Label carrying the owning workspace name on pods and sub-resources
pub const LABEL_WORKSPACE_NAME: &str = "workspace.jupyter.org/workspace-name";

/// Label linking a workspace to its template (survives spec clearing on deletion)
pub const LABEL_TEMPLATE_NAME: &str = "workspace.jupyter.org/template-name";

/// Label linking a workspace to its template's namespace
pub const LABEL_TEMPLATE_NAMESPACE: &str = "workspace.jupyter.org/template-namespace";

/// Label linking a workspace to its access strategy
pub const LABEL_ACCESS_STRATEGY_NAME: &str = "workspace.jupyter.org/access-strategy-name";

/// Label linking a workspace to its access strategy's namespace
pub const LABEL_ACCESS_STRATEGY_NAMESPACE: &str =
    "workspace.jupyter.org/access-strategy-namespace";

/// Label requesting a compliance check of the workspace against its template
pub const LABEL_COMPLIANCE_CHECK_NEEDED: &str = "workspace.jupyter.org/compliance-check-needed";

/// Only this value of [`LABEL_COMPLIANCE_CHECK_NEEDED`] triggers a check
pub const COMPLIANCE_CHECK_SENTINEL: &str = "true";

/// Annotation set by the pod event handler when a workspace pod was preempted
pub const ANNOTATION_PREEMPTION_REASON: &str = "workspace.jupyter.org/preemption-reason";

/// Message used for the Preempted condition when the annotation is present
pub const PREEMPTED_MESSAGE: &str = "Workspace preempted due to resource contention";

/// Finalizer guarding cleanup of a workspace's sub-resources
pub const WORKSPACE_FINALIZER: &str = "workspace.jupyter.org/cleanup-protection";

/// Finalizer blocking template deletion while workspaces reference it
pub const TEMPLATE_FINALIZER: &str = "workspace.jupyter.org/template-protection";

/// Finalizer blocking access strategy deletion while workspaces reference it
pub const ACCESS_STRATEGY_FINALIZER: &str = "workspace.jupyter.org/accessstrategy-protection";

/// Name of the primary workspace container
pub const WORKSPACE_CONTAINER_NAME: &str = "workspace";

/// Port the workspace server listens on
pub const WORKSPACE_PORT: i32 = 8888;

/// Deployment name for a workspace
pub fn deployment_name(workspace: &str) -> String {
    format!("jupyter-{}", workspace)
}

/// Service name for a workspace
pub fn service_name(workspace: &str) -> String {
    format!("jupyter-{}-service", workspace)
}

/// PersistentVolumeClaim name for a workspace's primary storage
pub fn pvc_name(workspace: &str) -> String {
    format!("jupyter-{}-pvc", workspace)
}

/// Label selector matching the pods of one workspace
pub fn workspace_pod_selector(workspace: &str) -> String {
    format!("{}={}", LABEL_WORKSPACE_NAME, workspace)
}

/// True when the workspace explicitly requests a compliance check.
///
/// Presence of the label alone is not enough; only the sentinel value counts.
pub fn compliance_check_requested(ws: &Workspace) -> bool {
    ws.labels()
        .get(LABEL_COMPLIANCE_CHECK_NEEDED)
        .is_some_and(|v| v == COMPLIANCE_CHECK_SENTINEL)
}

/// Preemption reason recorded on the workspace, if any
pub fn preemption_reason(ws: &Workspace) -> Option<&str> {
    ws.annotations()
        .get(ANNOTATION_PREEMPTION_REASON)
        .map(String::as_str)
        .filter(|r| !r.is_empty())
}
