//! WorkspaceTemplate controller
//!
//! Keeps the template protected while workspaces use it and, when its spec
//! changes, flags every referencing workspace for a compliance check.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use workspaces_common::crd::{Workspace, WorkspaceTemplate, WorkspaceTemplateStatus};
use workspaces_common::kube_utils::MetadataPatch;
use workspaces_common::labels::{
    compliance_check_requested, COMPLIANCE_CHECK_SENTINEL, LABEL_COMPLIANCE_CHECK_NEEDED,
};
use workspaces_common::Error;

use crate::context::UsageContext;
use crate::kind::ProtectedKind;
use crate::protection::reconcile_protection;
use crate::usage::active_workspaces;

/// Workspace label writes per second while flagging for compliance
pub const COMPLIANCE_MARKING_RATE: u32 = 10;

/// Reconcile a WorkspaceTemplate
#[instrument(skip(template, ctx), fields(template = %template.name_any()))]
pub async fn reconcile(
    template: Arc<WorkspaceTemplate>,
    ctx: Arc<UsageContext>,
) -> Result<Action, Error> {
    if template.metadata.deletion_timestamp.is_none() {
        track_generation(&template, &ctx).await?;
    }
    reconcile_protection(
        ProtectedKind::Template,
        &template.metadata,
        &template.object_ref(&()),
        &ctx,
    )
    .await
}

/// Error policy for the WorkspaceTemplate controller
pub fn error_policy(
    template: Arc<WorkspaceTemplate>,
    error: &Error,
    ctx: Arc<UsageContext>,
) -> Action {
    error!(
        ?error,
        template = %template.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );
    if error.is_conflict() {
        Action::requeue(ctx.timing.poll)
    } else {
        Action::requeue(ctx.timing.error_backoff)
    }
}

/// React to a new spec generation.
///
/// The first generation is only recorded. Later ones flag referencing
/// workspaces before being recorded, so a failed pass is retried.
async fn track_generation(template: &WorkspaceTemplate, ctx: &UsageContext) -> Result<(), Error> {
    let generation = template.metadata.generation.unwrap_or_default();
    let observed = template
        .status
        .as_ref()
        .map(|s| s.observed_generation)
        .unwrap_or_default();
    if observed >= generation {
        return Ok(());
    }

    let name = template.name_any();
    let namespace = template.namespace().unwrap_or_default();

    if generation == 1 && observed == 0 {
        debug!("template created, recording generation");
    } else {
        info!(observed, generation, "template spec changed, flagging workspaces for compliance check");
        let workspaces =
            active_workspaces(ctx.kube.as_ref(), ProtectedKind::Template, &name, &namespace)
                .await?;
        mark_for_compliance(&workspaces, ctx).await?;
    }

    ctx.kube
        .patch_template_status(
            &name,
            &namespace,
            &WorkspaceTemplateStatus {
                observed_generation: generation,
            },
        )
        .await
}

/// Label each workspace with the compliance-check sentinel.
///
/// Writes are paced at [`COMPLIANCE_MARKING_RATE`] per second. Individual
/// failures do not stop the pass; they are reported together at the end.
pub async fn mark_for_compliance(workspaces: &[Workspace], ctx: &UsageContext) -> Result<(), Error> {
    let mut pacer = tokio::time::interval(Duration::from_secs(1) / COMPLIANCE_MARKING_RATE);
    pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut marked = 0usize;
    let mut failures = Vec::new();
    for ws in workspaces {
        let name = ws.name_any();
        let namespace = ws.namespace().unwrap_or_default();
        if compliance_check_requested(ws) {
            marked += 1;
            continue;
        }

        pacer.tick().await;
        let patch =
            MetadataPatch::new().set_label(LABEL_COMPLIANCE_CHECK_NEEDED, COMPLIANCE_CHECK_SENTINEL);
        match ctx.kube.patch_workspace_metadata(&name, &namespace, &patch).await {
            Ok(()) => marked += 1,
            Err(e) if e.is_not_found() => debug!(workspace = %name, "workspace gone before marking"),
            Err(e) => {
                warn!(workspace = %name, %namespace, error = %e, "failed to flag workspace for compliance check");
                failures.push(format!("{namespace}/{name}: {e}"));
            }
        }
    }

    info!(marked, failed = failures.len(), "compliance marking finished");
    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::internal_with_context(
            "compliance marking",
            format!(
                "failed to flag {} of {} workspaces: {}",
                failures.len(),
                workspaces.len(),
                failures.join("; ")
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube_client::{MockUsageKubeClient, UsageKubeClient, WorkspacePage};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use workspaces_common::crd::{NamespacedRef, WorkspaceSpec, WorkspaceTemplateSpec};
    use workspaces_common::labels::TEMPLATE_FINALIZER;

    fn template(generation: i64, observed: Option<i64>) -> WorkspaceTemplate {
        WorkspaceTemplate {
            metadata: ObjectMeta {
                name: Some("tpl".into()),
                namespace: Some("team".into()),
                generation: Some(generation),
                finalizers: Some(vec![TEMPLATE_FINALIZER.to_string()]),
                ..Default::default()
            },
            spec: WorkspaceTemplateSpec::default(),
            status: observed.map(|g| WorkspaceTemplateStatus {
                observed_generation: g,
            }),
        }
    }

    fn user(name: &str, flagged: bool) -> Workspace {
        let mut labels = BTreeMap::new();
        if flagged {
            labels.insert(
                LABEL_COMPLIANCE_CHECK_NEEDED.to_string(),
                COMPLIANCE_CHECK_SENTINEL.to_string(),
            );
        }
        Workspace {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("team".into()),
                labels: Some(labels),
                ..Default::default()
            },
            spec: WorkspaceSpec {
                template_ref: Some(NamespacedRef {
                    name: "tpl".into(),
                    namespace: None,
                }),
                ..Default::default()
            },
            status: None,
        }
    }

    fn context(kube: MockUsageKubeClient) -> Arc<UsageContext> {
        let kube: Arc<dyn UsageKubeClient> = Arc::new(kube);
        Arc::new(UsageContext::for_testing(kube))
    }

    fn listing(kube: &mut MockUsageKubeClient, users: Vec<Workspace>) {
        kube.expect_list_workspaces().returning(move |_, _, _| {
            Ok(WorkspacePage {
                items: users.clone(),
                continue_token: None,
            })
        });
    }

    fn server_error() -> Error {
        Error::from(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "unavailable".into(),
            reason: "ServiceUnavailable".into(),
            code: 503,
        }))
    }

    #[tokio::test]
    async fn story_new_template_records_generation_without_marking() {
        let mut kube = MockUsageKubeClient::new();
        listing(&mut kube, vec![user("a", false)]);
        kube.expect_patch_workspace_metadata().never();
        kube.expect_patch_template_status()
            .withf(|name, _, status| name == "tpl" && status.observed_generation == 1)
            .times(1)
            .returning(|_, _, _| Ok(()));

        reconcile(Arc::new(template(1, None)), context(kube))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn story_spec_change_flags_unflagged_workspaces() {
        let flagged = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = flagged.clone();
        let mut kube = MockUsageKubeClient::new();
        listing(&mut kube, vec![user("a", false), user("b", true), user("c", false)]);
        kube.expect_patch_workspace_metadata()
            .withf(|_, _, patch| {
                patch.to_json()["metadata"]["labels"][LABEL_COMPLIANCE_CHECK_NEEDED]
                    == COMPLIANCE_CHECK_SENTINEL
            })
            .returning(move |name, _, _| {
                sink.lock().unwrap().push(name.to_string());
                Ok(())
            });
        kube.expect_patch_template_status()
            .withf(|_, _, status| status.observed_generation == 3)
            .times(1)
            .returning(|_, _, _| Ok(()));

        reconcile(Arc::new(template(3, Some(2))), context(kube))
            .await
            .unwrap();
        assert_eq!(*flagged.lock().unwrap(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn story_observed_generation_skips_marking() {
        let mut kube = MockUsageKubeClient::new();
        listing(&mut kube, vec![user("a", false)]);
        kube.expect_patch_workspace_metadata().never();
        kube.expect_patch_template_status().never();

        reconcile(Arc::new(template(4, Some(4))), context(kube))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn story_marking_continues_past_failures_and_keeps_generation_unrecorded() {
        let attempts = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = attempts.clone();
        let mut kube = MockUsageKubeClient::new();
        listing(&mut kube, vec![user("a", false), user("b", false)]);
        kube.expect_patch_workspace_metadata()
            .returning(move |name, _, _| {
                sink.lock().unwrap().push(name.to_string());
                if name == "a" {
                    Err(server_error())
                } else {
                    Ok(())
                }
            });
        kube.expect_patch_template_status().never();

        let err = reconcile(Arc::new(template(2, Some(1))), context(kube))
            .await
            .unwrap_err();
        assert_eq!(*attempts.lock().unwrap(), vec!["a", "b"]);
        assert!(err.to_string().contains("failed to flag 1 of 2 workspaces"));
    }

    #[tokio::test(start_paused = true)]
    async fn marking_is_paced() {
        let mut kube = MockUsageKubeClient::new();
        kube.expect_patch_workspace_metadata()
            .returning(|_, _, _| Ok(()));
        let ctx = context(kube);
        let users: Vec<_> = (0..21).map(|i| user(&format!("ws-{i}"), false)).collect();

        let start = tokio::time::Instant::now();
        mark_for_compliance(&users, &ctx).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn conflict_requeues_quickly() {
        let ctx = context(MockUsageKubeClient::new());
        let conflict = Error::from(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "conflict".into(),
            reason: "Conflict".into(),
            code: 409,
        }));
        assert_eq!(
            error_policy(Arc::new(template(1, None)), &conflict, ctx.clone()),
            Action::requeue(ctx.timing.poll)
        );
    }
}
