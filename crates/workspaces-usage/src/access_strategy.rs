//! WorkspaceAccessStrategy controller

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{error, instrument};

use workspaces_common::crd::WorkspaceAccessStrategy;
use workspaces_common::Error;

use crate::context::UsageContext;
use crate::kind::ProtectedKind;
use crate::protection::reconcile_protection;

/// Reconcile a WorkspaceAccessStrategy
#[instrument(skip(strategy, ctx), fields(access_strategy = %strategy.name_any()))]
pub async fn reconcile(
    strategy: Arc<WorkspaceAccessStrategy>,
    ctx: Arc<UsageContext>,
) -> Result<Action, Error> {
    reconcile_protection(
        ProtectedKind::AccessStrategy,
        &strategy.metadata,
        &strategy.object_ref(&()),
        &ctx,
    )
    .await
}

/// Error policy for the WorkspaceAccessStrategy controller
pub fn error_policy(
    strategy: Arc<WorkspaceAccessStrategy>,
    error: &Error,
    ctx: Arc<UsageContext>,
) -> Action {
    error!(
        ?error,
        access_strategy = %strategy.name_any(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );
    if error.is_conflict() {
        Action::requeue(ctx.timing.poll)
    } else {
        Action::requeue(ctx.timing.error_backoff)
    }
}
