//! Desired-state handling for a Workspace
//!
//! Logical phases (Starting, Running, Updating, Stopping, Stopped) are never
//! stored; each pass derives them from `spec.desiredStatus` and what the
//! resource manager reports, then records the matching conditions.

use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::Resource;
use tracing::{debug, info, warn};

use workspaces_common::crd::{DesiredStatus, IdleShutdownSpec, Workspace};
use workspaces_common::events::{actions, reasons as event_reasons};
use workspaces_common::labels::preemption_reason;
use workspaces_common::Error;

use crate::conditions::{reasons, CONDITION_AVAILABLE, CONDITION_STOPPED};
use crate::context::WorkspaceContext;
use crate::resources::{ResourceReadiness, RunningPlan, StopProgress};
use crate::validation::resolve_workspace;

/// Drive the workspace toward its desired status
pub async fn reconcile_desired_state(
    ws: &Workspace,
    ctx: &WorkspaceContext,
) -> Result<Action, Error> {
    match ws.spec.desired_status() {
        DesiredStatus::Running => handle_running(ws, ctx).await,
        DesiredStatus::Stopped => handle_stopped(ws, ctx).await,
    }
}

/// First unready sub-resource, compute before service before access
fn starting_reason(readiness: &ResourceReadiness) -> (&'static str, &'static str) {
    if !readiness.compute_ready {
        (
            reasons::COMPUTE_NOT_READY,
            "Waiting for the workspace Deployment to become ready",
        )
    } else if !readiness.service_ready {
        (
            reasons::SERVICE_NOT_READY,
            "Waiting for the workspace Service to become ready",
        )
    } else {
        (
            reasons::ACCESS_NOT_READY,
            "Waiting for the workspace access resources to become ready",
        )
    }
}

/// First sub-resource still present, compute before service before access
fn stopping_reason(progress: &StopProgress) -> (&'static str, &'static str) {
    if !progress.compute_stopped {
        (reasons::COMPUTE_NOT_STOPPED, "Workspace Deployment is still running")
    } else if !progress.service_stopped {
        (reasons::SERVICE_NOT_STOPPED, "Workspace Service is still present")
    } else {
        (
            reasons::ACCESS_NOT_STOPPED,
            "Workspace access resources are still present",
        )
    }
}

async fn handle_running(ws: &Workspace, ctx: &WorkspaceContext) -> Result<Action, Error> {
    let name = ws.metadata.name.as_deref().unwrap_or_default();

    let outcome = resolve_workspace(ws, ctx.kube.as_ref()).await?;
    if !outcome.is_valid() {
        debug!(
            workspace = %name,
            violations = outcome.violations.len(),
            "workspace has template violations; compliance is enforced on request only"
        );
    }
    let config = outcome.config;

    let access_strategy = match &config.access_strategy {
        Some((as_name, as_namespace)) => Some(
            ctx.kube
                .get_access_strategy(as_name, as_namespace)
                .await?
                .ok_or_else(|| Error::access_strategy_not_found(as_name, as_namespace))?,
        ),
        None => None,
    };
    let idle = config.idle_shutdown.clone();
    let plan = RunningPlan {
        config,
        access_strategy,
    };

    let readiness = ctx.resources.ensure_running(ws, &plan).await?;
    if !readiness.all_ready() {
        let (reason, message) = starting_reason(&readiness);
        debug!(workspace = %name, reason, "workspace starting");
        ctx.status
            .update_starting(ws, &readiness, reason, message)
            .await?;
        return Ok(Action::requeue(ctx.timing.poll));
    }

    if readiness.compute_updating {
        debug!(workspace = %name, "workspace rolling out an update");
        ctx.status.update_updating(ws, &readiness).await?;
        return Ok(Action::requeue(ctx.timing.poll));
    }

    ctx.status.update_running(ws, &readiness).await?;
    if !ws.condition_is_true(CONDITION_AVAILABLE) {
        info!(workspace = %name, "workspace is running");
        ctx.events
            .publish(
                &ws.object_ref(&()),
                EventType::Normal,
                event_reasons::WORKSPACE_RUNNING,
                actions::RECONCILE,
                Some("Workspace is running".to_string()),
            )
            .await;
    }

    idle_step(ws, ctx, idle.as_ref()).await
}

async fn idle_step(
    ws: &Workspace,
    ctx: &WorkspaceContext,
    idle: Option<&IdleShutdownSpec>,
) -> Result<Action, Error> {
    let Some(idle) = idle.filter(|i| i.enabled) else {
        return Ok(Action::await_change());
    };
    let name = ws.metadata.name.as_deref().unwrap_or_default();
    let namespace = ws.metadata.namespace.as_deref().unwrap_or_default();

    let result = ctx.idle.check(ws, idle).await;
    if result.is_idle {
        info!(
            workspace = %name,
            timeout_minutes = idle.idle_timeout_in_minutes,
            "stopping idle workspace"
        );
        ctx.events
            .publish(
                &ws.object_ref(&()),
                EventType::Normal,
                event_reasons::IDLE_SHUTDOWN,
                actions::STOP,
                Some(format!(
                    "Workspace idle for more than {} minutes",
                    idle.idle_timeout_in_minutes
                )),
            )
            .await;
        ctx.kube
            .set_desired_status(name, namespace, DesiredStatus::Stopped)
            .await?;
        return Ok(Action::requeue(ctx.timing.poll));
    }

    if result.should_retry {
        Ok(Action::requeue(ctx.timing.idle_check_interval))
    } else {
        warn!(workspace = %name, "idle detection cannot succeed, not rechecking");
        Ok(Action::await_change())
    }
}

async fn handle_stopped(ws: &Workspace, ctx: &WorkspaceContext) -> Result<Action, Error> {
    let name = ws.metadata.name.as_deref().unwrap_or_default();

    let progress = ctx.resources.ensure_stopped(ws).await?;
    if !progress.all_stopped() {
        let (reason, message) = stopping_reason(&progress);
        debug!(workspace = %name, reason, "workspace stopping");
        ctx.status.update_stopping(ws, reason, message).await?;
        return Ok(Action::requeue(ctx.timing.poll));
    }

    let preempted = preemption_reason(ws).is_some();
    ctx.status.update_stopped(ws, preempted).await?;
    if !ws.condition_is_true(CONDITION_STOPPED) {
        info!(workspace = %name, preempted, "workspace is stopped");
        ctx.events
            .publish(
                &ws.object_ref(&()),
                EventType::Normal,
                event_reasons::WORKSPACE_STOPPED,
                actions::STOP,
                Some("Workspace is stopped".to_string()),
            )
            .await;
    }
    Ok(Action::await_change())
}
