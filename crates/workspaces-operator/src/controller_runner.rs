//! Wiring of the workspace, template and access strategy controllers
//!
//! The `build_*` functions only assemble futures; `main` decides how to
//! drive them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use workspaces_common::crd::{Workspace, WorkspaceAccessStrategy, WorkspaceTemplate};
use workspaces_common::events::reporters;
use workspaces_common::ReconcileTiming;
use workspaces_controller::{error_policy, reconcile, workspaces_for_access_strategy, WorkspaceContext};
use workspaces_usage::mappers::{access_strategy_for_workspace, template_for_workspace};
use workspaces_usage::{access_strategy, template, UsageContext};

/// Server-side watch timeout in seconds.
///
/// Kept under the client's 30s read timeout so quiet watches are recycled
/// by the API server instead of failing on the client.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A controller future ready to be awaited
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Build the Workspace controller
///
/// Owned Deployments, Services and PVCs trigger their workspace; access
/// strategy changes trigger every workspace linked to them.
pub fn build_workspace_controllers(
    client: Client,
    timing: ReconcileTiming,
    compliance_enabled: bool,
) -> Vec<ControllerFuture> {
    let ctx = Arc::new(WorkspaceContext::from_client(
        client.clone(),
        timing,
        compliance_enabled,
    ));
    if !compliance_enabled {
        tracing::warn!("compliance validator disabled, requested checks are cleared unchecked");
    }

    let workspaces: Api<Workspace> = Api::all(client.clone());
    let controller = Controller::new(workspaces, watcher_config());
    let store = controller.store();

    tracing::info!("- Workspace controller");

    let workspace_ctrl = controller
        .owns(Api::<Deployment>::all(client.clone()), watcher_config())
        .owns(Api::<Service>::all(client.clone()), watcher_config())
        .owns(
            Api::<PersistentVolumeClaim>::all(client.clone()),
            watcher_config(),
        )
        .watches(
            Api::<WorkspaceAccessStrategy>::all(client),
            watcher_config(),
            move |strategy| workspaces_for_access_strategy(&strategy, &store.state()),
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("Workspace"));

    vec![Box::pin(workspace_ctrl)]
}

/// Build the WorkspaceTemplate and WorkspaceAccessStrategy controllers
///
/// Both watch Workspaces so that a reference appearing or disappearing
/// re-evaluates the referenced object's finalizer.
pub fn build_usage_controllers(client: Client, timing: ReconcileTiming) -> Vec<ControllerFuture> {
    let template_ctx = Arc::new(UsageContext::from_client(
        client.clone(),
        timing,
        reporters::WORKSPACE_TEMPLATE,
    ));
    let strategy_ctx = Arc::new(UsageContext::from_client(
        client.clone(),
        timing,
        reporters::WORKSPACE_ACCESS_STRATEGY,
    ));
    let workspaces: Api<Workspace> = Api::all(client.clone());

    tracing::info!("- WorkspaceTemplate controller");
    let template_ctrl = Controller::new(
        Api::<WorkspaceTemplate>::all(client.clone()),
        watcher_config(),
    )
    .watches(workspaces.clone(), watcher_config(), |ws| {
        template_for_workspace(&ws)
    })
    .shutdown_on_signal()
    .run(template::reconcile, template::error_policy, template_ctx)
    .for_each(log_reconcile_result("WorkspaceTemplate"));

    tracing::info!("- WorkspaceAccessStrategy controller");
    let strategy_ctrl = Controller::new(
        Api::<WorkspaceAccessStrategy>::all(client),
        watcher_config(),
    )
    .watches(workspaces, watcher_config(), |ws| {
        access_strategy_for_workspace(&ws)
    })
    .shutdown_on_signal()
    .run(
        access_strategy::reconcile,
        access_strategy::error_policy,
        strategy_ctx,
    )
    .for_each(log_reconcile_result("WorkspaceAccessStrategy"));

    vec![Box::pin(template_ctrl), Box::pin(strategy_ctrl)]
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
