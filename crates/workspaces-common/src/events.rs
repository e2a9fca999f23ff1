//! Kubernetes Events for workspaces, templates and access strategies
//!
//! Lifecycle transitions (running, stopped, idle shutdown), compliance
//! outcomes and blocked deletions are surfaced as Events on the object
//! involved, so `kubectl describe workspace` shows what the controller did.
//! Each controller reports under its own name from [`reporters`].
//!
//! Publishing never fails the caller. A rejected Event is logged and dropped.

use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Sink for workspace Events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Attach an Event to `resource_ref`.
    ///
    /// `reason` comes from [`reasons`] and `action` from [`actions`].
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by the events.k8s.io API
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Publisher reporting as `reporter`, one of [`reporters`]
    pub fn new(client: Client, reporter: &str) -> Self {
        Self {
            recorder: Recorder::new(client, reporter_for(reporter)),
        }
    }
}

/// Reporter identity shown as the Event's reporting component
pub fn reporter_for(controller: &str) -> Reporter {
    Reporter {
        controller: controller.to_string(),
        instance: std::env::var("POD_NAME").ok(),
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                object = ?resource_ref.name,
                reason,
                action,
                error = %e,
                "dropping workspace event"
            );
        }
    }
}

/// Publisher that discards everything
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// An event captured by [`RecordingEventPublisher`]
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    /// Name of the object the event was attached to
    pub object: Option<String>,
    /// Normal or Warning
    pub type_: EventType,
    /// Reason string
    pub reason: String,
    /// Action string
    pub action: String,
    /// Optional message
    pub note: Option<String>,
}

/// Publisher that keeps every event in memory, for asserting on emitted events
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events in publish order
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Reasons of recorded events in publish order
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                object: resource_ref.name.clone(),
                type_,
                reason: reason.to_string(),
                action: action.to_string(),
                note,
            });
        }
    }
}

/// Reporting component names, one per controller
pub mod reporters {
    /// Workspace controller
    pub const WORKSPACE: &str = "workspace-controller";
    /// WorkspaceTemplate deletion guard
    pub const WORKSPACE_TEMPLATE: &str = "workspacetemplate-controller";
    /// WorkspaceAccessStrategy deletion guard
    pub const WORKSPACE_ACCESS_STRATEGY: &str = "workspaceaccessstrategy-controller";
}

/// Event reasons
pub mod reasons {
    // Workspace lifecycle events
    /// All sub-resources became ready
    pub const WORKSPACE_RUNNING: &str = "WorkspaceRunning";
    /// All sub-resources were torn down
    pub const WORKSPACE_STOPPED: &str = "WorkspaceStopped";
    /// Workspace was idle past its timeout and is being stopped
    pub const IDLE_SHUTDOWN: &str = "IdleShutdown";

    // Compliance events
    /// Workspace satisfies its template
    pub const COMPLIANCE_CHECK_PASSED: &str = "ComplianceCheckPassed";
    /// Workspace breaches its template
    pub const COMPLIANCE_CHECK_FAILED: &str = "ComplianceCheckFailed";

    // Deletion guard events
    /// Template deletion blocked by referencing workspaces
    pub const TEMPLATE_IN_USE: &str = "TemplateInUse";
    /// Access strategy deletion blocked by referencing workspaces
    pub const ACCESS_STRATEGY_IN_USE: &str = "AccessStrategyInUse";
}

/// Event actions
pub mod actions {
    /// Bringing sub-resources to the desired state
    pub const RECONCILE: &str = "Reconcile";
    /// Compliance validation against a template
    pub const VALIDATE: &str = "Validate";
    /// Stopping a workspace
    pub const STOP: &str = "Stop";
    /// Deleting an object
    pub const DELETE: &str = "Delete";
}
