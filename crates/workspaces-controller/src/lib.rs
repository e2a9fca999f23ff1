//! Workspace reconciliation for the workspaces operator
//!
//! - **Validation**: resolves a Workspace against its template and reports violations
//! - **Resources**: renders and applies the Deployment, Service, PVC and access objects
//! - **Status**: derives the five conditions from observed sub-resource state
//! - **Idle**: probes the workspace pod and stops idle workspaces
//! - **Controller**: the per-Workspace reconcile loop tying these together

#![deny(missing_docs)]

pub mod compliance;
pub mod conditions;
pub mod context;
pub mod controller;
pub mod idle;
pub mod kube_client;
pub mod resources;
pub mod state_machine;
pub mod status;
pub mod validation;

pub use context::WorkspaceContext;
pub use controller::{error_policy, reconcile, workspaces_for_access_strategy};
