//! Usage tracking for workspace templates and access strategies
//!
//! - **Protection**: holds a finalizer on each object while active workspaces reference it
//! - **Template**: tracks spec generations and flags referencing workspaces for compliance checks
//! - **Mappers**: route Workspace changes to the objects they reference

#![deny(missing_docs)]

pub mod access_strategy;
pub mod context;
pub mod kind;
pub mod kube_client;
pub mod mappers;
pub mod protection;
pub mod template;
pub mod usage;

pub use context::UsageContext;
pub use kind::ProtectedKind;
