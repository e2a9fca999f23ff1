//! Common types for the workspaces operator: CRDs, errors, events and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod labels;
pub mod quantity;
pub mod timing;
pub mod violation;

pub use error::Error;
pub use timing::ReconcileTiming;
pub use violation::{Violation, ViolationType};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group shared by all workspace CRDs
pub const API_GROUP: &str = "workspace.jupyter.org";

/// Field manager used for server-side apply and merge patches
pub const FIELD_MANAGER: &str = "workspaces-controller";
