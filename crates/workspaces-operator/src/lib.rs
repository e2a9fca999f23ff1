//! Workspaces operator: configuration, CRD installation and controller wiring

#![deny(missing_docs)]

/// Command line and environment configuration
pub mod config;
/// Controller construction
pub mod controller_runner;
/// CRD install and print
pub mod crds;
