//! Custom Resource Definitions for the workspaces operator

mod access_strategy;
mod template;
mod types;
mod workspace;

pub use access_strategy::{
    AccessEnvTemplate, AccessResourceTemplate, DeploymentModifications, PodModifications,
    PrimaryContainerModifications, WorkspaceAccessStrategy, WorkspaceAccessStrategySpec,
};
pub use template::{
    IdleShutdownOverridePolicy, ResourceBounds, ResourceRange, StorageConfig, WorkspaceTemplate,
    WorkspaceTemplateSpec, WorkspaceTemplateStatus, GPU_RESOURCE,
};
pub use types::{
    merge_env, Condition, ConditionStatus, EnvVarSpec, HttpGetProbe, IdleDetectionSpec,
    IdleShutdownSpec, NamespacedRef, ResourceRequirementsSpec,
};
pub use workspace::{
    AccessResourceStatus, DesiredStatus, StorageSpec, Workspace, WorkspaceSpec, WorkspaceStatus,
};
