//! Template resolution and compliance checking
//!
//! Resolving a workspace merges its spec over its template's defaults into
//! the configuration the resource manager builds from. The same pass runs
//! every policy check and collects all violations; violations never stop the
//! configuration from being produced.

mod checks;

pub use checks::resource_field;

use workspaces_common::crd::{
    merge_env, EnvVarSpec, IdleShutdownSpec, ResourceRequirementsSpec, Workspace,
    WorkspaceTemplate,
};
use workspaces_common::{Error, Violation};

use crate::kube_client::WorkspaceKubeClient;

/// Storage size used when neither the workspace nor the template names one
pub const DEFAULT_STORAGE_SIZE: &str = "10Gi";

/// Mount path used when neither the workspace nor the template names one
pub const DEFAULT_MOUNT_PATH: &str = "/home/jovyan";

/// Primary storage after defaults are applied
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedStorage {
    /// Volume size
    pub size: String,
    /// Storage class, cluster default when None
    pub storage_class_name: Option<String>,
    /// Mount path in the workspace container
    pub mount_path: String,
}

/// Effective workspace configuration
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConfig {
    /// Container image
    pub image: String,
    /// Requests and limits, workspace values over template defaults
    pub resources: ResourceRequirementsSpec,
    /// Environment, workspace values over template defaults
    pub env: Vec<EnvVarSpec>,
    /// Primary storage, None when no storage is requested
    pub storage: Option<ResolvedStorage>,
    /// Whether secondary storage may be mounted
    pub allow_secondary_storages: bool,
    /// Idle shutdown, workspace override else template default
    pub idle_shutdown: Option<IdleShutdownSpec>,
    /// Access strategy (name, namespace), workspace's else template default
    pub access_strategy: Option<(String, String)>,
}

/// Resolved configuration plus every detected violation
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationOutcome {
    /// Effective configuration, produced even when violations exist
    pub config: ResolvedConfig,
    /// Policy violations
    pub violations: Vec<Violation>,
}

impl ValidationOutcome {
    /// True when no violation was found
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Fetch the workspace's template (if any) and resolve against it.
///
/// A templateRef pointing at a missing template is an error.
pub async fn resolve_workspace(
    ws: &Workspace,
    kube: &dyn WorkspaceKubeClient,
) -> Result<ValidationOutcome, Error> {
    let template = match ws.template_key() {
        Some((name, namespace)) => Some(
            kube.get_template(&name, &namespace)
                .await?
                .ok_or_else(|| Error::template_not_found(&name, &namespace))?,
        ),
        None => None,
    };
    resolve(ws, template.as_ref())
}

/// Resolve the effective configuration and run every policy check.
///
/// `template` must be the object the workspace's templateRef points at.
pub fn resolve(ws: &Workspace, template: Option<&WorkspaceTemplate>) -> Result<ValidationOutcome, Error> {
    let name = ws.metadata.name.as_deref().unwrap_or_default();
    let namespace = ws.metadata.namespace.as_deref().unwrap_or_default();
    let spec = &ws.spec;
    let own_image = spec.image.as_deref().filter(|i| !i.is_empty());

    let template = match (ws.template_key(), template) {
        (None, _) => {
            let Some(image) = own_image else {
                return Err(Error::validation_for_field(
                    name,
                    "spec.image",
                    "workspace must set spec.templateRef or spec.image",
                ));
            };
            return Ok(ValidationOutcome {
                config: ResolvedConfig {
                    image: image.to_string(),
                    resources: spec.resources.clone().unwrap_or_default(),
                    env: spec.env.clone(),
                    storage: spec.storage.as_ref().map(|s| ResolvedStorage {
                        size: s.size.clone().unwrap_or_else(|| DEFAULT_STORAGE_SIZE.to_string()),
                        storage_class_name: s.storage_class_name.clone(),
                        mount_path: s
                            .mount_path
                            .clone()
                            .unwrap_or_else(|| DEFAULT_MOUNT_PATH.to_string()),
                    }),
                    allow_secondary_storages: true,
                    idle_shutdown: spec.idle_shutdown.clone(),
                    access_strategy: ws.access_strategy_key(),
                },
                violations: Vec::new(),
            });
        }
        (Some((t_name, t_namespace)), None) => {
            return Err(Error::template_not_found(t_name, t_namespace))
        }
        (Some(_), Some(template)) => template,
    };
    let tspec = &template.spec;

    let image = match own_image {
        Some(image) => image.to_string(),
        None if !tspec.default_image.is_empty() => tspec.default_image.clone(),
        None => {
            return Err(Error::validation_for_field(
                name,
                "spec.image",
                "template defines no default image and the workspace sets none",
            ))
        }
    };

    let resources = tspec
        .default_resources
        .clone()
        .unwrap_or_default()
        .overlay(&spec.resources.clone().unwrap_or_default());

    let storage = match (&spec.storage, &tspec.primary_storage) {
        (None, None) => None,
        (own, defaults) => {
            let own = own.clone().unwrap_or_default();
            let defaults = defaults.clone().unwrap_or_default();
            Some(ResolvedStorage {
                size: own
                    .size
                    .or(defaults.default_size)
                    .unwrap_or_else(|| DEFAULT_STORAGE_SIZE.to_string()),
                storage_class_name: own
                    .storage_class_name
                    .or(defaults.default_storage_class_name),
                mount_path: own
                    .mount_path
                    .or(defaults.default_mount_path)
                    .unwrap_or_else(|| DEFAULT_MOUNT_PATH.to_string()),
            })
        }
    };

    let template_ns = template.metadata.namespace.as_deref().unwrap_or(namespace);
    let access_strategy = ws.access_strategy_key().or_else(|| {
        tspec
            .default_access_strategy
            .as_ref()
            .filter(|r| !r.name.is_empty())
            .map(|r| (r.name.clone(), r.namespace_or(template_ns).to_string()))
    });

    let mut violations = Vec::new();
    violations.extend(checks::check_image(&image, tspec));
    if let Some(bounds) = &tspec.resource_bounds {
        violations.extend(checks::check_resource_bounds(&resources, bounds));
    }
    violations.extend(checks::check_limits_cover_requests(&resources));
    if let (Some(size), Some(bounds)) = (
        spec.storage.as_ref().and_then(|s| s.size.as_deref()),
        &tspec.primary_storage,
    ) {
        violations.extend(checks::check_storage(size, bounds));
    }
    if let (Some(idle), Some(policy)) = (&spec.idle_shutdown, &tspec.idle_shutdown_overrides) {
        violations.extend(checks::check_idle_override(idle, policy));
    }

    Ok(ValidationOutcome {
        config: ResolvedConfig {
            image,
            resources,
            env: merge_env(&tspec.default_env, &spec.env),
            storage,
            allow_secondary_storages: tspec.allow_secondary_storages.unwrap_or(true),
            idle_shutdown: spec
                .idle_shutdown
                .clone()
                .or_else(|| tspec.default_idle_shutdown.clone()),
            access_strategy,
        },
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube_client::MockWorkspaceKubeClient;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use workspaces_common::crd::{
        NamespacedRef, ResourceBounds, ResourceRange, StorageConfig, StorageSpec,
        WorkspaceSpec, WorkspaceTemplateSpec,
    };
    use workspaces_common::ViolationType;

    fn workspace(spec: WorkspaceSpec) -> Workspace {
        Workspace {
            metadata: ObjectMeta {
                name: Some("nb".to_string()),
                namespace: Some("team".to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    fn template(spec: WorkspaceTemplateSpec) -> WorkspaceTemplate {
        WorkspaceTemplate {
            metadata: ObjectMeta {
                name: Some("t".to_string()),
                namespace: Some("team".to_string()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    fn templated(spec: WorkspaceSpec) -> Workspace {
        workspace(WorkspaceSpec {
            template_ref: Some(NamespacedRef {
                name: "t".into(),
                namespace: None,
            }),
            ..spec
        })
    }

    fn policy_template() -> WorkspaceTemplate {
        template(WorkspaceTemplateSpec {
            default_image: "a".into(),
            allowed_images: vec!["a".into(), "b".into()],
            resource_bounds: Some(ResourceBounds {
                cpu: Some(ResourceRange {
                    min: Some("1".into()),
                    max: Some("2".into()),
                }),
                ..Default::default()
            }),
            primary_storage: Some(StorageConfig {
                default_size: Some("5Gi".into()),
                max_size: Some("50Gi".into()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// Story: a workspace with neither image nor template is malformed
    #[test]
    fn story_no_template_no_image_is_hard_error() {
        let err = resolve(&workspace(WorkspaceSpec::default()), None).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn missing_template_is_hard_error() {
        let err = resolve(&templated(WorkspaceSpec::default()), None).unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound { .. }));
    }

    #[test]
    fn untemplated_workspace_uses_its_own_spec() {
        let ws = workspace(WorkspaceSpec {
            image: Some("custom".into()),
            storage: Some(StorageSpec::default()),
            ..Default::default()
        });
        let outcome = resolve(&ws, None).unwrap();
        assert!(outcome.is_valid());
        assert_eq!(outcome.config.image, "custom");
        let storage = outcome.config.storage.unwrap();
        assert_eq!(storage.size, DEFAULT_STORAGE_SIZE);
        assert_eq!(storage.mount_path, DEFAULT_MOUNT_PATH);
    }

    /// Story: the template fills in whatever the workspace leaves out
    #[test]
    fn story_template_defaults_fill_gaps() {
        let tpl = template(WorkspaceTemplateSpec {
            default_image: "base:1".into(),
            default_resources: Some(ResourceRequirementsSpec {
                requests: BTreeMap::from([("memory".to_string(), "2Gi".to_string())]),
                limits: BTreeMap::new(),
            }),
            default_env: vec![EnvVarSpec {
                name: "MODE".into(),
                value: "lab".into(),
            }],
            allow_secondary_storages: Some(false),
            default_idle_shutdown: Some(IdleShutdownSpec {
                enabled: true,
                idle_timeout_in_minutes: 30,
                ..Default::default()
            }),
            default_access_strategy: Some(NamespacedRef {
                name: "web".into(),
                namespace: Some("shared".into()),
            }),
            ..Default::default()
        });
        let outcome = resolve(&templated(WorkspaceSpec::default()), Some(&tpl)).unwrap();
        let config = outcome.config;
        assert_eq!(config.image, "base:1");
        assert_eq!(config.resources.requests["memory"], "2Gi");
        assert_eq!(config.env[0].name, "MODE");
        assert!(!config.allow_secondary_storages);
        assert_eq!(config.idle_shutdown.unwrap().idle_timeout_in_minutes, 30);
        assert_eq!(config.access_strategy, Some(("web".into(), "shared".into())));
        assert!(config.storage.is_none());
    }

    /// Story: every breach is reported, not just the first
    #[test]
    fn story_all_violations_are_collected() {
        let ws = templated(WorkspaceSpec {
            image: Some("c".into()),
            resources: Some(ResourceRequirementsSpec {
                requests: BTreeMap::from([("cpu".to_string(), "3".to_string())]),
                limits: BTreeMap::new(),
            }),
            storage: Some(StorageSpec {
                size: Some("100Gi".into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let outcome = resolve(&ws, Some(&policy_template())).unwrap();
        let types: Vec<ViolationType> = outcome.violations.iter().map(|v| v.type_).collect();
        assert_eq!(
            types,
            vec![
                ViolationType::ImageNotAllowed,
                ViolationType::ResourceExceeded,
                ViolationType::StorageExceeded
            ]
        );
        assert!(!outcome.is_valid());
        // Config is still produced
        assert_eq!(outcome.config.image, "c");
        assert_eq!(outcome.config.storage.unwrap().size, "100Gi");
    }

    #[test]
    fn compliant_workspace_is_valid() {
        let ws = templated(WorkspaceSpec {
            image: Some("b".into()),
            resources: Some(ResourceRequirementsSpec {
                requests: BTreeMap::from([("cpu".to_string(), "1500m".to_string())]),
                limits: BTreeMap::new(),
            }),
            ..Default::default()
        });
        let outcome = resolve(&ws, Some(&policy_template())).unwrap();
        assert!(outcome.is_valid(), "{:?}", outcome.violations);
        assert_eq!(outcome.config.storage.unwrap().size, "5Gi");
    }

    /// Story: lowering the template's CPU ceiling turns a compliant request into a violation
    #[test]
    fn story_tightened_cpu_bound_flags_existing_request() {
        let ws = templated(WorkspaceSpec {
            image: Some("b".into()),
            resources: Some(ResourceRequirementsSpec {
                requests: BTreeMap::from([("cpu".to_string(), "1500m".to_string())]),
                limits: BTreeMap::new(),
            }),
            ..Default::default()
        });
        assert!(resolve(&ws, Some(&policy_template())).unwrap().is_valid());

        let mut tightened = policy_template();
        tightened.spec.resource_bounds = Some(ResourceBounds {
            cpu: Some(ResourceRange {
                min: None,
                max: Some("1".into()),
            }),
            ..Default::default()
        });
        let outcome = resolve(&ws, Some(&tightened)).unwrap();
        assert!(!outcome.is_valid());
        assert_eq!(outcome.violations.len(), 1);
        assert_eq!(outcome.violations[0].type_, ViolationType::ResourceExceeded);
        assert_eq!(outcome.violations[0].field, "spec.resources.requests.cpu");
    }

    #[tokio::test]
    async fn resolve_workspace_fetches_template_in_workspace_namespace() {
        let mut kube = MockWorkspaceKubeClient::new();
        kube.expect_get_template()
            .withf(|name, ns| name == "t" && ns == "team")
            .returning(|_, _| Ok(Some(policy_template())));
        let ws = templated(WorkspaceSpec::default());
        let outcome = resolve_workspace(&ws, &kube).await.unwrap();
        assert_eq!(outcome.config.image, "a");
    }

    #[tokio::test]
    async fn resolve_workspace_reports_missing_template() {
        let mut kube = MockWorkspaceKubeClient::new();
        kube.expect_get_template().returning(|_, _| Ok(None));
        let err = resolve_workspace(&templated(WorkspaceSpec::default()), &kube)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound { .. }));
    }
}
