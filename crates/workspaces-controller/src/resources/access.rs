//! Rendering of access strategy templates
//!
//! Templates are minijinja and see three objects: `workspace` (name,
//! namespace, uid), `service` (name, port) and `access_strategy` (name,
//! namespace).

use minijinja::{context, Environment, Value};
use workspaces_common::crd::{
    AccessResourceStatus, EnvVarSpec, Workspace, WorkspaceAccessStrategy,
};
use workspaces_common::labels::{
    service_name, LABEL_ACCESS_STRATEGY_NAME, LABEL_ACCESS_STRATEGY_NAMESPACE,
    LABEL_WORKSPACE_NAME, WORKSPACE_PORT,
};
use workspaces_common::Error;

use super::builders::owner_reference;

/// An access object ready to be applied
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedAccessResource {
    /// Identity of the object
    pub status: AccessResourceStatus,
    /// Full object manifest
    pub manifest: serde_json::Value,
}

fn template_context(ws: &Workspace, strategy: &WorkspaceAccessStrategy) -> Value {
    let name = ws.metadata.name.clone().unwrap_or_default();
    let namespace = ws.metadata.namespace.clone().unwrap_or_default();
    let strategy_ns = strategy
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| namespace.clone());
    context! {
        workspace => context! {
            name => &name,
            namespace => &namespace,
            uid => ws.metadata.uid.clone().unwrap_or_default(),
        },
        service => context! {
            name => service_name(&name),
            port => WORKSPACE_PORT,
        },
        access_strategy => context! {
            name => strategy.metadata.name.clone().unwrap_or_default(),
            namespace => strategy_ns,
        },
    }
}

fn render(label: &str, source: &str, ctx: &Value) -> Result<String, Error> {
    let env = Environment::new();
    env.render_str(source, ctx)
        .map_err(|e| Error::render(label, e.to_string()))
}

/// Render every access resource template of the strategy for one workspace
pub fn render_access_resources(
    ws: &Workspace,
    strategy: &WorkspaceAccessStrategy,
) -> Result<Vec<RenderedAccessResource>, Error> {
    let ctx = template_context(ws, strategy);
    let owner = serde_json::to_value(owner_reference(ws))
        .map_err(|e| Error::serialization_for_kind("OwnerReference", e.to_string()))?;
    let ws_name = ws.metadata.name.clone().unwrap_or_default();
    let namespace = ws.metadata.namespace.clone().unwrap_or_default();
    let strategy_name = strategy.metadata.name.clone().unwrap_or_default();
    let strategy_ns = strategy
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| namespace.clone());

    strategy
        .spec
        .access_resource_templates
        .iter()
        .map(|tpl| {
            let body = render(&tpl.name_prefix, &tpl.template, &ctx)?;
            let mut manifest: serde_json::Value = if body.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_yaml::from_str(&body).map_err(|e| {
                    Error::render(&tpl.name_prefix, format!("rendered template is not YAML: {}", e))
                })?
            };
            let Some(object) = manifest.as_object_mut() else {
                return Err(Error::render(
                    &tpl.name_prefix,
                    "rendered template is not a mapping",
                ));
            };
            let name = format!("{}-{}", tpl.name_prefix, ws_name);
            object.insert("apiVersion".into(), tpl.api_version.clone().into());
            object.insert("kind".into(), tpl.kind.clone().into());
            let metadata = object
                .entry("metadata")
                .or_insert_with(|| serde_json::json!({}));
            if let Some(metadata) = metadata.as_object_mut() {
                metadata.insert("name".into(), name.clone().into());
                metadata.insert("namespace".into(), namespace.clone().into());
                metadata.insert("ownerReferences".into(), serde_json::json!([owner.clone()]));
                let labels = metadata
                    .entry("labels")
                    .or_insert_with(|| serde_json::json!({}));
                if let Some(labels) = labels.as_object_mut() {
                    labels.insert(LABEL_WORKSPACE_NAME.into(), ws_name.clone().into());
                    labels.insert(LABEL_ACCESS_STRATEGY_NAME.into(), strategy_name.clone().into());
                    labels.insert(
                        LABEL_ACCESS_STRATEGY_NAMESPACE.into(),
                        strategy_ns.clone().into(),
                    );
                }
            }
            Ok(RenderedAccessResource {
                status: AccessResourceStatus {
                    kind: tpl.kind.clone(),
                    api_version: tpl.api_version.clone(),
                    name,
                    namespace: namespace.clone(),
                },
                manifest,
            })
        })
        .collect()
}

/// Render the strategy's access URL, None when it defines no URL template
pub fn render_access_url(
    ws: &Workspace,
    strategy: &WorkspaceAccessStrategy,
) -> Result<Option<String>, Error> {
    let Some(source) = strategy.spec.access_url_template.as_deref() else {
        return Ok(None);
    };
    let url = render("accessURLTemplate", source, &template_context(ws, strategy))?;
    Ok(Some(url.trim().to_string()).filter(|u| !u.is_empty()))
}

/// Render the env entries the strategy merges into the primary container
pub fn render_merge_env(
    ws: &Workspace,
    strategy: &WorkspaceAccessStrategy,
) -> Result<Vec<EnvVarSpec>, Error> {
    let ctx = template_context(ws, strategy);
    strategy
        .spec
        .merge_env()
        .iter()
        .map(|e| {
            Ok(EnvVarSpec {
                name: e.name.clone(),
                value: render(&e.name, &e.value_template, &ctx)?,
            })
        })
        .collect()
}
