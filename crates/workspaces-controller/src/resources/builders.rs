//! Deployment, Service and PVC construction
//!
//! Builders are pure: they take the workspace and its resolved configuration
//! and return the object to apply. Every object carries the workspace name
//! label and a controller owner reference back to the Workspace.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, ResourceRequirements, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use workspaces_common::crd::{merge_env, EnvVarSpec, Workspace};
use workspaces_common::labels::{
    deployment_name, pvc_name, service_name, LABEL_WORKSPACE_NAME, WORKSPACE_CONTAINER_NAME,
    WORKSPACE_PORT,
};

use crate::validation::{ResolvedConfig, ResolvedStorage};

const STORAGE_VOLUME_NAME: &str = "workspace-storage";

fn workspace_labels(ws_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "workspaces-controller".to_string(),
    );
    labels.insert(LABEL_WORKSPACE_NAME.to_string(), ws_name.to_string());
    labels
}

fn selector_labels(ws_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_WORKSPACE_NAME.to_string(), ws_name.to_string())])
}

/// Controller owner reference back to the workspace
pub(crate) fn owner_reference(ws: &Workspace) -> OwnerReference {
    OwnerReference {
        api_version: Workspace::api_version(&()).to_string(),
        kind: Workspace::kind(&()).to_string(),
        name: ws.metadata.name.clone().unwrap_or_default(),
        uid: ws.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn object_meta(ws: &Workspace, name: String) -> ObjectMeta {
    let ws_name = ws.metadata.name.as_deref().unwrap_or_default();
    ObjectMeta {
        name: Some(name),
        namespace: ws.metadata.namespace.clone(),
        labels: Some(workspace_labels(ws_name)),
        owner_references: Some(vec![owner_reference(ws)]),
        ..Default::default()
    }
}

fn quantities(map: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
    if map.is_empty() {
        return None;
    }
    Some(
        map.iter()
            .map(|(k, v)| (k.clone(), Quantity(v.clone())))
            .collect(),
    )
}

/// Build the single-replica Deployment running the workspace server.
///
/// `access_env` comes from the access strategy and wins over the resolved
/// environment on name collisions.
pub fn build_deployment(
    ws: &Workspace,
    config: &ResolvedConfig,
    access_env: &[EnvVarSpec],
) -> Deployment {
    let ws_name = ws.metadata.name.as_deref().unwrap_or_default();

    let env: Vec<EnvVar> = merge_env(&config.env, access_env)
        .into_iter()
        .map(|e| EnvVar {
            name: e.name,
            value: Some(e.value),
            ..Default::default()
        })
        .collect();

    let resources = (!config.resources.is_empty()).then(|| ResourceRequirements {
        requests: quantities(&config.resources.requests),
        limits: quantities(&config.resources.limits),
        ..Default::default()
    });

    let (volumes, volume_mounts) = match &config.storage {
        Some(storage) => (
            Some(vec![Volume {
                name: STORAGE_VOLUME_NAME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: pvc_name(ws_name),
                    read_only: Some(false),
                }),
                ..Default::default()
            }]),
            Some(vec![VolumeMount {
                name: STORAGE_VOLUME_NAME.to_string(),
                mount_path: storage.mount_path.clone(),
                ..Default::default()
            }]),
        ),
        None => (None, None),
    };

    let container = Container {
        name: WORKSPACE_CONTAINER_NAME.to_string(),
        image: Some(config.image.clone()),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: WORKSPACE_PORT,
            ..Default::default()
        }]),
        env: (!env.is_empty()).then_some(env),
        resources,
        volume_mounts,
        ..Default::default()
    };

    Deployment {
        metadata: object_meta(ws, deployment_name(ws_name)),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels(ws_name)),
                ..Default::default()
            },
            // A ReadWriteOnce volume cannot be shared by old and new pods
            strategy: config.storage.as_ref().map(|_| DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(workspace_labels(ws_name)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the ClusterIP Service in front of the workspace pod
pub fn build_service(ws: &Workspace) -> Service {
    let ws_name = ws.metadata.name.as_deref().unwrap_or_default();
    Service {
        metadata: object_meta(ws, service_name(ws_name)),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(ws_name)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: WORKSPACE_PORT,
                target_port: Some(IntOrString::Int(WORKSPACE_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the PVC backing the workspace's primary storage
pub fn build_pvc(ws: &Workspace, storage: &ResolvedStorage) -> PersistentVolumeClaim {
    let ws_name = ws.metadata.name.as_deref().unwrap_or_default();
    PersistentVolumeClaim {
        metadata: object_meta(ws, pvc_name(ws_name)),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: storage.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(storage.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// True when the Deployment has a ready replica serving the workspace
pub fn deployment_ready(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .is_some_and(|r| r >= 1)
}

/// True while the Deployment controller has not caught up with a spec change
/// or old pods are still being replaced
pub fn deployment_updating(deployment: &Deployment) -> bool {
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };
    let generation = deployment.metadata.generation.unwrap_or_default();
    if status.observed_generation.unwrap_or_default() < generation {
        return true;
    }
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let updated = status.updated_replicas.unwrap_or_default();
    let total = status.replicas.unwrap_or_default();
    updated < desired || total > updated
}
