//! Kubernetes helpers shared by the workspace controllers
//!
//! Metadata patches for labels and finalizers, conflict-tolerant retries,
//! status patching and dynamic API resources for access objects.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use kube::api::{ApiResource, Patch, PatchParams};
use kube::{Api, Client};
use rand::Rng;
use tracing::debug;

use crate::Error;

/// Base delay between attempts of a conflicting write
pub const CONFLICT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Upper bound of the random jitter added to [`CONFLICT_RETRY_DELAY`]
pub const CONFLICT_RETRY_JITTER_MS: u64 = 50;

/// Attempts made by [`retry_on_conflict`] before giving up
pub const CONFLICT_RETRY_ATTEMPTS: u32 = 3;

/// A merge patch over `metadata.labels` and `metadata.finalizers`.
///
/// Labels mapped to `None` are removed. When `resource_version` is set the
/// write fails with 409 if the object changed since it was read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataPatch {
    /// Labels to set (`Some`) or remove (`None`)
    pub labels: BTreeMap<String, Option<String>>,
    /// Full replacement finalizer list, when finalizers change
    pub finalizers: Option<Vec<String>>,
    /// Optimistic concurrency precondition
    pub resource_version: Option<String>,
}

impl MetadataPatch {
    /// Empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a label
    pub fn set_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), Some(value.into()));
        self
    }

    /// Remove a label
    pub fn remove_label(mut self, key: impl Into<String>) -> Self {
        self.labels.insert(key.into(), None);
        self
    }

    /// Replace the finalizer list
    pub fn with_finalizers(mut self, finalizers: Vec<String>) -> Self {
        self.finalizers = Some(finalizers);
        self
    }

    /// Require the object to still be at this resourceVersion
    pub fn with_resource_version(mut self, resource_version: Option<String>) -> Self {
        self.resource_version = resource_version;
        self
    }

    /// True when the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.finalizers.is_none()
    }

    /// Render as a JSON merge patch body
    pub fn to_json(&self) -> serde_json::Value {
        let mut metadata = serde_json::Map::new();
        if !self.labels.is_empty() {
            let labels: serde_json::Map<String, serde_json::Value> = self
                .labels
                .iter()
                .map(|(k, v)| {
                    let value = v
                        .as_ref()
                        .map_or(serde_json::Value::Null, |v| v.clone().into());
                    (k.clone(), value)
                })
                .collect();
            metadata.insert("labels".to_string(), labels.into());
        }
        if let Some(finalizers) = &self.finalizers {
            metadata.insert("finalizers".to_string(), serde_json::json!(finalizers));
        }
        if let Some(rv) = &self.resource_version {
            metadata.insert("resourceVersion".to_string(), rv.clone().into());
        }
        serde_json::json!({ "metadata": metadata })
    }
}

/// True when `finalizer` is in the object's finalizer list
pub fn has_finalizer(finalizers: Option<&[String]>, finalizer: &str) -> bool {
    finalizers.is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Finalizer list with `finalizer` appended, or None if already present
pub fn with_finalizer(finalizers: Option<&[String]>, finalizer: &str) -> Option<Vec<String>> {
    if has_finalizer(finalizers, finalizer) {
        return None;
    }
    let mut list = finalizers.map(<[String]>::to_vec).unwrap_or_default();
    list.push(finalizer.to_string());
    Some(list)
}

/// Finalizer list with `finalizer` removed, or None if it was absent
pub fn without_finalizer(finalizers: Option<&[String]>, finalizer: &str) -> Option<Vec<String>> {
    if !has_finalizer(finalizers, finalizer) {
        return None;
    }
    Some(
        finalizers
            .unwrap_or_default()
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .cloned()
            .collect(),
    )
}

/// Delay before the next conflict retry: base delay plus random jitter
pub fn conflict_retry_delay() -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=CONFLICT_RETRY_JITTER_MS);
    CONFLICT_RETRY_DELAY + Duration::from_millis(jitter)
}

/// Run `op` again after a short jittered delay while it fails with a write conflict.
///
/// `op` should re-read the object on every attempt so that a retry sees
/// the winner's write and can skip when already converged. Errors other than
/// 409 return immediately; the last conflict is returned after
/// [`CONFLICT_RETRY_ATTEMPTS`] attempts.
pub async fn retry_on_conflict<T, F, Fut>(what: &str, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt < CONFLICT_RETRY_ATTEMPTS => {
                let delay = conflict_retry_delay();
                debug!(what, attempt, ?delay, "write conflict, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Patch the status sub-resource of a namespaced resource with a merge patch.
///
/// Serializes `status` into `{ "status": <status> }`.
pub async fn patch_resource_status<T>(
    client: &Client,
    name: &str,
    namespace: &str,
    status: &impl serde::Serialize,
    field_manager: &str,
) -> std::result::Result<(), kube::Error>
where
    T: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
    <T as kube::Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(field_manager), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Split an apiVersion into (group, version); core resources have an empty group
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind with English rules
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Build an ApiResource from an apiVersion and kind, for access objects
/// whose types are only known at runtime.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::api_error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn metadata_patch_renders_removals_as_null() {
        let patch = MetadataPatch::new()
            .set_label("a", "1")
            .remove_label("b")
            .with_finalizers(vec!["f".to_string()])
            .with_resource_version(Some("42".to_string()));
        let json = patch.to_json();
        assert_eq!(json["metadata"]["labels"]["a"], "1");
        assert!(json["metadata"]["labels"]["b"].is_null());
        assert_eq!(json["metadata"]["finalizers"][0], "f");
        assert_eq!(json["metadata"]["resourceVersion"], "42");
        assert!(!patch.is_empty());
        assert!(MetadataPatch::new().is_empty());
    }

    #[test]
    fn metadata_patch_omits_untouched_sections() {
        let json = MetadataPatch::new().set_label("a", "1").to_json();
        assert!(json["metadata"].get("finalizers").is_none());
        assert!(json["metadata"].get("resourceVersion").is_none());
    }

    #[test]
    fn finalizer_list_helpers() {
        let list = vec!["other".to_string()];
        assert!(!has_finalizer(Some(&list), "mine"));
        assert!(!has_finalizer(None, "mine"));

        let added = with_finalizer(Some(&list), "mine").unwrap();
        assert_eq!(added, vec!["other", "mine"]);
        assert_eq!(with_finalizer(Some(&added), "mine"), None);
        assert_eq!(with_finalizer(None, "mine"), Some(vec!["mine".to_string()]));

        let removed = without_finalizer(Some(&added), "mine").unwrap();
        assert_eq!(removed, vec!["other"]);
        assert_eq!(without_finalizer(Some(&removed), "mine"), None);
    }

    #[test]
    fn conflict_delay_stays_within_jitter() {
        for _ in 0..20 {
            let d = conflict_retry_delay();
            assert!(d >= CONFLICT_RETRY_DELAY);
            assert!(d <= CONFLICT_RETRY_DELAY + Duration::from_millis(CONFLICT_RETRY_JITTER_MS));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retry_on_conflict_retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Error::from(api_error(409, "Conflict")))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_on_conflict_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = retry_on_conflict("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::from(api_error(409, "Conflict"))) }
        })
        .await;
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), CONFLICT_RETRY_ATTEMPTS);
    }

    #[tokio::test]
    async fn retry_on_conflict_returns_other_errors_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = retry_on_conflict("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::from(api_error(500, "InternalError"))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn api_resource_from_api_version() {
        let ar = build_api_resource("gateway.networking.k8s.io/v1", "HTTPRoute");
        assert_eq!(ar.group, "gateway.networking.k8s.io");
        assert_eq!(ar.version, "v1");
        assert_eq!(ar.plural, "httproutes");

        let ar = build_api_resource("v1", "Service");
        assert_eq!(ar.group, "");
        assert_eq!(ar.plural, "services");
        assert_eq!(pluralize_kind("Ingress"), "ingresses");
        assert_eq!(pluralize_kind("NetworkPolicy"), "networkpolicies");
    }
}
