//! Individual template policy checks
//!
//! Each check looks at one aspect of the workspace and returns the
//! violations it found. Checks never short-circuit each other.

use std::cmp::Ordering;

use tracing::warn;
use workspaces_common::crd::{
    IdleShutdownOverridePolicy, IdleShutdownSpec, ResourceBounds, ResourceRange,
    ResourceRequirementsSpec, StorageConfig, WorkspaceTemplateSpec,
};
use workspaces_common::quantity::{parse_quantity, Quantity};
use workspaces_common::{Violation, ViolationType};

/// Field path of a resource entry; names with `.` or `/` use bracket form
pub fn resource_field(section: &str, resource: &str) -> String {
    if resource.contains('.') || resource.contains('/') {
        format!("spec.resources.{}['{}']", section, resource)
    } else {
        format!("spec.resources.{}.{}", section, resource)
    }
}

/// Image must be allowed unless the template allows custom images
pub fn check_image(image: &str, template: &WorkspaceTemplateSpec) -> Option<Violation> {
    if template.allowed_images.is_empty()
        || template.allow_custom_images == Some(true)
        || template.allowed_images.iter().any(|i| i == image)
    {
        return None;
    }
    Some(
        Violation::new(
            ViolationType::ImageNotAllowed,
            "spec.image",
            format!("image {} is not in the template's allowed list", image),
        )
        .with_values(template.allowed_images.join(", "), image),
    )
}

fn parse_bound(resource: &str, which: &str, bound: Option<&String>) -> Option<Quantity> {
    let raw = bound?;
    match parse_quantity(raw) {
        Ok(q) => Some(q),
        Err(e) => {
            warn!(resource, which, error = %e, "ignoring unparsable template bound");
            None
        }
    }
}

fn describe_range(range: &ResourceRange) -> String {
    format!(
        "[{}, {}]",
        range.min.as_deref().unwrap_or("-"),
        range.max.as_deref().unwrap_or("-")
    )
}

/// Every bounded request must parse and fall inside its range
pub fn check_resource_bounds(
    resources: &ResourceRequirementsSpec,
    bounds: &ResourceBounds,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (name, range) in bounds.ranges() {
        let Some(raw) = resources.requests.get(&name) else {
            continue;
        };
        let field = resource_field("requests", &name);
        let value = match parse_quantity(raw) {
            Ok(v) => v,
            Err(e) => {
                violations.push(
                    Violation::new(ViolationType::ResourceExceeded, field, e.to_string())
                        .with_values(describe_range(range), raw.as_str()),
                );
                continue;
            }
        };
        let min = parse_bound(&name, "min", range.min.as_ref());
        let max = parse_bound(&name, "max", range.max.as_ref());
        if !value.within(min.as_ref(), max.as_ref()) {
            violations.push(
                Violation::new(
                    ViolationType::ResourceExceeded,
                    field,
                    format!("{} request {} is outside the allowed range", name, raw),
                )
                .with_values(describe_range(range), raw.as_str()),
            );
        }
    }
    violations
}

/// A limit may not be lower than its request
pub fn check_limits_cover_requests(resources: &ResourceRequirementsSpec) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (name, limit) in &resources.limits {
        let Some(request) = resources.requests.get(name) else {
            continue;
        };
        let (Ok(limit_q), Ok(request_q)) = (parse_quantity(limit), parse_quantity(request)) else {
            // Unparsable requests are reported by the bounds check
            continue;
        };
        if limit_q.cmp(&request_q) == Ordering::Less {
            violations.push(
                Violation::new(
                    ViolationType::ResourceExceeded,
                    resource_field("limits", name),
                    format!("{} limit must be greater than or equal to its request", name),
                )
                .with_values(format!("limit >= {}", request), limit.as_str()),
            );
        }
    }
    violations
}

/// Storage size must parse and fall inside the template's size bounds
pub fn check_storage(size: &str, storage: &StorageConfig) -> Option<Violation> {
    let field = "spec.storage.size";
    let allowed = format!(
        "[{}, {}]",
        storage.min_size.as_deref().unwrap_or("-"),
        storage.max_size.as_deref().unwrap_or("-")
    );
    let value = match parse_quantity(size) {
        Ok(v) => v,
        Err(e) => {
            return Some(
                Violation::new(ViolationType::StorageExceeded, field, e.to_string())
                    .with_values(allowed, size),
            )
        }
    };
    let min = parse_bound("storage", "min", storage.min_size.as_ref());
    let max = parse_bound("storage", "max", storage.max_size.as_ref());
    if value.within(min.as_ref(), max.as_ref()) {
        return None;
    }
    Some(
        Violation::new(
            ViolationType::StorageExceeded,
            field,
            format!("storage size {} is outside the allowed range", size),
        )
        .with_values(allowed, size),
    )
}

/// A workspace idle shutdown override must respect the template's policy
pub fn check_idle_override(
    idle: &IdleShutdownSpec,
    policy: &IdleShutdownOverridePolicy,
) -> Vec<Violation> {
    if policy.allow == Some(false) {
        return vec![Violation::new(
            ViolationType::IdleShutdownOverrideNotAllowed,
            "spec.idleShutdown",
            "template does not allow overriding idle shutdown",
        )];
    }
    if !idle.enabled {
        return Vec::new();
    }
    let timeout = idle.idle_timeout_in_minutes;
    let below = policy
        .min_idle_timeout_in_minutes
        .is_some_and(|min| timeout < min);
    let above = policy
        .max_idle_timeout_in_minutes
        .is_some_and(|max| timeout > max);
    if !below && !above {
        return Vec::new();
    }
    let bound = |b: Option<u32>| b.map_or_else(|| "-".to_string(), |v| v.to_string());
    vec![Violation::new(
        ViolationType::IdleShutdownTimeoutOutOfBounds,
        "spec.idleShutdown.idleTimeoutInMinutes",
        format!("idle timeout of {} minutes is outside the allowed range", timeout),
    )
    .with_values(
        format!(
            "[{}, {}]",
            bound(policy.min_idle_timeout_in_minutes),
            bound(policy.max_idle_timeout_in_minutes)
        ),
        timeout.to_string(),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use workspaces_common::crd::GPU_RESOURCE;

    fn range(min: Option<&str>, max: Option<&str>) -> ResourceRange {
        ResourceRange {
            min: min.map(String::from),
            max: max.map(String::from),
        }
    }

    fn requests(pairs: &[(&str, &str)]) -> ResourceRequirementsSpec {
        ResourceRequirementsSpec {
            requests: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            limits: BTreeMap::new(),
        }
    }

    #[test]
    fn field_paths_bracket_dotted_names() {
        assert_eq!(resource_field("requests", "cpu"), "spec.resources.requests.cpu");
        assert_eq!(
            resource_field("requests", GPU_RESOURCE),
            "spec.resources.requests['nvidia.com/gpu']"
        );
    }

    #[test]
    fn image_must_be_allowed() {
        let template = WorkspaceTemplateSpec {
            allowed_images: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        let v = check_image("c", &template).unwrap();
        assert_eq!(v.type_, ViolationType::ImageNotAllowed);
        assert_eq!(v.field, "spec.image");
        assert_eq!(v.actual.as_deref(), Some("c"));
        assert!(check_image("a", &template).is_none());
    }

    #[test]
    fn custom_images_or_empty_list_allow_anything() {
        let template = WorkspaceTemplateSpec {
            allowed_images: vec!["a".into()],
            allow_custom_images: Some(true),
            ..Default::default()
        };
        assert!(check_image("c", &template).is_none());
        assert!(check_image("c", &WorkspaceTemplateSpec::default()).is_none());
    }

    #[test]
    fn cpu_bounds_compare_exactly() {
        let bounds = ResourceBounds {
            cpu: Some(range(Some("1"), Some("2"))),
            ..Default::default()
        };
        assert!(check_resource_bounds(&requests(&[("cpu", "1.5")]), &bounds).is_empty());
        assert!(check_resource_bounds(&requests(&[("cpu", "1500m")]), &bounds).is_empty());
        assert!(check_resource_bounds(&requests(&[("cpu", "2")]), &bounds).is_empty());

        let violations = check_resource_bounds(&requests(&[("cpu", "2001m")]), &bounds);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "spec.resources.requests.cpu");
    }

    #[test]
    fn gpu_violation_uses_bracket_path() {
        let bounds = ResourceBounds {
            gpu: Some(range(None, Some("1"))),
            ..Default::default()
        };
        let violations = check_resource_bounds(&requests(&[(GPU_RESOURCE, "2")]), &bounds);
        assert_eq!(violations[0].field, "spec.resources.requests['nvidia.com/gpu']");
    }

    #[test]
    fn unparsable_request_is_a_violation() {
        let bounds = ResourceBounds {
            memory: Some(range(Some("1Gi"), None)),
            ..Default::default()
        };
        let violations = check_resource_bounds(&requests(&[("memory", "lots")]), &bounds);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].type_, ViolationType::ResourceExceeded);
    }

    #[test]
    fn missing_request_is_not_checked() {
        let bounds = ResourceBounds {
            cpu: Some(range(Some("1"), Some("2"))),
            ..Default::default()
        };
        assert!(check_resource_bounds(&requests(&[]), &bounds).is_empty());
    }

    #[test]
    fn limit_below_request_is_flagged() {
        let mut resources = requests(&[("cpu", "2")]);
        resources.limits.insert("cpu".into(), "1".into());
        let violations = check_limits_cover_requests(&resources);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "spec.resources.limits.cpu");

        resources.limits.insert("cpu".into(), "2000m".into());
        assert!(check_limits_cover_requests(&resources).is_empty());
    }

    #[test]
    fn storage_size_bounds() {
        let storage = StorageConfig {
            min_size: Some("1Gi".into()),
            max_size: Some("50Gi".into()),
            ..Default::default()
        };
        assert!(check_storage("10Gi", &storage).is_none());
        let v = check_storage("100Gi", &storage).unwrap();
        assert_eq!(v.type_, ViolationType::StorageExceeded);
        assert_eq!(v.field, "spec.storage.size");
        assert!(check_storage("huge", &storage).is_some());
    }

    #[test]
    fn idle_override_policy() {
        let idle = IdleShutdownSpec {
            enabled: true,
            idle_timeout_in_minutes: 600,
            ..Default::default()
        };
        let forbidden = IdleShutdownOverridePolicy {
            allow: Some(false),
            ..Default::default()
        };
        let v = check_idle_override(&idle, &forbidden);
        assert_eq!(v[0].type_, ViolationType::IdleShutdownOverrideNotAllowed);

        let bounded = IdleShutdownOverridePolicy {
            allow: Some(true),
            min_idle_timeout_in_minutes: Some(10),
            max_idle_timeout_in_minutes: Some(240),
        };
        let v = check_idle_override(&idle, &bounded);
        assert_eq!(v[0].type_, ViolationType::IdleShutdownTimeoutOutOfBounds);
        assert_eq!(v[0].field, "spec.idleShutdown.idleTimeoutInMinutes");

        let ok = IdleShutdownSpec {
            idle_timeout_in_minutes: 60,
            ..idle
        };
        assert!(check_idle_override(&ok, &bounded).is_empty());
    }
}
