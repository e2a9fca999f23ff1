//! Workspace condition types, reasons and the snapshot merge
//!
//! Every status write carries the full set of four conditions. The merge
//! compares that desired set against the snapshot the reconcile pass started
//! from and reports whether anything actually changed.

use chrono::{DateTime, Utc};
use workspaces_common::crd::{Condition, ConditionStatus};

/// Workspace is reachable
pub const CONDITION_AVAILABLE: &str = "Available";
/// Sub-resources are being created, updated or torn down
pub const CONDITION_PROGRESSING: &str = "Progressing";
/// Something is wrong with the workspace
pub const CONDITION_DEGRADED: &str = "Degraded";
/// Sub-resources are fully torn down
pub const CONDITION_STOPPED: &str = "Stopped";

/// Canonical order of condition types in `status.conditions`
pub const CANONICAL_ORDER: [&str; 4] = [
    CONDITION_AVAILABLE,
    CONDITION_PROGRESSING,
    CONDITION_DEGRADED,
    CONDITION_STOPPED,
];

/// Condition reasons
pub mod reasons {
    /// Neither compute nor service is ready
    pub const RESOURCES_NOT_READY: &str = "ResourcesNotReady";
    /// Compute workload is not ready
    pub const COMPUTE_NOT_READY: &str = "ComputeNotReady";
    /// Service is not ready
    pub const SERVICE_NOT_READY: &str = "ServiceNotReady";
    /// Access objects are not ready
    pub const ACCESS_NOT_READY: &str = "AccessNotReady";
    /// All sub-resources are ready
    pub const RESOURCES_READY: &str = "ResourcesReady";
    /// Compute workload is rolling out a change
    pub const RESOURCES_UPDATING: &str = "ResourcesUpdating";
    /// Desired status is Stopped
    pub const DESIRED_STATE_STOPPED: &str = "DesiredStateStopped";
    /// Desired status is Running
    pub const DESIRED_STATE_RUNNING: &str = "DesiredStateRunning";
    /// Compute workload still exists
    pub const COMPUTE_NOT_STOPPED: &str = "ComputeNotStopped";
    /// Service still exists
    pub const SERVICE_NOT_STOPPED: &str = "ServiceNotStopped";
    /// Access objects still exist
    pub const ACCESS_NOT_STOPPED: &str = "AccessNotStopped";
    /// All sub-resources are gone
    pub const ALL_RESOURCES_STOPPED: &str = "AllResourcesStopped";
    /// No error detected
    pub const NO_ERROR: &str = "NoError";
    /// Workspace was stopped after its pod was preempted
    pub const PREEMPTED: &str = "Preempted";
    /// Workspace is being deleted
    pub const DELETING: &str = "Deleting";
    /// Workspace breaches its template
    pub const COMPLIANCE_VIOLATION: &str = "ComplianceViolation";
    /// Reconciliation failed
    pub const RECONCILE_ERROR: &str = "ReconcileError";
}

/// Placeholder for a condition type the snapshot never had
pub fn unknown_condition(type_: &str, now: DateTime<Utc>) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: ConditionStatus::Unknown,
        reason: "Unknown".to_string(),
        message: "Condition not yet observed".to_string(),
        last_transition_time: now,
    }
}

fn canonical_rank(type_: &str) -> usize {
    CANONICAL_ORDER
        .iter()
        .position(|t| *t == type_)
        .unwrap_or(CANONICAL_ORDER.len())
}

/// Sort conditions into canonical order; unknown types keep their relative order at the end
pub fn sort_canonical(conditions: &mut [Condition]) {
    conditions.sort_by_key(|c| canonical_rank(&c.type_));
}

/// Merge `desired` into `snapshot`, returning the full new condition list,
/// or an empty list when nothing would change.
///
/// An unchanged condition keeps its timestamp; a condition whose status
/// changed, or that is new, is stamped with `now`; a reason or message change
/// alone is written but keeps the previous timestamp. Snapshot conditions
/// missing from `desired` are kept.
pub fn merge_conditions_if_changed(
    snapshot: &[Condition],
    desired: &[Condition],
    now: DateTime<Utc>,
) -> Vec<Condition> {
    let mut merged: Vec<Condition> = snapshot.to_vec();
    let mut changed = false;

    for want in desired {
        match merged.iter_mut().find(|c| c.type_ == want.type_) {
            Some(existing) if existing.same_state(want) => {}
            Some(existing) => {
                let last_transition_time = if existing.status == want.status {
                    existing.last_transition_time
                } else {
                    now
                };
                *existing = Condition {
                    last_transition_time,
                    ..want.clone()
                };
                changed = true;
            }
            None => {
                merged.push(Condition {
                    last_transition_time: now,
                    ..want.clone()
                });
                changed = true;
            }
        }
    }

    if !changed {
        return Vec::new();
    }
    sort_canonical(&mut merged);
    merged
}

fn condition(type_: &str, status: ConditionStatus, reason: &str, message: &str) -> Condition {
    Condition::new(type_, status, reason, message)
}

fn not_degraded() -> Condition {
    condition(
        CONDITION_DEGRADED,
        ConditionStatus::False,
        reasons::NO_ERROR,
        "No errors detected",
    )
}

/// Conditions while sub-resources are being brought up
pub fn starting(reason: &str, message: &str) -> Vec<Condition> {
    vec![
        condition(CONDITION_AVAILABLE, ConditionStatus::False, reason, message),
        condition(CONDITION_PROGRESSING, ConditionStatus::True, reason, message),
        not_degraded(),
        condition(
            CONDITION_STOPPED,
            ConditionStatus::False,
            reasons::DESIRED_STATE_RUNNING,
            "Workspace is starting",
        ),
    ]
}

/// Conditions once every sub-resource is ready
pub fn running() -> Vec<Condition> {
    vec![
        condition(
            CONDITION_AVAILABLE,
            ConditionStatus::True,
            reasons::RESOURCES_READY,
            "Workspace is ready",
        ),
        condition(
            CONDITION_PROGRESSING,
            ConditionStatus::False,
            reasons::RESOURCES_READY,
            "Workspace is ready",
        ),
        not_degraded(),
        condition(
            CONDITION_STOPPED,
            ConditionStatus::False,
            reasons::DESIRED_STATE_RUNNING,
            "Workspace is running",
        ),
    ]
}

/// Conditions while a ready workspace rolls out a spec change
pub fn updating() -> Vec<Condition> {
    vec![
        condition(
            CONDITION_AVAILABLE,
            ConditionStatus::True,
            reasons::RESOURCES_READY,
            "Workspace is ready",
        ),
        condition(
            CONDITION_PROGRESSING,
            ConditionStatus::True,
            reasons::RESOURCES_UPDATING,
            "Workspace is applying an update",
        ),
        not_degraded(),
        condition(
            CONDITION_STOPPED,
            ConditionStatus::False,
            reasons::DESIRED_STATE_RUNNING,
            "Workspace is running",
        ),
    ]
}

/// Conditions while sub-resources are being torn down
pub fn stopping(stopped_reason: &str, message: &str) -> Vec<Condition> {
    vec![
        condition(
            CONDITION_AVAILABLE,
            ConditionStatus::False,
            reasons::DESIRED_STATE_STOPPED,
            "Desired status is Stopped",
        ),
        condition(
            CONDITION_PROGRESSING,
            ConditionStatus::True,
            reasons::DESIRED_STATE_STOPPED,
            message,
        ),
        not_degraded(),
        condition(CONDITION_STOPPED, ConditionStatus::False, stopped_reason, message),
    ]
}

/// Conditions once every sub-resource is gone
pub fn stopped(preemption: Option<&str>) -> Vec<Condition> {
    let (reason, message) = match preemption {
        Some(message) => (reasons::PREEMPTED, message),
        None => (reasons::DESIRED_STATE_STOPPED, "Workspace is stopped"),
    };
    vec![
        condition(CONDITION_AVAILABLE, ConditionStatus::False, reason, message),
        condition(
            CONDITION_PROGRESSING,
            ConditionStatus::False,
            reasons::DESIRED_STATE_STOPPED,
            "Workspace is stopped",
        ),
        not_degraded(),
        condition(
            CONDITION_STOPPED,
            ConditionStatus::True,
            reasons::ALL_RESOURCES_STOPPED,
            "Workspace is stopped",
        ),
    ]
}

/// Conditions while the workspace is being deleted
pub fn deleting() -> Vec<Condition> {
    let message = "Workspace is being deleted";
    vec![
        condition(CONDITION_AVAILABLE, ConditionStatus::False, reasons::DELETING, message),
        condition(CONDITION_PROGRESSING, ConditionStatus::True, reasons::DELETING, message),
        not_degraded(),
        condition(CONDITION_STOPPED, ConditionStatus::False, reasons::DELETING, message),
    ]
}

/// Conditions for a failed pass: Degraded=True, the rest kept from the
/// snapshot and missing ones filled with Unknown.
pub fn error(snapshot: &[Condition], reason: &str, message: &str, now: DateTime<Utc>) -> Vec<Condition> {
    CANONICAL_ORDER
        .iter()
        .map(|type_| {
            if *type_ == CONDITION_DEGRADED {
                return condition(CONDITION_DEGRADED, ConditionStatus::True, reason, message);
            }
            snapshot
                .iter()
                .find(|c| c.type_ == *type_)
                .cloned()
                .unwrap_or_else(|| unknown_condition(type_, now))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(minutes_ago: i64) -> DateTime<Utc> {
        Utc::now() - Duration::minutes(minutes_ago)
    }

    fn stamped(mut conditions: Vec<Condition>, time: DateTime<Utc>) -> Vec<Condition> {
        for c in &mut conditions {
            c.last_transition_time = time;
        }
        conditions
    }

    fn types(conditions: &[Condition]) -> Vec<&str> {
        conditions.iter().map(|c| c.type_.as_str()).collect()
    }

    /// Story: a fresh workspace gets all four conditions in canonical order
    #[test]
    fn story_first_write_introduces_all_conditions() {
        let now = Utc::now();
        let merged = merge_conditions_if_changed(&[], &running(), now);
        assert_eq!(types(&merged), CANONICAL_ORDER.to_vec());
        assert!(merged.iter().all(|c| c.last_transition_time == now));
    }

    /// Story: reconciling an unchanged Running workspace writes nothing
    #[test]
    fn story_unchanged_conditions_produce_no_update() {
        let snapshot = stamped(running(), at(30));
        let merged = merge_conditions_if_changed(&snapshot, &running(), Utc::now());
        assert!(merged.is_empty());
    }

    /// Story: only conditions whose status flipped get a fresh timestamp
    #[test]
    fn story_status_change_refreshes_only_changed_conditions() {
        let old = at(30);
        let now = Utc::now();
        let snapshot = stamped(starting(reasons::COMPUTE_NOT_READY, "Compute is not ready"), old);
        let merged = merge_conditions_if_changed(&snapshot, &running(), now);

        let by_type = |t: &str| merged.iter().find(|c| c.type_ == t).unwrap().clone();
        // Available False -> True
        assert_eq!(by_type(CONDITION_AVAILABLE).last_transition_time, now);
        // Progressing True -> False
        assert_eq!(by_type(CONDITION_PROGRESSING).last_transition_time, now);
        // Degraded and Stopped unchanged
        assert_eq!(by_type(CONDITION_DEGRADED).last_transition_time, old);
        assert_eq!(by_type(CONDITION_STOPPED).last_transition_time, old);
    }

    /// Story: a message-only change is written but keeps the old timestamp
    #[test]
    fn story_reason_change_keeps_transition_time() {
        let old = at(10);
        let snapshot = stamped(starting(reasons::COMPUTE_NOT_READY, "Compute is not ready"), old);
        let desired = starting(reasons::ACCESS_NOT_READY, "Access is not ready");
        let merged = merge_conditions_if_changed(&snapshot, &desired, Utc::now());

        assert!(!merged.is_empty());
        let available = &merged[0];
        assert_eq!(available.reason, reasons::ACCESS_NOT_READY);
        assert_eq!(available.last_transition_time, old);
    }

    #[test]
    fn merge_keeps_unknown_types_after_canonical_ones() {
        let mut snapshot = vec![Condition::new(
            "Custom",
            ConditionStatus::True,
            "External",
            "set elsewhere",
        )];
        snapshot.extend(stamped(stopped(None), at(5)));
        let merged = merge_conditions_if_changed(&snapshot, &running(), Utc::now());
        assert_eq!(
            types(&merged),
            vec!["Available", "Progressing", "Degraded", "Stopped", "Custom"]
        );
    }

    #[test]
    fn sort_restores_canonical_order() {
        let mut conditions = running();
        conditions.reverse();
        sort_canonical(&mut conditions);
        assert_eq!(types(&conditions), CANONICAL_ORDER.to_vec());
    }

    #[test]
    fn phase_condition_sets_match_table() {
        let s = starting(reasons::SERVICE_NOT_READY, "Service is not ready");
        assert_eq!(s[0].status, ConditionStatus::False);
        assert_eq!(s[1].status, ConditionStatus::True);
        assert_eq!(s[1].reason, reasons::SERVICE_NOT_READY);
        assert_eq!(s[3].reason, reasons::DESIRED_STATE_RUNNING);

        let u = updating();
        assert!(u[0].is_true());
        assert!(u[1].is_true());
        assert_eq!(u[1].reason, reasons::RESOURCES_UPDATING);

        let st = stopping(reasons::COMPUTE_NOT_STOPPED, "Compute is still running");
        assert_eq!(st[0].reason, reasons::DESIRED_STATE_STOPPED);
        assert_eq!(st[3].reason, reasons::COMPUTE_NOT_STOPPED);

        let d = deleting();
        assert!(d.iter().filter(|c| c.type_ != CONDITION_DEGRADED).all(|c| c.reason == reasons::DELETING));
    }

    #[test]
    fn stopped_uses_preempted_reason_when_annotated() {
        let plain = stopped(None);
        assert_eq!(plain[0].reason, reasons::DESIRED_STATE_STOPPED);
        assert!(plain[3].is_true());

        let preempted = stopped(Some("Workspace preempted due to resource contention"));
        assert_eq!(preempted[0].reason, reasons::PREEMPTED);
        assert!(preempted[0].message.contains("preempted"));
    }

    /// Story: the error phase only flips Degraded and fills gaps with Unknown
    #[test]
    fn story_error_keeps_other_conditions() {
        let now = Utc::now();
        let snapshot = vec![running()[0].clone()];
        let conditions = error(&snapshot, reasons::COMPLIANCE_VIOLATION, "bad image", now);

        assert_eq!(types(&conditions), CANONICAL_ORDER.to_vec());
        assert!(conditions[0].is_true());
        assert_eq!(conditions[1].status, ConditionStatus::Unknown);
        assert!(conditions[2].is_true());
        assert_eq!(conditions[2].reason, reasons::COMPLIANCE_VIOLATION);
        assert_eq!(conditions[3].status, ConditionStatus::Unknown);
    }
}
