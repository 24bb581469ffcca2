//! Update strategy engine.
//!
//! Given the desired state and the pods observed in one pass, [`plan`] picks
//! the single batch of operations to apply next. The rules are evaluated in
//! strict priority order and the first match wins:
//!
//! 0. `Recreate` with an outdated pod still terminating: wait for it to go.
//! 1. Fewer pods than desired: create the missing ones.
//! 2. `RollingUpdate` with outdated pods: surge one replacement when at the
//!    desired count, otherwise retire one outdated pod once the replacements
//!    are ready and availability allows it.
//! 3. `Recreate` with outdated pods: delete every pod.
//! 4. More pods than desired: delete the surplus, oldest listed first.
//! 5. Steady state: nothing to do.
//!
//! Pods that are already terminating never count as current. The planner
//! keeps no memory between passes; every call re-derives the work from what
//! it is shown.

use crate::crd::{MiniCloneSetSpec, UpdateStrategyType, DEFAULT_MAX_UNAVAILABLE};
use crate::error::OperatorError;
use crate::pod;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeSet;
use std::str::FromStr;

/// How many pods may be unavailable while outdated pods are retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxUnavailable {
    /// Absolute number of pods.
    Count(u32),
    /// Percentage of desired replicas, rounded down.
    Percent(u32),
}

impl MaxUnavailable {
    /// Number of pods this allows to be unavailable out of `desired`.
    pub fn resolve(self, desired: u32) -> u32 {
        match self {
            MaxUnavailable::Count(n) => n,
            MaxUnavailable::Percent(p) => (u64::from(desired) * u64::from(p) / 100) as u32,
        }
    }
}

impl Default for MaxUnavailable {
    fn default() -> Self {
        MaxUnavailable::Percent(25)
    }
}

impl FromStr for MaxUnavailable {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || OperatorError::InvalidConfig(format!("invalid maxUnavailable {s:?}"));

        match s.strip_suffix('%') {
            Some(pct) => {
                let p: u32 = pct.parse().map_err(|_| invalid())?;
                if p > 100 {
                    return Err(invalid());
                }
                Ok(MaxUnavailable::Percent(p))
            }
            None => s.parse().map(MaxUnavailable::Count).map_err(|_| invalid()),
        }
    }
}

/// Desired state, as the planner needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    /// Desired pod count.
    pub replicas: u32,
    /// Desired primary container image.
    pub image: String,
    /// Update strategy.
    pub strategy: UpdateStrategyType,
    /// Unavailability budget for rolling updates.
    pub max_unavailable: MaxUnavailable,
}

impl DesiredState {
    /// Desired state of a hub spec.
    ///
    /// An unparsable maxUnavailable falls back to the default with a warning.
    pub fn from_spec(spec: &MiniCloneSetSpec) -> Self {
        let raw = spec
            .update_strategy
            .max_unavailable
            .as_deref()
            .unwrap_or(DEFAULT_MAX_UNAVAILABLE);
        let max_unavailable = raw.parse().unwrap_or_else(|e: OperatorError| {
            tracing::warn!(error = %e, "Falling back to default maxUnavailable");
            MaxUnavailable::default()
        });

        Self {
            replicas: u32::try_from(spec.replicas).unwrap_or(0),
            image: spec.container.image.clone(),
            strategy: spec.update_strategy.strategy_type,
            max_unavailable,
        }
    }
}

/// One operation against the pod set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodOperation {
    /// Create the pod with this ordinal.
    Create {
        /// Ordinal in `<owner>-<ordinal>`.
        ordinal: u32,
    },
    /// Delete the named pod.
    Delete {
        /// Pod name.
        name: String,
    },
}

/// Which rule produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Step {
    /// Waiting for outdated pods to finish terminating before recreating.
    RecreateWaiting,
    /// Creating missing pods.
    ScaleUp,
    /// Creating one replacement pod during a rolling update.
    RollingSurge,
    /// Deleting one outdated pod whose replacement is ready.
    RollingRetire,
    /// Waiting for the replacement pod to become ready.
    RollingWaiting,
    /// Deleting every pod to recreate them.
    Recreate,
    /// Deleting surplus pods.
    ScaleDown,
    /// Counts match and no pod is outdated.
    Steady,
}

/// When the next pass should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueHint {
    /// Soon, to observe readiness of newly created pods.
    ScaleUp,
    /// Soon, to continue an update or scale-down.
    Rollout,
    /// Only when something changes.
    AwaitChange,
}

/// Pod counts measured in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PodCounts {
    /// Pods not terminating.
    pub current: u32,
    /// Current pods that are ready.
    pub ready: u32,
    /// Current pods not running the desired image.
    pub outdated: u32,
    /// Pods already being deleted.
    pub terminating: u32,
}

/// Outcome of one planning step.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Rule that matched.
    pub step: Step,
    /// Operations to apply, in order.
    pub operations: Vec<PodOperation>,
    /// Requeue timing.
    pub requeue: RequeueHint,
    /// What the pass observed.
    pub counts: PodCounts,
}

/// Choose the next batch of operations for `owner_name`'s pods.
///
/// `reserved` names pods that carry the owner label but belong to someone
/// else. Their ordinals are never handed out.
pub fn plan(
    desired: &DesiredState,
    owner_name: &str,
    pods: &[Pod],
    reserved: &[String],
) -> Plan {
    let (active, terminating): (Vec<&Pod>, Vec<&Pod>) =
        pods.iter().partition(|p| !pod::is_terminating(p));
    let outdated: Vec<&Pod> = active
        .iter()
        .copied()
        .filter(|p| !pod::is_up_to_date(p, &desired.image))
        .collect();

    let counts = PodCounts {
        current: active.len() as u32,
        ready: active.iter().filter(|p| pod::is_ready(p)).count() as u32,
        outdated: outdated.len() as u32,
        terminating: terminating.len() as u32,
    };
    let make = |step, operations, requeue| Plan {
        step,
        operations,
        requeue,
        counts,
    };

    if desired.strategy == UpdateStrategyType::Recreate
        && terminating
            .iter()
            .any(|p| !pod::is_up_to_date(p, &desired.image))
    {
        return make(Step::RecreateWaiting, Vec::new(), RequeueHint::Rollout);
    }

    if counts.current < desired.replicas {
        let missing = desired.replicas - counts.current;
        let creates = free_ordinals(owner_name, pods, reserved, missing)
            .into_iter()
            .map(|ordinal| PodOperation::Create { ordinal })
            .collect();
        return make(Step::ScaleUp, creates, RequeueHint::ScaleUp);
    }

    if !outdated.is_empty() {
        return match desired.strategy {
            UpdateStrategyType::RollingUpdate => {
                let (step, operations) =
                    rolling_step(desired, owner_name, pods, reserved, &active, &outdated, &counts);
                make(step, operations, RequeueHint::Rollout)
            }
            UpdateStrategyType::Recreate => {
                let deletes = active.iter().filter_map(|p| delete_op(p)).collect();
                make(Step::Recreate, deletes, RequeueHint::Rollout)
            }
        };
    }

    if counts.current > desired.replicas {
        let surplus = (counts.current - desired.replicas) as usize;
        let deletes = active
            .iter()
            .take(surplus)
            .filter_map(|p| delete_op(p))
            .collect();
        return make(Step::ScaleDown, deletes, RequeueHint::Rollout);
    }

    make(Step::Steady, Vec::new(), RequeueHint::AwaitChange)
}

/// Rolling update with at least `desired.replicas` current pods.
///
/// At the desired count one replacement is surged. Above it, the surplus is
/// made of replacements, so one outdated pod is retired once every up-to-date
/// pod is ready and removing it keeps at least
/// `replicas - maxUnavailable` pods ready. Unready outdated pods are retired
/// first since removing them costs no availability.
fn rolling_step(
    desired: &DesiredState,
    owner_name: &str,
    pods: &[Pod],
    reserved: &[String],
    active: &[&Pod],
    outdated: &[&Pod],
    counts: &PodCounts,
) -> (Step, Vec<PodOperation>) {
    if counts.current == desired.replicas {
        let creates = free_ordinals(owner_name, pods, reserved, 1)
            .into_iter()
            .map(|ordinal| PodOperation::Create { ordinal })
            .collect();
        return (Step::RollingSurge, creates);
    }

    let replacements_ready = active
        .iter()
        .filter(|p| pod::is_up_to_date(p, &desired.image))
        .all(|p| pod::is_ready(p));
    if !replacements_ready {
        return (Step::RollingWaiting, Vec::new());
    }

    let victim = outdated
        .iter()
        .find(|p| !pod::is_ready(p))
        .or_else(|| outdated.first())
        .copied();
    let Some(victim) = victim else {
        return (Step::RollingWaiting, Vec::new());
    };

    let min_available = desired
        .replicas
        .saturating_sub(desired.max_unavailable.resolve(desired.replicas));
    let costs_availability = pod::is_ready(victim);
    if costs_availability && counts.ready.saturating_sub(1) < min_available {
        return (Step::RollingWaiting, Vec::new());
    }

    match delete_op(victim) {
        Some(op) => (Step::RollingRetire, vec![op]),
        None => (Step::RollingWaiting, Vec::new()),
    }
}

fn delete_op(pod: &Pod) -> Option<PodOperation> {
    pod.metadata
        .name
        .clone()
        .map(|name| PodOperation::Delete { name })
}

/// Lowest `count` ordinals not used by any listed pod, terminating or not,
/// nor by a reserved name.
fn free_ordinals(
    owner_name: &str,
    pods: &[Pod],
    reserved: &[String],
    count: u32,
) -> Vec<u32> {
    let taken: BTreeSet<u32> = pods
        .iter()
        .filter_map(|p| pod::ordinal(p, owner_name))
        .chain(
            reserved
                .iter()
                .filter_map(|name| pod::name_ordinal(name, owner_name)),
        )
        .collect();
    (0..)
        .filter(|n| !taken.contains(n))
        .take(count as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::testing::{pod, terminating};

    fn desired(replicas: u32, image: &str, strategy: UpdateStrategyType) -> DesiredState {
        DesiredState {
            replicas,
            image: image.to_string(),
            strategy,
            max_unavailable: MaxUnavailable::default(),
        }
    }

    fn rolling(replicas: u32, image: &str) -> DesiredState {
        desired(replicas, image, UpdateStrategyType::RollingUpdate)
    }

    fn creates(plan: &Plan) -> Vec<u32> {
        plan.operations
            .iter()
            .filter_map(|op| match op {
                PodOperation::Create { ordinal } => Some(*ordinal),
                PodOperation::Delete { .. } => None,
            })
            .collect()
    }

    fn deletes(plan: &Plan) -> Vec<&str> {
        plan.operations
            .iter()
            .filter_map(|op| match op {
                PodOperation::Delete { name } => Some(name.as_str()),
                PodOperation::Create { .. } => None,
            })
            .collect()
    }

    #[test]
    fn parses_max_unavailable() {
        assert_eq!("25%".parse::<MaxUnavailable>().ok(), Some(MaxUnavailable::Percent(25)));
        assert_eq!(" 2 ".parse::<MaxUnavailable>().ok(), Some(MaxUnavailable::Count(2)));
        assert!("150%".parse::<MaxUnavailable>().is_err());
        assert!("two".parse::<MaxUnavailable>().is_err());
        assert!("-1".parse::<MaxUnavailable>().is_err());
    }

    #[test]
    fn percentage_rounds_down() {
        assert_eq!(MaxUnavailable::Percent(25).resolve(3), 0);
        assert_eq!(MaxUnavailable::Percent(25).resolve(8), 2);
        assert_eq!(MaxUnavailable::Count(1).resolve(8), 1);
    }

    #[test]
    fn desired_state_falls_back_on_bad_max_unavailable() {
        let mut spec = crate::crd::MiniCloneSetSpec {
            replicas: 2,
            container: crate::crd::ContainerSpec {
                image: "app:v1".into(),
            },
            update_strategy: Default::default(),
        };
        spec.update_strategy.max_unavailable = Some("lots".into());

        let state = DesiredState::from_spec(&spec);
        assert_eq!(state.max_unavailable, MaxUnavailable::Percent(25));
        assert_eq!(state.replicas, 2);
    }

    #[test]
    fn scale_up_from_zero_creates_all() {
        let plan = plan(&rolling(3, "app:v1"), "web", &[], &[]);
        assert_eq!(plan.step, Step::ScaleUp);
        assert_eq!(creates(&plan), vec![0, 1, 2]);
        assert_eq!(plan.requeue, RequeueHint::ScaleUp);
    }

    #[test]
    fn scale_up_fills_lowest_free_ordinals() {
        let pods = vec![pod("web-1", "app:v1", true), pod("web-3", "app:v1", true)];
        let plan = plan(&rolling(4, "app:v1"), "web", &pods, &[]);
        assert_eq!(creates(&plan), vec![0, 2]);
    }

    #[test]
    fn reserved_names_are_skipped_when_creating() {
        let reserved = vec!["web-0".to_string(), "web-2".to_string(), "other-1".to_string()];
        let spread = plan(&rolling(2, "app:v1"), "web", &[], &reserved);
        assert_eq!(creates(&spread), vec![1, 3]);

        let pods = vec![pod("web-1", "app:v1", true), pod("web-3", "app:v1", true)];
        let surge = plan(&rolling(2, "app:v2"), "web", &pods, &reserved);
        assert_eq!(surge.step, Step::RollingSurge);
        assert_eq!(creates(&surge), vec![4]);
    }

    #[test]
    fn scale_up_takes_priority_over_rollout() {
        let pods = vec![pod("web-0", "app:v1", true), pod("web-1", "app:v1", true)];
        let plan = plan(&rolling(3, "app:v2"), "web", &pods, &[]);

        assert_eq!(plan.step, Step::ScaleUp);
        assert_eq!(creates(&plan), vec![2]);
        assert!(deletes(&plan).is_empty());
    }

    #[test]
    fn rolling_surges_one_replacement_without_deleting() {
        let pods = vec![
            pod("web-0", "app:v1", true),
            pod("web-1", "app:v1", true),
            pod("web-2", "app:v2", false),
        ];
        let plan = plan(&rolling(3, "app:v2"), "web", &pods, &[]);

        assert_eq!(plan.step, Step::RollingSurge);
        assert_eq!(creates(&plan), vec![3]);
        assert!(deletes(&plan).is_empty());
        assert_eq!(plan.requeue, RequeueHint::Rollout);
    }

    #[test]
    fn rolling_waits_for_replacement_readiness() {
        let pods = vec![
            pod("web-0", "app:v1", true),
            pod("web-1", "app:v1", true),
            pod("web-2", "app:v2", false),
        ];
        let plan = plan(&rolling(2, "app:v2"), "web", &pods, &[]);

        assert_eq!(plan.step, Step::RollingWaiting);
        assert!(plan.operations.is_empty());
    }

    #[test]
    fn rolling_retires_oldest_outdated_once_replacement_ready() {
        let pods = vec![
            pod("web-0", "app:v1", true),
            pod("web-1", "app:v1", true),
            pod("web-2", "app:v2", true),
        ];
        let plan = plan(&rolling(2, "app:v2"), "web", &pods, &[]);

        assert_eq!(plan.step, Step::RollingRetire);
        assert_eq!(deletes(&plan), vec!["web-0"]);
        assert!(creates(&plan).is_empty());
    }

    #[test]
    fn rolling_retires_unready_outdated_first() {
        let pods = vec![
            pod("web-0", "app:v1", true),
            pod("web-1", "app:v1", false),
            pod("web-2", "app:v2", true),
        ];
        let plan = plan(&rolling(2, "app:v2"), "web", &pods, &[]);
        assert_eq!(deletes(&plan), vec!["web-1"]);
    }

    #[test]
    fn rolling_with_zero_unavailability_keeps_ready_floor() {
        let mut state = rolling(3, "app:v2");
        state.max_unavailable = MaxUnavailable::Count(0);
        let pods = vec![
            pod("web-0", "app:v1", true),
            pod("web-1", "app:v1", true),
            pod("web-2", "app:v2", true),
            pod("web-3", "app:v2", true),
        ];
        // 4 ready against a floor of 3: one retirement fits.
        let next = plan(&state, "web", &pods, &[]);
        assert_eq!(next.step, Step::RollingRetire);
        assert_eq!(deletes(&next), vec!["web-0"]);

        let mut degraded = pods.clone();
        degraded[3].status = None;
        assert_eq!(plan(&state, "web", &degraded, &[]).step, Step::RollingWaiting);
    }

    #[test]
    fn unready_outdated_pods_retire_even_below_floor() {
        let mut state = rolling(2, "app:v2");
        state.max_unavailable = MaxUnavailable::Count(0);
        let pods = vec![
            pod("web-0", "app:v1", false),
            pod("web-1", "app:v1", false),
            pod("web-2", "app:v2", true),
        ];
        let next = plan(&state, "web", &pods, &[]);
        assert_eq!(next.step, Step::RollingRetire);
        assert_eq!(deletes(&next), vec!["web-0"]);
    }

    #[test]
    fn recreate_deletes_everything_and_creates_nothing() {
        let pods = vec![
            pod("web-0", "app:v1", true),
            pod("web-1", "app:v2", true),
            pod("web-2", "app:v1", false),
        ];
        let plan = plan(
            &desired(3, "app:v2", UpdateStrategyType::Recreate),
            "web",
            &pods,
            &[],
        );

        assert_eq!(plan.step, Step::Recreate);
        assert_eq!(deletes(&plan), vec!["web-0", "web-1", "web-2"]);
        assert!(creates(&plan).is_empty());
    }

    #[test]
    fn recreate_waits_for_outdated_pods_to_terminate() {
        let pods = vec![terminating("web-0", "app:v1"), terminating("web-1", "app:v1")];
        let plan = plan(
            &desired(2, "app:v2", UpdateStrategyType::Recreate),
            "web",
            &pods,
            &[],
        );

        assert_eq!(plan.step, Step::RecreateWaiting);
        assert!(plan.operations.is_empty());
        assert_eq!(plan.counts.terminating, 2);
        assert_eq!(plan.counts.current, 0);
    }

    #[test]
    fn recreate_creates_after_termination_completes() {
        let plan = plan(
            &desired(2, "app:v2", UpdateStrategyType::Recreate),
            "web",
            &[],
            &[],
        );
        assert_eq!(plan.step, Step::ScaleUp);
        assert_eq!(creates(&plan), vec![0, 1]);
    }

    #[test]
    fn terminating_pods_do_not_count_but_keep_their_ordinals() {
        let pods = vec![pod("web-0", "app:v1", true), terminating("web-1", "app:v1")];
        let plan = plan(&rolling(2, "app:v1"), "web", &pods, &[]);

        assert_eq!(plan.step, Step::ScaleUp);
        assert_eq!(creates(&plan), vec![2]);
    }

    #[test]
    fn scale_down_deletes_only_the_surplus_oldest_first() {
        let pods = vec![
            pod("web-0", "app:v1", true),
            pod("web-1", "app:v1", true),
            pod("web-2", "app:v1", true),
            pod("web-3", "app:v1", true),
        ];
        let plan = plan(&rolling(1, "app:v1"), "web", &pods, &[]);

        assert_eq!(plan.step, Step::ScaleDown);
        assert_eq!(deletes(&plan), vec!["web-0", "web-1", "web-2"]);
        assert_eq!(plan.requeue, RequeueHint::Rollout);
    }

    #[test]
    fn steady_state_reports_ready_count() {
        let pods = vec![pod("web-0", "app:v1", true), pod("web-1", "app:v1", false)];
        let plan = plan(&rolling(2, "app:v1"), "web", &pods, &[]);

        assert_eq!(plan.step, Step::Steady);
        assert!(plan.operations.is_empty());
        assert_eq!(plan.requeue, RequeueHint::AwaitChange);
        assert_eq!(plan.counts.ready, 1);
        assert_eq!(plan.counts.outdated, 0);
    }

    #[test]
    fn rolling_update_terminates() {
        // Drive the planner against a simulated pod set where every new pod
        // becomes ready immediately.
        let state = rolling(3, "app:v2");
        let mut pods = vec![
            pod("web-0", "app:v1", true),
            pod("web-1", "app:v1", true),
            pod("web-2", "app:v1", true),
        ];

        for _ in 0..20 {
            let next = plan(&state, "web", &pods, &[]);
            if next.step == Step::Steady {
                break;
            }
            for op in next.operations {
                match op {
                    PodOperation::Create { ordinal } => {
                        pods.push(pod(&pod::pod_name("web", ordinal), "app:v2", true))
                    }
                    PodOperation::Delete { name } => {
                        pods.retain(|p| p.metadata.name.as_deref() != Some(name.as_str()))
                    }
                }
            }
            assert!(pods.len() <= 4, "surge never exceeds one pod");
        }

        let last = plan(&state, "web", &pods, &[]);
        assert_eq!(last.step, Step::Steady);
        assert_eq!(pods.len(), 3);
        assert!(pods.iter().all(|p| pod::is_up_to_date(p, "app:v2")));
    }
}
