//! Lifecycle tracking for a single request.
//!
//! The tracker is deterministic: it maps observed job counters to a verdict
//! and folds that verdict into the current `AppliedStatus` without ever moving
//! the status backwards.

use k8s_openapi::api::batch::v1::Job;
use tfreq_model::AppliedStatus;

/// Pod counters reported by one job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobOutcome {
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
}

impl JobOutcome {
    pub fn of(job: &Job) -> Self {
        job.status
            .as_ref()
            .map(|status| Self {
                active: status.active.unwrap_or(0),
                succeeded: status.succeeded.unwrap_or(0),
                failed: status.failed.unwrap_or(0),
            })
            .unwrap_or_default()
    }
}

/// Aggregate reading over every job owned by a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// At least one attempt failed.
    Failed,
    /// A finished job reported success and nothing failed.
    Succeeded,
    /// No terminal signal yet (jobs still active, or none observed).
    Pending,
}

/// Folds job outcomes into a verdict. Failure is checked first, so a job
/// reporting both failed and succeeded attempts counts as failed. A job that
/// is still active contributes no success.
pub fn aggregate<'a, I>(outcomes: I) -> Verdict
where
    I: IntoIterator<Item = &'a JobOutcome>,
{
    let mut succeeded = false;
    for outcome in outcomes {
        if outcome.failed >= 1 {
            return Verdict::Failed;
        }
        if outcome.active >= 1 {
            continue;
        }
        if outcome.succeeded >= 1 {
            succeeded = true;
        }
    }

    if succeeded {
        Verdict::Succeeded
    } else {
        Verdict::Pending
    }
}

/// Status after child creation was initiated.
pub fn launched(current: AppliedStatus) -> AppliedStatus {
    match current {
        AppliedStatus::Unset => AppliedStatus::Running,
        other => other,
    }
}

/// Status after folding in a verdict. Only `Running` reacts; `Unset` waits for
/// a launch and terminal states never change.
pub fn advance(current: AppliedStatus, verdict: Verdict) -> AppliedStatus {
    let next = match (current, verdict) {
        (AppliedStatus::Running, Verdict::Failed) => AppliedStatus::Failed,
        (AppliedStatus::Running, Verdict::Succeeded) => AppliedStatus::Applied,
        (current, _) => current,
    };
    debug_assert!(current.can_transition_to(next));
    next
}
