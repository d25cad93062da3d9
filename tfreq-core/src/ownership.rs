//! Owner back-references and the owner -> job index built from them.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    ObjectMeta, OwnerReference,
};
use kube::{Resource, ResourceExt};
use parking_lot::RwLock;
use tfreq_model::{OWNER_KIND, ObjectKey, TerraformRequest};

use crate::error::{ControllerError, Result};

/// Name under which the index is registered; lookups are by owner name.
pub const JOB_OWNER_KEY: &str = ".metadata.controller";

/// Controller reference pointing at `request`, blocking owner deletion until
/// the child is collected. Requires the request to have been persisted (it
/// needs a uid).
pub fn controller_reference(
    request: &TerraformRequest,
) -> Result<OwnerReference> {
    request
        .controller_owner_ref(&())
        .map(|owner| OwnerReference {
            block_owner_deletion: Some(true),
            ..owner
        })
        .ok_or_else(|| {
            ControllerError::MissingOwnerUid(ObjectKey::of(request))
        })
}

/// Marks `owner` as the controller of the object described by `meta`,
/// replacing any earlier reference to the same owner.
pub fn attach_controller(meta: &mut ObjectMeta, owner: OwnerReference) {
    let references = meta.owner_references.get_or_insert_with(Vec::new);
    references.retain(|existing| existing.uid != owner.uid);
    references.push(owner);
}

/// Request that controls `job`, if any. Owners of other kinds are ignored.
pub fn controlling_request(job: &Job) -> Option<ObjectKey> {
    let api_version = TerraformRequest::api_version(&());
    job.owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true))
        .filter(|owner| {
            owner.api_version == api_version && owner.kind == OWNER_KIND
        })
        .map(|owner| {
            ObjectKey::new(job.namespace().unwrap_or_default(), &owner.name)
        })
}

#[derive(Default)]
struct IndexState {
    by_owner: HashMap<ObjectKey, BTreeSet<ObjectKey>>,
    owner_of: HashMap<ObjectKey, ObjectKey>,
}

impl IndexState {
    fn insert(&mut self, job: ObjectKey, owner: ObjectKey) {
        self.by_owner
            .entry(owner.clone())
            .or_default()
            .insert(job.clone());
        self.owner_of.insert(job, owner);
    }

    fn remove(&mut self, job: &ObjectKey) {
        let Some(owner) = self.owner_of.remove(job) else {
            return;
        };
        if let Some(jobs) = self.by_owner.get_mut(&owner) {
            jobs.remove(job);
            if jobs.is_empty() {
                self.by_owner.remove(&owner);
            }
        }
    }
}

/// Read-side projection from request identity to the jobs it controls.
///
/// The reconciler only reads it. Writers are whatever follows the job change
/// feed (the watch wiring in the operator, or the in-memory store), and the
/// whole index can be rebuilt from a fresh listing at any time.
#[derive(Clone, Default)]
pub struct OwnershipIndex {
    state: Arc<RwLock<IndexState>>,
}

impl fmt::Debug for OwnershipIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("OwnershipIndex");
        match self.state.try_read() {
            Some(state) => {
                debug
                    .field("owners", &state.by_owner.len())
                    .field("jobs", &state.owner_of.len());
            }
            None => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl OwnershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes (or re-indexes) `job` after it was created or changed.
    pub fn observe(&self, job: &Job) {
        let key = ObjectKey::of(job);
        let owner = controlling_request(job);
        let mut state = self.state.write();
        state.remove(&key);
        if let Some(owner) = owner {
            state.insert(key, owner);
        }
    }

    /// Drops `job` after it was deleted.
    pub fn forget(&self, job: &Job) {
        self.state.write().remove(&ObjectKey::of(job));
    }

    /// Replaces the whole index with a fresh listing.
    pub fn rebuild<'a, I>(&self, jobs: I)
    where
        I: IntoIterator<Item = &'a Job>,
    {
        let mut fresh = IndexState::default();
        for job in jobs {
            if let Some(owner) = controlling_request(job) {
                fresh.insert(ObjectKey::of(job), owner);
            }
        }
        *self.state.write() = fresh;
    }

    /// Jobs controlled by `owner`, scoped to the owner's namespace.
    pub fn owned_by(&self, owner: &ObjectKey) -> Vec<ObjectKey> {
        self.state
            .read()
            .by_owner
            .get(owner)
            .map(|jobs| jobs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of indexed jobs.
    pub fn len(&self) -> usize {
        self.state.read().owner_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tfreq_model::TerraformRequestSpec;

    fn owned_job(namespace: &str, name: &str, owner: &str) -> Job {
        let mut request =
            TerraformRequest::new(owner, TerraformRequestSpec::default());
        request.metadata.namespace = Some(namespace.into());
        request.metadata.uid = Some(format!("uid-{owner}"));

        let mut job = Job::default();
        job.metadata.name = Some(name.into());
        job.metadata.namespace = Some(namespace.into());
        attach_controller(
            &mut job.metadata,
            controller_reference(&request).expect("owner ref"),
        );
        job
    }

    #[test]
    fn controller_reference_needs_uid() {
        let request =
            TerraformRequest::new("r1", TerraformRequestSpec::default());
        assert!(matches!(
            controller_reference(&request),
            Err(ControllerError::MissingOwnerUid(_))
        ));
    }

    #[test]
    fn attach_controller_is_idempotent() {
        let job = owned_job("infra", "tfapply-r1", "r1");
        let mut meta = job.metadata.clone();
        let owner = meta.owner_references.as_ref().unwrap()[0].clone();
        attach_controller(&mut meta, owner);

        let refs = meta.owner_references.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].controller, Some(true));
        assert_eq!(refs[0].block_owner_deletion, Some(true));
    }

    #[test]
    fn indexes_jobs_by_controlling_request() {
        let index = OwnershipIndex::new();
        index.observe(&owned_job("infra", "tfapply-r1", "r1"));
        index.observe(&owned_job("infra", "tfapply-r2", "r2"));
        index.observe(&owned_job("other", "tfapply-r1", "r1"));

        assert_eq!(
            index.owned_by(&ObjectKey::new("infra", "r1")),
            vec![ObjectKey::new("infra", "tfapply-r1")]
        );
        assert_eq!(
            index.owned_by(&ObjectKey::new("other", "r1")),
            vec![ObjectKey::new("other", "tfapply-r1")]
        );
        assert!(index.owned_by(&ObjectKey::new("infra", "r3")).is_empty());
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn ignores_jobs_without_request_controller() {
        let index = OwnershipIndex::new();

        let mut foreign = owned_job("infra", "cronjob-x", "r1");
        for owner in foreign.metadata.owner_references.iter_mut().flatten() {
            owner.kind = "CronJob".into();
            owner.api_version = "batch/v1".into();
        }
        index.observe(&foreign);

        let mut orphan = Job::default();
        orphan.metadata.name = Some("loose".into());
        orphan.metadata.namespace = Some("infra".into());
        index.observe(&orphan);

        assert!(index.is_empty());
    }

    #[test]
    fn forget_and_rebuild_keep_index_consistent() {
        let index = OwnershipIndex::new();
        let first = owned_job("infra", "tfapply-r1", "r1");
        let second = owned_job("infra", "tfapply-r2", "r2");
        index.observe(&first);
        index.observe(&second);

        index.forget(&first);
        assert!(index.owned_by(&ObjectKey::new("infra", "r1")).is_empty());
        assert_eq!(index.len(), 1);

        index.rebuild([&first]);
        assert_eq!(index.len(), 1);
        assert!(index.owned_by(&ObjectKey::new("infra", "r2")).is_empty());
        assert_eq!(index.owned_by(&ObjectKey::new("infra", "r1")).len(), 1);
    }

    #[test]
    fn observe_moves_job_when_controller_changes() {
        let index = OwnershipIndex::new();
        index.observe(&owned_job("infra", "tfapply-shared", "r1"));
        index.observe(&owned_job("infra", "tfapply-shared", "r2"));

        assert!(index.owned_by(&ObjectKey::new("infra", "r1")).is_empty());
        assert_eq!(index.owned_by(&ObjectKey::new("infra", "r2")).len(), 1);
    }
}
