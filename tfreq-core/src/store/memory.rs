use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::{
    batch::v1::{Job, JobStatus},
    core::v1::ConfigMap,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use tfreq_model::{ObjectKey, TerraformRequest, TerraformRequestStatus};
use tokio::sync::Mutex;

use super::{ClusterStore, Creation};
use crate::{
    error::{ControllerError, Result},
    ownership::OwnershipIndex,
    status::JobOutcome,
};

fn controlled_by(owners: &[OwnerReference], uid: &str) -> bool {
    owners
        .iter()
        .any(|owner| owner.controller == Some(true) && owner.uid == uid)
}

#[derive(Default)]
struct StoreState {
    requests: HashMap<ObjectKey, TerraformRequest>,
    config_maps: HashMap<ObjectKey, ConfigMap>,
    jobs: HashMap<ObjectKey, Job>,
    next_uid: u64,
}

/// Single-process object store with owner-reference garbage collection.
///
/// Job writes are pushed into the attached `OwnershipIndex` the way a watch
/// feed would, so the reconciler sees the same read-side projection it gets
/// in a cluster.
#[derive(Clone, Default)]
pub struct InMemoryClusterStore {
    state: Arc<Mutex<StoreState>>,
    index: OwnershipIndex,
}

impl fmt::Debug for InMemoryClusterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("InMemoryClusterStore");
        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("requests", &state.requests.len())
                    .field("config_maps", &state.config_maps.len())
                    .field("jobs", &state.jobs.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.field("index", &self.index).finish()
    }
}

impl InMemoryClusterStore {
    pub fn new(index: OwnershipIndex) -> Self {
        Self {
            state: Arc::default(),
            index,
        }
    }

    pub fn index(&self) -> &OwnershipIndex {
        &self.index
    }

    /// Stores a request the way the API server would on create, assigning a
    /// uid when the object has none.
    pub async fn insert_request(
        &self,
        mut request: TerraformRequest,
    ) -> ObjectKey {
        let mut state = self.state.lock().await;
        if request.metadata.uid.is_none() {
            state.next_uid += 1;
            request.metadata.uid = Some(format!("uid-{}", state.next_uid));
        }
        let key = ObjectKey::of(&request);
        state.requests.insert(key.clone(), request);
        key
    }

    pub async fn request(&self, key: &ObjectKey) -> Option<TerraformRequest> {
        self.state.lock().await.requests.get(key).cloned()
    }

    pub async fn config_map(&self, key: &ObjectKey) -> Option<ConfigMap> {
        self.state.lock().await.config_maps.get(key).cloned()
    }

    pub async fn job(&self, key: &ObjectKey) -> Option<Job> {
        self.state.lock().await.jobs.get(key).cloned()
    }

    pub async fn job_count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    pub async fn config_map_count(&self) -> usize {
        self.state.lock().await.config_maps.len()
    }

    /// Records pod counters on a job, as the job controller would.
    pub async fn set_job_outcome(
        &self,
        key: &ObjectKey,
        outcome: JobOutcome,
    ) -> bool {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(key) else {
            return false;
        };
        job.status = Some(JobStatus {
            active: Some(outcome.active),
            succeeded: Some(outcome.succeeded),
            failed: Some(outcome.failed),
            ..Default::default()
        });
        self.index.observe(job);
        true
    }

    /// Deletes a request and every object it controls.
    pub async fn delete_request(&self, key: &ObjectKey) -> bool {
        let mut state = self.state.lock().await;
        let Some(request) = state.requests.remove(key) else {
            return false;
        };
        let Some(uid) = request.metadata.uid else {
            return true;
        };

        state
            .config_maps
            .retain(|_, cm| !controlled_by(cm.owner_references(), &uid));

        let collected: Vec<ObjectKey> = state
            .jobs
            .iter()
            .filter(|(_, job)| controlled_by(job.owner_references(), &uid))
            .map(|(key, _)| key.clone())
            .collect();
        for job_key in collected {
            if let Some(job) = state.jobs.remove(&job_key) {
                self.index.forget(&job);
            }
        }
        true
    }
}

#[async_trait]
impl ClusterStore for InMemoryClusterStore {
    async fn get_request(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<TerraformRequest>> {
        Ok(self.state.lock().await.requests.get(key).cloned())
    }

    async fn create_config_map(
        &self,
        config_map: &ConfigMap,
    ) -> Result<Creation> {
        let key = ObjectKey::of(config_map);
        let mut state = self.state.lock().await;
        if state.config_maps.contains_key(&key) {
            return Ok(Creation::AlreadyExists);
        }
        state.config_maps.insert(key, config_map.clone());
        Ok(Creation::Created)
    }

    async fn create_job(&self, job: &Job) -> Result<Creation> {
        let key = ObjectKey::of(job);
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&key) {
            return Ok(Creation::AlreadyExists);
        }
        state.jobs.insert(key, job.clone());
        self.index.observe(job);
        Ok(Creation::Created)
    }

    async fn get_job(&self, key: &ObjectKey) -> Result<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(key).cloned())
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        status: &TerraformRequestStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let request = state.requests.get_mut(key).ok_or_else(|| {
            ControllerError::store("update status", key, "request not found")
        })?;
        request.status = Some(status.clone());
        Ok(())
    }
}
