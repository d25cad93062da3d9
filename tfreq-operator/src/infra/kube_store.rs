use std::fmt;

use async_trait::async_trait;
use k8s_openapi::{
    NamespaceResourceScope,
    api::{batch::v1::Job, core::v1::ConfigMap},
};
use kube::{
    Api, Client, Resource,
    api::{Patch, PatchParams, PostParams},
    runtime::reflector::{ObjectRef, Store},
};
use serde_json::json;
use tfreq_core::{ClusterStore, ControllerError, Creation, Result};
use tfreq_model::{ObjectKey, TerraformRequest, TerraformRequestStatus};

/// `ClusterStore` backed by the API server.
///
/// Requests are always read fresh so status decisions never act on a stale
/// copy. Jobs are read from the reflector cache fed by the job watch.
#[derive(Clone)]
pub struct KubeClusterStore {
    client: Client,
    jobs: Store<Job>,
    field_manager: String,
}

impl fmt::Debug for KubeClusterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClusterStore")
            .field("cached_jobs", &self.jobs.state().len())
            .field("field_manager", &self.field_manager)
            .finish()
    }
}

impl KubeClusterStore {
    pub fn new(
        client: Client,
        jobs: Store<Job>,
        field_manager: impl Into<String>,
    ) -> Self {
        Self {
            client,
            jobs,
            field_manager: field_manager.into(),
        }
    }

    async fn create_namespaced<K>(
        &self,
        operation: &'static str,
        object: &K,
    ) -> Result<Creation>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + fmt::Debug
            + serde::Serialize
            + serde::de::DeserializeOwned,
        K::DynamicType: Default,
    {
        let key = ObjectKey::of(object);
        let api: Api<K> = Api::namespaced(self.client.clone(), &key.namespace);
        creation_outcome(
            api.create(&PostParams::default(), object).await,
            operation,
            &key,
        )
    }
}

/// Maps a create response onto [`Creation`]. A conflict means an earlier pass
/// already created the object.
pub(crate) fn creation_outcome<T>(
    result: std::result::Result<T, kube::Error>,
    operation: &'static str,
    key: &ObjectKey,
) -> Result<Creation> {
    match result {
        Ok(_) => Ok(Creation::Created),
        Err(kube::Error::Api(response)) if response.code == 409 => {
            Ok(Creation::AlreadyExists)
        }
        Err(err) => Err(ControllerError::store(operation, key, err)),
    }
}

pub(crate) fn cached_job(jobs: &Store<Job>, key: &ObjectKey) -> Option<Job> {
    let reference = ObjectRef::<Job>::new(&key.name).within(&key.namespace);
    jobs.get(&reference).map(|job| job.as_ref().clone())
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get_request(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<TerraformRequest>> {
        let api: Api<TerraformRequest> =
            Api::namespaced(self.client.clone(), &key.namespace);
        api.get_opt(&key.name)
            .await
            .map_err(|err| ControllerError::store("get_request", key, err))
    }

    async fn create_config_map(
        &self,
        config_map: &ConfigMap,
    ) -> Result<Creation> {
        self.create_namespaced("create_config_map", config_map).await
    }

    async fn create_job(&self, job: &Job) -> Result<Creation> {
        self.create_namespaced("create_job", job).await
    }

    async fn get_job(&self, key: &ObjectKey) -> Result<Option<Job>> {
        Ok(cached_job(&self.jobs, key))
    }

    async fn update_status(
        &self,
        key: &ObjectKey,
        status: &TerraformRequestStatus,
    ) -> Result<()> {
        let api: Api<TerraformRequest> =
            Api::namespaced(self.client.clone(), &key.namespace);
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        let patch = json!({ "status": status });
        api.patch_status(&key.name, &params, &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(|err| ControllerError::store("update_status", key, err))
    }
}
