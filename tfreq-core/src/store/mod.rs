//! The seam between the reconciler and the cluster's object store.

mod memory;

pub use memory::InMemoryClusterStore;

use async_trait::async_trait;
use k8s_openapi::api::{batch::v1::Job, core::v1::ConfigMap};
use tfreq_model::{ObjectKey, TerraformRequest, TerraformRequestStatus};

#[cfg(test)]
use mockall::automock;

use crate::error::Result;

/// Result of a create-if-absent call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Creation {
    Created,
    AlreadyExists,
}

/// Reads and writes the reconciler performs against the object store.
///
/// Every call is a suspension point. Implementations report a missing object
/// as `Ok(None)` and a name collision on create as `Creation::AlreadyExists`;
/// everything else that goes wrong is an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fresh read of a request, never served from a stale cache.
    async fn get_request(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<TerraformRequest>>;

    async fn create_config_map(
        &self,
        config_map: &ConfigMap,
    ) -> Result<Creation>;

    async fn create_job(&self, job: &Job) -> Result<Creation>;

    /// Reads a job named by the ownership index.
    async fn get_job(&self, key: &ObjectKey) -> Result<Option<Job>>;

    /// Persists the status subresource of a request.
    async fn update_status(
        &self,
        key: &ObjectKey,
        status: &TerraformRequestStatus,
    ) -> Result<()>;
}
