pub mod controller;
pub mod job_feed;
pub mod kube_store;

pub use controller::{Context, error_policy, reconcile, requeue_action};
pub use job_feed::IndexFeed;
pub use kube_store::KubeClusterStore;
