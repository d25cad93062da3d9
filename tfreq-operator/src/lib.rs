//! Cluster-facing half of the TerraformRequest operator.
//!
//! The reconcile decisions live in `tfreq-core`; this crate binds them to the
//! API server: a kube-backed [`ClusterStore`](tfreq_core::ClusterStore), the
//! job feed that keeps the ownership index current, and the controller loop.

pub mod infra;
