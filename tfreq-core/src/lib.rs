//! # tfreq-core
//!
//! Reconciliation core for `TerraformRequest` objects.
//!
//! A request declares a Terraform change; the [`reconciler::Reconciler`]
//! turns it, exactly once, into a config map plus a single-attempt job, then
//! watches that job until the request's `applied` status reaches `Applied` or
//! `Failed`.
//!
//! - [`execution`]: pure builder for the child objects and the operation
//!   allow-list.
//! - [`status`]: outcome aggregation and forward-only status transitions.
//! - [`ownership`]: owner back-references and the owner -> job index.
//! - [`store`]: the object-store seam plus an in-memory implementation.
//! - [`reconciler`]: the convergence loop.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod error;
pub mod execution;
pub mod ownership;
pub mod reconciler;
pub mod status;
pub mod store;

pub use error::{ControllerError, Result};
pub use ownership::OwnershipIndex;
pub use reconciler::{Reconciler, ReconcilerSettings, Requeue};
pub use store::{ClusterStore, Creation, InMemoryClusterStore};
