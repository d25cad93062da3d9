//! Translation of a request's desired state into the two child objects that
//! carry it out: the config map holding the Terraform source and the
//! single-attempt job that runs it.

pub mod builder;
pub mod operation;

pub use builder::*;
pub use operation::*;
