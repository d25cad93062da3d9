//! Shared API object types for the TerraformRequest operator.
//!
//! The operator and its core library agree on these types: the
//! `TerraformRequest` custom resource, its observed `AppliedStatus`, and the
//! namespace-qualified `ObjectKey` used to address any namespaced object.

pub mod key;
pub mod request;
pub mod status;

pub use key::ObjectKey;
pub use request::{
    OWNER_KIND, TerraformRequest, TerraformRequestSpec, TerraformRequestStatus,
};
pub use status::AppliedStatus;
