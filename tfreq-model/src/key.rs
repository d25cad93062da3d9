use std::fmt;

use kube::ResourceExt;
use serde::{Deserialize, Serialize};

/// Namespace-qualified identity of a namespaced API object.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an object as observed through the API. Objects read back from a
    /// namespaced endpoint always carry a namespace; a missing one maps to the
    /// empty string rather than guessing `default`.
    pub fn of<K: ResourceExt>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }

    /// Another object living in the same namespace.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(self.namespace.clone(), name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::Job;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn key_of_object_uses_metadata() {
        let job = Job {
            metadata: ObjectMeta {
                name: Some("tfapply-r1".into()),
                namespace: Some("infra".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let key = ObjectKey::of(&job);
        assert_eq!(key, ObjectKey::new("infra", "tfapply-r1"));
        assert_eq!(key.to_string(), "infra/tfapply-r1");
        assert_eq!(key.sibling("r1-cm"), ObjectKey::new("infra", "r1-cm"));
    }
}
