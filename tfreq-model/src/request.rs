use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::status::AppliedStatus;

/// Kind recorded on controller owner references that point at a request.
pub const OWNER_KIND: &str = "TerraformRequest";

/// Desired infrastructure change submitted by a user.
///
/// `spec` is read once, when the request is first launched. Edits made after
/// its job has been created are not re-processed.
#[derive(
    CustomResource,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[kube(
    group = "controlplane.io.controlplane.io",
    version = "v1",
    kind = "TerraformRequest",
    namespaced,
    status = "TerraformRequestStatus",
    shortname = "tfreq",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Applied","type":"string","jsonPath":".status.applied"}"#
)]
pub struct TerraformRequestSpec {
    /// Inline Terraform configuration, mounted into the unit as `main.tf`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub inline: String,
    /// Name of the secret whose keys are injected as provider credentials.
    #[serde(
        default,
        rename = "credentialSecretName",
        skip_serializing_if = "String::is_empty"
    )]
    pub credentials_secret_name: String,
    /// Terraform subcommand to run (`apply`, `plan`, `destroy`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operation: String,
}

/// Observed state, written only by the reconciler through the status
/// subresource.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct TerraformRequestStatus {
    #[serde(default)]
    pub applied: AppliedStatus,
}

impl TerraformRequest {
    /// Current status, treating a missing status block as `Unset`.
    pub fn applied_status(&self) -> AppliedStatus {
        self.status
            .as_ref()
            .map(|status| status.applied)
            .unwrap_or_default()
    }

    pub fn set_applied_status(&mut self, applied: AppliedStatus) {
        self.status
            .get_or_insert_with(TerraformRequestStatus::default)
            .applied = applied;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::{CustomResourceExt, Resource};

    #[test]
    fn crd_identity() {
        let crd = TerraformRequest::crd();
        assert_eq!(
            crd.metadata.name.as_deref(),
            Some("terraformrequests.controlplane.io.controlplane.io")
        );
        assert_eq!(crd.spec.names.kind, OWNER_KIND);
        assert_eq!(
            TerraformRequest::api_version(&()),
            "controlplane.io.controlplane.io/v1"
        );
    }

    #[test]
    fn decodes_object_without_status() {
        let raw = serde_json::json!({
            "apiVersion": "controlplane.io.controlplane.io/v1",
            "kind": "TerraformRequest",
            "metadata": { "name": "r1", "namespace": "default" },
            "spec": {
                "inline": "resource \"null_resource\" \"x\" {}",
                "credentialSecretName": "aws-creds",
                "operation": "apply"
            }
        });

        let request: TerraformRequest =
            serde_json::from_value(raw).expect("decode request");
        assert_eq!(request.spec.credentials_secret_name, "aws-creds");
        assert_eq!(request.applied_status(), AppliedStatus::Unset);
    }

    #[test]
    fn set_status_creates_block() {
        let mut request =
            TerraformRequest::new("r1", TerraformRequestSpec::default());
        request.set_applied_status(AppliedStatus::Running);

        assert_eq!(request.applied_status(), AppliedStatus::Running);
        let encoded = serde_json::to_value(&request.status).unwrap();
        assert_eq!(encoded, serde_json::json!({ "applied": "Running" }));
    }
}
