use std::collections::BTreeMap;

use k8s_openapi::api::{
    batch::v1::{Job, JobSpec},
    core::v1::{
        ConfigMap, ConfigMapVolumeSource, Container, EmptyDirVolumeSource,
        EnvFromSource, EnvVar, KeyToPath, PodSpec, PodTemplateSpec,
        SecretEnvSource, Volume, VolumeMount,
    },
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use tfreq_model::TerraformRequest;

use super::operation::TerraformOperation;

pub const JOB_NAME_PREFIX: &str = "tfapply-";
pub const CONFIG_MAP_SUFFIX: &str = "-cm";

/// Config map key holding the inline configuration.
pub const CODE_KEY: &str = "code";
/// File name the execution image expects the configuration under.
pub const CODE_FILE_NAME: &str = "main.tf";
pub const CODE_MOUNT_PATH: &str = "/terraform";
pub const WORKDIR_MOUNT_PATH: &str = "/opt/work";
pub const OWNER_ANNOTATION: &str = "controlplane.io/owner";

const CODE_VOLUME: &str = "code";
const WORKDIR_VOLUME: &str = "workdir";
const TF_DATA_DIR: &str = "/tmp";

pub const DEFAULT_IMAGE_REPOSITORY: &str = "hashicorp/terraform";
pub const DEFAULT_IMAGE_TAG: &str = "1.9.6";

/// Execution image settings shared by every job the operator launches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobTemplate {
    pub image_repository: String,
    pub image_tag: String,
}

impl Default for JobTemplate {
    fn default() -> Self {
        Self {
            image_repository: DEFAULT_IMAGE_REPOSITORY.to_string(),
            image_tag: DEFAULT_IMAGE_TAG.to_string(),
        }
    }
}

impl JobTemplate {
    pub fn image(&self) -> String {
        format!("{}:{}", self.image_repository, self.image_tag)
    }
}

/// The pair of child objects derived from one request.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionPlan {
    pub config_map: ConfigMap,
    pub job: Job,
}

pub fn job_name(request_name: &str) -> String {
    format!("{JOB_NAME_PREFIX}{request_name}")
}

pub fn config_map_name(request_name: &str) -> String {
    format!("{request_name}{CONFIG_MAP_SUFFIX}")
}

/// Shell pipeline run by the job: stage the mounted source into the writable
/// work directory, initialise providers, then run the operation.
pub fn command_line(operation: TerraformOperation) -> String {
    format!(
        "cp {CODE_MOUNT_PATH}/* {WORKDIR_MOUNT_PATH} && cd {WORKDIR_MOUNT_PATH} && terraform init && terraform {operation}"
    )
}

/// Builds the config map and job for `request`.
///
/// Pure: no store access, and the same request always yields the same
/// objects. Names derive from the request name only, so a second build for an
/// unchanged request targets the objects the first one created. Owner
/// references are left for the caller to attach.
pub fn build_execution(
    request: &TerraformRequest,
    operation: TerraformOperation,
    template: &JobTemplate,
) -> ExecutionPlan {
    let request_name = request.name_any();
    let namespace = request.namespace();
    let config_map_name = config_map_name(&request_name);
    let job_name = job_name(&request_name);

    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name.clone()),
            namespace: namespace.clone(),
            annotations: Some(BTreeMap::from([(
                OWNER_ANNOTATION.to_string(),
                request_name.clone(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            CODE_KEY.to_string(),
            request.spec.inline.clone(),
        )])),
        ..Default::default()
    };

    let container = Container {
        name: job_name.clone(),
        image: Some(template.image()),
        command: Some(vec!["/bin/sh".to_string()]),
        args: Some(vec!["-c".to_string(), command_line(operation)]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: CODE_VOLUME.to_string(),
                mount_path: CODE_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
            VolumeMount {
                name: WORKDIR_VOLUME.to_string(),
                mount_path: WORKDIR_MOUNT_PATH.to_string(),
                ..Default::default()
            },
        ]),
        env: Some(vec![EnvVar {
            name: "TF_DATA_DIR".to_string(),
            value: Some(TF_DATA_DIR.to_string()),
            ..Default::default()
        }]),
        // An empty secret name is passed through; the pod then fails at
        // runtime and the job reports it.
        env_from: Some(vec![EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: request.spec.credentials_secret_name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let volumes = vec![
        Volume {
            name: CODE_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map_name,
                items: Some(vec![KeyToPath {
                    key: CODE_KEY.to_string(),
                    path: CODE_FILE_NAME.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: WORKDIR_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
    ];

    let job = Job {
        metadata: ObjectMeta {
            name: Some(job_name),
            namespace,
            ..Default::default()
        },
        spec: Some(JobSpec {
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(volumes),
                    restart_policy: Some("Never".to_string()),
                    ..Default::default()
                }),
            },
            backoff_limit: Some(0),
            ..Default::default()
        }),
        ..Default::default()
    };

    ExecutionPlan { config_map, job }
}
