use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, ObjectFieldSelector, Pod, PodSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ClusterConfig;

/// Service name the update sidecar is reachable under inside the cluster.
const UPDATE_SIDECAR_HOST: &str = "update-sidecar";

/// Port the update sidecar listens on.
const UPDATE_SIDECAR_PORT: u16 = 80;

/// Seconds the update entrypoint sleeps between sidecar reachability probes.
const SIDECAR_POLL_INTERVAL_SECS: u32 = 1;

/// Env entry in the control pod template carrying the cluster version.
const VERSION_ENV_VAR: &str = "ORCHEST_VERSION";

/// Image name of the control CLI.
const CTL_IMAGE_NAME: &str = "orchest-ctl";

/// Image name of the update sidecar.
const UPDATE_SIDECAR_IMAGE_NAME: &str = "update-sidecar";

/// Name prefix of generated control pods.
const CTL_POD_NAME_PREFIX: &str = "orchest-ctl";

/// Control command a generated pod executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Update the cluster to the target version, gated on the update
    /// sidecar becoming reachable.
    Update,
    /// Restart the cluster, no readiness gate.
    Restart,
}

impl CommandKind {
    /// Value of the `command` label stamped on generated pods.
    pub fn label(&self) -> &'static str {
        match self {
            CommandKind::Update => "update",
            CommandKind::Restart => "restart",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Errors emitted while building pod manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The base template file could not be read.
    #[error("failed to read the pod template at {path}: {source}")]
    TemplateRead {
        path: String,
        source: std::io::Error,
    },

    /// The base template file is not a valid pod manifest.
    #[error("failed to parse the pod template: {0}")]
    TemplateParse(#[from] serde_yaml::Error),

    /// The template does not declare exactly one container.
    #[error("the pod template must declare exactly one container, found {0}")]
    ContainerCount(usize),
}

/// Builds the pod manifests the control plane submits to the cluster.
///
/// The builder only produces declarative descriptions; scheduling, the
/// sidecar readiness polling and the restart sequencing are performed by the
/// cluster and the shell loop embedded in the generated pod.
pub struct PodManifestBuilder {
    cluster: ClusterConfig,
}

impl PodManifestBuilder {
    pub fn new(cluster: ClusterConfig) -> PodManifestBuilder {
        PodManifestBuilder { cluster }
    }

    /// Builds the control pod manifest for the given command.
    ///
    /// Loads the base template, stamps the version and command labels, sets
    /// the versioned control image, overwrites the version env entry when
    /// present, and assigns a unique name in place of `generateName` so the
    /// pod name is known before creation.
    pub fn build_ctl_pod(&self, command: CommandKind) -> Result<Pod, ManifestError> {
        let path = &self.cluster.ctl_pod_template_path;
        let template = fs::read_to_string(path).map_err(|source| ManifestError::TemplateRead {
            path: path.clone(),
            source,
        })?;
        let mut pod: Pod = serde_yaml::from_str(&template)?;

        let labels = pod.metadata.labels.get_or_insert_with(BTreeMap::new);
        labels.insert("version".to_owned(), self.cluster.version.clone());
        labels.insert("command".to_owned(), command.label().to_owned());

        // The name is assigned here instead of letting the API server
        // generate one, so callers know it before the pod exists.
        pod.metadata.generate_name = None;
        pod.metadata.name = Some(format!("{CTL_POD_NAME_PREFIX}-{}", Uuid::new_v4()));

        let spec = pod.spec.as_mut().ok_or(ManifestError::ContainerCount(0))?;
        if spec.containers.len() != 1 {
            return Err(ManifestError::ContainerCount(spec.containers.len()));
        }
        let container = &mut spec.containers[0];

        container.image = Some(self.cluster.versioned_image(CTL_IMAGE_NAME));

        // The template is assumed to carry the version env entry; a template
        // without it is left as is.
        if let Some(env) = container.env.as_mut()
            && let Some(var) = env.iter_mut().find(|var| var.name == VERSION_ENV_VAR)
        {
            var.value = Some(self.cluster.version.clone());
        }

        container.command = Some(vec!["/bin/bash".to_owned(), "-c".to_owned()]);
        container.args = Some(vec![match command {
            // The update must not start before the sidecar is reachable,
            // otherwise its completion signal would be lost.
            CommandKind::Update => format!(
                "while true; do nc -zvw1 {UPDATE_SIDECAR_HOST} {UPDATE_SIDECAR_PORT} \
                 > /dev/null 2>&1 && orchest update && break; \
                 sleep {SIDECAR_POLL_INTERVAL_SECS}; done"
            ),
            CommandKind::Restart => "orchest restart".to_owned(),
        }]);

        Ok(pod)
    }

    /// Builds the short-lived update sidecar pod manifest.
    ///
    /// The sidecar carries the communication token and the name of the
    /// update pod it reports on. It is never restarted by the cluster;
    /// retries, if any, happen inside the update workload itself.
    pub fn build_update_sidecar_pod(&self, update_pod_name: &str, token: &str) -> Pod {
        let labels = BTreeMap::from([
            ("app".to_owned(), UPDATE_SIDECAR_IMAGE_NAME.to_owned()),
            (
                "app.kubernetes.io/name".to_owned(),
                UPDATE_SIDECAR_IMAGE_NAME.to_owned(),
            ),
            (
                "app.kubernetes.io/part-of".to_owned(),
                "orchestra".to_owned(),
            ),
        ]);

        let env = vec![
            EnvVar {
                name: "POD_NAME".to_owned(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "metadata.name".to_owned(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            EnvVar {
                name: "UPDATE_POD_NAME".to_owned(),
                value: Some(update_pod_name.to_owned()),
                ..Default::default()
            },
            EnvVar {
                name: "TOKEN".to_owned(),
                value: Some(token.to_owned()),
                ..Default::default()
            },
        ];

        Pod {
            metadata: ObjectMeta {
                generate_name: Some(format!("{UPDATE_SIDECAR_IMAGE_NAME}-")),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: UPDATE_SIDECAR_IMAGE_NAME.to_owned(),
                    image: Some(self.cluster.versioned_image(UPDATE_SIDECAR_IMAGE_NAME)),
                    image_pull_policy: Some("IfNotPresent".to_owned()),
                    env: Some(env),
                    ..Default::default()
                }],
                restart_policy: Some("Never".to_owned()),
                termination_grace_period_seconds: Some(1),
                service_account: Some(self.cluster.service_account.clone()),
                service_account_name: Some(self.cluster.service_account.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cluster_config() -> ClusterConfig {
        ClusterConfig {
            name: "cluster-1".to_owned(),
            namespace: "orchestra".to_owned(),
            version: "v1.4.2".to_owned(),
            registry: "orchest".to_owned(),
            ctl_pod_template_path: concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/manifests/orchest-ctl-pod.yaml"
            )
            .to_owned(),
            service_account: "orchestra-api".to_owned(),
            image_builder_image: "orchest/image-builder:v1.4.2".to_owned(),
            jupyter_server_image: "orchest/jupyter-server:v1.4.2".to_owned(),
        }
    }

    fn single_container(pod: &Pod) -> &Container {
        let containers = &pod.spec.as_ref().expect("pod should have a spec").containers;
        assert_eq!(containers.len(), 1);
        &containers[0]
    }

    #[test]
    fn update_pod_polls_the_sidecar_before_updating() {
        let builder = PodManifestBuilder::new(test_cluster_config());

        let pod = builder
            .build_ctl_pod(CommandKind::Update)
            .expect("build should succeed");

        let container = single_container(&pod);
        let args = container.args.as_ref().expect("args should be set");
        assert_eq!(args.len(), 1);
        assert!(args[0].contains("nc -zvw1 update-sidecar 80"));
        assert!(args[0].contains("orchest update"));
        assert!(args[0].contains("sleep 1"));
        assert_eq!(
            container.command,
            Some(vec!["/bin/bash".to_owned(), "-c".to_owned()])
        );
    }

    #[test]
    fn restart_pod_has_no_readiness_gate() {
        let builder = PodManifestBuilder::new(test_cluster_config());

        let pod = builder
            .build_ctl_pod(CommandKind::Restart)
            .expect("build should succeed");

        let args = single_container(&pod).args.as_ref().expect("args");
        assert_eq!(args, &vec!["orchest restart".to_owned()]);
    }

    #[test]
    fn ctl_pod_is_stamped_with_version_and_command_labels() {
        let builder = PodManifestBuilder::new(test_cluster_config());

        let pod = builder
            .build_ctl_pod(CommandKind::Update)
            .expect("build should succeed");

        let labels = pod.metadata.labels.as_ref().expect("labels");
        assert_eq!(labels.get("version"), Some(&"v1.4.2".to_owned()));
        assert_eq!(labels.get("command"), Some(&"update".to_owned()));
    }

    #[test]
    fn ctl_pod_image_and_version_env_follow_the_cluster_config() {
        let builder = PodManifestBuilder::new(test_cluster_config());

        let pod = builder
            .build_ctl_pod(CommandKind::Restart)
            .expect("build should succeed");

        let container = single_container(&pod);
        assert_eq!(
            container.image,
            Some("orchest/orchest-ctl:v1.4.2".to_owned())
        );

        let env = container.env.as_ref().expect("env");
        let version_var = env
            .iter()
            .find(|var| var.name == VERSION_ENV_VAR)
            .expect("version env entry");
        assert_eq!(version_var.value, Some("v1.4.2".to_owned()));
    }

    #[test]
    fn ctl_pod_name_is_assigned_and_unique() {
        let builder = PodManifestBuilder::new(test_cluster_config());

        let first = builder
            .build_ctl_pod(CommandKind::Update)
            .expect("build should succeed");
        let second = builder
            .build_ctl_pod(CommandKind::Update)
            .expect("build should succeed");

        assert!(first.metadata.generate_name.is_none());
        let first_name = first.metadata.name.expect("name");
        let second_name = second.metadata.name.expect("name");
        assert!(first_name.starts_with("orchest-ctl-"));
        assert_ne!(first_name, second_name);
    }

    #[test]
    fn sidecar_pod_carries_token_and_update_pod_reference() {
        let builder = PodManifestBuilder::new(test_cluster_config());

        let pod = builder.build_update_sidecar_pod("orchest-ctl-abc", "secret-token");

        assert_eq!(
            pod.metadata.generate_name,
            Some("update-sidecar-".to_owned())
        );

        let spec = pod.spec.as_ref().expect("spec");
        assert_eq!(spec.restart_policy, Some("Never".to_owned()));
        assert_eq!(spec.termination_grace_period_seconds, Some(1));

        let env = single_container(&pod).env.as_ref().expect("env");
        let value_of = |name: &str| {
            env.iter()
                .find(|var| var.name == name)
                .and_then(|var| var.value.clone())
        };
        assert_eq!(value_of("UPDATE_POD_NAME"), Some("orchest-ctl-abc".to_owned()));
        assert_eq!(value_of("TOKEN"), Some("secret-token".to_owned()));

        let pod_name_var = env
            .iter()
            .find(|var| var.name == "POD_NAME")
            .expect("POD_NAME env entry");
        let field_path = pod_name_var
            .value_from
            .as_ref()
            .and_then(|src| src.field_ref.as_ref())
            .map(|field_ref| field_ref.field_path.clone());
        assert_eq!(field_path, Some("metadata.name".to_owned()));
    }

    #[test]
    fn missing_template_is_reported_with_its_path() {
        let mut config = test_cluster_config();
        config.ctl_pod_template_path = "/nonexistent/pod.yaml".to_owned();
        let builder = PodManifestBuilder::new(config);

        let err = builder
            .build_ctl_pod(CommandKind::Update)
            .expect_err("build should fail");

        assert!(err.to_string().contains("/nonexistent/pod.yaml"));
    }
}
