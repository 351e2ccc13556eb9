//! Workload specification builders
//!
//! [`build_workload_spec`] turns a resolved environment into the service
//! definition handed to the container runtime. The Kubernetes runtime then
//! renders that definition as a single-replica Deployment.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{Container, EnvVar, ExecAction, PodSpec, PodTemplateSpec, Probe};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::{Deserialize, Serialize};

use crate::config::StaticConfig;
use crate::controller::resolver::ResolvedEnvironment;
use crate::error::Result;

/// Name of the managed service and its container
pub const SERVICE_NAME: &str = "jenkins-agent";
pub const ENTRYPOINT: &str = "/entrypoint.sh";
/// File the agent entrypoint creates once every agent has connected
pub const READY_FILE: &str = "/var/lib/jenkins/agents/.ready";

pub const ENV_JENKINS_URL: &str = "JENKINS_URL";
pub const ENV_JENKINS_AGENTS: &str = "JENKINS_AGENTS";
pub const ENV_JENKINS_TOKENS: &str = "JENKINS_TOKENS";

/// Annotation holding the JSON of the spec a Deployment was applied from
pub const APPLIED_SPEC_ANNOTATION: &str = "jenkins.io/workload-spec";
/// Pod template annotation bumped to restart the agent
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCommand {
    pub command: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessProbe {
    pub exec: ExecCommand,
}

/// Declarative description of the agent service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub name: String,
    pub image: String,
    pub summary: String,
    pub command: String,
    pub startup: String,
    #[serde(rename = "override")]
    pub override_: String,
    pub env: BTreeMap<String, String>,
    pub readiness_probe: ReadinessProbe,
}

/// A named layer of services, the unit the runtime applies
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLayer {
    pub summary: String,
    pub description: String,
    pub services: BTreeMap<String, WorkloadSpec>,
}

impl WorkloadSpec {
    pub fn layer(&self) -> ServiceLayer {
        ServiceLayer {
            summary: "jenkins agent layer".to_string(),
            description: "Jenkins Agent layer".to_string(),
            services: BTreeMap::from([(self.name.clone(), self.clone())]),
        }
    }
}

pub fn build_workload_spec(resolved: &ResolvedEnvironment, config: &StaticConfig) -> WorkloadSpec {
    let env = BTreeMap::from([
        (ENV_JENKINS_URL.to_string(), resolved.jenkins_url.clone()),
        (ENV_JENKINS_AGENTS.to_string(), resolved.joined_agent_names()),
        (ENV_JENKINS_TOKENS.to_string(), resolved.joined_agent_tokens()),
    ]);

    WorkloadSpec {
        name: SERVICE_NAME.to_string(),
        image: config.image.clone(),
        summary: "Jenkins Agent service".to_string(),
        command: ENTRYPOINT.to_string(),
        startup: "enabled".to_string(),
        override_: "replace".to_string(),
        env,
        readiness_probe: ReadinessProbe {
            exec: ExecCommand {
                command: vec!["/bin/cat".to_string(), READY_FILE.to_string()],
            },
        },
    }
}

// ============================================================================
// Kubernetes rendering
// ============================================================================

/// Get the standard labels for the agent workload of a unit
pub fn standard_labels(unit_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        SERVICE_NAME.to_string(),
    );
    labels.insert(
        "app.kubernetes.io/instance".to_string(),
        crate::peers::normalize_unit_name(unit_name),
    );
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "jenkins-agent-operator".to_string(),
    );
    labels
}

pub fn build_container(spec: &WorkloadSpec) -> Container {
    let env = spec
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect();

    Container {
        name: spec.name.clone(),
        image: Some(spec.image.clone()),
        command: Some(vec![spec.command.clone()]),
        env: Some(env),
        readiness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(spec.readiness_probe.exec.command.clone()),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Render the spec as a single-replica Deployment
///
/// The spec itself is recorded in an annotation so the runtime can tell
/// later whether a freshly built spec differs from what was applied.
pub fn build_deployment(spec: &WorkloadSpec, namespace: &str, unit_name: &str) -> Result<Deployment> {
    let labels = standard_labels(unit_name);
    let annotations = BTreeMap::from([(
        APPLIED_SPEC_ANNOTATION.to_string(),
        serde_json::to_string(spec)?,
    )]);

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(deployment_name(unit_name)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            // One agent per unit; never run two with the same tokens
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![build_container(spec)],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Set the pod template's restart annotation, which rolls the pod on apply
pub fn stamp_restart(deployment: &mut Deployment, restarted_at: &str) {
    let Some(spec) = deployment.spec.as_mut() else {
        return;
    };
    spec.template
        .metadata
        .get_or_insert_with(ObjectMeta::default)
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(RESTARTED_AT_ANNOTATION.to_string(), restarted_at.to_string());
}

/// Merge patch that rolls the pod without changing the service definition
pub fn restart_patch(restarted_at: &str) -> serde_json::Value {
    serde_json::json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": {
                        (RESTARTED_AT_ANNOTATION): restarted_at
                    }
                }
            }
        }
    })
}

/// Name of the Deployment backing a unit's agent service
pub fn deployment_name(unit_name: &str) -> String {
    format!("{}-{}", SERVICE_NAME, crate::peers::normalize_unit_name(unit_name))
}

/// Recover the applied spec from a Deployment's annotation
pub fn applied_spec(deployment: &Deployment) -> Option<WorkloadSpec> {
    deployment
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(APPLIED_SPEC_ANNOTATION))
        .and_then(|raw| serde_json::from_str(raw).ok())
}
