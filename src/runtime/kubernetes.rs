//! Kubernetes-backed workload runtime
//!
//! The agent service is a single-replica Deployment. The spec it was built
//! from is kept in an annotation and the unit status lands in a ConfigMap
//! next to the Deployment.
//!
//! Restarts bump the pod template's `restartedAt` annotation. An apply
//! carries a fresh stamp in the same patch, so its rollout is the restart
//! and the restart that follows it does not patch again.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::WorkloadRuntime;
use crate::controller::conditions::{apply_unit_status, Condition};
use crate::controller::resources::{self, WorkloadSpec};
use crate::controller::status::UnitStatus;
use crate::error::{Error, Result};

pub const FIELD_MANAGER: &str = "jenkins-agent-operator";

pub struct KubeRuntime {
    client: Client,
    namespace: String,
    unit_name: String,
    conditions: Mutex<Vec<Condition>>,
    /// Deployment rolled by the last apply and not yet claimed by a restart
    rolled_by_apply: Mutex<Option<String>>,
}

impl KubeRuntime {
    pub fn new(client: Client, namespace: impl Into<String>, unit_name: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            unit_name: unit_name.into(),
            conditions: Mutex::new(Vec::new()),
            rolled_by_apply: Mutex::new(None),
        }
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn deployment_name(&self) -> String {
        resources::deployment_name(&self.unit_name)
    }

    fn status_config_map_name(&self) -> String {
        format!("{}-status", self.deployment_name())
    }
}

/// Map API rejections to apply failures; transport errors stay retriable
fn apply_error(what: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(resp) => Error::ApplyError(format!("{what}: {}", resp.message)),
        other => Error::KubeError(other),
    }
}

#[async_trait]
impl WorkloadRuntime for KubeRuntime {
    async fn is_ready(&self) -> bool {
        match self.client.apiserver_version().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Kubernetes API not reachable: {:?}", e);
                false
            }
        }
    }

    async fn applied_spec(&self) -> Result<Option<WorkloadSpec>> {
        let deployment = self.deployments().get_opt(&self.deployment_name()).await?;
        Ok(deployment.as_ref().and_then(resources::applied_spec))
    }

    #[instrument(skip(self, spec), fields(namespace = %self.namespace, unit = %self.unit_name))]
    async fn apply(&self, spec: &WorkloadSpec) -> Result<()> {
        let name = self.deployment_name();
        let mut deployment = resources::build_deployment(spec, &self.namespace, &self.unit_name)?;
        resources::stamp_restart(&mut deployment, &chrono::Utc::now().to_rfc3339());

        self.deployments()
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&deployment),
            )
            .await
            .map_err(|e| apply_error(&format!("applying Deployment {name}"), e))?;

        info!("Deployment {}/{} applied", self.namespace, name);
        *self.rolled_by_apply.lock().await = Some(name);
        Ok(())
    }

    async fn restart(&self, service: &str) -> Result<()> {
        let name = self.deployment_name();
        if self.rolled_by_apply.lock().await.take().as_deref() == Some(name.as_str()) {
            debug!("Service {} already restarted by its apply", service);
            return Ok(());
        }

        let patch = resources::restart_patch(&chrono::Utc::now().to_rfc3339());

        self.deployments()
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| apply_error(&format!("restarting {service}"), e))?;

        info!("Restarted service {} ({}/{})", service, self.namespace, name);
        Ok(())
    }

    async fn report_status(&self, status: &UnitStatus) -> Result<()> {
        let conditions = {
            let mut conditions = self.conditions.lock().await;
            apply_unit_status(&mut conditions, status);
            conditions.clone()
        };

        let name = self.status_config_map_name();
        let data = BTreeMap::from([
            ("status".to_string(), status.name().to_string()),
            ("message".to_string(), status.message().to_string()),
            ("conditions".to_string(), serde_json::to_string(&conditions)?),
        ]);
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(resources::standard_labels(&self.unit_name)),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };

        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&config_map),
        )
        .await?;

        debug!("Reported status {} to {}/{}", status, self.namespace, name);
        Ok(())
    }
}
