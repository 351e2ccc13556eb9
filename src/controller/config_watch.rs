//! Watch the static configuration ConfigMap
//!
//! Every applied version of the ConfigMap becomes a `config-changed` event
//! for the unit dispatcher.

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, ResourceExt};
use tracing::{info, instrument, warn};

use crate::config::StaticConfig;
use crate::error::Result;

use super::dispatcher::UnitHandle;
use super::unit::UnitEvent;

pub fn config_from_config_map(config_map: &ConfigMap) -> StaticConfig {
    config_map
        .data
        .as_ref()
        .map(StaticConfig::from_config_map_data)
        .unwrap_or_default()
}

/// Forward ConfigMap changes to the unit until the dispatcher goes away
#[instrument(skip(client, handle))]
pub async fn watch_static_config(
    client: Client,
    namespace: &str,
    name: &str,
    handle: UnitHandle,
) -> Result<()> {
    let api: Api<ConfigMap> = Api::namespaced(client, namespace);
    let config = watcher::Config::default().fields(&format!("metadata.name={name}"));

    info!("Watching ConfigMap {}/{} for configuration", namespace, name);

    let mut stream = watcher(api, config)
        .default_backoff()
        .applied_objects()
        .boxed();

    loop {
        match stream.try_next().await {
            Ok(Some(config_map)) => {
                info!("ConfigMap {} changed", config_map.name_any());
                handle
                    .send(UnitEvent::ConfigChanged {
                        config: Some(config_from_config_map(&config_map)),
                    })
                    .await?;
            }
            Ok(None) => return Ok(()),
            Err(e) => warn!("ConfigMap watch error: {:?}", e),
        }
    }
}
