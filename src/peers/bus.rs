//! Peer bus data exchanged with related units
//!
//! The transport itself belongs to the host. This module only defines the
//! shape of the data this unit reads and publishes, plus the [`PeerBus`]
//! seam used to hand outward announcements to the host.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::Result;

/// Name of the relation the agent is related to Jenkins on
pub const RELATION_NAME: &str = "slave";

/// Inward key carrying the Jenkins endpoint
pub const KEY_URL: &str = "url";
/// Inward key carrying the agent secret
pub const KEY_SECRET: &str = "secret";

/// Key/value data published by one unit on the relation
pub type RelationData = BTreeMap<String, String>;

/// What this unit advertises to Jenkins when a peer joins
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAnnouncement {
    pub executors: String,
    pub labels: String,
    pub slavehost: String,
}

impl AgentAnnouncement {
    pub fn to_relation_data(&self) -> RelationData {
        let mut data = RelationData::new();
        data.insert("executors".to_string(), self.executors.clone());
        data.insert("labels".to_string(), self.labels.clone());
        data.insert("slavehost".to_string(), self.slavehost.clone());
        data
    }
}

/// Outward side of the peer bus
#[async_trait]
pub trait PeerBus: Send + Sync {
    /// Publish this unit's data for the given remote unit to read
    async fn publish(&self, remote_unit: &str, announcement: &AgentAnnouncement) -> Result<()>;
}

#[derive(Serialize)]
struct PublishLine<'a> {
    relation: &'a str,
    remote_unit: &'a str,
    data: RelationData,
}

/// Writes announcements as JSON lines for the host to forward
pub struct JsonLinesPeerBus<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesPeerBus<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> PeerBus for JsonLinesPeerBus<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn publish(&self, remote_unit: &str, announcement: &AgentAnnouncement) -> Result<()> {
        let line = PublishLine {
            relation: RELATION_NAME,
            remote_unit,
            data: announcement.to_relation_data(),
        };
        let mut encoded = serde_json::to_vec(&line)?;
        encoded.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&encoded).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement() -> AgentAnnouncement {
        AgentAnnouncement {
            executors: "8".to_string(),
            labels: "x86_64".to_string(),
            slavehost: "jenkins-agent-k8s-0".to_string(),
        }
    }

    #[test]
    fn test_relation_data_keys() {
        let data = announcement().to_relation_data();
        assert_eq!(data.len(), 3);
        assert_eq!(data["executors"], "8");
        assert_eq!(data["labels"], "x86_64");
        assert_eq!(data["slavehost"], "jenkins-agent-k8s-0");
    }

    #[tokio::test]
    async fn test_json_lines_publish() {
        let bus = JsonLinesPeerBus::new(Vec::new());
        bus.publish("jenkins/0", &announcement()).await.unwrap();
        bus.publish("jenkins/1", &announcement()).await.unwrap();

        let out = String::from_utf8(bus.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["relation"], "slave");
        assert_eq!(first["remote_unit"], "jenkins/0");
        assert_eq!(first["data"]["executors"], "8");
    }
}
