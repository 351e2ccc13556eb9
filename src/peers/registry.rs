//! Registry of peers discovered over the peer bus
//!
//! Each announcing unit gets a stable identity derived from its unit name.
//! Identities are unique within the registry and survive re-announcements,
//! so a reconnecting peer keeps the name it was first given.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Separator used by the peer bus inside unit names (`app/0`)
pub const UNIT_SEPARATOR: char = '/';

/// A single discovered peer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEntry {
    pub identity: String,
    pub token: String,
    pub source_unit: String,
}

/// Outcome of a successful registration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub identity: String,
    /// True when the source unit had not registered before
    pub is_new: bool,
    /// True when the registry contents changed (new entry, token or url)
    pub changed: bool,
}

/// Process-wide peer state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRegistry {
    entries: Vec<PeerEntry>,
    jenkins_url: String,
}

/// Turn a peer-bus unit name into a base identity (`jenkins/0` -> `jenkins-0`)
pub fn normalize_unit_name(unit: &str) -> String {
    unit.replace(UNIT_SEPARATOR, "-")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer announcement, or refresh the token of a known peer
    ///
    /// Announcements missing either the url or the secret are ignored and
    /// leave the registry untouched.
    pub fn register_or_update(
        &mut self,
        source_unit: &str,
        url: Option<&str>,
        secret: Option<&str>,
    ) -> Option<Registration> {
        let Some(url) = non_empty(url) else {
            warn!("Ignoring announcement from {}: empty url", source_unit);
            return None;
        };
        let Some(secret) = non_empty(secret) else {
            warn!("Ignoring announcement from {}: empty secret", source_unit);
            return None;
        };

        let url_changed = self.jenkins_url != url;
        self.jenkins_url = url.to_string();

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.source_unit == source_unit)
        {
            let token_changed = entry.token != secret;
            if token_changed {
                debug!("Replacing token for peer {}", entry.identity);
                entry.token = secret.to_string();
            }
            return Some(Registration {
                identity: entry.identity.clone(),
                is_new: false,
                changed: token_changed || url_changed,
            });
        }

        let identity = self.next_identity(&normalize_unit_name(source_unit));
        info!("Registered peer {} as {}", source_unit, identity);
        self.entries.push(PeerEntry {
            identity: identity.clone(),
            token: secret.to_string(),
            source_unit: source_unit.to_string(),
        });

        Some(Registration {
            identity,
            is_new: true,
            changed: true,
        })
    }

    /// Drop a departed peer; remaining identities are left as they are
    pub fn remove(&mut self, source_unit: &str) -> Option<PeerEntry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.source_unit == source_unit)?;
        let entry = self.entries.remove(pos);
        info!("Removed peer {} ({})", entry.source_unit, entry.identity);
        if self.entries.is_empty() {
            self.jenkins_url.clear();
        }
        Some(entry)
    }

    pub fn entries(&self) -> &[PeerEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_url(&self) -> &str {
        &self.jenkins_url
    }

    /// `base-<n>` where n is one past the highest suffix already used for `base`
    fn next_identity(&self, base: &str) -> String {
        let prefix = format!("{base}-");
        let next = self
            .entries
            .iter()
            .filter_map(|e| e.identity.strip_prefix(&prefix))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max()
            .map_or(0, |max| max + 1);
        format!("{base}-{next}")
    }
}
