//! Peer discovery state and peer bus data types

pub mod bus;
pub mod registry;

pub use bus::{AgentAnnouncement, JsonLinesPeerBus, PeerBus, RelationData, KEY_SECRET, KEY_URL};
pub use registry::{normalize_unit_name, PeerEntry, PeerRegistry, Registration};
