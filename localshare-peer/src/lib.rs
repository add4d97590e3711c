//! Peer discovery and file-send management for LocalShare.
//!
//! [`PeerManager`] is the entry point: it owns the discovered peers, the local
//! identity and the timers behind discovery and transfers. The network side
//! sits behind [`Transport`]; [`SimulatedTransport`] is the in-process backend.

pub mod config;
pub mod listeners;
pub mod manager;
pub mod prefs;
pub mod simulated;
pub mod transport;

pub use config::{HostProfile, ManagerConfig, SimulationConfig};
pub use listeners::{ListenerId, ListenerRegistry};
pub use manager::{ManagerError, PeerManager};
pub use prefs::{
    JsonFilePreferences, LOCAL_NAME_KEY, MemoryPreferences, PreferenceStore, PrefsError,
};
pub use simulated::SimulatedTransport;
pub use transport::{ChunkReport, DiscoveredPeer, Transport, TransportError};
