use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use localshare_core::{ChannelHandle, FileMeta, PROGRESS_COMPLETE, PeerRecord};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use tracing::{debug, warn};

use crate::{
    config::{DEFAULT_MAX_PROGRESS_STEP, HostProfile, SimulationConfig},
    transport::{ChunkReport, DiscoveredPeer, Transport, TransportError},
};

pub const DESKTOP_NEIGHBOURS: &[(&str, &str)] = &[
    ("peer-abc123", "MacBook Pro"),
    ("peer-def456", "Windows Desktop"),
];
pub const MOBILE_NEIGHBOURS: &[(&str, &str)] = &[
    ("peer-ghi789", "Android Phone"),
    ("peer-jkl012", "iPhone"),
];
pub const ARCHETYPES: &[(&str, &str)] = &[
    ("peer-mno345", "iPad"),
    ("peer-pqr678", "Linux Workstation"),
    ("peer-stu901", "Android Tablet"),
    ("peer-vwx234", "Chromebook"),
];

#[derive(Debug)]
struct SimChannel {
    peer_id: String,
    size: u64,
    progress: f64,
}

#[derive(Debug)]
struct SimState {
    rng: StdRng,
    next_channel: u64,
    channels: HashMap<ChannelHandle, SimChannel>,
}

/// Backend that fabricates neighbours and delivers "chunks" by advancing a
/// random counter. Nothing leaves the process.
#[derive(Debug)]
pub struct SimulatedTransport {
    host: HostProfile,
    max_progress_step: f64,
    state: Mutex<SimState>,
}

impl SimulatedTransport {
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            host: config.host,
            max_progress_step: checked_progress_step(config.max_progress_step),
            state: Mutex::new(SimState {
                rng,
                next_channel: 1,
                channels: HashMap::new(),
            }),
        }
    }

    pub fn host(&self) -> HostProfile {
        self.host
    }

    pub fn max_progress_step(&self) -> f64 {
        self.max_progress_step
    }

    pub fn open_channels(&self) -> usize {
        self.state().channels.len()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fabricate_peers(&self) -> Vec<DiscoveredPeer> {
        let neighbours = match self.host {
            HostProfile::Desktop => DESKTOP_NEIGHBOURS,
            HostProfile::Mobile => MOBILE_NEIGHBOURS,
        };
        let mut found: Vec<DiscoveredPeer> = neighbours
            .iter()
            .map(|(id, name)| DiscoveredPeer::new(*id, *name))
            .collect();

        let mut state = self.state();
        if let Some((id, name)) = ARCHETYPES.choose(&mut state.rng) {
            found.push(DiscoveredPeer::new(*id, *name));
        }
        found
    }
}

/// Steps must be finite and in (0, 100] so every transfer can reach 100.
fn checked_progress_step(step: f64) -> f64 {
    if step.is_finite() && step > 0.0 && step <= PROGRESS_COMPLETE {
        step
    } else {
        warn!(
            requested = step,
            fallback = DEFAULT_MAX_PROGRESS_STEP,
            "invalid max progress step, using default"
        );
        DEFAULT_MAX_PROGRESS_STEP
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl Transport for SimulatedTransport {
    async fn discover_peers(&self) -> Result<Vec<DiscoveredPeer>, TransportError> {
        Ok(self.fabricate_peers())
    }

    async fn open_channel(
        &self,
        peer: &PeerRecord,
        file: &FileMeta,
    ) -> Result<ChannelHandle, TransportError> {
        let handle = {
            let mut state = self.state();
            let handle = ChannelHandle(state.next_channel);
            state.next_channel += 1;
            state.channels.insert(
                handle,
                SimChannel {
                    peer_id: peer.id.clone(),
                    size: file.size,
                    progress: 0.0,
                },
            );
            handle
        };
        debug!(channel = %handle, peer = %peer.id, file = %file.name, "simulated channel opened");
        Ok(handle)
    }

    async fn send_chunk(&self, channel: ChannelHandle) -> Result<ChunkReport, TransportError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let entry = state
            .channels
            .get_mut(&channel)
            .ok_or(TransportError::UnknownChannel(channel))?;

        let step = state.rng.random_range(0.0..self.max_progress_step);
        entry.progress = (entry.progress + step).min(PROGRESS_COMPLETE);
        let bytes_sent = (entry.size as f64 * entry.progress / PROGRESS_COMPLETE).round() as u64;

        Ok(ChunkReport {
            bytes_sent: bytes_sent.min(entry.size),
            progress: entry.progress,
        })
    }

    async fn close_channel(&self, channel: ChannelHandle) -> Result<(), TransportError> {
        let removed = self.state().channels.remove(&channel);
        match removed {
            Some(entry) => {
                debug!(channel = %channel, peer = %entry.peer_id, "simulated channel closed");
                Ok(())
            }
            None => Err(TransportError::UnknownChannel(channel)),
        }
    }
}
