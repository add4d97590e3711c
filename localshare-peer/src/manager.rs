use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use localshare_core::{
    ChannelHandle, FileId, FileMeta, FileRef, LocalIdentity, PROGRESS_COMPLETE, PeerId, PeerRecord,
    TransferProgress, new_file_id,
};
use thiserror::Error;
use tokio::{
    sync::{RwLock, oneshot},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    config::{ManagerConfig, SimulationConfig},
    listeners::{Listener, ListenerId, ListenerRegistry},
    prefs::{LOCAL_NAME_KEY, PreferenceStore},
    simulated::SimulatedTransport,
    transport::{DiscoveredPeer, Transport, TransportError},
};

const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("peer not found: {0}")]
    PeerNotFound(PeerId),
    #[error("peer manager is already initialized")]
    AlreadyInitialized,
    #[error("transfer {0} was cancelled")]
    TransferCancelled(FileId),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug)]
struct PeerEntry {
    record: PeerRecord,
    order: u64,
    last_seen_cycle: u64,
}

#[derive(Debug)]
struct ActiveTransfer {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Debug)]
struct ManagerState {
    identity: LocalIdentity,
    peers: HashMap<PeerId, PeerEntry>,
    next_order: u64,
    cycle: u64,
    discovery: Option<JoinHandle<()>>,
    transfers: HashMap<FileId, ActiveTransfer>,
}

impl ManagerState {
    fn peer_snapshot(&self) -> Vec<PeerRecord> {
        let mut entries: Vec<&PeerEntry> = self.peers.values().collect();
        entries.sort_by_key(|entry| entry.order);
        entries.into_iter().map(|entry| entry.record.clone()).collect()
    }
}

struct Shared<T> {
    config: ManagerConfig,
    transport: T,
    prefs: Box<dyn PreferenceStore>,
    state: RwLock<ManagerState>,
    peer_listeners: ListenerRegistry<[PeerRecord]>,
    progress_listeners: ListenerRegistry<TransferProgress>,
}

/// Owns the discovered peers, the local identity and every timer driving
/// discovery and transfers.
///
/// Cloning is cheap and yields a handle to the same manager. Nothing runs
/// until [`PeerManager::initialize`]; [`PeerManager::destroy`] stops and joins
/// everything that was started.
pub struct PeerManager<T: Transport = SimulatedTransport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for PeerManager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> std::fmt::Debug for PeerManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerManager")
            .field("config", &self.shared.config)
            .field("peer_listeners", &self.shared.peer_listeners)
            .field("progress_listeners", &self.shared.progress_listeners)
            .finish_non_exhaustive()
    }
}

impl PeerManager<SimulatedTransport> {
    pub fn simulated(
        simulation: SimulationConfig,
        prefs: impl PreferenceStore + 'static,
        config: ManagerConfig,
    ) -> Self {
        Self::new(SimulatedTransport::new(simulation), prefs, config)
    }
}

impl<T: Transport> PeerManager<T> {
    pub fn new(transport: T, prefs: impl PreferenceStore + 'static, config: ManagerConfig) -> Self {
        let identity = LocalIdentity::generate();
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                prefs: Box::new(prefs),
                state: RwLock::new(ManagerState {
                    identity,
                    peers: HashMap::new(),
                    next_order: 0,
                    cycle: 0,
                    discovery: None,
                    transfers: HashMap::new(),
                }),
                peer_listeners: ListenerRegistry::new(),
                progress_listeners: ListenerRegistry::new(),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Loads the stored display name and starts the discovery cycle.
    ///
    /// Fails with [`ManagerError::AlreadyInitialized`] while a previous
    /// initialization has not been torn down; no second timer is started.
    pub async fn initialize(&self) -> Result<LocalIdentity, ManagerError> {
        let stored_name = self.load_stored_name().await;

        let mut state = self.shared.state.write().await;
        if state.discovery.is_some() {
            warn!("initialize called on a running peer manager");
            return Err(ManagerError::AlreadyInitialized);
        }

        if let Some(name) = stored_name {
            state.identity.name = name;
        }
        state.cycle = 0;
        state.discovery = Some(tokio::spawn(run_discovery(Arc::downgrade(&self.shared))));

        info!(
            peer_id = %state.identity.id,
            name = %state.identity.name,
            "peer manager initialized"
        );
        Ok(state.identity.clone())
    }

    pub async fn is_running(&self) -> bool {
        self.shared.state.read().await.discovery.is_some()
    }

    pub async fn local_identity(&self) -> LocalIdentity {
        self.shared.state.read().await.identity.clone()
    }

    /// Renames the local peer and persists the name. Blank names are ignored.
    pub async fn set_local_name(&self, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            debug!("ignoring blank local name");
            return;
        }

        self.shared.state.write().await.identity.name = name.to_owned();

        let shared = Arc::clone(&self.shared);
        let value = name.to_owned();
        match tokio::task::spawn_blocking(move || shared.prefs.store(LOCAL_NAME_KEY, &value)).await
        {
            Ok(Ok(())) => info!(name, "local name updated"),
            Ok(Err(err)) => warn!("failed to persist local name: {}", err),
            Err(err) => warn!("local name persistence task failed: {}", err),
        }
    }

    /// Current peers in discovery order.
    pub async fn peers(&self) -> Vec<PeerRecord> {
        self.shared.state.read().await.peer_snapshot()
    }

    pub async fn active_transfers(&self) -> usize {
        self.shared.state.read().await.transfers.len()
    }

    /// Registers a peer-set listener. It is called right away when peers are
    /// already known, then on every discovery cycle that changes the set.
    ///
    /// The first call happens under the state write lock, so no discovery
    /// cycle can deliver a newer set ahead of it.
    pub async fn subscribe_peers<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&[PeerRecord]) + Send + Sync + 'static,
    {
        let listener: Listener<[PeerRecord]> = Arc::new(listener);
        let state = self.shared.state.write().await;
        let id = self.shared.peer_listeners.add(Arc::clone(&listener));
        let snapshot = state.peer_snapshot();
        if !snapshot.is_empty() {
            listener(&snapshot);
        }
        id
    }

    pub fn unsubscribe_peers(&self, id: ListenerId) -> bool {
        self.shared.peer_listeners.remove(id)
    }

    pub fn subscribe_progress<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TransferProgress) + Send + Sync + 'static,
    {
        self.shared.progress_listeners.add(Arc::new(listener))
    }

    pub fn unsubscribe_progress(&self, id: ListenerId) -> bool {
        self.shared.progress_listeners.remove(id)
    }

    /// Sends `file` to a known peer and resolves once the transfer is over.
    ///
    /// An unknown `peer_id` fails immediately without emitting any progress.
    /// Otherwise progress listeners see non-decreasing in-flight records
    /// followed by exactly one terminal record for the new file id.
    pub async fn send_file(
        &self,
        peer_id: &str,
        file: FileRef,
    ) -> Result<TransferProgress, ManagerError> {
        let (meta, done) = {
            let mut state = self.shared.state.write().await;
            let Some(entry) = state.peers.get(peer_id) else {
                warn!(peer = peer_id, file = %file.name, "send rejected: unknown peer");
                return Err(ManagerError::PeerNotFound(peer_id.to_owned()));
            };
            let peer = entry.record.clone();
            let meta = FileMeta::for_file(new_file_id(), &file, &state.identity.id);
            let file_id = meta.id.clone();

            info!(
                file_id = %file_id,
                file = %meta.name,
                size = meta.size,
                peer = %peer.name,
                "starting transfer"
            );

            let (cancel_tx, cancel_rx) = oneshot::channel();
            let (done_tx, done_rx) = oneshot::channel();
            let task = tokio::spawn(run_transfer(
                Arc::clone(&self.shared),
                peer,
                meta.clone(),
                cancel_rx,
                done_tx,
            ));
            state.transfers.insert(
                file_id,
                ActiveTransfer {
                    cancel: cancel_tx,
                    task,
                },
            );
            (meta, done_rx)
        };

        match done.await {
            Ok(outcome) => outcome,
            Err(_) => {
                // the task died before reporting; it never emitted a terminal record
                warn!(file_id = %meta.id, "transfer task ended without a result");
                self.shared.state.write().await.transfers.remove(&meta.id);
                self.shared
                    .progress_listeners
                    .notify(&TransferProgress::failed(&meta, 0.0));
                Err(ManagerError::TransferCancelled(meta.id))
            }
        }
    }

    /// Stops discovery, cancels and joins in-flight transfers, closes open
    /// peer handles and forgets every peer. Safe to call repeatedly.
    pub async fn destroy(&self) {
        let (discovery, transfers, peers) = {
            let mut state = self.shared.state.write().await;
            let discovery = state.discovery.take();
            let transfers: Vec<ActiveTransfer> =
                state.transfers.drain().map(|(_, transfer)| transfer).collect();
            let peers: Vec<PeerRecord> =
                state.peers.drain().map(|(_, entry)| entry.record).collect();
            state.cycle = 0;
            (discovery, transfers, peers)
        };

        if discovery.is_none() && transfers.is_empty() && peers.is_empty() {
            debug!("destroy on idle peer manager");
            return;
        }

        if let Some(task) = discovery {
            task.abort();
            let _ = task.await;
        }

        let cancelled = transfers.len();
        let mut tasks = Vec::with_capacity(cancelled);
        for transfer in transfers {
            let _ = transfer.cancel.send(());
            tasks.push(transfer.task);
        }
        for task in tasks {
            if let Err(err) = task.await {
                warn!("transfer task ended abnormally: {}", err);
            }
        }

        for peer in &peers {
            if let Some(channel) = peer.channel
                && let Err(err) = self.shared.transport.close_channel(channel).await
            {
                warn!(peer = %peer.id, "failed to close channel: {}", err);
            }
            if let Some(connection) = peer.connection
                && let Err(err) = self.shared.transport.close_connection(connection).await
            {
                warn!(peer = %peer.id, "failed to close connection: {}", err);
            }
        }

        info!(
            cancelled_transfers = cancelled,
            peers = peers.len(),
            "peer manager destroyed"
        );
    }

    async fn load_stored_name(&self) -> Option<String> {
        let shared = Arc::clone(&self.shared);
        match tokio::task::spawn_blocking(move || shared.prefs.load(LOCAL_NAME_KEY)).await {
            Ok(Ok(Some(name))) if !name.trim().is_empty() => Some(name.trim().to_owned()),
            Ok(Ok(_)) => None,
            Ok(Err(err)) => {
                warn!("failed to load stored local name: {}", err);
                None
            }
            Err(err) => {
                warn!("local name loading task failed: {}", err);
                None
            }
        }
    }
}

impl<T: Transport> Shared<T> {
    async fn merge_discovered(&self, found: Vec<DiscoveredPeer>) {
        let snapshot = {
            let mut state = self.state.write().await;
            if state.discovery.is_none() {
                return;
            }

            state.cycle += 1;
            let cycle = state.cycle;
            let mut changed = false;

            for peer in found {
                if let Some(entry) = state.peers.get_mut(&peer.id) {
                    entry.last_seen_cycle = cycle;
                    continue;
                }
                let order = state.next_order;
                state.next_order += 1;
                debug!(peer = %peer.id, name = %peer.name, "discovered peer");
                state.peers.insert(
                    peer.id.clone(),
                    PeerEntry {
                        record: PeerRecord::new(peer.id, peer.name),
                        order,
                        last_seen_cycle: cycle,
                    },
                );
                changed = true;
            }

            if let Some(limit) = self.config.stale_after_cycles {
                let limit = u64::from(limit.max(1));
                let before = state.peers.len();
                state.peers.retain(|id, entry| {
                    let keep = cycle - entry.last_seen_cycle < limit;
                    if !keep {
                        debug!(peer = %id, "dropping stale peer");
                    }
                    keep
                });
                changed |= state.peers.len() != before;
            }

            if !changed {
                return;
            }
            state.peer_snapshot()
        };

        info!(peers = snapshot.len(), "peer set changed");
        self.peer_listeners.notify(&snapshot);
    }

    async fn drive_transfer(
        &self,
        peer: &PeerRecord,
        meta: &FileMeta,
        cancel: &mut oneshot::Receiver<()>,
        progress: &mut f64,
    ) -> Result<TransferProgress, ManagerError> {
        let channel = tokio::select! {
            biased;
            _ = &mut *cancel => return Err(ManagerError::TransferCancelled(meta.id.clone())),
            opened = self.transport.open_channel(peer, meta) => opened?,
        };

        let result = self.pump_chunks(channel, meta, cancel, progress).await;
        if let Err(err) = self.transport.close_channel(channel).await {
            warn!(file_id = %meta.id, "failed to close channel: {}", err);
        }
        result
    }

    async fn pump_chunks(
        &self,
        channel: ChannelHandle,
        meta: &FileMeta,
        cancel: &mut oneshot::Receiver<()>,
        progress: &mut f64,
    ) -> Result<TransferProgress, ManagerError> {
        let period = self.config.progress_interval.max(MIN_TICK);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut *cancel => return Err(ManagerError::TransferCancelled(meta.id.clone())),
                _ = ticker.tick() => {}
            }

            let report = self.transport.send_chunk(channel).await?;
            let reported = if report.progress.is_finite() {
                report.progress
            } else {
                *progress
            };
            *progress = reported.max(*progress).min(PROGRESS_COMPLETE);

            if *progress >= PROGRESS_COMPLETE {
                return Ok(TransferProgress::completed(meta));
            }
            self.progress_listeners
                .notify(&TransferProgress::in_flight(meta, *progress));
        }
    }
}

async fn run_discovery<T: Transport>(handle: Weak<Shared<T>>) {
    let period = match handle.upgrade() {
        Some(shared) => shared.config.discovery_interval.max(MIN_TICK),
        None => return,
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = handle.upgrade() else {
            debug!("peer manager dropped; discovery stopped");
            return;
        };
        match shared.transport.discover_peers().await {
            Ok(found) => shared.merge_discovered(found).await,
            Err(err) => warn!("peer discovery failed: {}", err),
        }
    }
}

async fn run_transfer<T: Transport>(
    shared: Arc<Shared<T>>,
    peer: PeerRecord,
    meta: FileMeta,
    mut cancel: oneshot::Receiver<()>,
    done: oneshot::Sender<Result<TransferProgress, ManagerError>>,
) {
    let mut progress = 0.0;
    let outcome = shared
        .drive_transfer(&peer, &meta, &mut cancel, &mut progress)
        .await;

    let terminal = match &outcome {
        Ok(record) => {
            info!(
                file_id = %meta.id,
                "{} was sent successfully to {}",
                meta.name,
                peer.name
            );
            record.clone()
        }
        Err(err) => {
            warn!(file_id = %meta.id, peer = %peer.id, "transfer failed: {}", err);
            TransferProgress::failed(&meta, progress)
        }
    };

    shared.state.write().await.transfers.remove(&meta.id);
    shared.progress_listeners.notify(&terminal);
    let _ = done.send(outcome);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::{config::HostProfile, prefs::MemoryPreferences};

    use super::*;

    fn manager() -> PeerManager {
        PeerManager::simulated(
            SimulationConfig {
                seed: Some(3),
                host: HostProfile::Desktop,
                ..SimulationConfig::default()
            },
            MemoryPreferences::new(),
            ManagerConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_twice_is_rejected() {
        let manager = manager();
        manager.initialize().await.unwrap();
        let err = manager.initialize().await.unwrap_err();
        assert!(matches!(err, ManagerError::AlreadyInitialized));
        manager.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reinitialize_after_destroy_keeps_local_id() {
        let manager = manager();
        let first = manager.initialize().await.unwrap();
        manager.destroy().await;
        let second = manager.initialize().await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(manager.is_running().await);
        manager.destroy().await;
        assert!(!manager.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn stored_name_wins_over_generated_one() {
        let manager = PeerManager::simulated(
            SimulationConfig::default(),
            MemoryPreferences::with_value(LOCAL_NAME_KEY, "Studio iMac"),
            ManagerConfig::default(),
        );
        let identity = manager.initialize().await.unwrap();
        assert_eq!(identity.name, "Studio iMac");
        manager.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn blank_rename_is_ignored() {
        let manager = manager();
        let before = manager.local_identity().await;
        manager.set_local_name("   ").await;
        assert_eq!(manager.local_identity().await.name, before.name);

        manager.set_local_name("  Den PC ").await;
        assert_eq!(manager.local_identity().await.name, "Den PC");
    }

    #[tokio::test(start_paused = true)]
    async fn first_discovery_waits_one_interval() {
        let manager = manager();
        manager.initialize().await.unwrap();
        assert!(manager.peers().await.is_empty());

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(manager.peers().await.is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!manager.peers().await.is_empty());
        manager.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn late_subscriber_gets_current_peers_immediately() {
        let manager = manager();
        manager.initialize().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager
            .subscribe_peers(move |peers| sink.lock().unwrap().push(peers.len()))
            .await;

        let calls = seen.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert!(calls[0] >= 3);
        manager.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_order_is_stable() {
        let manager = manager();
        manager.initialize().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        let peers = manager.peers().await;
        assert_eq!(peers[0].id, "peer-abc123");
        assert_eq!(peers[1].id, "peer-def456");
        assert!(peers.iter().all(|peer| peer.connection.is_none() && peer.channel.is_none()));
        manager.destroy().await;
    }

    #[tokio::test(start_paused = true)]
    async fn zero_step_config_still_finishes_sends() {
        let manager = PeerManager::simulated(
            SimulationConfig {
                max_progress_step: 0.0,
                seed: Some(8),
                host: HostProfile::Desktop,
            },
            MemoryPreferences::new(),
            ManagerConfig::default(),
        );
        manager.initialize().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;

        let done = tokio::time::timeout(
            Duration::from_secs(3600),
            manager.send_file("peer-abc123", FileRef::new("a.bin", 64)),
        )
        .await
        .expect("send finished")
        .unwrap();
        assert!(done.complete);
        assert_eq!(manager.active_transfers().await, 0);
        manager.destroy().await;
    }
}

