use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use localshare_client::{
    ConnectionStatus, IntakeError, TransferBoard, find_peer, peer_line, render_line,
    select_files, send_files, tally,
};
use localshare_core::{PeerRecord, TransferProgress};
use localshare_peer::{
    JsonFilePreferences, ManagerConfig, ManagerError, PeerManager, SimulationConfig,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "localshare", about = "Send files to nearby devices")]
struct ShareArgs {
    /// Rename this device before connecting; the name is remembered.
    #[arg(long)]
    name: Option<String>,
    /// Target device, by id or name. Defaults to the first one found.
    #[arg(long)]
    peer: Option<String>,
    /// Preferences file. Defaults to the per-user config directory.
    #[arg(long)]
    prefs: Option<PathBuf>,
    #[arg(long, default_value_t = 2000)]
    discovery_ms: u64,
    #[arg(long, default_value_t = 400)]
    tick_ms: u64,
    /// Seed for the simulated network.
    #[arg(long)]
    seed: Option<u64>,
    /// How long finished transfers stay on the board.
    #[arg(long, default_value_t = 5000)]
    linger_ms: u64,
    /// Give up if no device shows up within this many seconds.
    #[arg(long, default_value_t = 10)]
    wait_secs: u64,
    files: Vec<PathBuf>,
}

#[derive(Debug, Error)]
enum ShareError {
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error("no devices found within {0}s")]
    NoPeers(u64),
    #[error("no device matches {0:?}")]
    UnknownPeer(String),
    #[error("{failed} of {total} transfers failed")]
    TransfersFailed { failed: usize, total: usize },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = ShareArgs::parse();
    let prefs = match &args.prefs {
        Some(path) => JsonFilePreferences::new(path),
        None => JsonFilePreferences::at_default_location(),
    };
    let manager = PeerManager::simulated(
        SimulationConfig {
            seed: args.seed,
            ..SimulationConfig::default()
        },
        prefs,
        ManagerConfig {
            discovery_interval: Duration::from_millis(args.discovery_ms),
            progress_interval: Duration::from_millis(args.tick_ms),
            ..ManagerConfig::default()
        },
    );

    let result = run(&manager, &args).await;
    manager.destroy().await;
    if let Err(err) = result {
        error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(manager: &PeerManager, args: &ShareArgs) -> Result<(), ShareError> {
    let (peer_tx, mut peer_rx) = mpsc::unbounded_channel::<Vec<PeerRecord>>();
    manager
        .subscribe_peers(move |peers| {
            let _ = peer_tx.send(peers.to_vec());
        })
        .await;
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<TransferProgress>();
    manager.subscribe_progress(move |progress| {
        let _ = progress_tx.send(progress.clone());
    });

    if let Some(name) = &args.name {
        manager.set_local_name(name).await;
    }
    let identity = manager.initialize().await?;
    println!("This device: {} ({})", identity.name, identity.id);

    let mut status = ConnectionStatus::default();
    println!("{status}");

    let peers = match tokio::time::timeout(Duration::from_secs(args.wait_secs), peer_rx.recv())
        .await
    {
        Ok(Some(peers)) => peers,
        _ => return Err(ShareError::NoPeers(args.wait_secs)),
    };
    status.observe(&peers);
    println!("{status}");

    let target = match &args.peer {
        Some(query) => find_peer(&peers, query)
            .ok_or_else(|| ShareError::UnknownPeer(query.clone()))?
            .clone(),
        None => match peers.first() {
            Some(peer) => peer.clone(),
            None => return Err(ShareError::NoPeers(args.wait_secs)),
        },
    };
    for peer in &peers {
        println!("  {}", peer_line(peer, peer.id == target.id));
    }

    if args.files.is_empty() {
        info!("no files given, nothing to send");
        return Ok(());
    }

    let intake = select_files(Some(&target.id), &args.files)?;
    for (path, err) in &intake.rejected {
        warn!("skipping {}: {}", path.display(), err);
    }

    let mut board = TransferBoard::new(Duration::from_millis(args.linger_ms));
    let sends = send_files(manager, intake.accepted);
    tokio::pin!(sends);
    let outcomes = loop {
        tokio::select! {
            biased;
            Some(progress) = progress_rx.recv() => {
                println!("{}", render_line(&progress));
                board.apply(progress, Instant::now().into_std());
            }
            Some(peers) = peer_rx.recv() => {
                status.observe(&peers);
                info!("{}", status);
            }
            outcomes = &mut sends => break outcomes,
        }
    };
    while let Ok(progress) = progress_rx.try_recv() {
        board.apply(progress, Instant::now().into_std());
    }

    board.prune(Instant::now().into_std());
    for line in board.render() {
        println!("{line}");
    }

    let (completed, failed) = tally(&outcomes);
    info!("{} sent to {}, {} failed", completed, target.name, failed);
    if failed > 0 {
        return Err(ShareError::TransfersFailed {
            failed,
            total: outcomes.len(),
        });
    }
    Ok(())
}
