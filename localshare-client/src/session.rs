use futures::future::join_all;
use localshare_core::{FileTransferDescriptor, TransferProgress, TransferStatus};
use localshare_peer::{ManagerError, PeerManager, Transport};
use tracing::{info, warn};

/// One queued file and how its send ended.
#[derive(Debug)]
pub struct SendOutcome {
    pub descriptor: FileTransferDescriptor,
    pub result: Result<TransferProgress, ManagerError>,
}

impl SendOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Starts every queued send at once and waits for all of them.
///
/// Each descriptor moves to `Transferring` and ends as `Completed` or
/// `Failed`. The manager assigns its own file id per send, so progress
/// events are matched through `result`, not `descriptor.id`.
pub async fn send_files<T: Transport>(
    manager: &PeerManager<T>,
    descriptors: Vec<FileTransferDescriptor>,
) -> Vec<SendOutcome> {
    if descriptors.is_empty() {
        return Vec::new();
    }

    let total = descriptors.len();
    info!(
        "Starting transfer of {} file{}",
        total,
        if total == 1 { "" } else { "s" }
    );

    let sends = descriptors.into_iter().map(|mut descriptor| async move {
        descriptor.status = TransferStatus::Transferring;
        let result = manager
            .send_file(&descriptor.target_peer_id, descriptor.file.clone())
            .await;
        match &result {
            Ok(done) => {
                descriptor.progress = done.progress;
                descriptor.status = TransferStatus::Completed;
            }
            Err(err) => {
                warn!(file = %descriptor.file.name, "transfer failed: {}", err);
                descriptor.status = TransferStatus::Failed;
            }
        }
        SendOutcome { descriptor, result }
    });
    let outcomes = join_all(sends).await;

    let failed = outcomes.iter().filter(|outcome| !outcome.succeeded()).count();
    if failed > 0 {
        warn!("{} of {} transfers failed", failed, total);
    }
    outcomes
}

/// Counts of (completed, failed) sends.
pub fn tally(outcomes: &[SendOutcome]) -> (usize, usize) {
    let completed = outcomes.iter().filter(|outcome| outcome.succeeded()).count();
    (completed, outcomes.len() - completed)
}
