use std::path::{Path, PathBuf};

use localshare_core::{CoreError, FileRef, FileTransferDescriptor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("no device selected: pick a device to send files to")]
    NoPeerSelected,
}

/// Files accepted for sending, plus the paths that could not be read.
#[derive(Debug, Default)]
pub struct Intake {
    pub accepted: Vec<FileTransferDescriptor>,
    pub rejected: Vec<(PathBuf, CoreError)>,
}

/// Wraps already-described files into pending transfers for the selected peer.
pub fn select_file_refs(
    selected_peer: Option<&str>,
    files: Vec<FileRef>,
) -> Result<Vec<FileTransferDescriptor>, IntakeError> {
    let peer = selected_peer
        .map(str::trim)
        .filter(|peer| !peer.is_empty())
        .ok_or(IntakeError::NoPeerSelected)?;
    Ok(files
        .into_iter()
        .map(|file| FileTransferDescriptor::new(file, peer))
        .collect())
}

/// Reads size and name for each path and queues the readable ones.
///
/// Unreadable paths do not fail the batch; they come back in `rejected`.
pub fn select_files<P: AsRef<Path>>(
    selected_peer: Option<&str>,
    paths: &[P],
) -> Result<Intake, IntakeError> {
    let mut files = Vec::with_capacity(paths.len());
    let mut rejected = Vec::new();
    for path in paths {
        let path = path.as_ref();
        match FileRef::from_path(path) {
            Ok(file) => files.push(file),
            Err(err) => rejected.push((path.to_path_buf(), err)),
        }
    }
    let accepted = select_file_refs(selected_peer, files)?;
    Ok(Intake { accepted, rejected })
}
