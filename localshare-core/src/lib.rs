use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod format;

pub use format::{FileCategory, categorize_file_type, format_byte_size};

pub const PEER_ID_PREFIX: &str = "peer-";
pub const FILE_ID_PREFIX: &str = "file-";
pub const ID_SUFFIX_LEN: usize = 13;
pub const PROGRESS_COMPLETE: f64 = 100.0;
pub const DEFAULT_NAME_PREFIX: &str = "User-";
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub type PeerId = String;
pub type FileId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelHandle(pub u64);

impl std::fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    pub id: PeerId,
    pub name: String,
    pub connection: Option<ConnectionHandle>,
    pub channel: Option<ChannelHandle>,
}

impl PeerRecord {
    pub fn new(id: impl Into<PeerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            connection: None,
            channel: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalIdentity {
    pub id: PeerId,
    pub name: String,
}

impl LocalIdentity {
    /// Fresh identity with a random id and a `User-<n>` display name.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        Self {
            id: generate_id(PEER_ID_PREFIX, &mut rng),
            name: default_local_name(&mut rng),
        }
    }
}

/// Handle to a file payload. Only metadata is ever looked at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mime: None,
            path: None,
        }
    }

    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn from_path(path: &Path) -> Result<Self, CoreError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| CoreError::MissingFileName(path.to_path_buf()))?;
        let meta = std::fs::metadata(path).map_err(|source| CoreError::FileMetadata {
            path: path.to_path_buf(),
            source,
        })?;
        if !meta.is_file() {
            return Err(CoreError::NotAFile(path.to_path_buf()));
        }

        Ok(Self {
            name,
            size: meta.len(),
            mime: None,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn category(&self) -> FileCategory {
        categorize_file_type(&self.name)
    }
}

/// What a sender announces about a file when it opens a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub id: FileId,
    pub name: String,
    pub size: u64,
    pub mime: Option<String>,
    pub sender_id: PeerId,
}

impl FileMeta {
    pub fn for_file(id: FileId, file: &FileRef, sender_id: &str) -> Self {
        Self {
            id,
            name: file.name.clone(),
            size: file.size,
            mime: file.mime.clone(),
            sender_id: sender_id.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Transferring,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransferDescriptor {
    pub id: FileId,
    pub file: FileRef,
    pub target_peer_id: PeerId,
    pub progress: f64,
    pub status: TransferStatus,
}

impl FileTransferDescriptor {
    pub fn new(file: FileRef, target_peer_id: impl Into<PeerId>) -> Self {
        Self {
            id: new_file_id(),
            file,
            target_peer_id: target_peer_id.into(),
            progress: 0.0,
            status: TransferStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub file_id: FileId,
    pub file_name: String,
    pub progress: f64,
    pub complete: bool,
    pub error: bool,
    pub size: u64,
}

impl TransferProgress {
    pub fn in_flight(meta: &FileMeta, progress: f64) -> Self {
        Self {
            file_id: meta.id.clone(),
            file_name: meta.name.clone(),
            progress: progress.clamp(0.0, PROGRESS_COMPLETE),
            complete: false,
            error: false,
            size: meta.size,
        }
    }

    pub fn completed(meta: &FileMeta) -> Self {
        Self {
            complete: true,
            ..Self::in_flight(meta, PROGRESS_COMPLETE)
        }
    }

    pub fn failed(meta: &FileMeta, progress: f64) -> Self {
        Self {
            error: true,
            ..Self::in_flight(meta, progress)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.complete || self.error
    }

    pub fn status(&self) -> TransferStatus {
        if self.complete {
            TransferStatus::Completed
        } else if self.error {
            TransferStatus::Failed
        } else {
            TransferStatus::Transferring
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("path has no file name: {0}")]
    MissingFileName(PathBuf),
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("failed to read metadata for {path}: {source}")]
    FileMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn generate_id<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    let mut id = String::with_capacity(prefix.len() + ID_SUFFIX_LEN);
    id.push_str(prefix);
    for _ in 0..ID_SUFFIX_LEN {
        let index = rng.random_range(0..ID_ALPHABET.len());
        id.push(char::from(ID_ALPHABET[index]));
    }
    id
}

pub fn new_peer_id() -> PeerId {
    generate_id(PEER_ID_PREFIX, &mut rand::rng())
}

pub fn new_file_id() -> FileId {
    generate_id(FILE_ID_PREFIX, &mut rand::rng())
}

pub fn default_local_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{}{}", DEFAULT_NAME_PREFIX, rng.random_range(0..1000))
}
