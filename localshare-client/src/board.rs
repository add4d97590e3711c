use std::time::{Duration, Instant};

use localshare_core::{TransferProgress, categorize_file_type, format_byte_size};

/// How long a finished or failed transfer stays listed.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct BoardEntry {
    progress: TransferProgress,
    expires_at: Option<Instant>,
}

/// The list of transfers a user sees, one row per file id, in arrival order.
///
/// The manager never expires records; the board drops terminal rows once
/// their linger time has passed, or when dismissed.
#[derive(Debug, Clone)]
pub struct TransferBoard {
    linger: Duration,
    entries: Vec<BoardEntry>,
}

impl Default for TransferBoard {
    fn default() -> Self {
        Self::new(DEFAULT_LINGER)
    }
}

impl TransferBoard {
    pub fn new(linger: Duration) -> Self {
        Self {
            linger,
            entries: Vec::new(),
        }
    }

    pub fn apply(&mut self, progress: TransferProgress, now: Instant) {
        let expires_at = progress.is_terminal().then(|| now + self.linger);
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.progress.file_id == progress.file_id)
        {
            Some(entry) => {
                entry.progress = progress;
                entry.expires_at = expires_at;
            }
            None => self.entries.push(BoardEntry {
                progress,
                expires_at,
            }),
        }
    }

    /// Drops expired rows and returns how many were removed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.expires_at.is_none_or(|expires_at| now < expires_at));
        before - self.entries.len()
    }

    pub fn dismiss(&mut self, file_id: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.progress.file_id != file_id);
        before != self.entries.len()
    }

    pub fn next_expiry(&self) -> Option<Instant> {
        self.entries.iter().filter_map(|entry| entry.expires_at).min()
    }

    pub fn get(&self, file_id: &str) -> Option<&TransferProgress> {
        self.entries
            .iter()
            .map(|entry| &entry.progress)
            .find(|progress| progress.file_id == file_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransferProgress> {
        self.entries.iter().map(|entry| &entry.progress)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn header(&self) -> String {
        format!("File Transfers ({})", self.entries.len())
    }

    pub fn render(&self) -> Vec<String> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let mut lines = Vec::with_capacity(self.entries.len() + 1);
        lines.push(self.header());
        lines.extend(self.iter().map(render_line));
        lines
    }
}

pub fn render_line(progress: &TransferProgress) -> String {
    let category = categorize_file_type(&progress.file_name);
    let marker = if progress.complete {
        "  done"
    } else if progress.error {
        "  failed"
    } else {
        ""
    };
    format!(
        "[{}] {}  {}  {}%{}",
        category.icon_name(),
        progress.file_name,
        format_byte_size(progress.size),
        progress.progress.round() as u32,
        marker
    )
}
