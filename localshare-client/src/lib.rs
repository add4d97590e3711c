//! Presentation-side pieces of the `localshare` CLI: the transfer board,
//! connection status text, file intake and batch sending.

pub mod board;
pub mod intake;
pub mod session;
pub mod status;

pub use board::{DEFAULT_LINGER, TransferBoard, render_line};
pub use intake::{Intake, IntakeError, select_file_refs, select_files};
pub use session::{SendOutcome, send_files, tally};
pub use status::{ConnectionStatus, DeviceKind, find_peer, peer_line};
