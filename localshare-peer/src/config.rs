use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(400);
pub const DEFAULT_STALE_AFTER_CYCLES: u32 = 5;
pub const DEFAULT_MAX_PROGRESS_STEP: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManagerConfig {
    pub discovery_interval: Duration,
    pub progress_interval: Duration,
    /// Consecutive discovery cycles a peer may go unseen before it is dropped.
    /// `None` keeps every peer until teardown.
    pub stale_after_cycles: Option<u32>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            discovery_interval: DEFAULT_DISCOVERY_INTERVAL,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            stale_after_cycles: Some(DEFAULT_STALE_AFTER_CYCLES),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostProfile {
    Desktop,
    Mobile,
}

impl HostProfile {
    pub fn detect() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "android" | "ios" => HostProfile::Mobile,
            _ => HostProfile::Desktop,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationConfig {
    /// Upper bound (exclusive) of a single progress step, in percent.
    pub max_progress_step: f64,
    pub seed: Option<u64>,
    pub host: HostProfile,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_progress_step: DEFAULT_MAX_PROGRESS_STEP,
            seed: None,
            host: HostProfile::detect(),
        }
    }
}
