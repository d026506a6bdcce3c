//! Archive and merge configuration
//!
//! Author: Moroya Sakamoto

use serde::{Deserialize, Serialize};

/// Default distance between forced full snapshots.
pub const DEFAULT_FULL_SNAPSHOT_INTERVAL: usize = 5;

/// Revision archive settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Nodes at positions `1, 1+N, 1+2N, …` stay full snapshots.
    pub full_snapshot_interval: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            full_snapshot_interval: DEFAULT_FULL_SNAPSHOT_INTERVAL,
        }
    }
}

impl ArchiveConfig {
    pub fn with_interval(full_snapshot_interval: usize) -> Self {
        Self {
            full_snapshot_interval,
        }
        .normalized()
    }

    /// Clamp the interval to at least one (every node full).
    pub fn normalized(self) -> Self {
        Self {
            full_snapshot_interval: self.full_snapshot_interval.max(1),
        }
    }

    /// True if the node at 1-indexed `position` is a forced checkpoint.
    #[inline]
    pub fn is_checkpoint(&self, position: usize) -> bool {
        let interval = self.full_snapshot_interval.max(1);
        position >= 1 && (position - 1) % interval == 0
    }
}

/// Which side survives an unresolved merge conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictFallback {
    /// Keep the local value
    #[default]
    Current,
    /// Take the incoming value
    Next,
}

/// Three-way merge settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub conflict_fallback: ConflictFallback,
}
