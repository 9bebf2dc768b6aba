//! Checkpoint representation of a segment trace.

use ctqmc_core::{OperatorKind, Spin};
use serde::{Deserialize, Serialize};

/// One stored operator: its time and whether it opens or closes a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Imaginary time in `[0, beta)`.
    pub time: f64,
    /// Creation or annihilation.
    pub kind: OperatorKind,
}

/// Time-ordered operators of both channels of one site.
///
/// A channel without records is empty unless its `*_full` flag marks it as
/// a full line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceSnapshot {
    /// Spin-up channel.
    #[serde(default)]
    pub up: Vec<ChannelRecord>,
    /// Spin-down channel.
    #[serde(default)]
    pub down: Vec<ChannelRecord>,
    /// Spin-up channel is occupied over all of `[0, beta)`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub up_full: bool,
    /// Spin-down channel is occupied over all of `[0, beta)`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub down_full: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl TraceSnapshot {
    /// Records of one channel.
    pub fn channel(&self, spin: Spin) -> &[ChannelRecord] {
        match spin {
            Spin::Up => &self.up,
            Spin::Down => &self.down,
        }
    }

    /// Full-line flag of one channel.
    pub fn is_full(&self, spin: Spin) -> bool {
        match spin {
            Spin::Up => self.up_full,
            Spin::Down => self.down_full,
        }
    }
}
