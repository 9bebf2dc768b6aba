//! Operator records living on the imaginary-time segment lines.

use serde::{Deserialize, Serialize};

/// Opaque identity of an operator, shared between a trace and the bath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperatorId(u64);

impl OperatorId {
    /// Creates a new identifier from its raw integer representation.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer representation of the identifier.
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Whether an operator annihilates or creates a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorKind {
    /// `c`, the end of a segment.
    Annihilation,
    /// `c^dagger`, the start of a segment.
    Creation,
}

impl OperatorKind {
    /// Returns true for creation operators.
    pub fn is_creation(&self) -> bool {
        matches!(self, OperatorKind::Creation)
    }
}

/// A timestamped event in a spin channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    /// Imaginary time in `[0, beta)`.
    pub time: f64,
    /// Annihilation or creation.
    pub kind: OperatorKind,
    /// Identity used by the bath to reference the operator.
    pub id: OperatorId,
}

impl Operator {
    /// Creates an annihilation operator.
    pub fn annihilation(time: f64, id: OperatorId) -> Self {
        Self {
            time,
            kind: OperatorKind::Annihilation,
            id,
        }
    }

    /// Creates a creation operator.
    pub fn creation(time: f64, id: OperatorId) -> Self {
        Self {
            time,
            kind: OperatorKind::Creation,
            id,
        }
    }
}

/// Spin channel of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spin {
    /// Spin up, channel 0.
    Up,
    /// Spin down, channel 1.
    Down,
}

impl Spin {
    /// Both channels in index order.
    pub const ALL: [Spin; 2] = [Spin::Up, Spin::Down];

    /// Channel index (0 for up, 1 for down).
    pub fn index(&self) -> usize {
        match self {
            Spin::Up => 0,
            Spin::Down => 1,
        }
    }

    /// Channel from its index; anything but 0 maps to down.
    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            Spin::Up
        } else {
            Spin::Down
        }
    }

    /// The opposite channel.
    pub fn flipped(&self) -> Self {
        match self {
            Spin::Up => Spin::Down,
            Spin::Down => Spin::Up,
        }
    }

    /// +1 for up, -1 for down.
    pub fn polarization(&self) -> f64 {
        match self {
            Spin::Up => 1.0,
            Spin::Down => -1.0,
        }
    }
}

/// An operator as seen by the bath: which site and channel it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlavoredOperator {
    /// Site index in the chain's trace array.
    pub site: usize,
    /// Spin channel.
    pub spin: Spin,
    /// The operator itself.
    pub op: Operator,
}

impl FlavoredOperator {
    /// Bundles an operator with its flavor.
    pub fn new(site: usize, spin: Spin, op: Operator) -> Self {
        Self { site, spin, op }
    }

    /// Canonical ordering key used by the bath: (site, spin, time).
    pub fn canonical_cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.site, self.spin)
            .cmp(&(other.site, other.spin))
            .then(self.op.time.total_cmp(&other.op.time))
    }
}
