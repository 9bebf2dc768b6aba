//! Geometry of segments on the imaginary-time circle `[0, beta)`.

use ctqmc_core::{Operator, OperatorKind};

/// Length of the arc going forward from `start` to `end`.
pub(crate) fn arc_length(start: f64, end: f64, beta: f64) -> f64 {
    if end > start {
        end - start
    } else {
        end - start + beta
    }
}

/// Splits a possibly wrapping arc into at most two non-wrapping intervals.
pub(crate) fn unwrap_arc(start: f64, end: f64, beta: f64) -> ([(f64, f64); 2], usize) {
    if end > start {
        ([(start, end), (0.0, 0.0)], 1)
    } else {
        ([(start, beta), (0.0, end)], 2)
    }
}

/// Time-ordered operators of one spin channel.
///
/// Without operators the channel is either empty or a full line, told apart
/// by `full`; `full` is always false once operators are present.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Channel {
    pub(crate) ops: Vec<Operator>,
    pub(crate) full: bool,
}

impl Channel {
    /// `(creator time, annihilator time)` of every segment; a full line is
    /// the single segment `(0, beta)`.
    pub(crate) fn segments(&self, beta: f64) -> Vec<(f64, f64)> {
        let ops = &self.ops;
        if ops.is_empty() {
            return if self.full { vec![(0.0, beta)] } else { Vec::new() };
        }
        let n = ops.len();
        ops.iter()
            .enumerate()
            .filter(|(_, op)| op.kind.is_creation())
            .map(|(idx, op)| (op.time, ops[(idx + 1) % n].time))
            .collect()
    }

    /// Total occupied time.
    pub(crate) fn length(&self, beta: f64) -> f64 {
        self.segments(beta)
            .into_iter()
            .map(|(start, end)| arc_length(start, end, beta))
            .sum()
    }

    /// True when `time` lies inside a segment or on the full line.
    pub(crate) fn is_occupied(&self, time: f64) -> bool {
        if self.ops.is_empty() {
            self.full
        } else {
            self.ops[preceding(&self.ops, time)].kind.is_creation()
        }
    }

    /// Sign contributed in the time-sorted matrix ordering.
    ///
    /// A segment winding through beta moves its annihilator to the front of
    /// the sorted rows, a cyclic shift worth `(-1)^(k-1)`; combined with the
    /// antiperiodic hybridization this leaves `(-1)^k`. Empty and full
    /// channels are positive.
    pub(crate) fn sign(&self) -> i32 {
        match self.ops.first() {
            Some(first)
                if first.kind == OperatorKind::Annihilation && (self.ops.len() / 2) % 2 == 1 =>
            {
                -1
            }
            _ => 1,
        }
    }
}

/// Time during which the arc `start -> end` overlaps the segments of `other`.
pub(crate) fn arc_overlap(start: f64, end: f64, other: &Channel, beta: f64) -> f64 {
    let (pieces, count) = unwrap_arc(start, end, beta);
    let mut overlap = 0.0;
    for (other_start, other_end) in other.segments(beta) {
        let (other_pieces, other_count) = unwrap_arc(other_start, other_end, beta);
        for &(a0, a1) in &pieces[..count] {
            for &(b0, b1) in &other_pieces[..other_count] {
                overlap += (a1.min(b1) - a0.max(b0)).max(0.0);
            }
        }
    }
    overlap
}

/// Total time both channels are occupied.
pub(crate) fn channel_overlap(first: &Channel, second: &Channel, beta: f64) -> f64 {
    first
        .segments(beta)
        .into_iter()
        .map(|(start, end)| arc_overlap(start, end, second, beta))
        .sum()
}

/// Index of the operator preceding `time` on the circle.
fn preceding(ops: &[Operator], time: f64) -> usize {
    let after = ops.partition_point(|op| op.time <= time);
    if after == 0 {
        ops.len() - 1
    } else {
        after - 1
    }
}

/// Distance from `time` forward to the next operator of a non-empty channel.
pub(crate) fn gap_after(ops: &[Operator], time: f64, beta: f64) -> f64 {
    let next = ops.partition_point(|op| op.time <= time) % ops.len();
    arc_length(time, ops[next].time, beta)
}

/// Inserts an operator keeping the channel sorted by time.
pub(crate) fn insert_sorted(ops: &mut Vec<Operator>, op: Operator) {
    let position = ops.partition_point(|existing| existing.time < op.time);
    ops.insert(position, op);
}
