#![deny(missing_docs)]

//! Segment-picture local trace for a density-density impurity.
//!
//! Each site keeps two time-ordered operator channels. A channel with `k`
//! segments contributes `exp(mu * L)` for its occupied length `L`, and the
//! overlap `O` of both channels costs `exp(-U * O)`. A channel without
//! operators is either empty or a full line.
//!
//! Insertion draws a time uniformly on `[0, beta)`. Outside the occupied
//! region it starts a segment, inside it starts an anti-segment; the second
//! operator lands uniformly in the gap up to the next operator. Erasure picks
//! one operator and removes the segment or anti-segment it opens, so a
//! single pair can collapse to either the empty or the full line.

mod segments;
mod snapshot;
mod trace;

pub use snapshot::{ChannelRecord, TraceSnapshot};
pub use trace::{SegmentTrace, TraceParams};
