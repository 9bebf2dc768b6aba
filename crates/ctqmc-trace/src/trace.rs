use std::f64::consts::PI;

use ctqmc_core::errors::ErrorInfo;
use ctqmc_core::{
    LocalObservables, LocalTrace, Measurements, Operator, OperatorId, QmcError, RngHandle, Spin,
};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::segments::{arc_length, arc_overlap, channel_overlap, gap_after, insert_sorted, Channel};
use crate::snapshot::{ChannelRecord, TraceSnapshot};

/// Operator ids of different traces never collide: the construction site
/// occupies the high bits.
const SITE_ID_SHIFT: u32 = 40;

/// Parameters of the density-density impurity shared by every site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceParams {
    /// Inverse temperature.
    pub beta: f64,
    /// Chemical potential.
    pub mu: f64,
    /// On-site Hubbard repulsion.
    pub u: f64,
    /// Number of bosonic Matsubara frequencies for the spin susceptibility.
    pub chi_frequencies: usize,
}

#[derive(Debug, Clone)]
enum Pending {
    Insert {
        spin: Spin,
        creator: Operator,
        annihilator: Operator,
    },
    Erase {
        spin: Spin,
        creator: Operator,
        annihilator: Operator,
        leaves_full: bool,
    },
}

/// Segment-picture trace of one site with two spin channels.
///
/// A channel holds alternating creators and annihilators, or nothing; an
/// operator-free channel is either empty or a full line. Insertion adds a
/// segment when its first time falls outside the occupied region and an
/// anti-segment (a hole) when it falls inside, so both operator-free states
/// are reached from a single pair.
#[derive(Debug, Clone)]
pub struct SegmentTrace {
    params: TraceParams,
    channels: [Channel; 2],
    id_base: u64,
    next_id: u64,
    pending: Option<Pending>,
    acc_k: f64,
    acc_n: f64,
    acc_d: f64,
    acc_sz: f64,
    acc_chi: Vec<f64>,
}

impl SegmentTrace {
    fn empty(params: &TraceParams, site: usize) -> Self {
        Self {
            params: params.clone(),
            channels: [Channel::default(), Channel::default()],
            id_base: (site as u64) << SITE_ID_SHIFT,
            next_id: 0,
            pending: None,
            acc_k: 0.0,
            acc_n: 0.0,
            acc_d: 0.0,
            acc_sz: 0.0,
            acc_chi: vec![0.0; params.chi_frequencies.max(1)],
        }
    }

    fn fresh_id(&mut self) -> OperatorId {
        let id = OperatorId::from_raw(self.id_base | self.next_id);
        self.next_id += 1;
        id
    }

    fn channel(&self, spin: Spin) -> &Channel {
        &self.channels[spin.index()]
    }

    fn channel_mut(&mut self, spin: Spin) -> &mut Channel {
        &mut self.channels[spin.index()]
    }

    /// Number of segments in a channel.
    pub fn order(&self, spin: Spin) -> usize {
        self.channel(spin).ops.len() / 2
    }

    /// True when the channel has no operators and is occupied throughout.
    pub fn is_full(&self, spin: Spin) -> bool {
        self.channel(spin).full
    }

    /// Occupied time of a channel.
    pub fn occupation(&self, spin: Spin) -> f64 {
        self.channel(spin).length(self.params.beta)
    }

    /// Time both channels are occupied simultaneously.
    pub fn double_occupation(&self) -> f64 {
        channel_overlap(self.channel(Spin::Up), self.channel(Spin::Down), self.params.beta)
    }

    /// Parameters the trace was built with.
    pub fn params(&self) -> &TraceParams {
        &self.params
    }

    fn signed_response(&self) -> Vec<Complex64> {
        let beta = self.params.beta;
        let frequencies = self.acc_chi.len();
        let mut chi = vec![Complex64::new(0.0, 0.0); frequencies];
        chi[0] = Complex64::new(self.occupation(Spin::Up) - self.occupation(Spin::Down), 0.0);
        for spin in Spin::ALL {
            let polarization = spin.polarization();
            let channel = self.channel(spin);
            // a full line has no edges
            if channel.ops.is_empty() {
                continue;
            }
            for (start, end) in channel.segments(beta) {
                for (n, value) in chi.iter_mut().enumerate().skip(1) {
                    let omega = 2.0 * PI * n as f64 / beta;
                    let edge = Complex64::from_polar(1.0, omega * end)
                        - Complex64::from_polar(1.0, omega * start);
                    *value += polarization * edge;
                }
            }
        }
        chi
    }

    fn reset_accumulators(&mut self) {
        self.acc_k = 0.0;
        self.acc_n = 0.0;
        self.acc_d = 0.0;
        self.acc_sz = 0.0;
        self.acc_chi.iter_mut().for_each(|value| *value = 0.0);
    }
}

impl LocalTrace for SegmentTrace {
    type Params = TraceParams;
    type Snapshot = TraceSnapshot;

    fn new(params: &TraceParams, site: usize) -> Self {
        Self::empty(params, site)
    }

    fn restore(params: &TraceParams, site: usize, snapshot: TraceSnapshot) -> Result<Self, QmcError> {
        let mut trace = Self::empty(params, site);
        for spin in Spin::ALL {
            let records = snapshot.channel(spin);
            validate_channel(records, snapshot.is_full(spin), params.beta).map_err(|info| {
                QmcError::Trace(
                    info.with_context("site", site.to_string())
                        .with_context("spin", format!("{spin:?}")),
                )
            })?;
            let ops: Vec<Operator> = records
                .iter()
                .map(|record| Operator {
                    time: record.time,
                    kind: record.kind,
                    id: trace.fresh_id(),
                })
                .collect();
            *trace.channel_mut(spin) = Channel {
                ops,
                full: snapshot.is_full(spin),
            };
        }
        Ok(trace)
    }

    // Segment or anti-segment of length l < l_max starting at a uniform time:
    // ln(beta * l_max / (2 (k + 1))) -/+ (mu l - U overlap). The factor 2
    // matches `erase`, which picks one of the 2 (k + 1) operators.
    fn insert(&mut self, spin: Spin, rng: &mut RngHandle) -> f64 {
        let beta = self.params.beta;
        let segments_before = self.order(spin);
        let start = rng.uniform() * beta;
        let channel = self.channel(spin);
        let hole = channel.is_occupied(start);
        let max_length = if channel.ops.is_empty() {
            beta
        } else {
            gap_after(&channel.ops, start, beta)
        };
        let length = rng.uniform() * max_length;
        if length <= 0.0 {
            self.pending = None;
            return f64::NEG_INFINITY;
        }
        let mut end = start + length;
        if end >= beta {
            end -= beta;
        }
        let overlap = arc_overlap(start, end, self.channel(spin.flipped()), beta);
        let weight = self.params.mu * length - self.params.u * overlap;

        let (creator, annihilator, weight) = if hole {
            let annihilator = Operator::annihilation(start, self.fresh_id());
            (Operator::creation(end, self.fresh_id()), annihilator, -weight)
        } else {
            let creator = Operator::creation(start, self.fresh_id());
            (creator, Operator::annihilation(end, self.fresh_id()), weight)
        };
        self.pending = Some(Pending::Insert {
            spin,
            creator,
            annihilator,
        });

        (beta * max_length / (2 * (segments_before + 1)) as f64).ln() + weight
    }

    // Removes the segment (picked operator is a creator) or anti-segment
    // (picked operator is an annihilator) that starts at a uniformly chosen
    // operator. With one pair left, removing the anti-segment leaves a full line.
    fn erase(&mut self, spin: Spin, rng: &mut RngHandle) -> f64 {
        let beta = self.params.beta;
        let segments_before = self.order(spin);
        if segments_before == 0 {
            self.pending = None;
            return f64::NEG_INFINITY;
        }
        let ops = &self.channel(spin).ops;
        let n = ops.len();
        let picked = rng.index(n);
        let first = ops[picked];
        let second = ops[(picked + 1) % n];
        let hole = !first.kind.is_creation();
        let length = arc_length(first.time, second.time, beta);
        let max_length = if segments_before == 1 {
            beta
        } else {
            arc_length(first.time, ops[(picked + 2) % n].time, beta)
        };
        let overlap = arc_overlap(first.time, second.time, self.channel(spin.flipped()), beta);
        let weight = self.params.mu * length - self.params.u * overlap;

        let (creator, annihilator, weight) = if hole {
            (second, first, weight)
        } else {
            (first, second, -weight)
        };
        self.pending = Some(Pending::Erase {
            spin,
            creator,
            annihilator,
            leaves_full: hole && segments_before == 1,
        });

        ((2 * segments_before) as f64 / (beta * max_length)).ln() + weight
    }

    fn accept_insert(&mut self, spin: Spin) -> i32 {
        let before = self.channel(spin).sign();
        if let Some(Pending::Insert {
            spin: pending_spin,
            creator,
            annihilator,
        }) = self.pending.take()
        {
            debug_assert_eq!(pending_spin, spin);
            let channel = self.channel_mut(pending_spin);
            insert_sorted(&mut channel.ops, creator);
            insert_sorted(&mut channel.ops, annihilator);
            channel.full = false;
        }
        before * self.channel(spin).sign()
    }

    fn reject_insert(&mut self, _spin: Spin) {
        self.pending = None;
    }

    fn accept_erase(&mut self, spin: Spin) -> i32 {
        let before = self.channel(spin).sign();
        if let Some(Pending::Erase {
            spin: pending_spin,
            creator,
            annihilator,
            leaves_full,
        }) = self.pending.take()
        {
            debug_assert_eq!(pending_spin, spin);
            let channel = self.channel_mut(pending_spin);
            channel
                .ops
                .retain(|op| op.id != creator.id && op.id != annihilator.id);
            channel.full = leaves_full;
        }
        before * self.channel(spin).sign()
    }

    fn reject_erase(&mut self, _spin: Spin) {
        self.pending = None;
    }

    fn flip(&mut self) {
        self.channels.swap(0, 1);
    }

    fn sign(&self) -> i32 {
        self.channel(Spin::Up).sign() * self.channel(Spin::Down).sign()
    }

    fn operators(&self, spin: Spin) -> &[Operator] {
        &self.channel(spin).ops
    }

    fn op(&self) -> Option<&Operator> {
        match &self.pending {
            Some(Pending::Insert { annihilator, .. }) | Some(Pending::Erase { annihilator, .. }) => {
                Some(annihilator)
            }
            None => None,
        }
    }

    fn op_dagg(&self) -> Option<&Operator> {
        match &self.pending {
            Some(Pending::Insert { creator, .. }) | Some(Pending::Erase { creator, .. }) => {
                Some(creator)
            }
            None => None,
        }
    }

    fn measure(&mut self, sign: i32) -> Vec<Complex64> {
        let beta = self.params.beta;
        let sign = f64::from(sign);
        let up = self.occupation(Spin::Up);
        let down = self.occupation(Spin::Down);
        let pairs = self.order(Spin::Up) + self.order(Spin::Down);

        self.acc_k += sign * pairs as f64;
        self.acc_n += sign * (up + down) / beta;
        self.acc_sz += sign * (up - down) / beta;
        self.acc_d += sign * self.double_occupation() / beta;

        let chi = self.signed_response();
        self.acc_chi[0] += sign * (up - down) * (up - down) / beta;
        for (acc, value) in self.acc_chi.iter_mut().zip(chi.iter()).skip(1) {
            *acc += sign * value.norm_sqr();
        }
        chi
    }

    fn chi(&self) -> Vec<f64> {
        self.acc_chi.clone()
    }

    fn store(
        &mut self,
        sink: &mut Measurements,
        site: usize,
        acc: &mut LocalObservables,
        count: usize,
    ) {
        let beta = self.params.beta;
        let norm = count.max(1) as f64;
        let k = self.acc_k / norm;
        let n = self.acc_n / norm;
        let d = self.acc_d / norm;
        let sz = self.acc_sz / norm;
        let chi: Vec<f64> = self
            .acc_chi
            .iter()
            .enumerate()
            .map(|(m, value)| {
                if m == 0 {
                    value / norm
                } else {
                    let omega = 2.0 * m as f64 * PI;
                    value * beta / (omega * omega) / norm
                }
            })
            .collect();

        sink.push_scalar(format!("k_{site}"), k);
        sink.push_scalar(format!("N_{site}"), n);
        sink.push_scalar(format!("D_{site}"), d);
        sink.push_scalar(format!("Sz_{site}"), sz);
        sink.push_scalar(format!("Chi0_{site}"), chi[0]);

        acc.k += k;
        acc.n += n;
        acc.d += d;
        acc.sz += sz;
        for (total, value) in acc.chi.iter_mut().zip(chi.iter()) {
            *total += value;
        }

        self.reset_accumulators();
    }

    fn snapshot(&self) -> TraceSnapshot {
        let record = |channel: &Channel| -> Vec<ChannelRecord> {
            channel
                .ops
                .iter()
                .map(|op| ChannelRecord {
                    time: op.time,
                    kind: op.kind,
                })
                .collect()
        };
        TraceSnapshot {
            up: record(self.channel(Spin::Up)),
            down: record(self.channel(Spin::Down)),
            up_full: self.is_full(Spin::Up),
            down_full: self.is_full(Spin::Down),
        }
    }
}

fn validate_channel(records: &[ChannelRecord], full: bool, beta: f64) -> Result<(), ErrorInfo> {
    if full && !records.is_empty() {
        return Err(ErrorInfo::new(
            "full-channel-with-operators",
            "a full line cannot hold operators",
        )
        .with_context("operators", records.len().to_string()));
    }
    if records.len() % 2 != 0 {
        return Err(ErrorInfo::new(
            "odd-operator-count",
            "a channel must hold creator/annihilator pairs",
        )
        .with_context("operators", records.len().to_string()));
    }
    for (idx, record) in records.iter().enumerate() {
        if !(record.time.is_finite() && record.time >= 0.0 && record.time < beta) {
            return Err(ErrorInfo::new("time-out-of-range", "operator time outside [0, beta)")
                .with_context("time", record.time.to_string())
                .with_context("beta", beta.to_string()));
        }
        if let Some(next) = records.get(idx + 1) {
            if next.time <= record.time {
                return Err(ErrorInfo::new("unsorted-channel", "operator times must increase")
                    .with_context("index", (idx + 1).to_string()));
            }
            if next.kind == record.kind {
                return Err(ErrorInfo::new(
                    "non-alternating-channel",
                    "creators and annihilators must alternate",
                )
                .with_context("index", (idx + 1).to_string()));
            }
        }
    }
    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        if first.kind == last.kind {
            return Err(ErrorInfo::new(
                "non-alternating-channel",
                "creators and annihilators must alternate around beta",
            ));
        }
    }
    Ok(())
}
