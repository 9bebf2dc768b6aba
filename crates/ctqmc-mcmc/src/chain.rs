use std::path::Path;

use ctqmc_core::errors::ErrorInfo;
use ctqmc_core::{Bath, FlavoredOperator, LocalTrace, Link, Measurements, QmcError, RngHandle, Spin};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::accumulators::ChainAccumulators;
use crate::checkpoint::{self, Checkpoint, CheckpointLoad, FreshReason, RestoreOutcome, CHECKPOINT_KEY};
use crate::moves::{FlipProposal, LocalMove};

/// Construction parameters of a [`MarkovChain`].
#[derive(Debug, Clone)]
pub struct ChainParams<P> {
    /// Inverse temperature.
    pub beta: f64,
    /// Number of sites.
    pub n_site: usize,
    /// Probability of a global flip per update.
    pub prob_flip: f64,
    /// Bins of the perturbation-order histogram.
    pub max_order: usize,
    /// Bosonic frequencies of the spin susceptibility.
    pub chi_frequencies: usize,
    /// Master seed of the run.
    pub seed: u64,
    /// Worker rank; selects the RNG stream and checkpoint file.
    pub rank: u64,
    /// Parameters forwarded to every trace.
    pub trace: P,
}

/// Attempted and accepted local moves of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAcceptance {
    /// Site index.
    pub site: usize,
    /// Spin channel.
    pub spin: Spin,
    /// Local updates attempted on this channel.
    pub attempted: u64,
    /// Local updates accepted on this channel.
    pub accepted: u64,
    /// `accepted / attempted`, 0 when nothing was attempted.
    pub ratio: f64,
}

/// Acceptance statistics reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceSummary {
    /// One entry per (site, spin) channel.
    pub channels: Vec<ChannelAcceptance>,
    /// Global flips attempted.
    pub flips_attempted: u64,
    /// Global flips accepted.
    pub flips_accepted: u64,
    /// `flips_accepted / flips_attempted`, 0 when nothing was attempted.
    pub flip_ratio: f64,
}

fn ratio(accepted: u64, attempted: u64) -> f64 {
    if attempted == 0 {
        0.0
    } else {
        accepted as f64 / attempted as f64
    }
}

/// Markov chain over segment configurations of `n_site` sites.
///
/// Owns one trace per site, the bath coupling all operators, the link, the
/// worker's RNG stream and every accumulator. Signs of the trace product and
/// of the bath determinant are tracked separately; the sample sign is their
/// product.
pub struct MarkovChain<T: LocalTrace, B: Bath, L: Link> {
    beta: f64,
    n_site: usize,
    prob_flip: f64,
    rng: RngHandle,
    link: L,
    traces: Vec<T>,
    bath: B,
    sign_trace: i32,
    sign_bath: i32,
    acc: ChainAccumulators,
    attempted: Vec<u64>,
    accepted: Vec<u64>,
    flips_attempted: u64,
    flips_accepted: u64,
    restore: RestoreOutcome,
}

impl<T: LocalTrace, B: Bath, L: Link> MarkovChain<T, B, L> {
    /// Builds the chain, resuming from `<checkpoint_dir>/config_<rank>.json`
    /// when a usable checkpoint exists.
    ///
    /// Fails only when the checkpoint was written for another `beta` or
    /// another number of sites.
    pub fn new(params: ChainParams<T::Params>, link: L, checkpoint_dir: &Path) -> Result<Self, QmcError> {
        let path = checkpoint::checkpoint_path(checkpoint_dir, params.rank);
        let load = checkpoint::load::<T::Snapshot>(&path, params.beta, params.n_site)?;
        let n_site = params.n_site;

        let mut chain = Self {
            beta: params.beta,
            n_site,
            prob_flip: params.prob_flip,
            rng: RngHandle::for_worker(params.seed, params.rank),
            link,
            traces: (0..n_site).map(|site| T::new(&params.trace, site)).collect(),
            bath: B::default(),
            sign_trace: 1,
            sign_bath: 1,
            acc: ChainAccumulators::new(n_site, params.max_order, params.chi_frequencies),
            attempted: vec![0; 2 * n_site],
            accepted: vec![0; 2 * n_site],
            flips_attempted: 0,
            flips_accepted: 0,
            restore: RestoreOutcome::Fresh {
                reason: FreshReason::NoCheckpoint,
            },
        };

        match load {
            CheckpointLoad::Missing => {
                info!(path = %path.display(), "no checkpoint found; starting from an empty configuration");
            }
            CheckpointLoad::Malformed(info) => {
                warn!(path = %path.display(), error = %info, "unusable checkpoint; starting from an empty configuration");
                chain.restore = RestoreOutcome::Fresh {
                    reason: FreshReason::Malformed(info),
                };
            }
            CheckpointLoad::Valid(document) => {
                match Self::restore_traces(&params.trace, document.sites) {
                    Ok(traces) => {
                        chain.traces = traces;
                        chain.sign_trace = chain.traces.iter().map(|trace| trace.sign()).product();
                        register_all(&mut chain.bath, &chain.traces);
                        chain.sign_bath = chain.bath.rebuild(&chain.link);
                        let operators = chain.operator_count();
                        info!(path = %path.display(), operators, "configuration restored");
                        chain.restore = RestoreOutcome::Restored { operators };
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "checkpoint rejected by trace; starting from an empty configuration");
                        chain.restore = RestoreOutcome::Fresh {
                            reason: FreshReason::Malformed(err.info().clone()),
                        };
                    }
                }
            }
        }
        Ok(chain)
    }

    fn restore_traces(params: &T::Params, sites: Vec<T::Snapshot>) -> Result<Vec<T>, QmcError> {
        sites
            .into_iter()
            .enumerate()
            .map(|(site, snapshot)| T::restore(params, site, snapshot))
            .collect()
    }

    /// Performs one Monte Carlo update.
    pub fn do_update(&mut self) {
        let site = self.rng.index(self.n_site);

        if self.rng.uniform() < self.prob_flip {
            let proposal = if self.rng.uniform() < 0.5 {
                FlipProposal::Spin { site }
            } else {
                // one site: a self swap, accepted with weight 1
                let other = self.rng.index(self.n_site.saturating_sub(1));
                FlipProposal::sites(site, other, self.n_site)
            };
            self.try_flip(proposal);
            return;
        }

        let spin = Spin::from_index(self.rng.index(2));
        self.attempted[2 * site + spin.index()] += 1;
        let empty = self.traces[site].operators(spin).is_empty();
        match LocalMove::choose(empty, self.rng.uniform()) {
            LocalMove::Insert => {
                self.insert(site, spin);
            }
            LocalMove::Erase => {
                self.erase(site, spin);
            }
            LocalMove::Skip => {}
        }
    }

    // Accepted iff ln(1 - u) < trace ratio + bath ratio.
    fn insert(&mut self, site: usize, spin: Spin) -> bool {
        let trace = &mut self.traces[site];
        let trace_ratio = trace.insert(spin, &mut self.rng);
        let (Some(annihilator), Some(creator)) = (trace.op().copied(), trace.op_dagg().copied()) else {
            trace.reject_insert(spin);
            return false;
        };
        let prob = trace_ratio + self.bath.insert(site, spin, &annihilator, &creator, &self.link);

        if (1.0 - self.rng.uniform()).ln() < prob {
            self.sign_trace *= trace.accept_insert(spin);
            self.sign_bath *= self.bath.accept_insert();
            self.accepted[2 * site + spin.index()] += 1;
            true
        } else {
            trace.reject_insert(spin);
            self.bath.reject_insert();
            false
        }
    }

    fn erase(&mut self, site: usize, spin: Spin) -> bool {
        let trace = &mut self.traces[site];
        let trace_ratio = trace.erase(spin, &mut self.rng);
        let (Some(annihilator), Some(creator)) = (trace.op().copied(), trace.op_dagg().copied()) else {
            trace.reject_erase(spin);
            return false;
        };
        let prob = trace_ratio + self.bath.erase(site, spin, annihilator.time, creator.time);

        if (1.0 - self.rng.uniform()).ln() < prob {
            self.sign_trace *= trace.accept_erase(spin);
            self.sign_bath *= self.bath.accept_erase();
            self.accepted[2 * site + spin.index()] += 1;
            true
        } else {
            trace.reject_erase(spin);
            self.bath.reject_erase();
            false
        }
    }

    /// Applies `proposal` and accepts it with probability `|det(new) / det(old)|`.
    ///
    /// On rejection the proposal is applied a second time, which restores the
    /// original arrangement.
    pub fn try_flip(&mut self, proposal: FlipProposal) -> bool {
        self.flips_attempted += 1;
        proposal.apply(&mut self.traces);

        let mut candidate = B::default();
        register_all(&mut candidate, &self.traces);
        candidate.rebuild(&self.link);

        let weight = (candidate.det() / self.bath.det()).abs();
        if self.rng.uniform() < weight {
            self.sign_trace = self.traces.iter().map(|trace| trace.sign()).product();
            self.sign_bath = if candidate.det() > 0.0 { 1 } else { -1 };
            self.bath = candidate;
            self.flips_accepted += 1;
            debug!(?proposal, weight, "flip accepted");
            true
        } else {
            proposal.apply(&mut self.traces);
            false
        }
    }

    /// Accumulates one sample of every observable.
    pub fn measure(&mut self) {
        let sign = self.sign();
        let weight = f64::from(sign);
        self.acc.sign += weight;

        let mut order = 0;
        let mut responses = Vec::with_capacity(self.n_site);
        for trace in &mut self.traces {
            responses.push(trace.measure(sign));
            order += (trace.operators(Spin::Up).len() + trace.operators(Spin::Down).len()) / 2;
        }
        self.acc.record_responses(&responses, weight);
        self.acc.record_order(order, weight);

        self.link.measure(sign, &mut self.bath.entries());
    }

    /// Normalizes the accumulators by `count`, emits every series into `sink`
    /// and resets the accumulators.
    pub fn store(&mut self, sink: &mut Measurements, count: usize) {
        if count == 0 {
            warn!("store requested without measurements; nothing emitted");
            return;
        }
        let norm = count as f64;

        sink.push_scalar("Sign", self.acc.sign / norm);
        sink.push_vector(
            "pK",
            self.acc.order_histogram.iter().map(|value| value / norm).collect(),
        );

        let diagonal: Vec<Vec<f64>> = self.traces.iter().map(|trace| trace.chi()).collect();
        sink.push_vector("Chiij", self.acc.normalized_chi(self.beta, &diagonal, count));

        for (site, trace) in self.traces.iter_mut().enumerate() {
            trace.store(sink, site, &mut self.acc.local, count);
        }

        let local = &mut self.acc.local;
        local.average_over_sites(self.n_site);
        sink.push_scalar("k", local.k);
        sink.push_scalar("N", local.n);
        sink.push_scalar("D", local.d);
        sink.push_scalar("Sz", local.sz);
        sink.push_scalar("Chi0", local.chi.first().copied().unwrap_or(0.0));
        if local.chi.len() > 1 {
            sink.push_vector("Chi", local.chi.clone());
        }

        self.acc.reset();
        self.link.store(sink, count);
    }

    /// Rebuilds the bath from scratch and resets the bath sign.
    pub fn clean_update(&mut self) {
        self.sign_bath = self.bath.rebuild(&self.link);
    }

    /// Verifies that the bath holds exactly the operators of the traces.
    pub fn consistency_check(&self) -> Result<(), QmcError> {
        let key = |entry: &FlavoredOperator| {
            (
                entry.site,
                entry.spin,
                entry.op.kind,
                entry.op.id,
                entry.op.time.to_bits(),
            )
        };
        let mut expected: Vec<_> = self
            .traces
            .iter()
            .enumerate()
            .flat_map(|(site, trace)| {
                Spin::ALL.into_iter().flat_map(move |spin| {
                    trace
                        .operators(spin)
                        .iter()
                        .map(move |op| FlavoredOperator::new(site, spin, *op))
                })
            })
            .map(|entry| key(&entry))
            .collect();
        let mut registered: Vec<_> = self.bath.registered().iter().map(key).collect();
        expected.sort();
        registered.sort();

        if expected == registered {
            return Ok(());
        }
        let missing = expected.iter().find(|entry| !registered.contains(entry));
        let extra = registered.iter().find(|entry| !expected.contains(entry));
        Err(QmcError::Bath(
            ErrorInfo::new("operator-mismatch", "bath and traces disagree on the operator set")
                .with_context("trace_operators", expected.len().to_string())
                .with_context("bath_operators", registered.len().to_string())
                .with_context("missing_in_bath", format!("{missing:?}"))
                .with_context("unknown_to_traces", format!("{extra:?}")),
        ))
    }

    /// Logs acceptance ratios and persists the configuration to `path`.
    pub fn finish(self, path: &Path) -> Result<AcceptanceSummary, QmcError> {
        let summary = self.acceptance();
        for channel in &summary.channels {
            info!(site = channel.site, spin = ?channel.spin, ratio = channel.ratio, "local acceptance");
        }
        info!(ratio = summary.flip_ratio, "flip acceptance");

        let document = Checkpoint {
            beta: self.beta,
            n_site: self.n_site,
            key: CHECKPOINT_KEY,
            sites: self.traces.iter().map(|trace| trace.snapshot()).collect(),
        };
        document.store(path)?;
        Ok(summary)
    }

    /// Current acceptance statistics.
    pub fn acceptance(&self) -> AcceptanceSummary {
        let channels = (0..2 * self.n_site)
            .map(|idx| ChannelAcceptance {
                site: idx / 2,
                spin: Spin::from_index(idx % 2),
                attempted: self.attempted[idx],
                accepted: self.accepted[idx],
                ratio: ratio(self.accepted[idx], self.attempted[idx]),
            })
            .collect();
        AcceptanceSummary {
            channels,
            flips_attempted: self.flips_attempted,
            flips_accepted: self.flips_accepted,
            flip_ratio: ratio(self.flips_accepted, self.flips_attempted),
        }
    }

    /// Sample sign, the product of trace and bath signs.
    pub fn sign(&self) -> i32 {
        self.sign_trace * self.sign_bath
    }

    /// Product of the site trace signs.
    pub fn sign_trace(&self) -> i32 {
        self.sign_trace
    }

    /// Sign of the bath determinant.
    pub fn sign_bath(&self) -> i32 {
        self.sign_bath
    }

    /// Inverse temperature.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Number of sites.
    pub fn n_site(&self) -> usize {
        self.n_site
    }

    /// Site traces in site order.
    pub fn traces(&self) -> &[T] {
        &self.traces
    }

    /// The bath.
    pub fn bath(&self) -> &B {
        &self.bath
    }

    /// The link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// How the initial configuration was obtained.
    pub fn restore_outcome(&self) -> &RestoreOutcome {
        &self.restore
    }

    /// Total number of operators over all sites and spins.
    pub fn operator_count(&self) -> usize {
        self.traces
            .iter()
            .map(|trace| trace.operators(Spin::Up).len() + trace.operators(Spin::Down).len())
            .sum()
    }
}

fn register_all<T: LocalTrace, B: Bath>(bath: &mut B, traces: &[T]) {
    for (site, trace) in traces.iter().enumerate() {
        for spin in Spin::ALL {
            for op in trace.operators(spin) {
                if op.kind.is_creation() {
                    bath.add_dagg(site, spin, op);
                } else {
                    bath.add(site, spin, op);
                }
            }
        }
    }
}
