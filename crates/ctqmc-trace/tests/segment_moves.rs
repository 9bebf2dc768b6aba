use ctqmc_core::{LocalObservables, LocalTrace, Measurements, OperatorKind, RngHandle, Spin};
use ctqmc_trace::{ChannelRecord, SegmentTrace, TraceParams, TraceSnapshot};
use proptest::prelude::*;

fn params() -> TraceParams {
    TraceParams {
        beta: 10.0,
        mu: 0.7,
        u: 1.3,
        chi_frequencies: 3,
    }
}

fn records(pairs: &[(f64, f64)]) -> Vec<ChannelRecord> {
    let mut out: Vec<ChannelRecord> = pairs
        .iter()
        .flat_map(|&(start, end)| {
            [
                ChannelRecord {
                    time: start,
                    kind: OperatorKind::Creation,
                },
                ChannelRecord {
                    time: end,
                    kind: OperatorKind::Annihilation,
                },
            ]
        })
        .collect();
    out.sort_by(|a, b| a.time.total_cmp(&b.time));
    out
}

fn assert_well_formed(trace: &SegmentTrace, beta: f64) {
    for spin in Spin::ALL {
        let ops = trace.operators(spin);
        assert_eq!(ops.len() % 2, 0);
        for pair in ops.windows(2) {
            assert!(pair[0].time < pair[1].time);
            assert_ne!(pair[0].kind, pair[1].kind);
        }
        for op in ops {
            assert!(op.time >= 0.0 && op.time < beta);
        }
        if trace.is_full(spin) {
            assert!(ops.is_empty());
        }
    }
    assert!(trace.sign() == 1 || trace.sign() == -1);
}

// Erases with fresh streams until the single pair collapses to the wanted
// operator-free state.
fn erase_to(trace: &SegmentTrace, spin: Spin, full: bool) -> (f64, SegmentTrace) {
    for seed in 0..64 {
        let mut candidate = trace.clone();
        let mut rng = RngHandle::from_seed(seed);
        let ratio = candidate.erase(spin, &mut rng);
        candidate.accept_erase(spin);
        if candidate.is_full(spin) == full {
            return (ratio, candidate);
        }
    }
    panic!("no stream removed the pair as requested");
}

#[test]
fn insert_then_erase_ratios_cancel() {
    let params = params();
    let snapshot = TraceSnapshot {
        up: Vec::new(),
        down: records(&[(2.0, 6.0)]),
        ..Default::default()
    };
    let mut trace = SegmentTrace::restore(&params, 0, snapshot).unwrap();
    let mut rng = RngHandle::from_seed(3);

    let forward = trace.insert(Spin::Up, &mut rng);
    assert!(forward.is_finite());
    trace.accept_insert(Spin::Up);
    assert_eq!(trace.order(Spin::Up), 1);

    let (backward, emptied) = erase_to(&trace, Spin::Up, false);
    assert!((forward + backward).abs() < 1e-10);
    assert_eq!(emptied.order(Spin::Up), 0);
    assert_eq!(emptied.occupation(Spin::Up), 0.0);
}

#[test]
fn single_pair_collapses_to_a_full_line() {
    let params = params();
    let snapshot = TraceSnapshot {
        up: records(&[(3.0, 4.5)]),
        ..Default::default()
    };
    let trace = SegmentTrace::restore(&params, 0, snapshot).unwrap();

    let (ratio, full) = erase_to(&trace, Spin::Up, true);
    // removing the hole (4.5, 3.0) of length 8.5 with an empty partner channel
    let expected = (2.0 / (params.beta * params.beta)).ln() + params.mu * 8.5;
    assert!((ratio - expected).abs() < 1e-10);
    assert_eq!(full.order(Spin::Up), 0);
    assert!(full.operators(Spin::Up).is_empty());
    assert_eq!(full.occupation(Spin::Up), params.beta);
    assert_eq!(full.sign(), 1);
}

#[test]
fn full_line_grows_anti_segments_and_returns() {
    let params = params();
    let snapshot = TraceSnapshot {
        up_full: true,
        down: records(&[(2.0, 6.0)]),
        ..Default::default()
    };
    let mut trace = SegmentTrace::restore(&params, 0, snapshot).unwrap();
    assert_eq!(trace.occupation(Spin::Up), params.beta);
    assert!((trace.double_occupation() - 4.0).abs() < 1e-12);

    let mut rng = RngHandle::from_seed(11);
    let forward = trace.insert(Spin::Up, &mut rng);
    assert!(forward.is_finite());
    let hole_start = trace.op().unwrap().time;
    let hole_end = trace.op_dagg().unwrap().time;
    trace.accept_insert(Spin::Up);
    assert!(!trace.is_full(Spin::Up));
    assert_eq!(trace.order(Spin::Up), 1);
    let hole = (hole_end - hole_start).rem_euclid(params.beta);
    assert!((trace.occupation(Spin::Up) - (params.beta - hole)).abs() < 1e-10);

    let (backward, restored) = erase_to(&trace, Spin::Up, true);
    assert!((forward + backward).abs() < 1e-10);
    assert_eq!(restored.occupation(Spin::Up), params.beta);
}

#[test]
fn full_line_counts_as_occupied() {
    let params = params();
    let snapshot = TraceSnapshot {
        up_full: true,
        down: records(&[(1.0, 3.0)]),
        ..Default::default()
    };
    let mut trace = SegmentTrace::restore(&params, 2, snapshot).unwrap();
    // only the down segment has edges: |e^{3 i w} - e^{i w}| = 2 sin(w)
    let response = trace.measure(1);
    let omega = 2.0 * std::f64::consts::PI / params.beta;
    assert!((response[1].norm() - 2.0 * omega.sin()).abs() < 1e-10);

    let mut sink = Measurements::new();
    let mut acc = LocalObservables::new(params.chi_frequencies);
    trace.store(&mut sink, 2, &mut acc, 1);
    let value = |name: &str| sink.last(name).and_then(|sample| sample.as_scalar()).unwrap();
    assert!((value("N_2") - 1.2).abs() < 1e-12);
    assert!((value("Sz_2") - 0.8).abs() < 1e-12);
    assert!((value("D_2") - 0.2).abs() < 1e-12);
    assert!((value("k_2") - 1.0).abs() < 1e-12);
}

#[test]
fn rejected_proposals_leave_channels_untouched() {
    let params = params();
    let mut trace = SegmentTrace::new(&params, 0);
    let mut rng = RngHandle::from_seed(5);
    trace.insert(Spin::Down, &mut rng);
    assert!(trace.op().is_some());
    assert!(trace.op_dagg().is_some());
    trace.reject_insert(Spin::Down);
    assert!(trace.operators(Spin::Down).is_empty());
    assert!(trace.op().is_none());
}

#[test]
fn erase_on_empty_channel_is_impossible() {
    let mut trace = SegmentTrace::new(&params(), 0);
    let mut rng = RngHandle::from_seed(1);
    assert_eq!(trace.erase(Spin::Up, &mut rng), f64::NEG_INFINITY);
    assert!(trace.op().is_none());
}

#[test]
fn wrapping_segment_carries_negative_sign() {
    let snapshot = TraceSnapshot {
        up: records(&[(8.0, 2.0)]),
        down: records(&[(1.0, 3.0), (6.0, 9.0)]),
        ..Default::default()
    };
    let trace = SegmentTrace::restore(&params(), 0, snapshot).unwrap();
    assert_eq!(trace.sign(), -1);
}

#[test]
fn flip_swaps_channels_and_keeps_sign() {
    let snapshot = TraceSnapshot {
        up: records(&[(8.0, 2.0)]),
        down: records(&[(4.0, 5.0)]),
        ..Default::default()
    };
    let mut trace = SegmentTrace::restore(&params(), 0, snapshot).unwrap();
    let sign = trace.sign();
    trace.flip();
    assert_eq!(trace.operators(Spin::Up).len(), 2);
    assert!((trace.occupation(Spin::Down) - 4.0).abs() < 1e-12);
    assert!((trace.occupation(Spin::Up) - 1.0).abs() < 1e-12);
    assert_eq!(trace.sign(), sign);
}

#[test]
fn store_emits_normalized_site_series() {
    let params = params();
    let snapshot = TraceSnapshot {
        up: records(&[(1.0, 3.0)]),
        down: records(&[(2.0, 5.0)]),
        ..Default::default()
    };
    let mut trace = SegmentTrace::restore(&params, 4, snapshot).unwrap();
    trace.measure(1);

    let mut sink = Measurements::new();
    let mut acc = LocalObservables::new(params.chi_frequencies);
    trace.store(&mut sink, 4, &mut acc, 1);

    let value = |name: &str| sink.last(name).and_then(|sample| sample.as_scalar()).unwrap();
    assert!((value("N_4") - 0.5).abs() < 1e-12);
    assert!((value("Sz_4") + 0.1).abs() < 1e-12);
    assert!((value("D_4") - 0.1).abs() < 1e-12);
    assert!((value("k_4") - 2.0).abs() < 1e-12);
    assert!((value("Chi0_4") - 0.1).abs() < 1e-12);
    assert!((acc.n - 0.5).abs() < 1e-12);

    // Accumulators reset after a store.
    assert!(trace.chi().iter().all(|value| *value == 0.0));
}

#[test]
fn finite_frequency_susceptibility_matches_closed_form() {
    let params = params();
    let snapshot = TraceSnapshot {
        up: records(&[(0.0, 5.0)]),
        down: Vec::new(),
        ..Default::default()
    };
    let mut trace = SegmentTrace::restore(&params, 0, snapshot).unwrap();
    let response = trace.measure(1);
    // |e^{i pi} - 1|^2 = 4 at the first bosonic frequency.
    assert!((response[1].norm_sqr() - 4.0).abs() < 1e-10);

    let mut sink = Measurements::new();
    let mut acc = LocalObservables::new(params.chi_frequencies);
    trace.store(&mut sink, 0, &mut acc, 2);
    let expected = 10.0 * 4.0 / (4.0 * std::f64::consts::PI.powi(2)) / 2.0;
    assert!((acc.chi[1] - expected).abs() < 1e-10);
}

#[test]
fn restore_rejects_malformed_channels() {
    let params = params();
    let odd = TraceSnapshot {
        up: vec![ChannelRecord {
            time: 1.0,
            kind: OperatorKind::Creation,
        }],
        down: Vec::new(),
        ..Default::default()
    };
    let err = SegmentTrace::restore(&params, 0, odd).unwrap_err();
    assert_eq!(err.info().code, "odd-operator-count");

    let out_of_range = TraceSnapshot {
        up: records(&[(1.0, 12.0)]),
        down: Vec::new(),
        ..Default::default()
    };
    let err = SegmentTrace::restore(&params, 0, out_of_range).unwrap_err();
    assert_eq!(err.info().code, "time-out-of-range");

    let unsorted: Vec<ChannelRecord> = [1.0, 4.0, 2.0, 5.0]
        .iter()
        .enumerate()
        .map(|(idx, &time)| ChannelRecord {
            time,
            kind: if idx % 2 == 0 {
                OperatorKind::Creation
            } else {
                OperatorKind::Annihilation
            },
        })
        .collect();
    let err = SegmentTrace::restore(
        &params,
        0,
        TraceSnapshot {
            up: unsorted,
            down: Vec::new(),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert_eq!(err.info().code, "unsorted-channel");

    let crowded = TraceSnapshot {
        up: records(&[(1.0, 2.0)]),
        up_full: true,
        ..Default::default()
    };
    let err = SegmentTrace::restore(&params, 0, crowded).unwrap_err();
    assert_eq!(err.info().code, "full-channel-with-operators");
}

#[test]
fn full_flag_survives_json() {
    let snapshot = TraceSnapshot {
        up: records(&[(4.0, 5.0)]),
        down_full: true,
        ..Default::default()
    };
    let trace = SegmentTrace::restore(&params(), 0, snapshot.clone()).unwrap();
    assert!(trace.is_full(Spin::Down));
    let text = serde_json::to_string(&trace.snapshot()).unwrap();
    assert!(text.contains("down_full"));
    assert!(!text.contains("up_full"));
    let decoded: TraceSnapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(decoded, snapshot);
}

#[test]
fn snapshot_survives_json() {
    let snapshot = TraceSnapshot {
        up: records(&[(8.0, 2.0)]),
        down: records(&[(4.0, 5.0)]),
        ..Default::default()
    };
    let trace = SegmentTrace::restore(&params(), 0, snapshot.clone()).unwrap();
    let text = serde_json::to_string(&trace.snapshot()).unwrap();
    let decoded: TraceSnapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(decoded, snapshot);
}

proptest! {
    #[test]
    fn random_walks_preserve_segment_invariants(seed in any::<u64>(), steps in 1usize..200) {
        let params = params();
        let mut trace = SegmentTrace::new(&params, 0);
        let mut rng = RngHandle::from_seed(seed);
        for _ in 0..steps {
            let spin = Spin::from_index(rng.index(2));
            let accept = rng.uniform() < 0.5;
            if rng.uniform() < 0.5 {
                let ratio = trace.insert(spin, &mut rng);
                if accept && ratio.is_finite() {
                    trace.accept_insert(spin);
                } else {
                    trace.reject_insert(spin);
                }
            } else {
                let ratio = trace.erase(spin, &mut rng);
                if accept && ratio.is_finite() {
                    trace.accept_erase(spin);
                } else {
                    trace.reject_erase(spin);
                }
            }
            assert_well_formed(&trace, params.beta);
        }
        let restored = SegmentTrace::restore(&params, 0, trace.snapshot()).unwrap();
        prop_assert_eq!(restored.sign(), trace.sign());
        for spin in Spin::ALL {
            prop_assert_eq!(restored.is_full(spin), trace.is_full(spin));
            prop_assert!((restored.occupation(spin) - trace.occupation(spin)).abs() < 1e-12);
        }
    }
}
