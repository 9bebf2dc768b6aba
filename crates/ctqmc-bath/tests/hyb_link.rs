use std::f64::consts::PI;
use std::fs;

use ctqmc_bath::{load_hybridization, HybEntry, HybFunction, HybLink, HybMatrix, LinkParams};
use ctqmc_core::{Bath, FlavoredOperator, Link, Measurements, Operator, OperatorId, Spin};
use indexmap::IndexMap;
use tempfile::tempdir;

const BETA: f64 = 10.0;

/// Pure `1/(i w)` tail: `Delta(tau) = -1/2` on the whole interval.
fn tail_only(beta: f64, frequencies: usize) -> HybEntry {
    let imag = (0..frequencies)
        .map(|n| -beta / (PI * (2 * n + 1) as f64))
        .collect();
    HybEntry {
        beta,
        first_moment: 1.0,
        second_moment: 0.0,
        real: vec![0.0; frequencies],
        imag,
    }
}

fn params() -> LinkParams {
    LinkParams {
        beta: BETA,
        hyb_cutoff: 4.0,
        green_frequencies: 4,
    }
}

fn diagonal_table() -> Vec<Vec<String>> {
    vec![
        vec!["hyb".to_string(), "empty".to_string()],
        vec!["empty".to_string(), "hyb".to_string()],
    ]
}

fn flavored(spin: Spin, op: Operator) -> FlavoredOperator {
    FlavoredOperator::new(0, spin, op)
}

#[test]
fn tail_only_hybridization_is_constant() {
    let function = HybFunction::new(&tail_only(BETA, 64), BETA, 4.0).unwrap();
    assert_eq!(function.points(), (16.0 * BETA) as usize + 2);
    for tau in [0.0, 0.3, 2.5, 7.1, 9.99] {
        assert!((function.get(tau) + 0.5).abs() < 1e-9, "tau = {tau}");
    }
    assert!((function.antiperiodic(-1.0) - 0.5).abs() < 1e-9);
}

#[test]
fn resampling_interpolates_between_temperatures() {
    let entry = HybEntry {
        beta: 5.0,
        first_moment: 0.0,
        second_moment: 0.0,
        real: vec![1.0, 3.0, 5.0],
        imag: vec![0.0, 0.0, 0.0],
    };
    let samples = entry.resample(10.0).unwrap();
    // w_0 at beta 10 lies halfway below the first input frequency.
    assert!((samples[0].re - 0.5).abs() < 1e-12);
    assert!((samples[1].re - 1.5).abs() < 1e-12);
    assert!(samples.iter().all(|value| value.im == 0.0));

    let broken = HybEntry {
        imag: vec![0.0],
        ..entry
    };
    let err = broken.resample(10.0).unwrap_err();
    assert_eq!(err.info().code, "hyb-length-mismatch");
}

#[test]
fn link_resolves_components_by_flavor() {
    let mut entries = IndexMap::new();
    entries.insert("hyb".to_string(), tail_only(BETA, 64));
    let link = HybLink::new(params(), 1, &diagonal_table(), &entries).unwrap();
    assert_eq!(link.component_names().collect::<Vec<_>>(), vec!["hyb"]);

    let c = Operator::annihilation(3.0, OperatorId::from_raw(0));
    let cdag = Operator::creation(1.0, OperatorId::from_raw(1));
    let same = link.hybridization(&flavored(Spin::Up, c), &flavored(Spin::Up, cdag));
    assert!((same + 0.5).abs() < 1e-9);
    let crossed = link.hybridization(&flavored(Spin::Up, c), &flavored(Spin::Down, cdag));
    assert_eq!(crossed, 0.0);
}

#[test]
fn link_rejects_incomplete_inputs() {
    let entries = IndexMap::new();
    let err = HybLink::new(params(), 1, &diagonal_table(), &entries).unwrap_err();
    assert_eq!(err.info().code, "link-missing-component");

    let err = HybLink::new(params(), 2, &diagonal_table(), &entries).unwrap_err();
    assert_eq!(err.info().code, "link-shape");
}

#[test]
fn green_function_estimator_from_single_segment() {
    let mut entries = IndexMap::new();
    entries.insert("hyb".to_string(), tail_only(BETA, 64));
    let mut link = HybLink::new(params(), 1, &diagonal_table(), &entries).unwrap();

    let mut bath = HybMatrix::default();
    let c = Operator::annihilation(1.0, OperatorId::from_raw(0));
    let cdag = Operator::creation(0.0, OperatorId::from_raw(1));
    bath.add(0, Spin::Up, &c);
    bath.add_dagg(0, Spin::Up, &cdag);
    assert_eq!(bath.rebuild(&link), 1);
    // F = -Delta(1) = 1/2, so M = 2.
    assert!((bath.det() - 0.5).abs() < 1e-9);

    link.measure(1, &mut bath.entries());
    let mut sink = Measurements::new();
    link.store(&mut sink, 1);

    let re = sink.last("G_hyb_re").and_then(|s| s.as_vector()).unwrap().to_vec();
    let im = sink.last("G_hyb_im").and_then(|s| s.as_vector()).unwrap().to_vec();
    assert_eq!(re.len(), 4);
    // Two flavor pairs map onto "hyb"; only one carries data.
    let expected_re = -2.0 * (PI / BETA).cos() / BETA / 2.0;
    let expected_im = -2.0 * (PI / BETA).sin() / BETA / 2.0;
    assert!((re[0] - expected_re).abs() < 1e-9);
    assert!((im[0] - expected_im).abs() < 1e-9);
}

#[test]
fn hybridization_file_uses_moment_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hyb.json");
    fs::write(
        &path,
        r#"{"hyb": {"beta": 10.0, "First Moment": 1.0, "Second Moment": 0.25, "real": [0.1, 0.2], "imag": [-0.3, -0.1]}}"#,
    )
    .unwrap();
    let entries = load_hybridization(&path).unwrap();
    let entry = &entries["hyb"];
    assert_eq!(entry.first_moment, 1.0);
    assert_eq!(entry.second_moment, 0.25);

    let err = load_hybridization(&dir.path().join("missing.json")).unwrap_err();
    assert_eq!(err.info().code, "hyb-read");
}
