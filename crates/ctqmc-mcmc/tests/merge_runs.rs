mod common;

use ctqmc_core::Measurements;
use ctqmc_mcmc::{merge_files, merge_measurements, run_worker, Checkpoint};
use ctqmc_trace::TraceSnapshot;
use tempfile::tempdir;

fn sink(sign: &[f64], density: &[f64], green: &[Vec<f64>]) -> Measurements {
    let mut sink = Measurements::new();
    for ((s, n), g) in sign.iter().zip(density).zip(green) {
        sink.push_scalar("Sign", *s);
        sink.push_scalar("N", *n);
        sink.push_vector("G_hyb_im", g.clone());
    }
    sink
}

#[test]
fn merged_series_are_divided_by_the_mean_sign() {
    let first = sink(&[1.0, 0.5], &[0.8, 0.4], &[vec![-0.2, -0.1], vec![-0.4, -0.3]]);
    let second = sink(&[0.5], &[0.3], &[vec![-0.1, -0.1]]);
    let merged = merge_measurements(&[first, second]).unwrap();

    assert_eq!(merged.ranks, 2);
    // rank means: sign 0.75 / 0.5, N 0.6 / 0.3
    assert!((merged.sign - 0.625).abs() < 1e-12);
    assert!((merged.observables.mean("Sign").unwrap() - 0.625).abs() < 1e-12);
    assert!((merged.observables.mean("N").unwrap() - 0.45 / 0.625).abs() < 1e-12);
    let green = merged.observables.mean_vector("G_hyb_im").unwrap();
    assert!((green[0] - (-0.2 / 0.625)).abs() < 1e-12);
    assert!((green[1] - (-0.15 / 0.625)).abs() < 1e-12);
}

#[test]
fn merge_rejects_empty_input_and_missing_sign() {
    let err = merge_measurements(&[]).unwrap_err();
    assert_eq!(err.info().code, "merge-empty");

    let mut unsigned = Measurements::new();
    unsigned.push_scalar("N", 1.0);
    let err = merge_measurements(&[unsigned]).unwrap_err();
    assert_eq!(err.info().code, "merge-missing-sign");

    let zero = sink(&[0.0], &[0.0], &[vec![0.0]]);
    let err = merge_measurements(&[zero]).unwrap_err();
    assert_eq!(err.info().code, "merge-zero-sign");
}

#[test]
fn worker_outputs_merge_across_ranks() {
    let dir = tempdir().unwrap();
    let config = common::config(dir.path(), 1);
    let reports: Vec<_> = (0..2).map(|rank| run_worker(&config, rank).unwrap()).collect();
    let paths: Vec<_> = reports.iter().map(|report| report.measurements_path.clone()).collect();

    let merged = merge_files(paths.as_slice()).unwrap();
    assert_eq!(merged.ranks, 2);
    assert!(merged.sign > 0.0);
    let density = merged.observables.mean("N").unwrap();
    assert!(density > 0.0 && density < 2.0);

    let checkpoint: Checkpoint<TraceSnapshot> = Checkpoint::read(&reports[1].checkpoint_path).unwrap();
    assert_eq!(checkpoint.n_site, 1);
    assert_eq!(checkpoint.sites.len(), 1);
}

#[test]
fn missing_measurement_file_fails_to_merge() {
    let dir = tempdir().unwrap();
    let err = merge_files(vec![dir.path().join("measurements_9.json")].as_slice()).unwrap_err();
    assert_eq!(err.info().code, "measurements-read");
}
