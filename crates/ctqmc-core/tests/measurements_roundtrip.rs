use ctqmc_core::{Measurements, Sample};
use tempfile::tempdir;

#[test]
fn series_keep_emission_order() {
    let mut sink = Measurements::new();
    sink.push_scalar("Sign", 1.0);
    sink.push_vector("pK", vec![0.5, 0.5]);
    sink.push_scalar("N", 0.9);
    sink.push_scalar("Sign", 0.5);

    let names: Vec<&str> = sink.names().collect();
    assert_eq!(names, vec!["Sign", "pK", "N"]);
    assert_eq!(sink.series("Sign").unwrap().len(), 2);
    assert_eq!(sink.last("Sign"), Some(&Sample::Scalar(0.5)));
    assert_eq!(sink.mean("Sign"), Some(0.75));
    assert_eq!(sink.mean("pK"), None);
}

#[test]
fn vector_means_are_elementwise() {
    let mut sink = Measurements::new();
    sink.push_vector("pK", vec![1.0, 0.0]);
    sink.push_vector("pK", vec![0.0, 1.0]);
    assert_eq!(sink.mean_vector("pK"), Some(vec![0.5, 0.5]));
    assert_eq!(sink.mean_vector("missing"), None);
}

#[test]
fn sink_round_trips_through_json_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out").join("meas_0.json");

    let mut sink = Measurements::new();
    sink.push_scalar("Sign", 1.0);
    sink.push_vector("Chiij", vec![0.25, 0.125, 0.125, 0.25]);
    sink.write(&path).unwrap();

    let loaded = Measurements::load(&path).unwrap();
    assert_eq!(loaded, sink);
}

#[test]
fn extend_appends_samples() {
    let mut a = Measurements::new();
    a.push_scalar("N", 1.0);
    let mut b = Measurements::new();
    b.push_scalar("N", 3.0);
    b.push_scalar("D", 0.1);
    a.extend(b);
    assert_eq!(a.mean("N"), Some(2.0));
    assert_eq!(a.len(), 2);
}
