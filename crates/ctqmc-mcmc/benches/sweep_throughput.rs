use std::f64::consts::PI;
use std::fs;

use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;

use ctqmc_mcmc::{build_chain, NumericsConfig, OutputConfig, PhysicsConfig, RunConfig, ScheduleConfig};

const BETA: f64 = 10.0;

fn write_bath(path: &std::path::Path) {
    let imag: Vec<f64> = (0..200)
        .map(|n| {
            let omega = PI * (2 * n + 1) as f64 / BETA;
            -((omega * omega + 4.0).sqrt() - omega) / 2.0
        })
        .collect();
    let document = json!({
        "hyb": {
            "beta": BETA,
            "First Moment": 1.0,
            "Second Moment": 0.0,
            "real": vec![0.0; 200],
            "imag": imag,
        }
    });
    fs::write(path, serde_json::to_string(&document).unwrap()).unwrap();
}

fn bench_config(dir: &std::path::Path, n_site: usize) -> RunConfig {
    let hyb = dir.join("hyb.json");
    write_bath(&hyb);
    let flavors = 2 * n_site;
    RunConfig {
        physics: PhysicsConfig {
            beta: BETA,
            mu: 1.0,
            u: 2.0,
        },
        numerics: NumericsConfig {
            seed: 42,
            ..NumericsConfig::default()
        },
        schedule: ScheduleConfig::default(),
        output: OutputConfig {
            directory: dir.join("out"),
        },
        link: (0..flavors)
            .map(|row| {
                (0..flavors)
                    .map(|col| if row == col { "hyb" } else { "empty" }.to_string())
                    .collect()
            })
            .collect(),
        hybridization_file: hyb,
    }
}

fn bench_sweep(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    for n_site in [1, 2] {
        let config = bench_config(dir.path(), n_site);
        let mut chain = build_chain(&config, 0).unwrap();
        for _ in 0..5_000 {
            chain.do_update();
        }
        c.bench_function(&format!("segment_sweep_{n_site}_site"), |b| {
            b.iter(|| {
                for _ in 0..1_000 {
                    chain.do_update();
                }
                chain.measure();
            })
        });
    }
}

criterion_group!(benches, bench_sweep);
criterion_main!(benches);
