#![allow(dead_code)]

use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use ctqmc_mcmc::{NumericsConfig, OutputConfig, PhysicsConfig, RunConfig, ScheduleConfig};
use serde_json::json;

pub const BETA: f64 = 5.0;

/// Semicircular density of states with half bandwidth 2: `Delta = G / 1`
/// with `t = 1`, purely imaginary at half filling.
pub fn write_semicircle(path: &Path, beta: f64, frequencies: usize) {
    let imag: Vec<f64> = (0..frequencies)
        .map(|n| {
            let omega = PI * (2 * n + 1) as f64 / beta;
            -((omega * omega + 4.0).sqrt() - omega) / 2.0
        })
        .collect();
    let document = json!({
        "hyb": {
            "beta": beta,
            "First Moment": 1.0,
            "Second Moment": 0.0,
            "real": vec![0.0; frequencies],
            "imag": imag,
        }
    });
    fs::write(path, serde_json::to_string_pretty(&document).unwrap()).unwrap();
}

pub fn diagonal_link(n_site: usize) -> Vec<Vec<String>> {
    let flavors = 2 * n_site;
    (0..flavors)
        .map(|row| {
            (0..flavors)
                .map(|col| if row == col { "hyb" } else { "empty" }.to_string())
                .collect()
        })
        .collect()
}

/// Config for `n_site` sites writing into `dir`, with the hybridization file
/// created next to it.
pub fn config(dir: &Path, n_site: usize) -> RunConfig {
    let hyb = dir.join("hyb.json");
    write_semicircle(&hyb, BETA, 400);
    RunConfig {
        physics: PhysicsConfig {
            beta: BETA,
            mu: 1.0,
            u: 2.0,
        },
        numerics: NumericsConfig {
            seed: 7,
            prob_flip: 0.1,
            max_order: 40,
            chi_frequencies: 3,
            green_frequencies: 8,
            hyb_cutoff: 4.0,
        },
        schedule: ScheduleConfig {
            thermalization: 200,
            updates: 2_000,
            measure_interval: 5,
            store_every: 100,
            clean_interval: 250,
        },
        output: OutputConfig {
            directory: dir.join("out"),
        },
        link: diagonal_link(n_site),
        hybridization_file: hyb,
    }
}
