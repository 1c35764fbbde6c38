//! Runs a full replicate x SNR x method sweep.
//!
//! Usage: `cargo run --example snr_sweep [config.toml]`
//! Records go to stdout as CSV, the summary table to stderr.

use std::io;

use support_recovery::{
    aggregate::{write_records_csv, write_summary_csv},
    Experiment, ExperimentConfig, summarize,
};

const DEFAULT_CONFIG: &str = r#"
n = 100
p = 20
rho = 0.35
snr_values = [0.05, 0.25, 1.22, 6.0]
sparsity = 5
replicates = 5
seed = 42
methods = ["Lasso.1se", "Lasso.min", "Relaxed", "RF"]

[pattern]
kind = "equally_spaced"

[forest]
n_trees = 200
n_workers = 4
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let text = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_CONFIG.to_string(),
    };
    let config = ExperimentConfig::from_toml_str(&text)?;
    let experiment = Experiment::new(config)?;

    let records = experiment.run()?;
    write_records_csv(&records, io::stdout().lock())?;

    let summary = summarize(&records, experiment.true_sparsity())?;
    write_summary_csv(&summary, io::stderr().lock())?;

    Ok(())
}
