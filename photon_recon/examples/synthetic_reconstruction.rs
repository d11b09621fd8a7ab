//! Example: reconstruct a synthetic low-light photon-count image.
//!
//! A bright disc on a dim background is sampled with Poisson noise, then
//! reconstructed with the stochastic optimizer. Progress is logged once per
//! window, and the run can be stopped early with `PHOTON_RECON_MAX_WINDOWS`.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --example synthetic_reconstruction
//! PHOTON_RECON_CONFIG=recon.yaml cargo run --release --example synthetic_reconstruction
//! ```
//!
//! The optional config file is YAML or JSON with any subset of
//! `ReconstructionConfig` fields.

use std::env;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use common::log_setup::{setup_logging, LogFile};
use photon_recon::{
    Buffer2, CancellationToken, Progress, ProgressObserver, ReconstructionConfig,
    StochasticOptimizer,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};

const SIZE: usize = 64;

struct LoggingObserver {
    windows: usize,
    max_windows: Option<usize>,
    cancel: CancellationToken,
}

impl ProgressObserver for LoggingObserver {
    fn on_progress(&mut self, progress: &Progress) {
        self.windows += 1;
        tracing::info!(
            iteration = progress.iteration,
            acceptance = progress.window_acceptance_ratio,
            scaling = progress.scaling_value,
            cutoff = progress.scaling_cutoff,
            merit = progress.merit,
            "Window"
        );
        if self.max_windows.is_some_and(|max| self.windows >= max) {
            self.cancel.cancel();
        }
    }

    fn on_preview(&mut self, image: &Buffer2<u32>) {
        let total: u64 = image.pixels().iter().map(|&v| v as u64).sum();
        tracing::info!(total_counts = total, "Preview");
    }
}

fn synthetic_counts(seed: u64) -> anyhow::Result<Buffer2<u32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let disc = Poisson::new(3.0)?;
    let background = Poisson::new(0.2)?;
    let center = SIZE as f64 / 2.0;

    Ok(Buffer2::from_fn(SIZE, SIZE, |x, y| {
        let r = ((x as f64 - center).powi(2) + (y as f64 - center).powi(2)).sqrt();
        let poisson = if r < SIZE as f64 / 4.0 { &disc } else { &background };
        poisson.sample(&mut rng) as u32
    }))
}

fn load_config() -> anyhow::Result<ReconstructionConfig> {
    match env::var("PHOTON_RECON_CONFIG") {
        Ok(path) => {
            let config: ReconstructionConfig = common::deserialize_file(Path::new(&path))
                .with_context(|| format!("Failed to load config from {}", path))?;
            Ok(config)
        }
        Err(_) => Ok(ReconstructionConfig::fast().with_seed(42).with_preview_interval(5)),
    }
}

fn main() -> anyhow::Result<()> {
    setup_logging(
        "info",
        Some(LogFile {
            dir: Path::new("logs"),
            prefix: "photon_recon",
        }),
    )?;

    let config = load_config()?;
    let max_windows = env::var("PHOTON_RECON_MAX_WINDOWS")
        .ok()
        .and_then(|v| v.parse().ok());

    let observed = synthetic_counts(7)?;
    let cancel = CancellationToken::new();
    let mut observer = LoggingObserver {
        windows: 0,
        max_windows,
        cancel: cancel.clone(),
    };

    let start = Instant::now();
    let result = StochasticOptimizer::from_observed(observed, config)?
        .with_cancellation(cancel)
        .run(&mut observer)?;

    tracing::info!(
        state = ?result.state,
        iterations = result.iterations,
        accepted = result.accepted,
        merit = result.merit,
        log_likelihood = result.log_likelihood,
        sparsity = result.sparsity,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Done"
    );

    Ok(())
}
