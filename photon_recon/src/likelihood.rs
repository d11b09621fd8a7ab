//! Running Poisson log-likelihood of observed counts given a modeled image.

use common::Buffer2;
use statrs::function::factorial::ln_factorial;

use crate::error::{check_coordinate, check_dimensions, ConfigError, Result};
use crate::trial::{ConsistencyReport, Modification, TrialState};

/// `k·ln(v + d) − (v + d) − ln(k!)` for observed count `k`, modeled value `v`
/// and dark count rate `d`.
#[inline]
pub fn per_pixel_log_likelihood(observed: u32, modeled: u32, dark_count_rate: f64) -> f64 {
    let rate = modeled as f64 + dark_count_rate;
    observed as f64 * rate.ln() - rate - ln_factorial(observed as u64)
}

pub fn full_log_likelihood(
    observed: &Buffer2<u32>,
    working: &Buffer2<u32>,
    dark_count_rate: f64,
) -> f64 {
    debug_assert!(observed.same_dimensions(working));
    observed
        .pixels()
        .iter()
        .zip(working.pixels())
        .map(|(&k, &v)| per_pixel_log_likelihood(k, v, dark_count_rate))
        .sum()
}

pub fn validate_dark_count_rate(dark_count_rate: f64) -> Result<()> {
    if !(dark_count_rate.is_finite() && dark_count_rate > 0.0) {
        return Err(ConfigError::InvalidDarkCountRate(dark_count_rate).into());
    }
    Ok(())
}

/// Owns the observed counts; reads the working matrix from the caller, who
/// is responsible for writing committed values into it.
#[derive(Debug)]
pub struct LogLikelihoodTracker {
    observed: Buffer2<u32>,
    dark_count_rate: f64,
    total: f64,
    trial: TrialState<f64>,
}

impl LogLikelihoodTracker {
    pub fn new(
        observed: Buffer2<u32>,
        working: &Buffer2<u32>,
        dark_count_rate: f64,
    ) -> Result<Self> {
        check_dimensions(observed.dimensions(), working.dimensions())?;
        validate_dark_count_rate(dark_count_rate)?;

        let total = full_log_likelihood(&observed, working, dark_count_rate);

        Ok(Self {
            observed,
            dark_count_rate,
            total,
            trial: TrialState::Clean,
        })
    }

    pub fn log_likelihood(&self) -> f64 {
        self.total
    }

    pub fn observed(&self) -> &Buffer2<u32> {
        &self.observed
    }

    pub fn dark_count_rate(&self) -> f64 {
        self.dark_count_rate
    }

    pub fn has_pending_trial(&self) -> bool {
        self.trial.is_pending()
    }

    /// O(1) score of `working` with `(x, y)` set to `new_value`.
    pub fn try_modification(
        &mut self,
        working: &Buffer2<u32>,
        x: usize,
        y: usize,
        new_value: u32,
    ) -> Result<f64> {
        check_dimensions(self.observed.dimensions(), working.dimensions())?;
        check_coordinate(x, y, working.width(), working.height())?;
        self.trial.ensure_clean()?;

        let k = self.observed[(x, y)];
        let candidate = self.total
            - per_pixel_log_likelihood(k, working[(x, y)], self.dark_count_rate)
            + per_pixel_log_likelihood(k, new_value, self.dark_count_rate);

        self.trial.begin(
            Modification {
                x,
                y,
                value: new_value,
            },
            candidate,
        )?;

        Ok(candidate)
    }

    pub fn perform_modification(&mut self) -> Result<Modification> {
        let (modification, total) = self.trial.take()?;
        self.total = total;
        Ok(modification)
    }

    pub fn discard_modification(&mut self) {
        self.trial.discard();
    }

    pub fn recompute_from_scratch(&self, working: &Buffer2<u32>) -> Result<ConsistencyReport> {
        check_dimensions(self.observed.dimensions(), working.dimensions())?;

        let report = ConsistencyReport {
            tracked: self.total,
            recomputed: full_log_likelihood(&self.observed, working, self.dark_count_rate),
        };

        tracing::debug!(
            tracked = report.tracked,
            recomputed = report.recomputed,
            difference = report.difference(),
            "Log-likelihood consistency check"
        );

        Ok(report)
    }
}
