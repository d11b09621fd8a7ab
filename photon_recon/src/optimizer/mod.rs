//! Stochastic search for the reconstruction that maximizes
//! `log_likelihood − λ · sparsity`.
//!
//! Each iteration proposes a new value for one random pixel, scores it
//! through both trackers and keeps it only if the merit strictly improves.
//! Every `iterations_per_check` iterations the acceptance ratio of the
//! window is compared with `modification_threshold`; below it the proposal
//! step size decays by `decay_factor`. The run converges once the step size
//! drops below `initial / cutoff_divisor`.
//!
//! The loop is single-threaded: every iteration depends on the state
//! committed by the previous one.


use common::Buffer2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::config::{ReconstructionConfig, ScalingInit};
use crate::error::{check_dimensions, Result};
use crate::likelihood::LogLikelihoodTracker;
use crate::progress::{CancellationToken, NoopObserver, Progress, ProgressObserver};
use crate::sparsity::SparsityTracker;
use crate::trial::ConsistencyReport;

/// `log_likelihood − λ · sparsity`.
#[inline]
pub fn merit(log_likelihood: f64, sparsity: f64, regularization_factor: f64) -> f64 {
    log_likelihood - regularization_factor * sparsity
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerState {
    Iterating,
    /// Step size fell below the cutoff.
    Converged,
    /// Stopped through the cancellation token.
    Cancelled,
}

impl OptimizerState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OptimizerState::Iterating)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Accepted,
    /// Candidate merit did not exceed the current merit.
    Rejected,
    /// Candidate merit was NaN or infinite.
    RejectedNonFinite,
    /// The optimizer is in a terminal state; nothing was done.
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructionResult {
    pub image: Buffer2<u32>,
    pub merit: f64,
    pub log_likelihood: f64,
    pub sparsity: f64,
    pub iterations: u64,
    pub accepted: u64,
    pub decay_events: u32,
    pub state: OptimizerState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsistencyReports {
    pub log_likelihood: ConsistencyReport,
    pub sparsity: ConsistencyReport,
}

/// Candidate value `round(|(U − bias) · scaling + current|)`.
pub(crate) fn propose_value(current: u32, uniform: f64, bias: f64, scaling: f64) -> u32 {
    // saturating cast; the absolute value already keeps it non-negative
    ((uniform - bias) * scaling + current as f64).abs().round() as u32
}

/// Strict improvement; ties and non-finite merits are rejected.
pub(crate) fn judge(candidate_merit: f64, current_merit: f64) -> StepOutcome {
    if !candidate_merit.is_finite() {
        StepOutcome::RejectedNonFinite
    } else if candidate_merit > current_merit {
        StepOutcome::Accepted
    } else {
        StepOutcome::Rejected
    }
}

/// `scaling <= cutoff` up to a relative 1e-9, so that `initial · rⁿ` lands on
/// the cutoff when `K` is an exact power of `1 / r`.
pub(crate) fn reached_cutoff(scaling_value: f64, scaling_cutoff: f64) -> bool {
    scaling_value <= scaling_cutoff * (1.0 + CUTOFF_TOLERANCE)
}

const CUTOFF_TOLERANCE: f64 = 1e-9;

fn initial_scaling(init: ScalingInit, working: &Buffer2<u32>) -> f64 {
    match init {
        ScalingInit::HalfMaxPixel => {
            let max = working.pixels().iter().copied().max().unwrap_or(0);
            // floored at 1: images whose max count is 0 or 1 still get unit steps
            (max as f64 / 2.0).max(1.0)
        }
        ScalingInit::Fixed(value) => value,
    }
}

#[derive(Debug)]
pub struct StochasticOptimizer {
    config: ReconstructionConfig,
    working: Buffer2<u32>,
    sparsity: SparsityTracker,
    likelihood: LogLikelihoodTracker,
    rng: ChaCha8Rng,
    cancellation: Option<CancellationToken>,
    state: OptimizerState,

    merit: f64,
    scaling_value: f64,
    scaling_cutoff: f64,

    iteration_count: u64,
    accepted_total: u64,
    window_iterations: usize,
    window_accepted: usize,
    window_count: usize,
    decay_events: u32,
}

impl StochasticOptimizer {
    /// Builds both trackers over `working` (the seed image, typically a
    /// preprocessed copy of `observed`).
    pub fn new(
        observed: Buffer2<u32>,
        working: Buffer2<u32>,
        config: ReconstructionConfig,
    ) -> Result<Self> {
        config.validate()?;
        check_dimensions(observed.dimensions(), working.dimensions())?;

        let sparsity = SparsityTracker::new(config.block_size, &working)?;
        let likelihood = LogLikelihoodTracker::new(observed, &working, config.dark_count_rate)?;

        let merit = merit(
            likelihood.log_likelihood(),
            sparsity.sparsity(),
            config.regularization_factor,
        );
        let scaling_value = initial_scaling(config.initial_scaling, &working);
        let scaling_cutoff = scaling_value / config.cutoff_divisor;

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };

        tracing::info!(
            width = working.width(),
            height = working.height(),
            block_size = config.block_size,
            regularization_factor = config.regularization_factor,
            scaling_value,
            scaling_cutoff,
            merit,
            "Starting reconstruction"
        );

        Ok(Self {
            config,
            working,
            sparsity,
            likelihood,
            rng,
            cancellation: None,
            state: OptimizerState::Iterating,
            merit,
            scaling_value,
            scaling_cutoff,
            iteration_count: 0,
            accepted_total: 0,
            window_iterations: 0,
            window_accepted: 0,
            window_count: 0,
            decay_events: 0,
        })
    }

    /// Starts from a copy of the observed counts.
    pub fn from_observed(observed: Buffer2<u32>, config: ReconstructionConfig) -> Result<Self> {
        let working = observed.clone();
        Self::new(observed, working, config)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    pub fn state(&self) -> OptimizerState {
        self.state
    }

    pub fn working(&self) -> &Buffer2<u32> {
        &self.working
    }

    pub fn observed(&self) -> &Buffer2<u32> {
        self.likelihood.observed()
    }

    pub fn merit(&self) -> f64 {
        self.merit
    }

    pub fn log_likelihood(&self) -> f64 {
        self.likelihood.log_likelihood()
    }

    pub fn sparsity(&self) -> f64 {
        self.sparsity.sparsity()
    }

    pub fn scaling_value(&self) -> f64 {
        self.scaling_value
    }

    pub fn scaling_cutoff(&self) -> f64 {
        self.scaling_cutoff
    }

    pub fn iteration_count(&self) -> u64 {
        self.iteration_count
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted_total
    }

    pub fn decay_events(&self) -> u32 {
        self.decay_events
    }

    pub fn step(&mut self) -> Result<StepOutcome> {
        self.step_with(&mut NoopObserver)
    }

    /// One propose/score/accept iteration; closes the window when due.
    pub fn step_with<O: ProgressObserver + ?Sized>(
        &mut self,
        observer: &mut O,
    ) -> Result<StepOutcome> {
        if self.state.is_terminal() {
            return Ok(StepOutcome::Finished);
        }

        let x = self.rng.random_range(0..self.working.width());
        let y = self.rng.random_range(0..self.working.height());
        let uniform: f64 = self.rng.random();
        let current = self.working[(x, y)];
        let candidate = propose_value(
            current,
            uniform,
            self.config.proposal_bias,
            self.scaling_value,
        );

        let outcome = if candidate == current {
            // exact tie; scoring it could only flip on rounding noise
            StepOutcome::Rejected
        } else {
            self.try_candidate(x, y, candidate)?
        };

        self.iteration_count += 1;
        self.window_iterations += 1;
        if self.window_iterations >= self.config.iterations_per_check {
            self.end_window(observer);
        }

        Ok(outcome)
    }

    /// Scores `candidate` at `(x, y)` and commits it when the merit improves.
    fn try_candidate(&mut self, x: usize, y: usize, candidate: u32) -> Result<StepOutcome> {
        let log_likelihood = self
            .likelihood
            .try_modification(&self.working, x, y, candidate)?;
        let sparsity = match self
            .sparsity
            .try_modification(&self.working, x, y, candidate)
        {
            Ok(sparsity) => sparsity,
            Err(e) => {
                self.likelihood.discard_modification();
                return Err(e);
            }
        };

        let candidate_merit = merit(
            log_likelihood,
            sparsity,
            self.config.regularization_factor,
        );
        let outcome = judge(candidate_merit, self.merit);

        if outcome == StepOutcome::Accepted {
            self.commit()?;
            self.merit = candidate_merit;
            self.accepted_total += 1;
            self.window_accepted += 1;
        } else {
            self.likelihood.discard_modification();
            self.sparsity.discard_modification();
        }

        Ok(outcome)
    }

    fn commit(&mut self) -> Result<()> {
        let modification = self.likelihood.perform_modification()?;
        let sparsity_modification = self.sparsity.perform_modification()?;
        debug_assert_eq!(modification, sparsity_modification);

        self.working[(modification.x, modification.y)] = modification.value;
        Ok(())
    }

    fn end_window<O: ProgressObserver + ?Sized>(&mut self, observer: &mut O) {
        let ratio = self.window_accepted as f64 / self.window_iterations as f64;
        if ratio < self.config.modification_threshold {
            self.scaling_value *= self.config.decay_factor;
            self.decay_events += 1;
        }

        self.window_iterations = 0;
        self.window_accepted = 0;
        self.window_count += 1;

        let progress = Progress {
            iteration: self.iteration_count,
            window_acceptance_ratio: ratio,
            scaling_value: self.scaling_value,
            scaling_cutoff: self.scaling_cutoff,
            merit: self.merit,
            decay_events: self.decay_events,
        };

        tracing::debug!(
            iteration = progress.iteration,
            acceptance_ratio = ratio,
            scaling_value = self.scaling_value,
            merit = self.merit,
            "Window finished"
        );

        observer.on_progress(&progress);
        let preview_interval = self.config.preview_interval;
        if preview_interval > 0 && self.window_count % preview_interval == 0 {
            observer.on_preview(&self.working);
        }

        if reached_cutoff(self.scaling_value, self.scaling_cutoff) {
            self.state = OptimizerState::Converged;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Iterates until convergence or cancellation.
    pub fn run<O: ProgressObserver + ?Sized>(
        mut self,
        observer: &mut O,
    ) -> Result<ReconstructionResult> {
        while !self.state.is_terminal() {
            if self.is_cancelled() {
                tracing::warn!(
                    iteration = self.iteration_count,
                    "Reconstruction cancelled"
                );
                self.state = OptimizerState::Cancelled;
                break;
            }
            self.step_with(observer)?;
        }

        tracing::info!(
            iterations = self.iteration_count,
            accepted = self.accepted_total,
            decay_events = self.decay_events,
            merit = self.merit,
            state = ?self.state,
            "Reconstruction finished"
        );

        Ok(self.into_result())
    }

    pub fn run_to_completion(self) -> Result<ReconstructionResult> {
        self.run(&mut NoopObserver)
    }

    /// Recomputes both trackers from the working matrix. O(W·H); diagnostics only.
    pub fn verify_consistency(&self) -> Result<ConsistencyReports> {
        Ok(ConsistencyReports {
            log_likelihood: self.likelihood.recompute_from_scratch(&self.working)?,
            sparsity: self.sparsity.recompute_from_scratch(&self.working)?,
        })
    }

    pub fn into_result(self) -> ReconstructionResult {
        ReconstructionResult {
            merit: self.merit,
            log_likelihood: self.likelihood.log_likelihood(),
            sparsity: self.sparsity.sparsity(),
            iterations: self.iteration_count,
            accepted: self.accepted_total,
            decay_events: self.decay_events,
            state: self.state,
            image: self.working,
        }
    }
}
