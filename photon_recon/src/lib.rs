//! Photon-count image reconstruction.
//!
//! Reconstructs a sparse, noisy single-photon-counting image by searching for
//! the pixel matrix that maximizes the Poisson log-likelihood of the observed
//! counts minus a weighted DCT-domain sparsity penalty (Morris et al.,
//! "Imaging with a small number of photons").
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use photon_recon::{ReconstructionConfig, StochasticOptimizer};
//!
//! let config = ReconstructionConfig::default().with_seed(42);
//! let optimizer = StochasticOptimizer::from_observed(counts, config)?;
//! let result = optimizer.run_to_completion()?;
//!
//! println!("merit {} after {} iterations", result.merit, result.iterations);
//! ```

pub mod config;
pub mod dct;
pub mod error;
pub mod likelihood;
pub mod optimizer;
pub mod progress;
pub mod sparsity;
pub mod trial;

#[cfg(test)]
pub(crate) mod testing;

pub use common::Buffer2;

pub use config::{ReconstructionConfig, ScalingInit};
pub use dct::{DctEngine, TransformDirection};
pub use error::{ConfigError, Error, ProtocolError, Result, SizeError};
pub use likelihood::{full_log_likelihood, per_pixel_log_likelihood, LogLikelihoodTracker};
pub use optimizer::{
    merit, ConsistencyReports, OptimizerState, ReconstructionResult, StepOutcome,
    StochasticOptimizer,
};
pub use progress::{CancellationToken, NoopObserver, Progress, ProgressObserver};
pub use sparsity::{CoefficientAggregate, SparsityTracker};
pub use trial::{ConsistencyReport, Modification, TrialState};
