//! Error types for reconstruction.
//!
//! Configuration and size errors are raised at construction. Protocol errors
//! mean a tracker was driven out of order (commit without trial, second trial
//! while one is pending); they indicate a caller bug and are never retried.

use thiserror::Error;

/// Invalid configuration values or block geometry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Block size {0} is not a positive power of two")]
    InvalidBlockSize(usize),

    #[error("Matrix {width}x{height} is smaller than block size {block_size}")]
    MatrixTooSmall {
        width: usize,
        height: usize,
        block_size: usize,
    },

    #[error("Dark count rate must be finite and greater than zero, got {0}")]
    InvalidDarkCountRate(f64),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Matrices that must share dimensions do not.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeError {
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Trial/commit protocol violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("A trial modification at ({x}, {y}) is already pending")]
    TrialPending { x: usize, y: usize },

    #[error("No pending trial modification to commit")]
    NoPendingTrial,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Size(#[from] SizeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Coordinate ({x}, {y}) is outside the {width}x{height} matrix")]
    CoordinateOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn check_coordinate(x: usize, y: usize, width: usize, height: usize) -> Result<()> {
    if x >= width || y >= height {
        return Err(Error::CoordinateOutOfBounds {
            x,
            y,
            width,
            height,
        });
    }
    Ok(())
}

pub(crate) fn check_dimensions(expected: (usize, usize), actual: (usize, usize)) -> Result<()> {
    if expected != actual {
        return Err(SizeError::DimensionMismatch { expected, actual }.into());
    }
    Ok(())
}
