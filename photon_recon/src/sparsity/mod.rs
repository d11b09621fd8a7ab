//! Running DCT-domain sparsity of a whole image.
//!
//! The image is tiled into N×N blocks from (0, 0). Each block is transformed
//! with the orthonormal DCT and contributes `Σ|c|` and `Σc²` to a
//! [`CoefficientAggregate`]; the score is `(Σ|c|)² / Σc²` (Morris et al.,
//! "Imaging with a small number of photons"). A single-pixel change only
//! touches one block, so a trial costs two block transforms instead of a full
//! pass over the image.
//!
//! Cells of boundary blocks that fall outside the image are zero. Both the
//! full pass and the trial path read blocks through [`load_block`] so the
//! padding rule cannot diverge between them.

#[cfg(test)]
mod tests;

use std::ops::{Add, AddAssign, Sub};

use common::Buffer2;

use crate::dct::DctEngine;
use crate::error::{check_coordinate, check_dimensions, ConfigError, Result};
use crate::trial::{ConsistencyReport, Modification, TrialState};

/// `(Σ|c|, Σc²)` over a set of DCT coefficients.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoefficientAggregate {
    pub sum_abs: f64,
    pub sum_sq: f64,
}

impl CoefficientAggregate {
    pub fn from_coefficients(coefficients: &[f64]) -> Self {
        coefficients
            .iter()
            .fold(Self::default(), |acc, &c| Self {
                sum_abs: acc.sum_abs + c.abs(),
                sum_sq: acc.sum_sq + c * c,
            })
    }

    /// Aggregate over every block of `matrix`.
    pub fn of_matrix(engine: &DctEngine, matrix: &Buffer2<u32>) -> Self {
        let mut block = vec![0.0; engine.block_len()];
        let mut coefficients = vec![0.0; engine.block_len()];
        aggregate_matrix(engine, matrix, &mut block, &mut coefficients)
    }

    /// `(Σ|c|)² / Σc²`; an all-zero aggregate scores 0.
    pub fn sparsity(&self) -> f64 {
        if self.sum_sq <= 0.0 {
            return 0.0;
        }
        self.sum_abs * self.sum_abs / self.sum_sq
    }
}

impl Add for CoefficientAggregate {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            sum_abs: self.sum_abs + rhs.sum_abs,
            sum_sq: self.sum_sq + rhs.sum_sq,
        }
    }
}

impl AddAssign for CoefficientAggregate {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for CoefficientAggregate {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            sum_abs: self.sum_abs - rhs.sum_abs,
            sum_sq: self.sum_sq - rhs.sum_sq,
        }
    }
}

/// Copies the N×N block with top-left corner `(origin_x, origin_y)` into
/// `block`, zero-filling cells outside the matrix.
fn load_block(
    matrix: &Buffer2<u32>,
    origin_x: usize,
    origin_y: usize,
    block_size: usize,
    block: &mut [f64],
) {
    for row in 0..block_size {
        let y = origin_y + row;
        let line = &mut block[row * block_size..(row + 1) * block_size];
        if y >= matrix.height() {
            line.fill(0.0);
            continue;
        }
        let source = matrix.row(y);
        for (col, cell) in line.iter_mut().enumerate() {
            *cell = source.get(origin_x + col).map_or(0.0, |&v| v as f64);
        }
    }
}

fn aggregate_matrix(
    engine: &DctEngine,
    matrix: &Buffer2<u32>,
    block: &mut [f64],
    coefficients: &mut [f64],
) -> CoefficientAggregate {
    let n = engine.block_size();
    let mut total = CoefficientAggregate::default();

    for origin_y in (0..matrix.height()).step_by(n) {
        for origin_x in (0..matrix.width()).step_by(n) {
            load_block(matrix, origin_x, origin_y, n, block);
            engine.forward_into(block, coefficients);
            total += CoefficientAggregate::from_coefficients(coefficients);
        }
    }

    total
}

#[derive(Debug)]
pub struct SparsityTracker {
    engine: DctEngine,
    width: usize,
    height: usize,
    aggregate: CoefficientAggregate,
    sparsity: f64,
    trial: TrialState<CoefficientAggregate>,
    block: Vec<f64>,
    coefficients: Vec<f64>,
}

impl SparsityTracker {
    pub fn new(block_size: usize, matrix: &Buffer2<u32>) -> Result<Self> {
        let engine = DctEngine::new(block_size)?;
        if matrix.width() < block_size || matrix.height() < block_size {
            return Err(ConfigError::MatrixTooSmall {
                width: matrix.width(),
                height: matrix.height(),
                block_size,
            }
            .into());
        }

        let mut block = vec![0.0; engine.block_len()];
        let mut coefficients = vec![0.0; engine.block_len()];
        let aggregate = aggregate_matrix(&engine, matrix, &mut block, &mut coefficients);

        Ok(Self {
            engine,
            width: matrix.width(),
            height: matrix.height(),
            aggregate,
            sparsity: aggregate.sparsity(),
            trial: TrialState::Clean,
            block,
            coefficients,
        })
    }

    pub fn sparsity(&self) -> f64 {
        self.sparsity
    }

    pub fn aggregate(&self) -> CoefficientAggregate {
        self.aggregate
    }

    pub fn block_size(&self) -> usize {
        self.engine.block_size()
    }

    pub fn has_pending_trial(&self) -> bool {
        self.trial.is_pending()
    }

    /// Scores `matrix` with `(x, y)` set to `new_value` without committing.
    ///
    /// `matrix` must be the matrix the tracker was built from, in its current
    /// committed state.
    pub fn try_modification(
        &mut self,
        matrix: &Buffer2<u32>,
        x: usize,
        y: usize,
        new_value: u32,
    ) -> Result<f64> {
        check_dimensions((self.width, self.height), matrix.dimensions())?;
        check_coordinate(x, y, self.width, self.height)?;
        self.trial.ensure_clean()?;

        let n = self.engine.block_size();
        let origin_x = x - x % n;
        let origin_y = y - y % n;

        load_block(matrix, origin_x, origin_y, n, &mut self.block);
        self.engine.forward_into(&self.block, &mut self.coefficients);
        let old = CoefficientAggregate::from_coefficients(&self.coefficients);

        self.block[(y - origin_y) * n + (x - origin_x)] = new_value as f64;
        self.engine.forward_into(&self.block, &mut self.coefficients);
        let new = CoefficientAggregate::from_coefficients(&self.coefficients);

        let candidate = self.aggregate - old + new;
        self.trial.begin(
            Modification {
                x,
                y,
                value: new_value,
            },
            candidate,
        )?;

        Ok(candidate.sparsity())
    }

    pub fn perform_modification(&mut self) -> Result<Modification> {
        let (modification, aggregate) = self.trial.take()?;
        self.aggregate = aggregate;
        self.sparsity = aggregate.sparsity();
        Ok(modification)
    }

    pub fn discard_modification(&mut self) {
        self.trial.discard();
    }

    /// Full O(W·H) recomputation for offline verification.
    pub fn recompute_from_scratch(&self, matrix: &Buffer2<u32>) -> Result<ConsistencyReport> {
        check_dimensions((self.width, self.height), matrix.dimensions())?;

        let recomputed = CoefficientAggregate::of_matrix(&self.engine, matrix).sparsity();
        let report = ConsistencyReport {
            tracked: self.sparsity,
            recomputed,
        };

        tracing::debug!(
            tracked = report.tracked,
            recomputed = report.recomputed,
            difference = report.difference(),
            "Sparsity consistency check"
        );

        Ok(report)
    }
}
