//! Two-phase trial/commit state shared by the trackers.

use common::float_ext::FloatExt;

use crate::error::{ProtocolError, Result};

/// A single-pixel change that has been scored and committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modification {
    pub x: usize,
    pub y: usize,
    pub value: u32,
}

/// At most one scored-but-uncommitted change per tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialState<D> {
    Clean,
    Pending {
        modification: Modification,
        /// Durable value the tracker takes on commit.
        delta: D,
    },
}

impl<D> Default for TrialState<D> {
    fn default() -> Self {
        TrialState::Clean
    }
}

impl<D> TrialState<D> {
    pub fn is_pending(&self) -> bool {
        matches!(self, TrialState::Pending { .. })
    }

    pub(crate) fn ensure_clean(&self) -> Result<()> {
        match self {
            TrialState::Clean => Ok(()),
            TrialState::Pending { modification, .. } => Err(ProtocolError::TrialPending {
                x: modification.x,
                y: modification.y,
            }
            .into()),
        }
    }

    pub(crate) fn begin(&mut self, modification: Modification, delta: D) -> Result<()> {
        self.ensure_clean()?;
        *self = TrialState::Pending {
            modification,
            delta,
        };
        Ok(())
    }

    /// Takes the pending trial, leaving the state clean.
    pub(crate) fn take(&mut self) -> Result<(Modification, D)> {
        match std::mem::replace(self, TrialState::Clean) {
            TrialState::Pending {
                modification,
                delta,
            } => Ok((modification, delta)),
            TrialState::Clean => Err(ProtocolError::NoPendingTrial.into()),
        }
    }

    pub(crate) fn discard(&mut self) {
        *self = TrialState::Clean;
    }
}

/// Incrementally tracked value next to a full recomputation of the same quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsistencyReport {
    pub tracked: f64,
    pub recomputed: f64,
}

impl ConsistencyReport {
    pub fn difference(&self) -> f64 {
        (self.tracked - self.recomputed).abs()
    }

    /// Relative comparison; magnitudes below 1 are compared absolutely.
    pub fn is_consistent(&self, tolerance: f64) -> bool {
        self.tracked.relative_eq(self.recomputed, tolerance)
    }
}
