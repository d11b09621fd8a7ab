use super::*;
use crate::error::{Error, ProtocolError, SizeError};
use crate::testing::random_counts;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const TOLERANCE: f64 = 1e-9;

fn with_pixel(matrix: &Buffer2<u32>, x: usize, y: usize, value: u32) -> Buffer2<u32> {
    let mut modified = matrix.clone();
    modified[(x, y)] = value;
    modified
}

fn from_scratch(block_size: usize, matrix: &Buffer2<u32>) -> f64 {
    let engine = DctEngine::new(block_size).unwrap();
    CoefficientAggregate::of_matrix(&engine, matrix).sparsity()
}

#[test]
fn test_constant_block_sparsity_is_one() {
    let matrix = Buffer2::new_filled(8, 8, 100u32);
    let tracker = SparsityTracker::new(8, &matrix).unwrap();

    assert!((tracker.sparsity() - 1.0).abs() < 1e-9);
    assert!((tracker.aggregate().sum_abs - 800.0).abs() < 1e-6);
    assert!((tracker.aggregate().sum_sq - 640_000.0).abs() < 1e-6);
}

#[test]
fn test_all_zero_matrix_scores_zero() {
    let matrix = Buffer2::new_filled(16, 16, 0u32);
    let tracker = SparsityTracker::new(8, &matrix).unwrap();
    assert_eq!(tracker.sparsity(), 0.0);
}

#[test]
fn test_rejects_invalid_geometry() {
    let matrix = Buffer2::new_filled(16, 16, 1u32);
    assert_eq!(
        SparsityTracker::new(12, &matrix).unwrap_err(),
        Error::Config(ConfigError::InvalidBlockSize(12))
    );

    let narrow = Buffer2::new_filled(7, 16, 1u32);
    assert_eq!(
        SparsityTracker::new(8, &narrow).unwrap_err(),
        Error::Config(ConfigError::MatrixTooSmall {
            width: 7,
            height: 16,
            block_size: 8
        })
    );

    let exact = Buffer2::new_filled(8, 8, 1u32);
    assert!(SparsityTracker::new(8, &exact).is_ok());
}

#[test]
fn test_commit_matches_from_scratch_16x16() {
    let matrix = random_counts(16, 16, 20, 7);
    let mut tracker = SparsityTracker::new(8, &matrix).unwrap();

    let trial = tracker.try_modification(&matrix, 5, 11, 42).unwrap();
    let committed = tracker.perform_modification().unwrap();
    assert_eq!(
        committed,
        Modification {
            x: 5,
            y: 11,
            value: 42
        }
    );

    let expected = from_scratch(8, &with_pixel(&matrix, 5, 11, 42));
    assert!((tracker.sparsity() - expected).abs() < TOLERANCE * expected);
    assert_eq!(trial, tracker.sparsity());
}

#[test]
fn test_boundary_block_uses_zero_padding() {
    // 20x13 leaves partial tiles on the right and bottom edges
    let mut matrix = random_counts(20, 13, 9, 11);
    let mut tracker = SparsityTracker::new(8, &matrix).unwrap();

    let initial = tracker.recompute_from_scratch(&matrix).unwrap();
    assert!(initial.is_consistent(TOLERANCE));

    tracker.try_modification(&matrix, 19, 12, 30).unwrap();
    let modification = tracker.perform_modification().unwrap();
    matrix[(modification.x, modification.y)] = modification.value;

    let report = tracker.recompute_from_scratch(&matrix).unwrap();
    assert!(report.is_consistent(TOLERANCE), "{:?}", report);
}

#[test]
fn test_trials_without_commit_have_no_effect() {
    let matrix = random_counts(24, 16, 15, 3);
    let mut tracker = SparsityTracker::new(8, &matrix).unwrap();
    let before = tracker.sparsity();
    let aggregate = tracker.aggregate();

    for (x, y, value) in [(0, 0, 99), (23, 15, 0), (10, 4, 7)] {
        tracker.try_modification(&matrix, x, y, value).unwrap();
        tracker.discard_modification();
    }

    assert_eq!(tracker.sparsity(), before);
    assert_eq!(tracker.aggregate(), aggregate);
    let report = tracker.recompute_from_scratch(&matrix).unwrap();
    assert!(report.is_consistent(TOLERANCE));
}

#[test]
fn test_trial_score_matches_modified_matrix() {
    let matrix = random_counts(16, 16, 10, 5);
    let mut tracker = SparsityTracker::new(4, &matrix).unwrap();

    let score = tracker.try_modification(&matrix, 9, 2, 17).unwrap();
    let expected = from_scratch(4, &with_pixel(&matrix, 9, 2, 17));
    assert!((score - expected).abs() < TOLERANCE * expected);
}

#[test]
fn test_random_sequence_stays_consistent() {
    let mut matrix = random_counts(32, 24, 12, 21);
    let mut tracker = SparsityTracker::new(8, &matrix).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(99);

    for _ in 0..500 {
        let x = rng.random_range(0..matrix.width());
        let y = rng.random_range(0..matrix.height());
        let value = rng.random_range(0..40);
        tracker.try_modification(&matrix, x, y, value).unwrap();

        if rng.random_bool(0.5) {
            let modification = tracker.perform_modification().unwrap();
            matrix[(modification.x, modification.y)] = modification.value;
        } else {
            tracker.discard_modification();
        }
    }

    let report = tracker.recompute_from_scratch(&matrix).unwrap();
    assert!(report.is_consistent(1e-8), "{:?}", report);
}

#[test]
fn test_protocol_violations() {
    let matrix = random_counts(8, 8, 5, 1);
    let mut tracker = SparsityTracker::new(8, &matrix).unwrap();

    assert_eq!(
        tracker.perform_modification().unwrap_err(),
        Error::Protocol(ProtocolError::NoPendingTrial)
    );

    tracker.try_modification(&matrix, 1, 2, 3).unwrap();
    assert!(tracker.has_pending_trial());
    assert_eq!(
        tracker.try_modification(&matrix, 4, 4, 1).unwrap_err(),
        Error::Protocol(ProtocolError::TrialPending { x: 1, y: 2 })
    );

    tracker.perform_modification().unwrap();
    assert_eq!(
        tracker.perform_modification().unwrap_err(),
        Error::Protocol(ProtocolError::NoPendingTrial)
    );
}

#[test]
fn test_rejects_out_of_bounds_and_foreign_matrix() {
    let matrix = random_counts(16, 8, 5, 2);
    let mut tracker = SparsityTracker::new(8, &matrix).unwrap();

    assert!(matches!(
        tracker.try_modification(&matrix, 16, 0, 1),
        Err(Error::CoordinateOutOfBounds { x: 16, .. })
    ));
    assert!(matches!(
        tracker.try_modification(&matrix, 0, 8, 1),
        Err(Error::CoordinateOutOfBounds { y: 8, .. })
    ));

    let other = random_counts(8, 16, 5, 2);
    assert_eq!(
        tracker.try_modification(&other, 0, 0, 1).unwrap_err(),
        Error::Size(SizeError::DimensionMismatch {
            expected: (16, 8),
            actual: (8, 16)
        })
    );
    assert!(!tracker.has_pending_trial());
}

#[test]
fn test_aggregate_monoid() {
    let a = CoefficientAggregate {
        sum_abs: 3.0,
        sum_sq: 5.0,
    };
    let b = CoefficientAggregate {
        sum_abs: 1.0,
        sum_sq: 2.0,
    };

    assert_eq!(a + CoefficientAggregate::default(), a);
    assert_eq!(a + b - b, a);
    assert!((CoefficientAggregate::from_coefficients(&[3.0, -4.0]).sparsity() - 49.0 / 25.0).abs() < 1e-12);
}
