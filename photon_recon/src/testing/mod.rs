//! Synthetic photon-count images and test helpers.

use common::Buffer2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson};

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Uniform counts in `0..=max_count`.
pub fn random_counts(width: usize, height: usize, max_count: u32, seed: u64) -> Buffer2<u32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Buffer2::from_fn(width, height, |_, _| rng.random_range(0..=max_count))
}

/// Smooth bright disc on a dark background.
pub fn disc_intensity(width: usize, height: usize, peak: f64, background: f64) -> Buffer2<f64> {
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let radius = width.min(height) as f64 / 3.0;
    Buffer2::from_fn(width, height, |x, y| {
        let dx = x as f64 + 0.5 - cx;
        let dy = y as f64 + 0.5 - cy;
        if (dx * dx + dy * dy).sqrt() <= radius {
            peak
        } else {
            background
        }
    })
}

/// Poisson photon counts drawn from `intensity`.
pub fn photon_counts(intensity: &Buffer2<f64>, seed: u64) -> Buffer2<u32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    intensity.map(|&mean| {
        if mean <= 0.0 {
            return 0;
        }
        let poisson = Poisson::new(mean).expect("finite positive mean");
        poisson.sample(&mut rng) as u32
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photon_counts_follow_intensity() {
        let flat = Buffer2::new_filled(64, 64, 4.0);
        let counts = photon_counts(&flat, 3);
        let mean = counts.pixels().iter().map(|&v| v as f64).sum::<f64>() / counts.len() as f64;
        // 4096 samples: standard error of the mean is 2 / 64
        assert!((mean - 4.0).abs() < 0.2, "mean {}", mean);

        let dark = Buffer2::new_filled(8, 8, 0.0);
        assert!(photon_counts(&dark, 3).pixels().iter().all(|&v| v == 0));
    }

    #[test]
    fn photon_counts_are_seeded() {
        let intensity = disc_intensity(16, 16, 6.0, 0.3);
        assert_eq!(photon_counts(&intensity, 11), photon_counts(&intensity, 11));
    }
}
