//! Orthonormal 2D DCT-II / DCT-III on square blocks.
//!
//! The transform is evaluated as a direct quadruple sum over a precomputed
//! cosine basis, O(N⁴) per block. Blocks used by the reconstruction are small
//! (8–16), and the sparsity tracker relies on the trial path and the full
//! recompute path producing bit-identical block coefficients, so both go
//! through [`DctEngine::forward_into`].

use std::f64::consts::PI;

use common::Buffer2;

use crate::error::{ConfigError, Result};

/// Direction for [`DctEngine::transform_tiles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformDirection {
    #[default]
    Forward,
    Inverse,
}

/// DCT for one fixed block size.
///
/// Blocks are row-major slices of `N * N` values: `block[row * N + col]`.
/// Coefficients use the same layout with `row` the vertical frequency.
#[derive(Debug, Clone)]
pub struct DctEngine {
    size: usize,
    /// `basis[k * size + i] = α(k) · cos(π (2i + 1) k / 2N)`.
    basis: Vec<f64>,
}

pub fn validate_block_size(block_size: usize) -> Result<()> {
    if !block_size.is_power_of_two() {
        return Err(ConfigError::InvalidBlockSize(block_size).into());
    }
    Ok(())
}

impl DctEngine {
    pub fn new(block_size: usize) -> Result<Self> {
        validate_block_size(block_size)?;

        let n = block_size as f64;
        let mut basis = Vec::with_capacity(block_size * block_size);
        for k in 0..block_size {
            let alpha = if k == 0 {
                (1.0 / n).sqrt()
            } else {
                (2.0 / n).sqrt()
            };
            for i in 0..block_size {
                basis.push(alpha * (PI * (2 * i + 1) as f64 * k as f64 / (2.0 * n)).cos());
            }
        }

        Ok(Self {
            size: block_size,
            basis,
        })
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn block_len(&self) -> usize {
        self.size * self.size
    }

    #[inline]
    fn basis(&self, k: usize, i: usize) -> f64 {
        self.basis[k * self.size + i]
    }

    /// Forward type-II transform of `block` into `coefficients`.
    pub fn forward_into(&self, block: &[f64], coefficients: &mut [f64]) {
        let n = self.size;
        assert_eq!(block.len(), n * n, "block length must be N * N");
        assert_eq!(coefficients.len(), n * n, "output length must be N * N");

        for u in 0..n {
            for v in 0..n {
                let mut sum = 0.0;
                for row in 0..n {
                    let row_basis = self.basis(u, row);
                    let line = &block[row * n..(row + 1) * n];
                    for (col, &value) in line.iter().enumerate() {
                        sum += value * row_basis * self.basis(v, col);
                    }
                }
                coefficients[u * n + v] = sum;
            }
        }
    }

    /// Inverse (type-III) transform; exact inverse of [`Self::forward_into`].
    pub fn inverse_into(&self, coefficients: &[f64], block: &mut [f64]) {
        let n = self.size;
        assert_eq!(coefficients.len(), n * n, "coefficient length must be N * N");
        assert_eq!(block.len(), n * n, "output length must be N * N");

        for row in 0..n {
            for col in 0..n {
                let mut sum = 0.0;
                for u in 0..n {
                    let row_basis = self.basis(u, row);
                    for v in 0..n {
                        sum += coefficients[u * n + v] * row_basis * self.basis(v, col);
                    }
                }
                block[row * n + col] = sum;
            }
        }
    }

    pub fn forward(&self, block: &[f64]) -> Vec<f64> {
        let mut coefficients = vec![0.0; self.block_len()];
        self.forward_into(block, &mut coefficients);
        coefficients
    }

    pub fn inverse(&self, coefficients: &[f64]) -> Vec<f64> {
        let mut block = vec![0.0; self.block_len()];
        self.inverse_into(coefficients, &mut block);
        block
    }

    /// Transforms every complete N×N tile of `image`.
    ///
    /// The output is cropped to `width - width % N` by `height - height % N`
    /// and each value is mapped to `value * output_scale + output_offset`.
    pub fn transform_tiles(
        &self,
        image: &Buffer2<f64>,
        direction: TransformDirection,
        output_scale: f64,
        output_offset: f64,
    ) -> Result<Buffer2<f64>> {
        let n = self.size;
        if image.width() < n || image.height() < n {
            return Err(ConfigError::MatrixTooSmall {
                width: image.width(),
                height: image.height(),
                block_size: n,
            }
            .into());
        }

        let out_width = image.width() - image.width() % n;
        let out_height = image.height() - image.height() % n;
        let mut output = Buffer2::new_default(out_width, out_height);

        let mut tile = vec![0.0; self.block_len()];
        let mut transformed = vec![0.0; self.block_len()];

        for tile_y in (0..out_height).step_by(n) {
            for tile_x in (0..out_width).step_by(n) {
                for row in 0..n {
                    let source = &image.row(tile_y + row)[tile_x..tile_x + n];
                    tile[row * n..(row + 1) * n].copy_from_slice(source);
                }

                match direction {
                    TransformDirection::Forward => self.forward_into(&tile, &mut transformed),
                    TransformDirection::Inverse => self.inverse_into(&tile, &mut transformed),
                }

                for row in 0..n {
                    for col in 0..n {
                        output[(tile_x + col, tile_y + row)] =
                            transformed[row * n + col] * output_scale + output_offset;
                    }
                }
            }
        }

        Ok(output)
    }
}
