//! Sub-pixel star centroiding from row and column profiles.
//!
//! A square postage stamp is cut around each rough position, summed along
//! each axis, and each 1-D profile gets its own Gaussian fit. The fitted
//! means become the refined position.

pub mod lm_optimizer;
pub mod profile_fit;


pub use lm_optimizer::LMConfig;
pub use profile_fit::{FitError, GaussianProfile, fit_gaussian_profile};

use common::Buffer2;
use glam::DVec2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default stamp half-width in pixels.
pub const DEFAULT_BOX_PADDING: usize = 20;

/// Configuration for centroid refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentroidConfig {
    /// Stamp half-width. Stamps are `2 * box_padding` pixels on a side.
    pub box_padding: usize,
    /// Spread candidates over the rayon pool.
    pub parallel: bool,
    /// Solver settings for the profile fits.
    pub fit: LMConfig,
}

impl Default for CentroidConfig {
    fn default() -> Self {
        Self {
            box_padding: DEFAULT_BOX_PADDING,
            parallel: true,
            fit: LMConfig::default(),
        }
    }
}

impl CentroidConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Profiles must have at least as many samples as the model has parameters
        if self.box_padding < 2 {
            return Err(format!(
                "centroid.box_padding must be at least 2, got {}",
                self.box_padding
            ));
        }
        self.fit.validate()
    }

    #[inline]
    pub fn stamp_size(&self) -> usize {
        2 * self.box_padding
    }
}

/// Why a single candidate could not be centroided.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CentroidError {
    #[error("stamp around ({x:.2}, {y:.2}) extends outside the image")]
    StampOutOfBounds { x: f64, y: f64 },
    #[error(transparent)]
    Fit(#[from] FitError),
}

/// Survivors of a batch refinement.
///
/// The three vectors are parallel and always the same length; `indices` is
/// strictly ascending and refers to positions in the input arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefinedCandidates {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub indices: Vec<usize>,
}

impl RefinedCandidates {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Iterates `(original index, refined position)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, DVec2)> + '_ {
        self.indices
            .iter()
            .zip(self.x.iter().zip(self.y.iter()))
            .map(|(&i, (&x, &y))| (i, DVec2::new(x, y)))
    }

    fn push(&mut self, index: usize, pos: DVec2) {
        debug_assert!(self.indices.last().is_none_or(|&last| last < index));
        self.x.push(pos.x);
        self.y.push(pos.y);
        self.indices.push(index);
    }
}

/// Cut the `2p × 2p` stamp covering rows `[round(y) - p, round(y) + p)` and
/// columns `[round(x) - p, round(x) + p)`.
///
/// Rounding is half-to-even. Fails unless the whole stamp lies inside the image.
pub fn extract_stamp(
    image: &Buffer2<f64>,
    pos: DVec2,
    box_padding: usize,
) -> Result<Buffer2<f64>, CentroidError> {
    let out_of_bounds = CentroidError::StampOutOfBounds { x: pos.x, y: pos.y };
    if !pos.is_finite() {
        return Err(out_of_bounds);
    }

    let padding = box_padding as f64;
    let x0 = pos.x.round_ties_even() - padding;
    let y0 = pos.y.round_ties_even() - padding;
    if x0 < 0.0 || y0 < 0.0 || x0 > image.width() as f64 || y0 > image.height() as f64 {
        return Err(out_of_bounds);
    }

    let size = 2 * box_padding;
    image
        .crop(x0 as usize, y0 as usize, size, size)
        .ok_or(out_of_bounds)
}

/// Column sums (one per stamp column, the x profile) and row sums (one per
/// stamp row, the y profile).
pub fn sum_columns_and_rows(stamp: &Buffer2<f64>) -> (Vec<f64>, Vec<f64>) {
    let mut column_sum = vec![0.0; stamp.width()];
    let row_sum: Vec<f64> = stamp
        .rows()
        .map(|row| {
            for (acc, &v) in column_sum.iter_mut().zip(row) {
                *acc += v;
            }
            row.iter().sum::<f64>()
        })
        .collect();
    (column_sum, row_sum)
}

/// Refine one rough position to a sub-pixel centroid.
///
/// The stamp is cut around the rounded guess, but the fitted means are added
/// back onto the truncated guess: `x' = trunc(x) - p + mean_x`. For guesses
/// whose fractional part rounds up this lands one pixel short of the star.
pub fn centroid_star(
    pos: DVec2,
    image: &Buffer2<f64>,
    config: &CentroidConfig,
) -> Result<DVec2, CentroidError> {
    let stamp = extract_stamp(image, pos, config.box_padding)?;
    let (column_sum, row_sum) = sum_columns_and_rows(&stamp);

    let axis: Vec<f64> = (0..config.stamp_size()).map(|i| i as f64).collect();
    let row_fit = fit_gaussian_profile(&axis, &row_sum, &config.fit)?;
    let column_fit = fit_gaussian_profile(&axis, &column_sum, &config.fit)?;

    let padding = config.box_padding as f64;
    Ok(DVec2::new(
        pos.x.trunc() - padding + column_fit.mean,
        pos.y.trunc() - padding + row_fit.mean,
    ))
}

/// Centroid every candidate, silently dropping the ones that fail.
///
/// Output keeps input order. With `config.parallel` the fits run on the rayon
/// pool; the result is identical to the sequential path.
///
/// # Panics
/// Panics if `xs` and `ys` differ in length.
pub fn refine_centroids(
    xs: &[f64],
    ys: &[f64],
    image: &Buffer2<f64>,
    config: &CentroidConfig,
) -> RefinedCandidates {
    assert_eq!(xs.len(), ys.len(), "xs and ys must have equal length");

    let refine = |i: usize| centroid_star(DVec2::new(xs[i], ys[i]), image, config);
    let results: Vec<Result<DVec2, CentroidError>> = if config.parallel {
        (0..xs.len()).into_par_iter().map(refine).collect()
    } else {
        (0..xs.len()).map(refine).collect()
    };

    let mut refined = RefinedCandidates::default();
    let mut out_of_bounds = 0usize;
    let mut fit_failures = 0usize;
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(pos) => refined.push(i, pos),
            Err(err) => {
                match err {
                    CentroidError::StampOutOfBounds { .. } => out_of_bounds += 1,
                    CentroidError::Fit(_) => fit_failures += 1,
                }
                tracing::trace!(candidate = i, "Dropping candidate: {err}");
            }
        }
    }

    tracing::debug!(
        candidates = xs.len(),
        survivors = refined.len(),
        out_of_bounds,
        fit_failures,
        "Centroid refinement finished"
    );

    refined
}
