//! Global pixel offset between catalog predictions and refined centroids.
//!
//! Each refined star contributes a discrepancy: the distance from its
//! predicted position (catalog projection plus the manual offset) to where
//! its centroid actually landed. Discrepancies are sigma-clipped and only
//! stars strictly below `median + cut_sigma * std` are kept as clean matches.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::CandidateSet;
use crate::astrometry::PixelSkyMatch;
use crate::centroid::RefinedCandidates;
use crate::error::{AlignError, Result};
use crate::math::{ClippedStats, sigma_clipped_stats};

/// A manual or estimated shift in pixels, added to catalog projections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelOffset {
    pub dx: f64,
    pub dy: f64,
}

impl PixelOffset {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    #[inline]
    pub fn as_vec(self) -> DVec2 {
        DVec2::new(self.dx, self.dy)
    }
}

impl From<DVec2> for PixelOffset {
    fn from(v: DVec2) -> Self {
        Self::new(v.x, v.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetConfig {
    /// Clipping threshold for the discrepancy statistics.
    pub clip_sigma: f64,
    pub clip_max_iterations: usize,
    /// Matches are kept when their discrepancy is below
    /// `median + cut_sigma * std`.
    pub cut_sigma: f64,
}

impl Default for OffsetConfig {
    fn default() -> Self {
        Self {
            clip_sigma: 3.0,
            clip_max_iterations: 5,
            cut_sigma: 1.0,
        }
    }
}

impl OffsetConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.clip_sigma.is_finite() || self.clip_sigma <= 0.0 {
            return Err(format!(
                "offset.clip_sigma must be positive, got {}",
                self.clip_sigma
            ));
        }
        if !self.cut_sigma.is_finite() || self.cut_sigma < 0.0 {
            return Err(format!(
                "offset.cut_sigma must be non-negative, got {}",
                self.cut_sigma
            ));
        }
        Ok(())
    }
}

/// Outcome of [`estimate_offset`].
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetEstimate {
    /// Mean of `refined - catalog projection` over the clean matches. The
    /// manual offset is not subtracted.
    pub offset: PixelOffset,
    /// Clean `(refined pixel, catalog sky)` pairs, in candidate order.
    pub matches: Vec<PixelSkyMatch>,
    /// Candidate indices of the clean matches.
    pub kept_indices: Vec<usize>,
    /// Clipped statistics of all discrepancies.
    pub stats: ClippedStats,
}

impl OffsetEstimate {
    pub fn rejected(&self, refined: &RefinedCandidates) -> usize {
        refined.len() - self.kept_indices.len()
    }
}

/// Estimate the offset from refined centroids and reject outlier matches.
///
/// `refined.indices` must index into `candidates`. Fails with
/// [`AlignError::InsufficientMatches`] when no star survives, including the
/// case where every discrepancy is identical (the strict cut then keeps
/// nothing).
pub fn estimate_offset(
    candidates: &CandidateSet,
    manual: PixelOffset,
    refined: &RefinedCandidates,
    config: &OffsetConfig,
) -> Result<OffsetEstimate> {
    let no_matches = || AlignError::InsufficientMatches {
        found: 0,
        required: 1,
    };
    if refined.is_empty() {
        return Err(no_matches());
    }

    let discrepancies: Vec<f64> = refined
        .iter()
        .map(|(i, pos)| (candidates.position(i) + manual.as_vec() - pos).length())
        .collect();

    let stats = sigma_clipped_stats(
        &discrepancies,
        config.clip_sigma,
        config.clip_max_iterations,
    )
    .ok_or_else(no_matches)?;
    let threshold = stats.median + config.cut_sigma * stats.std;

    let mut kept_indices = Vec::new();
    let mut matches = Vec::new();
    let mut shift_sum = DVec2::ZERO;
    for ((i, pos), &discrepancy) in refined.iter().zip(&discrepancies) {
        if discrepancy < threshold {
            shift_sum += pos - candidates.position(i);
            kept_indices.push(i);
            matches.push(((pos.x, pos.y), (candidates.ra[i], candidates.dec[i])));
        }
    }

    if kept_indices.is_empty() {
        tracing::debug!(
            median = stats.median,
            std = stats.std,
            "Discrepancy cut kept no matches"
        );
        return Err(no_matches());
    }

    let offset = PixelOffset::from(shift_sum / kept_indices.len() as f64);
    tracing::debug!(
        refined = refined.len(),
        kept = kept_indices.len(),
        median = stats.median,
        std = stats.std,
        threshold,
        "Discrepancy cut applied"
    );

    Ok(OffsetEstimate {
        offset,
        matches,
        kept_indices,
        stats,
    })
}
