//! Numeric helpers shared by the fitting code.

pub mod linear_solver;
pub mod statistics;

pub use linear_solver::solve;
pub use statistics::{ClippedStats, sigma_clipped_stats};

/// Arcseconds per degree.
pub const ARCSEC_PER_DEG: f64 = 3600.0;
