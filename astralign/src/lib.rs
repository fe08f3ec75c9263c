//! Astralign - refine the WCS of an astronomical image against a star catalog.
//!
//! Catalog stars in the image footprint are projected through the header
//! WCS, re-centroided on the pixels, filtered for outliers, and used to fit a
//! new TAN solution that is written to an aligned copy of the image.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use astralign::{AlignConfig, AlignmentSession, CatalogSource, PixelOffset};
//!
//! let catalog = CatalogSource::file("field_stars.yaml");
//! let session = AlignmentSession::open("m31.fits", &catalog, AlignConfig::default())?;
//!
//! let alignment = session.align(PixelOffset::default())?;
//! println!("offset {:?}, rms {:.3}\"", alignment.estimate.offset, alignment.rms_arcsec);
//!
//! session.write_aligned(&alignment.wcs)?;
//! ```

pub mod alignment;
pub mod astro_image;
pub mod astrometry;
pub mod centroid;
pub mod config;
pub mod error;
pub(crate) mod math;

#[cfg(test)]
pub mod testing;

// ============================================================================
// Session
// ============================================================================

pub use alignment::{
    Alignment, AlignmentSession, CandidateSet, OffsetConfig, OffsetEstimate, PixelOffset,
    estimate_offset,
};
pub use config::AlignConfig;
pub use error::{AlignError, Result};

// ============================================================================
// Images
// ============================================================================

pub use astro_image::{
    AstroImage, DEFAULT_OUTPUT_MARKER, DataExtension, FitsHeader, HeaderValue,
    aligned_output_path, locate_data_extension, resolve_pixel_scale,
};

// ============================================================================
// Centroiding
// ============================================================================

pub use centroid::{
    CentroidConfig, CentroidError, FitError, GaussianProfile, LMConfig, RefinedCandidates,
    centroid_star, extract_stamp, fit_gaussian_profile, refine_centroids, sum_columns_and_rows,
};

// ============================================================================
// Astrometry
// ============================================================================

pub use astrometry::{
    CatalogError, CatalogField, CatalogSource, CatalogStar, PixelSkyMatch, Wcs,
    fit_wcs_from_points,
};
pub use math::{ClippedStats, sigma_clipped_stats};
