//! The alignment workflow.
//!
//! An [`AlignmentSession`] is opened once per image: it loads the pixels,
//! reads the header WCS and pixel scale, queries the catalog for the image
//! footprint and projects those stars into pixel space. All of that is
//! immutable afterwards, so [`AlignmentSession::align`] can be called again
//! with different manual offsets without reloading anything.

pub mod offset;


pub use offset::{OffsetConfig, OffsetEstimate, PixelOffset, estimate_offset};

use std::path::{Path, PathBuf};

use glam::DVec2;

use crate::astro_image::{AstroImage, aligned_output_path};
use crate::astrometry::{CatalogSource, Wcs, fit_wcs_from_points};
use crate::centroid::{RefinedCandidates, refine_centroids};
use crate::config::AlignConfig;
use crate::error::{AlignError, Result};

/// Catalog boxes wider than this (degrees) almost always mean a unit mix-up.
const MAX_PLAUSIBLE_BOX_DEG: f64 = 30.0;

/// Catalog stars of the image footprint with their projections through the
/// header WCS, as parallel arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    pub ra: Vec<f64>,
    pub dec: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl CandidateSet {
    /// Project `ra`/`dec` through `wcs`.
    pub fn project(wcs: &Wcs, ra: Vec<f64>, dec: Vec<f64>) -> Self {
        assert_eq!(ra.len(), dec.len(), "ra and dec must have equal length");
        let (x, y) = wcs.sky_to_pixels(&ra, &dec);
        Self { ra, dec, x, y }
    }

    pub fn len(&self) -> usize {
        self.ra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ra.is_empty()
    }

    #[inline]
    pub fn position(&self, index: usize) -> DVec2 {
        DVec2::new(self.x[index], self.y[index])
    }

    /// Projected positions with `offset` added.
    pub fn shifted(&self, offset: PixelOffset) -> (Vec<f64>, Vec<f64>) {
        (
            self.x.iter().map(|x| x + offset.dx).collect(),
            self.y.iter().map(|y| y + offset.dy).collect(),
        )
    }
}

/// Result of one [`AlignmentSession::align`] call.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Manual offset the call was made with.
    pub manual_offset: PixelOffset,
    /// Candidates that survived centroiding.
    pub refined: RefinedCandidates,
    pub estimate: OffsetEstimate,
    /// WCS fitted to the clean matches.
    pub wcs: Wcs,
    /// RMS of the fit residuals in arcseconds.
    pub rms_arcsec: f64,
}

impl Alignment {
    pub fn rejected(&self) -> usize {
        self.estimate.rejected(&self.refined)
    }
}

/// Everything needed to align one image, loaded up front.
#[derive(Debug, Clone)]
pub struct AlignmentSession {
    image: AstroImage,
    header_wcs: Wcs,
    pixel_scale: f64,
    candidates: CandidateSet,
    config: AlignConfig,
}

impl AlignmentSession {
    /// Load `path` and prepare the catalog candidates.
    pub fn open(
        path: impl AsRef<Path>,
        catalog: &CatalogSource,
        config: AlignConfig,
    ) -> Result<Self> {
        config.validate()?;
        let image = AstroImage::from_file(path)?;
        Self::from_image(image, catalog, config)
    }

    /// Prepare a session for an image that is already in memory.
    pub fn from_image(
        image: AstroImage,
        catalog: &CatalogSource,
        config: AlignConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (width, height) = (image.width(), image.height());
        let header_wcs = Wcs::from_header(&image.header, (width, height))?;
        let pixel_scale = image.pixel_scale()?;

        // Box size in the header's own units, footprint of the unrotated frame
        let center = header_wcs.center();
        let (box_height, box_width) = (height as f64 * pixel_scale, width as f64 * pixel_scale);
        if box_height.max(box_width) > MAX_PLAUSIBLE_BOX_DEG {
            tracing::warn!(
                box_height,
                box_width,
                "Catalog box is implausibly large, is the pixel scale stored in arcseconds?"
            );
        }
        let field = catalog.query_box(center, box_height, box_width)?;
        let candidates = CandidateSet::project(&header_wcs, field.ra, field.dec);

        tracing::info!(
            path = %image.path.display(),
            width,
            height,
            pixel_scale,
            candidates = candidates.len(),
            "Alignment session ready"
        );

        Ok(Self {
            image,
            header_wcs,
            pixel_scale,
            candidates,
            config,
        })
    }

    pub fn image(&self) -> &AstroImage {
        &self.image
    }

    /// WCS as read from the input header.
    pub fn header_wcs(&self) -> &Wcs {
        &self.header_wcs
    }

    /// Pixel scale as stored in the header.
    pub fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    /// Centroid every candidate shifted by `offset`.
    pub fn refine(&self, offset: PixelOffset) -> RefinedCandidates {
        let (xs, ys) = self.candidates.shifted(offset);
        refine_centroids(&xs, &ys, &self.image.pixels, &self.config.centroid)
    }

    /// Refine, estimate the offset, reject outliers and fit a new WCS.
    ///
    /// The session is left untouched; call again with another offset to retry.
    pub fn align(&self, offset: PixelOffset) -> Result<Alignment> {
        let refined = self.refine(offset);
        let estimate = estimate_offset(&self.candidates, offset, &refined, &self.config.offset)?;

        if estimate.matches.len() < self.config.min_matches {
            return Err(AlignError::InsufficientMatches {
                found: estimate.matches.len(),
                required: self.config.min_matches,
            });
        }

        let naxis = (self.image.width(), self.image.height());
        let wcs = fit_wcs_from_points(&estimate.matches, naxis)?;
        let rms_arcsec = wcs.compute_residuals(&estimate.matches);

        tracing::info!(
            refined = refined.len(),
            kept = estimate.matches.len(),
            dx = estimate.offset.dx,
            dy = estimate.offset.dy,
            rms_arcsec,
            "Alignment solved"
        );

        Ok(Alignment {
            manual_offset: offset,
            refined,
            estimate,
            wcs,
            rms_arcsec,
        })
    }

    /// Where [`Self::write_aligned`] puts its file.
    pub fn output_path(&self) -> PathBuf {
        aligned_output_path(&self.image.path, &self.config.output_marker)
    }

    /// Save a copy of the input with `wcs` in place of the original WCS
    /// cards. Returns the written path.
    pub fn write_aligned(&self, wcs: &Wcs) -> Result<PathBuf> {
        let path = self.output_path();
        self.image.save_with_wcs(&path, &wcs.to_header_cards())?;
        tracing::info!(path = %path.display(), "Wrote aligned image");
        Ok(path)
    }
}
