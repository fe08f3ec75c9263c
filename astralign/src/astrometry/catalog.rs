//! Reference star catalogs.
//!
//! Stars come either preloaded or from a YAML/JSON file listing
//! [`CatalogStar`] records. Network services are out of scope.

use std::path::{Path, PathBuf};

use glam::DVec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::wcs::wrap_degrees;

/// A star from an astronomical catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogStar {
    /// Right ascension in degrees (J2000)
    pub ra: f64,
    /// Declination in degrees (J2000)
    pub dec: f64,
    #[serde(default)]
    pub mag: Option<f64>,
    #[serde(default)]
    pub id: Option<String>,
}

impl CatalogStar {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self {
            ra,
            dec,
            mag: None,
            id: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("No catalog stars found in the queried region")]
    NoStarsFound,

    #[error("Failed to read catalog '{path}': {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid catalog '{path}': {reason}")]
    Format { path: PathBuf, reason: String },
}

/// Where reference stars come from.
#[derive(Debug, Clone)]
pub enum CatalogSource {
    /// Pre-loaded catalog stars (for testing or offline use)
    Preloaded { stars: Vec<CatalogStar> },
    /// A YAML or JSON list of stars, format chosen by extension.
    File { path: PathBuf },
}

/// Catalog stars inside a search box, as parallel arrays in catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogField {
    pub ra: Vec<f64>,
    pub dec: Vec<f64>,
}

impl CatalogField {
    pub fn len(&self) -> usize {
        self.ra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ra.is_empty()
    }
}

impl CatalogSource {
    pub fn preloaded(stars: Vec<CatalogStar>) -> Self {
        CatalogSource::Preloaded { stars }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        CatalogSource::File { path: path.into() }
    }

    /// All stars of the source.
    pub fn load(&self) -> Result<Vec<CatalogStar>, CatalogError> {
        match self {
            CatalogSource::Preloaded { stars } => Ok(stars.clone()),
            CatalogSource::File { path } => load_catalog_file(path),
        }
    }

    /// Stars inside a box of `height × width` degrees centered on `center`
    /// (RA, Dec in degrees).
    ///
    /// A star is inside when `|dec - dec0| <= height / 2` and its RA offset,
    /// wrapped to ±180° and scaled by `cos(dec0)`, is within `width / 2`.
    pub fn query_box(
        &self,
        center: DVec2,
        height: f64,
        width: f64,
    ) -> Result<CatalogField, CatalogError> {
        let stars = self.load()?;
        let cos_dec0 = center.y.to_radians().cos();

        let mut field = CatalogField::default();
        for star in stars.iter().filter(|s| {
            (s.dec - center.y).abs() <= height / 2.0
                && (wrap_degrees(s.ra - center.x) * cos_dec0).abs() <= width / 2.0
        }) {
            field.ra.push(star.ra);
            field.dec.push(star.dec);
        }

        tracing::debug!(
            total = stars.len(),
            selected = field.len(),
            "Catalog box query around ({:.5}, {:.5}), {:.4}° × {:.4}°",
            center.x,
            center.y,
            width,
            height
        );

        if field.is_empty() {
            Err(CatalogError::NoStarsFound)
        } else {
            Ok(field)
        }
    }
}

fn load_catalog_file(path: &Path) -> Result<Vec<CatalogStar>, CatalogError> {
    let format_error = |reason: String| CatalogError::Format {
        path: path.to_path_buf(),
        reason,
    };

    let format = common::SerdeFormat::from_path(path).map_err(|e| format_error(e.to_string()))?;
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::File {
        path: path.to_path_buf(),
        source,
    })?;
    let stars: Vec<CatalogStar> =
        common::deserialize(&text, format).map_err(|e| format_error(e.to_string()))?;

    if let Some(bad) = stars
        .iter()
        .position(|s| !s.ra.is_finite() || !s.dec.is_finite() || s.dec.abs() > 90.0)
    {
        return Err(format_error(format!("star {bad} has invalid coordinates")));
    }

    tracing::info!("Loaded {} catalog stars from {}", stars.len(), path.display());
    Ok(stars)
}
