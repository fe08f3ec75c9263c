use std::path::PathBuf;

use thiserror::Error;

use crate::astrometry::catalog::CatalogError;

/// Errors that abort an alignment session.
///
/// Per-candidate centroid failures never show up here; they are dropped by
/// [`refine_centroids`](crate::refine_centroids).
#[derive(Debug, Error)]
pub enum AlignError {
    #[error("No pixel scale key (PIXSCALE, CD1_1, PC1_1) found in header")]
    NoPixelScaleFound,

    #[error("Pixel scale key '{key}' is not a number: {value}")]
    InvalidPixelScale { key: String, value: String },

    #[error("No extension with pixel data found")]
    NoDataExtensionFound,

    #[error("Insufficient matches: found {found}, need at least {required}")]
    InsufficientMatches { found: usize, required: usize },

    #[error("Coordinate fit is degenerate: {reason}")]
    DegenerateFit { reason: String },

    #[error("Unsupported projection '{ctype}', only TAN is handled")]
    UnsupportedProjection { ctype: String },

    #[error("Missing WCS header key '{key}'")]
    MissingWcsKey { key: String },

    #[error("FITS error on '{path}': {source}")]
    Fits {
        path: PathBuf,
        source: fitsio::errors::Error,
    },

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Unsupported image dimensions {dims:?}, expected a 2-D image")]
    UnsupportedDimensions { dims: Vec<usize> },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl AlignError {
    pub(crate) fn fits(path: impl Into<PathBuf>, source: fitsio::errors::Error) -> Self {
        Self::Fits {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = AlignError> = std::result::Result<T, E>;
