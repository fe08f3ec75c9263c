//! Catalog access, the TAN WCS model and its least-squares fit.

pub mod catalog;
pub mod fit;
pub mod wcs;


pub use catalog::{CatalogError, CatalogField, CatalogSource, CatalogStar};
pub use fit::{MIN_FIT_MATCHES, fit_wcs_from_points};
pub use wcs::{PixelSkyMatch, Wcs};
