//! Astronomical image loading and saving.
//!
//! Only the parts of FITS the aligner needs are handled: locating the
//! data-bearing HDU, reading its pixels and a fixed set of header keys, and
//! writing an aligned copy with new WCS cards.

pub mod extension;
pub mod fits;
pub mod header;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use common::Buffer2;

pub use extension::{DataExtension, DataPart, HduSummary, locate_data_extension};
pub use header::{FitsHeader, HeaderValue, PIXEL_SCALE_KEYS, resolve_pixel_scale};

use crate::error::Result;

/// Default marker inserted into aligned file names.
pub const DEFAULT_OUTPUT_MARKER: &str = "wcs_aligned";

/// Pixels and metadata of the data-bearing extension of an image file.
#[derive(Debug, Clone)]
pub struct AstroImage {
    /// Row-major intensities, `(x, y)` = (column, row).
    pub pixels: Buffer2<f64>,
    pub header: FitsHeader,
    /// HDU index the pixels came from.
    pub data_extension: usize,
    pub path: PathBuf,
}

impl AstroImage {
    /// Load from a FITS file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        fits::load_fits(path.as_ref())
    }

    /// Build an in-memory image, mostly for tests and preloaded data.
    pub fn from_pixels(pixels: Buffer2<f64>, header: FitsHeader) -> Self {
        Self {
            pixels,
            header,
            data_extension: 0,
            path: PathBuf::new(),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    pub fn pixel_scale(&self) -> Result<f64> {
        resolve_pixel_scale(&self.header)
    }

    /// Write the pixels with `header` to `path` as a single-HDU FITS file.
    pub fn save_fits(&self, path: impl AsRef<Path>, header: &FitsHeader) -> Result<()> {
        fits::write_fits(path.as_ref(), &self.pixels, header)
    }

    /// Write a copy with `wcs_cards` in place of the WCS cards.
    ///
    /// An image loaded from a file is copied whole, every HDU and card
    /// included, and only the data extension's WCS cards change. An image
    /// built in memory is written as a single HDU from [`Self::header`].
    pub fn save_with_wcs(
        &self,
        path: impl AsRef<Path>,
        wcs_cards: &[(&str, HeaderValue)],
    ) -> Result<()> {
        let path = path.as_ref();
        if self.path.is_file() {
            return fits::write_with_wcs(&self.path, path, self.data_extension, wcs_cards);
        }

        let mut header = self.header.without_wcs();
        for (key, value) in wcs_cards {
            header.insert(*key, value.clone());
        }
        self.save_fits(path, &header)
    }
}

/// Output path for an aligned copy: everything in the file name before the
/// first `.fits`, then `.{marker}.fits`, in the same directory.
///
/// `field.fits` becomes `field.wcs_aligned.fits`; `field.fits.fz` becomes
/// `field.wcs_aligned.fits`; a name without `.fits` keeps its full name.
pub fn aligned_output_path(path: &Path, marker: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.split(".fits").next().unwrap_or_default();
    path.with_file_name(format!("{stem}.{marker}.fits"))
}
