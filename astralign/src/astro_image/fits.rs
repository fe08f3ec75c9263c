use std::ffi::CString;
use std::fs::File;
use std::path::Path;

use common::Buffer2;
use fitsio::FitsFile;
use fitsio::errors::check_status;
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::sys::{KEY_NO_EXIST, ffdkey};

use super::extension::{HduSummary, locate_data_extension};
use super::header::{FitsHeader, HeaderValue, KeyKind, METADATA_KEYS, WCS_KEYS};
use super::AstroImage;
use crate::error::{AlignError, Result};

/// Load the first data-bearing HDU of a FITS file as an `f64` image.
///
/// Pixels keep FITS storage order: row `y` of the buffer is the `y`-th
/// NAXIS2 row, with no vertical flip.
pub fn load_fits(path: &Path) -> Result<AstroImage> {
    let mut fptr = FitsFile::open(path).map_err(|e| AlignError::fits(path, e))?;

    let summaries = scan_hdus(&mut fptr);
    let index = locate_data_extension(&summaries).into_result()?;
    let shape = &summaries[index].shape;
    tracing::debug!(
        "{}: data in HDU {} of {}, shape {:?}",
        path.display(),
        index,
        summaries.len(),
        shape
    );

    // shape is [NAXIS2, NAXIS1] = [height, width]
    let (height, width) = match shape.as_slice() {
        &[height, width] => (height, width),
        _ => {
            return Err(AlignError::UnsupportedDimensions {
                dims: shape.clone(),
            });
        }
    };

    let hdu = fptr.hdu(index).map_err(|e| AlignError::fits(path, e))?;
    let pixels: Vec<f64> = hdu
        .read_image(&mut fptr)
        .map_err(|e| AlignError::fits(path, e))?;
    if pixels.len() != width * height {
        return Err(AlignError::UnsupportedDimensions {
            dims: shape.clone(),
        });
    }

    let header = read_header(&hdu, &mut fptr);

    Ok(AstroImage {
        pixels: Buffer2::new(width, height, pixels),
        header,
        data_extension: index,
        path: path.to_path_buf(),
    })
}

/// Summaries of every HDU in the file, in order.
fn scan_hdus(fptr: &mut FitsFile) -> Vec<HduSummary> {
    let mut summaries = Vec::new();
    // fitsio has no HDU count; walk until the index is rejected
    while let Ok(hdu) = fptr.hdu(summaries.len()) {
        let summary = match hdu.info {
            HduInfo::ImageInfo { shape, .. } => HduSummary {
                is_image: true,
                shape,
            },
            HduInfo::TableInfo { .. } | HduInfo::AnyInfo => HduSummary {
                is_image: false,
                shape: Vec::new(),
            },
        };
        summaries.push(summary);
    }
    summaries
}

fn read_header(hdu: &FitsHdu, fptr: &mut FitsFile) -> FitsHeader {
    let read_text = |fptr: &mut FitsFile, key: &str| {
        read_key_optional::<String>(hdu, fptr, key).map(|s| HeaderValue::Text(s.trim().to_string()))
    };

    let mut header = FitsHeader::new();
    for &(key, kind) in WCS_KEYS.iter().chain(METADATA_KEYS) {
        // A numeric key holding text is kept as text so lookups can reject it
        let value = match kind {
            KeyKind::Float => read_key_optional::<f64>(hdu, fptr, key)
                .map(HeaderValue::Float)
                .or_else(|| read_text(fptr, key)),
            KeyKind::Text => read_text(fptr, key),
        };
        if let Some(value) = value {
            header.insert(key, value);
        }
    }
    header
}

fn read_key_optional<T: fitsio::headers::ReadsKey>(
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    key: &str,
) -> Option<T> {
    hdu.read_key(fptr, key).ok()
}

/// Write `pixels` as a double-precision primary image followed by `header`'s cards.
///
/// An existing file at `path` is replaced.
pub fn write_fits(path: &Path, pixels: &Buffer2<f64>, header: &FitsHeader) -> Result<()> {
    remove_existing(path)?;

    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[pixels.height(), pixels.width()],
    };

    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .open()
        .map_err(|e| AlignError::fits(path, e))?;
    let hdu = fptr.primary_hdu().map_err(|e| AlignError::fits(path, e))?;

    hdu.write_image(&mut fptr, pixels.pixels())
        .map_err(|e| AlignError::fits(path, e))?;

    for (key, value) in header.iter() {
        write_card(&hdu, &mut fptr, key, value).map_err(|e| AlignError::fits(path, e))?;
    }

    Ok(())
}

/// Copy `source` to `dest` and swap the WCS cards of HDU `extension` for `cards`.
///
/// Every other HDU and card, pixel data included, is copied unchanged. All
/// cards named in the known WCS key set are removed first, so no stale PC,
/// CDELT or CROTA cards survive. An existing file at `dest` is replaced.
pub fn write_with_wcs(
    source: &Path,
    dest: &Path,
    extension: usize,
    cards: &[(&str, HeaderValue)],
) -> Result<()> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| AlignError::Io { path, source }
    };

    if dest == source {
        return Err(AlignError::Io {
            path: dest.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "output would overwrite the input",
            ),
        });
    }

    remove_existing(dest)?;
    // Fresh file so the output gets default permissions, not the input's
    let mut reader = File::open(source).map_err(io_error(source))?;
    let mut writer = File::create(dest).map_err(io_error(dest))?;
    std::io::copy(&mut reader, &mut writer).map_err(io_error(dest))?;
    drop(writer);

    let mut fptr = FitsFile::edit(dest).map_err(|e| AlignError::fits(dest, e))?;
    // Selecting the HDU also makes it current for the raw deletes below
    let hdu = fptr.hdu(extension).map_err(|e| AlignError::fits(dest, e))?;

    for (key, _) in WCS_KEYS {
        delete_cards(&mut fptr, key).map_err(|e| AlignError::fits(dest, e))?;
    }
    for (key, value) in cards {
        write_card(&hdu, &mut fptr, key, value).map_err(|e| AlignError::fits(dest, e))?;
    }

    Ok(())
}

// fitsio won't overwrite
fn remove_existing(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|source| AlignError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn write_card(
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    key: &str,
    value: &HeaderValue,
) -> fitsio::errors::Result<()> {
    match value {
        HeaderValue::Float(v) => hdu.write_key(fptr, key, *v),
        HeaderValue::Text(s) => hdu.write_key(fptr, key, s.as_str()),
    }
}

/// Remove every card named `key` from the current HDU of `fptr`.
///
/// fitsio has no key deletion, so this calls cfitsio directly.
fn delete_cards(fptr: &mut FitsFile, key: &str) -> fitsio::errors::Result<()> {
    let name = CString::new(key)?;
    loop {
        let mut status = 0;
        unsafe {
            ffdkey(fptr.as_raw(), name.as_ptr(), &mut status);
        }
        match status {
            0 => continue,
            s if s == KEY_NO_EXIST as i32 => return Ok(()),
            s => return check_status(s),
        }
    }
}
