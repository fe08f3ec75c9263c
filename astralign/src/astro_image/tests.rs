//! Tests for header lookups, extension location and FITS I/O.

use std::path::Path;

use common::Buffer2;
use fitsio::FitsFile;
use fitsio::images::{ImageDescription, ImageType};

use super::*;
use crate::error::AlignError;

// ---------------------------------------------------------------------------
// Pixel scale
// ---------------------------------------------------------------------------

#[test]
fn test_pixel_scale_from_cd_only() {
    let header: FitsHeader = [("CD1_1", 0.04)].into_iter().collect();
    assert_eq!(resolve_pixel_scale(&header).unwrap(), 0.04);
}

#[test]
fn test_pixel_scale_missing() {
    let header: FitsHeader = [("CRVAL1", 150.0), ("CDELT1", 0.1)].into_iter().collect();
    assert!(matches!(
        resolve_pixel_scale(&header),
        Err(AlignError::NoPixelScaleFound)
    ));
}

#[test]
fn test_pixel_scale_priority_and_abs() {
    let mut header: FitsHeader = [("PC1_1", 3.0), ("CD1_1", -0.5)].into_iter().collect();
    assert_eq!(resolve_pixel_scale(&header).unwrap(), 0.5);

    header.insert("PIXSCALE", 0.11);
    assert_eq!(resolve_pixel_scale(&header).unwrap(), 0.11);

    header.remove("PIXSCALE");
    header.remove("CD1_1");
    assert_eq!(resolve_pixel_scale(&header).unwrap(), 3.0);
}

#[test]
fn test_pixel_scale_text_value_fails() {
    let mut header = FitsHeader::new();
    header.insert("PIXSCALE", "unknown");
    header.insert("PC1_1", -2.0e-4);

    match resolve_pixel_scale(&header) {
        Err(AlignError::InvalidPixelScale { key, value }) => {
            assert_eq!(key, "PIXSCALE");
            assert_eq!(value, "'unknown'");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_pixel_scale_non_finite_fails() {
    let header: FitsHeader = [("CD1_1", f64::NAN)].into_iter().collect();
    assert!(matches!(
        resolve_pixel_scale(&header),
        Err(AlignError::InvalidPixelScale { .. })
    ));
}

// ---------------------------------------------------------------------------
// Data extension
// ---------------------------------------------------------------------------

#[test]
fn test_locate_middle_part() {
    let parts: [Option<Vec<f64>>; 3] = [None, Some(vec![1.0, 2.0]), None];
    assert_eq!(locate_data_extension(&parts), DataExtension::Found(1));
}

#[test]
fn test_locate_first_match_wins() {
    let a = [1u16, 2];
    let b = [3u16];
    let parts: [Option<&[u16]>; 4] = [Some(&[]), Some(&a), None, Some(&b)];
    assert_eq!(locate_data_extension(&parts), DataExtension::Found(1));
}

#[test]
fn test_locate_none_found() {
    let parts: [Option<Vec<f64>>; 2] = [None, Some(Vec::new())];
    let located = locate_data_extension(&parts);

    assert_eq!(located, DataExtension::NotFound);
    assert!(matches!(
        located.into_result(),
        Err(AlignError::NoDataExtensionFound)
    ));
    let empty: [Option<Vec<f64>>; 0] = [];
    assert_eq!(locate_data_extension(&empty), DataExtension::NotFound);
}

#[test]
fn test_hdu_summary_has_data() {
    let parts = [
        HduSummary {
            is_image: true,
            shape: vec![],
        },
        HduSummary {
            is_image: false,
            shape: vec![],
        },
        HduSummary {
            is_image: true,
            shape: vec![0, 10],
        },
        HduSummary {
            is_image: true,
            shape: vec![10, 12],
        },
    ];
    assert_eq!(locate_data_extension(&parts), DataExtension::Found(3));
}

// ---------------------------------------------------------------------------
// Output naming
// ---------------------------------------------------------------------------

#[test]
fn test_aligned_output_path() {
    assert_eq!(
        aligned_output_path(Path::new("/data/field.fits"), "wcs_aligned"),
        Path::new("/data/field.wcs_aligned.fits")
    );
    assert_eq!(
        aligned_output_path(Path::new("chip.fits.fz"), "wcs_aligned"),
        Path::new("chip.wcs_aligned.fits")
    );
    assert_eq!(
        aligned_output_path(Path::new("run/chip.fit"), "v2"),
        Path::new("run/chip.fit.v2.fits")
    );
}

// ---------------------------------------------------------------------------
// FITS I/O
// ---------------------------------------------------------------------------

/// Empty primary HDU followed by a 2-D image extension, like most pipeline products.
fn write_extension_file(path: &Path, width: usize, height: usize) {
    let mut fptr = FitsFile::create(path).open().unwrap();
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[height, width],
    };
    let hdu = fptr.create_image("SCI".to_string(), &description).unwrap();
    let pixels: Vec<f64> = (0..width * height).map(|i| i as f64).collect();
    hdu.write_image(&mut fptr, &pixels).unwrap();
    hdu.write_key(&mut fptr, "CD1_1", -1.5e-5).unwrap();
    hdu.write_key(&mut fptr, "CTYPE1", "RA---TAN").unwrap();
    hdu.write_key(&mut fptr, "OBJECT", "HZ7").unwrap();
}

#[test]
fn test_load_finds_image_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chip.fits");
    write_extension_file(&path, 7, 4);

    let image = AstroImage::from_file(&path).unwrap();

    assert_eq!(image.data_extension, 1);
    assert_eq!(image.width(), 7);
    assert_eq!(image.height(), 4);
    // No flip: pixel (x, y) is element y * width + x of the stored data
    assert_eq!(image.pixels[(3, 0)], 3.0);
    assert_eq!(image.pixels[(2, 3)], (3 * 7 + 2) as f64);
    assert_eq!(image.header.get_float("CD1_1"), Some(-1.5e-5));
    assert_eq!(image.header.get_text("CTYPE1"), Some("RA---TAN"));
    assert_eq!(image.header.get_text("OBJECT"), Some("HZ7"));
    assert!((image.pixel_scale().unwrap() - 1.5e-5).abs() < 1e-20);
}

#[test]
fn test_load_without_pixels_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.fits");
    FitsFile::create(&path).open().unwrap();

    assert!(matches!(
        AstroImage::from_file(&path),
        Err(AlignError::NoDataExtensionFound)
    ));
}

#[test]
fn test_load_missing_file_fails() {
    assert!(matches!(
        AstroImage::from_file("/nonexistent/dir/chip.fits"),
        Err(AlignError::Fits { .. })
    ));
}

#[test]
fn test_save_replaces_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("chip.fits");
    write_extension_file(&source, 5, 3);
    let image = AstroImage::from_file(&source).unwrap();

    let target = aligned_output_path(&source, DEFAULT_OUTPUT_MARKER);
    std::fs::write(&target, b"stale").unwrap();

    let mut header = image.header.clone();
    header.insert("CRVAL1", 150.25);
    image.save_fits(&target, &header).unwrap();

    let reloaded = AstroImage::from_file(&target).unwrap();
    assert_eq!(reloaded.data_extension, 0);
    assert_eq!(reloaded.pixels, image.pixels);
    assert_eq!(reloaded.header.get_float("CRVAL1"), Some(150.25));
    assert_eq!(reloaded.header.get_text("OBJECT"), Some("HZ7"));
}

#[test]
fn test_load_keeps_text_in_numeric_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chip.fits");
    write_extension_file(&path, 5, 3);
    {
        let mut fptr = FitsFile::edit(&path).unwrap();
        let hdu = fptr.hdu(1).unwrap();
        hdu.write_key(&mut fptr, "PIXSCALE", "n/a").unwrap();
    }

    let image = AstroImage::from_file(&path).unwrap();

    assert_eq!(image.header.get_text("PIXSCALE"), Some("n/a"));
    assert!(matches!(
        image.pixel_scale(),
        Err(AlignError::InvalidPixelScale { .. })
    ));
}

/// Primary image with a PC/CDELT WCS and cards the loader does not know,
/// followed by an ERR image extension.
fn write_frame_with_error_plane(path: &Path) {
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[3, 4],
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .open()
        .unwrap();
    let primary = fptr.primary_hdu().unwrap();
    let pixels: Vec<f64> = (0..12).map(|i| i as f64 * 10.0).collect();
    primary.write_image(&mut fptr, &pixels).unwrap();
    primary.write_key(&mut fptr, "CTYPE1", "RA---TAN").unwrap();
    primary.write_key(&mut fptr, "CTYPE2", "DEC--TAN").unwrap();
    for (key, value) in [
        ("CRVAL1", 10.0),
        ("CRVAL2", 20.0),
        ("CDELT1", -1e-4),
        ("CDELT2", 1e-4),
        ("PC1_1", 1.0),
        ("CROTA2", 5.0),
        ("GAIN", 2.5),
    ] {
        primary.write_key(&mut fptr, key, value).unwrap();
    }
    primary.write_key(&mut fptr, "OBSERVER", "night crew").unwrap();

    let error_plane = fptr.create_image("ERR".to_string(), &description).unwrap();
    error_plane.write_image(&mut fptr, &[0.5f64; 12]).unwrap();
}

fn new_wcs_cards() -> Vec<(&'static str, HeaderValue)> {
    vec![
        ("CTYPE1", "RA---TAN".into()),
        ("CTYPE2", "DEC--TAN".into()),
        ("CRVAL1", 10.5.into()),
        ("CRVAL2", 20.5.into()),
        ("CD1_1", (-2e-4).into()),
        ("CD2_2", 2e-4.into()),
    ]
}

#[test]
fn test_save_with_wcs_keeps_other_hdus_and_cards() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("frame.fits");
    write_frame_with_error_plane(&source);
    let image = AstroImage::from_file(&source).unwrap();
    let target = aligned_output_path(&source, DEFAULT_OUTPUT_MARKER);

    image.save_with_wcs(&target, &new_wcs_cards()).unwrap();

    let written = AstroImage::from_file(&target).unwrap();
    assert_eq!(written.data_extension, 0);
    assert_eq!(written.pixels, image.pixels);
    // Replaced, not appended after the old card
    assert_eq!(written.header.get_float("CRVAL1"), Some(10.5));
    assert_eq!(written.header.get_float("CD1_1"), Some(-2e-4));
    for stale in ["CDELT1", "CDELT2", "PC1_1", "CROTA2"] {
        assert!(!written.header.contains(stale), "{stale} survived");
    }

    let mut fptr = FitsFile::open(&target).unwrap();
    assert_eq!(fptr.num_hdus().unwrap(), 2);
    let primary = fptr.primary_hdu().unwrap();
    assert_eq!(primary.read_key::<f64>(&mut fptr, "GAIN").unwrap(), 2.5);
    let observer: String = primary.read_key(&mut fptr, "OBSERVER").unwrap();
    assert_eq!(observer.trim(), "night crew");
    let error_plane = fptr.hdu("ERR").unwrap();
    let errors: Vec<f64> = error_plane.read_image(&mut fptr).unwrap();
    assert_eq!(errors, vec![0.5; 12]);

    // The input is left alone
    let reloaded = AstroImage::from_file(&source).unwrap();
    assert_eq!(reloaded.header.get_float("CDELT1"), Some(-1e-4));
    assert_eq!(reloaded.header.get_float("CRVAL1"), Some(10.0));
}

#[test]
fn test_save_with_wcs_refuses_to_overwrite_input() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("frame.fits");
    write_frame_with_error_plane(&source);
    let image = AstroImage::from_file(&source).unwrap();

    assert!(matches!(
        image.save_with_wcs(&source, &new_wcs_cards()),
        Err(AlignError::Io { .. })
    ));
    assert_eq!(
        AstroImage::from_file(&source).unwrap().header.get_float("CRVAL1"),
        Some(10.0)
    );
}

#[test]
fn test_save_with_wcs_from_memory_writes_single_hdu() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("memory.fits");
    let header: FitsHeader = [("CDELT1", 1e-4), ("CRVAL1", 3.0), ("EXPTIME", 12.0)]
        .into_iter()
        .collect();
    let image = AstroImage::from_pixels(Buffer2::new_filled(4, 3, 7.0), header);

    image.save_with_wcs(&target, &new_wcs_cards()).unwrap();

    let written = AstroImage::from_file(&target).unwrap();
    assert_eq!(written.pixels, image.pixels);
    assert_eq!(written.header.get_float("CRVAL1"), Some(10.5));
    assert_eq!(written.header.get_float("EXPTIME"), Some(12.0));
    assert!(!written.header.contains("CDELT1"));
    assert_eq!(FitsFile::open(&target).unwrap().num_hdus().unwrap(), 1);
}
