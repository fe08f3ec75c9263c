//! Refine the WCS of a FITS image against a star catalog.
//!
//! Usage:
//! ```text
//! astralign field.fits --catalog stars.yaml --dx 3.5 --dy -2
//! ```
//!
//! The aligned copy is written next to the input as `field.wcs_aligned.fits`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use astralign::{AlignConfig, Alignment, AlignmentSession, CatalogSource, PixelOffset};
use clap::Parser;
use common::log_setup::{LogOptions, setup_logging};

#[derive(Parser, Debug)]
#[command(
    name = "astralign",
    version,
    about = "Refines the WCS of an astronomical image against a star catalog",
    long_about = None
)]
struct Args {
    /// FITS image to align
    image: PathBuf,

    /// Star catalog, a YAML or JSON list of {ra, dec, mag, id}
    #[arg(long)]
    catalog: PathBuf,

    /// Manual X offset in pixels added to the catalog overlay
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    dx: f64,

    /// Manual Y offset in pixels added to the catalog overlay
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    dy: f64,

    /// YAML or JSON file overriding the default alignment settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write daily log files into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Solve but don't write the aligned image
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&LogOptions {
        base_level: &args.log_level,
        log_dir: args.log_dir.as_deref(),
        file_prefix: "astralign",
    })?;

    let config = match &args.config {
        Some(path) => common::load_file::<AlignConfig>(path)?,
        None => AlignConfig::default(),
    };

    let catalog = CatalogSource::file(&args.catalog);
    let session = AlignmentSession::open(&args.image, &catalog, config)
        .with_context(|| format!("Failed to prepare {}", args.image.display()))?;

    let alignment = session
        .align(PixelOffset::new(args.dx, args.dy))
        .with_context(|| format!("Failed to align {}", args.image.display()))?;
    print_summary(&session, &alignment);

    if args.dry_run {
        println!("Dry run, skipping {}", session.output_path().display());
        return Ok(());
    }

    let output = session.write_aligned(&alignment.wcs)?;
    println!("Wrote {}", output.display());

    Ok(())
}

fn print_summary(session: &AlignmentSession, alignment: &Alignment) {
    let estimate = &alignment.estimate;
    println!(
        "Candidates: {} in field, {} refined, {} kept, {} rejected",
        session.candidates().len(),
        alignment.refined.len(),
        estimate.kept_indices.len(),
        alignment.rejected()
    );
    println!(
        "Offset: dx = {:.3} px, dy = {:.3} px (manual {:.3}, {:.3})",
        estimate.offset.dx,
        estimate.offset.dy,
        alignment.manual_offset.dx,
        alignment.manual_offset.dy
    );
    println!(
        "Discrepancy: median {:.3} px, std {:.3} px",
        estimate.stats.median, estimate.stats.std
    );

    let wcs = &alignment.wcs;
    println!(
        "WCS: reference ({:.6}, {:.6}), scale {:.4}\"/px, RMS {:.3}\"",
        wcs.crval.x,
        wcs.crval.y,
        wcs.pixel_scale_arcsec(),
        alignment.rms_arcsec
    );
}
