//! Least-squares TAN WCS from matched pixel/sky pairs.

use glam::{DVec2, DVec3};

use super::wcs::{PixelSkyMatch, Wcs, project_to_standard, tangent_denominator};
use crate::error::{AlignError, Result};
use crate::math::solve;

/// Fewest matches that determine the six linear coefficients.
pub const MIN_FIT_MATCHES: usize = 3;

/// Fit a TAN WCS to `matches`.
///
/// The tangent point is the normalized mean direction of the sky positions.
/// Matches are projected onto that plane and two independent 3-parameter
/// linear fits give `xi = a0 + a1 x + a2 y` and `eta = b0 + b1 x + b2 y`, so
/// `CD = [[a1, a2], [b1, b2]]` and the reference pixel is where both vanish.
pub fn fit_wcs_from_points(matches: &[PixelSkyMatch], naxis: (usize, usize)) -> Result<Wcs> {
    if matches.len() < MIN_FIT_MATCHES {
        return Err(AlignError::InsufficientMatches {
            found: matches.len(),
            required: MIN_FIT_MATCHES,
        });
    }

    let crval = mean_direction(matches)?;

    let mut standard = Vec::with_capacity(matches.len());
    for &(_, (ra, dec)) in matches {
        let sky = DVec2::new(ra, dec);
        if tangent_denominator(crval, sky) <= 0.0 {
            return Err(degenerate("matches span more than a hemisphere"));
        }
        standard.push(project_to_standard(crval, sky));
    }

    // Center pixel coordinates to keep the normal equations well conditioned
    let n = matches.len() as f64;
    let centroid = matches
        .iter()
        .fold(DVec2::ZERO, |acc, &((x, y), _)| acc + DVec2::new(x, y))
        / n;

    let mut normal = [[0.0f64; 3]; 3];
    let mut rhs_xi = [0.0f64; 3];
    let mut rhs_eta = [0.0f64; 3];
    for (&((x, y), _), s) in matches.iter().zip(&standard) {
        let row = [1.0, x - centroid.x, y - centroid.y];
        for i in 0..3 {
            for j in 0..3 {
                normal[i][j] += row[i] * row[j];
            }
            rhs_xi[i] += row[i] * s.x;
            rhs_eta[i] += row[i] * s.y;
        }
    }

    let collinear = || degenerate("pixel positions are collinear");
    let [a0, a1, a2] = solve(&normal, &rhs_xi).ok_or_else(collinear)?;
    let [b0, b1, b2] = solve(&normal, &rhs_eta).ok_or_else(collinear)?;

    let cd = [[a1, a2], [b1, b2]];
    let det = a1 * b2 - a2 * b1;
    if det == 0.0 || !det.is_finite() {
        return Err(degenerate("fitted CD matrix is singular"));
    }

    // Solve CD * (crpix - centroid) = -(a0, b0)
    let offset = DVec2::new(-(b2 * a0 - a2 * b0) / det, -(-b1 * a0 + a1 * b0) / det);
    let wcs = Wcs::new(centroid + offset, crval, cd, naxis);

    tracing::debug!(
        matches = matches.len(),
        crval_ra = wcs.crval.x,
        crval_dec = wcs.crval.y,
        scale_arcsec = wcs.pixel_scale_arcsec(),
        "Fitted WCS"
    );

    Ok(wcs)
}

/// Normalized mean of the unit vectors of the sky positions, as (RA, Dec).
fn mean_direction(matches: &[PixelSkyMatch]) -> Result<DVec2> {
    let sum = matches.iter().fold(DVec3::ZERO, |acc, &(_, (ra, dec))| {
        let (sin_ra, cos_ra) = ra.to_radians().sin_cos();
        let (sin_dec, cos_dec) = dec.to_radians().sin_cos();
        acc + DVec3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec)
    });

    let Some(mean) = sum.try_normalize() else {
        return Err(degenerate("sky positions have no mean direction"));
    };

    let ra = mean.y.atan2(mean.x).to_degrees().rem_euclid(360.0);
    let dec = mean.z.clamp(-1.0, 1.0).asin().to_degrees();
    Ok(DVec2::new(ra, dec))
}

fn degenerate(reason: &str) -> AlignError {
    AlignError::DegenerateFit {
        reason: reason.to_string(),
    }
}
