//! World Coordinate System (WCS) with the gnomonic (TAN) projection.
//!
//! Pixel coordinates are 0-based internally. FITS headers store `CRPIX`
//! 1-based; the conversion happens in [`Wcs::from_header`] and
//! [`Wcs::to_header_cards`].

use glam::DVec2;

use crate::astro_image::{FitsHeader, HeaderValue};
use crate::error::{AlignError, Result};
use crate::math::ARCSEC_PER_DEG;

/// A pixel position paired with its sky position (RA, Dec in degrees).
pub type PixelSkyMatch = ((f64, f64), (f64, f64));

const CTYPE_RA: &str = "RA---TAN";
const CTYPE_DEC: &str = "DEC--TAN";

/// World Coordinate System solution.
///
/// 1. Pixel to intermediate: `(xi, eta) = CD × (x - crpix.x, y - crpix.y)`
/// 2. Intermediate to sky: de-project from the tangent plane at `crval`
#[derive(Debug, Clone, PartialEq)]
pub struct Wcs {
    /// Reference pixel, 0-based.
    pub crpix: DVec2,
    /// Reference sky position in degrees (RA, Dec).
    pub crval: DVec2,
    /// `[[CD1_1, CD1_2], [CD2_1, CD2_2]]`, degrees per pixel.
    pub cd: [[f64; 2]; 2],
    /// Image dimensions (width, height) in pixels.
    pub naxis: (usize, usize),
}

impl Wcs {
    pub fn new(crpix: DVec2, crval: DVec2, cd: [[f64; 2]; 2], naxis: (usize, usize)) -> Self {
        Self {
            crpix,
            crval,
            cd,
            naxis,
        }
    }

    /// WCS from pixel scale and rotation, no shear.
    ///
    /// `pixel_scale` in arcseconds per pixel, `rotation` in degrees (North
    /// through East). `mirrored` flips the X axis.
    #[cfg(test)]
    pub fn from_scale_rotation(
        crpix: DVec2,
        crval: DVec2,
        pixel_scale: f64,
        rotation: f64,
        naxis: (usize, usize),
        mirrored: bool,
    ) -> Self {
        let scale_deg = pixel_scale / ARCSEC_PER_DEG;
        let (sin_r, cos_r) = rotation.to_radians().sin_cos();
        let sign = if mirrored { -1.0 } else { 1.0 };

        let cd = [
            [sign * scale_deg * cos_r, -scale_deg * sin_r],
            [sign * scale_deg * sin_r, scale_deg * cos_r],
        ];

        Self::new(crpix, crval, cd, naxis)
    }

    /// Read a TAN WCS from header cards.
    ///
    /// The linear part comes from `CDi_j` if any is present (missing elements
    /// are zero), else `PCi_j × CDELTi` (missing PC elements default to the
    /// identity), else `CDELTi` with an optional `CROTA2`.
    pub fn from_header(header: &FitsHeader, naxis: (usize, usize)) -> Result<Self> {
        for key in ["CTYPE1", "CTYPE2"] {
            let ctype = header.get_text(key).ok_or_else(|| missing(key))?;
            if !ctype.trim_end().ends_with("-TAN") {
                return Err(AlignError::UnsupportedProjection {
                    ctype: ctype.to_string(),
                });
            }
        }

        let required = |key: &str| header.get_float(key).ok_or_else(|| missing(key));
        let crpix = DVec2::new(required("CRPIX1")? - 1.0, required("CRPIX2")? - 1.0);
        let crval = DVec2::new(required("CRVAL1")?, required("CRVAL2")?);

        let cd = read_linear_transform(header)?;
        let wcs = Self::new(crpix, crval, cd, naxis);
        if wcs.determinant() == 0.0 || !wcs.determinant().is_finite() {
            return Err(AlignError::DegenerateFit {
                reason: "CD matrix in header is singular".to_string(),
            });
        }
        Ok(wcs)
    }

    /// Header cards describing this WCS: CTYPE, CUNIT, CRPIX (1-based),
    /// CRVAL and the CD matrix. No PC, CDELT or CROTA cards are written.
    pub fn to_header_cards(&self) -> Vec<(&'static str, HeaderValue)> {
        let [[cd11, cd12], [cd21, cd22]] = self.cd;
        vec![
            ("CTYPE1", CTYPE_RA.into()),
            ("CTYPE2", CTYPE_DEC.into()),
            ("CUNIT1", "deg".into()),
            ("CUNIT2", "deg".into()),
            ("CRPIX1", (self.crpix.x + 1.0).into()),
            ("CRPIX2", (self.crpix.y + 1.0).into()),
            ("CRVAL1", self.crval.x.into()),
            ("CRVAL2", self.crval.y.into()),
            ("CD1_1", cd11.into()),
            ("CD1_2", cd12.into()),
            ("CD2_1", cd21.into()),
            ("CD2_2", cd22.into()),
        ]
    }

    /// Convert pixel coordinates to sky coordinates (RA, Dec in degrees).
    pub fn pixel_to_sky(&self, pixel: DVec2) -> DVec2 {
        let d = pixel - self.crpix;

        let xi = (self.cd[0][0] * d.x + self.cd[0][1] * d.y).to_radians();
        let eta = (self.cd[1][0] * d.x + self.cd[1][1] * d.y).to_radians();

        let ra0 = self.crval.x.to_radians();
        let (sin_dec0, cos_dec0) = self.crval.y.to_radians().sin_cos();
        let denom = cos_dec0 - eta * sin_dec0;

        let ra = ra0 + xi.atan2(denom);
        let dec = (sin_dec0 + eta * cos_dec0).atan2(xi.hypot(denom));

        DVec2::new(ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }

    /// Convert sky coordinates (RA, Dec in degrees) to pixel coordinates.
    pub fn sky_to_pixel(&self, sky: DVec2) -> DVec2 {
        let standard = project_to_standard(self.crval, sky);

        // Solve CD * (dx, dy) = (xi, eta)
        let det = self.determinant();
        debug_assert!(det.abs() > 0.0, "CD matrix is singular");
        let dx = (self.cd[1][1] * standard.x - self.cd[0][1] * standard.y) / det;
        let dy = (-self.cd[1][0] * standard.x + self.cd[0][0] * standard.y) / det;

        self.crpix + DVec2::new(dx, dy)
    }

    /// [`Self::sky_to_pixel`] over parallel arrays.
    pub fn sky_to_pixels(&self, ras: &[f64], decs: &[f64]) -> (Vec<f64>, Vec<f64>) {
        ras.iter()
            .zip(decs)
            .map(|(&ra, &dec)| {
                let pixel = self.sky_to_pixel(DVec2::new(ra, dec));
                (pixel.x, pixel.y)
            })
            .unzip()
    }

    pub fn determinant(&self) -> f64 {
        self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0]
    }

    /// Average of the X and Y pixel scales in arcseconds per pixel.
    pub fn pixel_scale_arcsec(&self) -> f64 {
        let scale_x = self.cd[0][0].hypot(self.cd[1][0]);
        let scale_y = self.cd[0][1].hypot(self.cd[1][1]);
        (scale_x + scale_y) / 2.0 * ARCSEC_PER_DEG
    }

    /// Sky position of the image center `(width / 2, height / 2)`.
    pub fn center(&self) -> DVec2 {
        self.pixel_to_sky(DVec2::new(
            self.naxis.0 as f64 / 2.0,
            self.naxis.1 as f64 / 2.0,
        ))
    }

    /// RMS angular residual of `matches` in arcseconds. Zero for no matches.
    pub fn compute_residuals(&self, matches: &[PixelSkyMatch]) -> f64 {
        if matches.is_empty() {
            return 0.0;
        }

        let sum_sq: f64 = matches
            .iter()
            .map(|&((px, py), (ra, dec))| {
                let predicted = self.pixel_to_sky(DVec2::new(px, py));
                let delta_ra = wrap_degrees(predicted.x - ra) * dec.to_radians().cos();
                let delta_dec = predicted.y - dec;
                (delta_ra.hypot(delta_dec) * ARCSEC_PER_DEG).powi(2)
            })
            .sum();

        (sum_sq / matches.len() as f64).sqrt()
    }
}

/// Gnomonic standard coordinates (xi, eta) in degrees of `sky` on the
/// tangent plane at `center`.
///
/// Points 90° or more from `center` have no projection; the result is then
/// non-finite or meaningless, so callers check [`tangent_denominator`] first.
pub(crate) fn project_to_standard(center: DVec2, sky: DVec2) -> DVec2 {
    let (sin_dec, cos_dec) = sky.y.to_radians().sin_cos();
    let (sin_dec0, cos_dec0) = center.y.to_radians().sin_cos();
    let (sin_dra, cos_dra) = (sky.x - center.x).to_radians().sin_cos();

    let d = tangent_denominator(center, sky);
    let xi = cos_dec * sin_dra / d;
    let eta = (sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra) / d;

    DVec2::new(xi.to_degrees(), eta.to_degrees())
}

/// Cosine of the angle between `center` and `sky`; positive on the
/// projectable hemisphere.
pub(crate) fn tangent_denominator(center: DVec2, sky: DVec2) -> f64 {
    let (sin_dec, cos_dec) = sky.y.to_radians().sin_cos();
    let (sin_dec0, cos_dec0) = center.y.to_radians().sin_cos();
    sin_dec * sin_dec0 + cos_dec * cos_dec0 * (sky.x - center.x).to_radians().cos()
}

/// Wrap an angle difference in degrees into `[-180, 180)`.
pub(crate) fn wrap_degrees(delta: f64) -> f64 {
    (delta + 180.0).rem_euclid(360.0) - 180.0
}

fn missing(key: &str) -> AlignError {
    AlignError::MissingWcsKey {
        key: key.to_string(),
    }
}

fn read_linear_transform(header: &FitsHeader) -> Result<[[f64; 2]; 2]> {
    const CD_KEYS: [[&str; 2]; 2] = [["CD1_1", "CD1_2"], ["CD2_1", "CD2_2"]];
    const PC_KEYS: [[&str; 2]; 2] = [["PC1_1", "PC1_2"], ["PC2_1", "PC2_2"]];

    let any_of = |keys: &[[&str; 2]; 2]| keys.iter().flatten().any(|k| header.contains(k));
    let matrix = |keys: &[[&str; 2]; 2], diagonal: f64| -> [[f64; 2]; 2] {
        let mut m = [[0.0; 2]; 2];
        for (i, row) in keys.iter().enumerate() {
            for (j, key) in row.iter().enumerate() {
                let default = if i == j { diagonal } else { 0.0 };
                m[i][j] = header.get_float(key).unwrap_or(default);
            }
        }
        m
    };

    if any_of(&CD_KEYS) {
        return Ok(matrix(&CD_KEYS, 0.0));
    }

    let cdelt1 = header.get_float("CDELT1");
    let cdelt2 = header.get_float("CDELT2");

    if any_of(&PC_KEYS) {
        let pc = matrix(&PC_KEYS, 1.0);
        let cdelt = [cdelt1.unwrap_or(1.0), cdelt2.unwrap_or(1.0)];
        return Ok([
            [cdelt[0] * pc[0][0], cdelt[0] * pc[0][1]],
            [cdelt[1] * pc[1][0], cdelt[1] * pc[1][1]],
        ]);
    }

    match (cdelt1, cdelt2) {
        (Some(cdelt1), Some(cdelt2)) => {
            let crota2 = header.get_float("CROTA2").unwrap_or(0.0).to_radians();
            let (sin_r, cos_r) = crota2.sin_cos();
            Ok([
                [cdelt1 * cos_r, -cdelt2 * sin_r],
                [cdelt1 * sin_r, cdelt2 * cos_r],
            ])
        }
        (None, _) => Err(missing("CDELT1")),
        (_, None) => Err(missing("CDELT2")),
    }
}
