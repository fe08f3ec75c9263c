//! Header keys read from the data extension and the pixel-scale lookup.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{AlignError, Result};

/// Value of a header card.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Float(f64),
    Text(String),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Text(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Text(value)
    }
}

/// How a known key is read from a FITS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyKind {
    Float,
    Text,
}

/// Keys describing the world-coordinate mapping. Replaced wholesale when an
/// aligned file is written.
pub(crate) const WCS_KEYS: &[(&str, KeyKind)] = &[
    ("CTYPE1", KeyKind::Text),
    ("CTYPE2", KeyKind::Text),
    ("CUNIT1", KeyKind::Text),
    ("CUNIT2", KeyKind::Text),
    ("CRPIX1", KeyKind::Float),
    ("CRPIX2", KeyKind::Float),
    ("CRVAL1", KeyKind::Float),
    ("CRVAL2", KeyKind::Float),
    ("CD1_1", KeyKind::Float),
    ("CD1_2", KeyKind::Float),
    ("CD2_1", KeyKind::Float),
    ("CD2_2", KeyKind::Float),
    ("PC1_1", KeyKind::Float),
    ("PC1_2", KeyKind::Float),
    ("PC2_1", KeyKind::Float),
    ("PC2_2", KeyKind::Float),
    ("CDELT1", KeyKind::Float),
    ("CDELT2", KeyKind::Float),
    ("CROTA2", KeyKind::Float),
];

/// Keys carried over unchanged into an aligned file.
pub(crate) const METADATA_KEYS: &[(&str, KeyKind)] = &[
    ("PIXSCALE", KeyKind::Float),
    ("OBJECT", KeyKind::Text),
    ("TELESCOP", KeyKind::Text),
    ("INSTRUME", KeyKind::Text),
    ("FILTER", KeyKind::Text),
    ("DATE-OBS", KeyKind::Text),
    ("EXPTIME", KeyKind::Float),
    ("BUNIT", KeyKind::Text),
    ("RADESYS", KeyKind::Text),
    ("EQUINOX", KeyKind::Float),
];

/// Pixel-scale keys in priority order: a direct scale, then the two
/// conventional transform-matrix diagonals.
pub const PIXEL_SCALE_KEYS: [&str; 3] = ["PIXSCALE", "CD1_1", "PC1_1"];

/// The subset of header cards the aligner understands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsHeader {
    cards: BTreeMap<String, HeaderValue>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        self.cards.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.cards.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cards.contains_key(key)
    }

    /// Numeric value of `key`; `None` if missing or textual.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.cards.get(key)? {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Text(_) => None,
        }
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.cards.get(key)? {
            HeaderValue::Text(s) => Some(s),
            HeaderValue::Float(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Cards in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy of this header without any WCS cards.
    pub fn without_wcs(&self) -> Self {
        let mut header = self.clone();
        for (key, _) in WCS_KEYS {
            header.remove(key);
        }
        header
    }
}

impl<K: Into<String>, V: Into<HeaderValue>> FromIterator<(K, V)> for FitsHeader {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut header = Self::new();
        for (k, v) in iter {
            header.insert(k, v);
        }
        header
    }
}

/// Absolute value of the first key of [`PIXEL_SCALE_KEYS`] present.
///
/// The value is used as stored; no unit conversion is attempted. A present
/// key that is not a finite number is an error, not a reason to fall back
/// to the next key.
pub fn resolve_pixel_scale(header: &FitsHeader) -> Result<f64> {
    let (key, value) = PIXEL_SCALE_KEYS
        .iter()
        .find_map(|&key| header.get(key).map(|value| (key, value)))
        .ok_or(AlignError::NoPixelScaleFound)?;

    match *value {
        HeaderValue::Float(v) if v.is_finite() => Ok(v.abs()),
        _ => Err(AlignError::InvalidPixelScale {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
