//! Finding the part of a multi-part container that holds the pixels.

use crate::error::{AlignError, Result};

/// Outcome of [`locate_data_extension`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataExtension {
    Found(usize),
    NotFound,
}

impl DataExtension {
    pub fn index(self) -> Option<usize> {
        match self {
            DataExtension::Found(index) => Some(index),
            DataExtension::NotFound => None,
        }
    }

    pub fn into_result(self) -> Result<usize> {
        self.index().ok_or(AlignError::NoDataExtensionFound)
    }
}

/// A container part that may carry a data block.
pub trait DataPart {
    /// Whether the part holds a present, non-empty data block.
    fn has_data(&self) -> bool;
}

impl<T> DataPart for Option<&[T]> {
    fn has_data(&self) -> bool {
        self.is_some_and(|data| !data.is_empty())
    }
}

impl<T> DataPart for Option<Vec<T>> {
    fn has_data(&self) -> bool {
        self.as_ref().is_some_and(|data| !data.is_empty())
    }
}

/// Shape of one FITS HDU, as far as locating pixels is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HduSummary {
    pub is_image: bool,
    /// FITS axis lengths, slowest first (`[NAXIS2, NAXIS1]` for 2-D).
    pub shape: Vec<usize>,
}

impl DataPart for HduSummary {
    fn has_data(&self) -> bool {
        self.is_image && !self.shape.is_empty() && self.shape.iter().product::<usize>() > 0
    }
}

/// Index of the first part holding data. Later data-bearing parts are ignored.
pub fn locate_data_extension<P: DataPart>(parts: &[P]) -> DataExtension {
    parts
        .iter()
        .position(DataPart::has_data)
        .map_or(DataExtension::NotFound, DataExtension::Found)
}
