//! Configuration for an alignment session.
//!
//! Every section deserializes with defaults, so a YAML or JSON config file
//! only needs the keys it changes:
//!
//! ```yaml
//! centroid:
//!   box_padding: 15
//! offset:
//!   cut_sigma: 1.5
//! ```

use serde::{Deserialize, Serialize};

use crate::alignment::OffsetConfig;
use crate::astro_image::DEFAULT_OUTPUT_MARKER;
use crate::astrometry::MIN_FIT_MATCHES;
use crate::centroid::CentroidConfig;
use crate::error::{AlignError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub centroid: CentroidConfig,
    pub offset: OffsetConfig,
    /// Fewest clean matches accepted for the coordinate fit.
    pub min_matches: usize,
    /// Inserted into the output file name: `<name>.<marker>.fits`.
    pub output_marker: String,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            centroid: CentroidConfig::default(),
            offset: OffsetConfig::default(),
            min_matches: MIN_FIT_MATCHES,
            output_marker: DEFAULT_OUTPUT_MARKER.to_string(),
        }
    }
}

impl AlignConfig {
    pub fn validate(&self) -> Result<()> {
        self.centroid.validate().map_err(AlignError::Config)?;
        self.offset.validate().map_err(AlignError::Config)?;

        if self.min_matches < MIN_FIT_MATCHES {
            return Err(AlignError::Config(format!(
                "min_matches must be at least {MIN_FIT_MATCHES}, got {}",
                self.min_matches
            )));
        }
        let marker = self.output_marker.trim();
        if marker.is_empty() || marker.contains(['/', '\\']) {
            return Err(AlignError::Config(format!(
                "output_marker must be a non-empty file name fragment, got '{}'",
                self.output_marker
            )));
        }
        Ok(())
    }
}
