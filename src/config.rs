//! Serializable histogram settings.
//!
//! A [`HistogramConfig`] captures the construction parameters of a histogram so they can live in
//! an application's own configuration file. Missing fields fall back to the same settings
//! `Histogram::new(3)` uses.
//!
//! ```
//! use packed_hdrhistogram::{HistogramConfig, PackedHistogram};
//!
//! let config = HistogramConfig::new(1, 60_000, 2);
//! let h: PackedHistogram<u32> = config.build_packed().unwrap();
//! assert_eq!(60_000, h.high());
//! assert!(!h.is_auto_resize());
//! ```

use crate::core::counts::{Counts, DenseCounts};
use crate::errors::CreationError;
use crate::packed::PackedCounts;
use crate::{Counter, Histogram};
use serde::{Deserialize, Serialize};

const fn default_lowest() -> u64 {
    1
}

const fn default_highest() -> u64 {
    2
}

const fn default_sigfig() -> u8 {
    3
}

const fn default_true() -> bool {
    true
}

/// Construction parameters for a histogram of either storage flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramConfig {
    /// Lowest discernible value. Must be at least 1.
    #[serde(default = "default_lowest")]
    pub lowest: u64,
    /// Highest trackable value. Must be at least twice `lowest`. With `auto_resize` this is only
    /// the starting point.
    #[serde(default = "default_highest")]
    pub highest: u64,
    /// Number of significant decimal digits, in `[0, 5]`.
    #[serde(default = "default_sigfig")]
    pub sigfig: u8,
    /// Grow the range when a larger value is recorded.
    #[serde(default = "default_true")]
    pub auto_resize: bool,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        HistogramConfig {
            lowest: default_lowest(),
            highest: default_highest(),
            sigfig: default_sigfig(),
            auto_resize: default_true(),
        }
    }
}

impl HistogramConfig {
    /// Settings for a fixed-range histogram.
    pub fn new(lowest: u64, highest: u64, sigfig: u8) -> Self {
        HistogramConfig {
            lowest,
            highest,
            sigfig,
            auto_resize: false,
        }
    }

    /// Builder-style toggle for `auto_resize`.
    pub fn with_auto_resize(mut self, enabled: bool) -> Self {
        self.auto_resize = enabled;
        self
    }

    /// Build a histogram with storage `C`.
    ///
    /// # Errors
    ///
    /// Returns a `CreationError` if the bounds or precision are invalid.
    pub fn build<T: Counter, C: Counts<T>>(&self) -> Result<Histogram<T, C>, CreationError> {
        let mut h = Histogram::new_with_bounds(self.lowest, self.highest, self.sigfig)?;
        h.auto(self.auto_resize);
        Ok(h)
    }

    /// Build a histogram with dense storage.
    pub fn build_dense<T: Counter>(&self) -> Result<Histogram<T, DenseCounts<T>>, CreationError> {
        self.build()
    }

    /// Build a histogram with packed storage.
    pub fn build_packed<T: Counter>(
        &self,
    ) -> Result<Histogram<T, PackedCounts<T>>, CreationError> {
        self.build()
    }
}

impl<'a, T: Counter, C: Counts<T>> From<&'a Histogram<T, C>> for HistogramConfig {
    fn from(h: &'a Histogram<T, C>) -> Self {
        HistogramConfig {
            lowest: h.low(),
            highest: h.high(),
            sigfig: h.sigfig(),
            auto_resize: h.is_auto_resize(),
        }
    }
}
