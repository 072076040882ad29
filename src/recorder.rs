//! Interval recording on top of a single histogram.
//!
//! A [`Recorder`] owns the histogram that samples are currently written to. Calling
//! [`Recorder::interval_histogram`] hands that histogram back, stamped with the start and end of
//! the interval it covered, and starts a new interval with an empty histogram of the same
//! configuration. Reporting code can therefore look at stable, non-overlapping intervals while
//! recording carries on.
//!
//! `Recorder` is not synchronized. Callers that record from several threads wrap it in a lock
//! of their choosing.
//!
//! ```
//! use packed_hdrhistogram::{PackedHistogram, Recorder};
//!
//! let mut recorder = Recorder::new(PackedHistogram::<u64>::new(3).unwrap());
//! recorder.record(1_250).unwrap();
//! recorder.record(980).unwrap();
//!
//! let interval = recorder.interval_histogram();
//! assert_eq!(2, interval.len());
//! assert!(interval.end_timestamp() >= interval.start_timestamp());
//!
//! // the next interval starts out empty
//! assert!(recorder.histogram().is_empty());
//! ```

use crate::core::counts::{Counts, DenseCounts};
use crate::errors::*;
use crate::{Counter, Histogram};
use std::ops::AddAssign;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Records samples into an active histogram and hands out completed intervals.
#[derive(Debug)]
pub struct Recorder<T: Counter, C: Counts<T> = DenseCounts<T>> {
    active: Histogram<T, C>,
}

impl<T: Counter, C: Counts<T>> AddAssign<u64> for Recorder<T, C> {
    fn add_assign(&mut self, value: u64) {
        self.record(value).expect("value out of range");
    }
}

impl<T: Counter, C: Counts<T>> Recorder<T, C> {
    /// Start recording into `histogram`, which becomes the template for every later interval.
    ///
    /// Anything already recorded in `histogram` is discarded and its start timestamp is set to
    /// now.
    pub fn new(mut histogram: Histogram<T, C>) -> Self {
        histogram.reset();
        histogram.set_start_timestamp(now_millis());
        Recorder { active: histogram }
    }

    /// The histogram of the interval in progress.
    pub fn histogram(&self) -> &Histogram<T, C> {
        &self.active
    }

    /// Record `value` in the current interval.
    pub fn record(&mut self, value: u64) -> Result<(), RecordError> {
        self.active.record(value)
    }

    /// Record `value` in the current interval, clamping it to the histogram's range.
    pub fn saturating_record(&mut self, value: u64) {
        self.active.saturating_record(value)
    }

    /// Record `count` occurrences of `value` in the current interval.
    pub fn record_n(&mut self, value: u64, count: T) -> Result<(), RecordError> {
        self.active.record_n(value, count)
    }

    /// See [`Histogram::record_correct`].
    pub fn record_correct(&mut self, value: u64, interval: u64) -> Result<(), RecordError> {
        self.active.record_correct(value, interval)
    }

    /// Finish the current interval and return its histogram.
    ///
    /// The returned histogram has its start timestamp set to when the interval began and its end
    /// timestamp set to now. Recording continues into a new, empty histogram.
    pub fn interval_histogram(&mut self) -> Histogram<T, C> {
        let fresh = Histogram::new_from(&self.active);
        self.swap_in(fresh)
    }

    /// Like [`interval_histogram`](Recorder::interval_histogram), but reuses `recycled` as the
    /// next active histogram instead of allocating a new one.
    ///
    /// `recycled` is usually a histogram previously returned by this recorder. If its settings
    /// do not match the active histogram, a fresh histogram is used instead.
    pub fn interval_histogram_recycling(&mut self, mut recycled: Histogram<T, C>) -> Histogram<T, C> {
        let compatible = recycled.low() == self.active.low()
            && recycled.sigfig() == self.active.sigfig()
            && recycled.is_auto_resize() == self.active.is_auto_resize()
            && (recycled.is_auto_resize() || recycled.high() == self.active.high());

        if compatible {
            recycled.reset();
        } else {
            debug!(
                low = recycled.low(),
                high = recycled.high(),
                sigfig = recycled.sigfig(),
                "Recycled histogram does not match recorder settings, allocating a new one."
            );
            recycled = Histogram::new_from(&self.active);
        }
        self.swap_in(recycled)
    }

    /// Discard everything recorded in the current interval and restart it.
    pub fn reset(&mut self) {
        self.active.reset();
        self.active.set_start_timestamp(now_millis());
    }

    fn swap_in(&mut self, mut next: Histogram<T, C>) -> Histogram<T, C> {
        let now = now_millis();
        next.set_start_timestamp(now);
        next.set_end_timestamp(0);

        let mut finished = std::mem::replace(&mut self.active, next);
        finished.set_end_timestamp(now);
        trace!(
            count = finished.len(),
            start = finished.start_timestamp(),
            end = now,
            "Closed recording interval."
        );
        finished
    }
}
