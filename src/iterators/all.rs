use crate::core::counter::Counter;
use crate::core::counts::Counts;
use crate::iterators::{HistogramIterator, PickMetadata, PickyIterator};
use crate::Histogram;

/// An iterator that will yield every bin.
pub struct Iter(Option<usize>);

impl Iter {
    /// Construct a new full iterator. See `Histogram::iter_all` for details.
    pub fn new<T: Counter, C: Counts<T>>(hist: &Histogram<T, C>) -> HistogramIterator<T, C, Iter> {
        HistogramIterator::new(hist, Iter(None))
    }
}

impl<T: Counter> PickyIterator<T> for Iter {
    fn pick(&mut self, index: usize, _: u64, _: T) -> Option<PickMetadata> {
        // have we visited before?
        if self.0 == Some(index) {
            None
        } else {
            self.0 = Some(index);
            Some(PickMetadata::new(None, None))
        }
    }

    fn more(&mut self, _: usize) -> bool {
        true
    }
}
