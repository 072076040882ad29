use crate::{CreationError, Histogram, PackedHistogram};

pub(crate) mod helpers;

#[test]
fn new_err_high_not_double_low() {
    let res = Histogram::<u64>::new_with_bounds(10, 15, 0);
    assert_eq!(CreationError::HighLessThanTwiceLow, res.unwrap_err());
}

#[test]
fn new_err_low_is_zero() {
    let res = PackedHistogram::<u64>::new_with_bounds(0, 100, 3);
    assert_eq!(CreationError::LowIsZero, res.unwrap_err());
}

#[test]
fn new_err_sigfig_above_five() {
    let res = Histogram::<u64>::new_with_bounds(1, 100, 6);
    assert_eq!(CreationError::SigFigExceedsMax, res.unwrap_err());
}

#[test]
fn new_err_low_too_large_for_precision() {
    let res = Histogram::<u64>::new_with_bounds(u64::max_value() / 2, u64::max_value(), 5);
    assert_eq!(
        CreationError::CannotRepresentSigFigBeyondLow,
        res.unwrap_err()
    );
}
