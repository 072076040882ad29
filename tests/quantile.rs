use packed_hdrhistogram::{Counter, Counts, Histogram, PackedHistogram};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const LENGTHS: [u64; 9] = [1, 5, 10, 50, 100, 500, 1_000, 5_000, 10_000];

fn full_range() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(1, u64::max_value(), 3).unwrap()
}

fn packed_full_range() -> PackedHistogram<u64> {
    PackedHistogram::<u64>::new_with_bounds(1, u64::max_value(), 3).unwrap()
}

#[test]
fn value_at_quantile_internal_count_exceeds_bucket_type() {
    let mut h = PackedHistogram::<u8>::new(3).unwrap();

    for _ in 0..200 {
        h.record(100).unwrap();
    }
    for _ in 0..200 {
        h.record(100_000).unwrap();
    }

    // bucketing means we get the top of the bucket back
    assert_eq!(h.highest_equivalent(100_000), h.value_at_quantile(1.0));
}

#[test]
fn value_at_quantile_2_values() {
    let mut h = packed_full_range();
    h.record(1).unwrap();
    h.record(2).unwrap();

    assert_eq!(1, h.value_at_quantile(0.25));
    assert_eq!(1, h.value_at_quantile(0.5));

    // one ulp past one half
    let almost_half = 0.500_000_000_000_000_1;
    assert!(almost_half > 0.5);
    assert_eq!(2, h.value_at_quantile(almost_half));
    assert_eq!(2, h.value_at_quantile(1.0));
    // capped
    assert_eq!(2, h.value_at_quantile(1.5));
}

#[test]
fn value_at_quantile_5_values() {
    let mut h = packed_full_range();
    h.record(1).unwrap();
    h.record_n(2, 4).unwrap();

    assert_eq!(2, h.value_at_quantile(0.25));
    assert_eq!(2, h.value_at_quantile(0.3));
    assert_eq!(1, h.value_at_quantile(0.0));
}

#[test]
fn value_at_quantile_20k() {
    let mut h = packed_full_range();
    for i in 1..20_001 {
        h.record(i).unwrap();
    }

    assert_eq!(20_000, h.len());
    assert!(h.equivalent(19961, h.value_at_quantile(0.99805)));
}

#[test]
fn value_at_quantile_large_numbers() {
    let mut h = PackedHistogram::<u64>::new_with_bounds(20_000_000, 100_000_000, 5).unwrap();
    h.record(100_000_000).unwrap();
    h.record(20_000_000).unwrap();
    h.record(30_000_000).unwrap();

    assert!(h.equivalent(20_000_000, h.value_at_quantile(0.5)));
    assert!(h.equivalent(30_000_000, h.value_at_quantile(0.5)));
    assert!(h.equivalent(100_000_000, h.value_at_quantile(0.8333)));
    assert!(h.equivalent(100_000_000, h.value_at_quantile(0.8334)));
    assert!(h.equivalent(100_000_000, h.value_at_quantile(0.99)));
}

#[test]
fn value_at_percentile_is_scaled_quantile() {
    let mut h = packed_full_range();
    for i in 1..=1000 {
        h.record(i).unwrap();
    }

    assert_eq!(h.value_at_quantile(0.9), h.value_at_percentile(90.0));
    assert_eq!(990, h.value_at_percentile(99.0));
}

#[test]
fn value_at_quantile_matches_quantile_iter_sequence_values() {
    let mut h = full_range();
    let mut errors = 0;

    for &length in LENGTHS.iter() {
        h.reset();
        for i in 1..=length {
            h.record(i).unwrap();
        }
        assert_eq!(length, h.len());

        errors += count_iter_mismatches(&h);
    }

    assert_eq!(0, errors);
}

#[test]
fn value_at_quantile_matches_quantile_iter_random_values() {
    let mut h = full_range();
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let mut errors = 0;

    for &length in LENGTHS.iter() {
        h.reset();
        for v in RandomMaxIter::new(&mut rng).take(length as usize) {
            h.record(v).unwrap();
        }
        assert_eq!(length, h.len());

        errors += count_iter_mismatches(&h);
    }

    assert_eq!(0, errors);
}

#[test]
fn value_at_quantile_matches_quantile_at_each_value_sequence_values() {
    let mut h = full_range();
    let mut errors = 0;

    for &length in LENGTHS.iter() {
        h.reset();
        for i in 1..=length {
            h.record(i).unwrap();
        }

        for v in 1..=length {
            let quantile = v as f64 / length as f64;
            let calculated = h.value_at_quantile(quantile);
            if !h.equivalent(v, calculated) {
                println!(
                    "len {} value {} quantile {} calc {}",
                    length, v, quantile, calculated
                );
                errors += 1;
            }
        }
    }

    assert_eq!(0, errors);
}

#[test]
fn value_at_quantile_matches_quantile_at_each_value_random_values() {
    let mut h = full_range();
    let mut rng = SmallRng::seed_from_u64(42);
    let mut values = Vec::new();
    let mut errors = 0;

    for &length in LENGTHS.iter() {
        h.reset();
        values.clear();
        for v in RandomMaxIter::new(&mut rng).take(length as usize) {
            h.record(v).unwrap();
            values.push(v);
        }
        values.sort_unstable();

        for (index, &v) in values.iter().enumerate() {
            let quantile = (index as u64 + 1) as f64 / length as f64;
            let calculated = h.value_at_quantile(quantile);
            if !h.equivalent(v, calculated) {
                println!(
                    "len {} index {} quantile {} actual {} calc {}",
                    length, index, quantile, v, calculated
                );
                errors += 1;
            }
        }
    }

    assert_eq!(0, errors);
}

#[test]
fn quantile_below_matches_recorded_fraction() {
    let mut h = packed_full_range();
    for i in 1..=100 {
        h.record(i * 10).unwrap();
    }

    assert_eq!(0.0, h.quantile_below(5));
    assert_eq!(0.1, h.quantile_below(100));
    assert_eq!(0.5, h.quantile_below(509));
    assert_eq!(1.0, h.quantile_below(u64::max_value()));
    assert_eq!(50.0, h.percentile_below(500));
}

/// Counts iteration steps whose value disagrees with `value_at_quantile` by more than one
/// non-empty bucket.
///
/// Iteration computes `index / total`, and `value_at_quantile` multiplies that by `total` again,
/// which can land one count off.
fn count_iter_mismatches<T: Counter, C: Counts<T>>(h: &Histogram<T, C>) -> u64 {
    let mut errors = 0;
    for iv in h.iter_quantiles(100) {
        let calculated = h.value_at_quantile(iv.quantile());
        let v = iv.value_iterated_to();
        if calculated != v
            && calculated != prev_value_nonzero_count(h, v)
            && calculated != next_value_nonzero_count(h, v)
        {
            println!(
                "len {} iter quantile {} iter val {} calc val {}",
                h.len(),
                iv.quantile(),
                v,
                calculated
            );
            errors += 1;
        }
    }
    errors
}

/// Random `u64`s whose bit length is picked uniformly first, so that small numbers show up as
/// often as huge ones.
struct RandomMaxIter<'a, R: Rng> {
    rng: &'a mut R,
}

impl<'a, R: Rng> RandomMaxIter<'a, R> {
    fn new(rng: &'a mut R) -> RandomMaxIter<'a, R> {
        RandomMaxIter { rng }
    }
}

impl<'a, R: Rng> Iterator for RandomMaxIter<'a, R> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        let bit_length = self.rng.gen_range(0..65);

        Some(match bit_length {
            0 => 0,
            64 => u64::max_value(),
            x => self.rng.gen_range(0..(1_u64 << x)),
        })
    }
}

fn next_value_nonzero_count<T: Counter, C: Counts<T>>(h: &Histogram<T, C>, start: u64) -> u64 {
    let mut v = h.next_non_equivalent(start);
    loop {
        if h.count_at(v) > T::zero() {
            return h.highest_equivalent(v);
        }
        if v == u64::max_value() {
            return v;
        }
        v = h.next_non_equivalent(v);
    }
}

fn prev_value_nonzero_count<T: Counter, C: Counts<T>>(h: &Histogram<T, C>, start: u64) -> u64 {
    let mut v = h.lowest_equivalent(start).saturating_sub(1);
    loop {
        if v == 0 {
            return 0;
        }
        if h.count_at(v) > T::zero() {
            return h.highest_equivalent(v);
        }
        v = h.lowest_equivalent(v).saturating_sub(1);
    }
}
