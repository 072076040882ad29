use packed_hdrhistogram::{Histogram, PackedHistogram};

#[test]
fn autosizing_edges() {
    let mut h = PackedHistogram::<u64>::new(3).unwrap();
    h += (1_u64 << 62) - 1;
    assert_eq!(52, h.buckets());
    assert_eq!(54_272, h.distinct_values());

    h += u64::max_value();
    assert_eq!(54, h.buckets());
    assert_eq!(56_320, h.distinct_values());
}

#[test]
fn autosizing_powers_of_two() {
    let mut h = Histogram::<u64>::new(3).unwrap();
    let mut p = PackedHistogram::<u64>::new(3).unwrap();
    for i in 0..63 {
        h += 1_u64 << i;
        p += 1_u64 << i;
    }

    assert_eq!(53, h.buckets());
    assert_eq!(55_296, h.distinct_values());
    assert_eq!(h.distinct_values(), p.distinct_values());
    assert_eq!(h, p);
}

#[test]
fn autosizing_add() {
    let mut h1 = PackedHistogram::<u64>::new(2).unwrap();
    let mut h2 = Histogram::<u64>::new(2).unwrap();

    h1 += 1000;
    h1 += 1_000_000_000;

    h2 += &h1;
    assert!(h2.equivalent(h2.max(), 1_000_000_000));
    assert_eq!(2, h2.len());
}

#[test]
fn autosizing_across_continuous_range() {
    let mut h = PackedHistogram::<u64>::new(2).unwrap();

    for i in 0..1_000_000_u64 {
        h += i;
    }
    assert_eq!(1_000_000, h.len());
    assert!(h.equivalent(999_999, h.max()));
}

#[test]
fn resize_keeps_existing_counts() {
    let mut h = PackedHistogram::<u64>::new(3).unwrap();
    h.record_n(1, 5).unwrap();
    h.record_n(1_500, 7).unwrap();

    h.record(1 << 40).unwrap();

    assert_eq!(5, h.count_at(1));
    assert_eq!(7, h.count_at(1_500));
    assert_eq!(1, h.count_at(1 << 40));
    assert_eq!(13, h.len());
}

#[test]
fn resize_is_reflected_in_high() {
    let mut h = Histogram::<u64>::new(3).unwrap();
    assert_eq!(2, h.high());

    h += 5_000;
    assert!(h.high() >= 5_000);
    assert_eq!(h.high(), h.highest_equivalent(h.high()));
}
