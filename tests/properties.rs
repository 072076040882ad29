use packed_hdrhistogram::{Histogram, PackedHistogram};
use proptest::prelude::*;

fn values() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1..(1_u64 << 50), 1..200)
}

proptest! {
    #[test]
    fn percentiles_are_monotone(xs in values(), a in 0.0..100.0_f64, b in 0.0..100.0_f64) {
        let mut h = PackedHistogram::<u64>::new(3).unwrap();
        for &x in &xs {
            h.record(x).unwrap();
        }

        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(h.value_at_percentile(lo) <= h.value_at_percentile(hi));
        prop_assert!(h.value_at_percentile(100.0) >= h.max());
        prop_assert!(h.value_at_percentile(0.0) <= h.min_nz());
    }

    #[test]
    fn equivalent_values_are_within_precision(v in 1..(1_u64 << 62), sigfig in 1..=5_u8) {
        let h = PackedHistogram::<u64>::new_with_bounds(1, u64::max_value(), sigfig).unwrap();

        let low = h.lowest_equivalent(v);
        let high = h.highest_equivalent(v);
        prop_assert!(low <= v && v <= high);

        // the range of a value is at most its magnitude over 10^sigfig, doubled for rounding
        let bound = 2 * v / 10_u64.pow(u32::from(sigfig));
        prop_assert!(high - low <= bound.max(1));
    }

    #[test]
    fn packed_matches_dense(xs in values(), counts in prop::collection::vec(1..1000_u64, 200)) {
        let mut dense = Histogram::<u64>::new(3).unwrap();
        let mut packed = PackedHistogram::<u64>::new(3).unwrap();
        for (x, n) in xs.iter().zip(counts.iter()) {
            dense.record_n(*x, *n).unwrap();
            packed.record_n(*x, *n).unwrap();
        }

        prop_assert_eq!(dense.len(), packed.len());
        prop_assert_eq!(dense.max(), packed.max());
        prop_assert_eq!(dense.min_nz(), packed.min_nz());
        for &p in &[0.0, 50.0, 90.0, 99.0, 99.9, 100.0] {
            prop_assert_eq!(dense.value_at_percentile(p), packed.value_at_percentile(p));
        }
        prop_assert!(dense == packed);
    }

    #[test]
    fn record_is_idempotent_on_resized_range(xs in values()) {
        let mut h = PackedHistogram::<u64>::new(2).unwrap();
        for &x in &xs {
            h.record(x).unwrap();
        }
        let high = h.high();
        let buckets = h.buckets();

        // everything already recorded is in range, so recording again does not grow
        for &x in &xs {
            h.record(x).unwrap();
        }
        prop_assert_eq!(high, h.high());
        prop_assert_eq!(buckets, h.buckets());
        prop_assert_eq!(2 * xs.len() as u64, h.len());
    }
}

#[cfg(feature = "serialization")]
mod codec {
    use super::values;
    use packed_hdrhistogram::serialization::{
        decode, encode, encoded_len, varint_read, varint_write, zig_zag, zig_zag_decode,
        zig_zag_encode, ByteBuffer,
    };
    use packed_hdrhistogram::{Histogram, PackedHistogram};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn round_trip_keeps_distribution(xs in values(), compressed in any::<bool>()) {
            let mut h = PackedHistogram::<u64>::new(3).unwrap();
            for &x in &xs {
                h.record(x).unwrap();
            }

            let bytes = encode(&h, compressed).unwrap();
            let back: Histogram<u64> = decode(&bytes).unwrap();

            prop_assert_eq!(h.len(), back.len());
            for &p in &[0.0, 50.0, 90.0, 99.0, 99.9, 100.0] {
                prop_assert_eq!(h.value_at_percentile(p), back.value_at_percentile(p));
            }
            for v in h.iter_recorded() {
                prop_assert_eq!(v.count_at_value(), back.count_at(v.value_iterated_to()));
            }
        }

        #[test]
        fn varint_length_follows_magnitude(n in any::<u64>()) {
            let mut buf = [0_u8; 9];
            let written = varint_write(n, &mut buf);

            let bits = 64 - n.leading_zeros() as usize;
            let expected = if bits > 56 { 9 } else { ((bits + 6) / 7).max(1) };
            prop_assert_eq!(expected, written);
            prop_assert_eq!(written, encoded_len(n));
            prop_assert_eq!(n, varint_read(&mut &buf[..written]).unwrap());
        }

        #[test]
        fn buffer_codec_round_trips(xs in prop::collection::vec(0..(1_i64 << 56), 1..50)) {
            let mut buf = ByteBuffer::new();
            for &x in &xs {
                let written = zig_zag::encode(&mut buf, x);
                // zig-zag doubles non-negative values
                prop_assert_eq!(encoded_len(2 * x as u64), written);
            }

            for &x in &xs {
                prop_assert_eq!(x, zig_zag::decode(&mut buf).unwrap());
            }
            prop_assert_eq!(0, buf.remaining());
        }

        #[test]
        fn zig_zag_inverts(n in any::<i64>()) {
            prop_assert_eq!(n, zig_zag_decode(zig_zag_encode(n)));
        }
    }
}
