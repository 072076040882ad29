use packed_hdrhistogram::{Counts, Histogram};

fn histo<C: Counts<u64>>(low: u64, high: u64, sigfig: u8) -> Histogram<u64, C> {
    Histogram::new_with_bounds(low, high, sigfig).unwrap()
}

fn nonzero(values: Vec<(u64, u64)>) -> Vec<(u64, u64)> {
    values.into_iter().filter(|v| v.1 != 0).collect()
}

fn recorded_non_saturated_total_count<C: Counts<u64>>() {
    let mut h = histo::<C>(1, u64::max_value(), 3);
    h.record(1).unwrap();
    h.record(1_000).unwrap();
    h.record(1_000_000).unwrap();

    let expected = vec![1, 1_000, h.highest_equivalent(1_000_000)];
    assert_eq!(
        expected,
        h.iter_recorded()
            .map(|iv| iv.value_iterated_to())
            .collect::<Vec<u64>>()
    );
}

fn recorded_saturated_total_count<C: Counts<u64>>() {
    let mut h = histo::<C>(1, u64::max_value(), 3);
    h.record_n(1, u64::max_value()).unwrap();
    h.record_n(1_000, u64::max_value()).unwrap();
    h.record_n(1_000_000, u64::max_value()).unwrap();

    let expected = vec![1, 1_000, h.highest_equivalent(1_000_000)];
    assert_eq!(
        expected,
        h.iter_recorded()
            .map(|iv| iv.value_iterated_to())
            .collect::<Vec<u64>>()
    );
}

fn recorded_only_zero<C: Counts<u64>>() {
    let mut h = histo::<C>(1, 1000, 3);
    h.record_n(0, 3).unwrap();

    let values: Vec<(u64, u64)> = h
        .iter_recorded()
        .map(|v| (v.value_iterated_to(), v.count_at_value()))
        .collect();
    assert_eq!(vec![(0, 3)], values);
}

fn recorded_empty<C: Counts<u64>>() {
    let h = histo::<C>(1, 1000, 3);
    assert_eq!(0, h.iter_recorded().count());
    assert_eq!(0, h.iter_quantiles(2).count());
    assert_eq!(0, h.iter_linear(10).count());
}

fn recorded_values_all_buckets<C: Counts<u64>>() {
    let mut h = histo::<C>(1, 8191, 3);
    h.record(1).unwrap();
    h.record(2).unwrap();
    // first in top half
    h.record(1024).unwrap();
    // first in 2nd bucket
    h.record(2048).unwrap();
    // first in 3rd
    h.record(4096).unwrap();
    // smallest value in last sub bucket of third
    h.record(8192 - 4).unwrap();

    let values: Vec<(u64, u64)> = h
        .iter_recorded()
        .map(|v| (v.value_iterated_to(), v.count_at_value()))
        .collect();

    let expected = vec![
        (1, 1),
        (2, 1),
        (1024, 1),
        (2048 + 1, 1),
        (4096 + 3, 1),
        (8192 - 1, 1),
    ];
    assert_eq!(expected, values);
}

fn all_values_all_buckets<C: Counts<u64>>() {
    let mut h = histo::<C>(1, 8191, 3);
    h.record(1).unwrap();
    h.record(2).unwrap();
    h.record(1024).unwrap();
    h.record(2048).unwrap();
    h.record(4096).unwrap();
    h.record(8192 - 4).unwrap();

    let values: Vec<(u64, u64)> = h
        .iter_all()
        .map(|v| (v.value_iterated_to(), v.count_at_value()))
        .collect();

    // 4096 distinct expressible values
    assert_eq!(2048 + 2 * 1024, values.len());
    let expected = vec![
        (1, 1),
        (2, 1),
        (1024, 1),
        (2048 + 1, 1),
        (4096 + 3, 1),
        (8192 - 1, 1),
    ];
    assert_eq!(expected, nonzero(values));
}

fn all_values_unit_magnitude_2<C: Counts<u64>>() {
    let mut h = histo::<C>(4, 16384 - 1, 3);
    h.record(4).unwrap();
    h.record(4096).unwrap();
    h.record(8192).unwrap();
    h.record(16384 - 8).unwrap();

    let values: Vec<(u64, u64)> = h
        .iter_all()
        .map(|v| (v.value_iterated_to(), v.count_at_value()))
        .collect();

    // magnitude 2 means the 2nd bucket has a scale of 8 = 2 * 2^2
    assert_eq!(2048 + 1024, values.len());
    let expected = vec![(4 + 3, 1), (4096 + 3, 1), (8192 + 7, 1), (16384 - 1, 1)];
    assert_eq!(expected, nonzero(values));
}

fn linear_count_since_last_iteration_saturates<C: Counts<u64>>() {
    let mut h = histo::<C>(1, u64::max_value(), 3);
    h.record_n(1, u64::max_value()).unwrap();
    h.record_n(4, u64::max_value() - 1).unwrap();
    h.record_n(5, u64::max_value() - 1).unwrap();
    h.record_n(6, 100).unwrap();
    h.record_n(7, 200).unwrap();
    h.record_n(10, 400).unwrap();

    let expected = vec![
        (1, u64::max_value()),
        (3, 0),
        // 2x (max - 1) saturates
        (5, u64::max_value()),
        // and does not leak into the next step
        (7, 300),
        (9, 0),
        (11, 400),
    ];
    assert_eq!(
        expected,
        h.iter_linear(2)
            .map(|iv| (iv.value_iterated_to(), iv.count_since_last_iteration()))
            .collect::<Vec<(u64, u64)>>()
    );
}

fn prepare_for_step_iteration<C: Counts<u64>>() -> Histogram<u64, C> {
    let mut h = histo::<C>(1, u64::max_value(), 3);
    h.record(1).unwrap();
    h.record(2047).unwrap();
    // bucket size 2
    h.record(2048).unwrap();
    h.record(2049).unwrap();
    h.record(4095).unwrap();
    // bucket size 4
    h.record(4096).unwrap();
    h.record(4097).unwrap();
    h.record(4098).unwrap();
    h.record(4099).unwrap();
    // 2nd sub bucket of size 4
    h.record(4100).unwrap();
    h
}

fn linear_visits_wide_buckets_multiple_times<C: Counts<u64>>() {
    let h = prepare_for_step_iteration::<C>();
    let values = h
        .iter_linear(1)
        .map(|iv| (iv.value_iterated_to(), iv.count_since_last_iteration()))
        .collect::<Vec<(u64, u64)>>();

    assert_eq!((0, 0), values[0]);
    assert_eq!((1, 1), values[1]);
    assert_eq!((2047, 1), values[2047]);
    // size 2: the bucket's count shows up on its first value only
    assert_eq!((2048, 2), values[2048]);
    assert_eq!((2049, 0), values[2049]);
    assert_eq!((4094, 1), values[4094]);
    assert_eq!((4095, 0), values[4095]);
    // size 4
    assert_eq!((4096, 4), values[4096]);
    assert_eq!((4099, 0), values[4099]);
    assert_eq!((4100, 1), values[4100]);
    assert_eq!((4103, 0), values[4103]);

    assert_eq!(4104, values.len());
}

fn linear_visits_buckets_once_at_matching_step<C: Counts<u64>>() {
    let h = prepare_for_step_iteration::<C>();
    let values = h
        .iter_linear(4)
        .map(|iv| (iv.value_iterated_to(), iv.count_since_last_iteration()))
        .collect::<Vec<(u64, u64)>>();

    assert_eq!((3, 1), values[0]);
    assert_eq!((2047, 1), values[511]);
    assert_eq!((2051, 2), values[512]);
    assert_eq!((4095, 1), values[1023]);
    assert_eq!((4099, 4), values[1024]);
    assert_eq!((4103, 1), values[1025]);

    assert_eq!(1026, values.len());
}

fn linear_size_8<C: Counts<u64>>() {
    // two buckets: 32 sub-buckets with scale 1, 16 with scale 2
    let mut h = histo::<C>(1, 63, 1);
    assert_eq!(48, h.distinct_values());

    h.record(3).unwrap();
    h.record(4).unwrap();
    h.record(7).unwrap();
    h.record(24).unwrap();
    h.record(25).unwrap();
    h.record(61).unwrap();
    // same sub bucket as the next one
    h.record(62).unwrap();
    h.record(63).unwrap();

    let values: Vec<(u64, u64, u64)> = h
        .iter_linear(8)
        .map(|v| {
            (
                v.value_iterated_to(),
                v.count_since_last_iteration(),
                v.count_at_value(),
            )
        })
        .collect();

    let expected = vec![
        (7, 3, 1),
        (15, 0, 0),
        (23, 0, 0),
        (31, 2, 0),
        (39, 0, 0),
        (47, 0, 0),
        (55, 0, 0),
        (63, 3, 2),
    ];
    assert_eq!(expected, values);
}

fn prepare_for_log_iteration<C: Counts<u64>>() -> Histogram<u64, C> {
    // two buckets
    let mut h = histo::<C>(1, 4095, 3);
    h.record(1).unwrap();
    h.record(2).unwrap();
    // inside [2^4, 2^5)
    h.record(20).unwrap();
    h.record(25).unwrap();
    h.record(31).unwrap();
    // in 2nd half
    h.record(1500).unwrap();
    h.record(1600).unwrap();
    h.record(1700).unwrap();
    // in last sub bucket of 2nd bucket
    h.record(4096 - 1).unwrap();
    h
}

fn log_values(h: &Histogram<u64, impl Counts<u64>>, start: u64, base: f64) -> Vec<(u64, u64, u64)> {
    h.iter_log(start, base)
        .map(|v| {
            (
                v.value_iterated_to(),
                v.count_since_last_iteration(),
                v.count_at_value(),
            )
        })
        .collect()
}

fn log_min_1_base_2<C: Counts<u64>>() {
    let h = prepare_for_log_iteration::<C>();
    let expected = vec![
        (0, 0, 0),
        (1, 1, 1),
        (3, 1, 0),
        (7, 0, 0),
        (15, 0, 0),
        (31, 3, 1),
        (63, 0, 0),
        (127, 0, 0),
        (255, 0, 0),
        (511, 0, 0),
        (1023, 0, 0),
        (2047, 3, 0),
        (4095, 1, 1),
    ];
    assert_eq!(expected, log_values(&h, 1, 2.0));
}

fn log_min_4_base_2<C: Counts<u64>>() {
    let h = prepare_for_log_iteration::<C>();
    let expected = vec![
        (3, 2, 0),
        (7, 0, 0),
        (15, 0, 0),
        (31, 3, 1),
        (63, 0, 0),
        (127, 0, 0),
        (255, 0, 0),
        (511, 0, 0),
        (1023, 0, 0),
        (2047, 3, 0),
        (4095, 1, 1),
    ];
    assert_eq!(expected, log_values(&h, 4, 2.0));
}

fn log_min_1_base_10<C: Counts<u64>>() {
    let h = prepare_for_log_iteration::<C>();
    let expected = vec![(0, 0, 0), (9, 2, 0), (99, 3, 0), (999, 0, 0), (9999, 4, 1)];
    assert_eq!(expected, log_values(&h, 1, 10.0));
}

fn log_unit_magnitude_2<C: Counts<u64>>() {
    let mut h = histo::<C>(4, 16383, 3);
    h.record(3).unwrap();
    h.record(4).unwrap();
    // inside [2^(4 + 2), 2^(5 + 2))
    h.record(70).unwrap();
    h.record(80).unwrap();
    h.record(90).unwrap();
    // in 2nd half
    h.record(5000).unwrap();
    h.record(5100).unwrap();
    h.record(5200).unwrap();
    // in last sub bucket of 2nd bucket
    h.record(16384 - 1).unwrap();

    // the first three steps stay in the '0' sub bucket
    let expected = vec![
        (0, 1, 1),
        (1, 0, 1),
        (3, 0, 1),
        (7, 1, 1),
        (15, 0, 0),
        (31, 0, 0),
        (63, 0, 0),
        (127, 3, 0),
        (255, 0, 0),
        (511, 0, 0),
        (1023, 0, 0),
        (2047, 0, 0),
        (4095, 0, 0),
        (8191, 3, 0),
        (16383, 1, 1),
    ];
    assert_eq!(expected, log_values(&h, 1, 2.0));
}

fn quantiles_smorgasbord<C: Counts<u64>>() {
    let mut h = histo::<C>(1, 4095, 3);
    // one of each value up to 2 buckets
    for i in 0..4096 {
        h.record(i).unwrap();
    }

    let values: Vec<(u64, u64, u64, f64, f64)> = h
        .iter_quantiles(2)
        .map(|v| {
            (
                v.value_iterated_to(),
                v.count_since_last_iteration(),
                v.count_at_value(),
                v.quantile(),
                v.quantile_iterated_to(),
            )
        })
        .collect();

    // takes two steps per halving, then halves the step size
    let expected = vec![
        (0, 1, 1, 0.000244140625, 0.0),
        (1023, 1023, 1, 0.25, 0.25),
        (2047, 1024, 1, 0.5, 0.5),
        (2559, 512, 2, 0.625, 0.625),
        (3071, 512, 2, 0.75, 0.75),
        (3327, 256, 2, 0.8125, 0.8125),
        (3583, 256, 2, 0.875, 0.875),
        (3711, 128, 2, 0.90625, 0.90625),
        (3839, 128, 2, 0.9375, 0.9375),
        (3903, 64, 2, 0.953125, 0.953125),
        (3967, 64, 2, 0.96875, 0.96875),
        (3999, 32, 2, 0.9765625, 0.9765625),
        (4031, 32, 2, 0.984375, 0.984375),
        (4047, 16, 2, 0.98828125, 0.98828125),
        (4063, 16, 2, 0.9921875, 0.9921875),
        (4071, 8, 2, 0.994140625, 0.994140625),
        (4079, 8, 2, 0.99609375, 0.99609375),
        (4083, 4, 2, 0.9970703125, 0.9970703125),
        (4087, 4, 2, 0.998046875, 0.998046875),
        (4089, 2, 2, 0.99853515625, 0.99853515625),
        (4091, 2, 2, 0.9990234375, 0.9990234375),
        (4093, 2, 2, 0.99951171875, 0.999267578125),
        (4093, 0, 2, 0.99951171875, 0.99951171875),
        (4095, 2, 2, 1.0, 0.9996337890625),
        (4095, 0, 2, 1.0, 1.0),
    ];
    assert_eq!(expected, values);
}

fn quantiles_end_exactly_once<C: Counts<u64>>() {
    let mut h = histo::<C>(1, u64::max_value(), 3);
    h.record_n(7, 3).unwrap();
    h.record(1 << 40).unwrap();

    let values: Vec<(f64, f64)> = h
        .iter_quantiles(1)
        .map(|v| (v.quantile_iterated_to(), v.percentile()))
        .collect();

    let ends = values.iter().filter(|v| v.0 == 1.0).count();
    assert_eq!(1, ends);
    assert_eq!(Some(&(1.0, 100.0)), values.last());
    assert!(values.windows(2).all(|w| w[0].0 <= w[1].0));
}

fn quantiles_single_value<C: Counts<u64>>() {
    let mut h = histo::<C>(1, 1_000, 3);
    h.record(5).unwrap();

    let values: Vec<(u64, f64)> = h
        .iter_quantiles(1)
        .map(|v| (v.value_iterated_to(), v.quantile_iterated_to()))
        .collect();
    assert_eq!(vec![(5, 0.0), (5, 1.0)], values);
}

macro_rules! storage_tests {
    ($($name:ident),* $(,)?) => {
        mod dense {
            use packed_hdrhistogram::DenseCounts;
            $(
                #[test]
                fn $name() {
                    super::$name::<DenseCounts<u64>>()
                }
            )*
        }

        mod packed {
            use packed_hdrhistogram::PackedCounts;
            $(
                #[test]
                fn $name() {
                    super::$name::<PackedCounts<u64>>()
                }
            )*
        }
    };
}

storage_tests!(
    recorded_non_saturated_total_count,
    recorded_saturated_total_count,
    recorded_only_zero,
    recorded_empty,
    recorded_values_all_buckets,
    all_values_all_buckets,
    all_values_unit_magnitude_2,
    linear_count_since_last_iteration_saturates,
    linear_visits_wide_buckets_multiple_times,
    linear_visits_buckets_once_at_matching_step,
    linear_size_8,
    log_min_1_base_2,
    log_min_4_base_2,
    log_min_1_base_10,
    log_unit_magnitude_2,
    quantiles_smorgasbord,
    quantiles_end_exactly_once,
    quantiles_single_value,
);
