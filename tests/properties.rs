//! Randomized checks of the series and alignment guarantees.
//!
//! Every generator is seeded so a failure reproduces exactly.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pharmacy_trends::{
    aggregate, align_to_prior_year, AggregationPolicy, Bucket, DailyMetric, SeriesPoint,
};

const CASES: usize = 300;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn random_date(rng: &mut StdRng) -> NaiveDate {
    ymd(2018, 1, 1) + Duration::days(rng.gen_range(0..3_650))
}

fn random_window(rng: &mut StdRng) -> (NaiveDate, NaiveDate) {
    let start = random_date(rng);
    (start, start + Duration::days(rng.gen_range(0..400)))
}

/// Sparse records around the window, including nulls, duplicates and
/// out-of-range days.
fn random_records(
    rng: &mut StdRng,
    start: NaiveDate,
    end: NaiveDate,
    allow_negative: bool,
) -> Vec<DailyMetric> {
    let span = (end - start).num_days();
    let count = rng.gen_range(0..=(span as usize + 10));
    (0..count)
        .map(|_| {
            let date = start + Duration::days(rng.gen_range(-5..=span + 5));
            let value = if rng.gen_bool(0.15) {
                None
            } else if allow_negative {
                Some(rng.gen_range(-5_000.0..20_000.0))
            } else {
                Some(rng.gen_range(0.0..20_000.0))
            };
            DailyMetric::new(date, value)
        })
        .collect()
}

fn months_between(start: NaiveDate, end: NaiveDate) -> usize {
    let months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    months as usize + 1
}

#[test]
fn day_series_has_one_point_per_day_in_order() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..CASES {
        let (start, end) = random_window(&mut rng);
        let records = random_records(&mut rng, start, end, true);
        let expected_len = (end - start).num_days() as usize + 1;

        for policy in [
            AggregationPolicy::CarryForward,
            AggregationPolicy::ZeroFill,
            AggregationPolicy::Average,
        ] {
            let series = aggregate(&records, start, end, policy, Bucket::Day).unwrap();
            assert_eq!(series.len(), expected_len, "{policy:?} {start}..{end}");
        }

        let keyed = aggregate(&records, start, end, AggregationPolicy::CarryForward, Bucket::Day)
            .unwrap();
        let expected_keys: Vec<String> = (0..expected_len as i64)
            .map(|offset| (start + Duration::days(offset)).format("%m-%d").to_string())
            .collect();
        let keys: Vec<String> = keyed.into_iter().map(|point| point.key).collect();
        assert_eq!(keys, expected_keys);
    }
}

#[test]
fn month_series_has_one_point_per_month() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..CASES {
        let (start, end) = random_window(&mut rng);
        let records = random_records(&mut rng, start, end, false);
        let series = aggregate(&records, start, end, AggregationPolicy::Average, Bucket::Month)
            .unwrap();
        assert_eq!(series.len(), months_between(start, end));

        let keys: Vec<&str> = series.iter().map(|point| point.key.as_str()).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(keys, sorted, "month keys must be strictly ascending");
    }
}

#[test]
fn carry_forward_never_decreases_for_non_negative_input() {
    let mut rng = StdRng::seed_from_u64(13);
    for _ in 0..CASES {
        let (start, end) = random_window(&mut rng);
        let records = random_records(&mut rng, start, end, false);
        for bucket in [Bucket::Day, Bucket::Month] {
            let series =
                aggregate(&records, start, end, AggregationPolicy::CarryForward, bucket).unwrap();
            let values: Vec<f64> = series.iter().map(|point| point.value.unwrap()).collect();
            assert!(
                values.windows(2).all(|pair| pair[0] <= pair[1]),
                "{bucket:?} series decreased: {values:?}"
            );
        }
    }
}

#[test]
fn aggregation_is_repeatable() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..CASES {
        let (start, end) = random_window(&mut rng);
        let records = random_records(&mut rng, start, end, true);
        let first: Vec<SeriesPoint> =
            aggregate(&records, start, end, AggregationPolicy::ZeroFill, Bucket::Day).unwrap();
        let second: Vec<SeriesPoint> =
            aggregate(&records, start, end, AggregationPolicy::ZeroFill, Bucket::Day).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn zero_fill_and_carry_forward_never_emit_null() {
    let mut rng = StdRng::seed_from_u64(19);
    for _ in 0..CASES {
        let (start, end) = random_window(&mut rng);
        let records = random_records(&mut rng, start, end, true);
        for policy in [AggregationPolicy::ZeroFill, AggregationPolicy::CarryForward] {
            for bucket in [Bucket::Day, Bucket::Month] {
                let series = aggregate(&records, start, end, policy, bucket).unwrap();
                assert!(series.iter().all(|point| point.value.is_some()));
            }
        }
    }
}

#[test]
fn empty_months_average_to_null_not_zero() {
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..CASES {
        let (start, end) = random_window(&mut rng);
        let records = random_records(&mut rng, start, end, false);
        let series = aggregate(&records, start, end, AggregationPolicy::Average, Bucket::Month)
            .unwrap();

        // Last record per date wins, so a trailing null hides an earlier sample.
        let latest: BTreeMap<NaiveDate, Option<f64>> = records
            .iter()
            .filter(|record| record.date >= start && record.date <= end)
            .map(|record| (record.date, record.value))
            .collect();

        for point in &series {
            let has_sample = latest.iter().any(|(date, value)| {
                value.is_some() && date.format("%Y-%m").to_string() == point.key
            });
            assert_eq!(point.value.is_some(), has_sample, "month {}", point.key);
        }
    }
}

#[test]
fn inverted_windows_always_fail() {
    let mut rng = StdRng::seed_from_u64(29);
    for _ in 0..CASES {
        let end = random_date(&mut rng);
        let start = end + Duration::days(rng.gen_range(1..100));
        assert!(aggregate(&[], start, end, AggregationPolicy::ZeroFill, Bucket::Day).is_err());
        assert!(aggregate(&[], start, end, AggregationPolicy::Average, Bucket::Month).is_err());
    }
}

#[test]
fn alignment_preserves_weekday_for_every_day_of_a_century() {
    let mut day = ymd(1950, 1, 1);
    let last = ymd(2050, 12, 31);
    while day <= last {
        let aligned = align_to_prior_year(day);
        assert_eq!(aligned.weekday(), day.weekday(), "aligning {day}");
        let drift = (aligned - (day - Duration::days(365))).num_days().abs();
        assert!(drift <= 8, "{day} aligned too far away to {aligned}");
        day += Duration::days(1);
    }
}

#[test]
fn leap_day_keeps_rollover_behaviour() {
    for year in [2000, 2004, 2016, 2020, 2024] {
        let aligned = align_to_prior_year(ymd(year, 2, 29));
        assert_eq!(aligned.weekday(), ymd(year, 2, 29).weekday());
        assert!(
            aligned >= ymd(year - 1, 2, 23) && aligned <= ymd(year - 1, 3, 7),
            "{year}: {aligned}"
        );
    }
}
