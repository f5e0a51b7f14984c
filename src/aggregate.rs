//! Dense chart series from sparse daily metrics.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::calendar;
use crate::error::{Result, SeriesError};
use crate::models::{AggregationPolicy, Bucket, DailyMetric, SeriesPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStyle {
    DayOfMonth,
    MonthDay,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Whole,
    Cents,
    Exact,
}

impl Rounding {
    // Half up: -2.5 becomes -2.
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Rounding::Whole => (value + 0.5).floor(),
            Rounding::Cents => (value * 100.0 + 0.5).floor() / 100.0,
            Rounding::Exact => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeAggregator {
    policy: AggregationPolicy,
    bucket: Bucket,
    keys: Option<KeyStyle>,
    rounding: Option<Rounding>,
}

impl RangeAggregator {
    pub fn new(policy: AggregationPolicy, bucket: Bucket) -> Self {
        Self {
            policy,
            bucket,
            keys: None,
            rounding: None,
        }
    }

    pub fn keys(mut self, keys: KeyStyle) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn rounding(mut self, rounding: Rounding) -> Self {
        self.rounding = Some(rounding);
        self
    }

    pub fn key_style(&self) -> KeyStyle {
        self.keys.unwrap_or(match (self.bucket, self.policy) {
            (Bucket::Month, _) => KeyStyle::Month,
            (Bucket::Day, AggregationPolicy::ZeroFill) => KeyStyle::DayOfMonth,
            (Bucket::Day, _) => KeyStyle::MonthDay,
        })
    }

    pub fn rounding_mode(&self) -> Rounding {
        self.rounding.unwrap_or(match self.policy {
            AggregationPolicy::Average => Rounding::Cents,
            AggregationPolicy::CarryForward | AggregationPolicy::ZeroFill => Rounding::Whole,
        })
    }

    /// Records outside `[start, end]` are ignored; a repeated date keeps the last one.
    pub fn aggregate(
        &self,
        records: &[DailyMetric],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SeriesPoint>> {
        if start > end {
            return Err(SeriesError::InvalidRange { start, end });
        }

        let lookup: BTreeMap<NaiveDate, Option<f64>> = records
            .iter()
            .filter(|record| record.date >= start && record.date <= end)
            .map(|record| (record.date, record.value))
            .collect();

        tracing::debug!(
            policy = ?self.policy,
            bucket = ?self.bucket,
            %start,
            %end,
            records = records.len(),
            in_range = lookup.len(),
            "aggregating series"
        );

        let points = match self.bucket {
            Bucket::Day => self.walk_days(&lookup, start, end),
            Bucket::Month => self.walk_months(&lookup, start, end),
        };
        Ok(points)
    }

    fn walk_days(
        &self,
        lookup: &BTreeMap<NaiveDate, Option<f64>>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<SeriesPoint> {
        let mut running_total = 0.0;
        calendar::days(start, end)
            .map(|day| {
                let raw = lookup.get(&day).copied().flatten();
                let value = match self.policy {
                    AggregationPolicy::CarryForward => {
                        running_total += raw.unwrap_or(0.0);
                        Some(running_total)
                    }
                    AggregationPolicy::ZeroFill => Some(raw.unwrap_or(0.0)),
                    AggregationPolicy::Average => raw,
                };
                self.point(day, value)
            })
            .collect()
    }

    fn walk_months(
        &self,
        lookup: &BTreeMap<NaiveDate, Option<f64>>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<SeriesPoint> {
        let mut samples: BTreeMap<NaiveDate, (f64, u32)> = BTreeMap::new();
        for (date, value) in lookup {
            let entry = samples.entry(calendar::month_start(*date)).or_insert((0.0, 0));
            if let Some(value) = value {
                entry.0 += value;
                entry.1 += 1;
            }
        }

        let mut running_total = 0.0;
        calendar::months(start, end)
            .map(|month| {
                let (sum, count) = samples.get(&month).copied().unwrap_or((0.0, 0));
                let value = match self.policy {
                    AggregationPolicy::CarryForward => {
                        running_total += sum;
                        Some(running_total)
                    }
                    AggregationPolicy::ZeroFill => Some(sum),
                    AggregationPolicy::Average => {
                        (count > 0).then(|| sum / f64::from(count))
                    }
                };
                self.point(month, value)
            })
            .collect()
    }

    fn point(&self, date: NaiveDate, value: Option<f64>) -> SeriesPoint {
        let key = match self.key_style() {
            KeyStyle::DayOfMonth => calendar::day_of_month_key(date),
            KeyStyle::MonthDay => calendar::month_day_key(date),
            KeyStyle::Month => calendar::month_key(date),
        };
        let rounding = self.rounding_mode();
        SeriesPoint {
            key,
            value: value.map(|v| rounding.apply(v)),
        }
    }
}

pub fn aggregate(
    records: &[DailyMetric],
    start: NaiveDate,
    end: NaiveDate,
    policy: AggregationPolicy,
    bucket: Bucket,
) -> Result<Vec<SeriesPoint>> {
    RangeAggregator::new(policy, bucket).aggregate(records, start, end)
}

/// Rows look like `{"date": "YYYY-MM-DD", "<field>": number}`. A bad date fails the batch.
pub fn parse_api_rows(rows: &[Value], field: &str) -> Result<Vec<DailyMetric>> {
    rows.iter()
        .map(|row| {
            let raw_date = match row.get("date") {
                Some(Value::String(date)) => date.as_str(),
                Some(other) => return Err(SeriesError::InvalidDate(other.to_string())),
                None => return Err(SeriesError::InvalidDate(String::new())),
            };
            let date = calendar::parse_date(raw_date)?;
            let value = row.get(field).and_then(Value::as_f64);
            Ok(DailyMetric::new(date, value))
        })
        .collect()
}

pub fn aggregate_api_rows(
    rows: &[Value],
    field: &str,
    start: &str,
    end: &str,
    policy: AggregationPolicy,
    bucket: Bucket,
) -> Result<Vec<SeriesPoint>> {
    let start = calendar::parse_date(start)?;
    let end = calendar::parse_date(end)?;
    let records = parse_api_rows(rows, field)?;
    aggregate(&records, start, end, policy, bucket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metric;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn point(key: &str, value: impl Into<Option<f64>>) -> SeriesPoint {
        SeriesPoint {
            key: key.to_string(),
            value: value.into(),
        }
    }

    #[test]
    fn carry_forward_repeats_running_total_across_gaps() {
        let records = vec![
            DailyMetric::new(ymd(2024, 6, 1), 100.0),
            DailyMetric::new(ymd(2024, 6, 3), 50.0),
        ];
        let series = aggregate(
            &records,
            ymd(2024, 6, 1),
            ymd(2024, 6, 3),
            AggregationPolicy::CarryForward,
            Bucket::Day,
        )
        .unwrap();

        assert_eq!(
            series,
            vec![point("06-01", 100.0), point("06-02", 100.0), point("06-03", 150.0)]
        );
    }

    #[test]
    fn zero_fill_emits_zero_for_every_empty_day() {
        let series = aggregate(
            &[],
            ymd(2024, 1, 1),
            ymd(2024, 1, 3),
            AggregationPolicy::ZeroFill,
            Bucket::Day,
        )
        .unwrap();

        assert_eq!(series, vec![point("01", 0.0), point("02", 0.0), point("03", 0.0)]);
    }

    #[test]
    fn rejects_inverted_range() {
        let err = aggregate(
            &[],
            ymd(2024, 6, 3),
            ymd(2024, 6, 1),
            AggregationPolicy::ZeroFill,
            Bucket::Day,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SeriesError::InvalidRange {
                start: ymd(2024, 6, 3),
                end: ymd(2024, 6, 1)
            }
        );
    }

    #[test]
    fn single_day_range_yields_one_point() {
        let series = aggregate(
            &[DailyMetric::new(ymd(2024, 6, 1), 12.4)],
            ymd(2024, 6, 1),
            ymd(2024, 6, 1),
            AggregationPolicy::ZeroFill,
            Bucket::Day,
        )
        .unwrap();
        assert_eq!(series, vec![point("01", 12.0)]);
    }

    #[test]
    fn last_duplicate_wins_and_outside_dates_are_ignored() {
        let records = vec![
            DailyMetric::new(ymd(2024, 5, 31), 1_000.0),
            DailyMetric::new(ymd(2024, 6, 1), 10.0),
            DailyMetric::new(ymd(2024, 6, 1), 20.0),
            DailyMetric::new(ymd(2024, 6, 3), 1_000.0),
        ];
        let series = aggregate(
            &records,
            ymd(2024, 6, 1),
            ymd(2024, 6, 2),
            AggregationPolicy::CarryForward,
            Bucket::Day,
        )
        .unwrap();
        assert_eq!(series, vec![point("06-01", 20.0), point("06-02", 20.0)]);
    }

    #[test]
    fn null_values_contribute_nothing() {
        let records = vec![
            DailyMetric::new(ymd(2024, 6, 1), 10.0),
            DailyMetric::new(ymd(2024, 6, 2), None),
        ];
        let carried = aggregate(
            &records,
            ymd(2024, 6, 1),
            ymd(2024, 6, 2),
            AggregationPolicy::CarryForward,
            Bucket::Day,
        )
        .unwrap();
        assert_eq!(carried[1], point("06-02", 10.0));

        let filled = aggregate(
            &records,
            ymd(2024, 6, 1),
            ymd(2024, 6, 2),
            AggregationPolicy::ZeroFill,
            Bucket::Day,
        )
        .unwrap();
        assert_eq!(filled[1], point("02", 0.0));

        let averaged = aggregate(
            &records,
            ymd(2024, 6, 1),
            ymd(2024, 6, 2),
            AggregationPolicy::Average,
            Bucket::Day,
        )
        .unwrap();
        assert_eq!(averaged[1], point("06-02", None));
    }

    #[test]
    fn monthly_average_is_null_for_months_without_samples() {
        let records = vec![
            DailyMetric::new(ymd(2024, 1, 10), 30.0),
            DailyMetric::new(ymd(2024, 1, 11), 31.0),
            DailyMetric::new(ymd(2024, 1, 12), None),
            DailyMetric::new(ymd(2024, 3, 1), 28.123),
        ];
        let series = aggregate(
            &records,
            ymd(2024, 1, 1),
            ymd(2024, 3, 31),
            AggregationPolicy::Average,
            Bucket::Month,
        )
        .unwrap();
        assert_eq!(
            series,
            vec![
                point("2024-01", 30.5),
                point("2024-02", None),
                point("2024-03", 28.12),
            ]
        );
    }

    #[test]
    fn ratio_metrics_keep_cents_under_zero_fill() {
        let records = vec![DailyMetric::new(ymd(2024, 6, 1), 28.57)];
        let series = RangeAggregator::new(AggregationPolicy::ZeroFill, Bucket::Day)
            .rounding(Metric::GpPercent.rounding())
            .aggregate(&records, ymd(2024, 6, 1), ymd(2024, 6, 2))
            .unwrap();
        assert_eq!(series, vec![point("01", 28.57), point("02", 0.0)]);

        let whole = RangeAggregator::new(AggregationPolicy::ZeroFill, Bucket::Day)
            .rounding(Metric::Turnover.rounding())
            .aggregate(&records, ymd(2024, 6, 1), ymd(2024, 6, 1))
            .unwrap();
        assert_eq!(whole, vec![point("01", 29.0)]);
    }

    #[test]
    fn monthly_zero_fill_and_carry_forward_sum_per_month() {
        let records = vec![
            DailyMetric::new(ymd(2024, 1, 10), 100.0),
            DailyMetric::new(ymd(2024, 1, 20), 50.0),
            DailyMetric::new(ymd(2024, 3, 5), 25.0),
        ];
        let sums = aggregate(
            &records,
            ymd(2024, 1, 15),
            ymd(2024, 3, 31),
            AggregationPolicy::ZeroFill,
            Bucket::Month,
        )
        .unwrap();
        assert_eq!(
            sums,
            vec![point("2024-01", 50.0), point("2024-02", 0.0), point("2024-03", 25.0)]
        );

        let running = aggregate(
            &records,
            ymd(2024, 1, 1),
            ymd(2024, 3, 31),
            AggregationPolicy::CarryForward,
            Bucket::Month,
        )
        .unwrap();
        assert_eq!(
            running,
            vec![point("2024-01", 150.0), point("2024-02", 150.0), point("2024-03", 175.0)]
        );
    }

    #[test]
    fn cumulative_rounding_applies_to_emitted_value_only() {
        let records = vec![
            DailyMetric::new(ymd(2024, 6, 1), 0.4),
            DailyMetric::new(ymd(2024, 6, 2), 0.4),
        ];
        let series = aggregate(
            &records,
            ymd(2024, 6, 1),
            ymd(2024, 6, 2),
            AggregationPolicy::CarryForward,
            Bucket::Day,
        )
        .unwrap();
        assert_eq!(series, vec![point("06-01", 0.0), point("06-02", 1.0)]);
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(Rounding::Whole.apply(2.5), 3.0);
        assert_eq!(Rounding::Whole.apply(-2.5), -2.0);
        assert_eq!(Rounding::Whole.apply(-2.6), -3.0);
        assert_eq!(Rounding::Cents.apply(312.456), 312.46);
        assert_eq!(Rounding::Exact.apply(0.125), 0.125);
    }

    #[test]
    fn key_and_rounding_overrides() {
        let records = vec![DailyMetric::new(ymd(2024, 6, 1), 27.456)];
        let series = RangeAggregator::new(AggregationPolicy::ZeroFill, Bucket::Day)
            .keys(KeyStyle::MonthDay)
            .rounding(Rounding::Cents)
            .aggregate(&records, ymd(2024, 6, 1), ymd(2024, 6, 1))
            .unwrap();
        assert_eq!(series, vec![point("06-01", 27.46)]);
    }

    #[test]
    fn parses_api_rows_with_missing_values() {
        let rows = vec![
            json!({"date": "2024-06-01", "turnover": 100.0}),
            json!({"date": "2024-06-02T00:00:00", "turnover": null}),
            json!({"date": "2024-06-03"}),
        ];
        let records = parse_api_rows(&rows, "turnover").unwrap();
        assert_eq!(
            records,
            vec![
                DailyMetric::new(ymd(2024, 6, 1), 100.0),
                DailyMetric::new(ymd(2024, 6, 2), None),
                DailyMetric::new(ymd(2024, 6, 3), None),
            ]
        );
    }

    #[test]
    fn malformed_row_date_fails_the_whole_call() {
        let rows = vec![
            json!({"date": "2024-06-01", "turnover": 100.0}),
            json!({"date": "2024/06/02", "turnover": 50.0}),
        ];
        let err = aggregate_api_rows(
            &rows,
            "turnover",
            "2024-06-01",
            "2024-06-03",
            AggregationPolicy::CarryForward,
            Bucket::Day,
        )
        .unwrap_err();
        assert_eq!(err, SeriesError::InvalidDate("2024/06/02".to_string()));

        let missing = parse_api_rows(&[json!({"turnover": 1.0})], "turnover").unwrap_err();
        assert_eq!(missing, SeriesError::InvalidDate(String::new()));
    }

    #[test]
    fn malformed_window_bound_is_reported() {
        let err = aggregate_api_rows(
            &[],
            "turnover",
            "2024-06-01",
            "June 3rd",
            AggregationPolicy::ZeroFill,
            Bucket::Day,
        )
        .unwrap_err();
        assert_eq!(err, SeriesError::InvalidDate("June 3rd".to_string()));
    }
}
