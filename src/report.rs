use std::fmt::Write;

use chrono::NaiveDate;

use crate::aggregate::{KeyStyle, RangeAggregator};
use crate::board::{MetricBoard, MetricState};
use crate::calendar;
use crate::error::Result;
use crate::models::{AggregationPolicy, Bucket, DailyMetric, Metric, OverlayRow, SeriesPoint};
use crate::yoy;

pub const TRAILING_DAYS: u32 = 14;
pub const TRAILING_MONTHS: u32 = 12;

/// Metric windows the dashboard needs for `as_of`. Turnover reaches back far
/// enough to cover last year's month, year and aligned comparison day.
pub fn dashboard_requests(as_of: NaiveDate) -> Vec<(Metric, NaiveDate, NaiveDate)> {
    let ytd = yoy::year_to_date(as_of);
    let aligned = yoy::align_to_prior_year(as_of);
    let turnover_start = ytd.prior.0.min(aligned);
    let (trailing_start, _) = calendar::trailing_days(as_of, TRAILING_DAYS);
    let (yearly_start, _) = calendar::trailing_months(as_of, TRAILING_MONTHS);
    let month_start = calendar::month_start(as_of);

    vec![
        (
            Metric::Turnover,
            turnover_start.min(trailing_start).min(yearly_start),
            as_of,
        ),
        (Metric::AvgBasketValue, trailing_start, as_of),
        (Metric::GpPercent, ytd.current.0, as_of),
        (Metric::Purchases, month_start, as_of),
        (Metric::CostOfSales, month_start, as_of),
    ]
}

/// Pair a current cumulative series with last year's by key. A key missing
/// from last year repeats the last known value; the first match wins when
/// last year's window rolled over into a repeated key.
pub fn cumulative_overlay(current: &[SeriesPoint], previous: &[SeriesPoint]) -> Vec<OverlayRow> {
    let mut last_previous = 0.0;
    current
        .iter()
        .map(|point| {
            if let Some(value) = previous
                .iter()
                .find(|candidate| candidate.key == point.key)
                .and_then(|candidate| candidate.value)
            {
                last_previous = value;
            }
            OverlayRow {
                key: point.key.clone(),
                current_year: point.value.unwrap_or(0.0),
                previous_year: last_previous,
            }
        })
        .collect()
}

/// Group thousands with spaces the way the dashboards print rand amounts.
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return "n/a".to_string();
    }
    let rounded = (value + 0.5).floor();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::new();
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("R -{grouped}")
    } else {
        format!("R {grouped}")
    }
}

fn write_unavailable(output: &mut String, state: Option<&MetricState<Vec<DailyMetric>>>) {
    let _ = match state {
        Some(MetricState::Failed(message)) => writeln!(output, "Unavailable: {message}"),
        Some(MetricState::Loading) => writeln!(output, "Still loading."),
        _ => writeln!(output, "Not requested."),
    };
}

pub fn build_report(
    pharmacy_code: &str,
    as_of: NaiveDate,
    board: &MetricBoard<Vec<DailyMetric>>,
) -> Result<String> {
    let mut output = String::new();
    let _ = writeln!(output, "# Pharmacy Dashboard: {pharmacy_code}");
    let _ = writeln!(output, "Figures up to and including {as_of}");

    let turnover = board.ready(Metric::Turnover.api_field());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Month to Date Turnover");
    match turnover {
        Some(records) => write_month_to_date(&mut output, records, as_of)?,
        None => write_unavailable(&mut output, board.get(Metric::Turnover.api_field())),
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Year over Year");
    match turnover {
        Some(records) => {
            let pair = yoy::compare(as_of, |date| {
                records
                    .iter()
                    .rev()
                    .find(|record| record.date == date)
                    .and_then(|record| record.value)
            });
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                pair.current_date,
                pair.current_date.format("%A"),
                format_amount(pair.current_value)
            );
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                pair.prior_date,
                pair.prior_date.format("%A"),
                format_amount(pair.prior_value)
            );
            match pair.change_percent() {
                Some(change) => {
                    let _ = writeln!(output, "- Change: {change:.1}%");
                }
                None => {
                    let _ = writeln!(output, "- Change: no sales recorded last year");
                }
            }
        }
        None => write_unavailable(&mut output, board.get(Metric::Turnover.api_field())),
    }

    let (trailing_start, _) = calendar::trailing_days(as_of, TRAILING_DAYS);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Last {TRAILING_DAYS} Days");
    match turnover {
        Some(records) => {
            let bars = RangeAggregator::new(AggregationPolicy::ZeroFill, Bucket::Day)
                .keys(KeyStyle::MonthDay)
                .rounding(Metric::Turnover.rounding())
                .aggregate(records, trailing_start, as_of)?;
            let baskets = match board.ready(Metric::AvgBasketValue.api_field()) {
                Some(basket_records) => Some(
                    RangeAggregator::new(AggregationPolicy::Average, Bucket::Day)
                        .rounding(Metric::AvgBasketValue.rounding())
                        .aggregate(basket_records, trailing_start, as_of)?,
                ),
                None => None,
            };

            let _ = writeln!(output, "| Day | Turnover | Avg basket |");
            let _ = writeln!(output, "| --- | ---: | ---: |");
            for (index, bar) in bars.iter().enumerate() {
                let basket = baskets
                    .as_ref()
                    .and_then(|points| points.get(index))
                    .and_then(|point| point.value)
                    .map(|value| format!("{value:.2}"))
                    .unwrap_or_else(|| "-".to_string());
                let _ = writeln!(
                    output,
                    "| {} | {} | {} |",
                    bar.key,
                    format_amount(bar.value.unwrap_or(0.0)),
                    basket
                );
            }
        }
        None => write_unavailable(&mut output, board.get(Metric::Turnover.api_field())),
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## GP % by Month");
    match board.ready(Metric::GpPercent.api_field()) {
        Some(records) => {
            let months = RangeAggregator::new(AggregationPolicy::Average, Bucket::Month)
                .rounding(Metric::GpPercent.rounding())
                .aggregate(records, calendar::year_start(as_of), as_of)?;
            for month in &months {
                match month.value {
                    Some(value) => {
                        let _ = writeln!(output, "- {}: {value:.2}%", month.key);
                    }
                    None => {
                        let _ = writeln!(output, "- {}: no data", month.key);
                    }
                }
            }
        }
        None => write_unavailable(&mut output, board.get(Metric::GpPercent.api_field())),
    }

    let (yearly_start, yearly_end) = calendar::trailing_months(as_of, TRAILING_MONTHS);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Turnover, Last {TRAILING_MONTHS} Months");
    match turnover {
        Some(records) => {
            let months = RangeAggregator::new(AggregationPolicy::ZeroFill, Bucket::Month)
                .rounding(Metric::Turnover.rounding())
                .aggregate(records, yearly_start, yearly_end)?;
            for month in &months {
                let _ = writeln!(
                    output,
                    "- {}: {}",
                    month.key,
                    format_amount(month.value.unwrap_or(0.0))
                );
            }
        }
        None => write_unavailable(&mut output, board.get(Metric::Turnover.api_field())),
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Purchases vs Cost of Sales (MTD)");
    for metric in [Metric::Purchases, Metric::CostOfSales] {
        match board.ready(metric.api_field()) {
            Some(records) => {
                let series =
                    aggregate_cumulative(metric, records, calendar::month_start(as_of), as_of)?;
                let total = series.last().and_then(|point| point.value).unwrap_or(0.0);
                let _ = writeln!(output, "- {}: {}", metric.label(), format_amount(total));
            }
            None => {
                let _ = write!(output, "- {}: ", metric.label());
                write_unavailable(&mut output, board.get(metric.api_field()));
            }
        }
    }

    Ok(output)
}

fn aggregate_cumulative(
    metric: Metric,
    records: &[DailyMetric],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<SeriesPoint>> {
    RangeAggregator::new(AggregationPolicy::CarryForward, Bucket::Day)
        .keys(KeyStyle::DayOfMonth)
        .rounding(metric.rounding())
        .aggregate(records, start, end)
}

fn write_month_to_date(output: &mut String, records: &[DailyMetric], as_of: NaiveDate) -> Result<()> {
    let windows = yoy::month_to_date(as_of);
    let current =
        aggregate_cumulative(Metric::Turnover, records, windows.current.0, windows.current.1)?;
    let previous =
        aggregate_cumulative(Metric::Turnover, records, windows.prior.0, windows.prior.1)?;
    let rows = cumulative_overlay(&current, &previous);

    let Some(last) = rows.last() else {
        let _ = writeln!(output, "No days in this window.");
        return Ok(());
    };

    let _ = writeln!(output, "- This year: {}", format_amount(last.current_year));
    let _ = writeln!(output, "- Last year: {}", format_amount(last.previous_year));
    let diff = last.current_year - last.previous_year;
    if last.previous_year > 0.0 {
        let _ = writeln!(
            output,
            "- {} {} ({:.1}%)",
            if diff >= 0.0 { "Up" } else { "Down" },
            format_amount(diff.abs()),
            diff / last.previous_year * 100.0
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "| Day | This year | Last year |");
    let _ = writeln!(output, "| --- | ---: | ---: |");
    for row in &rows {
        let _ = writeln!(
            output,
            "| {} | {} | {} |",
            row.key,
            format_amount(row.current_year),
            format_amount(row.previous_year)
        );
    }
    Ok(())
}
