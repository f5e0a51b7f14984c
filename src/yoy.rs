//! Weekday-fair year-over-year alignment.

use chrono::{Datelike, Duration, NaiveDate};

use crate::calendar;
use crate::models::YoyPair;

/// `2024-02-29` rolls forward to `2023-03-01`.
pub fn prior_year_same_date(current: NaiveDate) -> NaiveDate {
    calendar::rolling_date(current.year() - 1, current.month(), current.day())
        .unwrap_or(current - Duration::days(365))
}

pub fn align_to_prior_year(current: NaiveDate) -> NaiveDate {
    let naive = prior_year_same_date(current);
    // Raw difference, so the shift can be anywhere in -6..=6.
    let delta = calendar::weekday_index(current) - calendar::weekday_index(naive);
    naive + Duration::days(delta)
}

pub fn compare<F>(current: NaiveDate, mut lookup: F) -> YoyPair
where
    F: FnMut(NaiveDate) -> Option<f64>,
{
    let prior_date = align_to_prior_year(current);
    YoyPair {
        current_date: current,
        prior_date,
        current_value: lookup(current).unwrap_or(0.0),
        prior_value: lookup(prior_date).unwrap_or(0.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindows {
    pub current: (NaiveDate, NaiveDate),
    pub prior: (NaiveDate, NaiveDate),
}

pub fn month_to_date(current: NaiveDate) -> PeriodWindows {
    let prior_end = prior_year_same_date(current);
    let prior_start = NaiveDate::from_ymd_opt(current.year() - 1, current.month(), 1)
        .unwrap_or_else(|| calendar::month_start(prior_end));
    PeriodWindows {
        current: (calendar::month_start(current), current),
        prior: (prior_start, prior_end),
    }
}

pub fn year_to_date(current: NaiveDate) -> PeriodWindows {
    let prior_end = prior_year_same_date(current);
    let prior_start =
        NaiveDate::from_ymd_opt(current.year() - 1, 1, 1).unwrap_or(prior_end);
    PeriodWindows {
        current: (calendar::year_start(current), current),
        prior: (prior_start, prior_end),
    }
}
