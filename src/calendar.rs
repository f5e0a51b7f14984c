//! Local calendar dates only; nothing here goes through UTC.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};

use crate::error::{Result, SeriesError};

/// `YYYY-MM-DD` with an optional `THH:MM:SS` suffix.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let invalid = || SeriesError::InvalidDate(raw.to_string());
    let trimmed = raw.trim();
    let (date_part, time_part) = match trimmed.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (trimmed, None),
    };

    let well_formed = date_part.len() == 10
        && date_part.char_indices().all(|(index, ch)| match index {
            4 | 7 => ch == '-',
            _ => ch.is_ascii_digit(),
        });
    if !well_formed {
        return Err(invalid());
    }
    if let Some(time) = time_part {
        NaiveTime::parse_from_str(time, "%H:%M:%S").map_err(|_| invalid())?;
    }

    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| invalid())
}

/// Days past the end of the month spill over: `(2023, 2, 29)` is March 1st.
pub fn rolling_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    first.checked_add_signed(Duration::days(i64::from(day) - 1))
}

/// Day-of-week index with Sunday = 0 through Saturday = 6.
pub fn weekday_index(date: NaiveDate) -> i64 {
    i64::from(date.weekday().num_days_from_sunday())
}

pub fn days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

pub fn months(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    let last = month_start(end);
    std::iter::successors(Some(month_start(start)), |current| next_month(*current))
        .take_while(move |month| *month <= last)
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn month_end(date: NaiveDate) -> NaiveDate {
    next_month(month_start(date))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

pub fn year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

fn next_month(first: NaiveDate) -> Option<NaiveDate> {
    if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
}

pub fn trailing_days(end: NaiveDate, length: u32) -> (NaiveDate, NaiveDate) {
    let back = i64::from(length.max(1)) - 1;
    (end - Duration::days(back), end)
}

/// From the first of the oldest month to the last day of `end`'s month.
pub fn trailing_months(end: NaiveDate, length: u32) -> (NaiveDate, NaiveDate) {
    let back = length.max(1) - 1;
    let start = month_start(end)
        .checked_sub_months(chrono::Months::new(back))
        .unwrap_or_else(|| month_start(end));
    (start, month_end(end))
}

pub fn missing_days(
    recorded: &[NaiveDate],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<NaiveDate>> {
    if start > end {
        return Err(SeriesError::InvalidRange { start, end });
    }
    let recorded: std::collections::BTreeSet<NaiveDate> = recorded.iter().copied().collect();
    Ok(days(start, end)
        .filter(|day| !recorded.contains(day))
        .collect())
}

pub fn day_of_month_key(date: NaiveDate) -> String {
    date.format("%d").to_string()
}

pub fn month_day_key(date: NaiveDate) -> String {
    date.format("%m-%d").to_string()
}

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}
