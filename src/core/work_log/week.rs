// Week calculator for the fixed logging window.
//
// Purpose
// - Map a calendar date to its 1-based week bucket and back.
//
// Rules
// - Weeks are contiguous 7-day blocks starting at PERIOD_START (week 1, day 1).
// - The last block is clipped to PERIOD_END, so week 31 only spans Dec 29-31.
// - Dates are plain calendar dates. No time zones are involved.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use thiserror::Error;

pub const PERIOD_START: NaiveDate = match NaiveDate::from_ymd_opt(2024, 6, 1) {
    Some(date) => date,
    None => panic!("invalid period start"),
};

pub const PERIOD_END: NaiveDate = match NaiveDate::from_ymd_opt(2024, 12, 31) {
    Some(date) => date,
    None => panic!("invalid period end"),
};

const DAYS_PER_WEEK: i64 = 7;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum OutOfRangeError {
    #[error(
        "date {0} is outside the allowed range ({start} to {end})",
        start = PERIOD_START,
        end = PERIOD_END
    )]
    Date(NaiveDate),

    #[error("week {week} is outside the allowed range (1 to {last})")]
    Week { week: u32, last: u32 },
}

/// One bucket of the logging window with inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Week {
    pub index: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Week {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

pub fn is_in_window(date: NaiveDate) -> bool {
    PERIOD_START <= date && date <= PERIOD_END
}

pub fn week_index(date: NaiveDate) -> Result<u32, OutOfRangeError> {
    if !is_in_window(date) {
        return Err(OutOfRangeError::Date(date));
    }
    let offset = (date - PERIOD_START).num_days();
    Ok((offset / DAYS_PER_WEEK) as u32 + 1)
}

pub fn total_weeks() -> u32 {
    let days = (PERIOD_END - PERIOD_START).num_days() + 1;
    ((days + DAYS_PER_WEEK - 1) / DAYS_PER_WEEK) as u32
}

pub fn week_bounds(week: u32) -> Result<(NaiveDate, NaiveDate), OutOfRangeError> {
    let last = total_weeks();
    if week == 0 || week > last {
        return Err(OutOfRangeError::Week { week, last });
    }
    let start = PERIOD_START + Days::new(u64::from(week - 1) * DAYS_PER_WEEK as u64);
    let end = (start + Days::new(DAYS_PER_WEEK as u64 - 1)).min(PERIOD_END);
    Ok((start, end))
}

pub fn all_weeks() -> Vec<Week> {
    (1..=total_weeks())
        .filter_map(|index| {
            week_bounds(index)
                .ok()
                .map(|(start, end)| Week { index, start, end })
        })
        .collect()
}
