use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::tariff::rates::ConfigurationError;

/// Day of month on which a billing cycle starts, clamped to the last day in shorter months.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BillingDay(u32);

impl BillingDay {
    pub const FIRST: Self = Self(1);

    /// Actual cycle start date in the given month.
    #[must_use]
    pub fn in_month(self, year: i32, month: u32) -> NaiveDate {
        let day = self.0.min(days_in_month(year, month));
        NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
    }
}

impl TryFrom<u32> for BillingDay {
    type Error = ConfigurationError;

    fn try_from(day: u32) -> Result<Self, Self::Error> {
        if (1..=31).contains(&day) {
            Ok(Self(day))
        } else {
            Err(ConfigurationError::BillingDay(day.to_string()))
        }
    }
}

impl From<BillingDay> for u32 {
    fn from(day: BillingDay) -> Self {
        day.0
    }
}

impl FromStr for BillingDay {
    type Err = ConfigurationError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        text.trim()
            .parse::<u32>()
            .map_err(|_| ConfigurationError::BillingDay(text.to_string()))?
            .try_into()
    }
}

impl Display for BillingDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (year, month) = next_month(year, month);
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_day| first_day.pred_opt())
        .map_or(28, |last_day| last_day.day())
}

const fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

const fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 { (year - 1, 12) } else { (year, month - 1) }
}

/// Start of the day in local time.
///
/// Where the midnight falls into a daylight-saving gap, the date is taken at UTC midnight instead.
fn start_of_day(date: NaiveDate) -> DateTime<Local> {
    let midnight = date.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&midnight))
}

/// Start of the cycle that contains the moment.
pub fn cycle_start_containing(at: DateTime<Local>, billing_day: BillingDay) -> DateTime<Local> {
    let date = at.date_naive();
    let this_month = start_of_day(billing_day.in_month(date.year(), date.month()));
    if at >= this_month {
        this_month
    } else {
        let (year, month) = previous_month(date.year(), date.month());
        start_of_day(billing_day.in_month(year, month))
    }
}

/// Boundary that closes the cycle started at `cycle_start`: one calendar month later, day-clamped.
pub fn next_cycle_start(cycle_start: DateTime<Local>, billing_day: BillingDay) -> DateTime<Local> {
    let date = cycle_start.date_naive();
    let (year, month) = next_month(date.year(), date.month());
    start_of_day(billing_day.in_month(year, month))
}
