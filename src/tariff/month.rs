use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Datelike, Local, NaiveDate};
use serde::Deserialize;

use crate::tariff::rates::ConfigurationError;

/// Calendar month that keys the monthly fuel adjustment rates, written as `YYYY-MM`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct BillingMonth {
    year: i32,
    month: u32,
}

impl BillingMonth {
    /// Month of the given moment in local time.
    #[must_use]
    pub fn of(at: DateTime<Local>) -> Self {
        let date = at.date_naive();
        Self { year: date.year(), month: date.month() }
    }
}

impl FromStr for BillingMonth {
    type Err = ConfigurationError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let error = || ConfigurationError::Month(text.to_string());
        let (year, month) = text.trim().split_once('-').ok_or_else(error)?;
        let year = year.parse().map_err(|_| error())?;
        let month = month.parse().map_err(|_| error())?;
        NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(error)?;
        Ok(Self { year, month })
    }
}

impl TryFrom<String> for BillingMonth {
    type Error = ConfigurationError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl Display for BillingMonth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Debug for BillingMonth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
