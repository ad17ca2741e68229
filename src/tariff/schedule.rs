use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use enumset::{EnumSet, EnumSetType, enum_set};
use serde::Deserialize;

#[derive(Debug, EnumSetType, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl From<Weekday> for Day {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
            Weekday::Sun => Self::Sun,
        }
    }
}

/// Recurring weekly peak window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeakWindow {
    /// Days on which the window opens.
    pub days: EnumSet<Day>,

    /// Inclusive.
    pub start: NaiveTime,

    /// Exclusive. When not after `start`, the window runs past midnight into the next day.
    pub end: NaiveTime,
}

impl PeakWindow {
    pub const WEEKDAYS: EnumSet<Day> = enum_set!(Day::Mon | Day::Tue | Day::Wed | Day::Thu | Day::Fri);

    #[must_use]
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        let day = Day::from(at.weekday());
        let time = at.time();
        if self.start < self.end {
            self.days.contains(day) && (self.start <= time) && (time < self.end)
        } else {
            let opened_today = self.days.contains(day) && (self.start <= time);
            let opened_yesterday = self.days.contains(Day::from(at.weekday().pred())) && (time < self.end);
            opened_today || opened_yesterday
        }
    }
}

/// Weekly time-of-use schedule: anything outside the windows, and the whole of any holiday, is off-peak.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeakSchedule {
    pub windows: Vec<PeakWindow>,
    pub holidays: BTreeSet<NaiveDate>,
}

impl Default for PeakSchedule {
    /// TNB domestic time-of-use: weekdays, 14:00 to 22:00.
    fn default() -> Self {
        Self {
            windows: vec![PeakWindow {
                days: PeakWindow::WEEKDAYS,
                start: NaiveTime::from_hms_opt(14, 0, 0).unwrap_or(NaiveTime::MIN),
                end: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or(NaiveTime::MIN),
            }],
            holidays: BTreeSet::new(),
        }
    }
}

impl PeakSchedule {
    #[must_use]
    pub fn is_peak(&self, at: DateTime<Local>) -> bool {
        let at = at.naive_local();
        if self.holidays.contains(&at.date()) {
            return false;
        }
        self.windows.iter().any(|window| window.contains(at))
    }
}
