use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Inclusive calendar-date range used to scope collected activity.
///
/// A missing bound leaves that side of the range open. `since <= until` is not
/// checked; an inverted window simply contains nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(since: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        Self { since, until }
    }

    /// True when the calendar date of `at` (in UTC) lies within the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        !self.starts_after(day) && !self.ends_before(day)
    }

    /// Like [`DateWindow::contains`], treating an unknown timestamp as contained.
    pub fn admits(&self, at: Option<DateTime<Utc>>) -> bool {
        at.map_or(true, |at| self.contains(at))
    }

    /// True when `day` is earlier than the `since` bound.
    pub fn starts_after(&self, day: NaiveDate) -> bool {
        self.since.is_some_and(|since| day < since)
    }

    /// True when `day` is later than the `until` bound.
    pub fn ends_before(&self, day: NaiveDate) -> bool {
        self.until.is_some_and(|until| day > until)
    }

    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.since, self.until) {
            (None, None) => write!(f, "all time"),
            (Some(since), None) => write!(f, "{since} to now"),
            (None, Some(until)) => write!(f, "start to {until}"),
            (Some(since), Some(until)) => write!(f, "{since} to {until}"),
        }
    }
}
