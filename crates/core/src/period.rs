use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display filter over transaction timestamps: a year, then optionally a month
/// within that year. An empty window matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

impl TimeWindow {
    pub fn all() -> Self {
        TimeWindow::default()
    }

    pub fn year(year: i32) -> Self {
        TimeWindow { year: Some(year), month: None }
    }

    /// A month without a year is meaningless here and is dropped, as is a
    /// month outside 1–12.
    pub fn month(year: i32, month: u32) -> Self {
        TimeWindow {
            year: Some(year),
            month: (1..=12).contains(&month).then_some(month),
        }
    }

    pub fn is_unfiltered(self) -> bool {
        self.year.is_none()
    }

    pub fn contains(self, ts: NaiveDateTime) -> bool {
        match (self.year, self.month) {
            (None, _) => true,
            (Some(y), None) => ts.year() == y,
            (Some(y), Some(m)) => ts.year() == y && ts.month() == m,
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.year, self.month) {
            (None, _) => write!(f, "All time"),
            (Some(y), None) => write!(f, "{y}"),
            (Some(y), Some(m)) => write!(f, "{} {y}", month_name(m).unwrap_or("?")),
        }
    }
}

pub fn month_name(month: u32) -> Option<&'static str> {
    const NAMES: [&str; 12] = [
        "January", "February", "March", "April", "May", "June", "July", "August",
        "September", "October", "November", "December",
    ];
    month
        .checked_sub(1)
        .and_then(|i| NAMES.get(i as usize))
        .copied()
}
