use chrono::{Datelike, Months, NaiveDate};
use std::fmt;

/// Number of complete months the search-analytics API retains.
pub const DEFAULT_MONTHS: u32 = 16;

/// An inclusive date range used as a query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// The calendar month containing `date`.
    pub fn month_of(date: NaiveDate) -> Self {
        let start = first_of_month(date);
        // Every month start has a successor; chrono only fails at NaiveDate::MAX.
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        DateWindow { start, end }
    }

    /// January 1st through December 31st of `year`.
    pub fn year(year: i32) -> Option<Self> {
        Some(DateWindow {
            start: NaiveDate::from_ymd_opt(year, 1, 1)?,
            end: NaiveDate::from_ymd_opt(year, 12, 31)?,
        })
    }

    /// `YYYY-MM` label of the window's first month.
    pub fn label(&self) -> String {
        self.start.format("%Y-%m").to_string()
    }

    pub fn start_date(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_date(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} to {}", self.start_date(), self.end_date())
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Returns `count` complete calendar months, most recent first.
///
/// Window 1 is the month before `today`'s month; each following window steps
/// back exactly one calendar month.
pub fn monthly_windows(today: NaiveDate, count: u32) -> Vec<DateWindow> {
    let current = first_of_month(today);
    (1..=count)
        .map_while(|i| current.checked_sub_months(Months::new(i)))
        .map(DateWindow::month_of)
        .collect()
}

/// Label of the most recently completed month relative to `today`.
pub fn most_recent_month(today: NaiveDate) -> String {
    monthly_windows(today, 1)
        .first()
        .map(DateWindow::label)
        .unwrap_or_else(|| today.format("%Y-%m").to_string())
}
