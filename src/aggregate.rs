use crate::error::ApiError;
use crate::fetch::{MonthSummary, UNIQUE_COUNT_CAP, WindowOutcome, fetch_month_summary};
use crate::network::{Dimension, ResultRow, SearchAnalytics};
use crate::utils;
use crate::windows::DateWindow;
use chrono::{Datelike, Month, NaiveDate};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use tracing::{info, warn};

// region: Monthly rows

/// One row per (site, month); the CSV record of the monthly report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub site_url: String,
    pub month: String,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
    #[serde(default)]
    pub queries: Option<u64>,
    #[serde(default)]
    pub pages: Option<u64>,
}

impl MetricRow {
    pub fn from_summary(site_url: &str, window: &DateWindow, summary: &MonthSummary) -> Self {
        MetricRow {
            site_url: site_url.to_string(),
            month: window.label(),
            clicks: summary.clicks,
            impressions: summary.impressions,
            ctr: summary.ctr,
            position: summary.position,
            queries: summary.queries.map(|c| c.count),
            pages: summary.pages.map(|c| c.count),
        }
    }

    pub fn queries_capped(&self) -> bool {
        self.queries.is_some_and(|q| q >= u64::from(UNIQUE_COUNT_CAP))
    }

    pub fn pages_capped(&self) -> bool {
        self.pages.is_some_and(|p| p >= u64::from(UNIQUE_COUNT_CAP))
    }
}

/// Rows keyed by (site, month), kept in the order they were first inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteMonthTable {
    rows: Vec<MetricRow>,
    index: HashMap<(String, String), usize>,
}

impl SiteMonthTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row; a row for an existing key replaces it in place.
    pub fn insert(&mut self, row: MetricRow) {
        let key = (row.site_url.clone(), row.month.clone());
        match self.index.get(&key) {
            Some(&i) => self.rows[i] = row,
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
    }

    pub fn get(&self, site_url: &str, month: &str) -> Option<&MetricRow> {
        self.index
            .get(&(site_url.to_string(), month.to_string()))
            .map(|&i| &self.rows[i])
    }

    pub fn rows(&self) -> &[MetricRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows_for<'a>(&'a self, site_url: &'a str) -> impl Iterator<Item = &'a MetricRow> + 'a {
        self.rows.iter().filter(move |r| r.site_url == site_url)
    }

    /// Distinct sites in encounter order.
    pub fn sites(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|r| seen.insert(r.site_url.as_str()))
            .map(|r| r.site_url.clone())
            .collect()
    }

    /// `first-month to last-month` across all rows.
    pub fn period(&self) -> Option<String> {
        let first = self.rows.iter().map(|r| r.month.as_str()).min()?;
        let last = self.rows.iter().map(|r| r.month.as_str()).max()?;
        Some(format!("{first} to {last}"))
    }

    pub fn has_unique_counts(&self) -> bool {
        self.rows
            .iter()
            .any(|r| r.queries.is_some() || r.pages.is_some())
    }
}

impl FromIterator<MetricRow> for SiteMonthTable {
    fn from_iter<I: IntoIterator<Item = MetricRow>>(iter: I) -> Self {
        let mut table = SiteMonthTable::new();
        for row in iter {
            table.insert(row);
        }
        table
    }
}

/// Counters reported at the end of a monthly run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionStats {
    pub sites: usize,
    pub rows: usize,
    pub empty_windows: usize,
    pub skipped_windows: usize,
    pub denied_sites: Vec<String>,
}

/// Fetches every window for `site` into `table`, most recent month first.
///
/// A permission error stops the remaining windows for the site. Other failures
/// leave that month absent. Fatal authorization errors abort with `Err`.
pub async fn collect_site<A: SearchAnalytics>(
    api: &mut A,
    table: &mut SiteMonthTable,
    stats: &mut CollectionStats,
    site: &str,
    windows: &[DateWindow],
    unique_counts: bool,
    progress: Option<&ProgressBar>,
) -> Result<(), ApiError> {
    stats.sites += 1;
    for (i, window) in windows.iter().enumerate() {
        if let Some(pb) = progress {
            pb.set_message(format!("{} {}", utils::truncate_message(site, 60), window.label()));
        }
        let outcome = fetch_month_summary(api, site, window, unique_counts).await?;
        if let Some(pb) = progress {
            pb.inc(1);
        }
        match outcome {
            WindowOutcome::Summary(summary) => {
                table.insert(MetricRow::from_summary(site, window, &summary));
                stats.rows += 1;
            }
            WindowOutcome::Empty => {
                info!(site, month = %window.label(), "No data for month");
                stats.empty_windows += 1;
            }
            WindowOutcome::PermissionDenied => {
                warn!(site, "Insufficient permission; skipping remaining months");
                stats.denied_sites.push(site.to_string());
                if let Some(pb) = progress {
                    pb.inc((windows.len() - i - 1) as u64);
                }
                break;
            }
            WindowOutcome::Skipped(e) => {
                warn!(site, month = %window.label(), error = %e, "No data available");
                stats.skipped_windows += 1;
            }
        }
    }
    Ok(())
}

// endregion

// region: Yearly narrative

/// Dimensions requested for the yearly narrative, in key order.
pub const WRAPPED_DIMENSIONS: [Dimension; 3] = [Dimension::Date, Dimension::Query, Dimension::Page];

/// One (date, query, page) row of a dimensioned query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQueryRow {
    pub date: NaiveDate,
    pub query: String,
    pub page: String,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
}

impl TryFrom<ResultRow> for RawQueryRow {
    type Error = ApiError;

    /// Expects keys in [`WRAPPED_DIMENSIONS`] order.
    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        let [date, query, page]: [String; 3] = row.keys.try_into().map_err(|keys: Vec<String>| {
            ApiError::Malformed(format!("expected date, query and page keys, got {keys:?}"))
        })?;
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| ApiError::Malformed(format!("invalid date key {date:?}: {e}")))?;
        Ok(RawQueryRow {
            date,
            query,
            page,
            clicks: row.clicks,
            impressions: row.impressions,
            ctr: row.ctr,
            position: row.position,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leader<K> {
    pub key: K,
    pub clicks: u64,
}

/// Sums clicks per key; the highest total wins, the first-seen key on ties.
pub fn leader_by_clicks<K, F>(rows: &[RawQueryRow], key: F) -> Option<Leader<K>>
where
    K: Eq + Hash + Clone,
    F: Fn(&RawQueryRow) -> K,
{
    let mut totals: Vec<(K, u64)> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();
    for row in rows {
        let k = key(row);
        match index.get(&k) {
            Some(&i) => totals[i].1 += row.clicks,
            None => {
                index.insert(k.clone(), totals.len());
                totals.push((k, row.clicks));
            }
        }
    }

    let mut best: Option<Leader<K>> = None;
    for (k, clicks) in totals {
        if best.as_ref().is_none_or(|b| clicks > b.clicks) {
            best = Some(Leader { key: k, clicks });
        }
    }
    best
}

/// Year-in-review figures for one site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WrappedSummary {
    pub site_url: String,
    pub year: i32,
    pub total_clicks: u64,
    pub total_impressions: u64,
    pub top_page: Option<Leader<String>>,
    pub top_query: Option<Leader<String>>,
    pub unique_pages: usize,
    pub unique_queries: usize,
    /// Keyed by (year, month number).
    pub busiest_month: Option<Leader<(i32, u32)>>,
}

impl WrappedSummary {
    pub fn from_rows(site_url: &str, year: i32, rows: &[RawQueryRow]) -> Self {
        let unique_pages = rows.iter().map(|r| r.page.as_str()).collect::<HashSet<_>>().len();
        let unique_queries = rows.iter().map(|r| r.query.as_str()).collect::<HashSet<_>>().len();

        WrappedSummary {
            site_url: site_url.to_string(),
            year,
            total_clicks: rows.iter().map(|r| r.clicks).sum(),
            total_impressions: rows.iter().map(|r| r.impressions).sum(),
            top_page: leader_by_clicks(rows, |r| r.page.clone()),
            top_query: leader_by_clicks(rows, |r| r.query.clone()),
            unique_pages,
            unique_queries,
            busiest_month: leader_by_clicks(rows, |r| (r.date.year(), r.date.month())),
        }
    }

    pub fn busiest_month_name(&self) -> Option<&'static str> {
        let (_, month) = self.busiest_month.as_ref()?.key;
        Month::try_from(u8::try_from(month).ok()?).ok().map(|m| m.name())
    }

    pub fn narratives(&self) -> Narratives {
        let top_page = match &self.top_page {
            Some(leader) => format!(
                "Your most popular page, '{}', drove a massive {} clicks.",
                leader.key,
                utils::thousands(leader.clicks)
            ),
            None => "No single top page could be identified.".to_string(),
        };
        let top_query = match &self.top_query {
            Some(leader) => format!(
                "The keyword that brought you the most attention was '{}', accounting for {} clicks.",
                leader.key,
                utils::thousands(leader.clicks)
            ),
            None => "No single top query could be identified.".to_string(),
        };
        let busiest_month = match (&self.busiest_month, self.busiest_month_name()) {
            (Some(leader), Some(name)) => format!(
                "Your busiest month for search clicks was {}, bringing in {} clicks.",
                name,
                utils::thousands(leader.clicks)
            ),
            _ => "No busiest month could be identified.".to_string(),
        };

        Narratives {
            overall_summary: format!(
                "In {}, your site received {} clicks from search, generating {} impressions across Google Search.",
                self.year,
                utils::thousands(self.total_clicks),
                utils::thousands(self.total_impressions)
            ),
            top_page,
            top_query,
            reach_breadth: format!(
                "Your content appeared for {} different search queries across {} unique pages on your site.",
                utils::thousands(self.unique_queries as u64),
                utils::thousands(self.unique_pages as u64)
            ),
            busiest_month,
        }
    }
}

/// Human-readable sentences for the yearly report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narratives {
    pub overall_summary: String,
    pub top_page: String,
    pub top_query: String,
    pub reach_breadth: String,
    pub busiest_month: String,
}

impl Narratives {
    pub fn lines(&self) -> [&str; 5] {
        [
            &self.overall_summary,
            &self.top_page,
            &self.top_query,
            &self.reach_breadth,
            &self.busiest_month,
        ]
    }
}

// endregion
