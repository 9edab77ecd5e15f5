use crate::error::ApiError;
use crate::network::{Dimension, QueryRequest, ResultRow, SearchAnalytics};
use crate::windows::DateWindow;
use tracing::{debug, warn};

/// Maximum rows the API returns per call.
pub const PAGE_SIZE: u32 = 25_000;

/// Ceiling applied to the distinct query/page sub-queries.
///
/// High-volume sites have more distinct queries and pages than this, so counts
/// that reach it are an undercount.
pub const UNIQUE_COUNT_CAP: u32 = 5_000;

/// Fetches every row matching `dimensions` for `site` within `window`.
///
/// Pages are requested with an increasing `startRow` until a page comes back
/// shorter than `page_size` or without rows. Any failed call discards the rows
/// gathered so far: the caller gets either the complete set or the error.
pub async fn fetch_all_rows<A: SearchAnalytics>(
    api: &mut A,
    site: &str,
    window: &DateWindow,
    dimensions: &[Dimension],
    page_size: u32,
) -> Result<Vec<ResultRow>, ApiError> {
    let page_size = page_size.max(1);
    let mut rows = Vec::new();
    let mut start_row = 0u64;

    loop {
        let request = QueryRequest {
            start_date: window.start_date(),
            end_date: window.end_date(),
            dimensions: dimensions.to_vec(),
            row_limit: page_size,
            start_row,
        };
        let response = api.query(site, &request).await?;
        let Some(page) = response.rows else {
            break;
        };
        let page_len = page.len();
        for row in page {
            rows.push(row.validate(dimensions)?);
        }
        debug!(site, window = %window, page_len, total = rows.len(), "Retrieved page");

        if page_len < page_size as usize {
            break;
        }
        start_row += u64::from(page_size);
    }

    Ok(rows)
}

/// Distinct values of one dimension, counted up to a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueCount {
    pub count: u64,
    pub capped: bool,
}

impl UniqueCount {
    pub fn new(count: u64, cap: u32) -> Self {
        UniqueCount {
            count,
            capped: count >= u64::from(cap),
        }
    }
}

/// Counts distinct `dimension` values with a single capped call.
pub async fn fetch_unique_count<A: SearchAnalytics>(
    api: &mut A,
    site: &str,
    window: &DateWindow,
    dimension: Dimension,
    cap: u32,
) -> Result<UniqueCount, ApiError> {
    let request = QueryRequest {
        start_date: window.start_date(),
        end_date: window.end_date(),
        dimensions: vec![dimension],
        row_limit: cap,
        start_row: 0,
    };
    let response = api.query(site, &request).await?;
    let count = response.rows.map_or(0, |rows| rows.len() as u64);
    Ok(UniqueCount::new(count, cap))
}

/// Totals for one site and month.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthSummary {
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    pub position: f64,
    pub queries: Option<UniqueCount>,
    pub pages: Option<UniqueCount>,
}

/// Result of fetching a single (site, window) pair.
#[derive(Debug)]
pub enum WindowOutcome {
    Summary(MonthSummary),
    /// The query succeeded and matched nothing.
    Empty,
    /// The caller lacks access to the property.
    PermissionDenied,
    /// The fetch failed; no row is available for this window.
    Skipped(ApiError),
}

/// Fetches the totals for a window, plus unique counts when requested.
///
/// Only fatal authorization errors are returned as `Err`; everything else is
/// folded into the outcome so the caller can continue with other windows.
pub async fn fetch_month_summary<A: SearchAnalytics>(
    api: &mut A,
    site: &str,
    window: &DateWindow,
    unique_counts: bool,
) -> Result<WindowOutcome, ApiError> {
    let totals = match fetch_all_rows(api, site, window, &[], PAGE_SIZE).await {
        Ok(rows) => rows,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) if e.is_permission_denied() => return Ok(WindowOutcome::PermissionDenied),
        Err(e) => return Ok(WindowOutcome::Skipped(e)),
    };
    let Some(total) = totals.into_iter().next() else {
        return Ok(WindowOutcome::Empty);
    };

    let mut summary = MonthSummary {
        clicks: total.clicks,
        impressions: total.impressions,
        ctr: total.ctr,
        position: total.position,
        queries: None,
        pages: None,
    };

    if unique_counts {
        summary.queries = unique_count_or_warn(api, site, window, Dimension::Query).await?;
        summary.pages = unique_count_or_warn(api, site, window, Dimension::Page).await?;
    }

    Ok(WindowOutcome::Summary(summary))
}

async fn unique_count_or_warn<A: SearchAnalytics>(
    api: &mut A,
    site: &str,
    window: &DateWindow,
    dimension: Dimension,
) -> Result<Option<UniqueCount>, ApiError> {
    match fetch_unique_count(api, site, window, dimension, UNIQUE_COUNT_CAP).await {
        Ok(count) => {
            if count.capped {
                warn!(
                    site,
                    month = %window.label(),
                    ?dimension,
                    cap = UNIQUE_COUNT_CAP,
                    "Unique count reached the API ceiling and is an undercount"
                );
            }
            Ok(Some(count))
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(site, month = %window.label(), ?dimension, error = %e, "Could not fetch unique count");
            Ok(None)
        }
    }
}
