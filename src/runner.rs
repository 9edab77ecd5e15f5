use crate::aggregate::{
    CollectionStats, RawQueryRow, SiteMonthTable, WRAPPED_DIMENSIONS, WrappedSummary, collect_site,
};
use crate::error::{ApiError, ReportError};
use crate::fetch::{PAGE_SIZE, fetch_all_rows};
use crate::network::SearchAnalytics;
use crate::options::BatchMode;
use crate::report;
use crate::sitekey::{group_by_root, sort_sites};
use crate::storage::ReportPaths;
use crate::windows::{DateWindow, monthly_windows, most_recent_month};
use chrono::{Datelike, NaiveDate};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// How a single report run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// All artifacts were written.
    Completed,
    /// Nothing to report; no artifacts were written.
    NoData,
    /// The run could not complete or an artifact failed to write.
    Failed,
}

impl RunStatus {
    pub fn exit_code(self) -> ExitCode {
        match self {
            RunStatus::Completed | RunStatus::NoData => ExitCode::SUCCESS,
            RunStatus::Failed => ExitCode::from(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonthlyJob {
    pub site_url: Option<String>,
    pub use_cache: bool,
    pub months: u32,
    pub unique_counts: bool,
}

#[derive(Debug, Clone)]
pub struct WrappedJob {
    pub site_url: String,
    pub year: i32,
    pub use_cache: bool,
}

/// The calendar year before `today`, the default for yearly reports.
pub fn previous_year(today: NaiveDate) -> i32 {
    today.year() - 1
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(concat!(
                "\x1b[2m[2/3]\x1b[0m",
                " 📥 [{elapsed_precise}] [{bar:40.cyan/blue}] Month {pos}/{len} {msg}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("■┄"),
    );
    pb
}

/// Writes the CSV and HTML artifacts independently of each other.
fn write_artifacts<F>(paths: &ReportPaths, write_csv: Option<F>, html: &str) -> RunStatus
where
    F: FnOnce(&Path) -> Result<(), ReportError>,
{
    if let Err(e) = paths.ensure_dir() {
        error!(dir = %paths.dir.display(), error = %e, "Could not create the output directory");
        return RunStatus::Failed;
    }
    let mut status = RunStatus::Completed;

    if let Some(write_csv) = write_csv {
        match write_csv(&paths.csv) {
            Ok(()) => {
                report::announce_csv(&paths.csv);
                println!(
                    "{}",
                    style("Hint: To recreate this report from the saved data, use the --use-cache flag.").dim()
                );
            }
            Err(e) => {
                error!(path = %paths.csv.display(), error = %e, "Could not write the CSV report");
                status = RunStatus::Failed;
            }
        }
    }

    match report::write_html(&paths.html, html) {
        Ok(()) => report::announce_html(&paths.html),
        Err(e) => {
            error!(path = %paths.html.display(), error = %e, "Could not write the HTML report");
            status = RunStatus::Failed;
        }
    }
    status
}

fn load_cache<T>(path: &Path, read: impl Fn(&Path) -> Result<T, ReportError>) -> Option<T> {
    if !path.exists() {
        info!(path = %path.display(), "No cached data found; fetching from the API");
        return None;
    }
    match read(path) {
        Ok(data) => {
            println!(
                "{} 📦 Found cached data at {}. Using it to generate the report.",
                style("[1/3]").dim(),
                style(path.display()).underlined()
            );
            Some(data)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read cached data; fetching from the API");
            None
        }
    }
}

/// Monthly performance for one site or every site in the account.
///
/// Returns `Err` only for fatal authorization failures.
pub async fn run_monthly<A: SearchAnalytics>(
    api: &mut A,
    output_dir: &Path,
    today: NaiveDate,
    job: &MonthlyJob,
) -> Result<RunStatus, ApiError> {
    let windows = monthly_windows(today, job.months);
    if windows.is_empty() {
        println!("No complete months to report on.");
        return Ok(RunStatus::NoData);
    }
    let paths = ReportPaths::monthly(
        output_dir,
        job.site_url.as_deref(),
        &most_recent_month(today),
        job.unique_counts,
    );

    let cached = if job.use_cache {
        load_cache(&paths.csv, report::read_metrics_csv)
    } else {
        None
    };

    let (table, stats, sites, fresh) = match cached {
        Some(table) => {
            let mut sites = table.sites();
            sort_sites(&mut sites);
            (table, None, sites, false)
        }
        None => {
            api.authorize().await?;
            let mut sites = match &job.site_url {
                Some(site) => vec![site.clone()],
                None => {
                    println!("{} 🔎 Fetch sites in the account...", style("[1/3]").dim());
                    match api.list_sites().await {
                        Ok(entries) => entries.into_iter().map(|e| e.site_url).collect(),
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            warn!(error = %e, "Could not fetch the list of sites");
                            Vec::new()
                        }
                    }
                }
            };
            if sites.is_empty() {
                println!("No sites found in your account.");
                return Ok(RunStatus::NoData);
            }
            sort_sites(&mut sites);

            let mut table = SiteMonthTable::new();
            let mut stats = CollectionStats::default();
            let pb = progress_bar((sites.len() * windows.len()) as u64);
            for site in &sites {
                info!(site = %site, "Fetching data for site");
                collect_site(
                    api,
                    &mut table,
                    &mut stats,
                    site,
                    &windows,
                    job.unique_counts,
                    Some(&pb),
                )
                .await?;
            }
            pb.finish_with_message("- 🏁 Complete!");
            (table, Some(stats), sites, true)
        }
    };

    if table.is_empty() {
        println!("No performance data found.");
        return Ok(RunStatus::NoData);
    }

    println!("{} 📝 Write reports...", style("[3/3]").dim());
    let period = table.period().unwrap_or_default();
    let html = match &job.site_url {
        Some(site) => report::render_single_site_html(&table, site, &period),
        None => report::render_multi_site_html(&table, &sites, &period),
    };
    let write_csv = |path: &Path| report::write_metrics_csv(path, &table, job.unique_counts);
    let status = write_artifacts(&paths, fresh.then_some(write_csv), &html);

    report::show_monthly_summary(&table, stats.as_ref(), job.site_url.as_deref());
    Ok(status)
}

/// Year-in-review report for one site.
///
/// Returns `Err` only for fatal authorization failures.
pub async fn run_wrapped<A: SearchAnalytics>(
    api: &mut A,
    output_dir: &Path,
    job: &WrappedJob,
) -> Result<RunStatus, ApiError> {
    let Some(window) = DateWindow::year(job.year) else {
        error!(year = job.year, "Invalid year");
        return Ok(RunStatus::Failed);
    };
    let paths = ReportPaths::wrapped(output_dir, &job.site_url, job.year);

    let cached = if job.use_cache {
        load_cache(&paths.csv, report::read_raw_csv)
    } else {
        None
    };
    let fresh = cached.is_none();

    let rows = match cached {
        Some(rows) => rows,
        None => {
            api.authorize().await?;
            println!(
                "{} 🔎 Fetch {} for {}...",
                style("[1/3]").dim(),
                window,
                job.site_url
            );
            let fetched =
                fetch_all_rows(api, &job.site_url, &window, &WRAPPED_DIMENSIONS, PAGE_SIZE)
                    .await
                    .and_then(|rows| {
                        rows.into_iter()
                            .map(RawQueryRow::try_from)
                            .collect::<Result<Vec<_>, _>>()
                    });
            match fetched {
                Ok(rows) => rows,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(site = %job.site_url, error = %e, "No data available");
                    println!("No data found for the given site and year.");
                    return Ok(RunStatus::NoData);
                }
            }
        }
    };

    if rows.is_empty() {
        println!("No data found for the given site and year.");
        return Ok(RunStatus::NoData);
    }

    println!("{} 🧮 Analyse {} rows...", style("[2/3]").dim(), rows.len());
    let summary = WrappedSummary::from_rows(&job.site_url, job.year, &rows);
    report::show_wrapped_summary(&summary);

    println!("\n{} 📝 Write reports...", style("[3/3]").dim());
    let html = report::render_wrapped_html(&summary);
    let write_csv = |path: &Path| report::write_raw_csv(path, &rows);
    Ok(write_artifacts(&paths, fresh.then_some(write_csv), &html))
}

/// Batch settings shared by every site.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub mode: BatchMode,
    pub year: i32,
    pub months: u32,
    pub use_cache: bool,
    pub unique_counts: bool,
}

/// Runs one report per site, in order, continuing past per-site failures.
pub async fn run_batch<A: SearchAnalytics>(
    api: &mut A,
    output_dir: &Path,
    today: NaiveDate,
    sites: &[String],
    job: &BatchJob,
) -> Result<RunStatus, ApiError> {
    if sites.is_empty() {
        println!("No sites provided to process. Provide site URLs directly or via --sites-file.");
        return Ok(RunStatus::NoData);
    }
    println!("\nFound {} properties to process.", sites.len());

    let mut failed = Vec::new();
    for site in sites {
        println!(
            "\n{} {} {}",
            style("====================").dim(),
            style(format!("Running for: {site}")).bold(),
            style("====================").dim()
        );
        let status = match job.mode {
            BatchMode::Monthly => {
                let monthly = MonthlyJob {
                    site_url: Some(site.clone()),
                    use_cache: job.use_cache,
                    months: job.months,
                    unique_counts: job.unique_counts,
                };
                run_monthly(api, output_dir, today, &monthly).await?
            }
            BatchMode::Wrapped => {
                let wrapped = WrappedJob {
                    site_url: site.clone(),
                    year: job.year,
                    use_cache: job.use_cache,
                };
                run_wrapped(api, output_dir, &wrapped).await?
            }
        };
        match status {
            RunStatus::Failed => {
                println!("\n----- Finished with errors for {site} -----");
                failed.push(site.clone());
            }
            _ => println!("\n----- Successfully completed for {site} -----"),
        }
    }

    if failed.is_empty() {
        Ok(RunStatus::Completed)
    } else {
        error!(failed = ?failed, "Some sites did not complete");
        Ok(RunStatus::Failed)
    }
}

/// Prints the account's properties grouped by root domain.
pub async fn run_sites<A: SearchAnalytics>(api: &mut A) -> Result<RunStatus, ApiError> {
    api.authorize().await?;
    let mut sites: Vec<String> = match api.list_sites().await {
        Ok(entries) => entries.into_iter().map(|e| e.site_url).collect(),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            error!(error = %e, "Could not fetch the list of sites");
            return Ok(RunStatus::Failed);
        }
    };
    if sites.is_empty() {
        println!("No sites found in your account.");
        return Ok(RunStatus::NoData);
    }
    sort_sites(&mut sites);

    println!("Available sites for use in reports:\n");
    for (root, members) in group_by_root(&sites) {
        println!("{}", style(format!("# {root}")).bold());
        for site in members {
            println!("{site}");
        }
        println!();
    }
    Ok(RunStatus::Completed)
}
