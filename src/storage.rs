use crate::sitekey::property_host;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Output directory name for a property: host without a leading `www.`.
///
/// `sc-domain:example.com` and `https://www.example.com/` both map to
/// `example.com`.
pub fn host_dir(site_url: &str) -> String {
    let host = property_host(site_url);
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// `host_dir` with dots replaced, for use inside file names.
pub fn host_slug(site_url: &str) -> String {
    host_dir(site_url).replace('.', "-")
}

/// Paths of the CSV and HTML artifacts of one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub dir: PathBuf,
    pub csv: PathBuf,
    pub html: PathBuf,
}

impl ReportPaths {
    fn new(dir: PathBuf, csv_name: String, html_name: String) -> Self {
        ReportPaths {
            csv: dir.join(csv_name),
            html: dir.join(html_name),
            dir,
        }
    }

    /// Monthly report for one site or, with `site_url = None`, the whole account.
    pub fn monthly(
        output_dir: &Path,
        site_url: Option<&str>,
        month_label: &str,
        unique_counts: bool,
    ) -> Self {
        let kind = if unique_counts {
            "queries-pages-analysis"
        } else {
            "account-performance"
        };
        let (dir, stem) = match site_url {
            Some(site) => (
                output_dir.join(host_dir(site)),
                format!("{kind}-{}-{month_label}", host_slug(site)),
            ),
            None => (
                output_dir.join("account"),
                format!("{kind}-account-wide-{month_label}"),
            ),
        };
        ReportPaths::new(dir, format!("{stem}.csv"), format!("{stem}.html"))
    }

    /// Yearly narrative report for one site.
    pub fn wrapped(output_dir: &Path, site_url: &str, year: i32) -> Self {
        let slug = host_slug(site_url);
        ReportPaths::new(
            output_dir.join(host_dir(site_url)),
            format!("gsc-wrapped-raw-data-{slug}-{year}.csv"),
            format!("gsc-wrapped-report-{slug}-{year}.html"),
        )
    }

    /// Creates the report directory if it does not exist yet.
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }
}
