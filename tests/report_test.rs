use gsc_exporter::aggregate::{MetricRow, RawQueryRow, SiteMonthTable, WrappedSummary};
use gsc_exporter::report::{
    line_chart_svg, read_metrics_csv, read_raw_csv, render_multi_site_html,
    render_single_site_html, render_wrapped_html, write_html, write_metrics_csv, write_raw_csv,
};
use gsc_exporter::sitekey::sort_sites;
use std::fs;
use tempfile::tempdir;

fn metric(site: &str, month: &str, queries: Option<u64>) -> MetricRow {
    MetricRow {
        site_url: site.to_string(),
        month: month.to_string(),
        clicks: 1234,
        impressions: 56789,
        ctr: 0.0217,
        position: 11.5,
        queries,
        pages: Some(42),
    }
}

fn sample_table() -> SiteMonthTable {
    vec![
        metric("sc-domain:example.com", "2024-02", Some(5_000)),
        metric("sc-domain:example.com", "2024-01", None),
        metric("https://blog.example.com/", "2024-02", Some(12)),
    ]
    .into_iter()
    .collect()
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

#[test]
fn test_metrics_csv_header_and_missing_counts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested/report.csv");

    write_metrics_csv(&path, &sample_table(), true).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert_eq!(
        lines.next(),
        Some("site_url,month,clicks,impressions,ctr,position,queries,pages")
    );
    assert_eq!(
        lines.next(),
        Some("sc-domain:example.com,2024-02,1234,56789,0.0217,11.5,5000,42")
    );
    assert_eq!(
        lines.next(),
        Some("sc-domain:example.com,2024-01,1234,56789,0.0217,11.5,,42"),
        "A missing count is an empty cell, not zero"
    );
}

#[test]
fn test_metrics_csv_without_unique_counts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("report.csv");

    write_metrics_csv(&path, &sample_table(), false).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(
        content.lines().next(),
        Some("site_url,month,clicks,impressions,ctr,position")
    );

    let reloaded = read_metrics_csv(&path).unwrap();
    assert_eq!(reloaded.len(), 3);
    assert!(!reloaded.has_unique_counts());
}

#[test]
fn test_metrics_csv_reload_preserves_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("report.csv");
    let table = sample_table();

    write_metrics_csv(&path, &table, true).unwrap();
    let reloaded = read_metrics_csv(&path).unwrap();

    assert_eq!(reloaded, table);
    assert!(reloaded.get("sc-domain:example.com", "2024-02").unwrap().queries_capped());
}

#[test]
fn test_raw_csv_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("raw.csv");
    let rows = vec![RawQueryRow {
        date: chrono::NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
        query: "rust, csv".to_string(),
        page: "https://www.example.com/csv".to_string(),
        clicks: 3,
        impressions: 40,
        ctr: 0.075,
        position: 2.5,
    }];

    write_raw_csv(&path, &rows).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("date,query,page,clicks,impressions,ctr,position\n"));
    assert!(content.contains("\"rust, csv\""));
    assert_eq!(read_raw_csv(&path).unwrap(), rows);
}

#[test]
fn test_read_metrics_csv_missing_file_is_error() {
    let dir = tempdir().unwrap();
    assert!(read_metrics_csv(&dir.path().join("absent.csv")).is_err());
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

#[test]
fn test_single_site_html_contains_cards_charts_and_table() {
    let table = sample_table();

    let html = render_single_site_html(&table, "sc-domain:example.com", "2024-01 to 2024-02");

    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("Google Organic Queries/Pages Report for sc-domain:example.com"));
    assert!(html.contains("Analysis for the period: 2024-01 to 2024-02"));
    assert!(html.contains("2,468"), "Total clicks across both months");
    assert_eq!(html.matches("<svg").count(), 4);
    assert!(html.contains("5,000+"), "Capped counts are marked");
    assert!(html.contains("<td class=\"num\">–</td>"), "Missing counts are not zero");
    assert!(!html.contains("blog.example.com"));
}

#[test]
fn test_multi_site_html_index_and_missing_sites() {
    let table = sample_table();
    let mut sites = vec![
        "https://blog.example.com/".to_string(),
        "sc-domain:example.com".to_string(),
        "sc-domain:quiet.org".to_string(),
    ];
    sort_sites(&mut sites);

    let html = render_multi_site_html(&table, &sites, "2024-01 to 2024-02");

    assert!(html.contains("Account-Wide Google Organic Performance Report"));
    assert!(html.contains("<strong>example.com</strong>"));
    assert!(html.contains("<li class=\"sub\"><a href=\"#blog-example-com-\">https://blog.example.com/</a></li>"));
    assert!(html.contains("<h2 id=\"sc-domain-quiet-org\">sc-domain:quiet.org</h2>"));
    assert!(html.contains("No data available for this site."));

    let domain = html.find("<h2 id=\"sc-domain-example-com\"").unwrap();
    let blog = html.find("<h2 id=\"blog-example-com-\"").unwrap();
    assert!(domain < blog, "Domain property precedes its subdomains");
}

#[test]
fn test_wrapped_html_lists_narratives() {
    let rows = vec![RawQueryRow {
        date: chrono::NaiveDate::from_ymd_opt(2023, 8, 9).unwrap(),
        query: "<script>".to_string(),
        page: "/escape".to_string(),
        clicks: 7,
        impressions: 70,
        ctr: 0.1,
        position: 1.0,
    }];
    let summary = WrappedSummary::from_rows("sc-domain:example.com", 2023, &rows);

    let html = render_wrapped_html(&summary);

    assert!(html.contains("Search Wrapped 2023 for sc-domain:example.com"));
    assert!(html.contains("Your busiest month for search clicks was August"));
    assert!(html.contains("&lt;script&gt;"));
    assert!(!html.contains("<script>"));
}

#[test]
fn test_line_chart_handles_single_point_and_empty() {
    let svg = line_chart_svg(&["2024-02".to_string()], &[3.0], "#000", false, |v| v.to_string());
    assert!(svg.starts_with("<svg"));
    assert!(svg.contains("<title>2024-02: 3</title>"));

    let empty = line_chart_svg(&[], &[], "#000", true, |v| v.to_string());
    assert!(!empty.contains("<svg"));
}

#[test]
fn test_write_html_creates_directories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a/b/report.html");

    write_html(&path, "<html></html>").unwrap();

    assert_eq!(fs::read_to_string(path).unwrap(), "<html></html>");
}
