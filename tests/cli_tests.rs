use chrono::{Datelike, Local};
use gsc_exporter::windows::most_recent_month;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Runs gsc-exporter via `cargo run` against a mock API with a static token.
fn run_exporter(server: &MockServer, output_dir: &Path, args: &[&str]) -> Output {
    let base_url = format!("{}/webmasters/v3/", server.uri());
    Command::new("cargo")
        .args(["run", "--quiet", "--"])
        .args(args)
        .args(["--api-base-url", &base_url, "--output-dir"])
        .arg(output_dir)
        .env("GSC_ACCESS_TOKEN", "test-token")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute gsc-exporter binary")
}

fn current_month_label() -> String {
    most_recent_month(Local::now().date_naive())
}

fn totals_body(clicks: u64) -> serde_json::Value {
    json!({"rows": [{"keys": [], "clicks": clicks, "impressions": clicks * 10, "ctr": 0.1, "position": 4.2}]})
}

#[test]
fn test_cli_help() {
    let output = Command::new("cargo")
        .args(["run", "--quiet", "--", "--help"])
        .output()
        .expect("Failed to execute gsc-exporter binary");

    assert!(output.status.success(), "Help command should succeed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"), "Help should show usage");
    assert!(stdout.contains("monthly"), "Help should list the monthly command");
    assert!(stdout.contains("wrapped"), "Help should list the wrapped command");
    assert!(stdout.contains("batch"), "Help should list the batch command");
    assert!(stdout.contains("sites"), "Help should list the sites command");
    assert!(stdout.contains("--output-dir"), "Help should document --output-dir");
    assert!(stdout.contains("--rate-limit"), "Help should document --rate-limit");
}

#[test]
fn test_cli_version() {
    let output = Command::new("cargo")
        .args(["run", "--quiet", "--", "--version"])
        .output()
        .expect("Failed to execute gsc-exporter binary");

    assert!(output.status.success(), "Version command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("gsc-exporter"), "Version should mention package name");
}

#[test]
fn test_cli_invalid_rate_limit_is_rejected() {
    let output = Command::new("cargo")
        .args(["run", "--quiet", "--", "sites", "--rate-limit", "fast"])
        .output()
        .expect("Failed to execute gsc-exporter binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Rate limit must be in the format"));
}

#[tokio::test]
async fn test_monthly_single_site_writes_csv_and_html() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"/sites/sc-domain:example\.com/searchAnalytics/query$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(totals_body(25)))
        .expect(3)
        .mount(&server)
        .await;
    let out = tempdir().unwrap();

    let output = run_exporter(
        &server,
        out.path(),
        &["monthly", "sc-domain:example.com", "--months", "3", "--skip-unique-counts"],
    );

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stem = format!("account-performance-example-com-{}", current_month_label());
    let csv = fs::read_to_string(out.path().join("example.com").join(format!("{stem}.csv"))).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("site_url,month,clicks,impressions,ctr,position"));
    assert_eq!(lines.count(), 3);
    let html = fs::read_to_string(out.path().join("example.com").join(format!("{stem}.html"))).unwrap();
    assert!(html.contains("Google Organic Queries/Pages Report for sc-domain:example.com"));
}

#[tokio::test]
async fn test_monthly_account_wide_sorts_and_skips_denied_sites() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/webmasters/v3/sites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "siteEntry": [
                {"siteUrl": "https://blog.example.com/"},
                {"siteUrl": "sc-domain:locked.org"},
                {"siteUrl": "sc-domain:example.com"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/sites/sc-domain:locked\.org/"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"example\.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(totals_body(7)))
        .mount(&server)
        .await;
    let out = tempdir().unwrap();

    let output = run_exporter(
        &server,
        out.path(),
        &["monthly", "--months", "2", "--skip-unique-counts"],
    );

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stem = format!("account-performance-account-wide-{}", current_month_label());
    let csv = fs::read_to_string(out.path().join("account").join(format!("{stem}.csv"))).unwrap();
    let sites: Vec<&str> = csv
        .lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap())
        .collect();
    assert_eq!(
        sites,
        vec![
            "sc-domain:example.com",
            "sc-domain:example.com",
            "https://blog.example.com/",
            "https://blog.example.com/"
        ]
    );
    let html = fs::read_to_string(out.path().join("account").join(format!("{stem}.html"))).unwrap();
    assert!(html.contains("No data available for this site."), "Denied site is listed without data");
}

#[tokio::test]
async fn test_monthly_with_unique_counts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"dimensions": ["query"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [
                {"keys": ["a"], "clicks": 1, "impressions": 2, "ctr": 0.5, "position": 1.0},
                {"keys": ["b"], "clicks": 1, "impressions": 2, "ctr": 0.5, "position": 1.0}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"dimensions": ["page"]})))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"rowLimit": 25000})))
        .respond_with(ResponseTemplate::new(200).set_body_json(totals_body(3)))
        .mount(&server)
        .await;
    let out = tempdir().unwrap();

    let output = run_exporter(&server, out.path(), &["monthly", "sc-domain:example.com", "-m", "1"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stem = format!("queries-pages-analysis-example-com-{}", current_month_label());
    let csv = fs::read_to_string(out.path().join("example.com").join(format!("{stem}.csv"))).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("site_url,month,clicks,impressions,ctr,position,queries,pages")
    );
    let row = lines.next().unwrap();
    assert!(row.ends_with(",2,"), "Failed page count is an empty cell: {row}");
}

#[tokio::test]
async fn test_monthly_no_data_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    let out = tempdir().unwrap();

    let output = run_exporter(
        &server,
        out.path(),
        &["monthly", "sc-domain:example.com", "--months", "2", "--skip-unique-counts"],
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No performance data found."));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0, "No artifacts are written");
}

#[tokio::test]
async fn test_monthly_rejected_token_aborts_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    let out = tempdir().unwrap();

    let output = run_exporter(
        &server,
        out.path(),
        &["monthly", "sc-domain:example.com", "--months", "4", "--skip-unique-counts"],
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[ERROR]"));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_monthly_use_cache_skips_the_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let out = tempdir().unwrap();
    let dir = out.path().join("example.com");
    fs::create_dir_all(&dir).unwrap();
    let stem = format!("queries-pages-analysis-example-com-{}", current_month_label());
    fs::write(
        dir.join(format!("{stem}.csv")),
        "site_url,month,clicks,impressions,ctr,position,queries,pages\n\
         sc-domain:example.com,2024-01,10,100,0.1,3.5,5000,\n",
    )
    .unwrap();

    let output = run_exporter(&server, out.path(), &["monthly", "sc-domain:example.com", "--use-cache"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Found cached data"));
    let html = fs::read_to_string(dir.join(format!("{stem}.html"))).unwrap();
    assert!(html.contains("5,000+"));
}

#[tokio::test]
async fn test_wrapped_writes_raw_csv_and_report() {
    let server = MockServer::start().await;
    let year = Local::now().year() - 1;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "startDate": format!("{year}-01-01"),
            "endDate": format!("{year}-12-31"),
            "dimensions": ["date", "query", "page"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [
                {"keys": [format!("{year}-03-01"), "rust", "https://www.example.com/guide"], "clicks": 40, "impressions": 400, "ctr": 0.1, "position": 2.0},
                {"keys": [format!("{year}-07-01"), "cargo", "https://www.example.com/blog"], "clicks": 12, "impressions": 300, "ctr": 0.04, "position": 6.0}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let out = tempdir().unwrap();

    let output = run_exporter(&server, out.path(), &["wrapped", "https://www.example.com/"]);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let dir = out.path().join("example.com");
    let csv = fs::read_to_string(dir.join(format!("gsc-wrapped-raw-data-example-com-{year}.csv"))).unwrap();
    assert_eq!(csv.lines().count(), 3);
    let html = fs::read_to_string(dir.join(format!("gsc-wrapped-report-example-com-{year}.html"))).unwrap();
    assert!(html.contains("Your busiest month for search clicks was March"));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("In "), "Narrative is printed");
}

#[tokio::test]
async fn test_wrapped_failure_reports_no_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&server)
        .await;
    let out = tempdir().unwrap();

    let output = run_exporter(&server, out.path(), &["wrapped", "sc-domain:example.com", "--year", "2023"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No data found for the given site and year."));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_batch_continues_past_sites_without_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"/sites/sc-domain:empty\.org/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/sites/sc-domain:example\.com/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(totals_body(5)))
        .mount(&server)
        .await;
    let out = tempdir().unwrap();

    let output = run_exporter(
        &server,
        out.path(),
        &["batch", "sc-domain:empty.org", "sc-domain:example.com", "--skip-unique-counts"],
    );

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Running for: sc-domain:empty.org"));
    assert!(stdout.contains("Running for: sc-domain:example.com"));
    assert!(out.path().join("example.com").exists());
    assert!(!out.path().join("empty.org").exists());
}

#[tokio::test]
async fn test_sites_lists_grouped_properties() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/webmasters/v3/sites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "siteEntry": [
                {"siteUrl": "https://www.example.com/"},
                {"siteUrl": "sc-domain:alpha.net"},
                {"siteUrl": "sc-domain:example.com"}
            ]
        })))
        .mount(&server)
        .await;
    let out = tempdir().unwrap();

    let output = run_exporter(&server, out.path(), &["sites"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let alpha = stdout.find("sc-domain:alpha.net").unwrap();
    let domain = stdout.find("sc-domain:example.com").unwrap();
    let www = stdout.find("https://www.example.com/").unwrap();
    assert!(alpha < domain && domain < www);
    assert!(stdout.contains("# example.com"));
}
