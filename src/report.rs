use crate::aggregate::{CollectionStats, MetricRow, RawQueryRow, SiteMonthTable, WrappedSummary};
use crate::error::ReportError;
use crate::metrics::{Entry, Metrics, build_grid};
use crate::sitekey::{PropertyClass, SiteKey, group_by_root};
use crate::utils::{self, anchor, capped_count, html_escape, thousands};
use console::style;
use csv::{Reader, Writer};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const METRIC_COLUMNS: [&str; 6] = ["site_url", "month", "clicks", "impressions", "ctr", "position"];
pub const UNIQUE_COLUMNS: [&str; 2] = ["queries", "pages"];
pub const RAW_COLUMNS: [&str; 7] = ["date", "query", "page", "clicks", "impressions", "ctr", "position"];

fn create_parent(path: &Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn optional(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// region: CSV

/// Writes one row per (site, month) with unformatted numbers.
///
/// Missing unique counts are written as empty cells, never as zero.
pub fn write_metrics_csv(
    path: &Path,
    table: &SiteMonthTable,
    unique_counts: bool,
) -> Result<(), ReportError> {
    create_parent(path)?;
    let mut writer = Writer::from_path(path)?;
    let mut header = METRIC_COLUMNS.to_vec();
    if unique_counts {
        header.extend(UNIQUE_COLUMNS);
    }
    writer.write_record(&header)?;

    for r in table.rows() {
        let mut record = vec![
            r.site_url.clone(),
            r.month.clone(),
            r.clicks.to_string(),
            r.impressions.to_string(),
            r.ctr.to_string(),
            r.position.to_string(),
        ];
        if unique_counts {
            record.push(optional(r.queries));
            record.push(optional(r.pages));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Loads a CSV written by [`write_metrics_csv`].
pub fn read_metrics_csv(path: &Path) -> Result<SiteMonthTable, ReportError> {
    let mut reader = Reader::from_path(path)?;
    let mut table = SiteMonthTable::new();
    for record in reader.deserialize::<MetricRow>() {
        table.insert(record?);
    }
    Ok(table)
}

pub fn write_raw_csv(path: &Path, rows: &[RawQueryRow]) -> Result<(), ReportError> {
    create_parent(path)?;
    let mut writer = Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    if rows.is_empty() {
        writer.write_record(RAW_COLUMNS)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_raw_csv(path: &Path) -> Result<Vec<RawQueryRow>, ReportError> {
    let mut reader = Reader::from_path(path)?;
    reader
        .deserialize::<RawQueryRow>()
        .map(|r| r.map_err(ReportError::from))
        .collect()
}

// endregion

// region: HTML

const STYLE: &str = r#"
*,*::before,*::after{box-sizing:border-box}
body{margin:0;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,'Helvetica Neue',Arial,sans-serif;background:#f8fafc;color:#1e293b;line-height:1.6}
.container{max-width:1200px;margin:0 auto;padding:24px 16px}
h1{font-size:1.5rem;font-weight:700;margin:0 0 4px}
h2{font-size:1.15rem;font-weight:600;margin:32px 0 12px;padding-bottom:6px;border-bottom:2px solid #e2e8f0}
.subtitle{color:#64748b;font-size:.875rem;margin:0 0 24px}
.cards{display:grid;grid-template-columns:repeat(auto-fit,minmax(180px,1fr));gap:12px;margin-bottom:32px}
.card{background:#fff;border-radius:10px;padding:16px 20px;box-shadow:0 1px 3px rgba(0,0,0,.08)}
.card .label{font-size:.75rem;text-transform:uppercase;letter-spacing:.05em;color:#64748b;margin-bottom:4px}
.card .value{font-size:1.35rem;font-weight:700;color:#0f172a;overflow-wrap:anywhere}
.section{background:#fff;border-radius:10px;padding:24px;box-shadow:0 1px 3px rgba(0,0,0,.08);margin-bottom:24px}
.section h3{margin:0 0 12px;font-size:1rem;font-weight:600}
.charts{display:grid;grid-template-columns:1fr 1fr;gap:24px;margin-bottom:24px}
@media(max-width:768px){.charts{grid-template-columns:1fr}}
table{width:100%;border-collapse:collapse;font-size:.85rem}
th{background:#434343;color:#fff;text-align:left;padding:10px 12px;font-weight:600}
td{padding:8px 12px;border-bottom:1px solid #f1f5f9}
tr:hover td{background:#f8fafc}
td.num{text-align:right;font-variant-numeric:tabular-nums}
.index ul{list-style:none;padding-left:16px}
.index li.sub{padding-left:24px}
.story li{margin-bottom:8px}
.back{font-size:.8rem}
footer{text-align:center;color:#94a3b8;font-size:.75rem;padding:24px 0}
"#;

fn page(title: &str, subtitle: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>{style}</style>
</head>
<body>
<div class="container">
<h1 id="top">{title}</h1>
<p class="subtitle">{subtitle}</p>
{body}
<footer>Generated by gsc-exporter {version}</footer>
</div>
</body>
</html>"#,
        title = html_escape(title),
        subtitle = html_escape(subtitle),
        style = STYLE,
        body = body,
        version = env!("CARGO_PKG_VERSION"),
    )
}

fn card(label: &str, value: &str) -> String {
    format!(
        r#"<div class="card"><div class="label">{}</div><div class="value">{}</div></div>"#,
        html_escape(label),
        html_escape(value)
    )
}

/// Data table for one site's months, formatted for reading.
fn metrics_table(rows: &[&MetricRow], unique_counts: bool) -> String {
    let mut html = String::from("<div style=\"overflow-x:auto\"><table>\n<thead><tr><th>Month</th><th>Clicks</th><th>Impressions</th><th>CTR</th><th>Position</th>");
    if unique_counts {
        html.push_str("<th>Queries</th><th>Pages</th>");
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for r in rows {
        html.push_str(&format!(
            "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td>",
            html_escape(&r.month),
            thousands(r.clicks),
            thousands(r.impressions),
            utils::percent(r.ctr),
            utils::position(r.position),
        ));
        if unique_counts {
            html.push_str(&format!(
                "<td class=\"num\">{}</td><td class=\"num\">{}</td>",
                capped_count(r.queries, r.queries_capped()),
                capped_count(r.pages, r.pages_capped()),
            ));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table></div>");
    html
}

/// A single-series SVG line chart; `invert` puts the lowest value on top.
pub fn line_chart_svg(
    labels: &[String],
    values: &[f64],
    color: &str,
    invert: bool,
    format_value: impl Fn(f64) -> String,
) -> String {
    if values.is_empty() {
        return String::from("<p>No data available.</p>");
    }
    let chart_w = 520.0f64;
    let chart_h = 180.0f64;
    let left = 64.0f64;
    let top = 12.0f64;

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = if (max - min).abs() < f64::EPSILON {
        1.0
    } else {
        max - min
    };
    let step = if values.len() > 1 {
        chart_w / (values.len() - 1) as f64
    } else {
        0.0
    };
    let x_of = |i: usize| {
        if values.len() > 1 {
            left + i as f64 * step
        } else {
            left + chart_w / 2.0
        }
    };
    let y_of = |v: f64| {
        let norm = (v - min) / range;
        if invert {
            top + norm * chart_h
        } else {
            top + chart_h - norm * chart_h
        }
    };

    let mut svg = format!(
        r#"<svg viewBox="0 0 {vw} {vh}" xmlns="http://www.w3.org/2000/svg" style="width:100%;max-width:640px">"#,
        vw = left + chart_w + 24.0,
        vh = top + chart_h + 40.0
    );
    svg.push_str(&format!(
        r##"<line x1="{left}" y1="{top}" x2="{left}" y2="{bottom}" stroke="#cbd5e1"/><line x1="{left}" y1="{bottom}" x2="{right}" y2="{bottom}" stroke="#cbd5e1"/>"##,
        left = left,
        top = top,
        bottom = top + chart_h,
        right = left + chart_w,
    ));
    let (top_label, bottom_label) = if invert { (min, max) } else { (max, min) };
    svg.push_str(&format!(
        r##"<text x="{x}" y="{y1:.1}" font-size="10" fill="#64748b" text-anchor="end">{t}</text><text x="{x}" y="{y2:.1}" font-size="10" fill="#64748b" text-anchor="end">{b}</text>"##,
        x = left - 6.0,
        y1 = top + 4.0,
        y2 = top + chart_h,
        t = html_escape(&format_value(top_label)),
        b = html_escape(&format_value(bottom_label)),
    ));

    let points: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| format!("{:.1},{:.1}", x_of(i), y_of(v)))
        .collect();
    svg.push_str(&format!(
        r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="2"/>"#,
        points.join(" "),
        color
    ));

    let label_every = values.len().div_ceil(8).max(1);
    for (i, &v) in values.iter().enumerate() {
        let label = labels.get(i).map(String::as_str).unwrap_or_default();
        svg.push_str(&format!(
            r#"<circle cx="{x:.1}" cy="{y:.1}" r="3" fill="{color}"><title>{label}: {value}</title></circle>"#,
            x = x_of(i),
            y = y_of(v),
            color = color,
            label = html_escape(label),
            value = html_escape(&format_value(v)),
        ));
        if i % label_every == 0 || i == values.len() - 1 {
            svg.push_str(&format!(
                r##"<text x="{x:.1}" y="{y}" font-size="10" fill="#64748b" text-anchor="middle">{label}</text>"##,
                x = x_of(i),
                y = top + chart_h + 18.0,
                label = html_escape(label),
            ));
        }
    }
    svg.push_str("</svg>");
    svg
}

/// Report for one property: summary cards, trend charts and the data table.
pub fn render_single_site_html(table: &SiteMonthTable, site_url: &str, period: &str) -> String {
    let rows: Vec<&MetricRow> = table.rows_for(site_url).collect();
    let unique_counts = table.has_unique_counts();

    let mut chronological = rows.clone();
    chronological.sort_by(|a, b| a.month.cmp(&b.month));
    let labels: Vec<String> = chronological.iter().map(|r| r.month.clone()).collect();
    let series = |f: fn(&MetricRow) -> f64| chronological.iter().map(|r| f(r)).collect::<Vec<f64>>();

    let total_clicks: u64 = rows.iter().map(|r| r.clicks).sum();
    let total_impressions: u64 = rows.iter().map(|r| r.impressions).sum();
    let overall_ctr = if total_impressions > 0 {
        utils::percent(total_clicks as f64 / total_impressions as f64)
    } else {
        "–".to_string()
    };

    let charts: [(&str, &str, Vec<f64>, bool, fn(f64) -> String); 4] = [
        ("Clicks", "#3b82f6", series(|r| r.clicks as f64), false, thousands_f64),
        ("Impressions", "#ef4444", series(|r| r.impressions as f64), false, thousands_f64),
        ("Average CTR", "#14b8a6", series(|r| r.ctr), false, utils::percent),
        ("Average Position", "#f97316", series(|r| r.position), true, utils::position),
    ];

    let mut body = String::from("<div class=\"cards\">");
    body.push_str(&card("Months", &rows.len().to_string()));
    body.push_str(&card("Total Clicks", &thousands(total_clicks)));
    body.push_str(&card("Total Impressions", &thousands(total_impressions)));
    body.push_str(&card("Overall CTR", &overall_ctr));
    body.push_str("</div>\n<div class=\"charts\">\n");
    for (title, color, values, invert, format_value) in charts {
        body.push_str(&format!(
            "<div class=\"section\"><h3>{}</h3>{}</div>\n",
            title,
            line_chart_svg(&labels, &values, color, invert, format_value)
        ));
    }
    body.push_str("</div>\n<div class=\"section\"><h3>Data Table</h3>\n");
    body.push_str(&metrics_table(&rows, unique_counts));
    body.push_str("</div>");

    page(
        &format!("Google Organic Queries/Pages Report for {site_url}"),
        &format!("Analysis for the period: {period}"),
        &body,
    )
}

fn thousands_f64(value: f64) -> String {
    thousands(value.max(0.0).round() as u64)
}

/// Report for several properties with an index grouped by root domain.
///
/// `sorted_sites` must already be in [`SiteKey`] order.
pub fn render_multi_site_html(table: &SiteMonthTable, sorted_sites: &[String], period: &str) -> String {
    let unique_counts = table.has_unique_counts();

    let mut body = String::from("<div class=\"section index\"><h3>Index</h3><ul>\n");
    for (root, members) in group_by_root(sorted_sites) {
        body.push_str(&format!("<li><strong>{}</strong><ul>\n", html_escape(&root)));
        for site in members {
            let class = if SiteKey::new(site).class == PropertyClass::Subdomain {
                " class=\"sub\""
            } else {
                ""
            };
            body.push_str(&format!(
                "<li{class}><a href=\"#{}\">{}</a></li>\n",
                anchor(site),
                html_escape(site)
            ));
        }
        body.push_str("</ul></li>\n");
    }
    body.push_str("</ul></div>\n");

    for site in sorted_sites {
        body.push_str(&format!(
            "<h2 id=\"{}\">{}</h2>\n",
            anchor(site),
            html_escape(site)
        ));
        let rows: Vec<&MetricRow> = table.rows_for(site).collect();
        if rows.is_empty() {
            body.push_str("<p>No data available for this site.</p>\n");
        } else {
            body.push_str(&metrics_table(&rows, unique_counts));
        }
        body.push_str("<p class=\"back\"><a href=\"#top\">Back to Top</a></p>\n");
    }

    page(
        "Account-Wide Google Organic Performance Report",
        &format!("Analysis for the period: {period}"),
        &body,
    )
}

/// Year-in-review report with key figures and narrative.
pub fn render_wrapped_html(summary: &WrappedSummary) -> String {
    let narratives = summary.narratives();
    let mut body = String::from("<div class=\"cards\">");
    body.push_str(&card("Total Clicks", &thousands(summary.total_clicks)));
    body.push_str(&card("Total Impressions", &thousands(summary.total_impressions)));
    body.push_str(&card("Unique Queries", &thousands(summary.unique_queries as u64)));
    body.push_str(&card("Unique Pages", &thousands(summary.unique_pages as u64)));
    if let Some(top) = &summary.top_page {
        body.push_str(&card("Top Page", &top.key));
    }
    if let Some(top) = &summary.top_query {
        body.push_str(&card("Top Query", &top.key));
    }
    if let Some(month) = summary.busiest_month_name() {
        body.push_str(&card("Busiest Month", month));
    }
    body.push_str("</div>\n<div class=\"section story\"><h3>Your Year in Search</h3><ul>\n");
    for line in narratives.lines() {
        body.push_str(&format!("<li>{}</li>\n", html_escape(line)));
    }
    body.push_str("</ul></div>");

    page(
        &format!("Search Wrapped {} for {}", summary.year, summary.site_url),
        &format!("{}-01-01 to {}-12-31", summary.year, summary.year),
        &body,
    )
}

pub fn write_html(path: &Path, html: &str) -> Result<(), ReportError> {
    create_parent(path)?;
    let mut file = File::create(path)?;
    file.write_all(html.as_bytes())?;
    Ok(())
}

// endregion

// region: Terminal

pub fn announce_csv(path: &Path) {
    println!(
        "\n📊 The CSV report was written to {}",
        style(path.display()).underlined().cyan()
    );
}

pub fn announce_html(path: &Path) {
    println!(
        "🌐 The HTML report was written to {}",
        style(path.display()).underlined().cyan()
    );
}

/// Prints the run counters and, for a single site, the month listing.
pub fn show_monthly_summary(
    table: &SiteMonthTable,
    stats: Option<&CollectionStats>,
    single_site: Option<&str>,
) {
    let mut entries = vec![
        Entry::new("Sites", table.sites().len().to_string()),
        Entry::new("Rows", table.len().to_string()),
        Entry::new("Period", table.period().unwrap_or_default()),
    ];
    if let Some(stats) = stats {
        entries.push(Entry::new("Months without data", stats.empty_windows.to_string()));
        entries.push(Entry::new("Months skipped (errors)", stats.skipped_windows.to_string()));
        entries.push(Entry::new(
            "Sites without permission",
            stats.denied_sites.len().to_string(),
        ));
    }
    println!("\n{}\n", style("Summary:").bold());
    println!("{}", Metrics(entries).build_table());

    if let Some(site) = single_site {
        let unique_counts = table.has_unique_counts();
        let mut header = vec!["Month", "Clicks", "Impressions", "CTR", "Position"];
        if unique_counts {
            header.extend(["Queries", "Pages"]);
        }
        let rows: Vec<Vec<String>> = table
            .rows_for(site)
            .map(|r| {
                let mut cells = vec![
                    r.month.clone(),
                    thousands(r.clicks),
                    thousands(r.impressions),
                    utils::percent(r.ctr),
                    utils::position(r.position),
                ];
                if unique_counts {
                    cells.push(capped_count(r.queries, r.queries_capped()));
                    cells.push(capped_count(r.pages, r.pages_capped()));
                }
                cells
            })
            .collect();
        println!("{}", build_grid(&header, &rows));
    }
}

pub fn show_wrapped_summary(summary: &WrappedSummary) {
    let leader = |l: &Option<crate::aggregate::Leader<String>>| match l {
        Some(l) => format!("{} ({} clicks)", utils::truncate_message(&l.key, 60), thousands(l.clicks)),
        None => "N/A".to_string(),
    };
    let metrics = Metrics(vec![
        Entry::new("Year", summary.year.to_string()),
        Entry::new("Total Clicks", thousands(summary.total_clicks)),
        Entry::new("Total Impressions", thousands(summary.total_impressions)),
        Entry::new("Top Page", leader(&summary.top_page)),
        Entry::new("Top Query", leader(&summary.top_query)),
        Entry::new("Unique Pages", thousands(summary.unique_pages as u64)),
        Entry::new("Unique Queries", thousands(summary.unique_queries as u64)),
        Entry::new(
            "Busiest Month",
            summary.busiest_month_name().unwrap_or("N/A").to_string(),
        ),
    ]);
    println!(
        "\n{} {}\n",
        style("Search Wrapped for").bold(),
        style(&summary.site_url).bold().underlined()
    );
    println!("{}", metrics.build_table());
    println!("{}\n", style("Your year in search:").bold());
    for line in summary.narratives().lines() {
        println!("- {line}");
    }
}

// endregion
