use unicode_segmentation::UnicodeSegmentation;

/// Truncates a given string to a specified maximum width, appending an ellipsis (`…`)
/// if the string exceeds the specified width. Handles Unicode grapheme clusters properly.
///
/// # Panics
/// Panics if `max_width` is less than 2.
///
/// # Examples
/// ```rust
/// use gsc_exporter::utils::truncate_message;
///
/// assert_eq!(truncate_message("https://www.example.com/", 8), "https:/…");
/// assert_eq!(truncate_message("sc-domain:a.io", 20), "sc-domain:a.io");
/// ```
pub fn truncate_message(message: &str, max_width: usize) -> String {
    assert!(
        max_width >= 2,
        "max_width must be at least 2 to accommodate the ellipsis"
    );

    let graphemes: Vec<&str> = message.graphemes(true).collect();
    if graphemes.len() > max_width {
        format!("{}…", graphemes[..max_width - 1].concat())
    } else {
        message.to_string()
    }
}

/// Formats an integer with comma thousands separators.
///
/// ```rust
/// use gsc_exporter::utils::thousands;
///
/// assert_eq!(thousands(1234567), "1,234,567");
/// ```
pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// A fraction rendered as a two-decimal percentage, e.g. `0.0512` → `5.12%`.
pub fn percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

pub fn position(value: f64) -> String {
    format!("{value:.2}")
}

/// A unique count, marked with `+` when it hit the API ceiling.
pub fn capped_count(value: Option<u64>, capped: bool) -> String {
    match value {
        Some(v) if capped => format!("{}+", thousands(v)),
        Some(v) => thousands(v),
        None => "–".to_string(),
    }
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// In-page anchor id for a property, e.g. `https://www.a.com/` → `www-a-com-`.
pub fn anchor(site_url: &str) -> String {
    site_url
        .replace("https://", "")
        .replace("http://", "")
        .replace([':', '/', '.'], "-")
}
