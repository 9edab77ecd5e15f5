use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, value_parser};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Default values used throughout the project.
pub mod defaults {
    /// Config file picked up from the working directory when `--config` is absent.
    pub const CONFIG_FILE: &str = ".gsc-exporter.toml";

    pub const CLIENT_SECRET_FILE: &str = "client_secret.json";

    pub const TOKEN_FILE: &str = "token.json";

    pub const OUTPUT_DIR: &str = "output";

    pub const API_BASE_URL: &str = "https://www.googleapis.com/webmasters/v3/";

    /// The default timeout for API requests, in seconds.
    pub const TIMEOUT: u64 = 60;

    /// The default user agent header value used for API requests.
    pub const USER_AGENT: &str = concat!("gsc-exporter/", env!("CARGO_PKG_VERSION"));
}

/// Parses a rate limit in the format `requests/time[unit]` into requests per minute.
///
/// ```rust
/// use gsc_exporter::options::parse_rate_limit;
///
/// assert_eq!(parse_rate_limit("1200/1m"), Ok(1200));
/// assert_eq!(parse_rate_limit("10/1s"), Ok(600));
/// ```
pub fn parse_rate_limit(value: &str) -> Result<u32, String> {
    let parts: Vec<&str> = value.split('/').collect();
    if parts.len() != 2 {
        return Err("Rate limit must be in the format 'requests/time[unit]'".to_string());
    }
    let requests: u64 = parts[0]
        .trim()
        .parse()
        .map_err(|_| "Invalid request count".to_string())?;

    let time = parts[1].trim();
    if time.is_empty() {
        return Err("Time value cannot be empty".to_string());
    }
    let unit_start = time.char_indices().last().map_or(0, |(i, _)| i);
    let (amount, unit) = time.split_at(unit_start);
    let seconds_per_unit: u64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err("Time unit must be 's', 'm', or 'h'.".to_string()),
    };
    let amount: u64 = amount
        .parse()
        .map_err(|_| "Invalid time value".to_string())?;
    if amount == 0 {
        return Err("Time value must be greater than 0".to_string());
    }

    let per_minute = requests * 60 / (amount * seconds_per_unit);
    if per_minute < 1 {
        return Err("Ensure the calculated rate is ≥ 1 per minute.".to_string());
    }
    u32::try_from(per_minute).map_err(|_| "Rate limit is too large".to_string())
}

/// Accepts `sc-domain:<domain>` or an absolute http(s) URL.
pub fn parse_site_url(value: &str) -> Result<String, String> {
    if let Some(domain) = value.strip_prefix(crate::sitekey::DOMAIN_PROPERTY_PREFIX) {
        if domain.is_empty() || domain.contains('/') {
            return Err(format!("'{value}' is not a valid domain property."));
        }
        return Ok(value.to_string());
    }
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
            Ok(value.to_string())
        }
        _ => Err(format!(
            "'{value}' is not a valid site. Use 'sc-domain:example.com' or 'https://www.example.com/'."
        )),
    }
}

#[derive(Debug, Parser)]
#[command(version, about, term_width = 80)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    #[arg(
        long,
        global = true,
        help = "Path to a TOML config file (defaults to .gsc-exporter.toml in the working directory)",
        value_hint = ValueHint::FilePath
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "OAuth client secret downloaded from the Google API Console",
        value_hint = ValueHint::FilePath
    )]
    pub client_secret: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "File where the authorized token is stored",
        value_hint = ValueHint::FilePath
    )]
    pub token_file: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "GSC_ACCESS_TOKEN",
        hide_env_values = true,
        help = "Use this bearer token instead of the stored credentials"
    )]
    pub access_token: Option<String>,

    #[arg(
        short = 'o',
        long,
        global = true,
        help = "Directory where reports are written",
        value_hint = ValueHint::DirPath
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Base URL of the search-analytics API",
        value_hint = ValueHint::Url,
        value_parser = value_parser!(Url)
    )]
    pub api_base_url: Option<Url>,

    #[arg(
        short = 't',
        long,
        global = true,
        help = "Timeout (in seconds) for each API request",
        value_parser = value_parser!(u64).range(1..=300)
    )]
    pub request_timeout: Option<u64>,

    #[arg(long, global = true, help = "Custom User-Agent header to be used in requests")]
    pub user_agent: Option<String>,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Maximum API request rate, e.g. '1200/1m' or '20/1s'",
        value_parser = parse_rate_limit
    )]
    pub rate_limit: Option<u32>,

    #[arg(short, long, global = true, help = "Log every fetched page")]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Monthly clicks, impressions, CTR, position and unique query/page counts.
    Monthly(MonthlyArgs),
    /// A year-in-review report for one site.
    Wrapped(WrappedArgs),
    /// Run a report for each site in a list or file.
    Batch(BatchArgs),
    /// List the properties in the account, grouped by root domain.
    Sites,
}

#[derive(Debug, Clone, Args)]
pub struct MonthlyArgs {
    #[arg(
        help = "The property to analyse (e.g. sc-domain:example.com). Omit to run for every site in the account.",
        value_parser = parse_site_url
    )]
    pub site_url: Option<String>,

    #[arg(long, help = "Re-render from the CSV of a previous run if it exists")]
    pub use_cache: bool,

    #[arg(
        short = 'm',
        long,
        help = "Number of complete months to fetch",
        value_parser = value_parser!(u32).range(1..=16)
    )]
    pub months: Option<u32>,

    #[arg(long, help = "Only fetch totals, without unique query and page counts")]
    pub skip_unique_counts: bool,
}

#[derive(Debug, Clone, Args)]
pub struct WrappedArgs {
    #[arg(help = "The property to report on", value_parser = parse_site_url)]
    pub site_url: String,

    #[arg(long, help = "The year to report on. Defaults to the previous year.")]
    pub year: Option<i32>,

    #[arg(long, help = "Re-render from the raw CSV of a previous run if it exists")]
    pub use_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BatchMode {
    Monthly,
    Wrapped,
}

#[derive(Debug, Clone, Args)]
#[command(group(clap::ArgGroup::new("source").required(true).args(["sites", "sites_file"])))]
pub struct BatchArgs {
    #[arg(help = "Site URLs to process", value_parser = parse_site_url)]
    pub sites: Vec<String>,

    #[arg(
        long,
        help = "Text file with one site URL per line; '#' starts a comment",
        value_hint = ValueHint::FilePath
    )]
    pub sites_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = BatchMode::Monthly, help = "Report to run for each site")]
    pub mode: BatchMode,

    #[arg(long, help = "The year for wrapped reports. Defaults to the previous year.")]
    pub year: Option<i32>,

    #[arg(long, help = "Re-render from cached CSV files where they exist")]
    pub use_cache: bool,

    #[arg(long, help = "Only fetch totals in monthly mode")]
    pub skip_unique_counts: bool,
}

/// Reads site URLs from a file, skipping blank lines and `#` comments.
pub fn read_sites_file(path: &Path) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("The sites file '{}' could not be read: {}", path.display(), e))?;
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_site_url)
        .collect()
}

/// Values that may be set in the TOML config file.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub client_secret: Option<String>,
    pub token_file: Option<String>,
    pub output_dir: Option<String>,
    pub api_base_url: Option<String>,
    pub request_timeout: Option<u64>,
    pub user_agent: Option<String>,
    pub rate_limit: Option<String>,
    pub months: Option<u32>,
}

impl ConfigFile {
    /// Loads `path`, or `.gsc-exporter.toml` from the working directory if present.
    ///
    /// An explicit path that does not exist is an error; a missing default file
    /// yields an empty config.
    pub fn load(path: Option<&PathBuf>) -> Result<ConfigFile, String> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(format!("Config file not found: {}", p.display()));
                }
                p.clone()
            }
            None => {
                let default = PathBuf::from(defaults::CONFIG_FILE);
                if !default.exists() {
                    return Ok(ConfigFile::default());
                }
                default
            }
        };
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))
    }
}

fn expand_path(value: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(value).into_owned())
}

fn expand_pathbuf(path: &Path) -> PathBuf {
    expand_path(&path.to_string_lossy())
}

/// Effective settings after merging CLI, config file and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub client_secret: PathBuf,
    pub token_file: PathBuf,
    pub access_token: Option<String>,
    pub output_dir: PathBuf,
    pub api_base_url: Url,
    pub request_timeout: u64,
    pub user_agent: String,
    pub rate_limit: Option<u32>,
    pub months: u32,
}

impl Settings {
    /// CLI values take priority over config file values, which take priority over defaults.
    pub fn resolve(
        global: &GlobalArgs,
        months: Option<u32>,
        config: &ConfigFile,
    ) -> Result<Settings, String> {
        let path_setting = |cli: &Option<PathBuf>, file: &Option<String>, default: &str| match cli {
            Some(p) => expand_pathbuf(p),
            None => expand_path(file.as_deref().unwrap_or(default)),
        };

        let api_base_url = match (&global.api_base_url, &config.api_base_url) {
            (Some(url), _) => url.clone(),
            (None, Some(raw)) => Url::parse(raw)
                .map_err(|e| format!("Invalid api_base_url '{raw}' in config file: {e}"))?,
            (None, None) => Url::parse(defaults::API_BASE_URL).map_err(|e| e.to_string())?,
        };

        let rate_limit = match (global.rate_limit, &config.rate_limit) {
            (Some(rate), _) => Some(rate),
            (None, Some(raw)) => Some(parse_rate_limit(raw)?),
            (None, None) => None,
        };

        let months = months
            .or(config.months)
            .unwrap_or(crate::windows::DEFAULT_MONTHS);
        if !(1..=crate::windows::DEFAULT_MONTHS).contains(&months) {
            return Err(format!("months must be between 1 and 16, got {months}"));
        }

        Ok(Settings {
            client_secret: path_setting(
                &global.client_secret,
                &config.client_secret,
                defaults::CLIENT_SECRET_FILE,
            ),
            token_file: path_setting(&global.token_file, &config.token_file, defaults::TOKEN_FILE),
            access_token: global.access_token.clone().filter(|t| !t.is_empty()),
            output_dir: path_setting(&global.output_dir, &config.output_dir, defaults::OUTPUT_DIR),
            api_base_url,
            request_timeout: global
                .request_timeout
                .or(config.request_timeout)
                .unwrap_or(defaults::TIMEOUT),
            user_agent: global
                .user_agent
                .clone()
                .or_else(|| config.user_agent.clone())
                .unwrap_or_else(|| defaults::USER_AGENT.to_string()),
            rate_limit,
            months,
        })
    }
}
