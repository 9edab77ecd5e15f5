use std::error::Error;
use std::process::ExitCode;

use chrono::Local;
use clap::Parser;
use console::style;
use gsc_exporter::auth::{Credentials, StaticToken, TokenStore};
use gsc_exporter::network::{self, SearchConsole};
use gsc_exporter::options::{self, Command};
use gsc_exporter::runner::{self, BatchJob, MonthlyJob, RunStatus, WrappedJob};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "gsc_exporter=debug"
    } else {
        "gsc_exporter=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_with_error(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", style("[ERROR]").red(), message);
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    // Parse terminal arguments.
    let cli = options::Cli::parse();
    init_tracing(cli.global.verbose);

    // Load config file and merge it with the CLI (CLI args take priority).
    let config = options::ConfigFile::load(cli.global.config.as_ref())
        .unwrap_or_else(|e| exit_with_error(e));
    let months = match &cli.command {
        Command::Monthly(args) => args.months,
        _ => None,
    };
    let settings = options::Settings::resolve(&cli.global, months, &config)
        .unwrap_or_else(|e| exit_with_error(e));

    // Build the HTTP client and the API handle. Credentials are only
    // obtained once a command actually needs the API.
    let client = network::build_client(&settings.user_agent, settings.request_timeout)?;
    let credentials = match &settings.access_token {
        Some(token) => Credentials::Static(StaticToken(token.clone())),
        None => Credentials::Stored(TokenStore::open(
            client.clone(),
            settings.token_file.clone(),
            settings.client_secret.clone(),
        )),
    };
    let mut api = SearchConsole::new(client, settings.api_base_url.clone(), credentials)
        .with_rate_limit(settings.rate_limit);

    let today = Local::now().date_naive();
    let output_dir = settings.output_dir.as_path();

    let result = match cli.command {
        Command::Monthly(args) => {
            let job = MonthlyJob {
                site_url: args.site_url,
                use_cache: args.use_cache,
                months: settings.months,
                unique_counts: !args.skip_unique_counts,
            };
            runner::run_monthly(&mut api, output_dir, today, &job).await
        }
        Command::Wrapped(args) => {
            let job = WrappedJob {
                site_url: args.site_url,
                year: args.year.unwrap_or_else(|| runner::previous_year(today)),
                use_cache: args.use_cache,
            };
            runner::run_wrapped(&mut api, output_dir, &job).await
        }
        Command::Batch(args) => {
            let sites = match &args.sites_file {
                Some(path) => options::read_sites_file(path).unwrap_or_else(|e| exit_with_error(e)),
                None => args.sites.clone(),
            };
            let job = BatchJob {
                mode: args.mode,
                year: args.year.unwrap_or_else(|| runner::previous_year(today)),
                months: settings.months,
                use_cache: args.use_cache,
                unique_counts: !args.skip_unique_counts,
            };
            runner::run_batch(&mut api, output_dir, today, &sites, &job).await
        }
        Command::Sites => runner::run_sites(&mut api).await,
    };

    match result {
        Ok(status) => Ok(status.exit_code()),
        Err(e) => {
            error!(error = %e, "Aborting");
            eprintln!("{} {}", style("[ERROR]").red(), e);
            Ok(RunStatus::Failed.exit_code())
        }
    }
}
