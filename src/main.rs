use clap::builder::NonEmptyStringValueParser;
use clap::Parser;
use postal_lookup::browser::ChromeSessionProvider;
use postal_lookup::config::{DEFAULT_FORM_URL, DEFAULT_RESULT_MARKER};
use postal_lookup::{AddressQuery, LookupConfig, LookupOutcome, OutputFormat};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Look up a Chilean postal code by address
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Example: postal-lookup 'PUENTE ALTO' 'AVENIDA LAS PERDICES' '3462'")]
struct Args {
    /// Commune, e.g. "PUENTE ALTO"
    #[arg(value_parser = NonEmptyStringValueParser::new())]
    commune: String,

    /// Street, e.g. "AVENIDA LAS PERDICES"
    #[arg(value_parser = NonEmptyStringValueParser::new())]
    street: String,

    /// Street number
    #[arg(value_parser = NonEmptyStringValueParser::new())]
    number: String,

    /// Chrome DevTools host
    #[arg(long, default_value = "localhost")]
    chrome_host: String,

    /// Chrome DevTools port
    #[arg(long, default_value_t = 9222)]
    chrome_port: u16,

    /// Start a private browser instead of attaching to a running one
    #[arg(long)]
    launch: bool,

    /// Browser executable used with --launch
    #[arg(long, default_value = "chromium")]
    chrome_path: PathBuf,

    /// Run the launched browser headless
    #[arg(long)]
    headless: bool,

    /// Address of the postal code form
    #[arg(long, default_value = DEFAULT_FORM_URL)]
    url: String,

    /// Attempts per autocomplete field
    #[arg(long)]
    max_retries: Option<u32>,

    /// Attempts for the number field
    #[arg(long)]
    number_retries: Option<u32>,

    /// Time given to the suggestion list to populate
    #[arg(long)]
    suggestion_delay_ms: Option<u64>,

    #[arg(long)]
    page_timeout_ms: Option<u64>,

    #[arg(long)]
    submit_timeout_ms: Option<u64>,

    #[arg(long)]
    result_timeout_ms: Option<u64>,

    /// Limit on a single DevTools command
    #[arg(long, default_value_t = 30_000)]
    command_timeout_ms: u64,

    /// Where the failure screenshot is written
    #[arg(long, default_value = "error.png")]
    screenshot_path: PathBuf,

    /// Label preceding the code in the result; empty accepts a bare code
    #[arg(long, default_value = DEFAULT_RESULT_MARKER)]
    result_marker: String,

    /// Output format of the result
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> LookupConfig {
        let mut config = LookupConfig {
            form_url: self.url.clone(),
            screenshot_path: self.screenshot_path.clone(),
            ..LookupConfig::default()
        }
        .with_result_marker(Some(self.result_marker.clone()));

        if let Some(retries) = self.max_retries {
            config = config.with_autocomplete_retries(retries);
        }
        if let Some(retries) = self.number_retries {
            config.retries.number = retries;
        }
        if let Some(ms) = self.suggestion_delay_ms {
            config.timing.suggestion_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.page_timeout_ms {
            config.timeouts.page_load = Duration::from_millis(ms);
            config.timeouts.field_ready = Duration::from_millis(ms);
        }
        if let Some(ms) = self.submit_timeout_ms {
            config.timeouts.submit_enabled = Duration::from_millis(ms);
        }
        if let Some(ms) = self.result_timeout_ms {
            config.timeouts.result = Duration::from_millis(ms);
        }
        config
    }

    fn provider(&self) -> ChromeSessionProvider {
        let provider = if self.launch {
            ChromeSessionProvider::launch(&self.chrome_path, self.chrome_port, self.headless)
        } else {
            ChromeSessionProvider::attach(&self.chrome_host, self.chrome_port)
        };
        provider.with_command_timeout(Duration::from_millis(self.command_timeout_ms))
    }
}

fn exit_code(outcome: &LookupOutcome) -> ExitCode {
    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr) // stdout carries only the result
                .with_ansi(false)
                .with_target(false)
                .compact(),
        )
        .with(filter)
        .init();

    let query = match AddressQuery::new(&args.commune, &args.street, &args.number) {
        Ok(query) => query,
        Err(e) => {
            error!(error = %e, "Invalid address");
            return ExitCode::from(2);
        }
    };

    let config = args.config();
    let provider = args.provider();
    info!(url = %config.form_url, "Postal code form");

    let outcome = postal_lookup::run(&query, &config, &provider).await;
    println!("{}", outcome.render(args.format));

    exit_code(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from([
            "postal-lookup",
            "PUENTE ALTO",
            "AVENIDA LAS PERDICES",
            "3462",
            "--chrome-port",
            "9223",
            "--max-retries",
            "2",
            "--format",
            "json",
        ]);

        assert_eq!(args.commune, "PUENTE ALTO");
        assert_eq!(args.street, "AVENIDA LAS PERDICES");
        assert_eq!(args.number, "3462");
        assert_eq!(args.chrome_port, 9223);
        assert_eq!(args.format, OutputFormat::Json);

        let config = args.config();
        assert_eq!(config.retries.commune, 2);
        assert_eq!(config.retries.street, 2);
    }

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["postal-lookup", "a", "b", "1"]);

        assert_eq!(args.chrome_host, "localhost");
        assert_eq!(args.chrome_port, 9222);
        assert!(!args.launch);
        assert_eq!(args.command_timeout_ms, 30_000);
        assert_eq!(args.format, OutputFormat::Text);

        let config = args.config();
        assert_eq!(config.form_url, DEFAULT_FORM_URL);
        assert_eq!(config.result_marker.as_deref(), Some(DEFAULT_RESULT_MARKER));
        assert_eq!(config.screenshot_path, PathBuf::from("error.png"));
    }

    #[test]
    fn test_wrong_argument_count_is_usage_error() {
        assert!(Args::try_parse_from(["postal-lookup", "a", "b"]).is_err());
        assert!(Args::try_parse_from(["postal-lookup", "a", "b", "1", "extra"]).is_err());
        assert!(Args::try_parse_from(["postal-lookup", "", "b", "1"]).is_err());
    }

    #[test]
    fn test_empty_marker_accepts_bare_code() {
        let args = Args::parse_from(["postal-lookup", "a", "b", "1", "--result-marker", ""]);
        assert!(args.config().result_marker.is_none());
    }

    #[test]
    fn test_timeouts_from_flags() {
        let args = Args::parse_from([
            "postal-lookup",
            "a",
            "b",
            "1",
            "--submit-timeout-ms",
            "500",
            "--suggestion-delay-ms",
            "2000",
            "--command-timeout-ms",
            "5000",
        ]);
        assert_eq!(args.command_timeout_ms, 5000);
        let config = args.config();
        assert_eq!(config.timeouts.submit_enabled, Duration::from_millis(500));
        assert_eq!(config.timing.suggestion_delay, Duration::from_millis(2000));
    }
}
