//! expopush CLI: send push notifications and fetch receipts from the terminal.
//!
//! Usage:
//! ```bash
//! # Send every message in a JSON array file
//! expopush send --file messages.json
//!
//! # Send one notification
//! expopush send --to 'ExponentPushToken[xxx]' --title Hello --body World
//!
//! # Look up receipts by ticket id
//! expopush receipts 6a7d...  9f3c...
//! ```
//!
//! The run is printed as JSON: `results` keyed by input index plus the
//! `errors` log. Log verbosity follows `RUST_LOG` (default `warn`).

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use expopush_core::{BatchRun, EngineConfig, ExpoPush, FailurePolicy, PushMessage, RateLimitConfig};
use expopush_http::{HttpPushTransport, HttpTransportConfig, DEFAULT_BASE_URL};
use tracing_subscriber::EnvFilter;

const ACCESS_TOKEN_ENV: &str = "EXPO_ACCESS_TOKEN";

#[derive(Debug, Parser)]
#[command(
    name = "expopush",
    about = "Send Expo push notifications and fetch receipts in batches",
    after_help = "Exit status is 2 when some batches failed.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Send notifications (100 recipients per request)
    Send {
        /// JSON array of push messages
        #[arg(long, conflicts_with = "to", required_unless_present = "to")]
        file: Option<PathBuf>,
        /// Single recipient, repeatable, instead of --file
        #[arg(long)]
        to: Vec<String>,
        /// Title for --to
        #[arg(long, requires = "to")]
        title: Option<String>,
        /// Body for --to
        #[arg(long, requires = "to")]
        body: Option<String>,
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Fetch receipts for ticket ids (1000 ids per request)
    Receipts {
        /// Ticket ids
        #[arg(conflicts_with = "file", required_unless_present = "file")]
        ids: Vec<String>,
        /// JSON array of ticket ids
        #[arg(long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        client: ClientArgs,
    },

    /// Print version
    Version,
}

#[derive(Debug, Args)]
struct ClientArgs {
    /// Access token for projects with enhanced push security
    #[arg(long, env = ACCESS_TOKEN_ENV, hide_env_values = true)]
    token: Option<String>,
    /// API root
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,
    /// Requests in flight
    #[arg(long, default_value_t = EngineConfig::default().concurrency)]
    concurrency: usize,
    /// Requests started per second
    #[arg(long, default_value_t = RateLimitConfig::default().permits)]
    rate: u32,
    /// Skip remaining batches after the first failure
    #[arg(long)]
    fail_fast: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Send {
            file,
            to,
            title,
            body,
            client,
        } => cmd_send(file.as_deref(), to, title, body, &client).await,
        Commands::Receipts { ids, file, client } => cmd_receipts(ids, file.as_deref(), &client).await,
        Commands::Version => {
            println!("expopush {}", env!("CARGO_PKG_VERSION"));
            Ok(true)
        }
    };

    match result {
        Ok(true) => {}
        // Partial failure: output was printed, but some batches failed.
        Ok(false) => process::exit(2),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

async fn cmd_send(
    file: Option<&Path>,
    to: Vec<String>,
    title: Option<String>,
    body: Option<String>,
    args: &ClientArgs,
) -> Result<bool, String> {
    let messages = match file {
        Some(path) => read_json(path)?,
        None => vec![single_message(to, title, body)],
    };

    let client = build_client(args)?;
    tracing::info!(messages = messages.len(), transport = client.transport_name(), "sending");
    let run = client
        .send_notifications(&messages)
        .await
        .map_err(|e| e.to_string())?;
    print_run(&run)
}

async fn cmd_receipts(ids: Vec<String>, file: Option<&Path>, args: &ClientArgs) -> Result<bool, String> {
    let ids: Vec<String> = match file {
        Some(path) => read_json(path)?,
        None => ids,
    };
    if ids.is_empty() {
        return Err("at least one receipt id is required".into());
    }

    let client = build_client(args)?;
    let run = client.get_receipts(&ids).await.map_err(|e| e.to_string())?;
    print_run(&run)
}

fn single_message(to: Vec<String>, title: Option<String>, body: Option<String>) -> PushMessage {
    let mut message = PushMessage::to_tokens(to);
    if let Some(title) = title {
        message = message.with_title(title);
    }
    if let Some(body) = body {
        message = message.with_body(body);
    }
    message
}

fn engine_config(args: &ClientArgs) -> EngineConfig {
    EngineConfig {
        concurrency: args.concurrency,
        rate_limit: RateLimitConfig::per_second(args.rate),
        failure_policy: if args.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::CollectAll
        },
    }
}

fn build_client(args: &ClientArgs) -> Result<ExpoPush, String> {
    let http = HttpTransportConfig {
        base_url: args.base_url.clone(),
        access_token: args.token.clone(),
        ..HttpTransportConfig::default()
    };
    let transport = HttpPushTransport::new(http).map_err(|e| e.to_string())?;
    ExpoPush::with_config(Arc::new(transport), engine_config(args)).map_err(|e| e.to_string())
}

fn print_run<R: serde::Serialize>(run: &BatchRun<R>) -> Result<bool, String> {
    let json = serde_json::to_string_pretty(run).map_err(|e| e.to_string())?;
    println!("{json}");
    if run.has_errors() {
        eprintln!("{} batch error(s); see \"errors\" for the affected index ranges", run.errors.len());
    }
    Ok(!run.has_errors())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let content = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| format!("{}: {e}", path.display()))
}
