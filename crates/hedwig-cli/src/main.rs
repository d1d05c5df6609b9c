// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
mod commands;
mod format;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use commands::SchemaKind;
use format::{Formatter, OutputFormat};
use hedwig::wiring::BackendWiring;
use hedwig_backend_core::ConsumeBackend;
use hedwig_config::{BackendKind, HedwigFileConfig};

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "hedwig", version, about = "Hedwig publish/subscribe operations CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a hedwig.toml config file. Defaults to built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Re-queue everything in the dead-letter queue back onto the main queue.
    RequeueDeadLetter {
        /// Maximum number of messages to pull per batch.
        #[arg(long, default_value_t = 10)]
        num_messages: u32,

        /// Visibility/ack-deadline timeout in seconds for re-queued pulls.
        /// Defaults to the value in config, or each backend's own default.
        #[arg(long)]
        visibility_timeout: Option<u64>,
    },

    /// Load and validate a config file, reporting errors and warnings.
    ConfigCheck,

    /// Print a JSON schema to stdout.
    Schema {
        /// Which schema to print.
        #[arg(value_enum)]
        kind: SchemaArg,
    },

    /// Validate a message envelope JSON file against structural invariants.
    Validate {
        /// Path to the message JSON file.
        #[arg()]
        file: PathBuf,
    },

    /// Pretty-print a message envelope file.
    Inspect {
        /// Path to the message JSON file.
        #[arg()]
        file: PathBuf,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// Schema kind argument for the `schema` subcommand.
#[derive(Debug, Clone, ValueEnum)]
enum SchemaArg {
    /// `HedwigFileConfig` schema.
    Config,
    /// Message envelope schema.
    Message,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("hedwig=debug")
    } else {
        EnvFilter::new("hedwig=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::RequeueDeadLetter { num_messages, visibility_timeout } => {
            cmd_requeue_dead_letter(cli.config.as_deref(), num_messages, visibility_timeout).await
        }
        Commands::ConfigCheck => cmd_config_check(cli.config.as_deref()),
        Commands::Schema { kind } => cmd_schema(kind),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Inspect { file, format } => cmd_inspect(&file, format),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

fn cmd_config_check(config_path: Option<&std::path::Path>) -> Result<()> {
    let diagnostics = commands::config_check(config_path)?;
    let has_error = diagnostics.iter().any(|d| d.starts_with("error:"));
    for line in &diagnostics {
        println!("{line}");
    }
    if has_error {
        anyhow::bail!("configuration is invalid");
    }
    Ok(())
}

fn cmd_schema(kind: SchemaArg) -> Result<()> {
    let sk = match kind {
        SchemaArg::Config => SchemaKind::Config,
        SchemaArg::Message => SchemaKind::Message,
    };
    println!("{}", commands::schema_json(sk)?);
    Ok(())
}

fn cmd_validate(file: &std::path::Path) -> Result<()> {
    let message = commands::validate_message_file(file)?;
    println!("valid: {} v{}.{}", message.message_type, message.version.major, message.version.minor);
    Ok(())
}

fn cmd_inspect(file: &std::path::Path, format: OutputFormat) -> Result<()> {
    let message = commands::validate_message_file(file)?;
    println!("{}", Formatter::new(format).format_message(&message));
    Ok(())
}

async fn cmd_requeue_dead_letter(
    config_path: Option<&std::path::Path>,
    num_messages: u32,
    visibility_timeout: Option<u64>,
) -> Result<()> {
    let config = hedwig_config::load_config(config_path).context("load config")?;

    if matches!(config.backend, BackendKind::Mock) {
        anyhow::bail!("the mock backend has no dead-letter queue to requeue from");
    }

    let wiring = connect_wiring(&config).await?;
    let handles = hedwig::wiring::build(&config, wiring).await?;
    let backend = handles
        .consume
        .context("this backend has no consume side")?;

    let visibility_timeout_secs = visibility_timeout.or(config.visibility_timeout_secs).unwrap_or(30);
    let requeued = backend
        .requeue_dead_letter(num_messages, visibility_timeout_secs)
        .await
        .context("requeue dead-letter messages")?;

    println!("requeued {requeued} message(s)");
    Ok(())
}

/// Build the transport-specific [`BackendWiring`] for `config.backend`,
/// authenticating against the real transport. Subscriptions beyond the
/// implicit main one are left empty: a DLQ drain only needs the main queue
/// and its derived dead-letter queue/subscription.
async fn connect_wiring(config: &HedwigFileConfig) -> Result<BackendWiring> {
    match config.backend {
        BackendKind::Mock => unreachable!("callers reject the mock backend before wiring"),

        BackendKind::Sqs => {
            let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
            if let Some(region) = config.aws.as_ref().and_then(|aws| aws.region.clone()) {
                loader = loader.region(aws_config::Region::new(region));
            }
            let sdk_config = loader.load().await;
            let region = sdk_config
                .region()
                .map(|r| r.to_string())
                .context("AWS region could not be resolved from config or the default provider chain")?;
            Ok(BackendWiring::Sqs {
                sns_client: aws_sdk_sns::Client::new(&sdk_config),
                sqs_client: aws_sdk_sqs::Client::new(&sdk_config),
                region,
            })
        }

        BackendKind::GooglePubSub => {
            let client_config = google_cloud_pubsub::client::ClientConfig::default()
                .with_auth()
                .await
                .context("authenticate with Google Cloud")?;
            Ok(BackendWiring::Gcp { client_config, subscriptions: Vec::new() })
        }

        BackendKind::Redis => Ok(BackendWiring::Redis { subscriptions: Vec::new() }),
    }
}
