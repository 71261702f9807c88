//! SpecNet node binary.
//!
//! ```bash
//! # Place a request and run one speculative decoding session in-process
//! RUST_LOG=info cargo run --bin specnet-node -- demo --max-tokens 48 --draft-error-every 4
//!
//! # Print the effective configuration (file + flags) as JSON
//! cargo run --bin specnet-node -- --config node.json --heartbeat-timeout 10 config
//! ```

mod demo;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use specnet_types::config::NodeConfig;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "specnet-node",
    version = env!("CARGO_PKG_VERSION"),
    about   = "SpecNet: distributed speculative decoding router"
)]
struct Cli {
    /// JSON config file. Missing fields use defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seconds of heartbeat silence before a node is dropped.
    #[arg(long, global = true)]
    heartbeat_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register demo nodes, place a request and run a session against
    /// deterministic draft/target models.
    Demo {
        /// Model id used for placement.
        #[arg(long, default_value = "demo-model")]
        model: String,

        /// Prompt token ids, comma separated.
        #[arg(long, value_delimiter = ',', default_value = "1,2,3")]
        prompt: Vec<u32>,

        #[arg(long)]
        max_tokens: Option<usize>,

        #[arg(long)]
        draft_tokens: Option<usize>,

        /// Make every n-th drafted position wrong (0 = perfect draft).
        #[arg(long, default_value_t = 4)]
        draft_error_every: usize,
    },

    /// Print the effective configuration as JSON.
    Config,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Default log level: INFO. Override with RUST_LOG=specnet_registry=debug etc.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli    = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Demo { model, prompt, max_tokens, draft_tokens, draft_error_every } => {
            let opts = demo::DemoOptions {
                model,
                prompt,
                max_tokens,
                draft_tokens,
                draft_error_every,
            };
            tokio::select! {
                summary = demo::run(config, opts) => {
                    let summary = summary?;
                    info!(
                        request_id = %summary.request_id,
                        tokens     = summary.total_tokens,
                        rounds     = summary.speculation_rounds,
                        drafted    = summary.draft_tokens_generated,
                        accepted   = summary.draft_tokens_accepted,
                        state      = %summary.state,
                        "DONE acceptance={:.1}% in {:.2} ms",
                        summary.acceptance_rate * 100.0,
                        summary.generation_time_ms
                    );
                    println!("{}", serde_json::to_string_pretty(&summary.output_tokens)?);
                    Ok(())
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C, shutting down");
                    Ok(())
                }
            }
        }
    }
}

/// Config file (if any), then CLI overrides.
fn load_config(cli: &Cli) -> Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None       => NodeConfig::default(),
    };
    if let Some(secs) = cli.heartbeat_timeout {
        config.router.heartbeat_timeout_secs = secs;
    }
    Ok(config)
}
