//! b2-tf-bridge - JSON bridge between an infrastructure-as-code provider
//! and the B2 cloud storage API
//!
//! The provider runs one process per operation:
//!
//! ```text
//! echo '{"bucket_id": "...", "provider_application_key_id": ...}' \
//!     | b2-tf-bridge bucket resource_read
//! ```
//!
//! The process authorizes against B2, runs the operation and prints one
//! JSON object on stdout (exit 0), or prints the error on stderr (exit 1).
//! Logs are JSON on stderr.

mod b2;
mod config;
mod dispatch;
mod errors;
mod keys;
mod resources;
mod shape;

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::dispatch::Dispatcher;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "b2-tf-bridge", version, about)]
struct Args {
    /// Resource kind, e.g. `bucket` or `application_key`
    resource_kind: String,

    /// Operation: data_source_read, resource_create, resource_read,
    /// resource_update or resource_delete
    operation: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(args).await {
        Ok(output) => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout
                .write_all(output.as_bytes())
                .and_then(|_| stdout.flush())
            {
                eprintln!("Error: writing result: {}", e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Request failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<String> {
    // Load configuration from environment and optional config file
    let config = Config::from_env().context("loading configuration")?;
    init_tracing(&config.log_level);
    debug!(?config, "Configuration loaded");

    let api = b2::create_client(&config.client).context("creating B2 client")?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading request from stdin")?;

    let mut dispatcher = Dispatcher::new(api);
    let output = dispatcher
        .run(&args.resource_kind, &args.operation, &line)
        .await?;
    Ok(output)
}

/// JSON logs on stderr; stdout carries only the result
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();
}
