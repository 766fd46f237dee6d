//! flashit - transfer a firmware image to a device over the network.
//!
//! The device must be running the flashes bootloader listener. The image is
//! written to the device's inactive bank, which becomes the boot bank once the
//! whole image has been acknowledged.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use flashes_core::{TransferClient, TransferConfig, TransferReport};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::CliError;

#[derive(Parser, Debug)]
#[command(name = "flashit")]
#[command(about = "Transfer a firmware image to a device over the network")]
#[command(version)]
#[command(after_help = "Example:\n  flashit 192.168.1.177 program.bin")]
struct Cli {
    /// Device address, optionally with a port (default 6827)
    address: String,

    /// Binary firmware image
    image: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(&cli).await {
        Ok(report) => {
            output::print_success(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            output::print_failure(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<TransferReport> {
    let image = tokio::fs::File::open(&cli.image)
        .await
        .map_err(|source| CliError::ImageOpen {
            path: cli.image.clone(),
            source,
        })?;
    debug!(path = %cli.image.display(), "Binary file opened");

    let client = TransferClient::connect(&cli.address, TransferConfig::default())
        .await
        .map_err(CliError::Connect)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(output::print_progress(rx));
    let mut client = client.with_progress(tx);
    let result = client.send_image(BufReader::new(image)).await;
    drop(client);

    let line_open = printer.await.unwrap_or(false);
    match result {
        Ok(report) => Ok(report),
        Err(e) => {
            if line_open {
                output::print_block_error();
            }
            Err(CliError::Transfer(e).into())
        }
    }
}
