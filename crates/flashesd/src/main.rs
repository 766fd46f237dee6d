//! flashesd - run the flashes bootloader listener on a host.
//!
//! Flash contents and the boot configuration live in a state directory, so an
//! image sent with `flashit` can be inspected afterwards. A committed image
//! "reboots" the emulated device into the new bank; when no client arrives in
//! the idle window the installed application "starts" and the process exits.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod state;

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use flashes_core::{Bank, FlashGeometry, FlashPlatform, ServerState, TransferConfig, TransferServer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::StateDir;

#[derive(Parser, Debug)]
#[command(name = "flashesd")]
#[command(about = "Emulated dual-bank device accepting firmware over the network")]
#[command(version)]
struct Cli {
    /// Directory holding bank images and boot configuration
    #[arg(long)]
    state_dir: PathBuf,

    /// Listen address (default 0.0.0.0 on the configured port)
    #[arg(long)]
    listen: Option<String>,

    /// JSON transfer configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Flash layout
    #[arg(long, value_enum, default_value_t = GeometryPreset::Stm32f4)]
    geometry: GeometryPreset,

    /// Bank the device starts running from (default: persisted boot bank)
    #[arg(long, value_enum)]
    running_bank: Option<BankArg>,

    /// Pause between super-loop ticks in milliseconds
    #[arg(long, default_value_t = 1)]
    tick_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GeometryPreset {
    /// 1 MiB banks: 4 x 16 KiB, 64 KiB, 7 x 128 KiB
    Stm32f4,
    /// 64 KiB banks of 1 KiB sectors
    Small,
}

impl GeometryPreset {
    fn geometry(self) -> Result<FlashGeometry> {
        Ok(match self {
            GeometryPreset::Stm32f4 => FlashGeometry::stm32f4_dual_bank(),
            GeometryPreset::Small => FlashGeometry::uniform(1024, 64, 4)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BankArg {
    A,
    B,
}

impl From<BankArg> for Bank {
    fn from(arg: BankArg) -> Self {
        match arg {
            BankArg::A => Bank::A,
            BankArg::B => Bank::B,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = load_config(cli.config.as_deref())?;
    let listen = cli
        .listen
        .clone()
        .unwrap_or_else(|| format!("0.0.0.0:{}", config.port));
    let geometry = cli.geometry.geometry()?;
    let state = StateDir::new(&cli.state_dir);
    let mut running = cli.running_bank.map(Bank::from);

    loop {
        let flash = state
            .load(geometry.clone(), running)
            .with_context(|| format!("Failed to load state from {}", state.path().display()))?;
        let mut server = TransferServer::bind(flash, &listen, config.clone())
            .with_context(|| format!("Failed to start listener on {listen}"))?;
        if let Some(addr) = server.local_addr() {
            println!("listening on {addr}");
        }

        server.setup();
        let outcome = run_super_loop(&mut server, Duration::from_millis(cli.tick_ms));
        let flash = server.into_platform();
        state
            .save(&flash)
            .with_context(|| format!("Failed to save state to {}", state.path().display()))?;

        match outcome {
            ServerState::Rebooting => {
                info!(bank = %flash.running_bank(), "Device reset");
                println!("rebooted into bank {}", flash.running_bank());
                running = Some(flash.running_bank());
            }
            _ => {
                println!("started application in bank {}", flash.running_bank());
                return Ok(());
            }
        }
    }
}

fn run_super_loop<P: FlashPlatform>(
    server: &mut TransferServer<P, std::net::TcpListener>,
    pause: Duration,
) -> ServerState {
    loop {
        let state = server.tick();
        if state.is_terminal() {
            return state;
        }
        thread::sleep(pause);
    }
}

fn load_config(path: Option<&Path>) -> Result<TransferConfig> {
    let Some(path) = path else {
        return Ok(TransferConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: TransferConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_defaults() -> TestResult {
        let cli = Cli::try_parse_from(["flashesd", "--state-dir", "/tmp/dev"])?;
        assert_eq!(cli.geometry, GeometryPreset::Stm32f4);
        assert!(cli.listen.is_none());
        assert!(cli.running_bank.is_none());
        Ok(())
    }

    #[test]
    fn parse_running_bank() -> TestResult {
        let cli = Cli::try_parse_from([
            "flashesd",
            "--state-dir",
            "dev",
            "--running-bank",
            "b",
            "--geometry",
            "small",
        ])?;
        assert_eq!(cli.running_bank.map(Bank::from), Some(Bank::B));
        assert_eq!(cli.geometry.geometry()?.bank_size(), 64 * 1024);
        Ok(())
    }

    #[test]
    fn default_config_without_file() -> TestResult {
        assert_eq!(load_config(None)?, TransferConfig::default());
        Ok(())
    }
}
