//! Operator-facing progress output

use std::io::{self, Write};

use anyhow::Error;
use colored::*;
use flashes_core::{TransferProgress, TransferReport};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::CliError;

/// Writes one line per data block: `transferring block N... ok`.
pub struct ProgressPrinter<W: Write> {
    out: W,
    line_open: bool,
}

impl<W: Write> ProgressPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            line_open: false,
        }
    }

    pub fn handle(&mut self, event: &TransferProgress) -> io::Result<()> {
        match event {
            TransferProgress::BlockSent { index, .. } => {
                write!(self.out, "transferring block {index}... ")?;
                self.out.flush()?;
                self.line_open = true;
            }
            TransferProgress::BlockAcknowledged { .. } => {
                writeln!(self.out, "{}", "ok".green())?;
                self.line_open = false;
            }
            TransferProgress::TerminatorSent | TransferProgress::Completed(_) => {}
        }
        Ok(())
    }

    /// Close a pending block line with `error`.
    pub fn fail(&mut self) -> io::Result<()> {
        if self.line_open {
            writeln!(self.out, "{}", "error".red())?;
            self.line_open = false;
        }
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

/// Print progress events until the sender is dropped.
///
/// Returns whether a block line was left open.
pub async fn print_progress(mut rx: UnboundedReceiver<TransferProgress>) -> bool {
    let mut printer = ProgressPrinter::new(io::stdout());
    while let Some(event) = rx.recv().await {
        if let Err(e) = printer.handle(&event) {
            tracing::debug!(error = %e, "Failed to write progress");
        }
    }
    printer.line_open
}

/// Finish an open block line after a failure.
pub fn print_block_error() {
    let mut printer = ProgressPrinter {
        out: io::stdout(),
        line_open: true,
    };
    if let Err(e) = printer.fail() {
        tracing::debug!(error = %e, "Failed to write progress");
    }
}

pub fn print_success(report: &TransferReport) {
    tracing::debug!(
        blocks = report.data_blocks,
        bytes = report.bytes,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Transfer complete"
    );
    println!("{}", "Program successfully transferred".green().bold());
}

/// Print a failure in operator terms; the full chain goes to the log.
pub fn print_failure(error: &Error) {
    tracing::debug!(error = ?error, "Transfer failed");
    match error.downcast_ref::<CliError>() {
        Some(cli_error) => {
            println!("{cli_error}");
            if cli_error.is_transfer_failure() {
                println!("{}", "program transfer failed".red().bold());
            }
        }
        None => eprintln!("{} {:#}", "Error:".red().bold(), error),
    }
}
