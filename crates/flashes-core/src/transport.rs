//! Transport abstraction for the device server.
//!
//! The server polls an [`Acceptor`] for new clients once per tick and talks to
//! the admitted client through a blocking, timeout-bounded [`Link`]. TCP
//! implementations are provided; tests substitute in-memory ones.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::time::Duration;

use tracing::debug;

/// A connected byte stream to one client.
pub trait Link: Read + Write {
    /// Switch to blocking mode with the given per-operation timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket options cannot be applied.
    fn configure(&mut self, read_timeout: Duration, write_timeout: Duration) -> io::Result<()>;

    /// Close both directions. Failures are logged and otherwise ignored.
    fn close(&mut self);
}

/// Source of new client links.
pub trait Acceptor {
    /// Link type produced by this acceptor.
    type Link: Link;

    /// Accept a pending client without blocking.
    ///
    /// Returns `Ok(None)` when no client is waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener failed.
    fn accept(&mut self) -> io::Result<Option<Self::Link>>;
}

impl Link for TcpStream {
    fn configure(&mut self, read_timeout: Duration, write_timeout: Duration) -> io::Result<()> {
        self.set_nonblocking(false)?;
        self.set_read_timeout(Some(read_timeout))?;
        self.set_write_timeout(Some(write_timeout))?;
        self.set_nodelay(true)
    }

    fn close(&mut self) {
        if let Err(e) = self.shutdown(Shutdown::Both) {
            debug!(error = %e, "Socket shutdown failed");
        }
    }
}

impl Acceptor for TcpListener {
    type Link = TcpStream;

    fn accept(&mut self) -> io::Result<Option<TcpStream>> {
        match TcpListener::accept(self) {
            Ok((stream, _peer)) => Ok(Some(stream)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
