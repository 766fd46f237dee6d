//! Device-side transfer server.
//!
//! `TransferServer` is driven by the device super-loop: [`TransferServer::setup`]
//! once, then [`TransferServer::tick`] repeatedly. Each tick polls for a new
//! client and, while a session is open, processes exactly one block.
//!
//! # State machine
//!
//! ```text
//! Listening --accept--> Receiving --terminator--> Rebooting
//!     ^                     |
//!     +-----abort-----------+
//! Listening --idle window elapsed--> Launched
//! ```
//!
//! `Rebooting` and `Launched` are terminal; on hardware neither returns.

use std::net::{SocketAddr, TcpListener};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::bank::Bank;
use crate::config::TransferConfig;
use crate::error::{ConfigError, ProtocolError, TransferError, TransferResult};
use crate::geometry::ERASED_BYTE;
use crate::platform::FlashPlatform;
use crate::programmer::FlashProgrammer;
use crate::protocol::{read_block, write_ack};
use crate::selector::BankSelector;
use crate::session::Session;
use crate::transport::{Acceptor, Link};

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for a client.
    Listening,
    /// A session is open.
    Receiving,
    /// An image was committed and a reset was triggered.
    Rebooting,
    /// The idle window elapsed and the installed application was started.
    Launched,
}

impl ServerState {
    /// Whether the server will do nothing further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerState::Rebooting | ServerState::Launched)
    }
}

enum BlockOutcome {
    Written,
    Committed(Bank),
}

/// Receives firmware images over an [`Acceptor`] and writes them to the
/// inactive bank.
pub struct TransferServer<P: FlashPlatform, A: Acceptor> {
    platform: P,
    acceptor: Option<A>,
    config: TransferConfig,
    session: Option<Session<A::Link>>,
    state: ServerState,
    idle_since: Instant,
    buffer: Vec<u8>,
}

impl<P: FlashPlatform, A: Acceptor> std::fmt::Debug for TransferServer<P, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferServer")
            .field("state", &self.state)
            .field("session_open", &self.session.is_some())
            .field("listening", &self.acceptor.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P: FlashPlatform> TransferServer<P, TcpListener> {
    /// Bind a non-blocking TCP listener on `address` and build a server on it.
    ///
    /// # Errors
    ///
    /// Returns `Listen` if the socket cannot be bound, or `Config` if the
    /// configuration is invalid for this platform.
    pub fn bind(platform: P, address: &str, config: TransferConfig) -> TransferResult<Self> {
        let listen_err = |source| TransferError::Listen {
            address: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).map_err(listen_err)?;
        listener.set_nonblocking(true).map_err(listen_err)?;
        Ok(Self::new(platform, listener, config)?)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.acceptor.as_ref().and_then(|l| l.local_addr().ok())
    }
}

impl<P: FlashPlatform, A: Acceptor> TransferServer<P, A> {
    /// Build a server.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the block size is
    /// not a multiple of the platform's program unit.
    pub fn new(platform: P, acceptor: A, config: TransferConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let unit = platform.geometry().program_unit() as usize;
        if !config.max_block_size.is_multiple_of(unit) {
            return Err(ConfigError::invalid(format!(
                "max_block_size {} is not a multiple of the {unit}-byte program unit",
                config.max_block_size
            )));
        }
        Ok(Self {
            platform,
            acceptor: Some(acceptor),
            buffer: Vec::with_capacity(config.max_block_size),
            config,
            session: None,
            state: ServerState::Listening,
            idle_since: Instant::now(),
        })
    }

    /// Start listening; the idle window begins now.
    pub fn setup(&mut self) {
        self.setup_at(Instant::now());
    }

    /// Start listening with the idle window beginning at `now`.
    ///
    /// Any open session is closed and its state discarded.
    pub fn setup_at(&mut self, now: Instant) {
        if let Some(mut session) = self.session.take() {
            debug!(address = session.address, "Discarding open session");
            session.link.close();
        }
        self.state = ServerState::Listening;
        self.idle_since = now;
        info!(
            running = %self.platform.running_bank(),
            idle_fallback_ms = ?self.config.idle_fallback_ms,
            "Listening for firmware transfers"
        );
    }

    /// Run one iteration of the super-loop.
    pub fn tick(&mut self) -> ServerState {
        self.tick_at(Instant::now())
    }

    /// Run one iteration of the super-loop at time `now`.
    ///
    /// Accepts at most one pending client. A client arriving while a session
    /// is open is closed without any protocol bytes. With a session open, one
    /// block is read and processed; otherwise the idle window is checked.
    pub fn tick_at(&mut self, now: Instant) -> ServerState {
        if self.state.is_terminal() {
            return self.state;
        }

        self.poll_accept();

        if self.session.is_some() {
            self.service_session(now);
        } else if let Some(window) = self.config.idle_fallback()
            && now.saturating_duration_since(self.idle_since) >= window
        {
            info!(idle_ms = window.as_millis() as u64, "No update client, starting application");
            BankSelector::new(&mut self.platform).jump_to_application();
            self.state = ServerState::Launched;
        }
        self.state
    }

    /// Close any open session and the listener.
    pub fn cleanup(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.link.close();
        }
        self.acceptor = None;
        if !self.state.is_terminal() {
            self.state = ServerState::Listening;
        }
        debug!("Transfer server shut down");
    }

    /// Current state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// The open session, if any.
    pub fn session(&self) -> Option<&Session<A::Link>> {
        self.session.as_ref()
    }

    /// The underlying platform.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Shut down and return the platform.
    pub fn into_platform(mut self) -> P {
        self.cleanup();
        self.platform
    }

    fn poll_accept(&mut self) {
        let Some(acceptor) = self.acceptor.as_mut() else {
            return;
        };
        let mut link = match acceptor.accept() {
            Ok(Some(link)) => link,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                return;
            }
        };

        if self.session.is_some() {
            debug!("Rejecting client, a session is already open");
            link.close();
            return;
        }
        if let Err(e) = link.configure(self.config.read_timeout(), self.config.write_timeout()) {
            warn!(error = %e, "Failed to configure client link");
            link.close();
            return;
        }
        info!("Client connected");
        self.session = Some(Session::new(link));
        self.state = ServerState::Receiving;
    }

    fn service_session(&mut self, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let outcome = process_block(
            &mut self.platform,
            session,
            &mut self.buffer,
            self.config.max_block_size,
        );

        match outcome {
            Ok(BlockOutcome::Written) => {}
            Ok(BlockOutcome::Committed(bank)) => {
                if let Some(mut session) = self.session.take() {
                    info!(
                        %bank,
                        blocks = session.blocks,
                        bytes = session.address,
                        "Image committed, rebooting"
                    );
                    session.link.close();
                }
                std::thread::sleep(self.config.ack_flush_delay());
                self.platform.reboot();
                self.state = ServerState::Rebooting;
            }
            Err(e) => self.abort(now, &e),
        }
    }

    fn abort(&mut self, now: Instant, error: &TransferError) {
        if let Some(mut session) = self.session.take() {
            warn!(
                error = %error,
                address = session.address,
                blocks = session.blocks,
                "Session aborted"
            );
            session.link.close();
        }
        self.state = ServerState::Listening;
        self.idle_since = now;
    }
}

fn process_block<P: FlashPlatform, L: Link>(
    platform: &mut P,
    session: &mut Session<L>,
    buffer: &mut Vec<u8>,
    max_block_size: usize,
) -> TransferResult<BlockOutcome> {
    let len = read_block(&mut session.link, buffer, max_block_size)?;

    if len == 0 {
        let bank = session.target_bank.ok_or(ProtocolError::EmptyImage)?;
        BankSelector::new(platform).select_bank(bank)?;
        if let Err(e) = write_ack(&mut session.link) {
            warn!(error = %e, "Final acknowledgment not delivered, image already committed");
        }
        return Ok(BlockOutcome::Committed(bank));
    }

    let bank = match session.target_bank {
        Some(bank) => bank,
        None => {
            let target = BankSelector::new(platform).active_bank().other();
            info!(%target, "Receiving image");
            session.target_bank = Some(target);
            target
        }
    };

    let unit = platform.geometry().program_unit() as usize;
    buffer.resize(len.next_multiple_of(unit), ERASED_BYTE);

    FlashProgrammer::new(platform).write(session.address, buffer, bank, &mut session.erase_cursor)?;
    session.address = session.address.saturating_add(len as u32);
    session.blocks = session.blocks.saturating_add(1);
    debug!(block = session.blocks, len, address = session.address, "Block written");

    write_ack(&mut session.link)?;
    Ok(BlockOutcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlashError;
    use crate::geometry::FlashGeometry;
    use crate::protocol::write_block;
    use crate::sim::SimulatedFlash;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::io::{self, Cursor, Read, Write};
    use std::rc::Rc;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[derive(Clone, Default)]
    struct Wire {
        sent: Rc<RefCell<Vec<u8>>>,
        closed: Rc<Cell<bool>>,
    }

    impl Wire {
        fn sent(&self) -> Vec<u8> {
            self.sent.borrow().clone()
        }

        fn is_closed(&self) -> bool {
            self.closed.get()
        }
    }

    struct ScriptedLink {
        input: Cursor<Vec<u8>>,
        wire: Wire,
        stall_when_drained: bool,
        writes_allowed: Option<usize>,
    }

    impl ScriptedLink {
        fn new(input: Vec<u8>) -> (Self, Wire) {
            let wire = Wire::default();
            let link = Self {
                input: Cursor::new(input),
                wire: wire.clone(),
                stall_when_drained: false,
                writes_allowed: None,
            };
            (link, wire)
        }

        fn stalling(mut self) -> Self {
            self.stall_when_drained = true;
            self
        }

        fn failing_writes_after(mut self, bytes: usize) -> Self {
            self.writes_allowed = Some(bytes);
            self
        }
    }

    impl Read for ScriptedLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.input.read(buf)?;
            if n == 0 && !buf.is_empty() && self.stall_when_drained {
                return Err(io::Error::from(io::ErrorKind::TimedOut));
            }
            Ok(n)
        }
    }

    impl Write for ScriptedLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.wire.is_closed() {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            if let Some(remaining) = self.writes_allowed.as_mut() {
                if *remaining == 0 {
                    return Err(io::Error::from(io::ErrorKind::ConnectionReset));
                }
                *remaining -= 1;
            }
            self.wire.sent.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Link for ScriptedLink {
        fn configure(&mut self, _read: Duration, _write: Duration) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) {
            self.wire.closed.set(true);
        }
    }

    #[derive(Clone, Default)]
    struct MockAcceptor {
        pending: Rc<RefCell<VecDeque<ScriptedLink>>>,
    }

    impl MockAcceptor {
        fn push(&self, link: ScriptedLink) {
            self.pending.borrow_mut().push_back(link);
        }
    }

    impl Acceptor for MockAcceptor {
        type Link = ScriptedLink;

        fn accept(&mut self) -> io::Result<Option<ScriptedLink>> {
            Ok(self.pending.borrow_mut().pop_front())
        }
    }

    fn blocks(image: &[u8], block_size: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut wire = Vec::new();
        for chunk in image.chunks(block_size) {
            write_block(&mut wire, chunk)?;
        }
        write_block(&mut wire, &[])?;
        Ok(wire)
    }

    fn config() -> Result<TransferConfig, ConfigError> {
        TransferConfig::builder()
            .idle_fallback_ms(Some(5000))
            .ack_flush_delay_ms(0)
            .build()
    }

    fn server(
        flash: SimulatedFlash,
    ) -> Result<(TransferServer<SimulatedFlash, MockAcceptor>, MockAcceptor), ConfigError> {
        let acceptor = MockAcceptor::default();
        let server = TransferServer::new(flash, acceptor.clone(), config()?)?;
        Ok((server, acceptor))
    }

    fn small_flash() -> Result<SimulatedFlash, ConfigError> {
        Ok(SimulatedFlash::new(FlashGeometry::uniform(1024, 8, 4)?))
    }

    fn run_until_terminal_or_idle(
        server: &mut TransferServer<SimulatedFlash, MockAcceptor>,
        now: Instant,
    ) -> ServerState {
        let mut state = server.tick_at(now);
        for _ in 0..64 {
            if state != ServerState::Receiving {
                break;
            }
            state = server.tick_at(now);
        }
        state
    }

    #[test]
    fn test_full_image_commits_inactive_bank() -> Result<(), Box<dyn std::error::Error>> {
        let image: Vec<u8> = (0..2561u32).map(|i| (i % 251) as u8).collect();
        let (mut server, acceptor) = server(small_flash()?)?;
        let (link, wire) = ScriptedLink::new(blocks(&image, 1024)?);
        acceptor.push(link);

        let now = Instant::now();
        server.setup_at(now);
        assert_eq!(run_until_terminal_or_idle(&mut server, now), ServerState::Rebooting);

        assert_eq!(wire.sent(), b"oooo");
        assert!(wire.is_closed());
        let flash = server.into_platform();
        assert_eq!(&flash.bank_data(Bank::B)[..2561], &image[..]);
        assert_eq!(&flash.bank_data(Bank::B)[2561..2564], &[ERASED_BYTE; 3]);
        assert_eq!(flash.boot_config(), Bank::B);
        assert_eq!(flash.running_bank(), Bank::B);
        assert_eq!(flash.reboot_count(), 1);
        assert!(flash.bank_data(Bank::A).iter().all(|b| *b == ERASED_BYTE));
        for sector in 0..3 {
            assert_eq!(flash.erase_count(Bank::B, sector), 1);
        }
        Ok(())
    }

    #[test]
    fn test_running_bank_b_writes_bank_a() -> Result<(), Box<dyn std::error::Error>> {
        let flash = small_flash()?
            .with_running_bank(Bank::B)
            .with_boot_config(Bank::B);
        let (mut server, acceptor) = server(flash)?;
        let (link, _wire) = ScriptedLink::new(blocks(&[7; 8], 1024)?);
        acceptor.push(link);

        let now = Instant::now();
        server.setup_at(now);
        assert_eq!(run_until_terminal_or_idle(&mut server, now), ServerState::Rebooting);
        let flash = server.into_platform();
        assert_eq!(&flash.bank_data(Bank::A)[..8], &[7; 8]);
        assert_eq!(flash.boot_config(), Bank::A);
        Ok(())
    }

    #[test]
    fn test_self_heal_before_choosing_target() -> Result<(), Box<dyn std::error::Error>> {
        let flash = small_flash()?
            .with_running_bank(Bank::A)
            .with_boot_config(Bank::B);
        let (mut server, acceptor) = server(flash)?;
        let (link, _wire) = ScriptedLink::new(blocks(&[1; 4], 1024)?);
        acceptor.push(link.stalling());

        let now = Instant::now();
        server.setup_at(now);
        server.tick_at(now);
        assert_eq!(server.session().and_then(Session::target_bank), Some(Bank::B));
        assert_eq!(server.platform().boot_config(), Bank::A);
        Ok(())
    }

    #[test]
    #[traced_test]
    fn test_terminator_without_data_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let (mut server, acceptor) = server(small_flash()?)?;
        let (link, wire) = ScriptedLink::new(blocks(&[], 1024)?);
        acceptor.push(link);

        let now = Instant::now();
        server.setup_at(now);
        assert_eq!(server.tick_at(now), ServerState::Listening);
        assert!(wire.sent().is_empty());
        assert!(wire.is_closed());
        assert_eq!(server.platform().boot_config(), Bank::A);
        assert_eq!(server.platform().reboot_count(), 0);
        assert!(logs_contain("Session aborted"));
        Ok(())
    }

    #[test]
    fn test_oversized_block_aborts_before_flash() -> Result<(), Box<dyn std::error::Error>> {
        let (mut server, acceptor) = server(small_flash()?)?;
        let mut input = 1025u16.to_le_bytes().to_vec();
        input.extend(vec![0u8; 1025]);
        let (link, wire) = ScriptedLink::new(input);
        acceptor.push(link);

        let now = Instant::now();
        server.setup_at(now);
        assert_eq!(server.tick_at(now), ServerState::Listening);
        assert!(wire.sent().is_empty());
        assert!(server.platform().erase_log().is_empty());
        Ok(())
    }

    #[test]
    fn test_second_client_rejected_while_receiving() -> Result<(), Box<dyn std::error::Error>> {
        let (mut server, acceptor) = server(small_flash()?)?;
        let mut first_input = Vec::new();
        write_block(&mut first_input, &[3; 16])?;
        let (first, first_wire) = ScriptedLink::new(first_input);
        acceptor.push(first.stalling());

        let now = Instant::now();
        server.setup_at(now);
        assert_eq!(server.tick_at(now), ServerState::Receiving);
        assert_eq!(first_wire.sent(), b"o");

        let (second, second_wire) = ScriptedLink::new(blocks(&[9; 4], 1024)?);
        acceptor.push(second);
        server.tick_at(now);
        assert!(second_wire.is_closed());
        assert!(second_wire.sent().is_empty());
        // The first session stalled during that tick and was dropped.
        assert!(first_wire.is_closed());
        assert_eq!(server.state(), ServerState::Listening);
        Ok(())
    }

    #[test]
    fn test_flash_failure_aborts_without_ack() -> Result<(), Box<dyn std::error::Error>> {
        let mut flash = small_flash()?;
        flash.inject_erase_failure(0);
        let (mut server, acceptor) = server(flash)?;
        let (link, wire) = ScriptedLink::new(blocks(&[1; 64], 1024)?);
        acceptor.push(link);

        let now = Instant::now();
        server.setup_at(now);
        assert_eq!(server.tick_at(now), ServerState::Listening);
        assert!(wire.sent().is_empty());
        assert!(server.session().is_none());
        Ok(())
    }

    #[test]
    fn test_commit_failure_keeps_old_bank() -> Result<(), Box<dyn std::error::Error>> {
        let mut flash = small_flash()?;
        flash.inject_commit_failure(true);
        let (mut server, acceptor) = server(flash)?;
        let (link, wire) = ScriptedLink::new(blocks(&[1; 64], 1024)?);
        acceptor.push(link);

        let now = Instant::now();
        server.setup_at(now);
        assert_eq!(run_until_terminal_or_idle(&mut server, now), ServerState::Listening);
        assert_eq!(wire.sent(), b"o");
        assert_eq!(server.platform().boot_config(), Bank::A);
        assert_eq!(server.platform().reboot_count(), 0);
        Ok(())
    }

    #[test]
    fn test_reboots_even_if_final_ack_fails() -> Result<(), Box<dyn std::error::Error>> {
        let (mut server, acceptor) = server(small_flash()?)?;
        let (link, wire) = ScriptedLink::new(blocks(&[5; 12], 1024)?);
        acceptor.push(link.failing_writes_after(1));

        let now = Instant::now();
        server.setup_at(now);
        assert_eq!(run_until_terminal_or_idle(&mut server, now), ServerState::Rebooting);
        assert_eq!(wire.sent(), b"o");
        assert_eq!(server.platform().boot_config(), Bank::B);
        assert_eq!(server.platform().reboot_count(), 1);
        Ok(())
    }

    #[test]
    fn test_unaligned_block_after_short_block_aborts() -> Result<(), Box<dyn std::error::Error>> {
        let (mut server, acceptor) = server(small_flash()?)?;
        let mut input = Vec::new();
        write_block(&mut input, &[1; 6])?;
        write_block(&mut input, &[2; 4])?;
        let (link, wire) = ScriptedLink::new(input);
        acceptor.push(link);

        let now = Instant::now();
        server.setup_at(now);
        assert_eq!(server.tick_at(now), ServerState::Receiving);
        assert_eq!(server.session().map(Session::address), Some(6));
        assert_eq!(server.tick_at(now), ServerState::Listening);
        assert_eq!(wire.sent(), b"o");
        Ok(())
    }

    #[test]
    fn test_idle_fallback_launches_once() -> Result<(), Box<dyn std::error::Error>> {
        let (mut server, _acceptor) = server(small_flash()?)?;
        let start = Instant::now();
        server.setup_at(start);

        assert_eq!(server.tick_at(start + Duration::from_secs(1)), ServerState::Listening);
        assert_eq!(server.tick_at(start + Duration::from_secs(5)), ServerState::Launched);
        assert_eq!(server.tick_at(start + Duration::from_secs(6)), ServerState::Launched);
        assert_eq!(server.platform().jump_count(), 1);
        assert!(server.platform().erase_log().is_empty());
        assert_eq!(server.platform().programmed_units(), 0);
        Ok(())
    }

    #[test]
    fn test_idle_window_restarts_after_session() -> Result<(), Box<dyn std::error::Error>> {
        let (mut server, acceptor) = server(small_flash()?)?;
        let start = Instant::now();
        server.setup_at(start);

        let (link, _wire) = ScriptedLink::new(vec![0x10]);
        acceptor.push(link);
        let aborted_at = start + Duration::from_secs(4);
        assert_eq!(server.tick_at(aborted_at), ServerState::Listening);

        assert_eq!(server.tick_at(start + Duration::from_secs(6)), ServerState::Listening);
        assert_eq!(server.tick_at(aborted_at + Duration::from_secs(5)), ServerState::Launched);
        Ok(())
    }

    #[test]
    fn test_no_idle_fallback_when_disabled() -> Result<(), Box<dyn std::error::Error>> {
        let config = TransferConfig::builder()
            .idle_fallback_ms(None)
            .build()?;
        let mut server = TransferServer::new(small_flash()?, MockAcceptor::default(), config)?;
        let start = Instant::now();
        server.setup_at(start);
        assert_eq!(
            server.tick_at(start + Duration::from_secs(3600)),
            ServerState::Listening
        );
        assert_eq!(server.platform().jump_count(), 0);
        Ok(())
    }

    #[test]
    fn test_block_size_must_match_program_unit() -> Result<(), Box<dyn std::error::Error>> {
        let config = TransferConfig::builder().max_block_size(1022).build()?;
        let result = TransferServer::new(small_flash()?, MockAcceptor::default(), config);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_cleanup_closes_session() -> Result<(), Box<dyn std::error::Error>> {
        let (mut server, acceptor) = server(small_flash()?)?;
        let mut input = Vec::new();
        write_block(&mut input, &[1; 4])?;
        let (link, wire) = ScriptedLink::new(input);
        acceptor.push(link.stalling());

        let now = Instant::now();
        server.setup_at(now);
        server.tick_at(now);
        assert!(server.session().is_some());
        server.cleanup();
        assert!(wire.is_closed());
        assert!(server.session().is_none());
        Ok(())
    }

    #[test]
    fn test_setup_discards_open_session() -> Result<(), Box<dyn std::error::Error>> {
        let (mut server, acceptor) = server(small_flash()?)?;
        let mut input = Vec::new();
        write_block(&mut input, &[1; 4])?;
        let (link, wire) = ScriptedLink::new(input);
        acceptor.push(link.stalling());

        let start = Instant::now();
        server.setup_at(start);
        assert_eq!(server.tick_at(start), ServerState::Receiving);
        assert_eq!(server.session().map(Session::address), Some(4));

        let restart = start + Duration::from_secs(1);
        server.setup_at(restart);
        assert!(server.session().is_none());
        assert!(wire.is_closed());
        assert_eq!(server.state(), ServerState::Listening);

        assert_eq!(server.tick_at(restart + Duration::from_secs(4)), ServerState::Listening);
        assert_eq!(server.tick_at(restart + Duration::from_secs(5)), ServerState::Launched);
        Ok(())
    }

    #[test]
    fn test_program_failure_reported() -> Result<(), Box<dyn std::error::Error>> {
        let mut flash = small_flash()?;
        flash.inject_program_failure(4);
        let (link, _wire) = ScriptedLink::new(blocks(&[1; 8], 1024)?);
        let mut session = Session::new(link);
        let mut buffer = Vec::new();
        let result = process_block(&mut flash, &mut session, &mut buffer, 1024);
        assert!(matches!(
            result,
            Err(TransferError::Flash(FlashError::ProgramFailed { offset: 4, .. }))
        ));
        Ok(())
    }
}
