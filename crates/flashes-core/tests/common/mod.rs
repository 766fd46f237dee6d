//! In-memory transport shared by the flashes-core test suites.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use flashes_core::prelude::*;

/// Bytes the server sent to a [`MemoryLink`], observable after the server owns it.
#[derive(Clone, Default)]
pub struct Wire {
    sent: Rc<RefCell<Vec<u8>>>,
    closed: Rc<Cell<bool>>,
}

impl Wire {
    pub fn sent(&self) -> Vec<u8> {
        self.sent.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

/// A client link whose input is fixed up front.
pub struct MemoryLink {
    input: Cursor<Vec<u8>>,
    wire: Wire,
}

impl MemoryLink {
    pub fn new(input: Vec<u8>) -> (Self, Wire) {
        let wire = Wire::default();
        (
            Self {
                input: Cursor::new(input),
                wire: wire.clone(),
            },
            wire,
        )
    }
}

impl Read for MemoryLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MemoryLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.wire.is_closed() {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.wire.sent.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Link for MemoryLink {
    fn configure(&mut self, _read: Duration, _write: Duration) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.wire.closed.set(true);
    }
}

/// Hands out queued links, one per `accept`.
#[derive(Clone, Default)]
pub struct QueueAcceptor {
    pending: Rc<RefCell<VecDeque<MemoryLink>>>,
}

impl QueueAcceptor {
    pub fn push(&self, link: MemoryLink) {
        self.pending.borrow_mut().push_back(link);
    }
}

impl Acceptor for QueueAcceptor {
    type Link = MemoryLink;

    fn accept(&mut self) -> io::Result<Option<MemoryLink>> {
        Ok(self.pending.borrow_mut().pop_front())
    }
}

/// Encode `image` as blocks of at most `block_size` bytes plus the terminator.
pub fn encode_image(image: &[u8], block_size: usize) -> Vec<u8> {
    let mut wire = Vec::with_capacity(image.len() + 2 * (image.len() / block_size + 2));
    for chunk in image.chunks(block_size) {
        wire.extend_from_slice(&BlockHeader::new(chunk.len() as u16).encode());
        wire.extend_from_slice(chunk);
    }
    wire.extend_from_slice(&BlockHeader::terminator().encode());
    wire
}
