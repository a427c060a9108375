// Licensed under the Apache-2.0 license

//! Shared types for the software I2C engine: errors, port identifiers,
//! message descriptors and the completion-callback contract.

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

/// Longest message payload the engine will copy into its own storage.
pub const MAX_MSG_LEN: usize = 32;
/// A transfer chains at most this many messages.
pub const MAX_MSGS: usize = 2;
/// Number of physical input ports served by the engine.
pub const PORT_COUNT: usize = 4;

/// Completion result handed to the bus adapter: success.
pub const XFER_OK: i32 = 0;
/// Completion result: the slave left a byte unacknowledged.
pub const XFER_NO_ACK: i32 = -1;

/// Engine error kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// Engine not initialized yet.
    NotReady,
    /// Port already requested, transfer already running, or vector owner
    /// declined to yield.
    Busy,
    /// Unrequested port, too many messages, or over-long payload.
    InvalidArgument,
    /// Slave did not acknowledge.
    NoAck,
    /// Caller bug: releasing a vector it does not currently own. Logged,
    /// non-fatal.
    Misuse,
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Error::NoAck => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            _ => ErrorKind::Other,
        }
    }
}

/// Physical input port identifiers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortId {
    In1,
    In2,
    In3,
    In4,
}

impl PortId {
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            PortId::In1 => 0,
            PortId::In2 => 1,
            PortId::In3 => 2,
            PortId::In4 => 3,
        }
    }

    #[must_use]
    pub fn mask(self) -> u32 {
        1 << self.index()
    }
}

/// Message direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dir {
    Write,
    Read,
}

/// One I2C message as handed in by the bus adapter.
///
/// `addr` is a 7-bit address; the engine shifts in the R/W flag itself.
pub struct Message<'a> {
    pub addr: u8,
    pub dir: Dir,
    pub data: &'a mut [u8],
}

/// Completion callback: `(result, token)`. `result` is [`XFER_OK`] on
/// success and negative ([`XFER_NO_ACK`]) when the slave nacked. Invoked
/// from ordinary-interrupt context; must not block.
pub type CompleteFn = fn(result: i32, token: usize);

/// Engine-owned copy of one message.
///
/// The tick handler must never touch caller memory that could move or be
/// freed mid-transfer, so payloads are copied in here at `start_xfer` time.
/// For reads, `user` keeps the caller's buffer pointer so the companion
/// handler can copy the received bytes back before completion fires.
pub(crate) struct MsgSlot {
    pub addr: u8,
    pub dir: Dir,
    pub data: heapless::Vec<u8, MAX_MSG_LEN>,
    pub user: *mut u8,
}

impl MsgSlot {
    pub(crate) const fn empty() -> Self {
        Self {
            addr: 0,
            dir: Dir::Write,
            data: heapless::Vec::new(),
            user: core::ptr::null_mut(),
        }
    }
}
