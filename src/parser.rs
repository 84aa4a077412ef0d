//! Packet parser state machine.
//!
//! One [`PacketParser`] instance is bound to each communication channel
//! (actuator bus, client link) and consumes that channel's raw byte stream
//! one byte at a time. It reconstructs the frame fields, unescapes stuffed
//! bytes inline, validates the CRC, and places accepted frames on its own
//! [`CommandQueue`]. Two parser instances never share mutable state.
//!
//! ## State machine
//!
//! ```text
//! WaitStart -> ReadAddr -> ReadCmd -> ReadLen (lo, hi) -> ReadPayload
//!      ^                                  |                   |
//!      |                                  | len == 0          v
//!      +------------- validate <-------- ReadChecksum <-------+
//! ```
//!
//! Three rules hold in every state:
//!
//! - A [`START_BYTE`] always wins: it resets the per-frame accumulators and
//!   moves to `ReadAddr`. The delimiter is never itself unescaped, which is
//!   what bounds resynchronization after corruption to the next frame.
//! - Outside `WaitStart`, an [`ESCAPE_BYTE`] is consumed and arms the
//!   escape-pending flag; the following byte is XORed with [`ESCAPE_MASK`]
//!   before the state machine sees it.
//! - Each fed byte advances the machine in O(1); the parser never blocks.
//!
//! Frames addressed to another device are discarded silently as soon as the
//! address byte arrives, before any payload is buffered. Size violations and
//! checksum failures are discarded with a diagnostic and counted on the
//! public counters.

use crate::consts::{
    BROADCAST, ESCAPE_BYTE, ESCAPE_MASK, MAX_PAYLOAD_LEN, MAX_PAYLOAD_LEN_USIZE, START_BYTE,
};
use crate::crc::crc8_update;
use crate::queue::{Command, CommandQueue};
use heapless::Vec;
use log::warn;

/// Position of the parser inside the current frame.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum ParserState {
    /// Between frames, waiting for the delimiter.
    #[default]
    WaitStart,
    /// Expecting the address byte.
    ReadAddr,
    /// Expecting the command byte.
    ReadCmd,
    /// Expecting one of the two little-endian length bytes.
    ReadLen,
    /// Accumulating payload bytes.
    ReadPayload,
    /// Expecting the checksum byte.
    ReadChecksum,
}

/// Streaming frame parser bound to one channel.
#[derive(Debug)]
pub struct PacketParser {
    state: ParserState,
    address: u8,
    command: u8,
    length: u16,
    len_bytes_read: u8,
    payload: Vec<u8, MAX_PAYLOAD_LEN_USIZE>,
    checksum: u8,
    crc_acc: u8,
    escape_next: bool,
    queue: CommandQueue,

    /// Frames discarded because the checksum did not match.
    pub crc_failures: u16,

    /// Frames discarded because the declared length exceeded the maximum.
    pub size_violations: u16,
}

impl PacketParser {
    /// Creates a parser that accepts frames addressed to `address` or
    /// [`BROADCAST`].
    pub fn new(address: u8) -> Self {
        Self {
            state: ParserState::WaitStart,
            address,
            command: 0,
            length: 0,
            len_bytes_read: 0,
            payload: Vec::new(),
            checksum: 0,
            crc_acc: 0x00,
            escape_next: false,
            queue: CommandQueue::new(),
            crc_failures: 0,
            size_violations: 0,
        }
    }

    /// The address this parser filters on.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Current state, exposed for diagnostics.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Decoded commands waiting to be read.
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    /// Takes the oldest decoded command off this channel's queue.
    pub fn read(&mut self) -> Option<Command> {
        self.queue.pop()
    }

    /// Commands dropped on queue overflow.
    pub fn dropped(&self) -> u16 {
        self.queue.dropped
    }

    /// Feeds one received byte into the state machine.
    pub fn feed(&mut self, byte: u8) {
        // The delimiter is never escaped and always restarts the frame.
        if byte == START_BYTE {
            self.reset();
            self.state = ParserState::ReadAddr;
            return;
        }

        let byte = if self.state != ParserState::WaitStart {
            if self.escape_next {
                self.escape_next = false;
                byte ^ ESCAPE_MASK
            } else if byte == ESCAPE_BYTE {
                self.escape_next = true;
                return;
            } else {
                byte
            }
        } else {
            byte
        };

        match self.state {
            ParserState::WaitStart => {}

            ParserState::ReadAddr => {
                self.crc_acc = crc8_update(self.crc_acc, byte);
                if byte == self.address || byte == BROADCAST {
                    self.state = ParserState::ReadCmd;
                } else {
                    // Someone else's frame; drop it without a diagnostic.
                    self.reset();
                }
            }

            ParserState::ReadCmd => {
                self.command = byte;
                self.crc_acc = crc8_update(self.crc_acc, byte);
                self.state = ParserState::ReadLen;
            }

            ParserState::ReadLen => {
                self.crc_acc = crc8_update(self.crc_acc, byte);
                if self.len_bytes_read == 0 {
                    self.length = u16::from(byte);
                    self.len_bytes_read = 1;
                } else {
                    self.length |= u16::from(byte) << 8;
                    self.len_bytes_read = 0;
                    if self.length == 0 {
                        self.state = ParserState::ReadChecksum;
                    } else if self.length <= MAX_PAYLOAD_LEN {
                        self.state = ParserState::ReadPayload;
                    } else {
                        warn!("[COM] payload too large: {} bytes", self.length);
                        self.size_violations = self.size_violations.wrapping_add(1);
                        self.reset();
                    }
                }
            }

            ParserState::ReadPayload => {
                self.crc_acc = crc8_update(self.crc_acc, byte);
                if (self.payload.len() as u16) < self.length {
                    // Capacity equals the maximum accepted length, so this
                    // push cannot fail; the bound stays checked regardless.
                    let _ = self.payload.push(byte);
                }
                if self.payload.len() as u16 >= self.length {
                    self.state = ParserState::ReadChecksum;
                }
            }

            ParserState::ReadChecksum => {
                self.checksum = byte;
                self.state = ParserState::WaitStart;
                self.validate();
            }
        }
    }

    /// Feeds a whole received chunk, byte by byte.
    pub fn feed_slice(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.feed(byte);
        }
    }

    fn validate(&mut self) {
        if self.crc_acc == self.checksum {
            if let Some(command) = Command::new(self.command, &self.payload) {
                let _ = self.queue.push(command);
            }
        } else {
            warn!("[COM] checksum failed");
            self.crc_failures = self.crc_failures.wrapping_add(1);
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.state = ParserState::WaitStart;
        self.payload.clear();
        self.length = 0;
        self.len_bytes_read = 0;
        self.crc_acc = 0x00;
        self.escape_next = false;
    }
}
