//! One protocol endpoint: a parser and a serializer bound to a channel.
//!
//! [`SerialLink`] pairs a [`PacketParser`] with an injected [`ByteSink`] so
//! each channel (actuator bus, client connection) carries its own framing
//! state in both directions. Sending builds the raw packet, appends the CRC,
//! byte-stuffs the result, and writes the delimiter followed by the escaped
//! bytes through the sink.

use crate::consts::{MAX_ESCAPED_PACKET_LEN, MAX_PACKET_LEN, MAX_PAYLOAD_LEN_USIZE, START_BYTE};
use crate::crc::crc8;
use crate::framing::escape;
use crate::io::ByteSink;
use crate::parser::PacketParser;
use crate::queue::Command;
use heapless::Vec;
use thiserror::Error;

/// Errors raised while serializing an outbound packet.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    /// The payload exceeds [`crate::consts::MAX_PAYLOAD_LEN`].
    #[error("payload of {0} bytes exceeds the protocol maximum")]
    PayloadTooLarge(usize),
}

/// A bidirectional protocol endpoint on one channel.
#[derive(Debug)]
pub struct SerialLink<W> {
    parser: PacketParser,
    sink: W,
}

impl<W: ByteSink> SerialLink<W> {
    /// Creates a link that receives frames for `address` and transmits
    /// through `sink`.
    pub fn new(address: u8, sink: W) -> Self {
        Self {
            parser: PacketParser::new(address),
            sink,
        }
    }

    /// Feeds one received byte into this channel's parser.
    pub fn feed(&mut self, byte: u8) {
        self.parser.feed(byte);
    }

    /// Feeds a received chunk into this channel's parser.
    pub fn feed_slice(&mut self, bytes: &[u8]) {
        self.parser.feed_slice(bytes);
    }

    /// Decoded commands waiting on this channel.
    pub fn available(&self) -> usize {
        self.parser.available()
    }

    /// Takes the oldest decoded command from this channel.
    pub fn read(&mut self) -> Option<Command> {
        self.parser.read()
    }

    /// Receive-side parser, for diagnostics.
    pub fn parser(&self) -> &PacketParser {
        &self.parser
    }

    /// Serializes and transmits one packet.
    ///
    /// Emits `address, command, length (LE16), payload, crc8`, escaped, with
    /// the leading delimiter written unescaped ahead of the packet body.
    pub fn send_packet(&mut self, addr: u8, cmd: u8, payload: &[u8]) -> Result<(), LinkError> {
        if payload.len() > MAX_PAYLOAD_LEN_USIZE {
            return Err(LinkError::PayloadTooLarge(payload.len()));
        }

        let mut raw: Vec<u8, MAX_PACKET_LEN> = Vec::new();
        // Capacity is sized for the maximum payload, checked above.
        let _ = raw.push(addr);
        let _ = raw.push(cmd);
        let _ = raw.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        let _ = raw.extend_from_slice(payload);
        let checksum = crc8(&raw);
        let _ = raw.push(checksum);

        let mut escaped = [0u8; MAX_ESCAPED_PACKET_LEN];
        let escaped_len = escape(&raw, &mut escaped);
        self.sink.write(&[START_BYTE]);
        self.sink.write(&escaped[..escaped_len]);
        Ok(())
    }

    /// Transmits a packet with no payload.
    pub fn send_command(&mut self, addr: u8, cmd: u8) -> Result<(), LinkError> {
        self.send_packet(addr, cmd, &[])
    }

    /// Transmits a packet with a single payload byte.
    pub fn send_byte(&mut self, addr: u8, cmd: u8, value: u8) -> Result<(), LinkError> {
        self.send_packet(addr, cmd, &[value])
    }
}
