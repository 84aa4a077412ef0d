//! Decoded commands and the per-channel command queue.
//!
//! Each parser owns one [`CommandQueue`]: the parser is the producer, and
//! whoever drains the channel (the bus orchestrator or the client dispatch
//! loop) is the consumer. The queue is a fixed-capacity FIFO; when it is
//! full the **newest** command is dropped, so a slow consumer sees the
//! oldest [`CMD_QUEUE_DEPTH`](crate::consts::CMD_QUEUE_DEPTH) commands in
//! arrival order. There is no backpressure toward the sender at this layer.

use crate::consts::{CMD_QUEUE_DEPTH, MAX_PAYLOAD_LEN_USIZE};
use heapless::{Deque, Vec};
use log::warn;

/// One validated frame, reduced to what the application layer consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    /// Wire command code.
    pub command: u8,
    /// Payload bytes, at most [`crate::consts::MAX_PAYLOAD_LEN`] of them.
    pub payload: Vec<u8, MAX_PAYLOAD_LEN_USIZE>,
}

impl Command {
    /// Builds a command, or `None` if `payload` exceeds the protocol bound.
    pub fn new(command: u8, payload: &[u8]) -> Option<Self> {
        Some(Self {
            command,
            payload: Vec::from_slice(payload).ok()?,
        })
    }

    /// The payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Number of payload bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Fixed-capacity FIFO of decoded commands.
pub struct CommandQueue {
    inner: Deque<Command, CMD_QUEUE_DEPTH>,
    /// Commands dropped because the queue was full.
    pub dropped: u16,
}

impl core::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("len", &self.inner.len())
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Deque::new(),
            dropped: 0,
        }
    }

    /// Enqueues `command`, dropping it (and returning `false`) when full.
    pub fn push(&mut self, command: Command) -> bool {
        match self.inner.push_back(command) {
            Ok(()) => true,
            Err(_) => {
                warn!("[COM] command queue full, dropping command");
                self.dropped = self.dropped.wrapping_add(1);
                false
            }
        }
    }

    /// Removes and returns the oldest command.
    pub fn pop(&mut self) -> Option<Command> {
        self.inner.pop_front()
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the queue holds no commands.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(code: u8) -> Command {
        Command::new(code, &[code]).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = CommandQueue::new();
        assert!(queue.push(cmd(1)));
        assert!(queue.push(cmd(2)));
        assert!(queue.push(cmd(3)));
        assert_eq!(queue.pop().unwrap().command, 1);
        assert_eq!(queue.pop().unwrap().command, 2);
        assert_eq!(queue.pop().unwrap().command, 3);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_overflow_drops_newest() {
        let mut queue = CommandQueue::new();
        for code in 0..CMD_QUEUE_DEPTH as u8 {
            assert!(queue.push(cmd(code)));
        }
        assert!(!queue.push(cmd(0x7F)));
        assert_eq!(queue.dropped, 1);
        assert_eq!(queue.len(), CMD_QUEUE_DEPTH);
        for code in 0..CMD_QUEUE_DEPTH as u8 {
            assert_eq!(queue.pop().unwrap().command, code);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_command_rejects_oversized_payload() {
        let payload = [0u8; MAX_PAYLOAD_LEN_USIZE + 1];
        assert!(Command::new(0x01, &payload).is_none());
    }
}
