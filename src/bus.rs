//! Bus arbitration and peer transaction orchestration.
//!
//! [`ActuatorBus`] owns everything that touches the shared half-duplex wire:
//! the actuator-channel [`SerialLink`], the raw byte source, the channel
//! selector, and the delay provider that paces reply polling. Exclusive
//! access to the whole object **is** bus exclusion — wrap it in a
//! [`crate::shared::SharedBus`] and every closure run through
//! [`crate::shared::with_bus`] executes atomically with respect to the other
//! context.
//!
//! Two activities compete for the bus:
//!
//! - The **status poll** ([`ActuatorBus::poll_step`]): one STATUS
//!   request/reply per call, rotating through the four actuator addresses.
//!   A reply updates [`RobotPosition`]/[`RobotStatus`]; a timeout logs the
//!   peer as disconnected. Either way the rotation advances, so one dead
//!   peer never stalls the loop.
//! - **Command transactions** ([`ActuatorBus::estop`],
//!   [`ActuatorBus::load_trajectory`] and the composites built on them):
//!   select the target's channel, send, then poll incoming bytes until an
//!   ACK or NACK for the exchange arrives or the timeout window closes.
//!
//! Every transaction is bounded by [`REPLY_TIMEOUT_MS`]; failures come back
//! as [`TransactionError`] values, never as panics, and leave the bus ready
//! for the next transaction.

use crate::consts::{
    ACTUATOR_1, ACTUATOR_ADDRESSES, BROADCAST, CMD_ACK, CMD_ESTOP, CMD_EXEC_TRAJ, CMD_LOAD_TRAJ,
    CMD_NACK, CMD_STATUS, MASTER, REPLY_POLL_INTERVAL_MS, REPLY_TIMEOUT_MS, STATUS_REPLY_LEN,
    mux_channel,
};
use crate::io::{ByteSink, ByteSource, ChannelSelector};
use crate::link::{LinkError, SerialLink};
use crate::robot::{RobotPosition, RobotStatus, read_f32_le};
use crate::trajectory::{ActuatorTrajectory, RobotTrajectory};
use core::convert::Infallible;
use embedded_hal::delay::DelayNs;
use log::{debug, warn};
use thiserror::Error;

/// Failure modes of a peer transaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    /// The peer answered NACK.
    #[error("peer 0x{addr:02x} rejected the request")]
    Nack {
        /// Address of the rejecting peer.
        addr: u8,
    },
    /// No ACK or NACK arrived inside the timeout window.
    #[error("no reply from peer 0x{addr:02x}")]
    Timeout {
        /// Address of the unresponsive peer.
        addr: u8,
    },
    /// The request could not be serialized.
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Owner of the shared actuator bus and its derived robot state.
#[derive(Debug)]
pub struct ActuatorBus<R, W, M, D> {
    link: SerialLink<W>,
    source: R,
    selector: M,
    delay: D,
    position: RobotPosition,
    status: RobotStatus,
    poll_cursor: usize,
    /// Poll cycles that ended in a timeout, across all peers.
    pub disconnects: u16,
}

impl<R, W, M, D> ActuatorBus<R, W, M, D>
where
    R: ByteSource,
    W: ByteSink,
    M: ChannelSelector,
    D: DelayNs,
{
    /// Creates a bus endpoint speaking as [`MASTER`].
    pub fn new(source: R, sink: W, selector: M, delay: D) -> Self {
        Self {
            link: SerialLink::new(MASTER, sink),
            source,
            selector,
            delay,
            position: RobotPosition::new(),
            status: RobotStatus::new(),
            poll_cursor: 0,
            disconnects: 0,
        }
    }

    /// Last polled joint angles.
    pub fn position(&self) -> RobotPosition {
        self.position
    }

    /// Last polled actuator status codes.
    pub fn status(&self) -> RobotStatus {
        self.status
    }

    /// Drains every pending byte from the source into the parser.
    fn pump(&mut self) {
        while let Ok(byte) = self.source.read_byte() {
            self.link.feed(byte);
        }
    }

    /// Checks the queue for an ACK/NACK belonging to the exchange in flight.
    ///
    /// Unrelated frames (late STATUS replies, FINISHED notifications) are
    /// consumed and ignored.
    fn poll_reply(&mut self) -> nb::Result<bool, Infallible> {
        while let Some(reply) = self.link.read() {
            match reply.command {
                CMD_ACK => return Ok(true),
                CMD_NACK => return Ok(false),
                other => debug!("[BUS] ignoring frame 0x{:02x} while awaiting reply", other),
            }
        }
        Err(nb::Error::WouldBlock)
    }

    /// Sends one addressed request and waits for its ACK/NACK.
    fn transact(&mut self, addr: u8, cmd: u8, payload: &[u8]) -> Result<(), TransactionError> {
        self.selector.select(mux_channel(addr));
        self.link.send_packet(addr, cmd, payload)?;
        let mut elapsed = 0;
        while elapsed < REPLY_TIMEOUT_MS {
            self.pump();
            match self.poll_reply() {
                Ok(true) => return Ok(()),
                Ok(false) => return Err(TransactionError::Nack { addr }),
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(never)) => match never {},
            }
            self.delay.delay_ms(REPLY_POLL_INTERVAL_MS);
            elapsed += REPLY_POLL_INTERVAL_MS;
        }
        warn!("[BUS] request 0x{:02x} to 0x{:02x} timed out", cmd, addr);
        Err(TransactionError::Timeout { addr })
    }

    /// Emergency-stops a single actuator.
    pub fn estop(&mut self, addr: u8) -> Result<(), TransactionError> {
        self.transact(addr, CMD_ESTOP, &[])
    }

    /// Emergency-stops all polled actuators in address order.
    ///
    /// Stops at the first failing peer and reports that peer's error.
    pub fn estop_all(&mut self) -> Result<(), TransactionError> {
        for addr in ACTUATOR_ADDRESSES {
            self.estop(addr)?;
        }
        Ok(())
    }

    /// Loads a trajectory into a single actuator.
    pub fn load_trajectory(
        &mut self,
        addr: u8,
        trajectory: &ActuatorTrajectory,
    ) -> Result<(), TransactionError> {
        self.transact(addr, CMD_LOAD_TRAJ, &trajectory.to_wire())
    }

    /// Loads a robot trajectory into every actuator, then starts it.
    ///
    /// Per-actuator loads short-circuit on the first failure. Only after all
    /// four succeed is a single EXEC_TRAJ broadcast sent (unanswered, no
    /// channel re-select: the transmit line reaches every peer) to begin
    /// synchronized motion.
    pub fn run_trajectory(&mut self, trajectory: &RobotTrajectory) -> Result<(), TransactionError> {
        for (index, addr) in ACTUATOR_ADDRESSES.iter().enumerate() {
            self.load_trajectory(*addr, trajectory.actuator(index))?;
        }
        self.link.send_command(BROADCAST, CMD_EXEC_TRAJ)?;
        Ok(())
    }

    /// Runs one status-poll cycle against the next actuator in the rotation.
    ///
    /// Sends STATUS, waits for the matching reply (status byte plus
    /// little-endian `f32` joint angle), and updates the robot state. A
    /// timeout is logged as a disconnect and the rotation moves on; the peer
    /// is polled again next time around.
    pub fn poll_step(&mut self) -> Result<(), TransactionError> {
        let addr = ACTUATOR_ADDRESSES[self.poll_cursor];
        self.poll_cursor = (self.poll_cursor + 1) % ACTUATOR_ADDRESSES.len();

        self.selector.select(mux_channel(addr));
        self.link.send_command(addr, CMD_STATUS)?;

        let mut elapsed = 0;
        while elapsed < REPLY_TIMEOUT_MS {
            self.pump();
            while let Some(reply) = self.link.read() {
                if reply.command == CMD_STATUS && self.apply_status(addr, reply.payload()) {
                    return Ok(());
                }
            }
            self.delay.delay_ms(REPLY_POLL_INTERVAL_MS);
            elapsed += REPLY_POLL_INTERVAL_MS;
        }
        warn!("[BUS] actuator 0x{:02x} disconnected", addr);
        self.disconnects = self.disconnects.wrapping_add(1);
        Err(TransactionError::Timeout { addr })
    }

    fn apply_status(&mut self, addr: u8, payload: &[u8]) -> bool {
        if payload.len() < STATUS_REPLY_LEN {
            warn!("[BUS] malformed STATUS reply from 0x{:02x}", addr);
            return false;
        }
        let index = (addr - ACTUATOR_1) as usize;
        if let Some(angle) = read_f32_le(&payload[1..]) {
            self.status.set_code(index, payload[0]);
            self.position.set_joint(index, angle);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{ACTUATOR_2, MAX_ESCAPED_PACKET_LEN, START_BYTE, STATUS_IDLE};
    use crate::crc::crc8;
    use crate::framing::{escape, unescape};
    use core::cell::RefCell;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Serializes a frame the way a peer would address the controller.
    fn reply(cmd: u8, payload: &[u8]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.push(MASTER);
        raw.push(cmd);
        raw.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        raw.extend_from_slice(payload);
        raw.push(crc8(&raw));
        let mut escaped = [0u8; MAX_ESCAPED_PACKET_LEN];
        let n = escape(&raw, &mut escaped);
        let mut wire = vec![START_BYTE];
        wire.extend_from_slice(&escaped[..n]);
        wire
    }

    /// Counts every nanosecond the bus sleeps while waiting for replies.
    #[derive(Debug, Default)]
    struct CountingDelay {
        total_ns: RefCell<u64>,
    }

    impl DelayNs for &CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            *self.total_ns.borrow_mut() += u64::from(ns);
        }
    }

    struct Harness {
        rx: RefCell<VecDeque<u8>>,
        tx: RefCell<Vec<u8>>,
        channels: RefCell<Vec<u8>>,
    }

    impl Harness {
        fn new(rx_bytes: &[u8]) -> Self {
            Self {
                rx: RefCell::new(rx_bytes.iter().copied().collect()),
                tx: RefCell::new(Vec::new()),
                channels: RefCell::new(Vec::new()),
            }
        }

        fn bus(
            &self,
        ) -> ActuatorBus<
            impl ByteSource<Error = Infallible> + '_,
            impl ByteSink + '_,
            impl ChannelSelector + '_,
            NoopDelay,
        > {
            ActuatorBus::new(
                || -> nb::Result<u8, Infallible> {
                    self.rx.borrow_mut().pop_front().ok_or(nb::Error::WouldBlock)
                },
                |chunk: &[u8]| self.tx.borrow_mut().extend_from_slice(chunk),
                |channel: u8| self.channels.borrow_mut().push(channel),
                NoopDelay::new(),
            )
        }

        /// Splits the transmitted byte stream back into raw frames.
        ///
        /// Safe because escaped frame bodies never contain a raw delimiter.
        fn sent_frames(&self) -> Vec<(u8, u8, Vec<u8>)> {
            let tx = self.tx.borrow();
            let mut frames = Vec::new();
            for body in tx.split(|&b| b == START_BYTE).filter(|c| !c.is_empty()) {
                let mut raw = [0u8; MAX_ESCAPED_PACKET_LEN];
                let n = unescape(body, &mut raw).unwrap();
                let raw = &raw[..n];
                let len = u16::from_le_bytes([raw[2], raw[3]]) as usize;
                assert_eq!(raw.len(), len + 5);
                assert_eq!(crc8(&raw[..len + 4]), raw[len + 4]);
                frames.push((raw[0], raw[1], raw[4..4 + len].to_vec()));
            }
            frames
        }
    }

    #[test]
    fn test_estop_acked() {
        let harness = Harness::new(&reply(CMD_ACK, &[]));
        let mut bus = harness.bus();
        assert_eq!(bus.estop(ACTUATOR_1), Ok(()));
        assert_eq!(*harness.channels.borrow(), vec![0]);
        let sent = harness.sent_frames();
        assert_eq!(sent, vec![(ACTUATOR_1, CMD_ESTOP, Vec::new())]);
    }

    #[test]
    fn test_estop_nacked() {
        let harness = Harness::new(&reply(CMD_NACK, &[]));
        let mut bus = harness.bus();
        assert_eq!(
            bus.estop(ACTUATOR_2),
            Err(TransactionError::Nack { addr: ACTUATOR_2 }),
        );
        assert_eq!(*harness.channels.borrow(), vec![1]);
    }

    #[test]
    fn test_transaction_timeout_duration() {
        let harness = Harness::new(&[]);
        let delay = CountingDelay::default();
        let mut bus = ActuatorBus::new(
            || -> nb::Result<u8, Infallible> {
                harness.rx.borrow_mut().pop_front().ok_or(nb::Error::WouldBlock)
            },
            |chunk: &[u8]| harness.tx.borrow_mut().extend_from_slice(chunk),
            |channel: u8| harness.channels.borrow_mut().push(channel),
            &delay,
        );
        assert_eq!(
            bus.estop(ACTUATOR_1),
            Err(TransactionError::Timeout { addr: ACTUATOR_1 }),
        );
        let slept_ms = *delay.total_ns.borrow() / 1_000_000;
        assert_eq!(slept_ms, u64::from(REPLY_TIMEOUT_MS));
    }

    #[test]
    fn test_composite_estop_short_circuits_on_nack() {
        // First peer NACKs; the second peer must never be addressed.
        let harness = Harness::new(&reply(CMD_NACK, &[]));
        let mut bus = harness.bus();
        assert_eq!(
            bus.estop_all(),
            Err(TransactionError::Nack { addr: ACTUATOR_1 }),
        );
        assert_eq!(*harness.channels.borrow(), vec![mux_channel(ACTUATOR_1)]);
        let sent = harness.sent_frames();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ACTUATOR_1);
        assert_eq!(sent[0].1, CMD_ESTOP);
    }

    #[test]
    fn test_composite_estop_all_acked() {
        let mut rx = Vec::new();
        for _ in 0..ACTUATOR_ADDRESSES.len() {
            rx.extend_from_slice(&reply(CMD_ACK, &[]));
        }
        let harness = Harness::new(&rx);
        let mut bus = harness.bus();
        assert_eq!(bus.estop_all(), Ok(()));
        assert_eq!(*harness.channels.borrow(), vec![0, 1, 2, 3]);
        let addressed: Vec<u8> = harness.sent_frames().iter().map(|f| f.0).collect();
        assert_eq!(addressed, ACTUATOR_ADDRESSES.to_vec());
    }

    #[test]
    fn test_run_trajectory_loads_then_broadcasts_exec() {
        let mut rx = Vec::new();
        for _ in 0..ACTUATOR_ADDRESSES.len() {
            rx.extend_from_slice(&reply(CMD_ACK, &[]));
        }
        let harness = Harness::new(&rx);
        let mut bus = harness.bus();

        let mut payload = Vec::new();
        for _ in 0..ACTUATOR_ADDRESSES.len() {
            payload.push(1);
            payload.extend_from_slice(&[0x11; 12]);
        }
        let trajectory = RobotTrajectory::decode(&payload).unwrap();
        assert_eq!(bus.run_trajectory(&trajectory), Ok(()));

        let sent = harness.sent_frames();
        assert_eq!(sent.len(), ACTUATOR_ADDRESSES.len() + 1);
        for (index, addr) in ACTUATOR_ADDRESSES.iter().enumerate() {
            assert_eq!(sent[index].0, *addr);
            assert_eq!(sent[index].1, CMD_LOAD_TRAJ);
            assert_eq!(sent[index].2[0], 1); // waypoint count leads the payload
            assert_eq!(sent[index].2.len(), 13);
        }
        let exec = sent.last().unwrap();
        assert_eq!(exec.0, BROADCAST);
        assert_eq!(exec.1, CMD_EXEC_TRAJ);
        assert!(exec.2.is_empty());
    }

    #[test]
    fn test_run_trajectory_stops_without_exec_on_failure() {
        // Second actuator NACKs the load.
        let mut rx = Vec::new();
        rx.extend_from_slice(&reply(CMD_ACK, &[]));
        rx.extend_from_slice(&reply(CMD_NACK, &[]));
        let harness = Harness::new(&rx);
        let mut bus = harness.bus();
        let trajectory = RobotTrajectory::decode(&[0, 0, 0, 0]).unwrap();
        assert_eq!(
            bus.run_trajectory(&trajectory),
            Err(TransactionError::Nack { addr: ACTUATOR_2 }),
        );
        let sent = harness.sent_frames();
        assert!(sent.iter().all(|frame| frame.1 != CMD_EXEC_TRAJ));
        assert_eq!(*harness.channels.borrow(), vec![0, 1]);
    }

    #[test]
    fn test_poll_step_updates_position_and_status() {
        let mut payload = vec![STATUS_IDLE];
        payload.extend_from_slice(&1.5f32.to_le_bytes());
        let harness = Harness::new(&reply(CMD_STATUS, &payload));
        let mut bus = harness.bus();
        assert_eq!(bus.poll_step(), Ok(()));
        assert_eq!(bus.status().code(0), STATUS_IDLE);
        assert_eq!(bus.position().joint(0), 1.5);
        assert_eq!(*harness.channels.borrow(), vec![0]);
    }

    #[test]
    fn test_poll_rotation_advances_past_a_dead_peer() {
        let harness = Harness::new(&[]);
        let mut bus = harness.bus();
        assert_eq!(
            bus.poll_step(),
            Err(TransactionError::Timeout { addr: ACTUATOR_1 }),
        );
        assert_eq!(bus.disconnects, 1);
        // The rotation moved on: the next step addresses the second peer.
        let mut payload = vec![STATUS_IDLE];
        payload.extend_from_slice(&0.25f32.to_le_bytes());
        harness.rx.borrow_mut().extend(reply(CMD_STATUS, &payload));
        assert_eq!(bus.poll_step(), Ok(()));
        assert_eq!(bus.position().joint(1), 0.25);
        assert_eq!(*harness.channels.borrow(), vec![0, 1]);
    }

    #[test]
    fn test_poll_step_ignores_malformed_status_reply() {
        let harness = Harness::new(&reply(CMD_STATUS, &[STATUS_IDLE, 0x01]));
        let mut bus = harness.bus();
        assert_eq!(
            bus.poll_step(),
            Err(TransactionError::Timeout { addr: ACTUATOR_1 }),
        );
        assert_eq!(bus.position().joint(0), 0.0);
    }
}
