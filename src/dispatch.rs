//! Client command dispatch.
//!
//! [`dispatch`] translates one decoded client command into bus transactions
//! and a client-facing reply. Callers run it while holding bus exclusion
//! (inside [`crate::shared::with_bus`]), so a client command executes
//! atomically with respect to the status poller — the lock spans the whole
//! composite operation, not just one sub-transaction.
//!
//! [`ClientSession`] keeps the single-active-client rule: there is never
//! more than one live client parser/serializer pair, and attaching a new
//! connection fully replaces the old one first.

use crate::bus::ActuatorBus;
use crate::consts::{BROADCAST, CMD_ACK, CMD_ESTOP, CMD_LOAD_TRAJ, CMD_NACK, CMD_POS, MASTER};
use crate::io::{ByteSink, ByteSource, ChannelSelector};
use crate::link::SerialLink;
use crate::queue::Command;
use crate::trajectory::RobotTrajectory;
use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

/// Executes one client command against the bus and replies on `client`.
///
/// - `ESTOP`: composite estop over all actuators, ACK/NACK reply.
/// - `POS`: replies with the 16-byte little-endian position report.
/// - `TRAJ` (the `LOAD_TRAJ` code on the client channel): decodes the robot
///   trajectory, loads it into every actuator, broadcasts execute on
///   success; ACK/NACK reply. A payload that fails to decode NACKs without
///   touching the bus.
/// - Anything else is logged and dropped; no reply is owed.
pub fn dispatch<R, W, M, D, C>(
    bus: &mut ActuatorBus<R, W, M, D>,
    client: &mut SerialLink<C>,
    request: &Command,
) where
    R: ByteSource,
    W: ByteSink,
    M: ChannelSelector,
    D: DelayNs,
    C: ByteSink,
{
    match request.command {
        CMD_ESTOP => {
            info!("[CMD] estop");
            let reply = match bus.estop_all() {
                Ok(()) => CMD_ACK,
                Err(error) => {
                    warn!("[CMD] estop failed: {}", error);
                    CMD_NACK
                }
            };
            send_reply(client, reply, &[]);
        }

        CMD_POS => {
            debug!("[CMD] position report");
            let wire = bus.position().to_wire();
            send_reply(client, CMD_POS, &wire);
        }

        CMD_LOAD_TRAJ => {
            info!("[CMD] trajectory");
            let reply = match RobotTrajectory::decode(request.payload()) {
                Ok(trajectory) => match bus.run_trajectory(&trajectory) {
                    Ok(()) => CMD_ACK,
                    Err(error) => {
                        warn!("[CMD] trajectory load failed: {}", error);
                        CMD_NACK
                    }
                },
                Err(error) => {
                    warn!("[CMD] bad trajectory payload: {}", error);
                    CMD_NACK
                }
            };
            send_reply(client, reply, &[]);
        }

        other => {
            debug!(
                "[CMD] unknown command 0x{:02x}, payload {:02x?}",
                other,
                request.payload()
            );
        }
    }
}

fn send_reply<C: ByteSink>(client: &mut SerialLink<C>, cmd: u8, payload: &[u8]) {
    // Reply sizes are fixed and far below the payload bound.
    if let Err(error) = client.send_packet(BROADCAST, cmd, payload) {
        warn!("[CMD] failed to serialize reply: {}", error);
    }
}

/// The controller's single client connection.
///
/// Holds at most one live [`SerialLink`]; attaching a new transport drops
/// the previous link (and its parser state) before the new one exists, so
/// two clients never interleave on the channel.
#[derive(Debug, Default)]
pub struct ClientSession<C> {
    link: Option<SerialLink<C>>,
}

impl<C: ByteSink> ClientSession<C> {
    /// Creates a session with no client attached.
    pub fn new() -> Self {
        Self { link: None }
    }

    /// Whether a client is currently attached.
    pub fn is_attached(&self) -> bool {
        self.link.is_some()
    }

    /// Attaches a new client transport, replacing any previous one.
    ///
    /// The old link is torn down before the new one exists, so the channel
    /// never has two live parser/serializer pairs.
    pub fn attach(&mut self, sink: C) {
        if self.link.take().is_some() {
            info!("[LOOP] dropped previous client");
        }
        self.link = Some(SerialLink::new(MASTER, sink));
    }

    /// Drops the current client, if any.
    pub fn detach(&mut self) {
        self.link = None;
    }

    /// Feeds bytes received from the client into its parser.
    ///
    /// Bytes arriving with no client attached are discarded.
    pub fn feed_slice(&mut self, bytes: &[u8]) {
        if let Some(link) = self.link.as_mut() {
            link.feed_slice(bytes);
        }
    }

    /// Takes the oldest decoded client command.
    pub fn next_command(&mut self) -> Option<Command> {
        self.link.as_mut()?.read()
    }

    /// The live client link, for sending replies.
    pub fn link_mut(&mut self) -> Option<&mut SerialLink<C>> {
        self.link.as_mut()
    }
}
