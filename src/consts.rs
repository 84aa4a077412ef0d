//! Constants used across the controller protocol implementation.
//!
//! This module defines the reserved wire bytes, the device address map, the
//! command vocabulary, and the sizing and timing maxima shared by the framing
//! codec, the parser, the serializer, and the bus orchestrator.
//!
//! ## Key concepts
//!
//! - **Framing bytes**: the frame delimiter, the escape marker, and the XOR
//!   mask applied to stuffed bytes.
//! - **Addresses**: one byte per party on the bus; the controller is
//!   [`MASTER`], actuators and the tool occupy the range above it.
//! - **Commands**: a single 8-bit code space used on both the actuator bus
//!   and the client channel.
//! - **Sizing**: every buffer in the crate is a fixed-capacity container
//!   sized from [`MAX_PAYLOAD_LEN`]; the escaped worst case is twice the raw
//!   packet.
//!
//! Use these wherever framing or buffer logic is implemented so message
//! boundaries stay consistent across channels.

/// Frame delimiter marking the start of every packet.
///
/// Never appears raw inside a frame: payload occurrences are byte-stuffed.
pub const START_BYTE: u8 = 0xAA;

/// Escape marker introducing a stuffed byte.
pub const ESCAPE_BYTE: u8 = 0xAB;

/// XOR mask applied to a byte following the escape marker.
pub const ESCAPE_MASK: u8 = 0x20;

/// CRC-8 generator polynomial (MSB-first, initial value 0x00).
pub const CRC8_POLY: u8 = 0x07;

/// Address reaching every device on the bus at once.
pub const BROADCAST: u8 = 0x00;

/// The controller's own address on both channels.
pub const MASTER: u8 = 0x01;

/// First joint actuator.
pub const ACTUATOR_1: u8 = 0x02;
/// Second joint actuator.
pub const ACTUATOR_2: u8 = 0x03;
/// Third joint actuator.
pub const ACTUATOR_3: u8 = 0x04;
/// Fourth joint actuator.
pub const ACTUATOR_4: u8 = 0x05;
/// Fifth joint actuator (reserved; not in the polled rotation).
pub const ACTUATOR_5: u8 = 0x06;
/// Sixth joint actuator (reserved; not in the polled rotation).
pub const ACTUATOR_6: u8 = 0x07;
/// End-effector / tool device.
pub const TOOL: u8 = 0x08;

/// Number of actuators the controller polls and commands.
pub const ACTUATOR_COUNT: usize = 4;

/// The polled actuator addresses, in round-robin order.
pub const ACTUATOR_ADDRESSES: [u8; ACTUATOR_COUNT] =
    [ACTUATOR_1, ACTUATOR_2, ACTUATOR_3, ACTUATOR_4];

/// Liveness probe.
pub const CMD_PING: u8 = 0x01;
/// Run the homing routine.
pub const CMD_HOME: u8 = 0x02;
/// Position query on the bus; position report toward the client.
pub const CMD_POS: u8 = 0x03;
/// Load a trajectory: per-actuator waypoints on the bus, the whole robot
/// trajectory when sent by a client.
pub const CMD_LOAD_TRAJ: u8 = 0x04;
/// Start executing the loaded trajectory.
pub const CMD_EXEC_TRAJ: u8 = 0x05;
/// Trajectory execution finished notification.
pub const CMD_FINISHED: u8 = 0x06;
/// Status request; the reply carries a status byte and the joint angle.
pub const CMD_STATUS: u8 = 0x07;
/// Emergency stop.
pub const CMD_ESTOP: u8 = 0x08;
/// Positive acknowledgement.
pub const CMD_ACK: u8 = 0xEE;
/// Negative acknowledgement.
pub const CMD_NACK: u8 = 0xFF;

/// Actuator status code: idle, holding position.
pub const STATUS_IDLE: u8 = 0x01;
/// Actuator status code: homing in progress.
pub const STATUS_HOMING: u8 = 0x02;
/// Actuator status code: executing a trajectory.
pub const STATUS_EXECUTING_TRAJECTORY: u8 = 0x03;

/// Maximum payload length a frame may declare.
///
/// Anything larger is a protocol violation: the parser discards the frame
/// before buffering a single payload byte.
pub const MAX_PAYLOAD_LEN: u16 = 1024;

/// See [`MAX_PAYLOAD_LEN`].
pub const MAX_PAYLOAD_LEN_USIZE: usize = MAX_PAYLOAD_LEN as usize;

/// Maximum size of a raw (unescaped) packet: address, command, two length
/// bytes, payload, checksum.
pub const MAX_PACKET_LEN: usize = MAX_PAYLOAD_LEN_USIZE + 5;

/// Worst-case size of an escaped packet: every raw byte stuffed to two.
pub const MAX_ESCAPED_PACKET_LEN: usize = MAX_PACKET_LEN * 2;

/// Decoded commands a channel buffers before the newest is dropped.
pub const CMD_QUEUE_DEPTH: usize = 8;

/// Size of one opaque trajectory waypoint on the wire.
pub const WAYPOINT_LEN: usize = 12;

/// Waypoints a single actuator trajectory may carry.
///
/// Chosen so a four-actuator robot trajectory, each block
/// `1 + 12 × count` bytes, still fits one [`MAX_PAYLOAD_LEN`] payload.
pub const MAX_WAYPOINTS: usize = 20;

/// Wire size of a full actuator trajectory block.
pub const ACTUATOR_TRAJ_WIRE_LEN: usize = 1 + WAYPOINT_LEN * MAX_WAYPOINTS;

/// Wire size of a position report: four little-endian `f32` joint angles.
pub const POSITION_WIRE_LEN: usize = 16;

/// Wire size of a STATUS reply payload: status byte plus `f32` angle.
pub const STATUS_REPLY_LEN: usize = 5;

/// How long a request/response transaction waits for an ACK, NACK, or
/// STATUS reply before the peer counts as disconnected.
pub const REPLY_TIMEOUT_MS: u32 = 100;

/// Pause between reply polls inside the timeout window.
pub const REPLY_POLL_INTERVAL_MS: u32 = 1;

/// Maps a device address to its channel-selector index.
///
/// Unmapped addresses (including [`BROADCAST`] and [`MASTER`]) fall back to
/// channel 0.
pub const fn mux_channel(address: u8) -> u8 {
    match address {
        ACTUATOR_1 => 0,
        ACTUATOR_2 => 1,
        ACTUATOR_3 => 2,
        ACTUATOR_4 => 3,
        ACTUATOR_5 => 4,
        ACTUATOR_6 => 5,
        TOOL => 6,
        _ => 0,
    }
}
