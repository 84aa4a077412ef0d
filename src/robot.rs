//! Aggregate robot state maintained by the status poller.
//!
//! One slot per polled actuator. The bus orchestrator is the only writer;
//! the command dispatcher reads the current values when building a position
//! report. Nothing here survives a restart.

use crate::consts::{ACTUATOR_COUNT, POSITION_WIRE_LEN};

/// Last reported joint angles, one per actuator, in calibrated units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RobotPosition {
    joints: [f32; ACTUATOR_COUNT],
}

impl RobotPosition {
    /// Creates a zeroed position.
    pub fn new() -> Self {
        Self::default()
    }

    /// The angle of joint `index` (0-based).
    pub fn joint(&self, index: usize) -> f32 {
        self.joints[index]
    }

    pub(crate) fn set_joint(&mut self, index: usize, angle: f32) {
        self.joints[index] = angle;
    }

    /// Serializes all four joints as little-endian `f32`s, the payload of a
    /// position report.
    pub fn to_wire(&self) -> [u8; POSITION_WIRE_LEN] {
        let mut wire = [0u8; POSITION_WIRE_LEN];
        for (index, joint) in self.joints.iter().enumerate() {
            wire[index * 4..index * 4 + 4].copy_from_slice(&joint.to_le_bytes());
        }
        wire
    }
}

/// Last reported status codes, one per actuator.
///
/// Values are the `STATUS_*` codes in [`crate::consts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RobotStatus {
    codes: [u8; ACTUATOR_COUNT],
}

impl RobotStatus {
    /// Creates a zeroed status block.
    pub fn new() -> Self {
        Self::default()
    }

    /// The status code of actuator `index` (0-based).
    pub fn code(&self, index: usize) -> u8 {
        self.codes[index]
    }

    pub(crate) fn set_code(&mut self, index: usize, code: u8) {
        self.codes[index] = code;
    }
}

/// Reads a little-endian `f32` from the front of `bytes`.
pub(crate) fn read_f32_le(bytes: &[u8]) -> Option<f32> {
    let array: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(f32::from_le_bytes(array))
}
