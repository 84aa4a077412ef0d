//! Trajectory containers and their wire forms.
//!
//! A waypoint is an opaque 12-byte motion-law sample; this core moves it,
//! it does not interpret it. An [`ActuatorTrajectory`] serializes to
//! `count:u8` followed by `12 × count` waypoint bytes — the payload of one
//! LOAD_TRAJ packet. A [`RobotTrajectory`] is four such blocks back to back,
//! exactly as a client submits them in one TRAJ command. It lives for the
//! duration of that command: decoded, handed to the orchestrator, dropped.

use crate::consts::{ACTUATOR_COUNT, ACTUATOR_TRAJ_WIRE_LEN, MAX_WAYPOINTS, WAYPOINT_LEN};
use heapless::Vec;
use thiserror::Error;

/// One opaque motion-law sample.
pub type Waypoint = [u8; WAYPOINT_LEN];

/// Errors decoding a client trajectory payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrajectoryError {
    /// The payload ended before the declared waypoints did.
    #[error("trajectory payload truncated")]
    Truncated,
    /// A block declared more waypoints than the protocol bound.
    #[error("waypoint count {0} exceeds the maximum")]
    TooManyWaypoints(u8),
    /// Bytes were left over after the last actuator block.
    #[error("trailing bytes after the last actuator block")]
    TrailingBytes,
}

/// Ordered waypoints for a single actuator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActuatorTrajectory {
    waypoints: Vec<Waypoint, MAX_WAYPOINTS>,
}

impl ActuatorTrajectory {
    /// Creates an empty trajectory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a waypoint, failing once the bound is reached.
    pub fn push(&mut self, waypoint: Waypoint) -> Result<(), TrajectoryError> {
        self.waypoints
            .push(waypoint)
            .map_err(|_| TrajectoryError::TooManyWaypoints(MAX_WAYPOINTS as u8 + 1))
    }

    /// Number of waypoints.
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Whether the trajectory holds no waypoints.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Serializes to the LOAD_TRAJ payload: count byte, then waypoints.
    pub fn to_wire(&self) -> Vec<u8, ACTUATOR_TRAJ_WIRE_LEN> {
        let mut wire = Vec::new();
        // Capacity covers the maximum waypoint count by construction.
        let _ = wire.push(self.waypoints.len() as u8);
        for waypoint in &self.waypoints {
            let _ = wire.extend_from_slice(waypoint);
        }
        wire
    }

    /// Decodes one actuator block from the front of `bytes`, returning the
    /// trajectory and the remaining bytes.
    fn take_from(bytes: &[u8]) -> Result<(Self, &[u8]), TrajectoryError> {
        let (&count, rest) = bytes.split_first().ok_or(TrajectoryError::Truncated)?;
        if count as usize > MAX_WAYPOINTS {
            return Err(TrajectoryError::TooManyWaypoints(count));
        }
        let needed = count as usize * WAYPOINT_LEN;
        if rest.len() < needed {
            return Err(TrajectoryError::Truncated);
        }
        let mut trajectory = Self::new();
        for chunk in rest[..needed].chunks_exact(WAYPOINT_LEN) {
            let mut waypoint = [0u8; WAYPOINT_LEN];
            waypoint.copy_from_slice(chunk);
            // Bounded by the count check above.
            let _ = trajectory.waypoints.push(waypoint);
        }
        Ok((trajectory, &rest[needed..]))
    }
}

/// One trajectory per polled actuator, decoded from a client TRAJ payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotTrajectory {
    actuators: [ActuatorTrajectory; ACTUATOR_COUNT],
}

impl RobotTrajectory {
    /// Decodes four consecutive actuator blocks.
    ///
    /// The payload must contain exactly the four blocks, nothing more.
    pub fn decode(payload: &[u8]) -> Result<Self, TrajectoryError> {
        let mut robot = Self::default();
        let mut rest = payload;
        for actuator in &mut robot.actuators {
            let (trajectory, remaining) = ActuatorTrajectory::take_from(rest)?;
            *actuator = trajectory;
            rest = remaining;
        }
        if !rest.is_empty() {
            return Err(TrajectoryError::TrailingBytes);
        }
        Ok(robot)
    }

    /// The trajectory for actuator `index` (0-based, poll order).
    pub fn actuator(&self, index: usize) -> &ActuatorTrajectory {
        &self.actuators[index]
    }
}

impl TryFrom<&[u8]> for RobotTrajectory {
    type Error = TrajectoryError;

    fn try_from(payload: &[u8]) -> Result<Self, Self::Error> {
        Self::decode(payload)
    }
}
