#![deny(clippy::all)]
#![deny(warnings)]

//! The three host-to-MCU commands a step compressor emits.
//!
//! Klipper's real wire protocol negotiates a name-to-id mapping for its
//! full command dictionary at connect time; this crate instead assigns
//! each in-scope command a fixed id, since the dynamic dictionary and
//! every other command (heaters, endstops, bed mesh, ...) are out of
//! scope per SPEC_FULL.md §1/§4.9.

/// Fixed command ids for the three in-scope host commands.
pub mod command_id {
    pub const SET_NEXT_STEP_DIR: u8 = 0x01;
    pub const QUEUE_STEP: u8 = 0x02;
    pub const QUEUE_STEPS: u8 = 0x03;
}

/// A command from the host to a stepper's MCU oid.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HostCommand {
    /// Set the direction the next queued step(s) move in.
    SetNextStepDir {
        oid: u8,
        dir: bool,
    },
    /// Queue a single step after `interval` MCU clock ticks.
    QueueStep {
        oid: u8,
        interval: u32,
    },
    /// Queue `count` steps whose intervals follow the quadratic
    /// `interval, interval+add1, interval+2*add1+add2, ...` recurrence
    /// `stepcompress` fits.
    QueueSteps {
        oid: u8,
        interval: u32,
        count: u16,
        add1: i32,
        add2: i32,
    },
}

impl HostCommand {
    pub fn command_id(&self) -> u8 {
        match self {
            HostCommand::SetNextStepDir { .. } => command_id::SET_NEXT_STEP_DIR,
            HostCommand::QueueStep { .. } => command_id::QUEUE_STEP,
            HostCommand::QueueSteps { .. } => command_id::QUEUE_STEPS,
        }
    }

    pub fn oid(&self) -> u8 {
        match self {
            HostCommand::SetNextStepDir { oid, .. }
            | HostCommand::QueueStep { oid, .. }
            | HostCommand::QueueSteps { oid, .. } => *oid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_id_matches_the_fixed_assignment() {
        assert_eq!(HostCommand::SetNextStepDir { oid: 0, dir: true }.command_id(), command_id::SET_NEXT_STEP_DIR);
        assert_eq!(HostCommand::QueueStep { oid: 0, interval: 1 }.command_id(), command_id::QUEUE_STEP);
        assert_eq!(
            HostCommand::QueueSteps { oid: 0, interval: 1, count: 1, add1: 0, add2: 0 }.command_id(),
            command_id::QUEUE_STEPS
        );
    }
}
