#![deny(clippy::all)]
#![deny(warnings)]
#![cfg_attr(not(feature = "std"), no_std)]

//! # MCU command grammar
//!
//! A small, typed slice of the Klipper host-to-MCU wire protocol: just the
//! three commands a step compressor emits (`set_next_step_dir`,
//! `queue_step`, `queue_steps`), their VLQ/CRC framing, and nothing else.
//! The full Klipper command dictionary (dynamic name-to-id negotiation,
//! heater/endstop/bed-mesh commands, responses) is out of scope — see
//! SPEC_FULL.md §4.9.
//!
//! ## Key components
//!
//! - **[`commands`]**: `HostCommand`, the three in-scope commands.
//! - **[`codec`]**: VLQ parameter encoding and sync/length/CRC framing.
//! - **[`crc`]**: the CRC-16-CCITT checksum Klipper frames with.

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod codec;
pub mod commands;
pub mod crc;

/// Errors from encoding or decoding an MCU command frame.
///
/// Plain `core::fmt::Display` rather than `thiserror` here, since this
/// crate stays `no_std`-capable (per SPEC_FULL.md §1's firmware-adjacent
/// scope) and `thiserror`'s derive requires `std::error::Error`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProtoError {
    /// A frame was shorter than the minimum valid length.
    IncompleteFrame,
    /// The leading sync byte didn't match.
    InvalidSync,
    /// The trailing CRC-16 didn't match the frame's contents.
    InvalidCrc,
    /// A command id outside the three this crate knows how to decode.
    UnknownCommand(u8),
    /// A VLQ-encoded value didn't fit the target integer width.
    ValueOverflow,
    /// An encoded frame would exceed the wire's maximum frame size.
    FrameTooLarge,
}

impl core::fmt::Display for ProtoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProtoError::IncompleteFrame => write!(f, "frame too short to contain a valid header and CRC"),
            ProtoError::InvalidSync => write!(f, "expected sync byte 0x7e, found a different value"),
            ProtoError::InvalidCrc => write!(f, "CRC-16 mismatch"),
            ProtoError::UnknownCommand(id) => write!(f, "command id {id} is not one of the in-scope commands"),
            ProtoError::ValueOverflow => write!(f, "VLQ value overflowed the target integer width"),
            ProtoError::FrameTooLarge => write!(f, "encoded frame exceeds the maximum frame size"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ProtoError {}
