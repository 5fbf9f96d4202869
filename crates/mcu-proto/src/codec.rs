#![deny(clippy::all)]
#![deny(warnings)]

//! VLQ parameter encoding and sync/length/CRC frame encoding for the
//! three in-scope commands.
//!
//! Klipper packs integer command parameters as a variable-length
//! quantity (7 payload bits per byte, high bit set on every byte but the
//! last) rather than fixed-width fields, so a `u8` oid and a `u32`
//! interval cost as little wire space as their value needs. Frames are
//! `[len, seq, cmd_id, params..., crc_hi, crc_lo]`, sync-delimited by a
//! leading `0x7e` that is itself never escaped (bytes equal to it inside
//! a frame are distinguished by the length prefix, not an escape byte).

use crate::commands::{command_id, HostCommand};
use crate::crc::crc16_ccitt;
use crate::ProtoError;

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

pub const SYNC_BYTE: u8 = 0x7e;

/// A command's wire parameters, in encoding order, before VLQ packing.
const MAX_PARAMS: usize = 5;

fn params_of(cmd: &HostCommand) -> ([i64; MAX_PARAMS], usize) {
    let mut p = [0i64; MAX_PARAMS];
    let n = match *cmd {
        HostCommand::SetNextStepDir { oid, dir } => {
            p[0] = oid as i64;
            p[1] = dir as i64;
            2
        }
        HostCommand::QueueStep { oid, interval } => {
            p[0] = oid as i64;
            p[1] = interval as i64;
            2
        }
        HostCommand::QueueSteps { oid, interval, count, add1, add2 } => {
            p[0] = oid as i64;
            p[1] = interval as i64;
            p[2] = count as i64;
            p[3] = add1 as i64;
            p[4] = add2 as i64;
            5
        }
    };
    (p, n)
}

/// Append `value`'s VLQ encoding to `out`. Klipper's VLQ is zig-zag-free:
/// each byte carries 7 bits of the value, least-significant group last
/// so a receiver can stop as soon as it sees a byte with the high bit
/// clear; negative values are sign-extended through the group width.
fn encode_vlq(mut value: i64, out: &mut [u8; 10]) -> usize {
    let mut buf = [0u8; 10];
    let mut n = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        buf[n] = byte;
        n += 1;
        if done {
            break;
        }
    }
    // Klipper transmits most-significant group first.
    for (i, &b) in buf[..n].iter().rev().enumerate() {
        let continuation = if i + 1 < n { 0x80 } else { 0x00 };
        out[i] = b | continuation;
    }
    n
}

fn decode_vlq(input: &[u8]) -> Option<(i64, usize)> {
    let mut value: i64 = 0;
    for (i, &b) in input.iter().enumerate() {
        value = (value << 7) | (b & 0x7f) as i64;
        if b & 0x80 == 0 {
            // Sign-extend from the 7-bit group boundary.
            let bits = (i + 1) * 7;
            if bits < 64 && value & (1 << (bits - 1)) != 0 {
                value -= 1 << bits;
            }
            return Some((value, i + 1));
        }
    }
    None
}

/// Encode `cmd`'s command id and parameters (no framing) into `out`,
/// returning the number of bytes written.
pub fn encode_payload(cmd: &HostCommand, out: &mut [u8]) -> Result<usize, ProtoError> {
    let mut pos = 0;
    if pos >= out.len() {
        return Err(ProtoError::FrameTooLarge);
    }
    out[pos] = cmd.command_id();
    pos += 1;

    let (params, count) = params_of(cmd);
    for &value in &params[..count] {
        let mut vlq = [0u8; 10];
        let n = encode_vlq(value, &mut vlq);
        if pos + n > out.len() {
            return Err(ProtoError::FrameTooLarge);
        }
        out[pos..pos + n].copy_from_slice(&vlq[..n]);
        pos += n;
    }
    Ok(pos)
}

/// Encode `cmd` as a complete `[sync, len, seq, payload..., crc_hi,
/// crc_lo]` frame and append it to `out`. `len` covers every byte after
/// itself up to and including the CRC.
#[cfg(feature = "alloc")]
pub fn encode_frame(cmd: &HostCommand, seq: u8, out: &mut Vec<u8>) -> Result<(), ProtoError> {
    let mut payload = [0u8; 32];
    let payload_len = encode_payload(cmd, &mut payload)?;

    let frame_len = 1 + 1 + payload_len + 2; // len byte itself + seq + payload + crc
    if frame_len > u8::MAX as usize {
        return Err(ProtoError::FrameTooLarge);
    }

    let mut crc_input = Vec::with_capacity(frame_len);
    crc_input.push(frame_len as u8);
    crc_input.push(seq);
    crc_input.extend_from_slice(&payload[..payload_len]);
    let crc = crc16_ccitt(&crc_input, crc_input.len());

    out.push(SYNC_BYTE);
    out.extend_from_slice(&crc_input);
    out.push((crc >> 8) as u8);
    out.push((crc & 0xff) as u8);
    Ok(())
}

/// Decode a single `[sync, len, seq, payload..., crc_hi, crc_lo]` frame
/// from the start of `input`. Returns the command, its sequence number,
/// and how many bytes of `input` the frame occupied.
pub fn decode_frame(input: &[u8]) -> Result<(HostCommand, u8, usize), ProtoError> {
    if input.is_empty() || input[0] != SYNC_BYTE {
        return Err(ProtoError::InvalidSync);
    }
    if input.len() < 5 {
        return Err(ProtoError::IncompleteFrame);
    }
    let frame_len = input[1] as usize;
    if input.len() < 1 + frame_len {
        return Err(ProtoError::IncompleteFrame);
    }

    let crc_input = &input[1..1 + frame_len - 2];
    let received_crc = ((input[frame_len - 1] as u16) << 8) | input[frame_len] as u16;
    let calculated_crc = crc16_ccitt(crc_input, crc_input.len());
    if received_crc != calculated_crc {
        return Err(ProtoError::InvalidCrc);
    }

    let seq = crc_input[1];
    let payload = &crc_input[2..];
    let cmd = decode_payload(payload)?;
    Ok((cmd, seq, 1 + frame_len))
}

fn decode_payload(payload: &[u8]) -> Result<HostCommand, ProtoError> {
    if payload.is_empty() {
        return Err(ProtoError::IncompleteFrame);
    }
    let id = payload[0];
    let mut rest = &payload[1..];
    let mut next = || -> Result<i64, ProtoError> {
        let (v, n) = decode_vlq(rest).ok_or(ProtoError::IncompleteFrame)?;
        rest = &rest[n..];
        Ok(v)
    };

    match id {
        command_id::SET_NEXT_STEP_DIR => {
            let oid = next()?;
            let dir = next()?;
            Ok(HostCommand::SetNextStepDir {
                oid: u8::try_from(oid).map_err(|_| ProtoError::ValueOverflow)?,
                dir: dir != 0,
            })
        }
        command_id::QUEUE_STEP => {
            let oid = next()?;
            let interval = next()?;
            Ok(HostCommand::QueueStep {
                oid: u8::try_from(oid).map_err(|_| ProtoError::ValueOverflow)?,
                interval: u32::try_from(interval).map_err(|_| ProtoError::ValueOverflow)?,
            })
        }
        command_id::QUEUE_STEPS => {
            let oid = next()?;
            let interval = next()?;
            let count = next()?;
            let add1 = next()?;
            let add2 = next()?;
            Ok(HostCommand::QueueSteps {
                oid: u8::try_from(oid).map_err(|_| ProtoError::ValueOverflow)?,
                interval: u32::try_from(interval).map_err(|_| ProtoError::ValueOverflow)?,
                count: u16::try_from(count).map_err(|_| ProtoError::ValueOverflow)?,
                add1: i32::try_from(add1).map_err(|_| ProtoError::ValueOverflow)?,
                add2: i32::try_from(add2).map_err(|_| ProtoError::ValueOverflow)?,
            })
        }
        other => Err(ProtoError::UnknownCommand(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vlq_round_trips_small_and_negative_values() {
        for v in [0i64, 1, 127, 128, -1, -64, -65, 1_000_000, -1_000_000] {
            let mut buf = [0u8; 10];
            let n = encode_vlq(v, &mut buf);
            let (decoded, consumed) = decode_vlq(&buf[..n]).unwrap();
            assert_eq!(consumed, n);
            assert_eq!(decoded, v);
        }
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn queue_steps_frame_round_trips() {
        let cmd = HostCommand::QueueSteps { oid: 3, interval: 5000, count: 12, add1: -7, add2: 2 };
        let mut out = Vec::new();
        encode_frame(&cmd, 1, &mut out).unwrap();
        let (decoded, seq, consumed) = decode_frame(&out).unwrap();
        assert_eq!(decoded, cmd);
        assert_eq!(seq, 1);
        assert_eq!(consumed, out.len());
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn corrupted_frame_fails_crc() {
        let cmd = HostCommand::SetNextStepDir { oid: 0, dir: true };
        let mut out = Vec::new();
        encode_frame(&cmd, 0, &mut out).unwrap();
        let last = out.len() - 1;
        out[last] ^= 0xff;
        assert_eq!(decode_frame(&out), Err(ProtoError::InvalidCrc));
    }
}
