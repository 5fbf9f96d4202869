//! Stepper pulse schedule compression: turns the step times the
//! iterative solver generates into a handful of quadratic-fit
//! `queue_steps` commands (`interval_i = interval + add1*i + add2*i^2` in
//! 16.16 fixed point), falling back to an uncompressed `queue_step` when
//! no fit is found within the configured clock error tolerance.
//!
//! Unlike the C original, clocks here are plain `u64`s throughout: the
//! 32-bit wraparound bookkeeping (`CLOCK_DIFF_MAX`, `queue_append_slow`'s
//! overflow dance) existed only to fit a ring buffer sized for an
//! embedded target's pointer arithmetic, and this core runs host-side
//! with full-width registers. The step queue is a plain growable `Vec`
//! compacted once its flushed prefix grows large, rather than a
//! hand-rolled circular buffer.

use std::collections::VecDeque;

use fixed::types::I16F16;

use crate::error::Result;
use crate::itersolve::StepCompress;

#[derive(Debug, Clone, Copy)]
struct QueueStep {
    clock: u64,
    inv_speed: u32,
}

/// One compressed stepper command, ready for the wire layer to encode.
#[derive(Debug, Clone, PartialEq)]
pub enum StepMessage {
    /// A single step `interval` clock ticks after the last one.
    QueueStep { interval: u32 },
    /// `count` steps whose inter-step interval starts at `interval` and
    /// then follows a quadratic in the step index:
    /// `interval_i = interval + add1*i + add2*i^2`.
    QueueSteps { interval: u32, count: u16, add1: I16F16, add2: I16F16 },
    /// Change the stepper's direction pin before the next step.
    SetNextStepDir { dir: bool },
    /// An arbitrary command to transmit in order with step commands.
    Raw(Vec<u32>),
}

impl StepMessage {
    /// Convert to the typed command `mcu-proto` frames, addressed to
    /// `oid`. `Raw` has no representation in the three in-scope wire
    /// commands (see SPEC_FULL.md §4.9) and is rejected rather than
    /// silently dropped.
    pub fn to_host_command(&self, oid: u8) -> Result<mcu_proto::commands::HostCommand> {
        use mcu_proto::commands::HostCommand;
        match self {
            StepMessage::QueueStep { interval } => Ok(HostCommand::QueueStep { oid, interval: *interval }),
            StepMessage::QueueSteps { interval, count, add1, add2 } => Ok(HostCommand::QueueSteps {
                oid,
                interval: *interval,
                count: *count,
                add1: add1.to_bits(),
                add2: add2.to_bits(),
            }),
            StepMessage::SetNextStepDir { dir } => Ok(HostCommand::SetNextStepDir { oid, dir: *dir }),
            StepMessage::Raw(_) => Err(crate::error::Error::Protocol(mcu_proto::ProtoError::UnknownCommand(0xff))),
        }
    }
}

/// A message awaiting transmission, carrying the scheduling metadata
/// [`crate::steppersync::StepperSync`] needs to interleave commands from
/// multiple steppers in clock order.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub msg: StepMessage,
    /// The oid of the stepper this message targets, so a caller can
    /// still recover which MCU object to address after
    /// [`crate::steppersync::StepperSync::flush`] has merged messages
    /// from multiple steppers into one clock-ordered batch.
    pub oid: u32,
    pub req_clock: u64,
    /// Overloaded like the C original: before steppersync processes this
    /// message, a nonzero value means "this message claims a move-queue
    /// slot that becomes free at this clock"; steppersync rewrites it to
    /// mean "minimum transmit clock" once processed.
    pub min_clock: u64,
}

fn fixed_divide_by_integer(dividend: i64, divisor: i64) -> i64 {
    let mut v = dividend << 16;
    let signa = v >= 0;
    let signb = divisor >= 0;
    if signa == signb {
        v += divisor / 2;
    } else {
        v -= divisor / 2;
    }
    v / divisor
}

struct StepMove {
    add1: i64,
    add2: i64,
    count: u16,
    end_time: u64,
    end_speed: u32,
}

/// Fit a quadratic `interval_i = add1 + add2*i` to the first `steps.len()`
/// queued step times. Returns `None` if the fit's coefficients can't be
/// represented in the wire format (the caller falls back to a single
/// uncompressed step).
fn generate_move(last_step_clock: u64, last_step_speed: u32, steps: &[QueueStep]) -> Option<StepMove> {
    let count = steps.len();
    let end_time_u = steps[count - 1].clock;
    let end_speed_u = steps[count - 1].inv_speed;

    let a0 = last_step_clock as i64;
    let a1 = last_step_speed as i64;
    let count_i = count as i64;
    let mut a2 = 3 * (end_time_u as i64) - 3 * a0 - count_i * (2 * a1 + end_speed_u as i64);
    let mut a3 = 2 * a0 - 2 * (end_time_u as i64) + count_i * (a1 + end_speed_u as i64);

    let count2 = (count as u64) * (count as u64);
    let count3 = count2 * (count as u64);
    a2 = fixed_divide_by_integer(a2, count2 as i64);
    a3 = fixed_divide_by_integer(a3, count3 as i64);

    let a2_addfactor = a2 * 2;
    if a2_addfactor > i32::MAX as i64 || a2_addfactor < i32::MIN as i64 {
        return None;
    }
    let a3_addfactor = a3 * 6;
    if a3_addfactor > i32::MAX as i64 || a3_addfactor < i32::MIN as i64 {
        return None;
    }

    let count_prev = count as u64 - 1;
    let count2_prev = count_prev * count_prev;
    let count3_prev = count2_prev * count_prev;

    let end_time2 = a2 * (count2 as i64) + a3 * (count3 as i64);
    let mut end_time = end_time2 >> 16;
    end_time += a0 + a1 * count_i;

    let end_time_prev = a2 * (count2_prev as i64) + a3 * (count3_prev as i64);
    let mut end_speed2 = (end_time2 - end_time_prev) >> 16;
    end_speed2 += a1;

    Some(StepMove { add1: a2, add2: a3, count: count as u16, end_time: end_time as u64, end_speed: end_speed2 as u32 })
}

const INVPHI: f32 = 0.618_034;
const INVPHI2: f32 = 0.381_966;

fn evaluate_error(last_step_clock: u64, last_step_speed: u32, mv: &StepMove, pos: usize, steps: &[QueueStep]) -> u32 {
    let start_speed = last_step_speed as i64;
    let start_time = last_step_clock as i64;
    let count = (pos + 1) as i64;
    let count2 = count * count;
    let count3 = count2 * count;
    let mut time = mv.add1 * count2 + mv.add2 * count3;
    time >>= 16;
    time += start_time + start_speed * count;
    (time - steps[pos].clock as i64).unsigned_abs() as u32
}

fn validate_move(last_step_clock: u64, last_step_speed: u32, max_error: u32, mv: &StepMove, steps: &[QueueStep]) -> bool {
    let count = mv.count as usize;
    let real_end_time = steps[count - 1].clock as i64;
    let error = (real_end_time - mv.end_time as i64).unsigned_abs() as u32;
    if error > max_error {
        return false;
    }

    let start_speed = last_step_speed as i64;
    let start_time = last_step_clock as i64;
    let first_step_time = start_time + start_speed + ((mv.add1 + mv.add2) >> 16);
    let error = (first_step_time - steps[0].clock as i64).unsigned_abs() as u32;
    if error > max_error {
        return false;
    }

    if count > 1 {
        // Golden-section search for the interior point of maximum
        // deviation between the fitted quadratic and the real steps.
        let h = (count - 1) as f32;
        let c = (INVPHI2 * h) as usize;
        let d = (INVPHI * h) as usize;
        if evaluate_error(last_step_clock, last_step_speed, mv, c, steps) > max_error {
            return false;
        }
        if evaluate_error(last_step_clock, last_step_speed, mv, d, steps) > max_error {
            return false;
        }
    }
    true
}

/// Binary search over the queued steps for the longest prefix whose
/// quadratic fit stays within `max_error`.
fn find_move(last_step_clock: u64, last_step_speed: u32, max_error: u32, steps: &[QueueStep]) -> Option<StepMove> {
    let count = steps.len();
    let mut best_move = generate_move(last_step_clock, last_step_speed, &steps[..1])?;
    let mut low = 1usize;
    let mut high = count + 1;
    while low < high {
        let mid = low + (high - low) / 2;
        match generate_move(last_step_clock, last_step_speed, &steps[..mid]) {
            Some(mv) if validate_move(last_step_clock, last_step_speed, max_error, &mv, steps) => {
                best_move = mv;
                low = mid + 1;
            }
            _ => high = mid,
        }
    }
    Some(best_move)
}

/// Per-stepper pulse compressor.
pub struct StepCompressor {
    oid: u32,
    max_error: u32,
    invert_sdir: bool,
    mcu_time_offset: f64,
    mcu_freq: f64,

    queue: Vec<QueueStep>,
    pos: usize,

    last_step_clock: u64,
    last_step_speed: u32,
    sdir: Option<bool>,

    messages: VecDeque<QueuedMessage>,
}

impl StepCompressor {
    pub fn new(oid: u32, max_error: u32, invert_sdir: bool) -> StepCompressor {
        StepCompressor {
            oid,
            max_error,
            invert_sdir,
            mcu_time_offset: 0.0,
            mcu_freq: 0.0,
            queue: Vec::new(),
            pos: 0,
            last_step_clock: 0,
            last_step_speed: 0,
            sdir: None,
            messages: VecDeque::new(),
        }
    }

    pub fn oid(&self) -> u32 {
        self.oid
    }

    pub fn set_time(&mut self, time_offset: f64, mcu_freq: f64) {
        self.mcu_time_offset = time_offset;
        self.mcu_freq = mcu_freq;
    }

    pub fn mcu_freq(&self) -> f64 {
        self.mcu_freq
    }

    /// Queue an arbitrary command to transmit in order with step commands.
    pub fn queue_msg(&mut self, data: Vec<u32>) -> Result<()> {
        self.flush(u64::MAX)?;
        self.messages.push_back(QueuedMessage { msg: StepMessage::Raw(data), oid: self.oid, req_clock: self.last_step_clock, min_clock: 0 });
        Ok(())
    }

    /// Flush pending steps and reset internal state, e.g. after homing.
    pub fn reset(&mut self, last_step_clock: u64) -> Result<()> {
        self.flush(u64::MAX)?;
        self.last_step_clock = last_step_clock;
        self.last_step_speed = 0;
        self.sdir = None;
        Ok(())
    }

    fn set_next_step_dir(&mut self, sdir: bool) -> Result<()> {
        if self.sdir == Some(sdir) {
            return Ok(());
        }
        self.sdir = Some(sdir);
        self.flush(u64::MAX)?;
        self.messages.push_back(QueuedMessage {
            msg: StepMessage::SetNextStepDir { dir: sdir ^ self.invert_sdir },
            oid: self.oid,
            req_clock: self.last_step_clock,
            min_clock: 0,
        });
        Ok(())
    }

    fn compact(&mut self) {
        if self.pos > 4096 {
            self.queue.drain(0..self.pos);
            self.pos = 0;
        }
    }

    /// Compress queued steps into commands until `last_step_clock`
    /// reaches `move_clock`.
    pub fn flush(&mut self, move_clock: u64) -> Result<()> {
        if self.pos >= self.queue.len() {
            return Ok(());
        }
        while self.last_step_clock < move_clock {
            let steps = &self.queue[self.pos..];
            if steps.is_empty() {
                break;
            }
            let mv = find_move(self.last_step_clock, self.last_step_speed, self.max_error, steps);
            let count = mv.as_ref().map_or(0, |m| m.count as usize);
            if count == 0 {
                let interval = (self.queue[self.pos].clock.saturating_sub(self.last_step_clock)).min(u32::MAX as u64) as u32;
                self.messages.push_back(QueuedMessage {
                    msg: StepMessage::QueueStep { interval },
                    oid: self.oid,
                    req_clock: self.last_step_clock,
                    min_clock: self.last_step_clock,
                });
                self.last_step_clock += interval as u64;
                self.last_step_speed = interval.min(u16::MAX as u32);
                if self.pos + 1 >= self.queue.len() {
                    self.queue.clear();
                    self.pos = 0;
                    break;
                }
                self.pos += 1;
            } else {
                let mv = mv.unwrap();
                self.messages.push_back(QueuedMessage {
                    msg: StepMessage::QueueSteps {
                        interval: self.last_step_speed,
                        count: mv.count,
                        add1: I16F16::from_bits(mv.add1 as i32),
                        add2: I16F16::from_bits(mv.add2 as i32),
                    },
                    oid: self.oid,
                    req_clock: self.last_step_clock,
                    min_clock: self.last_step_clock,
                });
                self.last_step_clock = mv.end_time;
                self.last_step_speed = mv.end_speed;
                if self.pos + count >= self.queue.len() {
                    self.queue.clear();
                    self.pos = 0;
                    break;
                }
                self.pos += count;
            }
        }
        Ok(())
    }

    pub fn peek_message(&self) -> Option<&QueuedMessage> {
        self.messages.front()
    }

    pub fn pop_message(&mut self) -> Option<QueuedMessage> {
        self.messages.pop_front()
    }
}

impl StepCompress for StepCompressor {
    fn append(&mut self, sdir: bool, print_time: f64, step_time: f64) -> Result<()> {
        self.set_next_step_dir(sdir)?;
        let abs_time = print_time + step_time;
        let clock = (((abs_time - self.mcu_time_offset) * self.mcu_freq).round()).max(0.0) as u64;
        let prev_clock = self.queue.last().map_or(self.last_step_clock, |s| s.clock);
        let inv_speed = clock.saturating_sub(prev_clock).min(u32::MAX as u64) as u32;
        self.queue.push(QueueStep { clock, inv_speed });
        self.compact();
        Ok(())
    }

    fn commit(&mut self) {
        // No speculative/rollback-able steps are buffered at this layer;
        // steps are appended directly to the compression queue.
    }

    fn get_step_dir(&self) -> bool {
        // The C original leaves `sdir` at -1 (truthy) until the first
        // direction is set, which the itersolve search treats as
        // "assume positive".
        self.sdir.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_speed_steps_compress_to_one_command() {
        let mut sc = StepCompressor::new(0, 2, false);
        sc.set_time(0.0, 1_000_000.0);
        for i in 1..=20u64 {
            sc.append(true, 0.0, i as f64 * 0.001).unwrap();
        }
        sc.flush(u64::MAX).unwrap();
        let mut queue_steps_count = 0;
        let mut total_steps = 0;
        while let Some(qm) = sc.pop_message() {
            if let StepMessage::QueueSteps { count, .. } = qm.msg {
                queue_steps_count += 1;
                total_steps += count as usize;
            }
        }
        assert_eq!(queue_steps_count, 1);
        assert_eq!(total_steps, 20);
    }

    #[test]
    fn direction_change_emits_set_next_step_dir() {
        let mut sc = StepCompressor::new(0, 2, false);
        sc.set_time(0.0, 1_000_000.0);
        sc.append(true, 0.0, 0.001).unwrap();
        sc.append(false, 0.0, 0.002).unwrap();
        sc.flush(u64::MAX).unwrap();
        let mut saw_dir_change = false;
        while let Some(qm) = sc.pop_message() {
            if let StepMessage::SetNextStepDir { dir } = qm.msg {
                saw_dir_change |= !dir;
            }
        }
        assert!(saw_dir_change);
    }
}
