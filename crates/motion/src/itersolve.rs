//! Iterative solver that turns a stepper's kinematics and the segment
//! queue into individual step times.
//!
//! A [`StepperKinematics`] maps a segment's time-parameterized XYZ
//! motion down to one stepper's 1-D commanded position; the solver here
//! walks that position forward in half-step increments using a
//! false-position (regula falsi) root search, since most kinematics
//! (deltas, correxy, etc.) have no closed-form inverse.

use crate::error::{Error, Result};
use crate::segq::{SegQ, SegqMove, NEVER_TIME};

pub const AF_X: u8 = 1 << 0;
pub const AF_Y: u8 = 1 << 1;
pub const AF_Z: u8 = 1 << 2;

/// A stepper's kinematics: which axes its motion depends on, and how to
/// map a segment's time-parameterized position down to this stepper's
/// 1-D commanded position.
pub trait StepperKinematics {
    /// Bitmask of [`AF_X`]/[`AF_Y`]/[`AF_Z`] this stepper's position
    /// depends on; used to skip segments that can't move it.
    fn active_flags(&self) -> u8;

    /// This stepper's 1-D commanded position `time` seconds into segment
    /// `segq[idx]`. Takes the whole queue (not just the one segment) so
    /// kinematics that smooth over a time window - pressure advance,
    /// chiefly - can integrate across neighboring segments.
    fn calc_position(&self, segq: &SegQ, idx: usize, time: f64) -> f64;
}

/// Consumer of generated step times; implemented by the step compressor.
pub trait StepCompress {
    /// Append a step in direction `sdir` at `print_time + step_time`.
    fn append(&mut self, sdir: bool, print_time: f64, step_time: f64) -> Result<()>;
    /// Commit a step whose position exactly matched the target, so a
    /// subsequent rollback (from direction-change backtracking) can't
    /// discard it.
    fn commit(&mut self);
    /// The direction the next generated step is expected to move in.
    fn get_step_dir(&self) -> bool;
}

/// Per-stepper solver state carried across [`generate_steps`] calls.
pub struct IterativeSolver<K: StepperKinematics> {
    pub kinematics: K,
    pub step_dist: f64,
    pub commanded_pos: f64,
    pub last_flush_time: f64,
    pub last_move_time: f64,
    /// How far ahead of this stepper's first active segment to start
    /// generating steps (needed by kinematics whose position depends on
    /// future motion, e.g. pressure advance).
    pub gen_steps_pre_active: f64,
    /// How far past this stepper's last active segment to keep
    /// generating steps.
    pub gen_steps_post_active: f64,
}

impl<K: StepperKinematics> IterativeSolver<K> {
    pub fn new(kinematics: K, step_dist: f64) -> IterativeSolver<K> {
        IterativeSolver {
            kinematics,
            step_dist,
            commanded_pos: 0.0,
            last_flush_time: 0.0,
            last_move_time: 0.0,
            gen_steps_pre_active: 0.0,
            gen_steps_post_active: 0.0,
        }
    }

    /// Seed `commanded_pos` from an XYZ coordinate using a synthetic,
    /// motionless segment - used when a stepper's position is set
    /// directly (homing, `SET_KINEMATIC_POSITION`) rather than by
    /// replaying queued moves.
    pub fn set_position(&mut self, x: f64, y: f64, z: f64) {
        self.commanded_pos = calc_position_from_coord(&self.kinematics, x, y, z);
    }
}

/// Evaluate a stepper's position from a plain XYZ coordinate, without a
/// real segment. Used for homing and `SET_KINEMATIC_POSITION`.
pub fn calc_position_from_coord<K: StepperKinematics>(k: &K, x: f64, y: f64, z: f64) -> f64 {
    let mut tmp = SegQ::new();
    tmp.add_move(SegqMove { print_time: 0.0, move_t: 1000.0, start_v: 0.0, half_accel: 0.0, sixth_jerk: 0.0, start_pos: [x, y, z], axes_r: [0.0; 3] });
    k.calc_position(&tmp, 0, 500.0)
}

/// Whether `axis` ('x'..='z') is one this stepper's motion depends on.
pub fn is_active_axis(active_flags: u8, axis: char) -> Result<bool> {
    if !('x'..='z').contains(&axis) {
        return Err(Error::InvalidAxis(axis));
    }
    let bit = AF_X << (axis as u8 - b'x');
    Ok(active_flags & bit != 0)
}

fn check_active(active_flags: u8, m: &SegqMove) -> bool {
    (active_flags & AF_X != 0 && m.axes_r[0] != 0.0)
        || (active_flags & AF_Y != 0 && m.axes_r[1] != 0.0)
        || (active_flags & AF_Z != 0 && m.axes_r[2] != 0.0)
}

/// A virtual segment standing in for "past the end of the queue",
/// playing the role of `segq.c`'s ever-future tail sentinel.
fn segment_at(segq: &SegQ, idx: usize) -> SegqMove {
    match segq.get(idx) {
        Some(m) => *m,
        None => SegqMove { print_time: NEVER_TIME, move_t: 0.0, start_v: 0.0, half_accel: 0.0, sixth_jerk: 0.0, start_pos: [0.0; 3], axes_r: [0.0; 3] },
    }
}

#[derive(Debug, Clone, Copy)]
struct TimePos {
    time: f64,
    position: f64,
}

/// Bisect `[low, high]` via false position (regula falsi) for the time
/// at which this stepper's commanded position crosses `target`.
fn find_step<K: StepperKinematics>(
    k: &K,
    segq: &SegQ,
    idx: usize,
    mut low: TimePos,
    mut high: TimePos,
    target: f64,
) -> TimePos {
    let best_guess_init = high;
    low.position -= target;
    high.position -= target;
    if high.position == 0.0 {
        return best_guess_init;
    }
    let high_sign = high.position.is_sign_negative();
    if high_sign == low.position.is_sign_negative() {
        return TimePos { time: low.time, position: target };
    }

    let mut best_guess = best_guess_init;
    loop {
        let guess_time = (low.time * high.position - high.time * low.position) / (high.position - low.position);
        if (guess_time - best_guess.time).abs() <= 1e-9 {
            break;
        }
        best_guess.time = guess_time;
        best_guess.position = k.calc_position(segq, idx, guess_time);
        let guess_position = best_guess.position - target;
        let guess_sign = guess_position.is_sign_negative();
        if guess_sign == high_sign {
            high.time = guess_time;
            high.position = guess_position;
        } else {
            low.time = guess_time;
            low.position = guess_position;
        }
    }
    best_guess
}

const SEEK_TIME_RESET: f64 = 0.000_100;

/// Walk `[move_start, move_end)` in half-step increments, appending a
/// step each time the commanded position crosses a half-step boundary.
/// Handles direction reversals by shrinking the search window instead
/// of restarting it, so a stepper that oscillates near a single
/// position doesn't thrash.
#[allow(clippy::too_many_arguments)]
fn gen_steps_range<K: StepperKinematics>(
    k: &K,
    segq: &SegQ,
    idx: usize,
    sc: &mut dyn StepCompress,
    commanded_pos: &mut f64,
    step_dist: f64,
    m: &SegqMove,
    move_start: f64,
    move_end: f64,
) -> Result<()> {
    let half_step = 0.5 * step_dist;
    let start = move_start - m.print_time;
    let end = move_end - m.print_time;
    let mut last = TimePos { time: start, position: *commanded_pos };
    let mut low = last;
    let mut high = last;
    let mut seek_time_delta = SEEK_TIME_RESET;
    let mut sdir = sc.get_step_dir();
    let mut is_dir_change = false;

    loop {
        let diff = high.position - last.position;
        let dist = if sdir { diff } else { -diff };
        if dist >= half_step {
            let target = last.position + if sdir { half_step } else { -half_step };
            let next = find_step(k, segq, idx, low, high, target);
            sc.append(sdir, m.print_time, next.time)?;
            seek_time_delta = next.time - last.time;
            if seek_time_delta < 1e-9 {
                seek_time_delta = 1e-9;
            }
            if is_dir_change && seek_time_delta > SEEK_TIME_RESET {
                seek_time_delta = SEEK_TIME_RESET;
            }
            is_dir_change = false;
            last.position = target + if sdir { half_step } else { -half_step };
            last.time = next.time;
            low = next;
            if low.time < high.time {
                continue;
            }
        } else if dist > 0.0 {
            sc.commit();
        } else if dist < -(half_step + 1e-9) {
            is_dir_change = true;
            if seek_time_delta > SEEK_TIME_RESET {
                seek_time_delta = SEEK_TIME_RESET;
            }
            if low.time > last.time {
                sdir = !sdir;
                continue;
            }
            if high.time > last.time + 1e-9 {
                high.time = (last.time + high.time) * 0.5;
                high.position = k.calc_position(segq, idx, high.time);
                continue;
            }
        }
        if high.time >= end {
            break;
        }
        low = high;
        loop {
            high.time = last.time + seek_time_delta;
            seek_time_delta += seek_time_delta;
            if high.time > low.time {
                break;
            }
        }
        if high.time > end {
            high.time = end;
        }
        high.position = k.calc_position(segq, idx, high.time);
    }
    *commanded_pos = last.position;
    Ok(())
}

/// Generate every step this stepper needs for segments up to
/// `flush_time`, widened by `gen_steps_pre_active`/`gen_steps_post_active`
/// around the windows where the stepper is actually active.
pub fn generate_steps<K: StepperKinematics>(
    solver: &mut IterativeSolver<K>,
    segq: &SegQ,
    sc: &mut dyn StepCompress,
    flush_time: f64,
) -> Result<()> {
    let mut last_flush_time = solver.last_flush_time;
    solver.last_flush_time = flush_time;

    let mut idx = 0usize;
    let mut m = segment_at(segq, idx);
    while last_flush_time >= m.print_time + m.move_t {
        idx += 1;
        m = segment_at(segq, idx);
    }

    let mut force_steps_time = solver.last_move_time + solver.gen_steps_post_active;
    let active_flags = solver.kinematics.active_flags();
    loop {
        if last_flush_time >= flush_time {
            return Ok(());
        }
        let mut start = m.print_time;
        let mut end = start + m.move_t;
        if start < last_flush_time {
            start = last_flush_time;
        }
        if end > flush_time {
            end = flush_time;
        }

        if check_active(active_flags, &m) {
            if solver.gen_steps_pre_active > 0.0 && start > last_flush_time + 1e-9 {
                force_steps_time = start;
                if last_flush_time < start - solver.gen_steps_pre_active {
                    last_flush_time = start - solver.gen_steps_pre_active;
                }
                while idx > 0 && m.print_time > last_flush_time {
                    idx -= 1;
                    m = segment_at(segq, idx);
                }
                continue;
            }
            gen_steps_range(&solver.kinematics, segq, idx, sc, &mut solver.commanded_pos, solver.step_dist, &m, start, end)?;
            solver.last_move_time = end;
            last_flush_time = end;
            force_steps_time = end + solver.gen_steps_post_active;
        } else if start < force_steps_time {
            if end > force_steps_time {
                end = force_steps_time;
            }
            gen_steps_range(&solver.kinematics, segq, idx, sc, &mut solver.commanded_pos, solver.step_dist, &m, start, end)?;
            last_flush_time = end;
        }

        if flush_time + solver.gen_steps_pre_active <= m.print_time + m.move_t {
            return Ok(());
        }
        idx += 1;
        m = segment_at(segq, idx);
    }
}

/// The time at which this stepper next becomes active within
/// `[last_flush_time, flush_time]`, or 0 if it stays idle throughout.
pub fn check_active_time<K: StepperKinematics>(solver: &IterativeSolver<K>, segq: &SegQ, flush_time: f64) -> f64 {
    let mut idx = 0usize;
    let mut m = segment_at(segq, idx);
    while solver.last_flush_time >= m.print_time + m.move_t {
        idx += 1;
        m = segment_at(segq, idx);
    }
    let active_flags = solver.kinematics.active_flags();
    loop {
        if check_active(active_flags, &m) {
            return m.print_time;
        }
        if flush_time <= m.print_time + m.move_t {
            return 0.0;
        }
        idx += 1;
        m = segment_at(segq, idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A stepper directly on the X axis: commanded position == X coordinate.
    struct LinearXKinematics;

    impl StepperKinematics for LinearXKinematics {
        fn active_flags(&self) -> u8 {
            AF_X
        }
        fn calc_position(&self, segq: &SegQ, idx: usize, time: f64) -> f64 {
            let m = segq.get(idx).unwrap();
            let dist = m.distance(time);
            m.start_pos[0] + m.axes_r[0] * dist
        }
    }

    struct RecordingStepCompress {
        steps: Vec<(bool, f64)>,
        dir: bool,
    }

    impl StepCompress for RecordingStepCompress {
        fn append(&mut self, sdir: bool, print_time: f64, step_time: f64) -> Result<()> {
            self.steps.push((sdir, print_time + step_time));
            self.dir = sdir;
            Ok(())
        }
        fn commit(&mut self) {}
        fn get_step_dir(&self) -> bool {
            self.dir
        }
    }

    #[test]
    fn constant_velocity_move_generates_evenly_spaced_steps() {
        let mut segq = SegQ::new();
        segq.add_move(SegqMove { print_time: 0.0, move_t: 1.0, start_v: 100.0, half_accel: 0.0, sixth_jerk: 0.0, start_pos: [0.0, 0.0, 0.0], axes_r: [1.0, 0.0, 0.0] });

        let mut solver = IterativeSolver::new(LinearXKinematics, 0.01);
        let mut sc = RecordingStepCompress { steps: Vec::new(), dir: true };
        generate_steps(&mut solver, &segq, &mut sc, 1.0).unwrap();

        assert!(!sc.steps.is_empty());
        assert!(sc.steps.iter().all(|(dir, _)| *dir));
        for w in sc.steps.windows(2) {
            assert!(w[1].1 > w[0].1);
        }
    }

    #[test]
    fn idle_stepper_generates_no_steps() {
        let mut segq = SegQ::new();
        segq.add_move(SegqMove { print_time: 0.0, move_t: 1.0, start_v: 100.0, half_accel: 0.0, sixth_jerk: 0.0, start_pos: [0.0, 0.0, 0.0], axes_r: [0.0, 1.0, 0.0] });

        let mut solver = IterativeSolver::new(LinearXKinematics, 0.01);
        let mut sc = RecordingStepCompress { steps: Vec::new(), dir: true };
        generate_steps(&mut solver, &segq, &mut sc, 1.0).unwrap();
        assert!(sc.steps.is_empty());
    }

    #[test]
    fn is_active_axis_rejects_extruder() {
        assert_eq!(is_active_axis(AF_X, 'e'), Err(Error::InvalidAxis('e')));
        assert_eq!(is_active_axis(AF_X, 'x'), Ok(true));
        assert_eq!(is_active_axis(AF_X, 'y'), Ok(false));
    }
}
