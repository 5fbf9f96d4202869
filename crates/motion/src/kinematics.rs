//! Illustrative stepper kinematics built on the iterative solver: a
//! stepper coupled directly to one Cartesian axis, and a CoreXY
//! transform. Real kinematics (deltas, winches, CoreXZ) follow the same
//! `StepperKinematics` pattern; which axes a stepper reports as active
//! is what lets [`crate::itersolve::generate_steps`] skip segments that
//! can't move it.

use crate::itersolve::{StepperKinematics, AF_X, AF_Y, AF_Z};
use crate::segq::SegQ;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// A stepper directly coupled to one Cartesian axis.
#[derive(Debug, Clone, Copy)]
pub struct CartesianKinematics {
    pub axis: Axis,
}

impl StepperKinematics for CartesianKinematics {
    fn active_flags(&self) -> u8 {
        match self.axis {
            Axis::X => AF_X,
            Axis::Y => AF_Y,
            Axis::Z => AF_Z,
        }
    }

    fn calc_position(&self, segq: &SegQ, idx: usize, time: f64) -> f64 {
        let m = segq.get(idx).expect("calc_position called with an out-of-range segment index");
        let i = match self.axis {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        };
        m.start_pos[i] + m.axes_r[i] * m.distance(time)
    }
}

/// Which belt a CoreXY stepper drives. See <https://corexy.com/theory.html>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreXYBelt {
    A,
    B,
}

/// A CoreXY stepper: `a = x + y`, `b = x - y`.
#[derive(Debug, Clone, Copy)]
pub struct CoreXYKinematics {
    pub belt: CoreXYBelt,
}

impl StepperKinematics for CoreXYKinematics {
    fn active_flags(&self) -> u8 {
        AF_X | AF_Y
    }

    fn calc_position(&self, segq: &SegQ, idx: usize, time: f64) -> f64 {
        let m = segq.get(idx).expect("calc_position called with an out-of-range segment index");
        let d = m.distance(time);
        let x = m.start_pos[0] + m.axes_r[0] * d;
        let y = m.start_pos[1] + m.axes_r[1] * d;
        match self.belt {
            CoreXYBelt::A => x + y,
            CoreXYBelt::B => x - y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segq::SegqMove;

    #[test]
    fn cartesian_axis_reads_its_own_coordinate() {
        let mut segq = SegQ::new();
        segq.add_move(SegqMove { print_time: 0.0, move_t: 1.0, start_v: 10.0, half_accel: 0.0, sixth_jerk: 0.0, start_pos: [0.0, 5.0, 0.0], axes_r: [0.0, 1.0, 0.0] });
        let k = CartesianKinematics { axis: Axis::Y };
        assert_eq!(k.calc_position(&segq, 0, 0.5), 10.0);
    }

    #[test]
    fn corexy_combines_x_and_y() {
        let mut segq = SegQ::new();
        segq.add_move(SegqMove { print_time: 0.0, move_t: 1.0, start_v: 10.0, half_accel: 0.0, sixth_jerk: 0.0, start_pos: [0.0, 0.0, 0.0], axes_r: [0.707, 0.707, 0.0] });
        let a = CoreXYKinematics { belt: CoreXYBelt::A };
        let b = CoreXYKinematics { belt: CoreXYBelt::B };
        let pa = a.calc_position(&segq, 0, 0.5);
        let pb = b.calc_position(&segq, 0, 0.5);
        assert!(pa > 0.0);
        assert!(pb.abs() < 1e-6);
    }
}
