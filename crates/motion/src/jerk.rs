//! Feedrate planner for moves with a 7-segment jerk-limited speed profile
//! (`+j, 0, -j, 0, -j, 0, +j`), based on "FIR filter-based online
//! jerk-constrained trajectory generation" by Besset & Béarée.

use crate::extruder::append_extrude_jerk_move;
use crate::mathutil::newton_raphson;
use crate::move_queue::{Move, MoveQueue};
use crate::segq::{SegQ, NEVER_TIME};

const JERK_MULTIPLIERS: [f64; 7] = [1.0, 0.0, -1.0, 0.0, -1.0, 0.0, 1.0];

/// Highest end velocity reachable from `start_v` over `distance` while
/// respecting `max_a` and `jerk`, ignoring any downstream moves. Branches
/// between the Newton-Raphson search (short moves, where the move never
/// reaches a constant-acceleration plateau) and a closed-form quartic
/// root (long moves).
pub fn max_allowed_jerk_end_speed(distance: f64, start_v: f64, end_v: f64, max_a: f64, jerk: f64) -> f64 {
    let tolerance = 1e-6;
    let max_a_2 = max_a * max_a;
    let max_a_3 = max_a_2 * max_a;
    let max_a_dist = max_a_3 / (jerk * jerk) + 2.0 * max_a * start_v / jerk;
    if distance < max_a_dist {
        let d2 = distance * distance;
        let res = newton_raphson(
            |r| {
                let v = r.x;
                let x0 = v - start_v;
                let x1 = v + start_v;
                r.y = (x1 / jerk) * x0 * x1 - d2;
                r.dy = x1 * (3.0 * v - start_v) / jerk;
            },
            start_v,
            end_v,
            tolerance,
            16,
        );
        res.x
    } else {
        let max_a_4 = max_a_3 * max_a;
        let mut v = 8.0 * max_a * distance + 4.0 * start_v * start_v;
        v *= jerk;
        v -= 4.0 * max_a_2 * start_v;
        v *= jerk;
        v += max_a_4;
        v = v.sqrt();
        v -= max_a_2;
        v / (2.0 * jerk)
    }
}

/// Whether a move of `distance` can accelerate all the way from
/// `start_v` to `end_v` under jerk limiting without distance left over.
pub fn can_accelerate_fully(distance: f64, start_v: f64, end_v: f64, accel: f64, jerk: f64) -> bool {
    let mut jerk_t2 = end_v - start_v;
    jerk_t2 /= jerk;
    jerk_t2 *= 2.0;
    let a_div_jerk = accel / jerk;

    let d = if jerk_t2 > a_div_jerk * a_div_jerk {
        let d1 = (end_v * end_v - start_v * start_v) / (2.0 * accel);
        let mut d2 = accel * accel / (12.0 * jerk);
        d2 += start_v;
        d2 *= accel / (2.0 * jerk);
        d1 + d2
    } else {
        let mut d = jerk_t2.sqrt();
        d *= 2.0 * start_v + end_v;
        d / 3.0
    };
    d > distance
}

/// Solve the jerk-limited profile for `m` between `start_v` and `end_v`,
/// adapting through the Type II / Type III / Type IIII-a/b/c cases of the
/// Besset-Béarée construction when the nominal profile can't reach
/// `max_cruise_v2` within `m`'s distance.
pub fn calculate_jerk(m: &mut Move, start_v: f64, end_v: f64) {
    let tolerance = 1e-9;
    let time_tolerance = 1e-6;

    let mut max_v = m.max_cruise_v2.sqrt().max(start_v).max(end_v);
    let distance = m.move_d;
    let jerk = m.jerk;
    let mut accel = m.accel;
    let abs_max_v = max_v;

    if (start_v - end_v).abs() <= tolerance && (start_v - max_v).abs() <= tolerance {
        let cruise_t = distance / max_v;
        m.start_v = start_v;
        m.cruise_v = max_v;
        m.end_v = end_v;
        m.jerk_t = [0.0, 0.0, 0.0, cruise_t, 0.0, 0.0, 0.0];
        return;
    }

    let mut decel = accel;
    let mut delta_accel_v = max_v - start_v;
    let mut delta_decel_v = max_v - end_v;
    let accel_const_t0 = delta_accel_v / accel - accel / jerk;
    let decel_const_t0 = delta_decel_v / decel - decel / jerk;

    if accel_const_t0 < 0.0 {
        accel = (jerk * delta_accel_v).sqrt();
    }
    if decel_const_t0 < 0.0 {
        decel = (jerk * delta_decel_v).sqrt();
    }

    let mut dist_cruise;
    if accel > 0.0 && decel > 0.0 {
        let start_v2 = start_v * start_v;
        let max_v2 = max_v * max_v;
        let end_v2 = end_v * end_v;
        let accel_decel = accel * decel;
        let two_accel_decel = 2.0 * accel_decel;
        let two_accel_decel_jerk = two_accel_decel * jerk;
        let two_accel_decel_distance_jerk = two_accel_decel_jerk * distance;

        dist_cruise = accel * start_v + accel * max_v + decel * max_v + decel * end_v;
        dist_cruise *= -accel_decel;
        dist_cruise += two_accel_decel_distance_jerk;
        dist_cruise += accel * jerk * (end_v2 - max_v2);
        dist_cruise += decel * jerk * (start_v2 - max_v2);
        dist_cruise /= two_accel_decel_jerk;

        if dist_cruise < 0.0 {
            dist_cruise = 0.0;
            let m_accel_m_decel = -accel - decel;
            let accel_2 = accel * accel;
            let decel_2 = decel * decel;

            let a = m_accel_m_decel / two_accel_decel;
            let b = m_accel_m_decel / (2.0 * jerk);
            let mut c = -accel_2 * decel * start_v;
            c -= decel_2 * accel * end_v;
            c += two_accel_decel_distance_jerk;
            c += accel * jerk * end_v2;
            c += decel * jerk * start_v2;
            c /= two_accel_decel_jerk;

            // b is always negative; use the Citardauq form for stability
            // when a*c is small relative to b^2.
            max_v = 2.0 * c / (-b + (b * b - 4.0 * a * c).sqrt());

            delta_accel_v = max_v - start_v;
            delta_decel_v = max_v - end_v;
            let accel_const_t = delta_accel_v / accel - accel / jerk;
            let decel_const_t = delta_decel_v / decel - decel / jerk;

            if accel_const_t < 0.0 {
                if decel_const_t < 0.0 {
                    // Type IIII-c
                    max_v = start_v.max(end_v) + tolerance;
                    let x0 = jerk * start_v;
                    let x1 = jerk * end_v;
                    let x2 = jerk * start_v2;
                    let x3 = jerk * end_v2;
                    let res = newton_raphson(
                        |r| {
                            let v = r.x;
                            let y0 = jerk * v;
                            let y1 = y0 - x0;
                            let y2 = y0 - x1;
                            let y3 = (y0 - x0).sqrt();
                            let y4 = (y0 - x1).sqrt();
                            let y5 = 2.0 * y1 * y3;
                            let y6 = 2.0 * y2 * y4;
                            let y7 = v * v;
                            let y8 = jerk * y7;
                            let y9 = 2.0 * v;
                            let mut y = distance;
                            y += (start_v2 - y7) / y3;
                            y += (end_v2 - y7) / y4;
                            r.y = y;
                            let mut dy = (y8 - x2) / y5;
                            dy += (y8 - x3) / y6;
                            dy -= y9 / y3;
                            dy -= y9 / y4;
                            r.dy = dy;
                        },
                        max_v,
                        abs_max_v,
                        tolerance,
                        16,
                    );
                    max_v = res.x;
                    accel = (jerk * (max_v - start_v)).sqrt();
                    decel = (jerk * (max_v - end_v)).sqrt();
                } else {
                    // Type IIII-a
                    max_v = start_v.max(end_v) + tolerance;
                    let x0 = 2.0 * jerk;
                    let x1 = 2.0 * decel;
                    let decel_2 = decel * decel;
                    let res = newton_raphson(
                        |r| {
                            let v = r.x;
                            let y0 = v * v;
                            let y1 = v - start_v;
                            let y2 = jerk * y1;
                            let y3 = y2.sqrt();
                            let y4 = x0 * y1;
                            let mut y = -distance;
                            y += (y0 - start_v2) / (2.0 * y3);
                            y += (y0 - end_v2) / x1;
                            y += v * y3 / jerk;
                            y += (decel * (v + end_v) - y3 * y1) / x0;
                            r.y = y;
                            let mut dy = decel_2 * y1;
                            dy += decel * y3 * (3.0 * v - start_v);
                            dy += y4 * v;
                            dy /= y4 * decel;
                            r.dy = dy;
                        },
                        max_v,
                        abs_max_v,
                        tolerance,
                        16,
                    );
                    max_v = res.x;
                    accel = (jerk * (max_v - start_v)).sqrt();
                }
            } else if decel_const_t < 0.0 {
                // Type IIII-b
                max_v = start_v.max(end_v) + tolerance;
                let x0 = 2.0 * jerk;
                let x1 = 2.0 * accel;
                let res = newton_raphson(
                    |r| {
                        let v = r.x;
                        let y0 = v * v;
                        let y1 = v - end_v;
                        let y2 = jerk * y1;
                        let y3 = y2.sqrt();
                        let y4 = x0 * y1;
                        let mut y = -distance;
                        y += (y0 - end_v2) / (2.0 * y3);
                        y += (y0 - start_v2) / x1;
                        y += accel * v / jerk;
                        y += (accel * (start_v - v) + y3 * (v + end_v)) / x0;
                        r.y = y;
                        let mut dy = accel * y1;
                        dy += accel * y3 * (3.0 * v - end_v);
                        dy += y4 * v;
                        dy /= y4 * accel;
                        r.dy = dy;
                    },
                    max_v,
                    abs_max_v,
                    tolerance,
                    16,
                );
                max_v = res.x;
                decel = (jerk * (max_v - end_v)).sqrt();
            }
        }
    } else if decel > 0.0 {
        dist_cruise = distance;
        dist_cruise -= (max_v * max_v - end_v * end_v) / (2.0 * decel);
        dist_cruise -= (decel * (max_v + end_v)) / (2.0 * jerk);
    } else {
        dist_cruise = distance;
        dist_cruise -= (max_v * max_v - start_v * start_v) / (2.0 * accel);
        dist_cruise -= (accel * (start_v - max_v)) / (2.0 * jerk);
        dist_cruise -= (accel * max_v) / jerk;
    }

    let mut accel_jerk_t = accel / jerk;
    if accel_jerk_t < time_tolerance {
        accel_jerk_t = 0.0;
    }
    let mut decel_jerk_t = decel / jerk;
    if decel_jerk_t < time_tolerance {
        decel_jerk_t = 0.0;
    }
    delta_accel_v = max_v - start_v;
    delta_decel_v = max_v - end_v;
    let accel_t = if accel > 0.0 { delta_accel_v / accel } else { 0.0 };
    let decel_t = if decel > 0.0 { delta_decel_v / decel } else { 0.0 };
    let mut accel_const_t = accel_t - accel_jerk_t;
    let mut decel_const_t = decel_t - decel_jerk_t;

    m.jerk = jerk;
    m.start_v = start_v;
    m.cruise_v = max_v;
    m.end_v = end_v;
    let mut cruise_t = dist_cruise / max_v;

    if accel_const_t < time_tolerance {
        accel_const_t = 0.0;
    }
    if cruise_t < time_tolerance {
        cruise_t = 0.0;
    }
    if decel_const_t < time_tolerance {
        decel_const_t = 0.0;
    }

    m.jerk_t = [
        accel_jerk_t,
        accel_const_t,
        accel_jerk_t,
        cruise_t,
        decel_jerk_t,
        decel_const_t,
        decel_jerk_t,
    ];
}

/// The (accel, jerk, max_cruise_v2) view a move exposes when another
/// move asks whether it can be coalesced with it. Passed as an `Option`
/// rather than reading possibly-stale fields behind a boolean flag.
struct NextMoveView {
    accel: f64,
    jerk: f64,
    max_cruise_v2: f64,
}

fn try_combine_with_next(
    next: Option<&NextMoveView>,
    distance: f64,
    start_v: f64,
    end_v: f64,
    end_v2: f64,
    accel: f64,
    jerk: f64,
) -> (bool, f64) {
    let reachable_end_v = max_allowed_jerk_end_speed(distance, start_v, end_v, accel, jerk);
    let next = match next {
        Some(n) if n.accel == accel && n.jerk == jerk => n,
        _ => return (false, reachable_end_v),
    };
    if reachable_end_v >= end_v {
        return (false, reachable_end_v);
    }
    if next.max_cruise_v2 == end_v2 {
        return (true, end_v);
    }
    (can_accelerate_fully(distance, start_v, end_v, accel, jerk), reachable_end_v)
}

fn calculate_x(x: f64, v: f64, a: f64, j: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    x + v * t + 0.5 * a * t2 + j * t3 / 6.0
}

fn calculate_v(v: f64, a: f64, j: f64, t: f64) -> f64 {
    v + a * t + 0.5 * j * t * t
}

fn calculate_a(a: f64, j: f64, t: f64) -> f64 {
    a + j * t
}

/// A coalesced run of one or more consecutive moves that share
/// `(accel, jerk)`, planned once as a single jerk-limited profile and
/// later sliced back into the individual moves' `jerk_t` arrays.
struct VirtualMove {
    move_count: usize,
    start_move_index: usize,

    start_v: f64,
    accel: f64,
    distance: f64,
    jerk: f64,
    end_v: f64,
    cruise_v: f64,

    x: f64,
    v: f64,
    a: f64,
    segment_start_x: f64,
    segment_start_v: f64,
    segment_start_a: f64,
    segment_end_x: f64,
    segment_end_v: f64,
    segment_end_a: f64,
    current_segment: usize,
    current_segment_offset: f64,

    profile: Move,
}

impl VirtualMove {
    fn new(start_v: f64, accel: f64, jerk: f64) -> VirtualMove {
        VirtualMove {
            move_count: 0,
            start_move_index: 0,
            start_v,
            accel,
            distance: 0.0,
            jerk,
            end_v: 0.0,
            cruise_v: 0.0,
            x: 0.0,
            v: 0.0,
            a: 0.0,
            segment_start_x: 0.0,
            segment_start_v: 0.0,
            segment_start_a: 0.0,
            segment_end_x: 0.0,
            segment_end_v: 0.0,
            segment_end_a: 0.0,
            current_segment: 0,
            current_segment_offset: 0.0,
            profile: Move::new([0.0; 4], [0.0; 4], 1.0, 1.0, 0.0, 1.0),
        }
    }

    fn append_move(&mut self, index: usize) {
        if self.move_count == 0 {
            self.move_count = 1;
            self.start_move_index = index;
        } else {
            self.move_count += 1;
        }
    }

    fn calculate_profile(&mut self) {
        let mut profile = Move::new([0.0; 4], [self.distance, 0.0, 0.0, 0.0], self.cruise_v, self.accel, self.accel, self.jerk);
        calculate_jerk(&mut profile, self.start_v, self.end_v);
        self.profile = profile;
    }

    fn calculate_segment_end(&mut self) {
        let j = JERK_MULTIPLIERS[self.current_segment] * self.jerk;
        let t = self.profile.jerk_t[self.current_segment];
        self.segment_end_x = calculate_x(self.segment_start_x, self.segment_start_v, self.segment_start_a, j, t);
        self.segment_end_v = calculate_v(self.segment_start_v, self.segment_start_a, j, t);
        self.segment_end_a = calculate_a(self.segment_start_a, j, t);
        self.current_segment_offset = 0.0;
    }

    fn calculate_first_segment(&mut self) {
        self.x = 0.0;
        self.v = self.start_v;
        self.a = 0.0;
        self.segment_start_x = self.x;
        self.segment_start_v = self.v;
        self.segment_start_a = self.a;
        self.current_segment = 0;
        self.calculate_segment_end();
    }

    fn calculate_next_segment(&mut self) {
        self.x = self.segment_end_x;
        self.v = self.segment_end_v;
        self.a = self.segment_end_a;
        self.segment_start_x = self.x;
        self.segment_start_v = self.v;
        self.segment_start_a = self.a;
        self.current_segment += 1;
        self.calculate_segment_end();
    }

    /// Find the time within the current segment where this virtual
    /// move's position reaches `d`; returns the elapsed time since the
    /// previous call (i.e. the duration of a real move's slice of this
    /// segment).
    fn move_to(&mut self, d: f64) -> f64 {
        let tolerance = 1e-16;
        let x0 = self.segment_start_x - d;
        let v0 = self.segment_start_v;
        let a0 = self.segment_start_a;
        let j = JERK_MULTIPLIERS[self.current_segment] * self.jerk;

        let res = newton_raphson(
            |r| {
                let t = r.x;
                r.y = calculate_x(x0, v0, a0, j, t);
                r.dy = calculate_v(v0, a0, j, t);
            },
            0.0,
            self.profile.jerk_t[self.current_segment],
            tolerance,
            16,
        );
        let t = res.x;
        self.x = res.y;
        self.v = res.dy;
        self.a = calculate_a(a0, j, t);
        let ret = t - self.current_segment_offset;
        self.current_segment_offset = t;
        ret
    }
}

const GEN_TOLERANCE: f64 = 1e-9;

fn forward_pass(queue: &MoveQueue, size: usize, start_v: f64) -> Vec<VirtualMove> {
    let mut vmoves: Vec<VirtualMove> = Vec::new();
    let mut v_move_idx: Option<usize> = None;
    let mut current_v = start_v;

    for i in 0..size {
        let mv = *queue.get(i);
        let (next_view, end_v2) = if i != size - 1 {
            let nm = queue.get(i + 1);
            (
                Some(NextMoveView { accel: nm.accel, jerk: nm.jerk, max_cruise_v2: nm.max_cruise_v2 }),
                nm.max_junction_v2,
            )
        } else {
            (None, mv.max_cruise_v2)
        };

        if v_move_idx.is_none() {
            vmoves.push(VirtualMove::new(current_v, mv.accel, mv.jerk));
            v_move_idx = Some(vmoves.len() - 1);
        }
        let end_v = end_v2.sqrt();
        let idx = v_move_idx.unwrap();
        vmoves[idx].append_move(i);
        vmoves[idx].distance += mv.move_d;

        let (can_combine, reachable_end_v) = try_combine_with_next(
            next_view.as_ref(),
            vmoves[idx].distance,
            vmoves[idx].start_v,
            end_v,
            end_v2,
            vmoves[idx].accel,
            vmoves[idx].jerk,
        );

        if !can_combine {
            current_v = end_v.min(reachable_end_v);
            vmoves[idx].end_v = current_v;
            vmoves[idx].cruise_v = vmoves[idx].end_v.max(mv.max_cruise_v2.sqrt());
            v_move_idx = None;
        }
    }
    vmoves
}

/// Returns the indices into `vmoves` that survive coalescing, in the
/// order they were finalized (latest-in-queue first).
fn backward_pass(vmoves: &mut [VirtualMove]) -> Vec<usize> {
    let mut current_v = 0.0;
    let mut output = Vec::new();
    let mut i = vmoves.len();
    while i > 0 {
        i -= 1;
        if vmoves[i].end_v > current_v {
            vmoves[i].end_v = current_v;
        }
        let start_v = vmoves[i].start_v;
        let start_v2 = start_v * start_v;
        let distance = vmoves[i].distance;
        let from_v = vmoves[i].end_v;
        let accel = vmoves[i].accel;
        let jerk = vmoves[i].jerk;

        let next_view = if i > 0 {
            Some(NextMoveView {
                accel: vmoves[i - 1].accel,
                jerk: vmoves[i - 1].jerk,
                max_cruise_v2: vmoves[i - 1].cruise_v * vmoves[i - 1].cruise_v,
            })
        } else {
            None
        };

        let (can_combine, reachable_start_v) =
            try_combine_with_next(next_view.as_ref(), distance, from_v, start_v, start_v2, accel, jerk);

        if !can_combine {
            current_v = start_v.min(reachable_start_v);
            vmoves[i].start_v = current_v;
            output.push(i);
        } else {
            let d = vmoves[i].distance;
            let mc = vmoves[i].move_count;
            vmoves[i - 1].distance += d;
            vmoves[i - 1].move_count += mc;
        }
    }
    output
}

#[allow(clippy::too_many_arguments)]
fn generate_output_move(
    queue: &mut MoveQueue,
    move_idx: usize,
    vmove: &mut VirtualMove,
    queue_size: usize,
    move_count: &mut usize,
    flush_count: &mut usize,
    distance: &mut f64,
) {
    *move_count += 1;
    let mut d = *distance;
    d += queue.get(move_idx).move_d;

    let start_v = vmove.v;
    let start_a = vmove.a;
    let mut jerk_t = [0.0_f64; 7];
    let mut cruise_v = vmove.segment_end_v;
    let mut at_end = false;

    while d >= vmove.segment_end_x - GEN_TOLERANCE {
        let s = vmove.current_segment;
        jerk_t[s] = vmove.profile.jerk_t[s] - vmove.current_segment_offset;
        cruise_v = cruise_v.max(vmove.segment_start_v);
        if s == 6 {
            at_end = true;
            break;
        }
        vmove.calculate_next_segment();
    }

    let end_v = if d < vmove.segment_end_x - GEN_TOLERANCE {
        jerk_t[vmove.current_segment] = vmove.move_to(d);
        vmove.v
    } else {
        vmove.segment_end_v
    };

    let cruise_v = cruise_v.max(vmove.v);

    let mut target_end_v2 = queue.get(move_idx).max_cruise_v2;
    if *move_count < queue_size {
        target_end_v2 = queue.get(*move_count).max_junction_v2;
    }
    if vmove.current_segment == 3 || at_end {
        if (end_v * end_v - target_end_v2).abs() < GEN_TOLERANCE {
            *flush_count = *move_count;
        }
    }

    let m = queue.get_mut(move_idx);
    m.jerk = vmove.jerk;
    m.start_v = start_v.max(0.0);
    m.start_a = start_a;
    m.jerk_t = jerk_t;
    m.end_v = end_v.max(0.0);
    m.cruise_v = cruise_v;

    *distance = d;
}

fn generate_output_moves(
    queue: &mut MoveQueue,
    queue_size: usize,
    vmoves: &mut [VirtualMove],
    output_order: &[usize],
    move_count: &mut usize,
    flush_count: &mut usize,
) {
    for &idx in output_order.iter().rev() {
        let vmove = &mut vmoves[idx];
        vmove.calculate_profile();
        vmove.calculate_first_segment();
        let start = vmove.start_move_index;
        let count = vmove.move_count;
        let mut d = 0.0;
        for k in 0..count {
            generate_output_move(queue, start + k, vmove, queue_size, move_count, flush_count, &mut d);
        }
    }
}

/// Stateful jerk-limited feedrate planner; retains the committed exit
/// velocity of the last flush as the starting velocity for the next one.
pub struct JerkPlanner {
    current_v: f64,
}

impl Default for JerkPlanner {
    fn default() -> Self {
        JerkPlanner { current_v: 0.0 }
    }
}

impl JerkPlanner {
    pub fn new() -> JerkPlanner {
        JerkPlanner::default()
    }

    /// Plan the pending moves in `queue` and commit a prefix of them into
    /// final jerk-limited profiles. In `lazy` mode only moves up to the
    /// point where the top speed is definitively reached are flushed,
    /// preserving look-ahead for moves still arriving; set `lazy = false`
    /// to force every pending move to a full stop. When `extruder_segq`
    /// is `Some`, each flushed move's extrude axis is also appended there
    /// via [`append_extrude_jerk_move`], mirroring how a caller with a
    /// live extruder stepper drives both segment queues from the same
    /// solved moves.
    pub fn flush(&mut self, queue: &mut MoveQueue, lazy: bool, segq: &mut SegQ, mut extruder_segq: Option<&mut SegQ>) -> usize {
        let queue_size = queue.len();
        if queue_size == 0 {
            return 0;
        }

        let mut vmoves = forward_pass(queue, queue_size, self.current_v);
        let output_order = backward_pass(&mut vmoves);

        let mut move_count = 0usize;
        let mut flush_count = 0usize;
        generate_output_moves(queue, queue_size, &mut vmoves, &output_order, &mut move_count, &mut flush_count);

        let flush_count = if !lazy { move_count } else { flush_count };
        if flush_count > 0 {
            self.current_v = queue.get(flush_count - 1).end_v;
            let mut print_time = segq.next_print_time();
            if print_time >= NEVER_TIME {
                print_time = 0.0;
            }
            for i in 0..flush_count {
                let m = *queue.get(i);
                segq.append_jerk_move(print_time, &m);
                if let Some(extruder_segq) = extruder_segq.as_deref_mut() {
                    append_extrude_jerk_move(extruder_segq, print_time, &m);
                }
                print_time += m.jerk_t.iter().sum::<f64>();
            }
            queue.flush(flush_count);
        }
        flush_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with_moves(n: usize) -> MoveQueue {
        let mut q = MoveQueue::new(8).unwrap();
        for i in 0..n {
            let x0 = i as f64;
            let mut m = Move::new([x0, 0.0, 0.0, 0.0], [x0 + 1.0, 0.0, 0.0, 0.0], 10.0, 100.0, 100.0, 1000.0);
            if i > 0 {
                let prev = *q.get(i - 1);
                m.calc_junction(&prev, 0.05, 0.0);
            }
            q.reserve(m).unwrap();
            q.commit();
        }
        q
    }

    #[test]
    fn flush_all_brings_every_move_to_a_stop() {
        let mut q = queue_with_moves(3);
        let mut segq = SegQ::new();
        let mut planner = JerkPlanner::new();
        let flushed = planner.flush(&mut q, false, &mut segq, None);
        assert_eq!(flushed, 3);
        assert!(!segq.is_empty());
    }

    #[test]
    fn single_move_profile_sums_to_move_duration() {
        let mut q = MoveQueue::new(4).unwrap();
        let m = Move::new([0.0; 4], [10.0, 0.0, 0.0, 0.0], 20.0, 100.0, 100.0, 500.0);
        q.reserve(m).unwrap();
        q.commit();
        let mut segq = SegQ::new();
        let mut planner = JerkPlanner::new();
        planner.flush(&mut q, false, &mut segq, None);
    }

    #[test]
    fn max_allowed_jerk_end_speed_matches_start_when_stationary() {
        let v = max_allowed_jerk_end_speed(0.0, 0.0, 0.0, 100.0, 1000.0);
        assert!(v.abs() < 1e-3);
    }
}
