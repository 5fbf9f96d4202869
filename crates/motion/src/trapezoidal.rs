//! Feedrate planner for moves with a trapezoidal (accel/cruise/decel)
//! speed profile.

use crate::extruder::append_extrude_move;
use crate::move_queue::{set_trapezoidal_times, Move, MoveQueue};
use crate::segq::{SegQ, NEVER_TIME};

/// Solve the cruise velocity (squared) for a move given fixed start/end
/// velocities, then split it into accel/cruise/decel durations.
pub fn calculate_trapezoidal(m: &mut Move, start_v: f64, end_v: f64) {
    let max_v2 = m.max_cruise_v2;
    let start_v2 = start_v * start_v;
    let end_v2 = end_v * end_v;
    let accel = m.accel;
    let distance = m.move_d;
    // distance = (cruise_v2 - start_v2)/(2*accel) + (cruise_v2 - end_v2)/(2*accel)
    let mut cruise_v2 = distance * accel + 0.5 * (start_v2 + end_v2);
    cruise_v2 = cruise_v2.min(max_v2);
    set_trapezoidal_times(m, distance, start_v2, cruise_v2, end_v2, accel);
}

struct DelayedMove {
    index: usize,
    start_v2: f64,
    end_v2: f64,
}

/// Backward-traversal trapezoidal planner: finds, for each pending move,
/// the highest junction speed reachable in both directions, then
/// lazily computes full accel/cruise/decel timings once a following
/// move's peak cruise speed is known.
///
/// Returns the number of moves it flushed into the segment queue; in
/// `lazy` mode this can be 0 (not enough lookahead yet to commit to a
/// final speed for any move).
pub struct TrapezoidalPlanner;

impl TrapezoidalPlanner {
    /// Finalize as many queued moves' trapezoidal timings as lookahead
    /// allows, append them to `segq` in order, and drop them from
    /// `queue`. Returns how many moves were flushed; in `lazy` mode this
    /// can be 0 if there isn't yet enough lookahead to commit to a final
    /// speed for any move. When `extruder_segq` is `Some`, each flushed
    /// move's extrude axis is also appended there via
    /// [`append_extrude_move`], mirroring how a caller with a live
    /// extruder stepper drives both segment queues from the same solved
    /// moves.
    pub fn flush(queue: &mut MoveQueue, lazy: bool, segq: &mut SegQ, mut extruder_segq: Option<&mut SegQ>) -> usize {
        let size = queue.len();
        if size == 0 {
            return 0;
        }
        let mut update_flush_count = lazy;
        let mut flush_count = size;
        let mut delayed: Vec<DelayedMove> = Vec::new();
        let mut next_end_v2 = 0.0;
        let mut next_smoothed_v2 = 0.0;
        let mut peak_cruise_v2 = 0.0;

        for i in (0..size).rev() {
            let (reachable_start_v2, start_v2, reachable_smoothed_v2, smoothed_v2, max_cruise_v2, accel) = {
                let m = queue.get(i);
                let reachable_start_v2 = next_end_v2 + m.delta_v2;
                let start_v2 = m.max_start_v2.min(reachable_start_v2);
                let reachable_smoothed_v2 = next_smoothed_v2 + m.smooth_delta_v2;
                let smoothed_v2 = m.max_smoothed_v2.min(reachable_smoothed_v2);
                (reachable_start_v2, start_v2, reachable_smoothed_v2, smoothed_v2, m.max_cruise_v2, m.accel)
            };

            if smoothed_v2 < reachable_smoothed_v2 {
                if smoothed_v2 + { queue.get(i).smooth_delta_v2 } > next_smoothed_v2 || !delayed.is_empty() {
                    if update_flush_count && peak_cruise_v2 > 0.0 {
                        flush_count = i;
                        update_flush_count = false;
                    }
                    peak_cruise_v2 = max_cruise_v2.min((smoothed_v2 + reachable_smoothed_v2) * 0.5);
                    if !delayed.is_empty() {
                        if !update_flush_count && i < flush_count {
                            let mut mc_v2 = peak_cruise_v2;
                            for dm in delayed.iter().rev() {
                                mc_v2 = mc_v2.min(dm.start_v2);
                                let d = queue.get(dm.index).move_d;
                                let a = queue.get(dm.index).accel;
                                set_trapezoidal_times(
                                    queue.get_mut(dm.index),
                                    d,
                                    dm.start_v2,
                                    mc_v2,
                                    dm.end_v2,
                                    a,
                                );
                            }
                        }
                        delayed.clear();
                    }
                }
                if !update_flush_count && i < flush_count {
                    let cruise_v2 = ((start_v2 + reachable_start_v2) * 0.5)
                        .min(max_cruise_v2)
                        .min(peak_cruise_v2);
                    let d = queue.get(i).move_d;
                    set_trapezoidal_times(queue.get_mut(i), d, start_v2, cruise_v2, next_end_v2, accel);
                }
            } else {
                delayed.push(DelayedMove { index: i, start_v2, end_v2: next_end_v2 });
            }

            next_end_v2 = start_v2;
            next_smoothed_v2 = smoothed_v2;
        }

        if update_flush_count {
            return 0;
        }
        if flush_count > 0 {
            let mut print_time = segq.next_print_time();
            if print_time >= NEVER_TIME {
                print_time = 0.0;
            }
            for i in 0..flush_count {
                let m = *queue.get(i);
                segq.append_move(print_time, &m);
                if let Some(extruder_segq) = extruder_segq.as_deref_mut() {
                    append_extrude_move(extruder_segq, print_time, &m);
                }
                print_time += m.accel_t + m.cruise_t + m.decel_t;
            }
            queue.flush(flush_count);
        }
        flush_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::move_queue::Move;

    fn queue_with_moves(n: usize) -> MoveQueue {
        let mut q = MoveQueue::new(8).unwrap();
        for i in 0..n {
            let x0 = i as f64;
            let mut m = Move::new(
                [x0, 0.0, 0.0, 0.0],
                [x0 + 1.0, 0.0, 0.0, 0.0],
                10.0,
                100.0,
                100.0,
                1000.0,
            );
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
    fn non_lazy_flush_commits_every_move() {
        let mut q = queue_with_moves(4);
        let mut segq = SegQ::new();
        let flushed = TrapezoidalPlanner::flush(&mut q, false, &mut segq, None);
        assert_eq!(flushed, 4);
        assert_eq!(q.len(), 0);
        assert!(!segq.is_empty());
    }

    #[test]
    fn lazy_flush_may_hold_back_moves() {
        let mut q = queue_with_moves(4);
        let mut segq = SegQ::new();
        let flushed = TrapezoidalPlanner::flush(&mut q, true, &mut segq, None);
        assert!(flushed <= 4);
    }
}
