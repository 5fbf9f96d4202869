//! Stress tests exercising queue-capacity limits, high step rates, and
//! lookahead across many small segments.

use motion::itersolve::generate_steps;
use motion::{error::Error, Axis, CartesianKinematics, IterativeSolver, Move, MoveQueue, SegQ, StepCompressor, StepMessage, TrapezoidalPlanner};

#[test]
fn reserve_past_capacity_errors() {
    let mut q = MoveQueue::new(64).unwrap();
    for i in 0..64 {
        let x0 = i as f64;
        let m = Move::new([x0, 0.0, 0.0, 0.0], [x0 + 1.0, 0.0, 0.0, 0.0], 10.0, 100.0, 100.0, 1000.0);
        q.reserve(m).unwrap();
        q.commit();
    }
    let m = Move::new([0.0; 4], [1.0, 0.0, 0.0, 0.0], 10.0, 100.0, 100.0, 1000.0);
    assert_eq!(q.reserve(m), Err(Error::QueueFull { capacity: 64 }));
}

#[test]
fn high_step_rate_move_never_emits_a_zero_interval() {
    let mut queue = MoveQueue::new(8).unwrap();
    // 200mm at 2500mm/s, 62500 mm/s^2 acceleration: a high step-rate move.
    let m = Move::new([0.0; 4], [200.0, 0.0, 0.0, 0.0], 2500.0, 62_500.0, 62_500.0, 1_000_000.0);
    queue.reserve(m).unwrap();
    queue.commit();

    let mut segq = SegQ::new();
    TrapezoidalPlanner::flush(&mut queue, false, &mut segq, None);
    let end_time = segq.next_print_time();

    let mut solver = IterativeSolver::new(CartesianKinematics { axis: Axis::X }, 1.0 / 80.0);
    let mut sc = StepCompressor::new(0, 2, false);
    sc.set_time(0.0, 100_000_000.0);
    generate_steps(&mut solver, &segq, &mut sc, end_time).unwrap();
    sc.flush(u64::MAX).unwrap();

    let mut saw_any = false;
    while let Some(qm) = sc.pop_message() {
        saw_any = true;
        if let StepMessage::QueueStep { interval } = qm.msg {
            assert_ne!(interval, 0, "a single uncompressed step must never have a zero interval");
        }
    }
    assert!(saw_any);
}

#[test]
fn many_small_segments_with_junction_deviation_keep_cornering_speed() {
    let mut queue = MoveQueue::new(256).unwrap();
    let segments = 64;
    let radius = 50.0;

    let mut prev: Option<Move> = None;
    for i in 1..=segments {
        let angle = (i as f64 / segments as f64) * 2.0 * std::f64::consts::PI;
        let x = radius * angle.cos();
        let y = radius * angle.sin();
        let start = prev.map(|p| p.end_pos).unwrap_or([radius, 0.0, 0.0, 0.0]);
        let mut m = Move::new(start, [x, y, 0.0, 0.0], 100.0, 2000.0, 2000.0, 50_000.0);
        if let Some(p) = prev {
            m.calc_junction(&p, 0.05, 0.0);
        }
        queue.reserve(m).unwrap();
        queue.commit();
        prev = Some(m);
    }

    let mut segq = SegQ::new();
    let flushed = TrapezoidalPlanner::flush(&mut queue, false, &mut segq, None);
    assert_eq!(flushed, segments);
    assert!(!segq.is_empty());

    // With junction-deviation cornering, moves don't all independently
    // decelerate to a full stop at every vertex.
    let full_stops = (0..segq.len())
        .filter(|&i| segq.get(i).unwrap().start_v.abs() < 1e-6 && segq.get(i).unwrap().half_accel > 0.0)
        .count();
    assert!(full_stops < segments, "expected junction deviation to avoid stopping at every corner");
}
