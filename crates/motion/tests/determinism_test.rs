//! End-to-end determinism: planning the same moves twice through the
//! full trapezoidal -> segment queue -> iterative solver -> step
//! compressor pipeline produces byte-identical step schedules.

use motion::{
    itersolve::generate_steps, Axis, CartesianKinematics, IterativeSolver, Move, MoveQueue, SegQ, StepCompressor,
    StepMessage, TrapezoidalPlanner,
};

fn plan_steps(distance: f64, speed: f64, accel: f64) -> Vec<StepMessage> {
    let mut queue = MoveQueue::new(8).unwrap();
    let m = Move::new([0.0, 0.0, 0.0, 0.0], [distance, 0.0, 0.0, 0.0], speed, accel, accel, 100_000.0);
    queue.reserve(m).unwrap();
    queue.commit();

    let mut segq = SegQ::new();
    let flushed = TrapezoidalPlanner::flush(&mut queue, false, &mut segq, None);
    assert_eq!(flushed, 1);
    let end_time = segq.next_print_time();

    let mut solver = IterativeSolver::new(CartesianKinematics { axis: Axis::X }, 1.0 / 80.0);
    let mut sc = StepCompressor::new(0, 2, false);
    sc.set_time(0.0, 1_000_000.0);
    generate_steps(&mut solver, &segq, &mut sc, end_time).unwrap();
    sc.flush(u64::MAX).unwrap();

    let mut out = Vec::new();
    while let Some(qm) = sc.pop_message() {
        out.push(qm.msg);
    }
    out
}

#[test]
fn identical_moves_produce_identical_step_schedules() {
    let a = plan_steps(10.0, 20.0, 1000.0);
    let b = plan_steps(10.0, 20.0, 1000.0);
    assert_eq!(a, b);
    assert!(!a.is_empty());
}

#[test]
fn a_to_rest_move_emits_step_commands() {
    let msgs = plan_steps(50.0, 25.0, 500.0);
    let total_steps: usize = msgs
        .iter()
        .map(|m| match m {
            StepMessage::QueueStep { .. } => 1,
            StepMessage::QueueSteps { count, .. } => *count as usize,
            StepMessage::Raw(_) | StepMessage::SetNextStepDir { .. } => 0,
        })
        .sum();
    // 50mm at 80 steps/mm.
    assert_eq!(total_steps, 4000);
}
