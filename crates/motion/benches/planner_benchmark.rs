use criterion::{black_box, criterion_group, criterion_main, Criterion};
use motion::itersolve::generate_steps;
use motion::{Axis, CartesianKinematics, IterativeSolver, JerkPlanner, Move, MoveQueue, SegQ, StepCompressor, TrapezoidalPlanner};

fn queue_with_one_move() -> MoveQueue {
    let mut q = MoveQueue::new(8).unwrap();
    let m = Move::new([0.0, 0.0, 0.0, 0.0], [150.0, 50.0, 20.0, 0.0], 100.0, 1500.0, 1500.0, 100_000.0);
    q.reserve(m).unwrap();
    q.commit();
    q
}

fn bench_trapezoidal_flush(c: &mut Criterion) {
    c.bench_function("trapezoidal_flush_long_move", |b| {
        b.iter(|| {
            let mut queue = queue_with_one_move();
            let mut segq = SegQ::new();
            TrapezoidalPlanner::flush(black_box(&mut queue), false, &mut segq, None);
            black_box(&segq);
        })
    });
}

fn bench_jerk_flush(c: &mut Criterion) {
    c.bench_function("jerk_flush_long_move", |b| {
        b.iter(|| {
            let mut queue = queue_with_one_move();
            let mut segq = SegQ::new();
            let mut planner = JerkPlanner::new();
            planner.flush(black_box(&mut queue), false, &mut segq, None);
            black_box(&segq);
        })
    });
}

fn bench_step_generation(c: &mut Criterion) {
    let mut queue = queue_with_one_move();
    let mut segq = SegQ::new();
    TrapezoidalPlanner::flush(&mut queue, false, &mut segq, None);
    let end_time = segq.next_print_time();

    c.bench_function("generate_steps_long_move_x_axis", |b| {
        b.iter(|| {
            let mut solver = IterativeSolver::new(CartesianKinematics { axis: Axis::X }, 1.0 / 80.0);
            let mut sc = StepCompressor::new(0, 2, false);
            sc.set_time(0.0, 1_000_000.0);
            generate_steps(black_box(&mut solver), black_box(&segq), &mut sc, end_time).unwrap();
            black_box(&sc);
        })
    });
}

criterion_group!(benches, bench_trapezoidal_flush, bench_jerk_flush, bench_step_generation);
criterion_main!(benches);
