//! Wires a [`MotionConfig`](crate::config::MotionConfig) and a flat move
//! list into the motion core and prints the resulting MCU commands.
//!
//! This owns exactly the objects SPEC_FULL.md §6's "Host → core" surface
//! names: one `MoveQueue`, one XYZ `SegQ` (plus an optional extruder
//! `SegQ`), one `StepperKinematics`/`StepCompressor` pair per configured
//! stepper, and one `StepperSync` to merge their compressed output.

use anyhow::{bail, Context, Result};
use mcu_proto::codec::encode_frame;
use motion::extruder::ExtruderStepper;
use motion::itersolve::{generate_steps, IterativeSolver, StepCompress};
use motion::jerk::JerkPlanner;
use motion::kinematics::{Axis, CartesianKinematics, CoreXYBelt, CoreXYKinematics};
use motion::move_queue::{Move, MoveQueue};
use motion::segq::{SegQ, NEVER_TIME};
use motion::stepcompress::StepCompressor;
use motion::steppersync::StepperSync;
use motion::trapezoidal::TrapezoidalPlanner;

use crate::config::{MotionConfig, PlannerKind, StepperConfig, StepperKind};
use crate::moves::MoveTarget;

/// One stepper's solver, generic over whichever kinematics its
/// configuration selects. `generate_steps` is generic over `K`, so
/// steppers with different kinematics can't share one `Vec<
/// IterativeSolver<_>>` without this dispatch.
enum Solver {
    Cartesian(IterativeSolver<CartesianKinematics>),
    CoreXY(IterativeSolver<CoreXYKinematics>),
    Extruder(IterativeSolver<ExtruderStepper>),
}

impl Solver {
    fn generate_steps(&mut self, segq: &SegQ, sc: &mut dyn StepCompress, flush_time: f64) -> motion::error::Result<()> {
        match self {
            Solver::Cartesian(s) => generate_steps(s, segq, sc, flush_time),
            Solver::CoreXY(s) => generate_steps(s, segq, sc, flush_time),
            Solver::Extruder(s) => generate_steps(s, segq, sc, flush_time),
        }
    }
}

fn build_axis_solver(cfg: &StepperConfig) -> Solver {
    let mut solver = match cfg.kind {
        StepperKind::CartesianX => Solver::Cartesian(IterativeSolver::new(CartesianKinematics { axis: Axis::X }, cfg.step_dist)),
        StepperKind::CartesianY => Solver::Cartesian(IterativeSolver::new(CartesianKinematics { axis: Axis::Y }, cfg.step_dist)),
        StepperKind::CartesianZ => Solver::Cartesian(IterativeSolver::new(CartesianKinematics { axis: Axis::Z }, cfg.step_dist)),
        StepperKind::CoreXYA => Solver::CoreXY(IterativeSolver::new(CoreXYKinematics { belt: CoreXYBelt::A }, cfg.step_dist)),
        StepperKind::CoreXYB => Solver::CoreXY(IterativeSolver::new(CoreXYKinematics { belt: CoreXYBelt::B }, cfg.step_dist)),
    };
    match &mut solver {
        Solver::Cartesian(s) => {
            s.gen_steps_pre_active = cfg.gen_steps_pre_active;
            s.gen_steps_post_active = cfg.gen_steps_post_active;
        }
        Solver::CoreXY(s) => {
            s.gen_steps_pre_active = cfg.gen_steps_pre_active;
            s.gen_steps_post_active = cfg.gen_steps_post_active;
        }
        Solver::Extruder(_) => unreachable!("build_axis_solver never builds an extruder solver"),
    }
    solver
}

/// A stepper's solver, compressor and which segment queue it reads from.
struct Stepper {
    solver: Solver,
    compressor: StepCompressor,
    extruder: bool,
}

/// Run every move in `targets` through the configured planner and print
/// the resulting MCU commands, one `encode_frame`-framed, hex-encoded
/// line per command, to stdout.
pub fn run(config: &MotionConfig, targets: &[MoveTarget]) -> Result<()> {
    if targets.is_empty() {
        bail!("the moves file contains no moves");
    }

    let mut queue = MoveQueue::new(config.move_queue_capacity()).context("building the move queue")?;
    let mut segq = SegQ::new();
    let mut extruder_segq = config.extruder.as_ref().map(|_| SegQ::new());

    let mut steppers: Vec<Stepper> = config
        .steppers
        .iter()
        .map(|s| Stepper {
            solver: build_axis_solver(s),
            compressor: StepCompressor::new(s.oid, s.max_error, s.invert_sdir),
            extruder: false,
        })
        .collect();

    if let Some(e) = &config.extruder {
        let mut solver = IterativeSolver::new(ExtruderStepper::new(), e.step_dist);
        ExtruderStepper::set_smooth_time(&mut solver, e.smooth_time);
        steppers.push(Stepper {
            solver: Solver::Extruder(solver),
            compressor: StepCompressor::new(e.oid, e.max_error, e.invert_sdir),
            extruder: true,
        });
    }

    let mut pos = [0.0; 4];
    for target in targets {
        let feedrate = target.feedrate.unwrap_or(config.planner.speed);
        let mut m = Move::new(pos, target.pos, feedrate, config.planner.accel, config.planner.accel_to_decel, config.planner.jerk);
        if !queue.is_empty() {
            let prev = *queue.get(queue.len() - 1);
            m.calc_junction(&prev, config.planner.junction_deviation, config.planner.extruder_instant_v);
        }
        queue.reserve(m).context("move queue is full; raise move_queue_capacity in the configuration")?;
        queue.commit();
        pos = target.pos;
    }

    let move_count = targets.len();
    let flushed = match config.planner.kind {
        PlannerKind::Trapezoidal => TrapezoidalPlanner::flush(&mut queue, false, &mut segq, extruder_segq.as_mut()),
        PlannerKind::Jerk => JerkPlanner::new().flush(&mut queue, false, &mut segq, extruder_segq.as_mut()),
    };
    if flushed != move_count {
        bail!("planner flushed {flushed} of {move_count} moves; a non-lazy flush should always drain the queue");
    }

    let flush_time = segq.next_print_time();
    let flush_time = if flush_time >= NEVER_TIME { 0.0 } else { flush_time };

    for stepper in &mut steppers {
        let segq_ref = if stepper.extruder { extruder_segq.as_ref().unwrap_or(&segq) } else { &segq };
        stepper
            .solver
            .generate_steps(segq_ref, &mut stepper.compressor, flush_time)
            .with_context(|| format!("generating steps for stepper oid {}", stepper.compressor.oid()))?;
    }

    let mcu_freq = config.mcu.freq;
    let mut compressors: Vec<StepCompressor> = steppers.into_iter().map(|s| s.compressor).collect();
    let mut sync = StepperSync::new(compressors.len().max(1));
    sync.set_time(&mut compressors, 0.0, mcu_freq);

    let move_clock = (flush_time * mcu_freq) as u64 + 1;
    let batch = sync.flush(&mut compressors, move_clock).context("merging compressed stepper commands")?;

    let mut seq = 0u8;
    for qm in &batch {
        let oid = u8::try_from(qm.oid).with_context(|| format!("oid {} does not fit the wire format's u8 range", qm.oid))?;
        let cmd = qm.msg.to_host_command(oid).context("converting a compressed step message to a wire command")?;
        let mut frame = Vec::new();
        encode_frame(&cmd, seq, &mut frame).context("encoding an MCU command frame")?;
        seq = seq.wrapping_add(1);
        println!("{}", hex_string(&frame));
    }

    Ok(())
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::MoveTarget;

    fn cartesian_config(oid: u32) -> MotionConfig {
        let toml = format!(
            r#"
            [mcu]
            freq = 16000000.0

            [planner]
            speed = 50.0
            accel = 3000.0
            accel_to_decel = 1500.0
            junction_deviation = 0.05

            [[steppers]]
            name = "x"
            oid = {oid}
            kind = "cartesian_x"
            step_dist = 0.0125
            max_error = 2
            "#
        );
        toml::from_str(&toml).unwrap()
    }

    fn target(x: f64) -> MoveTarget {
        MoveTarget { pos: [x, 0.0, 0.0, 0.0], feedrate: None }
    }

    #[test]
    fn rejects_an_empty_move_list() {
        let config = cartesian_config(0);
        let err = run(&config, &[]).unwrap_err();
        assert!(err.to_string().contains("no moves"));
    }

    #[test]
    fn runs_a_single_stepper_move_end_to_end() {
        let config = cartesian_config(0);
        let targets = vec![target(10.0), target(20.0)];
        run(&config, &targets).expect("a plain cartesian move should drive the pipeline to completion");
    }

    #[test]
    fn runs_a_jerk_planner_move_end_to_end() {
        let mut config = cartesian_config(0);
        config.planner.kind = PlannerKind::Jerk;
        let targets = vec![target(10.0), target(20.0)];
        run(&config, &targets).expect("the jerk planner should drive the pipeline to completion too");
    }

    #[test]
    fn rejects_an_oid_outside_the_wire_format_range() {
        let config = cartesian_config(1000);
        let targets = vec![target(10.0), target(20.0)];
        let err = run(&config, &targets).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }
}
