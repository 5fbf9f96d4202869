//! # Motion Crate
//!
//! A deterministic, host-side motion control core: a feedrate planner
//! producing trapezoidal or jerk-limited (7-segment) velocity profiles,
//! a segment queue handing planned moves to consumers in constant-time
//! slices, an iterative step generator turning those segments into
//! per-stepper step times for arbitrary kinematics (including extruder
//! pressure advance), and a step compressor/steppersync pair that fits
//! those step times to a handful of MCU commands.
//!
//! Module order mirrors the data flow: [`move_queue`] and [`trapezoidal`]
//! / [`jerk`] plan moves, [`segq`] queues their solved segments,
//! [`itersolve`] walks the queue per stepper via [`kinematics`] (or
//! [`extruder`]), and [`stepcompress`] / [`steppersync`] turn the
//! resulting step times into MCU-bound commands.

pub mod error;
pub mod extruder;
pub mod itersolve;
pub mod jerk;
pub mod kinematics;
pub mod mathutil;
pub mod move_queue;
pub mod segq;
pub mod stepcompress;
pub mod steppersync;
pub mod trapezoidal;

pub use error::{Error, Result};
pub use extruder::{append_extrude_jerk_move, append_extrude_move, ExtruderStepper};
pub use itersolve::{IterativeSolver, StepCompress, StepperKinematics};
pub use jerk::JerkPlanner;
pub use kinematics::{Axis, CartesianKinematics, CoreXYBelt, CoreXYKinematics};
pub use move_queue::{Move, MoveQueue};
pub use segq::{SegQ, SegqMove};
pub use stepcompress::{QueuedMessage, StepCompressor, StepMessage};
pub use steppersync::StepperSync;
pub use trapezoidal::TrapezoidalPlanner;
