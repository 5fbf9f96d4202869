//! Error types for the motion core.

use thiserror::Error;

/// Errors that can occur while driving the move queue, segment queue,
/// iterative step generator or step compressor.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// `reserve` was called when the move queue has no free slots.
    #[error("move queue is full (capacity {capacity})")]
    QueueFull {
        /// The queue's fixed capacity.
        capacity: usize,
    },

    /// A queue capacity was requested that is not a non-zero power of two.
    #[error("queue capacity {0} is not a non-zero power of two")]
    NonPowerOfTwoCapacity(usize),

    /// A stepper kinematics was asked about an axis outside 'x'..='z'.
    #[error("axis {0:?} is not one of x, y, z")]
    InvalidAxis(char),

    /// The MCU command grammar rejected a value outside its wire range.
    #[error(transparent)]
    Protocol(#[from] mcu_proto::ProtoError),
}

pub type Result<T> = core::result::Result<T, Error>;
