//! Interrupt to task hand-over.
//!
//! The interrupt path only clears and observes the status registers. Everything
//! that converts or reprograms runs in task context from a [Request].
use heapless::spsc::Queue;

use crate::{settings::ThresholdConfig, state::Observation, threshold::Param};

/// Power management capability driven by the comparator state.
pub trait Throttle {
    /// Raise (`true`) or release (`false`) the thermal throttle.
    fn set_throttle(&mut self, raised: bool);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// An instance changed state or overflowed.
    StateChanged(Observation),
    /// Replace the threshold configuration.
    Reprogram(ThresholdConfig),
    /// Set a single threshold to a temperature in degrees Celsius.
    SetThreshold(Param, i32),
}

/// Request channel from the interrupt to the task context.
pub type Requests<const N: usize> = Queue<Request, N>;
