//! Calibration, conversion and threshold programming for the on-chip temperature sensor.
//!
//! The sensor reports a raw oscillator counter per instance. Factory calibration
//! fuses two reference points which, combined with a per-revision quadratic
//! correction, map counters to temperatures and back. Hardware comparators trip on
//! counter thresholds derived from configured temperatures.
#![no_std]

pub mod calibration;
pub mod convert;
pub mod device;
pub mod event;
pub mod fixed_point;
pub mod selftest;
pub mod settings;
pub mod state;
pub mod threshold;

pub use calibration::{
    CalibrationPoint, CoefficientSet, Fuse, LinearCoefficients, QuadraticCoefficients,
};
pub use convert::{Model, Roots, Temperature};
pub use device::{Counters, ParamValue, Tsensor};
pub use event::{Request, Requests, Throttle};
pub use settings::ThresholdConfig;
pub use state::{Observation, Transition, TsState};
pub use threshold::{Param, Targets, ThresholdSet};
pub use tsensor_registers::{ChipRevision, Instance, Mmio, Register, RegisterBus};

/// Counter value that never trips a comparator.
pub const MAX_THRESHOLD: u16 = 0xffff;
/// Maximum distance in counts between a counter and its round-tripped root.
pub const COUNTER_TOLERANCE: i64 = 100;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Calibration fuses unavailable")]
    CalibrationUnavailable,
    #[error("Degenerate calibration")]
    DegenerateCalibration,
    #[error("No physical counter for {0} C")]
    NonPhysicalRoot(i32),
    #[error("Counter of {0:?} not valid in time")]
    CounterTimeout(Instance),
    #[error("Counter {counter} does not round trip: {first}, {second}")]
    CalibrationInconsistent { counter: u16, first: i64, second: i64 },
    #[error("{0:?} is stopped")]
    SensorStopped(Instance),
    #[error("Readback mismatch: wrote {expected:#x}, read {actual:#x}")]
    Readback { expected: u16, actual: u16 },
}
