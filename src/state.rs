//! Active instance selection and comparator state tracking.
use log::{info, warn};
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::Serialize;
use tsensor_registers::{Instance, Status0};

/// Fuse revision from which on instance 0 is used.
pub const FUSE_REVISION_INSTANCE0: u32 = 21;
/// Fuse revision from which on instance 1 is used, up to [FUSE_REVISION_INSTANCE0].
pub const FUSE_REVISION_INSTANCE1: u32 = 8;

/// Pick the instance reporting temperature and carrying the thresholds.
pub fn select_active_instance(fuse_revision: u32) -> Instance {
    let instance = if fuse_revision >= FUSE_REVISION_INSTANCE0 {
        Instance::Tsensor0
    } else if fuse_revision >= FUSE_REVISION_INSTANCE1 {
        Instance::Tsensor1
    } else {
        warn!("Tsensor fuse revision {fuse_revision} predates calibration");
        Instance::Tsensor0
    };
    info!("Tsensor active instance: {instance:?}");
    instance
}

/// Comparator state of an instance, ordered by temperature.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    FromPrimitive,
    IntoPrimitive,
    Serialize,
)]
#[repr(u8)]
pub enum TsState {
    #[default]
    Invalid = 0,
    Level0 = 1,
    Level1 = 2,
    Level2 = 3,
    Level3 = 4,
    Overflow = 5,
}

/// Previous and current state as latched by the hardware.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub previous: TsState,
    pub state: TsState,
}

impl From<Status0> for Transition {
    fn from(status: Status0) -> Self {
        Self {
            previous: TsState::from(status.prev_state().value()),
            state: TsState::from(status.state().value()),
        }
    }
}

/// A serviced interrupt of one instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub instance: Instance,
    pub transition: Transition,
    /// The state differs from the last recorded one.
    pub changed: bool,
}

impl Observation {
    pub fn overflow(&self) -> bool {
        self.transition.state == TsState::Overflow
    }
}

/// Evaluate a STATUS0 snapshot against the last recorded state.
///
/// Returns `None` if the instance had no interrupt pending. Every transition is
/// accepted and recorded.
pub fn observe(
    instance: Instance,
    status: Status0,
    recorded: &mut TsState,
) -> Option<Observation> {
    if !status.intr() {
        return None;
    }
    let transition = Transition::from(status);
    let observation = Observation {
        instance,
        transition,
        changed: transition.state != *recorded,
    };
    if observation.overflow() {
        warn!("Tsensor {instance:?} counter overflow");
    }
    if observation.changed {
        info!(
            "Tsensor {instance:?} state change: {:?} -> {:?}",
            *recorded, transition.state
        );
        *recorded = transition.state;
    }
    Some(observation)
}
