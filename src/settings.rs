//! Run-time threshold settings.
use miniconf::{Leaf, Tree};
use serde::{Deserialize, Serialize};

use crate::threshold::Targets;

/// Run-time thermal threshold configuration.
///
/// Temperatures are in whole degrees Celsius. Zero or negative values disable
/// the respective comparator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Tree, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Software interrupt (TH1)
    pub sw_intr_temperature: Leaf<i32>,

    /// Hardware clock divide by two (TH2)
    pub hw_clk_div_temperature: Leaf<i32>,

    /// Hardware reset (TH3)
    pub hw_reset_temperature: Leaf<i32>,

    /// Distance below the software interrupt temperature at which the interrupt
    /// de-asserts (TH0)
    pub hysteresis: Leaf<i32>,

    /// Arm the hardware clock divide and reset actions and their interrupts.
    pub hw_reset: Leaf<bool>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            sw_intr_temperature: Leaf(-1),
            hw_clk_div_temperature: Leaf(70),
            hw_reset_temperature: Leaf(75),
            hysteresis: Leaf(-1),
            hw_reset: Leaf(false),
        }
    }
}

impl ThresholdConfig {
    /// Target temperatures for the threshold programmer.
    pub fn targets(&self) -> Targets {
        Targets {
            sw_intr: *self.sw_intr_temperature,
            hysteresis: *self.hysteresis,
            hw_clk_div: *self.hw_clk_div_temperature,
            hw_reset: *self.hw_reset_temperature,
        }
    }
}
