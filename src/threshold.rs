//! Comparator threshold programming.
//!
//! Each instance has four comparators. TH1 raises the software interrupt, TH2
//! divides the clock by two and TH3 resets the chip. TH0 is not an absolute counter
//! but the span below TH1 at which the software interrupt de-asserts.
use log::{debug, error, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use tsensor_registers::{Cfg1, Cfg2};

use crate::{convert::Model, Error, MAX_THRESHOLD};

/// Target temperatures in degrees Celsius, negative to disable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Targets {
    pub sw_intr: i32,
    pub hysteresis: i32,
    pub hw_clk_div: i32,
    pub hw_reset: i32,
}

/// User accessible thresholds by index.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum Param {
    /// Software interrupt
    Th1 = 0,
    /// Hardware clock divide
    Th2 = 1,
    /// Hardware reset
    Th3 = 2,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ThresholdSet {
    /// Hysteresis span below `th1`
    pub th0: u16,
    pub th1: u16,
    pub th2: u16,
    pub th3: u16,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ThresholdSet {
    /// No comparator trips.
    pub const DEFAULT: Self = Self {
        th0: MAX_THRESHOLD,
        th1: MAX_THRESHOLD,
        th2: MAX_THRESHOLD,
        th3: MAX_THRESHOLD,
    };

    pub fn get(&self, param: Param) -> u16 {
        match param {
            Param::Th1 => self.th1,
            Param::Th2 => self.th2,
            Param::Th3 => self.th3,
        }
    }

    pub fn set(&mut self, param: Param, counter: u16) {
        match param {
            Param::Th1 => self.th1 = counter,
            Param::Th2 => self.th2 = counter,
            Param::Th3 => self.th3 = counter,
        }
    }

    /// Register images carrying the thresholds.
    pub fn registers(&self) -> (Cfg1, Cfg2) {
        (
            Cfg1::default().with_th1(self.th1).with_th2(self.th2),
            Cfg2::default().with_th3(self.th3).with_th0(self.th0),
        )
    }

    pub fn from_registers(cfg1: Cfg1, cfg2: Cfg2) -> Self {
        Self {
            th0: cfg2.th0(),
            th1: cfg1.th1(),
            th2: cfg1.th2(),
            th3: cfg2.th3(),
        }
    }
}

/// Comparator counter for a temperature.
///
/// The second root is taken. A threshold is expected above the live counter
/// `current`; a warning flags calibration drift otherwise. Negative temperatures
/// and an unknown live counter disable the comparator.
pub fn threshold_counter(
    model: &Model,
    celsius: i32,
    current: Option<u16>,
) -> Result<u16, Error> {
    if celsius < 0 {
        return Ok(MAX_THRESHOLD);
    }
    let Some(current) = current else {
        warn!("No live counter, disabling threshold for {celsius} C");
        return Ok(MAX_THRESHOLD);
    };
    let roots = model.temperature_to_counter(celsius)?;
    if roots.second <= current as i64 {
        warn!(
            "Tsensor root for {celsius} C not above current counter {current}: {roots:?}"
        );
    }
    u16::try_from(roots.second).map_err(|_| {
        error!("Tsensor counter for {celsius} C out of range: {roots:?}");
        Error::NonPhysicalRoot(celsius)
    })
}

/// Compute the full threshold set.
///
/// A threshold that can not be converted keeps its `previous` value.
pub fn program(
    model: &Model,
    targets: &Targets,
    current: Option<u16>,
    previous: &ThresholdSet,
) -> ThresholdSet {
    let counter = |celsius: i32, previous: u16| {
        threshold_counter(model, celsius, current).unwrap_or_else(|e| {
            error!("Keeping threshold {previous:#x} for {celsius} C: {e}");
            previous
        })
    };
    let th1 = counter(targets.sw_intr, previous.th1);
    let th2 = counter(targets.hw_clk_div, previous.th2);
    let th3 = counter(targets.hw_reset, previous.th3);

    let th0 = if th1 == MAX_THRESHOLD || targets.hysteresis < 0 {
        MAX_THRESHOLD
    } else {
        match counter(targets.sw_intr - targets.hysteresis, MAX_THRESHOLD) {
            MAX_THRESHOLD => MAX_THRESHOLD,
            low => th1.wrapping_sub(low),
        }
    };

    let set = ThresholdSet { th0, th1, th2, th3 };
    debug!("Tsensor thresholds {targets:?} -> {set:?}");
    set
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::calibration::{CoefficientSet, LinearCoefficients};

    fn fit(set: CoefficientSet) -> Model {
        Model::new(LinearCoefficients { a: 23214, b: -22571 }, set.coefficients())
    }

    const TARGETS: Targets = Targets {
        sw_intr: 60,
        hysteresis: 5,
        hw_clk_div: 70,
        hw_reset: 75,
    };

    #[test]
    fn packing() {
        let set = ThresholdSet {
            th0: 209,
            th1: 12158,
            th2: 12585,
            th3: 12817,
        };
        let (cfg1, cfg2) = set.registers();
        assert_eq!(cfg1.raw_value(), (12585 << 16) | 12158);
        assert_eq!(cfg2.raw_value(), (209 << 16) | 12817);
        assert_eq!(ThresholdSet::from_registers(cfg1, cfg2), set);
        let (cfg1, cfg2) = ThresholdSet::DEFAULT.registers();
        assert_eq!((cfg1.raw_value(), cfg2.raw_value()), (u32::MAX, u32::MAX));
    }

    #[test]
    fn params() {
        let mut set = ThresholdSet::default();
        set.set(Param::Th2, 12585);
        assert_eq!(set.get(Param::Th2), 12585);
        assert_eq!(set.get(Param::Th1), MAX_THRESHOLD);
        assert_eq!(Param::try_from(2).ok(), Some(Param::Th3));
        assert!(Param::try_from(3).is_err());
    }

    #[test]
    fn counters() {
        let model = fit(CoefficientSet::Set1);
        assert_eq!(threshold_counter(&model, 70, Some(11418)), Ok(12585));
        // Drift is only warned about
        assert_eq!(threshold_counter(&model, 70, Some(13000)), Ok(12585));
        assert_eq!(threshold_counter(&model, -1, Some(11418)), Ok(MAX_THRESHOLD));
        assert_eq!(threshold_counter(&model, 0, Some(11418)), Ok(MAX_THRESHOLD));
        assert_eq!(threshold_counter(&model, 70, None), Ok(MAX_THRESHOLD));
    }

    #[test]
    fn full_set() {
        let set = program(
            &fit(CoefficientSet::Set1),
            &TARGETS,
            Some(11418),
            &ThresholdSet::DEFAULT,
        );
        assert_eq!(
            set,
            ThresholdSet {
                th0: 12158 - 11949,
                th1: 12158,
                th2: 12585,
                th3: 12817,
            }
        );

        let set = program(
            &fit(CoefficientSet::Set2),
            &TARGETS,
            Some(11418),
            &ThresholdSet::DEFAULT,
        );
        assert_eq!(
            set,
            ThresholdSet {
                th0: 12014 - 11830,
                th1: 12014,
                th2: 12400,
                th3: 12597,
            }
        );
    }

    #[test]
    fn disabled() {
        let model = fit(CoefficientSet::Set1);
        let targets = Targets {
            sw_intr: -1,
            hysteresis: 5,
            ..TARGETS
        };
        let set = program(&model, &targets, Some(11418), &ThresholdSet::DEFAULT);
        assert_eq!((set.th0, set.th1), (MAX_THRESHOLD, MAX_THRESHOLD));
        assert_eq!(set.th2, 12585);

        let targets = Targets {
            hysteresis: -1,
            ..TARGETS
        };
        let set = program(&model, &targets, Some(11418), &ThresholdSet::DEFAULT);
        assert_eq!((set.th0, set.th1), (MAX_THRESHOLD, 12158));
    }

    #[test]
    fn keeps_previous() {
        let model = fit(CoefficientSet::Set1);
        let previous = ThresholdSet {
            th0: 100,
            th1: 12000,
            th2: 12500,
            th3: 12800,
        };
        let targets = Targets {
            hw_reset: 200,
            ..TARGETS
        };
        let set = program(&model, &targets, Some(11418), &previous);
        assert_eq!(set.th3, 12800);
        assert_eq!(set.th2, 12585);
    }
}
