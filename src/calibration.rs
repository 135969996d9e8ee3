//! Factory calibration of the tsensor.
//!
//! # Design
//! Two reference points are fused per chip: counter F1 at temperature T1 (~25 C) and counter F2
//! at temperature T2 (~90 C). They define a linear counter to temperature estimate
//! `T = A * counter + B`. A quadratic fit characterized per chip revision then corrects that
//! estimate. All constants are carried as scaled integers:
//!
//! * `A`: 10^6 times actual
//! * `B`: 10^2 times actual
//! * `m`, `n`: 10^6 times actual
//! * `p`: 10^2 times actual
use log::{error, info, warn};
use tsensor_registers::{CalibrationFuse, ChipRevision, Instance, SpareBits};

use crate::{fixed_point::div_round_closest, Error};

/// Access to the one-time-programmable fuse words.
pub trait Fuse {
    type Error: core::fmt::Debug;

    /// F1 in the lower and F2 in the upper half word, see [CalibrationFuse].
    fn read_calibration(&mut self) -> Result<u32, Self::Error>;

    /// Redundant copies of T1 and T2, see [SpareBits].
    fn read_spare_bits(&mut self) -> Result<u32, Self::Error>;

    /// Fuse revision, selects the active instance.
    fn read_revision(&mut self) -> Result<u32, Self::Error>;
}

/// The two factory reference points.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CalibrationPoint {
    /// T1 in degrees Celsius
    pub temperature_low: i64,
    /// T2 in degrees Celsius
    pub temperature_high: i64,
    /// F1
    pub count_low: i64,
    /// F2
    pub count_high: i64,
}

impl CalibrationPoint {
    /// Extract the reference points from the fuses.
    pub fn load<F: Fuse>(fuse: &mut F) -> Result<Self, Error> {
        let unavailable = |e| {
            error!("Calibration fuse read failed: {e:?}");
            Error::CalibrationUnavailable
        };
        let counts = CalibrationFuse::new_with_raw_value(
            fuse.read_calibration().map_err(unavailable)?,
        );
        let spare =
            SpareBits::new_with_raw_value(fuse.read_spare_bits().map_err(unavailable)?);
        let point = Self::from_fuses(counts, spare);
        info!(
            "Tsensor fuse calibration F1={}, F2={}, T1={}, T2={}",
            point.count_low,
            point.count_high,
            point.temperature_low,
            point.temperature_high
        );
        Ok(point)
    }

    pub fn from_fuses(counts: CalibrationFuse, spare: SpareBits) -> Self {
        Self {
            temperature_low: spare.low_temperature() as _,
            temperature_high: spare.high_temperature() as _,
            count_low: counts.low() as _,
            count_high: counts.high() as _,
        }
    }

    /// The counter span has to exceed the temperature span for a usable fit.
    pub fn is_physical(&self) -> bool {
        self.count_high - self.count_low
            > self.temperature_high - self.temperature_low
    }
}

/// Linear fit `T = A * counter + B`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LinearCoefficients {
    /// 10^6 times actual
    pub a: i64,
    /// 10^2 times actual
    pub b: i64,
}

impl LinearCoefficients {
    pub fn derive(point: &CalibrationPoint) -> Result<Self, Error> {
        if point.count_high == point.count_low || !point.is_physical() {
            error!(
                "F2={} F1={} difference unexpectedly low",
                point.count_high, point.count_low
            );
            return Err(Error::DegenerateCalibration);
        }
        let a = (point.temperature_high - point.temperature_low) * 1_000_000
            / (point.count_high - point.count_low);
        let b = point.temperature_low * 100
            - div_round_closest(a * point.count_low, 10_000);
        info!("Tsensor linear fit A*1e6={a}, B*1e2={b}");
        Ok(Self { a, b })
    }
}

/// Quadratic correction `T_final = m * T^2 + n * T + p`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QuadraticCoefficients {
    /// 10^6 times actual
    pub m: i64,
    /// 10^6 times actual
    pub n: i64,
    /// 10^2 times actual
    pub p: i64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CoefficientSet {
    /// m=-0.002775 n=1.338811 p=-7.30
    Set1,
    /// m=-0.003512 n=1.528943 p=-11.10
    Set2,
}

impl CoefficientSet {
    /// Instance 0 is characterized separately from the chip revision.
    pub fn select(revision: ChipRevision, instance: Instance) -> Self {
        let set = match revision.minor().value() {
            1 => Self::Set1,
            minor => {
                warn!("Tsensor coefficients for chip minor revision {minor} pending");
                Self::Set1
            }
        };
        match instance {
            Instance::Tsensor0 => Self::Set2,
            Instance::Tsensor1 => set,
        }
    }

    pub const fn coefficients(self) -> QuadraticCoefficients {
        match self {
            Self::Set1 => QuadraticCoefficients {
                m: -2775,
                n: 1_338_811,
                p: -730,
            },
            Self::Set2 => QuadraticCoefficients {
                m: -3512,
                n: 1_528_943,
                p: -1110,
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    pub struct Fuses(pub Option<[u32; 3]>);

    impl Fuse for Fuses {
        type Error = ();

        fn read_calibration(&mut self) -> Result<u32, ()> {
            self.0.map(|f| f[0]).ok_or(())
        }

        fn read_spare_bits(&mut self) -> Result<u32, ()> {
            self.0.map(|f| f[1]).ok_or(())
        }

        fn read_revision(&mut self) -> Result<u32, ()> {
            self.0.map(|f| f[2]).ok_or(())
        }
    }

    fn point(t: (i64, i64), f: (i64, i64)) -> CalibrationPoint {
        CalibrationPoint {
            temperature_low: t.0,
            temperature_high: t.1,
            count_low: f.0,
            count_high: f.1,
        }
    }

    #[test]
    fn load() {
        let mut fuses = Fuses(Some([
            (13600 << 16) | 10800,
            // T2 in both copies, T1 split over both copies
            90 | (90 << 7) | (0x11 << 14) | (0x08 << 21),
            21,
        ]));
        assert_eq!(
            CalibrationPoint::load(&mut fuses),
            Ok(point((25, 90), (10800, 13600)))
        );
        assert_eq!(
            CalibrationPoint::load(&mut Fuses(None)),
            Err(Error::CalibrationUnavailable)
        );
    }

    #[test]
    fn linear() {
        let fit = LinearCoefficients::derive(&point((25, 90), (1000, 2000)));
        assert_eq!(fit, Ok(LinearCoefficients { a: 65000, b: -4000 }));
        let fit = LinearCoefficients::derive(&point((25, 90), (10800, 13600)));
        assert_eq!(fit, Ok(LinearCoefficients { a: 23214, b: -22571 }));
    }

    #[test]
    fn degenerate() {
        for p in [
            point((25, 90), (1000, 1000)),
            point((25, 90), (1000, 1065)),
            point((25, 90), (2000, 1000)),
            point((0, 0), (0, 0)),
        ] {
            assert_eq!(
                LinearCoefficients::derive(&p),
                Err(Error::DegenerateCalibration)
            );
        }
        assert!(LinearCoefficients::derive(&point((25, 90), (1000, 1066))).is_ok());
    }

    #[test]
    fn coefficient_selection() {
        let rev = |minor: u32| ChipRevision::new_with_raw_value(minor << 16);
        assert_eq!(
            CoefficientSet::select(rev(1), Instance::Tsensor1),
            CoefficientSet::Set1
        );
        assert_eq!(
            CoefficientSet::select(rev(3), Instance::Tsensor1),
            CoefficientSet::Set1
        );
        assert_eq!(
            CoefficientSet::select(rev(1), Instance::Tsensor0),
            CoefficientSet::Set2
        );
        assert_eq!(CoefficientSet::Set2.coefficients().p, -1110);
    }
}
