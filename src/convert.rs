//! Counter and temperature conversion.
//!
//! The forward direction applies the linear fit and then the quadratic correction.
//! The inverse direction solves
//!
//! `m*A^2 * x^2 + A*(2mB + n) * x + (mB^2 + nB + p - T) = 0`
//!
//! for the counter `x`. Every intermediate term is rounded where it is formed; the
//! scaling of each term was chosen to keep the products in range and reordering
//! the operations changes the resulting register values.
use core::fmt;

use log::{error, trace};
use serde::{Deserialize, Serialize};

use crate::{
    calibration::{LinearCoefficients, QuadraticCoefficients},
    fixed_point::{ceil_pow10, div_round_closest, int_sqrt},
    Error, MAX_THRESHOLD,
};

/// A temperature in hundredths of a degree Celsius.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
pub struct Temperature(pub i32);

impl Temperature {
    pub const fn from_celsius(celsius: i32) -> Self {
        Self(celsius * 100)
    }

    /// Hundredths of a degree Celsius.
    pub const fn centi(self) -> i32 {
        self.0
    }

    /// Closest whole degree Celsius.
    pub const fn round(self) -> i32 {
        div_round_closest(self.0 as _, 100) as _
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Both solutions of the inverse quadratic.
///
/// Only one of them is physical; which one depends on the counter neighborhood
/// the caller operates in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Roots {
    pub first: i64,
    pub second: i64,
}

impl Roots {
    /// "Never trigger" for both roots.
    pub const UNSET: Self = Self {
        first: MAX_THRESHOLD as _,
        second: MAX_THRESHOLD as _,
    };

    /// Either root within `tolerance` counts of `counter`.
    pub fn matches(&self, counter: i64, tolerance: i64) -> bool {
        [self.first, self.second]
            .iter()
            .any(|root| root.abs_diff(counter) <= tolerance.unsigned_abs())
    }
}

/// Calibrated conversion model.
///
/// Pairs the linear fit of the fused reference points with a quadratic
/// correction set. The coefficients are not validated here; obtain the linear
/// part from [LinearCoefficients::derive].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Model {
    linear: LinearCoefficients,
    quadratic: QuadraticCoefficients,
}

impl Model {
    pub const fn new(
        linear: LinearCoefficients,
        quadratic: QuadraticCoefficients,
    ) -> Self {
        Self { linear, quadratic }
    }

    pub fn linear(&self) -> &LinearCoefficients {
        &self.linear
    }

    pub fn quadratic(&self) -> &QuadraticCoefficients {
        &self.quadratic
    }

    /// Linear estimate `A * counter + B`, 10^2 times actual.
    pub fn interim(&self, counter: u16) -> i64 {
        div_round_closest(self.linear.a * counter as i64, 10_000) + self.linear.b
    }

    /// Calibrated temperature of a raw counter.
    pub fn counter_to_temperature(&self, counter: u16) -> Temperature {
        let QuadraticCoefficients { m, n, p } = self.quadratic;
        let t = self.interim(counter);
        // m * T^2, 10^3 times actual
        let square = div_round_closest(
            div_round_closest(t * t, 100) * div_round_closest(m, 10),
            10_000,
        );
        // n * T, 10^3 times actual
        let linear = div_round_closest(t * div_round_closest(n, 100), 1000);
        let temperature = div_round_closest(square + linear + p * 10, 10);
        trace!("counter={counter:#x} interim={t} m*T^2={square} n*T={linear}");
        Temperature(temperature as _)
    }

    /// Counters at which the calibrated temperature reaches `celsius`.
    ///
    /// Zero and negative temperatures disable the threshold and map to [Roots::UNSET].
    pub fn temperature_to_counter(&self, celsius: i32) -> Result<Roots, Error> {
        if celsius <= 0 {
            return Ok(Roots::UNSET);
        }
        let LinearCoefficients { a, b } = self.linear;
        let QuadraticCoefficients { m, n, p } = self.quadratic;
        let t = celsius as i64;

        // 2mB + n, 10^6 times actual
        let linear_term = div_round_closest(2 * m * b, 100) + n;
        let linear_sq = div_round_closest(linear_term, 1000).pow(2);
        // mB^2 + nB, 10^4 times actual
        let constant = div_round_closest(
            div_round_closest(m * b, 1000) * div_round_closest(b, 10),
            100,
        ) + div_round_closest(div_round_closest(n, 100) * b, 100);
        // mB^2 + nB + p, 10^2 times actual
        let constant = div_round_closest(constant + p * 100, 100);
        let four_m = 4 * m;
        let discriminant =
            linear_sq - div_round_closest(constant * four_m, 100) + four_m * t;
        trace!(
            "2mB+n={linear_term} (2mB+n)^2={linear_sq} mB^2+nB+p={constant} disc={discriminant}"
        );
        if discriminant <= 0 {
            error!("No real counter for {celsius} C: discriminant {discriminant}");
            return Err(Error::NonPhysicalRoot(celsius));
        }

        // Take the roots of the operand and of its decimal magnitude separately
        // to keep precision in the square root.
        let multiplier = ceil_pow10(discriminant);
        let scale = int_sqrt(multiplier as _) as i64;
        let sqrt_discriminant = int_sqrt(discriminant as _) as i64 * 1_000_000 / scale;

        let denominator = div_round_closest(2 * m * a, 1_000_000);
        if denominator == 0 {
            error!("Degenerate quadratic for {celsius} C: 2mA={denominator}");
            return Err(Error::NonPhysicalRoot(celsius));
        }
        let roots = Roots {
            first: (-linear_term - sqrt_discriminant) / denominator,
            second: (-linear_term + sqrt_discriminant) / denominator,
        };
        trace!("{celsius} C: sqrt={sqrt_discriminant} 2mA={denominator} {roots:?}");
        Ok(roots)
    }
}
