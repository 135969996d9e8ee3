//! Calibration self-test.
//!
//! A freshly derived model must map the live counter back onto itself before
//! any threshold is programmed from it.
use log::{error, info};

use crate::{convert::Model, Error, COUNTER_TOLERANCE};

/// Verify that the model maps `counter` onto itself through a temperature.
///
/// Converts the counter to a temperature, solves for the counters of that
/// (rounded) temperature and requires one of them within [COUNTER_TOLERANCE].
pub fn round_trip_check(model: &Model, counter: u16) -> Result<(), Error> {
    let temperature = model.counter_to_temperature(counter);
    let roots = model.temperature_to_counter(temperature.round())?;
    if roots.matches(counter as _, COUNTER_TOLERANCE) {
        info!("Tsensor self test passed: {counter} -> {temperature} C -> {roots:?}");
        Ok(())
    } else {
        error!("Tsensor self test failed: {counter} -> {temperature} C -> {roots:?}");
        Err(Error::CalibrationInconsistent {
            counter,
            first: roots.first,
            second: roots.second,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::calibration::{CoefficientSet, LinearCoefficients};

    #[test]
    fn consistent() {
        let model = Model::new(
            LinearCoefficients { a: 23214, b: -22571 },
            CoefficientSet::Set1.coefficients(),
        );
        for counter in [10800, 11418, 12000, 13600] {
            assert_eq!(round_trip_check(&model, counter), Ok(()));
        }
    }

    #[test]
    fn inconsistent() {
        // Coefficients characterized for a different fit
        let model = Model::new(
            LinearCoefficients { a: 65000, b: -4000 },
            CoefficientSet::Set1.coefficients(),
        );
        assert!(matches!(
            round_trip_check(&model, 600),
            Err(Error::CalibrationInconsistent { counter: 600, .. })
        ));
    }
}
