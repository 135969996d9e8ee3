//! Device context for the tsensor block.
//!
//! # Design
//! The register file is shared between the interrupt path ([Tsensor::isr]) and
//! the task path (everything else). All register sequences run under a
//! [spin::Mutex] taken inside a critical section. Waits for a valid counter
//! release the lock between polls.
//!
//! Calibration and the conversion model are fixed at construction and read
//! without locking.
use core::ops::RangeInclusive;

use embedded_hal::delay::DelayNs;
use fugit::MillisDurationU32;
use heapless::{spsc::Producer, Vec};
use log::{debug, error, info, warn};
use serde::Serialize;
use strum::IntoEnumIterator;
use tsensor_registers::{
    Cfg0, Cfg1, Cfg2, ChipRevision, Instance, Register, RegisterBus, Status0,
    TsStatus1, TsStatus2,
};

use crate::{
    calibration::{CalibrationPoint, CoefficientSet, Fuse, LinearCoefficients},
    convert::{Model, Temperature},
    event::{Request, Throttle},
    selftest::round_trip_check,
    settings::ThresholdConfig,
    state::{observe, select_active_instance, Observation, TsState},
    threshold::{program, threshold_counter, Param, ThresholdSet},
    Error, MAX_THRESHOLD,
};

/// Oscillator measurement window
const M: u16 = 500;
/// Averaging
const N: u8 = 255;

const POLL_INTERVAL: MillisDurationU32 = MillisDurationU32::millis(21);
const COUNTER_POLLS: u32 = 50;
const SETUP_POLLS: u32 = 2000;

/// Temperatures covered by [Tsensor::chart].
const CHART: RangeInclusive<i32> = 30..=120;

/// Counter snapshot of an instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub current: u16,
    pub average: u16,
    pub min: u16,
    pub max: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ParamValue {
    /// The comparator never trips.
    Unset,
    Temperature(Temperature),
}

struct Inner<B> {
    bus: B,
    states: [TsState; Instance::COUNT],
    thresholds: ThresholdSet,
    config: ThresholdConfig,
    /// CFG0, CFG1, CFG2 per instance while suspended
    suspended: Option<[[u32; 3]; Instance::COUNT]>,
}

impl<B: RegisterBus> Inner<B> {
    fn cfg0(&mut self, instance: Instance) -> Cfg0 {
        Cfg0::new_with_raw_value(self.bus.read(instance, Register::Cfg0))
    }

    fn read_thresholds(&mut self, instance: Instance) -> ThresholdSet {
        ThresholdSet::from_registers(
            Cfg1::new_with_raw_value(self.bus.read(instance, Register::Cfg1)),
            Cfg2::new_with_raw_value(self.bus.read(instance, Register::Cfg2)),
        )
    }

    fn write_thresholds(&mut self, instance: Instance, set: &ThresholdSet) {
        let (cfg1, cfg2) = set.registers();
        self.bus.write(instance, Register::Cfg1, cfg1.raw_value());
        self.bus.write(instance, Register::Cfg2, cfg2.raw_value());
    }
}

/// Clock divide and reset actions together with their interrupts.
fn arm(cfg0: Cfg0, hw_reset: bool) -> Cfg0 {
    cfg0.with_hw_div2_enable(hw_reset)
        .with_reset_enable(hw_reset)
        .with_overflow_intr(hw_reset)
        .with_hw_div2_intr(hw_reset)
        .with_reset_intr(hw_reset)
}

pub struct Tsensor<B> {
    inner: spin::Mutex<Inner<B>>,
    calibration: CalibrationPoint,
    model: Model,
    active: Instance,
}

impl<B: RegisterBus> Tsensor<B> {
    /// Calibrate, start both instances and program the thresholds.
    ///
    /// Fails if the calibration is unusable, no instance delivers counters, or
    /// the calibrated model does not reproduce the live counter. The bus is
    /// handed back with the error. Instances that were already started are
    /// stopped and disarmed again.
    pub fn new<F: Fuse>(
        bus: B,
        fuse: &mut F,
        chip: ChipRevision,
        config: ThresholdConfig,
        delay: &mut impl DelayNs,
    ) -> Result<Self, (Error, B)> {
        let (calibration, active, model) = match Self::calibrate(fuse, chip) {
            Ok(calibrated) => calibrated,
            Err(e) => return Err((e, bus)),
        };

        let tsensor = Self {
            inner: spin::Mutex::new(Inner {
                bus,
                states: [TsState::Invalid; Instance::COUNT],
                thresholds: ThresholdSet::DEFAULT,
                config,
                suspended: None,
            }),
            calibration,
            model,
            active,
        };
        if let Err(e) = tsensor.start(delay) {
            error!("Tsensor setup failed: {e}");
            tsensor.stop();
            return Err((e, tsensor.release()));
        }

        tsensor.reprogram(config, delay);
        tsensor.chart();
        tsensor.dump_registers();
        Ok(tsensor)
    }

    fn calibrate<F: Fuse>(
        fuse: &mut F,
        chip: ChipRevision,
    ) -> Result<(CalibrationPoint, Instance, Model), Error> {
        let calibration = CalibrationPoint::load(fuse)?;
        let revision = fuse.read_revision().map_err(|e| {
            error!("Fuse revision read failed: {e:?}");
            Error::CalibrationUnavailable
        })?;
        let active = select_active_instance(revision);
        let set = CoefficientSet::select(chip, active);
        info!("Tsensor {active:?} using {set:?}");
        let model = Model::new(
            LinearCoefficients::derive(&calibration)?,
            set.coefficients(),
        );
        Ok((calibration, active, model))
    }

    /// Run both instances and gate on the self-test of the active one.
    fn start(&self, delay: &mut impl DelayNs) -> Result<(), Error> {
        self.configure(delay)?;
        let counters = self.read_counter(self.active, delay)?;
        round_trip_check(&self.model, counters.current)
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner<B>) -> R) -> R {
        critical_section::with(|_| f(&mut self.inner.lock()))
    }

    fn configure(&self, delay: &mut impl DelayNs) -> Result<(), Error> {
        self.with(|inner| {
            let hw_reset = *inner.config.hw_reset;
            for instance in Instance::iter() {
                let cfg0 = arm(
                    Cfg0::default().with_m(M).with_n(N).with_stop(true),
                    hw_reset,
                );
                inner.bus.write(instance, Register::Cfg0, cfg0.raw_value());
                inner.write_thresholds(instance, &ThresholdSet::DEFAULT);
                inner
                    .bus
                    .write(instance, Register::Cfg0, cfg0.with_stop(false).raw_value());
            }
        });

        let mut pending = [true; Instance::COUNT];
        for _ in 0..SETUP_POLLS {
            self.with(|inner| {
                for instance in Instance::iter() {
                    if !pending[instance.index()] {
                        continue;
                    }
                    let status = Status0::new_with_raw_value(
                        inner.bus.read(instance, Register::Status0),
                    );
                    if status.counter_valid() {
                        pending[instance.index()] = false;
                        inner.states[instance.index()] =
                            TsState::from(status.state().value());
                    }
                }
            });
            if !pending.contains(&true) {
                break;
            }
            delay.delay_ms(POLL_INTERVAL.to_millis());
        }

        for instance in Instance::iter().filter(|i| pending[i.index()]) {
            warn!("Tsensor {instance:?} counter not valid after setup");
        }
        if !pending.contains(&false) {
            return Err(Error::CounterTimeout(self.active));
        }
        debug!("Tsensor initial states: {:?}", self.with(|inner| inner.states));
        Ok(())
    }

    pub fn active(&self) -> Instance {
        self.active
    }

    pub fn calibration(&self) -> &CalibrationPoint {
        &self.calibration
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Last programmed thresholds of the active instance.
    pub fn thresholds(&self) -> ThresholdSet {
        self.with(|inner| inner.thresholds)
    }

    pub fn config(&self) -> ThresholdConfig {
        self.with(|inner| inner.config)
    }

    /// Last recorded comparator state.
    pub fn state(&self, instance: Instance) -> TsState {
        self.with(|inner| inner.states[instance.index()])
    }

    /// Wait for and read a valid counter sample.
    pub fn read_counter(
        &self,
        instance: Instance,
        delay: &mut impl DelayNs,
    ) -> Result<Counters, Error> {
        for _ in 0..COUNTER_POLLS {
            let sample = self.with(|inner| {
                if inner.cfg0(instance).stop() {
                    return Err(Error::SensorStopped(instance));
                }
                let status =
                    Status0::new_with_raw_value(inner.bus.read(instance, Register::Status0));
                if !status.counter_valid() {
                    return Ok(None);
                }
                let counters = TsStatus1::new_with_raw_value(
                    inner.bus.read(instance, Register::TsStatus1),
                );
                let extremes = TsStatus2::new_with_raw_value(
                    inner.bus.read(instance, Register::TsStatus2),
                );
                Ok(Some(Counters {
                    current: counters.current(),
                    average: counters.average(),
                    min: extremes.min(),
                    max: extremes.max(),
                }))
            })?;
            if let Some(counters) = sample {
                return Ok(counters);
            }
            delay.delay_ms(POLL_INTERVAL.to_millis());
        }
        error!("Tsensor {instance:?} counter not valid");
        Err(Error::CounterTimeout(instance))
    }

    /// Current temperature of the active instance.
    pub fn temperature(&self, delay: &mut impl DelayNs) -> Result<Temperature, Error> {
        let counters = self.read_counter(self.active, delay)?;
        Ok(self.model.counter_to_temperature(counters.current))
    }

    /// Temperature a threshold of the active instance is programmed to.
    pub fn param(&self, param: Param) -> ParamValue {
        match self.with(|inner| inner.read_thresholds(self.active).get(param)) {
            MAX_THRESHOLD => ParamValue::Unset,
            counter => ParamValue::Temperature(self.model.counter_to_temperature(counter)),
        }
    }

    /// Program a threshold of the active instance to a temperature in degrees Celsius.
    ///
    /// Returns the programmed counter.
    pub fn set_param(
        &self,
        param: Param,
        celsius: i32,
        delay: &mut impl DelayNs,
    ) -> Result<u16, Error> {
        let current = self.read_counter(self.active, delay)?.current;
        let counter = threshold_counter(&self.model, celsius, Some(current))?;
        self.with(|inner| {
            let mut set = inner.read_thresholds(self.active);
            set.set(param, counter);
            inner.write_thresholds(self.active, &set);
            let actual = inner.read_thresholds(self.active).get(param);
            if actual != counter {
                error!("Tsensor {param:?} readback {actual:#x} != {counter:#x}");
                return Err(Error::Readback {
                    expected: counter,
                    actual,
                });
            }
            inner.thresholds.set(param, counter);
            let target = match param {
                Param::Th1 => &mut inner.config.sw_intr_temperature,
                Param::Th2 => &mut inner.config.hw_clk_div_temperature,
                Param::Th3 => &mut inner.config.hw_reset_temperature,
            };
            **target = celsius;
            debug!("Tsensor {param:?} = {celsius} C ({counter:#x})");
            Ok(counter)
        })
    }

    /// Apply a new configuration and reprogram the active instance.
    pub fn reprogram(
        &self,
        config: ThresholdConfig,
        delay: &mut impl DelayNs,
    ) -> ThresholdSet {
        let current = self
            .read_counter(self.active, delay)
            .map_err(|e| warn!("Tsensor reprogram without live counter: {e}"))
            .ok()
            .map(|counters| counters.current);
        self.with(|inner| {
            let set = program(&self.model, &config.targets(), current, &inner.thresholds);
            inner.write_thresholds(self.active, &set);
            for instance in Instance::iter() {
                let cfg0 = arm(inner.cfg0(instance), *config.hw_reset);
                inner.bus.write(instance, Register::Cfg0, cfg0.raw_value());
            }
            inner.thresholds = set;
            inner.config = config;
            set
        })
    }

    /// Clear and evaluate pending interrupts of both instances.
    ///
    /// Interrupt context: only registers and the recorded states are touched.
    pub fn isr(&self) -> Vec<Observation, { Instance::COUNT }> {
        self.with(|inner| {
            let mut observations = Vec::new();
            for instance in Instance::iter() {
                let status = inner.bus.read(instance, Register::Status0);
                // Write one to clear
                inner.bus.write(instance, Register::Status0, status);
                if let Some(observation) = observe(
                    instance,
                    Status0::new_with_raw_value(status),
                    &mut inner.states[instance.index()],
                ) {
                    observations.push(observation).ok();
                }
            }
            observations
        })
    }

    /// Service the interrupt and queue state changes for [Tsensor::handle].
    pub fn service<const N: usize>(&self, requests: &mut Producer<'_, Request, N>) {
        for observation in self.isr() {
            if (observation.changed || observation.overflow())
                && requests
                    .enqueue(Request::StateChanged(observation))
                    .is_err()
            {
                warn!("Tsensor request queue full, dropping {observation:?}");
            }
        }
    }

    /// Process a queued request in task context.
    pub fn handle(
        &self,
        request: Request,
        throttle: &mut impl Throttle,
        delay: &mut impl DelayNs,
    ) -> Result<(), Error> {
        match request {
            Request::StateChanged(observation) => {
                let raised = match observation.transition.state {
                    TsState::Invalid => return Ok(()),
                    TsState::Overflow => true,
                    _ if observation.instance != self.active => return Ok(()),
                    state => state >= TsState::Level2,
                };
                debug!("Tsensor throttle {raised} on {observation:?}");
                throttle.set_throttle(raised);
            }
            Request::Reprogram(config) => {
                self.reprogram(config, delay);
            }
            Request::SetThreshold(param, celsius) => {
                self.set_param(param, celsius, delay)?;
            }
        }
        Ok(())
    }

    /// Stop both instances and disarm their actions and interrupts.
    pub fn stop(&self) {
        self.with(|inner| {
            for instance in Instance::iter() {
                let cfg0 = arm(inner.cfg0(instance), false).with_stop(true);
                inner.bus.write(instance, Register::Cfg0, cfg0.raw_value());
            }
        });
        warn!("Tsensor stopped");
    }

    /// Stop both instances and save their configuration.
    pub fn suspend(&self) {
        self.with(|inner| {
            let mut saved = [[0; 3]; Instance::COUNT];
            for instance in Instance::iter() {
                let cfg0 = inner.cfg0(instance).with_stop(true);
                inner.bus.write(instance, Register::Cfg0, cfg0.raw_value());
                saved[instance.index()] = [Register::Cfg0, Register::Cfg1, Register::Cfg2]
                    .map(|register| inner.bus.read(instance, register));
            }
            inner.suspended = Some(saved);
        });
        debug!("Tsensor suspended");
    }

    /// Restore the configuration saved by [Tsensor::suspend] and restart.
    pub fn resume(&self) {
        self.with(|inner| {
            let Some(saved) = inner.suspended.take() else {
                warn!("Tsensor resume without suspend");
                return;
            };
            for instance in Instance::iter() {
                let [cfg0, cfg1, cfg2] = saved[instance.index()];
                inner.bus.write(instance, Register::Cfg0, cfg0);
                inner.bus.write(instance, Register::Cfg1, cfg1);
                inner.bus.write(instance, Register::Cfg2, cfg2);
                let cfg0 = Cfg0::new_with_raw_value(cfg0).with_stop(false);
                inner.bus.write(instance, Register::Cfg0, cfg0.raw_value());
            }
        });
        debug!("Tsensor resumed");
    }

    /// Log the threshold counters over the operating range.
    pub fn chart(&self) {
        for celsius in CHART {
            match self.model.temperature_to_counter(celsius) {
                Ok(roots) => debug!("{celsius} C: {} {}", roots.first, roots.second),
                Err(e) => debug!("{celsius} C: {e}"),
            }
        }
    }

    pub fn dump_registers(&self) {
        self.with(|inner| {
            for instance in Instance::iter() {
                for register in Register::iter() {
                    debug!(
                        "{instance:?} {register:?} @{:#05x}: {:#010x}",
                        register.address(instance),
                        inner.bus.read(instance, register)
                    );
                }
            }
        });
    }

    /// Give up the register bus.
    pub fn release(self) -> B {
        self.inner.into_inner().bus
    }
}
