//! Register-level description of the on-chip temperature sensor (tsensor) block.
//!
//! The block contains two identical sensing instances. Each instance owns a small register
//! window; the windows are [INSTANCE_STRIDE] bytes apart. Factory calibration and the chip
//! revision live outside of the block in fuse and miscellaneous registers whose layouts are
//! described here as well.
#![no_std]

use arbitrary_int::{u3, u4, u7};
use bitbybit::bitfield;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// Byte distance between the register windows of two instances.
pub const INSTANCE_STRIDE: usize = 0x40;

/// One of the two physical sensing instances.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    TryFromPrimitive,
    IntoPrimitive,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum Instance {
    Tsensor0 = 0,
    Tsensor1 = 1,
}

impl Instance {
    pub const COUNT: usize = 2;

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Per-instance register offsets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, EnumIter)]
#[repr(u16)]
pub enum Register {
    Cfg0 = 0x40,
    Cfg1 = 0x48,
    Cfg2 = 0x4c,
    Status0 = 0x58,
    TsStatus1 = 0x5c,
    TsStatus2 = 0x60,
}

impl Register {
    /// Byte address of the register relative to the block base.
    pub const fn address(self, instance: Instance) -> usize {
        instance.index() * INSTANCE_STRIDE + self as usize
    }
}

#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq)]
pub struct Cfg0 {
    #[bit(0, rw)]
    pub stop: bool,
    #[bit(1, rw)]
    pub hw_div2_enable: bool,
    #[bit(2, rw)]
    pub reset_enable: bool,
    #[bit(4, rw)]
    pub overflow_intr: bool,
    #[bit(5, rw)]
    pub hw_div2_intr: bool,
    #[bit(6, rw)]
    pub reset_intr: bool,
    #[bits(8..=23, rw)]
    pub m: u16,
    #[bits(24..=31, rw)]
    pub n: u8,
}

/// Software interrupt (TH1) and clock divide (TH2) comparator counters.
#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq)]
pub struct Cfg1 {
    #[bits(0..=15, rw)]
    pub th1: u16,
    #[bits(16..=31, rw)]
    pub th2: u16,
}

/// Reset (TH3) comparator counter and the TH0 hysteresis span.
#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq)]
pub struct Cfg2 {
    #[bits(0..=15, rw)]
    pub th3: u16,
    #[bits(16..=31, rw)]
    pub th0: u16,
}

#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq)]
pub struct Status0 {
    #[bits(0..=2, rw)]
    pub state: u3,
    #[bits(4..=6, rw)]
    pub prev_state: u3,
    #[bit(8, rw)]
    pub intr: bool,
    #[bit(9, rw)]
    pub curr_valid: bool,
    #[bit(10, rw)]
    pub avg_valid: bool,
}

impl Status0 {
    /// Both the current and the averaged counter hold a fresh sample.
    pub fn counter_valid(&self) -> bool {
        self.curr_valid() && self.avg_valid()
    }
}

#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq)]
pub struct TsStatus1 {
    #[bits(0..=15, rw)]
    pub average: u16,
    #[bits(16..=31, rw)]
    pub current: u16,
}

#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq)]
pub struct TsStatus2 {
    #[bits(0..=15, rw)]
    pub min: u16,
    #[bits(16..=31, rw)]
    pub max: u16,
}

/// Factory calibration counters: F1 taken near 25 C, F2 near 90 C.
#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq)]
pub struct CalibrationFuse {
    #[bits(0..=15, rw)]
    pub low: u16,
    #[bits(16..=31, rw)]
    pub high: u16,
}

/// Spare fuse bits carrying the calibration temperatures.
///
/// Each temperature is burnt twice and the copies are OR-ed together:
/// the high temperature (T2) in bits 6:0 and 13:7, the low temperature (T1)
/// in bits 20:14 and 27:21.
#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq)]
pub struct SpareBits {
    #[bits(0..=6, rw)]
    pub high_a: u7,
    #[bits(7..=13, rw)]
    pub high_b: u7,
    #[bits(14..=20, rw)]
    pub low_a: u7,
    #[bits(21..=27, rw)]
    pub low_b: u7,
}

impl SpareBits {
    /// T1 in degrees Celsius.
    pub fn low_temperature(&self) -> u8 {
        self.low_a().value() | self.low_b().value()
    }

    /// T2 in degrees Celsius.
    pub fn high_temperature(&self) -> u8 {
        self.high_a().value() | self.high_b().value()
    }
}

/// Chip revision word of the miscellaneous register space.
#[bitfield(u32, default = 0)]
#[derive(Debug, PartialEq)]
pub struct ChipRevision {
    #[bits(4..=7, rw)]
    pub major: u4,
    #[bits(8..=15, rw)]
    pub id: u8,
    #[bits(16..=19, rw)]
    pub minor: u4,
}

/// Access to the tsensor register windows.
pub trait RegisterBus {
    fn read(&mut self, instance: Instance, register: Register) -> u32;
    fn write(&mut self, instance: Instance, register: Register, value: u32);
}

impl<T: RegisterBus> RegisterBus for &mut T {
    fn read(&mut self, instance: Instance, register: Register) -> u32 {
        T::read(self, instance, register)
    }

    fn write(&mut self, instance: Instance, register: Register, value: u32) {
        T::write(self, instance, register, value)
    }
}

/// Memory mapped register block.
pub struct Mmio {
    base: *mut u32,
}

// The block is only reached through `&mut self`.
unsafe impl Send for Mmio {}

impl Mmio {
    /// # Safety
    /// `base` must point to the mapped tsensor register block and stay valid
    /// for the lifetime of the returned value. Nothing else may access the block.
    pub const unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }
}

impl RegisterBus for Mmio {
    fn read(&mut self, instance: Instance, register: Register) -> u32 {
        unsafe {
            self.base
                .byte_add(register.address(instance))
                .read_volatile()
        }
    }

    fn write(&mut self, instance: Instance, register: Register, value: u32) {
        unsafe {
            self.base
                .byte_add(register.address(instance))
                .write_volatile(value)
        }
    }
}
