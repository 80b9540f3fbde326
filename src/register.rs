//! This module is used to define the registers on the HCP PSUs and how their raw values
//! map to physical quantities.
//!
//! The layout is kept in a table ([`RegisterMap`]) so scales and bit assignments can be
//! corrected without touching the protocol code. [`HCP_REGISTER_MAP`] is the built-in
//! table; OVP/OCP scales are assumed to match the main voltage/current registers.

use modular_bitfield::prelude::*;
use strum_macros::EnumIter;

use crate::{
    error::{ConfigError, EncodingError},
    scaling::{self, CENTIVOLTS, CENTIWATTS, MILLIAMPS, UNITY},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u16)]
pub enum Register {
    /// __R__ - Measured output voltage.
    ///
    /// Value is u16 in centi-volts. E.g. 5.0V => `500`.
    ActualVoltage = 0x00,
    /// __R__ - Measured output current.
    ///
    /// Value is u16 in milli-amps. E.g. 1.2A => `1200`.
    ActualCurrent = 0x01,
    /// __R__ - Device status.
    ///
    /// See [`StatusFlags`] for the bit assignments.
    Status = 0x02,
    /// __R/W__ - Voltage setting, centi-volts.
    SetVoltage = 0x03,
    /// __R/W__ - Current setting, milli-amps.
    SetCurrent = 0x04,
    /// __R/W__ - Control word.
    ///
    /// See [`ControlFlags`] for the bit assignments. Writing replaces the whole word.
    Control = 0x05,
    /// __R/W__ - Over-voltage protection threshold, centi-volts.
    OverVoltageThreshold = 0x06,
    /// __R/W__ - Over-current protection threshold, milli-amps.
    OverCurrentThreshold = 0x07,
    /// __R/W__ - Line resistance compensation.
    LineCompensation = 0x30,
    /// __R/W__ - Load resistance used in constant power mode.
    LoadResistance = 0x31,
    /// __R/W__ - Constant power switch.
    /// * `0` - Off.
    /// * `1` - On.
    ConstantPowerSwitch = 0x32,
    /// __R/W__ - Constant power level, centi-watts.
    ConstantPower = 0x34,
}

impl From<Register> for u16 {
    fn from(value: Register) -> Self {
        value as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Physical unit of one scaled register step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Volt,
    Ampere,
    Watt,
    /// No physical unit; flags, switches and raw settings.
    Raw,
}

/// A named bit of a bitfield register. Set means on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bit {
    pub name: &'static str,
    pub position: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decode {
    /// `raw * scale` in [`RegisterDef::unit`].
    Scaled,
    /// Independent on/off bits.
    Bitfield(&'static [Bit]),
}

/// One entry of a register map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterDef {
    pub address: u16,
    /// Physical size of one raw unit. Must be positive.
    pub scale: f64,
    pub unit: Unit,
    pub access: Access,
    pub decode: Decode,
}

impl RegisterDef {
    pub const fn scaled(register: Register, scale: f64, unit: Unit, access: Access) -> Self {
        Self {
            address: register as u16,
            scale,
            unit,
            access,
            decode: Decode::Scaled,
        }
    }

    pub const fn bitfield(register: Register, bits: &'static [Bit], access: Access) -> Self {
        Self {
            address: register as u16,
            scale: UNITY,
            unit: Unit::Raw,
            access,
            decode: Decode::Bitfield(bits),
        }
    }

    /// Named bits of a bitfield register, empty for scaled registers.
    pub fn bits(&self) -> &'static [Bit] {
        match self.decode {
            Decode::Bitfield(bits) => bits,
            Decode::Scaled => &[],
        }
    }
}

pub const STATUS_BITS: &[Bit] = &[
    Bit { name: "output_on", position: 0 },
    Bit { name: "cv_mode", position: 1 },
    Bit { name: "cc_mode", position: 2 },
    Bit { name: "ovp_tripped", position: 3 },
    Bit { name: "ocp_tripped", position: 4 },
    Bit { name: "otp_tripped", position: 5 },
];

pub const CONTROL_BITS: &[Bit] = &[
    Bit { name: "output_enable", position: 0 },
    Bit { name: "ovp_enable", position: 3 },
    Bit { name: "ocp_enable", position: 4 },
    Bit { name: "clear_protections", position: 6 },
    Bit { name: "keyboard_lock", position: 14 },
];

/// A table of register definitions, keyed by address.
#[derive(Debug, Clone, Copy)]
pub struct RegisterMap<'a> {
    entries: &'a [RegisterDef],
}

const HCP_REGISTERS: &[RegisterDef] = &[
    RegisterDef::scaled(Register::ActualVoltage, CENTIVOLTS, Unit::Volt, Access::ReadOnly),
    RegisterDef::scaled(Register::ActualCurrent, MILLIAMPS, Unit::Ampere, Access::ReadOnly),
    RegisterDef::bitfield(Register::Status, STATUS_BITS, Access::ReadOnly),
    RegisterDef::scaled(Register::SetVoltage, CENTIVOLTS, Unit::Volt, Access::ReadWrite),
    RegisterDef::scaled(Register::SetCurrent, MILLIAMPS, Unit::Ampere, Access::ReadWrite),
    RegisterDef::bitfield(Register::Control, CONTROL_BITS, Access::ReadWrite),
    RegisterDef::scaled(Register::OverVoltageThreshold, CENTIVOLTS, Unit::Volt, Access::ReadWrite),
    RegisterDef::scaled(Register::OverCurrentThreshold, MILLIAMPS, Unit::Ampere, Access::ReadWrite),
    RegisterDef::scaled(Register::LineCompensation, UNITY, Unit::Raw, Access::ReadWrite),
    RegisterDef::scaled(Register::LoadResistance, UNITY, Unit::Raw, Access::ReadWrite),
    RegisterDef::scaled(Register::ConstantPowerSwitch, UNITY, Unit::Raw, Access::ReadWrite),
    RegisterDef::scaled(Register::ConstantPower, CENTIWATTS, Unit::Watt, Access::ReadWrite),
];

/// Register layout of the HCP series.
pub static HCP_REGISTER_MAP: RegisterMap<'static> = RegisterMap::new(HCP_REGISTERS);

impl<'a> RegisterMap<'a> {
    pub const fn new(entries: &'a [RegisterDef]) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a RegisterDef> + use<'a> {
        self.entries.iter()
    }

    /// Check every scale is positive and every address appears once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, def) in self.entries.iter().enumerate() {
            if !(def.scale > 0.0) {
                return Err(ConfigError::NonPositiveScale(def.address));
            }
            if self.entries[..index].iter().any(|other| other.address == def.address) {
                return Err(ConfigError::DuplicateAddress(def.address));
            }
        }
        Ok(())
    }

    /// Check the map defines every register in `registers`.
    pub fn require(&self, registers: &[Register]) -> Result<(), ConfigError> {
        match registers.iter().find(|&&register| self.get(register as u16).is_none()) {
            Some(&missing) => Err(ConfigError::MissingRegister(missing as u16)),
            None => Ok(()),
        }
    }

    pub fn get(&self, address: u16) -> Option<&'a RegisterDef> {
        self.entries.iter().find(|def| def.address == address)
    }

    pub fn entry(&self, register: Register) -> Result<&'a RegisterDef, EncodingError> {
        self.get(register as u16)
            .ok_or(EncodingError::UnknownRegister(register as u16))
    }

    /// Scale of `register`.
    pub fn scale(&self, register: Register) -> Result<f64, EncodingError> {
        self.entry(register).map(|def| def.scale)
    }

    /// Raw value to write to `register` for `physical`.
    pub fn encode(&self, register: Register, physical: f64) -> Result<u16, EncodingError> {
        let def = self.writable(register)?;
        scaling::to_raw(physical, def.scale)
    }

    /// Fails unless `register` exists and accepts writes.
    pub fn writable(&self, register: Register) -> Result<&'a RegisterDef, EncodingError> {
        let def = self.entry(register)?;
        match def.access {
            Access::ReadWrite => Ok(def),
            Access::ReadOnly => Err(EncodingError::ReadOnlyRegister(def.address)),
        }
    }

    /// Physical value of `raw` read from `register`.
    pub fn decode(&self, register: Register, raw: u16) -> Result<f64, EncodingError> {
        self.scale(register).map(|scale| scaling::from_raw(raw, scale))
    }

    /// Name and state of each named bit of the bitfield register at `address`.
    ///
    /// Empty for unknown or scaled registers.
    pub fn decode_bits(
        &self,
        address: u16,
        raw: u16,
    ) -> impl Iterator<Item = (&'static str, bool)> + use<> {
        let bits: &'static [Bit] = match self.get(address) {
            Some(def) => def.bits(),
            None => &[],
        };
        bits.iter()
            .map(move |bit| (bit.name, raw & (1 << bit.position) != 0))
    }
}

// Mirrors STATUS_BITS; the two must change together.
#[bitfield]
#[derive(Debug, Clone, Copy)]
struct StatusBits {
    output_on: bool,
    cv_mode: bool,
    cc_mode: bool,
    ovp_tripped: bool,
    ocp_tripped: bool,
    otp_tripped: bool,
    #[skip]
    reserved: B10,
}

/// Decoded device status (register `0x0002`).
///
/// Each bit is decoded on its own; CV and CC are not assumed to be exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub output_on: bool,
    pub cv_mode: bool,
    pub cc_mode: bool,
    pub ovp_tripped: bool,
    pub ocp_tripped: bool,
    pub otp_tripped: bool,
}

/// Decode a status register value.
pub fn decode_status(raw: u16) -> StatusFlags {
    let bits = StatusBits::from_bytes(raw.to_le_bytes());
    StatusFlags {
        output_on: bits.output_on(),
        cv_mode: bits.cv_mode(),
        cc_mode: bits.cc_mode(),
        ovp_tripped: bits.ovp_tripped(),
        ocp_tripped: bits.ocp_tripped(),
        otp_tripped: bits.otp_tripped(),
    }
}

impl StatusFlags {
    /// The status word these flags decode from.
    pub fn to_raw(&self) -> u16 {
        let bits = StatusBits::new()
            .with_output_on(self.output_on)
            .with_cv_mode(self.cv_mode)
            .with_cc_mode(self.cc_mode)
            .with_ovp_tripped(self.ovp_tripped)
            .with_ocp_tripped(self.ocp_tripped)
            .with_otp_tripped(self.otp_tripped);
        u16::from_le_bytes(bits.into_bytes())
    }
}

#[bitfield]
#[derive(Debug, Clone, Copy)]
struct ControlBits {
    output_enable: bool,
    #[skip]
    reserved_1: B2,
    ovp_enable: bool,
    ocp_enable: bool,
    #[skip]
    reserved_5: B1,
    clear_protections: bool,
    #[skip]
    reserved_7: B7,
    keyboard_lock: bool,
    #[skip]
    reserved_15: B1,
}

/// Control word (register `0x0005`).
///
/// `clear_protections` is self-clearing on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlFlags {
    pub output_enable: bool,
    pub ovp_enable: bool,
    pub ocp_enable: bool,
    pub clear_protections: bool,
    pub keyboard_lock: bool,
}

impl ControlFlags {
    pub fn from_raw(raw: u16) -> Self {
        let bits = ControlBits::from_bytes(raw.to_le_bytes());
        Self {
            output_enable: bits.output_enable(),
            ovp_enable: bits.ovp_enable(),
            ocp_enable: bits.ocp_enable(),
            clear_protections: bits.clear_protections(),
            keyboard_lock: bits.keyboard_lock(),
        }
    }

    pub fn to_raw(&self) -> u16 {
        let bits = ControlBits::new()
            .with_output_enable(self.output_enable)
            .with_ovp_enable(self.ovp_enable)
            .with_ocp_enable(self.ocp_enable)
            .with_clear_protections(self.clear_protections)
            .with_keyboard_lock(self.keyboard_lock);
        u16::from_le_bytes(bits.into_bytes())
    }
}
