//! Named PSU operations on top of the frame codec and register map.
//!
//! [`Dispatcher::build_frame`] turns an [`Operation`] into an [`Exchange`]: the bytes to
//! send plus everything needed to interpret the reply. [`Exchange::parse_response`] turns
//! the received bytes into a typed [`Response`]. Nothing here touches a transport, keeps
//! state between calls or retries; calling again with the same input gives the same bytes.

use crate::{
    error::{ConfigError, EncodingError, FrameError},
    frame::{self, Frame, Request},
    parser::{self, Expect, ParsedFrame},
    register::{
        ControlFlags, HCP_REGISTER_MAP, Register, RegisterMap, StatusFlags, decode_status,
    },
    scaling::from_raw,
    types::State,
};

/// Registers every operation relies on. Custom maps must define them.
const REQUIRED_REGISTERS: &[Register] = &[
    Register::ActualVoltage,
    Register::ActualCurrent,
    Register::Status,
    Register::SetVoltage,
    Register::SetCurrent,
    Register::Control,
    Register::OverVoltageThreshold,
    Register::OverCurrentThreshold,
];

/// A logical PSU command. Voltages in volts, currents in amps, power in watts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    SetVoltage(f64),
    SetCurrent(f64),
    /// Writes the whole control word: output bit only, every other bit cleared.
    SetOutput(bool),
    /// Voltage, current and output state in one write-multiple transaction.
    SetVoltageCurrentOutput { volts: f64, amps: f64, output: bool },
    /// OVP and OCP thresholds in one write-multiple transaction.
    SetProtectionThresholds { ovp_volts: f64, ocp_amps: f64 },
    SetOverVoltageProtection(f64),
    SetOverCurrentProtection(f64),
    SetOutputProtectionFlags {
        output: bool,
        ovp_enable: bool,
        ocp_enable: bool,
    },
    ClearProtections,
    LockKeyboard(bool),
    /// Voltage setting, current setting and control word.
    QuerySettings,
    /// Measured voltage, measured current and status.
    QueryActualValues,
    ReadVoltage,
    ReadCurrent,
    ReadStatus,
    SetConstantPowerEnabled(bool),
    SetConstantPower(f64),
}

/// Configured set points as read back from the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub voltage: f64,
    pub current: f64,
    /// The control word decoded with the status bit layout.
    pub status: StatusFlags,
    pub control: ControlFlags,
}

/// Measured output values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActualValues {
    pub voltage: f64,
    pub current: f64,
    pub status: StatusFlags,
}

/// Typed result of a successful exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    /// The device acknowledged a write.
    Written,
    Voltage(f64),
    Current(f64),
    Status(StatusFlags),
    Settings(Settings),
    ActualValues(ActualValues),
}

/// Result of an exchange as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Success(Response),
    ProtocolError(FrameError),
    /// The transport gave up before any byte arrived.
    Timeout,
}

/// How to turn validated register data into a [`Response`].
///
/// Scales are captured when the request is built, so decoding cannot fail on a
/// register map lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Decoder {
    Written,
    Voltage { scale: f64 },
    Current { scale: f64 },
    Status,
    Settings { voltage_scale: f64, current_scale: f64 },
    ActualValues { voltage_scale: f64, current_scale: f64 },
}

/// One request frame and the context needed to interpret its reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    slave_address: u8,
    frame: Frame,
    expect: Expect,
    decoder: Decoder,
}

impl Exchange {
    /// Bytes to hand to the transport.
    pub fn request(&self) -> &[u8] {
        self.frame.as_bytes()
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Shape of the expected reply, for transports that stop reading once it is complete.
    pub fn expect(&self) -> &Expect {
        &self.expect
    }

    /// Validate and decode the bytes the transport received.
    pub fn parse_response(&self, received: &[u8]) -> Result<Response, FrameError> {
        let parsed = parser::parse(received, self.slave_address, &self.expect)?;
        let response = match self.decoder {
            Decoder::Written => Response::Written,
            Decoder::Voltage { scale } => {
                let [raw] = words(&parsed)?;
                Response::Voltage(from_raw(raw, scale))
            }
            Decoder::Current { scale } => {
                let [raw] = words(&parsed)?;
                Response::Current(from_raw(raw, scale))
            }
            Decoder::Status => {
                let [raw] = words(&parsed)?;
                Response::Status(decode_status(raw))
            }
            Decoder::Settings {
                voltage_scale,
                current_scale,
            } => {
                let [voltage, current, control] = words(&parsed)?;
                Response::Settings(Settings {
                    voltage: from_raw(voltage, voltage_scale),
                    current: from_raw(current, current_scale),
                    status: decode_status(control),
                    control: ControlFlags::from_raw(control),
                })
            }
            Decoder::ActualValues {
                voltage_scale,
                current_scale,
            } => {
                let [voltage, current, status] = words(&parsed)?;
                Response::ActualValues(ActualValues {
                    voltage: from_raw(voltage, voltage_scale),
                    current: from_raw(current, current_scale),
                    status: decode_status(status),
                })
            }
        };
        Ok(response)
    }

    /// Like [`Self::parse_response`], with an empty buffer reported as [`Outcome::Timeout`].
    pub fn outcome(&self, received: &[u8]) -> Outcome {
        if received.is_empty() {
            return Outcome::Timeout;
        }
        match self.parse_response(received) {
            Ok(response) => Outcome::Success(response),
            Err(err) => Outcome::ProtocolError(err),
        }
    }
}

/// Exactly `N` register values of a read response.
fn words<const N: usize>(parsed: &ParsedFrame<'_>) -> Result<[u16; N], FrameError> {
    let mismatch = |received: usize| FrameError::ByteCountMismatch {
        expected: (2 * N) as u8,
        actual: (2 * received).min(u8::MAX as usize) as u8,
    };
    let data = parsed.registers().ok_or(mismatch(0))?;
    if data.len() != N {
        return Err(mismatch(data.len()));
    }
    let mut words = [0u16; N];
    for (word, value) in words.iter_mut().zip(data.iter()) {
        *word = value;
    }
    Ok(words)
}

/// Builds exchanges for one device.
///
/// Holds only the slave address and register map, both fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'m> {
    slave_address: u8,
    map: RegisterMap<'m>,
}

impl Dispatcher<'static> {
    /// Dispatcher for the device at `slave_address` using [`HCP_REGISTER_MAP`].
    pub fn new(slave_address: u8) -> Result<Self, ConfigError> {
        Self::with_register_map(slave_address, HCP_REGISTER_MAP)
    }
}

impl<'m> Dispatcher<'m> {
    /// Dispatcher using a custom register table.
    ///
    /// The table must validate and define every register the operations use.
    pub fn with_register_map(slave_address: u8, map: RegisterMap<'m>) -> Result<Self, ConfigError> {
        // Only 1-247 range is suitable ID for single Modbus device.
        if !(1..=247).contains(&slave_address) {
            return Err(ConfigError::InvalidSlaveAddress(slave_address));
        }
        map.validate()?;
        map.require(REQUIRED_REGISTERS)?;
        Ok(Self { slave_address, map })
    }

    pub fn slave_address(&self) -> u8 {
        self.slave_address
    }

    pub fn register_map(&self) -> &RegisterMap<'m> {
        &self.map
    }

    /// Encode `operation` into the frame to send.
    pub fn build_frame(&self, operation: &Operation) -> Result<Exchange, EncodingError> {
        let map = &self.map;
        match *operation {
            Operation::SetVoltage(volts) => {
                self.write_single(Register::SetVoltage, map.encode(Register::SetVoltage, volts)?)
            }
            Operation::SetCurrent(amps) => {
                self.write_single(Register::SetCurrent, map.encode(Register::SetCurrent, amps)?)
            }
            Operation::SetOutput(on) => {
                self.write_single(Register::Control, State::from(on) as u16)
            }
            Operation::SetVoltageCurrentOutput {
                volts,
                amps,
                output,
            } => {
                let values = [
                    map.encode(Register::SetVoltage, volts)?,
                    map.encode(Register::SetCurrent, amps)?,
                    State::from(output) as u16,
                ];
                map.writable(Register::Control)?;
                self.write_block(Register::SetVoltage, &values)
            }
            Operation::SetProtectionThresholds {
                ovp_volts,
                ocp_amps,
            } => {
                let values = [
                    map.encode(Register::OverVoltageThreshold, ovp_volts)?,
                    map.encode(Register::OverCurrentThreshold, ocp_amps)?,
                ];
                self.write_block(Register::OverVoltageThreshold, &values)
            }
            Operation::SetOverVoltageProtection(volts) => self.write_single(
                Register::OverVoltageThreshold,
                map.encode(Register::OverVoltageThreshold, volts)?,
            ),
            Operation::SetOverCurrentProtection(amps) => self.write_single(
                Register::OverCurrentThreshold,
                map.encode(Register::OverCurrentThreshold, amps)?,
            ),
            Operation::SetOutputProtectionFlags {
                output,
                ovp_enable,
                ocp_enable,
            } => {
                let flags = ControlFlags {
                    output_enable: output,
                    ovp_enable,
                    ocp_enable,
                    ..Default::default()
                };
                self.write_single(Register::Control, flags.to_raw())
            }
            Operation::ClearProtections => {
                let flags = ControlFlags {
                    clear_protections: true,
                    ..Default::default()
                };
                self.write_single(Register::Control, flags.to_raw())
            }
            Operation::LockKeyboard(lock) => {
                let flags = ControlFlags {
                    keyboard_lock: lock,
                    ..Default::default()
                };
                self.write_single(Register::Control, flags.to_raw())
            }
            Operation::QuerySettings => self.read(
                Register::SetVoltage,
                3,
                Decoder::Settings {
                    voltage_scale: map.scale(Register::SetVoltage)?,
                    current_scale: map.scale(Register::SetCurrent)?,
                },
            ),
            Operation::QueryActualValues => self.read(
                Register::ActualVoltage,
                3,
                Decoder::ActualValues {
                    voltage_scale: map.scale(Register::ActualVoltage)?,
                    current_scale: map.scale(Register::ActualCurrent)?,
                },
            ),
            Operation::ReadVoltage => self.read(
                Register::ActualVoltage,
                1,
                Decoder::Voltage {
                    scale: map.scale(Register::ActualVoltage)?,
                },
            ),
            Operation::ReadCurrent => self.read(
                Register::ActualCurrent,
                1,
                Decoder::Current {
                    scale: map.scale(Register::ActualCurrent)?,
                },
            ),
            Operation::ReadStatus => self.read(Register::Status, 1, Decoder::Status),
            Operation::SetConstantPowerEnabled(on) => {
                self.write_single(Register::ConstantPowerSwitch, State::from(on) as u16)
            }
            Operation::SetConstantPower(watts) => self.write_single(
                Register::ConstantPower,
                map.encode(Register::ConstantPower, watts)?,
            ),
        }
    }

    fn write_single(&self, register: Register, value: u16) -> Result<Exchange, EncodingError> {
        self.map.writable(register)?;
        let request = Request::WriteSingleRegister {
            address: register.into(),
            value,
        };
        self.exchange(&request, Decoder::Written)
    }

    /// Write `values` to consecutive registers starting at `first`.
    fn write_block(&self, first: Register, values: &[u16]) -> Result<Exchange, EncodingError> {
        let request = Request::WriteMultipleRegisters {
            address: first.into(),
            count: values.len() as u16,
            values,
        };
        self.exchange(&request, Decoder::Written)
    }

    fn read(
        &self,
        first: Register,
        count: u16,
        decoder: Decoder,
    ) -> Result<Exchange, EncodingError> {
        let request = Request::ReadHoldingRegisters {
            address: first.into(),
            count,
        };
        self.exchange(&request, decoder)
    }

    fn exchange(&self, request: &Request<'_>, decoder: Decoder) -> Result<Exchange, EncodingError> {
        Ok(Exchange {
            slave_address: self.slave_address,
            frame: frame::build(self.slave_address, request)?,
            expect: request.expect(),
            decoder,
        })
    }
}
