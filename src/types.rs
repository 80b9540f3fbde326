//! This module contains types relevant to the Modbus RTU wire protocol.

use strum_macros::EnumIter;

/// The Modbus function codes the HCP supplies understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum FunctionCode {
    /// `0x03` - Read a contiguous block of holding registers.
    ReadHoldingRegisters = 0x03,
    /// `0x06` - Write one holding register. The device echoes the request.
    WriteSingleRegister = 0x06,
    /// `0x10` - Write a contiguous block of holding registers in one transaction.
    WriteMultipleRegisters = 0x10,
}

impl FunctionCode {
    /// Bit set by the device in the function code byte of an exception response.
    pub const EXCEPTION_FLAG: u8 = 0x80;

    /// The function code byte a device answers with when it rejects this request.
    pub const fn exception_byte(self) -> u8 {
        self as u8 | Self::EXCEPTION_FLAG
    }
}

impl From<FunctionCode> for u8 {
    fn from(value: FunctionCode) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x03 => Ok(Self::ReadHoldingRegisters),
            0x06 => Ok(Self::WriteSingleRegister),
            0x10 => Ok(Self::WriteMultipleRegisters),
            other => Err(other),
        }
    }
}

/// Exception codes a device may return in place of a normal response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    /// 1: Function code not supported.
    IllegalFunction,
    /// 2: Register address not allowed.
    IllegalDataAddress,
    /// 3: Value not allowed.
    IllegalDataValue,
    /// 4: Unrecoverable error while performing the request.
    ServerDeviceFailure,
    /// 5: Request accepted, processing takes a while.
    Acknowledge,
    /// 6: Device busy with a long-running command.
    ServerDeviceBusy,
    /// Any code not listed above.
    Other(u8),
}

impl From<u8> for ExceptionCode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::ServerDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::ServerDeviceBusy,
            other => Self::Other(other),
        }
    }
}

impl From<ExceptionCode> for u8 {
    fn from(value: ExceptionCode) -> Self {
        match value {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::ServerDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::ServerDeviceBusy => 0x06,
            ExceptionCode::Other(code) => code,
        }
    }
}

/// Used to be less ambiguous about whether something is on or off.
#[repr(u16)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum State {
    /// Disabled.
    #[default]
    Off = 0x00,
    /// Enabled.
    On = 0x01,
}

impl From<State> for bool {
    fn from(value: State) -> Self {
        match value {
            State::Off => false,
            State::On => true,
        }
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        match value {
            true => State::On,
            false => State::Off,
        }
    }
}
