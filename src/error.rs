//! Our error types for the HCP PSUs.

use thiserror::Error;

use crate::types::ExceptionCode;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// A request could not be encoded. Fatal to the call; never retried.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum EncodingError {
    #[error("Register count must be at least 1")]
    ZeroCount,
    #[error("Declared register count {declared} does not match {supplied} supplied values")]
    CountMismatch { declared: u16, supplied: usize },
    #[error("Value {value} does not fit a 16-bit register at scale {scale}")]
    OutOfRange { value: f64, scale: f64 },
    #[error("{registers} registers do not fit in a single RTU frame")]
    PayloadTooLarge { registers: usize },
    #[error("Register {0:#06x} is not in the register map")]
    UnknownRegister(u16),
    #[error("Register {0:#06x} is read-only")]
    ReadOnlyRegister(u16),
}

/// A received buffer failed validation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: need {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },
    #[error("Response from slave {actual:#04x}, expected {expected:#04x}")]
    AddressMismatch { expected: u8, actual: u8 },
    #[error("Function code {actual:#04x}, expected {expected:#04x}")]
    FunctionMismatch { expected: u8, actual: u8 },
    #[error("CRC {actual:#06x} does not match computed {expected:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },
    #[error("Byte count {actual}, expected {expected}")]
    ByteCountMismatch { expected: u8, actual: u8 },
    #[error("Device exception: {0:?}")]
    DeviceException(ExceptionCode),
    #[error("Write acknowledgement does not echo the request")]
    EchoMismatch,
}

/// A device handle was configured with an unusable slave address or register map.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Slave address {0} is outside the unicast range 1-247")]
    InvalidSlaveAddress(u8),
    #[error("Register {0:#06x} has a scale that is not positive")]
    NonPositiveScale(u16),
    #[error("Register {0:#06x} appears more than once")]
    DuplicateAddress(u16),
    #[error("Register {0:#06x} is required but missing")]
    MissingRegister(u16),
}

/// A raw command line could not be turned into a request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawCommandError {
    #[error("Not an even number of hex digits")]
    InvalidHex,
    #[error("Function code {0:#04x} is not supported")]
    UnsupportedFunction(u8),
    #[error("Payload does not match the function code")]
    Malformed,
    #[error("Line is not `index=slave|baud|data bits|description|hex`")]
    InvalidLine,
}

/// Custom error type for HCP PSU communications.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Serial communication error")]
    SerialError(I),
    #[error("Encoding error: {0}")]
    Encoding(EncodingError),
    #[error("Invalid response: {0}")]
    Frame(FrameError),
    #[error("Response does not answer the request")]
    InvalidResponse,
    #[error("Communication timeout")]
    Timeout,
    #[error("Receive buffer overflow")]
    BufferError,
}

impl<I: embedded_io::Error> From<EncodingError> for Error<I> {
    fn from(err: EncodingError) -> Self {
        Error::Encoding(err)
    }
}

impl<I: embedded_io::Error> From<FrameError> for Error<I> {
    fn from(err: FrameError) -> Self {
        Error::Frame(err)
    }
}
