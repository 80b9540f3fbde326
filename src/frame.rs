//! Encoding of Modbus RTU request frames.
//!
//! A frame is `[slave address][function code][payload][CRC16]`. Payload fields are
//! big-endian, the CRC is appended low byte first and covers every byte before it.

use core::ops::Deref;

use crate::{
    crc,
    error::EncodingError,
    parser::Expect,
    types::FunctionCode,
};

/// Largest RTU frame (address + PDU + CRC).
pub const MAX_FRAME_LEN: usize = 256;

/// Largest number of registers whose read response fits [`MAX_FRAME_LEN`].
pub const MAX_READ_REGISTERS: usize = (MAX_FRAME_LEN - 5) / 2;

/// Largest number of registers a single write-multiple request can carry.
///
/// The byte-count field is one byte, and the whole frame must fit [`MAX_FRAME_LEN`].
pub const MAX_WRITE_REGISTERS: usize = (MAX_FRAME_LEN - 9) / 2;

/// A logical Modbus request: function code, target address and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// Read `count` registers starting at `address`.
    ///
    /// Counts above what the device supports are passed through; the device answers
    /// with an exception.
    ReadHoldingRegisters { address: u16, count: u16 },
    /// Write `value` to the register at `address`.
    WriteSingleRegister { address: u16, value: u16 },
    /// Write `values` to `count` consecutive registers starting at `address`.
    ///
    /// `count` must equal `values.len()`.
    WriteMultipleRegisters {
        address: u16,
        count: u16,
        values: &'a [u16],
    },
}

impl Request<'_> {
    pub const fn function(&self) -> FunctionCode {
        match self {
            Request::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Request::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Request::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    pub const fn address(&self) -> u16 {
        match *self {
            Request::ReadHoldingRegisters { address, .. }
            | Request::WriteSingleRegister { address, .. }
            | Request::WriteMultipleRegisters { address, .. } => address,
        }
    }

    /// What a well-formed response to this request looks like.
    pub const fn expect(&self) -> Expect {
        match *self {
            Request::ReadHoldingRegisters { count, .. } => Expect::ReadHoldingRegisters { count },
            Request::WriteSingleRegister { address, value } => {
                Expect::WriteSingleRegister { address, value }
            }
            Request::WriteMultipleRegisters { address, count, .. } => {
                Expect::WriteMultipleRegisters { address, count }
            }
        }
    }
}

/// An encoded RTU frame, CRC included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(heapless::Vec<u8, MAX_FRAME_LEN>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Slave address the frame is addressed to.
    pub fn slave_address(&self) -> u8 {
        self.0[0]
    }

    /// Bytes covered by the trailing CRC.
    pub fn body(&self) -> &[u8] {
        &self.0[..self.0.len() - 2]
    }

    /// Seal `body` (address, function code and payload) with its CRC.
    pub(crate) fn seal(body: &[u8]) -> Result<Self, EncodingError> {
        let mut bytes = heapless::Vec::new();
        bytes
            .extend_from_slice(body)
            .and_then(|()| bytes.extend_from_slice(&crc::to_wire(crc::compute(body))))
            .map_err(|_| EncodingError::PayloadTooLarge {
                registers: body.len().saturating_sub(7) / 2,
            })?;
        Ok(Self(bytes))
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Encode `request` for the device at `slave_address`.
///
/// Deterministic: identical arguments always produce identical bytes.
pub fn build(slave_address: u8, request: &Request<'_>) -> Result<Frame, EncodingError> {
    let mut body: heapless::Vec<u8, MAX_FRAME_LEN> = heapless::Vec::new();

    let registers = match *request {
        Request::WriteMultipleRegisters { values, .. } => values.len(),
        _ => 0,
    };
    let mut push = |bytes: &[u8]| {
        body.extend_from_slice(bytes)
            .map_err(|_| EncodingError::PayloadTooLarge { registers })
    };

    push(&[slave_address, request.function().into()])?;
    push(&request.address().to_be_bytes())?;

    match *request {
        Request::ReadHoldingRegisters { count, .. } => {
            if count == 0 {
                return Err(EncodingError::ZeroCount);
            }
            push(&count.to_be_bytes())?;
        }
        Request::WriteSingleRegister { value, .. } => {
            push(&value.to_be_bytes())?;
        }
        Request::WriteMultipleRegisters { count, values, .. } => {
            if count == 0 {
                return Err(EncodingError::ZeroCount);
            }
            if count as usize != values.len() {
                return Err(EncodingError::CountMismatch {
                    declared: count,
                    supplied: values.len(),
                });
            }
            if values.len() > MAX_WRITE_REGISTERS {
                return Err(EncodingError::PayloadTooLarge { registers });
            }
            push(&count.to_be_bytes())?;
            push(&[(values.len() * 2) as u8])?;
            for value in values {
                push(&value.to_be_bytes())?;
            }
        }
    }

    Frame::seal(&body)
}
