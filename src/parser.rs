//! Validation of Modbus RTU response frames.
//!
//! Checks run in a fixed order and the first failure wins:
//! length, slave address, exception flag, function code, CRC, then the
//! function-specific fields (byte count for reads, echo for writes).

use crate::{
    crc,
    error::FrameError,
    frame::MAX_READ_REGISTERS,
    types::{ExceptionCode, FunctionCode},
};

/// Address, exception function code, exception code and CRC.
const EXCEPTION_FRAME_LEN: usize = 5;
/// Address, function code, two 16-bit fields and CRC.
const WRITE_ACK_LEN: usize = 8;
/// Address, function code and byte count.
const READ_HEADER_LEN: usize = 3;

/// What the response to a request must look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    ReadHoldingRegisters { count: u16 },
    /// The device echoes the written address and value.
    WriteSingleRegister { address: u16, value: u16 },
    /// The device echoes the start address and register count.
    WriteMultipleRegisters { address: u16, count: u16 },
}

impl Expect {
    pub const fn function(&self) -> FunctionCode {
        match self {
            Expect::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Expect::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Expect::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    /// Length of a complete, non-exception response.
    pub const fn response_len(&self) -> usize {
        match *self {
            Expect::ReadHoldingRegisters { count } => READ_HEADER_LEN + 2 * count as usize + 2,
            Expect::WriteSingleRegister { .. } | Expect::WriteMultipleRegisters { .. } => {
                WRITE_ACK_LEN
            }
        }
    }

    /// Whether `received` already holds a whole response (normal or exception).
    ///
    /// Transports can use this to stop reading early.
    pub fn is_complete(&self, received: &[u8]) -> bool {
        if received.get(1) == Some(&self.function().exception_byte()) {
            received.len() >= EXCEPTION_FRAME_LEN
        } else {
            received.len() >= self.response_len()
        }
    }
}

/// Register values of a read response, borrowed from the received buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterData<'a> {
    bytes: &'a [u8],
}

impl<'a> RegisterData<'a> {
    /// Number of registers.
    pub fn len(&self) -> usize {
        self.bytes.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The register at `index`, counted from the requested start address.
    pub fn get(&self, index: usize) -> Option<u16> {
        let offset = index.checked_mul(2)?;
        let pair = self.bytes.get(offset..offset.checked_add(2)?)?;
        Some(u16::from_be_bytes([pair[0], pair[1]]))
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + 'a {
        self.bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
    }
}

/// A validated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedFrame<'a> {
    /// Raw register values of a read, in address order.
    Registers(RegisterData<'a>),
    /// A write was acknowledged.
    Acknowledged,
}

impl<'a> ParsedFrame<'a> {
    /// Register data of a read response, `None` for write acknowledgements.
    pub fn registers(&self) -> Option<RegisterData<'a>> {
        match self {
            ParsedFrame::Registers(data) => Some(*data),
            ParsedFrame::Acknowledged => None,
        }
    }
}

/// Validate `received` as the response of `expected_slave_address` to a request
/// described by `expect`.
///
/// An empty buffer (nothing arrived before the transport gave up) is a
/// [`FrameError::ShortFrame`]. Never indexes out of bounds.
pub fn parse<'a>(
    received: &'a [u8],
    expected_slave_address: u8,
    expect: &Expect,
) -> Result<ParsedFrame<'a>, FrameError> {
    let function = expect.function();
    let is_exception = received.get(1) == Some(&function.exception_byte());

    // 1. Length
    let min_len = if is_exception {
        EXCEPTION_FRAME_LEN
    } else {
        expect.response_len()
    };
    if received.len() < min_len {
        return Err(FrameError::ShortFrame {
            expected: min_len,
            actual: received.len(),
        });
    }

    // 2. Address
    if received[0] != expected_slave_address {
        return Err(FrameError::AddressMismatch {
            expected: expected_slave_address,
            actual: received[0],
        });
    }

    // 3. Exception
    if is_exception {
        return Err(FrameError::DeviceException(ExceptionCode::from(received[2])));
    }

    // 4. Function code
    if received[1] != function as u8 {
        return Err(FrameError::FunctionMismatch {
            expected: function as u8,
            actual: received[1],
        });
    }

    // 5. CRC
    let (body, tail) = received.split_at(received.len() - 2);
    let claimed = u16::from_le_bytes([tail[0], tail[1]]);
    if !crc::verify(body, claimed) {
        return Err(FrameError::CrcMismatch {
            expected: crc::compute(body),
            actual: claimed,
        });
    }

    // 6. Function-specific fields
    match *expect {
        Expect::ReadHoldingRegisters { count } => {
            // A byte count field cannot describe more than 127 registers.
            let expected = u8::try_from(2 * count as usize).unwrap_or(u8::MAX);
            let actual = body[2];
            if count as usize > MAX_READ_REGISTERS || actual != expected {
                return Err(FrameError::ByteCountMismatch { expected, actual });
            }
            let data = &body[READ_HEADER_LEN..];
            if data.len() != actual as usize {
                return Err(FrameError::ByteCountMismatch {
                    expected,
                    actual: data.len().min(u8::MAX as usize) as u8,
                });
            }
            Ok(ParsedFrame::Registers(RegisterData { bytes: data }))
        }
        Expect::WriteSingleRegister { address, value } => {
            check_echo(body, address, value)?;
            Ok(ParsedFrame::Acknowledged)
        }
        Expect::WriteMultipleRegisters { address, count } => {
            check_echo(body, address, count)?;
            Ok(ParsedFrame::Acknowledged)
        }
    }
}

fn check_echo(body: &[u8], first: u16, second: u16) -> Result<(), FrameError> {
    if body.len() != WRITE_ACK_LEN - 2 {
        return Err(FrameError::EchoMismatch);
    }
    let echoed_first = u16::from_be_bytes([body[2], body[3]]);
    let echoed_second = u16::from_be_bytes([body[4], body[5]]);
    if echoed_first != first || echoed_second != second {
        return Err(FrameError::EchoMismatch);
    }
    Ok(())
}
