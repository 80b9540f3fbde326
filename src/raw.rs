//! Requests written out by hand as hex, the way device manuals and bench scripts list them.
//!
//! A command is the slave address, function code and payload without the CRC, e.g.
//! `11 06 00 03 01 F4` (set voltage to 5.00 V on slave `0x11`). Command lines add a
//! header: `index=slave|baud|data bits|description|hex`.

use core::str::FromStr;

use crate::{
    error::{EncodingError, RawCommandError},
    frame::{self, Frame, MAX_FRAME_LEN, MAX_WRITE_REGISTERS, Request},
    parser::Expect,
    types::FunctionCode,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload {
    Read { address: u16, count: u16 },
    WriteSingle { address: u16, value: u16 },
    WriteMultiple {
        address: u16,
        values: heapless::Vec<u16, MAX_WRITE_REGISTERS>,
    },
}

/// A request decoded from hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    slave_address: u8,
    payload: Payload,
}

impl RawCommand {
    /// Decode whitespace separated (or contiguous) hex digits.
    pub fn from_hex(text: &str) -> Result<Self, RawCommandError> {
        let bytes = decode_hex(text)?;
        let [slave_address, function, payload @ ..] = bytes.as_slice() else {
            return Err(RawCommandError::Malformed);
        };
        let slave_address = *slave_address;
        let function =
            FunctionCode::try_from(*function).map_err(RawCommandError::UnsupportedFunction)?;

        let payload = match function {
            FunctionCode::ReadHoldingRegisters => {
                let &[a_hi, a_lo, c_hi, c_lo] = payload else {
                    return Err(RawCommandError::Malformed);
                };
                Payload::Read {
                    address: u16::from_be_bytes([a_hi, a_lo]),
                    count: u16::from_be_bytes([c_hi, c_lo]),
                }
            }
            FunctionCode::WriteSingleRegister => {
                let &[a_hi, a_lo, v_hi, v_lo] = payload else {
                    return Err(RawCommandError::Malformed);
                };
                Payload::WriteSingle {
                    address: u16::from_be_bytes([a_hi, a_lo]),
                    value: u16::from_be_bytes([v_hi, v_lo]),
                }
            }
            FunctionCode::WriteMultipleRegisters => {
                let [a_hi, a_lo, c_hi, c_lo, byte_count, data @ ..] = payload else {
                    return Err(RawCommandError::Malformed);
                };
                let count = u16::from_be_bytes([*c_hi, *c_lo]) as usize;
                if *byte_count as usize != data.len() || data.len() != 2 * count {
                    return Err(RawCommandError::Malformed);
                }
                let mut values = heapless::Vec::new();
                for pair in data.chunks_exact(2) {
                    values
                        .push(u16::from_be_bytes([pair[0], pair[1]]))
                        .map_err(|_| RawCommandError::Malformed)?;
                }
                Payload::WriteMultiple {
                    address: u16::from_be_bytes([*a_hi, *a_lo]),
                    values,
                }
            }
        };

        Ok(Self {
            slave_address,
            payload,
        })
    }

    /// Parse an `index=slave|baud|data bits|description|hex` line.
    pub fn from_line(line: &str) -> Result<CommandLine<'_>, RawCommandError> {
        CommandLine::parse(line)
    }

    pub fn slave_address(&self) -> u8 {
        self.slave_address
    }

    /// The same command addressed to `slave_address` instead.
    pub fn with_slave_address(self, slave_address: u8) -> Self {
        Self {
            slave_address,
            ..self
        }
    }

    pub fn request(&self) -> Request<'_> {
        match &self.payload {
            Payload::Read { address, count } => Request::ReadHoldingRegisters {
                address: *address,
                count: *count,
            },
            Payload::WriteSingle { address, value } => Request::WriteSingleRegister {
                address: *address,
                value: *value,
            },
            Payload::WriteMultiple { address, values } => Request::WriteMultipleRegisters {
                address: *address,
                count: values.len() as u16,
                values,
            },
        }
    }

    /// The command with its CRC appended.
    pub fn frame(&self) -> Result<Frame, EncodingError> {
        frame::build(self.slave_address, &self.request())
    }

    pub fn expect(&self) -> Expect {
        self.request().expect()
    }
}

impl FromStr for RawCommand {
    type Err = RawCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// One entry of a command list.
///
/// The line's slave field replaces the address in the hex, so `command` goes to that
/// slave. Baud rate and data bits are informational; the caller's link is used as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine<'a> {
    pub index: u32,
    pub slave_address: u8,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub description: &'a str,
    pub command: RawCommand,
}

impl<'a> CommandLine<'a> {
    pub fn parse(line: &'a str) -> Result<Self, RawCommandError> {
        let (index, rest) = line.trim().split_once('=').ok_or(RawCommandError::InvalidLine)?;
        let (slave_address, rest) = rest.split_once('|').ok_or(RawCommandError::InvalidLine)?;
        let (baud_rate, rest) = rest.split_once('|').ok_or(RawCommandError::InvalidLine)?;
        let (data_bits, rest) = rest.split_once('|').ok_or(RawCommandError::InvalidLine)?;
        // Descriptions may contain `|`; the hex is always the last field.
        let (description, hex) = rest.rsplit_once('|').ok_or(RawCommandError::InvalidLine)?;

        let slave_address = field(slave_address)?;
        Ok(Self {
            index: field(index)?,
            slave_address,
            baud_rate: field(baud_rate)?,
            data_bits: field(data_bits)?,
            description: description.trim(),
            command: RawCommand::from_hex(hex)?.with_slave_address(slave_address),
        })
    }
}

fn field<T: FromStr>(text: &str) -> Result<T, RawCommandError> {
    text.trim().parse().map_err(|_| RawCommandError::InvalidLine)
}

fn decode_hex(text: &str) -> Result<heapless::Vec<u8, MAX_FRAME_LEN>, RawCommandError> {
    let mut bytes = heapless::Vec::new();
    let mut high = None;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        let nibble = c.to_digit(16).ok_or(RawCommandError::InvalidHex)? as u8;
        match high.take() {
            None => high = Some(nibble),
            Some(high) => bytes
                .push((high << 4) | nibble)
                .map_err(|_| RawCommandError::Malformed)?,
        }
    }
    if high.is_some() {
        return Err(RawCommandError::InvalidHex);
    }
    Ok(bytes)
}
