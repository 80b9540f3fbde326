//! This crate provides a Modbus RTU master for commanding and querying HCP series programmable DC power supplies.
//!
//! It supports `no-std` environments by use of the `no-std` feature flag. The protocol core
//! never allocates and never touches a transport: it turns operations into request bytes
//! and received bytes into typed results.
//!
//! * [`crc`] - CRC16/MODBUS.
//! * [`frame`] - request frame encoding.
//! * [`parser`] - response frame validation.
//! * [`register`] - the register layout and physical unit scaling.
//! * [`command`] - named operations ([`Operation`]) built into exchanges by a [`Dispatcher`].
//! * [`raw`] - hand-written hex commands.
//! * [`psu`] - a blocking driver ([`HcpPsu`]) over any [embedded_io] byte stream.
//!
//! The serial port used for PSU comms should be configured like so:
//! * Default baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! The factory slave address is `0x11`.

#![cfg_attr(feature = "no-std", no_std)]

pub mod command;
pub mod crc;
pub mod error;
pub mod frame;
pub mod parser;
pub mod psu;
pub mod raw;
pub mod register;
pub mod scaling;
pub mod types;

pub use command::{Dispatcher, Exchange, Operation, Outcome, Response};
pub use psu::{HcpPsu, SequenceStep};
pub use register::HCP_REGISTER_MAP;

#[cfg(test)]
mod mock_serial;
