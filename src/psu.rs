use embedded_io::Error as _;
use fugit::MillisDurationU32;
use tracing::{debug, warn};

use crate::{
    command::{ActualValues, Dispatcher, Operation, Response, Settings},
    error::{ConfigError, Error, FrameError, Result},
    frame::MAX_READ_REGISTERS,
    parser::{self, Expect},
    raw::RawCommand,
    register::{RegisterMap, StatusFlags},
    types::State,
};

/// One step of a voltage/current sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceStep {
    /// Volts.
    pub voltage: f64,
    /// Amps.
    pub current: f64,
    /// How long to hold the step before moving on.
    pub hold: MillisDurationU32,
}

/// You can create a HcpPsu using any interface which implements [embedded_io::Read] & [embedded_io::Write].
///
/// Each call sends one request and waits for its response; there are no retries. `L` is
/// the receive buffer size and must hold the largest response you ask for (11 bytes for
/// the three-register queries).
///
/// For it's methods, "set" writes a configuration, "query" reads configuration or
/// measurements as a group and "read" gets a single measured value.
pub struct HcpPsu<S: embedded_io::Read + embedded_io::Write, const L: usize = 64> {
    interface: S,
    dispatcher: Dispatcher<'static>,
}

impl<S: embedded_io::Read + embedded_io::Write, const L: usize> HcpPsu<S, L> {
    /// Create a new HcpPsu talking to the device at `slave_address` (1-247).
    pub fn new(interface: S, slave_address: u8) -> core::result::Result<Self, ConfigError> {
        Ok(Self {
            interface,
            dispatcher: Dispatcher::new(slave_address)?,
        })
    }

    /// Create a HcpPsu for a model whose registers differ from [`crate::HCP_REGISTER_MAP`].
    pub fn with_register_map(
        interface: S,
        slave_address: u8,
        map: RegisterMap<'static>,
    ) -> core::result::Result<Self, ConfigError> {
        Ok(Self {
            interface,
            dispatcher: Dispatcher::with_register_map(slave_address, map)?,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher<'static> {
        &self.dispatcher
    }

    /// Give back the interface.
    pub fn release(self) -> S {
        self.interface
    }

    /// Send `operation` and return the device's decoded answer.
    pub fn execute(&mut self, operation: &Operation) -> Result<Response, S::Error> {
        let exchange = self.dispatcher.build_frame(operation)?;
        let received = self.transact(exchange.request(), exchange.expect())?;
        exchange.parse_response(&received).map_err(|err| rejected(&received, err))
    }

    /// Send a hand-written command. Returns the registers read, empty for writes.
    ///
    /// The command goes to its own slave address, not the one this HcpPsu was created
    /// with. For command lines that is the line's slave field.
    pub fn send_raw(
        &mut self,
        command: &RawCommand,
    ) -> Result<heapless::Vec<u16, MAX_READ_REGISTERS>, S::Error> {
        let frame = command.frame()?;
        let expect = command.expect();
        let received = self.transact(&frame, &expect)?;
        let parsed = parser::parse(&received, command.slave_address(), &expect)
            .map_err(|err| rejected(&received, err))?;

        let mut registers = heapless::Vec::new();
        if let Some(data) = parsed.registers() {
            for value in data.iter() {
                registers.push(value).map_err(|_| Error::BufferError)?;
            }
        }
        Ok(registers)
    }

    /// Set the output voltage in volts.
    pub fn set_voltage(&mut self, volts: f64) -> Result<(), S::Error> {
        self.write(Operation::SetVoltage(volts))
    }

    /// Set the current limit in amps.
    pub fn set_current(&mut self, amps: f64) -> Result<(), S::Error> {
        self.write(Operation::SetCurrent(amps))
    }

    /// Switch the output on or off.
    ///
    /// __Note:__ This writes the whole control word, so it also disables OVP/OCP and
    /// unlocks the keyboard.
    pub fn set_output(&mut self, state: impl Into<State>) -> Result<(), S::Error> {
        self.write(Operation::SetOutput(is_on(state)))
    }

    /// Set voltage, current limit and output state in a single transaction.
    pub fn set_voltage_current_output(
        &mut self,
        volts: f64,
        amps: f64,
        output: impl Into<State>,
    ) -> Result<(), S::Error> {
        self.write(Operation::SetVoltageCurrentOutput {
            volts,
            amps,
            output: is_on(output),
        })
    }

    /// Set both protection thresholds in a single transaction.
    pub fn set_protection_thresholds(
        &mut self,
        ovp_volts: f64,
        ocp_amps: f64,
    ) -> Result<(), S::Error> {
        self.write(Operation::SetProtectionThresholds { ovp_volts, ocp_amps })
    }

    pub fn set_ovp(&mut self, volts: f64) -> Result<(), S::Error> {
        self.write(Operation::SetOverVoltageProtection(volts))
    }

    pub fn set_ocp(&mut self, amps: f64) -> Result<(), S::Error> {
        self.write(Operation::SetOverCurrentProtection(amps))
    }

    /// Set output, OVP enable and OCP enable together.
    pub fn set_output_protection_flags(
        &mut self,
        output: bool,
        ovp_enable: bool,
        ocp_enable: bool,
    ) -> Result<(), S::Error> {
        self.write(Operation::SetOutputProtectionFlags {
            output,
            ovp_enable,
            ocp_enable,
        })
    }

    /// Clear latched protection trips.
    pub fn clear_protections(&mut self) -> Result<(), S::Error> {
        self.write(Operation::ClearProtections)
    }

    pub fn lock_keyboard(&mut self, state: impl Into<State>) -> Result<(), S::Error> {
        self.write(Operation::LockKeyboard(is_on(state)))
    }

    pub fn set_constant_power_enabled(&mut self, state: impl Into<State>) -> Result<(), S::Error> {
        self.write(Operation::SetConstantPowerEnabled(is_on(state)))
    }

    /// Set the constant power level in watts.
    pub fn set_constant_power(&mut self, watts: f64) -> Result<(), S::Error> {
        self.write(Operation::SetConstantPower(watts))
    }

    /// Read back the voltage and current settings and the control word.
    pub fn query_settings(&mut self) -> Result<Settings, S::Error> {
        match self.execute(&Operation::QuerySettings)? {
            Response::Settings(settings) => Ok(settings),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Read measured voltage, measured current and status together.
    pub fn query_actual_values(&mut self) -> Result<ActualValues, S::Error> {
        match self.execute(&Operation::QueryActualValues)? {
            Response::ActualValues(values) => Ok(values),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Return the measured output voltage in volts.
    pub fn read_voltage(&mut self) -> Result<f64, S::Error> {
        match self.execute(&Operation::ReadVoltage)? {
            Response::Voltage(volts) => Ok(volts),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Return the measured output current in amps.
    pub fn read_current(&mut self) -> Result<f64, S::Error> {
        match self.execute(&Operation::ReadCurrent)? {
            Response::Current(amps) => Ok(amps),
            _ => Err(Error::InvalidResponse),
        }
    }

    pub fn read_status(&mut self) -> Result<StatusFlags, S::Error> {
        match self.execute(&Operation::ReadStatus)? {
            Response::Status(status) => Ok(status),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Step the output through `steps`, calling `delay` with each step's hold time.
    ///
    /// The output is switched off afterwards, also when a step fails. The first error
    /// is returned.
    pub fn run_sequence(
        &mut self,
        steps: &[SequenceStep],
        mut delay: impl FnMut(MillisDurationU32),
    ) -> Result<(), S::Error> {
        let result: Result<(), S::Error> = steps.iter().try_for_each(|step| {
            debug!(
                volts = step.voltage,
                amps = step.current,
                hold_ms = step.hold.to_millis(),
                "sequence step"
            );
            self.set_voltage_current_output(step.voltage, step.current, State::On)?;
            delay(step.hold);
            Ok(())
        });
        let off = self.set_output(State::Off);
        result.and(off)
    }

    fn write(&mut self, operation: Operation) -> Result<(), S::Error> {
        match self.execute(&operation)? {
            Response::Written => Ok(()),
            _ => Err(Error::InvalidResponse),
        }
    }

    /// Write `request` and collect the response bytes.
    ///
    /// Reading stops once `expect` says the response is complete, or when the interface
    /// reports no more data (would-block / timeout) after some bytes arrived.
    fn transact(
        &mut self,
        request: &[u8],
        expect: &Expect,
    ) -> Result<heapless::Vec<u8, L>, S::Error> {
        debug!(frame = ?request, "tx");
        self.interface.write_all(request).map_err(Error::SerialError)?;
        self.interface.flush().map_err(Error::SerialError)?;

        let mut received: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut chunk = [0u8; 8];
        while !expect.is_complete(&received) {
            match self.interface.read(&mut chunk) {
                // End of stream.
                Ok(0) => break,
                Ok(bytes_read) => {
                    if received.extend_from_slice(&chunk[..bytes_read]).is_err() {
                        return Err(Error::BufferError);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        embedded_io::ErrorKind::Other | embedded_io::ErrorKind::TimedOut
                    ) =>
                {
                    break;
                }
                Err(e) => return Err(Error::SerialError(e)),
            }
        }

        if received.is_empty() {
            warn!("no response");
            return Err(Error::Timeout);
        }
        debug!(frame = ?received.as_slice(), "rx");
        Ok(received)
    }
}

fn is_on(state: impl Into<State>) -> bool {
    let state: State = state.into();
    state.into()
}

fn rejected<I: embedded_io::Error>(received: &[u8], err: FrameError) -> Error<I> {
    warn!(frame = ?received, error = %err, "response rejected");
    Error::Frame(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mock_serial::MockSerial, types::ExceptionCode};
    use fugit::ExtU32;

    const OUTPUT_OFF: [u8; 8] = [0x11, 0x06, 0x00, 0x05, 0x00, 0x00, 0x9B, 0x5B];
    const WRITE_MULTIPLE_ACK: [u8; 8] = [0x11, 0x10, 0x00, 0x03, 0x00, 0x03, 0x72, 0x98];

    fn psu_with(responses: &[&[u8]]) -> HcpPsu<MockSerial> {
        let mut mock = MockSerial::new();
        mock.queue_responses(responses).unwrap();
        HcpPsu::new(mock, 0x11).unwrap()
    }

    #[test]
    fn test_rejects_bad_slave_address() {
        assert_eq!(
            HcpPsu::<MockSerial>::new(MockSerial::new(), 0).err(),
            Some(ConfigError::InvalidSlaveAddress(0))
        );
    }

    #[test]
    fn test_set_voltage() {
        let frame = [0x11, 0x06, 0x00, 0x03, 0x01, 0xF4, 0x7B, 0x4D];
        let mut psu = psu_with(&[&frame]);

        psu.set_voltage(5.0).unwrap();
        assert_eq!(psu.interface.written_data(), frame.as_slice());
    }

    #[test]
    fn test_set_current() {
        let frame = [0x11, 0x06, 0x00, 0x04, 0x04, 0xB0, 0xC9, 0xEF];
        let mut psu = psu_with(&[&frame]);

        psu.set_current(1.2).unwrap();
        assert_eq!(psu.interface.written_data(), frame.as_slice());
    }

    #[test]
    fn test_set_voltage_current_output() {
        let mut psu = psu_with(&[&WRITE_MULTIPLE_ACK]);

        psu.set_voltage_current_output(5.0, 1.2, true).unwrap();
        assert_eq!(
            psu.interface.written_data(),
            [
                0x11, 0x10, 0x00, 0x03, 0x00, 0x03, 0x06, 0x01, 0xF4, 0x04, 0xB0, 0x00, 0x01,
                0x59, 0x0C
            ]
            .as_slice()
        );
    }

    #[test]
    fn test_write_echo_mismatch() {
        // Device echoes a different value.
        let mut psu = psu_with(&[&[0x11, 0x06, 0x00, 0x05, 0x00, 0x01, 0x5A, 0x9B]]);

        let result = psu.set_output(false);
        assert!(matches!(result, Err(Error::Frame(FrameError::EchoMismatch))));
    }

    #[test]
    fn test_query_settings() {
        let mut psu = psu_with(&[&[
            0x11, 0x03, 0x06, 0x01, 0xF4, 0x04, 0xB0, 0x00, 0x01, 0x9D, 0xA6,
        ]]);

        let settings = psu.query_settings().unwrap();
        assert_eq!(
            psu.interface.written_data(),
            [0x11, 0x03, 0x00, 0x03, 0x00, 0x03, 0xF7, 0x5B].as_slice()
        );
        assert_eq!(settings.voltage, 5.0);
        assert_eq!(settings.current, 1.2);
        assert!(settings.status.output_on);
        assert!(settings.control.output_enable);
    }

    #[test]
    fn test_query_actual_values() {
        let mut psu = psu_with(&[&[
            0x11, 0x03, 0x06, 0x01, 0xF3, 0x00, 0x00, 0x00, 0x03, 0xA9, 0x70,
        ]]);

        let values = psu.query_actual_values().unwrap();
        assert_eq!(values.voltage, 4.99);
        assert_eq!(values.current, 0.0);
        assert!(values.status.output_on && values.status.cv_mode);
    }

    #[test]
    fn test_read_voltage_and_status() {
        let mut psu = psu_with(&[
            &[0x11, 0x03, 0x02, 0x01, 0xF4, 0x79, 0x90],
            &[0x11, 0x03, 0x02, 0x00, 0x19, 0xB8, 0x4D],
        ]);

        assert_eq!(psu.read_voltage().unwrap(), 5.0);
        let status = psu.read_status().unwrap();
        assert!(status.output_on && status.ovp_tripped && status.ocp_tripped);
        assert!(!status.cc_mode);
        assert_eq!(psu.interface.request_count(), 2);
    }

    #[test]
    fn test_read_bad_crc() {
        let mut psu = psu_with(&[&[0x11, 0x03, 0x02, 0x01, 0xF4, 0x00, 0x00]]);

        let result = psu.read_voltage();
        assert!(matches!(
            result,
            Err(Error::Frame(FrameError::CrcMismatch { actual: 0, .. }))
        ));
    }

    #[test]
    fn test_device_exception() {
        let mut psu = psu_with(&[&[0x11, 0x83, 0x02, 0xC1, 0x34]]);

        let result = psu.read_current();
        assert!(matches!(
            result,
            Err(Error::Frame(FrameError::DeviceException(
                ExceptionCode::IllegalDataAddress
            )))
        ));
    }

    #[test]
    fn test_no_response_is_timeout() {
        let mut psu = psu_with(&[]);

        assert!(matches!(psu.read_voltage(), Err(Error::Timeout)));
        // The request still went out.
        assert_eq!(psu.interface.request_count(), 1);
    }

    #[test]
    fn test_truncated_response() {
        let mut psu = psu_with(&[&[0x11, 0x03, 0x02]]);

        assert!(matches!(
            psu.read_voltage(),
            Err(Error::Frame(FrameError::ShortFrame {
                expected: 7,
                actual: 3
            }))
        ));
    }

    #[test]
    fn test_read_timeout_mid_response() {
        let mut psu = psu_with(&[&[0x11, 0x03, 0x02, 0x01], &[]]);
        psu.interface.set_read_timeout(true);

        assert!(matches!(
            psu.read_voltage(),
            Err(Error::Frame(FrameError::ShortFrame {
                expected: 7,
                actual: 4
            }))
        ));
        // A timeout before the first byte.
        assert!(matches!(psu.read_voltage(), Err(Error::Timeout)));
    }

    #[test]
    fn test_serial_errors() {
        let mut psu = psu_with(&[]);
        psu.interface.set_write_error(true);
        assert!(matches!(psu.set_voltage(5.0), Err(Error::SerialError(_))));

        psu.interface.set_write_error(false);
        psu.interface.set_read_error(true);
        assert!(matches!(psu.read_voltage(), Err(Error::SerialError(_))));
    }

    #[test]
    fn test_out_of_range_sends_nothing() {
        let mut psu = psu_with(&[]);

        assert!(matches!(
            psu.set_voltage(-5.0),
            Err(Error::Encoding(crate::error::EncodingError::OutOfRange { .. }))
        ));
        assert!(psu.interface.written_data().is_empty());
    }

    #[test]
    fn test_receive_buffer_too_small() {
        let mut mock = MockSerial::new();
        mock.queue_response(&[0x11, 0x03, 0x06, 0x01, 0xF4, 0x04, 0xB0, 0x00, 0x01, 0x9D, 0xA6])
            .unwrap();
        let mut psu: HcpPsu<MockSerial, 4> = HcpPsu::new(mock, 0x11).unwrap();

        assert!(matches!(psu.query_settings(), Err(Error::BufferError)));
    }

    #[test]
    fn test_run_sequence() {
        let mut psu = psu_with(&[&WRITE_MULTIPLE_ACK, &WRITE_MULTIPLE_ACK, &OUTPUT_OFF]);
        let steps = [
            SequenceStep {
                voltage: 5.0,
                current: 1.2,
                hold: 500.millis(),
            },
            SequenceStep {
                voltage: 12.0,
                current: 1.0,
                hold: 1.secs(),
            },
        ];

        let mut holds = Vec::new();
        psu.run_sequence(&steps, |hold| holds.push(hold.to_millis()))
            .unwrap();

        assert_eq!(holds, vec![500, 1000]);
        assert_eq!(psu.interface.request_count(), 3);
        let written = psu.interface.written_data();
        assert_eq!(&written[written.len() - 8..], OUTPUT_OFF.as_slice());
    }

    #[test]
    fn test_run_sequence_switches_off_after_failure() {
        // The first step is rejected with "illegal data value".
        let mut psu = psu_with(&[&[0x11, 0x90, 0x03, 0x0D, 0xC4], &OUTPUT_OFF]);
        let steps = [SequenceStep {
            voltage: 5.0,
            current: 1.2,
            hold: 500.millis(),
        }];

        let mut delays = 0;
        let result = psu.run_sequence(&steps, |_| delays += 1);

        assert!(matches!(
            result,
            Err(Error::Frame(FrameError::DeviceException(
                ExceptionCode::IllegalDataValue
            )))
        ));
        assert_eq!(delays, 0);
        assert_eq!(psu.interface.request_count(), 2);
        let written = psu.interface.written_data();
        assert_eq!(&written[written.len() - 8..], OUTPUT_OFF.as_slice());
    }

    #[test]
    fn test_send_raw() {
        let mut psu = psu_with(&[
            &[0x11, 0x03, 0x02, 0x01, 0xF4, 0x79, 0x90],
            &[0x11, 0x06, 0x00, 0x03, 0x01, 0xF4, 0x7B, 0x4D],
        ]);

        let read = RawCommand::from_hex("11 03 00 00 00 01").unwrap();
        assert_eq!(psu.send_raw(&read).unwrap().as_slice(), [0x01F4].as_slice());

        let write = RawCommand::from_hex("11 06 00 03 01 F4").unwrap();
        assert!(psu.send_raw(&write).unwrap().is_empty());
    }

    #[test]
    fn test_send_raw_to_other_slave() {
        let mut psu = psu_with(&[&[0x01, 0x03, 0x02, 0x01, 0xF4, 0xB8, 0x53]]);

        let read = RawCommand::from_hex("01 03 00 00 00 01").unwrap();
        assert_eq!(psu.send_raw(&read).unwrap().as_slice(), [0x01F4].as_slice());
        assert_eq!(
            psu.interface.written_data(),
            [0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A].as_slice()
        );
    }

    #[test]
    fn test_send_raw_line_uses_line_slave() {
        let ack = [0x01, 0x06, 0x00, 0x03, 0x01, 0xF4, 0x79, 0xDD];
        let mut psu = psu_with(&[&ack]);

        let line = RawCommand::from_line("1=1|1000|1|set 5V|11 06 00 03 01 F4").unwrap();
        assert!(psu.send_raw(&line.command).unwrap().is_empty());
        assert_eq!(psu.interface.written_data(), ack.as_slice());
    }
}
