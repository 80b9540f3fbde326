use std::env;

use fugit::ExtU32;
use hcp_psu::{HcpPsu, SequenceStep, raw::RawCommand};
use inquire::{Select, Text};
use serialport::SerialPort;

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 9600;
// The PSU can take a while to respond, a reasonably large time out is required.
const SERIAL_TIMEOUT_MS: u64 = 300;
const SLAVE_ADDRESS: u8 = 0x11;
const OUTPUT_VOLTAGE: f64 = 5.0;
const CURRENT_LIMIT: f64 = 1.2;
const OVP_VOLTAGE: f64 = 6.0;
const OCP_CURRENT: f64 = 1.5;
const STABILIZATION_DELAY_MS: u64 = 1000;

const WALKTHROUGH: &str = "Walk through set points and readback";
const SEQUENCE: &str = "Run a voltage sequence";
const RAW: &str = "Send raw command lines";

pub struct PortWrapper(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::ConnectionRefused => embedded_io::ErrorKind::ConnectionRefused,
            std::io::ErrorKind::ConnectionReset => embedded_io::ErrorKind::ConnectionReset,
            std::io::ErrorKind::ConnectionAborted => embedded_io::ErrorKind::ConnectionAborted,
            std::io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
            std::io::ErrorKind::AddrInUse => embedded_io::ErrorKind::AddrInUse,
            std::io::ErrorKind::AddrNotAvailable => embedded_io::ErrorKind::AddrNotAvailable,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::AlreadyExists => embedded_io::ErrorKind::AlreadyExists,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            std::io::ErrorKind::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

fn main() {
    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        // List available serial ports
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        // Interactive selection
        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    println!("Using port: {}", port_name);

    // Open serial port
    let port = serialport::new(&port_name, BAUD_RATE)
        .timeout(std::time::Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()
        .expect("Failed to open serial port");

    // Create a PSU object
    let mut psu: HcpPsu<PortWrapper> =
        HcpPsu::new(PortWrapper(port), SLAVE_ADDRESS).expect("Invalid slave address");

    let mode = Select::new("What to do:", vec![WALKTHROUGH, SEQUENCE, RAW])
        .prompt()
        .expect("Failed to select mode");

    match mode {
        WALKTHROUGH => walkthrough(&mut psu),
        SEQUENCE => sequence(&mut psu),
        _ => raw_lines(&mut psu),
    }
}

fn walkthrough(psu: &mut HcpPsu<PortWrapper>) {
    psu.set_voltage(OUTPUT_VOLTAGE).unwrap();
    println!("Set output voltage to {}V", OUTPUT_VOLTAGE);

    psu.set_current(CURRENT_LIMIT).unwrap();
    println!("Set current limit to {}A", CURRENT_LIMIT);

    psu.set_protection_thresholds(OVP_VOLTAGE, OCP_CURRENT).unwrap();
    println!("Set OVP to {}V and OCP to {}A", OVP_VOLTAGE, OCP_CURRENT);

    psu.set_output_protection_flags(true, true, true).unwrap();
    println!("Output enabled with OVP/OCP armed");

    // Wait for output to stabilize
    std::thread::sleep(std::time::Duration::from_millis(STABILIZATION_DELAY_MS));

    println!("\n--- Settings ---");
    println!("{:#?}", psu.query_settings().unwrap());

    println!("\n--- Measured ---");
    let measured = psu.query_actual_values().unwrap();
    println!(
        "{:.2}V {:.3}A {:#?}",
        measured.voltage, measured.current, measured.status
    );

    psu.set_output(false).unwrap();
    println!("\nOutput disabled");
}

fn sequence(psu: &mut HcpPsu<PortWrapper>) {
    let steps = [
        SequenceStep {
            voltage: 3.3,
            current: 0.5,
            hold: 2.secs(),
        },
        SequenceStep {
            voltage: 5.0,
            current: 0.5,
            hold: 2.secs(),
        },
        SequenceStep {
            voltage: 12.0,
            current: 0.5,
            hold: 2.secs(),
        },
    ];

    let result = psu.run_sequence(&steps, |hold| {
        println!("Holding for {}ms", hold.to_millis());
        std::thread::sleep(std::time::Duration::from_millis(hold.to_millis().into()));
    });
    match result {
        Ok(()) => println!("Sequence complete, output disabled"),
        Err(err) => println!("Sequence aborted, output disabled: {}", err),
    }
}

fn raw_lines(psu: &mut HcpPsu<PortWrapper>) {
    println!("Enter `index=slave|baud|data bits|description|hex` lines, or bare hex. Empty line quits.");
    loop {
        let line = Text::new(">").prompt().expect("Failed to read line");
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        let command = match RawCommand::from_line(line) {
            Ok(entry) => {
                println!("{}: {} (slave {})", entry.index, entry.description, entry.slave_address);
                entry.command
            }
            Err(_) => match RawCommand::from_hex(line) {
                Ok(command) => command,
                Err(err) => {
                    println!("Invalid command: {}", err);
                    continue;
                }
            },
        };

        match psu.send_raw(&command) {
            Ok(registers) if registers.is_empty() => println!("Acknowledged"),
            Ok(registers) => println!("Registers: {:04X?}", registers.as_slice()),
            Err(err) => println!("Failed: {}", err),
        }

        // Give the device time between commands.
        std::thread::sleep(std::time::Duration::from_millis(500));
    }
}
