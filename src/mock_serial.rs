//! We use this mocking module in unit tests to emulate a PSU on the far end of a serial port.
//!
//! Responses are queued up front. Each write releases the next queued response for
//! reading, the way the device answers one request at a time.

use heapless::{Deque, Vec};

const CAPACITY: usize = 256;
const MAX_QUEUED: usize = 8;

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Everything written to the port, across all requests.
    written: Vec<u8, CAPACITY>,
    /// Responses not yet released by a write.
    queued: Deque<Vec<u8, CAPACITY>, MAX_QUEUED>,
    /// Response currently being read.
    read_buffer: Vec<u8, CAPACITY>,
    read_position: usize,
    /// Number of write calls that carried data.
    requests: usize,
    fail_writes: bool,
    fail_reads: bool,
    /// Report an exhausted response as a timeout instead of would-block.
    timeout_when_empty: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum MockSerialError {
    /// Simulated read timeout.
    #[error("read timed out")]
    Timeout,
    /// A buffer of the mock itself is full.
    #[error("mock buffer full")]
    BufferOverflow,
    /// Simulated hardware fault.
    #[error("simulated hardware fault")]
    SimulatedError,
    /// No data available.
    #[error("no data available")]
    WouldBlock,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::NotConnected,
            // Some serial drivers report an empty receive buffer this way.
            MockSerialError::WouldBlock => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fail_writes {
            return Err(MockSerialError::SimulatedError);
        }
        self.written
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;

        if !buf.is_empty() {
            self.requests += 1;
            if let Some(response) = self.queued.pop_front() {
                self.read_buffer = response;
                self.read_position = 0;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.fail_reads {
            return Err(MockSerialError::SimulatedError);
        }

        let remaining = &self.read_buffer[self.read_position..];
        if remaining.is_empty() {
            return Err(if self.timeout_when_empty {
                MockSerialError::Timeout
            } else {
                MockSerialError::WouldBlock
            });
        }

        let count = remaining.len().min(buf.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.read_position += count;
        Ok(count)
    }
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            written: Vec::new(),
            queued: Deque::new(),
            read_buffer: Vec::new(),
            read_position: 0,
            requests: 0,
            fail_writes: false,
            fail_reads: false,
            timeout_when_empty: false,
        }
    }

    /// Queue the device's answer to the next request.
    pub fn queue_response(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        let mut response = Vec::new();
        response
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)?;
        self.queued
            .push_back(response)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Queue one response per upcoming request.
    pub fn queue_responses(&mut self, responses: &[&[u8]]) -> Result<(), MockSerialError> {
        responses
            .iter()
            .try_for_each(|response| self.queue_response(response))
    }

    /// Everything written to the port so far.
    pub fn written_data(&self) -> &[u8] {
        &self.written
    }

    pub fn clear_written_data(&mut self) {
        self.written.clear();
    }

    /// Number of non-empty writes, i.e. requests sent.
    pub fn request_count(&self) -> usize {
        self.requests
    }

    pub fn set_write_error(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn set_read_error(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn set_read_timeout(&mut self, timeout: bool) {
        self.timeout_when_empty = timeout;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_new_mock_serial() {
        let mock = MockSerial::new();
        assert!(mock.written_data().is_empty());
        assert_eq!(mock.request_count(), 0);
    }

    #[test]
    fn test_write_accumulates() {
        let mut mock = MockSerial::new();
        mock.write_all(b"Hello, ").unwrap();
        mock.write_all(b"World!").unwrap();
        assert_eq!(mock.written_data(), b"Hello, World!");
        assert_eq!(mock.request_count(), 2);

        mock.clear_written_data();
        assert!(mock.written_data().is_empty());
    }

    #[test]
    fn test_write_buffer_overflow() {
        let mut mock = MockSerial::new();
        let large_data = [0u8; 300];
        assert!(matches!(
            mock.write(&large_data),
            Err(MockSerialError::BufferOverflow)
        ));
    }

    #[test]
    fn test_nothing_to_read_before_a_request() {
        let mut mock = MockSerial::new();
        mock.queue_response(b"reply").unwrap();

        let mut buffer = [0u8; 8];
        assert!(matches!(mock.read(&mut buffer), Err(MockSerialError::WouldBlock)));
    }

    #[test]
    fn test_responses_released_in_order() {
        let mut mock = MockSerial::new();
        mock.queue_responses(&[b"first".as_slice(), b"second".as_slice()]).unwrap();

        let mut buffer = [0u8; 4];
        mock.write_all(b"req").unwrap();
        assert_eq!(mock.read(&mut buffer).unwrap(), 4);
        assert_eq!(&buffer, b"firs");
        assert_eq!(mock.read(&mut buffer).unwrap(), 1);
        assert_eq!(&buffer[..1], b"t");
        assert!(matches!(mock.read(&mut buffer), Err(MockSerialError::WouldBlock)));

        mock.write_all(b"req").unwrap();
        let mut buffer = [0u8; 16];
        assert_eq!(mock.read(&mut buffer).unwrap(), 6);
        assert_eq!(&buffer[..6], b"second");
    }

    #[test]
    fn test_queue_is_bounded() {
        let mut mock = MockSerial::new();
        for _ in 0..MAX_QUEUED {
            mock.queue_response(b"x").unwrap();
        }
        assert!(matches!(
            mock.queue_response(b"x"),
            Err(MockSerialError::BufferOverflow)
        ));
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockSerial::new();
        mock.set_write_error(true);
        assert!(mock.write(b"test").is_err());
        assert!(mock.flush().is_err());
        assert!(mock.written_data().is_empty());
        mock.set_write_error(false);
        assert!(mock.write(b"test").is_ok());

        mock.set_read_error(true);
        let mut buffer = [0u8; 4];
        assert!(matches!(
            mock.read(&mut buffer),
            Err(MockSerialError::SimulatedError)
        ));
    }

    #[test]
    fn test_read_timeout_after_partial_response() {
        let mut mock = MockSerial::new();
        mock.set_read_timeout(true);
        mock.queue_response(b"ab").unwrap();
        mock.write_all(b"req").unwrap();

        let mut buffer = [0u8; 8];
        assert_eq!(mock.read(&mut buffer).unwrap(), 2);
        assert!(matches!(mock.read(&mut buffer), Err(MockSerialError::Timeout)));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(MockSerialError::Timeout.to_string(), "read timed out");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(MockSerialError::Timeout.kind(), embedded_io::ErrorKind::TimedOut);
        assert_eq!(
            MockSerialError::BufferOverflow.kind(),
            embedded_io::ErrorKind::OutOfMemory
        );
        assert_eq!(
            MockSerialError::SimulatedError.kind(),
            embedded_io::ErrorKind::NotConnected
        );
        assert_eq!(MockSerialError::WouldBlock.kind(), embedded_io::ErrorKind::Other);
    }
}
