//! Byte transport to the board.
//!
//! The [`Transport`] trait is the only seam between the protocol logic and the
//! serial hardware. Reads are bounded by a timeout; an expired read is not an
//! error, it simply ends the capture early.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info};

use crate::config::SerialConfig;
use crate::error::TransportError;

/// Bytes collected by a bounded read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    pub bytes: Vec<u8>,
    /// True only when the capture ends with the marker that was searched for.
    pub terminated: bool,
}

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Incremental suffix matcher: append one byte at a time, ask whether the
/// buffer now ends with the marker.
#[derive(Debug, Clone)]
pub struct MarkerScanner {
    marker: Vec<u8>,
    buffer: Vec<u8>,
}

impl MarkerScanner {
    pub fn new(marker: &[u8]) -> Self {
        Self {
            marker: marker.to_vec(),
            buffer: Vec::new(),
        }
    }

    /// Appends `byte` and reports whether the marker has just been completed.
    pub fn push(&mut self, byte: u8) -> bool {
        self.buffer.push(byte);
        !self.marker.is_empty() && self.buffer.ends_with(&self.marker)
    }

    pub fn into_capture(self, terminated: bool) -> Capture {
        Capture {
            bytes: self.buffer,
            terminated,
        }
    }
}

/// A blocking, timeout-bounded duplex byte channel.
pub trait Transport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Reads one byte, waiting at most `timeout`. `Ok(None)` means the wait expired.
    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, TransportError>;

    /// Drops anything the device sent that nobody has read yet.
    fn discard_input(&mut self) -> Result<(), TransportError>;

    /// Reads until the captured bytes end with `marker` or `timeout` elapses,
    /// handing every byte to `observer` as it arrives.
    fn read_until_observed(
        &mut self,
        marker: &[u8],
        timeout: Duration,
        observer: &mut dyn FnMut(u8),
    ) -> Result<Capture, TransportError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut scanner = MarkerScanner::new(marker);
        loop {
            let remaining = remaining_until(deadline, timeout);
            if remaining.is_zero() {
                return Ok(scanner.into_capture(false));
            }
            match self.read_byte(remaining)? {
                Some(byte) => {
                    observer(byte);
                    if scanner.push(byte) {
                        return Ok(scanner.into_capture(true));
                    }
                }
                None => return Ok(scanner.into_capture(false)),
            }
        }
    }

    fn read_until(&mut self, marker: &[u8], timeout: Duration) -> Result<Capture, TransportError> {
        self.read_until_observed(marker, timeout, &mut |_| {})
    }

    /// Reads `n` bytes, or fewer if `timeout` elapses first.
    fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut bytes = Vec::with_capacity(n);
        while bytes.len() < n {
            let remaining = remaining_until(deadline, timeout);
            if remaining.is_zero() {
                break;
            }
            match self.read_byte(remaining)? {
                Some(byte) => bytes.push(byte),
                None => break,
            }
        }
        Ok(bytes)
    }
}

/// Time left before `deadline`. A timeout too large to be represented as an
/// `Instant` has no deadline, so every read may wait the full `timeout`.
fn remaining_until(deadline: Option<Instant>, timeout: Duration) -> Duration {
    match deadline {
        Some(deadline) => deadline.saturating_duration_since(Instant::now()),
        None => timeout,
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_all(bytes)
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, TransportError> {
        (**self).read_byte(timeout)
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        (**self).discard_input()
    }
}

/// A serial port opened through `serialport`. The handle is closed when this
/// value is dropped.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    current_timeout: Duration,
}

impl SerialTransport {
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        let port = serialport::new(&config.port, config.baud)
            .timeout(config.timeout().min(MAX_READ_TIMEOUT))
            .open()
            .map_err(|source| TransportError::Open {
                port: config.port.clone(),
                source,
            })?;
        info!(port = %config.port, baud = config.baud, "serial port opened");
        Ok(Self {
            port,
            name: config.port.clone(),
            current_timeout: config.timeout().min(MAX_READ_TIMEOUT),
        })
    }
}

/// Port timeouts closer than this to the one already set are not reapplied.
/// A read may overrun the capture deadline by at most this much.
const RETIME_SLACK: Duration = Duration::from_millis(50);

/// Longest single blocking read; the capture deadline bounds the total.
const MAX_READ_TIMEOUT: Duration = Duration::from_secs(60);

fn needs_retime(current: Duration, wanted: Duration) -> bool {
    let drift = if current > wanted {
        current - wanted
    } else {
        wanted - current
    };
    drift > RETIME_SLACK
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<Option<u8>, TransportError> {
        let timeout = timeout.min(MAX_READ_TIMEOUT);
        if needs_retime(self.current_timeout, timeout) {
            self.port.set_timeout(timeout)?;
            self.current_timeout = timeout;
        }
        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        debug!(port = %self.name, "serial port closed");
    }
}

/// Names of the serial ports the OS currently reports.
pub fn list_ports() -> Result<Vec<String>, TransportError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|port| port.port_name)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a fixed byte stream, then reports expiry forever.
    struct Replay(VecDeque<u8>);

    impl Transport for Replay {
        fn write_all(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        fn read_byte(&mut self, _timeout: Duration) -> Result<Option<u8>, TransportError> {
            Ok(self.0.pop_front())
        }

        fn discard_input(&mut self) -> Result<(), TransportError> {
            self.0.clear();
            Ok(())
        }
    }

    fn replay(bytes: &[u8]) -> Replay {
        Replay(bytes.iter().copied().collect())
    }

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn scanner_detects_marker_suffix() {
        let mut scanner = MarkerScanner::new(b"m-ready\r\n");
        let hits: Vec<bool> = b"xm-ready\r\n".iter().map(|&b| scanner.push(b)).collect();
        assert_eq!(hits.iter().filter(|&&h| h).count(), 1);
        assert!(*hits.last().unwrap());
    }

    #[test]
    fn read_until_stops_at_first_marker() {
        let mut t = replay(b"hello m-ready\r\nleftover");
        let capture = t.read_until(b"m-ready\r\n", SECOND).unwrap();
        assert!(capture.terminated);
        assert_eq!(capture.text(), "hello m-ready\r\n");
        assert_eq!(t.0.len(), b"leftover".len());
    }

    #[test]
    fn marker_mid_stream_without_crlf_does_not_terminate() {
        let mut t = replay(b"m-ready then more m-ready\r\n");
        let capture = t.read_until(b"m-ready\r\n", SECOND).unwrap();
        assert!(capture.terminated);
        assert_eq!(capture.bytes.len(), 27);
    }

    #[test]
    fn read_until_returns_partial_capture_on_expiry() {
        let mut t = replay(b"m-lap-us-100\r\n");
        let capture = t.read_until(b"m-ready\r\n", SECOND).unwrap();
        assert!(!capture.terminated);
        assert_eq!(capture.text(), "m-lap-us-100\r\n");
    }

    #[test]
    fn observer_sees_every_byte() {
        let mut t = replay(b"..m-ready\r\n");
        let mut seen = Vec::new();
        let capture = t
            .read_until_observed(b"m-ready\r\n", SECOND, &mut |b| seen.push(b))
            .unwrap();
        assert_eq!(seen, capture.bytes);
    }

    #[test]
    fn read_exact_short_on_expiry() {
        let mut t = replay(b"abc");
        assert_eq!(t.read_exact(2, SECOND).unwrap(), b"ab");
        assert_eq!(t.read_exact(5, SECOND).unwrap(), b"c");
    }

    #[test]
    fn open_missing_port_fails() {
        let config = SerialConfig {
            port: "/dev/definitely-not-a-serial-port".into(),
            ..SerialConfig::default()
        };
        let result = SerialTransport::open(&config);
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }

    #[test]
    fn unbounded_timeout_has_no_deadline() {
        let huge = Duration::from_secs(u64::MAX);
        let mut t = replay(b"m-ready\r\nxyz");
        assert!(t.read_until(b"m-ready\r\n", huge).unwrap().terminated);
        assert_eq!(t.read_exact(5, huge).unwrap(), b"xyz");
        assert_eq!(remaining_until(None, huge), huge);
    }

    #[test]
    fn port_timeout_is_reapplied_only_on_real_change() {
        assert!(!needs_retime(SECOND, SECOND - Duration::from_millis(3)));
        assert!(!needs_retime(SECOND, SECOND + RETIME_SLACK));
        assert!(needs_retime(SECOND, Duration::from_millis(100)));
        assert!(needs_retime(Duration::from_millis(100), SECOND));
    }
}
