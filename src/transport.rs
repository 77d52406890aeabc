//! Serial transport to the braille display device.
//!
//! Owns the connection lifecycle and the line-oriented wire protocol:
//!
//! - Outgoing: `TEXT:<text>\n` renders one group of characters,
//!   `CONFIG:DUAL=<0|1>\n` toggles dual-actuator mode.
//! - Incoming: newline-terminated telemetry, surfaced as whitespace-stripped
//!   non-empty lines on a per-connection channel.
//!
//! The link runs at a fixed 9600 baud with 1 s timeouts. `connect` performs
//! the device reset handshake (drop DTR, short settle, raise DTR, then a
//! 2 s boot wait; the device cannot be commanded before it finishes
//! booting) and spawns the background reader. Exactly two threads touch an
//! open connection: the submitting thread writes, the reader thread reads.
//! The open/close transition is serialized against the reader by a stop
//! flag plus a bounded join, never by locking steady-state I/O.
//!
//! The [`BrailleLink`] trait is the seam the pipeline talks through; tests
//! substitute a recording mock for the physical port.

use crate::error::AppResult;
use log::warn;

#[cfg(feature = "serial")]
use crate::error::BrailleError;
#[cfg(feature = "serial")]
use log::{debug, error, info};
#[cfg(feature = "serial")]
use serialport::{ClearBuffer, SerialPort};
#[cfg(feature = "serial")]
use std::io::{Read, Write};
#[cfg(feature = "serial")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "serial")]
use std::sync::mpsc::{self, Receiver, Sender};
#[cfg(feature = "serial")]
use std::sync::Arc;
#[cfg(feature = "serial")]
use std::thread::{self, JoinHandle};
#[cfg(feature = "serial")]
use std::time::{Duration, Instant};

/// Fixed line rate of the device.
pub const BAUD_RATE: u32 = 9_600;

#[cfg(feature = "serial")]
const PORT_TIMEOUT: Duration = Duration::from_secs(1);
#[cfg(feature = "serial")]
const RESET_SETTLE_DELAY: Duration = Duration::from_millis(100);
#[cfg(feature = "serial")]
const BOOT_DELAY: Duration = Duration::from_secs(2);
#[cfg(feature = "serial")]
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);
#[cfg(feature = "serial")]
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Write side of the device link.
///
/// `send_line` transmits raw bytes; the provided methods format the two
/// wire commands. Callers must not re-enter a send while a previous group's
/// completion is still draining: a send clears the device-side buffers and
/// would invalidate in-flight telemetry correlation.
pub trait BrailleLink {
    /// Writes one raw command line (terminator included) to the device.
    fn send_line(&mut self, line: &str) -> AppResult<()>;

    /// Renders `text` (one group, raw characters) on the display.
    fn send_text(&mut self, text: &str) -> AppResult<()> {
        self.send_line(&format!("TEXT:{text}\n"))
    }

    /// Enables or disables dual-actuator mode on the device.
    fn send_dual_mode(&mut self, enabled: bool) -> AppResult<()> {
        self.send_line(&format!("CONFIG:DUAL={}\n", u8::from(enabled)))
    }
}

/// Accumulates raw bytes and splits out newline-terminated lines.
///
/// Lines are UTF-8 decoded, stripped of trailing whitespace, and dropped if
/// empty. Undecodable byte sequences are logged and skipped; a corrupt line
/// must never take the reader down.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Feeds `bytes` in and returns every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            match std::str::from_utf8(&raw) {
                Ok(text) => {
                    let text = text.trim_end();
                    if !text.is_empty() {
                        lines.push(text.to_string());
                    }
                }
                Err(e) => warn!("Discarding undecodable line: {}", e),
            }
        }
        lines
    }
}

/// Serial connection to the physical device.
///
/// At most one connection is open at a time; `connect` tears down any
/// previous one, including a bounded join of its reader thread.
#[cfg(feature = "serial")]
pub struct SerialTransport {
    connection: Option<Box<dyn SerialPort>>,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

#[cfg(feature = "serial")]
impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "serial")]
impl SerialTransport {
    /// Creates a transport with no open connection.
    pub fn new() -> Self {
        SerialTransport {
            connection: None,
            connected: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            reader: None,
        }
    }

    /// Point-in-time snapshot of the available serial ports.
    pub fn list_ports() -> AppResult<Vec<String>> {
        let ports = serialport::available_ports().map_err(std::io::Error::from)?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Opens `port`, resets the device, and starts the background reader.
    ///
    /// Blocks for the full reset handshake (~2.1 s): the device reboots on
    /// DTR assertion and accepts no commands until it is done. Returns the
    /// receiving end of this connection's telemetry line channel.
    pub fn connect(&mut self, port: &str) -> AppResult<Receiver<String>> {
        if port.is_empty() {
            return Err(BrailleError::InvalidPort);
        }
        self.disconnect();

        let failure = |source: serialport::Error| BrailleError::ConnectionFailure {
            port: port.to_string(),
            source: source.into(),
        };

        let mut connection = serialport::new(port, BAUD_RATE)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(failure)?;

        // Reset handshake: the device reboots on the rising DTR edge.
        connection.write_data_terminal_ready(false).map_err(failure)?;
        thread::sleep(RESET_SETTLE_DELAY);
        connection.write_data_terminal_ready(true).map_err(failure)?;
        thread::sleep(BOOT_DELAY);

        let reader_port = connection.try_clone().map_err(failure)?;
        let (tx, rx) = mpsc::channel();

        self.stop.store(false, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);

        let connected = Arc::clone(&self.connected);
        let stop = Arc::clone(&self.stop);
        self.reader = Some(thread::spawn(move || {
            read_loop(reader_port, &tx, &connected, &stop);
        }));
        self.connection = Some(connection);

        info!("Connected to {}", port);
        Ok(rx)
    }

    /// Closes the connection and stops the reader. Idempotent.
    ///
    /// Signals the reader, waits up to a bounded timeout for it to finish,
    /// then drops the port handle. Never blocks indefinitely; a wedged
    /// reader is detached rather than joined.
    pub fn disconnect(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);

        if let Some(handle) = self.reader.take() {
            let deadline = Instant::now() + READER_JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!(
                    "Serial reader did not stop within {:?}; detaching it",
                    READER_JOIN_TIMEOUT
                );
            }
        }

        if self.connection.take().is_some() {
            info!("Serial connection closed");
        }
    }
}

#[cfg(feature = "serial")]
impl BrailleLink for SerialTransport {
    fn send_line(&mut self, line: &str) -> AppResult<()> {
        if !self.is_connected() {
            return Err(BrailleError::NotConnected);
        }
        let Some(connection) = self.connection.as_mut() else {
            return Err(BrailleError::NotConnected);
        };

        // Stale telemetry or queued partial writes must not leak into the
        // new command's response window.
        connection
            .clear(ClearBuffer::All)
            .map_err(|e| BrailleError::SendFailure(e.into()))?;
        connection
            .write_all(line.as_bytes())
            .map_err(BrailleError::SendFailure)?;
        connection.flush().map_err(BrailleError::SendFailure)?;
        debug!("Command sent: {}", line.trim_end());
        Ok(())
    }
}

#[cfg(feature = "serial")]
impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Background reader: polls for available input, forwards complete lines.
///
/// Non-blocking reads keep the stop signal responsive; the poll sleep
/// bounds CPU usage. A hard I/O error terminates the loop and marks the
/// connection closed; the submitting thread observes this as
/// `NotConnected` on its next send.
#[cfg(feature = "serial")]
fn read_loop(
    mut port: Box<dyn SerialPort>,
    lines: &Sender<String>,
    connected: &AtomicBool,
    stop: &AtomicBool,
) {
    let mut buffer = LineBuffer::default();
    let mut chunk = [0u8; 256];

    while !stop.load(Ordering::SeqCst) && connected.load(Ordering::SeqCst) {
        match port.bytes_to_read() {
            Ok(0) => {}
            Ok(_) => match port.read(&mut chunk) {
                Ok(0) => {}
                Ok(n) => {
                    for line in buffer.push(&chunk[..n]) {
                        debug!("Received: {}", line);
                        if lines.send(line).is_err() {
                            debug!("Telemetry receiver dropped; stopping reader");
                            connected.store(false, Ordering::SeqCst);
                            return;
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    error!("Serial read error: {}", e);
                    break;
                }
            },
            Err(e) => {
                error!("Serial read error: {}", e);
                break;
            }
        }
        thread::sleep(READ_POLL_INTERVAL);
    }

    // The connection is unusable once the reader exits, whatever the cause.
    connected.store(false, Ordering::SeqCst);
}
