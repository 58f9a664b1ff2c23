//! Exclusive ownership of the serial connection.
//!
//! [`Transport`] wraps one [`SerialLink`]. Hardware ports come from the
//! `serialport` crate; [`MemoryLink`] stands in for the Pelicano when no
//! hardware is attached.

use crate::codec::debug_hex;
use crate::config::BridgeConfig;
use crate::constants::*;
use crate::error::{PelicanoError, Result};
use crate::types::ModemStatus;
use serialport::{FlowControl, SerialPort};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Byte link the transport drives.
pub trait SerialLink: Read + Write + Send {
    /// Bytes currently buffered for reading
    fn bytes_to_read(&self) -> serialport::Result<u32>;

    /// Current modem control line levels
    fn modem_status(&mut self) -> serialport::Result<ModemStatus>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn bytes_to_read(&self) -> serialport::Result<u32> {
        (**self).bytes_to_read()
    }

    fn modem_status(&mut self) -> serialport::Result<ModemStatus> {
        let port = &mut **self;
        Ok(ModemStatus {
            clear_to_send: port.read_clear_to_send()?,
            data_set_ready: port.read_data_set_ready()?,
            ring_indicator: port.read_ring_indicator()?,
            carrier_detect: port.read_carrier_detect()?,
        })
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
    Ok(serialport::available_ports()?)
}

/// One open serial session.
pub struct Transport {
    port_name: String,
    link: Mutex<Option<Box<dyn SerialLink>>>,
}

impl Transport {
    /// Open `config.port_name` at 9600-8-N-1.
    pub fn open(config: &BridgeConfig) -> Result<Self> {
        let port_name = config.port_name.as_str();
        let port = serialport::new(port_name, BAUD_RATE)
            .data_bits(DATA_BITS)
            .stop_bits(STOP_BITS)
            .parity(PARITY)
            .flow_control(FlowControl::None)
            .timeout(config.write_timeout())
            .open()
            .map_err(|e| map_open_error(port_name, e))?;

        log::info!("Opened {} at {} baud, 8-N-1", port_name, BAUD_RATE);
        Ok(Self::from_link(port_name, Box::new(port)))
    }

    /// Wrap an already open link.
    pub fn from_link(port_name: impl Into<String>, link: Box<dyn SerialLink>) -> Self {
        Self {
            port_name: port_name.into(),
            link: Mutex::new(Some(link)),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Release the port. Closing twice is a no-op.
    pub fn close(&self) {
        if self.lock().take().is_some() {
            log::info!("Closed {}", self.port_name);
        }
    }

    /// Blocking send of the whole frame.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.lock();
        let link = guard.as_mut().ok_or(PelicanoError::NotConnected)?;
        if bytes.is_empty() {
            return Ok(());
        }
        log::debug!("TX {}: {}", self.port_name, debug_hex(bytes));
        link.write_all(bytes).map_err(PelicanoError::IoWriteError)?;
        link.flush().map_err(PelicanoError::IoWriteError)
    }

    /// Collect everything currently buffered without waiting for more.
    pub fn drain_read(&self) -> Result<Vec<u8>> {
        let mut guard = self.lock();
        let link = guard.as_mut().ok_or(PelicanoError::NotConnected)?;

        let mut drained = Vec::new();
        while drained.len() < MAX_DRAIN_BYTES {
            let available = link
                .bytes_to_read()
                .map_err(|e| PelicanoError::IoReadError(e.into()))? as usize;
            if available == 0 {
                break;
            }
            let mut chunk = vec![0u8; available.min(MAX_DRAIN_BYTES - drained.len())];
            match link.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => drained.extend_from_slice(&chunk[..n]),
                Err(ref e)
                    if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) =>
                {
                    break
                }
                Err(e) => return Err(PelicanoError::IoReadError(e)),
            }
        }

        if !drained.is_empty() {
            log::debug!("RX {}: {}", self.port_name, debug_hex(&drained));
        }
        Ok(drained)
    }

    pub fn bytes_available(&self) -> Result<u32> {
        let guard = self.lock();
        let link = guard.as_ref().ok_or(PelicanoError::NotConnected)?;
        link.bytes_to_read()
            .map_err(|e| PelicanoError::IoReadError(e.into()))
    }

    pub fn modem_status(&self) -> Result<ModemStatus> {
        let mut guard = self.lock();
        let link = guard.as_mut().ok_or(PelicanoError::NotConnected)?;
        Ok(link.modem_status()?)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn SerialLink>>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

fn map_open_error(port_name: &str, err: serialport::Error) -> PelicanoError {
    use serialport::ErrorKind;

    match err.kind() {
        ErrorKind::NoDevice | ErrorKind::Io(io::ErrorKind::NotFound) => {
            PelicanoError::PortNotFound(port_name.to_string())
        }
        ErrorKind::InvalidInput => PelicanoError::UnsupportedConfiguration {
            port: port_name.to_string(),
            reason: err.description,
        },
        ErrorKind::Io(
            io::ErrorKind::PermissionDenied | io::ErrorKind::AddrInUse | io::ErrorKind::WouldBlock,
        ) => PelicanoError::PortBusy(port_name.to_string()),
        _ if err.description.to_ascii_lowercase().contains("busy") => {
            PelicanoError::PortBusy(port_name.to_string())
        }
        _ => PelicanoError::SerialPort(err),
    }
}

/// In-memory link simulating the Pelicano side of the wire.
///
/// Clones share state: keep one clone to inject replies and inspect what
/// the bridge wrote, hand another to [`Transport::from_link`].
#[derive(Clone, Default)]
pub struct MemoryLink {
    inbound: Arc<Mutex<VecDeque<u8>>>,
    outbound: Arc<Mutex<Vec<u8>>>,
    lines: Arc<Mutex<ModemStatus>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if the Pelicano had sent them
    pub fn inject(&self, bytes: &[u8]) {
        lock(&self.inbound).extend(bytes.iter().copied());
    }

    /// Everything the bridge has written so far, clearing the record
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.outbound))
    }

    pub fn set_lines(&self, status: ModemStatus) {
        *lock(&self.lines) = status;
    }

    /// Make subsequent reads fail until cleared
    pub fn set_read_failure(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail until cleared
    pub fn set_write_failure(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Read for MemoryLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated read failure"));
        }
        let mut inbound = lock(&self.inbound);
        let n = buf.len().min(inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure"));
        }
        lock(&self.outbound).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for MemoryLink {
    fn bytes_to_read(&self) -> serialport::Result<u32> {
        Ok(lock(&self.inbound).len() as u32)
    }

    fn modem_status(&mut self) -> serialport::Result<ModemStatus> {
        Ok(*lock(&self.lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn memory_transport() -> (Transport, MemoryLink) {
        let link = MemoryLink::new();
        let transport = Transport::from_link("mem", Box::new(link.clone()));
        (transport, link)
    }

    #[test]
    fn drain_on_empty_port_returns_immediately() {
        let (transport, _link) = memory_transport();
        let start = Instant::now();
        assert!(transport.drain_read().unwrap().is_empty());
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn drain_accumulates_every_chunk() {
        let (transport, link) = memory_transport();
        link.inject(&[0x01, 0x00]);
        link.inject(&[0x02, 0x00, 0xFD]);
        assert_eq!(transport.drain_read().unwrap(), vec![0x01, 0x00, 0x02, 0x00, 0xFD]);
        assert!(transport.drain_read().unwrap().is_empty());
    }

    #[test]
    fn drain_is_bounded() {
        let (transport, link) = memory_transport();
        link.inject(&vec![0xAA; MAX_DRAIN_BYTES + 10]);
        assert_eq!(transport.drain_read().unwrap().len(), MAX_DRAIN_BYTES);
        assert_eq!(transport.drain_read().unwrap().len(), 10);
    }

    #[test]
    fn write_puts_exact_bytes_on_the_wire() {
        let (transport, link) = memory_transport();
        transport.write(&[0x02, 0x00, 0x01, 0xFE, 0xFF]).unwrap();
        assert_eq!(link.take_written(), vec![0x02, 0x00, 0x01, 0xFE, 0xFF]);
    }

    #[test]
    fn io_failures_are_typed() {
        let (transport, link) = memory_transport();
        link.set_write_failure(true);
        assert!(matches!(transport.write(&[0x00]), Err(PelicanoError::IoWriteError(_))));
        link.inject(&[0x01]);
        link.set_read_failure(true);
        assert!(matches!(transport.drain_read(), Err(PelicanoError::IoReadError(_))));
    }

    #[test]
    fn close_is_idempotent_and_fails_fast_afterwards() {
        let (transport, _link) = memory_transport();
        assert!(transport.is_open());
        transport.close();
        transport.close();
        assert!(!transport.is_open());
        assert!(matches!(transport.write(&[0x00]), Err(PelicanoError::NotConnected)));
        assert!(matches!(transport.drain_read(), Err(PelicanoError::NotConnected)));
    }

    #[test]
    fn modem_lines_pass_through() {
        let (transport, link) = memory_transport();
        let status = ModemStatus {
            clear_to_send: true,
            carrier_detect: true,
            ..ModemStatus::default()
        };
        link.set_lines(status);
        assert_eq!(transport.modem_status().unwrap(), status);
    }

    #[cfg(unix)]
    #[test]
    fn opening_missing_device_reports_not_found() {
        let config = BridgeConfig::default().with_port("/dev/pelicano-does-not-exist");
        assert!(matches!(Transport::open(&config), Err(PelicanoError::PortNotFound(_))));
    }
}
