use crate::channels::ChannelMap;
use crate::codec;
use crate::commands::{Command, MotorSpeed};
use crate::config::BridgeConfig;
use crate::constants::DEVICE_ADDRESS;
use crate::decoder::FrameDecoder;
use crate::error::{PelicanoError, Result};
use crate::frame::Frame;
use crate::receiver::{Capture, ReceiveContext, ReceiveLoop};
use crate::transport::{self, SerialLink, Transport};
use crate::types::{DecodedEvent, Diagnostic, Diagnostics};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

struct Session {
    transport: Arc<Transport>,
    receiver: ReceiveLoop,
}

/// Main Pelicano bridge interface
///
/// Holds at most one open port session. All operations take `&self` so the
/// bridge can be shared behind an `Arc` by a request-serving layer.
pub struct Pelicano {
    config: BridgeConfig,
    session: Mutex<Option<Session>>,
    decoder: Arc<Mutex<FrameDecoder>>,
    diagnostics: Diagnostics,
    capture: Capture,
    events_tx: SyncSender<DecodedEvent>,
    events_rx: Mutex<Option<Receiver<DecodedEvent>>>,
}

impl Pelicano {
    /// Create a bridge. The port stays closed until [`Pelicano::open_port`].
    pub fn new(config: BridgeConfig) -> Self {
        let (events_tx, events_rx) = mpsc::sync_channel(config.event_queue_capacity.max(1));
        Self {
            decoder: Arc::new(Mutex::new(FrameDecoder::new(&config))),
            diagnostics: Diagnostics::new(config.diagnostics_capacity),
            capture: Capture::new(config.capture_limit),
            session: Mutex::new(None),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            config,
        }
    }

    /// List available serial ports
    pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
        transport::list_ports()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Open the configured port and start receiving. A no-op when already open.
    pub fn open_port(&self) -> Result<()> {
        let mut session = self.lock_session();
        if session.is_some() {
            log::info!("{} already open", self.config.port_name);
            return Ok(());
        }
        let transport = Transport::open(&self.config)?;
        *session = Some(self.start(transport)?);
        Ok(())
    }

    /// Start a session over an already open link.
    pub fn open_with_link(&self, port_name: &str, link: Box<dyn SerialLink>) -> Result<()> {
        let mut session = self.lock_session();
        if session.is_some() {
            log::info!("{} already open", port_name);
            return Ok(());
        }
        *session = Some(self.start(Transport::from_link(port_name, link))?);
        Ok(())
    }

    fn start(&self, transport: Transport) -> Result<Session> {
        self.lock_decoder().reset();
        self.capture.take();

        let transport = Arc::new(transport);
        let ctx = ReceiveContext {
            transport: transport.clone(),
            decoder: self.decoder.clone(),
            events: self.events_tx.clone(),
            diagnostics: self.diagnostics.clone(),
            capture: self.capture.clone(),
        };
        let receiver = ReceiveLoop::spawn(ctx, self.config.poll_interval())?;
        log::info!("Port session started on {}", transport.port_name());
        Ok(Session { transport, receiver })
    }

    /// Stop receiving and release the port. Closing twice is a no-op.
    pub fn close_port(&self) {
        let session = self.lock_session().take();
        if let Some(mut session) = session {
            session.receiver.stop();
            session.transport.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock_session().is_some()
    }

    /// Take the decoded event stream. Only the first call gets it.
    pub fn events(&self) -> Option<Receiver<DecodedEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Send a frame given as hex text.
    pub fn send_raw(&self, hex: &str) -> Result<()> {
        self.transport()?;
        let bytes = codec::decode(hex)?;
        let request = Frame::parse(&bytes)
            .ok()
            .filter(|f| f.destination == DEVICE_ADDRESS)
            .map(|f| (f.header, f.data.first().copied()));
        log::info!("Sending raw {}", hex);
        self.transmit(&bytes, request)
    }

    /// Send a catalog command.
    pub fn send(&self, command: Command) -> Result<()> {
        log::info!("Sending {}", command.name());
        self.transmit(command.bytes(), Some((command.header(), command.argument())))
    }

    /// Hex of everything received since the previous call.
    pub fn read_available(&self) -> Result<String> {
        self.transport()?;
        Ok(codec::encode(&self.capture.take()))
    }

    /// Ask whether the Pelicano is online
    pub fn poll(&self) -> Result<()> {
        self.send(Command::Poll)
    }

    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    pub fn self_check(&self) -> Result<()> {
        self.send(Command::SelfCheck)
    }

    /// Pulse every solenoid, including both on the sorter
    pub fn test_solenoid(&self) -> Result<()> {
        self.send(Command::TestSolenoid)
    }

    pub fn set_speed(&self, speed: MotorSpeed) -> Result<()> {
        self.send(Command::SetSpeed(speed))
    }

    pub fn open_trash_door(&self) -> Result<()> {
        self.send(Command::OpenTrashDoor)
    }

    /// Query which coin sits in each of the 16 channels. The reply
    /// replaces the channel map once it arrives.
    pub fn request_channel_ids(&self) -> Result<()> {
        self.send(Command::RequestChannelIds)
    }

    pub fn read_buffered_credit(&self) -> Result<()> {
        self.send(Command::ReadBufferedCredit)
    }

    /// Snapshot of the channel map
    pub fn channel_map(&self) -> ChannelMap {
        self.lock_decoder().channel_map().clone()
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }

    fn transmit(&self, bytes: &[u8], request: Option<(u8, Option<u8>)>) -> Result<()> {
        let transport = self.transport()?;
        {
            let now = Instant::now();
            let mut decoder = self.lock_decoder();
            if let Some((header, argument)) = request {
                if self.config.strict_pairing {
                    if let Some(outstanding) = decoder.pending_reply(now) {
                        return Err(PelicanoError::CommandInFlight { header: outstanding });
                    }
                }
                decoder.expect_reply(header, argument, now);
            }
            decoder.expect_echo(bytes);
        }
        transport.write(bytes).map_err(|e| {
            self.lock_decoder().clear_pending();
            e
        })
    }

    fn transport(&self) -> Result<Arc<Transport>> {
        self.lock_session()
            .as_ref()
            .map(|s| s.transport.clone())
            .ok_or(PelicanoError::NotConnected)
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_decoder(&self) -> MutexGuard<'_, FrameDecoder> {
        self.decoder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Pelicano {
    fn drop(&mut self) {
        self.close_port();
    }
}
