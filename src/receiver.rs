//! Background receive worker bound to one port session.
//!
//! The worker watches the transport for notification conditions. On data
//! available it drains the port, feeds the decoder and publishes events on
//! a bounded channel. Receive-path failures go to [`Diagnostics`] and the
//! worker carries on.

use crate::decoder::{Decoded, FrameDecoder};
use crate::error::{PelicanoError, Result};
use crate::transport::Transport;
use crate::types::{DecodedEvent, Diagnostics, ModemStatus, Notification};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Raw received bytes kept for `read_available`, oldest dropped first.
#[derive(Debug, Clone)]
pub struct Capture {
    inner: Arc<Mutex<VecDeque<u8>>>,
    limit: usize,
}

impl Capture {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            limit,
        }
    }

    pub fn push(&self, bytes: &[u8]) {
        let mut buf = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        buf.extend(bytes.iter().copied());
        let excess = buf.len().saturating_sub(self.limit);
        buf.drain(..excess);
    }

    pub fn take(&self) -> Vec<u8> {
        let mut buf = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        buf.drain(..).collect()
    }
}

/// Everything the worker needs, shared with the owning bridge.
#[derive(Clone)]
pub struct ReceiveContext {
    pub transport: Arc<Transport>,
    pub decoder: Arc<Mutex<FrameDecoder>>,
    pub events: SyncSender<DecodedEvent>,
    pub diagnostics: Diagnostics,
    pub capture: Capture,
}

impl ReceiveContext {
    fn decoder(&self) -> std::sync::MutexGuard<'_, FrameDecoder> {
        self.decoder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle a data-available notification. Returns the number of events published.
pub fn on_data_available(ctx: &ReceiveContext) -> Result<usize> {
    let bytes = ctx.transport.drain_read()?;
    if bytes.is_empty() {
        return Ok(0);
    }
    ctx.capture.push(&bytes);

    let results = ctx.decoder().feed(&bytes, Instant::now());
    Ok(dispatch(ctx, results))
}

fn dispatch(ctx: &ReceiveContext, results: Decoded) -> usize {
    let mut published = 0;
    for result in results {
        match result {
            Ok(event) => {
                if publish(ctx, event) {
                    published += 1;
                }
            }
            Err(e) => ctx.diagnostics.record(format!("Decode error: {}", e)),
        }
    }
    published
}

fn publish(ctx: &ReceiveContext, event: DecodedEvent) -> bool {
    match ctx.events.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            ctx.diagnostics
                .record(format!("Event queue full, dropped {}", event.raw_hex()));
            false
        }
        // Nobody listening; the capture buffer still has the bytes.
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Check the transport for a condition worth acting on.
pub fn next_notification(
    transport: &Transport,
    lines: &mut Option<ModemStatus>,
) -> Result<Option<Notification>> {
    if transport.bytes_available()? > 0 {
        return Ok(Some(Notification::DataAvailable));
    }
    match transport.modem_status() {
        Ok(status) => {
            let changed = lines.map_or(false, |prev| prev != status);
            *lines = Some(status);
            if changed {
                return Ok(Some(Notification::LinesChanged(status)));
            }
        }
        Err(PelicanoError::NotConnected) => return Err(PelicanoError::NotConnected),
        // Plenty of USB adapters cannot report modem lines.
        Err(_) => {}
    }
    Ok(None)
}

fn run(ctx: ReceiveContext, running: Arc<AtomicBool>, interval: Duration) {
    log::debug!("Receive worker started for {}", ctx.transport.port_name());
    let mut lines = None;

    while running.load(Ordering::SeqCst) {
        match next_notification(&ctx.transport, &mut lines) {
            Ok(Some(Notification::DataAvailable)) => match on_data_available(&ctx) {
                Ok(_) => {}
                Err(PelicanoError::NotConnected) => break,
                Err(e) => ctx.diagnostics.record(format!("Receive failed: {}", e)),
            },
            Ok(Some(Notification::LinesChanged(status))) => {
                log::debug!("Modem lines changed: {:?}", status);
            }
            Ok(None) => {
                let expired = ctx.decoder().expire(Instant::now());
                dispatch(&ctx, expired);
            }
            Err(PelicanoError::NotConnected) => break,
            Err(e) => ctx.diagnostics.record(format!("Notification check failed: {}", e)),
        }
        thread::sleep(interval);
    }

    log::debug!("Receive worker stopped for {}", ctx.transport.port_name());
}

/// The running worker. Stopping joins the thread.
pub struct ReceiveLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReceiveLoop {
    pub fn spawn(ctx: ReceiveContext, interval: Duration) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("pelicano-rx".to_string())
            .spawn(move || run(ctx, flag, interval))
            .map_err(PelicanoError::Worker)?;
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Stop the worker. No event is published after this returns.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Receive worker panicked");
            }
        }
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
