// src/io/miner/session.rs
//
// Connection lifecycle for one miner board.
// A blocking monitor task runs read -> frame -> classify -> apply -> emit until it
// is cancelled or the transport fails. The control path (connect, disconnect,
// send) writes through the same transport and owns every lifecycle transition
// except the one caused by a fatal monitor error.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use super::codec::classify;
use super::commands::Command;
use crate::io::serial::{LineFramer, RawFrame, SerialTransport, Transport};
use crate::io::{
    now_us, ConnectionConfig, ErrorPayload, EventSink, LinePayload, LinkError, LinkState,
    SessionEvent, StateChangePayload,
};
use crate::mining::DeviceState;

/// How many read timeouts disconnect waits for the monitor before force-closing
const STOP_WAIT_MULTIPLIER: u32 = 3;

type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

// ============================================================================
// Shared State
// ============================================================================

/// State visible to both the control path and the monitor.
/// Lock order is link before device.
struct Shared {
    link: Mutex<LinkState>,
    device: Mutex<DeviceState>,
    /// Held by the monitor from its cancel check through apply and emit, so
    /// once disconnect has taken it no further line can reach the consumer.
    delivery: Mutex<()>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn device(&self) -> MutexGuard<'_, DeviceState> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delivery(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next` if the link is currently `from`. Returns whether it moved.
    fn transition(&self, sink: &dyn EventSink, from: LinkState, next: LinkState) -> bool {
        {
            let mut link = self.link();
            if *link != from {
                return false;
            }
            if next == LinkState::Disconnected {
                self.device().is_mining = false;
            }
            *link = next;
        }
        sink.emit(SessionEvent::StateChanged(StateChangePayload {
            previous: from,
            current: next,
        }));
        true
    }
}

fn lock_transport(transport: &SharedTransport) -> Result<MutexGuard<'_, Box<dyn Transport>>, LinkError> {
    transport.lock().map_err(|_| LinkError::poisoned("transport"))
}

fn close_transport(transport: &SharedTransport) {
    transport
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .close();
}

// ============================================================================
// Session
// ============================================================================

/// Resources that exist only while a monitor is (or was) running
struct Active {
    config: ConnectionConfig,
    transport: SharedTransport,
    cancel_flag: Arc<AtomicBool>,
    monitor: tokio::task::JoinHandle<()>,
}

/// One logical connect-to-disconnect lifetime of the serial link.
///
/// Events are delivered to the sink from the monitor thread. Device state is
/// only ever changed by classified lines, a local `mine_stop`, or the end of
/// the connection (which clears `is_mining`).
pub struct Session {
    sink: Arc<dyn EventSink>,
    shared: Arc<Shared>,
    active: Option<Active>,
}

impl Session {
    pub fn new(sink: impl EventSink + 'static) -> Self {
        Session {
            sink: Arc::new(sink),
            shared: Arc::new(Shared {
                link: Mutex::new(LinkState::Disconnected),
                device: Mutex::new(DeviceState::default()),
                delivery: Mutex::new(()),
            }),
            active: None,
        }
    }

    pub fn link_state(&self) -> LinkState {
        *self.shared.link()
    }

    pub fn is_connected(&self) -> bool {
        self.link_state() == LinkState::Connected
    }

    /// Snapshot of the latest known device state
    pub fn device_state(&self) -> DeviceState {
        self.shared.device().clone()
    }

    /// Open the serial device and start monitoring it
    pub async fn connect(&mut self, config: ConnectionConfig) -> Result<(), LinkError> {
        self.connect_with(config, |config| {
            SerialTransport::open(config).map(|t| Box::new(t) as Box<dyn Transport>)
        })
        .await
    }

    /// Connect using a caller-supplied transport opener
    pub async fn connect_with<F>(&mut self, config: ConnectionConfig, open: F) -> Result<(), LinkError>
    where
        F: FnOnce(&ConnectionConfig) -> Result<Box<dyn Transport>, LinkError>,
    {
        if self.link_state() != LinkState::Disconnected {
            let path = self
                .active
                .as_ref()
                .map(|a| a.config.port().to_string())
                .unwrap_or_default();
            return Err(LinkError::AlreadyConnected(path));
        }

        // A monitor that ended on its own has already released the device
        if let Some(previous) = self.active.take() {
            let _ = previous.monitor.await;
        }

        config.validate()?;

        let tag = config.port().to_string();
        self.shared
            .transition(self.sink.as_ref(), LinkState::Disconnected, LinkState::Connecting);

        let transport = match open(&config) {
            Ok(t) => t,
            Err(e) => {
                tlog!("[kalesp:{}] Failed to open: {}", tag, e);
                self.shared
                    .transition(self.sink.as_ref(), LinkState::Connecting, LinkState::Disconnected);
                return Err(e);
            }
        };
        tlog!("[kalesp:{}] Opened at {}", tag, config.line_summary());

        let transport: SharedTransport = Arc::new(Mutex::new(transport));
        let cancel_flag = Arc::new(AtomicBool::new(false));

        // Connected before the monitor starts, so a fatal error it hits is never lost
        self.shared
            .transition(self.sink.as_ref(), LinkState::Connecting, LinkState::Connected);

        let monitor = Monitor {
            tag,
            transport: transport.clone(),
            cancel_flag: cancel_flag.clone(),
            shared: self.shared.clone(),
            sink: self.sink.clone(),
        };
        let monitor = tokio::task::spawn_blocking(move || monitor.run());

        self.active = Some(Active {
            config,
            transport,
            cancel_flag,
            monitor,
        });
        Ok(())
    }

    /// Stop the monitor and release the device.
    ///
    /// Clears `is_mining`; zeros, entropy and last nonce keep their last
    /// observed values. Disconnecting an already closed session is a no-op.
    pub async fn disconnect(&mut self) -> Result<(), LinkError> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        let tag = active.config.port().to_string();

        let was_connected = self.shared.transition(
            self.sink.as_ref(),
            LinkState::Connected,
            LinkState::Disconnecting,
        );
        active.cancel_flag.store(true, Ordering::SeqCst);

        let wait = active.config.read_timeout() * STOP_WAIT_MULTIPLIER;
        match tokio::time::timeout(wait, &mut active.monitor).await {
            Ok(Ok(())) => close_transport(&active.transport),
            Ok(Err(e)) => {
                tlog!("[kalesp:{}] Monitor task panicked: {:?}", tag, e);
                close_transport(&active.transport);
            }
            Err(_) => {
                // The monitor may be inside a read holding the lock; it drops
                // the last handle on its way out if we cannot close it here.
                tlog!(
                    "[kalesp:{}] Monitor did not stop within {:?}, force-closing",
                    tag,
                    wait
                );
                if let Ok(mut transport) = active.transport.try_lock() {
                    transport.close();
                }
            }
        }

        // Wait out a line already being delivered; every later one sees the flag
        drop(self.shared.delivery());

        if was_connected {
            self.shared.transition(
                self.sink.as_ref(),
                LinkState::Disconnecting,
                LinkState::Disconnected,
            );
            self.sink.emit(SessionEvent::Ended {
                reason: "stopped".to_string(),
            });
        }
        tlog!("[kalesp:{}] Closed", tag);
        Ok(())
    }

    /// Validate, encode and write one command.
    ///
    /// `MineStop` writes nothing; it clears `is_mining` locally. Write failures
    /// are returned to the caller and leave the session open; a dead device is
    /// detected and reported by the monitor.
    pub async fn send(&self, command: &Command) -> Result<(), LinkError> {
        let line = command.encode()?;

        let active = match &self.active {
            Some(active) if self.is_connected() => active,
            _ => return Err(LinkError::NotConnected),
        };

        let Some(line) = line else {
            let state = {
                let mut device = self.shared.device();
                device.is_mining = false;
                device.clone()
            };
            tlog!("[kalesp:{}] Mining stopped locally", active.config.port());
            self.sink.emit(SessionEvent::MiningStopped {
                timestamp_us: now_us(),
                state,
            });
            return Ok(());
        };

        // The monitor holds the transport for up to one read timeout
        let transport = active.transport.clone();
        let to_write = line.clone();
        tokio::task::spawn_blocking(move || lock_transport(&transport)?.write_line(&to_write))
            .await
            .map_err(|e| {
                LinkError::io(
                    "write task",
                    std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                )
            })??;

        let sent = line.trim_end().to_string();
        tlog!("[kalesp:{}] > {}", active.config.port(), sent);
        self.sink.emit(SessionEvent::Sent {
            timestamp_us: now_us(),
            line: sent,
        });
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel_flag.store(true, Ordering::SeqCst);
        }
    }
}

// ============================================================================
// Monitor
// ============================================================================

/// The blocking read loop. Sole reader of the transport.
struct Monitor {
    tag: String,
    transport: SharedTransport,
    cancel_flag: Arc<AtomicBool>,
    shared: Arc<Shared>,
    sink: Arc<dyn EventSink>,
}

impl Monitor {
    fn run(self) {
        let mut framer = LineFramer::default();

        loop {
            if self.cancel_flag.load(Ordering::SeqCst) {
                break;
            }

            let chunk = lock_transport(&self.transport).and_then(|mut t| t.read_timeout_slice());
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => return self.fail(e),
            };
            // A slow read may return after disconnect gave up waiting
            if self.cancel_flag.load(Ordering::SeqCst) {
                break;
            }
            if bytes.is_empty() {
                continue;
            }

            match framer.push(&bytes) {
                Ok(frames) => self.deliver(frames),
                Err(mut overflow) => {
                    self.deliver(std::mem::take(&mut overflow.completed));
                    return self.fail(overflow.into());
                }
            }
        }
    }

    fn deliver(&self, frames: Vec<RawFrame>) {
        for frame in frames {
            // Blank lines keep framing aligned but carry nothing
            if frame.text.is_empty() && !frame.decode_error {
                continue;
            }
            if frame.decode_error {
                tlog!("[kalesp:{}] Undecodable line: {}", self.tag, frame.text);
            }

            let event = classify(&frame);
            let _gate = self.shared.delivery();
            if self.cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let (delta, state) = {
                let mut device = self.shared.device();
                let delta = device.apply(&event);
                (delta, device.clone())
            };

            self.sink.emit(SessionEvent::Line(LinePayload {
                timestamp_us: now_us(),
                raw: frame.text,
                event,
                decode_error: frame.decode_error,
                state,
                delta,
            }));
        }
    }

    /// Fatal transport or framing error: report once, release the device, end the session
    fn fail(&self, error: LinkError) {
        let _gate = self.shared.delivery();
        if self.cancel_flag.load(Ordering::SeqCst) {
            // Disconnect is already tearing down
            tlog!("[kalesp:{}] Read ended during disconnect: {}", self.tag, error);
            return;
        }

        tlog!("[kalesp:{}] Fatal: {}", self.tag, error);
        self.sink.emit(SessionEvent::Error(ErrorPayload::from(&error)));
        close_transport(&self.transport);

        if self
            .shared
            .transition(self.sink.as_ref(), LinkState::Connected, LinkState::Disconnected)
        {
            self.sink.emit(SessionEvent::Ended {
                reason: "error".to_string(),
            });
        }
    }
}
