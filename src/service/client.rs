use std::io::Read;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::mpsc::SyncSender;
use std::thread;
use std::time::Duration;

use crate::common::config::BackendConfig;
use crate::error::{AttendanceError, Result};
use crate::runtime::events::{Event, Generation};
use crate::service::protocol::{write_image_frame, AttendanceEvent, ReplyDecoder};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Client side of the backend link. Connecting and reading happen on helper
/// threads that report back as [`Event`]s; all state changes happen in the
/// `on_*` methods, called from the reactor.
pub struct UplinkChannel {
    config: BackendConfig,
    events: SyncSender<Event>,
    state: ConnectionState,
    generation: Generation,
    stream: Option<TcpStream>,
    decoder: ReplyDecoder,
}

impl UplinkChannel {
    pub fn new(config: BackendConfig, events: SyncSender<Event>) -> Self {
        Self {
            config,
            events,
            state: ConnectionState::Disconnected,
            generation: 0,
            stream: None,
            decoder: ReplyDecoder::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn retry_interval(&self) -> Duration {
        self.config.retry_interval()
    }

    /// Starts a connection attempt unless one is already in flight or up.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            return Ok(());
        }

        self.generation += 1;
        let generation = self.generation;
        let address = self.config.address();
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let events = self.events.clone();

        tracing::debug!("Connecting to backend {}", address);
        thread::Builder::new()
            .name("backend-connect".into())
            .spawn(move || {
                let event = match connect_to(&address, timeout) {
                    Ok(stream) => Event::BackendConnected { generation, stream },
                    Err(e) => Event::BackendConnectFailed { generation, reason: e.to_string() },
                };
                let _ = events.send(event);
            })?;

        self.state = ConnectionState::Connecting;
        Ok(())
    }

    pub fn on_connected(&mut self, generation: Generation, stream: TcpStream) -> Result<()> {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            let _ = stream.shutdown(Shutdown::Both);
            return Ok(());
        }

        let write_timeout = Duration::from_millis(self.config.write_timeout_ms);
        let setup = stream
            .set_write_timeout(Some(write_timeout))
            .and_then(|_| stream.set_nodelay(true))
            .and_then(|_| stream.try_clone());
        let reader = match setup {
            Ok(reader) => reader,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                return Err(e.into());
            }
        };

        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name("backend-reader".into())
            .spawn(move || read_replies(reader, generation, events));
        if let Err(e) = spawned {
            self.state = ConnectionState::Disconnected;
            return Err(e.into());
        }

        tracing::info!("Connected to backend {}", self.config.address());
        self.decoder.reset();
        self.stream = Some(stream);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    pub fn on_connect_failed(&mut self, generation: Generation, reason: &str) {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            return;
        }
        tracing::warn!("Backend {} unreachable: {}", self.config.address(), reason);
        self.state = ConnectionState::Disconnected;
    }

    /// Returns true if this closed the current connection.
    pub fn on_disconnected(&mut self, generation: Generation) -> bool {
        if generation != self.generation || self.state != ConnectionState::Connected {
            return false;
        }
        tracing::warn!("Backend {} disconnected", self.config.address());
        self.drop_connection();
        true
    }

    /// Decodes reply bytes from the current connection. Malformed replies are
    /// logged and skipped.
    pub fn on_reply(&mut self, generation: Generation, data: &[u8]) -> Vec<AttendanceEvent> {
        if generation != self.generation || self.state != ConnectionState::Connected {
            return Vec::new();
        }

        self.decoder
            .feed(data)
            .into_iter()
            .filter_map(|decoded| match decoded {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("Discarding backend reply: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Sends one length-prefixed image. A failed write drops the connection
    /// so the retry timer takes over.
    pub fn send(&mut self, image: &[u8]) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(AttendanceError::Connection("backend not connected".into()));
        };

        match write_image_frame(stream, image) {
            Ok(()) => {
                tracing::info!("Sent {} byte face image to backend", image.len());
                Ok(())
            }
            Err(e) => {
                self.drop_connection();
                Err(AttendanceError::Connection(format!("send failed: {}", e)))
            }
        }
    }

    fn drop_connection(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        // Events still queued from this connection are now stale
        self.generation += 1;
        self.decoder.reset();
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for UplinkChannel {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

fn connect_to(address: &str, timeout: Duration) -> Result<TcpStream> {
    let mut last_err = None;
    for addr in address.to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => AttendanceError::Connection(format!("{}: {}", address, e)),
        None => AttendanceError::Connection(format!("{}: no addresses resolved", address)),
    })
}

fn read_replies(mut stream: TcpStream, generation: Generation, events: SyncSender<Event>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let reply = Event::BackendReplied { generation, data: buf[..n].to_vec() };
                if events.send(reply).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("Backend read ended: {}", e);
                break;
            }
        }
    }
    let _ = events.send(Event::BackendDisconnected { generation });
}
