use std::io::Read;
use std::sync::mpsc::SyncSender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::Result;
use crate::runtime::events::{Event, Generation};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the MJPEG endpoint. The body is endless, so only the connect phase
/// is bounded.
pub fn open_stream(url: &str) -> Result<reqwest::blocking::Response> {
    let client = Client::builder()
        .no_proxy()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(None)
        .build()?;
    let response = client.get(url).send()?.error_for_status()?;
    Ok(response)
}

/// Reads the stream on its own thread and forwards raw chunks. Exits after
/// reporting the end of the body, or as soon as the reactor is gone.
pub fn spawn_stream_reader(
    url: String,
    generation: Generation,
    chunk_size: usize,
    events: SyncSender<Event>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name(format!("mjpeg-stream-{}", generation))
        .spawn(move || {
            let failed = match read_stream(&url, generation, chunk_size, &events) {
                Ok(true) => false,
                Ok(false) => return,
                Err(e) => {
                    tracing::warn!("Camera stream {} failed: {}", url, e);
                    true
                }
            };
            let _ = events.send(Event::StreamEnded { generation, failed });
        })?;
    Ok(handle)
}

// Ok(false) means the receiver hung up and nothing more should be sent.
fn read_stream(
    url: &str,
    generation: Generation,
    chunk_size: usize,
    events: &SyncSender<Event>,
) -> Result<bool> {
    let mut response = open_stream(url)?;
    tracing::info!("Camera stream connected: {}", url);

    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = response.read(&mut buf)?;
        if n == 0 {
            tracing::info!("Camera stream ended: {}", url);
            return Ok(true);
        }
        let chunk = Event::StreamChunk { generation, data: buf[..n].to_vec() };
        if events.send(chunk).is_err() {
            return Ok(false);
        }
    }
}

/// Tracks which stream connection is current and makes sure at most one
/// reconnect is scheduled per connection.
#[derive(Debug)]
pub struct StreamSupervisor {
    generation: Generation,
    reconnect_pending: bool,
    error_retry: Duration,
    eos_retry: Duration,
}

impl StreamSupervisor {
    pub fn new(error_retry: Duration, eos_retry: Duration) -> Self {
        Self {
            generation: 0,
            reconnect_pending: false,
            error_retry,
            eos_retry,
        }
    }

    /// Starts a new connection attempt, superseding any previous one.
    pub fn begin(&mut self) -> Generation {
        self.generation += 1;
        self.reconnect_pending = false;
        self.generation
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.generation
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Returns the reconnect delay, or `None` when the end belongs to a stale
    /// connection or a reconnect is already scheduled.
    pub fn on_ended(&mut self, generation: Generation, failed: bool) -> Option<Duration> {
        if !self.is_current(generation) || self.reconnect_pending {
            return None;
        }
        self.reconnect_pending = true;
        Some(if failed { self.error_retry } else { self.eos_retry })
    }
}
