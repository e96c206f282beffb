use std::io::Write;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::{Duration, Instant};

use serialport::SerialPort;

use crate::camera::frame::{encode_jpeg, Frame};
use crate::camera::stream::{spawn_stream_reader, StreamSupervisor};
use crate::camera::StreamDemuxer;
use crate::common::{Config, DevMode};
use crate::core::detector::FaceDetector;
use crate::core::presence::{ConfirmedFace, PresenceAction, PresenceDebouncer};
use crate::error::Result;
use crate::runtime::events::{Event, Generation, TimerKind};
use crate::runtime::timers::Timers;
use crate::serial::ack::DeviceAck;
use crate::serial::relay::{DownlinkRelay, RelayOutcome};
use crate::service::client::{ConnectionState, UplinkChannel};
use crate::service::protocol::{AttendanceEvent, DisplayRecord};

pub const EVENT_QUEUE_DEPTH: usize = 64;

/// Owns every piece of client state and applies events to it one at a time.
/// Producer threads only ever hold a sender.
pub struct Reactor<D, W: Write = Box<dyn SerialPort>> {
    config: Config,
    events_tx: SyncSender<Event>,
    events_rx: Receiver<Event>,
    detector: D,
    demuxer: StreamDemuxer,
    supervisor: StreamSupervisor,
    debouncer: PresenceDebouncer,
    uplink: UplinkChannel,
    relay: Option<DownlinkRelay<W>>,
    timers: Timers,
    dev_mode: DevMode,
    current: Option<DisplayRecord>,
}

impl<D: FaceDetector, W: Write> Reactor<D, W> {
    pub fn new(config: Config, detector: D, relay: Option<DownlinkRelay<W>>, dev_mode: DevMode) -> Self {
        let (events_tx, events_rx) = mpsc::sync_channel(EVENT_QUEUE_DEPTH);
        let supervisor = StreamSupervisor::new(
            config.stream.retry_delay(true),
            config.stream.retry_delay(false),
        );

        Self {
            demuxer: StreamDemuxer::new(config.stream.max_buffer_bytes),
            debouncer: PresenceDebouncer::new(
                config.presence.confirm_threshold,
                config.presence.crop_margin,
            ),
            uplink: UplinkChannel::new(config.backend.clone(), events_tx.clone()),
            supervisor,
            config,
            events_tx,
            events_rx,
            detector,
            relay,
            timers: Timers::new(),
            dev_mode,
            current: None,
        }
    }

    /// Sender for producers living outside the reactor (the serial reader).
    pub fn events(&self) -> SyncSender<Event> {
        self.events_tx.clone()
    }

    pub fn uplink_state(&self) -> ConnectionState {
        self.uplink.state()
    }

    pub fn stream_generation(&self) -> Generation {
        self.supervisor.generation()
    }

    pub fn relay(&self) -> Option<&DownlinkRelay<W>> {
        self.relay.as_ref()
    }

    pub fn current_record(&self) -> Option<&DisplayRecord> {
        self.current.as_ref()
    }

    pub fn is_timer_scheduled(&self, kind: TimerKind) -> bool {
        self.timers.is_scheduled(kind)
    }

    /// Opens the camera stream and makes the first backend attempt.
    pub fn start(&mut self) {
        tracing::info!(
            "Starting attendance client: stream {}, backend {}",
            self.config.stream.url,
            self.config.backend.address()
        );
        self.open_stream();
        self.connect_backend();
    }

    pub fn connect_backend(&mut self) {
        if let Err(e) = self.uplink.connect() {
            tracing::warn!("Could not start backend connection: {}", e);
        }
        self.ensure_backend_retry();
    }

    /// Runs due timers, then waits up to `max_wait` for one event. Returns
    /// whether anything was handled.
    pub fn poll_once(&mut self, max_wait: Duration) -> Result<bool> {
        let mut handled = self.fire_expired_timers();

        let wait = match self.timers.next_deadline() {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).min(max_wait),
            None => max_wait,
        };

        match self.events_rx.recv_timeout(wait) {
            Ok(event) => {
                self.handle(event);
                handled = true;
            }
            Err(RecvTimeoutError::Timeout) => {
                handled |= self.fire_expired_timers();
            }
            // Unreachable while we hold a sender
            Err(RecvTimeoutError::Disconnected) => {}
        }

        Ok(handled)
    }

    pub fn run(&mut self) -> Result<()> {
        self.start();
        loop {
            self.poll_once(Duration::from_secs(1))?;
        }
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::StreamChunk { generation, data } => {
                if !self.supervisor.is_current(generation) {
                    return;
                }
                let frames: Vec<Frame> = self.demuxer.feed(&data).collect();
                for frame in frames {
                    self.process_frame(&frame);
                }
            }
            Event::StreamEnded { generation, failed } => {
                if let Some(delay) = self.supervisor.on_ended(generation, failed) {
                    tracing::info!("Camera stream lost; reconnecting in {:?}", delay);
                    self.timers.schedule(TimerKind::StreamReconnect, delay);
                }
            }
            Event::BackendConnected { generation, stream } => {
                if let Err(e) = self.uplink.on_connected(generation, stream) {
                    tracing::warn!("Backend connection setup failed: {}", e);
                }
                if self.uplink.is_connected() {
                    self.timers.cancel(TimerKind::BackendRetry);
                } else {
                    self.ensure_backend_retry();
                }
            }
            Event::BackendConnectFailed { generation, reason } => {
                self.uplink.on_connect_failed(generation, &reason);
                self.ensure_backend_retry();
            }
            Event::BackendReplied { generation, data } => {
                for reply in self.uplink.on_reply(generation, &data) {
                    self.on_attendance(reply);
                }
            }
            Event::BackendDisconnected { generation } => {
                if self.uplink.on_disconnected(generation) {
                    self.ensure_backend_retry();
                }
            }
            Event::SerialLineReceived(line) => self.on_device_line(&line),
            Event::TimerFired(kind) => self.on_timer(kind),
        }
    }

    fn fire_expired_timers(&mut self) -> bool {
        let due = self.timers.take_expired(Instant::now());
        let fired = !due.is_empty();
        for kind in due {
            self.on_timer(kind);
        }
        fired
    }

    fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::StreamReconnect => self.open_stream(),
            TimerKind::BackendRetry => {
                if self.uplink.state() == ConnectionState::Disconnected {
                    tracing::debug!("Retrying backend {}", self.config.backend.address());
                    if let Err(e) = self.uplink.connect() {
                        tracing::warn!("Could not start backend connection: {}", e);
                    }
                }
                // Periodic while not connected
                if !self.uplink.is_connected() {
                    self.timers.schedule(TimerKind::BackendRetry, self.uplink.retry_interval());
                }
            }
        }
    }

    fn ensure_backend_retry(&mut self) {
        if !self.uplink.is_connected() && !self.timers.is_scheduled(TimerKind::BackendRetry) {
            self.timers.schedule(TimerKind::BackendRetry, self.uplink.retry_interval());
        }
    }

    fn open_stream(&mut self) {
        let generation = self.supervisor.begin();
        self.demuxer.reset();
        self.debouncer.reset();

        let spawned = spawn_stream_reader(
            self.config.stream.url.clone(),
            generation,
            self.config.stream.read_chunk_bytes,
            self.events_tx.clone(),
        );
        if let Err(e) = spawned {
            tracing::warn!("Could not start stream reader: {}", e);
            if let Some(delay) = self.supervisor.on_ended(generation, true) {
                self.timers.schedule(TimerKind::StreamReconnect, delay);
            }
        }
    }

    fn process_frame(&mut self, frame: &Frame) {
        let image = match frame.decode_resized(self.config.presence.frame_size) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Dropping frame ({} bytes): {}", frame.len(), e);
                return;
            }
        };

        let face = match self.detector.primary_face(&image) {
            Ok(face) => face,
            Err(e) => {
                tracing::warn!("Face detection failed: {}", e);
                return;
            }
        };

        match self.debouncer.on_frame(&image, face.as_ref()) {
            PresenceAction::None => {}
            PresenceAction::Clear => {
                if self.current.take().is_some() {
                    tracing::debug!("Face left; cleared attendance display");
                }
            }
            PresenceAction::Confirm(confirmed) => self.on_confirmed(&image, confirmed),
        }
    }

    fn on_confirmed(&mut self, frame: &image::DynamicImage, confirmed: ConfirmedFace) {
        if let Err(e) = self.dev_mode.save_confirmed_face(frame, &confirmed.face, &confirmed.crop) {
            tracing::warn!("Could not save dev capture: {}", e);
        }

        let jpeg = match encode_jpeg(&confirmed.crop, self.config.presence.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                tracing::warn!("Could not encode face crop: {}", e);
                return;
            }
        };

        if !self.uplink.is_connected() {
            tracing::warn!("Backend not connected; confirmed face not sent");
            self.ensure_backend_retry();
            return;
        }
        if let Err(e) = self.uplink.send(&jpeg) {
            tracing::warn!("{}", e);
            self.ensure_backend_retry();
        }
    }

    fn on_attendance(&mut self, event: AttendanceEvent) {
        let record = event.display();
        tracing::info!(
            "Attendance reply: id={} name={} department={} time={}",
            record.employee_id, record.name, record.department, record.time
        );
        self.current = Some(record);

        let Some(relay) = self.relay.as_mut() else {
            return;
        };
        match relay.relay(&event) {
            Ok(RelayOutcome::Sent { command }) => {
                tracing::debug!("Device command: {}", command.trim_end());
            }
            Ok(RelayOutcome::Skipped) => {
                tracing::info!("Unrecognised face; door controller not notified");
            }
            Err(e) => tracing::warn!("Device relay failed: {}", e),
        }
    }

    fn on_device_line(&mut self, line: &str) {
        match DeviceAck::classify(line) {
            DeviceAck::DoorOpenConfirmed => tracing::info!("Device confirmed door open"),
            DeviceAck::DoorOpenSimulating => tracing::debug!("Device opening door"),
            DeviceAck::TimeSyncConfirmed => tracing::debug!("Device clock synced: {}", line),
            DeviceAck::Unrecognized => tracing::debug!("Device: {}", line),
        }
    }
}
