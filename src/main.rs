use face_attendance::{
    camera::{stream::open_stream, StreamDemuxer},
    config::Config,
    core::{FaceDetector, OnnxFaceDetector},
    paths,
    serial::{self, DeviceAck, DownlinkRelay},
    service::AttendanceEvent,
    DevMode, Reactor,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "face-attendance")]
#[command(about = "Camera-driven attendance client")]
struct Cli {
    /// Enable development mode (debug logging, confirmed faces saved locally)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file (default: configs/face-attendance.toml, then /etc)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the attendance pipeline
    Run,
    /// Read frames from the camera stream and run face detection on them
    TestStream {
        /// Number of frames to read
        #[arg(short = 'n', long, default_value = "20")]
        frames: usize,
    },
    /// Send one check-in command to the device and print its replies
    TestSerial {
        #[arg(short, long, default_value = "1")]
        id: String,
        /// Seconds to wait for device output
        #[arg(short, long, default_value = "3")]
        wait: u64,
    },
    /// List serial ports
    ListPorts,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    match cli.command {
        Commands::ListPorts => list_ports()?,
        Commands::Run => {
            let config = load_config(cli.config.as_ref())?;
            let dev_mode = DevMode::new(cli.dev)?;
            run(config, dev_mode)?;
        }
        Commands::TestStream { frames } => {
            let config = load_config(cli.config.as_ref())?;
            test_stream(&config, frames)?;
        }
        Commands::TestSerial { id, wait } => {
            let config = load_config(cli.config.as_ref())?;
            test_serial(&config, &id, Duration::from_secs(wait))?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn load_detector(config: &Config) -> Result<OnnxFaceDetector> {
    let detector = OnnxFaceDetector::new_with_model_path(&config.detector, &paths::system_models_dir())
        .context("Failed to load face detector")?;
    Ok(detector)
}

fn run(config: Config, dev_mode: DevMode) -> Result<()> {
    let detector = load_detector(&config)?;

    let (relay, reader) = if config.serial.enabled {
        let port = serial::open_port(&config.serial)
            .with_context(|| format!("Failed to open serial port {}", config.serial.port))?;
        let reader = port.try_clone()?;
        let timeout = Duration::from_millis(config.serial.write_timeout_ms);
        (Some(DownlinkRelay::new(port, timeout)), Some(reader))
    } else {
        tracing::warn!("Serial relay disabled; check-ins will not reach the door controller");
        (None, None)
    };

    let mut reactor = Reactor::new(config, detector, relay, dev_mode);
    if let Some(reader) = reader {
        serial::spawn_line_reader(reader, reactor.events())?;
    }

    reactor.run()?;
    Ok(())
}

fn test_stream(config: &Config, wanted: usize) -> Result<()> {
    let detector = load_detector(config)?;
    println!("Connecting to {}...", config.stream.url);
    let mut response = open_stream(&config.stream.url)?;
    let mut demuxer = StreamDemuxer::new(config.stream.max_buffer_bytes);

    let started = Instant::now();
    let mut buf = vec![0u8; config.stream.read_chunk_bytes];
    let mut seen = 0;

    while seen < wanted {
        let n = response.read(&mut buf)?;
        if n == 0 {
            println!("Stream ended after {} frames", seen);
            break;
        }

        let frames: Vec<_> = demuxer.feed(&buf[..n]).collect();
        for frame in frames.into_iter().take(wanted - seen) {
            seen += 1;
            match frame.decode_resized(config.presence.frame_size) {
                Ok(image) => match detector.primary_face(&image)? {
                    Some(face) => {
                        let (x, y, w, h) = face.rect();
                        println!("Frame {:3}: {} bytes, face at ({}, {}) {}x{} conf {:.2}",
                                 seen, frame.len(), x, y, w, h, face.confidence);
                    }
                    None => println!("Frame {:3}: {} bytes, no face", seen, frame.len()),
                },
                Err(e) => println!("Frame {:3}: {} bytes, {}", seen, frame.len(), e),
            }
        }
    }

    let elapsed = started.elapsed().as_secs_f32();
    if elapsed > 0.0 {
        println!("{} frames in {:.1}s ({:.1} fps)", seen, elapsed, seen as f32 / elapsed);
    }
    Ok(())
}

fn test_serial(config: &Config, id: &str, wait: Duration) -> Result<()> {
    let port = serial::open_port(&config.serial)
        .with_context(|| format!("Failed to open serial port {}", config.serial.port))?;
    let mut reader = port.try_clone()?;
    let mut relay = DownlinkRelay::new(port, Duration::from_millis(config.serial.write_timeout_ms));

    let event = AttendanceEvent {
        employee_id: id.to_string(),
        name: "serial-test".to_string(),
        ..Default::default()
    };
    match relay.relay(&event)? {
        serial::RelayOutcome::Sent { command } => print!("Sent: {}", command),
        serial::RelayOutcome::Skipped => println!("Nothing sent"),
    }

    let deadline = Instant::now() + wait;
    let mut splitter = serial::LineSplitter::new();
    let mut buf = [0u8; 256];
    while Instant::now() < deadline {
        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => return Err(e.into()),
        };
        for line in splitter.push(&buf[..n]) {
            match DeviceAck::classify(&line) {
                DeviceAck::Unrecognized => println!("  {}", line),
                ack => println!("  {}  <- {:?}", line, ack),
            }
        }
    }
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = serial::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => println!(
                "{}  USB {:04x}:{:04x} {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            other => println!("{}  {:?}", port.port_name, other),
        }
    }
    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
