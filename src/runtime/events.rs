use std::net::TcpStream;

/// Every connection a producer thread serves is stamped with a generation;
/// events from a superseded connection are dropped by the reactor.
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    StreamReconnect,
    BackendRetry,
}

#[derive(Debug)]
pub enum Event {
    StreamChunk { generation: Generation, data: Vec<u8> },
    /// `failed` is false for a clean end of body.
    StreamEnded { generation: Generation, failed: bool },
    BackendConnected { generation: Generation, stream: TcpStream },
    BackendConnectFailed { generation: Generation, reason: String },
    BackendReplied { generation: Generation, data: Vec<u8> },
    BackendDisconnected { generation: Generation },
    SerialLineReceived(String),
    TimerFired(TimerKind),
}
