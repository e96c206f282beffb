pub mod ack;
pub mod port;
pub mod relay;

pub use ack::DeviceAck;
pub use port::{list_ports, open_port, spawn_line_reader, LineSplitter};
pub use relay::{build_command, is_relayable_id, DownlinkRelay, RelayOutcome};
