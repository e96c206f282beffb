pub mod demuxer;
pub mod frame;
pub mod stream;

pub use demuxer::{Frames, StreamDemuxer};
pub use frame::{encode_jpeg, Frame};
pub use stream::{spawn_stream_reader, StreamSupervisor};
