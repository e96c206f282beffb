pub mod detector;
pub mod presence;

pub use detector::{FaceBox, FaceDetector, OnnxFaceDetector};
pub use presence::{ConfirmedFace, PresenceAction, PresenceDebouncer, PresenceEpisode};
