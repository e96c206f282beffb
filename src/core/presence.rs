//! Debouncing of per-frame detections into presence episodes.
//!
//! An episode is a contiguous run of frames that contain a face. It is
//! confirmed exactly once, when the run reaches the threshold, and only a frame
//! without a face ends it.

use image::DynamicImage;

use crate::core::detector::FaceBox;

pub const DEFAULT_CONFIRM_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceEpisode {
    pub consecutive_count: u32,
    pub confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct ConfirmedFace {
    pub crop: DynamicImage,
    pub face: FaceBox,
}

#[derive(Debug, Clone)]
pub enum PresenceAction {
    None,
    Confirm(ConfirmedFace),
    Clear,
}

impl PresenceAction {
    pub fn is_confirm(&self) -> bool {
        matches!(self, PresenceAction::Confirm(_))
    }
}

pub struct PresenceDebouncer {
    threshold: u32,
    crop_margin: f32,
    episode: PresenceEpisode,
}

impl PresenceDebouncer {
    pub fn new(threshold: u32, crop_margin: f32) -> Self {
        Self {
            threshold: threshold.max(1),
            crop_margin,
            episode: PresenceEpisode::default(),
        }
    }

    pub fn on_frame(&mut self, frame: &DynamicImage, detection: Option<&FaceBox>) -> PresenceAction {
        let Some(face) = detection else {
            if self.episode.consecutive_count > 0 {
                tracing::debug!("Presence episode ended after {} frames", self.episode.consecutive_count);
            }
            self.episode = PresenceEpisode::default();
            return PresenceAction::Clear;
        };

        self.episode.consecutive_count = self.episode.consecutive_count.saturating_add(1);
        if self.episode.confirmed || self.episode.consecutive_count < self.threshold {
            return PresenceAction::None;
        }

        self.episode.confirmed = true;
        tracing::info!(
            "Face confirmed after {} consecutive frames (confidence {:.2})",
            self.episode.consecutive_count,
            face.confidence
        );
        PresenceAction::Confirm(ConfirmedFace {
            crop: face.crop(frame, self.crop_margin),
            face: face.clone(),
        })
    }

    pub fn reset(&mut self) {
        self.episode = PresenceEpisode::default();
    }

    pub fn episode(&self) -> PresenceEpisode {
        self.episode
    }
}

impl Default for PresenceDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRM_THRESHOLD, 0.0)
    }
}
