use std::path::PathBuf;
use std::fs;
use image::{DynamicImage, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use crate::common::paths::DEV_DATA_DIR;
use crate::core::detector::FaceBox;
use crate::error::Result;

/// Development mode keeps a local copy of every confirmed face so detector
/// and debounce behaviour can be checked after the fact.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from(DEV_DATA_DIR))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        if enabled {
            fs::create_dir_all(base_dir.join("captures"))?;
            fs::create_dir_all(base_dir.join("debug"))?;

            tracing::info!("Development mode enabled - captures will be saved to: {}",
                     base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn disabled() -> Self {
        Self { enabled: false, base_dir: PathBuf::new() }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn captures_dir(&self) -> PathBuf {
        self.base_dir.join("captures")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.base_dir.join("debug")
    }

    fn timestamped(&self, dir: PathBuf, prefix: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
        dir.join(format!("{}_{}.jpg", prefix, timestamp))
    }

    /// Saves the cropped face that was sent upstream and the full frame with
    /// the detected box drawn on it. No-op outside dev mode.
    pub fn save_confirmed_face(
        &self,
        frame: &DynamicImage,
        face: &FaceBox,
        crop: &DynamicImage,
    ) -> Result<Option<PathBuf>> {
        if !self.enabled {
            return Ok(None);
        }

        let crop_path = self.timestamped(self.captures_dir(), "face");
        crop.to_rgb8().save(&crop_path)?;

        let mut annotated = frame.to_rgb8();
        let (x, y, w, h) = face.rect();
        if w > 0 && h > 0 {
            draw_hollow_rect_mut(
                &mut annotated,
                Rect::at(x as i32, y as i32).of_size(w, h),
                Rgb([255, 0, 0]),
            );
        }
        annotated.save(self.timestamped(self.debug_dir(), "frame"))?;

        tracing::debug!("Saved confirmed face to {}", crop_path.display());
        Ok(Some(crop_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_mode_writes_nothing() {
        let dev = DevMode::disabled();
        let frame = DynamicImage::new_rgb8(32, 32);
        let face = FaceBox { x1: 4.0, y1: 4.0, x2: 20.0, y2: 20.0, confidence: 0.9 };
        assert!(dev.save_confirmed_face(&frame, &face, &frame).unwrap().is_none());
    }

    #[test]
    fn enabled_mode_saves_crop_and_annotated_frame() {
        let dir = tempfile::tempdir().unwrap();
        let dev = DevMode::with_base_dir(true, dir.path().to_path_buf()).unwrap();
        let frame = DynamicImage::new_rgb8(32, 32);
        let face = FaceBox { x1: 4.0, y1: 4.0, x2: 20.0, y2: 20.0, confidence: 0.9 };
        let crop = frame.crop_imm(4, 4, 16, 16);

        let path = dev.save_confirmed_face(&frame, &face, &crop).unwrap().unwrap();
        assert!(path.exists());
        assert_eq!(fs::read_dir(dev.debug_dir()).unwrap().count(), 1);
    }
}
