use crate::common::config::DetectorConfig;
use crate::error::{AttendanceError, Result};
use ort::{Environment, Session, SessionBuilder, Value, GraphOptimizationLevel};
use std::path::Path;
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Integer `(x, y, w, h)` view of the box.
    pub fn rect(&self) -> (u32, u32, u32, u32) {
        (
            self.x1.max(0.0) as u32,
            self.y1.max(0.0) as u32,
            self.width() as u32,
            self.height() as u32,
        )
    }

    /// Crops the box out of `image`, grown by `margin` of its size on every
    /// side and clamped to the image bounds.
    pub fn crop(&self, image: &DynamicImage, margin: f32) -> DynamicImage {
        let pad_x = self.width() * margin;
        let pad_y = self.height() * margin;
        let max_x = image.width() as f32;
        let max_y = image.height() as f32;

        let x1 = (self.x1 - pad_x).clamp(0.0, max_x);
        let y1 = (self.y1 - pad_y).clamp(0.0, max_y);
        let x2 = (self.x2 + pad_x).clamp(0.0, max_x);
        let y2 = (self.y2 + pad_y).clamp(0.0, max_y);

        let w = ((x2 - x1) as u32).max(1).min(image.width().saturating_sub(x1 as u32).max(1));
        let h = ((y2 - y1) as u32).max(1).min(image.height().saturating_sub(y1 as u32).max(1));
        image.crop_imm(x1 as u32, y1 as u32, w, h)
    }
}

/// Anything that can find faces in a frame. The client only ever looks at the
/// primary (most confident) face.
pub trait FaceDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>>;

    fn primary_face(&self, image: &DynamicImage) -> Result<Option<FaceBox>> {
        let faces = self.detect(image)?;
        Ok(faces
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence)))
    }
}

impl<T: FaceDetector + ?Sized> FaceDetector for Box<T> {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        (**self).detect(image)
    }
}

pub struct OnnxFaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    config: DetectorConfig,
}

impl OnnxFaceDetector {
    /// Relative model paths are tried as given first, then under `models_base`.
    pub fn new_with_model_path(config: &DetectorConfig, models_base: &Path) -> Result<Self> {
        let mut model_path = config.model_path.clone();
        if model_path.is_relative() && !model_path.exists() {
            model_path = models_base.join(&model_path);
        }

        if !model_path.exists() {
            return Err(AttendanceError::Model(
                format!("Detector model not found at: {:?}", model_path)
            ));
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("face_detector")
                .build()
                .map_err(|e| AttendanceError::Model(format!("Failed to create environment: {}", e)))?
        );

        let opt_level = match config.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };
        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(opt_level)?
            .with_model_from_file(&model_path)?;

        tracing::info!("Loaded face detector from {}", model_path.display());

        Ok(Self {
            session,
            _environment: environment,
            config: config.clone(),
        })
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let width = rgb.width() as usize;
        let height = rgb.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 * norm_factor;
            array[[0, 1, y, x]] = pixel[1] as f32 * norm_factor;
            array[[0, 2, y, x]] = pixel[2] as f32 * norm_factor;
        }

        array
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<FaceBox>> {
        let Some(first) = outputs.first() else {
            return Ok(Vec::new());
        };

        let tensor = first.try_extract::<f32>()?;
        let output = tensor.view().to_owned();
        let shape = output.shape().to_vec();

        // YOLO heads come out as [1, N, 5+] or transposed as [1, 5+, N]
        let (num_predictions, prediction_length, is_transposed) = match shape.len() {
            3 if shape[2] > shape[1] && shape[1] <= 10 => (shape[2], shape[1], true),
            3 => (shape[1], shape[2], false),
            2 => (shape[0], shape[1], false),
            _ => {
                tracing::warn!("Unexpected detector output shape: {:?}", shape);
                return Ok(Vec::new());
            }
        };
        if prediction_length < 4 {
            tracing::warn!("Detector output too narrow: {:?}", shape);
            return Ok(Vec::new());
        }

        let values: Vec<f32> = output.iter().copied().collect();
        let at = |i: usize, k: usize| -> f32 {
            if is_transposed {
                values[k * num_predictions + i]
            } else {
                values[i * prediction_length + k]
            }
        };

        let input_w = self.config.input_width as f32;
        let input_h = self.config.input_height as f32;
        let mut faces = Vec::new();

        for i in 0..num_predictions {
            let confidence = if prediction_length > 4 { at(i, 4) } else { 0.0 };
            if confidence <= 0.001 {
                continue;
            }

            let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
            let scale = if cx > 1.0 || cy > 1.0 || w > 1.0 || h > 1.0 { 1.0 } else { input_w };
            let (cx, cy, w, h) = (cx * scale, cy * scale, w * scale, h * scale);

            let x1 = (cx - w / 2.0).max(0.0);
            let y1 = (cy - h / 2.0).max(0.0);
            let x2 = (cx + w / 2.0).min(input_w);
            let y2 = (cy + h / 2.0).min(input_h);

            if x2 - x1 > 10.0 && y2 - y1 > 10.0 {
                faces.push(FaceBox { x1, y1, x2, y2, confidence });
            }
        }

        // NMS before the threshold so duplicates of a strong box go too
        let mut faces = apply_nms(faces, 0.45);
        faces.retain(|face| face.confidence >= self.config.confidence_threshold);
        faces.truncate(5);

        Ok(faces)
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == self.config.input_width
            && image.height() == self.config.input_height {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(
                self.config.input_width,
                self.config.input_height,
                FilterType::Nearest,
            );
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut faces = self.parse_detections(&outputs)?;

        let scale_x = orig_width / self.config.input_width as f32;
        let scale_y = orig_height / self.config.input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        Ok(faces)
    }
}

/// Greedy non-maximum suppression; the result is sorted by confidence.
pub fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| calculate_iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

pub fn calculate_iou(box1: &FaceBox, box2: &FaceBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = box1.width() * box1.height() + box2.width() * box2.height() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence }
    }

    struct Fixed(Vec<FaceBox>);

    impl FaceDetector for Fixed {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<FaceBox>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn nms_drops_overlapping_weaker_box() {
        let boxes = vec![
            face(0.0, 0.0, 100.0, 100.0, 0.6),
            face(5.0, 5.0, 105.0, 105.0, 0.9),
            face(200.0, 200.0, 260.0, 260.0, 0.7),
        ];
        let kept = apply_nms(boxes, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = face(20.0, 20.0, 30.0, 30.0, 1.0);
        assert_eq!(calculate_iou(&a, &b), 0.0);
        assert!((calculate_iou(&a, &a) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn primary_face_is_most_confident() {
        let detector = Fixed(vec![
            face(0.0, 0.0, 20.0, 20.0, 0.55),
            face(30.0, 30.0, 60.0, 60.0, 0.95),
        ]);
        let image = DynamicImage::new_rgb8(64, 64);
        let primary = detector.primary_face(&image).unwrap().unwrap();
        assert_eq!(primary.confidence, 0.95);

        let empty = Fixed(Vec::new());
        assert!(empty.primary_face(&image).unwrap().is_none());
    }

    #[test]
    fn crop_is_clamped_to_image() {
        let image = DynamicImage::new_rgb8(100, 80);
        let crop = face(80.0, 60.0, 100.0, 80.0, 0.9).crop(&image, 0.5);
        assert_eq!(crop.width(), 30);
        assert_eq!(crop.height(), 30);

        let inner = face(20.0, 20.0, 60.0, 60.0, 0.9).crop(&image, 0.0);
        assert_eq!((inner.width(), inner.height()), (40, 40));
        assert_eq!(face(20.0, 20.0, 60.0, 60.0, 0.9).rect(), (20, 20, 40, 40));
    }
}
