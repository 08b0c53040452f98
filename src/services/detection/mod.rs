// Text region detection (two-class YOLO-style detector: text / bubble)

use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::core::config::Config;
use crate::core::errors::{OcrError, OcrResult};
use crate::core::types::Rect;
use crate::services::onnx_builder::build_session;

/// Class index for plain text regions
pub const TEXT_CLASS: usize = 0;
/// Class index for bubble containers
pub const BUBBLE_CLASS: usize = 1;

/// A kept detection in original-image coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedRegion {
    pub bbox: Rect,
    pub confidence: f32,
    pub class_index: usize,
}

/// Geometry of the letterboxed detector input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letterbox {
    pub input_size: u32,
    pub resized_width: u32,
    pub resized_height: u32,
}

impl Letterbox {
    /// The longer side maps to `input_size`; the shorter scales proportionally
    pub fn for_image(width: u32, height: u32, input_size: u32) -> Self {
        let (resized_width, resized_height) = if width >= height {
            let h = (input_size as u64 * height as u64 / width as u64) as u32;
            (input_size, h.max(1))
        } else {
            let w = (input_size as u64 * width as u64 / height as u64) as u32;
            (w.max(1), input_size)
        };
        Self {
            input_size,
            resized_width,
            resized_height,
        }
    }
}

/// Resize preserving aspect ratio, zero-pad to a square, planar RGB in [0, 1]
pub fn preprocess(img: &DynamicImage, input_size: u32) -> (Array4<f32>, Letterbox) {
    let (width, height) = img.dimensions();
    let letterbox = Letterbox::for_image(width, height, input_size);

    let resized = img
        .resize_exact(
            letterbox.resized_width,
            letterbox.resized_height,
            image::imageops::FilterType::Triangle,
        )
        .to_rgb8();

    let side = input_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
    }

    trace!(
        "Letterboxed {}x{} → {}x{} inside {}²",
        width,
        height,
        letterbox.resized_width,
        letterbox.resized_height,
        input_size
    );
    (tensor, letterbox)
}

/// Decode raw predictions laid out as `[cx, cy, w, h, objectness, class scores...]`
/// per candidate, then apply class-wise NMS.
pub fn postprocess(
    predictions: &[f32],
    num_outputs: usize,
    original: (u32, u32),
    letterbox: Letterbox,
    confidence_threshold: f32,
    iou_threshold: f32,
) -> Vec<DetectedRegion> {
    if num_outputs <= 5 {
        return Vec::new();
    }
    let num_classes = num_outputs - 5;
    let (orig_w, orig_h) = (original.0 as f32, original.1 as f32);
    let w_ratio = orig_w / letterbox.resized_width as f32;
    let h_ratio = orig_h / letterbox.resized_height as f32;

    let mut per_class: Vec<Vec<DetectedRegion>> = vec![Vec::new(); num_classes];

    for candidate in predictions.chunks_exact(num_outputs) {
        let objectness = candidate[4];

        let mut best_class = 0;
        let mut best_score = 0.0f32;
        for (c, &score) in candidate[5..].iter().enumerate() {
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        let confidence = objectness * best_score;
        if confidence < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (candidate[0], candidate[1], candidate[2], candidate[3]);
        let xmin = ((cx - w / 2.0) * w_ratio).max(0.0);
        let xmax = ((cx + w / 2.0) * w_ratio).min(orig_w);
        let ymin = ((cy - h / 2.0) * h_ratio).max(0.0);
        let ymax = ((cy + h / 2.0) * h_ratio).min(orig_h);

        per_class[best_class].push(DetectedRegion {
            bbox: Rect::from_corners(xmin, ymin, xmax, ymax),
            confidence,
            class_index: best_class,
        });
    }

    per_class
        .into_iter()
        .flat_map(|boxes| nms(boxes, iou_threshold))
        .collect()
}

/// Greedy non-maximum suppression within one class.
///
/// Keeps a box only if its IoU with every kept box is ≤ `iou_threshold`.
/// The sort is stable, so equal-confidence ties keep first-seen order.
pub fn nms(mut boxes: Vec<DetectedRegion>, iou_threshold: f32) -> Vec<DetectedRegion> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<DetectedRegion> = Vec::new();
    for candidate in boxes {
        if keep
            .iter()
            .all(|kept| kept.bbox.iou(&candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        } else {
            trace!("NMS: suppressed box at {:?}", candidate.bbox);
        }
    }
    keep
}

pub struct TextRegionDetector {
    session: Mutex<Session>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    device_type: String,
}

impl TextRegionDetector {
    pub fn new(config: &Config) -> OcrResult<Self> {
        let (device_type, session) = build_session(&config.detector_model_path(), &config.models)?;
        info!("✓ Text detector ready on {}", device_type);

        Ok(Self {
            session: Mutex::new(session),
            input_size: config.models.detector_input_size,
            confidence_threshold: config.models.confidence_threshold,
            iou_threshold: config.models.nms_iou_threshold,
            device_type,
        })
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Detect text and bubble regions in original-image pixel coordinates
    pub fn detect(&self, img: &DynamicImage) -> OcrResult<Vec<DetectedRegion>> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(OcrError::InvalidImage(format!(
                "empty image {}x{}",
                width, height
            )));
        }

        let start = Instant::now();
        let (tensor, letterbox) = preprocess(img, self.input_size);
        let side = self.input_size as usize;
        let (data, _offset) = tensor.into_raw_vec_and_offset();
        let input = Value::from_array(([1usize, 3, side, side], data))?;

        let (dims, predictions) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs!["images" => input])?;

            let blk = outputs
                .get("blk")
                .ok_or_else(|| OcrError::InferenceError("detector returned no 'blk' output".into()))?;
            let (shape, data) = blk.try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            (dims, data.to_vec())
        };

        if dims.len() != 3 || dims[2] <= 5 || predictions.len() < dims[1] * dims[2] {
            return Err(OcrError::InferenceError(format!(
                "unexpected detector output shape {:?}",
                dims
            )));
        }

        let regions = postprocess(
            &predictions[..dims[1] * dims[2]],
            dims[2],
            (width, height),
            letterbox,
            self.confidence_threshold,
            self.iou_threshold,
        );

        debug!(
            "✓ Detection: {} regions from {} candidates in {:.2}ms",
            regions.len(),
            dims[1],
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> DetectedRegion {
        DetectedRegion {
            bbox: Rect::from_corners(x1, y1, x2, y2),
            confidence,
            class_index: TEXT_CLASS,
        }
    }

    #[test]
    fn test_letterbox_landscape_and_portrait() {
        let lb = Letterbox::for_image(2000, 1000, 1024);
        assert_eq!((lb.resized_width, lb.resized_height), (1024, 512));

        let lb = Letterbox::for_image(800, 1200, 1024);
        assert_eq!((lb.resized_width, lb.resized_height), (682, 1024));
    }

    #[test]
    fn test_preprocess_pads_with_zeros() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            40,
            20,
            image::Rgb([255, 255, 255]),
        ));
        let (tensor, lb) = preprocess(&img, 320);
        assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
        assert_eq!(lb.resized_height, 160);
        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 1, 200, 10]], 0.0);
    }

    #[test]
    fn test_nms_keeps_highest_of_near_duplicates() {
        let kept = nms(
            vec![
                region(12.0, 10.0, 110.0, 50.0, 0.5),
                region(10.0, 10.0, 110.0, 50.0, 0.9),
            ],
            0.35,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[0].bbox.x, 10.0);
    }

    #[test]
    fn test_nms_kept_boxes_respect_threshold() {
        let boxes = vec![
            region(0.0, 0.0, 10.0, 10.0, 0.8),
            region(5.0, 0.0, 15.0, 10.0, 0.7),
            region(6.0, 0.0, 16.0, 10.0, 0.6),
            region(100.0, 100.0, 110.0, 110.0, 0.5),
        ];
        let kept = nms(boxes, 0.35);
        for (i, a) in kept.iter().enumerate() {
            for b in kept.iter().skip(i + 1) {
                assert!(a.bbox.iou(&b.bbox) <= 0.35);
            }
        }
        // IoU(0..10, 5..15) = 1/3 ≤ 0.35, so both survive
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_nms_equal_confidence_keeps_first_seen() {
        let kept = nms(
            vec![
                region(0.0, 0.0, 10.0, 10.0, 0.6),
                region(1.0, 0.0, 11.0, 10.0, 0.6),
            ],
            0.35,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bbox.x, 0.0);
    }

    #[test]
    fn test_nms_result_independent_of_input_order() {
        let boxes = vec![
            region(0.0, 0.0, 10.0, 10.0, 0.8),
            region(2.0, 0.0, 12.0, 10.0, 0.9),
            region(50.0, 50.0, 60.0, 60.0, 0.4),
            region(51.0, 50.0, 61.0, 60.0, 0.7),
            region(200.0, 0.0, 210.0, 10.0, 0.3),
        ];
        let kept_set = |input: Vec<DetectedRegion>| {
            let mut kept: Vec<(u32, u32)> = nms(input, 0.35)
                .iter()
                .map(|r| (r.bbox.x as u32, (r.confidence * 100.0).round() as u32))
                .collect();
            kept.sort();
            kept
        };

        let expected = kept_set(boxes.clone());
        assert_eq!(expected, vec![(2, 90), (51, 70), (200, 30)]);

        let mut reversed = boxes.clone();
        reversed.reverse();
        assert_eq!(kept_set(reversed), expected);

        let mut rotated = boxes;
        rotated.rotate_left(2);
        assert_eq!(kept_set(rotated), expected);
    }

    #[test]
    fn test_suppression_only_within_a_class() {
        let lb = Letterbox::for_image(100, 100, 100);
        #[rustfmt::skip]
        let predictions = vec![
            // cx, cy, w, h, obj, text, bubble
            50.0, 50.0, 40.0, 20.0, 1.0, 0.9, 0.0, // text, kept
            52.0, 50.0, 40.0, 20.0, 1.0, 0.8, 0.0, // text, suppressed by the first
            51.0, 50.0, 40.0, 20.0, 1.0, 0.0, 0.7, // bubble over the same spot, kept
        ];
        let regions = postprocess(&predictions, 7, (100, 100), lb, 0.4, 0.35);
        assert_eq!(regions.len(), 2);

        let text: Vec<_> = regions.iter().filter(|r| r.class_index == TEXT_CLASS).collect();
        assert_eq!(text.len(), 1);
        assert!((text[0].confidence - 0.9).abs() < 1e-6);

        let bubbles: Vec<_> = regions.iter().filter(|r| r.class_index == BUBBLE_CLASS).collect();
        assert_eq!(bubbles.len(), 1);
        assert!(text[0].bbox.iou(&bubbles[0].bbox) > 0.35);
    }

    #[test]
    fn test_postprocess_scales_filters_and_groups_by_class() {
        // Image 200x100 letterboxed into 100: resized 100x50, ratio 2.0 per axis
        let lb = Letterbox::for_image(200, 100, 100);
        #[rustfmt::skip]
        let predictions = vec![
            // cx, cy, w, h, obj, text, bubble
            25.0, 10.0, 20.0, 10.0, 0.9, 0.9, 0.1, // text, conf 0.81
            25.0, 10.0, 20.0, 10.0, 0.9, 0.1, 0.8, // bubble, conf 0.72
            60.0, 30.0, 10.0, 10.0, 0.5, 0.5, 0.0, // conf 0.25 → dropped
            95.0, 45.0, 20.0, 20.0, 1.0, 0.0, 0.9, // bubble, clamped at image edge
        ];
        let regions = postprocess(&predictions, 7, (200, 100), lb, 0.4, 0.35);
        assert_eq!(regions.len(), 3);

        let text: Vec<_> = regions.iter().filter(|r| r.class_index == TEXT_CLASS).collect();
        assert_eq!(text.len(), 1);
        assert_eq!(text[0].bbox, Rect::from_corners(30.0, 10.0, 70.0, 30.0));

        let bubbles: Vec<_> = regions.iter().filter(|r| r.class_index == BUBBLE_CLASS).collect();
        assert_eq!(bubbles.len(), 2);
        let edge = bubbles.iter().find(|r| r.bbox.x > 100.0).unwrap();
        assert_eq!(edge.bbox.max_x(), 200.0);
        assert_eq!(edge.bbox.max_y(), 100.0);
    }
}
