use std::path::Path;

use anyhow::Result;
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};

use crate::yunet;

/// Face rectangle in source-image pixels, corners (x1, y1) and (x2, y2).
///
/// The detector is not guaranteed to return `x1 < x2` and `y1 < y2`, or to
/// stay inside the image; [`crop_face`] deals with both.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Sentinel box recorded for a face that could not be classified.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Coordinates truncated toward zero, as used for cropping.
    pub fn truncated(&self) -> Self {
        Self::new(
            self.x1.trunc(),
            self.y1.trunc(),
            self.x2.trunc(),
            self.y2.trunc(),
        )
    }
}

/// Anything that turns a photo into face boxes.
///
/// A failure here is fatal for the request: without boxes there is nothing
/// to classify.
pub trait FaceLocator {
    fn detect(&mut self, img: &DynamicImage) -> Result<Vec<BoundingBox>>;
}

/// YuNet face detector backed by an ONNX session.
pub struct YuNetLocator {
    session: Session,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl YuNetLocator {
    pub fn new(session: Session, score_threshold: f32, nms_threshold: f32) -> Self {
        Self {
            session,
            score_threshold,
            nms_threshold,
        }
    }

    pub fn from_file(path: &Path, score_threshold: f32, nms_threshold: f32) -> Result<Self> {
        Ok(Self::new(
            crate::model::detector_session(path)?,
            score_threshold,
            nms_threshold,
        ))
    }
}

impl FaceLocator for YuNetLocator {
    fn detect(&mut self, img: &DynamicImage) -> Result<Vec<BoundingBox>> {
        let found = detect_faces(
            &mut self.session,
            img,
            self.score_threshold,
            self.nms_threshold,
        )?;
        log::info!("Detected {} face(s)", found.len());
        Ok(found)
    }
}

const DETECTOR_INPUT: u32 = 640;

/// Where the photo lands on the square detector canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub width: u32,
    pub height: u32,
}

impl Letterbox {
    pub fn fit(orig_width: u32, orig_height: u32, target: u32) -> Self {
        let max_dim = orig_width.max(orig_height).max(1);
        let scale = target as f32 / max_dim as f32;
        let width = ((orig_width as f32 * scale) as u32).clamp(1, target);
        let height = ((orig_height as f32 * scale) as u32).clamp(1, target);
        Self {
            scale,
            offset_x: (target - width) / 2,
            offset_y: (target - height) / 2,
            width,
            height,
        }
    }

    /// Map a canvas-space box back onto the original photo.
    pub fn unmap(&self, bbox: [f32; 4]) -> BoundingBox {
        let ox = self.offset_x as f32;
        let oy = self.offset_y as f32;
        BoundingBox::new(
            (bbox[0] - ox) / self.scale,
            (bbox[1] - oy) / self.scale,
            (bbox[2] - ox) / self.scale,
            (bbox[3] - oy) / self.scale,
        )
    }
}

/// Detect faces with YuNet. Boxes come back in source-image pixels, in
/// descending score order after NMS.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<BoundingBox>> {
    let (orig_width, orig_height) = img.dimensions();
    if orig_width == 0 || orig_height == 0 {
        anyhow::bail!("cannot detect faces in an empty {}x{} image", orig_width, orig_height);
    }

    // Pad to a square canvas so the aspect ratio survives the resize
    let lb = Letterbox::fit(orig_width, orig_height, DETECTOR_INPUT);
    let resized = img.resize_exact(lb.width, lb.height, image::imageops::FilterType::Triangle);
    let mut canvas = DynamicImage::new_rgb8(DETECTOR_INPUT, DETECTOR_INPUT);
    image::imageops::overlay(&mut canvas, &resized, lb.offset_x as i64, lb.offset_y as i64);
    let rgb = canvas.to_rgb8();

    // [1, 3, H, W], BGR, values in [0, 255]
    let size = DETECTOR_INPUT as usize;
    let input = Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        rgb.get_pixel(x as u32, y as u32)[2 - c] as f32
    });
    let input_tensor = Value::from_array(input)?;

    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut output_data: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        output_data.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let output_refs: Vec<(&[i64], &[f32])> = output_data
        .iter()
        .map(|(s, d)| (s.as_slice(), d.as_slice()))
        .collect();

    let candidates = yunet::decode(&output_refs, size, score_threshold)?;
    log::debug!("yunet produced {} candidate(s)", candidates.len());

    let scored: Vec<(BoundingBox, f32)> = candidates
        .into_iter()
        .map(|c| (lb.unmap(c.bbox), c.score))
        .collect();

    let kept = if nms_threshold < 1.0 {
        nms(&scored, nms_threshold)
    } else {
        scored
    };

    Ok(kept.into_iter().map(|(bbox, _)| bbox).collect())
}

/// Non-maximum suppression over scored boxes, highest score first.
pub fn nms(detections: &[(BoundingBox, f32)], iou_threshold: f32) -> Vec<(BoundingBox, f32)> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut keep: Vec<(BoundingBox, f32)> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|(kept, _)| compute_iou(kept, &candidate.0) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

pub fn compute_iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter = BoundingBox::new(a.x1.max(b.x1), a.y1.max(b.y1), a.x2.min(b.x2), a.y2.min(b.y2));
    let inter_area = inter.area();
    if inter_area <= 0.0 {
        return 0.0;
    }
    inter_area / (a.area() + b.area() - inter_area)
}

/// Cut the face region out of `img` using integer-truncated coordinates,
/// clamped to the image bounds.
pub fn crop_face(img: &DynamicImage, bbox: &BoundingBox) -> Result<DynamicImage> {
    let (width, height) = img.dimensions();
    let t = bbox.truncated();
    let clamp_x = |v: f32| (v as i64).clamp(0, width as i64) as u32;
    let clamp_y = |v: f32| (v as i64).clamp(0, height as i64) as u32;
    let (x1, y1, x2, y2) = (clamp_x(t.x1), clamp_y(t.y1), clamp_x(t.x2), clamp_y(t.y2));

    if x2 <= x1 || y2 <= y1 {
        anyhow::bail!(
            "face box ({}, {}, {}, {}) is empty inside a {}x{} image",
            t.x1,
            t.y1,
            t.x2,
            t.y2,
            width,
            height
        );
    }

    Ok(img.crop_imm(x1, y1, x2 - x1, y2 - y1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(10.0, 10.0, 30.0, 30.0);
        let b = BoundingBox::new(15.0, 15.0, 35.0, 35.0);
        let iou = compute_iou(&a, &b);
        assert!(iou > 0.0 && iou < 1.0);

        let c = BoundingBox::new(100.0, 100.0, 110.0, 110.0);
        assert_eq!(compute_iou(&a, &c), 0.0);
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms() {
        let detections = vec![
            (BoundingBox::new(10.0, 10.0, 30.0, 30.0), 0.9),
            (BoundingBox::new(12.0, 12.0, 32.0, 32.0), 0.8),
            (BoundingBox::new(100.0, 100.0, 120.0, 120.0), 0.85),
        ];

        let kept = nms(&detections, 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].1, 0.9);
        assert_eq!(kept[1].1, 0.85);
    }

    #[test]
    fn letterbox_round_trips_corners() {
        let lb = Letterbox::fit(1280, 640, 640);
        assert_eq!((lb.width, lb.height), (640, 320));
        assert_eq!((lb.offset_x, lb.offset_y), (0, 160));

        let on_canvas = [64.0, 160.0 + 32.0, 128.0, 160.0 + 96.0];
        let back = lb.unmap(on_canvas);
        assert_eq!(back, BoundingBox::new(128.0, 64.0, 256.0, 192.0));
    }

    #[test]
    fn crop_truncates_coordinates() {
        let img = DynamicImage::new_rgb8(100, 80);
        let crop = crop_face(&img, &BoundingBox::new(10.9, 20.7, 50.2, 60.99)).unwrap();
        assert_eq!(crop.dimensions(), (40, 40));
    }

    #[test]
    fn crop_clamps_to_image() {
        let img = DynamicImage::new_rgb8(100, 80);
        let crop = crop_face(&img, &BoundingBox::new(-20.0, -5.0, 150.0, 40.0)).unwrap();
        assert_eq!(crop.dimensions(), (100, 40));
    }

    #[test]
    fn crop_rejects_inverted_box() {
        let img = DynamicImage::new_rgb8(100, 80);
        assert!(crop_face(&img, &BoundingBox::new(50.0, 10.0, 20.0, 40.0)).is_err());
        assert!(crop_face(&img, &BoundingBox::new(200.0, 10.0, 220.0, 40.0)).is_err());
    }
}
