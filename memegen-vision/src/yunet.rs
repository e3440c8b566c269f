//! YuNet detector post-processing.
//!
//! YuNet is anchor-free. For each stride (8, 16, 32) the network emits four
//! tensors over an `(input / stride)^2` grid:
//! - cls: [1, H*W, 1] classification score
//! - obj: [1, H*W, 1] objectness score
//! - bbox: [1, H*W, 4] (dx, dy, log w, log h) in stride units
//! - kps: [1, H*W, 10] landmark offsets (unused here)
//!
//! Output order is cls_8, cls_16, cls_32, obj_8, ..., bbox_8, ..., kps_8, ...
//! Decoded boxes are in canvas pixels as corners (x1, y1, x2, y2).

use anyhow::Result;

pub const STRIDES: [usize; 3] = [8, 16, 32];

const CLS: usize = 0;
const OBJ: usize = 3;
const BBOX: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bbox: [f32; 4],
    pub score: f32,
}

/// Fetch output `idx` and check it is `[1, rows, width]`.
fn tensor<'a>(
    outputs: &[(&[i64], &'a [f32])],
    idx: usize,
    rows: usize,
    width: usize,
) -> Result<&'a [f32]> {
    let Some(&(shape, data)) = outputs.get(idx) else {
        anyhow::bail!("missing yunet output at index {}", idx);
    };
    let expected = [1, rows as i64, width as i64];
    if shape != expected.as_slice() {
        anyhow::bail!(
            "unexpected yunet output shape at index {}: {:?}, expected {:?}",
            idx,
            shape,
            expected
        );
    }
    if data.len() != rows * width {
        anyhow::bail!(
            "yunet output {} holds {} values, expected {}",
            idx,
            data.len(),
            rows * width
        );
    }
    Ok(data)
}

/// Decode raw outputs into candidates scoring at least `score_threshold`.
///
/// The score of a grid cell is `sqrt(cls * obj)` with both terms clamped to
/// [0, 1]; box size is `exp(d) * stride`.
pub fn decode(
    outputs: &[(&[i64], &[f32])],
    input_size: usize,
    score_threshold: f32,
) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();

    for (scale, &stride) in STRIDES.iter().enumerate() {
        let cols = input_size / stride;
        let cells = cols * cols;
        let cls = tensor(outputs, CLS + scale, cells, 1)?;
        let obj = tensor(outputs, OBJ + scale, cells, 1)?;
        let bbox = tensor(outputs, BBOX + scale, cells, 4)?;
        let stride = stride as f32;

        for idx in 0..cells {
            let score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
            // negated so NaN scores are dropped too
            if !(score >= score_threshold) {
                continue;
            }
            let row = (idx / cols) as f32;
            let col = (idx % cols) as f32;
            let d = &bbox[idx * 4..idx * 4 + 4];

            let cx = (col + d[0]) * stride;
            let cy = (row + d[1]) * stride;
            let w = d[2].exp() * stride;
            let h = d[3].exp() * stride;

            candidates.push(Candidate {
                bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
                score,
            });
        }
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Outputs {
        shapes: Vec<[i64; 3]>,
        data: Vec<Vec<f32>>,
    }

    impl Outputs {
        fn empty(input_size: usize) -> Self {
            let mut shapes = Vec::new();
            let mut data = Vec::new();
            for width in [1usize, 1, 4, 10] {
                for stride in STRIDES {
                    let cells = (input_size / stride).pow(2);
                    shapes.push([1, cells as i64, width as i64]);
                    data.push(vec![0.0; cells * width]);
                }
            }
            Self { shapes, data }
        }

        fn refs(&self) -> Vec<(&[i64], &[f32])> {
            self.shapes
                .iter()
                .zip(self.data.iter())
                .map(|(s, d)| (s.as_slice(), d.as_slice()))
                .collect()
        }
    }

    #[test]
    fn decodes_single_cell() {
        let input_size = 640;
        let mut out = Outputs::empty(input_size);

        // stride 32, 20x20 grid, cell (row 10, col 10)
        let idx = 10 * 20 + 10;
        out.data[CLS + 2][idx] = 0.9;
        out.data[OBJ + 2][idx] = 0.9;
        out.data[BBOX + 2][idx * 4..idx * 4 + 4].copy_from_slice(&[0.5, 0.25, 0.0, 0.0]);

        let found = decode(&out.refs(), input_size, 0.5).unwrap();
        assert_eq!(found.len(), 1);
        let c = &found[0];

        // centre (10.5 * 32, 10.25 * 32) = (336, 328), size exp(0) * 32 = 32
        assert!((c.score - 0.9).abs() < 1e-5);
        assert!((c.bbox[0] - 320.0).abs() < 1e-4);
        assert!((c.bbox[1] - 312.0).abs() < 1e-4);
        assert!((c.bbox[2] - 352.0).abs() < 1e-4);
        assert!((c.bbox[3] - 344.0).abs() < 1e-4);
    }

    #[test]
    fn filters_low_scores() {
        let input_size = 640;
        let mut out = Outputs::empty(input_size);
        out.data[CLS][0] = 0.2;
        out.data[OBJ][0] = 0.2;
        out.data[CLS][1] = f32::NAN;
        out.data[OBJ][1] = 0.9;
        out.data[CLS + 1][0] = 0.9;
        out.data[OBJ + 1][0] = f32::NAN;
        assert!(decode(&out.refs(), input_size, 0.5).unwrap().is_empty());
    }

    #[test]
    fn rejects_wrong_shape() {
        let input_size = 640;
        let mut out = Outputs::empty(input_size);
        out.shapes[BBOX] = [1, 6400, 5];
        assert!(decode(&out.refs(), input_size, 0.5).is_err());
    }
}
