use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

use crate::analyzer::{FaceAnalysis, FaceAnalyzer, FaceBox};
use crate::descriptor::{FaceDescriptor, DESCRIPTOR_LEN};
use crate::model::SharedModels;

const DETECTOR_INPUT: u32 = 416;
const LANDMARK_INPUT: u32 = 112;
const DESCRIPTOR_INPUT: u32 = 150;
const LANDMARK_POINTS: usize = 68;

/// Face analyzer running the detector, landmark and descriptor models through ONNX Runtime.
pub struct OnnxFaceAnalyzer {
    models: SharedModels,
}

impl OnnxFaceAnalyzer {
    pub fn new(models: SharedModels) -> Self {
        Self { models }
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn detect_and_describe(
        &mut self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Option<FaceAnalysis>> {
        let mut models = self
            .models
            .lock()
            .map_err(|_| anyhow::anyhow!("face models lock poisoned"))?;

        let Some((bbox, score)) = detect_best_face(&mut models.detector, image, min_confidence)
            .context("detecting faces")?
        else {
            return Ok(None);
        };
        log::debug!("face at {:?} score {:.3}", bbox, score);

        let landmarks =
            estimate_landmarks(&mut models.landmarks, image, &bbox).context("estimating landmarks")?;
        let aligned = align_face(image, &landmarks, DESCRIPTOR_INPUT)?;
        let descriptor =
            describe_face(&mut models.descriptor, &aligned).context("describing face")?;

        Ok(Some(FaceAnalysis {
            bbox,
            score,
            landmarks,
            descriptor,
        }))
    }
}

fn run_model(session: &mut Session, input: Array4<f32>) -> Result<(Vec<i64>, Vec<f32>)> {
    let tensor = Value::from_array(input)?;
    let outputs = session.run(ort::inputs![tensor])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
    Ok((shape.iter().copied().collect(), data.to_vec()))
}

/// Square canvas placement of the source image: `scale` then shift by offset.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    offset_x: u32,
    offset_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> Self {
        let max_dim = width.max(height).max(1);
        let scale = target as f32 / max_dim as f32;
        let new_width = (width as f32 * scale) as u32;
        let new_height = (height as f32 * scale) as u32;
        Self {
            scale,
            offset_x: (target - new_width.min(target)) / 2,
            offset_y: (target - new_height.min(target)) / 2,
        }
    }

    fn to_source(&self, canvas_x: f32, canvas_y: f32) -> (f32, f32) {
        (
            (canvas_x - self.offset_x as f32) / self.scale,
            (canvas_y - self.offset_y as f32) / self.scale,
        )
    }
}

/// RGB pixels to a `[1, 3, H, W]` tensor scaled to `[0, 1]`.
fn to_chw(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let pixel_count = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * pixel_count];
    let (r_channel, rest) = data.split_at_mut(pixel_count);
    let (g_channel, b_channel) = rest.split_at_mut(pixel_count);
    for (i, px) in img.as_raw().chunks_exact(3).enumerate() {
        r_channel[i] = px[0] as f32 / 255.0;
        g_channel[i] = px[1] as f32 / 255.0;
        b_channel[i] = px[2] as f32 / 255.0;
    }
    Ok(Array4::from_shape_vec(
        (1, 3, h as usize, w as usize),
        data,
    )?)
}

fn detect_best_face(
    session: &mut Session,
    img: &RgbImage,
    min_confidence: f32,
) -> Result<Option<(FaceBox, f32)>> {
    let (orig_width, orig_height) = img.dimensions();
    let letterbox = Letterbox::fit(orig_width, orig_height, DETECTOR_INPUT);
    let resized = image::imageops::resize(
        img,
        (orig_width as f32 * letterbox.scale) as u32,
        (orig_height as f32 * letterbox.scale) as u32,
        FilterType::Triangle,
    );
    let mut canvas = RgbImage::new(DETECTOR_INPUT, DETECTOR_INPUT);
    image::imageops::overlay(
        &mut canvas,
        &resized,
        letterbox.offset_x as i64,
        letterbox.offset_y as i64,
    );

    let (shape, data) = run_model(session, to_chw(&canvas)?)?;
    // Rows of [x1, y1, x2, y2, score], coordinates normalized to the canvas.
    if shape.last().copied() != Some(5) {
        anyhow::bail!("unexpected detector output shape {:?}", shape);
    }

    let best = data
        .chunks_exact(5)
        .filter(|row| row[4] >= min_confidence)
        .max_by(|a, b| a[4].total_cmp(&b[4]));
    let Some(row) = best else {
        return Ok(None);
    };

    let size = DETECTOR_INPUT as f32;
    let (x1, y1) = letterbox.to_source(row[0] * size, row[1] * size);
    let (x2, y2) = letterbox.to_source(row[2] * size, row[3] * size);
    let x1 = x1.clamp(0.0, orig_width as f32);
    let y1 = y1.clamp(0.0, orig_height as f32);
    let x2 = x2.clamp(0.0, orig_width as f32);
    let y2 = y2.clamp(0.0, orig_height as f32);
    if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
        return Ok(None);
    }

    Ok(Some((
        FaceBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        },
        row[4],
    )))
}

fn estimate_landmarks(
    session: &mut Session,
    img: &RgbImage,
    bbox: &FaceBox,
) -> Result<Vec<(f32, f32)>> {
    let crop = image::imageops::crop_imm(
        img,
        bbox.x as u32,
        bbox.y as u32,
        bbox.width.max(1.0) as u32,
        bbox.height.max(1.0) as u32,
    )
    .to_image();
    let input = image::imageops::resize(&crop, LANDMARK_INPUT, LANDMARK_INPUT, FilterType::Triangle);

    let (_shape, data) = run_model(session, to_chw(&input)?)?;
    if data.len() < LANDMARK_POINTS * 2 {
        anyhow::bail!(
            "landmark model returned {} values, expected {}",
            data.len(),
            LANDMARK_POINTS * 2
        );
    }

    Ok(data[..LANDMARK_POINTS * 2]
        .chunks_exact(2)
        .map(|p| (bbox.x + p[0] * bbox.width, bbox.y + p[1] * bbox.height))
        .collect())
}

fn mean_point(points: &[(f32, f32)]) -> (f32, f32) {
    let n = points.len().max(1) as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
    (sx / n, sy / n)
}

/// Eye centers from the 68-point layout: points 36..42 and 42..48.
fn eye_centers(landmarks: &[(f32, f32)]) -> Result<((f32, f32), (f32, f32))> {
    if landmarks.len() < 48 {
        anyhow::bail!("need 68 landmarks, got {}", landmarks.len());
    }
    Ok((mean_point(&landmarks[36..42]), mean_point(&landmarks[42..48])))
}

/// Rotate and scale the face so the eyes land on fixed reference positions.
fn align_face(img: &RgbImage, landmarks: &[(f32, f32)], size: u32) -> Result<RgbImage> {
    // Reference eye positions in a 112x112 crop.
    let ref_left_eye = (38.3_f32, 51.7_f32);
    let ref_right_eye = (73.5_f32, 51.5_f32);

    let (left_eye, right_eye) = eye_centers(landmarks)?;
    let eye_dx = right_eye.0 - left_eye.0;
    let eye_dy = right_eye.1 - left_eye.1;
    let actual_eye_dist = (eye_dx * eye_dx + eye_dy * eye_dy).sqrt();
    if actual_eye_dist < f32::EPSILON {
        anyhow::bail!("degenerate landmarks: eyes coincide");
    }
    let eye_angle = eye_dy.atan2(eye_dx);

    let ref_eye_dist = ((ref_right_eye.0 - ref_left_eye.0).powi(2)
        + (ref_right_eye.1 - ref_left_eye.1).powi(2))
    .sqrt();
    let scale = (size as f32 / 112.0) * (ref_eye_dist / actual_eye_dist);

    let eye_center = (
        (left_eye.0 + right_eye.0) / 2.0,
        (left_eye.1 + right_eye.1) / 2.0,
    );
    let ref_center = (
        (ref_left_eye.0 + ref_right_eye.0) / 2.0 * size as f32 / 112.0,
        (ref_left_eye.1 + ref_right_eye.1) / 2.0 * size as f32 / 112.0,
    );

    // output = [a b; c d] * input + [tx ty]
    let (sin, cos) = eye_angle.sin_cos();
    let a = scale * cos;
    let b = scale * sin;
    let c = -scale * sin;
    let d = scale * cos;
    let tx = ref_center.0 - (a * eye_center.0 + b * eye_center.1);
    let ty = ref_center.1 - (c * eye_center.0 + d * eye_center.1);
    let det = a * d - b * c;

    let (img_w, img_h) = img.dimensions();
    let mut output = RgbImage::new(size, size);
    for out_y in 0..size {
        for out_x in 0..size {
            let tmp_x = out_x as f32 - tx;
            let tmp_y = out_y as f32 - ty;
            let in_x = (d * tmp_x - b * tmp_y) / det;
            let in_y = (-c * tmp_x + a * tmp_y) / det;
            if in_x < 0.0 || in_y < 0.0 || in_x >= img_w as f32 || in_y >= img_h as f32 {
                continue;
            }

            let x0 = in_x.floor() as u32;
            let y0 = in_y.floor() as u32;
            let x1 = (x0 + 1).min(img_w - 1);
            let y1 = (y0 + 1).min(img_h - 1);
            let fx = in_x - x0 as f32;
            let fy = in_y - y0 as f32;

            let p00 = img.get_pixel(x0, y0);
            let p10 = img.get_pixel(x1, y0);
            let p01 = img.get_pixel(x0, y1);
            let p11 = img.get_pixel(x1, y1);
            let w00 = (1.0 - fx) * (1.0 - fy);
            let w10 = fx * (1.0 - fy);
            let w01 = (1.0 - fx) * fy;
            let w11 = fx * fy;

            let mut px = [0u8; 3];
            for (ch, out) in px.iter_mut().enumerate() {
                *out = (p00[ch] as f32 * w00
                    + p10[ch] as f32 * w10
                    + p01[ch] as f32 * w01
                    + p11[ch] as f32 * w11) as u8;
            }
            output.put_pixel(out_x, out_y, image::Rgb(px));
        }
    }

    Ok(output)
}

fn describe_face(session: &mut Session, face: &RgbImage) -> Result<FaceDescriptor> {
    let face = if face.dimensions() == (DESCRIPTOR_INPUT, DESCRIPTOR_INPUT) {
        face.clone()
    } else {
        DynamicImage::ImageRgb8(face.clone())
            .resize_exact(DESCRIPTOR_INPUT, DESCRIPTOR_INPUT, FilterType::Triangle)
            .to_rgb8()
    };

    let (shape, data) = run_model(session, to_chw(&face)?)?;
    if data.len() < DESCRIPTOR_LEN {
        anyhow::bail!(
            "descriptor model output {:?} shorter than {}",
            shape,
            DESCRIPTOR_LEN
        );
    }
    FaceDescriptor::new(data[..DESCRIPTOR_LEN].to_vec())
}
