use anyhow::Result;
use image::RgbImage;

use crate::descriptor::FaceDescriptor;

/// Minimum detector score for a face to count.
pub const MIN_DETECTION_CONFIDENCE: f32 = 0.5;

/// Axis-aligned face box in image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A single detected face together with its descriptor.
#[derive(Debug, Clone)]
pub struct FaceAnalysis {
    pub bbox: FaceBox,
    pub score: f32,
    /// 68 landmark points in image pixels.
    pub landmarks: Vec<(f32, f32)>,
    pub descriptor: FaceDescriptor,
}

/// Detect-and-describe capability.
pub trait FaceAnalyzer {
    /// Finds the best face scoring at least `min_confidence` and describes it.
    ///
    /// `Ok(None)` means no face cleared the threshold.
    fn detect_and_describe(
        &mut self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Option<FaceAnalysis>>;
}

impl<A: FaceAnalyzer + ?Sized> FaceAnalyzer for Box<A> {
    fn detect_and_describe(
        &mut self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Option<FaceAnalysis>> {
        (**self).detect_and_describe(image, min_confidence)
    }
}
