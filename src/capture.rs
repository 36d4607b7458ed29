use std::io::Cursor;
use std::path::Path;

use digid_vision::model::load_face_models;
use digid_vision::{
    Camera, DirSource, FaceAnalyzer, FaceDescriptor, MediaStream, OnnxFaceAnalyzer,
    StreamConstraints, MIN_DETECTION_CONFIDENCE,
};
use image::{imageops::FilterType, DynamicImage, ImageFormat, RgbImage};
use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::matcher::{self, Verdict};

/// What a successful capture is used for.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureMode {
    Enroll,
    Verify { reference: Option<FaceDescriptor> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureState {
    Idle,
    RequestingCamera,
    Streaming,
    FrameCaptured,
    Enrolled,
    Verified,
    Rejected,
    CameraFailed(String),
    TornDown,
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::RequestingCamera => "requesting camera",
            CaptureState::Streaming => "streaming",
            CaptureState::FrameCaptured => "frame captured",
            CaptureState::Enrolled => "enrolled",
            CaptureState::Verified => "verified",
            CaptureState::Rejected => "rejected",
            CaptureState::CameraFailed(_) => "camera failed",
            CaptureState::TornDown => "torn down",
        }
    }

    fn has_result(&self) -> bool {
        matches!(
            self,
            CaptureState::Enrolled | CaptureState::Verified | CaptureState::Rejected
        )
    }
}

/// Still frame kept for preview only.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage(RgbImage);

impl CapturedImage {
    pub fn image(&self) -> &RgbImage {
        &self.0
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(self.0.clone()).write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureResult {
    Enrolled(FaceDescriptor),
    Verified(Verdict),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    pub still: CapturedImage,
    pub result: CaptureResult,
}

/// Face analyzer backed by the models in `model_dir`.
///
/// Models load once per process; a failed load is reported on every call.
pub fn onnx_analyzer(model_dir: &Path) -> Result<OnnxFaceAnalyzer> {
    let models = load_face_models(&DirSource::new(model_dir))
        .map_err(|e| Error::ModelLoad(format!("{:#}", e)))?;
    Ok(OnnxFaceAnalyzer::new(models))
}

/// Drives one camera stream from permission request to a captured face.
///
/// The controller exclusively owns the stream. Every exit path, including
/// drop, stops it.
pub struct CaptureController<C: Camera, A: FaceAnalyzer> {
    camera: C,
    analyzer: A,
    constraints: StreamConstraints,
    mode: CaptureMode,
    state: CaptureState,
    stream: Option<C::Stream>,
    still: Option<CapturedImage>,
}

impl<C: Camera, A: FaceAnalyzer> CaptureController<C, A> {
    pub fn new(camera: C, analyzer: A, mode: CaptureMode) -> Self {
        Self::with_constraints(camera, analyzer, mode, StreamConstraints::default())
    }

    pub fn with_constraints(
        camera: C,
        analyzer: A,
        mode: CaptureMode,
        constraints: StreamConstraints,
    ) -> Self {
        Self {
            camera,
            analyzer,
            constraints,
            mode,
            state: CaptureState::Idle,
            stream: None,
            still: None,
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn mode(&self) -> &CaptureMode {
        &self.mode
    }

    pub fn constraints(&self) -> &StreamConstraints {
        &self.constraints
    }

    /// Preview of the last successful capture, cleared on retake.
    pub fn still(&self) -> Option<&CapturedImage> {
        self.still.as_ref()
    }

    pub fn can_capture(&self) -> bool {
        self.state == CaptureState::Streaming && self.stream.is_some()
    }

    /// Request the camera and wait for the answer.
    pub fn mount(&mut self) -> Result<()> {
        self.begin_camera_request()?;
        let granted = self.camera.request(&self.constraints);
        self.complete_camera_request(granted)
    }

    pub fn begin_camera_request(&mut self) -> Result<()> {
        if self.state != CaptureState::Idle {
            return Err(Error::NotReady(self.state.name()));
        }
        debug!(
            "requesting camera ({}x{}, audio: {})",
            self.constraints.ideal_width, self.constraints.ideal_height, self.constraints.audio
        );
        self.state = CaptureState::RequestingCamera;
        Ok(())
    }

    /// Deliver the camera's answer to an earlier [`begin_camera_request`].
    ///
    /// A stream granted after the controller stopped waiting is stopped at once.
    ///
    /// [`begin_camera_request`]: Self::begin_camera_request
    pub fn complete_camera_request(&mut self, granted: anyhow::Result<C::Stream>) -> Result<()> {
        if self.state != CaptureState::RequestingCamera {
            if let Ok(mut stream) = granted {
                info!("camera granted while {}, releasing it", self.state.name());
                stream.stop();
            }
            return Err(Error::NotReady(self.state.name()));
        }
        match granted {
            Ok(stream) => {
                info!("camera stream started");
                self.stream = Some(stream);
                self.state = CaptureState::Streaming;
                Ok(())
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!("camera request failed: {}", message);
                self.state = CaptureState::CameraFailed(message.clone());
                Err(Error::Camera(message))
            }
        }
    }

    /// Grab a still, find a face and enroll or verify it.
    pub fn capture(&mut self) -> Result<CaptureOutcome> {
        if self.state != CaptureState::Streaming {
            return Err(Error::NotReady(self.state.name()));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::NotReady(self.state.name()));
        };
        let frame = stream
            .frame()
            .map_err(|e| Error::Camera(format!("{:#}", e)))?;
        let still = self.rasterize(frame);
        self.state = CaptureState::FrameCaptured;

        let analysis = match self
            .analyzer
            .detect_and_describe(&still, MIN_DETECTION_CONFIDENCE)
        {
            Ok(Some(analysis)) => analysis,
            Ok(None) => {
                self.state = CaptureState::Streaming;
                return Err(Error::NoFaceDetected);
            }
            Err(e) => {
                warn!("face analysis failed: {:#}", e);
                self.state = CaptureState::Streaming;
                return Err(Error::NoFaceDetected);
            }
        };
        debug!("face detected with score {:.3}", analysis.score);

        let result = match &self.mode {
            CaptureMode::Enroll => {
                self.state = CaptureState::Enrolled;
                CaptureResult::Enrolled(analysis.descriptor)
            }
            CaptureMode::Verify { reference } => {
                let verdict = match matcher::compare(reference.as_ref(), &analysis.descriptor) {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        self.state = CaptureState::Streaming;
                        return Err(e);
                    }
                };
                self.state = if verdict.is_match() {
                    CaptureState::Verified
                } else {
                    CaptureState::Rejected
                };
                CaptureResult::Verified(verdict)
            }
        };

        let still = CapturedImage(still);
        self.still = Some(still.clone());
        Ok(CaptureOutcome { still, result })
    }

    /// Drop the last result and go back to the live stream.
    pub fn retake(&mut self) -> Result<()> {
        if !self.state.has_result() {
            return Err(Error::NotReady(self.state.name()));
        }
        self.still = None;
        self.state = CaptureState::Streaming;
        Ok(())
    }

    /// Switch the mode used by later captures. Only allowed before a result is held.
    pub fn set_mode(&mut self, mode: CaptureMode) -> Result<()> {
        if self.state.has_result() || self.state == CaptureState::FrameCaptured {
            return Err(Error::NotReady(self.state.name()));
        }
        self.mode = mode;
        Ok(())
    }

    /// Stop the stream and refuse everything afterwards. Safe to call repeatedly.
    pub fn tear_down(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            info!("camera stream stopped");
        }
        self.still = None;
        self.state = CaptureState::TornDown;
    }

    fn rasterize(&self, frame: RgbImage) -> RgbImage {
        let (w, h) = (self.constraints.ideal_width, self.constraints.ideal_height);
        if frame.dimensions() == (w, h) {
            frame
        } else {
            image::imageops::resize(&frame, w, h, FilterType::Triangle)
        }
    }
}

impl<C: Camera, A: FaceAnalyzer> Drop for CaptureController<C, A> {
    fn drop(&mut self) {
        self.tear_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_are_distinct() {
        let states = [
            CaptureState::Idle,
            CaptureState::RequestingCamera,
            CaptureState::Streaming,
            CaptureState::FrameCaptured,
            CaptureState::Enrolled,
            CaptureState::Verified,
            CaptureState::Rejected,
            CaptureState::CameraFailed("denied".into()),
            CaptureState::TornDown,
        ];
        let mut names: Vec<_> = states.iter().map(|s| s.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), states.len());
    }

    #[test]
    fn only_result_states_allow_retake() {
        assert!(CaptureState::Enrolled.has_result());
        assert!(CaptureState::Verified.has_result());
        assert!(CaptureState::Rejected.has_result());
        assert!(!CaptureState::Streaming.has_result());
        assert!(!CaptureState::FrameCaptured.has_result());
    }

    #[test]
    fn still_encodes_as_png() {
        let still = CapturedImage(RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30])));
        let png = still.to_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(2, 1), &image::Rgb([10, 20, 30]));
    }
}
