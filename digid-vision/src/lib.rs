pub mod analyzer;
pub mod camera;
pub mod descriptor;
pub mod model;
pub mod onnx;

// Re-export commonly used types
pub use analyzer::{FaceAnalysis, FaceAnalyzer, FaceBox, MIN_DETECTION_CONFIDENCE};
pub use camera::{Camera, MediaStream, StreamConstraints, V4lCamera};
pub use descriptor::{FaceDescriptor, DESCRIPTOR_LEN};
pub use model::{DirSource, ModelLoader, ModelSource, Readiness};
pub use onnx::OnnxFaceAnalyzer;
