pub mod auth;
pub mod capture;
pub mod config;
pub mod documents;
pub mod error;
pub mod export;
pub mod flows;
pub mod identity;
pub mod matcher;
pub mod profile;
pub mod share;
pub mod storage;

pub use capture::{CaptureController, CaptureMode, CaptureOutcome, CaptureResult, CaptureState};
pub use error::{Error, Result};
pub use identity::Identity;
pub use matcher::{Verdict, VerificationOutcome, MATCH_THRESHOLD, NO_REFERENCE_DISTANCE};
pub use storage::{DescriptorStore, FileStore, KeyValueStore, MemoryStore};

// Re-export vision types for convenience
pub use digid_vision::{Camera, FaceAnalyzer, FaceDescriptor, MediaStream, StreamConstraints};
