//! One-time loading of the three face models.
//!
//! The detector, landmark estimator and descriptor extractor are fetched from a
//! [`ModelSource`] and built together. A loader either becomes ready with all
//! three or stays failed for the rest of the session.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Detector,
    Landmarks,
    Descriptor,
}

impl Artifact {
    pub const ALL: [Artifact; 3] = [Artifact::Detector, Artifact::Landmarks, Artifact::Descriptor];

    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Detector => "tiny_face_detector.onnx",
            Artifact::Landmarks => "face_landmark_68.onnx",
            Artifact::Descriptor => "face_recognition.onnx",
        }
    }
}

/// Where model bytes come from.
pub trait ModelSource {
    fn fetch(&self, artifact: Artifact) -> Result<Vec<u8>>;
}

/// Reads artifacts from a fixed directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    base: PathBuf,
}

impl DirSource {
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl ModelSource for DirSource {
    fn fetch(&self, artifact: Artifact) -> Result<Vec<u8>> {
        let path = self.base.join(artifact.file_name());
        std::fs::read(&path).with_context(|| format!("reading model {}", path.display()))
    }
}

/// Raw bytes of all three models.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub detector: Vec<u8>,
    pub landmarks: Vec<u8>,
    pub descriptor: Vec<u8>,
}

impl ModelArtifacts {
    pub fn fetch_all(source: &dyn ModelSource) -> Result<Self> {
        Ok(Self {
            detector: source.fetch(Artifact::Detector)?,
            landmarks: source.fetch(Artifact::Landmarks)?,
            descriptor: source.fetch(Artifact::Descriptor)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    NotLoaded,
    Ready,
    Failed(String),
}

/// Loads models at most once. A failure is cached and returned on every later call.
pub struct ModelLoader<M> {
    cell: OnceCell<std::result::Result<Arc<M>, String>>,
}

impl<M> ModelLoader<M> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn load_with<F>(&self, source: &dyn ModelSource, build: F) -> Result<Arc<M>>
    where
        F: FnOnce(ModelArtifacts) -> Result<M>,
    {
        let slot = self.cell.get_or_init(|| {
            match ModelArtifacts::fetch_all(source).and_then(build) {
                Ok(models) => {
                    log::info!("face models ready");
                    Ok(Arc::new(models))
                }
                Err(e) => {
                    log::error!("face model load failed: {:#}", e);
                    Err(format!("{:#}", e))
                }
            }
        });
        match slot {
            Ok(models) => Ok(Arc::clone(models)),
            Err(message) => Err(anyhow::anyhow!("face models unavailable: {}", message)),
        }
    }

    pub fn readiness(&self) -> Readiness {
        match self.cell.get() {
            None => Readiness::NotLoaded,
            Some(Ok(_)) => Readiness::Ready,
            Some(Err(message)) => Readiness::Failed(message.clone()),
        }
    }

    pub fn get(&self) -> Option<Arc<M>> {
        match self.cell.get() {
            Some(Ok(models)) => Some(Arc::clone(models)),
            _ => None,
        }
    }
}

impl<M> Default for ModelLoader<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// The three ONNX sessions behind the face analyzer.
pub struct FaceModels {
    pub detector: Session,
    pub landmarks: Session,
    pub descriptor: Session,
}

impl FaceModels {
    pub fn from_artifacts(artifacts: ModelArtifacts) -> Result<Self> {
        Ok(Self {
            detector: session_builder()?
                .commit_from_memory(&artifacts.detector)
                .context("load detector model")?,
            landmarks: session_builder()?
                .commit_from_memory(&artifacts.landmarks)
                .context("load landmark model")?,
            descriptor: session_builder()?
                .commit_from_memory(&artifacts.descriptor)
                .context("load descriptor model")?,
        })
    }
}

pub type SharedModels = Arc<Mutex<FaceModels>>;

/// Process-wide model slot.
pub static FACE_MODELS: ModelLoader<Mutex<FaceModels>> = ModelLoader::new();

pub fn load_face_models(source: &dyn ModelSource) -> Result<SharedModels> {
    FACE_MODELS.load_with(source, |artifacts| {
        FaceModels::from_artifacts(artifacts).map(Mutex::new)
    })
}

pub fn session_builder() -> Result<SessionBuilder> {
    #[allow(unused_mut)]
    let mut builder =
        Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort::Error::<()>::from)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FlakySource {
        fail_on: Option<Artifact>,
        fetches: Cell<usize>,
    }

    impl ModelSource for FlakySource {
        fn fetch(&self, artifact: Artifact) -> Result<Vec<u8>> {
            self.fetches.set(self.fetches.get() + 1);
            if self.fail_on == Some(artifact) {
                anyhow::bail!("{} missing", artifact.file_name());
            }
            Ok(artifact.file_name().as_bytes().to_vec())
        }
    }

    #[test]
    fn ready_after_all_three_artifacts() {
        let loader: ModelLoader<usize> = ModelLoader::new();
        assert_eq!(loader.readiness(), Readiness::NotLoaded);
        let source = FlakySource {
            fail_on: None,
            fetches: Cell::new(0),
        };
        let total = loader
            .load_with(&source, |a| {
                Ok(a.detector.len() + a.landmarks.len() + a.descriptor.len())
            })
            .unwrap();
        assert!(*total > 0);
        assert_eq!(loader.readiness(), Readiness::Ready);
        assert_eq!(source.fetches.get(), 3);
    }

    #[test]
    fn one_missing_artifact_fails_the_whole_load() {
        let loader: ModelLoader<()> = ModelLoader::new();
        let source = FlakySource {
            fail_on: Some(Artifact::Landmarks),
            fetches: Cell::new(0),
        };
        let err = loader.load_with(&source, |_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("face_landmark_68.onnx"));
        assert!(matches!(loader.readiness(), Readiness::Failed(_)));
        assert!(loader.get().is_none());
    }

    #[test]
    fn failure_is_terminal_for_the_loader() {
        let loader: ModelLoader<()> = ModelLoader::new();
        let broken = FlakySource {
            fail_on: Some(Artifact::Descriptor),
            fetches: Cell::new(0),
        };
        assert!(loader.load_with(&broken, |_| Ok(())).is_err());

        let healthy = FlakySource {
            fail_on: None,
            fetches: Cell::new(0),
        };
        assert!(loader.load_with(&healthy, |_| Ok(())).is_err());
        assert_eq!(healthy.fetches.get(), 0);
    }

    #[test]
    fn build_failure_leaves_loader_failed() {
        let loader: ModelLoader<()> = ModelLoader::new();
        let source = FlakySource {
            fail_on: None,
            fetches: Cell::new(0),
        };
        let res = loader.load_with(&source, |_| anyhow::bail!("bad graph"));
        assert!(res.is_err());
        assert_eq!(loader.readiness(), Readiness::Failed("bad graph".into()));
    }

    #[test]
    fn dir_source_reads_named_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tiny_face_detector.onnx"), b"det").unwrap();
        let source = DirSource::new(dir.path());
        assert_eq!(source.fetch(Artifact::Detector).unwrap(), b"det");
        assert!(source.fetch(Artifact::Descriptor).is_err());
    }
}
