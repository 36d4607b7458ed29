use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use digid::capture::{onnx_analyzer, CapturedImage};
use digid::{
    config, share, CaptureController, CaptureMode, CaptureResult, DescriptorStore, Error,
    FileStore, Identity, Verdict,
};
use digid_vision::model::FACE_MODELS;
use digid_vision::{OnnxFaceAnalyzer, Readiness, V4lCamera};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "digid")]
#[command(version, about = "Digital identity: face enrollment and verification")]
struct Cli {
    /// Config file (defaults to the compiled-in path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a face and store it as the reference for an email
    Enroll {
        #[arg(short, long)]
        email: String,
        /// Frames to try before giving up
        #[arg(long, default_value_t = 30)]
        attempts: u32,
        /// Also save the enrollment still as PNG
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    /// Compare a live capture against the stored reference
    Verify {
        #[arg(short, long)]
        email: String,
        #[arg(long, default_value_t = 30)]
        attempts: u32,
    },
    /// Write the profile QR code as PNG
    Qr {
        #[arg(short, long)]
        user_id: String,
        #[arg(short, long, default_value = "digid-qr.png")]
        output: PathBuf,
        #[arg(long, default_value_t = share::QR_DEFAULT_SIZE)]
        size: u32,
    },
    /// Load the face models and report readiness
    Models,
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let cfg = config::load_config(config_path)?;

    match cli.command {
        Commands::Enroll {
            email,
            attempts,
            photo,
        } => enroll(&cfg, &email, attempts, photo.as_deref()),
        Commands::Verify { email, attempts } => verify(&cfg, &email, attempts),
        Commands::Qr {
            user_id,
            output,
            size,
        } => qr(&cfg, &user_id, &output, size),
        Commands::Models => models(&cfg),
        Commands::Config => open_config(config_path.unwrap_or(&config::CONFIG_PATH)),
    }
}

type Controller = CaptureController<V4lCamera, OnnxFaceAnalyzer>;

fn open_controller(cfg: &config::Config, mode: CaptureMode) -> Result<Controller> {
    let analyzer = onnx_analyzer(&cfg.model_dir)
        .with_context(|| format!("Failed to load face models from {}", cfg.model_dir.display()))?;
    info!("Opening camera: {}", cfg.camera);
    let mut controller = CaptureController::with_constraints(
        V4lCamera::new(&cfg.camera),
        analyzer,
        mode,
        cfg.constraints(),
    );
    controller.mount().context("Failed to open camera")?;
    Ok(controller)
}

fn enroll(cfg: &config::Config, email: &str, attempts: u32, photo: Option<&Path>) -> Result<()> {
    let identity = Identity::from_email(email)?;
    info!("Enrolling: {}", identity.email());

    let mut controller = open_controller(cfg, CaptureMode::Enroll)?;
    info!("Camera opened. Look at the camera...");

    for i in 0..attempts {
        match controller.capture() {
            Ok(outcome) => {
                let CaptureResult::Enrolled(descriptor) = outcome.result else {
                    anyhow::bail!("capture was not in enroll mode");
                };
                DescriptorStore::new(FileStore::new(&cfg.store_dir))
                    .put(&identity, &descriptor)
                    .context("Failed to save reference face")?;
                if let Some(path) = photo {
                    save_still(&outcome.still, path)?;
                }
                controller.tear_down();
                info!("✓ Face enrolled for {}", identity.email());
                return Ok(());
            }
            Err(e @ Error::NoFaceDetected) => warn!("Frame {}: {}", i + 1, e),
            Err(e) => return Err(e.into()),
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    anyhow::bail!("Failed to detect a face. Please ensure your face is visible and well-lit.")
}

fn verify(cfg: &config::Config, email: &str, attempts: u32) -> Result<()> {
    let identity = Identity::from_email(email)?;
    let reference = DescriptorStore::new(FileStore::new(&cfg.store_dir))
        .get(&identity)
        .context("Failed to load reference face")?;
    if reference.is_none() {
        return Err(Error::NoReference(identity.email().to_string()).into());
    }

    let mut controller = open_controller(cfg, CaptureMode::Verify { reference })?;
    info!("Camera opened. Verifying {}...", identity.email());

    for i in 0..attempts {
        match controller.capture() {
            Ok(outcome) => match outcome.result {
                CaptureResult::Verified(Verdict::Match(o)) => {
                    info!(
                        "Distance: {:.3} (threshold: {:.2})",
                        o.distance,
                        digid::MATCH_THRESHOLD
                    );
                    info!("✓ Verification successful!");
                    return Ok(());
                }
                CaptureResult::Verified(verdict) => {
                    warn!("Frame {}: distance {:.3}, no match", i + 1, verdict.outcome().distance);
                    controller.retake()?;
                }
                CaptureResult::Enrolled(_) => anyhow::bail!("capture was not in verify mode"),
            },
            Err(e @ Error::NoFaceDetected) => warn!("Frame {}: {}", i + 1, e),
            Err(e) => return Err(e.into()),
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    anyhow::bail!("Verification failed: no matching face detected")
}

fn save_still(still: &CapturedImage, path: &Path) -> Result<()> {
    let png = still.to_png()?;
    std::fs::write(path, png).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Saved enrollment photo to {}", path.display());
    Ok(())
}

fn qr(cfg: &config::Config, user_id: &str, output: &Path, size: u32) -> Result<()> {
    let url = share::profile_url(&cfg.app_origin, user_id);
    let png = share::qr_png(&url, size)?;
    std::fs::write(output, png).with_context(|| format!("Failed to write {}", output.display()))?;
    info!("QR code for {} written to {}", url, output.display());
    Ok(())
}

fn models(cfg: &config::Config) -> Result<()> {
    info!("Loading face models from {}", cfg.model_dir.display());
    let result = onnx_analyzer(&cfg.model_dir);
    match FACE_MODELS.readiness() {
        Readiness::Ready => info!("✓ Face models ready"),
        Readiness::Failed(message) => warn!("Face models failed: {}", message),
        Readiness::NotLoaded => warn!("Face models not loaded"),
    }
    result.map(|_| ()).map_err(Into::into)
}

fn open_config(config_path: &Path) -> Result<()> {
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
