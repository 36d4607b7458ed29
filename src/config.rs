use anyhow::{Context, Result};
use directories::ProjectDirs;
use digid_vision::StreamConstraints;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("DIGID_CONFIG_PATH").unwrap_or("/usr/local/etc/digid/config.toml"))
});

pub static MODEL_DIR: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("DIGID_MODEL_DIR").unwrap_or("/usr/local/share/digid/models"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub model_dir: PathBuf,
    pub store_dir: PathBuf,
    pub app_origin: String,
    pub storage_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: "/dev/video0".to_string(),
            frame_width: 640,
            frame_height: 480,
            model_dir: MODEL_DIR.to_path_buf(),
            store_dir: default_store_dir(),
            app_origin: "http://localhost:8080".to_string(),
            storage_base_url: "http://localhost:54321".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.frame_width == 0 || self.frame_width > 4096 {
            anyhow::bail!(
                "frame_width must be between 1 and 4096, got {}",
                self.frame_width
            );
        }
        if self.frame_height == 0 || self.frame_height > 4096 {
            anyhow::bail!(
                "frame_height must be between 1 and 4096, got {}",
                self.frame_height
            );
        }
        for (name, value) in [
            ("app_origin", &self.app_origin),
            ("storage_base_url", &self.storage_base_url),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                anyhow::bail!("{} must be an http(s) URL, got '{}'", name, value);
            }
        }
        Ok(())
    }

    pub fn constraints(&self) -> StreamConstraints {
        StreamConstraints {
            ideal_width: self.frame_width,
            ideal_height: self.frame_height,
            audio: false,
        }
    }
}

fn default_store_dir() -> PathBuf {
    ProjectDirs::from("org", "digid", "digid")
        .map(|dirs| dirs.data_dir().join("store"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/digid/store"))
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
