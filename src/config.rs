use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "plagascan.db";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8501";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_ASSETS_DIR: &str = "assets";
const DEFAULT_MODEL_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.2;
const DEFAULT_CLASS_NAMES: &[&str] = &["tuta", "bactericera"];
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 20;
const DEFAULT_INFERENCE_BUDGET_SECS: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    db_path: Option<String>,
    listen_addr: Option<String>,
    upload_dir: Option<PathBuf>,
    assets_dir: Option<PathBuf>,
    model: Option<ModelConfigFile>,
    smtp: Option<SmtpConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    class_names: Option<Vec<String>>,
    inference_budget_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SmtpConfigFile {
    host: Option<String>,
    port: Option<u16>,
    sender: Option<String>,
    recipient: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub listen_addr: String,
    pub upload_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub model: ModelSettings,
    pub smtp: SmtpSettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub class_names: Vec<String>,
    pub inference_budget: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: None,
            input_size: DEFAULT_MODEL_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            class_names: DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
            inference_budget: Duration::from_secs(DEFAULT_INFERENCE_BUDGET_SECS),
        }
    }
}

/// Mail submission settings. Username and password are sourced from the
/// environment only (`PLAGASCAN_SMTP_USERNAME` / `PLAGASCAN_SMTP_PASSWORD`);
/// they are never read from the config file.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PLAGASCAN_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let model_file = file.model.unwrap_or_default();
        let model_defaults = ModelSettings::default();
        let model = ModelSettings {
            path: model_file.path,
            input_size: model_file.input_size.unwrap_or(model_defaults.input_size),
            confidence_threshold: model_file
                .confidence_threshold
                .unwrap_or(model_defaults.confidence_threshold),
            class_names: model_file.class_names.unwrap_or(model_defaults.class_names),
            inference_budget: model_file
                .inference_budget_secs
                .map(Duration::from_secs)
                .unwrap_or(model_defaults.inference_budget),
        };
        let smtp_file = file.smtp.unwrap_or_default();
        let smtp = SmtpSettings {
            host: smtp_file
                .host
                .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            port: smtp_file.port.unwrap_or(DEFAULT_SMTP_PORT),
            sender: smtp_file.sender,
            recipient: smtp_file.recipient,
            username: None,
            password: None,
            timeout: Duration::from_secs(
                smtp_file.timeout_secs.unwrap_or(DEFAULT_SMTP_TIMEOUT_SECS),
            ),
        };
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            listen_addr: file
                .listen_addr
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            upload_dir: file
                .upload_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            assets_dir: file
                .assets_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR)),
            model,
            smtp,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("PLAGASCAN_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(addr) = std::env::var("PLAGASCAN_LISTEN_ADDR") {
            if !addr.trim().is_empty() {
                self.listen_addr = addr;
            }
        }
        if let Ok(dir) = std::env::var("PLAGASCAN_UPLOAD_DIR") {
            if !dir.trim().is_empty() {
                self.upload_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var("PLAGASCAN_ASSETS_DIR") {
            if !dir.trim().is_empty() {
                self.assets_dir = PathBuf::from(dir);
            }
        }
        if let Ok(path) = std::env::var("PLAGASCAN_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = Some(PathBuf::from(path));
            }
        }
        if let Ok(threshold) = std::env::var("PLAGASCAN_CONFIDENCE_THRESHOLD") {
            let parsed: f32 = threshold.parse().map_err(|_| {
                anyhow!("PLAGASCAN_CONFIDENCE_THRESHOLD must be a decimal in (0, 1]")
            })?;
            self.model.confidence_threshold = parsed;
        }
        if let Ok(host) = std::env::var("PLAGASCAN_SMTP_HOST") {
            if !host.trim().is_empty() {
                self.smtp.host = host;
            }
        }
        if let Ok(sender) = std::env::var("PLAGASCAN_SMTP_SENDER") {
            if !sender.trim().is_empty() {
                self.smtp.sender = Some(sender);
            }
        }
        if let Ok(recipient) = std::env::var("PLAGASCAN_SMTP_RECIPIENT") {
            if !recipient.trim().is_empty() {
                self.smtp.recipient = Some(recipient);
            }
        }
        if let Ok(username) = std::env::var("PLAGASCAN_SMTP_USERNAME") {
            if !username.trim().is_empty() {
                self.smtp.username = Some(username);
            }
        }
        if let Ok(password) = std::env::var("PLAGASCAN_SMTP_PASSWORD") {
            if !password.is_empty() {
                self.smtp.password = Some(password);
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.model.input_size == 0 {
            return Err(anyhow!("model input_size must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.model.confidence_threshold)
            || self.model.confidence_threshold == 0.0
        {
            return Err(anyhow!("confidence_threshold must be in (0, 1]"));
        }
        if self.model.class_names.is_empty() {
            return Err(anyhow!("at least one class name is required"));
        }
        for name in &mut self.model.class_names {
            let trimmed = name.trim().to_lowercase();
            if trimmed.is_empty() {
                return Err(anyhow!("class names must not be empty"));
            }
            *name = trimmed;
        }
        if self.smtp.timeout.as_secs() == 0 {
            return Err(anyhow!("smtp timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
