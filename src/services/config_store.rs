// Configuration Storage Service
// Handles config file read/write, version backup and model profile settings

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::ModelRole;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_STANDARD_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_TUNED_MODEL: &str = "tunedModels/phishingdetectionlabeled-l90v9zunmfix";

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
const MAX_BACKUPS: usize = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub version: String,
    pub proxy: Option<ProxyConfig>,
    /// Transport-level HTTP timeout. `None` leaves timeouts to the caller.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    #[serde(default)]
    pub models: ModelProfiles,
    #[serde(default)]
    pub api_keys: ApiKeys,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            proxy: None,
            request_timeout_secs: None,
            ensemble: EnsembleConfig::default(),
            models: ModelProfiles::default(),
            api_keys: ApiKeys::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ProxyConfig {
    /// Proxy URL to route API traffic through, if enabled.
    pub fn active_url(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.https
            .as_deref()
            .or(self.http.as_deref())
            .filter(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleConfig {
    #[serde(default = "default_min_confidence")]
    pub minimum_confidence_threshold: f64,
    #[serde(default = "default_cross_validation")]
    pub cross_validation_threshold: f64,
    #[serde(default)]
    pub weights: EnsembleWeights,
    /// Accept a verdict from one model when the other fails to answer.
    #[serde(default)]
    pub single_model_fallback: bool,
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            minimum_confidence_threshold: default_min_confidence(),
            cross_validation_threshold: default_cross_validation(),
            weights: EnsembleWeights::default(),
            single_model_fallback: false,
            min_text_chars: default_min_text_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleWeights {
    pub standard_model: f64,
    pub tuned_model: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            standard_model: 0.4,
            tuned_model: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelProfile {
    pub model_id: String,
    #[serde(default)]
    pub base_url: Option<String>,
    pub generation: GenerationParams,
}

impl ModelProfile {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(DEFAULT_API_BASE_URL)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelProfiles {
    pub standard: ModelProfile,
    pub tuned: ModelProfile,
}

impl Default for ModelProfiles {
    fn default() -> Self {
        Self {
            standard: ModelProfile {
                model_id: DEFAULT_STANDARD_MODEL.to_string(),
                base_url: None,
                generation: GenerationParams {
                    temperature: 0.3,
                    top_k: 50,
                    top_p: 0.85,
                    max_output_tokens: 1024,
                },
            },
            tuned: ModelProfile {
                model_id: DEFAULT_TUNED_MODEL.to_string(),
                base_url: None,
                generation: GenerationParams {
                    temperature: 0.25,
                    top_k: 45,
                    top_p: 0.9,
                    max_output_tokens: 1024,
                },
            },
        }
    }
}

impl ModelProfiles {
    pub fn get(&self, role: ModelRole) -> &ModelProfile {
        match role {
            ModelRole::Standard => &self.standard,
            ModelRole::Tuned => &self.tuned,
        }
    }

    pub fn get_mut(&mut self, role: ModelRole) -> &mut ModelProfile {
        match role {
            ModelRole::Standard => &mut self.standard,
            ModelRole::Tuned => &mut self.tuned,
        }
    }
}

/// One credential per model identity. Never filled from a compiled-in value.
#[derive(Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuned: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |k: &Option<String>| k.as_ref().map(|_| "<redacted>");
        f.debug_struct("ApiKeys")
            .field("standard", &mask(&self.standard))
            .field("tuned", &mask(&self.tuned))
            .finish()
    }
}

impl ApiKeys {
    pub fn get(&self, role: ModelRole) -> Option<&str> {
        let key = match role {
            ModelRole::Standard => self.standard.as_deref(),
            ModelRole::Tuned => self.tuned.as_deref(),
        };
        key.map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn set(&mut self, role: ModelRole, key: Option<String>) {
        match role {
            ModelRole::Standard => self.standard = key,
            ModelRole::Tuned => self.tuned = key,
        }
    }
}

fn default_min_confidence() -> f64 { 0.75 }
fn default_cross_validation() -> f64 { 0.6 }
fn default_min_text_chars() -> usize { 5 }

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.ensemble;
        for (name, value) in [
            ("minimumConfidenceThreshold", e.minimum_confidence_threshold),
            ("crossValidationThreshold", e.cross_validation_threshold),
            ("weights.standardModel", e.weights.standard_model),
            ("weights.tunedModel", e.weights.tuned_model),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        let sum = e.weights.standard_model + e.weights.tuned_model;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::Invalid(format!(
                "ensemble weights must sum to 1, got {}",
                sum
            )));
        }

        for role in [ModelRole::Standard, ModelRole::Tuned] {
            if self.models.get(role).model_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} model id is empty", role)));
            }
        }

        Ok(())
    }

    /// Fill credentials and endpoint from the environment.
    /// Used by front ends; the classifier itself only reads the config it is given.
    pub fn apply_env_overrides(&mut self) {
        let shared = env_value("GEMINI_API_KEY");
        for (role, var) in [
            (ModelRole::Standard, "SCAMCHECK_STANDARD_API_KEY"),
            (ModelRole::Tuned, "SCAMCHECK_TUNED_API_KEY"),
        ] {
            if let Some(key) = env_value(var).or_else(|| shared.clone()) {
                self.api_keys.set(role, Some(key));
            }
        }

        if let Some(url) = env_value("SCAMCHECK_API_URL") {
            self.models.standard.base_url = Some(url.clone());
            self.models.tuned.base_url = Some(url);
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Store backed by an explicit config file path.
    pub fn at_file(config_file: PathBuf) -> Self {
        let config_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("scamChecker"))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir).map_err(io_err(&self.config_dir))
    }

    /// Load configuration from file
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file).map_err(io_err(&self.config_file))?;
        let config: AppConfig = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.ensure_dir()?;

        // Create backup if file exists
        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config).map_err(ConfigError::Serialize)?;
        fs::write(&self.config_file, content).map_err(io_err(&self.config_file))
    }

    fn backup_dir(&self) -> PathBuf {
        self.config_dir.join("backups")
    }

    /// Create a backup of current config
    fn create_backup(&self) -> Result<(), ConfigError> {
        let backup_dir = self.backup_dir();
        fs::create_dir_all(&backup_dir).map_err(io_err(&backup_dir))?;

        // Sub-second stamp keeps rapid successive saves from overwriting each other.
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file).map_err(io_err(&backup_file))?;

        self.cleanup_old_backups(&backup_dir, MAX_BACKUPS)
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), ConfigError> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(io_err(backup_dir))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // File names embed the timestamp, so name order is age order.
        entries.sort_by_key(|e| e.file_name());

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }

    /// Get a model's API key from config file
    pub fn get_api_key(&self, role: ModelRole) -> Result<Option<String>, ConfigError> {
        let config = self.load()?;
        Ok(config.api_keys.get(role).map(str::to_string))
    }

    /// Store a model's API key in config file
    pub fn set_api_key(&self, role: ModelRole, key: &str) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.set(role, Some(key.trim().to_string()));
        self.save(&config)
    }

    /// Delete a model's API key from config file
    pub fn delete_api_key(&self, role: ModelRole) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        config.api_keys.set(role, None);
        self.save(&config)
    }

    /// Replace the model identity and generation parameters for a role
    pub fn set_model_profile(&self, role: ModelRole, profile: ModelProfile) -> Result<(), ConfigError> {
        let mut config = self.load()?;
        *config.models.get_mut(role) = profile;
        self.save(&config)
    }
}
