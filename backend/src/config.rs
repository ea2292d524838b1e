use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub preprocessing: PreprocessingConfig,
    pub ranking: RankingConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelBackend {
    Onnx,
    Torch,
}

impl fmt::Display for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelBackend::Onnx => f.write_str("onnx"),
            ModelBackend::Torch => f.write_str("torch"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: ModelBackend,
    pub path: PathBuf,
    pub labels_path: PathBuf,
    /// When false the server starts without a classifier and `/predict`
    /// answers with a model-unavailable error.
    pub required: bool,
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::Onnx,
            path: PathBuf::from("models/plant_disease_model.onnx"),
            labels_path: PathBuf::from("models/class_names.json"),
            required: true,
            intra_threads: 4,
        }
    }
}

/// Numeric scaling applied to the resized 8-bit pixels. Must match the
/// convention the deployed classifier was trained with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationPolicy {
    /// u8 values, [0, 255].
    #[default]
    RawU8,
    /// f32 values, `v / 255`, [0, 1].
    UnitF32,
    /// f32 values, `v / 127.5 - 1`, [-1, 1].
    SymmetricF32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    /// Half-pixel-centre bilinear with OpenCV `INTER_LINEAR` fixed-point rounding.
    #[default]
    Bilinear,
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub resize_filter: ResizeFilter,
    pub normalization: NormalizationPolicy,
}

/// Whether the classifier's last layer already produces probabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputActivation {
    /// Detect from the data: a non-negative vector summing to 1 is used as is.
    #[default]
    Auto,
    Probabilities,
    Logits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub output_activation: OutputActivation,
    pub tolerance: f32,
    pub top_k: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            output_activation: OutputActivation::Auto,
            tolerance: 1e-2,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    #[serde(rename = "memory")]
    Memory,
    #[serde(rename = "dynamodb")]
    DynamoDb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub users_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            users_table: "smart-leaf-users".to_string(),
        }
    }
}

impl AppConfig {
    /// Reads the YAML file named by `SMART_LEAF_CONFIG` (or the default path),
    /// then applies environment overrides. A missing default file falls back
    /// to built-in defaults; a missing explicitly named file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let (path, explicit) = match env::var("SMART_LEAF_CONFIG") {
            Ok(path) => (PathBuf::from(path), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let mut config = if explicit || path.exists() {
            Self::from_file(&path)?
        } else {
            log::warn!(
                "No config file at {}, using built-in defaults",
                path.display()
            );
            Self::default()
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(config_str)?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { key: "PORT", value: port })?;
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(path) = lookup("LABELS_PATH") {
            self.model.labels_path = PathBuf::from(path);
        }
        if let Some(backend) = lookup("MODEL_BACKEND") {
            self.model.backend = match backend.as_str() {
                "onnx" => ModelBackend::Onnx,
                "torch" => ModelBackend::Torch,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "MODEL_BACKEND",
                        value: backend,
                    });
                }
            };
        }
        if let Some(backend) = lookup("STORE_BACKEND") {
            self.store.backend = match backend.as_str() {
                "memory" => StoreBackend::Memory,
                "dynamodb" => StoreBackend::DynamoDb,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "STORE_BACKEND",
                        value: backend,
                    });
                }
            };
        }
        if let Some(table) = lookup("DYNAMODB_USERS_TABLE") {
            self.store.users_table = table;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ranking.top_k == 0 {
            return Err(ConfigError::Invalid("ranking.top_k must be at least 1".into()));
        }
        if !(self.ranking.tolerance.is_finite() && self.ranking.tolerance >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "ranking.tolerance must be a non-negative number, got {}",
                self.ranking.tolerance
            )));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_upload_bytes must be positive".into(),
            ));
        }
        if self.store.backend == StoreBackend::DynamoDb && self.store.users_table.is_empty() {
            return Err(ConfigError::Invalid("store.users_table is empty".into()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
