use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub signing: SigningConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub translation: TranslationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub sqlite_path: PathBuf,

    /// How long a connection waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    Config::data_dir().join("emopic.db")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the object store.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Key prefix under which the thumbnail variant of an object is stored.
    #[serde(default = "default_thumbnail_prefix")]
    pub thumbnail_prefix: String,

    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,

    /// Owner id appended to generated object names.
    #[serde(default = "default_owner_id")]
    pub owner_id: i64,

    /// UTC offset used for the timestamp part of object names.
    #[serde(default = "default_name_offset_minutes")]
    pub name_utc_offset_minutes: i32,
}

fn default_storage_root() -> PathBuf {
    Config::data_dir().join("objects")
}

fn default_thumbnail_prefix() -> String {
    "thumbnail/".to_string()
}

fn default_thumbnail_size() -> u32 {
    256
}

fn default_owner_id() -> i64 {
    1
}

fn default_name_offset_minutes() -> i32 {
    9 * 60 // KST
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            thumbnail_prefix: default_thumbnail_prefix(),
            thumbnail_size: default_thumbnail_size(),
            owner_id: default_owner_id(),
            name_utc_offset_minutes: default_name_offset_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default = "default_signing_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub secret: String,

    /// Validity of an issued URL, in minutes.
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: i64,
}

fn default_signing_base_url() -> String {
    "http://127.0.0.1:8080/objects".to_string()
}

fn default_duration_minutes() -> i64 {
    60 * 24 * 7
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            base_url: default_signing_base_url(),
            secret: String::new(),
            duration_minutes: default_duration_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,
}

fn default_inference_endpoint() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_inference_timeout() -> u64 {
    120
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_inference_endpoint(),
            timeout_secs: default_inference_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranslatorProviderType {
    #[default]
    DeepL,
    Papago,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    #[serde(default)]
    pub provider: TranslatorProviderType,

    /// Overrides the provider's public endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// DeepL auth key or Papago client secret.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Papago client id.
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default = "default_source_lang")]
    pub source_lang: String,

    #[serde(default = "default_target_lang")]
    pub target_lang: String,

    #[serde(default = "default_translation_timeout")]
    pub timeout_secs: u64,
}

fn default_source_lang() -> String {
    "en".to_string()
}

fn default_target_lang() -> String {
    "ko".to_string()
}

fn default_translation_timeout() -> u64 {
    30
}

impl TranslatorConfig {
    fn for_provider(provider: TranslatorProviderType) -> Self {
        Self {
            provider,
            endpoint: None,
            api_key: None,
            client_id: None,
            source_lang: default_source_lang(),
            target_lang: default_target_lang(),
            timeout_secs: default_translation_timeout(),
        }
    }
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self::for_provider(TranslatorProviderType::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Backend for long free-form text (captions).
    #[serde(default = "default_caption_translator")]
    pub caption: TranslatorConfig,

    /// Backend for short category labels.
    #[serde(default = "default_label_translator")]
    pub label: TranslatorConfig,
}

fn default_caption_translator() -> TranslatorConfig {
    TranslatorConfig::for_provider(TranslatorProviderType::DeepL)
}

fn default_label_translator() -> TranslatorConfig {
    TranslatorConfig::for_provider(TranslatorProviderType::Papago)
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            caption: default_caption_translator(),
            label: default_label_translator(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            signing: SigningConfig::default(),
            inference: InferenceConfig::default(),
            translation: TranslationConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults out if no file exists yet.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.signing.duration_minutes <= 0 {
            bail!(
                "signing.duration_minutes must be positive, got {}",
                self.signing.duration_minutes
            );
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("EMOPIC_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emopic")
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emopic")
    }
}
