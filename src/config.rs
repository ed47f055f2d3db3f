use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::{Result, TtError};

pub const DEFAULT_CONFIG_FILE: &str = "tt-tool-config.json";

fn default_source_language() -> String {
    "English".to_string()
}

fn default_target_language() -> String {
    "German".to_string()
}

fn default_transcription_language() -> String {
    "English".to_string()
}

/// Platform/acceleration variant of the configured transcriber build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Architecture {
    #[serde(rename = "win-x64-gpu")]
    WinX64Gpu,
    #[serde(rename = "win-x64")]
    WinX64,
    #[serde(rename = "darwin-arm64")]
    DarwinArm64,
    #[serde(rename = "darwin-x64")]
    DarwinX64,
    #[serde(rename = "linux-x64")]
    LinuxX64,
    #[serde(rename = "none")]
    None,
}

impl Architecture {
    pub const ALL: [Architecture; 6] = [
        Architecture::WinX64Gpu,
        Architecture::WinX64,
        Architecture::DarwinArm64,
        Architecture::DarwinX64,
        Architecture::LinuxX64,
        Architecture::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WinX64Gpu => "win-x64-gpu",
            Self::WinX64 => "win-x64",
            Self::DarwinArm64 => "darwin-arm64",
            Self::DarwinX64 => "darwin-x64",
            Self::LinuxX64 => "linux-x64",
            Self::None => "none",
        }
    }

    /// Whether a build of this variant can run on the given host
    pub fn is_compatible_with(&self, host: &HostPlatform) -> bool {
        match host.os {
            HostOs::Windows => matches!(self, Self::WinX64Gpu | Self::WinX64),
            HostOs::MacOs => matches!(self, Self::DarwinArm64 | Self::DarwinX64),
            HostOs::Linux => matches!(self, Self::LinuxX64),
            HostOs::Other => false,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = TtError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|arch| arch.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| {
                TtError::Config(format!(
                    "Invalid architecture '{}'. Valid values: win-x64-gpu, win-x64, darwin-arm64, darwin-x64, linux-x64",
                    s
                ))
            })
    }
}

// Unknown or empty tags load as `None` and get reconciled afterwards
impl<'de> Deserialize<'de> for Architecture {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .and_then(|tag| tag.parse().ok())
            .unwrap_or(Architecture::None))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Windows,
    MacOs,
    Linux,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: HostOs,
    pub arm64: bool,
}

impl HostPlatform {
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "windows" => HostOs::Windows,
            "macos" => HostOs::MacOs,
            "linux" => HostOs::Linux,
            _ => HostOs::Other,
        };
        Self {
            os,
            arm64: std::env::consts::ARCH == "aarch64",
        }
    }

    /// Architecture selected when nothing compatible is configured
    pub fn default_architecture(&self) -> Architecture {
        match self.os {
            HostOs::Windows => Architecture::WinX64Gpu,
            HostOs::MacOs if self.arm64 => Architecture::DarwinArm64,
            HostOs::MacOs => Architecture::DarwinX64,
            HostOs::Linux => Architecture::LinuxX64,
            HostOs::Other => Architecture::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Path to the transcriber executable (whisper.cpp `main`/`whisper-cli`)
    #[serde(default, alias = "whisperCLIPath")]
    pub transcriber_executable_path: String,
    #[serde(rename = "transcriberArchitectureTag", default = "unset_architecture", alias = "whisperCLIArch")]
    pub architecture: Architecture,
    #[serde(default, alias = "deeplAPIKey")]
    pub translation_api_key: String,
    #[serde(default = "default_source_language", alias = "lastUsedDeepLSourceLang")]
    pub last_used_source_language: String,
    #[serde(default = "default_target_language", alias = "lastUsedDeepLTargetLang")]
    pub last_used_target_language: String,
    #[serde(default = "default_transcription_language", alias = "lastUsedWhisperLanguage")]
    pub last_used_transcription_language: String,
}

fn unset_architecture() -> Architecture {
    Architecture::None
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            transcriber_executable_path: String::new(),
            architecture: HostPlatform::current().default_architecture(),
            translation_api_key: String::new(),
            last_used_source_language: default_source_language(),
            last_used_target_language: default_target_language(),
            last_used_transcription_language: default_transcription_language(),
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TtError::Config(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| TtError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| TtError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TtError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Replace an architecture the host cannot run. Returns true if changed.
    pub fn reconcile_architecture(&mut self, host: &HostPlatform) -> bool {
        if self.architecture.is_compatible_with(host) {
            return false;
        }
        let fallback = host.default_architecture();
        if fallback == self.architecture {
            return false;
        }
        warn!(
            "Transcriber architecture '{}' does not match this system, using '{}'",
            self.architecture, fallback
        );
        self.architecture = fallback;
        true
    }

    pub fn executable_path(&self) -> Option<PathBuf> {
        let path = self.transcriber_executable_path.trim();
        if path.is_empty() {
            None
        } else {
            Some(PathBuf::from(path))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    TranscriberExecutablePath,
    TranscriberArchitectureTag,
    TranslationApiKey,
    LastUsedSourceLanguage,
    LastUsedTargetLanguage,
    LastUsedTranscriptionLanguage,
}

/// Key-value access to persisted settings
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: ConfigKey) -> Option<String>;

    fn set(&mut self, key: ConfigKey, value: &str) -> Result<()>;

    fn save(&self) -> Result<()>;

    fn snapshot(&self) -> AppConfig;
}

/// Settings kept in a JSON file
pub struct JsonConfigStore {
    path: PathBuf,
    config: AppConfig,
}

impl JsonConfigStore {
    /// Load the file at `path`, falling back to defaults when it does not exist.
    /// An architecture the host cannot run is replaced and written back.
    pub fn load<P: AsRef<Path>>(path: P, host: &HostPlatform) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            let config = AppConfig {
                architecture: host.default_architecture(),
                ..AppConfig::default()
            };
            return Ok(Self { path, config });
        }

        let mut config = AppConfig::from_file(&path)?;
        debug!("Loaded configuration from {}", path.display());

        let changed = config.reconcile_architecture(host);
        let store = Self { path, config };
        if changed {
            store.save()?;
        }
        Ok(store)
    }

    pub fn in_memory(path: PathBuf, config: AppConfig) -> Self {
        Self { path, config }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save triggered by the user. The executable path must exist, otherwise
    /// it is cleared and nothing is written.
    pub fn save_checked(&mut self) -> Result<()> {
        let exists = self
            .config
            .executable_path()
            .map(|path| path.exists())
            .unwrap_or(false);

        if !exists {
            self.config.transcriber_executable_path.clear();
            return Err(TtError::Config(
                "Transcriber executable path doesn't exist. Select a valid path".to_string(),
            ));
        }

        self.save()?;
        info!("Configuration file {} updated", self.path.display());
        Ok(())
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self, key: ConfigKey) -> Option<String> {
        let value = match key {
            ConfigKey::TranscriberExecutablePath => self.config.transcriber_executable_path.clone(),
            ConfigKey::TranscriberArchitectureTag => self.config.architecture.to_string(),
            ConfigKey::TranslationApiKey => self.config.translation_api_key.clone(),
            ConfigKey::LastUsedSourceLanguage => self.config.last_used_source_language.clone(),
            ConfigKey::LastUsedTargetLanguage => self.config.last_used_target_language.clone(),
            ConfigKey::LastUsedTranscriptionLanguage => {
                self.config.last_used_transcription_language.clone()
            }
        };
        if value.is_empty() { None } else { Some(value) }
    }

    fn set(&mut self, key: ConfigKey, value: &str) -> Result<()> {
        match key {
            ConfigKey::TranscriberExecutablePath => {
                self.config.transcriber_executable_path = value.trim().to_string()
            }
            ConfigKey::TranscriberArchitectureTag => self.config.architecture = value.parse()?,
            ConfigKey::TranslationApiKey => self.config.translation_api_key = value.trim().to_string(),
            ConfigKey::LastUsedSourceLanguage => self.config.last_used_source_language = value.to_string(),
            ConfigKey::LastUsedTargetLanguage => self.config.last_used_target_language = value.to_string(),
            ConfigKey::LastUsedTranscriptionLanguage => {
                self.config.last_used_transcription_language = value.to_string()
            }
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        self.config.save_to_file(&self.path)
    }

    fn snapshot(&self) -> AppConfig {
        self.config.clone()
    }
}
