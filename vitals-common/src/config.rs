//! Configuration loading and root folder resolution
//!
//! Resolution order for the root folder:
//! 1. Command-line argument (highest priority)
//! 2. `VITALS_ROOT_FOLDER` (or legacy `VITALS_ROOT`) environment variable
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default
//!
//! A missing or unreadable TOML file never stops startup: a warning is
//! logged and compiled defaults are used.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Primary environment variable for the root folder
pub const ROOT_FOLDER_ENV: &str = "VITALS_ROOT_FOLDER";
/// Fallback environment variable for the root folder
pub const ROOT_FOLDER_ENV_ALT: &str = "VITALS_ROOT";
/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "vitals.db";

/// Compiled defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("vitals"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vitals"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("vitals"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vitals"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("vitals"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vitals"))
    } else {
        PathBuf::from("./vitals_data")
    }
}

/// Default TOML path for a module: `<config dir>/vitals/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vitals").join(format!("{}.toml", module_name)))
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml_config(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        for var in [ROOT_FOLDER_ENV, ROOT_FOLDER_ENV_ALT] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    info!(module = %self.module_name, "Root folder from {}: {}", var, path);
                    return PathBuf::from(path);
                }
            }
        }

        if let Some(path) = &self.toml_root {
            info!(module = %self.module_name, "Root folder from TOML config: {}", path.display());
            return path.clone();
        }

        let path = CompiledDefaults::for_current_platform().root_folder;
        info!(module = %self.module_name, "Root folder from compiled default: {}", path.display());
        path
    }
}

/// Prepares the resolved root folder for use
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root folder if missing (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}

/// Longest accepted cooldown, schedule or lookback window (100 years)
pub const MAX_WINDOW_MINUTES: u64 = 100 * 365 * 24 * 60;
/// Longest accepted narrative generation timeout
pub const MAX_NARRATIVE_TIMEOUT_SECONDS: u64 = 3600;

/// TOML configuration file contents
///
/// Every section is optional; missing keys take their compiled default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub schedule: ScheduleConfig,
    pub cooldown: CooldownConfig,
    pub windows: WindowConfig,
    pub workers: WorkerConfig,
    pub narrative: NarrativeConfig,
    pub dispatch: DispatchConfig,
}

fn check_window(field: &str, value: u64, minutes_per_unit: u64) -> Result<()> {
    match value.checked_mul(minutes_per_unit) {
        Some(minutes) if minutes <= MAX_WINDOW_MINUTES => Ok(()),
        _ => Err(Error::Config(format!(
            "{} = {} exceeds {} minutes",
            field, value, MAX_WINDOW_MINUTES
        ))),
    }
}

impl TomlConfig {
    /// Reject durations too large to schedule or subtract from a timestamp
    pub fn validate(&self) -> Result<()> {
        check_window("schedule.periodic_wellness_minutes", self.schedule.periodic_wellness_minutes, 1)?;
        check_window("schedule.daily_wellness_minutes", self.schedule.daily_wellness_minutes, 1)?;
        check_window("schedule.trend_analysis_minutes", self.schedule.trend_analysis_minutes, 1)?;
        check_window("cooldown.window_minutes", self.cooldown.window_minutes, 1)?;
        for (kind, minutes) in &self.cooldown.per_kind {
            check_window(&format!("cooldown.per_kind.{}", kind), *minutes, 1)?;
        }
        check_window("windows.emergency_context_minutes", self.windows.emergency_context_minutes, 1)?;
        check_window("windows.periodic_hours", self.windows.periodic_hours, 60)?;
        check_window("windows.trend_days", self.windows.trend_days, 24 * 60)?;

        if self.narrative.timeout_seconds > MAX_NARRATIVE_TIMEOUT_SECONDS {
            return Err(Error::Config(format!(
                "narrative.timeout_seconds = {} exceeds {}",
                self.narrative.timeout_seconds, MAX_NARRATIVE_TIMEOUT_SECONDS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let defaults = CompiledDefaults::for_current_platform();
        Self {
            level: defaults.log_level,
            file: defaults.log_file,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5780".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
        }
    }
}

/// Cadences of the timer-driven workflows, in minutes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub periodic_wellness_minutes: u64,
    pub daily_wellness_minutes: u64,
    pub trend_analysis_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            periodic_wellness_minutes: 180,
            daily_wellness_minutes: 1440,
            trend_analysis_minutes: 1440,
        }
    }
}

/// Minimum gap between two notifications of the same kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub window_minutes: u64,
    /// Per-kind overrides keyed by kind name (`emergency_sms = 45`)
    pub per_kind: BTreeMap<String, u64>,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            window_minutes: 30,
            per_kind: BTreeMap::new(),
        }
    }
}

/// Lookback windows used by the workflows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub emergency_context_minutes: u64,
    pub periodic_hours: u64,
    pub trend_days: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            emergency_context_minutes: 5,
            periodic_hours: 3,
            trend_days: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub pool_size: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            queue_capacity: 64,
        }
    }
}

/// OpenAI-compatible chat completion endpoint used for narratives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434/v1/chat/completions".to_string(),
            model: "llama3.1".to_string(),
            api_key: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchBackend {
    Log,
    Twilio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub backend: DispatchBackend,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    /// TwiML URL for voice calls; an inline `<Say>` is used when absent
    pub voice_url: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            backend: DispatchBackend::Log,
            account_sid: None,
            auth_token: None,
            from_number: None,
            to_number: None,
            voice_url: None,
        }
    }
}

/// Parse and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    config
        .validate()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

/// Load the module's TOML config, falling back to defaults with a warning
///
/// `explicit` (from the command line) is used instead of the default path
/// when given.
pub fn load_toml_config_or_default(module_name: &str, explicit: Option<&Path>) -> TomlConfig {
    let path = match explicit.map(Path::to_path_buf).or_else(|| default_config_path(module_name)) {
        Some(path) => path,
        None => {
            warn!("Could not determine config directory; using compiled defaults");
            return TomlConfig::default();
        }
    };

    if !path.exists() {
        warn!("Config file {} not found; using compiled defaults", path.display());
        return TomlConfig::default();
    }

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Ignoring unreadable config file: {}", e);
            TomlConfig::default()
        }
    }
}

/// Write a TOML config file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Resolve a secret from environment first, then TOML
///
/// Blank values are treated as absent. Warns when both sources are set.
pub fn resolve_secret(env_var: &str, toml_value: Option<&str>) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| !v.trim().is_empty());
    let toml_value = toml_value.filter(|v| !v.trim().is_empty()).map(str::to_string);

    if env_value.is_some() && toml_value.is_some() {
        warn!("{} set in both environment and TOML config; using environment", env_var);
    }

    env_value.or(toml_value)
}
