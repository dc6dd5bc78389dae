//! Agent configuration
//!
//! Command-line arguments layered over the TOML file, plus construction of
//! the configured store, narrator, and dispatch sink.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use vitals_common::config::{
    resolve_secret, DispatchBackend, RootFolderInitializer, RootFolderResolver, StorageBackend,
    TomlConfig,
};
use vitals_common::db::{MemoryStore, SqliteStore, TelemetryStore};

use crate::narrative::{LlmNarrator, NarrativeError, NarrativeGenerator, ScriptedNarrator};
use crate::sink::{DispatchError, DispatchSink, LogSink, TwilioSink};

/// Module name used for the default config path and in logs
pub const MODULE_NAME: &str = "vitals-agent";
/// API key for the narrative endpoint
pub const LLM_API_KEY_ENV: &str = "VITALS_LLM_API_KEY";
/// Twilio auth token
pub const TWILIO_AUTH_TOKEN_ENV: &str = "VITALS_TWILIO_AUTH_TOKEN";

/// Command-line arguments for vitals-agent
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "vitals-agent")]
#[command(about = "Biometric monitoring and alerting agent")]
#[command(version)]
pub struct Args {
    /// TOML config file (defaults to <config dir>/vitals/vitals-agent.toml)
    #[arg(short, long, env = "VITALS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long)]
    pub root_folder: Option<PathBuf>,

    /// Address for the HTTP ingestion surface
    #[arg(short, long, env = "VITALS_BIND")]
    pub bind: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "VITALS_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Keep all telemetry in memory (nothing survives a restart)
    #[arg(long)]
    pub memory_store: bool,
}

/// Fully resolved settings for one process
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// TOML values with command-line overrides applied
    pub config: TomlConfig,
    pub root_folder: PathBuf,
    pub llm_api_key: Option<String>,
    pub twilio_auth_token: Option<String>,
}

impl AgentSettings {
    /// Apply command-line overrides on top of a loaded TOML config
    pub fn resolve(args: &Args, mut config: TomlConfig) -> Self {
        if let Some(bind) = &args.bind {
            config.server.bind = bind.clone();
        }
        if let Some(level) = &args.log_level {
            config.logging.level = level.clone();
        }
        if args.memory_store {
            config.storage.backend = StorageBackend::Memory;
        }

        let root_folder = RootFolderResolver::new(MODULE_NAME)
            .with_cli_arg(args.root_folder.clone())
            .with_toml_config(&config)
            .resolve();

        let llm_api_key = resolve_secret(LLM_API_KEY_ENV, config.narrative.api_key.as_deref());
        let twilio_auth_token =
            resolve_secret(TWILIO_AUTH_TOKEN_ENV, config.dispatch.auth_token.as_deref());

        Self {
            config,
            root_folder,
            llm_api_key,
            twilio_auth_token,
        }
    }

    /// Load the TOML file named by `--config` (or the default path) and resolve
    pub fn load(args: &Args) -> Self {
        let config =
            vitals_common::config::load_toml_config_or_default(MODULE_NAME, args.config.as_deref());
        Self::resolve(args, config)
    }

    pub fn bind(&self) -> &str {
        &self.config.server.bind
    }
}

/// Open the configured telemetry store
pub async fn open_store(
    backend: StorageBackend,
    root_folder: &Path,
) -> vitals_common::Result<Arc<dyn TelemetryStore>> {
    match backend {
        StorageBackend::Memory => {
            warn!("Using in-memory store; telemetry and cooldown history are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Sqlite => {
            let initializer = RootFolderInitializer::new(root_folder.to_path_buf());
            initializer.ensure_directory_exists()?;
            let db_path = initializer.database_path();
            info!("Database: {}", db_path.display());
            Ok(Arc::new(SqliteStore::open(&db_path).await?))
        }
    }
}

/// Build the narrator; a blank endpoint selects offline templated text
pub fn build_narrator(settings: &AgentSettings) -> Result<Arc<dyn NarrativeGenerator>, NarrativeError> {
    let narrative = &settings.config.narrative;
    if narrative.endpoint.trim().is_empty() {
        warn!("No narrative endpoint configured; using offline templated messages");
        return Ok(Arc::new(ScriptedNarrator::new()));
    }

    let narrator = LlmNarrator::new(narrative, settings.llm_api_key.clone())?;
    info!(endpoint = %narrator.endpoint(), model = %narrative.model, "Narrative generator ready");
    Ok(Arc::new(narrator))
}

/// Build the dispatch sink for the configured backend
pub fn build_sink(settings: &AgentSettings) -> Result<Arc<dyn DispatchSink>, DispatchError> {
    match settings.config.dispatch.backend {
        DispatchBackend::Log => {
            info!("Dispatch backend: log only");
            Ok(Arc::new(LogSink))
        }
        DispatchBackend::Twilio => {
            let sink =
                TwilioSink::from_config(&settings.config.dispatch, settings.twilio_auth_token.clone())?;
            info!("Dispatch backend: Twilio");
            Ok(Arc::new(sink))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            LLM_API_KEY_ENV,
            TWILIO_AUTH_TOKEN_ENV,
            vitals_common::config::ROOT_FOLDER_ENV,
            vitals_common::config::ROOT_FOLDER_ENV_ALT,
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_cli_overrides_toml() {
        clear_env();
        let args = Args {
            root_folder: Some(PathBuf::from("/tmp/vitals-cli")),
            bind: Some("0.0.0.0:9000".to_string()),
            log_level: Some("debug".to_string()),
            memory_store: true,
            ..Default::default()
        };
        let mut config = TomlConfig::default();
        config.root_folder = Some(PathBuf::from("/tmp/vitals-toml"));

        let settings = AgentSettings::resolve(&args, config);
        assert_eq!(settings.bind(), "0.0.0.0:9000");
        assert_eq!(settings.config.logging.level, "debug");
        assert_eq!(settings.config.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.root_folder, PathBuf::from("/tmp/vitals-cli"));
    }

    #[test]
    #[serial]
    fn test_secrets_prefer_environment() {
        clear_env();
        std::env::set_var(LLM_API_KEY_ENV, "env-key");
        let mut config = TomlConfig::default();
        config.narrative.api_key = Some("toml-key".to_string());
        config.dispatch.auth_token = Some("toml-token".to_string());

        let settings = AgentSettings::resolve(&Args::default(), config);
        assert_eq!(settings.llm_api_key.as_deref(), Some("env-key"));
        assert_eq!(settings.twilio_auth_token.as_deref(), Some("toml-token"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_blank_endpoint_selects_offline_narrator() {
        clear_env();
        let mut config = TomlConfig::default();
        config.narrative.endpoint = "  ".to_string();
        let settings = AgentSettings::resolve(&Args::default(), config);

        assert_eq!(build_narrator(&settings).unwrap().name(), "scripted");
    }

    #[test]
    #[serial]
    fn test_twilio_without_credentials_is_not_configured() {
        clear_env();
        let mut config = TomlConfig::default();
        config.dispatch.backend = DispatchBackend::Twilio;
        let settings = AgentSettings::resolve(&Args::default(), config);

        assert!(matches!(build_sink(&settings), Err(DispatchError::NotConfigured(_))));
        assert_eq!(
            build_sink(&AgentSettings::resolve(&Args::default(), TomlConfig::default()))
                .unwrap()
                .name(),
            "log"
        );
    }

    #[tokio::test]
    async fn test_open_sqlite_store_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/root");
        let store = open_store(StorageBackend::Sqlite, &root).await.unwrap();

        assert_eq!(store.backend(), "sqlite");
        assert!(root.join(vitals_common::config::DATABASE_FILE).exists());
    }
}
