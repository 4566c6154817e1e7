//! Configuration loading and resolution
//!
//! Every setting resolves in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error. The service logs a warning and starts
//! on compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV: &str = "BIOSYNC_CONFIG";
/// Environment variable overriding the storage root folder
pub const ROOT_FOLDER_ENV: &str = "BIOSYNC_ROOT_FOLDER";
/// Environment variable overriding the HTTP bind address
pub const BIND_ENV: &str = "BIOSYNC_BIND";

/// Default HTTP port for biosync-jobs
pub const DEFAULT_PORT: u16 = 5740;

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[engine]` section of the TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineToml {
    pub program: Option<String>,
    pub analysis_args: Option<Vec<String>>,
    pub correlation_args: Option<Vec<String>>,
    pub working_dir: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
    pub max_concurrent: Option<usize>,
}

/// On-disk TOML configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub allowed_extensions: Option<Vec<String>>,
    pub max_upload_bytes: Option<usize>,
    pub engine: EngineToml,
    pub logging: LoggingConfig,
}

/// Values compiled into the binary
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind_address: String,
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: usize,
    pub engine_program: String,
    pub analysis_args: Vec<String>,
    pub correlation_args: Vec<String>,
    pub timeout_seconds: u64,
    pub max_concurrent: usize,
    pub log_level: String,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was built for
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind_address: format!("127.0.0.1:{}", DEFAULT_PORT),
            allowed_extensions: vec!["csv".to_string(), "txt".to_string(), "edf".to_string()],
            max_upload_bytes: 100 * 1024 * 1024,
            engine_program: "python3".to_string(),
            analysis_args: vec!["scripts/process_signal.py".to_string()],
            correlation_args: vec!["scripts/correlate_signals.py".to_string()],
            timeout_seconds: 300,
            max_concurrent: 4,
            log_level: "info".to_string(),
        }
    }
}

/// Overrides supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<String>,
}

/// Overrides read from the process environment
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub config_path: Option<PathBuf>,
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<String>,
}

impl EnvOverrides {
    /// Capture BIOSYNC_* variables. Empty values count as unset.
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            config_path: read(CONFIG_ENV).map(PathBuf::from),
            root_folder: read(ROOT_FOLDER_ENV).map(PathBuf::from),
            bind_address: read(BIND_ENV),
        }
    }
}

/// How the external analysis engine is launched
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Executable, e.g. `python3`
    pub program: String,
    /// Leading arguments for single-signal analysis runs
    pub analysis_args: Vec<String>,
    /// Leading arguments for correlation runs
    pub correlation_args: Vec<String>,
    /// Working directory for the subprocess (inherits ours when None)
    pub working_dir: Option<PathBuf>,
    /// Wall-clock bound per invocation
    pub timeout: Duration,
    /// Maximum engine processes running at once
    pub max_concurrent: usize,
}

/// Fully resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub bind_address: String,
    /// Lowercase file extensions accepted for upload, without the dot
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: usize,
    pub engine: EngineConfig,
    pub log_level: String,
}

impl ServiceConfig {
    /// Resolve configuration from CLI, environment, TOML file and defaults
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let env = EnvOverrides::from_env();
        let config_path = cli
            .config_path
            .clone()
            .or_else(|| env.config_path.clone())
            .or_else(default_config_path);

        let toml_config = match config_path {
            Some(path) => {
                let loaded = load_toml_config(&path)?;
                if loaded.is_some() {
                    info!("Loaded configuration from {}", path.display());
                } else {
                    warn!(
                        "Config file {} not found, using compiled defaults",
                        path.display()
                    );
                }
                loaded
            }
            None => {
                warn!("No config file location available, using compiled defaults");
                None
            }
        };

        Self::from_sources(
            cli,
            &env,
            toml_config.unwrap_or_default(),
            CompiledDefaults::for_current_platform(),
        )
    }

    /// Merge already-collected sources. Pure, so the priority rules are testable
    /// without touching the process environment.
    pub fn from_sources(
        cli: &CliOverrides,
        env: &EnvOverrides,
        toml_config: TomlConfig,
        defaults: CompiledDefaults,
    ) -> Result<Self> {
        let root_folder = cli
            .root_folder
            .clone()
            .or_else(|| env.root_folder.clone())
            .or(toml_config.root_folder)
            .unwrap_or(defaults.root_folder);

        let bind_address = cli
            .bind_address
            .clone()
            .or_else(|| env.bind_address.clone())
            .or(toml_config.bind_address)
            .unwrap_or(defaults.bind_address);

        let allowed_extensions = toml_config
            .allowed_extensions
            .unwrap_or(defaults.allowed_extensions)
            .into_iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        let engine_toml = toml_config.engine;
        let engine = EngineConfig {
            program: engine_toml.program.unwrap_or(defaults.engine_program),
            analysis_args: engine_toml.analysis_args.unwrap_or(defaults.analysis_args),
            correlation_args: engine_toml
                .correlation_args
                .unwrap_or(defaults.correlation_args),
            working_dir: engine_toml.working_dir,
            timeout: Duration::from_secs(
                engine_toml.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            ),
            max_concurrent: engine_toml.max_concurrent.unwrap_or(defaults.max_concurrent),
        };

        let config = Self {
            root_folder,
            bind_address,
            allowed_extensions,
            max_upload_bytes: toml_config
                .max_upload_bytes
                .unwrap_or(defaults.max_upload_bytes),
            engine,
            log_level: Some(toml_config.logging.level)
                .filter(|level| !level.trim().is_empty())
                .unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.engine.program.trim().is_empty() {
            return Err(Error::Config("engine.program must not be empty".to_string()));
        }
        if self.engine.timeout.is_zero() {
            return Err(Error::Config(
                "engine.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.engine.max_concurrent == 0 {
            return Err(Error::Config(
                "engine.max_concurrent must be greater than zero".to_string(),
            ));
        }
        if self.allowed_extensions.is_empty() {
            return Err(Error::Config(
                "allowed_extensions must list at least one extension".to_string(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read a TOML config file. Returns `Ok(None)` when the file does not exist.
pub fn load_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };

    toml::from_str(&content)
        .map(Some)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))
}

/// Platform config file location
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("biosync").join("config.toml"));

    if cfg!(target_os = "linux") {
        // Try ~/.config/biosync/config.toml first, then /etc/biosync/config.toml
        if let Some(path) = &user_config {
            if path.exists() {
                return user_config;
            }
        }
        let system_config = PathBuf::from("/etc/biosync/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    user_config
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("biosync"))
        .unwrap_or_else(|| PathBuf::from("./biosync_data"))
}
