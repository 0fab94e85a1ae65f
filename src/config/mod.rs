use crate::models::AppConfig;
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Name of the configuration file inside the configuration directory
pub const CONFIG_FILE_NAME: &str = "PoreDispatch.yaml";

/// Prefix for environment variable overrides (`PORE_DISPATCH__POLL_INTERVAL_MS=250`)
pub const ENV_PREFIX: &str = "PORE";

/// Configuration manager for loading and saving the YAML configuration file.
///
/// Values are layered, later sources winning:
/// 1. Built-in defaults
/// 2. `PoreDispatch.yaml` in the configuration directory (optional)
/// 3. `PORE_*` environment variables, with `__` separating nested keys
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing configuration files (e.g., "PoreDispatch Data")
    ///
    /// # Returns
    /// A new ConfigManager instance
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create config directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the layered configuration.
    ///
    /// # Returns
    /// The loaded AppConfig; defaults fill anything the file and environment omit
    ///
    /// # Errors
    /// Fails on unreadable or malformed sources, or on settings the dispatcher
    /// cannot run with (zero poll interval, zero receive bound).
    pub fn load(&self) -> Result<AppConfig> {
        self.load_with_env(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    fn load_with_env(&self, env: config::Environment) -> Result<AppConfig> {
        if self.config_path.exists() {
            tracing::info!("Loading config from {}", self.config_path);
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let settings = config::Config::builder()
            .add_source(
                config::File::new(self.config_path.as_str(), config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        validate(&config)?;
        Ok(config)
    }

    /// Save the configuration file.
    ///
    /// # Arguments
    /// * `config` - The AppConfig to save
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        validate(config)?;

        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the configuration file path.
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.dispatch.poll_interval_ms == 0 {
        bail!("dispatch.poll_interval_ms must be greater than zero");
    }
    if config.dispatch.max_receives_per_tick == 0 {
        bail!("dispatch.max_receives_per_tick must be greater than zero");
    }
    if config
        .worker
        .program
        .as_deref()
        .is_some_and(|p| p.trim().is_empty())
    {
        bail!("worker.program must not be empty when set");
    }
    Ok(())
}
