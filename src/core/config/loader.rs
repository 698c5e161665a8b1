use super::{default_config_path, ConverterConfig, ConfigValidator};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;
use tracing::{debug, warn};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config with the usual precedence
    ///
    /// Defaults, then `explicit` (or cwl2nf.toml in `workdir` when present), then environment
    /// overrides. The result is validated before it is returned.
    pub fn load(explicit: Option<&Path>, workdir: &Path) -> Result<ConverterConfig, AppError> {
        let config_file = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(AppError::new(
                        ErrorCategory::ConfigError,
                        format!("Config file {} does not exist", path.display()),
                    ));
                }
                Self::load_from_file(path)?
            }
            None => Self::load_from_file(&workdir.join(default_config_path()))?,
        };

        let mut config = config_file.unwrap_or_default();

        // Apply environment variable overrides
        Self::apply_env_overrides(&mut config);

        Self::validate_config(&config)?;
        config.load_template()?;
        debug!(
            capabilities = config.capabilities.len(),
            rewrites = config.registry_rewrites.len(),
            executor = %config.platform.executor,
            flavor = %config.platform.flavor,
            "loaded converter config"
        );
        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<ConverterConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: ConverterConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_file(path)
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides to the configuration
    /// Environment variables take precedence over config file values
    pub fn apply_env_overrides(config: &mut ConverterConfig) {
        if let Ok(executor) = env::var("CWL2NF_EXECUTOR") {
            config.platform.executor = executor;
        }

        if let Ok(queue) = env::var("CWL2NF_QUEUE") {
            config.platform.queue = Some(queue);
        }

        if let Ok(region) = env::var("CWL2NF_REGION") {
            config.platform.region = Some(region);
        }

        if let Ok(registry) = env::var("CWL2NF_ARTIFACT_REGISTRY") {
            config.artifact_registry = Some(registry);
        }

        if let Ok(container) = env::var("CWL2NF_DEFAULT_CONTAINER") {
            config.default_container = container;
        }

        if let Ok(flavor) = env::var("CWL2NF_PLATFORM_FLAVOR") {
            match flavor.parse() {
                Ok(flavor) => config.platform.flavor = flavor,
                Err(e) => warn!("ignoring CWL2NF_PLATFORM_FLAVOR: {}", e),
            }
        }

        if let Ok(instance_type) = env::var("CWL2NF_INSTANCE_TYPE") {
            config.platform.instance_type = Some(instance_type);
        }

        if let Ok(max_retries) = env::var("CWL2NF_MAX_RETRIES") {
            if let Ok(max_retries) = max_retries.parse::<u32>() {
                config.platform.max_retries = max_retries;
            }
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "CWL2NF_EXECUTOR - Override the Nextflow executor (default: awsbatch)",
            "CWL2NF_QUEUE - Override the batch job queue",
            "CWL2NF_REGION - Override the platform region",
            "CWL2NF_ARTIFACT_REGISTRY - Registry to re-tag container images under",
            "CWL2NF_DEFAULT_CONTAINER - Override the default container (default: public.ecr.aws/docker/library/ubuntu:22.04)",
            "CWL2NF_MAX_RETRIES - Override the retry count (default: 3)",
            "CWL2NF_PLATFORM_FLAVOR - batch or healthomics (default: batch)",
            "CWL2NF_INSTANCE_TYPE - Pin every step to one capability entry",
            "CWL2NF_LOG_LEVEL - Override the default log level",
            "CWL2NF_LOG_DIR - Directory for the log file",
        ]
    }

    /// Validate configuration values
    pub fn validate_config(config: &ConverterConfig) -> Result<(), AppError> {
        ConfigValidator::validate(config)
    }
}
