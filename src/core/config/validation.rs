use super::ConverterConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the capability table and presets
    ///
    /// The table must be non-empty with at least one cpu per entry and non-decreasing in
    /// both cpus and memory, so that a larger request never maps to a smaller shape.
    pub fn validate(config: &ConverterConfig) -> Result<(), AppError> {
        if config.capabilities.is_empty() {
            return Err(invalid("capabilities", "capability table cannot be empty"));
        }

        for (index, entry) in config.capabilities.iter().enumerate() {
            if entry.cpus == 0 {
                return Err(invalid(
                    format!("capabilities[{}].cpus", index),
                    format!("capability '{}' must have at least 1 cpu", entry.label),
                ));
            }
            if index == 0 {
                continue;
            }
            let previous = &config.capabilities[index - 1];
            if entry.cpus < previous.cpus || entry.memory < previous.memory {
                return Err(invalid(
                    format!("capabilities[{}]", index),
                    format!(
                        "capability table must be ordered ascending: '{}' is smaller than '{}'",
                        entry, previous
                    ),
                ));
            }
        }

        if config.default_shape.cpus == 0 {
            return Err(invalid("default_shape.cpus", "default shape must have at least 1 cpu"));
        }

        if config.default_container.trim().is_empty() {
            return Err(invalid("default_container", "default_container cannot be empty"));
        }

        for (index, rewrite) in config.registry_rewrites.iter().enumerate() {
            if rewrite.source_prefix.is_empty() {
                return Err(invalid(
                    format!("registry_rewrites[{}].source_prefix", index),
                    "registry rewrite source_prefix cannot be empty",
                ));
            }
        }

        for (name, preset) in &config.profiles {
            if preset.cpus == 0 {
                return Err(invalid(
                    format!("profiles.{}.cpus", name),
                    format!("profile '{}' must have at least 1 cpu", name),
                ));
            }
        }

        if config.platform.executor.trim().is_empty() {
            return Err(invalid("platform.executor", "platform.executor cannot be empty"));
        }

        if let Some(instance_type) = &config.platform.instance_type {
            if config.pinned_capability().is_none() {
                return Err(invalid(
                    "platform.instance_type",
                    format!(
                        "instance type '{}' matches no capability label or instance_class",
                        instance_type
                    ),
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ConfigError, message).with_field(field)
}
