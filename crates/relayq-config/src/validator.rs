//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{AppConfig, StoreBackend, SweepConfig};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error, if any, into a [`ConfigError`].
    pub fn into_result(self) -> Result<Self, ConfigError> {
        match self.errors.first() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path.clone(),
                message: error.message.clone(),
            }),
            None => Ok(self),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &AppConfig) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_queue(config, &mut result);
        Self::validate_sweep("queue.deferred", &config.queue.deferred, &mut result);
        Self::validate_sweep("queue.recurring", &config.queue.recurring, &mut result);
        Self::validate_listener(config, &mut result);
        Self::validate_store(config, &mut result);
        Self::validate_storage(config, &mut result);
        Self::validate_logging(config, &mut result);

        Ok(result)
    }

    fn validate_queue(config: &AppConfig, result: &mut ValidationResult) {
        let queue = &config.queue;
        for (field, message) in queue.problems() {
            result.add_error(ValidationError::new(format!("queue.{}", field), message));
        }

        if !queue.delimiter.is_empty() && queue.prefix.ends_with(queue.delimiter.as_str()) {
            result.add_warning(ValidationWarning::new(
                "queue.prefix",
                "prefix ends with the delimiter, keys will contain it twice",
            ));
        }
    }

    fn validate_sweep(path: &str, sweep: &SweepConfig, result: &mut ValidationResult) {
        if !sweep.enabled {
            return;
        }
        if let Some(key) = &sweep.key {
            if key.is_empty() {
                result.add_error(ValidationError::new(format!("{}.key", path), "cannot be empty"));
            }
        }
    }

    fn validate_listener(config: &AppConfig, result: &mut ValidationResult) {
        let listener = &config.queue.listener;
        if listener.max_out > 1000 {
            result.add_warning(ValidationWarning::new(
                "queue.listener.max_out",
                "max_out is very high (>1000), deliveries may exhaust resources",
            ));
        }
        if listener.poll_timeout_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "queue.listener.poll_timeout_ms",
                "poll_timeout_ms of 0 is raised to 1ms",
            ));
        }
    }

    fn validate_store(config: &AppConfig, result: &mut ValidationResult) {
        match (config.store.backend, &config.store.url) {
            (StoreBackend::Redis, None) => {
                result.add_error(ValidationError::new(
                    "store.url",
                    "url is required for the redis backend",
                ));
            }
            (StoreBackend::Redis, Some(url)) => {
                if !url.starts_with("redis://")
                    && !url.starts_with("rediss://")
                    && !url.starts_with("unix://")
                {
                    result.add_error(ValidationError::new(
                        "store.url",
                        "url must use the redis://, rediss:// or unix:// scheme",
                    ));
                }
            }
            (StoreBackend::Memory, Some(_)) => {
                result.add_warning(ValidationWarning::new(
                    "store.url",
                    "url is ignored by the memory backend",
                ));
            }
            (StoreBackend::Memory, None) => {}
        }
    }

    fn validate_storage(config: &AppConfig, result: &mut ValidationResult) {
        if let Some(prefix) = &config.storage.prefix {
            if prefix.is_empty() {
                result.add_error(ValidationError::new("storage.prefix", "cannot be empty"));
            }
        }
    }

    fn validate_logging(config: &AppConfig, result: &mut ValidationResult) {
        let level = config.logging.level.trim();
        if level.is_empty() {
            result.add_error(ValidationError::new("logging.level", "cannot be empty"));
        } else if !level.contains('=') && !LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!("unknown log level '{}'", level),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
