//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{Config, WORKER_PLACEHOLDER};

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

    /// Turn the first error, if any, into a `ConfigError`.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(ConfigError::InvalidValue {
                field: err.path,
                message: err.message,
            }),
            None => Ok(self.warnings),
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

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_daemon(config, &mut result);
        Self::validate_log(config, &mut result);

        result
    }

    fn validate_daemon(config: &Config, result: &mut ValidationResult) {
        let daemon = &config.daemon;

        if daemon.cleanup_iterations == 0 {
            result.add_error(ValidationError::new(
                "daemon.cleanup_iterations",
                "cleanup_iterations must be greater than 0",
            ));
        }

        if daemon.worker.trim().is_empty() {
            result.add_error(ValidationError::new(
                "daemon.worker",
                "Worker id cannot be empty",
            ));
        }

        if let Some(template) = daemon.pid_template() {
            if !template.contains(WORKER_PLACEHOLDER) {
                result.add_warning(ValidationWarning::new(
                    "daemon.pid",
                    format!(
                        "pid path has no {} placeholder; workers with different ids will share one lock",
                        WORKER_PLACEHOLDER
                    ),
                ));
            }
        }

        if daemon.sleep_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "daemon.sleep_ms",
                "sleep_ms is 0, the loop will spin without pausing",
            ));
        }
    }

    fn validate_log(config: &Config, result: &mut ValidationResult) {
        if config.log.level.trim().is_empty() {
            result.add_error(ValidationError::new("log.level", "Log level cannot be empty"));
        }

        if config.log.max_files == 0 {
            result.add_error(ValidationError::new(
                "log.max_files",
                "max_files must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
