use super::*;

#[test]
fn test_validate_default_config() {
    let config = Config::default();
    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());
}

#[test]
fn test_validate_zero_cleanup_iterations() {
    let mut config = Config::default();
    config.daemon.cleanup_iterations = 0;

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    assert!(result
        .errors
        .iter()
        .any(|e| e.path == "daemon.cleanup_iterations"));
}

#[test]
fn test_validate_empty_worker() {
    let mut config = Config::default();
    config.daemon.worker = " ".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(result.errors.iter().any(|e| e.path == "daemon.worker"));
}

#[test]
fn test_pid_without_placeholder_warns() {
    let mut config = Config::default();
    config.daemon.pid = "/tmp/shared.pid".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "daemon.pid"));
}

#[test]
fn test_disabled_pid_does_not_warn() {
    let mut config = Config::default();
    config.daemon.pid = String::new();

    let result = ConfigValidator::validate(&config);
    assert!(result.warnings.iter().all(|w| w.path != "daemon.pid"));
}

#[test]
fn test_zero_sleep_warns() {
    let mut config = Config::default();
    config.daemon.sleep_ms = 0;

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "daemon.sleep_ms"));
}

#[test]
fn test_validate_log_section() {
    let mut config = Config::default();
    config.log.level = String::new();
    config.log.max_files = 0;

    let result = ConfigValidator::validate(&config);
    assert_eq!(result.errors.len(), 2);
}

#[test]
fn test_into_result_reports_first_error() {
    let mut config = Config::default();
    config.daemon.cleanup_iterations = 0;

    let err = ConfigValidator::validate(&config).into_result().unwrap_err();
    assert!(err.to_string().contains("daemon.cleanup_iterations"));
}

#[test]
fn test_into_result_passes_warnings_through() {
    let mut config = Config::default();
    config.daemon.sleep_ms = 0;

    let warnings = ConfigValidator::validate(&config).into_result().unwrap();
    assert_eq!(warnings.len(), 1);
}
