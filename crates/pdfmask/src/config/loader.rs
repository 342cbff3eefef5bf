use std::path::{Path, PathBuf};

use log::debug;

use crate::config::schema::CoordinatorConfig;
use crate::error::ConfigError;

/// Environment variable that overrides `service_url` after loading.
pub const SERVICE_URL_ENV: &str = "PDFMASK_SERVICE_URL";

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pdfmask").join("coordinator.json"))
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CoordinatorConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<CoordinatorConfig, ConfigError> {
    let mut config: CoordinatorConfig = serde_json::from_str(content)?;
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Validates `config` and writes it as pretty JSON, creating parent directories.
pub fn save_config<P: AsRef<Path>>(path: P, config: &CoordinatorConfig) -> Result<(), ConfigError> {
    validate_config(config)?;
    let path = path.as_ref();
    let write_error = |source| ConfigError::WriteFile {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(write_error)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(write_error)?;
    debug!("Saved coordinator config to {:?}", path);
    Ok(())
}

/// Loads the config at `path`, falling back to defaults when the file does not exist.
pub fn load_or_default(path: Option<&Path>) -> Result<CoordinatorConfig, ConfigError> {
    match path {
        Some(path) if path.exists() => load_config(path),
        Some(path) => {
            debug!("No coordinator config at {:?}, using defaults", path);
            defaults_with_overrides()
        }
        None => defaults_with_overrides(),
    }
}

fn defaults_with_overrides() -> Result<CoordinatorConfig, ConfigError> {
    let mut config = CoordinatorConfig::default();
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut CoordinatorConfig) {
    if let Ok(url) = std::env::var(SERVICE_URL_ENV) {
        if !url.trim().is_empty() {
            config.service_url = url.trim().to_string();
        }
    }
}

fn validate_config(config: &CoordinatorConfig) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(&config.service_url).map_err(|e| ConfigError::Validation {
        message: format!("Invalid service_url '{}': {}", config.service_url, e),
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation {
            message: format!(
                "service_url must use http or https, got '{}'",
                url.scheme()
            ),
        });
    }

    if let Some(progress_url) = &config.progress_url {
        let url = reqwest::Url::parse(progress_url).map_err(|e| ConfigError::Validation {
            message: format!("Invalid progress_url '{}': {}", progress_url, e),
        })?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ConfigError::Validation {
                message: format!("progress_url must use ws or wss, got '{}'", url.scheme()),
            });
        }
    }

    if config.reconnect_backoff_ms == 0 {
        return Err(ConfigError::Validation {
            message: "reconnect_backoff_ms must be greater than 0".to_string(),
        });
    }

    if config.cancel_ack_timeout_ms == 0 {
        return Err(ConfigError::Validation {
            message: "cancel_ack_timeout_ms must be greater than 0".to_string(),
        });
    }

    if config.event_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "event_capacity must be greater than 0".to_string(),
        });
    }

    if config.archive_name.trim().is_empty()
        || config.archive_name.contains('/')
        || config.archive_name.contains('\\')
    {
        return Err(ConfigError::Validation {
            message: format!("Invalid archive_name '{}'", config.archive_name),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_object_uses_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.reconnect_backoff_ms, 3000);
        assert_eq!(config.reset_delay_ms, 1500);
        assert_eq!(config.archive_name, "redacted_documents.zip");
    }

    #[test]
    fn test_load_overrides_fields() {
        let config = load_config_from_str(
            r#"{
                "service_url": "http://localhost:9100",
                "reconnect_backoff_ms": 500,
                "cancel_ack_timeout_ms": 2000
            }"#,
        )
        .unwrap();

        assert_eq!(config.reconnect_backoff_ms, 500);
        assert_eq!(config.cancel_ack_timeout_ms, 2000);
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_rejects_non_http_service_url() {
        let result = load_config_from_str(r#"{"service_url": "ftp://localhost"}"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_rejects_non_ws_progress_url() {
        let result = load_config_from_str(r#"{"progress_url": "http://localhost/ws"}"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_rejects_zero_backoff() {
        let result = load_config_from_str(r#"{"reconnect_backoff_ms": 0}"#);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("reconnect_backoff_ms"));
    }

    #[test]
    fn test_rejects_archive_name_with_separator() {
        let result = load_config_from_str(r#"{"archive_name": "../out.zip"}"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"reset_delay_ms": 10}}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.reset_delay_ms, 10);
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let result = load_config("/nonexistent/pdfmask/coordinator.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_or_default(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.event_capacity, 100);
    }

    #[test]
    fn test_save_then_load_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("coordinator.json");
        let config = CoordinatorConfig {
            reconnect_backoff_ms: 250,
            archive_name: "batch.zip".to_string(),
            ..CoordinatorConfig::default()
        };

        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.reconnect_backoff_ms, 250);
        assert_eq!(loaded.archive_name, "batch.zip");
    }

    #[test]
    fn test_save_config_reports_unwritable_path() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().join("coordinator.json");

        let result = save_config(&path, &CoordinatorConfig::default());

        assert!(matches!(result, Err(ConfigError::WriteFile { .. })));
    }

    #[test]
    fn test_save_config_rejects_invalid_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("coordinator.json");
        let config = CoordinatorConfig {
            event_capacity: 0,
            ..CoordinatorConfig::default()
        };

        let result = save_config(&path, &config);

        assert!(matches!(result, Err(ConfigError::Validation { .. })));
        assert!(!path.exists());
    }
}
