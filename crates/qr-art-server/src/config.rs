//! Конфигурация сервера
//!
//! Значения по умолчанию -> TOML файл -> флаги/переменные окружения.

use std::fs;
use std::path::{Path, PathBuf};

use qr_art_core::{EngineConfig, WebUiConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Конфигурация HTTP сервера
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Одновременных генераций; остальные задачи ждут в `pending`
    pub max_concurrent_jobs: usize,
    /// Размер кэша результатов (0 - кэш выключен)
    pub cache_capacity: usize,
    /// Сколько хранить завершённые задачи
    pub task_ttl_secs: u64,
    /// Лимит тела запроса (загрузка фона)
    pub max_upload_bytes: usize,
    pub webui: WebUiConfig,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_concurrent_jobs: 1,
            cache_capacity: 64,
            task_ttl_secs: 3600,
            max_upload_bytes: 20 * 1024 * 1024,
            webui: WebUiConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.webui.base_url, "http://127.0.0.1:7860");
    }

    #[test]
    fn test_partial_toml() {
        let config = ServerConfig::from_toml_str(
            r#"
            port = 9000

            [webui]
            base_url = "http://gpu-box:7860"
            checkpoint = "realisticVisionV51.safetensors"

            [engine]
            verify_output = false
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.webui.base_url, "http://gpu-box:7860");
        assert_eq!(config.webui.checkpoint.as_deref(), Some("realisticVisionV51.safetensors"));
        assert_eq!(config.webui.sampler, "DPM++ 2M Karras");
        assert!(!config.engine.verify_output);
        assert_eq!(config.engine.control_box_size, 10);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrent_jobs = 2\ncache_capacity = 0").unwrap();

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.cache_capacity, 0);
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            ServerConfig::load(Path::new("/nonexistent/qr-art.toml")),
            Err(ConfigError::Io { .. })
        ));
        assert!(matches!(
            ServerConfig::from_toml_str("port = \"eighty\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
