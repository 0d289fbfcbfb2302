//! INI file configuration adapter.

use crate::domain::error::StratforgeError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
    source_name: String,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StratforgeError> {
        let path = path.as_ref();
        let source_name = path.display().to_string();
        let content = std::fs::read_to_string(path)?;
        let mut config = Ini::new();
        config
            .read(content)
            .map_err(|reason| StratforgeError::ConfigParse {
                file: source_name.clone(),
                reason,
            })?;
        Ok(Self {
            config,
            source_name,
        })
    }

    pub fn from_string(content: &str) -> Result<Self, StratforgeError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| StratforgeError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self {
            config,
            source_name: "<string>".to_string(),
        })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }

    fn invalid(section: &str, key: &str, reason: String) -> StratforgeError {
        StratforgeError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, StratforgeError> {
        self.config
            .getint(section, key)
            .map_err(|reason| Self::invalid(section, key, reason))
    }

    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, StratforgeError> {
        match self.get_string(section, key) {
            None => Ok(None),
            Some(raw) => Self::parse_bool(&raw).map(Some).ok_or_else(|| {
                Self::invalid(section, key, format!("expected a boolean, found '{}'", raw))
            }),
        }
    }
}
