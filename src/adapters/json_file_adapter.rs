//! JSON file adapter for strategy documents and indicator registries.

use crate::domain::error::StratforgeError;
use crate::domain::registry::IndicatorRegistry;
use crate::ports::document_port::DocumentPort;
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;

/// Resolves relative locations against `base_path`. The location `-` reads
/// standard input.
pub struct JsonFileAdapter {
    base_path: PathBuf,
}

impl JsonFileAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn read_text(&self, location: &str) -> Result<String, StratforgeError> {
        if location == "-" {
            let mut content = String::new();
            std::io::stdin().read_to_string(&mut content)?;
            return Ok(content);
        }
        let path = self.base_path.join(location);
        debug!(path = %path.display(), "reading json file");
        Ok(fs::read_to_string(&path)?)
    }

    fn parse_error(location: &str, err: serde_json::Error) -> StratforgeError {
        StratforgeError::DocumentParse {
            source_name: location.to_string(),
            reason: err.to_string(),
        }
    }
}

impl Default for JsonFileAdapter {
    fn default() -> Self {
        Self::new(PathBuf::from("."))
    }
}

impl DocumentPort for JsonFileAdapter {
    fn read_document(&self, location: &str) -> Result<Value, StratforgeError> {
        let content = self.read_text(location)?;
        let value: Value =
            serde_json::from_str(&content).map_err(|e| Self::parse_error(location, e))?;
        if !value.is_object() {
            return Err(StratforgeError::DocumentParse {
                source_name: location.to_string(),
                reason: "top-level value must be an object".to_string(),
            });
        }
        Ok(value)
    }

    fn read_registry(&self, location: &str) -> Result<IndicatorRegistry, StratforgeError> {
        let content = self.read_text(location)?;
        let registry: IndicatorRegistry =
            serde_json::from_str(&content).map_err(|e| Self::parse_error(location, e))?;
        debug!(indicators = registry.len(), "loaded indicator registry");
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) {
        let mut file = fs::File::create(dir.path().join(name)).unwrap();
        write!(file, "{}", content).unwrap();
    }

    #[test]
    fn reads_document_relative_to_base() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "strategy.json", r#"{"name": "x", "rules": []}"#);
        let adapter = JsonFileAdapter::new(dir.path().to_path_buf());
        let doc = adapter.read_document("strategy.json").unwrap();
        assert_eq!(doc["name"], "x");
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "bad.json", "{ not json");
        let adapter = JsonFileAdapter::new(dir.path().to_path_buf());
        let err = adapter.read_document("bad.json").unwrap_err();
        assert!(matches!(err, StratforgeError::DocumentParse { ref source_name, .. } if source_name == "bad.json"));
    }

    #[test]
    fn non_object_document_rejected() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "list.json", "[1, 2]");
        let adapter = JsonFileAdapter::new(dir.path().to_path_buf());
        assert!(matches!(
            adapter.read_document("list.json"),
            Err(StratforgeError::DocumentParse { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let adapter = JsonFileAdapter::new(dir.path().to_path_buf());
        assert!(matches!(
            adapter.read_document("absent.json"),
            Err(StratforgeError::Io(_))
        ));
    }

    #[test]
    fn reads_registry() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "indicators.json",
            r#"{
                "kama": {"inputs": [{"name": "period", "type": "int", "default": 10}],
                         "outputs": [{"name": "value"}]}
            }"#,
        );
        let adapter = JsonFileAdapter::new(dir.path().to_path_buf());
        let registry = adapter.read_registry("indicators.json").unwrap();
        assert!(registry.contains("KAMA"));
        assert_eq!(registry.len(), 1);
    }
}
