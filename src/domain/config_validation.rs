//! Compiler settings read from configuration, validated up front.
//!
//! Every key is optional. Command-line flags are layered on top by the CLI.

use std::path::PathBuf;
use tracing::debug;

use crate::domain::error::StratforgeError;
use crate::ports::codegen_port::Target;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct CompilerSettings {
    pub target: Option<Target>,
    pub registry: Option<PathBuf>,
    /// Refuse generation when validation produced warnings.
    pub strict: bool,
    /// Prefix generated files with a timestamp comment.
    pub stamp_header: bool,
    pub fold_constants: bool,
    pub mql5_magic_number: i64,
    pub mql5_deviation_points: i64,
    pub javascript_class_suffix: String,
    pub python_class_suffix: String,
    pub python_talib_module: String,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            target: None,
            registry: None,
            strict: false,
            stamp_header: false,
            fold_constants: true,
            mql5_magic_number: 20240,
            mql5_deviation_points: 10,
            javascript_class_suffix: "Strategy".to_string(),
            python_class_suffix: "Strategy".to_string(),
            python_talib_module: "talib".to_string(),
        }
    }
}

impl CompilerSettings {
    /// Reads and validates every known key, falling back to defaults.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratforgeError> {
        debug!(source = config.source_name(), "reading compiler settings");
        validate_compiler_config(config)?;
        let defaults = Self::default();
        Ok(Self {
            target: config
                .get_string("compiler", "target")
                .map(|name| name.parse())
                .transpose()?,
            registry: config.get_string("compiler", "registry").map(PathBuf::from),
            strict: config.get_bool("compiler", "strict")?.unwrap_or(defaults.strict),
            stamp_header: config
                .get_bool("compiler", "stamp_header")?
                .unwrap_or(defaults.stamp_header),
            fold_constants: config
                .get_bool("compiler", "fold_constants")?
                .unwrap_or(defaults.fold_constants),
            mql5_magic_number: config
                .get_int("mql5", "magic_number")?
                .unwrap_or(defaults.mql5_magic_number),
            mql5_deviation_points: config
                .get_int("mql5", "deviation_points")?
                .unwrap_or(defaults.mql5_deviation_points),
            javascript_class_suffix: config
                .get_string("javascript", "class_suffix")
                .unwrap_or(defaults.javascript_class_suffix),
            python_class_suffix: config
                .get_string("python", "class_suffix")
                .unwrap_or(defaults.python_class_suffix),
            python_talib_module: config
                .get_string("python", "talib_module")
                .unwrap_or(defaults.python_talib_module),
        })
    }
}

pub fn validate_compiler_config(config: &dyn ConfigPort) -> Result<(), StratforgeError> {
    validate_target(config)?;
    validate_non_negative(config, "mql5", "magic_number")?;
    validate_non_negative(config, "mql5", "deviation_points")?;
    validate_identifier(config, "javascript", "class_suffix")?;
    validate_identifier(config, "python", "class_suffix")?;
    validate_module_path(config)?;
    Ok(())
}

fn validate_target(config: &dyn ConfigPort) -> Result<(), StratforgeError> {
    match config.get_string("compiler", "target") {
        Some(name) => name
            .parse::<Target>()
            .map(|_| ())
            .map_err(|_| StratforgeError::ConfigInvalid {
                section: "compiler".to_string(),
                key: "target".to_string(),
                reason: format!("unknown target '{}'", name),
            }),
        None => Ok(()),
    }
}

fn validate_non_negative(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<(), StratforgeError> {
    match config.get_int(section, key)? {
        Some(value) if value < 0 => Err(StratforgeError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("{} must be non-negative", key),
        }),
        _ => Ok(()),
    }
}

fn validate_identifier(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), StratforgeError> {
    match config.get_string(section, key) {
        Some(value) if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
            Err(StratforgeError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("'{}' is not a valid identifier", value),
            })
        }
        _ => Ok(()),
    }
}

fn validate_module_path(config: &dyn ConfigPort) -> Result<(), StratforgeError> {
    match config.get_string("python", "talib_module") {
        Some(value)
            if value
                .split('.')
                .any(|part| part.is_empty() || !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')) =>
        {
            Err(StratforgeError::ConfigInvalid {
                section: "python".to_string(),
                key: "talib_module".to_string(),
                reason: format!("'{}' is not a valid module path", value),
            })
        }
        _ => Ok(()),
    }
}
