//! Domain error types.

use crate::domain::validation::ValidationIssue;

/// A document fragment that matched none of the recognised shapes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("unrecognized expression: {fragment}")]
    UnrecognizedExpression { fragment: String },

    #[error("unrecognized condition: {fragment}")]
    UnrecognizedCondition { fragment: String },

    #[error("malformed {context}: {reason}")]
    MalformedField { context: String, reason: String },
}

impl BuildError {
    pub(crate) fn malformed(context: impl Into<String>, reason: impl Into<String>) -> Self {
        BuildError::MalformedField {
            context: context.into(),
            reason: reason.into(),
        }
    }
}

/// Failures of the expression interpreter. Generated programs raise the same
/// set at run time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("unbound variable '{name}'")]
    UnboundVariable { name: String },

    #[error("missing value for indicator '{indicator_id}'")]
    MissingIndicatorValue { indicator_id: String },

    #[error("missing value for candle '{candle_id}'")]
    MissingCandleValue { candle_id: String },
}

/// Failures raised while rendering source text for a target.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("{target} backend does not support {construct}")]
    UnsupportedConstruct { target: String, construct: String },

    #[error(transparent)]
    Format(#[from] std::fmt::Error),
}

impl CodegenError {
    pub(crate) fn unsupported(target: impl Into<String>, construct: impl Into<String>) -> Self {
        CodegenError::UnsupportedConstruct {
            target: target.into(),
            construct: construct.into(),
        }
    }
}

/// Top-level error type for stratforge.
#[derive(Debug, thiserror::Error)]
pub enum StratforgeError {
    #[error("failed to parse document {source_name}: {reason}")]
    DocumentParse { source_name: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("strategy failed validation with {} error(s)", errors.len())]
    InvalidStrategy { errors: Vec<ValidationIssue> },

    #[error("strategy has {} warning(s) and strict mode is on", warnings.len())]
    StrictWarnings { warnings: Vec<ValidationIssue> },

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error("unknown target '{name}' (expected one of: javascript, python, mql5)")]
    UnknownTarget { name: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&StratforgeError> for std::process::ExitCode {
    fn from(err: &StratforgeError) -> Self {
        let code: u8 = match err {
            StratforgeError::Io(_) | StratforgeError::DocumentParse { .. } => 1,
            StratforgeError::ConfigParse { .. }
            | StratforgeError::ConfigMissing { .. }
            | StratforgeError::ConfigInvalid { .. } => 2,
            StratforgeError::Build(_) => 3,
            StratforgeError::InvalidStrategy { .. } | StratforgeError::StrictWarnings { .. } => 4,
            StratforgeError::Codegen(_) | StratforgeError::UnknownTarget { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::validation::Severity;

    #[test]
    fn build_error_carries_fragment() {
        let err = BuildError::UnrecognizedExpression {
            fragment: "{\"foo\":1}".into(),
        };
        assert_eq!(err.to_string(), "unrecognized expression: {\"foo\":1}");
    }

    #[test]
    fn unsupported_construct_names_target() {
        let err = CodegenError::unsupported("mql5", "indicator 'VWAP'");
        assert_eq!(err.to_string(), "mql5 backend does not support indicator 'VWAP'");
    }

    #[test]
    fn build_error_converts_into_top_level() {
        let err: StratforgeError = BuildError::malformed("timeframe", "missing length").into();
        assert!(matches!(err, StratforgeError::Build(_)));
        assert_eq!(err.to_string(), "malformed timeframe: missing length");
    }

    #[test]
    fn strict_warnings_are_not_reported_as_errors() {
        let err = StratforgeError::StrictWarnings {
            warnings: vec![ValidationIssue {
                message: "data source 'x' is never referenced".into(),
                severity: Severity::Warning,
            }],
        };
        assert_eq!(err.to_string(), "strategy has 1 warning(s) and strict mode is on");
        assert_eq!(
            format!("{:?}", std::process::ExitCode::from(&err)),
            format!("{:?}", std::process::ExitCode::from(4))
        );
    }
}
