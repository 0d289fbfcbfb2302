//! Build, validate and generate in one call.
//!
//! Generation is refused for an invalid strategy, and in strict mode for a
//! strategy with warnings.

use serde_json::Value;
use tracing::{debug, info};

use crate::domain::builder::build_with_registry;
use crate::domain::error::StratforgeError;
use crate::domain::eval::fold_strategy;
use crate::domain::registry::{IndicatorRegistry, resolve_outputs};
use crate::domain::strategy::Strategy;
use crate::domain::validation::{ValidationResult, validate};
use crate::ports::codegen_port::CodeGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub strict: bool,
    pub fold_constants: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            strict: false,
            fold_constants: true,
        }
    }
}

/// Generated source plus the validation result it passed.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub source: String,
    pub validation: ValidationResult,
}

/// Builds and validates without generating.
pub fn check(
    document: &Value,
    registry: &IndicatorRegistry,
) -> Result<(Strategy, ValidationResult), StratforgeError> {
    let (strategy, context) = build_with_registry(document, registry)?;
    info!(
        data_sources = strategy.data_sources.len(),
        rules = strategy.rules.len(),
        actions = strategy.actions.len(),
        "built strategy"
    );
    let result = validate(&strategy, &context);
    Ok((strategy, result))
}

pub fn compile(
    document: &Value,
    registry: &IndicatorRegistry,
    generator: &dyn CodeGenerator,
    options: CompileOptions,
) -> Result<Compilation, StratforgeError> {
    let (strategy, validation) = check(document, registry)?;
    if !validation.valid {
        return Err(StratforgeError::InvalidStrategy {
            errors: validation.errors,
        });
    }
    if options.strict && !validation.warnings.is_empty() {
        info!(warnings = validation.warnings.len(), "strict mode refuses warnings");
        return Err(StratforgeError::StrictWarnings {
            warnings: validation.warnings,
        });
    }

    debug!("resolving indicator outputs against the registry");
    let strategy = resolve_outputs(&strategy, registry);

    let strategy = if options.fold_constants {
        debug!("folding constant expressions");
        fold_strategy(&strategy)
    } else {
        strategy
    };

    let target = generator.target();
    info!(target = %target, "generating source");
    let source = generator.generate(&strategy)?;
    info!(target = %target, bytes = source.len(), "generated source");
    Ok(Compilation { source, validation })
}
