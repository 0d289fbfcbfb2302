//! Code generation backends and the helpers they share.
//!
//! Each backend keeps explicit allowlists of the indicator and order kinds it
//! can emit. Anything outside them fails with
//! [`CodegenError::UnsupportedConstruct`].

pub mod javascript;
pub mod mql5;
pub mod python;

use serde_json::Value;

use crate::domain::error::CodegenError;
use crate::domain::expression::OutputSelector;
use crate::domain::index::StrategyIndex;
use crate::domain::registry::standard_outputs;
use crate::domain::strategy::{DataSource, Order, Strategy};
use crate::ports::codegen_port::{CodeGenerator, Target};

pub use javascript::JavaScriptGenerator;
pub use mql5::Mql5Generator;
pub use python::PythonGenerator;

/// Generator for `target` with default settings.
pub fn generator_for(target: Target) -> Box<dyn CodeGenerator> {
    match target {
        Target::JavaScript => Box::new(JavaScriptGenerator::default()),
        Target::Python => Box::new(PythonGenerator::default()),
        Target::Mql5 => Box::new(Mql5Generator::default()),
    }
}

/// Number literal valid in all three targets. Integral values keep a `.0`,
/// or switch to exponent form past 1e15, so they stay floating point;
/// negatives are parenthesised.
pub(crate) fn format_number(value: f64) -> String {
    let text = if value.fract() != 0.0 {
        format!("{}", value)
    } else if value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        format!("{:e}", value)
    };
    if value < 0.0 { format!("({})", text) } else { text }
}

/// Double-quoted string literal with JSON escaping.
pub(crate) fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

/// Maps arbitrary ids onto `[A-Za-z0-9_]`, never starting with a digit.
pub(crate) fn sanitize_identifier(raw: &str) -> String {
    let mut ident: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

pub(crate) fn pascal_case(raw: &str) -> String {
    raw.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// PascalCase strategy name, `Generated` when absent or unusable.
pub(crate) fn base_name(strategy: &Strategy) -> String {
    let name = strategy.name.as_deref().map(pascal_case).unwrap_or_default();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("Generated{}", name)
    } else {
        name
    }
}

/// Prefixes every non-empty line with `spaces` spaces.
pub(crate) fn indent(text: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn lookup_source<'s>(
    target: Target,
    scope: &StrategyIndex<'s>,
    id: &str,
) -> Result<&'s DataSource, CodegenError> {
    scope
        .data_source(id)
        .ok_or_else(|| CodegenError::unsupported(target.name(), format!("undefined data source '{}'", id)))
}

/// Rejects indicator kinds outside a backend's allowlist.
pub(crate) fn check_indicator(
    target: Target,
    supported: &[&str],
    source: &DataSource,
) -> Result<(), CodegenError> {
    match source.indicator_type() {
        Some(kind) if !supported.contains(&kind) => Err(CodegenError::unsupported(
            target.name(),
            format!("indicator '{}' (data source '{}')", kind, source.id),
        )),
        _ => Ok(()),
    }
}

/// Rejects order kinds outside a backend's allowlist.
pub(crate) fn check_order(target: Target, supported: &[&str], order: &Order) -> Result<(), CodegenError> {
    let kind = order.kind.name();
    if supported.contains(&kind) {
        Ok(())
    } else {
        Err(CodegenError::unsupported(target.name(), format!("order type '{}'", kind)))
    }
}

/// Position of the selected output among the outputs the backends address.
/// `compile` first rewrites selectors to the registry's output names (see
/// `registry::resolve_outputs`), so a positional selector only reaches this
/// point when a strategy is generated directly.
pub(crate) fn resolve_output(
    target: Target,
    source: &DataSource,
    output: Option<&OutputSelector>,
) -> Result<usize, CodegenError> {
    let kind = source.indicator_type().unwrap_or_default();
    let outputs = standard_outputs(kind);
    let found = match output {
        None => Some(0),
        Some(OutputSelector::Name(name)) => outputs.iter().position(|o| o == name),
        Some(OutputSelector::Index(i)) if *i < outputs.len() => Some(*i),
        Some(OutputSelector::Index(_)) => None,
    };
    found.ok_or_else(|| {
        CodegenError::unsupported(
            target.name(),
            format!(
                "output '{}' of indicator '{}' ({})",
                output.map(ToString::to_string).unwrap_or_default(),
                source.id,
                kind
            ),
        )
    })
}

/// Price series an indicator is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PriceSource {
    Close,
    Open,
    High,
    Low,
    Median,
    Typical,
    Weighted,
}

impl PriceSource {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "close" => Some(PriceSource::Close),
            "open" => Some(PriceSource::Open),
            "high" => Some(PriceSource::High),
            "low" => Some(PriceSource::Low),
            "median" | "hl2" => Some(PriceSource::Median),
            "typical" | "hlc3" => Some(PriceSource::Typical),
            "weighted" | "hlcc4" => Some(PriceSource::Weighted),
            _ => None,
        }
    }
}

/// Read-only view over an indicator data source's parameters.
pub(crate) struct IndicatorParams<'a> {
    target: Target,
    source: &'a DataSource,
}

impl<'a> IndicatorParams<'a> {
    pub(crate) fn new(target: Target, source: &'a DataSource) -> Self {
        Self { target, source }
    }

    fn raw(&self, key: &str) -> Option<&'a Value> {
        self.source.params().and_then(|p| p.get(key))
    }

    fn invalid(&self, key: &str, value: &Value) -> CodegenError {
        CodegenError::unsupported(
            self.target.name(),
            format!("parameter {}={} on '{}'", key, value, self.source.id),
        )
    }

    pub(crate) fn int(&self, key: &str, default: i64) -> Result<i64, CodegenError> {
        match self.raw(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_i64()
                .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .filter(|n| *n > 0)
                .ok_or_else(|| self.invalid(key, value)),
        }
    }

    pub(crate) fn float(&self, key: &str, default: f64) -> Result<f64, CodegenError> {
        match self.raw(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value.as_f64().ok_or_else(|| self.invalid(key, value)),
        }
    }

    pub(crate) fn price(&self) -> Result<PriceSource, CodegenError> {
        match self.raw("price") {
            None | Some(Value::Null) => Ok(PriceSource::Close),
            Some(Value::String(name)) => {
                PriceSource::from_name(name).ok_or_else(|| self.invalid("price", &Value::String(name.clone())))
            }
            Some(other) => Err(self.invalid("price", other)),
        }
    }
}
