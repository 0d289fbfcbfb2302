//! Indicator registry: indicator-type name to declared inputs and outputs.
//!
//! The registry is always passed in explicitly. [`IndicatorRegistry::builtin`]
//! builds the common set on demand; callers may load their own from JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::eval::map_expressions;
use crate::domain::expression::{Expression, OutputSelector};
use crate::domain::strategy::Strategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorSpec {
    #[serde(default)]
    pub inputs: Vec<ParamSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

impl IndicatorSpec {
    /// The first declared output, used when a reference names none.
    pub fn default_output(&self) -> Option<&OutputSpec> {
        self.outputs.first()
    }

    /// Position of the selected output, or `None` when it is not declared.
    pub fn output_index(&self, selector: &OutputSelector) -> Option<usize> {
        match selector {
            OutputSelector::Name(name) => self.outputs.iter().position(|o| &o.name == name),
            OutputSelector::Index(i) if *i < self.outputs.len() => Some(*i),
            OutputSelector::Index(_) => None,
        }
    }

    /// The output a reference reads: the selected one, or the default when
    /// the reference names none.
    pub fn declared_output(&self, selector: Option<&OutputSelector>) -> Option<&OutputSpec> {
        match selector {
            None => self.default_output(),
            Some(selector) => self.output_index(selector).and_then(|i| self.outputs.get(i)),
        }
    }
}

/// Output names of the indicators every backend knows how to address.
pub fn standard_outputs(indicator_type: &str) -> &'static [&'static str] {
    match indicator_type {
        "MACD" => &["macd", "signal", "histogram"],
        "BBANDS" => &["upper", "middle", "lower"],
        "STOCH" => &["k", "d"],
        "ADX" => &["adx", "plus_di", "minus_di"],
        _ => &["value"],
    }
}

/// Registry keys are upper-cased on insertion, matching how the builder
/// normalises `indicator_type`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, IndicatorSpec>", into = "BTreeMap<String, IndicatorSpec>")]
pub struct IndicatorRegistry {
    specs: BTreeMap<String, IndicatorSpec>,
}

impl From<BTreeMap<String, IndicatorSpec>> for IndicatorRegistry {
    fn from(raw: BTreeMap<String, IndicatorSpec>) -> Self {
        let mut registry = IndicatorRegistry::default();
        for (name, spec) in raw {
            registry.insert(name, spec);
        }
        registry
    }
}

impl From<IndicatorRegistry> for BTreeMap<String, IndicatorSpec> {
    fn from(registry: IndicatorRegistry) -> Self {
        registry.specs
    }
}

impl IndicatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, spec: IndicatorSpec) {
        self.specs.insert(name.as_ref().to_uppercase(), spec);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(&name.to_uppercase())
    }

    pub fn get(&self, name: &str) -> Option<&IndicatorSpec> {
        self.specs.get(&name.to_uppercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn builtin() -> Self {
        let mut registry = IndicatorRegistry::new();
        for name in ["SMA", "EMA", "WMA", "RSI", "CCI", "ROC", "MOM"] {
            registry.insert(
                name,
                spec(
                    name,
                    vec![param("period", "int", json!(14)), param("price", "string", json!("close"))],
                ),
            );
        }
        registry.insert(
            "MACD",
            spec(
                "MACD",
                vec![
                    param("fast_period", "int", json!(12)),
                    param("slow_period", "int", json!(26)),
                    param("signal_period", "int", json!(9)),
                    param("price", "string", json!("close")),
                ],
            ),
        );
        registry.insert(
            "BBANDS",
            spec(
                "BBANDS",
                vec![
                    param("period", "int", json!(20)),
                    param("deviations", "float", json!(2.0)),
                    param("price", "string", json!("close")),
                ],
            ),
        );
        registry.insert(
            "STOCH",
            spec(
                "STOCH",
                vec![
                    param("k_period", "int", json!(14)),
                    param("d_period", "int", json!(3)),
                    param("slowing", "int", json!(3)),
                ],
            ),
        );
        for name in ["ATR", "ADX"] {
            registry.insert(name, spec(name, vec![param("period", "int", json!(14))]));
        }
        for name in ["OBV", "VWAP"] {
            registry.insert(name, spec(name, Vec::new()));
        }
        registry
    }
}

/// Rewrites every indicator reference to name the output the registry
/// declares for it, so backends address outputs by name rather than by
/// position. References the registry cannot resolve are left as written.
pub fn resolve_outputs(strategy: &Strategy, registry: &IndicatorRegistry) -> Strategy {
    let mut types: BTreeMap<&str, &str> = BTreeMap::new();
    for source in &strategy.data_sources {
        if let Some(kind) = source.indicator_type() {
            types.entry(source.id.as_str()).or_insert(kind);
        }
    }
    map_expressions(strategy, &|expr: &Expression| resolve_expression(expr, &types, registry))
}

fn resolve_expression(
    expr: &Expression,
    types: &BTreeMap<&str, &str>,
    registry: &IndicatorRegistry,
) -> Expression {
    match expr {
        Expression::Binary {
            operator,
            left,
            right,
        } => Expression::binary(
            *operator,
            resolve_expression(left, types, registry),
            resolve_expression(right, types, registry),
        ),
        Expression::IndicatorOutput {
            indicator_id,
            output,
        } => {
            let declared = types
                .get(indicator_id.as_str())
                .and_then(|kind| registry.get(kind))
                .and_then(|spec| spec.declared_output(output.as_ref()));
            match declared {
                Some(spec) => Expression::IndicatorOutput {
                    indicator_id: indicator_id.clone(),
                    output: Some(OutputSelector::Name(spec.name.clone())),
                },
                None => expr.clone(),
            }
        }
        other => other.clone(),
    }
}

fn param(name: &str, kind: &str, default: Value) -> ParamSpec {
    ParamSpec {
        name: name.to_string(),
        kind: Some(kind.to_string()),
        default: Some(default),
        required: false,
    }
}

fn spec(name: &str, inputs: Vec<ParamSpec>) -> IndicatorSpec {
    IndicatorSpec {
        inputs,
        outputs: standard_outputs(name)
            .iter()
            .map(|n| OutputSpec {
                name: (*n).to_string(),
            })
            .collect(),
    }
}
