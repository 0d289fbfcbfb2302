//! Referential and structural validation of a built strategy.
//!
//! Fatal issues make the result invalid; warnings are advisory. Validation
//! never mutates the AST.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::expression::{Condition, Expression};
use crate::domain::registry::IndicatorRegistry;
use crate::domain::strategy::{ActionList, DataSourceKind, Rule, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub message: String,
    pub severity: Severity,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Fatal => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}", label, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Indicator { indicator_type: String },
    Candle,
}

/// Lookup maps filled by the builder, plus the registry used for existence
/// checks.
#[derive(Debug, Clone)]
pub struct ValidationContext<'r> {
    registry: &'r IndicatorRegistry,
    data_sources: BTreeMap<String, SourceKind>,
    actions: BTreeSet<String>,
    duplicate_data_sources: Vec<String>,
    duplicate_actions: Vec<String>,
}

impl<'r> ValidationContext<'r> {
    pub fn new(registry: &'r IndicatorRegistry) -> Self {
        Self {
            registry,
            data_sources: BTreeMap::new(),
            actions: BTreeSet::new(),
            duplicate_data_sources: Vec::new(),
            duplicate_actions: Vec::new(),
        }
    }

    /// The first registration of an id wins.
    pub fn register_data_source(&mut self, id: &str, kind: SourceKind) {
        if self.data_sources.contains_key(id) {
            self.duplicate_data_sources.push(id.to_string());
        } else {
            self.data_sources.insert(id.to_string(), kind);
        }
    }

    pub fn register_action(&mut self, id: &str) {
        if !self.actions.insert(id.to_string()) {
            self.duplicate_actions.push(id.to_string());
        }
    }

    pub fn data_source(&self, id: &str) -> Option<&SourceKind> {
        self.data_sources.get(id)
    }

    pub fn has_action(&self, id: &str) -> bool {
        self.actions.contains(id)
    }

    pub fn registry(&self) -> &IndicatorRegistry {
        self.registry
    }
}

struct Validator<'a, 'r> {
    context: &'a ValidationContext<'r>,
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
    used_sources: BTreeSet<&'a str>,
    used_actions: BTreeSet<&'a str>,
}

impl<'a, 'r> Validator<'a, 'r> {
    fn error(&mut self, message: String) {
        debug!(%message, "validation error");
        self.errors.push(ValidationIssue {
            message,
            severity: Severity::Fatal,
        });
    }

    fn warning(&mut self, message: String) {
        debug!(%message, "validation warning");
        self.warnings.push(ValidationIssue {
            message,
            severity: Severity::Warning,
        });
    }

    fn check_collections(&mut self, strategy: &Strategy) {
        let counts = [
            ("data_sources", strategy.data_sources.len()),
            ("rules", strategy.rules.len()),
            ("actions", strategy.actions.len()),
            ("position_limits", strategy.position_limits.len()),
        ];
        for (name, count) in counts {
            if count == 0 {
                self.error(format!("{} collection is empty", name));
            }
        }
    }

    fn check_data_sources(&mut self, strategy: &'a Strategy) {
        for source in &strategy.data_sources {
            if let DataSourceKind::Indicator { indicator_type, .. } = &source.kind {
                if !self.context.registry.contains(indicator_type) {
                    self.error(format!(
                        "data source '{}' uses unknown indicator_type '{}'",
                        source.id, indicator_type
                    ));
                }
            }
            if source.timeframe.length < 1 {
                self.error(format!(
                    "data source '{}' has timeframe length {} (must be at least 1)",
                    source.id, source.timeframe.length
                ));
            }
        }
        for id in self.context.duplicate_data_sources.clone() {
            self.warning(format!("duplicate data source id '{}'", id));
        }
        for id in self.context.duplicate_actions.clone() {
            self.warning(format!("duplicate action id '{}'", id));
        }
    }

    fn check_rule(&mut self, rule: &'a Rule, label: &str) {
        self.check_condition(&rule.condition);
        self.check_action_list(&rule.then_actions, label);
        if let Some(else_actions) = &rule.else_actions {
            self.check_action_list(else_actions, label);
        }
    }

    fn check_action_list(&mut self, list: &'a ActionList, label: &str) {
        match list {
            ActionList::Ids(ids) => {
                for id in ids {
                    if self.context.has_action(id) {
                        self.used_actions.insert(id.as_str());
                    } else {
                        self.error(format!("{} references unknown action '{}'", label, id));
                    }
                }
            }
            ActionList::Nested(rule) => self.check_rule(rule, &format!("{} (nested)", label)),
        }
    }

    fn check_condition(&mut self, condition: &'a Condition) {
        match condition {
            Condition::Comparison(cmp) => {
                self.check_expression(&cmp.left);
                self.check_expression(&cmp.right);
            }
            Condition::Logical { children, .. } => {
                for child in children {
                    self.check_condition(child);
                }
            }
            Condition::Crossover(cross) => {
                self.check_expression(&cross.series_a);
                self.check_expression(&cross.series_b);
            }
        }
    }

    fn check_expression(&mut self, expr: &'a Expression) {
        let context = self.context;
        match expr {
            Expression::Literal(_) | Expression::Variable(_) => {}
            Expression::Binary { left, right, .. } => {
                self.check_expression(left);
                self.check_expression(right);
            }
            Expression::IndicatorOutput {
                indicator_id,
                output,
            } => match context.data_source(indicator_id) {
                Some(SourceKind::Indicator { indicator_type }) => {
                    self.used_sources.insert(indicator_id.as_str());
                    let spec = context.registry.get(indicator_type);
                    if let (Some(spec), Some(selector)) = (spec, output) {
                        if spec.output_index(selector).is_none() {
                            self.warning(format!(
                                "indicator '{}' ({}) does not declare output '{}'",
                                indicator_id, indicator_type, selector
                            ));
                        }
                    }
                }
                Some(SourceKind::Candle) => {
                    self.used_sources.insert(indicator_id.as_str());
                    self.error(format!(
                        "'{}' is a candle data source but is referenced as an indicator",
                        indicator_id
                    ));
                }
                None => self.error(format!("unknown indicator data source '{}'", indicator_id)),
            },
            Expression::CandleField { candle_id, .. } => match context.data_source(candle_id) {
                Some(SourceKind::Candle) => {
                    self.used_sources.insert(candle_id.as_str());
                }
                Some(SourceKind::Indicator { .. }) => {
                    self.used_sources.insert(candle_id.as_str());
                    self.error(format!(
                        "'{}' is an indicator data source but is referenced as a candle",
                        candle_id
                    ));
                }
                None => self.error(format!("unknown candle data source '{}'", candle_id)),
            },
        }
    }

    fn check_unused(&mut self, strategy: &Strategy) {
        let mut seen = BTreeSet::new();
        for source in &strategy.data_sources {
            if seen.insert(source.id.as_str()) && !self.used_sources.contains(source.id.as_str()) {
                self.warning(format!("data source '{}' is never referenced", source.id));
            }
        }
        seen.clear();
        for action in &strategy.actions {
            if seen.insert(action.id.as_str()) && !self.used_actions.contains(action.id.as_str()) {
                self.warning(format!("action '{}' is never referenced by a rule", action.id));
            }
        }
    }
}

/// Validates `strategy` against the ids registered in `context`.
///
/// Issues are reported in a stable order: empty collections, data sources,
/// rules, actions, position limits, then unused-id warnings.
pub fn validate(strategy: &Strategy, context: &ValidationContext<'_>) -> ValidationResult {
    let mut validator = Validator {
        context,
        errors: Vec::new(),
        warnings: Vec::new(),
        used_sources: BTreeSet::new(),
        used_actions: BTreeSet::new(),
    };

    validator.check_collections(strategy);
    validator.check_data_sources(strategy);
    for (i, rule) in strategy.rules.iter().enumerate() {
        validator.check_rule(rule, &format!("rule {}", i + 1));
    }
    for action in &strategy.actions {
        for expr in action.order.expressions() {
            validator.check_expression(expr);
        }
    }
    for limit in &strategy.position_limits {
        validator.check_expression(&limit.max);
        validator.check_expression(&limit.min);
    }
    validator.check_unused(strategy);

    let result = ValidationResult {
        valid: validator.errors.is_empty(),
        errors: validator.errors,
        warnings: validator.warnings,
    };
    info!(
        valid = result.valid,
        errors = result.errors.len(),
        warnings = result.warnings.len(),
        "validation finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::builder::build_with_registry;
    use serde_json::{Value, json};

    fn document() -> Value {
        json!({
            "data_sources": [
                {"id": "ema_fast", "type": "indicator", "indicator_type": "EMA", "symbol": "TSLA",
                 "timeframe": {"period": "day", "length": 1}, "params": {"period": 12}},
                {"id": "px", "type": "candle", "symbol": "TSLA",
                 "timeframe": {"period": "day", "length": 1}}
            ],
            "actions": [
                {"id": "buy", "order": {"type": "market", "symbol": "TSLA", "side": "buy", "quantity": 1}},
                {"id": "sell", "order": {"type": "market", "symbol": "TSLA", "side": "sell", "quantity": 1}}
            ],
            "rules": [
                {"condition": {"expression": {"operator": ">",
                    "operandA": {"candle_id": "px", "field": "close"},
                    "operandB": {"indicator_id": "ema_fast"}}},
                 "then": ["buy"], "else": ["sell"]}
            ],
            "position_limits": [{"symbol": "TSLA", "max": 10, "min": -10}]
        })
    }

    fn run(doc: &Value) -> ValidationResult {
        let registry = IndicatorRegistry::builtin();
        let (strategy, context) = build_with_registry(doc, &registry).unwrap();
        validate(&strategy, &context)
    }

    #[test]
    fn resolvable_document_is_valid() {
        let result = run(&document());
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn each_empty_collection_yields_one_error() {
        for key in ["data_sources", "rules", "actions", "position_limits"] {
            let mut doc = document();
            doc[key] = json!([]);
            let result = run(&doc);
            assert!(!result.valid);
            let naming: Vec<_> = result
                .errors
                .iter()
                .filter(|e| e.message == format!("{} collection is empty", key))
                .collect();
            assert_eq!(naming.len(), 1, "{key}: {:?}", result.errors);
        }
    }

    #[test]
    fn unknown_action_reported_once_and_fixable() {
        let mut doc = document();
        doc["rules"][0]["then"] = json!(["buy_typo"]);
        let result = run(&doc);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("buy_typo"));
        assert_eq!(result.errors[0].severity, Severity::Fatal);

        doc["rules"][0]["then"] = json!(["buy"]);
        assert!(run(&doc).valid);
    }

    #[test]
    fn unknown_indicator_type_is_fatal() {
        let mut doc = document();
        doc["data_sources"][0]["indicator_type"] = json!("supertrend");
        let result = run(&doc);
        assert!(!result.valid);
        assert!(result.errors[0].message.contains("SUPERTREND"));
    }

    #[test]
    fn zero_timeframe_is_fatal() {
        let mut doc = document();
        doc["data_sources"][1]["timeframe"]["length"] = json!(0);
        let result = run(&doc);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("timeframe length 0"));
    }

    #[test]
    fn wrong_kind_reference_is_fatal() {
        let mut doc = document();
        doc["rules"][0]["condition"]["expression"]["operandA"] =
            json!({"candle_id": "ema_fast", "field": "close"});
        let result = run(&doc);
        assert!(!result.valid);
        assert!(result.errors[0].message.contains("indicator data source"));
    }

    #[test]
    fn dangling_reference_in_order_price() {
        let mut doc = document();
        doc["actions"][0]["order"] = json!({
            "type": "limit", "symbol": "TSLA", "side": "buy", "quantity": 1,
            "limit_price": {"indicator_id": "vwap"}
        });
        let result = run(&doc);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("vwap"));
    }

    #[test]
    fn unused_ids_are_warnings() {
        let mut doc = document();
        doc["rules"][0]["else"] = Value::Null;
        doc["rules"][0]["condition"]["expression"]["operandB"] = json!(100);
        let result = run(&doc);
        assert!(result.valid);
        let messages: Vec<_> = result.warnings.iter().map(|w| w.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "data source 'ema_fast' is never referenced",
                "action 'sell' is never referenced by a rule",
            ]
        );
    }

    #[test]
    fn duplicate_ids_and_unknown_output_are_warnings() {
        let mut doc = document();
        let dup = doc["actions"][1].clone();
        doc["actions"].as_array_mut().unwrap().push(dup);
        doc["rules"][0]["condition"]["expression"]["operandB"] =
            json!({"indicator_id": "ema_fast", "output": "signal"});
        let result = run(&doc);
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.message == "duplicate action id 'sell'"));
        assert!(result.warnings.iter().any(|w| w.message.contains("output 'signal'")));
    }

    #[test]
    fn nested_rule_actions_are_checked() {
        let mut doc = document();
        doc["rules"][0]["then"] = json!({
            "condition": {"expression": {"operator": "<", "operandA": 1, "operandB": 2}},
            "then": ["missing"]
        });
        let result = run(&doc);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("'missing'"));
    }

    #[test]
    fn issue_display() {
        let issue = ValidationIssue {
            message: "rules collection is empty".into(),
            severity: Severity::Fatal,
        };
        assert_eq!(issue.to_string(), "error: rules collection is empty");
    }
}
