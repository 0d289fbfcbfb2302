//! Document builder.
//!
//! Converts a strategy document (`serde_json::Value`) into the AST. Expression
//! shapes overlap, so they are tried in a fixed order:
//!
//! 1. bare number: literal
//! 2. object whose only key is `var`: variable
//! 3. object with `operator`, `operandA` and `operandB`: binary operation
//! 4. object with `indicator_id`: indicator output reference
//! 5. object with `candle_id` and `field`: candle field reference
//!
//! Anything else is an [`BuildError::UnrecognizedExpression`]. A condition must
//! carry exactly one of `expression`, `and` or `or`.
//!
//! Every data-source and action id is registered into the
//! [`ValidationContext`] as it is built.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::error::BuildError;
use crate::domain::expression::{
    BinaryOperator, CandleField, Comparison, ComparisonOperator, Condition, Expression,
    LogicalOperator, OutputSelector,
};
use crate::domain::registry::IndicatorRegistry;
use crate::domain::strategy::{
    Action, ActionList, DataSource, DataSourceKind, Order, OrderKind, Period, PositionLimit, Rule,
    Side, Strategy, SymbolRef, TimeInForce, Timeframe,
};
use crate::domain::validation::{SourceKind, ValidationContext};

type Object = Map<String, Value>;

struct Builder<'c, 'r> {
    context: &'c mut ValidationContext<'r>,
}

impl<'c, 'r> Builder<'c, 'r> {
    fn new(context: &'c mut ValidationContext<'r>) -> Self {
        Self { context }
    }

    fn build_strategy(&mut self, document: &Value) -> Result<Strategy, BuildError> {
        let root = document
            .as_object()
            .ok_or_else(|| BuildError::malformed("document", "expected a JSON object"))?;

        let data_sources = collection(root, "data_sources")?
            .iter()
            .map(|v| self.build_data_source(v))
            .collect::<Result<Vec<_>, _>>()?;
        let actions = collection(root, "actions")?
            .iter()
            .map(|v| self.build_action(v))
            .collect::<Result<Vec<_>, _>>()?;
        let rules = collection(root, "rules")?
            .iter()
            .map(|v| self.build_rule(v))
            .collect::<Result<Vec<_>, _>>()?;
        let position_limits = collection(root, "position_limits")?
            .iter()
            .map(|v| self.build_position_limit(v))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Strategy {
            name: optional_string(root, "name", "document")?,
            description: optional_string(root, "description", "document")?,
            data_sources,
            rules,
            actions,
            position_limits,
        })
    }

    fn build_data_source(&mut self, value: &Value) -> Result<DataSource, BuildError> {
        let obj = object(value, "data source")?;
        let id = required_string(obj, "id", "data source")?;
        let context = format!("data source '{}'", id);

        let type_name = match obj.get("type") {
            Some(Value::String(s)) => s.to_lowercase(),
            Some(other) => {
                return Err(BuildError::malformed(
                    context,
                    format!("type must be a string, found {}", other),
                ));
            }
            None if obj.contains_key("indicator_type") => "indicator".to_string(),
            None => "candle".to_string(),
        };

        let kind = match type_name.as_str() {
            "indicator" => {
                let indicator_type = required_string(obj, "indicator_type", &context)?.to_uppercase();
                let params = match obj.get("params") {
                    None | Some(Value::Null) => BTreeMap::new(),
                    Some(Value::Object(map)) => {
                        map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                    }
                    Some(_) => {
                        return Err(BuildError::malformed(context, "params must be an object"));
                    }
                };
                DataSourceKind::Indicator {
                    indicator_type,
                    params,
                }
            }
            "candle" => DataSourceKind::Candle,
            other => {
                return Err(BuildError::malformed(
                    context,
                    format!("unknown data source type '{}'", other),
                ));
            }
        };

        let symbol = self.build_symbol(field(obj, "symbol", &context)?, &context)?;
        let timeframe = build_timeframe(field(obj, "timeframe", &context)?, &context)?;
        let offset = match obj.get("offset") {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    BuildError::malformed(&context, "offset must be a non-negative integer")
                })?,
        };

        let source_kind = match &kind {
            DataSourceKind::Indicator { indicator_type, .. } => SourceKind::Indicator {
                indicator_type: indicator_type.clone(),
            },
            DataSourceKind::Candle => SourceKind::Candle,
        };
        debug!(id = %id, kind = ?source_kind, "registered data source");
        self.context.register_data_source(&id, source_kind);

        Ok(DataSource {
            id,
            kind,
            symbol,
            timeframe,
            offset,
        })
    }

    fn build_symbol(&self, value: &Value, context: &str) -> Result<SymbolRef, BuildError> {
        match value {
            Value::String(s) => Ok(SymbolRef::Literal(s.clone())),
            Value::Object(obj) if obj.len() == 1 => match obj.get("var") {
                Some(Value::String(name)) => Ok(SymbolRef::Variable(name.clone())),
                _ => Err(BuildError::malformed(
                    context,
                    format!("symbol must be a string or {{\"var\": name}}, found {}", value),
                )),
            },
            _ => Err(BuildError::malformed(
                context,
                format!("symbol must be a string or {{\"var\": name}}, found {}", value),
            )),
        }
    }

    fn build_action(&mut self, value: &Value) -> Result<Action, BuildError> {
        let obj = object(value, "action")?;
        let id = required_string(obj, "id", "action")?;
        let context = format!("action '{}'", id);
        let order = self.build_order(field(obj, "order", &context)?, &context)?;

        debug!(id = %id, order = order.kind.name(), "registered action");
        self.context.register_action(&id);
        Ok(Action { id, order })
    }

    fn build_order(&self, value: &Value, context: &str) -> Result<Order, BuildError> {
        let obj = object(value, context)?;
        let type_name = optional_string(obj, "type", context)?
            .unwrap_or_else(|| "market".to_string())
            .to_lowercase();

        let side = match required_string(obj, "side", context)?.to_lowercase().as_str() {
            "buy" => Side::Buy,
            "sell" => Side::Sell,
            other => {
                return Err(BuildError::malformed(
                    context,
                    format!("unknown side '{}'", other),
                ));
            }
        };
        let time_in_force = match optional_string(obj, "time_in_force", context)? {
            None => TimeInForce::default(),
            Some(name) => TimeInForce::from_name(&name.to_lowercase()).ok_or_else(|| {
                BuildError::malformed(context, format!("unknown time_in_force '{}'", name))
            })?,
        };

        let expr = |key: &str| -> Result<Expression, BuildError> {
            self.build_expression(field(obj, key, context)?)
        };
        let optional_expr = |key: &str| -> Result<Option<Expression>, BuildError> {
            match obj.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => self.build_expression(v).map(Some),
            }
        };

        let kind = match type_name.as_str() {
            "market" => OrderKind::Market,
            "limit" => OrderKind::Limit {
                limit_price: expr("limit_price")?,
            },
            "stop" => OrderKind::Stop {
                stop_price: expr("stop_price")?,
            },
            "stop_limit" => OrderKind::StopLimit {
                stop_price: expr("stop_price")?,
                limit_price: expr("limit_price")?,
            },
            "trailing_stop" => OrderKind::TrailingStop {
                trail_amount: expr("trail_amount")?,
            },
            "oco" => {
                let legs = field(obj, "orders", context)?
                    .as_array()
                    .ok_or_else(|| BuildError::malformed(context, "oco orders must be an array"))?;
                OrderKind::Oco {
                    orders: legs
                        .iter()
                        .map(|leg| self.build_order(leg, context))
                        .collect::<Result<Vec<_>, _>>()?,
                }
            }
            "bracket" => OrderKind::Bracket {
                take_profit: expr("take_profit")?,
                stop_loss: expr("stop_loss")?,
            },
            "iceberg" => OrderKind::Iceberg {
                limit_price: expr("limit_price")?,
                display_quantity: expr("display_quantity")?,
            },
            "all_or_none" => OrderKind::AllOrNone {
                limit_price: optional_expr("limit_price")?,
            },
            "fok" => OrderKind::FillOrKill {
                limit_price: optional_expr("limit_price")?,
            },
            "ioc" => OrderKind::ImmediateOrCancel {
                limit_price: optional_expr("limit_price")?,
            },
            "gtd" => OrderKind::GoodTillDate {
                limit_price: optional_expr("limit_price")?,
                expires: required_string(obj, "expires", context)?,
            },
            "pegged" => OrderKind::Pegged {
                peg: required_string(obj, "peg", context)?,
                peg_offset: optional_expr("peg_offset")?.unwrap_or(Expression::Literal(0.0)),
            },
            other => {
                return Err(BuildError::malformed(
                    context,
                    format!("unknown order type '{}'", other),
                ));
            }
        };

        Ok(Order {
            symbol: self.build_symbol(field(obj, "symbol", context)?, context)?,
            side,
            quantity: expr("quantity")?,
            time_in_force,
            kind,
        })
    }

    fn build_rule(&self, value: &Value) -> Result<Rule, BuildError> {
        let obj = object(value, "rule")?;
        let condition = self.build_condition(field(obj, "condition", "rule")?)?;
        let then_actions = self.build_action_list(field(obj, "then", "rule")?)?;
        let else_actions = match obj.get("else") {
            None | Some(Value::Null) => None,
            Some(v) => Some(self.build_action_list(v)?),
        };
        Ok(Rule {
            condition,
            then_actions,
            else_actions,
        })
    }

    fn build_action_list(&self, value: &Value) -> Result<ActionList, BuildError> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        BuildError::malformed("action list", format!("expected action id, found {}", item))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(ActionList::Ids),
            Value::String(id) => Ok(ActionList::Ids(vec![id.clone()])),
            Value::Object(_) => Ok(ActionList::Nested(Box::new(self.build_rule(value)?))),
            other => Err(BuildError::malformed(
                "action list",
                format!("expected ids or a nested rule, found {}", other),
            )),
        }
    }

    fn build_position_limit(&self, value: &Value) -> Result<PositionLimit, BuildError> {
        let obj = object(value, "position limit")?;
        Ok(PositionLimit {
            symbol: self.build_symbol(field(obj, "symbol", "position limit")?, "position limit")?,
            max: self.build_expression(field(obj, "max", "position limit")?)?,
            min: self.build_expression(field(obj, "min", "position limit")?)?,
        })
    }

    fn build_condition(&self, value: &Value) -> Result<Condition, BuildError> {
        let unrecognized = || BuildError::UnrecognizedCondition {
            fragment: value.to_string(),
        };
        let obj = value.as_object().ok_or_else(unrecognized)?;

        let present: Vec<&str> = ["expression", "and", "or"]
            .into_iter()
            .filter(|k| obj.contains_key(*k))
            .collect();
        if present.len() != 1 {
            return Err(unrecognized());
        }

        match present[0] {
            "expression" => self.build_comparison(&obj["expression"]),
            key => {
                let operator = if key == "and" {
                    LogicalOperator::And
                } else {
                    LogicalOperator::Or
                };
                let items = obj[key].as_array().ok_or_else(unrecognized)?;
                let children = items
                    .iter()
                    .map(|item| self.build_logical_child(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Condition::Logical { operator, children })
            }
        }
    }

    /// Items of an `and`/`or` list are either nested conditions or inline
    /// comparisons.
    fn build_logical_child(&self, value: &Value) -> Result<Condition, BuildError> {
        match value.as_object() {
            Some(obj) if is_binary_shape(obj) => self.build_comparison(value),
            _ => self.build_condition(value),
        }
    }

    fn build_comparison(&self, value: &Value) -> Result<Condition, BuildError> {
        let obj = match value.as_object() {
            Some(obj) if is_binary_shape(obj) => obj,
            _ => {
                return Err(BuildError::UnrecognizedCondition {
                    fragment: value.to_string(),
                });
            }
        };
        let symbol = required_string(obj, "operator", "comparison")?;
        let operator = ComparisonOperator::from_symbol(&symbol).ok_or_else(|| {
            BuildError::malformed("comparison", format!("unknown operator '{}'", symbol))
        })?;
        Ok(Condition::Comparison(Comparison::new(
            operator,
            self.build_expression(&obj["operandA"])?,
            self.build_expression(&obj["operandB"])?,
        )))
    }

    fn build_expression(&self, value: &Value) -> Result<Expression, BuildError> {
        let unrecognized = || BuildError::UnrecognizedExpression {
            fragment: value.to_string(),
        };

        if let Value::Number(n) = value {
            return n.as_f64().map(Expression::Literal).ok_or_else(unrecognized);
        }
        let obj = value.as_object().ok_or_else(unrecognized)?;

        if obj.len() == 1 {
            if let Some(name) = obj.get("var") {
                return name
                    .as_str()
                    .map(|n| Expression::Variable(n.to_string()))
                    .ok_or_else(|| BuildError::malformed("variable", "var must be a string"));
            }
        }

        if is_binary_shape(obj) {
            let symbol = required_string(obj, "operator", "binary operation")?;
            let operator = BinaryOperator::from_symbol(&symbol).ok_or_else(|| {
                BuildError::malformed("binary operation", format!("unknown operator '{}'", symbol))
            })?;
            return Ok(Expression::binary(
                operator,
                self.build_expression(&obj["operandA"])?,
                self.build_expression(&obj["operandB"])?,
            ));
        }

        if obj.contains_key("indicator_id") {
            let indicator_id = required_string(obj, "indicator_id", "indicator reference")?;
            let output = match obj.get("output") {
                None | Some(Value::Null) => None,
                Some(Value::String(name)) => Some(OutputSelector::Name(name.clone())),
                Some(Value::Number(n)) => match n.as_u64() {
                    Some(i) => Some(OutputSelector::Index(i as usize)),
                    None => {
                        return Err(BuildError::malformed(
                            "indicator reference",
                            "output index must be a non-negative integer",
                        ));
                    }
                },
                Some(other) => {
                    return Err(BuildError::malformed(
                        "indicator reference",
                        format!("output must be a name or index, found {}", other),
                    ));
                }
            };
            return Ok(Expression::IndicatorOutput {
                indicator_id,
                output,
            });
        }

        if obj.contains_key("candle_id") && obj.contains_key("field") {
            let candle_id = required_string(obj, "candle_id", "candle reference")?;
            let name = required_string(obj, "field", "candle reference")?;
            let field = CandleField::from_name(&name.to_lowercase()).ok_or_else(|| {
                BuildError::malformed("candle reference", format!("unknown field '{}'", name))
            })?;
            return Ok(Expression::CandleField { candle_id, field });
        }

        Err(unrecognized())
    }
}

fn is_binary_shape(obj: &Object) -> bool {
    obj.contains_key("operator") && obj.contains_key("operandA") && obj.contains_key("operandB")
}

fn build_timeframe(value: &Value, context: &str) -> Result<Timeframe, BuildError> {
    let obj = object(value, context)?;
    let name = required_string(obj, "period", context)?;
    let period = Period::from_name(&name.to_lowercase()).ok_or_else(|| {
        BuildError::malformed(context, format!("unknown timeframe period '{}'", name))
    })?;
    let length = field(obj, "length", context)?
        .as_i64()
        .ok_or_else(|| BuildError::malformed(context, "timeframe length must be an integer"))?;
    Ok(Timeframe { period, length })
}

fn collection<'v>(root: &'v Object, key: &str) -> Result<&'v [Value], BuildError> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(BuildError::malformed(key, "expected an array")),
    }
}

fn object<'v>(value: &'v Value, context: &str) -> Result<&'v Object, BuildError> {
    value
        .as_object()
        .ok_or_else(|| BuildError::malformed(context, format!("expected an object, found {}", value)))
}

fn field<'v>(obj: &'v Object, key: &str, context: &str) -> Result<&'v Value, BuildError> {
    obj.get(key)
        .ok_or_else(|| BuildError::malformed(context, format!("missing '{}'", key)))
}

fn required_string(obj: &Object, key: &str, context: &str) -> Result<String, BuildError> {
    match field(obj, key, context)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(BuildError::malformed(
            context,
            format!("'{}' must be a string, found {}", key, other),
        )),
    }
}

fn optional_string(obj: &Object, key: &str, context: &str) -> Result<Option<String>, BuildError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(BuildError::malformed(
            context,
            format!("'{}' must be a string, found {}", key, other),
        )),
    }
}

/// Builds the AST, registering ids into `context` as a side effect.
pub fn build(document: &Value, context: &mut ValidationContext<'_>) -> Result<Strategy, BuildError> {
    Builder::new(context).build_strategy(document)
}

/// Builds the AST together with a fresh validation context over `registry`.
pub fn build_with_registry<'r>(
    document: &Value,
    registry: &'r IndicatorRegistry,
) -> Result<(Strategy, ValidationContext<'r>), BuildError> {
    let mut context = ValidationContext::new(registry);
    let strategy = build(document, &mut context)?;
    Ok((strategy, context))
}

/// Builds a single expression fragment. No ids are registered.
pub fn parse_expression(value: &Value) -> Result<Expression, BuildError> {
    let registry = IndicatorRegistry::new();
    let mut context = ValidationContext::new(&registry);
    Builder::new(&mut context).build_expression(value)
}

/// Builds a single condition fragment. A bare binary shape is read as an
/// inline comparison.
pub fn parse_condition(value: &Value) -> Result<Condition, BuildError> {
    let registry = IndicatorRegistry::new();
    let mut context = ValidationContext::new(&registry);
    Builder::new(&mut context).build_logical_child(value)
}
