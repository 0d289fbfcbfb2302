//! Expression interpreter and constant folding.
//!
//! # Evaluation Semantics
//!
//! - `+ - *`: IEEE arithmetic
//! - `/` and `mod`: fail with [`EvalError::DivisionByZero`] on a zero divisor;
//!   `mod` is the floating remainder (sign follows the dividend)
//! - `pct`: `(left / 100) * right`
//! - `==` / `!=`: equal when `|a - b| < EPSILON`; `< > <= >=` are exact
//! - `AND` short-circuits on the first `false`, `OR` on the first `true`
//! - Crossover compares the current sample against the previous one
//!
//! Generated programs implement the same rules at run time.

use std::collections::BTreeMap;

use crate::domain::error::EvalError;
use crate::domain::expression::{
    BinaryOperator, CandleField, Comparison, ComparisonOperator, Condition, CrossDirection,
    Crossover, Expression, LogicalOperator, OutputSelector,
};
use crate::domain::strategy::{Action, ActionList, Order, OrderKind, PositionLimit, Rule, Strategy};

pub const EPSILON: f64 = 1e-10;

/// Runtime values an expression may read. `bars_ago` is 0 for the current
/// bar.
pub trait EvalContext {
    fn variable(&self, name: &str) -> Option<f64>;

    fn indicator_output(
        &self,
        indicator_id: &str,
        output: Option<&OutputSelector>,
        bars_ago: usize,
    ) -> Option<f64>;

    fn candle_field(&self, candle_id: &str, field: CandleField, bars_ago: usize) -> Option<f64>;
}

/// In-memory [`EvalContext`]. Series are stored oldest first; the last
/// element is the current bar.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    variables: BTreeMap<String, f64>,
    indicators: BTreeMap<String, Vec<(String, Vec<f64>)>>,
    candles: BTreeMap<(String, CandleField), Vec<f64>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: f64) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Single-output indicator.
    pub fn with_indicator(self, indicator_id: impl Into<String>, series: Vec<f64>) -> Self {
        self.with_indicator_outputs(indicator_id, vec![("value".to_string(), series)])
    }

    /// Outputs in declaration order; the first one is the default.
    pub fn with_indicator_outputs(
        mut self,
        indicator_id: impl Into<String>,
        outputs: Vec<(String, Vec<f64>)>,
    ) -> Self {
        self.indicators.insert(indicator_id.into(), outputs);
        self
    }

    pub fn with_candle(mut self, candle_id: impl Into<String>, field: CandleField, series: Vec<f64>) -> Self {
        self.candles.insert((candle_id.into(), field), series);
        self
    }
}

fn sample(series: &[f64], bars_ago: usize) -> Option<f64> {
    series.len().checked_sub(bars_ago + 1).map(|i| series[i])
}

impl EvalContext for Bindings {
    fn variable(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    fn indicator_output(
        &self,
        indicator_id: &str,
        output: Option<&OutputSelector>,
        bars_ago: usize,
    ) -> Option<f64> {
        let outputs = self.indicators.get(indicator_id)?;
        let series = match output {
            None => outputs.first().map(|(_, s)| s),
            Some(OutputSelector::Index(i)) => outputs.get(*i).map(|(_, s)| s),
            Some(OutputSelector::Name(name)) => {
                outputs.iter().find(|(n, _)| n == name).map(|(_, s)| s)
            }
        }?;
        sample(series, bars_ago)
    }

    fn candle_field(&self, candle_id: &str, field: CandleField, bars_ago: usize) -> Option<f64> {
        let series = self.candles.get(&(candle_id.to_string(), field))?;
        sample(series, bars_ago)
    }
}

pub fn apply(operator: BinaryOperator, left: f64, right: f64) -> Result<f64, EvalError> {
    match operator {
        BinaryOperator::Add => Ok(left + right),
        BinaryOperator::Subtract => Ok(left - right),
        BinaryOperator::Multiply => Ok(left * right),
        BinaryOperator::Divide if right == 0.0 => Err(EvalError::DivisionByZero),
        BinaryOperator::Divide => Ok(left / right),
        BinaryOperator::Modulo if right == 0.0 => Err(EvalError::DivisionByZero),
        BinaryOperator::Modulo => Ok(left % right),
        BinaryOperator::Percent => Ok((left / 100.0) * right),
    }
}

pub fn compare(operator: ComparisonOperator, left: f64, right: f64) -> bool {
    match operator {
        ComparisonOperator::Less => left < right,
        ComparisonOperator::Greater => left > right,
        ComparisonOperator::LessOrEqual => left <= right,
        ComparisonOperator::GreaterOrEqual => left >= right,
        ComparisonOperator::Equal => (left - right).abs() < EPSILON,
        ComparisonOperator::NotEqual => !compare(ComparisonOperator::Equal, left, right),
    }
}

pub fn evaluate(expr: &Expression, ctx: &dyn EvalContext) -> Result<f64, EvalError> {
    evaluate_at(expr, ctx, 0)
}

/// Evaluates `expr` as of `bars_ago` bars before the current one. Variables
/// are not time-shifted.
pub fn evaluate_at(expr: &Expression, ctx: &dyn EvalContext, bars_ago: usize) -> Result<f64, EvalError> {
    match expr {
        Expression::Literal(value) => Ok(*value),
        Expression::Variable(name) => ctx
            .variable(name)
            .ok_or_else(|| EvalError::UnboundVariable { name: name.clone() }),
        Expression::Binary {
            operator,
            left,
            right,
        } => {
            let l = evaluate_at(left, ctx, bars_ago)?;
            let r = evaluate_at(right, ctx, bars_ago)?;
            apply(*operator, l, r)
        }
        Expression::IndicatorOutput {
            indicator_id,
            output,
        } => ctx
            .indicator_output(indicator_id, output.as_ref(), bars_ago)
            .ok_or_else(|| EvalError::MissingIndicatorValue {
                indicator_id: indicator_id.clone(),
            }),
        Expression::CandleField { candle_id, field } => ctx
            .candle_field(candle_id, *field, bars_ago)
            .ok_or_else(|| EvalError::MissingCandleValue {
                candle_id: candle_id.clone(),
            }),
    }
}

pub fn evaluate_comparison(
    cmp: &Comparison,
    ctx: &dyn EvalContext,
    bars_ago: usize,
) -> Result<bool, EvalError> {
    let l = evaluate_at(&cmp.left, ctx, bars_ago)?;
    let r = evaluate_at(&cmp.right, ctx, bars_ago)?;
    Ok(compare(cmp.operator, l, r))
}

pub fn evaluate_condition(cond: &Condition, ctx: &dyn EvalContext) -> Result<bool, EvalError> {
    evaluate_condition_at(cond, ctx, 0)
}

pub fn evaluate_condition_at(
    cond: &Condition,
    ctx: &dyn EvalContext,
    bars_ago: usize,
) -> Result<bool, EvalError> {
    match cond {
        Condition::Comparison(cmp) => evaluate_comparison(cmp, ctx, bars_ago),
        Condition::Logical {
            operator: LogicalOperator::And,
            children,
        } => {
            for child in children {
                if !evaluate_condition_at(child, ctx, bars_ago)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Logical {
            operator: LogicalOperator::Or,
            children,
        } => {
            for child in children {
                if evaluate_condition_at(child, ctx, bars_ago)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Crossover(cross) => evaluate_crossover(cross, ctx, bars_ago),
    }
}

fn evaluate_crossover(cross: &Crossover, ctx: &dyn EvalContext, bars_ago: usize) -> Result<bool, EvalError> {
    let a_curr = evaluate_at(&cross.series_a, ctx, bars_ago)?;
    let b_curr = evaluate_at(&cross.series_b, ctx, bars_ago)?;
    let a_prev = evaluate_at(&cross.series_a, ctx, bars_ago + 1)?;
    let b_prev = evaluate_at(&cross.series_b, ctx, bars_ago + 1)?;
    Ok(match cross.direction {
        CrossDirection::Above => a_curr > b_curr && a_prev <= b_prev,
        CrossDirection::Below => a_curr < b_curr && a_prev >= b_prev,
    })
}

/// Action ids selected by the strategy's rules, in rule order.
pub fn evaluate_rules(strategy: &Strategy, ctx: &dyn EvalContext) -> Result<Vec<String>, EvalError> {
    let mut selected = Vec::new();
    for rule in &strategy.rules {
        collect_rule(rule, ctx, &mut selected)?;
    }
    Ok(selected)
}

fn collect_rule(rule: &Rule, ctx: &dyn EvalContext, out: &mut Vec<String>) -> Result<(), EvalError> {
    let branch = if evaluate_condition(&rule.condition, ctx)? {
        Some(&rule.then_actions)
    } else {
        rule.else_actions.as_ref()
    };
    match branch {
        Some(ActionList::Ids(ids)) => out.extend(ids.iter().cloned()),
        Some(ActionList::Nested(nested)) => collect_rule(nested, ctx, out)?,
        None => {}
    }
    Ok(())
}

/// Folds literal-only subtrees. An operation that would fail is left in
/// place so the generated program raises the error at run time.
pub fn fold_constants(expr: &Expression) -> Expression {
    match expr {
        Expression::Binary {
            operator,
            left,
            right,
        } => {
            let left = fold_constants(left);
            let right = fold_constants(right);
            if let (Expression::Literal(l), Expression::Literal(r)) = (&left, &right) {
                if let Ok(value) = apply(*operator, *l, *r) {
                    if value.is_finite() {
                        return Expression::Literal(value);
                    }
                }
            }
            Expression::binary(*operator, left, right)
        }
        other => other.clone(),
    }
}

pub fn fold_condition(cond: &Condition) -> Condition {
    map_condition(cond, &fold_constants)
}

/// Returns a copy of `strategy` with every expression folded.
pub fn fold_strategy(strategy: &Strategy) -> Strategy {
    map_expressions(strategy, &fold_constants)
}

/// Rebuilds `strategy` with `f` applied to every expression root: operands of
/// comparisons and crossovers, order prices and sizes, and position bounds.
/// Data sources and ids are copied unchanged.
pub fn map_expressions(strategy: &Strategy, f: &dyn Fn(&Expression) -> Expression) -> Strategy {
    Strategy {
        name: strategy.name.clone(),
        description: strategy.description.clone(),
        data_sources: strategy.data_sources.clone(),
        rules: strategy.rules.iter().map(|r| map_rule(r, f)).collect(),
        actions: strategy
            .actions
            .iter()
            .map(|a| Action {
                id: a.id.clone(),
                order: map_order(&a.order, f),
            })
            .collect(),
        position_limits: strategy
            .position_limits
            .iter()
            .map(|l| PositionLimit {
                symbol: l.symbol.clone(),
                max: f(&l.max),
                min: f(&l.min),
            })
            .collect(),
    }
}

fn map_condition(cond: &Condition, f: &dyn Fn(&Expression) -> Expression) -> Condition {
    match cond {
        Condition::Comparison(cmp) => {
            Condition::Comparison(Comparison::new(cmp.operator, f(&cmp.left), f(&cmp.right)))
        }
        Condition::Logical { operator, children } => Condition::Logical {
            operator: *operator,
            children: children.iter().map(|c| map_condition(c, f)).collect(),
        },
        Condition::Crossover(cross) => Condition::Crossover(Crossover {
            series_a: f(&cross.series_a),
            series_b: f(&cross.series_b),
            direction: cross.direction,
        }),
    }
}

fn map_rule(rule: &Rule, f: &dyn Fn(&Expression) -> Expression) -> Rule {
    let map_list = |list: &ActionList| match list {
        ActionList::Ids(ids) => ActionList::Ids(ids.clone()),
        ActionList::Nested(nested) => ActionList::Nested(Box::new(map_rule(nested, f))),
    };
    Rule {
        condition: map_condition(&rule.condition, f),
        then_actions: map_list(&rule.then_actions),
        else_actions: rule.else_actions.as_ref().map(map_list),
    }
}

fn map_order(order: &Order, f: &dyn Fn(&Expression) -> Expression) -> Order {
    let kind = match &order.kind {
        OrderKind::Market => OrderKind::Market,
        OrderKind::Limit { limit_price } => OrderKind::Limit {
            limit_price: f(limit_price),
        },
        OrderKind::Stop { stop_price } => OrderKind::Stop {
            stop_price: f(stop_price),
        },
        OrderKind::StopLimit {
            stop_price,
            limit_price,
        } => OrderKind::StopLimit {
            stop_price: f(stop_price),
            limit_price: f(limit_price),
        },
        OrderKind::TrailingStop { trail_amount } => OrderKind::TrailingStop {
            trail_amount: f(trail_amount),
        },
        OrderKind::Oco { orders } => OrderKind::Oco {
            orders: orders.iter().map(|o| map_order(o, f)).collect(),
        },
        OrderKind::Bracket {
            take_profit,
            stop_loss,
        } => OrderKind::Bracket {
            take_profit: f(take_profit),
            stop_loss: f(stop_loss),
        },
        OrderKind::Iceberg {
            limit_price,
            display_quantity,
        } => OrderKind::Iceberg {
            limit_price: f(limit_price),
            display_quantity: f(display_quantity),
        },
        OrderKind::AllOrNone { limit_price } => OrderKind::AllOrNone {
            limit_price: limit_price.as_ref().map(f),
        },
        OrderKind::FillOrKill { limit_price } => OrderKind::FillOrKill {
            limit_price: limit_price.as_ref().map(f),
        },
        OrderKind::ImmediateOrCancel { limit_price } => OrderKind::ImmediateOrCancel {
            limit_price: limit_price.as_ref().map(f),
        },
        OrderKind::GoodTillDate {
            limit_price,
            expires,
        } => OrderKind::GoodTillDate {
            limit_price: limit_price.as_ref().map(f),
            expires: expires.clone(),
        },
        OrderKind::Pegged { peg, peg_offset } => OrderKind::Pegged {
            peg: peg.clone(),
            peg_offset: f(peg_offset),
        },
    };
    Order {
        symbol: order.symbol.clone(),
        side: order.side,
        quantity: f(&order.quantity),
        time_in_force: order.time_in_force,
        kind,
    }
}
