//! Read-only lookups over a built strategy, shared by the code generators.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::expression::{Condition, Expression};
use crate::domain::strategy::{
    Action, ActionList, DataSource, Order, OrderKind, Rule, Strategy, SymbolRef,
};

#[derive(Debug, Clone)]
pub struct StrategyIndex<'s> {
    strategy: &'s Strategy,
    data_sources: BTreeMap<&'s str, &'s DataSource>,
    variables: VariableUse<'s>,
}

/// Where free variables appear: as a symbol, inside an expression, or both.
#[derive(Debug, Clone, Default)]
struct VariableUse<'s> {
    symbols: BTreeSet<&'s str>,
    numbers: BTreeSet<&'s str>,
}

impl<'s> StrategyIndex<'s> {
    pub fn new(strategy: &'s Strategy) -> Self {
        let mut data_sources = BTreeMap::new();
        for source in &strategy.data_sources {
            data_sources.entry(source.id.as_str()).or_insert(source);
        }

        let mut variables = VariableUse::default();
        for source in &strategy.data_sources {
            collect_symbol(&source.symbol, &mut variables);
        }
        for rule in &strategy.rules {
            collect_rule(rule, &mut variables);
        }
        for action in &strategy.actions {
            collect_order(&action.order, &mut variables);
        }
        for limit in &strategy.position_limits {
            collect_symbol(&limit.symbol, &mut variables);
            collect_expression(&limit.max, &mut variables);
            collect_expression(&limit.min, &mut variables);
        }

        Self {
            strategy,
            data_sources,
            variables,
        }
    }

    pub fn strategy(&self) -> &'s Strategy {
        self.strategy
    }

    pub fn data_source(&self, id: &str) -> Option<&'s DataSource> {
        self.data_sources.get(id).copied()
    }

    /// Indicator sources in declaration order, first occurrence of each id.
    pub fn indicator_sources(&self) -> Vec<&'s DataSource> {
        self.unique_sources().filter(|s| s.is_indicator()).collect()
    }

    pub fn candle_sources(&self) -> Vec<&'s DataSource> {
        self.unique_sources().filter(|s| !s.is_indicator()).collect()
    }

    /// Actions in declaration order, first occurrence of each id.
    pub fn actions(&self) -> Vec<&'s Action> {
        let mut seen = BTreeSet::new();
        self.strategy
            .actions
            .iter()
            .filter(|a| seen.insert(a.id.as_str()))
            .collect()
    }

    /// Every free variable name, sorted.
    pub fn variables(&self) -> impl Iterator<Item = &'s str> + '_ {
        self.variables.symbols.union(&self.variables.numbers).copied()
    }

    /// True when `name` is used as a data source, order or limit symbol.
    pub fn is_symbol_variable(&self, name: &str) -> bool {
        self.variables.symbols.contains(name)
    }

    /// True when `name` is read inside any expression.
    pub fn is_numeric_variable(&self, name: &str) -> bool {
        self.variables.numbers.contains(name)
    }

    fn unique_sources(&self) -> impl Iterator<Item = &'s DataSource> + '_ {
        let mut seen = BTreeSet::new();
        self.strategy
            .data_sources
            .iter()
            .filter(move |s| seen.insert(s.id.as_str()))
    }
}

fn collect_symbol<'s>(symbol: &'s SymbolRef, out: &mut VariableUse<'s>) {
    if let SymbolRef::Variable(name) = symbol {
        out.symbols.insert(name.as_str());
    }
}

fn collect_rule<'s>(rule: &'s Rule, out: &mut VariableUse<'s>) {
    collect_condition(&rule.condition, out);
    for list in std::iter::once(&rule.then_actions).chain(rule.else_actions.as_ref()) {
        if let ActionList::Nested(nested) = list {
            collect_rule(nested, out);
        }
    }
}

fn collect_order<'s>(order: &'s Order, out: &mut VariableUse<'s>) {
    collect_symbol(&order.symbol, out);
    collect_expression(&order.quantity, out);
    if let OrderKind::Oco { orders } = &order.kind {
        for leg in orders {
            collect_order(leg, out);
        }
    } else {
        for expr in order.kind.expressions() {
            collect_expression(expr, out);
        }
    }
}

fn collect_condition<'s>(condition: &'s Condition, out: &mut VariableUse<'s>) {
    match condition {
        Condition::Comparison(cmp) => {
            collect_expression(&cmp.left, out);
            collect_expression(&cmp.right, out);
        }
        Condition::Logical { children, .. } => {
            for child in children {
                collect_condition(child, out);
            }
        }
        Condition::Crossover(cross) => {
            collect_expression(&cross.series_a, out);
            collect_expression(&cross.series_b, out);
        }
    }
}

fn collect_expression<'s>(expr: &'s Expression, out: &mut VariableUse<'s>) {
    match expr {
        Expression::Variable(name) => {
            out.numbers.insert(name.as_str());
        }
        Expression::Binary { left, right, .. } => {
            collect_expression(left, out);
            collect_expression(right, out);
        }
        Expression::Literal(_) | Expression::IndicatorOutput { .. } | Expression::CandleField { .. } => {}
    }
}
