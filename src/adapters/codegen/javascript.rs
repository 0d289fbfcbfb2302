//! JavaScript backend: one ES class per strategy.
//!
//! The class binds a broker and a variable map. Indicator and candle values
//! come from the `context` passed to `evaluateRules`/`dispatch`; the runtime
//! computes them.

use std::fmt::Write;

use crate::adapters::codegen::{
    base_name, check_indicator, check_order, format_number, indent, lookup_source, quote,
    resolve_output, sanitize_identifier,
};
use crate::domain::error::CodegenError;
use crate::domain::expression::{
    BinaryOperator, CandleField, ComparisonOperator, CrossDirection, LogicalOperator,
    OutputSelector,
};
use crate::domain::index::StrategyIndex;
use crate::domain::registry::standard_outputs;
use crate::domain::strategy::{
    Action, ActionList, DataSource, Order, OrderKind, PositionLimit, Rule, Strategy, SymbolRef,
};
use crate::ports::codegen_port::{CodeGenerator, Scope, Target};

const SUPPORTED_INDICATORS: &[&str] = &[
    "SMA", "EMA", "WMA", "RSI", "MACD", "BBANDS", "ATR", "STOCH", "ADX", "CCI", "ROC", "OBV",
    "VWAP", "MOM",
];

const SUPPORTED_ORDERS: &[&str] = &["market", "limit", "stop", "stop_limit"];

#[derive(Debug, Clone)]
pub struct JavaScriptGenerator {
    class_suffix: String,
}

impl Default for JavaScriptGenerator {
    fn default() -> Self {
        Self::new("Strategy")
    }
}

impl JavaScriptGenerator {
    pub fn new(class_suffix: impl Into<String>) -> Self {
        Self {
            class_suffix: class_suffix.into(),
        }
    }

    fn render_symbol(&self, symbol: &SymbolRef) -> String {
        match symbol {
            SymbolRef::Literal(s) => quote(s),
            SymbolRef::Variable(name) => self.render_variable(name),
        }
    }

    fn render_action_list(&self, scope: &Scope<'_>, list: &ActionList) -> Result<String, CodegenError> {
        match list {
            ActionList::Ids(ids) => Ok(ids
                .iter()
                .map(|id| format!("actions.push({});", quote(id)))
                .collect::<Vec<_>>()
                .join("\n")),
            ActionList::Nested(rule) => self.render_rule(scope, rule),
        }
    }

    fn write_prelude(&self, out: &mut String, strategy: &Strategy) -> Result<(), CodegenError> {
        writeln!(out, "// Strategy: {}", strategy.name.as_deref().unwrap_or("unnamed"))?;
        if let Some(description) = &strategy.description {
            for line in description.lines() {
                writeln!(out, "// {}", line)?;
            }
        }
        writeln!(out, "\"use strict\";")?;
        writeln!(out)?;
        for (class, message) in [
            ("DivisionByZeroError", "\"division by zero\""),
            ("UnboundVariableError", "`unbound variable '${detail}'`"),
            ("MissingIndicatorValueError", "`missing value for indicator '${detail}'`"),
            ("MissingCandleValueError", "`missing value for candle '${detail}'`"),
        ] {
            writeln!(out, "class {} extends Error {{", class)?;
            writeln!(out, "  constructor(detail) {{")?;
            writeln!(out, "    super({});", message)?;
            writeln!(out, "    this.name = \"{}\";", class)?;
            writeln!(out, "  }}")?;
            writeln!(out, "}}")?;
            writeln!(out)?;
        }
        Ok(())
    }

    fn write_helpers(&self, out: &mut String) -> Result<(), CodegenError> {
        writeln!(out, "  variable(name) {{")?;
        writeln!(out, "    if (!(name in this.variables)) throw new UnboundVariableError(name);")?;
        writeln!(out, "    return this.variables[name];")?;
        writeln!(out, "  }}")?;
        writeln!(out)?;
        writeln!(out, "  div(a, b) {{")?;
        writeln!(out, "    if (b === 0) throw new DivisionByZeroError();")?;
        writeln!(out, "    return a / b;")?;
        writeln!(out, "  }}")?;
        writeln!(out)?;
        writeln!(out, "  mod(a, b) {{")?;
        writeln!(out, "    if (b === 0) throw new DivisionByZeroError();")?;
        writeln!(out, "    return a % b;")?;
        writeln!(out, "  }}")?;
        writeln!(out)?;
        writeln!(out, "  approxEq(a, b) {{")?;
        writeln!(out, "    return Math.abs(a - b) < 1e-10;")?;
        writeln!(out, "  }}")?;
        writeln!(out)?;
        Ok(())
    }

    fn source_descriptor(&self, source: &DataSource) -> String {
        let mut fields = vec![
            format!("id: {}", quote(&source.id)),
            format!("symbol: {}", self.render_symbol(&source.symbol)),
            format!(
                "timeframe: {{ period: {}, length: {} }}",
                quote(source.timeframe.period.name()),
                source.timeframe.length
            ),
        ];
        if let (Some(kind), Some(params)) = (source.indicator_type(), source.params()) {
            fields.insert(1, format!("type: {}", quote(kind)));
            let params = serde_json::to_string(params).unwrap_or_else(|_| "{}".to_string());
            fields.push(format!("params: {}", params));
        }
        format!("{{ {} }}", fields.join(", "))
    }
}

fn shifted(offset: u32) -> String {
    if offset == 0 {
        "barsAgo".to_string()
    } else {
        format!("barsAgo + {}", offset)
    }
}

impl CodeGenerator for JavaScriptGenerator {
    fn target(&self) -> Target {
        Target::JavaScript
    }

    fn generate(&self, strategy: &Strategy) -> Result<String, CodegenError> {
        let scope = StrategyIndex::new(strategy);
        let class_name = format!("{}{}", base_name(strategy), self.class_suffix);
        let mut out = String::with_capacity(4096);

        self.write_prelude(&mut out, strategy)?;

        writeln!(out, "class {} {{", class_name)?;
        writeln!(out, "  constructor(broker, variables = {{}}) {{")?;
        writeln!(out, "    this.broker = broker;")?;
        writeln!(out, "    this.variables = {{ ...variables }};")?;
        writeln!(out, "  }}")?;
        writeln!(out)?;
        self.write_helpers(&mut out)?;

        for source in scope.indicator_sources().into_iter().chain(scope.candle_sources()) {
            writeln!(out, "{}", indent(&self.render_data_source(&scope, source)?, 2))?;
            writeln!(out)?;
        }

        writeln!(out, "  evaluateRules(context) {{")?;
        writeln!(out, "    const actions = [];")?;
        for (i, rule) in strategy.rules.iter().enumerate() {
            writeln!(out, "    // rule {}", i + 1)?;
            writeln!(out, "{}", indent(&self.render_rule(&scope, rule)?, 4))?;
        }
        writeln!(out, "    return actions;")?;
        writeln!(out, "  }}")?;
        writeln!(out)?;

        writeln!(out, "  withinPositionLimits(context, order) {{")?;
        writeln!(
            out,
            "    const projected = this.broker.netPosition(order.symbol) + (order.side === \"buy\" ? order.quantity : -order.quantity);"
        )?;
        for limit in &strategy.position_limits {
            writeln!(out, "{}", indent(&self.render_position_limit(&scope, limit)?, 4))?;
        }
        writeln!(out, "    return true;")?;
        writeln!(out, "  }}")?;
        writeln!(out)?;

        writeln!(out, "  dispatch(actionId, context) {{")?;
        writeln!(out, "    switch (actionId) {{")?;
        for action in scope.actions() {
            writeln!(out, "{}", indent(&self.render_action(&scope, action)?, 6))?;
        }
        writeln!(out, "      default:")?;
        writeln!(out, "        throw new Error(`unknown action '${{actionId}}'`);")?;
        writeln!(out, "    }}")?;
        writeln!(out, "  }}")?;
        writeln!(out)?;

        writeln!(out, "  onBar(context) {{")?;
        writeln!(out, "    return this.evaluateRules(context).map((id) => this.dispatch(id, context));")?;
        writeln!(out, "  }}")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        writeln!(
            out,
            "module.exports = {{ {}, DivisionByZeroError, UnboundVariableError, MissingIndicatorValueError, MissingCandleValueError }};",
            class_name
        )?;
        Ok(out)
    }

    fn render_literal(&self, value: f64) -> String {
        format_number(value)
    }

    fn render_variable(&self, name: &str) -> String {
        format!("this.variable({})", quote(name))
    }

    fn render_binary(&self, operator: BinaryOperator, left: &str, right: &str) -> String {
        match operator {
            BinaryOperator::Add => format!("({} + {})", left, right),
            BinaryOperator::Subtract => format!("({} - {})", left, right),
            BinaryOperator::Multiply => format!("({} * {})", left, right),
            BinaryOperator::Divide => format!("this.div({}, {})", left, right),
            BinaryOperator::Modulo => format!("this.mod({}, {})", left, right),
            BinaryOperator::Percent => format!("(({} / 100) * {})", left, right),
        }
    }

    fn render_indicator_output(
        &self,
        scope: &Scope<'_>,
        indicator_id: &str,
        output: Option<&OutputSelector>,
        shift: usize,
    ) -> Result<String, CodegenError> {
        let source = lookup_source(self.target(), scope, indicator_id)?;
        let index = resolve_output(self.target(), source, output)?;
        let name = standard_outputs(source.indicator_type().unwrap_or_default())[index];
        Ok(format!(
            "this.indicator_{}(context, {}, {})",
            sanitize_identifier(indicator_id),
            quote(name),
            shift
        ))
    }

    fn render_candle_field(
        &self,
        scope: &Scope<'_>,
        candle_id: &str,
        field: CandleField,
        shift: usize,
    ) -> Result<String, CodegenError> {
        lookup_source(self.target(), scope, candle_id)?;
        Ok(format!(
            "this.candle_{}(context, {}, {})",
            sanitize_identifier(candle_id),
            quote(field.name()),
            shift
        ))
    }

    fn render_comparison(&self, operator: ComparisonOperator, left: &str, right: &str) -> String {
        match operator {
            ComparisonOperator::Equal => format!("this.approxEq({}, {})", left, right),
            ComparisonOperator::NotEqual => format!("!this.approxEq({}, {})", left, right),
            other => format!("({} {} {})", left, other.symbol(), right),
        }
    }

    fn render_logical(&self, operator: LogicalOperator, children: &[String]) -> String {
        let (joiner, empty) = match operator {
            LogicalOperator::And => (" && ", "true"),
            LogicalOperator::Or => (" || ", "false"),
        };
        if children.is_empty() {
            empty.to_string()
        } else {
            format!("({})", children.join(joiner))
        }
    }

    fn render_crossover(
        &self,
        direction: CrossDirection,
        current: (&str, &str),
        previous: (&str, &str),
    ) -> String {
        match direction {
            CrossDirection::Above => format!(
                "({} > {} && {} <= {})",
                current.0, current.1, previous.0, previous.1
            ),
            CrossDirection::Below => format!(
                "({} < {} && {} >= {})",
                current.0, current.1, previous.0, previous.1
            ),
        }
    }

    fn render_data_source(&self, _scope: &Scope<'_>, source: &DataSource) -> Result<String, CodegenError> {
        check_indicator(self.target(), SUPPORTED_INDICATORS, source)?;
        let ident = sanitize_identifier(&source.id);
        let mut out = String::new();
        if let Some(kind) = source.indicator_type() {
            let default_output = standard_outputs(kind)[0];
            writeln!(
                out,
                "indicator_{}(context, output = {}, barsAgo = 0) {{",
                ident,
                quote(default_output)
            )?;
            writeln!(
                out,
                "  const value = context.indicator({}, output, {});",
                self.source_descriptor(source),
                shifted(source.offset)
            )?;
            writeln!(
                out,
                "  if (typeof value !== \"number\" || Number.isNaN(value)) throw new MissingIndicatorValueError({});",
                quote(&source.id)
            )?;
        } else {
            writeln!(out, "candle_{}(context, field, barsAgo = 0) {{", ident)?;
            writeln!(
                out,
                "  const value = context.candle({}, field, {});",
                self.source_descriptor(source),
                shifted(source.offset)
            )?;
            writeln!(
                out,
                "  if (typeof value !== \"number\" || Number.isNaN(value)) throw new MissingCandleValueError({});",
                quote(&source.id)
            )?;
        }
        writeln!(out, "  return value;")?;
        write!(out, "}}")?;
        Ok(out)
    }

    fn render_rule(&self, scope: &Scope<'_>, rule: &Rule) -> Result<String, CodegenError> {
        let condition = self.render_condition(scope, &rule.condition, 0)?;
        let mut out = String::new();
        writeln!(out, "if ({}) {{", condition)?;
        writeln!(out, "{}", indent(&self.render_action_list(scope, &rule.then_actions)?, 2))?;
        if let Some(else_actions) = &rule.else_actions {
            writeln!(out, "}} else {{")?;
            writeln!(out, "{}", indent(&self.render_action_list(scope, else_actions)?, 2))?;
        }
        write!(out, "}}")?;
        Ok(out)
    }

    fn render_action(&self, scope: &Scope<'_>, action: &Action) -> Result<String, CodegenError> {
        let order = self.render_order(scope, &action.order)?;
        let mut out = String::new();
        writeln!(out, "case {}: {{", quote(&action.id))?;
        writeln!(out, "  const order = {};", order)?;
        writeln!(out, "  if (!this.withinPositionLimits(context, order)) return null;")?;
        writeln!(out, "  return this.broker.submitOrder(order);")?;
        write!(out, "}}")?;
        Ok(out)
    }

    fn render_order(&self, scope: &Scope<'_>, order: &Order) -> Result<String, CodegenError> {
        check_order(self.target(), SUPPORTED_ORDERS, order)?;
        let mut fields = vec![
            format!("type: {}", quote(order.kind.name())),
            format!("symbol: {}", self.render_symbol(&order.symbol)),
            format!("side: {}", quote(order.side.name())),
            format!("quantity: {}", self.render_expression(scope, &order.quantity, 0)?),
            format!("timeInForce: {}", quote(order.time_in_force.name())),
        ];
        match &order.kind {
            OrderKind::Limit { limit_price } => {
                fields.push(format!("limitPrice: {}", self.render_expression(scope, limit_price, 0)?));
            }
            OrderKind::Stop { stop_price } => {
                fields.push(format!("stopPrice: {}", self.render_expression(scope, stop_price, 0)?));
            }
            OrderKind::StopLimit {
                stop_price,
                limit_price,
            } => {
                fields.push(format!("stopPrice: {}", self.render_expression(scope, stop_price, 0)?));
                fields.push(format!("limitPrice: {}", self.render_expression(scope, limit_price, 0)?));
            }
            _ => {}
        }
        Ok(format!("{{ {} }}", fields.join(", ")))
    }

    fn render_position_limit(
        &self,
        scope: &Scope<'_>,
        limit: &PositionLimit,
    ) -> Result<String, CodegenError> {
        let max = self.render_expression(scope, &limit.max, 0)?;
        let min = self.render_expression(scope, &limit.min, 0)?;
        Ok(format!(
            "if (order.symbol === {} && (projected > {} || projected < {})) return false;",
            self.render_symbol(&limit.symbol),
            max,
            min
        ))
    }
}
