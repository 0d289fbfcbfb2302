//! Python backend: a pandas strategy class with indicator math delegated to
//! TA-Lib.
//!
//! The runtime supplies `context.frame(symbol, period, length)` returning an
//! OHLCV `DataFrame` (oldest row first) and a broker exposing
//! `net_position(symbol)` and `submit_order(order)`.

use std::fmt::Write;

use crate::adapters::codegen::{
    IndicatorParams, PriceSource, base_name, check_indicator, check_order, format_number, indent,
    lookup_source, quote, resolve_output, sanitize_identifier,
};
use crate::domain::error::CodegenError;
use crate::domain::expression::{
    BinaryOperator, CandleField, ComparisonOperator, CrossDirection, LogicalOperator,
    OutputSelector,
};
use crate::domain::index::StrategyIndex;
use crate::domain::strategy::{
    Action, ActionList, DataSource, Order, OrderKind, PositionLimit, Rule, Strategy, SymbolRef,
};
use crate::ports::codegen_port::{CodeGenerator, Scope, Target};

/// VWAP has no TA-Lib function.
const SUPPORTED_INDICATORS: &[&str] = &[
    "SMA", "EMA", "WMA", "RSI", "MACD", "BBANDS", "ATR", "STOCH", "ADX", "CCI", "ROC", "OBV", "MOM",
];

const SUPPORTED_ORDERS: &[&str] = &["market", "limit", "stop"];

#[derive(Debug, Clone)]
pub struct PythonGenerator {
    class_suffix: String,
    talib_module: String,
}

impl Default for PythonGenerator {
    fn default() -> Self {
        Self::new("Strategy", "talib")
    }
}

impl PythonGenerator {
    /// `talib_module` is imported under the name `talib`.
    pub fn new(class_suffix: impl Into<String>, talib_module: impl Into<String>) -> Self {
        Self {
            class_suffix: class_suffix.into(),
            talib_module: talib_module.into(),
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
            ActionList::Ids(ids) if ids.is_empty() => Ok("pass".to_string()),
            ActionList::Ids(ids) => Ok(ids
                .iter()
                .map(|id| format!("actions.append({})", quote(id)))
                .collect::<Vec<_>>()
                .join("\n")),
            ActionList::Nested(rule) => self.render_rule(scope, rule),
        }
    }

    fn talib_import(&self) -> String {
        if self.talib_module == "talib" {
            "import talib".to_string()
        } else {
            format!("import {} as talib", self.talib_module)
        }
    }

    fn frame_access(&self, source: &DataSource) -> String {
        format!(
            "frame = context.frame({}, {}, {})",
            self.render_symbol(&source.symbol),
            quote(source.timeframe.period.name()),
            source.timeframe.length
        )
    }

    /// TA-Lib call producing a tuple of output series in registry order.
    fn talib_outputs(&self, source: &DataSource, kind: &str) -> Result<String, CodegenError> {
        let params = IndicatorParams::new(self.target(), source);
        let hlc = "frame[\"high\"], frame[\"low\"], frame[\"close\"]";
        let single = |call: String| format!("({},)", call);
        let text = match kind {
            "SMA" | "EMA" | "WMA" | "RSI" | "ROC" | "MOM" => single(format!(
                "talib.{}({}, timeperiod={})",
                kind,
                price_column(params.price()?),
                params.int("period", 14)?
            )),
            "CCI" | "ATR" => single(format!(
                "talib.{}({}, timeperiod={})",
                kind,
                hlc,
                params.int("period", 14)?
            )),
            "ADX" => {
                let period = params.int("period", 14)?;
                format!(
                    "(talib.ADX({hlc}, timeperiod={p}), talib.PLUS_DI({hlc}, timeperiod={p}), talib.MINUS_DI({hlc}, timeperiod={p}))",
                    hlc = hlc,
                    p = period
                )
            }
            "MACD" => format!(
                "talib.MACD({}, fastperiod={}, slowperiod={}, signalperiod={})",
                price_column(params.price()?),
                params.int("fast_period", 12)?,
                params.int("slow_period", 26)?,
                params.int("signal_period", 9)?
            ),
            "BBANDS" => {
                let deviations = format_number(params.float("deviations", 2.0)?);
                format!(
                    "talib.BBANDS({}, timeperiod={}, nbdevup={}, nbdevdn={})",
                    price_column(params.price()?),
                    params.int("period", 20)?,
                    deviations,
                    deviations
                )
            }
            "STOCH" => format!(
                "talib.STOCH({}, fastk_period={}, slowk_period={}, slowd_period={})",
                hlc,
                params.int("k_period", 14)?,
                params.int("slowing", 3)?,
                params.int("d_period", 3)?
            ),
            "OBV" => single(format!(
                "talib.OBV({}, frame[\"volume\"])",
                price_column(params.price()?)
            )),
            other => {
                return Err(CodegenError::unsupported(
                    self.target().name(),
                    format!("indicator '{}' (data source '{}')", other, source.id),
                ));
            }
        };
        Ok(text)
    }

    fn write_prelude(&self, out: &mut String, strategy: &Strategy) -> Result<(), CodegenError> {
        writeln!(out, "# Strategy: {}", strategy.name.as_deref().unwrap_or("unnamed"))?;
        if let Some(description) = &strategy.description {
            for line in description.lines() {
                writeln!(out, "# {}", line)?;
            }
        }
        writeln!(out, "import math")?;
        writeln!(out)?;
        writeln!(out, "import pandas as pd")?;
        writeln!(out, "{}", self.talib_import())?;
        writeln!(out)?;
        for (class, base) in [
            ("DivisionByZeroError", "ArithmeticError"),
            ("UnboundVariableError", "KeyError"),
            ("MissingIndicatorValueError", "LookupError"),
            ("MissingCandleValueError", "LookupError"),
        ] {
            writeln!(out)?;
            writeln!(out, "class {}({}):", class, base)?;
            writeln!(out, "    pass")?;
            writeln!(out)?;
        }
        writeln!(out)?;
        Ok(())
    }

    fn write_helpers(&self, out: &mut String) -> Result<(), CodegenError> {
        let helpers = r#"def variable(self, name):
    if name not in self.variables:
        raise UnboundVariableError(name)
    return self.variables[name]

@staticmethod
def _div(a, b):
    if b == 0:
        raise DivisionByZeroError("division by zero")
    return a / b

@staticmethod
def _mod(a, b):
    if b == 0:
        raise DivisionByZeroError("division by zero")
    return math.fmod(a, b)

@staticmethod
def _approx_eq(a, b):
    return abs(a - b) < 1e-10

@staticmethod
def _sample(series, bars_ago, error):
    series = pd.Series(series)
    position = len(series) - 1 - bars_ago
    if position < 0:
        raise error
    value = series.iloc[position]
    if pd.isna(value):
        raise error
    return float(value)"#;
        writeln!(out, "{}", indent(helpers, 4))?;
        writeln!(out)?;
        Ok(())
    }
}

fn price_column(price: PriceSource) -> &'static str {
    match price {
        PriceSource::Close => "frame[\"close\"]",
        PriceSource::Open => "frame[\"open\"]",
        PriceSource::High => "frame[\"high\"]",
        PriceSource::Low => "frame[\"low\"]",
        PriceSource::Median => "(frame[\"high\"] + frame[\"low\"]) / 2",
        PriceSource::Typical => "(frame[\"high\"] + frame[\"low\"] + frame[\"close\"]) / 3",
        PriceSource::Weighted => {
            "(frame[\"high\"] + frame[\"low\"] + 2 * frame[\"close\"]) / 4"
        }
    }
}

fn shifted(offset: u32) -> String {
    if offset == 0 {
        "bars_ago".to_string()
    } else {
        format!("bars_ago + {}", offset)
    }
}

fn order_field(key: &str, value: String) -> String {
    format!("{}: {}", quote(key), value)
}

impl CodeGenerator for PythonGenerator {
    fn target(&self) -> Target {
        Target::Python
    }

    fn generate(&self, strategy: &Strategy) -> Result<String, CodegenError> {
        let scope = StrategyIndex::new(strategy);
        let class_name = format!("{}{}", base_name(strategy), self.class_suffix);
        let mut out = String::with_capacity(4096);

        self.write_prelude(&mut out, strategy)?;

        writeln!(out, "class {}:", class_name)?;
        writeln!(out, "    def __init__(self, broker, variables=None):")?;
        writeln!(out, "        self.broker = broker")?;
        writeln!(out, "        self.variables = dict(variables or {{}})")?;
        writeln!(out)?;
        self.write_helpers(&mut out)?;

        for source in scope.indicator_sources().into_iter().chain(scope.candle_sources()) {
            writeln!(out, "{}", indent(&self.render_data_source(&scope, source)?, 4))?;
            writeln!(out)?;
        }

        writeln!(out, "    def evaluate_rules(self, context):")?;
        writeln!(out, "        actions = []")?;
        for (i, rule) in strategy.rules.iter().enumerate() {
            writeln!(out, "        # rule {}", i + 1)?;
            writeln!(out, "{}", indent(&self.render_rule(&scope, rule)?, 8))?;
        }
        writeln!(out, "        return actions")?;
        writeln!(out)?;

        writeln!(out, "    def within_position_limits(self, context, order):")?;
        writeln!(
            out,
            "        delta = order[\"quantity\"] if order[\"side\"] == \"buy\" else -order[\"quantity\"]"
        )?;
        writeln!(
            out,
            "        projected = self.broker.net_position(order[\"symbol\"]) + delta"
        )?;
        for limit in &strategy.position_limits {
            writeln!(out, "{}", indent(&self.render_position_limit(&scope, limit)?, 8))?;
        }
        writeln!(out, "        return True")?;
        writeln!(out)?;

        writeln!(out, "    def dispatch(self, action_id, context):")?;
        for action in scope.actions() {
            writeln!(out, "{}", indent(&self.render_action(&scope, action)?, 8))?;
        }
        writeln!(out, "        raise KeyError(f\"unknown action '{{action_id}}'\")")?;
        writeln!(out)?;

        writeln!(out, "    def on_bar(self, context):")?;
        writeln!(
            out,
            "        return [self.dispatch(action_id, context) for action_id in self.evaluate_rules(context)]"
        )?;
        Ok(out)
    }

    fn render_literal(&self, value: f64) -> String {
        format_number(value)
    }

    fn render_variable(&self, name: &str) -> String {
        format!("self.variable({})", quote(name))
    }

    fn render_binary(&self, operator: BinaryOperator, left: &str, right: &str) -> String {
        match operator {
            BinaryOperator::Add => format!("({} + {})", left, right),
            BinaryOperator::Subtract => format!("({} - {})", left, right),
            BinaryOperator::Multiply => format!("({} * {})", left, right),
            BinaryOperator::Divide => format!("self._div({}, {})", left, right),
            BinaryOperator::Modulo => format!("self._mod({}, {})", left, right),
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
        Ok(format!(
            "self.indicator_{}(context, {}, {})",
            sanitize_identifier(indicator_id),
            index,
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
            "self.candle_{}(context, {}, {})",
            sanitize_identifier(candle_id),
            quote(field.name()),
            shift
        ))
    }

    fn render_comparison(&self, operator: ComparisonOperator, left: &str, right: &str) -> String {
        match operator {
            ComparisonOperator::Equal => format!("self._approx_eq({}, {})", left, right),
            ComparisonOperator::NotEqual => format!("(not self._approx_eq({}, {}))", left, right),
            other => format!("({} {} {})", left, other.symbol(), right),
        }
    }

    fn render_logical(&self, operator: LogicalOperator, children: &[String]) -> String {
        let (joiner, empty) = match operator {
            LogicalOperator::And => (" and ", "True"),
            LogicalOperator::Or => (" or ", "False"),
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
        let (now, before) = match direction {
            CrossDirection::Above => (">", "<="),
            CrossDirection::Below => ("<", ">="),
        };
        format!(
            "({} {} {} and {} {} {})",
            current.0, now, current.1, previous.0, before, previous.1
        )
    }

    fn render_data_source(&self, _scope: &Scope<'_>, source: &DataSource) -> Result<String, CodegenError> {
        check_indicator(self.target(), SUPPORTED_INDICATORS, source)?;
        let ident = sanitize_identifier(&source.id);
        let mut out = String::new();
        match source.indicator_type() {
            Some(kind) => {
                writeln!(out, "def indicator_{}(self, context, output=0, bars_ago=0):", ident)?;
                writeln!(out, "    {}", self.frame_access(source))?;
                writeln!(out, "    outputs = {}", self.talib_outputs(source, kind)?)?;
                write!(
                    out,
                    "    return self._sample(outputs[output], {}, MissingIndicatorValueError({}))",
                    shifted(source.offset),
                    quote(&source.id)
                )?;
            }
            None => {
                writeln!(out, "def candle_{}(self, context, field, bars_ago=0):", ident)?;
                writeln!(out, "    {}", self.frame_access(source))?;
                write!(
                    out,
                    "    return self._sample(frame[field], {}, MissingCandleValueError({}))",
                    shifted(source.offset),
                    quote(&source.id)
                )?;
            }
        }
        Ok(out)
    }

    fn render_rule(&self, scope: &Scope<'_>, rule: &Rule) -> Result<String, CodegenError> {
        let condition = self.render_condition(scope, &rule.condition, 0)?;
        let mut out = String::new();
        writeln!(out, "if {}:", condition)?;
        write!(out, "{}", indent(&self.render_action_list(scope, &rule.then_actions)?, 4))?;
        if let Some(else_actions) = &rule.else_actions {
            writeln!(out)?;
            writeln!(out, "else:")?;
            write!(out, "{}", indent(&self.render_action_list(scope, else_actions)?, 4))?;
        }
        Ok(out)
    }

    fn render_action(&self, scope: &Scope<'_>, action: &Action) -> Result<String, CodegenError> {
        let order = self.render_order(scope, &action.order)?;
        let mut out = String::new();
        writeln!(out, "if action_id == {}:", quote(&action.id))?;
        writeln!(out, "    order = {}", order)?;
        writeln!(out, "    if not self.within_position_limits(context, order):")?;
        writeln!(out, "        return None")?;
        write!(out, "    return self.broker.submit_order(order)")?;
        Ok(out)
    }

    fn render_order(&self, scope: &Scope<'_>, order: &Order) -> Result<String, CodegenError> {
        check_order(self.target(), SUPPORTED_ORDERS, order)?;
        let mut fields = vec![
            order_field("type", quote(order.kind.name())),
            order_field("symbol", self.render_symbol(&order.symbol)),
            order_field("side", quote(order.side.name())),
            order_field("quantity", self.render_expression(scope, &order.quantity, 0)?),
            order_field("time_in_force", quote(order.time_in_force.name())),
        ];
        match &order.kind {
            OrderKind::Limit { limit_price } => {
                fields.push(order_field(
                    "limit_price",
                    self.render_expression(scope, limit_price, 0)?,
                ));
            }
            OrderKind::Stop { stop_price } => {
                fields.push(order_field(
                    "stop_price",
                    self.render_expression(scope, stop_price, 0)?,
                ));
            }
            _ => {}
        }
        Ok(format!("{{{}}}", fields.join(", ")))
    }

    fn render_position_limit(
        &self,
        scope: &Scope<'_>,
        limit: &PositionLimit,
    ) -> Result<String, CodegenError> {
        let max = self.render_expression(scope, &limit.max, 0)?;
        let min = self.render_expression(scope, &limit.min, 0)?;
        Ok(format!(
            "if order[\"symbol\"] == {} and (projected > {} or projected < {}):\n    return False",
            self.render_symbol(&limit.symbol),
            max,
            min
        ))
    }
}
