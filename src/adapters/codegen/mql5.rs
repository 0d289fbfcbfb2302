//! MQL5 backend: a self-contained expert advisor.
//!
//! Unlike the scripting targets, the generated program owns terminal
//! resources. Every indicator data source gets one handle created in
//! `OnInit` and one buffer per output refreshed each tick with a copy of
//! [`BUFFER_WIDTH`] samples starting at the source's offset. `ReleaseHandles`
//! is the single teardown path: `OnDeinit` calls it, and so does every
//! failing branch of `OnInit`, so no handle outlives the expert.
//!
//! Free variables become `input` parameters. A variable used as a symbol is
//! a string that falls back to the chart symbol; one read in expressions is a
//! double, defaulting to `0.1` lots when its name has a size-like word.
//! Candle reads go through `CandleValue`, which flags missing history the
//! same way `SafeDiv` flags a zero divisor, and `OnTick` then sends nothing.

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
use crate::domain::registry::standard_outputs;
use crate::domain::strategy::{
    Action, ActionList, DataSource, Order, OrderKind, Period, PositionLimit, Rule, Side, Strategy,
    SymbolRef, TimeInForce, Timeframe,
};
use crate::ports::codegen_port::{CodeGenerator, Scope, Target};

/// No built-in terminal indicator exists for VWAP or ROC.
const SUPPORTED_INDICATORS: &[&str] = &[
    "SMA", "EMA", "WMA", "RSI", "MACD", "BBANDS", "ATR", "STOCH", "ADX", "CCI", "OBV", "MOM",
];

const SUPPORTED_ORDERS: &[&str] = &["market", "limit", "stop", "stop_limit"];

/// Samples copied per buffer: current bar, previous bar, one spare.
pub const BUFFER_WIDTH: usize = 3;

const SYMBOL_HINTS: &[&str] = &["symbol", "ticker", "instrument", "pair"];
const SIZE_HINTS: &[&str] = &["quantity", "qty", "size", "lot", "lots", "volume", "amount"];

#[derive(Debug, Clone)]
pub struct Mql5Generator {
    magic_number: i64,
    deviation_points: i64,
}

impl Default for Mql5Generator {
    fn default() -> Self {
        Self::new(20240, 10)
    }
}

/// Declared type and default of a generated `input`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputRole {
    Symbol,
    Size,
    Number,
}

impl Mql5Generator {
    pub fn new(magic_number: i64, deviation_points: i64) -> Self {
        Self {
            magic_number,
            deviation_points,
        }
    }

    fn render_symbol(&self, symbol: &SymbolRef) -> String {
        match symbol {
            SymbolRef::Literal(s) => quote(s),
            SymbolRef::Variable(name) => format!("ResolveSymbol({})", input_name(name)),
        }
    }

    fn render_action_list(&self, scope: &Scope<'_>, list: &ActionList) -> Result<String, CodegenError> {
        match list {
            ActionList::Ids(ids) => Ok(ids
                .iter()
                .map(|id| format!("PushAction(actions, {});", quote(id)))
                .collect::<Vec<_>>()
                .join("\n")),
            ActionList::Nested(rule) => self.render_rule(scope, rule),
        }
    }

    fn write_header(&self, out: &mut String, strategy: &Strategy) -> Result<(), CodegenError> {
        let name = strategy.name.as_deref().unwrap_or("unnamed");
        writeln!(out, "//+------------------------------------------------------------------+")?;
        writeln!(out, "//| {}.mq5", base_name(strategy))?;
        writeln!(out, "//| Strategy: {}", name)?;
        writeln!(out, "//+------------------------------------------------------------------+")?;
        writeln!(out, "#property version \"1.00\"")?;
        if let Some(description) = &strategy.description {
            writeln!(out, "#property description {}", quote(description))?;
        }
        writeln!(out)?;
        writeln!(out, "#include <Trade/Trade.mqh>")?;
        writeln!(out)?;
        Ok(())
    }

    fn write_inputs(&self, out: &mut String, scope: &Scope<'_>) -> Result<(), CodegenError> {
        for name in scope.variables() {
            let role = match (scope.is_symbol_variable(name), scope.is_numeric_variable(name)) {
                (true, true) => {
                    return Err(CodegenError::unsupported(
                        self.target().name(),
                        format!("variable '{}' used both as a symbol and as a number", name),
                    ));
                }
                (true, false) => InputRole::Symbol,
                // a string input cannot feed arithmetic, whatever the name says
                (false, _) => match infer_role(name) {
                    InputRole::Symbol => InputRole::Number,
                    role => role,
                },
            };
            let declaration = match role {
                InputRole::Symbol => format!("input string {} = \"\";", input_name(name)),
                InputRole::Size => format!("input double {} = 0.1;", input_name(name)),
                InputRole::Number => format!("input double {} = 0.0;", input_name(name)),
            };
            writeln!(out, "{}", declaration)?;
        }
        writeln!(out, "input ulong InpMagicNumber = {};", self.magic_number)?;
        writeln!(out, "input ulong InpDeviationPoints = {};", self.deviation_points)?;
        writeln!(out)?;
        Ok(())
    }

    fn write_runtime_helpers(&self, out: &mut String) -> Result<(), CodegenError> {
        out.push_str(
            r#"string ResolveSymbol(const string symbol)
{
   return(symbol == "" ? _Symbol : symbol);
}

double SafeDiv(const double a, const double b)
{
   if(b == 0.0)
   {
      Print("Runtime error: division by zero");
      gEvalError = true;
      return(0.0);
   }
   return(a / b);
}

double SafeMod(const double a, const double b)
{
   if(b == 0.0)
   {
      Print("Runtime error: division by zero");
      gEvalError = true;
      return(0.0);
   }
   return(MathMod(a, b));
}

enum CANDLE_FIELD
{
   CANDLE_OPEN,
   CANDLE_HIGH,
   CANDLE_LOW,
   CANDLE_CLOSE,
   CANDLE_VOLUME,
   CANDLE_TIME
};

double CandleValue(const string symbol, const ENUM_TIMEFRAMES tf, const CANDLE_FIELD field, const int shift)
{
   if(Bars(symbol, tf) <= shift)
   {
      PrintFormat("Runtime error: no bar at shift %d for %s", shift, symbol);
      gEvalError = true;
      return(0.0);
   }
   ResetLastError();
   double value = 0.0;
   switch(field)
   {
      case CANDLE_OPEN:   value = iOpen(symbol, tf, shift); break;
      case CANDLE_HIGH:   value = iHigh(symbol, tf, shift); break;
      case CANDLE_LOW:    value = iLow(symbol, tf, shift); break;
      case CANDLE_CLOSE:  value = iClose(symbol, tf, shift); break;
      case CANDLE_VOLUME: value = (double)iVolume(symbol, tf, shift); break;
      case CANDLE_TIME:   value = (double)iTime(symbol, tf, shift); break;
   }
   int err = GetLastError();
   if(err != 0)
   {
      PrintFormat("Runtime error: candle read failed for %s (error %d)", symbol, err);
      gEvalError = true;
      return(0.0);
   }
   return(value);
}

bool ApproxEq(const double a, const double b)
{
   return(MathAbs(a - b) < 1e-10);
}

void PushAction(string &actions[], const string id)
{
   int n = ArraySize(actions);
   ArrayResize(actions, n + 1);
   actions[n] = id;
}

"#,
        );
        Ok(())
    }

    fn write_release(&self, out: &mut String, indicators: &[&DataSource]) -> Result<(), CodegenError> {
        writeln!(out, "void ReleaseHandles()")?;
        writeln!(out, "{{")?;
        for source in indicators {
            let handle = handle_name(source);
            writeln!(out, "   if({} != INVALID_HANDLE)", handle)?;
            writeln!(out, "   {{")?;
            writeln!(out, "      IndicatorRelease({});", handle)?;
            writeln!(out, "      {} = INVALID_HANDLE;", handle)?;
            writeln!(out, "   }}")?;
        }
        writeln!(out, "}}")?;
        writeln!(out)?;
        Ok(())
    }

    fn write_on_init(&self, out: &mut String, indicators: &[&DataSource]) -> Result<(), CodegenError> {
        writeln!(out, "int OnInit()")?;
        writeln!(out, "{{")?;
        writeln!(out, "   trade.SetExpertMagicNumber(InpMagicNumber);")?;
        writeln!(out, "   trade.SetDeviationInPoints(InpDeviationPoints);")?;
        for source in indicators {
            let handle = handle_name(source);
            writeln!(out, "   {} = {};", handle, self.handle_constructor(source)?)?;
            writeln!(out, "   if({} == INVALID_HANDLE)", handle)?;
            writeln!(out, "   {{")?;
            writeln!(
                out,
                "      PrintFormat(\"Failed to create handle for %s (error %d)\", {}, GetLastError());",
                quote(&source.id)
            )?;
            writeln!(out, "      ReleaseHandles();")?;
            writeln!(out, "      return(INIT_FAILED);")?;
            writeln!(out, "   }}")?;
            for n in 0..output_count(source) {
                writeln!(out, "   ArraySetAsSeries({}, true);", buffer_name(source, n))?;
            }
        }
        writeln!(out, "   return(INIT_SUCCEEDED);")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        writeln!(out, "void OnDeinit(const int reason)")?;
        writeln!(out, "{{")?;
        writeln!(out, "   ReleaseHandles();")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        Ok(())
    }

    fn write_refresh(&self, out: &mut String, indicators: &[&DataSource]) -> Result<(), CodegenError> {
        writeln!(out, "bool RefreshBuffers()")?;
        writeln!(out, "{{")?;
        for source in indicators {
            let handle = handle_name(source);
            let kind = source.indicator_type().unwrap_or_default();
            for (n, terminal_buffer) in terminal_buffers(kind).iter().enumerate() {
                writeln!(
                    out,
                    "   if(CopyBuffer({}, {}, {}, {}, {}) < {}) return(false);",
                    handle,
                    terminal_buffer,
                    source.offset,
                    BUFFER_WIDTH,
                    buffer_name(source, n),
                    BUFFER_WIDTH
                )?;
            }
            if kind == "MACD" {
                let (main, signal, histogram) = (
                    buffer_name(source, 0),
                    buffer_name(source, 1),
                    buffer_name(source, 2),
                );
                writeln!(out, "   ArrayResize({}, {});", histogram, BUFFER_WIDTH)?;
                writeln!(
                    out,
                    "   for(int i = 0; i < {}; i++) {}[i] = {}[i] - {}[i];",
                    BUFFER_WIDTH, histogram, main, signal
                )?;
            }
        }
        writeln!(out, "   return(true);")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        Ok(())
    }

    fn write_positions(&self, out: &mut String, scope: &Scope<'_>) -> Result<(), CodegenError> {
        out.push_str(
            r#"double NetPosition(const string symbol)
{
   double net = 0.0;
   for(int i = PositionsTotal() - 1; i >= 0; i--)
   {
      ulong ticket = PositionGetTicket(i);
      if(ticket == 0) continue;
      if(PositionGetString(POSITION_SYMBOL) != symbol) continue;
      if((ulong)PositionGetInteger(POSITION_MAGIC) != InpMagicNumber) continue;
      double volume = PositionGetDouble(POSITION_VOLUME);
      net += (PositionGetInteger(POSITION_TYPE) == POSITION_TYPE_BUY) ? volume : -volume;
   }
   return(net);
}

bool WithinPositionLimits(const string symbol, const bool isBuy, const double volume)
{
   double projected = NetPosition(symbol) + (isBuy ? volume : -volume);
"#,
        );
        for limit in &scope.strategy().position_limits {
            writeln!(out, "{}", indent(&self.render_position_limit(scope, limit)?, 3))?;
        }
        writeln!(out, "   if(gEvalError) return(false);")?;
        writeln!(out, "   return(true);")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        Ok(())
    }

    /// Terminal call creating the handle for an indicator source.
    fn handle_constructor(&self, source: &DataSource) -> Result<String, CodegenError> {
        let params = IndicatorParams::new(self.target(), source);
        let symbol = self.render_symbol(&source.symbol);
        let tf = timeframe_constant(&source.timeframe).ok_or_else(|| self.bad_timeframe(source))?;
        let kind = source.indicator_type().unwrap_or_default();
        let call = match kind {
            "SMA" | "EMA" | "WMA" => {
                let method = match kind {
                    "SMA" => "MODE_SMA",
                    "EMA" => "MODE_EMA",
                    _ => "MODE_LWMA",
                };
                format!(
                    "iMA({}, {}, {}, 0, {}, {})",
                    symbol,
                    tf,
                    params.int("period", 14)?,
                    method,
                    price_constant(params.price()?)
                )
            }
            "RSI" | "CCI" => format!(
                "i{}({}, {}, {}, {})",
                kind,
                symbol,
                tf,
                params.int("period", 14)?,
                price_constant(params.price()?)
            ),
            "MOM" => format!(
                "iMomentum({}, {}, {}, {})",
                symbol,
                tf,
                params.int("period", 14)?,
                price_constant(params.price()?)
            ),
            "MACD" => format!(
                "iMACD({}, {}, {}, {}, {}, {})",
                symbol,
                tf,
                params.int("fast_period", 12)?,
                params.int("slow_period", 26)?,
                params.int("signal_period", 9)?,
                price_constant(params.price()?)
            ),
            "BBANDS" => format!(
                "iBands({}, {}, {}, 0, {}, {})",
                symbol,
                tf,
                params.int("period", 20)?,
                format_number(params.float("deviations", 2.0)?),
                price_constant(params.price()?)
            ),
            "ATR" | "ADX" => format!("i{}({}, {}, {})", kind, symbol, tf, params.int("period", 14)?),
            "STOCH" => format!(
                "iStochastic({}, {}, {}, {}, {}, MODE_SMA, STO_LOWHIGH)",
                symbol,
                tf,
                params.int("k_period", 14)?,
                params.int("d_period", 3)?,
                params.int("slowing", 3)?
            ),
            "OBV" => format!("iOBV({}, {}, VOLUME_TICK)", symbol, tf),
            other => {
                return Err(CodegenError::unsupported(
                    self.target().name(),
                    format!("indicator '{}' (data source '{}')", other, source.id),
                ));
            }
        };
        Ok(call)
    }

    fn bad_timeframe(&self, source: &DataSource) -> CodegenError {
        CodegenError::unsupported(
            self.target().name(),
            format!("timeframe '{}' (data source '{}')", source.timeframe, source.id),
        )
    }

    /// Local declarations, guards and trade call for one order.
    fn order_body(&self, scope: &Scope<'_>, order: &Order) -> Result<String, CodegenError> {
        let is_buy = order.side == Side::Buy;
        let mut lines = vec![
            format!("string sym = {};", self.render_symbol(&order.symbol)),
            format!("double volume = {};", self.render_expression(scope, &order.quantity, 0)?),
        ];
        let (type_time, filling) = match order.time_in_force {
            TimeInForce::Day => ("ORDER_TIME_DAY", None),
            TimeInForce::Gtc => ("ORDER_TIME_GTC", None),
            TimeInForce::Ioc => ("ORDER_TIME_GTC", Some("ORDER_FILLING_IOC")),
            TimeInForce::Fok => ("ORDER_TIME_GTC", Some("ORDER_FILLING_FOK")),
        };
        let side = if is_buy { "Buy" } else { "Sell" };

        let call = match &order.kind {
            OrderKind::Market => format!("trade.{}(volume, sym)", side),
            OrderKind::Limit { limit_price } => {
                lines.push(format!(
                    "double limitPrice = {};",
                    self.render_expression(scope, limit_price, 0)?
                ));
                format!(
                    "trade.{}Limit(volume, limitPrice, sym, 0.0, 0.0, {}, 0, \"\")",
                    side, type_time
                )
            }
            OrderKind::Stop { stop_price } => {
                lines.push(format!(
                    "double stopPrice = {};",
                    self.render_expression(scope, stop_price, 0)?
                ));
                format!(
                    "trade.{}Stop(volume, stopPrice, sym, 0.0, 0.0, {}, 0, \"\")",
                    side, type_time
                )
            }
            OrderKind::StopLimit {
                stop_price,
                limit_price,
            } => {
                lines.push(format!(
                    "double stopPrice = {};",
                    self.render_expression(scope, stop_price, 0)?
                ));
                lines.push(format!(
                    "double limitPrice = {};",
                    self.render_expression(scope, limit_price, 0)?
                ));
                let order_type = if is_buy {
                    "ORDER_TYPE_BUY_STOP_LIMIT"
                } else {
                    "ORDER_TYPE_SELL_STOP_LIMIT"
                };
                format!(
                    "trade.OrderOpen(sym, {}, volume, limitPrice, stopPrice, 0.0, 0.0, {}, 0, \"\")",
                    order_type, type_time
                )
            }
            _ => {
                return Err(CodegenError::unsupported(
                    self.target().name(),
                    format!("order type '{}'", order.kind.name()),
                ));
            }
        };

        lines.push("if(gEvalError) return(false);".to_string());
        lines.push(format!(
            "if(!WithinPositionLimits(sym, {}, volume)) return(false);",
            is_buy
        ));
        match filling {
            Some(mode) => lines.push(format!("trade.SetTypeFilling({});", mode)),
            None => lines.push("trade.SetTypeFillingBySymbol(sym);".to_string()),
        }
        lines.push(format!("return({});", call));
        Ok(lines.join("\n"))
    }
}

fn input_name(variable: &str) -> String {
    format!("Inp_{}", sanitize_identifier(variable))
}

fn handle_name(source: &DataSource) -> String {
    format!("h_{}", sanitize_identifier(&source.id))
}

fn buffer_name(source: &DataSource, output: usize) -> String {
    format!("buf_{}_{}", sanitize_identifier(&source.id), output)
}

fn output_count(source: &DataSource) -> usize {
    standard_outputs(source.indicator_type().unwrap_or_default()).len()
}

/// Terminal buffer index for each output, in registry output order. MACD's
/// histogram is derived, so only two buffers are copied.
fn terminal_buffers(kind: &str) -> &'static [usize] {
    match kind {
        "MACD" | "STOCH" => &[0, 1],
        "BBANDS" => &[1, 0, 2],
        "ADX" => &[0, 1, 2],
        _ => &[0],
    }
}

/// Role suggested by the words of a variable name. Words split on
/// non-alphanumerics and camelCase humps, so `lot` matches `lot_size` and
/// `MaxLots` but not `slot` or `pilot`.
fn infer_role(name: &str) -> InputRole {
    let words = name_words(name);
    let has = |hints: &[&str]| words.iter().any(|w| hints.contains(&w.as_str()));
    if has(SYMBOL_HINTS) {
        InputRole::Symbol
    } else if has(SIZE_HINTS) {
        InputRole::Size
    } else {
        InputRole::Number
    }
}

fn name_words(name: &str) -> Vec<String> {
    let chars: Vec<char> = name.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Closed mapping onto the terminal's `ENUM_TIMEFRAMES`.
pub fn timeframe_constant(timeframe: &Timeframe) -> Option<&'static str> {
    let constant = match (timeframe.period, timeframe.length) {
        (Period::Minute, 1) => "PERIOD_M1",
        (Period::Minute, 2) => "PERIOD_M2",
        (Period::Minute, 3) => "PERIOD_M3",
        (Period::Minute, 4) => "PERIOD_M4",
        (Period::Minute, 5) => "PERIOD_M5",
        (Period::Minute, 6) => "PERIOD_M6",
        (Period::Minute, 10) => "PERIOD_M10",
        (Period::Minute, 12) => "PERIOD_M12",
        (Period::Minute, 15) => "PERIOD_M15",
        (Period::Minute, 20) => "PERIOD_M20",
        (Period::Minute, 30) => "PERIOD_M30",
        (Period::Hour, 1) => "PERIOD_H1",
        (Period::Hour, 2) => "PERIOD_H2",
        (Period::Hour, 3) => "PERIOD_H3",
        (Period::Hour, 4) => "PERIOD_H4",
        (Period::Hour, 6) => "PERIOD_H6",
        (Period::Hour, 8) => "PERIOD_H8",
        (Period::Hour, 12) => "PERIOD_H12",
        (Period::Day, 1) => "PERIOD_D1",
        (Period::Day, 7) => "PERIOD_W1",
        (Period::Month, 1) => "PERIOD_MN1",
        _ => return None,
    };
    Some(constant)
}

/// Closed mapping onto `ENUM_APPLIED_PRICE`.
fn price_constant(price: PriceSource) -> &'static str {
    match price {
        PriceSource::Close => "PRICE_CLOSE",
        PriceSource::Open => "PRICE_OPEN",
        PriceSource::High => "PRICE_HIGH",
        PriceSource::Low => "PRICE_LOW",
        PriceSource::Median => "PRICE_MEDIAN",
        PriceSource::Typical => "PRICE_TYPICAL",
        PriceSource::Weighted => "PRICE_WEIGHTED",
    }
}

fn shifted(offset: u32, shift: usize) -> String {
    (offset as usize + shift).to_string()
}

impl CodeGenerator for Mql5Generator {
    fn target(&self) -> Target {
        Target::Mql5
    }

    fn generate(&self, strategy: &Strategy) -> Result<String, CodegenError> {
        let scope = StrategyIndex::new(strategy);
        let indicators = scope.indicator_sources();
        let mut out = String::with_capacity(8192);

        self.write_header(&mut out, strategy)?;
        self.write_inputs(&mut out, &scope)?;

        writeln!(out, "CTrade trade;")?;
        writeln!(out, "bool gEvalError = false;")?;
        for source in indicators.iter().copied().chain(scope.candle_sources()) {
            writeln!(out, "{}", self.render_data_source(&scope, source)?)?;
        }
        writeln!(out)?;

        self.write_runtime_helpers(&mut out)?;
        self.write_release(&mut out, &indicators)?;
        self.write_on_init(&mut out, &indicators)?;
        self.write_refresh(&mut out, &indicators)?;

        writeln!(out, "void EvaluateRules(string &actions[])")?;
        writeln!(out, "{{")?;
        writeln!(out, "   ArrayResize(actions, 0);")?;
        for (i, rule) in strategy.rules.iter().enumerate() {
            writeln!(out, "   // rule {}", i + 1)?;
            writeln!(out, "{}", indent(&self.render_rule(&scope, rule)?, 3))?;
        }
        writeln!(out, "}}")?;
        writeln!(out)?;

        self.write_positions(&mut out, &scope)?;

        writeln!(out, "bool Dispatch(const string actionId)")?;
        writeln!(out, "{{")?;
        for action in scope.actions() {
            writeln!(out, "{}", indent(&self.render_action(&scope, action)?, 3))?;
        }
        writeln!(out, "   Print(\"Unknown action: \", actionId);")?;
        writeln!(out, "   return(false);")?;
        writeln!(out, "}}")?;
        writeln!(out)?;

        out.push_str(
            r#"void OnTick()
{
   if(!RefreshBuffers()) return;
   gEvalError = false;
   string actions[];
   EvaluateRules(actions);
   if(gEvalError)
   {
      Print("Rule evaluation failed; no orders sent");
      return;
   }
   for(int i = 0; i < ArraySize(actions); i++)
      Dispatch(actions[i]);
}
"#,
        );
        Ok(out)
    }

    fn render_literal(&self, value: f64) -> String {
        format_number(value)
    }

    fn render_variable(&self, name: &str) -> String {
        input_name(name)
    }

    fn render_binary(&self, operator: BinaryOperator, left: &str, right: &str) -> String {
        match operator {
            BinaryOperator::Add => format!("({} + {})", left, right),
            BinaryOperator::Subtract => format!("({} - {})", left, right),
            BinaryOperator::Multiply => format!("({} * {})", left, right),
            BinaryOperator::Divide => format!("SafeDiv({}, {})", left, right),
            BinaryOperator::Modulo => format!("SafeMod({}, {})", left, right),
            BinaryOperator::Percent => format!("(({} / 100.0) * {})", left, right),
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
        Ok(format!("{}[{}]", buffer_name(source, index), shift))
    }

    fn render_candle_field(
        &self,
        scope: &Scope<'_>,
        candle_id: &str,
        field: CandleField,
        shift: usize,
    ) -> Result<String, CodegenError> {
        let source = lookup_source(self.target(), scope, candle_id)?;
        let tf = timeframe_constant(&source.timeframe).ok_or_else(|| self.bad_timeframe(source))?;
        let field = match field {
            CandleField::Open => "CANDLE_OPEN",
            CandleField::High => "CANDLE_HIGH",
            CandleField::Low => "CANDLE_LOW",
            CandleField::Close => "CANDLE_CLOSE",
            CandleField::Volume => "CANDLE_VOLUME",
            CandleField::Timestamp => "CANDLE_TIME",
        };
        Ok(format!(
            "CandleValue({}, {}, {}, {})",
            self.render_symbol(&source.symbol),
            tf,
            field,
            shifted(source.offset, shift)
        ))
    }

    fn render_comparison(&self, operator: ComparisonOperator, left: &str, right: &str) -> String {
        match operator {
            ComparisonOperator::Equal => format!("ApproxEq({}, {})", left, right),
            ComparisonOperator::NotEqual => format!("!ApproxEq({}, {})", left, right),
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
        let (now, before) = match direction {
            CrossDirection::Above => (">", "<="),
            CrossDirection::Below => ("<", ">="),
        };
        format!(
            "({} {} {} && {} {} {})",
            current.0, now, current.1, previous.0, before, previous.1
        )
    }

    /// Global declarations. Candle sources have no terminal state and render
    /// as a comment after their timeframe is checked.
    fn render_data_source(&self, _scope: &Scope<'_>, source: &DataSource) -> Result<String, CodegenError> {
        check_indicator(self.target(), SUPPORTED_INDICATORS, source)?;
        let tf = timeframe_constant(&source.timeframe).ok_or_else(|| self.bad_timeframe(source))?;
        if !source.is_indicator() {
            return Ok(format!("// candle '{}' {} {}", source.id, source.symbol, tf));
        }
        let mut out = format!("int {} = INVALID_HANDLE;", handle_name(source));
        for n in 0..output_count(source) {
            write!(out, "\ndouble {}[];", buffer_name(source, n))?;
        }
        Ok(out)
    }

    fn render_rule(&self, scope: &Scope<'_>, rule: &Rule) -> Result<String, CodegenError> {
        let condition = self.render_condition(scope, &rule.condition, 0)?;
        let mut out = String::new();
        writeln!(out, "if({})", condition)?;
        writeln!(out, "{{")?;
        writeln!(out, "{}", indent(&self.render_action_list(scope, &rule.then_actions)?, 3))?;
        write!(out, "}}")?;
        if let Some(else_actions) = &rule.else_actions {
            writeln!(out)?;
            writeln!(out, "else")?;
            writeln!(out, "{{")?;
            writeln!(out, "{}", indent(&self.render_action_list(scope, else_actions)?, 3))?;
            write!(out, "}}")?;
        }
        Ok(out)
    }

    fn render_action(&self, scope: &Scope<'_>, action: &Action) -> Result<String, CodegenError> {
        let body = self.render_order(scope, &action.order)?;
        Ok(format!(
            "if(actionId == {})\n{{\n{}\n}}",
            quote(&action.id),
            indent(&body, 3)
        ))
    }

    fn render_order(&self, scope: &Scope<'_>, order: &Order) -> Result<String, CodegenError> {
        check_order(self.target(), SUPPORTED_ORDERS, order)?;
        self.order_body(scope, order)
    }

    fn render_position_limit(
        &self,
        scope: &Scope<'_>,
        limit: &PositionLimit,
    ) -> Result<String, CodegenError> {
        let max = self.render_expression(scope, &limit.max, 0)?;
        let min = self.render_expression(scope, &limit.min, 0)?;
        Ok(format!(
            "if(symbol == {} && (projected > {} || projected < {})) return(false);",
            self.render_symbol(&limit.symbol),
            max,
            min
        ))
    }
}
