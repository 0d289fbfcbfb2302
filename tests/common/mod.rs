#![allow(dead_code)]

use serde_json::{Value, json};
use std::io::Write;
use std::path::PathBuf;
use stratforge::domain::builder::build_with_registry;
use stratforge::domain::eval::EvalContext;
use stratforge::domain::expression::{CandleField, OutputSelector};
use stratforge::domain::registry::IndicatorRegistry;
use stratforge::domain::strategy::Strategy;
use tempfile::TempDir;

/// Golden-cross strategy touching every section of the document format.
pub fn golden_cross_document() -> Value {
    json!({
        "name": "golden cross",
        "description": "EMA 50/200 trend follower with RSI filter",
        "data_sources": [
            {"id": "ema_50", "type": "indicator", "indicator_type": "EMA", "symbol": "TSLA",
             "timeframe": {"period": "day", "length": 1}, "params": {"period": 50}},
            {"id": "ema_200", "type": "indicator", "indicator_type": "EMA", "symbol": "TSLA",
             "timeframe": {"period": "day", "length": 1}, "params": {"period": 200}},
            {"id": "rsi", "type": "indicator", "indicator_type": "RSI", "symbol": "TSLA",
             "timeframe": {"period": "day", "length": 1}, "params": {"period": 14}},
            {"id": "px", "type": "candle", "symbol": "TSLA",
             "timeframe": {"period": "day", "length": 1}}
        ],
        "actions": [
            {"id": "entry_long", "order": {"type": "market", "symbol": "TSLA", "side": "buy",
              "quantity": {"var": "quantity"}, "time_in_force": "day"}},
            {"id": "exit_long", "order": {"type": "limit", "symbol": "TSLA", "side": "sell",
              "quantity": {"var": "quantity"},
              "limit_price": {"operator": "*", "operandA": {"candle_id": "px", "field": "close"}, "operandB": 1.01}}}
        ],
        "rules": [
            {"condition": {"and": [
                {"operator": ">", "operandA": {"indicator_id": "ema_50"}, "operandB": {"indicator_id": "ema_200"}},
                {"expression": {"operator": "<", "operandA": {"indicator_id": "rsi"}, "operandB": 70}}
             ]},
             "then": ["entry_long"], "else": ["exit_long"]}
        ],
        "position_limits": [{"symbol": "TSLA", "max": 100, "min": 0}]
    })
}

pub fn build(document: &Value) -> Strategy {
    let registry = IndicatorRegistry::builtin();
    build_with_registry(document, &registry).unwrap().0
}

/// Writes `content` to `name` inside a fresh temporary directory.
pub fn write_temp(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    path
}

/// Fixed-value context: every indicator, candle field and variable reads as
/// a constant regardless of the bar.
pub struct ConstantContext(pub f64);

impl EvalContext for ConstantContext {
    fn variable(&self, _name: &str) -> Option<f64> {
        Some(self.0)
    }

    fn indicator_output(
        &self,
        _indicator_id: &str,
        _output: Option<&OutputSelector>,
        _bars_ago: usize,
    ) -> Option<f64> {
        Some(self.0)
    }

    fn candle_field(&self, _candle_id: &str, _field: CandleField, _bars_ago: usize) -> Option<f64> {
        Some(self.0)
    }
}
