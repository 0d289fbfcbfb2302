//! End-to-end tests of the build, validate and generate pipeline.

mod common;

use common::*;
use serde_json::json;
use stratforge::adapters::codegen::generator_for;
use stratforge::domain::builder::{build_with_registry, parse_condition};
use stratforge::domain::compiler::{CompileOptions, compile};
use stratforge::domain::crossover;
use stratforge::domain::error::{CodegenError, StratforgeError};
use stratforge::domain::eval::{Bindings, evaluate_condition, evaluate_rules};
use stratforge::domain::expression::{
    CandleField, Comparison, ComparisonOperator, Condition, CrossDirection, Expression,
};
use stratforge::domain::registry::{IndicatorRegistry, IndicatorSpec, OutputSpec};
use stratforge::domain::strategy::{ActionList, Rule};
use stratforge::domain::validation::validate;
use stratforge::ports::codegen_port::Target;

mod validation {
    use super::*;

    #[test]
    fn golden_cross_is_valid() {
        let registry = IndicatorRegistry::builtin();
        let (strategy, context) = build_with_registry(&golden_cross_document(), &registry).unwrap();
        let result = validate(&strategy, &context);
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn substituted_registry_drives_existence_checks() {
        let mut registry = IndicatorRegistry::new();
        registry.insert(
            "ema",
            IndicatorSpec {
                inputs: Vec::new(),
                outputs: vec![OutputSpec {
                    name: "value".into(),
                }],
            },
        );
        let (strategy, context) = build_with_registry(&golden_cross_document(), &registry).unwrap();
        let result = validate(&strategy, &context);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0].message,
            "data source 'rsi' uses unknown indicator_type 'RSI'"
        );
    }

    #[test]
    fn fixing_an_action_reference_clears_the_error() {
        let registry = IndicatorRegistry::builtin();
        let mut doc = golden_cross_document();
        doc["rules"][0]["then"] = json!(["entry_lung"]);
        let (strategy, context) = build_with_registry(&doc, &registry).unwrap();
        let broken = validate(&strategy, &context);
        let mentioning: Vec<_> = broken
            .errors
            .iter()
            .filter(|e| e.message.contains("entry_lung"))
            .collect();
        assert_eq!(mentioning.len(), 1);

        doc["rules"][0]["then"] = json!(["entry_long"]);
        let (strategy, context) = build_with_registry(&doc, &registry).unwrap();
        assert!(validate(&strategy, &context).valid);
    }

    #[test]
    fn candle_reference_to_indicator_is_fatal() {
        let registry = IndicatorRegistry::builtin();
        let mut doc = golden_cross_document();
        doc["actions"][1]["order"]["limit_price"] = json!({"candle_id": "rsi", "field": "close"});
        let (strategy, context) = build_with_registry(&doc, &registry).unwrap();
        let result = validate(&strategy, &context);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.message.contains("'rsi'")));
    }
}

mod generation {
    use super::*;

    #[test]
    fn every_target_is_deterministic() {
        let registry = IndicatorRegistry::builtin();
        for target in Target::ALL {
            let generator = generator_for(target);
            let first = compile(
                &golden_cross_document(),
                &registry,
                generator.as_ref(),
                CompileOptions::default(),
            )
            .unwrap();
            let second = compile(
                &golden_cross_document(),
                &registry,
                generator.as_ref(),
                CompileOptions::default(),
            )
            .unwrap();
            assert_eq!(first.source, second.source, "{target} output differs");
        }
    }

    #[test]
    fn every_target_renders_all_sections() {
        let strategy = build(&golden_cross_document());
        let js = generator_for(Target::JavaScript).generate(&strategy).unwrap();
        assert!(js.contains("class GoldenCrossStrategy"));
        assert!(js.contains("actions.push(\"entry_long\");"));
        assert!(js.contains("case \"exit_long\":"));

        let py = generator_for(Target::Python).generate(&strategy).unwrap();
        assert!(py.contains("class GoldenCrossStrategy:"));
        assert!(py.contains("talib.EMA(frame[\"close\"], timeperiod=200)"));
        assert!(py.contains("talib.RSI(frame[\"close\"], timeperiod=14)"));

        let mq = generator_for(Target::Mql5).generate(&strategy).unwrap();
        assert!(mq.contains("h_rsi = iRSI(\"TSLA\", PERIOD_D1, 14, PRICE_CLOSE);"));
        assert!(mq.contains("input double Inp_quantity = 0.1;"));
        assert!(mq.contains("return(trade.SellLimit(volume, limitPrice, sym, 0.0, 0.0, ORDER_TIME_DAY, 0, \"\"));"));
    }

    #[test]
    fn unsupported_indicator_fails_per_backend() {
        let registry = IndicatorRegistry::builtin();
        let cases = [(Target::Python, "VWAP"), (Target::Mql5, "VWAP"), (Target::Mql5, "ROC")];
        for (target, kind) in cases {
            let mut doc = golden_cross_document();
            doc["data_sources"][2]["indicator_type"] = json!(kind);
            let err = compile(
                &doc,
                &registry,
                generator_for(target).as_ref(),
                CompileOptions::default(),
            )
            .unwrap_err();
            match err {
                StratforgeError::Codegen(CodegenError::UnsupportedConstruct { target: t, construct }) => {
                    assert_eq!(t, target.name());
                    assert!(construct.contains(kind));
                }
                other => panic!("{target}/{kind}: expected UnsupportedConstruct, got {other:?}"),
            }
        }
    }

    #[test]
    fn javascript_accepts_every_builtin_indicator() {
        let registry = IndicatorRegistry::builtin();
        for kind in registry.names().map(str::to_string).collect::<Vec<_>>() {
            let mut doc = golden_cross_document();
            doc["data_sources"][2]["indicator_type"] = json!(kind);
            let result = compile(
                &doc,
                &registry,
                generator_for(Target::JavaScript).as_ref(),
                CompileOptions::default(),
            );
            assert!(result.is_ok(), "{kind} rejected: {:?}", result.err());
        }
    }

    #[test]
    fn exotic_orders_are_rejected_everywhere() {
        let strategy = {
            let mut doc = golden_cross_document();
            doc["actions"][1]["order"] = json!({"type": "iceberg", "symbol": "TSLA", "side": "sell",
                "quantity": 100, "limit_price": 250, "display_quantity": 10});
            build(&doc)
        };
        for target in Target::ALL {
            let err = generator_for(target).generate(&strategy).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("{} backend does not support order type 'iceberg'", target.name())
            );
        }
    }

    #[test]
    fn outputs_follow_a_reordered_registry() {
        let mut registry = IndicatorRegistry::new();
        registry.insert(
            "MACD",
            IndicatorSpec {
                inputs: Vec::new(),
                outputs: ["histogram", "macd", "signal"]
                    .iter()
                    .map(|n| OutputSpec { name: (*n).to_string() })
                    .collect(),
            },
        );
        let doc = json!({
            "name": "histogram flip",
            "data_sources": [
                {"id": "m", "indicator_type": "MACD", "symbol": "EURUSD",
                 "timeframe": {"period": "hour", "length": 1}}
            ],
            "actions": [
                {"id": "buy", "order": {"symbol": "EURUSD", "side": "buy", "quantity": 1}}
            ],
            "rules": [
                {"condition": {"and": [
                    {"operator": ">", "operandA": {"indicator_id": "m", "output": 0}, "operandB": 0},
                    {"operator": ">", "operandA": {"indicator_id": "m"}, "operandB": {"indicator_id": "m", "output": "signal"}}
                 ]},
                 "then": ["buy"]}
            ]
        });
        let render = |target| {
            compile(&doc, &registry, generator_for(target).as_ref(), CompileOptions::default())
                .unwrap()
                .source
        };

        let js = render(Target::JavaScript);
        assert!(js.contains("this.indicator_m(context, \"histogram\", 0) > 0.0"));
        assert!(js.contains("this.indicator_m(context, \"histogram\", 0) > this.indicator_m(context, \"signal\", 0)"));
        assert!(!js.contains("this.indicator_m(context, \"macd\", 0)"));

        let py = render(Target::Python);
        assert!(py.contains("self.indicator_m(context, 2, 0) > 0.0"));
        assert!(py.contains("self.indicator_m(context, 2, 0) > self.indicator_m(context, 1, 0)"));

        let mq = render(Target::Mql5);
        assert!(mq.contains("buf_m_2[0] > 0.0"));
        assert!(mq.contains("buf_m_2[0] > buf_m_1[0]"));
    }

    #[test]
    fn synthesized_crossover_reaches_every_backend() {
        let mut strategy = build(&golden_cross_document());
        let current = Comparison::new(
            ComparisonOperator::Greater,
            Expression::indicator("ema_50"),
            Expression::indicator("ema_200"),
        );
        let previous = Comparison::new(
            ComparisonOperator::LessOrEqual,
            Expression::indicator("ema_50"),
            Expression::indicator("ema_200"),
        );
        let cross = crossover::detect(&current, &previous).unwrap();
        strategy.rules[0] = Rule {
            condition: Condition::Crossover(cross),
            then_actions: ActionList::Ids(vec!["entry_long".into()]),
            else_actions: None,
        };

        let js = generator_for(Target::JavaScript).generate(&strategy).unwrap();
        assert!(js.contains("this.indicator_ema_50(context, \"value\", 1) <= this.indicator_ema_200(context, \"value\", 1)"));
        let py = generator_for(Target::Python).generate(&strategy).unwrap();
        assert!(py.contains("self.indicator_ema_50(context, 0, 1) <= self.indicator_ema_200(context, 0, 1)"));
        let mq = generator_for(Target::Mql5).generate(&strategy).unwrap();
        assert!(mq.contains("(buf_ema_50_0[0] > buf_ema_200_0[0] && buf_ema_50_0[1] <= buf_ema_200_0[1])"));
    }
}

mod interpretation {
    use super::*;

    #[test]
    fn rules_select_then_or_else() {
        let strategy = build(&golden_cross_document());
        let bullish = Bindings::new()
            .with_indicator("ema_50", vec![101.0, 105.0])
            .with_indicator("ema_200", vec![100.0, 100.0])
            .with_indicator("rsi", vec![50.0, 55.0]);
        assert_eq!(evaluate_rules(&strategy, &bullish).unwrap(), vec!["entry_long"]);

        let overbought = bullish.clone().with_indicator("rsi", vec![75.0]);
        assert_eq!(evaluate_rules(&strategy, &overbought).unwrap(), vec!["exit_long"]);
    }

    #[test]
    fn crossover_needs_previous_sample() {
        let current = parse_condition(&json!({"operator": ">", "operandA": {"candle_id": "px", "field": "close"}, "operandB": {"var": "level"}})).unwrap();
        let previous = parse_condition(&json!({"operator": "<=", "operandA": {"candle_id": "px", "field": "close"}, "operandB": {"var": "level"}})).unwrap();
        let (Condition::Comparison(current), Condition::Comparison(previous)) = (current, previous) else {
            panic!("expected comparisons");
        };
        let cross = crossover::detect(&current, &previous).unwrap();
        assert_eq!(cross.direction, CrossDirection::Above);
        let cond = Condition::Crossover(cross);

        let crossed = Bindings::new()
            .with_variable("level", 100.0)
            .with_candle("px", CandleField::Close, vec![99.0, 101.0]);
        assert!(evaluate_condition(&cond, &crossed).unwrap());

        let already_above = Bindings::new()
            .with_variable("level", 100.0)
            .with_candle("px", CandleField::Close, vec![102.0, 101.0]);
        assert!(!evaluate_condition(&cond, &already_above).unwrap());
    }

    #[test]
    fn constant_context_drives_every_reference() {
        let strategy = build(&golden_cross_document());
        // ema_50 > ema_200 is false when both read the same value
        assert_eq!(
            evaluate_rules(&strategy, &ConstantContext(10.0)).unwrap(),
            vec!["exit_long"]
        );
    }
}
