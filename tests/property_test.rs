//! Property-based tests for the interpreter, folding and generation.

mod common;

use approx::assert_relative_eq;
use common::*;
use proptest::prelude::*;
use serde_json::json;
use stratforge::adapters::codegen::generator_for;
use stratforge::domain::eval::{
    Bindings, EPSILON, apply, compare, evaluate, fold_constants,
};
use stratforge::domain::expression::{BinaryOperator, ComparisonOperator, Expression};
use stratforge::ports::codegen_port::Target;

fn binary_operator() -> impl Strategy<Value = BinaryOperator> {
    prop_oneof![
        Just(BinaryOperator::Add),
        Just(BinaryOperator::Subtract),
        Just(BinaryOperator::Multiply),
        Just(BinaryOperator::Divide),
        Just(BinaryOperator::Modulo),
        Just(BinaryOperator::Percent),
    ]
}

/// Literal-only trees up to a few levels deep.
fn literal_tree() -> impl Strategy<Value = Expression> {
    let leaf = (-1000.0f64..1000.0).prop_map(Expression::Literal);
    leaf.prop_recursive(4, 16, 2, |inner| {
        (binary_operator(), inner.clone(), inner)
            .prop_map(|(op, l, r)| Expression::binary(op, l, r))
    })
}

proptest! {
    #[test]
    fn equality_tolerates_sub_epsilon_noise(a in -1e6f64..1e6, delta in (-EPSILON / 10.0)..(EPSILON / 10.0)) {
        prop_assert!(compare(ComparisonOperator::Equal, a, a + delta));
        prop_assert_eq!(
            compare(ComparisonOperator::Equal, a, a + delta),
            compare(ComparisonOperator::Equal, a + delta, a)
        );
    }

    #[test]
    fn not_equal_negates_equal(a in -1e6f64..1e6, b in -1e6f64..1e6) {
        prop_assert_eq!(
            compare(ComparisonOperator::NotEqual, a, b),
            !compare(ComparisonOperator::Equal, a, b)
        );
    }

    #[test]
    fn percent_of_hundred_is_identity(x in -1e6f64..1e6) {
        let result = apply(BinaryOperator::Percent, 100.0, x).unwrap();
        assert_relative_eq!(result, x, max_relative = 1e-12);
    }

    #[test]
    fn modulo_stays_below_divisor(a in -1e6f64..1e6, b in 0.001f64..1e3) {
        let r = apply(BinaryOperator::Modulo, a, b).unwrap();
        prop_assert!(r.abs() < b);
        prop_assert!(r == 0.0 || r.signum() == a.signum());
    }

    #[test]
    fn zero_divisor_always_fails(a in -1e6f64..1e6) {
        prop_assert!(apply(BinaryOperator::Divide, a, 0.0).is_err());
        prop_assert!(apply(BinaryOperator::Modulo, a, 0.0).is_err());
    }

    #[test]
    fn folding_preserves_value(tree in literal_tree()) {
        let ctx = Bindings::new();
        let folded = fold_constants(&tree);
        match evaluate(&tree, &ctx) {
            Ok(expected) if expected.is_finite() => {
                let actual = evaluate(&folded, &ctx).unwrap();
                assert_relative_eq!(actual, expected, max_relative = 1e-9);
            }
            Ok(_) => {}
            Err(err) => prop_assert_eq!(evaluate(&folded, &ctx).unwrap_err(), err),
        }
    }

    #[test]
    fn generation_is_deterministic(threshold in 1u32..100, period in 2u32..400) {
        let mut doc = golden_cross_document();
        doc["data_sources"][1]["params"]["period"] = json!(period);
        doc["rules"][0]["condition"]["and"][1]["expression"]["operandB"] = json!(threshold);
        let strategy = build(&doc);
        for target in Target::ALL {
            let generator = generator_for(target);
            let first = generator.generate(&strategy).unwrap();
            let second = generator.generate(&build(&doc)).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
