//! Crossover synthesis from two temporally adjacent comparisons.
//!
//! The produced node only states intent; backends realise it as a
//! current-versus-previous check over the two series.

use crate::domain::expression::{Comparison, ComparisonOperator, CrossDirection, Crossover};

/// Recognises a crossing event between `previous` and `current`.
///
/// Both comparisons must have deep-equal operands. Returns `None` for any
/// other combination; partial matches are never guessed.
pub fn detect(current: &Comparison, previous: &Comparison) -> Option<Crossover> {
    if current.left != previous.left || current.right != previous.right {
        return None;
    }
    let direction = match (current.operator, previous.operator) {
        (
            ComparisonOperator::Greater,
            ComparisonOperator::LessOrEqual | ComparisonOperator::Less,
        ) => CrossDirection::Above,
        (
            ComparisonOperator::Less,
            ComparisonOperator::GreaterOrEqual | ComparisonOperator::Greater,
        ) => CrossDirection::Below,
        _ => return None,
    };
    Some(Crossover {
        series_a: current.left.clone(),
        series_b: current.right.clone(),
        direction,
    })
}
