//! Code generation port: the abstract visitor every backend implements.
//!
//! A backend supplies one rendering method per node kind. The provided
//! [`CodeGenerator::render_expression`] and [`CodeGenerator::render_condition`]
//! match every variant exhaustively, so a new node kind cannot compile until
//! each backend handles it.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::{CodegenError, StratforgeError};
use crate::domain::expression::{
    BinaryOperator, CandleField, ComparisonOperator, Condition, CrossDirection, Expression,
    LogicalOperator, OutputSelector,
};
use crate::domain::index::StrategyIndex;
use crate::domain::strategy::{Action, DataSource, Order, PositionLimit, Rule, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    JavaScript,
    Python,
    Mql5,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::JavaScript, Target::Python, Target::Mql5];

    pub fn name(self) -> &'static str {
        match self {
            Target::JavaScript => "javascript",
            Target::Python => "python",
            Target::Mql5 => "mql5",
        }
    }

    pub fn file_extension(self) -> &'static str {
        match self {
            Target::JavaScript => "js",
            Target::Python => "py",
            Target::Mql5 => "mq5",
        }
    }

    /// Line-comment marker in the generated language.
    pub fn comment_prefix(self) -> &'static str {
        match self {
            Target::JavaScript | Target::Mql5 => "//",
            Target::Python => "#",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Target {
    type Err = StratforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "javascript" | "js" => Ok(Target::JavaScript),
            "python" | "py" => Ok(Target::Python),
            "mql5" | "mq5" => Ok(Target::Mql5),
            _ => Err(StratforgeError::UnknownTarget {
                name: s.to_string(),
            }),
        }
    }
}

/// Lookup scope handed to every rendering method.
pub type Scope<'s> = StrategyIndex<'s>;

/// A pure AST-to-text renderer for one execution target.
///
/// `shift` is the number of bars back from the current sample; it is 0
/// except inside the previous-sample half of a crossover.
pub trait CodeGenerator {
    fn target(&self) -> Target;

    /// Renders the whole program. Same strategy, same text.
    fn generate(&self, strategy: &Strategy) -> Result<String, CodegenError>;

    fn render_literal(&self, value: f64) -> String;

    fn render_variable(&self, name: &str) -> String;

    fn render_binary(&self, operator: BinaryOperator, left: &str, right: &str) -> String;

    fn render_indicator_output(
        &self,
        scope: &Scope<'_>,
        indicator_id: &str,
        output: Option<&OutputSelector>,
        shift: usize,
    ) -> Result<String, CodegenError>;

    fn render_candle_field(
        &self,
        scope: &Scope<'_>,
        candle_id: &str,
        field: CandleField,
        shift: usize,
    ) -> Result<String, CodegenError>;

    fn render_comparison(&self, operator: ComparisonOperator, left: &str, right: &str) -> String;

    fn render_logical(&self, operator: LogicalOperator, children: &[String]) -> String;

    /// `current` and `previous` hold the rendered `(series_a, series_b)`
    /// pair at shift 0 and shift 1.
    fn render_crossover(
        &self,
        direction: CrossDirection,
        current: (&str, &str),
        previous: (&str, &str),
    ) -> String;

    /// Declaration or accessor for one data source.
    fn render_data_source(&self, scope: &Scope<'_>, source: &DataSource) -> Result<String, CodegenError>;

    /// One rule as a conditional block that collects action ids.
    fn render_rule(&self, scope: &Scope<'_>, rule: &Rule) -> Result<String, CodegenError>;

    /// One dispatcher branch for an action.
    fn render_action(&self, scope: &Scope<'_>, action: &Action) -> Result<String, CodegenError>;

    /// Order-construction expression or statement.
    fn render_order(&self, scope: &Scope<'_>, order: &Order) -> Result<String, CodegenError>;

    /// Guard clause rejecting orders that leave `[min, max]`.
    fn render_position_limit(
        &self,
        scope: &Scope<'_>,
        limit: &PositionLimit,
    ) -> Result<String, CodegenError>;

    fn render_expression(
        &self,
        scope: &Scope<'_>,
        expr: &Expression,
        shift: usize,
    ) -> Result<String, CodegenError> {
        match expr {
            Expression::Literal(value) => Ok(self.render_literal(*value)),
            Expression::Variable(name) => Ok(self.render_variable(name)),
            Expression::Binary {
                operator,
                left,
                right,
            } => {
                let l = self.render_expression(scope, left, shift)?;
                let r = self.render_expression(scope, right, shift)?;
                Ok(self.render_binary(*operator, &l, &r))
            }
            Expression::IndicatorOutput {
                indicator_id,
                output,
            } => self.render_indicator_output(scope, indicator_id, output.as_ref(), shift),
            Expression::CandleField { candle_id, field } => {
                self.render_candle_field(scope, candle_id, *field, shift)
            }
        }
    }

    fn render_condition(
        &self,
        scope: &Scope<'_>,
        condition: &Condition,
        shift: usize,
    ) -> Result<String, CodegenError> {
        match condition {
            Condition::Comparison(cmp) => {
                let l = self.render_expression(scope, &cmp.left, shift)?;
                let r = self.render_expression(scope, &cmp.right, shift)?;
                Ok(self.render_comparison(cmp.operator, &l, &r))
            }
            Condition::Logical { operator, children } => {
                let rendered = children
                    .iter()
                    .map(|child| self.render_condition(scope, child, shift))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.render_logical(*operator, &rendered))
            }
            Condition::Crossover(cross) => {
                let a_curr = self.render_expression(scope, &cross.series_a, shift)?;
                let b_curr = self.render_expression(scope, &cross.series_b, shift)?;
                let a_prev = self.render_expression(scope, &cross.series_a, shift + 1)?;
                let b_prev = self.render_expression(scope, &cross.series_b, shift + 1)?;
                Ok(self.render_crossover(
                    cross.direction,
                    (&a_curr, &b_curr),
                    (&a_prev, &b_prev),
                ))
            }
        }
    }
}
