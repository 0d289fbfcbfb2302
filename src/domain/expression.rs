//! Expression and condition node types.
//!
//! - `Expression`: numeric values (literals, variables, arithmetic, indicator
//!   outputs, candle fields)
//! - `Condition`: boolean tests built from comparisons, logical groups and
//!   synthesized crossovers
//!
//! Cross-references to data sources are plain string ids; they are resolved
//! through the validation context or a [`StrategyIndex`](crate::domain::index::StrategyIndex),
//! never through pointers.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(f64),
    Variable(String),
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    IndicatorOutput {
        indicator_id: String,
        output: Option<OutputSelector>,
    },
    CandleField {
        candle_id: String,
        field: CandleField,
    },
}

impl Expression {
    pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn indicator(indicator_id: impl Into<String>) -> Self {
        Expression::IndicatorOutput {
            indicator_id: indicator_id.into(),
            output: None,
        }
    }

    pub fn candle(candle_id: impl Into<String>, field: CandleField) -> Self {
        Expression::CandleField {
            candle_id: candle_id.into(),
            field,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    /// `left` percent of `right`.
    Percent,
}

impl BinaryOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(BinaryOperator::Add),
            "-" => Some(BinaryOperator::Subtract),
            "*" => Some(BinaryOperator::Multiply),
            "/" => Some(BinaryOperator::Divide),
            "mod" => Some(BinaryOperator::Modulo),
            "pct" => Some(BinaryOperator::Percent),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "mod",
            BinaryOperator::Percent => "pct",
        }
    }
}

/// Selects one output of a multi-output indicator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputSelector {
    Name(String),
    Index(usize),
}

impl fmt::Display for OutputSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSelector::Name(name) => write!(f, "{}", name),
            OutputSelector::Index(index) => write!(f, "#{}", index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CandleField {
    Open,
    High,
    Low,
    Close,
    Volume,
    Timestamp,
}

impl CandleField {
    pub const ALL: [CandleField; 6] = [
        CandleField::Open,
        CandleField::High,
        CandleField::Low,
        CandleField::Close,
        CandleField::Volume,
        CandleField::Timestamp,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "open" => Some(CandleField::Open),
            "high" => Some(CandleField::High),
            "low" => Some(CandleField::Low),
            "close" => Some(CandleField::Close),
            "volume" => Some(CandleField::Volume),
            "timestamp" => Some(CandleField::Timestamp),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CandleField::Open => "open",
            CandleField::High => "high",
            CandleField::Low => "low",
            CandleField::Close => "close",
            CandleField::Volume => "volume",
            CandleField::Timestamp => "timestamp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
    Equal,
    NotEqual,
}

impl ComparisonOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "<" => Some(ComparisonOperator::Less),
            ">" => Some(ComparisonOperator::Greater),
            "<=" => Some(ComparisonOperator::LessOrEqual),
            ">=" => Some(ComparisonOperator::GreaterOrEqual),
            "==" => Some(ComparisonOperator::Equal),
            "!=" => Some(ComparisonOperator::NotEqual),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOperator::Less => "<",
            ComparisonOperator::Greater => ">",
            ComparisonOperator::LessOrEqual => "<=",
            ComparisonOperator::GreaterOrEqual => ">=",
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrossDirection {
    Above,
    Below,
}

impl fmt::Display for CrossDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrossDirection::Above => write!(f, "above"),
            CrossDirection::Below => write!(f, "below"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub operator: ComparisonOperator,
    pub left: Expression,
    pub right: Expression,
}

impl Comparison {
    pub fn new(operator: ComparisonOperator, left: Expression, right: Expression) -> Self {
        Self {
            operator,
            left,
            right,
        }
    }
}

/// A two-sample crossing event between two series. Never produced by the
/// builder; see [`crate::domain::crossover::detect`].
#[derive(Debug, Clone, PartialEq)]
pub struct Crossover {
    pub series_a: Expression,
    pub series_b: Expression,
    pub direction: CrossDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Comparison(Comparison),
    Logical {
        operator: LogicalOperator,
        children: Vec<Condition>,
    },
    Crossover(Crossover),
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "{}", value),
            Expression::Variable(name) => write!(f, "${}", name),
            Expression::Binary {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator.symbol(), right),
            Expression::IndicatorOutput {
                indicator_id,
                output: Some(output),
            } => write!(f, "{}.{}", indicator_id, output),
            Expression::IndicatorOutput {
                indicator_id,
                output: None,
            } => write!(f, "{}", indicator_id),
            Expression::CandleField { candle_id, field } => {
                write!(f, "{}.{}", candle_id, field.name())
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Comparison(cmp) => {
                write!(f, "{} {} {}", cmp.left, cmp.operator.symbol(), cmp.right)
            }
            Condition::Logical { operator, children } => {
                let keyword = match operator {
                    LogicalOperator::And => "AND",
                    LogicalOperator::Or => "OR",
                };
                write!(f, "{}(", keyword)?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Condition::Crossover(cross) => write!(
                f,
                "CROSS_{}({}, {})",
                cross.direction.to_string().to_uppercase(),
                cross.series_a,
                cross.series_b
            ),
        }
    }
}
