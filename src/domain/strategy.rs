//! Strategy aggregate: data sources, actions, rules and position limits.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::domain::expression::{Condition, Expression};

/// A symbol is either fixed in the document or bound when the generated
/// program starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymbolRef {
    Literal(String),
    Variable(String),
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolRef::Literal(s) => write!(f, "{}", s),
            SymbolRef::Variable(name) => write!(f, "${}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Period {
    Second,
    Minute,
    Hour,
    Day,
    Month,
}

impl Period {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "second" => Some(Period::Second),
            "minute" => Some(Period::Minute),
            "hour" => Some(Period::Hour),
            "day" => Some(Period::Day),
            "month" => Some(Period::Month),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Period::Second => "second",
            Period::Minute => "minute",
            Period::Hour => "hour",
            Period::Day => "day",
            Period::Month => "month",
        }
    }
}

/// `length` is kept signed so a non-positive value survives the build and is
/// reported by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    pub period: Period,
    pub length: i64,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.length, self.period.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataSourceKind {
    Indicator {
        /// Upper-cased registry name, e.g. `EMA`.
        indicator_type: String,
        params: BTreeMap<String, Value>,
    },
    Candle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub id: String,
    pub kind: DataSourceKind,
    pub symbol: SymbolRef,
    pub timeframe: Timeframe,
    /// Bars back from the current bar.
    pub offset: u32,
}

impl DataSource {
    pub fn is_indicator(&self) -> bool {
        matches!(self.kind, DataSourceKind::Indicator { .. })
    }

    pub fn indicator_type(&self) -> Option<&str> {
        match &self.kind {
            DataSourceKind::Indicator { indicator_type, .. } => Some(indicator_type),
            DataSourceKind::Candle => None,
        }
    }

    pub fn params(&self) -> Option<&BTreeMap<String, Value>> {
        match &self.kind {
            DataSourceKind::Indicator { params, .. } => Some(params),
            DataSourceKind::Candle => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn name(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeInForce {
    #[default]
    Day,
    Gtc,
    Ioc,
    Fok,
}

impl TimeInForce {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "day" => Some(TimeInForce::Day),
            "gtc" => Some(TimeInForce::Gtc),
            "ioc" => Some(TimeInForce::Ioc),
            "fok" => Some(TimeInForce::Fok),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TimeInForce::Day => "day",
            TimeInForce::Gtc => "gtc",
            TimeInForce::Ioc => "ioc",
            TimeInForce::Fok => "fok",
        }
    }
}

/// Order variants with their own payloads. Backends keep an allowlist of the
/// kinds they can emit and reject the rest.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderKind {
    Market,
    Limit {
        limit_price: Expression,
    },
    Stop {
        stop_price: Expression,
    },
    StopLimit {
        stop_price: Expression,
        limit_price: Expression,
    },
    TrailingStop {
        trail_amount: Expression,
    },
    Oco {
        orders: Vec<Order>,
    },
    Bracket {
        take_profit: Expression,
        stop_loss: Expression,
    },
    Iceberg {
        limit_price: Expression,
        display_quantity: Expression,
    },
    AllOrNone {
        limit_price: Option<Expression>,
    },
    FillOrKill {
        limit_price: Option<Expression>,
    },
    ImmediateOrCancel {
        limit_price: Option<Expression>,
    },
    GoodTillDate {
        limit_price: Option<Expression>,
        expires: String,
    },
    Pegged {
        peg: String,
        peg_offset: Expression,
    },
}

impl OrderKind {
    pub fn name(&self) -> &'static str {
        match self {
            OrderKind::Market => "market",
            OrderKind::Limit { .. } => "limit",
            OrderKind::Stop { .. } => "stop",
            OrderKind::StopLimit { .. } => "stop_limit",
            OrderKind::TrailingStop { .. } => "trailing_stop",
            OrderKind::Oco { .. } => "oco",
            OrderKind::Bracket { .. } => "bracket",
            OrderKind::Iceberg { .. } => "iceberg",
            OrderKind::AllOrNone { .. } => "all_or_none",
            OrderKind::FillOrKill { .. } => "fok",
            OrderKind::ImmediateOrCancel { .. } => "ioc",
            OrderKind::GoodTillDate { .. } => "gtd",
            OrderKind::Pegged { .. } => "pegged",
        }
    }

    /// Price and size expressions carried by the payload, in document order.
    pub fn expressions(&self) -> Vec<&Expression> {
        match self {
            OrderKind::Market => Vec::new(),
            OrderKind::Limit { limit_price } => vec![limit_price],
            OrderKind::Stop { stop_price } => vec![stop_price],
            OrderKind::StopLimit {
                stop_price,
                limit_price,
            } => vec![stop_price, limit_price],
            OrderKind::TrailingStop { trail_amount } => vec![trail_amount],
            OrderKind::Oco { orders } => orders.iter().flat_map(|o| o.expressions()).collect(),
            OrderKind::Bracket {
                take_profit,
                stop_loss,
            } => vec![take_profit, stop_loss],
            OrderKind::Iceberg {
                limit_price,
                display_quantity,
            } => vec![limit_price, display_quantity],
            OrderKind::AllOrNone { limit_price }
            | OrderKind::FillOrKill { limit_price }
            | OrderKind::ImmediateOrCancel { limit_price }
            | OrderKind::GoodTillDate { limit_price, .. } => limit_price.iter().collect(),
            OrderKind::Pegged { peg_offset, .. } => vec![peg_offset],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub symbol: SymbolRef,
    pub side: Side,
    pub quantity: Expression,
    pub time_in_force: TimeInForce,
    pub kind: OrderKind,
}

impl Order {
    /// Quantity followed by the payload expressions.
    pub fn expressions(&self) -> Vec<&Expression> {
        let mut out = vec![&self.quantity];
        out.extend(self.kind.expressions());
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub id: String,
    pub order: Order,
}

/// Permitted net-position range for a symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionLimit {
    pub symbol: SymbolRef,
    pub max: Expression,
    pub min: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionList {
    Ids(Vec<String>),
    Nested(Box<Rule>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub condition: Condition,
    pub then_actions: ActionList,
    pub else_actions: Option<ActionList>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Strategy {
    pub name: Option<String>,
    pub description: Option<String>,
    pub data_sources: Vec<DataSource>,
    pub rules: Vec<Rule>,
    pub actions: Vec<Action>,
    pub position_limits: Vec<PositionLimit>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(symbol: &str, side: Side) -> Order {
        Order {
            symbol: SymbolRef::Literal(symbol.into()),
            side,
            quantity: Expression::Literal(10.0),
            time_in_force: TimeInForce::Day,
            kind: OrderKind::Market,
        }
    }

    #[test]
    fn order_kind_names() {
        assert_eq!(OrderKind::Market.name(), "market");
        assert_eq!(
            OrderKind::TrailingStop {
                trail_amount: Expression::Literal(1.0)
            }
            .name(),
            "trailing_stop"
        );
        assert_eq!(
            OrderKind::GoodTillDate {
                limit_price: None,
                expires: "2025-01-01".into()
            }
            .name(),
            "gtd"
        );
    }

    #[test]
    fn order_expressions_include_payload() {
        let mut order = market("TSLA", Side::Buy);
        order.kind = OrderKind::StopLimit {
            stop_price: Expression::Literal(95.0),
            limit_price: Expression::Literal(94.5),
        };
        let exprs = order.expressions();
        assert_eq!(exprs.len(), 3);
        assert_eq!(exprs[0], &Expression::Literal(10.0));
        assert_eq!(exprs[2], &Expression::Literal(94.5));
    }

    #[test]
    fn data_source_accessors() {
        let ds = DataSource {
            id: "ema_fast".into(),
            kind: DataSourceKind::Indicator {
                indicator_type: "EMA".into(),
                params: BTreeMap::new(),
            },
            symbol: SymbolRef::Variable("symbol".into()),
            timeframe: Timeframe {
                period: Period::Day,
                length: 1,
            },
            offset: 0,
        };
        assert!(ds.is_indicator());
        assert_eq!(ds.indicator_type(), Some("EMA"));
        assert_eq!(ds.symbol.to_string(), "$symbol");
        assert_eq!(ds.timeframe.to_string(), "1day");
    }

    #[test]
    fn time_in_force_defaults_to_day() {
        assert_eq!(TimeInForce::default(), TimeInForce::Day);
        assert_eq!(TimeInForce::from_name("gtc"), Some(TimeInForce::Gtc));
        assert_eq!(TimeInForce::from_name("gtd"), None);
    }
}
