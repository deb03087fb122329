//! Whitelisted aggregate functions and the formula-row aggregate grammar

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::parser::Expr;
use super::parse_expression;

/// The closed set of aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFn {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl AggregateFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Count => "COUNT",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateFn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SUM" => Ok(AggregateFn::Sum),
            "AVG" => Ok(AggregateFn::Avg),
            "COUNT" => Ok(AggregateFn::Count),
            "MIN" => Ok(AggregateFn::Min),
            "MAX" => Ok(AggregateFn::Max),
            other => Err(format!("Unknown aggregate function: {}", other)),
        }
    }
}

/// Which filtered row set an aggregate reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateContext {
    Current,
    Compare,
}

impl AggregateContext {
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "current" => Some(AggregateContext::Current),
            "compare" => Some(AggregateContext::Compare),
            _ => None,
        }
    }
}

/// `FN(column)` or `FN(context.column)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateCall {
    pub function: AggregateFn,
    /// `None` for the single-context form, which reads the current rows
    pub context: Option<AggregateContext>,
    pub column: String,
}

/// Result of matching the single-context grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleAggregate {
    pub function: AggregateFn,
    /// `None` for a bare function name, which targets the formula row's own column
    pub column: Option<String>,
}

/// Reduce numeric values.
///
/// SUM and COUNT of nothing are 0; AVG, MIN and MAX of nothing are `None`.
pub fn compute_aggregate(function: AggregateFn, values: &[f64]) -> Option<f64> {
    match function {
        AggregateFn::Sum => Some(values.iter().sum()),
        AggregateFn::Count => Some(values.len() as f64),
        AggregateFn::Avg => {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        AggregateFn::Min => values.iter().copied().reduce(f64::min),
        AggregateFn::Max => values.iter().copied().reduce(f64::max),
    }
    .filter(|v| v.is_finite())
}

/// Match `FN(current.column)` / `FN(compare.column)`, the whole expression
pub fn parse_aggregate_expression(expression: &str) -> Option<AggregateCall> {
    match parse_expression(expression).ok()? {
        Expr::Aggregate(call) if call.context.is_some() => Some(call),
        _ => None,
    }
}

/// Match a bare function name (`SUM`) or `FN(column)`, the whole expression
pub fn parse_simple_aggregate_expression(expression: &str) -> Option<SimpleAggregate> {
    let trimmed = expression.trim();
    let trimmed = trimmed.strip_prefix('=').unwrap_or(trimmed).trim();
    if let Ok(function) = trimmed.parse::<AggregateFn>() {
        return Some(SimpleAggregate {
            function,
            column: None,
        });
    }

    match parse_expression(expression).ok()? {
        Expr::Aggregate(AggregateCall {
            function,
            context: None,
            column,
        }) => Some(SimpleAggregate {
            function,
            column: Some(column),
        }),
        _ => None,
    }
}
