//! Restricted arithmetic expressions
//!
//! Parse once, evaluate many. Formulas are `+ - * /` and parentheses over
//! numbers and named bindings, plus the whitelisted aggregate calls
//! (`SUM AVG COUNT MIN MAX`) used by summary rows. Nothing else parses:
//! no other calls, no property access, no string literals.

pub mod aggregate;
pub mod evaluator;
pub mod parser;
pub mod tokenizer;

use std::collections::HashMap;
use std::sync::Arc;

pub use aggregate::{
    compute_aggregate, parse_aggregate_expression, parse_simple_aggregate_expression, AggregateCall,
    AggregateContext, AggregateFn, SimpleAggregate,
};
pub use evaluator::{evaluate, Bindings};
pub use parser::{BinaryOp, Expr};

/// Malformed formula text
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionSyntaxError {
    pub message: String,
    /// Byte offset into the formula (token index once past tokenizing)
    pub position: usize,
}

impl ExpressionSyntaxError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for ExpressionSyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (at position {})", self.message, self.position)
    }
}

impl std::error::Error for ExpressionSyntaxError {}

/// Tokenize and parse a formula
pub fn parse_expression(formula: &str) -> Result<Expr, ExpressionSyntaxError> {
    let tokens = tokenizer::tokenize(formula)?;
    parser::parse(tokens)
}

/// Parsed formulas keyed by their text, failures included, for one execution
#[derive(Debug, Default)]
pub struct ExpressionCache {
    entries: HashMap<String, Result<Arc<Expr>, ExpressionSyntaxError>>,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&mut self, formula: &str) -> Result<Arc<Expr>, ExpressionSyntaxError> {
        if let Some(entry) = self.entries.get(formula) {
            return entry.clone();
        }
        let entry = parse_expression(formula).map(Arc::new);
        self.entries.insert(formula.to_string(), entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
