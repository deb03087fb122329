//! Formula evaluator
//!
//! Evaluation is total: a missing binding, an aggregate the bindings cannot
//! answer, division by zero or a non-finite intermediate all give `None`.

use std::collections::HashMap;

use super::aggregate::AggregateCall;
use super::parser::{BinaryOp, Expr};

/// Where an expression reads its operands from
pub trait Bindings {
    fn value(&self, name: &str) -> Option<f64>;

    /// Row-level bindings have no aggregates
    fn aggregate(&self, _call: &AggregateCall) -> Option<f64> {
        None
    }
}

impl Bindings for HashMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

pub fn evaluate<B: Bindings + ?Sized>(expr: &Expr, bindings: &B) -> Option<f64> {
    let result = match expr {
        Expr::Number(n) => Some(*n),
        Expr::Identifier(name) => bindings.value(name),
        Expr::Aggregate(call) => bindings.aggregate(call),
        Expr::Negate(operand) => evaluate(operand, bindings).map(|n| -n),
        Expr::Binary { op, left, right } => {
            let l = evaluate(left, bindings)?;
            let r = evaluate(right, bindings)?;
            match op {
                BinaryOp::Add => Some(l + r),
                BinaryOp::Sub => Some(l - r),
                BinaryOp::Mul => Some(l * r),
                BinaryOp::Div if r == 0.0 => None,
                BinaryOp::Div => Some(l / r),
            }
        }
    };
    result.filter(|n| n.is_finite())
}
