//! Numeric evaluation of expression trees.
//!
//! The core stays agnostic about what numbers mean; everything numeric goes
//! through a [`Context`]. [`Builtins`] is the stock implementation used by
//! the standard catalog.

use crate::catalog::{Operator, Placement};
use crate::matching::{substitute, ConstraintChecker, Matching};
use crate::tree::Node;
use euclid::approxeq::ApproxEq;
use smol_str::SmolStr;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Contextual information used when evaluating an expression tree.
pub trait Context {
    /// Interpret a bare token as a numeric literal, if it is one.
    fn try_parse_literal(&self, text: &str) -> Option<f64>;

    /// Apply an operator to already-evaluated argument values.
    fn evaluate(
        &self,
        op: &Operator,
        arguments: &[f64],
    ) -> Result<f64, EvaluationError>;

    fn display_value(&self, value: f64) -> String { value.to_string() }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationError {
    UnknownOperator { name: SmolStr },
    UnboundVariable { name: SmolStr },
    WrongArgumentCount { name: SmolStr },
    DivisionByZero,
    /// The operator is known but has no value at these arguments, like the
    /// factorial of a negative number.
    DomainError { name: SmolStr },
}

impl Display for EvaluationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationError::UnknownOperator { name } => {
                write!(f, "Unable to evaluate \"{}\"", name)
            },
            EvaluationError::UnboundVariable { name } => {
                write!(f, "The variable \"{}\" has no value", name)
            },
            EvaluationError::WrongArgumentCount { name } => {
                write!(f, "Wrong number of arguments for \"{}\"", name)
            },
            EvaluationError::DivisionByZero => write!(f, "Division by zero"),
            EvaluationError::DomainError { name } => {
                write!(f, "\"{}\" is undefined at these arguments", name)
            },
        }
    }
}

impl std::error::Error for EvaluationError {}

/// The stock numeric context: literals, arithmetic, degree-based
/// trigonometry and the other operators of the standard catalog.
#[derive(Debug, Default, Copy, Clone)]
pub struct Builtins;

impl Context for Builtins {
    fn try_parse_literal(&self, text: &str) -> Option<f64> {
        match text {
            "pi" => Some(std::f64::consts::PI),
            "e" => Some(std::f64::consts::E),
            _ => f64::from_str(text).ok(),
        }
    }

    fn evaluate(
        &self,
        op: &Operator,
        arguments: &[f64],
    ) -> Result<f64, EvaluationError> {
        match op.placement {
            Placement::Infix => {
                let (left, right) = binary(op, arguments)?;

                match op.name.as_str() {
                    "+" => Ok(left + right),
                    "-" => Ok(left - right),
                    "*" => Ok(left * right),
                    "/" => {
                        if right == 0.0 {
                            Err(EvaluationError::DivisionByZero)
                        } else {
                            Ok(left / right)
                        }
                    },
                    "^" => Ok(left.powf(right)),
                    "=" => Ok(truth(left.approx_eq(&right))),
                    "<" => Ok(truth(left < right)),
                    ">" => Ok(truth(left > right)),
                    "<=" => Ok(truth(left <= right)),
                    ">=" => Ok(truth(left >= right)),
                    _ => Err(unknown(op)),
                }
            },
            Placement::Prefix => {
                let argument = unary(op, arguments)?;

                match op.name.as_str() {
                    "-" => Ok(-argument),
                    _ => Err(unknown(op)),
                }
            },
            Placement::Postfix => {
                let argument = unary(op, arguments)?;

                match op.name.as_str() {
                    "!" => factorial(argument).ok_or_else(|| {
                        EvaluationError::DomainError {
                            name: op.name.clone(),
                        }
                    }),
                    _ => Err(unknown(op)),
                }
            },
            Placement::Function => match op.name.as_str() {
                "sin" => Ok(unary(op, arguments)?.to_radians().sin()),
                "cos" => Ok(unary(op, arguments)?.to_radians().cos()),
                "tan" => Ok(unary(op, arguments)?.to_radians().tan()),
                "sqrt" => Ok(unary(op, arguments)?.sqrt()),
                "sum" => Ok(arguments.iter().sum()),
                _ => Err(unknown(op)),
            },
        }
    }
}

fn unknown(op: &Operator) -> EvaluationError {
    EvaluationError::UnknownOperator {
        name: op.name.clone(),
    }
}

fn unary(op: &Operator, arguments: &[f64]) -> Result<f64, EvaluationError> {
    match arguments {
        [argument] => Ok(*argument),
        _ => Err(EvaluationError::WrongArgumentCount {
            name: op.name.clone(),
        }),
    }
}

fn binary(
    op: &Operator,
    arguments: &[f64],
) -> Result<(f64, f64), EvaluationError> {
    match arguments {
        [left, right] => Ok((*left, *right)),
        _ => Err(EvaluationError::WrongArgumentCount {
            name: op.name.clone(),
        }),
    }
}

/// Relations evaluate numerically, 1 for true and 0 for false.
fn truth(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn factorial(value: f64) -> Option<f64> {
    if value < 0.0 || value.fract() != 0.0 {
        return None;
    }

    let mut result = 1.0;
    let mut k = 2.0;
    while k <= value {
        result *= k;
        k += 1.0;
    }

    Some(result)
}

/// Evaluate a whole tree to a number. Fails on the first free variable or
/// operator the context can't handle.
pub fn evaluate<C>(tree: &Node, ctx: &C) -> Result<f64, EvaluationError>
where
    C: Context,
{
    match tree {
        Node::Constant(value) => Ok(*value),
        Node::Variable(v) => Err(EvaluationError::UnboundVariable {
            name: v.name.clone(),
        }),
        Node::Operator { op, children } => {
            let mut arguments = Vec::with_capacity(children.len());
            for child in children {
                arguments.push(evaluate(child, ctx)?);
            }

            ctx.evaluate(op, &arguments)
        },
    }
}

/// Simplify a tree by evaluating every fully-constant operator node.
///
/// Identity laws like `x + 0 -> x` are deliberately not folded here; they
/// belong to rewrite rulesets, where they stay user-visible and extensible.
pub fn fold_constants<C>(tree: &Node, ctx: &C) -> Node
where
    C: Context,
{
    match tree {
        Node::Operator { op, children } => {
            let children: Vec<_> =
                children.iter().map(|child| fold_constants(child, ctx)).collect();

            let values: Option<Vec<f64>> = children
                .iter()
                .map(|child| match child {
                    Node::Constant(value) => Some(*value),
                    _ => None,
                })
                .collect();

            if let Some(values) = values {
                if let Ok(result) = ctx.evaluate(op, &values) {
                    return Node::constant(result);
                }
            }

            Node::operator(op.clone(), children)
        },
        _ => tree.clone(),
    }
}

/// Checks pattern constraints by substituting the bindings in and evaluating
/// numerically: a constraint holds when it evaluates to a non-zero number.
#[derive(Debug, Copy, Clone)]
pub struct NumericChecker<'c, C> {
    ctx: &'c C,
}

impl<'c, C: Context> NumericChecker<'c, C> {
    pub fn new(ctx: &'c C) -> Self { NumericChecker { ctx } }
}

impl<'c, C: Context> ConstraintChecker for NumericChecker<'c, C> {
    fn satisfied(&self, constraint: &Node, matching: &Matching<'_>) -> bool {
        let substituted = substitute(constraint, matching);

        match evaluate(&substituted, self.ctx) {
            Ok(value) => !value.approx_eq(&0.0),
            Err(_) => false,
        }
    }
}
