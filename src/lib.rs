//! The symbolic core of an interactive calculator: a tokenizer and
//! shunting-yard parser driven by a runtime-extensible operator catalog, an
//! expression tree, and a pattern-matching term-rewriting engine.
//!
//! ```rust
//! use symcalc::{parse, Builtins, Catalog};
//!
//! let catalog = Catalog::standard();
//! let tree = parse(&catalog, "2x + sin(90)", &Builtins::default())?;
//!
//! assert_eq!(tree.to_string(), "2*x+sin(90)");
//! # Ok::<(), symcalc::ParseError>(())
//! ```

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

pub mod catalog;
pub mod matching;
pub mod ops;
pub mod parser;
pub mod pattern;
pub mod rule;
pub mod token;
pub mod tree;

pub use crate::catalog::{
    Arity, Associativity, Catalog, CatalogError, Operator, OperatorId,
    Placement,
};
pub use crate::matching::{
    find_all_matchings, find_matching, match_at_root, substitute,
    ConstraintChecker, Matching, NodeList, Unconstrained,
};
pub use crate::ops::{
    evaluate, fold_constants, Builtins, Context, EvaluationError,
    NumericChecker,
};
pub use crate::parser::{parse, ParseError, ParseErrorKind};
pub use crate::pattern::{Pattern, PatternError, PatternVariable};
pub use crate::rule::{
    parse_rule_file, RewriteRule, RuleError, RuleFileError, RuleFileErrorKind,
    Ruleset, DEFAULT_ITERATION_CAP,
};
pub use crate::token::{tokenize, Token, TokenKind};
pub use crate::tree::{Node, NodePath, Variable};
