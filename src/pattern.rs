//! Patterns: expression trees whose variables are indexed for matching, plus
//! per-variable side constraints.

use crate::catalog::Arity;
use crate::tree::{Node, Variable};
use smol_str::SmolStr;
use std::fmt::{self, Display, Formatter};

/// One free variable of a [`Pattern`].
#[derive(Debug, Clone, PartialEq)]
pub struct PatternVariable {
    pub name: SmolStr,
    pub list: bool,
}

/// A tree to match against, with its free variables indexed in pre-order of
/// first occurrence and any side constraints attached to the variable whose
/// binding completes them.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    root: Node,
    variables: Vec<PatternVariable>,
    /// `constraints[i]` holds every constraint whose last required variable
    /// is `i`, so each one is checked as soon as it *can* be checked and
    /// failing branches are pruned as early as possible.
    constraints: Vec<Vec<Node>>,
}

/// Why a [`Pattern`] couldn't be built.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternError {
    /// The same name is used both as a plain variable and a list-variable.
    InconsistentVariable { name: SmolStr },
    /// A constraint mentions a variable the pattern doesn't bind.
    UnknownVariableInConstraint { name: SmolStr },
    /// A constraint mentions no variables at all, so there is no binding
    /// event to trigger its check.
    ConstraintWithoutVariables,
    /// A constraint puts a list-variable somewhere a run of nodes can't be
    /// substituted: at the root, or under a fixed-arity operator.
    MisplacedListVariable { name: SmolStr },
}

impl Display for PatternError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::InconsistentVariable { name } => write!(
                f,
                "\"{}\" is used both as a plain variable and a list-variable",
                name
            ),
            PatternError::UnknownVariableInConstraint { name } => write!(
                f,
                "The constraint mentions \"{}\", which the pattern doesn't bind",
                name
            ),
            PatternError::ConstraintWithoutVariables => {
                write!(f, "The constraint mentions no pattern variables")
            },
            PatternError::MisplacedListVariable { name } => write!(
                f,
                "\"[{}]\" may only appear as an argument of a variadic operator",
                name
            ),
        }
    }
}

impl std::error::Error for PatternError {}

impl Pattern {
    /// Index the tree's variables and wrap it as a pattern.
    pub fn new(mut root: Node) -> Result<Self, PatternError> {
        let variables = index_variables(&root)?;
        assign_indices(&mut root, &variables);
        let constraints = vec![Vec::new(); variables.len()];

        Ok(Pattern {
            root,
            variables,
            constraints,
        })
    }

    /// Attach a side constraint: a boolean expression over the pattern's
    /// variables, checked the moment the last variable it mentions is bound.
    pub fn with_constraint(
        mut self,
        mut constraint: Node,
    ) -> Result<Self, PatternError> {
        let mut trigger = None;

        for variable in constraint.variables() {
            match self.index_of(&variable.name) {
                Some(index) => {
                    trigger = Some(trigger.map_or(index, |t: usize| t.max(index)))
                },
                None => {
                    return Err(PatternError::UnknownVariableInConstraint {
                        name: variable.name.clone(),
                    })
                },
            }
        }

        let trigger = trigger.ok_or(PatternError::ConstraintWithoutVariables)?;
        if let Some(name) = misplaced_list_variable(&constraint, false) {
            return Err(PatternError::MisplacedListVariable { name });
        }
        assign_indices(&mut constraint, &self.variables);
        self.constraints[trigger].push(constraint);
        Ok(self)
    }

    pub fn root(&self) -> &Node { &self.root }

    pub fn variables(&self) -> &[PatternVariable] { &self.variables }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    pub(crate) fn constraints_for(&self, index: usize) -> &[Node] {
        &self.constraints[index]
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.iter().map(Vec::len).sum()
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

fn index_variables(root: &Node) -> Result<Vec<PatternVariable>, PatternError> {
    let mut variables: Vec<PatternVariable> = Vec::new();

    for occurrence in all_variable_occurrences(root) {
        match variables.iter().find(|v| v.name == occurrence.name) {
            Some(existing) => {
                if existing.list != occurrence.list {
                    return Err(PatternError::InconsistentVariable {
                        name: occurrence.name.clone(),
                    });
                }
            },
            None => variables.push(PatternVariable {
                name: occurrence.name.clone(),
                list: occurrence.list,
            }),
        }
    }

    Ok(variables)
}

fn all_variable_occurrences(root: &Node) -> Vec<&Variable> {
    fn walk<'a>(node: &'a Node, out: &mut Vec<&'a Variable>) {
        match node {
            Node::Variable(v) => out.push(v),
            Node::Operator { children, .. } => {
                for child in children {
                    walk(child, out);
                }
            },
            Node::Constant(_) => {},
        }
    }

    let mut out = Vec::new();
    walk(root, &mut out);
    out
}

/// The first list-variable sitting where a run of nodes could never be
/// substituted, if any. Runs only fit child slots whose parent's arity can
/// grow, so anything else in a template or constraint is rejected up front.
pub(crate) fn misplaced_list_variable(
    node: &Node,
    run_allowed: bool,
) -> Option<SmolStr> {
    match node {
        Node::Variable(v) if v.list && !run_allowed => Some(v.name.clone()),
        Node::Operator { op, children } => {
            let run_allowed = op.arity == Arity::Dynamic;
            children
                .iter()
                .find_map(|child| misplaced_list_variable(child, run_allowed))
        },
        _ => None,
    }
}

pub(crate) fn assign_indices(node: &mut Node, variables: &[PatternVariable]) {
    match node {
        Node::Variable(v) => {
            v.index = variables.iter().position(|pv| pv.name == v.name);
        },
        Node::Operator { children, .. } => {
            for child in children {
                assign_indices(child, variables);
            }
        },
        Node::Constant(_) => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::ops::Builtins;
    use crate::parser;

    fn parse(src: &str) -> Node {
        parser::parse(&Catalog::standard(), src, &Builtins::default()).unwrap()
    }

    #[test]
    fn variables_are_indexed_in_preorder() {
        let pattern = Pattern::new(parse("sum([xs], y, [xs], z)")).unwrap();

        let got: Vec<_> = pattern
            .variables()
            .iter()
            .map(|v| (v.name.as_str().to_string(), v.list))
            .collect();

        assert_eq!(
            got,
            vec![
                ("xs".to_string(), true),
                ("y".to_string(), false),
                ("z".to_string(), false)
            ]
        );
        assert_eq!(pattern.index_of("z"), Some(2));
        assert_eq!(pattern.index_of("missing"), None);
    }

    #[test]
    fn occurrences_carry_their_index() {
        let pattern = Pattern::new(parse("x + y*x")).unwrap();

        let mut seen = Vec::new();
        collect_indices(pattern.root(), &mut seen);

        assert_eq!(seen, vec![Some(0), Some(1), Some(0)]);
    }

    fn collect_indices(node: &Node, out: &mut Vec<Option<usize>>) {
        match node {
            Node::Variable(v) => out.push(v.index),
            Node::Operator { children, .. } => {
                for child in children {
                    collect_indices(child, out);
                }
            },
            _ => {},
        }
    }

    #[test]
    fn mixed_plain_and_list_use_is_rejected() {
        let got = Pattern::new(parse("sum(x, [x])")).unwrap_err();

        assert_eq!(
            got,
            PatternError::InconsistentVariable { name: "x".into() }
        );
    }

    #[test]
    fn constraints_attach_to_their_last_variable() {
        let pattern = Pattern::new(parse("x + y"))
            .unwrap()
            .with_constraint(parse("x > 0"))
            .unwrap()
            .with_constraint(parse("y > x"))
            .unwrap();

        assert_eq!(pattern.constraints_for(0).len(), 1);
        assert_eq!(pattern.constraints_for(1).len(), 1);
        assert_eq!(pattern.constraint_count(), 2);
    }

    #[test]
    fn constraints_on_unknown_variables_are_rejected() {
        let got = Pattern::new(parse("x + 1"))
            .unwrap()
            .with_constraint(parse("z > 0"))
            .unwrap_err();

        assert_eq!(
            got,
            PatternError::UnknownVariableInConstraint { name: "z".into() }
        );
    }

    #[test]
    fn constraint_list_variables_need_a_variadic_slot() {
        let got = Pattern::new(parse("sum([xs], 0)"))
            .unwrap()
            .with_constraint(parse("[xs] + 1"))
            .unwrap_err();

        assert_eq!(
            got,
            PatternError::MisplacedListVariable { name: "xs".into() }
        );

        let fine = Pattern::new(parse("sum([xs], 0)"))
            .unwrap()
            .with_constraint(parse("sum([xs]) > 0"));
        assert!(fine.is_ok());
    }

    #[test]
    fn variable_free_constraints_are_rejected() {
        let got = Pattern::new(parse("x + 1"))
            .unwrap()
            .with_constraint(parse("1 > 0"))
            .unwrap_err();

        assert_eq!(got, PatternError::ConstraintWithoutVariables);
    }

    #[test]
    fn patterns_without_variables_are_fine() {
        let pattern = Pattern::new(parse("1 + 2")).unwrap();
        assert!(pattern.variables().is_empty());
    }
}
