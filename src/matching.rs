//! Matching patterns against expression trees.
//!
//! The tricky case is a dynamic-arity node: a pattern with `k` children, some
//! of them list-variables, against a node with `n` children. Enumerating
//! every partition of the `n` children over the list-variables is exponential,
//! so [`match_children`] builds a table of partial matchings keyed by
//! (pattern children consumed, tree children consumed) and expands each cell
//! exactly once, reusing its results for every continuation.

use crate::pattern::Pattern;
use crate::tree::{Node, NodePath};
use euclid::approxeq::ApproxEq;
use std::slice;

/// A run of zero or more sibling nodes, borrowed from the tree under match.
pub type NodeList<'t> = &'t [Node];

/// A binding of pattern variable indices to runs of borrowed tree nodes.
///
/// Plain variables always bind a run of length one; list-variables may bind
/// any length, including zero. A matching borrows from the matched tree and
/// is meant to be consumed by [`substitute`] before the tree changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Matching<'t> {
    bindings: Vec<Option<NodeList<'t>>>,
}

impl<'t> Matching<'t> {
    fn new(variable_count: usize) -> Self {
        Matching {
            bindings: vec![None; variable_count],
        }
    }

    /// The run bound to the variable with this index, if any.
    pub fn binding(&self, index: usize) -> Option<NodeList<'t>> {
        self.bindings.get(index).copied().flatten()
    }

    /// Look a binding up by variable name instead of index.
    pub fn binding_of(
        &self,
        pattern: &Pattern,
        name: &str,
    ) -> Option<NodeList<'t>> {
        pattern.index_of(name).and_then(|index| self.binding(index))
    }

    pub fn is_complete(&self) -> bool {
        self.bindings.iter().all(Option::is_some)
    }

    /// Record a binding, or check consistency if the variable is already
    /// bound. A first binding triggers every constraint registered for the
    /// variable's index; `false` means this branch of the search is dead.
    fn bind(
        &mut self,
        pattern: &Pattern,
        index: usize,
        run: NodeList<'t>,
        checker: &dyn ConstraintChecker,
    ) -> bool {
        match self.bindings[index] {
            Some(existing) => same_run(existing, run),
            None => {
                self.bindings[index] = Some(run);
                pattern
                    .constraints_for(index)
                    .iter()
                    .all(|constraint| checker.satisfied(constraint, self))
            },
        }
    }
}

fn same_run(left: &[Node], right: &[Node]) -> bool {
    left.len() == right.len()
        && left.iter().zip(right).all(|(l, r)| l.structurally_equal(r))
}

/// Decides whether a pattern's side constraints hold under a (possibly still
/// partial) matching. The engine guarantees that every variable a constraint
/// mentions is bound by the time the constraint is handed over.
pub trait ConstraintChecker {
    fn satisfied(&self, constraint: &Node, matching: &Matching<'_>) -> bool;
}

/// Accepts every constraint. The right checker for constraint-free patterns.
#[derive(Debug, Default, Copy, Clone)]
pub struct Unconstrained;

impl ConstraintChecker for Unconstrained {
    fn satisfied(&self, _: &Node, _: &Matching<'_>) -> bool { true }
}

/// Match a pattern against the root of a tree, returning the first
/// consistent matching if there is one.
pub fn match_at_root<'t>(
    pattern: &Pattern,
    tree: &'t Node,
    checker: &dyn ConstraintChecker,
) -> Option<Matching<'t>> {
    find_all_matchings(pattern, tree, checker).into_iter().next()
}

/// Every consistent matching of the pattern against the root of the tree.
pub fn find_all_matchings<'t>(
    pattern: &Pattern,
    tree: &'t Node,
    checker: &dyn ConstraintChecker,
) -> Vec<Matching<'t>> {
    let seed = Matching::new(pattern.variables().len());
    match_node(pattern, pattern.root(), tree, vec![seed], checker)
}

/// Pre-order search for the first place the pattern matches, anywhere in the
/// tree. The returned path addresses the matched slot.
pub fn find_matching<'t>(
    pattern: &Pattern,
    tree: &'t Node,
    checker: &dyn ConstraintChecker,
) -> Option<(NodePath, Matching<'t>)> {
    fn walk<'t>(
        pattern: &Pattern,
        node: &'t Node,
        path: NodePath,
        checker: &dyn ConstraintChecker,
    ) -> Option<(NodePath, Matching<'t>)> {
        if let Some(matching) = match_at_root(pattern, node, checker) {
            return Some((path, matching));
        }

        if let Node::Operator { children, .. } = node {
            for (index, child) in children.iter().enumerate() {
                let found = walk(pattern, child, path.child(index), checker);
                if found.is_some() {
                    return found;
                }
            }
        }

        None
    }

    walk(pattern, tree, NodePath::root(), checker)
}

/// Extend each seed matching by matching one pattern node against one tree
/// node, returning the surviving (possibly branched) matchings.
fn match_node<'t>(
    pattern: &Pattern,
    pat: &Node,
    target: &'t Node,
    seeds: Vec<Matching<'t>>,
    checker: &dyn ConstraintChecker,
) -> Vec<Matching<'t>> {
    if seeds.is_empty() {
        return seeds;
    }

    match pat {
        Node::Constant(expected) => match target {
            Node::Constant(actual) if expected.approx_eq(actual) => seeds,
            _ => Vec::new(),
        },
        Node::Variable(v) => match v.index {
            Some(index) => {
                let run = slice::from_ref(target);
                seeds
                    .into_iter()
                    .filter_map(|mut matching| {
                        if matching.bind(pattern, index, run, checker) {
                            Some(matching)
                        } else {
                            None
                        }
                    })
                    .collect()
            },
            // an unindexed variable is a literal leaf, not a pattern variable
            None => {
                if pat.structurally_equal(target) {
                    seeds
                } else {
                    Vec::new()
                }
            },
        },
        Node::Operator {
            op: pat_op,
            children: pat_children,
        } => match target {
            Node::Operator {
                op: target_op,
                children: target_children,
            } if pat_op.id == target_op.id => match_children(
                pattern,
                pat_children,
                target_children,
                seeds,
                checker,
            ),
            _ => Vec::new(),
        },
    }
}

/// Match an ordered list of pattern children against an ordered list of tree
/// children, where list-variables may absorb any contiguous run.
///
/// `table[d][s]` holds the partial matchings that consumed the first `d`
/// pattern children against the first `s` tree children. Cells are expanded
/// in increasing `d` and each exactly once, so a shared prefix is matched a
/// single time no matter how many run lengths branch off it. Only the
/// `table[k][n]` cell, with both lists fully consumed, yields output.
fn match_children<'t>(
    pattern: &Pattern,
    pat_children: &[Node],
    target_children: &'t [Node],
    seeds: Vec<Matching<'t>>,
    checker: &dyn ConstraintChecker,
) -> Vec<Matching<'t>> {
    let k = pat_children.len();
    let n = target_children.len();

    let mut table: Vec<Vec<Vec<Matching<'t>>>> =
        vec![vec![Vec::new(); n + 1]; k + 1];
    table[0][0] = seeds;

    for d in 0..k {
        let pat_child = &pat_children[d];

        for s in 0..=n {
            let partials = std::mem::take(&mut table[d][s]);
            if partials.is_empty() {
                continue;
            }

            match list_variable_index(pat_child) {
                Some(index) => {
                    // the last pattern child must account for the whole
                    // remainder, so only one run length can succeed
                    let lengths = if d == k - 1 {
                        (n - s)..=(n - s)
                    } else {
                        0..=(n - s)
                    };

                    for length in lengths {
                        let run = &target_children[s..s + length];
                        let extended =
                            partials.iter().cloned().filter_map(|mut m| {
                                if m.bind(pattern, index, run, checker) {
                                    Some(m)
                                } else {
                                    None
                                }
                            });
                        table[d + 1][s + length].extend(extended);
                    }
                },
                None => {
                    if s < n {
                        let extended = match_node(
                            pattern,
                            pat_child,
                            &target_children[s],
                            partials,
                            checker,
                        );
                        table[d + 1][s + 1].extend(extended);
                    }
                },
            }
        }
    }

    std::mem::take(&mut table[k][n])
}

fn list_variable_index(node: &Node) -> Option<usize> {
    match node {
        Node::Variable(v) if v.list => v.index,
        _ => None,
    }
}

/// Deep-copy a template and substitute every bound variable occurrence in
/// the copy. Plain occurrences are replaced node-for-node; list-variable
/// occurrences are spliced into their parent's child list, which may change
/// its arity. Unbound occurrences are left as they are.
pub fn substitute(template: &Node, matching: &Matching<'_>) -> Node {
    let mut copy = template.clone();
    apply_bindings(&mut copy, matching);
    copy
}

fn apply_bindings(node: &mut Node, matching: &Matching<'_>) {
    if let Some(run) = direct_binding(node, matching) {
        // a run of any other length only fits where a parent's child list
        // can grow; rule construction rejects templates that could put one
        // here, so a direct occurrence always carries a single node
        debug_assert_eq!(run.len(), 1, "A run-valued occurrence in a scalar slot");
        if let [bound] = run {
            node.replace(bound.clone());
        }
        return;
    }

    // children are visited right-to-left so a splice never shifts the index
    // of a child still waiting its turn
    for index in (0..node.child_count()).rev() {
        let run = match node.child(index) {
            Some(Node::Variable(v)) if v.list => v
                .index
                .and_then(|i| matching.binding(i))
                .map(|run| run.to_vec()),
            _ => None,
        };

        match run {
            Some(run) => node.splice_child(index, run),
            None => {
                if let Some(child) = node.child_mut(index) {
                    apply_bindings(child, matching);
                }
            },
        }
    }
}

fn direct_binding<'t>(
    node: &Node,
    matching: &Matching<'t>,
) -> Option<NodeList<'t>> {
    match node {
        Node::Variable(v) => v.index.and_then(|i| matching.binding(i)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::ops::{Builtins, NumericChecker};
    use crate::parser;
    use crate::pattern::assign_indices;

    fn parse(src: &str) -> Node {
        parser::parse(&Catalog::standard(), src, &Builtins::default()).unwrap()
    }

    fn pattern(src: &str) -> Pattern { Pattern::new(parse(src)).unwrap() }

    fn bound_text(
        matching: &Matching<'_>,
        pattern: &Pattern,
        name: &str,
    ) -> Vec<String> {
        matching
            .binding_of(pattern, name)
            .unwrap()
            .iter()
            .map(|node| node.to_string())
            .collect()
    }

    #[test]
    fn a_lone_variable_binds_the_whole_tree() {
        let pattern = pattern("x");
        let target = parse("1 + sin(y)");

        let matching = match_at_root(&pattern, &target, &Unconstrained).unwrap();

        assert!(matching.is_complete());
        assert_eq!(bound_text(&matching, &pattern, "x"), vec!["1+sin(y)"]);
    }

    #[test]
    fn constants_and_operators_must_agree() {
        let call = pattern("sin(x)");

        assert!(match_at_root(&call, &parse("sin(2)"), &Unconstrained).is_some());
        assert!(match_at_root(&call, &parse("cos(2)"), &Unconstrained).is_none());
        assert!(match_at_root(&call, &parse("2"), &Unconstrained).is_none());

        let addition = pattern("x + 0");
        assert!(match_at_root(&addition, &parse("y + 0"), &Unconstrained).is_some());
        assert!(match_at_root(&addition, &parse("y + 1"), &Unconstrained).is_none());
    }

    #[test]
    fn repeated_plain_variables_must_bind_equal_subtrees() {
        let pattern = pattern("x + x");
        let target = parse("sin(a) + sin(a)");

        let matching = match_at_root(&pattern, &target, &Unconstrained);
        assert!(matching.is_some());

        assert!(match_at_root(&pattern, &parse("2 + 3"), &Unconstrained).is_none());
    }

    #[test]
    fn list_variables_absorb_sibling_runs() {
        let pattern = pattern("sum([xs], 0, [ys])");
        let target = parse("sum(a, b, 0, c)");

        let matching = match_at_root(&pattern, &target, &Unconstrained).unwrap();

        assert_eq!(bound_text(&matching, &pattern, "xs"), vec!["a", "b"]);
        assert_eq!(bound_text(&matching, &pattern, "ys"), vec!["c"]);
    }

    #[test]
    fn the_literal_child_must_actually_be_present() {
        let pattern = pattern("sum([xs], 0, [ys])");

        assert!(
            match_at_root(&pattern, &parse("sum(a, b, c)"), &Unconstrained)
                .is_none()
        );
    }

    #[test]
    fn list_variables_may_bind_empty_runs() {
        let pattern = pattern("sum([xs], 0, [ys])");
        let target = parse("sum(0)");

        let matching = match_at_root(&pattern, &target, &Unconstrained).unwrap();

        assert_eq!(matching.binding_of(&pattern, "xs").unwrap().len(), 0);
        assert_eq!(matching.binding_of(&pattern, "ys").unwrap().len(), 0);
    }

    #[test]
    fn every_split_is_enumerated() {
        let pattern = pattern("sum([xs], 0, [ys])");
        let target = parse("sum(0, 0)");

        let all = find_all_matchings(&pattern, &target, &Unconstrained);

        // either zero can play the literal role
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn repeated_list_variables_must_bind_equal_runs() {
        let pattern = pattern("sum([xs], [xs])");
        let target = parse("sum(a, b, a, b)");

        let matching =
            match_at_root(&pattern, &target, &Unconstrained).unwrap();
        assert_eq!(bound_text(&matching, &pattern, "xs"), vec!["a", "b"]);

        assert!(
            match_at_root(&pattern, &parse("sum(a, b, c)"), &Unconstrained)
                .is_none()
        );
        assert!(
            match_at_root(&pattern, &parse("sum(a, b, b, a)"), &Unconstrained)
                .is_none()
        );
    }

    #[test]
    fn fixed_arity_nodes_match_child_by_child() {
        let pattern = pattern("x ^ y");
        let target = parse("2 ^ 3");

        let matching = match_at_root(&pattern, &target, &Unconstrained).unwrap();

        assert_eq!(bound_text(&matching, &pattern, "x"), vec!["2"]);
        assert_eq!(bound_text(&matching, &pattern, "y"), vec!["3"]);
    }

    #[test]
    fn find_matching_searches_in_preorder() {
        let pattern = pattern("x + 0");
        let target = parse("1 * (y + 0)");

        let (path, matching) =
            find_matching(&pattern, &target, &Unconstrained).unwrap();

        assert_eq!(path, NodePath::root().child(1));
        assert_eq!(bound_text(&matching, &pattern, "x"), vec!["y"]);
        assert!(find_matching(&pattern, &parse("1 * 2"), &Unconstrained).is_none());
    }

    #[test]
    fn constraints_discard_branches_without_killing_siblings() {
        let ctx = Builtins::default();
        let checker = NumericChecker::new(&ctx);

        // only a strictly positive x may play the pivot
        let pattern = Pattern::new(parse("sum([xs], x, [ys])"))
            .unwrap()
            .with_constraint(parse("x > 0"))
            .unwrap();
        let target = parse("sum(0, 7)");

        let all = find_all_matchings(&pattern, &target, &checker);

        assert_eq!(all.len(), 1);
        assert_eq!(bound_text(&all[0], &pattern, "x"), vec!["7"]);
    }

    #[test]
    fn failing_constraints_fail_the_whole_match() {
        let ctx = Builtins::default();
        let checker = NumericChecker::new(&ctx);

        let pattern = Pattern::new(parse("x / y"))
            .unwrap()
            .with_constraint(parse("y"))
            .unwrap();

        assert!(match_at_root(&pattern, &parse("1 / 2"), &checker).is_some());
        assert!(match_at_root(&pattern, &parse("1 / 0"), &checker).is_none());
    }

    #[test]
    fn substitution_replaces_plain_and_list_occurrences() {
        let pattern = pattern("sum([xs], 0, [ys])");
        let target = parse("sum(a, b, 0, c)");
        let matching = match_at_root(&pattern, &target, &Unconstrained).unwrap();

        let mut template = parse("sum([ys], [xs])");
        assign_indices(&mut template, pattern.variables());

        let got = substitute(&template, &matching);

        assert!(got.structurally_equal(&parse("sum(c, a, b)")));
    }

    #[test]
    fn substitution_can_change_arity() {
        let pattern = pattern("sum(x, [rest])");
        let target = parse("sum(a, b, c, d)");
        let matching = match_at_root(&pattern, &target, &Unconstrained).unwrap();

        let mut template = parse("sum([rest]) + x");
        assign_indices(&mut template, pattern.variables());

        let got = substitute(&template, &matching);

        assert!(got.structurally_equal(&parse("sum(b, c, d) + a")));
        // the matched tree itself was never touched
        assert!(target.structurally_equal(&parse("sum(a, b, c, d)")));
    }

    #[test]
    fn unbound_variables_survive_substitution() {
        let pattern = pattern("x + y");
        let target = parse("1 + 2");
        let matching =
            match_at_root(&pattern, &target, &Unconstrained).unwrap();

        let template = parse("x * z");
        // x has no index here, z is not a pattern variable at all
        let got = substitute(&template, &matching);

        assert!(got.structurally_equal(&parse("x * z")));
    }
}
