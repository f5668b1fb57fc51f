//! The expression tree: a closed sum type over operator applications,
//! numeric constants and variables.

use crate::catalog::{Operator, Placement};
use euclid::approxeq::ApproxEq;
use smol_str::SmolStr;
use std::fmt::{self, Display, Formatter};

/// One node of an expression tree.
///
/// Trees are acyclic and singly owned: a node's children belong to it alone,
/// and the only sanctioned mutations are [`Node::replace`] and
/// [`Node::splice_child`]. Everything else (copying, substitution) builds new
/// trees.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// An operator applied to an ordered list of operands. The child count
    /// matches the operator's arity (or whatever count the parser recorded
    /// for a dynamic-arity operator).
    Operator { op: Operator, children: Vec<Node> },
    Constant(f64),
    Variable(Variable),
}

/// A free-form identifier leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: SmolStr,
    /// Assigned when the variable is indexed as part of a
    /// [`Pattern`][crate::Pattern]; `None` in ordinary parsed expressions.
    pub index: Option<usize>,
    /// List-variables (written `[name]`) may bind to zero or more sibling
    /// nodes during matching instead of exactly one.
    pub list: bool,
}

impl Node {
    pub fn constant(value: f64) -> Self { Node::Constant(value) }

    pub fn variable(name: &str) -> Self {
        Node::Variable(Variable {
            name: name.into(),
            index: None,
            list: false,
        })
    }

    pub fn list_variable(name: &str) -> Self {
        Node::Variable(Variable {
            name: name.into(),
            index: None,
            list: true,
        })
    }

    pub fn operator(op: Operator, children: Vec<Node>) -> Self {
        Node::Operator { op, children }
    }

    /// Structural equality: operator identity plus recursive child equality,
    /// approximate equality on constants, name equality on variables.
    ///
    /// This deliberately ignores variable indices, which are a lookup aid and
    /// not part of the tree's meaning.
    pub fn structurally_equal(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Constant(left), Node::Constant(right)) => {
                left.approx_eq(right)
            },
            (Node::Variable(left), Node::Variable(right)) => {
                left.name == right.name && left.list == right.list
            },
            (
                Node::Operator {
                    op: left_op,
                    children: left_children,
                },
                Node::Operator {
                    op: right_op,
                    children: right_children,
                },
            ) => {
                left_op.id == right_op.id
                    && left_children.len() == right_children.len()
                    && left_children
                        .iter()
                        .zip(right_children)
                        .all(|(l, r)| l.structurally_equal(r))
            },
            _ => false,
        }
    }

    /// Install `new_node` in this slot, returning the subtree that used to
    /// live here. The sole mutation primitive for whole-node edits.
    pub fn replace(&mut self, new_node: Node) -> Node {
        std::mem::replace(self, new_node)
    }

    /// Splice zero or more replacement nodes into a single child slot,
    /// resizing the child list. Required because substituting a bound
    /// list-variable can change a node's arity.
    ///
    /// Only meaningful on operator nodes; `index` must be in bounds.
    pub fn splice_child(&mut self, index: usize, replacements: Vec<Node>) {
        match self {
            Node::Operator { children, .. } => {
                children.splice(index..=index, replacements);
            },
            _ => panic!("Leaf nodes have no children to splice"),
        }
    }

    pub fn child_count(&self) -> usize {
        match self {
            Node::Operator { children, .. } => children.len(),
            _ => 0,
        }
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        match self {
            Node::Operator { children, .. } => children.get(index),
            _ => None,
        }
    }

    pub fn child_mut(&mut self, index: usize) -> Option<&mut Node> {
        match self {
            Node::Operator { children, .. } => children.get_mut(index),
            _ => None,
        }
    }

    /// The distinct variables in this tree, in pre-order of first occurrence.
    ///
    /// The resulting positions are stable, which is what makes them usable as
    /// pattern variable indices.
    pub fn variables(&self) -> Vec<&Variable> {
        let mut found = Vec::new();
        collect_variables(self, &mut found);
        found
    }

    /// How many nodes in this tree satisfy the predicate.
    pub fn count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Node) -> bool,
    {
        fn walk<P: Fn(&Node) -> bool>(node: &Node, predicate: &P) -> usize {
            let mut total = if predicate(node) { 1 } else { 0 };
            if let Node::Operator { children, .. } = node {
                for child in children {
                    total += walk(child, predicate);
                }
            }
            total
        }

        walk(self, &predicate)
    }

    /// The total number of nodes in this tree.
    pub fn size(&self) -> usize { self.count(|_| true) }

    /// Pre-order search for the first node satisfying the predicate,
    /// returning the path to its slot.
    pub fn find_first<P>(&self, predicate: P) -> Option<NodePath>
    where
        P: Fn(&Node) -> bool,
    {
        fn walk<P: Fn(&Node) -> bool>(
            node: &Node,
            path: &mut Vec<usize>,
            predicate: &P,
        ) -> Option<NodePath> {
            if predicate(node) {
                return Some(NodePath(path.clone()));
            }

            if let Node::Operator { children, .. } = node {
                for (index, child) in children.iter().enumerate() {
                    path.push(index);
                    if let Some(found) = walk(child, path, predicate) {
                        return Some(found);
                    }
                    path.pop();
                }
            }

            None
        }

        walk(self, &mut Vec::new(), &predicate)
    }
}

fn collect_variables<'a>(node: &'a Node, out: &mut Vec<&'a Variable>) {
    match node {
        Node::Variable(v) => {
            if !out.iter().any(|existing| existing.name == v.name) {
                out.push(v);
            }
        },
        Node::Operator { children, .. } => {
            for child in children {
                collect_variables(child, out);
            }
        },
        Node::Constant(_) => {},
    }
}

/// A path of child indices leading from a tree's root to one of its slots.
///
/// Any owning location — the root itself or a child position — is addressed
/// uniformly this way, which is what lets [`find_matching`][crate::find_matching]
/// hand back a mutable-access point without holding a borrow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self { NodePath::default() }

    pub fn is_root(&self) -> bool { self.0.is_empty() }

    pub fn child(&self, index: usize) -> Self {
        let mut extended = self.0.clone();
        extended.push(index);
        NodePath(extended)
    }

    pub fn get<'t>(&self, root: &'t Node) -> Option<&'t Node> {
        let mut current = root;
        for &index in &self.0 {
            current = current.child(index)?;
        }
        Some(current)
    }

    pub fn get_mut<'t>(&self, root: &'t mut Node) -> Option<&'t mut Node> {
        let mut current = root;
        for &index in &self.0 {
            current = current.child_mut(index)?;
        }
        Some(current)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Node::Constant(value) => write!(f, "{}", value),
            Node::Variable(v) => {
                if v.list {
                    write!(f, "[{}]", v.name)
                } else {
                    write!(f, "{}", v.name)
                }
            },
            Node::Operator { op, children } => write_operator(op, children, f),
        }
    }
}

fn write_operator(
    op: &Operator,
    children: &[Node],
    f: &mut Formatter<'_>,
) -> fmt::Result {
    match op.placement {
        Placement::Function => {
            write!(f, "{}(", op.name)?;
            for (index, child) in children.iter().enumerate() {
                if index > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", child)?;
            }
            write!(f, ")")
        },
        Placement::Prefix => {
            write!(f, "{}", op.name)?;
            write_child(&children[0], f, needs_parens_prefix(op, &children[0]))
        },
        Placement::Postfix => {
            write_child(
                &children[0],
                f,
                needs_parens_postfix(op, &children[0]),
            )?;
            write!(f, "{}", op.name)
        },
        Placement::Infix => {
            write_child(&children[0], f, needs_parens_left(op, &children[0]))?;
            write!(f, "{}", op.name)?;
            write_child(&children[1], f, needs_parens_right(op, &children[1]))
        },
    }
}

fn write_child(child: &Node, f: &mut Formatter<'_>, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({})", child)
    } else {
        write!(f, "{}", child)
    }
}

// Parenthesization is the inverse of the parser's precedence rules: a child
// gets parentheses exactly when printing it bare would make the parser group
// it differently than the tree does.

fn needs_parens_prefix(op: &Operator, child: &Node) -> bool {
    match child {
        Node::Operator { op: inner, .. } => {
            inner.placement == Placement::Infix
                && inner.precedence <= op.precedence
        },
        _ => false,
    }
}

fn needs_parens_postfix(op: &Operator, child: &Node) -> bool {
    match child {
        Node::Operator { op: inner, .. } => match inner.placement {
            Placement::Infix | Placement::Prefix => {
                inner.precedence < op.precedence
            },
            _ => false,
        },
        _ => false,
    }
}

fn needs_parens_left(op: &Operator, child: &Node) -> bool {
    use crate::catalog::Associativity::Right;

    match child {
        Node::Operator { op: inner, .. } => match inner.placement {
            Placement::Infix => {
                inner.precedence < op.precedence
                    || (inner.precedence == op.precedence
                        && op.associativity == Right)
            },
            Placement::Prefix => inner.precedence < op.precedence,
            _ => false,
        },
        _ => false,
    }
}

fn needs_parens_right(op: &Operator, child: &Node) -> bool {
    use crate::catalog::Associativity::Left;

    match child {
        Node::Operator { op: inner, .. } => match inner.placement {
            Placement::Infix => {
                inner.precedence < op.precedence
                    || (inner.precedence == op.precedence
                        && op.associativity == Left)
            },
            // a bare prefix child would swallow whatever follows the parent
            Placement::Prefix => inner.precedence <= op.precedence,
            _ => false,
        },
        _ => false,
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
    fn display_drops_redundant_parens_only() {
        let inputs = vec![
            ("1+2", "1+2"),
            ("(1+2)+3", "1+2+3"),
            ("1+(2+3)", "1+(2+3)"),
            ("(1+2)*3", "(1+2)*3"),
            ("1+2*3", "1+2*3"),
            ("2^(3^4)", "2^3^4"),
            ("(2^3)^4", "(2^3)^4"),
            ("-(1+2)", "-(1+2)"),
            ("-x", "-x"),
            ("--x", "--x"),
            ("(1+2)!", "(1+2)!"),
            ("(-x)!", "(-x)!"),
            ("sin(x+1)", "sin(x+1)"),
            ("sum(a, b, c)", "sum(a, b, c)"),
            ("2^-3", "2^(-3)"),
            ("1 - -2", "1--2"),
            ("2 x y", "2*x*y"),
        ];

        for (src, should_be) in inputs {
            let got = parse(src).to_string();
            assert_eq!(got, should_be, "{} printed as {}", src, got);
        }
    }

    #[test]
    fn reparsing_the_display_output_gives_an_equal_tree() {
        let inputs = vec![
            "1+(2+3)",
            "(1+2)+3",
            "1*2 + 3*4/(5 - 2)*1 - 3",
            "-(2*3)",
            "2^-3",
            "sin(cos(x)) + sqrt(y)*3!",
            "sum(a, b+1, sum(c))",
            "2x + 4",
        ];

        for src in inputs {
            let tree = parse(src);
            let round_tripped = parse(&tree.to_string());
            assert!(
                tree.structurally_equal(&round_tripped),
                "{} -> {} -> {}",
                src,
                tree,
                round_tripped
            );
        }
    }

    #[test]
    fn structural_equality_ignores_variable_indices() {
        let mut indexed = Node::variable("x");
        if let Node::Variable(v) = &mut indexed {
            v.index = Some(3);
        }

        assert!(indexed.structurally_equal(&Node::variable("x")));
        assert!(!indexed.structurally_equal(&Node::variable("y")));
        assert!(!indexed.structurally_equal(&Node::list_variable("x")));
    }

    #[test]
    fn variables_are_distinct_and_in_preorder() {
        let tree = parse("x + y*(x + z)");

        let names: Vec<_> =
            tree.variables().iter().map(|v| v.name.to_string()).collect();

        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn find_first_returns_a_preorder_path() {
        let tree = parse("1 + 2*sin(x)");

        let path = tree
            .find_first(|node| matches!(node, Node::Variable(_)))
            .unwrap();

        let found = path.get(&tree).unwrap();
        assert!(found.structurally_equal(&Node::variable("x")));
        assert!(tree.find_first(|n| n.structurally_equal(&parse("7"))).is_none());
    }

    #[test]
    fn replace_swaps_exactly_one_subtree() {
        let mut tree = parse("1 + 2*x");
        let before = tree.size();

        let path = tree
            .find_first(|node| matches!(node, Node::Variable(_)))
            .unwrap();
        let slot = path.get_mut(&mut tree).unwrap();
        let old = slot.replace(parse("y + 3"));

        assert!(old.structurally_equal(&Node::variable("x")));
        assert_eq!(tree.size(), before - old.size() + 3);
        assert!(tree.structurally_equal(&parse("1 + 2*(y + 3)")));
    }

    #[test]
    fn repeated_copy_and_replace_preserves_node_counts() {
        // the allocation-count invariant: replacing a subtree frees exactly
        // the old nodes and owns exactly the new ones, so sizes always add up
        let mut tree = parse("sum(a, b, c) + 1");

        for _ in 0..10 {
            let copy = tree.clone();
            let size = tree.size();
            let path = tree.find_first(|n| matches!(n, Node::Variable(_))).unwrap();
            let slot = path.get_mut(&mut tree).unwrap();
            let old = slot.replace(copy);
            assert_eq!(tree.size(), size - old.size() + size);
        }
    }

    #[test]
    fn splice_child_changes_arity() {
        let mut tree = parse("sum(a, b, c)");

        let replacements = vec![parse("1"), parse("2"), parse("3")];
        tree.splice_child(1, replacements);
        assert_eq!(tree.child_count(), 5);
        assert!(tree.structurally_equal(&parse("sum(a, 1, 2, 3, c)")));

        tree.splice_child(0, Vec::new());
        assert_eq!(tree.child_count(), 4);
        assert!(tree.structurally_equal(&parse("sum(1, 2, 3, c)")));
    }

    #[test]
    fn node_paths_address_slots_uniformly() {
        let mut tree = parse("1 + 2*3");

        let root = NodePath::root();
        assert!(root.is_root());
        assert!(root.get(&tree).unwrap().structurally_equal(&tree.clone()));

        let two = NodePath::root().child(1).child(0);
        assert!(two.get(&tree).unwrap().structurally_equal(&parse("2")));
        assert!(NodePath::root().child(5).get(&tree).is_none());

        two.get_mut(&mut tree).unwrap().replace(parse("9"));
        assert!(tree.structurally_equal(&parse("1 + 9*3")));
    }
}
