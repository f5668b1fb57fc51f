//! The operator catalog: every operator the parser can recognise, queryable
//! by name and placement or (for functions) by name and arity.

use arrayvec::ArrayVec;
use smol_str::SmolStr;
use std::fmt::{self, Display, Formatter};

/// Hard bound on the number of operators a [`Catalog`] can hold.
///
/// This is a configuration constant, not a language limitation; interactive
/// sessions define a handful of operators, not hundreds.
pub const MAX_OPERATORS: usize = 64;

/// A stable handle to an operator within its [`Catalog`].
///
/// Operator identity is compared through this id, so two operators that
/// happen to share a name (e.g. infix `-` and prefix `-`) are still distinct.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OperatorId(pub(crate) usize);

/// How many operands an operator takes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    /// Counted at parse time; a dynamic-arity function accepts any number of
    /// arguments and also acts as the catch-all overload.
    Dynamic,
}

/// Where an operator's token appears relative to its operands.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Placement {
    Prefix,
    Infix,
    Postfix,
    Function,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// A single operator definition.
///
/// Operators are cheap to clone; expression tree nodes hold their own copy so
/// that printing, matching and evaluation never need a catalog lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub name: SmolStr,
    pub arity: Arity,
    pub precedence: u8,
    pub associativity: Associativity,
    pub placement: Placement,
    pub id: OperatorId,
}

impl Operator {
    pub fn infix(
        name: &str,
        precedence: u8,
        associativity: Associativity,
    ) -> Self {
        Operator {
            name: name.into(),
            arity: Arity::Fixed(2),
            precedence,
            associativity,
            placement: Placement::Infix,
            id: OperatorId(usize::max_value()),
        }
    }

    pub fn prefix(name: &str, precedence: u8) -> Self {
        Operator {
            name: name.into(),
            arity: Arity::Fixed(1),
            precedence,
            associativity: Associativity::Right,
            placement: Placement::Prefix,
            id: OperatorId(usize::max_value()),
        }
    }

    pub fn postfix(name: &str, precedence: u8) -> Self {
        Operator {
            name: name.into(),
            arity: Arity::Fixed(1),
            precedence,
            associativity: Associativity::Left,
            placement: Placement::Postfix,
            id: OperatorId(usize::max_value()),
        }
    }

    pub fn function(name: &str, arity: Arity) -> Self {
        Operator {
            name: name.into(),
            arity,
            precedence: 0,
            associativity: Associativity::Left,
            placement: Placement::Function,
            id: OperatorId(usize::max_value()),
        }
    }
}

/// Why an operator couldn't be added to (or configured in) a [`Catalog`].
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// An operator with the same name and placement (or, for functions, the
    /// same name and arity) already exists.
    Duplicate { name: SmolStr },
    /// Another infix operator already sits at this precedence level with a
    /// different associativity; the tie would be ambiguous to resolve.
    PrecedenceClash { name: SmolStr, precedence: u8 },
    /// The catalog already holds [`MAX_OPERATORS`] operators.
    CapacityExceeded,
    /// The glue operator must be infix.
    GlueNotInfix,
    /// No operator with that id is present.
    UnknownOperator,
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Duplicate { name } => {
                write!(f, "The operator \"{}\" is already defined", name)
            },
            CatalogError::PrecedenceClash { name, precedence } => write!(
                f,
                "\"{}\" clashes with another infix operator of precedence {} \
                 and different associativity",
                name, precedence
            ),
            CatalogError::CapacityExceeded => {
                write!(f, "The catalog can hold at most {} operators", MAX_OPERATORS)
            },
            CatalogError::GlueNotInfix => {
                write!(f, "Only an infix operator can act as glue")
            },
            CatalogError::UnknownOperator => {
                write!(f, "No such operator in the catalog")
            },
        }
    }
}

impl std::error::Error for CatalogError {}

/// A mutable collection of operator definitions.
///
/// The catalog owns its storage and nothing else; it is passed by reference
/// into the parser, and there is no global operator state anywhere in the
/// crate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    slots: ArrayVec<[Option<Operator>; MAX_OPERATORS]>,
    glue: Option<OperatorId>,
}

impl Catalog {
    pub fn new() -> Self { Catalog::default() }

    /// A catalog pre-loaded with ordinary arithmetic: relations at precedence
    /// 0, `+ -` at 1, `* /` at 2 (with `*` configured as glue), prefix `-` at
    /// 3, right-associative `^` at 4, postfix `!` at 5, and a few unary
    /// functions plus the dynamic-arity `sum`.
    pub fn standard() -> Self {
        let mut catalog = Catalog::new();

        let ops = vec![
            Operator::infix("=", 0, Associativity::Left),
            Operator::infix("<=", 0, Associativity::Left),
            Operator::infix(">=", 0, Associativity::Left),
            Operator::infix("<", 0, Associativity::Left),
            Operator::infix(">", 0, Associativity::Left),
            Operator::infix("+", 1, Associativity::Left),
            Operator::infix("-", 1, Associativity::Left),
            Operator::infix("/", 2, Associativity::Left),
            Operator::prefix("-", 3),
            Operator::infix("^", 4, Associativity::Right),
            Operator::postfix("!", 5),
            Operator::function("sin", Arity::Fixed(1)),
            Operator::function("cos", Arity::Fixed(1)),
            Operator::function("tan", Arity::Fixed(1)),
            Operator::function("sqrt", Arity::Fixed(1)),
            Operator::function("sum", Arity::Dynamic),
        ];

        for op in ops {
            catalog.add(op).expect("The standard catalog is consistent");
        }

        let times = catalog
            .add(Operator::infix("*", 2, Associativity::Left))
            .expect("The standard catalog is consistent");
        catalog
            .set_glue(times)
            .expect("\"*\" was just added as infix");

        catalog
    }

    /// Add an operator, returning its stable id.
    pub fn add(&mut self, operator: Operator) -> Result<OperatorId, CatalogError> {
        if self.is_duplicate(&operator) {
            return Err(CatalogError::Duplicate {
                name: operator.name,
            });
        }

        if operator.placement == Placement::Infix {
            let clash = self.operators().any(|existing| {
                existing.placement == Placement::Infix
                    && existing.precedence == operator.precedence
                    && existing.associativity != operator.associativity
            });
            if clash {
                return Err(CatalogError::PrecedenceClash {
                    name: operator.name,
                    precedence: operator.precedence,
                });
            }
        }

        // removed operators leave a hole we can reuse; ids stay stable
        // because a slot is only ever reused after its operator is gone
        let slot = self.slots.iter().position(Option::is_none);

        let index = match slot {
            Some(index) => index,
            None => {
                if self.slots.is_full() {
                    return Err(CatalogError::CapacityExceeded);
                }
                self.slots.push(None);
                self.slots.len() - 1
            },
        };

        let id = OperatorId(index);
        let mut operator = operator;
        operator.id = id;
        self.slots[index] = Some(operator);

        Ok(id)
    }

    /// Remove the operator with this name and placement, if present.
    ///
    /// For functions this removes *all* overloads sharing the name.
    pub fn remove(&mut self, name: &str, placement: Placement) -> bool {
        let glue = self.glue;
        let mut removed = false;
        let mut glue_removed = false;

        for slot in self.slots.iter_mut() {
            if let Some(op) = slot {
                if op.name == name && op.placement == placement {
                    glue_removed |= glue == Some(op.id);
                    *slot = None;
                    removed = true;
                }
            }
        }

        if glue_removed {
            self.glue = None;
        }

        removed
    }

    pub fn lookup(&self, name: &str, placement: Placement) -> Option<&Operator> {
        self.operators()
            .find(|op| op.name == name && op.placement == placement)
    }

    pub fn get(&self, id: OperatorId) -> Option<&Operator> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Look up a function by name and argument count.
    ///
    /// An exact-arity overload wins; otherwise the dynamic-arity overload (if
    /// any) acts as the catch-all.
    pub fn function(&self, name: &str, arity: usize) -> Option<&Operator> {
        let exact = self.operators().find(|op| {
            op.placement == Placement::Function
                && op.name == name
                && op.arity == Arity::Fixed(arity)
        });

        exact.or_else(|| {
            self.operators().find(|op| {
                op.placement == Placement::Function
                    && op.name == name
                    && op.arity == Arity::Dynamic
            })
        })
    }

    /// Configure the operator the parser inserts between two adjacent
    /// subexpressions (juxtaposition, typically multiplication).
    pub fn set_glue(&mut self, id: OperatorId) -> Result<(), CatalogError> {
        match self.get(id) {
            Some(op) if op.placement == Placement::Infix => {
                self.glue = Some(id);
                Ok(())
            },
            Some(_) => Err(CatalogError::GlueNotInfix),
            None => Err(CatalogError::UnknownOperator),
        }
    }

    pub fn clear_glue(&mut self) { self.glue = None; }

    pub fn glue(&self) -> Option<&Operator> {
        self.glue.and_then(|id| self.get(id))
    }

    pub fn operators(&self) -> impl Iterator<Item = &Operator> + '_ {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Operator names that don't look like identifiers, longest first, for
    /// the tokenizer's longest-match rule.
    pub(crate) fn symbol_names(&self) -> Vec<SmolStr> {
        self.names_where(|name| {
            !name.chars().next().map(is_identifier_start).unwrap_or(true)
        })
    }

    /// Operator names that do look like identifiers (`sin`, `mod`, ...),
    /// longest first; the tokenizer splits these out of longer words so
    /// `sin2` reads as `sin` glued to `2`.
    pub(crate) fn keyword_names(&self) -> Vec<SmolStr> {
        self.names_where(|name| {
            name.chars().next().map(is_identifier_start).unwrap_or(false)
        })
    }

    fn names_where<P>(&self, predicate: P) -> Vec<SmolStr>
    where
        P: Fn(&SmolStr) -> bool,
    {
        let mut names: Vec<SmolStr> = self
            .operators()
            .map(|op| op.name.clone())
            .filter(predicate)
            .collect();

        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        names.dedup();
        names
    }

    fn is_duplicate(&self, candidate: &Operator) -> bool {
        self.operators().any(|existing| {
            existing.name == candidate.name
                && existing.placement == candidate.placement
                && (existing.placement != Placement::Function
                    || existing.arity == candidate.arity)
        })
    }
}

pub(crate) fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}
