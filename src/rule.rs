//! Rewrite rules and rulesets.
//!
//! A rule pairs a [`Pattern`] with a replacement tree; a ruleset drives a
//! list of rules over a tree until nothing applies or an iteration cap is
//! reached.

use crate::catalog::Catalog;
use crate::matching::{find_matching, substitute, ConstraintChecker};
use crate::ops::Context;
use crate::parser::{self, ParseError};
use crate::pattern::{
    assign_indices, misplaced_list_variable, Pattern, PatternError,
};
use crate::tree::Node;
use smol_str::SmolStr;
use std::fmt::{self, Display, Formatter};

/// Rulesets are user-extensible and nothing guarantees they terminate, so
/// every driver run is capped.
pub const DEFAULT_ITERATION_CAP: usize = 1_000;

/// A single rewrite: wherever the pattern matches, replace the matched
/// subtree with the replacement, bound variables substituted in.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteRule {
    pattern: Pattern,
    replacement: Node,
}

/// Why a [`RewriteRule`] couldn't be built.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleError {
    /// The replacement mentions a variable the pattern never binds.
    UnboundVariable { name: SmolStr },
    /// The replacement uses a variable as a list-variable where the pattern
    /// binds it plain, or the other way around.
    MismatchedVariableKind { name: SmolStr },
    /// The replacement puts a list-variable somewhere a run of nodes can't
    /// go: as the whole replacement, or under a fixed-arity operator.
    MisplacedListVariable { name: SmolStr },
}

impl Display for RuleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::UnboundVariable { name } => write!(
                f,
                "The replacement mentions \"{}\", which the pattern never binds",
                name
            ),
            RuleError::MismatchedVariableKind { name } => write!(
                f,
                "\"{}\" is not the same kind of variable in the pattern and the replacement",
                name
            ),
            RuleError::MisplacedListVariable { name } => write!(
                f,
                "\"[{}]\" may only appear as an argument of a variadic operator",
                name
            ),
        }
    }
}

impl std::error::Error for RuleError {}

impl RewriteRule {
    /// Pair a pattern with a replacement, checking that every variable the
    /// replacement mentions is bound by the pattern, with the same kind.
    pub fn new(pattern: Pattern, mut replacement: Node) -> Result<Self, RuleError> {
        for occurrence in replacement.variables() {
            match pattern.index_of(&occurrence.name) {
                None => {
                    return Err(RuleError::UnboundVariable {
                        name: occurrence.name.clone(),
                    })
                },
                Some(index) => {
                    if pattern.variables()[index].list != occurrence.list {
                        return Err(RuleError::MismatchedVariableKind {
                            name: occurrence.name.clone(),
                        });
                    }
                },
            }
        }

        if let Some(name) = misplaced_list_variable(&replacement, false) {
            return Err(RuleError::MisplacedListVariable { name });
        }
        assign_indices(&mut replacement, pattern.variables());

        Ok(RewriteRule {
            pattern,
            replacement,
        })
    }

    pub fn pattern(&self) -> &Pattern { &self.pattern }

    pub fn replacement(&self) -> &Node { &self.replacement }

    /// Apply the rule at the first place it matches, anywhere in the tree.
    /// Returns `false`, leaving the tree untouched, when nothing matches.
    pub fn apply(
        &self,
        tree: &mut Node,
        checker: &dyn ConstraintChecker,
    ) -> bool {
        let (path, replacement) =
            match find_matching(&self.pattern, tree, checker) {
                Some((path, matching)) => {
                    (path, substitute(&self.replacement, &matching))
                },
                None => return false,
            };

        match path.get_mut(tree) {
            Some(slot) => {
                log::trace!("{} => {}", self.pattern, replacement);
                slot.replace(replacement);
                true
            },
            None => false,
        }
    }
}

impl Display for RewriteRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.pattern, self.replacement)
    }
}

/// An ordered list of rewrite rules applied as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ruleset {
    name: SmolStr,
    rules: Vec<RewriteRule>,
}

impl Ruleset {
    pub fn new(name: &str) -> Self {
        Ruleset {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn rules(&self) -> &[RewriteRule] { &self.rules }

    pub fn push(&mut self, rule: RewriteRule) { self.rules.push(rule); }

    /// Rewrite the tree to a fixed point, or until `cap` applications.
    ///
    /// After every successful application the scan restarts from the first
    /// rule, so earlier rules always get first refusal. Returns how many
    /// applications happened.
    pub fn apply(
        &self,
        tree: &mut Node,
        cap: usize,
        checker: &dyn ConstraintChecker,
    ) -> usize {
        let mut applied = 0;

        while applied < cap {
            let hit = self
                .rules
                .iter()
                .position(|rule| rule.apply(tree, checker));

            match hit {
                Some(index) => {
                    log::debug!(
                        "Applied rule {} of ruleset \"{}\"",
                        index,
                        self.name
                    );
                    applied += 1;
                },
                None => break,
            }
        }

        applied
    }
}

/// Why a rule file couldn't be loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFileError {
    /// 1-based line number.
    pub line: usize,
    pub kind: RuleFileErrorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleFileErrorKind {
    /// A rule line appeared before any `RULESET` header.
    MissingRulesetHeader,
    /// A rule line has no `->` separating pattern from replacement.
    MissingArrow,
    /// A `RULESET` header with no name after it.
    MissingRulesetName,
    Parse(ParseError),
    Pattern(PatternError),
    Rule(RuleError),
}

impl Display for RuleFileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Line {}: ", self.line)?;

        match &self.kind {
            RuleFileErrorKind::MissingRulesetHeader => {
                write!(f, "Rules must follow a RULESET header")
            },
            RuleFileErrorKind::MissingArrow => {
                write!(f, "Expected \"<pattern> -> <replacement>\"")
            },
            RuleFileErrorKind::MissingRulesetName => {
                write!(f, "The RULESET header needs a name")
            },
            RuleFileErrorKind::Parse(inner) => inner.fmt(f),
            RuleFileErrorKind::Pattern(inner) => inner.fmt(f),
            RuleFileErrorKind::Rule(inner) => inner.fmt(f),
        }
    }
}

impl std::error::Error for RuleFileError {}

/// Load rulesets from their textual form.
///
/// One rule per line, `<pattern> -> <replacement>`, optionally followed by
/// `WHERE <constraint> [; <constraint>]*`. A `RULESET <name>` line starts a
/// new ruleset and `#` starts a comment.
pub fn parse_rule_file<C>(
    text: &str,
    catalog: &Catalog,
    ctx: &C,
) -> Result<Vec<Ruleset>, RuleFileError>
where
    C: Context,
{
    let mut rulesets: Vec<Ruleset> = Vec::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;
        let fail = |kind| RuleFileError {
            line: line_number,
            kind,
        };

        let line = match raw_line.find('#') {
            Some(comment) => &raw_line[..comment],
            None => raw_line,
        };
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if let Some(rest) = strip_keyword(line, "RULESET") {
            let name = rest.trim();
            if name.is_empty() {
                return Err(fail(RuleFileErrorKind::MissingRulesetName));
            }
            rulesets.push(Ruleset::new(name));
            continue;
        }

        let arrow = line
            .find("->")
            .ok_or_else(|| fail(RuleFileErrorKind::MissingArrow))?;
        let (pattern_text, rest) = (&line[..arrow], &line[arrow + 2..]);

        let (replacement_text, constraint_texts) = match find_keyword(rest, "WHERE") {
            Some(at) => {
                let constraints = rest[at + "WHERE".len()..]
                    .split(';')
                    .map(str::trim)
                    .collect();
                (&rest[..at], constraints)
            },
            None => (rest, Vec::new()),
        };

        let parse = |src: &str| {
            parser::parse(catalog, src, ctx)
                .map_err(|e| fail(RuleFileErrorKind::Parse(e)))
        };

        let mut pattern = Pattern::new(parse(pattern_text)?)
            .map_err(|e| fail(RuleFileErrorKind::Pattern(e)))?;
        for constraint_text in constraint_texts {
            pattern = pattern
                .with_constraint(parse(constraint_text)?)
                .map_err(|e| fail(RuleFileErrorKind::Pattern(e)))?;
        }

        let rule = RewriteRule::new(pattern, parse(replacement_text)?)
            .map_err(|e| fail(RuleFileErrorKind::Rule(e)))?;

        match rulesets.last_mut() {
            Some(ruleset) => ruleset.push(rule),
            None => {
                return Err(fail(RuleFileErrorKind::MissingRulesetHeader))
            },
        }
    }

    Ok(rulesets)
}

fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    if line.starts_with(keyword) {
        let rest = &line[keyword.len()..];
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Some(rest);
        }
    }

    None
}

/// The position of `keyword` as a whitespace-delimited word, so identifiers
/// that merely contain it are left alone.
fn find_keyword(text: &str, keyword: &str) -> Option<usize> {
    let mut search_from = 0;

    while let Some(relative) = text[search_from..].find(keyword) {
        let at = search_from + relative;
        let before = text[..at].chars().next_back();
        let after = text[at + keyword.len()..].chars().next();

        let delimited = before.map(char::is_whitespace).unwrap_or(true)
            && after.map(char::is_whitespace).unwrap_or(true);
        if delimited {
            return Some(at);
        }

        search_from = at + keyword.len();
    }

    None
}
