//! An operator-precedence parser (shunting-yard variant).
//!
//! The parser walks the token stream once, keeping an operand stack of
//! completed [`Node`]s and an operator stack of frames. It supports prefix,
//! infix, postfix and function operators, function overloading by arity,
//! dynamic-arity functions, and an implicit glue operator between adjacent
//! subexpressions (`2x`, `(a)(b)`). Every invocation owns its own stacks;
//! there is no state shared between calls.

use crate::catalog::{Arity, Associativity, Catalog, Operator, Placement};
use crate::ops::Context;
use crate::token::{self, Token, TokenKind};
use crate::tree::Node;
use arrayvec::ArrayVec;
use smol_str::SmolStr;
use std::fmt::{self, Display, Formatter};
use std::ops::Range;

/// Defensive bound on parser stack depth (operands and operator frames).
pub const MAX_PARSE_DEPTH: usize = 64;

/// Parse an expression from text.
pub fn parse<C>(
    catalog: &Catalog,
    src: &str,
    ctx: &C,
) -> Result<Node, ParseError>
where
    C: Context,
{
    let tokens = token::tokenize(src, catalog)?;
    parse_tokens(catalog, &tokens, ctx)
}

/// Parse an already-tokenized expression.
pub fn parse_tokens<C>(
    catalog: &Catalog,
    tokens: &[Token<'_>],
    ctx: &C,
) -> Result<Node, ParseError>
where
    C: Context,
{
    Parser::new(catalog, tokens, ctx).parse()
}

/// A parse failure, pinned to the token at which the decision failed so the
/// caller can print a caret under the exact column.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Index into the token sequence; equal to the token count when the
    /// input ended too early.
    pub token: usize,
    /// Byte range in the source text.
    pub span: Range<usize>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// The input contained no expression at all.
    Empty,
    /// An operator was missing one of its operands.
    MissingOperand,
    /// Two adjacent operands with no operator between them, and no glue
    /// operator to repair the situation — can't happen while glue is
    /// configured.
    MissingOperator,
    /// Same situation detected eagerly, at the second operand's first token.
    UnexpectedSubexpression,
    /// An opening parenthesis was never closed.
    ExcessOpeningParenthesis,
    UnexpectedClosingParenthesis,
    /// A `,` outside a function's parameter list.
    UnexpectedDelimiter,
    /// No overload of the function accepts the number of arguments found.
    WrongArity,
    /// The operand stack outgrew [`MAX_PARSE_DEPTH`].
    TooManyOperands,
    /// The operator stack outgrew [`MAX_PARSE_DEPTH`].
    StackExceeded,
    /// The tokenizer found a character it can't place.
    InvalidCharacter(char),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParseErrorKind::Empty => write!(f, "The expression is empty"),
            ParseErrorKind::MissingOperand => {
                write!(f, "An operand is missing at token {}", self.token)
            },
            ParseErrorKind::MissingOperator => {
                write!(f, "An operator is missing at token {}", self.token)
            },
            ParseErrorKind::UnexpectedSubexpression => write!(
                f,
                "Unexpected start of a new subexpression at token {}",
                self.token
            ),
            ParseErrorKind::ExcessOpeningParenthesis => {
                write!(f, "The parenthesis at token {} is never closed", self.token)
            },
            ParseErrorKind::UnexpectedClosingParenthesis => {
                write!(f, "Unexpected \")\" at token {}", self.token)
            },
            ParseErrorKind::UnexpectedDelimiter => {
                write!(f, "Unexpected \",\" at token {}", self.token)
            },
            ParseErrorKind::WrongArity => write!(
                f,
                "No overload of the function at token {} takes this many \
                 arguments",
                self.token
            ),
            ParseErrorKind::TooManyOperands => {
                write!(f, "Too many operands (more than {})", MAX_PARSE_DEPTH)
            },
            ParseErrorKind::StackExceeded => {
                write!(f, "The expression nests deeper than {}", MAX_PARSE_DEPTH)
            },
            ParseErrorKind::InvalidCharacter(c) => {
                write!(f, "Invalid character {:?}", c)
            },
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone)]
enum Frame {
    /// An opening parenthesis.
    Sentinel { token: usize },
    /// A prefix or infix operator waiting for its operands.
    Op { op: Operator, token: usize },
    /// A function call whose argument count is still being discovered; the
    /// actual overload is resolved when the frame is reduced.
    Call {
        name: SmolStr,
        argc: usize,
        token: usize,
    },
}

#[derive(Debug)]
struct Parser<'a, 'c, C> {
    catalog: &'c Catalog,
    ctx: &'c C,
    tokens: &'a [Token<'a>],
    operands: Vec<Node>,
    frames: ArrayVec<[Frame; MAX_PARSE_DEPTH]>,
    /// True whenever the parser is owed a subexpression (at the start, after
    /// an infix or prefix operator, after `(` or `,`).
    awaiting: bool,
    prev_kind: Option<TokenKind>,
}

impl<'a, 'c, C> Parser<'a, 'c, C>
where
    C: Context,
{
    fn new(catalog: &'c Catalog, tokens: &'a [Token<'a>], ctx: &'c C) -> Self {
        Parser {
            catalog,
            ctx,
            tokens,
            operands: Vec::new(),
            frames: ArrayVec::new(),
            awaiting: true,
            prev_kind: None,
        }
    }

    fn parse(mut self) -> Result<Node, ParseError> {
        for index in 0..self.tokens.len() {
            let token = &self.tokens[index];
            match token.kind {
                TokenKind::Number => {
                    self.leaf(index, self.literal_or_variable(token))?
                },
                TokenKind::ListVariable => {
                    self.leaf(index, Node::list_variable(token.text))?
                },
                TokenKind::Identifier => self.identifier(index, token)?,
                TokenKind::Symbol => self.symbol(index, token)?,
                TokenKind::OpenParen => self.open_paren(index)?,
                TokenKind::CloseParen => self.close_paren(index)?,
                TokenKind::Delimiter => self.delimiter(index)?,
            }
            self.prev_kind = Some(token.kind);
        }

        self.finish()
    }

    fn literal_or_variable(&self, token: &Token<'_>) -> Node {
        match self.ctx.try_parse_literal(token.text) {
            Some(value) => Node::Constant(value),
            None => Node::variable(token.text),
        }
    }

    /// An identifier is a function call when the catalog knows a function by
    /// that name *and* a parenthesis follows; a named operator when the
    /// catalog has one in the placement the current state allows; otherwise a
    /// leaf (constant literal or variable).
    fn identifier(
        &mut self,
        index: usize,
        token: &Token<'a>,
    ) -> Result<(), ParseError> {
        let next_is_paren = self
            .tokens
            .get(index + 1)
            .map(|t| t.kind == TokenKind::OpenParen)
            .unwrap_or(false);

        let is_function = next_is_paren
            && self
                .catalog
                .operators()
                .any(|op| op.placement == Placement::Function && op.name == token.text);

        if is_function {
            if !self.awaiting {
                self.insert_glue(index)?;
            }
            self.push_frame(
                Frame::Call {
                    name: token.text.into(),
                    argc: 0,
                    token: index,
                },
                index,
            )?;
            self.awaiting = true;
            return Ok(());
        }

        if self.named_operator_applies(token.text) {
            return self.symbol(index, token);
        }

        self.leaf(index, self.literal_or_variable(token))
    }

    fn named_operator_applies(&self, name: &str) -> bool {
        if self.awaiting {
            self.catalog.lookup(name, Placement::Prefix).is_some()
        } else {
            self.catalog.lookup(name, Placement::Infix).is_some()
                || self.catalog.lookup(name, Placement::Postfix).is_some()
        }
    }

    fn symbol(
        &mut self,
        index: usize,
        token: &Token<'a>,
    ) -> Result<(), ParseError> {
        if self.awaiting {
            let prefix = self
                .catalog
                .lookup(token.text, Placement::Prefix)
                .cloned()
                .ok_or_else(|| self.error(ParseErrorKind::MissingOperand, index))?;
            self.push_frame(Frame::Op { op: prefix, token: index }, index)?;
            return Ok(());
        }

        if let Some(postfix) =
            self.catalog.lookup(token.text, Placement::Postfix).cloned()
        {
            // a postfix operator's single operand is already available
            let operand = self
                .operands
                .pop()
                .ok_or_else(|| self.error(ParseErrorKind::MissingOperand, index))?;
            self.operands
                .push(Node::operator(postfix, vec![operand]));
            return Ok(());
        }

        if let Some(infix) =
            self.catalog.lookup(token.text, Placement::Infix).cloned()
        {
            self.reduce_for(&infix)?;
            self.push_frame(Frame::Op { op: infix, token: index }, index)?;
            self.awaiting = true;
            return Ok(());
        }

        // the token has only a prefix form, so something must glue it to
        // what came before: `2 -x` style input
        self.insert_glue(index)?;
        self.symbol(index, token)
    }

    fn open_paren(&mut self, index: usize) -> Result<(), ParseError> {
        if !self.awaiting {
            self.insert_glue(index)?;
        }
        self.push_frame(Frame::Sentinel { token: index }, index)?;
        self.awaiting = true;
        Ok(())
    }

    fn close_paren(&mut self, index: usize) -> Result<(), ParseError> {
        let after_open = self.prev_kind == Some(TokenKind::OpenParen);

        // with no sentinel anywhere, this `)` closes nothing; report that
        // rather than whatever operand happens to be missing
        let unmatched = !self
            .frames
            .iter()
            .any(|frame| matches!(frame, Frame::Sentinel { .. }));
        if unmatched {
            return Err(
                self.error(ParseErrorKind::UnexpectedClosingParenthesis, index)
            );
        }

        if self.awaiting && !after_open {
            return Err(self.error(ParseErrorKind::MissingOperand, index));
        }

        loop {
            match self.frames.pop() {
                None => {
                    return Err(self.error(
                        ParseErrorKind::UnexpectedClosingParenthesis,
                        index,
                    ))
                },
                Some(Frame::Sentinel { .. }) => break,
                Some(Frame::Op { op, token }) => self.reduce_op(op, token)?,
                Some(Frame::Call { name, argc, token }) => {
                    self.reduce_call(&name, argc, token)?
                },
            }
        }

        // the parenthesized group is one more argument for the function the
        // parentheses belong to, unless the group was empty
        if !after_open {
            if let Some(Frame::Call { argc, .. }) = self.frames.last_mut() {
                *argc += 1;
            }
        }

        self.awaiting = false;
        Ok(())
    }

    fn delimiter(&mut self, index: usize) -> Result<(), ParseError> {
        if self.awaiting {
            return Err(self.error(ParseErrorKind::MissingOperand, index));
        }

        loop {
            if matches!(self.frames.last(), Some(Frame::Sentinel { .. })) {
                break;
            }

            match self.frames.pop() {
                None => {
                    return Err(
                        self.error(ParseErrorKind::UnexpectedDelimiter, index)
                    )
                },
                Some(Frame::Op { op, token }) => self.reduce_op(op, token)?,
                Some(Frame::Call { name, argc, token }) => {
                    self.reduce_call(&name, argc, token)?
                },
                Some(Frame::Sentinel { .. }) => unreachable!("Just inspected"),
            }
        }

        // the sentinel stays; the frame below it must be a function call
        let below = self.frames.len().checked_sub(2);
        match below.and_then(|ix| self.frames.get_mut(ix)) {
            Some(Frame::Call { argc, .. }) => *argc += 1,
            _ => {
                return Err(self.error(ParseErrorKind::UnexpectedDelimiter, index))
            },
        }

        self.awaiting = true;
        Ok(())
    }

    fn leaf(&mut self, index: usize, node: Node) -> Result<(), ParseError> {
        if !self.awaiting {
            self.insert_glue(index)?;
        }

        if self.operands.len() >= MAX_PARSE_DEPTH {
            return Err(self.error(ParseErrorKind::TooManyOperands, index));
        }
        self.operands.push(node);
        self.awaiting = false;
        Ok(())
    }

    /// Synthesize an application of the glue operator between the previous
    /// operand and the one about to start.
    fn insert_glue(&mut self, index: usize) -> Result<(), ParseError> {
        let glue = match self.catalog.glue().cloned() {
            Some(op) => op,
            None => {
                return Err(
                    self.error(ParseErrorKind::UnexpectedSubexpression, index)
                )
            },
        };

        self.reduce_for(&glue)?;
        self.push_frame(Frame::Op { op: glue, token: index }, index)?;
        self.awaiting = true;
        Ok(())
    }

    /// Pop-and-reduce everything that binds tighter than `incoming` (or
    /// equally tight, for a left-associative incoming operator).
    fn reduce_for(&mut self, incoming: &Operator) -> Result<(), ParseError> {
        loop {
            let reduce = match self.frames.last() {
                Some(Frame::Op { op, .. }) => {
                    op.precedence > incoming.precedence
                        || (op.precedence == incoming.precedence
                            && incoming.associativity == Associativity::Left)
                },
                // function application always binds tightest
                Some(Frame::Call { .. }) => true,
                Some(Frame::Sentinel { .. }) | None => false,
            };

            if !reduce {
                return Ok(());
            }

            match self.frames.pop() {
                Some(Frame::Op { op, token }) => self.reduce_op(op, token)?,
                Some(Frame::Call { name, argc, token }) => {
                    self.reduce_call(&name, argc, token)?
                },
                _ => unreachable!("Just inspected"),
            }
        }
    }

    fn reduce_op(&mut self, op: Operator, token: usize) -> Result<(), ParseError> {
        let arity = match op.placement {
            Placement::Infix => 2,
            Placement::Prefix | Placement::Postfix => 1,
            Placement::Function => match op.arity {
                Arity::Fixed(n) => n,
                Arity::Dynamic => 0,
            },
        };

        self.reduce_to_node(op, arity, token)
    }

    /// Function arity is resolved at pop time by re-looking up the function
    /// with the number of operands actually counted, which is what makes
    /// overloading work.
    fn reduce_call(
        &mut self,
        name: &str,
        argc: usize,
        token: usize,
    ) -> Result<(), ParseError> {
        let op = self
            .catalog
            .function(name, argc)
            .cloned()
            .ok_or_else(|| self.error(ParseErrorKind::WrongArity, token))?;

        self.reduce_to_node(op, argc, token)
    }

    fn reduce_to_node(
        &mut self,
        op: Operator,
        arity: usize,
        token: usize,
    ) -> Result<(), ParseError> {
        if self.operands.len() < arity {
            return Err(self.error(ParseErrorKind::MissingOperand, token));
        }

        let children = self.operands.split_off(self.operands.len() - arity);
        self.operands.push(Node::operator(op, children));
        Ok(())
    }

    fn push_frame(&mut self, frame: Frame, index: usize) -> Result<(), ParseError> {
        self.frames
            .try_push(frame)
            .map_err(|_| self.error(ParseErrorKind::StackExceeded, index))
    }

    fn finish(mut self) -> Result<Node, ParseError> {
        while let Some(frame) = self.frames.pop() {
            match frame {
                Frame::Sentinel { token } => {
                    return Err(self.error(
                        ParseErrorKind::ExcessOpeningParenthesis,
                        token,
                    ))
                },
                Frame::Op { op, token } => self.reduce_op(op, token)?,
                Frame::Call { name, argc, token } => {
                    self.reduce_call(&name, argc, token)?
                },
            }
        }

        let root = match self.operands.pop() {
            Some(node) => node,
            None => {
                return Err(self.error(ParseErrorKind::Empty, self.tokens.len()))
            },
        };

        if !self.operands.is_empty() {
            let at = self.tokens.len().saturating_sub(1);
            return Err(self.error(ParseErrorKind::MissingOperator, at));
        }

        Ok(root)
    }

    fn error(&self, kind: ParseErrorKind, token: usize) -> ParseError {
        let span = match self.tokens.get(token) {
            Some(t) => t.span.clone(),
            None => {
                let end = self
                    .tokens
                    .last()
                    .map(|t| t.span.end)
                    .unwrap_or(0);
                end..end
            },
        };

        ParseError { kind, token, span }
    }
}
