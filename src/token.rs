//! Splitting raw input into lexical tokens.
//!
//! The tokenizer knows nothing about precedence or placement; it only needs
//! the catalog's symbolic operator names so that multi-character operators
//! (`<=`, `>=`, ...) win over their prefixes by longest match.

use crate::catalog::{is_identifier_start, Catalog};
use crate::parser::{ParseError, ParseErrorKind};
use smol_str::SmolStr;
use std::ops::Range;

/// The kinds of token that can appear in an expression's text form.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    Identifier,
    /// A symbolic operator name, matched longest-first against the catalog.
    Symbol,
    OpenParen,
    CloseParen,
    /// The argument separator, `,`.
    Delimiter,
    /// A pattern list-variable, `[name]`; `text` is the bare name.
    ListVariable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub span: Range<usize>,
    pub kind: TokenKind,
}

impl<'a> Token<'a> {
    fn from_text(source: &'a str, span: Range<usize>, kind: TokenKind) -> Self {
        Token {
            text: &source[span.clone()],
            span,
            kind,
        }
    }
}

/// Tokenize a whole input line.
///
/// The error's `token` field is the index the offending token *would* have
/// had, so callers can report positions uniformly for lexical and syntactic
/// errors alike.
pub fn tokenize<'a>(
    src: &'a str,
    catalog: &Catalog,
) -> Result<Vec<Token<'a>>, ParseError> {
    let mut tokens = Vec::new();

    for result in Tokens::new(src, catalog) {
        match result {
            Ok(token) => tokens.push(token),
            Err((character, at)) => {
                return Err(ParseError {
                    kind: ParseErrorKind::InvalidCharacter(character),
                    token: tokens.len(),
                    span: at..at + character.len_utf8(),
                })
            },
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone)]
pub(crate) struct Tokens<'a> {
    src: &'a str,
    cursor: usize,
    symbols: Vec<SmolStr>,
    keywords: Vec<SmolStr>,
}

impl<'a> Tokens<'a> {
    pub(crate) fn new(src: &'a str, catalog: &Catalog) -> Self {
        Tokens {
            src,
            cursor: 0,
            symbols: catalog.symbol_names(),
            keywords: catalog.keyword_names(),
        }
    }

    fn rest(&self) -> &'a str { &self.src[self.cursor..] }

    fn peek(&self) -> Option<char> { self.rest().chars().next() }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.cursor += c.len_utf8();
        Some(c)
    }

    fn chomp(&mut self, kind: TokenKind) -> Token<'a> {
        let start = self.cursor;
        self.advance();
        Token::from_text(self.src, start..self.cursor, kind)
    }

    fn take_while<P>(&mut self, mut predicate: P) -> Range<usize>
    where
        P: FnMut(char) -> bool,
    {
        let start = self.cursor;

        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.advance();
        }

        start..self.cursor
    }

    fn chomp_number(&mut self) -> Token<'a> {
        let start = self.cursor;
        self.take_while(|c| c.is_ascii_digit());

        if self.peek() == Some('.') {
            // skip past the decimal
            self.advance();
            self.take_while(|c| c.is_ascii_digit());
        }

        Token::from_text(self.src, start..self.cursor, TokenKind::Number)
    }

    fn chomp_identifier(&mut self) -> Token<'a> {
        let mut seen_first_character = false;

        let span = self.take_while(|c| {
            if seen_first_character {
                c.is_alphanumeric() || c == '_'
            } else {
                seen_first_character = true;
                is_identifier_start(c)
            }
        });

        Token::from_text(self.src, span, TokenKind::Identifier)
    }

    /// `[name]` — the name binds to a run of siblings during matching.
    fn chomp_list_variable(&mut self) -> Result<Token<'a>, (char, usize)> {
        let start = self.cursor;
        self.advance(); // the '['

        let name = self.chomp_identifier();
        if name.text.is_empty() {
            let offending = self.peek().unwrap_or('[');
            return Err((offending, self.cursor.min(self.src.len() - 1)));
        }

        match self.peek() {
            Some(']') => {
                self.advance();
                Ok(Token {
                    text: name.text,
                    span: start..self.cursor,
                    kind: TokenKind::ListVariable,
                })
            },
            other => Err((other.unwrap_or('['), self.cursor.min(self.src.len() - 1))),
        }
    }

    fn chomp_symbol(&mut self) -> Option<Token<'a>> {
        let rest = self.rest();
        let matched = self.symbols.iter().find(|name| rest.starts_with(name.as_str()))?;

        let start = self.cursor;
        self.cursor += matched.len();
        Some(Token::from_text(self.src, start..self.cursor, TokenKind::Symbol))
    }

    /// Identifier-like operator names take priority over the surrounding
    /// word, longest first, so `sin2` splits into `sin` and `2` and the
    /// glue operator can do its job.
    fn chomp_keyword(&mut self) -> Option<Token<'a>> {
        let rest = self.rest();
        let matched = self
            .keywords
            .iter()
            .find(|name| rest.starts_with(name.as_str()))?;

        let start = self.cursor;
        self.cursor += matched.len();
        Some(Token::from_text(
            self.src,
            start..self.cursor,
            TokenKind::Identifier,
        ))
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<Token<'a>, (char, usize)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.peek()? {
                space if space.is_whitespace() => {
                    self.advance();
                    continue;
                },
                '(' => Some(Ok(self.chomp(TokenKind::OpenParen))),
                ')' => Some(Ok(self.chomp(TokenKind::CloseParen))),
                ',' => Some(Ok(self.chomp(TokenKind::Delimiter))),
                '[' => Some(self.chomp_list_variable()),
                '0'..='9' => Some(Ok(self.chomp_number())),
                c if is_identifier_start(c) => match self.chomp_keyword() {
                    Some(token) => Some(Ok(token)),
                    None => Some(Ok(self.chomp_identifier())),
                },
                other => match self.chomp_symbol() {
                    Some(token) => Some(Ok(token)),
                    None => {
                        let at = self.cursor;
                        self.advance();
                        Some(Err((other, at)))
                    },
                },
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, &Catalog::standard())
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    macro_rules! tokenize_test {
        ($name:ident, $src:expr, $should_be:expr) => {
            #[test]
            fn $name() {
                let catalog = Catalog::standard();
                let tokens = tokenize($src, &catalog).unwrap();

                assert_eq!(tokens.len(), 1, "{:?}", tokens);
                assert_eq!(tokens[0].kind, $should_be);
                assert_eq!(tokens[0].span, 0..$src.len());
            }
        };
    }

    tokenize_test!(open_paren, "(", TokenKind::OpenParen);
    tokenize_test!(close_paren, ")", TokenKind::CloseParen);
    tokenize_test!(delimiter, ",", TokenKind::Delimiter);
    tokenize_test!(plus, "+", TokenKind::Symbol);
    tokenize_test!(caret, "^", TokenKind::Symbol);
    tokenize_test!(less_or_equal, "<=", TokenKind::Symbol);
    tokenize_test!(single_digit_integer, "3", TokenKind::Number);
    tokenize_test!(multi_digit_integer, "31", TokenKind::Number);
    tokenize_test!(number_with_trailing_dot, "31.", TokenKind::Number);
    tokenize_test!(simple_decimal, "3.14", TokenKind::Number);
    tokenize_test!(simple_identifier, "x", TokenKind::Identifier);
    tokenize_test!(longer_identifier, "hello", TokenKind::Identifier);
    tokenize_test!(underscored_identifier, "_hello_world", TokenKind::Identifier);
    tokenize_test!(list_variable, "[xs]", TokenKind::ListVariable);

    #[test]
    fn list_variable_text_is_the_bare_name() {
        let catalog = Catalog::standard();
        let tokens = tokenize("[rest]", &catalog).unwrap();

        assert_eq!(tokens[0].text, "rest");
        assert_eq!(tokens[0].span, 0..6);
    }

    #[test]
    fn longest_symbol_wins() {
        let catalog = Catalog::standard();
        let tokens = tokenize("x<=1", &catalog).unwrap();

        let texts: Vec<_> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["x", "<=", "1"]);
    }

    #[test]
    fn juxtaposition_splits_cleanly() {
        assert_eq!(
            kinds("2x"),
            vec![TokenKind::Number, TokenKind::Identifier]
        );
        assert_eq!(
            kinds("sin2"),
            vec![TokenKind::Identifier, TokenKind::Number]
        );
    }

    #[test]
    fn known_names_split_out_of_longer_words() {
        let catalog = Catalog::standard();

        let texts: Vec<_> = tokenize("sin2x", &catalog)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["sin", "2", "x"]);

        // words the catalog doesn't know stay whole
        let texts: Vec<_> = tokenize("sigma", &catalog)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["sigma"]);
    }

    #[test]
    fn whitespace_is_insignificant() {
        let catalog = Catalog::standard();
        let spaced = tokenize(" 1 + 2 ", &catalog).unwrap();
        let tight = tokenize("1+2", &catalog).unwrap();

        let spaced: Vec<_> = spaced.iter().map(|t| (t.kind, t.text)).collect();
        let tight: Vec<_> = tight.iter().map(|t| (t.kind, t.text)).collect();
        assert_eq!(spaced, tight);
    }

    #[test]
    fn unknown_characters_are_reported_with_their_position() {
        let catalog = Catalog::standard();

        let got = tokenize("1 + @", &catalog).unwrap_err();

        assert_eq!(got.kind, ParseErrorKind::InvalidCharacter('@'));
        assert_eq!(got.token, 2);
        assert_eq!(got.span, 4..5);
    }

    #[test]
    fn unterminated_list_variable_is_an_error() {
        let catalog = Catalog::standard();

        assert!(tokenize("[xs", &catalog).is_err());
        assert!(tokenize("[]", &catalog).is_err());
    }

    #[test]
    fn removed_operators_stop_tokenizing() {
        let mut catalog = Catalog::standard();
        assert!(tokenize("1^2", &catalog).is_ok());

        catalog.remove("^", crate::catalog::Placement::Infix);

        assert!(tokenize("1^2", &catalog).is_err());
    }
}
