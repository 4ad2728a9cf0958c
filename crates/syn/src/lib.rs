use std::ops::Range;

use logos::Span;

pub mod parse;
pub mod source_map;
pub mod token;

pub use parse::error_report::{ParseError, ParseErrorKind, ParseErrorLevel};
pub use parse::{parse_src, Parsed};
pub use source_map::SourceMap;
pub use token::SynTag;

/// Tokens of a source, with one token of lookahead.
pub struct Lexer<'lex> {
    inner: logos::Lexer<'lex, SynTag>,
    /// The span of the last token taken.
    span: Span,
    peeked: Option<(SynTag, Span)>,
}

impl<'lex> Lexer<'lex> {
    pub fn new(s: &'lex str) -> Lexer<'lex> {
        Lexer {
            inner: logos::Lexer::new(s),
            span: Default::default(),
            peeked: None,
        }
    }

    pub fn source(&self) -> &'lex str {
        self.inner.source()
    }

    /// The span of the last token taken.
    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// The span of the next token, or an empty span at the end of input.
    pub fn peek_span(&mut self) -> Range<usize> {
        self.peek();
        match &self.peeked {
            Some((_, span)) => span.clone(),
            None => self.source().len()..self.source().len(),
        }
    }

    /// Source text of the last token taken.
    pub fn slice(&self) -> &'lex str {
        &self.inner.source()[self.span()]
    }

    pub fn peek(&mut self) -> Option<SynTag> {
        if self.peeked.is_none() {
            self.peeked = self.lex();
        }
        self.peeked.as_ref().map(|(tag, _)| *tag)
    }

    /// Lex one token. Quotes start string literals, which are scanned here
    /// rather than by the token regexes.
    fn lex(&mut self) -> Option<(SynTag, Span)> {
        let tok = self.inner.next()?;
        let quote = match tok {
            SynTag::SingleQuote => b'\'',
            SynTag::DoubleQuote => b'"',
            _ => return Some((tok, self.inner.span())),
        };
        let rest = self.inner.remainder().as_bytes();
        let mut i = 0;
        let tag = loop {
            match rest.get(i) {
                None => break SynTag::UnterminatedStr,
                Some(b'\\') => i += 2,
                Some(&b) if b == quote => {
                    i += 1;
                    break SynTag::Str;
                }
                Some(_) => i += 1,
            }
        };
        self.inner.bump(i.min(rest.len()));
        Some((tag, self.inner.span()))
    }
}

impl<'lex> Iterator for Lexer<'lex> {
    type Item = SynTag;

    fn next(&mut self) -> Option<Self::Item> {
        let (tok, span) = match self.peeked.take() {
            Some(next) => next,
            None => self.lex()?,
        };
        self.span = span;
        Some(tok)
    }
}
