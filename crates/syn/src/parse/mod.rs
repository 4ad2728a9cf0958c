//! Single-pass recursive descent parser producing code as values.

use std::num::IntErrorKind;
use std::ops::Range;

use bytes::{BufMut, BytesMut};
use knot_vm::value::ParKind;
use knot_vm::{Special, SymbolTable, Val};
use rowan::TextRange;

pub mod error_report;
mod tag_util;
#[cfg(test)]
mod test;

use crate::source_map::SourceMap;
use crate::token::SynTag::{self, *};
use crate::Lexer;
use error_report::{IntoTextRange, ParseError, ParseErrorKind, ParseErrorSignal, Result};

/// The result of parsing one source.
pub struct Parsed {
    /// `{DO ...}` of every top-level expression.
    pub code: Val,
    pub locs: SourceMap,
}

/// Parse a whole source into `{DO e1 e2 ...}`, interning symbols into
/// `syms`. Parsing stops at the first error.
pub fn parse_src(
    syms: &mut SymbolTable,
    path: &str,
    src: &str,
) -> std::result::Result<Parsed, ParseError> {
    let _span = tracing::debug_span!("parse", path).entered();
    let mut parser = Parser::new(src, syms);
    match parser.parse_root() {
        Ok(code) => {
            let locs = parser.finish();
            tracing::debug!(forms = locs.len(), "parsed");
            Ok(Parsed { code, locs })
        }
        Err(ParseErrorSignal) => Err(parser.take_error()),
    }
}

pub struct Parser<'src, 'st> {
    /// The lexer that does the job.
    lexer: Lexer<'src>,

    syms: &'st mut SymbolTable,

    /// Locations of heap forms built so far, in order.
    ///
    /// Kept as a log so forms dropped by `##` can be forgotten again.
    locs: Vec<(Val, TextRange)>,

    top_level: Vec<TextRange>,

    /// The first error. Parsing stops once it is set.
    error: Option<ParseError>,
}

impl<'src, 'st> Parser<'src, 'st> {
    pub fn new(s: &'src str, syms: &'st mut SymbolTable) -> Self {
        Parser {
            lexer: Lexer::new(s),
            syms,
            locs: vec![],
            top_level: vec![],
            error: None,
        }
    }

    pub fn finish(self) -> SourceMap {
        let mut map = SourceMap::new();
        for (val, span) in &self.locs {
            map.insert(val, *span);
        }
        for span in self.top_level {
            map.push_top_level(span);
        }
        map
    }

    pub fn take_error(&mut self) -> ParseError {
        self.error.take().unwrap_or_else(|| {
            ParseError::error(TextRange::default(), ParseErrorKind::Expected("valid input"))
        })
    }

    fn report<T>(&mut self, span: Range<usize>, kind: ParseErrorKind) -> Result<T> {
        if self.error.is_none() {
            tracing::debug!(?span, %kind, "parse error");
            self.error = Some(ParseError::error(span.into_text_range(), kind));
        }
        Err(ParseErrorSignal)
    }

    fn record(&mut self, val: &Val, span: Range<usize>) {
        if val.is_ref() {
            self.locs.push((val.clone(), span.into_text_range()));
        }
    }

    fn peek(&mut self) -> Option<SynTag> {
        self.lexer.peek()
    }

    fn peek_is(&mut self, s: SynTag) -> bool {
        self.peek_if(|x| x == s)
    }

    fn peek_if<F: FnOnce(SynTag) -> bool>(&mut self, f: F) -> bool {
        self.lexer.peek().map_or(false, f)
    }

    /// Skip whitespace, comments and `##`-commented expressions.
    fn eat_trivia(&mut self) -> Result<()> {
        while let Some(tok) = self.peek() {
            match tok {
                t if t.is_trivia() => {
                    self.lexer.next();
                }
                ExprComment => {
                    self.lexer.next();
                    self.eat_trivia()?;
                    if !self.peek_if(SynTag::can_start_expr) {
                        let span = self.lexer.peek_span();
                        return self.report(span, ParseErrorKind::Expected("expression after '##'"));
                    }
                    let mark = self.locs.len();
                    self.parse_expr()?;
                    self.locs.truncate(mark);
                }
                _ => {
                    let span = self.lexer.peek_span();
                    return self.check_token(tok, span);
                }
            }
        }
        Ok(())
    }

    /// Report tokens that are errors wherever they appear.
    fn check_token(&mut self, tok: SynTag, span: Range<usize>) -> Result<()> {
        let kind = match tok {
            Tab => ParseErrorKind::Tab,
            Control => {
                let byte = self.lexer.source().as_bytes()[span.start];
                ParseErrorKind::ControlCharacter(byte)
            }
            UnterminatedComment => ParseErrorKind::UnterminatedComment,
            UnterminatedStr => ParseErrorKind::UnterminatedString,
            Error => {
                let c = self.lexer.source()[span.start..].chars().next().unwrap_or_default();
                ParseErrorKind::IllegalCharacter(c)
            }
            _ => return Ok(()),
        };
        self.report(span, kind)
    }
}

/// The concrete parsing implementations.
///
/// # Note
///
/// Parsing methods skip trivia **before** sub-expressions inside brackets,
/// never after themselves. Prefixes and parameter parts must be adjacent.
impl<'src, 'st> Parser<'src, 'st> {
    pub fn parse_root(&mut self) -> Result<Val> {
        let mut items = vec![Val::special(Special::Do)];
        loop {
            self.eat_trivia()?;
            let tok = match self.peek() {
                Some(tok) => tok,
                None => break,
            };
            if tok.can_start_expr() {
                let start = self.lexer.peek_span().start;
                items.push(self.parse_expr()?);
                let span = start..self.lexer.span().end;
                self.top_level.push(span.into_text_range());
            } else {
                let span = self.lexer.peek_span();
                let kind = if tok.is_closing() {
                    ParseErrorKind::UnexpectedTerminator(tok)
                } else {
                    ParseErrorKind::TerminatedEarly(tok)
                };
                return self.report(span, kind);
            }
        }
        Ok(Val::vec(items))
    }

    fn parse_expr(&mut self) -> Result<Val> {
        let tok = match self.lexer.next() {
            Some(tok) => tok,
            None => {
                let span = self.lexer.peek_span();
                return self.report(span, ParseErrorKind::Expected("expression"));
            }
        };
        let span = self.lexer.span();
        match tok {
            Int => self.parse_int(span),
            Sym => {
                let sym = self.syms.intern(self.lexer.slice().as_bytes());
                Ok(Val::sym(sym))
            }
            Str => self.parse_str(span),
            LParen | LBrace | LBracket | Lt => self.parse_bracketed(tok, span),
            Backtick | Tilde | Comma => {
                let head = match tok {
                    Backtick => Special::Quo,
                    Tilde => Special::Qua,
                    _ => Special::Unq,
                };
                let inner = self.parse_adjacent("expression after prefix")?;
                let val = Val::vec(vec![Val::special(head), inner]);
                self.record(&val, span.start..self.lexer.span().end);
                Ok(val)
            }
            Dash => self.parse_par(ParKind::Label, span),
            Amp => self.parse_par(ParKind::Variadic, span),
            _ => {
                self.check_token(tok, span.clone())?;
                self.report(span, ParseErrorKind::Unexpected(tok))
            }
        }
    }

    /// Parse an expression that must start right at the next token.
    fn parse_adjacent(&mut self, what: &'static str) -> Result<Val> {
        if self.peek_if(SynTag::can_start_expr) {
            self.parse_expr()
        } else {
            let span = self.lexer.peek_span();
            if let Some(tok) = self.peek() {
                self.check_token(tok, span.clone())?;
            }
            self.report(span, ParseErrorKind::Expected(what))
        }
    }

    fn parse_bracketed(&mut self, open: SynTag, open_span: Range<usize>) -> Result<Val> {
        let close = match open.closing() {
            Some(close) => close,
            None => return self.report(open_span, ParseErrorKind::Unexpected(open)),
        };
        let mut items = match open {
            LParen => vec![Val::special(Special::Call)],
            Lt => vec![Val::special(Special::Expand)],
            _ => vec![],
        };
        loop {
            self.eat_trivia()?;
            match self.peek() {
                None => return self.report(open_span, ParseErrorKind::ExpectedTerminator(close)),
                Some(tok) if tok == close => {
                    self.lexer.next();
                    break;
                }
                Some(tok) if tok.is_closing() => {
                    let span = self.lexer.peek_span();
                    return self.report(span, ParseErrorKind::ExpectedTerminator(close));
                }
                Some(tok) if tok.can_start_expr() => items.push(self.parse_expr()?),
                Some(tok) => {
                    let span = self.lexer.peek_span();
                    return self.report(span, ParseErrorKind::Unexpected(tok));
                }
            }
        }
        let val = match open {
            LBracket => Val::chain(items),
            _ => Val::vec(items),
        };
        self.record(&val, open_span.start..self.lexer.span().end);
        Ok(val)
    }

    /// `-name:type=default` or `&name:type`.
    fn parse_par(&mut self, kind: ParKind, start: Range<usize>) -> Result<Val> {
        if !self.peek_is(Sym) {
            let span = self.lexer.peek_span();
            return self.report(span, ParseErrorKind::Expected("parameter name"));
        }
        self.lexer.next();
        let name = self.syms.intern(self.lexer.slice().as_bytes());

        let mut ty = Val::void();
        if self.peek_is(Colon) {
            self.lexer.next();
            ty = self.parse_adjacent("type after ':'")?;
        }
        let mut default = Val::void();
        if kind == ParKind::Label && self.peek_is(SynTag::Eq) {
            self.lexer.next();
            default = self.parse_adjacent("default value after '='")?;
        }
        let val = Val::par(kind, name, ty, default);
        self.record(&val, start.start..self.lexer.span().end);
        Ok(val)
    }

    fn parse_int(&mut self, span: Range<usize>) -> Result<Val> {
        match parse_int_literal(self.lexer.slice()) {
            Ok(val) => Ok(val),
            Err(kind) => self.report(span, kind),
        }
    }

    fn parse_str(&mut self, span: Range<usize>) -> Result<Val> {
        // strip the quotes
        let body = span.start + 1..span.end - 1;
        let raw = &self.lexer.source().as_bytes()[body.clone()];
        let mut buf = BytesMut::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            let b = raw[i];
            match b {
                b'\\' => {
                    let next = raw.get(i + 1).copied().unwrap_or(b'\\');
                    if next == b'x' {
                        if let Some(byte) = raw.get(i + 2..i + 4).and_then(hex_byte) {
                            buf.put_u8(byte);
                            i += 4;
                            continue;
                        }
                    }
                    match unescape(next) {
                        Some(c) => buf.put_u8(c),
                        None => {
                            buf.put_u8(b'\\');
                            buf.put_u8(next);
                        }
                    }
                    i += 2;
                    continue;
                }
                b'\t' => {
                    let at = body.start + i;
                    return self.report(at..at + 1, ParseErrorKind::Tab);
                }
                b'\n' => buf.put_u8(b),
                0..=0x1f | 0x7f => {
                    let at = body.start + i;
                    return self.report(at..at + 1, ParseErrorKind::ControlCharacter(b));
                }
                _ => buf.put_u8(b),
            }
            i += 1;
        }
        let val = Val::data(&buf);
        self.record(&val, span);
        Ok(val)
    }
}

fn unescape(c: u8) -> Option<u8> {
    Some(match c {
        b'0' => 0,
        b'a' => 7,
        b'b' => 8,
        b't' => b'\t',
        b'n' => b'\n',
        b'v' => 11,
        b'f' => 12,
        b'r' => b'\r',
        b'\\' => b'\\',
        b'\'' => b'\'',
        b'"' => b'"',
        _ => return None,
    })
}

/// Two hex digits, as in `\x7f`.
fn hex_byte(digits: &[u8]) -> Option<u8> {
    if !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    u8::from_str_radix(std::str::from_utf8(digits).ok()?, 16).ok()
}

/// Parse an integer literal with an optional sign and base prefix (`0b`,
/// `0q`, `0o`, `0d`, `0x`).
fn parse_int_literal(text: &str) -> std::result::Result<Val, ParseErrorKind> {
    let (negative, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = match body.get(..2) {
        Some("0b") => (2, &body[2..]),
        Some("0q") => (4, &body[2..]),
        Some("0o") => (8, &body[2..]),
        Some("0d") => (10, &body[2..]),
        Some("0x") => (16, &body[2..]),
        _ => (10, body),
    };
    let signed = if negative {
        format!("-{}", digits)
    } else {
        digits.to_owned()
    };
    let i = i64::from_str_radix(&signed, radix).map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => ParseErrorKind::NumberOutOfRange,
        _ => ParseErrorKind::MalformedNumber(e),
    })?;
    Val::try_int(i).ok_or(ParseErrorKind::NumberOutOfRange)
}
