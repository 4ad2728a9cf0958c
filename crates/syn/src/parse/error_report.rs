use std::convert::TryInto;
use std::fmt;
use std::num::ParseIntError;

use rowan::TextRange;

use crate::token::SynTag;

/// Returned by every parse step once an error has been recorded. The error
/// itself is kept by the parser.
#[derive(Debug, Clone, Copy)]
pub struct ParseErrorSignal;
pub type Result<T> = std::result::Result<T, ParseErrorSignal>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct ParseError {
    pub span: rowan::TextRange,
    pub kind: ParseErrorKind,
    pub level: ParseErrorLevel,
}

impl ParseError {
    pub fn new(span: rowan::TextRange, kind: ParseErrorKind, level: ParseErrorLevel) -> Self {
        Self { span, kind, level }
    }

    pub fn error(span: rowan::TextRange, kind: ParseErrorKind) -> Self {
        Self {
            span,
            kind,
            level: ParseErrorLevel::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("comment is not terminated; add newline")]
    UnterminatedComment,
    #[error("tab characters are not allowed; use spaces")]
    Tab,
    #[error("raw control character {0:#04x}; use an escape sequence")]
    ControlCharacter(u8),
    #[error("illegal character: {0:?}")]
    IllegalCharacter(char),
    #[error("malformed number literal: {0}")]
    MalformedNumber(ParseIntError),
    #[error("integer literal out of range")]
    NumberOutOfRange,
    #[error("expected terminator: '{0}'")]
    ExpectedTerminator(SynTag),
    #[error("unexpected terminator: '{0}'")]
    UnexpectedTerminator(SynTag),
    #[error("expected {0}")]
    Expected(&'static str),
    #[error("unexpected '{0}'")]
    Unexpected(SynTag),
    #[error("parsing terminated early at '{0}'")]
    TerminatedEarly(SynTag),
}

#[derive(Debug, Clone, PartialEq, Eq, Copy, PartialOrd, Ord)]
pub enum ParseErrorLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for ParseErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParseErrorLevel::Info => "info",
            ParseErrorLevel::Warning => "warning",
            ParseErrorLevel::Error => "error",
        })
    }
}

pub trait IntoTextRange {
    fn into_text_range(self) -> TextRange;
}

impl IntoTextRange for std::ops::Range<usize> {
    fn into_text_range(self) -> TextRange {
        let clamp = |i: usize| i.try_into().unwrap_or(u32::MAX.into());
        TextRange::new(clamp(self.start), clamp(self.end))
    }
}
