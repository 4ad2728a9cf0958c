use std::fmt;

use logos::Logos;

/// The token type.
///
/// String literals are not matched by a regex: the lexer sees the opening
/// quote and scans to the closing one itself, producing [`SynTag::Str`] or
/// [`SynTag::UnterminatedStr`].
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynTag {
    // === Aux Tokens ===
    /// Whitespace
    #[regex(r" +")]
    WS,
    /// End of line
    #[token("\n")]
    LF,
    #[token("\t")]
    Tab,
    /// Raw control characters other than tab and newline
    #[regex(r"[\x00-\x08\x0b-\x1f\x7f]")]
    Control,
    /// A line comment, including its newline
    #[regex(r"#([^#\n][^\n]*)?\n")]
    Comment,
    /// A line comment at the end of input without a newline
    #[regex(r"#([^#\n][^\n]*)?")]
    UnterminatedComment,
    /// `##`, which comments out the next expression
    #[token("##")]
    ExprComment,

    /// Anything that doesn't match
    #[error]
    Error,

    // === Literal Tokens ===
    #[regex(r"[+-]?[0-9][0-9A-Za-z_]*")]
    Int,
    #[regex(r"[A-Za-z_][-A-Za-z0-9_]*")]
    Sym,
    #[token("'")]
    SingleQuote,
    #[token("\"")]
    DoubleQuote,
    /// A complete string literal, quotes included
    Str,
    UnterminatedStr,

    // === Brackets ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    // === Prefixes ===
    #[token("`")]
    Backtick,
    #[token("~")]
    Tilde,
    #[token(",")]
    Comma,
    #[token("-")]
    Dash,
    #[token("&")]
    Amp,
    #[token(":")]
    Colon,
    #[token("=")]
    Eq,
}

impl SynTag {
    /// Tokens skipped between expressions.
    pub fn is_trivia(self) -> bool {
        matches!(self, SynTag::WS | SynTag::LF | SynTag::Comment)
    }

    /// Source text of fixed tokens, for messages.
    pub fn text(self) -> Option<&'static str> {
        use SynTag::*;
        Some(match self {
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            LBracket => "[",
            RBracket => "]",
            Lt => "<",
            Gt => ">",
            Backtick => "`",
            Tilde => "~",
            Comma => ",",
            Dash => "-",
            Amp => "&",
            Colon => ":",
            Eq => "=",
            ExprComment => "##",
            _ => return None,
        })
    }
}

impl fmt::Display for SynTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text() {
            Some(text) => f.write_str(text),
            None => write!(f, "{:?}", self),
        }
    }
}
