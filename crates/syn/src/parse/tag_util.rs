use crate::token::SynTag;

use SynTag::*;

impl SynTag {
    pub fn can_start_expr(self) -> bool {
        matches!(
            self,
            // literals
            Int | Sym | Str
            // brackets
            | LParen | LBrace | LBracket | Lt
            // prefixes
            | Backtick | Tilde | Comma | Dash | Amp
        )
    }

    /// The closing bracket for an opening one.
    pub fn closing(self) -> Option<SynTag> {
        match self {
            LParen => Some(RParen),
            LBrace => Some(RBrace),
            LBracket => Some(RBracket),
            Lt => Some(Gt),
            _ => None,
        }
    }

    pub fn is_closing(self) -> bool {
        matches!(self, RParen | RBrace | RBracket | Gt)
    }
}
