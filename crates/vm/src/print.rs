//! Printing values back into source form.
//!
//! Everything the parser can produce prints to text that parses back to an
//! equal value. Handles (closures, host functions, files, environments and
//! boxed numerics) print as `«Kind ...»`, which does not parse.

use std::fmt::{self, Display, Write};

use itertools::Itertools;

use crate::gc::Kind;
use crate::sym::{Special, SymbolTable};
use crate::value::{FuncKind, ParKind, Tag, Val};

/// Displays a value with symbol names resolved.
pub struct Repr<'a> {
    syms: &'a SymbolTable,
    val: &'a Val,
}

impl<'a> Repr<'a> {
    pub fn new(syms: &'a SymbolTable, val: &'a Val) -> Self {
        Repr { syms, val }
    }

    fn of(&self, val: &'a Val) -> Repr<'a> {
        Repr::new(self.syms, val)
    }
}

impl Display for Repr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let val = self.val;
        match val.tag() {
            Tag::Int => write!(f, "{}", val.as_int().unwrap_or_default()),
            Tag::Sym => match val.as_sym() {
                Some(s) if s == Special::Vec0.sym() => f.write_str("{}"),
                Some(s) if s == Special::Chain0.sym() => f.write_str("[]"),
                Some(s) => f.write_str(&self.syms.name_lossy(s)),
                None => Ok(()),
            },
            Tag::DataWord => write_data(f, &val.data_bytes().unwrap_or_default()),
            Tag::Managed => write!(f, "«Managed {:#x}»", val.word()),
            Tag::Ref => self.fmt_ref(f),
        }
    }
}

impl Repr<'_> {
    fn fmt_ref(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let val = self.val;
        let kind = match val.kind() {
            Some(kind) => kind,
            None => return Ok(()),
        };
        match kind {
            Kind::Data => write_data(f, &val.data_bytes().unwrap_or_default()),
            Kind::Vec => self.fmt_vec(f, val.slots().unwrap_or_default()),
            Kind::Chain => write!(f, "[{}]", val.chain_iter().map(|v| self.of(v)).format(" ")),
            Kind::Par => {
                let par = match val.as_par() {
                    Some(par) => par,
                    None => return Ok(()),
                };
                let sigil = match par.kind {
                    ParKind::Label => '-',
                    ParKind::Variadic => '&',
                };
                write!(f, "{}{}", sigil, self.syms.name_lossy(par.name))?;
                if !par.ty.is_special(Special::Void) {
                    write!(f, ":{}", self.of(par.ty))?;
                }
                if par.has_default() {
                    write!(f, "={}", self.of(par.default))?;
                }
                Ok(())
            }
            Kind::Func => match val.as_func() {
                Some(func) => {
                    let label = match func.kind {
                        FuncKind::Function => "Func",
                        FuncKind::Macro => "Macro",
                    };
                    write!(f, "«{} {}»", label, self.syms.name_lossy(func.name))
                }
                None => Ok(()),
            },
            Kind::HostFunc => match val.as_host_func() {
                Some(host) => write!(f, "«{} {}»", kind.name(), self.syms.name_lossy(host.name)),
                None => Ok(()),
            },
            Kind::File => match val.as_file() {
                Some(file) => write!(f, "«File {}»", self.syms.name_lossy(file.name)),
                None => Ok(()),
            },
            Kind::Env => f.write_str("«Env»"),
            Kind::I32 | Kind::I64 | Kind::U32 | Kind::U64 | Kind::F32 | Kind::F64 => {
                match val.as_numeric() {
                    Some(n) => write!(f, "«{} {}»", kind.name(), n),
                    None => Ok(()),
                }
            }
            Kind::Reserved | Kind::Deallocated => write!(f, "«{} {:#x}»", kind.name(), val.word()),
        }
    }

    fn fmt_vec(&self, f: &mut fmt::Formatter<'_>, slots: &[Val]) -> fmt::Result {
        let head = slots.first().and_then(Val::as_sym).and_then(|s| s.special());
        let rest = || slots[1..].iter().map(|v| self.of(v)).format(" ");
        match (head, slots.len()) {
            (Some(Special::Call), n) if n >= 2 => write!(f, "({})", rest()),
            (Some(Special::Expand), n) if n >= 2 => write!(f, "<{}>", rest()),
            (Some(Special::Quo), 2) => write!(f, "`{}", self.of(&slots[1])),
            (Some(Special::Qua), 2) => write!(f, "~{}", self.of(&slots[1])),
            (Some(Special::Unq), 2) => write!(f, ",{}", self.of(&slots[1])),
            _ => write!(f, "{{{}}}", slots.iter().map(|v| self.of(v)).format(" ")),
        }
    }
}

/// Quote `bytes` as a string literal. Valid UTF-8 text is kept as is;
/// control characters and stray bytes become escapes.
fn write_data(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_char('\'')?;
    let mut rest = bytes;
    while !rest.is_empty() {
        let (text, bad) = match std::str::from_utf8(rest) {
            Ok(text) => (text, 0),
            Err(e) => {
                let valid = &rest[..e.valid_up_to()];
                let bad = e.error_len().unwrap_or(rest.len() - valid.len());
                (std::str::from_utf8(valid).unwrap_or_default(), bad)
            }
        };
        write_text(f, text)?;
        let bad = &rest[text.len()..text.len() + bad];
        for &b in bad {
            write_hex(f, b)?;
        }
        rest = &rest[text.len() + bad.len()..];
    }
    f.write_char('\'')
}

fn write_text(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    for c in text.chars() {
        match u8::try_from(c).ok().and_then(named_escape) {
            Some(e) => {
                f.write_char('\\')?;
                f.write_char(e)?;
            }
            None if c.is_control() => {
                let mut buf = [0; 4];
                for &b in c.encode_utf8(&mut buf).as_bytes() {
                    write_hex(f, b)?;
                }
            }
            None => f.write_char(c)?,
        }
    }
    Ok(())
}

fn named_escape(b: u8) -> Option<char> {
    Some(match b {
        0 => '0',
        7 => 'a',
        8 => 'b',
        9 => 't',
        10 => 'n',
        11 => 'v',
        12 => 'f',
        13 => 'r',
        b'\\' => '\\',
        b'\'' => '\'',
        _ => return None,
    })
}

fn write_hex(f: &mut fmt::Formatter<'_>, b: u8) -> fmt::Result {
    write!(f, "\\x{:02x}", b)
}
