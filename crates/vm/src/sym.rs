//! Interned symbols.

use std::borrow::Cow;

use enum_ordinalize::Ordinalize;
use fnv::FnvHashMap;

use crate::value::{DataBytes, Val};

/// An index into a [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sym(u32);

impl Sym {
    pub(crate) fn from_index(index: u32) -> Sym {
        Sym(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    /// Symbols below `END_SPECIAL` evaluate to themselves and are never
    /// looked up.
    pub fn is_self_evaluating(self) -> bool {
        self.0 < Special::EndSpecial as u32
    }

    pub fn special(self) -> Option<Special> {
        Special::from_ordinal(self.0)
    }
}

/// Symbols with fixed indices, installed in every table in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ordinalize)]
#[repr(u32)]
pub enum Special {
    Void,
    Nil,
    False,
    True,
    /// Terminates chains and environments.
    End,
    /// The empty vector.
    Vec0,
    /// The empty chain.
    Chain0,
    Quo,
    Qua,
    Unq,
    Expand,
    Do,
    Scope,
    Let,
    Var,
    If,
    Fn,
    Seq,
    Call,
    EndSpecial,
    /// Bound to the running closure inside its body.
    SelfRef,
}

impl Special {
    pub fn sym(self) -> Sym {
        Sym(self as u32)
    }

    pub fn name(self) -> &'static str {
        match self {
            Special::Void => "void",
            Special::Nil => "nil",
            Special::False => "false",
            Special::True => "true",
            Special::End => "END",
            Special::Vec0 => "VEC0",
            Special::Chain0 => "CHAIN0",
            Special::Quo => "QUO",
            Special::Qua => "QUA",
            Special::Unq => "UNQ",
            Special::Expand => "EXPAND",
            Special::Do => "DO",
            Special::Scope => "SCOPE",
            Special::Let => "LET",
            Special::Var => "VAR",
            Special::If => "IF",
            Special::Fn => "FN",
            Special::Seq => "SEQ",
            Special::Call => "CALL",
            Special::EndSpecial => "END_SPECIAL",
            Special::SelfRef => "self",
        }
    }
}

/// The append-only intern table.
///
/// Names are kept as data values; the index maps bytes back to symbols.
pub struct SymbolTable {
    names: Vec<Val>,
    index: FnvHashMap<Box<[u8]>, Sym>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            names: vec![],
            index: FnvHashMap::default(),
        };
        for special in Special::variants() {
            let sym = table.intern(special.name().as_bytes());
            debug_assert_eq!(sym, special.sym());
        }
        table
    }

    /// Return the symbol for `name`, adding it if it is new.
    pub fn intern(&mut self, name: &[u8]) -> Sym {
        if let Some(&sym) = self.index.get(name) {
            sym
        } else {
            let sym = Sym(self.names.len() as u32);
            self.names.push(Val::data(name));
            self.index.insert(name.into(), sym);
            tracing::trace!(target: "knot_vm::sym", index = sym.0, "interned");
            sym
        }
    }

    pub fn intern_str(&mut self, name: &str) -> Sym {
        self.intern(name.as_bytes())
    }

    /// Look a name up without interning it.
    pub fn get(&self, name: &[u8]) -> Option<Sym> {
        self.index.get(name).copied()
    }

    pub fn name(&self, sym: Sym) -> Option<DataBytes<'_>> {
        self.names.get(sym.0 as usize)?.data_bytes()
    }

    /// The name as text, for messages.
    pub fn name_lossy(&self, sym: Sym) -> Cow<'_, str> {
        match self.names.get(sym.0 as usize).and_then(Val::data_bytes) {
            Some(DataBytes::Heap(bytes)) => String::from_utf8_lossy(bytes),
            Some(word) => Cow::Owned(String::from_utf8_lossy(&word).into_owned()),
            None => Cow::Owned(format!("#{}", sym.0)),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
