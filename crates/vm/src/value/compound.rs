//! Slot-based heap objects: vectors, chains, parameters and closures.

use crate::error::DataError;
use crate::gc::{alloc, Header, Kind};
use crate::sym::{Special, Sym};

use super::Val;

const SLOT: usize = std::mem::size_of::<Val>();

/// Allocate a compound object of `kind` holding `items` in order.
pub(crate) fn alloc_slots(kind: Kind, meta: u8, items: Vec<Val>) -> Val {
    debug_assert!(kind.has_slots());
    let len = items.len();
    let ptr = alloc::allocate(len * SLOT, kind);
    unsafe {
        let header = ptr.as_ref();
        header.set_meta(meta);
        header.set_len(len);
        let body = Header::body(ptr) as *mut Val;
        for (i, item) in items.into_iter().enumerate() {
            body.add(i).write(item);
        }
        Val::from_header(ptr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParKind {
    /// `-name:type=default`, bound positionally or by label.
    Label,
    /// `&name`, collects the remaining positional arguments.
    Variadic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    Function,
    Macro,
}

/// Borrowed view of a parameter record.
#[derive(Debug, Clone, Copy)]
pub struct ParRef<'a> {
    pub kind: ParKind,
    pub name: Sym,
    pub ty: &'a Val,
    pub default: &'a Val,
}

impl ParRef<'_> {
    /// A parameter without a default must be supplied by the caller.
    pub fn has_default(&self) -> bool {
        !self.default.is_special(Special::Void)
    }
}

/// Borrowed view of a closure.
#[derive(Debug, Clone, Copy)]
pub struct FuncRef<'a> {
    pub kind: FuncKind,
    pub name: Sym,
    pub pars: &'a Val,
    pub body: &'a Val,
    pub env: &'a Val,
}

impl Val {
    /// Make a vector of `items`. The empty vector is the `VEC0` constant.
    pub fn vec(items: Vec<Val>) -> Val {
        if items.is_empty() {
            return Val::special(Special::Vec0);
        }
        alloc_slots(Kind::Vec, 0, items)
    }

    pub fn vec_from_slice(items: &[Val]) -> Val {
        Val::vec(items.to_vec())
    }

    /// Link `items` into a chain ending in `END`. The empty chain is the
    /// `CHAIN0` constant.
    pub fn chain(items: Vec<Val>) -> Val {
        if items.is_empty() {
            return Val::special(Special::Chain0);
        }
        let mut next = Val::special(Special::End);
        for item in items.into_iter().rev() {
            next = alloc_slots(Kind::Chain, 0, vec![item, next]);
        }
        next
    }

    pub fn par(kind: ParKind, name: Sym, ty: Val, default: Val) -> Val {
        let meta = match kind {
            ParKind::Label => 0,
            ParKind::Variadic => 1,
        };
        alloc_slots(Kind::Par, meta, vec![Val::sym(name), ty, default])
    }

    pub fn func(kind: FuncKind, name: Sym, pars: Val, body: Val, env: Val) -> Val {
        let meta = match kind {
            FuncKind::Function => 0,
            FuncKind::Macro => 1,
        };
        alloc_slots(Kind::Func, meta, vec![Val::sym(name), pars, body, env])
    }

    /// The slots of any compound object.
    pub fn slots(&self) -> Option<&[Val]> {
        let ptr = self.header_ptr()?;
        if self.kind()?.has_slots() {
            Some(unsafe { Header::slots(ptr) })
        } else {
            None
        }
    }

    /// Returns `true` if the val is a vector, including `VEC0`.
    pub fn is_vec(&self) -> bool {
        self.is_kind(Kind::Vec) || self.is_special(Special::Vec0)
    }

    /// Elements of a vector. `VEC0` has none.
    pub fn vec_slots(&self) -> Option<&[Val]> {
        if self.is_special(Special::Vec0) {
            Some(&[])
        } else if self.is_kind(Kind::Vec) {
            self.slots()
        } else {
            None
        }
    }

    /// Returns `true` if the val is a chain link or `CHAIN0`.
    pub fn is_chain(&self) -> bool {
        self.is_kind(Kind::Chain) || self.is_special(Special::Chain0)
    }

    /// Payloads of a chain, front to back.
    pub fn chain_iter(&self) -> ChainIter<'_> {
        ChainIter { cur: self }
    }

    /// The special symbol in slot 0 of a vector, if any.
    pub fn form_head(&self) -> Option<Special> {
        self.vec_slots()?.first()?.as_sym()?.special()
    }

    /// The slots after the head of a special form `{HEAD args...}`.
    pub fn form_args(&self, head: Special) -> Option<&[Val]> {
        if self.form_head()? == head {
            self.vec_slots().map(|s| &s[1..])
        } else {
            None
        }
    }

    pub fn as_par(&self) -> Option<ParRef<'_>> {
        if !self.is_kind(Kind::Par) {
            return None;
        }
        let kind = match self.header()?.meta() {
            0 => ParKind::Label,
            _ => ParKind::Variadic,
        };
        match self.slots()? {
            [name, ty, default] => Some(ParRef {
                kind,
                name: name.as_sym()?,
                ty,
                default,
            }),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<FuncRef<'_>> {
        if !self.is_kind(Kind::Func) {
            return None;
        }
        let kind = match self.header()?.meta() {
            0 => FuncKind::Function,
            _ => FuncKind::Macro,
        };
        match self.slots()? {
            [name, pars, body, env] => Some(FuncRef {
                kind,
                name: name.as_sym()?,
                pars,
                body,
                env,
            }),
            _ => None,
        }
    }

    /// Length of a vector, chain or data value.
    pub fn len(&self) -> Option<usize> {
        if let Some(bytes) = self.data_bytes() {
            Some(bytes.len())
        } else if let Some(slots) = self.vec_slots() {
            Some(slots.len())
        } else if self.is_chain() {
            Some(self.chain_iter().count())
        } else {
            None
        }
    }

    /// Bounds-checked element access on vectors and chains.
    pub fn el(&self, index: usize) -> Result<&Val, DataError> {
        let out_of_bounds = |len| DataError::OutOfBounds {
            index: index as i64,
            len,
        };
        if let Some(slots) = self.vec_slots() {
            slots.get(index).ok_or_else(|| out_of_bounds(slots.len()))
        } else if self.is_chain() {
            self.chain_iter()
                .nth(index)
                .ok_or_else(|| out_of_bounds(self.chain_iter().count()))
        } else {
            Err(DataError::WrongKind {
                expected: "Vec or Chain",
            })
        }
    }

    /// Copy out the elements `from..to` of a vector, chain or data value.
    /// Negative indices count from the end; both ends are clamped.
    pub fn slice(&self, from: i64, to: i64) -> Result<Val, DataError> {
        let len = self.len().ok_or(DataError::WrongKind {
            expected: "Vec, Chain or Data",
        })?;
        let clamp = |i: i64| -> usize {
            let i = if i < 0 { i + len as i64 } else { i };
            i.clamp(0, len as i64) as usize
        };
        let (from, to) = (clamp(from), clamp(to).max(clamp(from)));
        if let Some(bytes) = self.data_bytes() {
            Ok(Val::data(&bytes[from..to]))
        } else if let Some(slots) = self.vec_slots() {
            Ok(Val::vec_from_slice(&slots[from..to]))
        } else {
            Ok(Val::chain(
                self.chain_iter().skip(from).take(to - from).cloned().collect(),
            ))
        }
    }

    /// Replace slot `index` of a uniquely owned vector, chain link or
    /// parameter, returning the previous occupant to the caller.
    pub fn set_slot(&mut self, index: usize, val: Val) -> Result<Val, DataError> {
        let kind = self.kind().ok_or(DataError::WrongKind {
            expected: "Vec, Chain or Par",
        })?;
        if !matches!(kind, Kind::Vec | Kind::Chain | Kind::Par) {
            return Err(DataError::WrongKind {
                expected: "Vec, Chain or Par",
            });
        }
        if !self.is_unique() {
            return Err(DataError::Shared);
        }
        let len = self.slots().map_or(0, <[Val]>::len);
        if index >= len {
            return Err(DataError::OutOfBounds {
                index: index as i64,
                len,
            });
        }
        if kind == Kind::Chain && index == len - 1 && !(val.is_kind(Kind::Chain) || val.is_special(Special::End)) {
            return Err(DataError::BrokenChain);
        }
        let ptr = self.header_ptr().ok_or(DataError::Shared)?;
        unsafe {
            let slot = (Header::body(ptr) as *mut Val).add(index);
            let old = slot.read();
            slot.write(val);
            Ok(old)
        }
    }

    /// A new vector with `val` in front of the elements of this one.
    pub fn prepend(&self, val: Val) -> Result<Val, DataError> {
        let slots = self.vec_slots().ok_or(DataError::WrongKind { expected: "Vec" })?;
        let mut items = Vec::with_capacity(slots.len() + 1);
        items.push(val);
        items.extend(slots.iter().cloned());
        Ok(Val::vec(items))
    }

    /// Add `val` at the end of a vector. A uniquely owned vector grows in
    /// place; a shared one is copied.
    pub fn append(self, val: Val) -> Result<Val, DataError> {
        if !self.is_vec() {
            return Err(DataError::WrongKind { expected: "Vec" });
        }
        if !self.is_unique() {
            let slots = self.vec_slots().unwrap_or_default();
            let mut items = Vec::with_capacity(slots.len() + 1);
            items.extend(slots.iter().cloned());
            items.push(val);
            return Ok(Val::vec(items));
        }
        let ptr = match self.into_header_ptr() {
            Some(ptr) => ptr,
            None => unreachable!("unique values are references"),
        };
        unsafe {
            let len = ptr.as_ref().len();
            let ptr = alloc::reallocate(ptr, len * SLOT, (len + 1) * SLOT);
            (Header::body(ptr) as *mut Val).add(len).write(val);
            ptr.as_ref().set_len(len + 1);
            Ok(Val::from_header(ptr))
        }
    }
}

/// Iterator over chain payloads.
pub struct ChainIter<'a> {
    cur: &'a Val,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a Val;

    fn next(&mut self) -> Option<&'a Val> {
        if !self.cur.is_kind(Kind::Chain) {
            return None;
        }
        match self.cur.slots()? {
            [payload, next] => {
                self.cur = next;
                Some(payload)
            }
            _ => None,
        }
    }
}
