//! Persistent environments.
//!
//! An environment is a chain of `Env` nodes ending in `END`. A node is either
//! a binding `[sym, value, next]` or a frame marker `[name, next]`. New
//! bindings are prepended, so every older head stays valid.

use crate::gc::Kind;
use crate::sym::{Special, Sym};
use crate::value::{alloc_slots, Val};

const META_BINDING: u8 = 0;
const META_MUTABLE: u8 = 1;
const META_FRAME: u8 = 2;

/// One node of an environment chain.
#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    Binding {
        sym: Sym,
        val: &'a Val,
        mutable: bool,
    },
    Frame(Sym),
}

/// The empty environment.
pub fn empty() -> Val {
    Val::special(Special::End)
}

/// Prepend a binding of `sym` to `val`. The new head is returned; `env` is
/// unchanged.
pub fn bind(env: &Val, sym: Sym, val: Val, mutable: bool) -> Val {
    let meta = if mutable { META_MUTABLE } else { META_BINDING };
    alloc_slots(Kind::Env, meta, vec![Val::sym(sym), val, env.clone()])
}

/// Prepend a frame marker named `name`.
pub fn frame(env: &Val, name: Sym) -> Val {
    alloc_slots(Kind::Env, META_FRAME, vec![Val::sym(name), env.clone()])
}

/// Walk the nodes of `env` front to back.
pub fn entries(env: &Val) -> Entries<'_> {
    Entries { cur: env }
}

/// The innermost binding of `sym`, or `None` if it is unbound.
pub fn lookup(env: &Val, sym: Sym) -> Option<&Val> {
    entries(env).find_map(|entry| match entry {
        Entry::Binding { sym: s, val, .. } if s == sym => Some(val),
        _ => None,
    })
}

/// If `sym` is bound in the innermost frame, whether that binding is mutable.
pub fn bound_in_frame(env: &Val, sym: Sym) -> Option<bool> {
    for entry in entries(env) {
        match entry {
            Entry::Frame(_) => return None,
            Entry::Binding { sym: s, mutable, .. } if s == sym => return Some(mutable),
            Entry::Binding { .. } => {}
        }
    }
    None
}

/// Names of the frames of `env`, innermost first.
pub fn frames(env: &Val) -> impl Iterator<Item = Sym> + '_ {
    entries(env).filter_map(|entry| match entry {
        Entry::Frame(name) => Some(name),
        Entry::Binding { .. } => None,
    })
}

pub struct Entries<'a> {
    cur: &'a Val,
}

impl<'a> Iterator for Entries<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Entry<'a>> {
        if !self.cur.is_kind(Kind::Env) {
            return None;
        }
        let meta = self.cur.header()?.meta();
        match (meta, self.cur.slots()?) {
            (META_FRAME, [name, next]) => {
                self.cur = next;
                Some(Entry::Frame(name.as_sym()?))
            }
            (_, [sym, val, next]) => {
                self.cur = next;
                Some(Entry::Binding {
                    sym: sym.as_sym()?,
                    val,
                    mutable: meta == META_MUTABLE,
                })
            }
            _ => None,
        }
    }
}
