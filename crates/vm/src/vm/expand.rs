//! Macro expansion and quasiquote rewriting.
//!
//! Expansion runs over a whole form before it is evaluated. Forms that
//! contain nothing to expand are returned as the same object, so source
//! locations recorded by address stay valid.

use crate::env;
use crate::error::{ErrorKind, EvalError, Result};
use crate::gc::Kind;
use crate::host::{self, Arity};
use crate::sym::Special;
use crate::value::{FuncKind, ParKind, Val};

use super::eval::Machine;
use super::Runtime;

/// Result of rewriting a quasiquoted form.
enum Quasi {
    /// Contains no active unquote; the form is used as-is.
    Literal(Val),
    /// Code that builds the form.
    Code(Val),
}

impl Quasi {
    fn into_code(self) -> Val {
        match self {
            Quasi::Code(code) => code,
            Quasi::Literal(val) => quote(val),
        }
    }
}

/// Wrap `val` so that evaluating it gives back `val`.
fn quote(val: Val) -> Val {
    let self_evaluating = val.is_int()
        || val.is_data()
        || val.as_sym().map_or(false, |s| s.is_self_evaluating())
        || val.as_numeric().is_some();
    if self_evaluating {
        val
    } else {
        Val::vec(vec![Val::special(Special::Quo), val])
    }
}

fn special_form(head: Special, args: Vec<Val>) -> Val {
    let mut slots = Vec::with_capacity(args.len() + 1);
    slots.push(Val::special(head));
    slots.extend(args);
    Val::vec(slots)
}

impl Runtime {
    /// Expand all macros and quasiquotes in `code`, looking macros up in
    /// `env`.
    pub fn expand(&mut self, env: &Val, code: &Val) -> Result<Val> {
        match code.kind() {
            Some(Kind::Vec) => self.expand_vec(env, code),
            Some(Kind::Chain) => {
                let items: Vec<Val> = code.chain_iter().cloned().collect();
                match self.expand_all(env, &items)? {
                    Some(items) => Ok(Val::chain(items)),
                    None => Ok(code.clone()),
                }
            }
            Some(Kind::Par) => {
                let par = match code.as_par() {
                    Some(par) => par,
                    None => return Ok(code.clone()),
                };
                let default = self.expand(env, par.default)?;
                if default.same(par.default) {
                    Ok(code.clone())
                } else {
                    Ok(Val::par(par.kind, par.name, par.ty.clone(), default))
                }
            }
            _ => Ok(code.clone()),
        }
    }

    fn expand_vec(&mut self, env: &Val, code: &Val) -> Result<Val> {
        let slots = code.vec_slots().unwrap_or_default();
        match code.form_head() {
            Some(Special::Quo) => Ok(code.clone()),
            Some(Special::Qua) => match &slots[1..] {
                [x] => Ok(self.quasi(env, x, 1)?.into_code()),
                _ => Err(ErrorKind::Malformed("QUA takes one form".into()).into()),
            },
            Some(Special::Expand) => {
                let expanded = self.expand_macro(env, code, &slots[1..])?;
                self.expand(env, &expanded)
            }
            _ => match self.expand_all(env, slots)? {
                Some(slots) => Ok(Val::vec(slots)),
                None => Ok(code.clone()),
            },
        }
    }

    /// Expand each item. Returns `None` if nothing changed.
    fn expand_all(&mut self, env: &Val, items: &[Val]) -> Result<Option<Vec<Val>>> {
        let mut out: Option<Vec<Val>> = None;
        for (i, item) in items.iter().enumerate() {
            let expanded = self.expand(env, item)?;
            match &mut out {
                Some(out) => out.push(expanded),
                None if !expanded.same(item) => {
                    let mut changed = Vec::with_capacity(items.len());
                    changed.extend(items[..i].iter().cloned());
                    changed.push(expanded);
                    out = Some(changed);
                }
                None => {}
            }
        }
        Ok(out)
    }

    fn expand_macro(&mut self, env: &Val, form: &Val, args: &[Val]) -> Result<Val> {
        let (name, rest) = match args.split_first() {
            Some((name, rest)) => (name, rest),
            None => return Err(ErrorKind::Malformed("EXPAND needs a macro name".into()).into()),
        };
        let sym = name
            .as_sym()
            .ok_or_else(|| ErrorKind::Malformed("macro name must be a symbol".into()))?;
        let name = self.syms.name_lossy(sym).into_owned();
        let func = match env::lookup(env, sym) {
            Some(func) => func.clone(),
            None => return Err(EvalError::from(ErrorKind::Unbound(name)).with_context(form)),
        };
        if func.as_func().map(|f| f.kind) != Some(FuncKind::Macro) {
            let got = self.repr(&func).to_string();
            return Err(EvalError::from(ErrorKind::Type {
                context: name,
                expected: "Macro",
                got,
            })
            .with_context(form));
        }
        tracing::debug!(target: "knot_vm::expand", %name, "expanding macro");
        Machine::new(self, env.clone())
            .apply(form, func, rest.to_vec())
            .map_err(|e| e.with_frame(format!("<{}>", name)))
    }

    /// Rewrite a quasiquoted form at nesting `depth`.
    fn quasi(&mut self, env: &Val, x: &Val, depth: usize) -> Result<Quasi> {
        if x.is_kind(Kind::Chain) {
            let items: Vec<Val> = x.chain_iter().cloned().collect();
            return Ok(match self.quasi_all(env, &items, depth)? {
                Some(codes) => Quasi::Code(Val::chain(codes)),
                None => Quasi::Literal(x.clone()),
            });
        }
        if let Some(par) = x.as_par() {
            let ty = self.quasi(env, par.ty, depth)?;
            let default = self.quasi(env, par.default, depth)?;
            if let (Quasi::Literal(_), Quasi::Literal(_)) = (&ty, &default) {
                return Ok(Quasi::Literal(x.clone()));
            }
            let kind = match par.kind {
                ParKind::Label => "Label",
                ParKind::Variadic => "Variadic",
            };
            let ctor = Val::host_func(self.intern("par"), Arity::Fixed(4), host::par);
            let args = vec![
                ctor,
                quote(Val::sym(self.intern(kind))),
                quote(Val::sym(par.name)),
                ty.into_code(),
                default.into_code(),
            ];
            return Ok(Quasi::Code(special_form(Special::Call, args)));
        }
        if !x.is_kind(Kind::Vec) {
            return Ok(Quasi::Literal(x.clone()));
        }
        let slots = x.vec_slots().unwrap_or_default();
        let nested = match (x.form_head(), slots.len()) {
            (Some(Special::Unq), 2) if depth == 1 => {
                return Ok(Quasi::Code(self.expand(env, &slots[1])?));
            }
            (Some(head @ Special::Unq), 2) => Some((head, depth - 1)),
            (Some(head @ Special::Qua), 2) => Some((head, depth + 1)),
            _ => None,
        };
        if let Some((head, depth)) = nested {
            return Ok(match self.quasi(env, &slots[1], depth)? {
                Quasi::Literal(_) => Quasi::Literal(x.clone()),
                Quasi::Code(inner) => Quasi::Code(special_form(
                    Special::Seq,
                    vec![quote(Val::special(head)), inner],
                )),
            });
        }
        Ok(match self.quasi_all(env, slots, depth)? {
            Some(codes) => Quasi::Code(special_form(Special::Seq, codes)),
            None => Quasi::Literal(x.clone()),
        })
    }

    /// Rewrite each item; `None` if all of them are literal.
    fn quasi_all(&mut self, env: &Val, items: &[Val], depth: usize) -> Result<Option<Vec<Val>>> {
        let mut parts = Vec::with_capacity(items.len());
        let mut literal = true;
        for item in items {
            let part = self.quasi(env, item, depth)?;
            literal &= matches!(part, Quasi::Literal(_));
            parts.push(part);
        }
        if literal {
            return Ok(None);
        }
        Ok(Some(parts.into_iter().map(Quasi::into_code).collect()))
    }
}
