//! The evaluation loop.
//!
//! Evaluation never recurses on the native stack. Pending work is kept as
//! continuations in [`Machine::stack`]; each step either evaluates a form or
//! hands a value to the continuation on top. A closure called in tail
//! position finds a [`Kont::Return`] already on top and does not push
//! another, so tail calls run in constant space.

use std::collections::VecDeque;

use crate::env;
use crate::error::{ErrorKind, EvalError, Result};
use crate::gc::Kind;
use crate::sym::{Special, Sym};
use crate::value::{FuncKind, ParKind, Val};

use super::Runtime;

/// What to do next.
enum Step {
    Eval(Val),
    Value(Val),
}

/// Parameter binding in progress.
struct Binding {
    form: Val,
    func: Val,
    /// Index of the next parameter to bind.
    next: usize,
    pos: VecDeque<Val>,
    labeled: Vec<(Sym, Val)>,
}

enum Kont {
    /// Remaining forms of a `DO`.
    Do { form: Val, next: usize },
    Bind { form: Val, sym: Sym, mutable: bool },
    If { form: Val },
    Seq { form: Val, next: usize, vals: Vec<Val> },
    /// Remaining links of a chain literal.
    Chain { form: Val, rest: Val, vals: Vec<Val> },
    Callee { form: Val },
    Args {
        form: Val,
        func: Val,
        next: usize,
        pos: Vec<Val>,
        labeled: Vec<(Sym, Val)>,
        /// Label of the argument being evaluated.
        label: Option<Sym>,
    },
    /// Waiting for a parameter default.
    Default(Box<Binding>),
    /// Leave a closure body.
    Return { env: Val, name: Sym },
    /// Leave a `SCOPE`.
    Scope { env: Val },
}

impl Kont {
    fn form(&self) -> Option<&Val> {
        match self {
            Kont::Do { form, .. }
            | Kont::Bind { form, .. }
            | Kont::If { form }
            | Kont::Seq { form, .. }
            | Kont::Chain { form, .. }
            | Kont::Callee { form }
            | Kont::Args { form, .. } => Some(form),
            Kont::Default(binding) => Some(&binding.form),
            Kont::Return { .. } | Kont::Scope { .. } => None,
        }
    }
}

pub(super) struct Machine<'rt> {
    rt: &'rt mut Runtime,
    env: Val,
    stack: Vec<Kont>,
}

fn malformed(msg: impl Into<String>) -> EvalError {
    ErrorKind::Malformed(msg.into()).into()
}

impl<'rt> Machine<'rt> {
    pub(super) fn new(rt: &'rt mut Runtime, env: Val) -> Self {
        Machine {
            rt,
            env,
            stack: vec![],
        }
    }

    /// Run `code` to completion, returning its value and the environment
    /// left behind.
    pub(super) fn run(mut self, code: Val) -> Result<(Val, Val)> {
        let mut step = Step::Eval(code);
        loop {
            step = match step {
                Step::Eval(form) => match self.eval(&form) {
                    Ok(step) => step,
                    Err(e) => return Err(self.unwind(e.with_context(&form))),
                },
                Step::Value(val) => match self.stack.pop() {
                    None => return Ok((val, self.env)),
                    Some(k) => {
                        let form = k.form().cloned();
                        match self.resume(k, val) {
                            Ok(step) => step,
                            Err(mut e) => {
                                if let Some(form) = form {
                                    e = e.with_context(&form);
                                }
                                return Err(self.unwind(e));
                            }
                        }
                    }
                },
            }
        }
    }

    /// Apply a closure to already evaluated positional arguments.
    pub(super) fn apply(mut self, form: &Val, func: Val, args: Vec<Val>) -> Result<Val> {
        let step = match self.call(form.clone(), func, args, vec![]) {
            Ok(step) => step,
            Err(e) => return Err(self.unwind(e.with_context(form))),
        };
        let code = match step {
            Step::Value(val) => return Ok(val),
            Step::Eval(code) => code,
        };
        let (val, _) = self.run(code)?;
        Ok(val)
    }

    /// Collect context and trace from the abandoned continuations.
    fn unwind(&mut self, mut e: EvalError) -> EvalError {
        for k in self.stack.drain(..).rev() {
            match &k {
                Kont::Return { name, .. } => {
                    e = e.with_frame(self.rt.syms.name_lossy(*name).into_owned());
                }
                k => {
                    if let Some(form) = k.form() {
                        e = e.with_context(form);
                    }
                }
            }
        }
        e
    }

    fn name(&self, sym: Sym) -> String {
        self.rt.syms.name_lossy(sym).into_owned()
    }

    fn tail(&self) -> bool {
        matches!(self.stack.last(), Some(Kont::Return { .. }))
    }

    fn eval(&mut self, form: &Val) -> Result<Step> {
        if let Some(sym) = form.as_sym() {
            if sym.is_self_evaluating() {
                return Ok(Step::Value(form.clone()));
            }
            return match env::lookup(&self.env, sym) {
                Some(val) => Ok(Step::Value(val.clone())),
                None => Err(ErrorKind::Unbound(self.name(sym)).into()),
            };
        }
        match form.kind() {
            Some(Kind::Vec) => self.eval_vec(form),
            Some(Kind::Chain) => {
                let (first, rest) = match form.slots() {
                    Some([first, rest]) => (first.clone(), rest.clone()),
                    _ => return Err(malformed("broken chain link")),
                };
                self.stack.push(Kont::Chain {
                    form: form.clone(),
                    rest,
                    vals: vec![],
                });
                Ok(Step::Eval(first))
            }
            _ => Ok(Step::Value(form.clone())),
        }
    }

    fn eval_vec(&mut self, form: &Val) -> Result<Step> {
        let slots = form.vec_slots().unwrap_or_default();
        let head = match slots.first().and_then(Val::as_sym).and_then(Sym::special) {
            Some(head) => head,
            None => return Err(malformed("cannot run Vec")),
        };
        let args = &slots[1..];
        match head {
            Special::Quo => match args {
                [x] => Ok(Step::Value(x.clone())),
                _ => Err(malformed("QUO takes one form")),
            },
            Special::Do => self.next_do(form, 0),
            Special::Scope => match args {
                [body] => {
                    if !self.tail() {
                        self.stack.push(Kont::Scope {
                            env: self.env.clone(),
                        });
                    }
                    Ok(Step::Eval(body.clone()))
                }
                _ => Err(malformed("SCOPE takes one form")),
            },
            Special::Let | Special::Var => match args {
                [name, value] => {
                    let sym = match name.as_sym() {
                        Some(sym) if !sym.is_self_evaluating() => sym,
                        _ => return Err(malformed("cannot bind a non-symbol or special symbol")),
                    };
                    self.stack.push(Kont::Bind {
                        form: form.clone(),
                        sym,
                        mutable: head == Special::Var,
                    });
                    Ok(Step::Eval(value.clone()))
                }
                _ => Err(malformed("LET and VAR take a symbol and a form")),
            },
            Special::If => match args {
                [cond, _] | [cond, _, _] => {
                    self.stack.push(Kont::If { form: form.clone() });
                    Ok(Step::Eval(cond.clone()))
                }
                _ => Err(malformed("IF takes a condition and one or two branches")),
            },
            Special::Fn => match args {
                [name, is_macro, pars, body] => {
                    let name = name
                        .as_sym()
                        .ok_or_else(|| malformed("function name must be a symbol"))?;
                    let kind = if is_macro.is_special(Special::True) {
                        FuncKind::Macro
                    } else if is_macro.is_special(Special::False) {
                        FuncKind::Function
                    } else {
                        return Err(malformed("FN expects true or false for is-macro"));
                    };
                    let par_slots = pars
                        .vec_slots()
                        .ok_or_else(|| malformed("parameters must be a Vec"))?;
                    if let Some(bad) = par_slots.iter().find(|p| p.as_par().is_none()) {
                        return Err(malformed(format!("not a parameter: {}", self.rt.repr(bad))));
                    }
                    if par_slots
                        .iter()
                        .filter_map(Val::as_par)
                        .filter(|p| p.kind == ParKind::Variadic)
                        .count()
                        > 1
                    {
                        return Err(malformed("at most one variadic parameter is allowed"));
                    }
                    let func = Val::func(kind, name, pars.clone(), body.clone(), self.env.clone());
                    Ok(Step::Value(func))
                }
                _ => Err(malformed("FN takes a name, is-macro, parameters and a body")),
            },
            Special::Seq => match args.first() {
                None => Ok(Step::Value(Val::vec(vec![]))),
                Some(first) => {
                    self.stack.push(Kont::Seq {
                        form: form.clone(),
                        next: 2,
                        vals: Vec::with_capacity(args.len()),
                    });
                    Ok(Step::Eval(first.clone()))
                }
            },
            Special::Call => match args.first() {
                None => Err(malformed("CALL needs a callee")),
                Some(callee) => {
                    self.stack.push(Kont::Callee { form: form.clone() });
                    Ok(Step::Eval(callee.clone()))
                }
            },
            Special::Expand => Err(malformed("EXPAND outside of macro expansion")),
            Special::Qua | Special::Unq => Err(malformed("quasiquote outside of macro expansion")),
            _ => Err(malformed("cannot run Vec")),
        }
    }

    /// Evaluate form `next` of a `DO`. The last form runs in the `DO`'s
    /// position, so it inherits tail position.
    fn next_do(&mut self, form: &Val, next: usize) -> Result<Step> {
        let forms = form.form_args(Special::Do).unwrap_or_default();
        match forms.len() - next {
            0 => Ok(Step::Value(Val::void())),
            1 => Ok(Step::Eval(forms[next].clone())),
            _ => {
                self.stack.push(Kont::Do {
                    form: form.clone(),
                    next: next + 1,
                });
                Ok(Step::Eval(forms[next].clone()))
            }
        }
    }

    fn resume(&mut self, k: Kont, val: Val) -> Result<Step> {
        match k {
            Kont::Do { form, next } => self.next_do(&form, next),
            Kont::Bind { sym, mutable, .. } => {
                if env::bound_in_frame(&self.env, sym) == Some(false) {
                    return Err(ErrorKind::AlreadyBound(self.name(sym)).into());
                }
                self.env = env::bind(&self.env, sym, val.clone(), mutable);
                Ok(Step::Value(val))
            }
            Kont::If { form } => {
                let branches = form.form_args(Special::If).unwrap_or_default();
                let branch = if val.is_truthy() {
                    branches.get(1)
                } else {
                    branches.get(2)
                };
                Ok(match branch {
                    Some(branch) => Step::Eval(branch.clone()),
                    None => Step::Value(Val::void()),
                })
            }
            Kont::Seq {
                form,
                next,
                mut vals,
            } => {
                vals.push(val);
                let slots = form.vec_slots().unwrap_or_default();
                match slots.get(next) {
                    None => Ok(Step::Value(Val::vec(vals))),
                    Some(elem) => {
                        let elem = elem.clone();
                        self.stack.push(Kont::Seq {
                            form,
                            next: next + 1,
                            vals,
                        });
                        Ok(Step::Eval(elem))
                    }
                }
            }
            Kont::Chain {
                form,
                rest,
                mut vals,
            } => {
                vals.push(val);
                match rest.slots() {
                    Some([elem, next]) if rest.is_kind(Kind::Chain) => {
                        let (elem, next) = (elem.clone(), next.clone());
                        self.stack.push(Kont::Chain {
                            form,
                            rest: next,
                            vals,
                        });
                        Ok(Step::Eval(elem))
                    }
                    _ => Ok(Step::Value(Val::chain(vals))),
                }
            }
            Kont::Callee { form } => {
                match val.as_func() {
                    Some(func) if func.kind == FuncKind::Macro => {
                        return Err(ErrorKind::NotCallable(format!(
                            "macro {} can only be used in <...>",
                            self.name(func.name)
                        ))
                        .into())
                    }
                    Some(_) => {}
                    None if val.as_host_func().is_some() => {}
                    None => return Err(ErrorKind::NotCallable(self.rt.repr(&val).to_string()).into()),
                }
                self.next_arg(form, val, 2, vec![], vec![])
            }
            Kont::Args {
                form,
                func,
                next,
                mut pos,
                mut labeled,
                label,
            } => {
                match label {
                    Some(label) => labeled.push((label, val)),
                    None => pos.push(val),
                }
                self.next_arg(form, func, next, pos, labeled)
            }
            Kont::Default(mut binding) => {
                self.bind_par(&binding, val)?;
                binding.next += 1;
                self.bind_pars(*binding)
            }
            Kont::Return { env, .. } | Kont::Scope { env } => {
                self.env = env;
                Ok(Step::Value(val))
            }
        }
    }

    /// Evaluate argument slot `next` of a `CALL` form, or make the call once
    /// all are done. Call-site labels `-name=expr` are passed by name.
    fn next_arg(
        &mut self,
        form: Val,
        func: Val,
        next: usize,
        pos: Vec<Val>,
        labeled: Vec<(Sym, Val)>,
    ) -> Result<Step> {
        let arg = match form.vec_slots().unwrap_or_default().get(next) {
            Some(arg) => arg.clone(),
            None => return self.call(form, func, pos, labeled),
        };
        let (label, expr) = match arg.as_par() {
            Some(par) if par.kind == ParKind::Label => (Some(par.name), par.default.clone()),
            _ => (None, arg.clone()),
        };
        self.stack.push(Kont::Args {
            form,
            func,
            next: next + 1,
            pos,
            labeled,
            label,
        });
        Ok(Step::Eval(expr))
    }

    fn call(&mut self, form: Val, func: Val, pos: Vec<Val>, labeled: Vec<(Sym, Val)>) -> Result<Step> {
        if let Some(host) = func.as_host_func() {
            let callee = self.name(host.name);
            if !labeled.is_empty() {
                return Err(ErrorKind::Arity {
                    callee,
                    problem: "host functions take no labeled arguments".into(),
                }
                .into());
            }
            host.arity
                .check(pos.len())
                .map_err(|problem| ErrorKind::Arity { callee, problem })?;
            let f = host.f;
            tracing::trace!(target: "knot_vm::eval", name = %self.name(host.name), "host call");
            let outer = self.rt.caller.replace(self.env.clone());
            let res = f(self.rt, pos);
            self.rt.caller = outer;
            return res.map(Step::Value);
        }
        let (name, fenv) = match func.as_func() {
            Some(f) => (f.name, f.env.clone()),
            None => return Err(ErrorKind::NotCallable(self.rt.repr(&func).to_string()).into()),
        };
        if !self.tail() {
            let env = std::mem::replace(&mut self.env, env::empty());
            self.stack.push(Kont::Return { env, name });
        }
        let callee_env = env::frame(&fenv, name);
        self.env = env::bind(&callee_env, Special::SelfRef.sym(), func.clone(), false);
        self.bind_pars(Binding {
            form,
            func,
            next: 0,
            pos: pos.into(),
            labeled,
        })
    }

    /// Bind parameters from `binding.next` on, then run the body.
    fn bind_pars(&mut self, mut binding: Binding) -> Result<Step> {
        loop {
            let (par, body) = match binding.func.as_func() {
                Some(f) => (
                    f.pars.vec_slots().unwrap_or_default().get(binding.next).cloned(),
                    f.body.clone(),
                ),
                None => return Err(malformed("not a closure")),
            };
            let par = match par {
                Some(par) => par,
                None => {
                    self.check_leftovers(&binding)?;
                    return Ok(Step::Eval(body));
                }
            };
            let p = par.as_par().ok_or_else(|| malformed("not a parameter"))?;
            let val = match p.kind {
                ParKind::Variadic => Val::vec(binding.pos.drain(..).collect()),
                ParKind::Label => {
                    if let Some(i) = binding.labeled.iter().position(|(s, _)| *s == p.name) {
                        binding.labeled.remove(i).1
                    } else if let Some(val) = binding.pos.pop_front() {
                        val
                    } else if p.has_default() {
                        let default = p.default.clone();
                        self.stack.push(Kont::Default(Box::new(binding)));
                        return Ok(Step::Eval(default));
                    } else {
                        let callee = self.func_name(&binding.func);
                        return Err(ErrorKind::Arity {
                            callee,
                            problem: format!("missing argument for parameter {}", self.name(p.name)),
                        }
                        .into());
                    }
                }
            };
            self.bind_par(&binding, val)?;
            binding.next += 1;
        }
    }

    fn bind_par(&mut self, binding: &Binding, val: Val) -> Result<()> {
        let name = binding
            .func
            .as_func()
            .and_then(|f| f.pars.vec_slots()?.get(binding.next)?.as_par())
            .map(|p| p.name)
            .ok_or_else(|| malformed("not a parameter"))?;
        self.env = env::bind(&self.env, name, val, false);
        Ok(())
    }

    fn check_leftovers(&self, binding: &Binding) -> Result<()> {
        let callee = self.func_name(&binding.func);
        if !binding.pos.is_empty() {
            return Err(ErrorKind::Arity {
                callee,
                problem: format!("{} too many arguments", binding.pos.len()),
            }
            .into());
        }
        if let Some((label, _)) = binding.labeled.first() {
            return Err(ErrorKind::Arity {
                callee,
                problem: format!("no parameter named {}", self.name(*label)),
            }
            .into());
        }
        Ok(())
    }

    fn func_name(&self, func: &Val) -> String {
        func.as_func().map_or_else(String::new, |f| self.name(f.name))
    }
}
