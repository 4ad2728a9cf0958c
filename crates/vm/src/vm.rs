//! The runtime: symbol table, top-level environment and the entry points to
//! expand, run and print code.

mod eval;
mod expand;
#[cfg(test)]
mod test;

use crate::env;
use crate::error::Result;
use crate::host;
use crate::print::Repr;
use crate::sym::{Special, Sym, SymbolTable};
use crate::value::Val;

use eval::Machine;

/// One interpreter instance.
///
/// Several runtimes may live on one thread; they share the thread's heap but
/// nothing else.
pub struct Runtime {
    syms: SymbolTable,
    env: Val,
    /// Environment of the host call in progress, if any.
    caller: Option<Val>,
}

impl Runtime {
    pub fn new() -> Self {
        let mut syms = SymbolTable::new();
        let host_frame = syms.intern_str("<host>");
        let main_frame = syms.intern_str("<main>");
        let env = env::frame(&env::empty(), host_frame);
        let env = host::install(&mut syms, &env);
        let env = env::frame(&env, main_frame);
        Runtime {
            syms,
            env,
            caller: None,
        }
    }

    pub fn syms(&self) -> &SymbolTable {
        &self.syms
    }

    pub fn syms_mut(&mut self) -> &mut SymbolTable {
        &mut self.syms
    }

    pub fn intern(&mut self, name: &str) -> Sym {
        self.syms.intern_str(name)
    }

    /// The top-level environment.
    pub fn env(&self) -> &Val {
        &self.env
    }

    /// The environment a host function was called from, or the top-level
    /// environment outside of host calls.
    pub fn caller_env(&self) -> &Val {
        self.caller.as_ref().unwrap_or(&self.env)
    }

    /// Look up a name in the top-level environment.
    pub fn lookup(&self, name: &str) -> Option<&Val> {
        let sym = self.syms.get(name.as_bytes())?;
        env::lookup(&self.env, sym)
    }

    pub fn repr<'a>(&'a self, val: &'a Val) -> Repr<'a> {
        Repr::new(&self.syms, val)
    }

    /// Expand and run `code` at top level.
    ///
    /// The forms of a top-level `DO` are expanded and run one at a time, so a
    /// macro defined by one form can be used by the next. Bindings made at
    /// top level stay in the runtime's environment.
    pub fn eval(&mut self, code: &Val) -> Result<Val> {
        match code.form_args(Special::Do) {
            Some(forms) => {
                let mut result = Val::void();
                for form in forms {
                    result = self.eval_form(form)?;
                }
                Ok(result)
            }
            None => self.eval_form(code),
        }
    }

    /// Expand and run a single top-level form, keeping its bindings.
    pub fn eval_form(&mut self, form: &Val) -> Result<Val> {
        let env = self.env.clone();
        let code = self.expand(&env, form)?;
        let (val, env) = Machine::new(self, env).run(code)?;
        self.env = env;
        Ok(val)
    }

    /// Expand and run `code` in `env`. Bindings made by `code` are discarded.
    pub fn eval_in(&mut self, env: &Val, code: &Val) -> Result<Val> {
        let code = self.expand(env, code)?;
        let (val, _) = Machine::new(self, env.clone()).run(code)?;
        Ok(val)
    }

    /// Run already expanded code in `env`.
    pub fn run_expanded(&mut self, env: &Val, code: Val) -> Result<Val> {
        let (val, _) = Machine::new(self, env.clone()).run(code)?;
        Ok(val)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
