//! Host functions and the primitives every runtime starts with.

use std::fmt;

use crate::env;
use crate::error::{DataError, ErrorKind, Result};
use crate::file::Handle;
use crate::gc::{alloc, Header, Kind};
use crate::sym::{Special, Sym, SymbolTable};
use crate::value::{FuncKind, ParKind, Tag, Val};
use crate::vm::Runtime;

/// Signature of a native function. Arguments arrive evaluated and owned.
pub type HostFn = fn(&mut Runtime, Vec<Val>) -> Result<Val>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic,
}

impl Arity {
    pub fn check(self, got: usize) -> std::result::Result<(), String> {
        match self {
            Arity::Fixed(n) if n != got => Err(format!(
                "expected {} argument{}, got {}",
                n,
                if n == 1 { "" } else { "s" },
                got
            )),
            _ => Ok(()),
        }
    }
}

/// Body of a `HostFunc` object.
pub struct HostFuncBody {
    pub name: Sym,
    pub arity: Arity,
    pub f: HostFn,
}

impl fmt::Debug for HostFuncBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFuncBody")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl Val {
    pub fn host_func(name: Sym, arity: Arity, f: HostFn) -> Val {
        let ptr = alloc::allocate(std::mem::size_of::<HostFuncBody>(), Kind::HostFunc);
        unsafe {
            (Header::body(ptr) as *mut HostFuncBody).write(HostFuncBody { name, arity, f });
            Val::from_header(ptr)
        }
    }

    pub fn as_host_func(&self) -> Option<&HostFuncBody> {
        if self.is_kind(Kind::HostFunc) {
            let ptr = self.header_ptr()?;
            Some(unsafe { &*(Header::body(ptr) as *const HostFuncBody) })
        } else {
            None
        }
    }
}

const PRIMITIVES: &[(&str, Arity, HostFn)] = &[
    ("identity", Arity::Fixed(1), identity),
    ("is-true", Arity::Fixed(1), is_true),
    ("not", Arity::Fixed(1), not),
    ("ineg", Arity::Fixed(1), ineg),
    ("iabs", Arity::Fixed(1), iabs),
    ("iadd", Arity::Fixed(2), iadd),
    ("isub", Arity::Fixed(2), isub),
    ("imul", Arity::Fixed(2), imul),
    ("idiv", Arity::Fixed(2), idiv),
    ("imod", Arity::Fixed(2), imod),
    ("ipow", Arity::Fixed(2), ipow),
    ("ishl", Arity::Fixed(2), ishl),
    ("ishr", Arity::Fixed(2), ishr),
    ("ieq", Arity::Fixed(2), ieq),
    ("ine", Arity::Fixed(2), ine),
    ("ilt", Arity::Fixed(2), ilt),
    ("igt", Arity::Fixed(2), igt),
    ("ile", Arity::Fixed(2), ile),
    ("ige", Arity::Fixed(2), ige),
    ("sym-eq", Arity::Fixed(2), sym_eq),
    ("Vec", Arity::Variadic, vec),
    ("Chain", Arity::Variadic, chain),
    ("len", Arity::Fixed(1), len),
    ("el", Arity::Fixed(2), el),
    ("slice", Arity::Fixed(3), slice),
    ("prepend", Arity::Fixed(2), prepend),
    ("append", Arity::Fixed(2), append),
    ("par", Arity::Fixed(4), par),
    ("raw-write", Arity::Fixed(2), raw_write),
    ("raw-write-repr", Arity::Fixed(2), raw_write_repr),
    ("raw-flush", Arity::Fixed(1), raw_flush),
    ("raw-read", Arity::Fixed(1), raw_read),
    ("exit", Arity::Fixed(1), exit),
    ("error", Arity::Fixed(1), error),
    ("run", Arity::Fixed(1), run),
    ("expand", Arity::Fixed(1), expand),
    ("type-sym", Arity::Fixed(1), type_sym),
    ("data-from-path", Arity::Fixed(1), data_from_path),
];

/// Bind the primitives and the standard files on top of `env`.
pub(crate) fn install(syms: &mut SymbolTable, env: &Val) -> Val {
    let mut env = env.clone();
    for &(name, arity, f) in PRIMITIVES {
        let sym = syms.intern_str(name);
        env = env::bind(&env, sym, Val::host_func(sym, arity, f), false);
    }
    let files = [
        ("std-in", Handle::Stdin, true, false),
        ("std-out", Handle::Stdout, false, true),
        ("std-err", Handle::Stderr, false, true),
    ];
    for (name, handle, readable, writable) in files {
        let sym = syms.intern_str(name);
        env = env::bind(&env, sym, Val::file(sym, handle, readable, writable), false);
    }
    tracing::debug!(count = PRIMITIVES.len(), "installed host primitives");
    env
}

// === Argument helpers ===

fn type_error(rt: &Runtime, context: &str, expected: &'static str, got: &Val) -> ErrorKind {
    ErrorKind::Type {
        context: context.to_owned(),
        expected,
        got: rt.repr(got).to_string(),
    }
}

fn int(rt: &Runtime, context: &str, val: &Val) -> Result<i64> {
    val.as_int()
        .ok_or_else(|| type_error(rt, context, "Int", val).into())
}

fn ints<const N: usize>(rt: &Runtime, context: &str, args: &[Val]) -> Result<[i64; N]> {
    let mut out = [0; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = int(rt, context, arg)?;
    }
    Ok(out)
}

fn checked(context: &'static str, result: Option<i64>) -> Result<Val> {
    result
        .and_then(Val::try_int)
        .ok_or_else(|| ErrorKind::Overflow(context).into())
}

fn first(args: Vec<Val>) -> Val {
    args.into_iter().next().unwrap_or_else(Val::void)
}

// === Logic ===

fn identity(_: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    Ok(first(args))
}

fn is_true(_: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    Ok(Val::bool(first(args).is_truthy()))
}

fn not(_: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    Ok(Val::bool(!first(args).is_truthy()))
}

// === Integers ===

fn ineg(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let [a] = ints(rt, "ineg", &args)?;
    checked("ineg", a.checked_neg())
}

fn iabs(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let [a] = ints(rt, "iabs", &args)?;
    checked("iabs", a.checked_abs())
}

fn iadd(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let [a, b] = ints(rt, "iadd", &args)?;
    checked("iadd", a.checked_add(b))
}

fn isub(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let [a, b] = ints(rt, "isub", &args)?;
    checked("isub", a.checked_sub(b))
}

fn imul(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let [a, b] = ints(rt, "imul", &args)?;
    checked("imul", a.checked_mul(b))
}

fn idiv(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let [a, b] = ints(rt, "idiv", &args)?;
    if b == 0 {
        return Err(ErrorKind::DivisionByZero("idiv").into());
    }
    checked("idiv", a.checked_div(b))
}

fn imod(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let [a, b] = ints(rt, "imod", &args)?;
    if b == 0 {
        return Err(ErrorKind::DivisionByZero("imod").into());
    }
    checked("imod", a.checked_rem(b))
}

fn ipow(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let [a, b] = ints(rt, "ipow", &args)?;
    let exp = u32::try_from(b).map_err(|_| type_error(rt, "ipow", "non-negative exponent", &args[1]))?;
    checked("ipow", a.checked_pow(exp))
}

fn ishl(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let [a, b] = ints(rt, "ishl", &args)?;
    let shift = u32::try_from(b).map_err(|_| type_error(rt, "ishl", "non-negative shift", &args[1]))?;
    let shifted = a.checked_shl(shift).filter(|r| r >> shift == a);
    checked("ishl", shifted)
}

fn ishr(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let [a, b] = ints(rt, "ishr", &args)?;
    let shift = u32::try_from(b).map_err(|_| type_error(rt, "ishr", "non-negative shift", &args[1]))?;
    // shifting everything out leaves the sign
    Ok(Val::int(a >> shift.min(63)))
}

macro_rules! comparison {
    ($name:ident, $op:tt) => {
        fn $name(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
            let [a, b] = ints(rt, stringify!($name), &args)?;
            Ok(Val::bool(a $op b))
        }
    };
}

comparison!(ieq, ==);
comparison!(ine, !=);
comparison!(ilt, <);
comparison!(igt, >);
comparison!(ile, <=);
comparison!(ige, >=);

fn sym_eq(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    match (args[0].as_sym(), args[1].as_sym()) {
        (Some(a), Some(b)) => Ok(Val::bool(a == b)),
        (None, _) => Err(type_error(rt, "sym-eq", "Sym", &args[0]).into()),
        (_, None) => Err(type_error(rt, "sym-eq", "Sym", &args[1]).into()),
    }
}

// === Data ===

fn vec(_: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    Ok(Val::vec(args))
}

fn chain(_: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    Ok(Val::chain(args))
}

fn len(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    match args[0].len() {
        Some(n) => Ok(Val::int(n as i64)),
        None => Err(type_error(rt, "len", "Vec, Chain or Data", &args[0]).into()),
    }
}

fn el(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let index = int(rt, "el", &args[1])?;
    let index = usize::try_from(index).map_err(|_| DataError::OutOfBounds {
        index,
        len: args[0].len().unwrap_or(0),
    })?;
    Ok(args[0].el(index)?.clone())
}

fn slice(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let [from, to] = ints(rt, "slice", &args[1..])?;
    Ok(args[0].slice(from, to)?)
}

fn prepend(_: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let mut args = args.into_iter();
    let (target, val) = (first_of(&mut args), first_of(&mut args));
    Ok(target.prepend(val)?)
}

fn append(_: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let mut args = args.into_iter();
    let (target, val) = (first_of(&mut args), first_of(&mut args));
    Ok(target.append(val)?)
}

/// `(par kind name type default)` builds a parameter record. `kind` is
/// `Label` or `Variadic`.
pub(crate) fn par(rt: &mut Runtime, mut args: Vec<Val>) -> Result<Val> {
    let kind = match args[0].as_sym().map(|s| rt.syms().name_lossy(s)) {
        Some(name) if name == "Label" => ParKind::Label,
        Some(name) if name == "Variadic" => ParKind::Variadic,
        _ => return Err(type_error(rt, "par", "Label or Variadic", &args[0]).into()),
    };
    let name = args[1]
        .as_sym()
        .ok_or_else(|| type_error(rt, "par", "Sym", &args[1]))?;
    let default = first_of(&mut args.drain(3..));
    let ty = first_of(&mut args.drain(2..));
    Ok(Val::par(kind, name, ty, default))
}

fn first_of(args: &mut impl Iterator<Item = Val>) -> Val {
    args.next().unwrap_or_else(Val::void)
}

// === Files ===

fn file_arg<'a>(rt: &Runtime, context: &str, val: &'a Val) -> Result<&'a crate::file::FileBody> {
    val.as_file()
        .ok_or_else(|| type_error(rt, context, "File", val).into())
}

fn raw_write(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let file = file_arg(rt, "raw-write", &args[0])?;
    let bytes = args[1]
        .data_bytes()
        .ok_or_else(|| type_error(rt, "raw-write", "Data", &args[1]))?;
    file.write_all(&bytes)?;
    Ok(Val::void())
}

fn raw_write_repr(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let file = file_arg(rt, "raw-write-repr", &args[0])?;
    let text = rt.repr(&args[1]).to_string();
    file.write_all(text.as_bytes())?;
    Ok(Val::void())
}

fn raw_flush(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    file_arg(rt, "raw-flush", &args[0])?.flush()?;
    Ok(Val::void())
}

/// Read everything left in a file.
fn raw_read(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let bytes = file_arg(rt, "raw-read", &args[0])?.read_to_end()?;
    Ok(Val::data(&bytes))
}

fn data_from_path(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let bytes = args[0]
        .data_bytes()
        .ok_or_else(|| type_error(rt, "data-from-path", "Data", &args[0]))?;
    let path = String::from_utf8_lossy(&bytes).into_owned();
    Ok(Val::data_from_path(path)?)
}

// === Control ===

fn exit(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let status = int(rt, "exit", &args[0])?;
    let status = i32::try_from(status).map_err(|_| ErrorKind::Overflow("exit"))?;
    Err(ErrorKind::Exit(status).into())
}

fn error(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let message = match args[0].data_bytes() {
        Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        None => rt.repr(&args[0]).to_string(),
    };
    Err(ErrorKind::Raised(message).into())
}

/// Runs in the caller's environment; bindings made by the code are dropped.
fn run(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let env = rt.caller_env().clone();
    rt.eval_in(&env, &args[0])
}

fn expand(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let env = rt.caller_env().clone();
    rt.expand(&env, &args[0])
}

fn type_sym(rt: &mut Runtime, args: Vec<Val>) -> Result<Val> {
    let val = &args[0];
    let name = match val.tag() {
        Tag::Int => "Int",
        Tag::DataWord => "Data",
        Tag::Sym if val.is_special(Special::Vec0) => "Vec",
        Tag::Sym if val.is_special(Special::Chain0) => "Chain",
        Tag::Sym => "Sym",
        Tag::Managed => "Managed",
        Tag::Ref => match val.as_func() {
            Some(func) if func.kind == FuncKind::Macro => "Macro",
            _ => val.kind().map_or("Deallocated", Kind::name),
        },
    };
    Ok(Val::sym(rt.intern(name)))
}
