//! Runtime tests on hand-built code. Parsing is tested in `knot-syn`.

use pretty_assertions::assert_eq;
use test_log::test;

use super::Runtime;
use crate::error::ErrorKind;
use crate::sym::Special;
use crate::value::{ParKind, Val};

fn s(rt: &mut Runtime, name: &str) -> Val {
    Val::sym(rt.intern(name))
}

fn form(head: Special, args: Vec<Val>) -> Val {
    let mut slots = vec![Val::special(head)];
    slots.extend(args);
    Val::vec(slots)
}

fn call(rt: &mut Runtime, f: &str, args: Vec<Val>) -> Val {
    let mut slots = vec![s(rt, f)];
    slots.extend(args);
    form(Special::Call, slots)
}

fn let_(rt: &mut Runtime, name: &str, val: Val) -> Val {
    let name = s(rt, name);
    form(Special::Let, vec![name, val])
}

fn par(rt: &mut Runtime, name: &str, default: Option<Val>) -> Val {
    let name = rt.intern(name);
    Val::par(ParKind::Label, name, Val::void(), default.unwrap_or_else(Val::void))
}

fn func(rt: &mut Runtime, name: &str, is_macro: bool, pars: Vec<Val>, body: Val) -> Val {
    let name = s(rt, name);
    form(Special::Fn, vec![name, Val::bool(is_macro), Val::vec(pars), body])
}

fn int(i: i64) -> Val {
    Val::int(i)
}

#[test]
fn test_host_call() {
    let mut rt = Runtime::new();
    let code = call(&mut rt, "iadd", vec![int(1), int(2)]);
    assert_eq!(rt.eval(&code).unwrap(), int(3));
}

#[test]
fn test_self_evaluating() {
    let mut rt = Runtime::new();
    for v in [int(7), Val::data(b"text"), Val::void(), Val::special(Special::Vec0)] {
        assert_eq!(rt.eval(&v).unwrap(), v);
    }
    let quoted = s(&mut rt, "anything");
    let code = form(Special::Quo, vec![quoted.clone()]);
    assert_eq!(rt.eval(&code).unwrap(), quoted);
}

#[test]
fn test_top_level_bindings_persist() {
    let mut rt = Runtime::new();
    let bind = let_(&mut rt, "x", int(5));
    let x = s(&mut rt, "x");
    let use_x = call(&mut rt, "iadd", vec![x, int(1)]);
    assert_eq!(rt.eval(&form(Special::Do, vec![bind, use_x])).unwrap(), int(6));
    assert_eq!(rt.lookup("x"), Some(&int(5)));
}

#[test]
fn test_let_rebinding() {
    let mut rt = Runtime::new();
    let first = let_(&mut rt, "x", int(1));
    let second = let_(&mut rt, "x", int(2));
    let err = rt.eval(&form(Special::Do, vec![first, second])).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::AlreadyBound(ref name) if name == "x"), "{:?}", err);

    let y = s(&mut rt, "y");
    let var = form(Special::Var, vec![y.clone(), int(1)]);
    let rebind = let_(&mut rt, "y", int(2));
    assert_eq!(rt.eval(&form(Special::Do, vec![var, rebind, y])).unwrap(), int(2));
}

#[test]
fn test_closure_parameters_are_local() {
    let mut rt = Runtime::new();
    let pars = vec![par(&mut rt, "a", None), par(&mut rt, "b", None)];
    let (a, b) = (s(&mut rt, "a"), s(&mut rt, "b"));
    let body = call(&mut rt, "iadd", vec![a.clone(), b]);
    let f = func(&mut rt, "add", false, pars, body);
    let define = let_(&mut rt, "add", f);
    let use_it = call(&mut rt, "add", vec![int(1), int(2)]);
    assert_eq!(rt.eval(&form(Special::Do, vec![define, use_it])).unwrap(), int(3));

    let err = rt.eval(&a).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Unbound(_)));
}

#[test]
fn test_labels_defaults_and_variadics() {
    let mut rt = Runtime::new();
    let pars = vec![par(&mut rt, "a", None), par(&mut rt, "b", Some(int(10)))];
    let (a, b) = (s(&mut rt, "a"), s(&mut rt, "b"));
    let body = call(&mut rt, "isub", vec![a, b]);
    let f = func(&mut rt, "f", false, pars, body);
    let define = let_(&mut rt, "f", f);
    rt.eval(&define).unwrap();

    let defaulted = call(&mut rt, "f", vec![int(1)]);
    assert_eq!(rt.eval(&defaulted).unwrap(), int(-9));

    let label = par(&mut rt, "b", Some(int(1)));
    let labeled = call(&mut rt, "f", vec![label, int(5)]);
    assert_eq!(rt.eval(&labeled).unwrap(), int(4));

    let rest = rt.intern("rest");
    let variadic = Val::par(ParKind::Variadic, rest, Val::void(), Val::void());
    let first = par(&mut rt, "first", None);
    let body = Val::sym(rest);
    let g = func(&mut rt, "g", false, vec![first, variadic], body);
    let define = let_(&mut rt, "g", g);
    rt.eval(&define).unwrap();
    let collected = call(&mut rt, "g", vec![int(1), int(2), int(3)]);
    assert_eq!(rt.eval(&collected).unwrap(), Val::vec(vec![int(2), int(3)]));
}

#[test]
fn test_arity_errors() {
    let mut rt = Runtime::new();
    let pars = vec![par(&mut rt, "a", None)];
    let f = func(&mut rt, "one", false, pars, int(0));
    let define = let_(&mut rt, "one", f);
    rt.eval(&define).unwrap();

    let too_many = call(&mut rt, "one", vec![int(1), int(2)]);
    let err = rt.eval(&too_many).unwrap_err();
    assert_eq!(err.to_string(), "one: 1 too many arguments");

    let missing = call(&mut rt, "one", vec![]);
    let err = rt.eval(&missing).unwrap_err();
    assert_eq!(err.to_string(), "one: missing argument for parameter a");

    let host = call(&mut rt, "iadd", vec![int(1)]);
    let err = rt.eval(&host).unwrap_err();
    assert_eq!(err.to_string(), "iadd: expected 2 arguments, got 1");
}

#[test]
fn test_tail_calls_run_in_constant_stack() {
    let mut rt = Runtime::new();
    let pars = vec![par(&mut rt, "n", None)];
    let n = s(&mut rt, "n");
    let dec = call(&mut rt, "isub", vec![n.clone(), int(1)]);
    let again = call(&mut rt, "self", vec![dec]);
    let done = form(Special::Quo, vec![s(&mut rt, "done")]);
    let body = form(Special::If, vec![n, again, done.clone()]);
    let f = func(&mut rt, "countdown", false, pars, body);
    let define = let_(&mut rt, "countdown", f);
    rt.eval(&define).unwrap();

    let code = call(&mut rt, "countdown", vec![int(200_000)]);
    assert_eq!(rt.eval(&code).unwrap(), s(&mut rt, "done"));
}

#[test]
fn test_long_do() {
    let mut rt = Runtime::new();
    let forms = (0..100_000).map(int).collect();
    let inner = form(Special::Do, forms);
    let code = form(Special::Scope, vec![inner]);
    assert_eq!(rt.eval(&code).unwrap(), int(99_999));
}

#[test]
fn test_scope_seals_bindings() {
    let mut rt = Runtime::new();
    let inner = let_(&mut rt, "hidden", int(1));
    let sealed = form(Special::Scope, vec![inner]);
    assert_eq!(rt.eval(&sealed).unwrap(), int(1));
    assert!(rt.lookup("hidden").is_none());
}

#[test]
fn test_chain_and_seq_literals() {
    let mut rt = Runtime::new();
    let sum = call(&mut rt, "iadd", vec![int(1), int(1)]);
    let chain = Val::chain(vec![int(1), sum.clone()]);
    assert_eq!(rt.eval(&chain).unwrap(), Val::chain(vec![int(1), int(2)]));

    let seq = form(Special::Seq, vec![sum, int(3)]);
    assert_eq!(rt.eval(&seq).unwrap(), Val::vec(vec![int(2), int(3)]));
}

#[test]
fn test_quasiquote() {
    let mut rt = Runtime::new();
    let env = rt.env().clone();
    let (a, b) = (s(&mut rt, "a"), s(&mut rt, "b"));
    let plain = Val::vec(vec![a.clone(), b.clone()]);
    let qua = form(Special::Qua, vec![plain.clone()]);
    let expanded = rt.expand(&env, &qua).unwrap();
    assert_eq!(expanded, form(Special::Quo, vec![plain.clone()]));
    assert_eq!(rt.eval(&qua).unwrap(), plain);

    let sum = call(&mut rt, "iadd", vec![int(1), int(2)]);
    let unq = form(Special::Unq, vec![sum]);
    let mixed = Val::vec(vec![a.clone(), unq, Val::chain(vec![b.clone()])]);
    let qua = form(Special::Qua, vec![mixed]);
    assert_eq!(
        rt.eval(&qua).unwrap(),
        Val::vec(vec![a, int(3), Val::chain(vec![b])])
    );
}

#[test]
fn test_nested_quasiquote_keeps_inner_unquote() {
    let mut rt = Runtime::new();
    let x = s(&mut rt, "x");
    let inner = form(Special::Qua, vec![form(Special::Unq, vec![x])]);
    let code = form(Special::Qua, vec![inner.clone()]);
    assert_eq!(rt.eval(&code).unwrap(), inner);
}

#[test]
fn test_macro_expansion() {
    let mut rt = Runtime::new();
    // swap: <swap f a b> becomes (f b a)
    let pars = vec![par(&mut rt, "f", None), par(&mut rt, "a", None), par(&mut rt, "b", None)];
    let (f, a, b) = (s(&mut rt, "f"), s(&mut rt, "a"), s(&mut rt, "b"));
    let template = form(
        Special::Call,
        vec![
            form(Special::Unq, vec![f]),
            form(Special::Unq, vec![b]),
            form(Special::Unq, vec![a]),
        ],
    );
    let body = form(Special::Qua, vec![template]);
    let m = func(&mut rt, "swap", true, pars, body);
    let define = let_(&mut rt, "swap", m);
    rt.eval(&define).unwrap();

    let isub = s(&mut rt, "isub");
    let swap = s(&mut rt, "swap");
    let inner = form(Special::Expand, vec![swap.clone(), isub.clone(), int(1), int(10)]);
    let outer = form(Special::Expand, vec![swap, isub, inner, int(100)]);

    let env = rt.env().clone();
    let expanded = rt.expand(&env, &outer).unwrap();
    assert_eq!(rt.repr(&expanded).to_string(), "(isub 100 (isub 10 1))");
    assert_eq!(rt.eval(&outer).unwrap(), int(91));
}

#[test]
fn test_macros_are_not_callable() {
    let mut rt = Runtime::new();
    let m = func(&mut rt, "m", true, vec![], int(1));
    let define = let_(&mut rt, "m", m);
    rt.eval(&define).unwrap();
    let code = call(&mut rt, "m", vec![]);
    let err = rt.eval(&code).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NotCallable(_)));

    let code = call(&mut rt, "identity", vec![]);
    let err = rt.eval(&code).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Arity { .. }));

    let not_fn = form(Special::Call, vec![int(1)]);
    let err = rt.eval(&not_fn).unwrap_err();
    assert_eq!(err.to_string(), "object is not callable: 1");
}

#[test]
fn test_error_trace_and_context() {
    let mut rt = Runtime::new();
    let missing = s(&mut rt, "missing");
    let body = call(&mut rt, "iadd", vec![missing.clone(), int(1)]);
    let f = func(&mut rt, "broken", false, vec![], body);
    let define = let_(&mut rt, "broken", f);
    rt.eval(&define).unwrap();

    let inner = call(&mut rt, "broken", vec![]);
    let code = call(&mut rt, "identity", vec![inner]);
    let err = rt.eval(&code).unwrap_err();
    assert_eq!(err.to_string(), "lookup error: missing");
    assert_eq!(err.trace, vec!["broken".to_owned()]);
    assert!(err.context[0].same(&missing) || err.context[0] == missing);
    assert!(err.context.iter().any(|c| c.same(&code)));
}

#[test]
fn test_plain_vec_cannot_run() {
    let mut rt = Runtime::new();
    let err = rt.eval(&Val::vec(vec![int(1), int(2)])).unwrap_err();
    assert_eq!(err.to_string(), "cannot run Vec");
}

#[test]
fn test_integer_errors() {
    let mut rt = Runtime::new();
    let div = call(&mut rt, "idiv", vec![int(1), int(0)]);
    assert!(matches!(rt.eval(&div).unwrap_err().kind, ErrorKind::DivisionByZero(_)));

    let big = call(&mut rt, "imul", vec![int(crate::value::INT_MAX), int(2)]);
    assert!(matches!(rt.eval(&big).unwrap_err().kind, ErrorKind::Overflow(_)));

    let exit = call(&mut rt, "exit", vec![int(3)]);
    assert_eq!(rt.eval(&exit).unwrap_err().exit_status(), Some(3));
}

#[test]
fn test_print_forms() {
    let mut rt = Runtime::new();
    let f = s(&mut rt, "f");
    let cases = vec![
        (int(-7), "-7"),
        (Val::data(b"a\nb'c"), r"'a\nb\'c'"),
        (Val::data(b"\x01\x7f\xff"), r"'\x01\x7f\xff'"),
        (Val::data("日本".as_bytes()), "'日本'"),
        (Val::vec(vec![]), "{}"),
        (Val::chain(vec![int(1), int(2), int(3)]), "[1 2 3]"),
        (form(Special::Call, vec![f.clone(), int(1), int(2)]), "(f 1 2)"),
        (form(Special::Quo, vec![f.clone()]), "`f"),
        (form(Special::Expand, vec![f.clone(), int(1)]), "<f 1>"),
        (par(&mut rt, "x", Some(int(2))), "-x=2"),
    ];
    for (val, text) in cases {
        assert_eq!(rt.repr(&val).to_string(), text);
    }
    let host = rt.lookup("iadd").cloned().unwrap();
    assert_eq!(rt.repr(&host).to_string(), "«Func-host iadd»");
    let out = rt.lookup("std-out").cloned().unwrap();
    assert_eq!(rt.repr(&out).to_string(), "«File std-out»");
}

#[test]
fn test_file_write_and_read_back() {
    let mut rt = Runtime::new();
    let path = std::env::temp_dir().join(format!("knot-file-test-{}", std::process::id()));
    let fs = std::fs::File::create(&path).unwrap();
    let name = rt.intern("scratch");
    let file = Val::file(name, crate::file::Handle::Fs(fs), false, true);
    assert_eq!(rt.repr(&file).to_string(), "«File scratch»");

    let quoted = form(Special::Quo, vec![file]);
    let write = call(&mut rt, "raw-write", vec![quoted.clone(), Val::data(b"hello ")]);
    rt.eval(&write).unwrap();
    let write = call(&mut rt, "raw-write-repr", vec![quoted.clone(), Val::chain(vec![int(1), int(2)])]);
    rt.eval(&write).unwrap();
    let flush = call(&mut rt, "raw-flush", vec![quoted]);
    rt.eval(&flush).unwrap();

    let path_val = Val::data(path.to_string_lossy().as_bytes());
    let read = call(&mut rt, "data-from-path", vec![path_val]);
    let got = rt.eval(&read).unwrap();
    assert_eq!(&*got.data_bytes().unwrap(), b"hello [1 2]");

    let fs = std::fs::File::open(&path).unwrap();
    let file = Val::file(name, crate::file::Handle::Fs(fs), true, false);
    let quoted = form(Special::Quo, vec![file]);
    let read = call(&mut rt, "raw-read", vec![quoted.clone()]);
    let got = rt.eval(&read).unwrap();
    assert_eq!(&*got.data_bytes().unwrap(), b"hello [1 2]");
    // nothing is left after the first read
    let got = rt.eval(&read).unwrap();
    assert_eq!(got.len(), Some(0));
    let write = call(&mut rt, "raw-write", vec![quoted, Val::data(b"x")]);
    assert!(matches!(rt.eval(&write).unwrap_err().kind, ErrorKind::Io(_)));
    std::fs::remove_file(&path).unwrap();

    let out = s(&mut rt, "std-out");
    let read = call(&mut rt, "raw-read", vec![out]);
    assert!(matches!(rt.eval(&read).unwrap_err().kind, ErrorKind::Io(_)));

    let stdin = s(&mut rt, "std-in");
    let write = call(&mut rt, "raw-write", vec![stdin, Val::data(b"x")]);
    assert!(matches!(rt.eval(&write).unwrap_err().kind, ErrorKind::Io(_)));
}
