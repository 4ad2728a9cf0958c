use knot::{Failure, Session};
use knot_syn::parse_src;
use knot_vm::{RcMode, Repr, Runtime, Special, SymbolTable, Val};
use pretty_assertions::assert_eq;
use test_log::test;

fn session() -> Session {
    Session::new(Runtime::new())
}

/// Run `src` and print its value.
fn run(src: &str) -> String {
    let mut session = session();
    match session.run_source("<test>", src) {
        Ok(val) => session.runtime().repr(&val).to_string(),
        Err(e) => panic!("{:?} failed: {}", src, e),
    }
}

fn fail(src: &str) -> Failure {
    let mut session = session();
    match session.run_source("<test>", src) {
        Ok(val) => panic!(
            "{:?} should fail, got {}",
            src,
            session.runtime().repr(&val)
        ),
        Err(e) => e,
    }
}

const SWAP: &str = "{LET swap {FN swap true {-f -a -b} ~(,f ,b ,a)}}\n";

#[test]
fn test_host_call() {
    assert_eq!(run("(iadd 1 2)"), "3");
}

#[test]
fn test_parameters_are_bound_only_inside_the_call() {
    let src = "{LET add {FN add false {-a -b} (iadd a b)}}\n(add 1 2)";
    assert_eq!(run(src), "3");

    let err = fail("{LET add {FN add false {-a -b} (iadd a b)}}\n(add 1 2)\na");
    assert_eq!(err.to_string(), "<test>:3:1: lookup error: a\n    a\n    ^");
    assert_eq!(err.status(), 1);
}

#[test]
fn test_long_do_runs_in_bounded_stack() {
    let mut src = String::from("{DO");
    for i in 0..100_000 {
        src.push_str(&format!(" {}", i));
    }
    src.push('}');
    assert_eq!(run(&src), "99999");
}

#[test]
fn test_deep_tail_recursion() {
    let src = "
{LET count {FN count false {-n} {IF (ieq n 0) `done (self (isub n 1))}}}
(count 100000)";
    assert_eq!(run(src), "done");
}

#[test]
fn test_unterminated_reports_first_column() {
    let err = fail("(unterminated");
    match &err {
        Failure::Parse(diag) => {
            let loc = diag.location.as_ref().unwrap();
            assert_eq!((loc.line, loc.col), (1, 1));
        }
        other => panic!("expected a parse failure, got {:?}", other),
    }
    assert_eq!(
        err.to_string(),
        "<test>:1:1: expected terminator: ')'\n    (unterminated\n    ^"
    );
}

#[test]
fn test_eval_error_points_at_form() {
    let err = fail("1\n  (iadd 1 'x')");
    let diag = match &err {
        Failure::Eval { diag, .. } => diag,
        other => panic!("expected an eval failure, got {:?}", other),
    };
    let loc = diag.location.as_ref().unwrap();
    assert_eq!((loc.line, loc.col), (2, 3));
    assert_eq!(loc.underline, format!("  ^{}", "~".repeat(11)));
}

#[test]
fn test_error_on_atom_points_at_it() {
    let mut session = session();
    session.run_source("a.knot", "{LET x 1}").unwrap();
    let err = session.run_source("b.knot", "x\n  ## y\n  nope 3").unwrap_err();
    assert_eq!(err.to_string(), "b.knot:3:3: lookup error: nope\n      nope 3\n      ^~~~");
}

#[test]
fn test_trace_lists_closures() {
    let err = fail("{LET f {FN f false {} (error 'boom')}}\n(identity (f))");
    assert_eq!(err.trace(), ["f".to_owned()]);
    assert!(err.to_string().contains("boom"), "{}", err);
}

#[test]
fn test_nested_macros_expand_before_running() {
    let src = format!("{}<swap isub <swap isub 1 10> 100>", SWAP);
    assert_eq!(run(&src), "91");

    let src = format!("{}(expand `<swap isub <swap isub 1 10> 100>)", SWAP);
    assert_eq!(run(&src), "(isub 100 (isub 10 1))");
}

#[test]
fn test_run_and_expand_see_local_bindings() {
    assert_eq!(run("{LET f {FN f false {-a} (run `a)}}\n(f 7)"), "7");
    let src = "
{LET f {FN f false {} {DO
  {LET m {FN m true {-x} ~(iadd ,x 1)}}
  (expand `<m 5>)}}}
(f)";
    assert_eq!(run(src), "(iadd 5 1)");
    // the top level does not see the closure's bindings afterwards
    let err = fail("{LET f {FN f false {-a} (run `a)}}\n(f 7)\n(run `a)");
    assert!(err.to_string().contains("lookup error: a"), "{}", err);
}

#[test]
fn test_macro_defined_in_one_source_used_in_next() {
    let mut session = session();
    session.run_source("a.knot", SWAP).unwrap();
    let val = session.run_source("b.knot", "<swap isub 2 5>").unwrap();
    assert_eq!(val, Val::int(3));
}

#[test]
fn test_quasiquote() {
    assert_eq!(run("~(f {a b})"), "(f {a b})");
    assert_eq!(run("{LET x 5}\n~(f ,x ,(iadd x 1))"), "(f 5 6)");
    assert_eq!(run("{LET x 5}\n~[a ,x]"), "[a 5]");
}

#[test]
fn test_quasiquote_reaches_parameters() {
    assert_eq!(run("{LET x 5}\n~{FN g false {-a=,x} a}"), "{FN g false {-a=5} a}");
    assert_eq!(run("{LET t `Int}\n~{-n:,t=1 &rest:,t}"), "{-n:Int=1 &rest:Int}");
    assert_eq!(run("~{-a=(f ,(iadd 1 2))}"), "{-a=(f 3)}");

    let src = "{LET x 5}\n{LET g (run ~{FN g false {-a=,x} a})}\n(g)";
    assert_eq!(run(src), "5");
    // labeled call-site arguments are parameter records too
    assert_eq!(run("{LET x 5}\n~(f -a=,x)"), "(f -a=5)");
}

#[test]
fn test_labels_and_defaults() {
    let src = "
{LET f {FN f false {-a -b=10 &rest} (Vec a b rest)}}
(f 1)";
    assert_eq!(run(src), "{1 10 {}}");
    assert_eq!(
        run("{LET f {FN f false {-a -b=10 &rest} (Vec a b rest)}}\n(f -b=2 1 3 4)"),
        "{1 2 {3 4}}"
    );
}

#[test]
fn test_scope_and_var() {
    assert_eq!(run("{VAR x 1}\n{VAR x 2}\nx"), "2");
    assert_eq!(run("{SCOPE {LET y 2}}\n{LET y 3}\ny"), "3");
    let err = fail("{LET x 1}\n{LET x 2}");
    assert!(err.to_string().contains("symbol is already bound: x"), "{}", err);
}

#[test]
fn test_exit_status() {
    let err = fail("(exit 3)");
    assert!(matches!(err, Failure::Exit(3)));
    assert_eq!(err.status(), 3);
}

fn parse_one(syms: &mut SymbolTable, src: &str) -> Val {
    let parsed = parse_src(syms, "<test>", src).unwrap();
    parsed.code.form_args(Special::Do).unwrap()[0].clone()
}

#[test]
fn test_printed_forms_reparse() {
    let mut syms = SymbolTable::new();
    for src in ["42", "-7", "'a\\nb'", "{}", "[1 2 3]", "(f 1 2)", "`<m {x} [y]>", "-p:Int=5"] {
        let first = parse_one(&mut syms, src);
        let printed = Repr::new(&syms, &first).to_string();
        let again = parse_one(&mut syms, &printed);
        assert_eq!(again, first, "{} printed as {}", src, printed);
    }
}

#[test]
fn test_every_byte_reparses() {
    let mut syms = SymbolTable::new();
    let all: Vec<u8> = (0..=255).collect();
    let mut cases: Vec<Vec<u8>> = all.iter().map(|&b| vec![b]).collect();
    cases.push(all);
    cases.push(b"ab\x7fcd".to_vec());
    cases.push("日本\u{85}".as_bytes().to_vec());
    // a character cut short
    cases.push(b"x\xe6\x97".to_vec());
    for bytes in cases {
        let data = Val::data(&bytes);
        let printed = Repr::new(&syms, &data).to_string();
        let again = parse_one(&mut syms, &printed);
        assert_eq!(again, data, "{:?} printed as {}", bytes, printed);
    }
}

/// Run a program on a fresh thread, whose heap starts empty, and return its
/// printed result and the allocation report.
fn run_with(mode: RcMode) -> (String, String) {
    std::thread::spawn(move || {
        knot_vm::set_rc_mode(mode).unwrap();
        let out = run(&format!(
            "{}{{LET xs (Vec 1 2 3)}}\n{{LET f {{FN f false {{-v}} (prepend xs v)}}}}\n<swap Vec (f 0) (len xs)>",
            SWAP
        ));
        (out, knot_vm::stats().to_string())
    })
    .join()
    .unwrap()
}

#[test]
fn test_rc_strategies_agree() {
    let inline = run_with(RcMode::Inline);
    let table = run_with(RcMode::Table);
    assert_eq!(inline.0, "{3 {0 1 2 3}}");
    assert_eq!(inline, table);
    assert!(!inline.1.contains("LEAK"), "{}", inline.1);
}
