use std::ops::Range;

use expect_test::expect;
use knot_vm::{Repr, Special, SymbolTable, Val};
use pretty_assertions::assert_eq;
use rowan::TextRange;
use test_log::test;

use super::error_report::ParseErrorKind;
use super::{parse_src, Parsed};
use crate::token::SynTag;
use crate::Lexer;

fn parse(src: &str) -> (SymbolTable, Parsed) {
    let mut syms = SymbolTable::new();
    match parse_src(&mut syms, "<test>", src) {
        Ok(parsed) => (syms, parsed),
        Err(e) => panic!("failed to parse {:?}: {} at {:?}", src, e, e.span),
    }
}

/// Print every top-level form on its own line.
fn show(src: &str) -> String {
    let (syms, parsed) = parse(src);
    let forms = parsed.code.form_args(Special::Do).unwrap_or_default();
    forms
        .iter()
        .map(|v| Repr::new(&syms, v).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn error(src: &str) -> (String, Range<u32>) {
    let mut syms = SymbolTable::new();
    match parse_src(&mut syms, "<test>", src) {
        Ok(parsed) => panic!(
            "expected {:?} to fail, got {}",
            src,
            Repr::new(&syms, &parsed.code)
        ),
        Err(e) => (
            e.to_string(),
            e.span.start().into()..e.span.end().into(),
        ),
    }
}

#[test]
fn test_lex_string_literals() {
    use SynTag::*;
    let lexer = Lexer::new(r#"(a 'b c' "d\"e")"#);
    let res = lexer.collect::<Vec<_>>();
    assert_eq!(res, vec![LParen, Sym, WS, Str, WS, Str, RParen]);
}

#[test]
fn test_lex_int_and_dash() {
    use SynTag::*;
    let lexer = Lexer::new("-7 -a -");
    let res = lexer.collect::<Vec<_>>();
    assert_eq!(res, vec![Int, WS, Dash, Sym, WS, Dash]);
}

#[test]
fn test_parse_empty() {
    let (syms, parsed) = parse("  \n");
    assert_eq!(Repr::new(&syms, &parsed.code).to_string(), "{DO}");
    assert!(parsed.locs.is_empty());
}

#[test]
fn test_parse_atoms() {
    assert_eq!(show("42"), "42");
    assert_eq!(show("-7"), "-7");
    assert_eq!(show("+7"), "7");
    assert_eq!(show("foo-bar_2"), "foo-bar_2");
    assert_eq!(show(r#""a\nb""#), r"'a\nb'");
    assert_eq!(show(r"'it\'s'"), r"'it\'s'");
}

#[test]
fn test_parse_int_bases() {
    let got = show("0x1F -0b101 0q13 0o17 0d09");
    expect![[r#"
        31
        -5
        7
        15
        9"#]]
    .assert_eq(&got);
}

#[test]
fn test_parse_string_escapes() {
    let (_, parsed) = parse(r#""\0\a\b\t\n\v\f\r\\\'\"""#);
    let s = &parsed.code.form_args(Special::Do).unwrap()[0];
    assert_eq!(
        &*s.data_bytes().unwrap(),
        b"\0\x07\x08\t\n\x0b\x0c\r\\'\""
    );
}

#[test]
fn test_parse_unknown_escape_keeps_backslash() {
    let (_, parsed) = parse(r"'\q'");
    let s = &parsed.code.form_args(Special::Do).unwrap()[0];
    assert_eq!(&*s.data_bytes().unwrap(), b"\\q");
}

#[test]
fn test_parse_hex_escapes() {
    let (_, parsed) = parse(r"'\x41\x7F\xff \x4 \xzz'");
    let s = &parsed.code.form_args(Special::Do).unwrap()[0];
    assert_eq!(&*s.data_bytes().unwrap(), b"A\x7f\xff \\x4 \\xzz");
}

#[test]
fn test_parse_multiline_string() {
    let (_, parsed) = parse("'a\nb'");
    let s = &parsed.code.form_args(Special::Do).unwrap()[0];
    assert_eq!(&*s.data_bytes().unwrap(), b"a\nb");
}

#[test]
fn test_parse_brackets() {
    let got = show("{} [] [1 2 3] (f 1 2) {a {b}} <m x> ()");
    expect![[r#"
        {}
        []
        [1 2 3]
        (f 1 2)
        {a {b}}
        <m x>
        {CALL}"#]]
    .assert_eq(&got);
}

#[test]
fn test_parse_prefixes() {
    let got = show("`(a ,b ~c) `{x}");
    expect![[r#"
        `(a ,b ~c)
        `{x}"#]]
    .assert_eq(&got);
}

#[test]
fn test_parse_params() {
    let got = show("{FN f {-a -b:Int -c=5 -d:Int=[1] &rest:Vec} a}");
    expect![[r#"
        {FN f {-a -b:Int -c=5 -d:Int=[1] &rest:Vec} a}"#]]
    .assert_eq(&got);

    let (syms, parsed) = parse("-c=5");
    let par = parsed.code.form_args(Special::Do).unwrap()[0].clone();
    let par = par.as_par().unwrap();
    assert_eq!(syms.name_lossy(par.name), "c");
    assert_eq!(par.default.as_int(), Some(5));
    assert!(par.ty.is_special(Special::Void));
}

#[test]
fn test_parse_vec_forms_are_data() {
    let (_, parsed) = parse("{IF a b c}");
    let form = &parsed.code.form_args(Special::Do).unwrap()[0];
    assert_eq!(form.form_head(), Some(Special::If));
    assert_eq!(form.len(), Some(4));
}

#[test]
fn test_parse_comments() {
    assert_eq!(show("1 # one\n2 #\n3"), "1\n2\n3");
    assert_eq!(show("1 ## (f x) 2"), "1\n2");
    assert_eq!(show("(f ## {dropped}\n x)"), "(f x)");
    assert_eq!(show("## ## 1 2 3"), "3");
}

#[test]
fn test_discarded_forms_have_no_location() {
    let (_, parsed) = parse("## (f x) 1");
    assert!(parsed.locs.is_empty());
}

#[test]
fn test_locations() {
    let (_, parsed) = parse("1\n(f (g 'hello world'))");
    let outer = parsed.code.form_args(Special::Do).unwrap()[1].clone();
    let inner = outer.vec_slots().unwrap()[2].clone();
    let data = inner.vec_slots().unwrap()[2].clone();

    assert_eq!(parsed.locs.get(&outer), Some(TextRange::new(2.into(), 23.into())));
    assert_eq!(parsed.locs.get(&inner), Some(TextRange::new(5.into(), 22.into())));
    assert_eq!(parsed.locs.get(&data), Some(TextRange::new(8.into(), 21.into())));
    assert_eq!(parsed.locs.get(&Val::int(1)), None);
}

#[test]
fn test_top_level_locations() {
    let (_, parsed) = parse("1 ## x\n  foo (g)");
    let spans: Vec<_> = (0..3).map(|i| parsed.locs.top_level(i)).collect();
    assert_eq!(
        spans,
        vec![
            Some(TextRange::new(0.into(), 1.into())),
            Some(TextRange::new(9.into(), 12.into())),
            Some(TextRange::new(13.into(), 16.into())),
        ]
    );
    assert_eq!(parsed.locs.top_level(3), None);
}

#[test]
fn test_error_unterminated_bracket() {
    assert_eq!(error("(unterminated"), ("expected terminator: ')'".into(), 0..1));
    assert_eq!(error("{1 [2"), ("expected terminator: ']'".into(), 3..4));
}

#[test]
fn test_error_mismatched_terminator() {
    assert_eq!(error("(a ]"), ("expected terminator: ')'".into(), 3..4));
}

#[test]
fn test_error_unexpected_terminator() {
    assert_eq!(error("1 )"), ("unexpected terminator: ')'".into(), 2..3));
    assert_eq!(error(">"), ("unexpected terminator: '>'".into(), 0..1));
}

#[test]
fn test_error_terminated_early() {
    assert_eq!(error("a : b"), ("parsing terminated early at ':'".into(), 2..3));
}

#[test]
fn test_error_strings() {
    assert_eq!(error("'abc"), ("unterminated string literal".into(), 0..4));
    let (msg, span) = error("'a\tb'");
    assert_eq!(msg, ParseErrorKind::Tab.to_string());
    assert_eq!(span, 2..3);
}

#[test]
fn test_error_trivia() {
    let (msg, span) = error("\tx");
    assert_eq!(msg, ParseErrorKind::Tab.to_string());
    assert_eq!(span, 0..1);

    assert_eq!(
        error("1 # no newline"),
        ("comment is not terminated; add newline".into(), 2..14)
    );
    assert_eq!(
        error("\x01"),
        (ParseErrorKind::ControlCharacter(1).to_string(), 0..1)
    );
    assert_eq!(error("@"), ("illegal character: '@'".into(), 0..1));
}

#[test]
fn test_error_numbers() {
    let (msg, span) = error("12ab");
    assert!(msg.starts_with("malformed number literal"), "{}", msg);
    assert_eq!(span, 0..4);

    assert_eq!(
        error("99999999999999999999"),
        ("integer literal out of range".into(), 0..20)
    );
    let past_max = (knot_vm::value::INT_MAX as i128 + 1).to_string();
    assert_eq!(error(&past_max).0, "integer literal out of range");
}

#[test]
fn test_error_params() {
    assert_eq!(error("-"), ("expected parameter name".into(), 1..1));
    assert_eq!(error("-a: 5"), ("expected type after ':'".into(), 3..4));
    assert_eq!(error("` x"), ("expected expression after prefix".into(), 1..2));
}
