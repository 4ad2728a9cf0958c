//! Rendering errors against the source they came from.

use std::fmt;
use std::ops::Range;

use text_lines::TextLines;
use unicode_width::UnicodeWidthStr;

/// A message, optionally pointing into a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: String,
    pub message: String,
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, in characters.
    pub col: usize,
    /// The offending line, without its line break.
    pub text: String,
    /// `^~~~` under the offending span, aligned by display width.
    pub underline: String,
}

impl Diagnostic {
    /// A diagnostic that has no position in any source.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            path: path.into(),
            message: message.into(),
            location: None,
        }
    }

    /// A diagnostic for the byte range `span` of `src`.
    pub fn at(
        path: impl Into<String>,
        src: &str,
        span: Range<usize>,
        message: impl Into<String>,
    ) -> Self {
        let mut diag = Diagnostic::new(path, message);
        diag.location = Some(Location::find(src, span));
        diag
    }
}

impl Location {
    fn find(src: &str, span: Range<usize>) -> Self {
        let lines = TextLines::new(src);
        let start = floor_char_boundary(src, span.start.min(src.len()));
        let pos = lines.line_and_column_index(start);

        let line_start = lines.line_start(pos.line_index);
        let line_end = lines.line_end(pos.line_index).max(line_start);
        let text = src[line_start..line_end].trim_end_matches(|c| c == '\n' || c == '\r');

        // the underline stops at the end of the first line
        let end = floor_char_boundary(src, span.end.clamp(start, line_start + text.len()));
        let indent = UnicodeWidthStr::width(&src[line_start..start]);
        let width = UnicodeWidthStr::width(&src[start..end]).max(1);
        let mut underline = " ".repeat(indent);
        underline.push('^');
        underline.push_str(&"~".repeat(width - 1));

        Location {
            line: pos.line_index + 1,
            col: pos.column_index + 1,
            text: text.to_owned(),
            underline,
        }
    }
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => {
                writeln!(f, "{}:{}:{}: {}", self.path, loc.line, loc.col, self.message)?;
                writeln!(f, "    {}", loc.text)?;
                write!(f, "    {}", loc.underline)
            }
            None => write!(f, "{}: {}", self.path, self.message),
        }
    }
}

#[cfg(test)]
mod test {
    use expect_test::expect;
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::Diagnostic;

    #[test]
    fn test_first_column() {
        let diag = Diagnostic::at("a.knot", "(unterminated", 0..1, "expected terminator: ')'");
        let loc = diag.location.clone().unwrap();
        assert_eq!((loc.line, loc.col), (1, 1));
        expect![[r#"
            a.knot:1:1: expected terminator: ')'
                (unterminated
                ^"#]]
        .assert_eq(&diag.to_string());
    }

    #[test]
    fn test_span_on_later_line() {
        let src = "1\n  (iadd x 2)\n3\n";
        let diag = Diagnostic::at("b.knot", src, 4..14, "lookup error: x");
        expect![[r#"
            b.knot:2:3: lookup error: x
                  (iadd x 2)
                  ^~~~~~~~~~"#]]
        .assert_eq(&diag.to_string());
    }

    #[test]
    fn test_multiline_span_is_cut() {
        let src = "(f\n  x)";
        let diag = Diagnostic::at("c.knot", src, 0..7, "boom");
        let loc = diag.location.unwrap();
        assert_eq!(loc.text, "(f");
        assert_eq!(loc.underline, "^~");
    }

    #[test]
    fn test_wide_characters() {
        let src = "'日本' x";
        let diag = Diagnostic::at("d.knot", src, 9..10, "lookup error: x");
        let loc = diag.location.unwrap();
        assert_eq!(loc.col, 6);
        assert_eq!(loc.underline, "       ^");
    }

    #[test]
    fn test_end_of_input() {
        let diag = Diagnostic::at("e.knot", "-", 1..1, "expected parameter name");
        let loc = diag.location.unwrap();
        assert_eq!((loc.line, loc.col), (1, 2));
        assert_eq!(loc.underline, " ^");
    }

    #[test]
    fn test_without_location() {
        let diag = Diagnostic::new("<eval>", "object is not callable: 1");
        assert_eq!(diag.to_string(), "<eval>: object is not callable: 1");
    }
}
