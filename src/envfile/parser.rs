//! Single-line classifier for shell environment files.
//!
//! A line is either an assignment (`NAME=VALUE`, optionally disabled with a
//! leading `#`) or structure to be preserved verbatim. Classification is total:
//! anything that is not a well-formed assignment is kept as a comment.

use crate::models::{Assignment, QuoteStyle};
use regex::Regex;
use std::sync::LazyLock;

/// Upper-case assignment grammar. Whitespace around `=` is tolerated and the
/// value runs to the end of the line untrimmed.
static ASSIGNMENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Z_][A-Z0-9_]*)\s*=\s*(.*)$").expect("Invalid assignment regex")
});

/// Identifier grammar accepted for variables added through the model.
static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid identifier regex"));

/// Outcome of classifying one raw line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Assignment(Assignment),
    Comment,
}

impl ParsedLine {
    pub fn into_assignment(self) -> Option<Assignment> {
        match self {
            ParsedLine::Assignment(assignment) => Some(assignment),
            ParsedLine::Comment => None,
        }
    }
}

/// True when `name` is a legal shell variable identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(name)
}

/// Classify one raw line (without its trailing newline).
///
/// The returned assignment has `line_number == 0`; the file model stamps
/// the real position.
pub fn parse_line(raw_line: &str) -> ParsedLine {
    if raw_line.trim().is_empty() {
        return ParsedLine::Comment;
    }

    // Only the marker and the whitespace around it go; the value keeps its tail
    let (commented, candidate) = match raw_line.trim_start().strip_prefix('#') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, raw_line),
    };

    let Some(captures) = ASSIGNMENT_PATTERN.captures(candidate) else {
        return ParsedLine::Comment;
    };

    let name = captures[1].to_string();
    let (value, quote_style) = unquote(&captures[2]);

    ParsedLine::Assignment(Assignment {
        name,
        value,
        quote_style,
        commented,
        line_number: 0,
        original_line: Some(raw_line.to_string()),
        modified: false,
    })
}

/// Strip surrounding quotes from a raw value and resolve double-quote escapes.
fn unquote(raw: &str) -> (String, QuoteStyle) {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        let inner = &raw[1..raw.len() - 1];
        let value = inner.replace("\\\"", "\"").replace("\\\\", "\\");
        (value, QuoteStyle::Double)
    } else if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        (raw[1..raw.len() - 1].to_string(), QuoteStyle::Single)
    } else {
        (raw.to_string(), QuoteStyle::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(line: &str) -> Assignment {
        parse_line(line)
            .into_assignment()
            .unwrap_or_else(|| panic!("expected assignment: {line:?}"))
    }

    #[test]
    fn test_plain_assignment() {
        let parsed = assignment("PORT=8080");

        assert_eq!(parsed.name, "PORT");
        assert_eq!(parsed.value, "8080");
        assert_eq!(parsed.quote_style, QuoteStyle::None);
        assert!(!parsed.commented);
        assert!(!parsed.modified);
        assert_eq!(parsed.original_line.as_deref(), Some("PORT=8080"));
    }

    #[test]
    fn test_commented_assignment() {
        let parsed = assignment("#PORT=8080");
        assert!(parsed.commented);
        assert_eq!(parsed.value, "8080");

        let spaced = assignment("  #   LOG_LEVEL=DEBUG");
        assert!(spaced.commented);
        assert_eq!(spaced.name, "LOG_LEVEL");
    }

    #[test]
    fn test_disabled_line_keeps_trailing_content() {
        let active = assignment("PORT=8080  ");
        let disabled = assignment("#PORT=8080  ");
        assert_eq!(disabled.value, active.value);
        assert_eq!(disabled.value, "8080  ");

        let crlf = assignment("  # PORT=8080\r");
        assert!(crlf.commented);
        assert_eq!(crlf.value, "8080\r");

        // A trailing space after the closing quote means the value is not quoted
        let quoted = assignment("#X=\"a b\" ");
        assert_eq!(quoted.value, "\"a b\" ");
        assert_eq!(quoted.quote_style, QuoteStyle::None);
        assert_eq!(quoted.quote_style, assignment("X=\"a b\" ").quote_style);
    }

    #[test]
    fn test_double_quoted_value_unescapes() {
        let parsed = assignment(r#"X="a\"b""#);
        assert_eq!(parsed.value, "a\"b");
        assert_eq!(parsed.quote_style, QuoteStyle::Double);

        let backslash = assignment(r#"X="C:\\temp""#);
        assert_eq!(backslash.value, r"C:\temp");
    }

    #[test]
    fn test_single_quoted_value_is_literal() {
        let parsed = assignment(r#"X='a"b'"#);
        assert_eq!(parsed.value, "a\"b");
        assert_eq!(parsed.quote_style, QuoteStyle::Single);

        let escapes = assignment(r"X='a\\b'");
        assert_eq!(escapes.value, r"a\\b");
    }

    #[test]
    fn test_lone_quote_is_unquoted() {
        let parsed = assignment("X=\"");
        assert_eq!(parsed.value, "\"");
        assert_eq!(parsed.quote_style, QuoteStyle::None);

        let empty = assignment("X=\"\"");
        assert_eq!(empty.value, "");
        assert_eq!(empty.quote_style, QuoteStyle::Double);
    }

    #[test]
    fn test_value_keeps_later_equals_signs() {
        let parsed = assignment("EXTRA_ARGS=--opt=a=b");
        assert_eq!(parsed.name, "EXTRA_ARGS");
        assert_eq!(parsed.value, "--opt=a=b");
    }

    #[test]
    fn test_whitespace_around_equals() {
        let parsed = assignment("  PORT = 9000  ");
        assert_eq!(parsed.name, "PORT");
        assert_eq!(parsed.value, "9000  ");
    }

    #[test]
    fn test_comments_and_blanks() {
        assert_eq!(parse_line(""), ParsedLine::Comment);
        assert_eq!(parse_line("   "), ParsedLine::Comment);
        assert_eq!(parse_line("# Basic configuration"), ParsedLine::Comment);
        assert_eq!(parse_line("# see: a=b for details"), ParsedLine::Comment);
        assert_eq!(parse_line("## PORT=1"), ParsedLine::Comment);
    }

    #[test]
    fn test_lowercase_and_malformed_lines_are_comments() {
        assert_eq!(parse_line("port=8080"), ParsedLine::Comment);
        assert_eq!(parse_line("export PORT=8080"), ParsedLine::Comment);
        assert_eq!(parse_line("1PORT=8080"), ParsedLine::Comment);
        assert_eq!(parse_line("just some text"), ParsedLine::Comment);
    }

    #[test]
    fn test_identifier_grammar() {
        assert!(is_valid_identifier("PORT"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("mixed_Case9"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("bad-name"));
        assert!(!is_valid_identifier("9LIVES"));
        assert!(!is_valid_identifier("WITH SPACE"));
    }
}
