use std::fmt;
use std::str::FromStr;

/// How a variable's value is quoted when written back to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QuoteStyle {
    #[default]
    None,
    Single,
    Double,
}

impl QuoteStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStyle::None => "none",
            QuoteStyle::Single => "single",
            QuoteStyle::Double => "double",
        }
    }

    /// True for single and double quoting.
    pub fn is_quoted(&self) -> bool {
        !matches!(self, QuoteStyle::None)
    }
}

impl fmt::Display for QuoteStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(QuoteStyle::None),
            "single" => Ok(QuoteStyle::Single),
            "double" => Ok(QuoteStyle::Double),
            other => Err(format!(
                "unknown quote style '{}' (expected none, single or double)",
                other
            )),
        }
    }
}

/// One `NAME=VALUE` shell assignment held by the [`FileModel`](crate::envfile::FileModel).
///
/// `value` is stored unquoted with escapes already resolved. `commented` is
/// independent of `quote_style`: a disabled variable keeps its quoting for
/// when it is re-enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub value: String,
    pub quote_style: QuoteStyle,
    pub commented: bool,

    /// 1-based line in the loaded file, 0 for variables created in this session.
    pub line_number: usize,

    /// The raw line this assignment was parsed from, if any.
    pub original_line: Option<String>,

    /// Set once an edit actually changes the assignment. Untouched assignments
    /// render as `original_line` in structured mode.
    pub modified: bool,
}

impl Assignment {
    /// Create a synthesized assignment that never appeared in a file.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            quote_style: QuoteStyle::None,
            commented: false,
            line_number: 0,
            original_line: None,
            modified: true,
        }
    }

    pub fn with_quote_style(mut self, quote_style: QuoteStyle) -> Self {
        self.quote_style = quote_style;
        self
    }

    pub fn with_commented(mut self, commented: bool) -> Self {
        self.commented = commented;
        self
    }

    /// True when the assignment is active (not commented out).
    pub fn is_enabled(&self) -> bool {
        !self.commented
    }

    /// True when the assignment was read from the loaded file.
    pub fn from_file(&self) -> bool {
        self.line_number > 0
    }
}
