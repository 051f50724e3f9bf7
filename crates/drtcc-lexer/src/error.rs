use core::fmt;

/// The kind of a lexical error, per `spec.md` §7 band 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    /// A byte that cannot start or continue any token.
    InvalidChar,
    /// An operator-like sequence that doesn't match any known operator.
    InvalidOperator,
    /// A malformed numeric literal (e.g. a bad digit for the literal's
    /// radix, or an unrecognized numeric suffix).
    InvalidDigit,
    /// An unterminated or malformed character/string literal.
    InvalidString,
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LexErrorKind::InvalidChar => "InvalidChar",
            LexErrorKind::InvalidOperator => "InvalidOperator",
            LexErrorKind::InvalidDigit => "InvalidDigit",
            LexErrorKind::InvalidString => "InvalidString",
        };
        f.write_str(s)
    }
}

/// A lexical error: recorded with position and the offending text, never
/// fatal on its own. The caller prints it and resumes at the next token.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    /// What went wrong.
    pub kind: LexErrorKind,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub col: u32,
    /// The offending text, for diagnostics.
    pub span: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}] ERROR: {} - {}",
            self.line, self.col, self.kind, self.span
        )
    }
}

impl std::error::Error for LexError {}
