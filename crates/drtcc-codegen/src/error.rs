use core::fmt;

/// A fatal error raised while generating code, per `spec.md` §7 band 2.
///
/// Unlike [`drtcc_parser::ParseError`], these carry no source position: the
/// AST (`spec.md` §3) has none to carry, matching the original `GenCode`,
/// whose `Expect`/`Error` paths throw with no line/column either — only the
/// parser's `Error()` has a lexer position to draw from.
#[derive(Debug, Clone, PartialEq)]
pub enum CodegenError {
    /// A name was declared twice in the same scope, or shadowed a
    /// non-variable binding (`enum`/function) from an outer one.
    DuplicateIdentifier(String),
    /// A name was referenced that resolves to nothing, in any scope or the
    /// builtins table.
    UndefinedIdentifier(String),
    /// An assignment or `++`/`--` target's last emitted instruction wasn't
    /// `LC`/`LI` — the node wasn't an lvalue.
    InvalidLvalue,
    /// Indexing or pointer-scaling was attempted on a non-pointer
    /// (`ptr_level == 0`).
    NotAPointer,
    /// An operator or type width the generator doesn't lower.
    UnsupportedOperator(String),
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenError::DuplicateIdentifier(name) => {
                write!(f, "duplicate identifier: {name}")
            }
            CodegenError::UndefinedIdentifier(name) => {
                write!(f, "undefined identifier: {name}")
            }
            CodegenError::InvalidLvalue => write!(f, "expression is not an lvalue"),
            CodegenError::NotAPointer => write!(f, "expression is not a pointer"),
            CodegenError::UnsupportedOperator(what) => {
                write!(f, "unsupported operator or type: {what}")
            }
        }
    }
}

impl std::error::Error for CodegenError {}
