use core::fmt;

/// A runtime fault the virtual machine can signal back to its caller.
///
/// These are the bottom of the error band described as "Runtime" in the
/// pipeline's error design: they are not recoverable by guest code, and the
/// driver reports them and exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumIter)]
pub enum Fault {
    /// The bump-allocated heap has no more room for a `malloc` request.
    OutOfMemory,
    /// `pc` decoded to a word that isn't a known opcode.
    UnknownOpcode(i32),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::OutOfMemory => write!(f, "out of memory"),
            Fault::UnknownOpcode(op) => write!(f, "unknown instruction: {op}"),
        }
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_variant_displays_something_non_empty() {
        for variant in [Fault::OutOfMemory, Fault::UnknownOpcode(99)] {
            assert!(!variant.to_string().is_empty());
        }
    }

    #[test]
    fn iter_is_non_empty() {
        assert!(Fault::iter().count() >= 1);
    }
}
