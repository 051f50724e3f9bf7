use core::fmt;

use drtcc_asm::Fault;

/// A fatal error surfaced from [`crate::Vm::exec`], per `spec.md` §7 band 3.
///
/// Unlike a built-in's own return value (e.g. `READ` returning `<= 0`), this
/// is the "not recoverable by guest code" tier: the driver reports it and
/// exits non-zero.
#[derive(Debug)]
pub enum VmError {
    /// A machine fault: unknown opcode or heap exhaustion.
    Fault(Fault),
    /// A host I/O error surfaced by `OPEN`/`READ`/`CLOS` that the guest
    /// cannot itself recover from (the built-ins report ordinary I/O
    /// failures through their return value; this is for the case the
    /// built-in cannot even represent as a return value, such as the
    /// formatted-print byte stream failing to flush).
    Io(std::io::Error),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::Fault(fault) => write!(f, "{fault}"),
            VmError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for VmError {}

impl From<Fault> for VmError {
    fn from(fault: Fault) -> Self {
        VmError::Fault(fault)
    }
}

impl From<std::io::Error> for VmError {
    fn from(err: std::io::Error) -> Self {
        VmError::Io(err)
    }
}
