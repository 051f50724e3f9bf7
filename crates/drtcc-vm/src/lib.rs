//! Paged-memory bytecode virtual machine for the drtcc stack machine.
//!
//! Consumes the `text`/`data` pair a [`drtcc_codegen::Generator`] produces
//! and executes it to completion, per `spec.md` §4.4.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod consts;
mod error;
mod memory;
mod printf;
mod vm;

pub use config::VmConfig;
pub use consts::{DATA_BASE, HEAP_BASE, PAGE_SIZE, STACK_BASE, TEXT_BASE};
pub use error::VmError;
pub use vm::Vm;
