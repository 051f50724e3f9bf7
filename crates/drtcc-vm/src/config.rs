use crate::consts::{DEFAULT_HEAP_PAGES, STACK_PAGES};

/// Tunables for a [`crate::Vm`] instance.
///
/// `spec.md` hardcodes these (`HEAP_SIZE 1000`, a single-page stack); this
/// generalizes them into a configurable struct — per `SPEC_FULL.md`'s
/// ambient-stack section — without changing the defaults, so
/// `VmConfig::default()` reproduces `spec.md`'s behavior exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Number of 4 KiB pages backing the heap segment.
    pub heap_pages: u32,
    /// Number of 4 KiB pages backing the stack segment at boot. The stack
    /// auto-grows past this on a page fault, per `spec.md` §4.4.
    pub stack_pages: u32,
    /// Whether the VM starts with instruction tracing already enabled,
    /// equivalent to the guest calling `trace(1)` before `main` runs.
    pub trace_on_boot: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            heap_pages: DEFAULT_HEAP_PAGES,
            stack_pages: STACK_PAGES,
            trace_on_boot: false,
        }
    }
}
