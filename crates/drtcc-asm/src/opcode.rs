use core::fmt;

/// An instruction opcode for the drtcc stack machine.
///
/// The VM is a single-accumulator stack machine: registers are `pc` (code
/// pointer), `sp` (stack pointer), `bp` (frame pointer) and `ax`
/// (accumulator). Opcodes marked with an immediate operand consume exactly
/// one extra `text` word, which always directly follows the opcode word
/// (see [`Opcode::immediate_words`]); `IMX` is the one exception, consuming
/// two.
///
/// Built-in calls are modelled as an extension of the same opcode space
/// (`Opcode::OPEN` and above) so that the VM's dispatch remains a single
/// `match`, rather than a separate call-table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter, strum::Display)]
#[repr(i32)]
pub enum Opcode {
    /// No-op. Never emitted by the code generator; reserved as the zero
    /// discriminant so an all-zero `text` slot decodes to something
    /// harmless rather than a meaningful instruction.
    Nop = 0,

    /// `ax <- bp + imm`. Used to compute the address of a parameter or
    /// local ahead of a load/store.
    Lea,
    /// `ax <- imm`.
    Imm,
    /// `ax <- imm_lo` (two `text` words follow: the low and high halves of
    /// a literal wider than 32 bits; only the low half is kept, since
    /// floating-point arithmetic is not supported at runtime and wide
    /// integer literals truncate).
    Imx,
    /// Unconditional jump; operand is a `text` index.
    Jmp,
    /// Call a user function; operand is the callee's `text` index. Pushes
    /// the return address.
    Call,
    /// Jump if `ax == 0`; operand is a `text` index.
    Jz,
    /// Jump if `ax != 0`; operand is a `text` index.
    Jnz,
    /// Enter a stack frame: push `bp`, `bp <- sp`, `sp <- sp - imm`.
    Ent,
    /// Callee-cleanup: `sp <- sp + imm * 4`, dropping `imm` pushed
    /// arguments (or, after a built-in, telling the VM how many argument
    /// slots that built-in consumed).
    Adj,
    /// Leave a stack frame: `sp <- bp`, pop `bp`, pop `pc`.
    Lev,
    /// `ax <- *(word *)ax`.
    Li,
    /// `*(word *)pop() <- ax`.
    Si,
    /// `ax <- *(byte *)ax`.
    Lc,
    /// `*(byte *)pop() <- ax & 0xff`.
    Sc,
    /// Push `ax` onto the stack.
    Push,
    /// Rewrite `ax` to `DATA_BASE | (ax & (PAGE_SIZE - 1))`, i.e. treat
    /// `ax` as an offset into the data segment.
    Load,

    /// `ax <- pop() | ax`.
    Or,
    /// `ax <- pop() ^ ax`.
    Xor,
    /// `ax <- pop() & ax`.
    And,
    /// `ax <- pop() == ax`.
    Eq,
    /// `ax <- pop() != ax`.
    Ne,
    /// `ax <- pop() < ax`.
    Lt,
    /// `ax <- pop() > ax`.
    Gt,
    /// `ax <- pop() <= ax`.
    Le,
    /// `ax <- pop() >= ax`.
    Ge,
    /// `ax <- pop() << ax`.
    Shl,
    /// `ax <- pop() >> ax`.
    Shr,
    /// `ax <- pop() + ax`.
    Add,
    /// `ax <- pop() - ax`.
    Sub,
    /// `ax <- pop() * ax`.
    Mul,
    /// `ax <- pop() / ax`.
    Div,
    /// `ax <- pop() % ax`.
    Mod,

    /// Opens `path` (arg 0) for reading; returns a host handle in `ax`.
    Open,
    /// Reads up to `n` bytes (args: `fd, buf, n`) into guest memory.
    Read,
    /// Closes a handle (arg 0); returns status in `ax`.
    Clos,
    /// `printf(fmt, a1..a5)`; returns the character count in `ax`.
    Prtf,
    /// Bump-allocates `size` (arg 0) bytes on the guest heap; returns the
    /// guest virtual address.
    Malc,
    /// Byte-fills guest memory (args: `va, val, n`).
    Mset,
    /// Byte-compares guest memory (args: `a, b, n`); returns -1/0/1.
    Mcmp,
    /// Toggles trace logging (arg 0); returns the previous value.
    Trac,
    /// Translates a guest virtual address (arg 0) to a host string pointer.
    Tran,
    /// Halts execution with `ax` as the process exit status.
    Exit,
}

impl Opcode {
    /// First opcode in the built-in extension range.
    pub const FIRST_BUILTIN: Opcode = Opcode::Open;

    /// Whether this opcode is a built-in call rather than a core machine
    /// instruction.
    pub const fn is_builtin(self) -> bool {
        self as i32 >= Opcode::FIRST_BUILTIN as i32
    }

    /// How many `text` words immediately follow this opcode as immediate
    /// operands. Every opcode in this list occupies one `text` slot for the
    /// opcode itself, plus this many more.
    pub const fn immediate_words(self) -> usize {
        match self {
            Opcode::Lea
            | Opcode::Imm
            | Opcode::Jmp
            | Opcode::Call
            | Opcode::Jz
            | Opcode::Jnz
            | Opcode::Ent
            | Opcode::Adj => 1,
            Opcode::Imx => 2,
            _ => 0,
        }
    }

    /// Decode a raw `text` word into an opcode, if it names one.
    pub fn from_word(word: i32) -> Option<Opcode> {
        use Opcode::*;
        const TABLE: [Opcode; 43] = [
            Nop, Lea, Imm, Imx, Jmp, Call, Jz, Jnz, Ent, Adj, Lev, Li, Si, Lc, Sc, Push, Load, Or,
            Xor, And, Eq, Ne, Lt, Gt, Le, Ge, Shl, Shr, Add, Sub, Mul, Div, Mod, Open, Read, Clos,
            Prtf, Malc, Mset, Mcmp, Trac, Tran, Exit,
        ];
        let idx = usize::try_from(word).ok()?;
        TABLE.get(idx).copied()
    }
}

impl fmt::Binary for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", *self as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_opcode_round_trips_through_from_word() {
        for op in Opcode::iter() {
            assert_eq!(Opcode::from_word(op as i32), Some(op), "{op:?}");
        }
    }

    #[test]
    fn builtins_start_at_open_and_run_to_exit() {
        let builtins: Vec<_> = Opcode::iter().filter(|op| op.is_builtin()).collect();
        assert_eq!(builtins.first(), Some(&Opcode::Open));
        assert_eq!(builtins.last(), Some(&Opcode::Exit));
    }

    #[test]
    fn immediate_width_matches_spec() {
        assert_eq!(Opcode::Imx.immediate_words(), 2);
        assert_eq!(Opcode::Imm.immediate_words(), 1);
        assert_eq!(Opcode::Lev.immediate_words(), 0);
        assert_eq!(Opcode::Push.immediate_words(), 0);
    }
}
