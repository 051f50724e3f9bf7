use std::collections::HashMap;
use std::io::Write;

use drtcc_asm::{Fault, Opcode, INC_PTR};

use crate::config::VmConfig;
use crate::consts::{DATA_BASE, HEAP_BASE, PAGE_SIZE, STACK_BASE, TEXT_BASE};

/// Width `spec.md` §3 gives every segment's address range.
const SEGMENT_SPAN: u32 = 0x1000_0000;
use crate::error::VmError;
use crate::memory::{HeapAllocator, PagedMemory};
use crate::printf::{self, Arg};

/// The drtcc bytecode virtual machine: a single-accumulator stack machine
/// over paged virtual memory, per `spec.md` §4.4.
pub struct Vm {
    memory: PagedMemory,
    heap: HeapAllocator,
    /// Code pointer. A flat virtual address, not a text index — see
    /// [`Self::text_addr`].
    pc: u32,
    /// Stack pointer.
    sp: u32,
    /// Frame pointer.
    bp: u32,
    /// Accumulator.
    ax: i32,
    trace: bool,
    open_files: HashMap<i32, std::fs::File>,
    next_fd: i32,
    config: VmConfig,
}

impl Vm {
    /// Load `text`/`data` (a [`drtcc_codegen::CodegenOutput`]'s fields) into
    /// a fresh paged address space, per `spec.md` §4.4 init steps 1-5.
    pub fn new(text: &[i32], data: &[u8], config: VmConfig) -> Self {
        let mut memory = PagedMemory::new();

        let text_bytes: Vec<u8> = text.iter().flat_map(|w| w.to_ne_bytes()).collect();
        memory.load_pages(TEXT_BASE, &text_bytes);
        memory.load_pages(DATA_BASE, data);
        for page in 0..config.stack_pages {
            memory.map_page(STACK_BASE + page * PAGE_SIZE);
        }
        let heap = HeapAllocator::new(&mut memory, HEAP_BASE, config.heap_pages);

        Self {
            memory,
            heap,
            pc: TEXT_BASE,
            sp: STACK_BASE + config.stack_pages * PAGE_SIZE,
            bp: 0,
            ax: 0,
            trace: config.trace_on_boot,
            open_files: HashMap::new(),
            next_fd: 3,
            config,
        }
    }

    /// Convert a `text` index (as carried in jump/call immediates) to a flat
    /// virtual address.
    fn text_addr(index: i32) -> u32 {
        TEXT_BASE.wrapping_add((index as u32).wrapping_mul(INC_PTR as u32))
    }

    fn push(&mut self, value: i32) {
        self.sp -= 4;
        self.memory.write_i32(self.sp, value);
    }

    fn pop(&mut self) -> i32 {
        let value = self.memory.read_i32(self.sp);
        self.sp += 4;
        value
    }

    /// Fetch the immediate word at `pc` and advance `pc` past it.
    fn fetch_imm(&mut self) -> i32 {
        let value = self.memory.read_i32(self.pc);
        self.pc += 4;
        value
    }

    /// Read the `n` arguments a built-in's `ADJ n` (the instruction `spec.md`
    /// §4.4 guarantees always immediately follows a built-in opcode) says it
    /// consumed, in left-to-right source order. At the moment a built-in
    /// dispatches, `self.pc` already points at that `ADJ` opcode, so its
    /// immediate sits one word further on.
    fn builtin_args(&mut self, count: i32) -> Vec<i32> {
        let n = count as u32;
        (0..n)
            .map(|k| {
                let addr = self.sp.wrapping_add((n - 1 - k).wrapping_mul(4));
                self.memory.read_i32(addr)
            })
            .collect()
    }

    fn arg_count(&mut self) -> i32 {
        self.memory.read_i32(self.pc + 4)
    }

    /// Run `main` (given as a `text`-segment entry index) to completion and
    /// return its exit status, per `spec.md` §4.4 init step 6 and §6.
    pub fn exec(&mut self, main_entry: i32, args: &[String]) -> Result<i32, VmError> {
        let argv = self.heap.alloc((args.len() as u32) * 4)?;
        for (i, arg) in args.iter().enumerate() {
            let str_va = self.heap.alloc(256)?;
            self.memory.write_cstr(str_va, arg.as_bytes());
            self.memory.write_i32(argv + (i as u32) * 4, str_va as i32);
        }

        // The two-word epilogue `PUSH; EXIT` sits directly in the stack
        // segment; `LEV`'s final `pc = pop()` lands on it as if `main` had
        // been `CALL`ed from there. `pc` is always a flat VA, regardless of
        // which segment it currently points into, so this is legal.
        self.push(Opcode::Exit as i32);
        self.push(Opcode::Push as i32);
        let epilogue = self.sp as i32;
        self.push(args.len() as i32);
        self.push(argv as i32);
        self.push(epilogue);

        self.pc = Self::text_addr(main_entry);
        self.ax = 0;
        self.bp = 0;

        loop {
            if let Some(status) = self.step()? {
                return Ok(status);
            }
        }
    }

    /// Fetch, decode and execute one instruction. Returns `Some(status)`
    /// once `EXIT` halts the machine.
    #[tracing::instrument(name = "instruction", skip(self))]
    fn step(&mut self) -> Result<Option<i32>, VmError> {
        let word = self.memory.read_i32(self.pc);
        let op = Opcode::from_word(word).ok_or_else(|| {
            self.dump_state();
            Fault::UnknownOpcode(word)
        })?;
        self.pc += 4;
        if self.trace {
            tracing::info!(?op, pc = self.pc, sp = self.sp, bp = self.bp, ax = self.ax, "dispatch");
        } else {
            tracing::trace!(?op, pc = self.pc, sp = self.sp, bp = self.bp, ax = self.ax, "dispatch");
        }

        match op {
            Opcode::Nop => {}
            Opcode::Imm => self.ax = self.fetch_imm(),
            Opcode::Imx => {
                self.ax = self.fetch_imm();
                let _high = self.fetch_imm();
            }
            Opcode::Lea => {
                let offset = self.fetch_imm();
                self.ax = self.bp.wrapping_add(offset as u32) as i32;
            }
            Opcode::Load => {
                self.ax = (DATA_BASE | ((self.ax as u32) & (PAGE_SIZE - 1))) as i32;
            }
            Opcode::Li => self.ax = self.memory.read_i32(self.ax as u32),
            Opcode::Lc => self.ax = self.memory.read_u8(self.ax as u32) as i32,
            Opcode::Si => {
                let addr = self.pop() as u32;
                self.memory.write_i32(addr, self.ax);
            }
            Opcode::Sc => {
                let addr = self.pop() as u32;
                self.memory.write_u8(addr, (self.ax & 0xff) as u8);
            }
            Opcode::Push => self.push(self.ax),
            Opcode::Jmp => {
                let target = self.fetch_imm();
                self.pc = Self::text_addr(target);
            }
            Opcode::Call => {
                let target = self.fetch_imm();
                // `self.pc` now points just past the immediate, i.e. at the
                // `ADJ` that must follow this call site.
                self.push(self.pc as i32);
                self.pc = Self::text_addr(target);
            }
            Opcode::Jz => {
                let target = self.fetch_imm();
                if self.ax == 0 {
                    self.pc = Self::text_addr(target);
                }
            }
            Opcode::Jnz => {
                let target = self.fetch_imm();
                if self.ax != 0 {
                    self.pc = Self::text_addr(target);
                }
            }
            Opcode::Ent => {
                let frame_size = self.fetch_imm();
                self.push(self.bp as i32);
                self.bp = self.sp;
                self.sp = self.sp.wrapping_sub(frame_size as u32);
            }
            Opcode::Adj => {
                let argc = self.fetch_imm();
                self.sp = self.sp.wrapping_add((argc as u32).wrapping_mul(4));
            }
            Opcode::Lev => {
                self.sp = self.bp;
                self.bp = self.pop() as u32;
                self.pc = self.pop() as u32;
            }
            Opcode::Or => self.binary(|l, r| l | r),
            Opcode::Xor => self.binary(|l, r| l ^ r),
            Opcode::And => self.binary(|l, r| l & r),
            Opcode::Eq => self.binary(|l, r| (l == r) as i32),
            Opcode::Ne => self.binary(|l, r| (l != r) as i32),
            Opcode::Lt => self.binary(|l, r| (l < r) as i32),
            Opcode::Gt => self.binary(|l, r| (l > r) as i32),
            Opcode::Le => self.binary(|l, r| (l <= r) as i32),
            Opcode::Ge => self.binary(|l, r| (l >= r) as i32),
            Opcode::Shl => self.binary(|l, r| l.wrapping_shl(r as u32)),
            Opcode::Shr => self.binary(|l, r| l.wrapping_shr(r as u32)),
            Opcode::Add => self.binary(|l, r| l.wrapping_add(r)),
            Opcode::Sub => self.binary(|l, r| l.wrapping_sub(r)),
            Opcode::Mul => self.binary(|l, r| l.wrapping_mul(r)),
            Opcode::Div => self.binary(|l, r| l.checked_div(r).unwrap_or(0)),
            Opcode::Mod => self.binary(|l, r| l.checked_rem(r).unwrap_or(0)),

            Opcode::Open => self.builtin_open()?,
            Opcode::Read => self.builtin_read()?,
            Opcode::Clos => self.builtin_close(),
            Opcode::Prtf => self.builtin_printf()?,
            Opcode::Malc => self.builtin_malloc()?,
            Opcode::Mset => self.builtin_memset(),
            Opcode::Mcmp => self.builtin_memcmp(),
            Opcode::Trac => self.builtin_trace(),
            Opcode::Tran => self.builtin_translate(),
            Opcode::Exit => {
                println!("exit({})", self.ax);
                return Ok(Some(self.ax));
            }
        }
        Ok(None)
    }

    /// `ax <- pop() OP ax`, the shared shape of every arithmetic/logic
    /// opcode.
    fn binary(&mut self, op: impl FnOnce(i32, i32) -> i32) {
        let lhs = self.pop();
        self.ax = op(lhs, self.ax);
    }

    fn dump_state(&mut self) {
        tracing::error!(ax = self.ax, bp = self.bp, sp = self.sp, pc = self.pc, "runtime fault");
        let top = STACK_BASE + self.config.stack_pages * PAGE_SIZE;
        let mut addr = self.sp;
        while addr < top {
            tracing::error!(addr = format_args!("{addr:#010x}"), word = self.memory.read_i32(addr), "stack");
            addr += 4;
        }
    }

    // ---- built-ins ---------------------------------------------------

    fn builtin_open(&mut self) -> Result<(), VmError> {
        let n = self.arg_count();
        let args = self.builtin_args(n);
        let path_bytes = self.memory.read_cstr(args[0] as u32);
        let path = String::from_utf8_lossy(&path_bytes).into_owned();
        match std::fs::File::open(&path) {
            Ok(file) => {
                let fd = self.next_fd;
                self.next_fd += 1;
                self.open_files.insert(fd, file);
                self.ax = fd;
            }
            Err(_) => self.ax = -1,
        }
        Ok(())
    }

    fn builtin_read(&mut self) -> Result<(), VmError> {
        let n = self.arg_count();
        let args = self.builtin_args(n);
        let (fd, buf_va, want) = (args[0], args[1] as u32, args[2] as usize);
        let Some(file) = self.open_files.get_mut(&fd) else {
            self.ax = -1;
            return Ok(());
        };
        let mut scratch = vec![0u8; want];
        let read = std::io::Read::read(file, &mut scratch).unwrap_or(0);
        self.memory.write_cstr(buf_va, &scratch[..read]);
        self.ax = read as i32;
        Ok(())
    }

    fn builtin_close(&mut self) {
        let n = self.arg_count();
        let args = self.builtin_args(n);
        self.ax = if self.open_files.remove(&args[0]).is_some() { 0 } else { -1 };
    }

    /// `PRTF`: translates every argument past the format string per
    /// `spec.md` §4.5 ("any argument whose value lies in the Data segment
    /// is translated to a host string pointer before being forwarded")
    /// before handing them to [`printf::format`].
    fn builtin_printf(&mut self) -> Result<(), VmError> {
        let n = self.arg_count();
        let raw = self.builtin_args(n);
        let fmt = self.memory.read_cstr(raw[0] as u32);
        let args: Vec<Arg> = raw[1..]
            .iter()
            .map(|&v| {
                let va = v as u32;
                if (DATA_BASE..DATA_BASE + SEGMENT_SPAN).contains(&va) {
                    let bytes = self.memory.read_cstr(va);
                    Arg { raw: v, translated: Some(String::from_utf8_lossy(&bytes).into_owned()) }
                } else {
                    Arg::int(v)
                }
            })
            .collect();
        let rendered = printf::format(&fmt, &args);
        print!("{rendered}");
        std::io::stdout().flush()?;
        self.ax = rendered.len() as i32;
        Ok(())
    }

    fn builtin_malloc(&mut self) -> Result<(), VmError> {
        let n = self.arg_count();
        let args = self.builtin_args(n);
        match self.heap.alloc(args[0] as u32) {
            Ok(va) => {
                self.ax = va as i32;
                Ok(())
            }
            Err(fault) => {
                println!("out of memory");
                Err(fault.into())
            }
        }
    }

    fn builtin_memset(&mut self) {
        let n = self.arg_count();
        let args = self.builtin_args(n);
        self.memory.fill(args[0] as u32, args[1] as u8, args[2] as u32);
        self.ax = 0;
    }

    fn builtin_memcmp(&mut self) {
        let n = self.arg_count();
        let args = self.builtin_args(n);
        self.ax = self.memory.compare(args[0] as u32, args[1] as u32, args[2] as u32);
    }

    fn builtin_trace(&mut self) {
        let n = self.arg_count();
        let args = self.builtin_args(n);
        let previous = self.trace as i32;
        self.trace = args[0] != 0;
        self.ax = previous;
    }

    /// `TRAN`: the original returns the host `FILE*`-style raw pointer to
    /// the guest string as an integer, for the host's own debug prints.
    /// That has no meaningful Rust equivalent without fabricating a pointer
    /// value that the guest could never safely use; this implementation
    /// instead ensures the string's page is mapped (the only real effect a
    /// guest program can observe) and returns the same guest VA unchanged.
    fn builtin_translate(&mut self) {
        let n = self.arg_count();
        let args = self.builtin_args(n);
        let va = args[0] as u32;
        self.memory.read_u8(va);
        self.ax = va as i32;
    }
}
