//! The declared shape of a generated function: argument/return types,
//! entry options, register counts, and the stack frame layout the prologue
//! and epilogue agree on.

/** The type of one argument or return slot. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ArgKind {
    /** A machine word. */
    Word = 0,
    /** The low 32 bits of a word. */
    Word32 = 1,
    /** A pointer-sized word. */
    Ptr = 2,
    F64 = 3,
    F32 = 4,
}

impl ArgKind {
    pub fn is_float(self) -> bool {
        matches!(self, ArgKind::F64 | ArgKind::F32)
    }
}

//-----------------------------------------------------------------------------

/** The maximum number of argument slots a signature can declare. */
pub const MAX_ARGS: usize = 4;

/**
 * A function signature: an optional return type and up to [`MAX_ARGS`]
 * argument slots. Word arguments are delivered to `S0, S1, ..` in argument
 * order (or `R0, R1, ..` under [`EnterOptions::reg_arg`]); float arguments
 * are delivered to `FR0, FR1, ..` in float-argument order. Calls expect
 * their outgoing arguments in the same registers.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    ret: Option<ArgKind>,
    args: [ArgKind; MAX_ARGS],
    nargs: u8,
}

impl Signature {
    /** No arguments, no return value. */
    pub const VOID: Signature =
        Signature { ret: None, args: [ArgKind::Word; MAX_ARGS], nargs: 0 };

    pub fn returns(ret: ArgKind) -> Self {
        Signature { ret: Some(ret), ..Signature::VOID }
    }

    /** Appends an argument slot. Panics beyond [`MAX_ARGS`] slots. */
    pub fn arg(mut self, kind: ArgKind) -> Self {
        assert!((self.nargs as usize) < MAX_ARGS, "too many argument slots");
        self.args[self.nargs as usize] = kind;
        self.nargs += 1;
        self
    }

    pub fn ret(&self) -> Option<ArgKind> {
        self.ret
    }

    pub fn args(&self) -> &[ArgKind] {
        &self.args[..self.nargs as usize]
    }

    pub fn word_arg_count(&self) -> usize {
        self.args().iter().filter(|k| !k.is_float()).count()
    }

    pub fn float_arg_count(&self) -> usize {
        self.args().iter().filter(|k| k.is_float()).count()
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature::VOID
    }
}

//-----------------------------------------------------------------------------

/** Options accepted by `enter`. */
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct EnterOptions {
    /**
     * Arguments stay in the scratch argument registers `R0..`; nothing is
     * moved to saved registers. For functions that only forward to another
     * call.
     */
    pub reg_arg: bool,
    /**
     * The first `keep` saved registers are neither saved nor restored nor
     * written; they pass the caller's values through. Requires `reg_arg`.
     */
    pub keep: u8,
}

impl EnterOptions {
    pub fn reg_arg() -> Self {
        EnterOptions { reg_arg: true, keep: 0 }
    }

    pub fn keep(n: u8) -> Self {
        EnterOptions { reg_arg: true, keep: n }
    }
}

/** How many registers of each class the function body will use. */
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct RegRequest {
    pub scratches: u8,
    pub saveds: u8,
    pub fscratches: u8,
    pub fsaveds: u8,
}

impl RegRequest {
    pub fn words(scratches: u8, saveds: u8) -> Self {
        RegRequest { scratches, saveds, fscratches: 0, fsaveds: 0 }
    }

    pub fn with_floats(mut self, fscratches: u8, fsaveds: u8) -> Self {
        self.fscratches = fscratches;
        self.fsaveds = fsaveds;
        self
    }
}

/** The upper bound on `local_size`. */
pub const MAX_LOCAL_SIZE: u32 = 1 << 16;

//-----------------------------------------------------------------------------

/**
 * The frame layout `enter` commits to, shared by the prologue, the
 * epilogue, every `Sp`-relative operand and `get_local_base`.
 *
 * After the prologue, from the stack pointer upward: `local_size` bytes of
 * locals, the float-saved spill area, alignment padding, the pushed saved
 * registers, the return address. The stack pointer is 16-byte aligned
 * while the body runs, so ABI calls need no further adjustment.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub options: EnterOptions,
    pub sig: Signature,
    pub regs: RegRequest,
    pub local_size: u32,
    /** Offset of the float-saved spill area from the stack pointer. */
    pub fsave_off: u32,
    /** Bytes subtracted from the stack pointer after the register pushes. */
    pub sub_bytes: u32,
}

/** Bytes reserved per saved float register (they double as vectors). */
const FSAVE_SLOT: u32 = 16;

fn round_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) & !(alignment - 1)
}

impl FrameLayout {
    pub fn new(
        options: EnterOptions,
        sig: Signature,
        regs: RegRequest,
        local_size: u32,
    ) -> Self {
        let fsave_off = round_up(local_size, 8);
        let raw = fsave_off + FSAVE_SLOT * u32::from(regs.fsaveds);
        let pushes = u32::from(regs.saveds - options.keep);
        // Entry leaves the stack pointer 8 mod 16; land on 0 mod 16.
        let mut sub_bytes = round_up(raw, 8);
        if (8 + 8 * pushes + sub_bytes) % 16 != 0 {
            sub_bytes += 8;
        }
        FrameLayout { options, sig, regs, local_size, fsave_off, sub_bytes }
    }

    /** The saved register indices the prologue pushes, in push order. */
    pub fn pushed_saveds(&self) -> impl DoubleEndedIterator<Item = u8> {
        self.options.keep..self.regs.saveds
    }

    /** The saved float register indices spilled below the pushes. */
    pub fn spilled_fsaveds(&self) -> impl Iterator<Item = u8> {
        0..self.regs.fsaveds
    }

    /** Spill slot offset of saved float register `i`, from the stack pointer. */
    pub fn fsave_slot(&self, i: u8) -> i32 {
        (self.fsave_off + FSAVE_SLOT * u32::from(i)) as i32
    }
}

//-----------------------------------------------------------------------------
