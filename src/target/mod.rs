//! The seam between the architecture-neutral compiler and the per-target
//! instruction encoders. Exactly one target is active in a given binary,
//! selected at build time, so the seam is a trait with static dispatch.

use crate::abi::FrameLayout;
use crate::cpu::CpuFeatures;
use crate::error::Result;
use crate::ir::Inst;
use crate::reloc::Relocs;

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use x86_64::Encoder as Native;

#[cfg(not(target_arch = "x86_64"))]
mod unsupported;

#[cfg(not(target_arch = "x86_64"))]
pub use unsupported::Encoder as Native;

//-----------------------------------------------------------------------------

/**
 * Where an instruction left a field for the code generator to patch once
 * addresses are known. Offsets are relative to the start of the code.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Site {
    /** A 32-bit displacement ending at `disp_pos + 4`, relative to the
     * instruction that follows it. */
    Rel32 { disp_pos: usize },
    /** An absolute 64-bit immediate. The encoding is position-independent,
     * so the field can be re-patched in place after generation. */
    Abs64 { imm_pos: usize },
}

/**
 * Lowers abstract instruction records to native bytes. The encoder is the
 * first of the two assembly passes: it grows a byte buffer, remembers
 * where patchable fields fell, and leaves address resolution to the code
 * generator.
 */
pub trait CodeEncoder {
    /** The number of scratch registers the target exposes. */
    const MAX_SCRATCHES: u8;
    const MAX_SAVEDS: u8;
    const MAX_FSCRATCHES: u8;
    const MAX_FSAVEDS: u8;
    /** Whether 256-bit vector operations can ever be encoded. */
    const SUPPORTS_V256: bool;

    fn new(features: CpuFeatures) -> Self;

    /** Pre-reserves literal pool capacity, in bytes. */
    fn reserve_pool(&mut self, bytes: usize);

    /** The native offset the next instruction will be encoded at. */
    fn offset(&self) -> usize;

    /**
     * Lowers one instruction. `Jump`, `Const` and `PutLabel` records
     * return the patch site their encoding reserved; everything else
     * returns `None`.
     */
    fn encode(
        &mut self,
        inst: &Inst,
        relocs: &Relocs,
        frames: &[FrameLayout],
    ) -> Result<Option<Site>>;

    /** Appends the literal pool and returns the finished code bytes. */
    fn finish(self) -> Result<Vec<u8>>;
}
