//! The architecture-neutral instruction model: virtual registers, operands,
//! opcodes and the abstract instruction records the first pass accumulates.

mod operand;
pub use operand::{FOperand, Mem, Operand, SimdOperand};

mod enums;
pub use enums::{
    Condition, FOp1, FOp2, FlagGroup, FlagRequest, Op0, Op1, Op2,
    ALL_CONDITIONS,
};

mod simd;
pub use simd::{LaneSize, SimdDesc, VecWidth};

mod inst;
pub use inst::{IJumpKind, Inst};

//-----------------------------------------------------------------------------

/**
 * Represents the precision of an integer operation.
 * With P32, the arithmetic is performed with 32-bit precision, flags reflect
 * the 32-bit result, and the top 32 bits of a register destination are 0.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Precision {
    P32 = 0,
    P64 = 1,
}

impl Precision {
    pub fn bits(self) -> usize {
        match self {
            Precision::P32 => 32,
            Precision::P64 => 64,
        }
    }
}

/** Represents the precision of a floating point operation. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FPrecision {
    Single = 0,
    Double = 1,
}

impl FPrecision {
    pub fn bytes(self) -> usize {
        match self {
            FPrecision::Single => 4,
            FPrecision::Double => 8,
        }
    }
}

//-----------------------------------------------------------------------------

/**
 * A virtual integer register. `R` registers are scratch (clobbered by any
 * call), `S` registers are saved (preserved by the prologue/epilogue), and
 * `Sp` addresses the current function's local stack area.
 *
 * The indices a function may use are bounded by the counts it declared in
 * `enter`; referencing anything beyond them is a compiler error.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Reg {
    R(u8),
    S(u8),
    Sp,
}

/**
 * A virtual floating point register, which doubles as a vector register for
 * the SIMD operations. `FR` registers are scratch, `FS` registers saved.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FReg {
    FR(u8),
    FS(u8),
}

//-----------------------------------------------------------------------------
