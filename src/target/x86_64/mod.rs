//! The x86_64 (System V) reference backend: a byte-level [`Assembler`] and
//! the [`Encoder`] that lowers abstract instruction records through it.

use crate::ir::{Condition, FReg, Reg};

mod assembler;
pub use assembler::{Addr, AluOp, Assembler, Cc, Register, Rm, ShiftOp, Xmm, XmmRm};

mod encoder;
pub use encoder::Encoder;

use Register::*;

/**
 * The physical homes of the scratch registers `R0..`. `R0` is `RA` so the
 * ABI return value needs no move, `R1` is `RD` so the long-multiply and
 * divide pairs operate in place, and `R3` is `RC`, the hardware's shift
 * count register.
 */
pub const SCRATCHES: [Register; 7] = [RA, RD, RSI, RC, RDI, R8, R9];

/** The physical homes of the saved registers `S0..`, in push order. */
pub const SAVEDS: [Register; 6] = [RB, R12, R13, R14, R15, RBP];

/** Workspace for operand legalization; never allocated to client code. */
pub const TEMP1: Register = R10;

/** Second workspace: displacement staging, parallel-move cycles. */
pub const TEMP2: Register = R11;

/**
 * In the System V amd64 calling convention, these registers hold the
 * integer- or pointer-type function arguments, in order.
 */
pub const ARGUMENTS: [Register; 4] = [RDI, RSI, RD, RC];

/** The float registers `FR0..`; identical to the System V float argument
 * and result order. */
pub const FSCRATCHES: [Xmm; 8] = [
    Xmm(0), Xmm(1), Xmm(2), Xmm(3), Xmm(4), Xmm(5), Xmm(6), Xmm(7),
];

/**
 * The float registers `FS0..`. System V preserves no vector registers, so
 * the prologue spills these to the stack frame and the epilogue reloads
 * them.
 */
pub const FSAVEDS: [Xmm; 2] = [Xmm(15), Xmm(14)];

/** Float workspace for operand legalization. */
pub const FTEMP1: Xmm = Xmm(8);
pub const FTEMP2: Xmm = Xmm(9);

/** The physical home of a virtual integer register. `Sp` has no direct
 * home; it is only addressable through memory operands. */
pub fn reg(r: Reg) -> Register {
    match r {
        Reg::R(n) => SCRATCHES[n as usize],
        Reg::S(n) => SAVEDS[n as usize],
        Reg::Sp => RSP,
    }
}

pub fn freg(f: FReg) -> Xmm {
    match f {
        FReg::FR(n) => FSCRATCHES[n as usize],
        FReg::FS(n) => FSAVEDS[n as usize],
    }
}

/**
 * The condition code testing `cond` against the flags its producer left.
 * Integer comparisons come from a `sub`/`cmp`, float conditions from a
 * `ucomiss`/`ucomisd`, and the atomic conditions from a `cmpxchg`.
 */
pub fn cc(cond: Condition) -> Cc {
    use Condition::*;
    match cond {
        Equal | FEqual | AtomicStored => Cc::Z,
        NotEqual | FNotEqual | AtomicNotStored => Cc::NZ,
        Less | Carry | FLess => Cc::B,
        GreaterEqual | NotCarry | FGreaterEqual => Cc::AE,
        Greater | FGreater => Cc::A,
        LessEqual | FLessEqual => Cc::BE,
        SigLess => Cc::L,
        SigGreaterEqual => Cc::GE,
        SigGreater => Cc::G,
        SigLessEqual => Cc::LE,
        Overflow => Cc::O,
        NotOverflow => Cc::NO,
        Unordered => Cc::P,
        Ordered => Cc::NP,
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ALL_CONDITIONS;

    #[test]
    fn register_pools_are_disjoint() {
        let mut seen = Vec::new();
        seen.extend_from_slice(&SCRATCHES);
        seen.extend_from_slice(&SAVEDS);
        seen.push(TEMP1);
        seen.push(TEMP2);
        seen.push(RSP);
        seen.sort_by_key(|&r| r as u8);
        seen.dedup();
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn inverse_conditions_are_inverse_codes() {
        for &cond in &ALL_CONDITIONS {
            assert_eq!(cc(cond) as u8 ^ 1, cc(cond.invert()) as u8);
        }
    }
}
