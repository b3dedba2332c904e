use crate::abi::Signature;
use crate::reloc::{Const, Jump, PutLabel};

use super::{
    Condition, FOp1, FOp2, FOperand, FPrecision, FReg, FlagRequest, LaneSize,
    Op0, Op1, Op2, Operand, Precision, Reg, SimdDesc, SimdOperand,
};

/** The kinds of control transfer `ijump` can make to a computed target. */
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum IJumpKind {
    /** A plain jump. */
    Jump,
    /** An ABI call; the signature describes the argument registers. */
    Call(Signature),
    /** An ABI call that reuses and discards the caller's frame. */
    TailCall(Signature),
    /** A call sharing the caller's register file; no ABI transition. */
    FastCall,
}

/**
 * One abstract instruction, recorded by the emission API and lowered to
 * native bytes by the code generator. Operands were validated at emission
 * time; the second pass only legalizes encodings.
 */
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /** Function entry; `frame` indexes the compiler's frame layout list. */
    Enter { frame: u32 },
    Op0 { op: Op0 },
    Op1 {
        op: Op1,
        prec: Precision,
        flags: FlagRequest,
        dst: Operand,
        src: Operand,
    },
    /** `dst = None` is the `op2u` form: flags only, no result written. */
    Op2 {
        op: Op2,
        prec: Precision,
        flags: FlagRequest,
        dst: Option<Operand>,
        src1: Operand,
        src2: Operand,
    },
    /** Store `cond` as 0/1 into `dst`; `or` accumulates instead of moving. */
    OpFlags { or: bool, prec: Precision, dst: Operand, cond: Condition },
    Select {
        cond: Condition,
        prec: Precision,
        dst: Reg,
        src1: Operand,
        src2: Reg,
    },
    FSelect {
        cond: Condition,
        fprec: FPrecision,
        dst: FReg,
        src1: FOperand,
        src2: FReg,
    },
    FOp1 { op: FOp1, fprec: FPrecision, dst: FOperand, src: FOperand },
    FOp2 {
        op: FOp2,
        fprec: FPrecision,
        dst: FOperand,
        src1: FOperand,
        src2: FOperand,
    },
    /** Sets the float flag group. */
    FCmp { fprec: FPrecision, src1: FOperand, src2: FOperand },
    /** f32 <-> f64. `fprec` is the destination precision. */
    Fcvt { fprec: FPrecision, dst: FOperand, src: FOperand },
    FcvtFromWord {
        fprec: FPrecision,
        dst: FOperand,
        prec: Precision,
        src: Operand,
    },
    /** Truncating conversion. */
    FcvtToWord {
        prec: Precision,
        dst: Operand,
        fprec: FPrecision,
        src: FOperand,
    },
    /** A deferred control transfer; the record holds kind and target. */
    Jump(Jump),
    IJump { kind: IJumpKind, src: Operand },
    /** Return; `src` is `None` for `return_void`. */
    Ret { src: Option<(Op1, Operand)> },
    RetFloat { fprec: FPrecision, src: FOperand },
    /** Tear down the frame, then transfer to `src` instead of returning. */
    ReturnTo { src: Operand },
    /** Capture the return address of the innermost fast call into `dst`. */
    FastEnter { dst: Operand },
    /** Return from a fast call through `src`. */
    FastReturn { src: Operand },
    Const { id: Const, dst: Operand, init: i64 },
    PutLabel { id: PutLabel, dst: Operand },
    /** LL half of a load-link/store-conditional pair. */
    AtomicLoad { op: Op1, dst: Reg, mem: Reg },
    /**
     * SC half; `temp` holds the value the paired load produced. Sets the
     * atomic flag group. On failure the caller retries the whole sequence.
     */
    AtomicStore { op: Op1, src: Reg, mem: Reg, temp: Reg },
    SimdMov { desc: SimdDesc, store: bool, vreg: FReg, data: SimdOperand },
    SimdReplicate { desc: SimdDesc, vreg: FReg, src: SimdOperand },
    SimdLaneMov {
        desc: SimdDesc,
        store: bool,
        vreg: FReg,
        lane: u8,
        data: SimdOperand,
    },
    SimdLaneReplicate { desc: SimdDesc, vreg: FReg, src: FReg, lane: u8 },
    SimdExtend {
        desc: SimdDesc,
        from: LaneSize,
        sign: bool,
        vreg: FReg,
        src: SimdOperand,
    },
    /** Gather the lane sign bits into an integer register. */
    SimdSign { desc: SimdDesc, vreg: FReg, dst: Reg },
    /** `dst = address of locals base + offset`. */
    LocalBase { dst: Operand, offset: i32 },
}
