//! Lowers the architecture-neutral instruction records to x86_64 bytes.
//!
//! Operand shapes the hardware cannot express directly are legalized
//! through the two reserved temporaries: `TEMP1` stages values, `TEMP2`
//! stages oversized displacements, shift counts and parallel-move cycles.
//! Sequences that run inside a live flag window use only flag-preserving
//! instructions (`mov`, `lea`, `xchg`, `cmov`, `setcc` and branches).

use indexmap::IndexMap;

use crate::abi::{FrameLayout, Signature};
use crate::cpu::CpuFeatures;
use crate::error::{Error, Result};
use crate::ir::{
    Condition, FOp1, FOp2, FOperand, FPrecision, FReg, FlagRequest, IJumpKind,
    Inst, LaneSize, Mem, Op0, Op1, Op2, Operand, Precision, Reg, SimdDesc,
    SimdOperand,
};
use crate::reloc::{Jump, JumpKind, JumpTarget, Relocs};
use crate::target::{CodeEncoder, Site};

use super::assembler::{Addr, AluOp, Assembler, Cc, Register, Rm, ShiftOp, Xmm, XmmRm};
use super::{
    cc, freg, reg, ARGUMENTS, FSAVEDS, FTEMP1, FTEMP2, SAVEDS, SCRATCHES,
    TEMP1, TEMP2,
};
use Precision::{P32, P64};
use Register::{RA, RC, RD, RSP};

fn alu_op(op: Op2) -> AluOp {
    match op {
        Op2::Add => AluOp::Add,
        Op2::Addc => AluOp::Adc,
        Op2::Sub => AluOp::Sub,
        Op2::Subc => AluOp::Sbb,
        Op2::And => AluOp::And,
        Op2::Or => AluOp::Or,
        Op2::Xor => AluOp::Xor,
        _ => panic!("not a group-1 operation"),
    }
}

fn shift_op(op: Op2) -> ShiftOp {
    match op {
        Op2::Shl => ShiftOp::Shl,
        Op2::Lshr => ShiftOp::Shr,
        Op2::Ashr => ShiftOp::Sar,
        Op2::Rotl => ShiftOp::Rol,
        Op2::Rotr => ShiftOp::Ror,
        _ => panic!("not a shift operation"),
    }
}

fn fop_opcode(op: FOp2) -> u8 {
    match op {
        FOp2::Add => 0x58,
        FOp2::Sub => 0x5C,
        FOp2::Mul => 0x59,
        FOp2::Div => 0x5E,
    }
}

/** Whether `op` reads the virtual register `r`. */
fn reads(op: &Operand, r: Reg) -> bool {
    match op {
        Operand::Reg(s) => *s == r,
        Operand::Imm(_) => false,
        Operand::Mem(m) => m.regs().any(|s| s == r),
    }
}

/** The value a narrowing `Mov` variant turns `v` into. */
fn narrow_imm(op: Op1, v: i64) -> i64 {
    match op {
        Op1::MovU8 => v as u8 as i64,
        Op1::MovS8 => v as i8 as i64,
        Op1::MovU16 => v as u16 as i64,
        Op1::MovS16 => v as i16 as i64,
        Op1::MovU32 => v as u32 as i64,
        Op1::MovS32 => v as i32 as i64,
        _ => v,
    }
}

//-----------------------------------------------------------------------------

/**
 * The x86_64 instruction encoder. One [`encode`] call lowers one abstract
 * instruction; [`finish`] appends the literal pool and resolves the
 * RIP-relative references into it.
 *
 * [`encode`]: CodeEncoder::encode
 * [`finish`]: CodeEncoder::finish
 */
pub struct Encoder {
    a: Assembler,
    features: CpuFeatures,
    /** 16-byte literal pool entries, deduplicated, in insertion order. */
    pool: IndexMap<(u64, u64), ()>,
    /** RIP-relative displacements waiting for the pool base: offset of
     * the 32-bit field, pool entry index. */
    fixups: Vec<(usize, usize)>,
    /** The frame layout of the function currently being lowered. */
    frame: usize,
}

impl CodeEncoder for Encoder {
    const MAX_SCRATCHES: u8 = SCRATCHES.len() as u8;
    const MAX_SAVEDS: u8 = SAVEDS.len() as u8;
    const MAX_FSCRATCHES: u8 = 8;
    const MAX_FSAVEDS: u8 = FSAVEDS.len() as u8;
    const SUPPORTS_V256: bool = false;

    fn new(features: CpuFeatures) -> Self {
        Encoder {
            a: Assembler::new(),
            features,
            pool: IndexMap::new(),
            fixups: Vec::new(),
            frame: 0,
        }
    }

    fn reserve_pool(&mut self, bytes: usize) {
        self.pool.reserve(bytes / 16 + 1);
    }

    fn offset(&self) -> usize {
        self.a.pos()
    }

    fn encode(
        &mut self,
        inst: &Inst,
        relocs: &Relocs,
        frames: &[FrameLayout],
    ) -> Result<Option<Site>> {
        match inst {
            Inst::Enter { frame } => {
                self.frame = *frame as usize;
                self.prologue(&frames[self.frame]);
            }
            Inst::Op0 { op } => self.op0(*op),
            Inst::Op1 { op, prec, flags, dst, src } => {
                self.op1(*op, *prec, *flags, dst, src);
            }
            Inst::Op2 { op, prec, flags, dst, src1, src2 } => {
                self.op2(*op, *prec, *flags, dst.as_ref(), src1, src2);
            }
            Inst::OpFlags { or, prec, dst, cond } => {
                self.op_flags(*or, *prec, dst, *cond);
            }
            Inst::Select { cond, prec, dst, src1, src2 } => {
                self.select(*cond, *prec, *dst, src1, *src2);
            }
            Inst::FSelect { cond, fprec, dst, src1, src2 } => {
                self.fselect(*cond, *fprec, *dst, src1, *src2);
            }
            Inst::FOp1 { op, fprec, dst, src } => self.fop1(*op, *fprec, dst, src),
            Inst::FOp2 { op, fprec, dst, src1, src2 } => {
                self.fop2(*op, *fprec, dst, src1, src2);
            }
            Inst::FCmp { fprec, src1, src2 } => {
                let double = *fprec == FPrecision::Double;
                let a = self.read_float(double, src1, FTEMP1);
                let rm = self.float_rm(double, src2, FTEMP2);
                self.a.ucomis(double, a, rm);
            }
            Inst::Fcvt { fprec, dst, src } => self.fcvt(*fprec, dst, src),
            Inst::FcvtFromWord { fprec, dst, prec, src } => {
                self.fcvt_from_word(*fprec, dst, *prec, src);
            }
            Inst::FcvtToWord { prec, dst, fprec, src } => {
                self.fcvt_to_word(*prec, dst, *fprec, src);
            }
            Inst::Jump(j) => return Ok(Some(self.jump(*j, relocs, frames))),
            Inst::IJump { kind, src } => self.ijump(*kind, src, frames),
            Inst::Ret { src } => {
                if let Some((op, src)) = src {
                    self.ret_value(*op, src);
                }
                self.epilogue(&frames[self.frame]);
                self.a.ret();
            }
            Inst::RetFloat { fprec, src } => {
                let double = *fprec == FPrecision::Double;
                match src {
                    FOperand::Reg(f) if freg(*f) == Xmm(0) => {}
                    FOperand::Reg(f) => self.a.movaps(Xmm(0), freg(*f)),
                    _ => {
                        let s = self.read_float(double, src, Xmm(0));
                        debug_assert_eq!(s, Xmm(0));
                    }
                }
                self.epilogue(&frames[self.frame]);
                self.a.ret();
            }
            Inst::ReturnTo { src } => {
                self.stage_target(src);
                self.epilogue(&frames[self.frame]);
                self.a.jmp_rm(Rm::Reg(TEMP1));
            }
            Inst::FastEnter { dst } => match dst {
                Operand::Reg(r) => self.a.pop(reg(*r)),
                _ => {
                    self.a.pop(TEMP1);
                    self.write_int(P64, dst, TEMP1);
                }
            },
            Inst::FastReturn { src } => {
                let rm = self.transfer_rm(src);
                self.a.jmp_rm(rm);
            }
            Inst::Const { dst, init, .. } => {
                return Ok(Some(self.load_abs64(dst, *init)));
            }
            Inst::PutLabel { dst, .. } => {
                return Ok(Some(self.load_abs64(dst, 0)));
            }
            Inst::AtomicLoad { op, dst, mem } => self.atomic_load(*op, *dst, *mem),
            Inst::AtomicStore { op, src, mem, temp } => {
                self.atomic_store(*op, *src, *mem, *temp);
            }
            Inst::SimdMov { store, vreg, data, .. } => {
                self.simd_mov(*store, *vreg, data);
            }
            Inst::SimdReplicate { desc, vreg, src } => {
                self.simd_replicate(*desc, *vreg, src);
            }
            Inst::SimdLaneMov { desc, store, vreg, lane, data } => {
                self.simd_lane_mov(desc.lane, *store, *vreg, *lane, data);
            }
            Inst::SimdLaneReplicate { desc, vreg, src, lane } => {
                let (v, s) = (freg(*vreg), freg(*src));
                match desc.lane {
                    LaneSize::L32 => self.a.pshufd(v, s, lane * 0b0101_0101),
                    LaneSize::L64 => {
                        self.a.pshufd(v, s, if *lane == 0 { 0x44 } else { 0xEE });
                    }
                    _ => unreachable!("rejected at emission time"),
                }
            }
            Inst::SimdExtend { desc, from, sign, vreg, src } => {
                let rm = self.simd_xmm_rm(src);
                self.a.pmovx(*sign, *from, desc.lane, freg(*vreg), rm);
            }
            Inst::SimdSign { desc, vreg, dst } => {
                let (d, v) = (reg(*dst), freg(*vreg));
                match desc.lane {
                    LaneSize::L8 => self.a.pmovmskb(d, v),
                    LaneSize::L32 => self.a.movmskp(false, d, v),
                    LaneSize::L64 => self.a.movmskp(true, d, v),
                    LaneSize::L16 => unreachable!("rejected at emission time"),
                }
            }
            Inst::LocalBase { dst, offset } => {
                let w = match dst {
                    Operand::Reg(r) => reg(*r),
                    _ => TEMP1,
                };
                self.a.lea(P64, w, Addr::base(RSP, *offset));
                if !matches!(dst, Operand::Reg(_)) {
                    self.write_int(P64, dst, w);
                }
            }
        }
        Ok(None)
    }

    fn finish(self) -> Result<Vec<u8>> {
        let Encoder { a, pool, fixups, .. } = self;
        let mut bytes = a.into_bytes();
        if pool.is_empty() {
            return Ok(bytes);
        }
        // The pool follows the code, 16-byte aligned, padded with int3.
        while bytes.len() % 16 != 0 {
            bytes.push(0xCC);
        }
        let base = bytes.len();
        for (&(lo, hi), ()) in &pool {
            bytes.extend_from_slice(&lo.to_le_bytes());
            bytes.extend_from_slice(&hi.to_le_bytes());
        }
        for (disp_pos, entry) in fixups {
            let target = (base + entry * 16) as i64;
            let disp = i32::try_from(target - (disp_pos + 4) as i64)
                .map_err(|_| Error::Unsupported)?;
            bytes[disp_pos..disp_pos + 4].copy_from_slice(&disp.to_le_bytes());
        }
        Ok(bytes)
    }
}

//-----------------------------------------------------------------------------

impl Encoder {
    // Operand plumbing.

    /**
     * Maps a virtual memory reference, staging a displacement that does
     * not fit in 32 bits through `TEMP2` with flag-preserving
     * instructions. The result must be used before the next `addr` call.
     */
    fn addr(&mut self, m: &Mem) -> Addr {
        let index = m.index.map(|(r, s)| (reg(r), s));
        if let Ok(disp) = i32::try_from(m.disp) {
            return Addr { base: m.base.map(reg), index, disp };
        }
        self.a.const_(P64, TEMP2, m.disp);
        match (m.base, index) {
            (None, None) => Addr::base(TEMP2, 0),
            (Some(b), None) => Addr::indexed(reg(b), TEMP2, 0, 0),
            (Some(b), Some((i, s))) => {
                // The base goes in the SIB base slot: it may be `RSP`,
                // which cannot be an index.
                self.a.lea(P64, TEMP2, Addr::indexed(reg(b), TEMP2, 0, 0));
                Addr::indexed(TEMP2, i, s, 0)
            }
            (None, Some(_)) => unreachable!("index without a base"),
        }
    }

    /** A register or memory operand; immediates are the caller's
     * business. */
    fn rm(&mut self, op: &Operand) -> Rm {
        match op {
            Operand::Reg(r) => Rm::Reg(reg(*r)),
            Operand::Mem(m) => Rm::Mem(self.addr(m)),
            Operand::Imm(_) => unreachable!("immediate needs staging"),
        }
    }

    /** Puts `src` in `w` (all forms flag-preserving). */
    fn into_reg(&mut self, prec: Precision, w: Register, src: &Operand) {
        match src {
            Operand::Reg(r) => {
                let s = reg(*r);
                if s != w {
                    self.a.mov_rr(prec, w, s);
                }
            }
            Operand::Imm(v) => self.a.const_(prec, w, *v),
            Operand::Mem(m) => {
                let a = self.addr(m);
                self.a.load(prec, w, a);
            }
        }
    }

    /** Writes the work register back to a register or memory
     * destination. */
    fn write_int(&mut self, prec: Precision, dst: &Operand, src: Register) {
        match dst {
            Operand::Reg(r) => {
                let d = reg(*r);
                if d != src {
                    self.a.mov_rr(prec, d, src);
                }
            }
            Operand::Mem(m) => {
                let a = self.addr(m);
                self.a.store(prec, a, src);
            }
            Operand::Imm(_) => unreachable!("immediate destination"),
        }
    }

    // The literal pool.

    fn pool_entry(&mut self, lo: u64, hi: u64) -> usize {
        self.pool.insert_full((lo, hi), ()).0
    }

    /** Loads a float immediate from the pool. */
    fn load_pool(&mut self, double: bool, dst: Xmm, value: f64) {
        let entry = if double {
            self.pool_entry(value.to_bits(), 0)
        } else {
            self.pool_entry(u64::from((value as f32).to_bits()), 0)
        };
        let disp_pos = self.a.movs_rip(double, dst);
        self.fixups.push((disp_pos, entry));
    }

    /** Places a float operand in a vector register, staging through
     * `tmp` where necessary. */
    fn read_float(&mut self, double: bool, src: &FOperand, tmp: Xmm) -> Xmm {
        match src {
            FOperand::Reg(f) => freg(*f),
            FOperand::Imm(v) => {
                self.load_pool(double, tmp, *v);
                tmp
            }
            FOperand::Mem(m) => {
                let a = self.addr(m);
                self.a.movs_load(double, tmp, a.into());
                tmp
            }
        }
    }

    /** A float operand in ModR/M position. */
    fn float_rm(&mut self, double: bool, src: &FOperand, tmp: Xmm) -> XmmRm {
        match src {
            FOperand::Reg(f) => XmmRm::Reg(freg(*f)),
            FOperand::Mem(m) => XmmRm::Mem(self.addr(m)),
            FOperand::Imm(v) => {
                self.load_pool(double, tmp, *v);
                XmmRm::Reg(tmp)
            }
        }
    }

    fn write_float(&mut self, double: bool, dst: &FOperand, src: Xmm) {
        match dst {
            FOperand::Reg(f) => {
                let d = freg(*f);
                if d != src {
                    self.a.movaps(d, src);
                }
            }
            FOperand::Mem(m) => {
                let a = self.addr(m);
                self.a.movs_store(double, a, src);
            }
            FOperand::Imm(_) => unreachable!("immediate destination"),
        }
    }

    // Prologue and epilogue.

    fn prologue(&mut self, layout: &FrameLayout) {
        for i in layout.pushed_saveds() {
            self.a.push(SAVEDS[i as usize]);
        }
        if layout.sub_bytes > 0 {
            self.a.alu_imm(AluOp::Sub, P64, Rm::Reg(RSP), layout.sub_bytes as i32);
        }
        for i in layout.spilled_fsaveds() {
            let slot = Addr::base(RSP, layout.fsave_slot(i));
            self.a.movups_store(slot, FSAVEDS[i as usize]);
        }
        // Word arguments arrive in the ABI argument registers and move to
        // their virtual homes; float arguments are already in place.
        let homes = if layout.options.reg_arg { &SCRATCHES[..] } else { &SAVEDS[..] };
        let moves = layout
            .sig
            .args()
            .iter()
            .filter(|k| !k.is_float())
            .enumerate()
            .map(|(i, _)| (ARGUMENTS[i], homes[i]))
            .collect();
        self.parallel_move(moves);
    }

    /** Tears the frame down, leaving only the return address. */
    fn epilogue(&mut self, layout: &FrameLayout) {
        for i in layout.spilled_fsaveds() {
            let slot = Addr::base(RSP, layout.fsave_slot(i));
            self.a.movups_load(FSAVEDS[i as usize], slot);
        }
        if layout.sub_bytes > 0 {
            self.a.alu_imm(AluOp::Add, P64, Rm::Reg(RSP), layout.sub_bytes as i32);
        }
        for i in layout.pushed_saveds().rev() {
            self.a.pop(SAVEDS[i as usize]);
        }
    }

    /**
     * Emits `moves` as if they happened simultaneously, breaking cycles
     * through `TEMP2`.
     */
    fn parallel_move(&mut self, mut moves: Vec<(Register, Register)>) {
        moves.retain(|&(src, dst)| src != dst);
        while !moves.is_empty() {
            let free = moves
                .iter()
                .position(|&(_, dst)| !moves.iter().any(|&(src, _)| src == dst));
            match free {
                Some(i) => {
                    let (src, dst) = moves.remove(i);
                    self.a.mov_rr(P64, dst, src);
                }
                None => {
                    let (src, _) = moves[0];
                    self.a.mov_rr(P64, TEMP2, src);
                    for m in moves.iter_mut().filter(|m| m.0 == src) {
                        m.0 = TEMP2;
                    }
                }
            }
        }
    }

    // No-operand operations.

    fn op0(&mut self, op: Op0) {
        match op {
            Op0::Breakpoint => self.a.int3(),
            Op0::Nop => self.a.nop(),
            Op0::Endbr => self.a.endbr64(),
            Op0::MemBarrier => self.a.mfence(),
            Op0::LMulUw => self.a.mul1(P64, Rm::Reg(RD)),
            Op0::LMulSw => self.a.imul1(P64, Rm::Reg(RD)),
            Op0::DivmodUw => {
                self.a.mov_rr(P64, TEMP1, RD);
                self.a.alu_rm_r(AluOp::Xor, P32, Rm::Reg(RD), RD);
                self.a.div(P64, Rm::Reg(TEMP1));
            }
            Op0::DivmodSw => {
                self.a.mov_rr(P64, TEMP1, RD);
                self.a.cdq(P64);
                self.a.idiv(P64, Rm::Reg(TEMP1));
            }
            Op0::DivUw => {
                self.a.mov_rr(P64, TEMP1, RD);
                self.a.alu_rm_r(AluOp::Xor, P32, Rm::Reg(RD), RD);
                self.a.div(P64, Rm::Reg(TEMP1));
                self.a.mov_rr(P64, RD, TEMP1);
            }
            Op0::DivSw => {
                self.a.mov_rr(P64, TEMP1, RD);
                self.a.cdq(P64);
                self.a.idiv(P64, Rm::Reg(TEMP1));
                self.a.mov_rr(P64, RD, TEMP1);
            }
            Op0::SkipFramesBeforeReturn => {
                self.a.alu_imm(AluOp::Add, P64, Rm::Reg(RSP), 8);
            }
        }
    }

    // Single-operand operations.

    fn op1(&mut self, op: Op1, prec: Precision, flags: FlagRequest, dst: &Operand, src: &Operand) {
        match op {
            Op1::Mov => self.mov(prec, dst, src),
            Op1::Not => self.not(prec, flags, dst, src),
            Op1::Clz | Op1::Ctz => self.count_zeros(op == Op1::Clz, prec, dst, src),
            _ => self.mov_narrow(op, prec, dst, src),
        }
    }

    fn mov(&mut self, prec: Precision, dst: &Operand, src: &Operand) {
        match (dst, src) {
            (Operand::Reg(d), Operand::Reg(s)) => {
                let (d, s) = (reg(*d), reg(*s));
                // A same-register 32-bit move still zeroes the top half.
                if d != s || prec == P32 {
                    self.a.mov_rr(prec, d, s);
                }
            }
            (Operand::Reg(d), Operand::Imm(v)) => self.a.const_(prec, reg(*d), *v),
            (Operand::Reg(d), Operand::Mem(m)) => {
                let a = self.addr(m);
                self.a.load(prec, reg(*d), a);
            }
            (Operand::Mem(m), Operand::Reg(s)) => {
                let s = reg(*s);
                let a = self.addr(m);
                self.a.store(prec, a, s);
            }
            (Operand::Mem(m), Operand::Imm(v)) => {
                if prec == P32 || i32::try_from(*v).is_ok() {
                    let a = self.addr(m);
                    self.a.store_imm(prec, a, *v as i32);
                } else {
                    self.a.const_(P64, TEMP1, *v);
                    let a = self.addr(m);
                    self.a.store(P64, a, TEMP1);
                }
            }
            (Operand::Mem(m), Operand::Mem(s)) => {
                let a = self.addr(s);
                self.a.load(prec, TEMP1, a);
                let a = self.addr(m);
                self.a.store(prec, a, TEMP1);
            }
            (Operand::Imm(_), _) => unreachable!("immediate destination"),
        }
    }

    /** Dispatches a narrowing or extending load. */
    fn load_narrow(&mut self, op: Op1, prec: Precision, dst: Register, src: Rm) {
        match op {
            Op1::MovU8 => self.a.movzx8(prec, dst, src),
            Op1::MovS8 => self.a.movsx8(prec, dst, src),
            Op1::MovU16 => self.a.movzx16(prec, dst, src),
            Op1::MovS16 => self.a.movsx16(prec, dst, src),
            Op1::MovU32 => self.a.mov32(dst, src),
            Op1::MovS32 => {
                if prec == P64 {
                    self.a.movsx32(dst, src);
                } else {
                    self.a.mov32(dst, src);
                }
            }
            _ => unreachable!("not a narrowing move"),
        }
    }

    fn mov_narrow(&mut self, op: Op1, prec: Precision, dst: &Operand, src: &Operand) {
        match dst {
            // Register destinations extend.
            Operand::Reg(d) => match src {
                Operand::Imm(v) => self.a.const_(prec, reg(*d), narrow_imm(op, *v)),
                _ => {
                    let rm = self.rm(src);
                    self.load_narrow(op, prec, reg(*d), rm);
                }
            },
            // Memory destinations store the low bytes.
            Operand::Mem(m) => {
                let bytes = op.access_bytes();
                let s = match src {
                    Operand::Reg(r) => reg(*r),
                    Operand::Imm(v) => {
                        let mask = if bytes == 8 { !0 } else { (1i64 << (bytes * 8)) - 1 };
                        self.a.const_(P64, TEMP1, *v & mask);
                        TEMP1
                    }
                    Operand::Mem(sm) => {
                        let rm = Rm::Mem(self.addr(sm));
                        self.load_narrow(op, P64, TEMP1, rm);
                        TEMP1
                    }
                };
                let a = self.addr(m);
                match bytes {
                    1 => self.a.store8(a, s),
                    2 => self.a.store16(a, s),
                    4 => self.a.store32(a, s),
                    _ => self.a.store(P64, a, s),
                }
            }
            Operand::Imm(_) => unreachable!("immediate destination"),
        }
    }

    fn not(&mut self, prec: Precision, flags: FlagRequest, dst: &Operand, src: &Operand) {
        if dst == src && flags.is_none() && !matches!(dst, Operand::Imm(_)) {
            let rm = self.rm(dst);
            self.a.not_(prec, rm);
            return;
        }
        let w = match dst {
            Operand::Reg(r) => reg(*r),
            _ => TEMP1,
        };
        self.into_reg(prec, w, src);
        self.a.not_(prec, Rm::Reg(w));
        if flags.zero {
            // `not` leaves the flags alone; derive them from the result.
            self.a.test(prec, Rm::Reg(w), w);
        }
        if !matches!(dst, Operand::Reg(_)) {
            self.write_int(prec, dst, w);
        }
    }

    fn count_zeros(&mut self, leading: bool, prec: Precision, dst: &Operand, src: &Operand) {
        let w = match dst {
            Operand::Reg(r) => reg(*r),
            _ => TEMP1,
        };
        let rm = match src {
            Operand::Imm(v) => {
                self.a.const_(prec, w, *v);
                Rm::Reg(w)
            }
            _ => self.rm(src),
        };
        let bits = prec.bits() as i64;
        if leading {
            if self.features.lzcnt {
                self.a.lzcnt(prec, w, rm);
            } else {
                self.a.bsr(prec, w, rm);
                self.a.const_(prec, TEMP2, 2 * bits - 1);
                self.a.cmov(Cc::Z, prec, w, Rm::Reg(TEMP2));
                self.a.alu_imm(AluOp::Xor, prec, Rm::Reg(w), (bits - 1) as i32);
            }
        } else if self.features.tzcnt {
            self.a.tzcnt(prec, w, rm);
        } else {
            self.a.bsf(prec, w, rm);
            self.a.const_(prec, TEMP2, bits);
            self.a.cmov(Cc::Z, prec, w, Rm::Reg(TEMP2));
        }
        if !matches!(dst, Operand::Reg(_)) {
            self.write_int(prec, dst, w);
        }
    }

    // Two-operand operations.

    fn op2(
        &mut self,
        op: Op2,
        prec: Precision,
        flags: FlagRequest,
        dst: Option<&Operand>,
        src1: &Operand,
        src2: &Operand,
    ) {
        if op.is_shift() {
            return self.shift(op, prec, flags, dst, src1, src2);
        }
        if op == Op2::Mul {
            return self.mul(prec, dst, src1, src2);
        }
        let alu = alu_op(op);
        let Some(dst) = dst else {
            // The flags-only form.
            return match op {
                Op2::Sub => self.compare(prec, src1, src2),
                Op2::And => self.test(prec, src1, src2),
                _ => {
                    self.into_reg(prec, TEMP1, src1);
                    self.alu_src2(alu, prec, TEMP1, src2);
                }
            };
        };
        let commutative = matches!(op, Op2::Add | Op2::Addc | Op2::And | Op2::Or | Op2::Xor);
        if let Operand::Reg(d) = dst {
            let dphys = reg(*d);
            if !reads(src2, *d) {
                self.into_reg(prec, dphys, src1);
                self.alu_src2(alu, prec, dphys, src2);
                return;
            }
            if matches!(src1, Operand::Reg(r) if r == d) {
                self.alu_src2(alu, prec, dphys, src2);
                return;
            }
            if commutative && matches!(src2, Operand::Reg(r) if r == d) {
                self.alu_src2(alu, prec, dphys, src1);
                return;
            }
        }
        self.into_reg(prec, TEMP1, src1);
        self.alu_src2(alu, prec, TEMP1, src2);
        self.write_int(prec, dst, TEMP1);
    }

    /** Applies `op src2` to the work register `w`. */
    fn alu_src2(&mut self, op: AluOp, prec: Precision, w: Register, src2: &Operand) {
        match src2 {
            Operand::Imm(v) => {
                if prec == P32 || i32::try_from(*v).is_ok() {
                    self.a.alu_imm(op, prec, Rm::Reg(w), *v as i32);
                } else {
                    self.a.const_(P64, TEMP2, *v);
                    self.a.alu_r_rm(op, prec, w, Rm::Reg(TEMP2));
                }
            }
            _ => {
                let rm = self.rm(src2);
                self.a.alu_r_rm(op, prec, w, rm);
            }
        }
    }

    /** `cmp`: subtract for flags without writing a result. */
    fn compare(&mut self, prec: Precision, src1: &Operand, src2: &Operand) {
        match (src1, src2) {
            (Operand::Reg(a), _) => self.alu_src2(AluOp::Cmp, prec, reg(*a), src2),
            (Operand::Mem(m), Operand::Reg(b)) => {
                let b = reg(*b);
                let a = self.addr(m);
                self.a.alu_rm_r(AluOp::Cmp, prec, Rm::Mem(a), b);
            }
            (Operand::Mem(m), Operand::Imm(v))
                if prec == P32 || i32::try_from(*v).is_ok() =>
            {
                let a = self.addr(m);
                self.a.alu_imm(AluOp::Cmp, prec, Rm::Mem(a), *v as i32);
            }
            _ => {
                self.into_reg(prec, TEMP1, src1);
                self.alu_src2(AluOp::Cmp, prec, TEMP1, src2);
            }
        }
    }

    /** `test`: AND for flags without writing a result. */
    fn test(&mut self, prec: Precision, src1: &Operand, src2: &Operand) {
        // `test` is commutative; put any immediate second.
        let (src1, src2) = if matches!(src1, Operand::Imm(_)) { (src2, src1) } else { (src1, src2) };
        match (src1, src2) {
            (Operand::Imm(a), Operand::Imm(b)) => {
                self.a.const_(prec, TEMP1, *a);
                if prec == P32 || i32::try_from(*b).is_ok() {
                    self.a.test_imm(prec, Rm::Reg(TEMP1), *b as i32);
                } else {
                    self.a.const_(P64, TEMP2, *b);
                    self.a.test(prec, Rm::Reg(TEMP1), TEMP2);
                }
            }
            (_, Operand::Imm(v)) if prec == P32 || i32::try_from(*v).is_ok() => {
                let rm = self.rm(src1);
                self.a.test_imm(prec, rm, *v as i32);
            }
            (_, Operand::Imm(v)) => {
                self.a.const_(P64, TEMP2, *v);
                let rm = self.rm(src1);
                self.a.test(prec, rm, TEMP2);
            }
            (_, Operand::Reg(b)) => {
                let b = reg(*b);
                let rm = self.rm(src1);
                self.a.test(prec, rm, b);
            }
            (Operand::Reg(a), Operand::Mem(m)) => {
                let a = reg(*a);
                let rm = Rm::Mem(self.addr(m));
                self.a.test(prec, rm, a);
            }
            (_, Operand::Mem(m)) => {
                self.into_reg(prec, TEMP1, src1);
                let rm = Rm::Mem(self.addr(m));
                self.a.test(prec, rm, TEMP1);
            }
        }
    }

    fn mul(&mut self, prec: Precision, dst: Option<&Operand>, src1: &Operand, src2: &Operand) {
        if let Some(Operand::Reg(d)) = dst {
            let dphys = reg(*d);
            if !reads(src2, *d) {
                self.into_reg(prec, dphys, src1);
                self.mul_src2(prec, dphys, src2);
                return;
            }
            if matches!(src1, Operand::Reg(r) if r == d) {
                self.mul_src2(prec, dphys, src2);
                return;
            }
            if matches!(src2, Operand::Reg(r) if r == d) {
                self.mul_src2(prec, dphys, src1);
                return;
            }
        }
        self.into_reg(prec, TEMP1, src1);
        self.mul_src2(prec, TEMP1, src2);
        if let Some(dst) = dst {
            self.write_int(prec, dst, TEMP1);
        }
    }

    fn mul_src2(&mut self, prec: Precision, w: Register, src2: &Operand) {
        match src2 {
            Operand::Imm(v) => {
                self.a.const_(prec, TEMP2, *v);
                self.a.imul(prec, w, Rm::Reg(TEMP2));
            }
            _ => {
                let rm = self.rm(src2);
                self.a.imul(prec, w, rm);
            }
        }
    }

    fn shift(
        &mut self,
        op: Op2,
        prec: Precision,
        flags: FlagRequest,
        dst: Option<&Operand>,
        src1: &Operand,
        src2: &Operand,
    ) {
        let sop = shift_op(op);
        if let Operand::Imm(n) = src2 {
            let n = (*n as u32 % prec.bits() as u32) as u8;
            let w = match dst {
                Some(Operand::Reg(d)) => reg(*d),
                _ => TEMP1,
            };
            self.into_reg(prec, w, src1);
            if n != 0 {
                self.a.shift_imm(sop, prec, Rm::Reg(w), n);
            }
            if flags.zero {
                // A zero count leaves the flags stale; derive them.
                self.a.test(prec, Rm::Reg(w), w);
            }
            if w == TEMP1 {
                if let Some(dst) = dst {
                    self.write_int(prec, dst, TEMP1);
                }
            }
            return;
        }
        // A variable count shifts by `CL`. The value computes in `TEMP1`
        // while the count swaps through `RC`, so any virtual register may
        // hold any role and `RC`'s program value survives.
        self.into_reg(prec, TEMP1, src1);
        match src2 {
            Operand::Reg(r) => {
                let c = reg(*r);
                if c != TEMP2 {
                    self.a.mov_rr(P64, TEMP2, c);
                }
            }
            Operand::Mem(m) => {
                let a = self.addr(m);
                self.a.load(P64, TEMP2, a);
            }
            Operand::Imm(_) => unreachable!("handled above"),
        }
        self.a.xchg(P64, RC, TEMP2);
        self.a.shift_cl(sop, prec, Rm::Reg(TEMP1));
        self.a.xchg(P64, RC, TEMP2);
        if flags.zero {
            self.a.test(prec, Rm::Reg(TEMP1), TEMP1);
        }
        if let Some(dst) = dst {
            self.write_int(prec, dst, TEMP1);
        }
    }

    // Flag consumers.

    fn op_flags(&mut self, or: bool, prec: Precision, dst: &Operand, cond: Condition) {
        let code = cc(cond);
        if !or {
            if let Operand::Reg(d) = dst {
                let d = reg(*d);
                self.a.setcc(code, d);
                self.a.movzx8(prec, d, Rm::Reg(d));
                return;
            }
        }
        self.a.setcc(code, TEMP1);
        self.a.movzx8(P64, TEMP1, Rm::Reg(TEMP1));
        if or {
            let rm = self.rm(dst);
            self.a.alu_rm_r(AluOp::Or, prec, rm, TEMP1);
        } else {
            self.write_int(prec, dst, TEMP1);
        }
    }

    fn select(&mut self, cond: Condition, prec: Precision, dst: Reg, src1: &Operand, src2: Reg) {
        let code = cc(cond);
        let d = reg(dst);
        let s2 = reg(src2);
        if matches!(src1, Operand::Reg(r) if reg(*r) == d) {
            // dst already holds the taken value; replace it if not taken.
            self.a.cmov(code.invert(), prec, d, Rm::Reg(s2));
            return;
        }
        let rm = match src1 {
            Operand::Imm(v) => {
                self.a.const_(prec, TEMP1, *v);
                Rm::Reg(TEMP1)
            }
            _ => self.rm(src1),
        };
        if d == s2 {
            self.a.cmov(code, prec, d, rm);
        } else if reads(src1, dst) {
            // `dst` is a base of `src1`; it must survive until the cmov.
            self.a.mov_rr(prec, TEMP1, s2);
            self.a.cmov(code, prec, TEMP1, rm);
            self.a.mov_rr(prec, d, TEMP1);
        } else {
            self.a.mov_rr(prec, d, s2);
            self.a.cmov(code, prec, d, rm);
        }
    }

    fn fselect(&mut self, cond: Condition, fprec: FPrecision, dst: FReg, src1: &FOperand, src2: FReg) {
        let double = fprec == FPrecision::Double;
        let d = freg(dst);
        let s2 = freg(src2);
        if matches!(src1, FOperand::Reg(f) if freg(*f) == d) {
            let skip = self.a.jcc_short(cc(cond));
            if d != s2 {
                self.a.movaps(d, s2);
            }
            self.a.patch_short(skip);
            return;
        }
        if d != s2 {
            self.a.movaps(d, s2);
        }
        let skip = self.a.jcc_short(cc(cond.invert()));
        match src1 {
            FOperand::Reg(f) => self.a.movaps(d, freg(*f)),
            FOperand::Mem(m) => {
                let a = self.addr(m);
                self.a.movs_load(double, d, a.into());
            }
            FOperand::Imm(v) => self.load_pool(double, d, *v),
        }
        self.a.patch_short(skip);
    }

    // Floating point.

    fn fop1(&mut self, op: FOp1, fprec: FPrecision, dst: &FOperand, src: &FOperand) {
        let double = fprec == FPrecision::Double;
        if op == FOp1::Mov {
            match (dst, src) {
                (FOperand::Reg(d), FOperand::Reg(s)) => {
                    let (d, s) = (freg(*d), freg(*s));
                    if d != s {
                        self.a.movaps(d, s);
                    }
                }
                (FOperand::Reg(d), FOperand::Mem(m)) => {
                    let a = self.addr(m);
                    self.a.movs_load(double, freg(*d), a.into());
                }
                (FOperand::Reg(d), FOperand::Imm(v)) => self.load_pool(double, freg(*d), *v),
                (FOperand::Mem(_), _) => {
                    let s = self.read_float(double, src, FTEMP1);
                    self.write_float(double, dst, s);
                }
                (FOperand::Imm(_), _) => unreachable!("immediate destination"),
            }
            return;
        }
        let w = match dst {
            FOperand::Reg(d) => freg(*d),
            _ => FTEMP1,
        };
        let s = self.read_float(double, src, w);
        if s != w {
            self.a.movaps(w, s);
        }
        let mask = match (op, double) {
            (FOp1::Neg, true) => self.pool_entry(1 << 63, 0),
            (FOp1::Neg, false) => self.pool_entry(1 << 31, 0),
            (FOp1::Abs, true) => self.pool_entry(!(1 << 63), !0),
            (FOp1::Abs, false) => self.pool_entry(0xFFFF_FFFF_7FFF_FFFF, !0),
            _ => unreachable!(),
        };
        let disp_pos = if op == FOp1::Neg {
            self.a.xorp_rip(double, w)
        } else {
            self.a.andp_rip(double, w)
        };
        self.fixups.push((disp_pos, mask));
        if !matches!(dst, FOperand::Reg(_)) {
            self.write_float(double, dst, w);
        }
    }

    fn fop2(&mut self, op: FOp2, fprec: FPrecision, dst: &FOperand, src1: &FOperand, src2: &FOperand) {
        let double = fprec == FPrecision::Double;
        let opcode = fop_opcode(op);
        if let FOperand::Reg(dv) = dst {
            let d = freg(*dv);
            if matches!(src2, FOperand::Reg(f) if freg(*f) == d) {
                if matches!(op, FOp2::Add | FOp2::Mul) {
                    let rm = self.float_rm(double, src1, FTEMP2);
                    self.a.fop(opcode, double, d, rm);
                } else {
                    // d = src1 op d for a non-commutative op.
                    let s1 = self.read_float(double, src1, FTEMP1);
                    if s1 != FTEMP1 {
                        self.a.movaps(FTEMP1, s1);
                    }
                    self.a.fop(opcode, double, FTEMP1, XmmRm::Reg(d));
                    self.a.movaps(d, FTEMP1);
                }
                return;
            }
            match src1 {
                FOperand::Reg(s1) => {
                    let s1 = freg(*s1);
                    if s1 != d {
                        self.a.movaps(d, s1);
                    }
                }
                FOperand::Mem(m) => {
                    let a = self.addr(m);
                    self.a.movs_load(double, d, a.into());
                }
                FOperand::Imm(v) => self.load_pool(double, d, *v),
            }
            let rm = self.float_rm(double, src2, FTEMP2);
            self.a.fop(opcode, double, d, rm);
            return;
        }
        let s1 = self.read_float(double, src1, FTEMP1);
        if s1 != FTEMP1 {
            self.a.movaps(FTEMP1, s1);
        }
        let rm = self.float_rm(double, src2, FTEMP2);
        self.a.fop(opcode, double, FTEMP1, rm);
        self.write_float(double, dst, FTEMP1);
    }

    fn fcvt(&mut self, fprec: FPrecision, dst: &FOperand, src: &FOperand) {
        let to_double = fprec == FPrecision::Double;
        let w = match dst {
            FOperand::Reg(d) => freg(*d),
            _ => FTEMP1,
        };
        // The source has the other precision.
        let rm = self.float_rm(!to_double, src, FTEMP2);
        self.a.cvtf2f(to_double, w, rm);
        if !matches!(dst, FOperand::Reg(_)) {
            self.write_float(to_double, dst, w);
        }
    }

    fn fcvt_from_word(&mut self, fprec: FPrecision, dst: &FOperand, prec: Precision, src: &Operand) {
        let double = fprec == FPrecision::Double;
        let w = match dst {
            FOperand::Reg(d) => freg(*d),
            _ => FTEMP1,
        };
        let rm = match src {
            Operand::Imm(v) => {
                self.a.const_(prec, TEMP1, *v);
                Rm::Reg(TEMP1)
            }
            _ => self.rm(src),
        };
        self.a.cvti2f(double, w, prec, rm);
        if !matches!(dst, FOperand::Reg(_)) {
            self.write_float(double, dst, w);
        }
    }

    fn fcvt_to_word(&mut self, prec: Precision, dst: &Operand, fprec: FPrecision, src: &FOperand) {
        let double = fprec == FPrecision::Double;
        let w = match dst {
            Operand::Reg(d) => reg(*d),
            _ => TEMP1,
        };
        let rm = self.float_rm(double, src, FTEMP1);
        self.a.cvtf2i(prec, w, double, rm);
        if !matches!(dst, Operand::Reg(_)) {
            self.write_int(prec, dst, w);
        }
    }

    // Control transfer.

    fn jump(&mut self, j: Jump, relocs: &Relocs, frames: &[FrameLayout]) -> Site {
        let record = relocs.jump(j);
        // Raw and re-patchable targets use the absolute form; a label
        // bound once lowers to the shorter relative form.
        let absolute = record.rewritable || !matches!(record.target, JumpTarget::Label(_));
        match record.kind {
            JumpKind::Branch { cond } => {
                if absolute {
                    let skip = cond.map(|c| self.a.jcc_short(cc(c.invert())));
                    let imm_pos = self.a.const64(TEMP1, 0);
                    self.a.jmp_rm(Rm::Reg(TEMP1));
                    if let Some(skip) = skip {
                        self.a.patch_short(skip);
                    }
                    Site::Abs64 { imm_pos }
                } else {
                    let disp_pos = match cond {
                        Some(c) => self.a.jcc_rel32(cc(c)),
                        None => self.a.jmp_rel32(),
                    };
                    Site::Rel32 { disp_pos }
                }
            }
            JumpKind::Call(sig) => {
                self.call_arguments(&sig);
                self.transfer(absolute, false)
            }
            JumpKind::TailCall(sig) => {
                self.call_arguments(&sig);
                self.epilogue(&frames[record.frame as usize]);
                self.transfer(absolute, true)
            }
            JumpKind::FastCall => self.transfer(absolute, false),
        }
    }

    fn transfer(&mut self, absolute: bool, jump: bool) -> Site {
        if absolute {
            let imm_pos = self.a.const64(TEMP1, 0);
            if jump {
                self.a.jmp_rm(Rm::Reg(TEMP1));
            } else {
                self.a.call_rm(Rm::Reg(TEMP1));
            }
            Site::Abs64 { imm_pos }
        } else {
            let disp_pos = if jump { self.a.jmp_rel32() } else { self.a.call_rel32() };
            Site::Rel32 { disp_pos }
        }
    }

    /** Moves the outgoing word arguments from `R0..` to the ABI argument
     * registers. Float arguments are already in place. */
    fn call_arguments(&mut self, sig: &Signature) {
        let moves = (0..sig.word_arg_count())
            .map(|i| (SCRATCHES[i], ARGUMENTS[i]))
            .collect();
        self.parallel_move(moves);
    }

    fn ijump(&mut self, kind: IJumpKind, src: &Operand, frames: &[FrameLayout]) {
        match kind {
            IJumpKind::Jump => {
                let rm = self.transfer_rm(src);
                self.a.jmp_rm(rm);
            }
            IJumpKind::Call(sig) => {
                self.stage_target(src);
                self.call_arguments(&sig);
                self.a.call_rm(Rm::Reg(TEMP1));
            }
            IJumpKind::TailCall(sig) => {
                self.stage_target(src);
                self.call_arguments(&sig);
                self.epilogue(&frames[self.frame]);
                self.a.jmp_rm(Rm::Reg(TEMP1));
            }
            IJumpKind::FastCall => {
                let rm = self.transfer_rm(src);
                self.a.call_rm(rm);
            }
        }
    }

    /** A computed transfer target as a ModR/M operand. */
    fn transfer_rm(&mut self, src: &Operand) -> Rm {
        match src {
            Operand::Imm(v) => {
                self.a.const_(P64, TEMP1, *v);
                Rm::Reg(TEMP1)
            }
            _ => self.rm(src),
        }
    }

    /** Reads a transfer target into `TEMP1`, before anything clobbers the
     * registers it may live in. */
    fn stage_target(&mut self, src: &Operand) {
        self.into_reg(P64, TEMP1, src);
    }

    /** Moves the return value into the ABI result register. */
    fn ret_value(&mut self, op: Op1, src: &Operand) {
        match (op, src) {
            (Op1::Mov, Operand::Reg(r)) => {
                let s = reg(*r);
                if s != RA {
                    self.a.mov_rr(P64, RA, s);
                }
            }
            (Op1::Mov, Operand::Imm(v)) => self.a.const_(P64, RA, *v),
            (Op1::Mov, Operand::Mem(m)) => {
                let a = self.addr(m);
                self.a.load(P64, RA, a);
            }
            (_, Operand::Imm(v)) => self.a.const_(P64, RA, narrow_imm(op, *v)),
            _ => {
                let rm = self.rm(src);
                self.load_narrow(op, P64, RA, rm);
            }
        }
    }

    /** `movabs` an immediate into `dst`; the immediate field is the
     * patch site for constants and put-labels. */
    fn load_abs64(&mut self, dst: &Operand, value: i64) -> Site {
        match dst {
            Operand::Reg(r) => {
                let imm_pos = self.a.const64(reg(*r), value);
                Site::Abs64 { imm_pos }
            }
            Operand::Mem(m) => {
                let imm_pos = self.a.const64(TEMP1, value);
                let a = self.addr(m);
                self.a.store(P64, a, TEMP1);
                Site::Abs64 { imm_pos }
            }
            Operand::Imm(_) => unreachable!("immediate destination"),
        }
    }

    // Atomics.

    fn atomic_load(&mut self, op: Op1, dst: Reg, mem: Reg) {
        let d = reg(dst);
        let a = Addr::base(reg(mem), 0);
        match op {
            Op1::Mov => self.a.load(P64, d, a),
            Op1::MovU8 => self.a.movzx8(P64, d, Rm::Mem(a)),
            Op1::MovU16 => self.a.movzx16(P64, d, Rm::Mem(a)),
            Op1::MovU32 => self.a.mov32(d, Rm::Mem(a)),
            _ => unreachable!("rejected at emission time"),
        }
    }

    /**
     * `lock cmpxchg` wants the expected value in `RA`, so `RA` detours
     * through `TEMP1` unless `temp` already lives there. The final
     * restore is a `mov`, which keeps the `Z` result observable.
     */
    fn atomic_store(&mut self, op: Op1, src: Reg, mem: Reg, temp: Reg) {
        let bytes = op.access_bytes();
        let (s, m, t) = (reg(src), reg(mem), reg(temp));
        if t == RA {
            self.a.lock_cmpxchg(bytes, Addr::base(m, 0), s);
            return;
        }
        self.a.mov_rr(P64, TEMP1, RA);
        let m = if m == RA { TEMP1 } else { m };
        let s = if s == RA { TEMP1 } else { s };
        self.a.mov_rr(P64, RA, t);
        self.a.lock_cmpxchg(bytes, Addr::base(m, 0), s);
        self.a.mov_rr(P64, RA, TEMP1);
    }

    // SIMD.

    fn simd_xmm_rm(&mut self, src: &SimdOperand) -> XmmRm {
        match src {
            SimdOperand::FReg(f) => XmmRm::Reg(freg(*f)),
            SimdOperand::Mem(m) => XmmRm::Mem(self.addr(m)),
            _ => unreachable!("rejected at emission time"),
        }
    }

    fn simd_mov(&mut self, store: bool, vreg: FReg, data: &SimdOperand) {
        let v = freg(vreg);
        match data {
            SimdOperand::Mem(m) => {
                let a = self.addr(m);
                if store {
                    self.a.movups_store(a, v);
                } else {
                    self.a.movups_load(v, a);
                }
            }
            SimdOperand::FReg(f) => {
                let f = freg(*f);
                if f != v {
                    if store {
                        self.a.movaps(f, v);
                    } else {
                        self.a.movaps(v, f);
                    }
                }
            }
            _ => unreachable!("rejected at emission time"),
        }
    }

    fn simd_replicate(&mut self, desc: SimdDesc, vreg: FReg, src: &SimdOperand) {
        let v = freg(vreg);
        if desc.float {
            match src {
                SimdOperand::Imm(_) => {
                    // Zero is the only float immediate accepted.
                    self.a.xorps(v, v);
                    return;
                }
                SimdOperand::FReg(f) => {
                    let f = freg(*f);
                    if f != v {
                        self.a.movaps(v, f);
                    }
                }
                SimdOperand::Mem(m) => {
                    let a = self.addr(m);
                    self.a.movs_load(desc.lane == LaneSize::L64, v, a.into());
                }
                SimdOperand::Reg(_) => unreachable!("rejected at emission time"),
            }
            match desc.lane {
                LaneSize::L64 => self.a.pshufd(v, v, 0x44),
                LaneSize::L32 => self.a.shufps(v, v, 0),
                _ => unreachable!("float lanes are at least 32 bits"),
            }
            return;
        }
        let g = match src {
            SimdOperand::Reg(r) => reg(*r),
            SimdOperand::Imm(val) => {
                self.a.const_(P64, TEMP1, *val);
                TEMP1
            }
            SimdOperand::Mem(m) => {
                let rm = Rm::Mem(self.addr(m));
                match desc.lane {
                    LaneSize::L8 => self.a.movzx8(P64, TEMP1, rm),
                    LaneSize::L16 => self.a.movzx16(P64, TEMP1, rm),
                    LaneSize::L32 => self.a.mov32(TEMP1, rm),
                    LaneSize::L64 => {
                        let Rm::Mem(a) = rm else { unreachable!() };
                        self.a.load(P64, TEMP1, a);
                    }
                }
                TEMP1
            }
            SimdOperand::FReg(_) => unreachable!("rejected at emission time"),
        };
        match desc.lane {
            LaneSize::L64 => {
                self.a.movd_to(P64, v, g);
                self.a.pshufd(v, v, 0x44);
            }
            LaneSize::L32 => {
                self.a.movd_to(P32, v, g);
                self.a.pshufd(v, v, 0);
            }
            LaneSize::L16 => {
                self.a.movd_to(P32, v, g);
                self.a.pshuflw(v, v, 0);
                self.a.pshufd(v, v, 0);
            }
            LaneSize::L8 => {
                self.a.movd_to(P32, v, g);
                self.a.punpcklbw(v, v);
                self.a.pshuflw(v, v, 0);
                self.a.pshufd(v, v, 0);
            }
        }
    }

    fn simd_lane_mov(&mut self, lane: LaneSize, store: bool, vreg: FReg, index: u8, data: &SimdOperand) {
        let v = freg(vreg);
        if store {
            let rm = match data {
                SimdOperand::Reg(r) => Rm::Reg(reg(*r)),
                SimdOperand::Mem(m) => Rm::Mem(self.addr(m)),
                _ => unreachable!("rejected at emission time"),
            };
            self.a.pextr(lane, rm, v, index);
        } else {
            let rm = match data {
                SimdOperand::Reg(r) => Rm::Reg(reg(*r)),
                SimdOperand::Mem(m) => Rm::Mem(self.addr(m)),
                SimdOperand::Imm(val) => {
                    self.a.const_(P64, TEMP1, *val);
                    Rm::Reg(TEMP1)
                }
                SimdOperand::FReg(_) => unreachable!("rejected at emission time"),
            };
            self.a.pinsr(lane, v, rm, index);
        }
    }
}

//-----------------------------------------------------------------------------
