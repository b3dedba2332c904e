//! The compiler context and the instruction-emission API. Every call
//! validates its operands against the declared register budget and the
//! flag-window rules, then appends one abstract instruction record; native
//! bytes exist only after [`Compiler::generate`].

use log::debug;

use crate::abi::{
    EnterOptions, FrameLayout, RegRequest, Signature, MAX_LOCAL_SIZE,
};
use crate::codegen::{self, CompiledCode};
use crate::cpu;
use crate::error::{Error, Result};
use crate::ir::{
    Condition, FOp1, FOp2, FOperand, FPrecision, FReg, FlagGroup, FlagRequest,
    IJumpKind, Inst, LaneSize, Mem, Op0, Op1, Op2, Operand, Precision, Reg,
    SimdDesc, SimdOperand, VecWidth,
};
use crate::reloc::{
    Const, Jump, JumpKind, JumpRecord, JumpTarget, Label, PutLabel, Relocs,
};
use crate::target::{CodeEncoder, Native};

/** What a `call`/`icall` does with the current frame. */
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CallKind {
    /** An ordinary ABI call; arguments in `R0..`/`FR0..`, result in
     * `R0`/`FR0`. */
    Call(Signature),
    /** Reuses and discards the caller's frame; never returns to it. */
    TailCall(Signature),
    /** Shares the caller's register file; no ABI transition. Pair with
     * [`Compiler::fast_enter`]/[`Compiler::fast_return`]. */
    FastCall,
}

/** Describes an explicit `mem` access. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemAccess {
    pub load: bool,
    pub op: Op1,
    pub unaligned: bool,
    /** Report supportability without emitting anything. */
    pub probe_only: bool,
}

impl MemAccess {
    pub fn load(op: Op1) -> Self {
        MemAccess { load: true, op, unaligned: false, probe_only: false }
    }

    pub fn store(op: Op1) -> Self {
        MemAccess { load: false, op, unaligned: false, probe_only: false }
    }

    pub fn unaligned(mut self) -> Self {
        self.unaligned = true;
        self
    }

    pub fn probe(mut self) -> Self {
        self.probe_only = true;
        self
    }
}

/** How an appended instruction interacts with the pending flag window. */
enum WindowEffect {
    Produce(FlagRequest),
    Preserve,
    Destroy,
}

//-----------------------------------------------------------------------------

/**
 * Owns the instruction buffer, the deferred-resolution arenas and the
 * sticky error state. `BUILDING -> GENERATED`: after [`generate`] the
 * compiler accepts no further instructions ([`Error::Compiled`]).
 *
 * Not safe for concurrent emission; use one `Compiler` per thread.
 *
 * [`generate`]: Compiler::generate
 */
pub struct Compiler {
    insts: Vec<Inst>,
    relocs: Relocs,
    frames: Vec<FrameLayout>,
    error: Option<Error>,
    /** The flag window left by the last flag-producing instruction, if no
     * later instruction destroyed it. */
    pending_flags: Option<FlagRequest>,
    pool_reserved: usize,
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            insts: Vec::new(),
            relocs: Relocs::default(),
            frames: Vec::new(),
            error: None,
            pending_flags: None,
            pool_reserved: 0,
        }
    }

    /** The sticky error state: `Ok` until the first failure. */
    pub fn status(&self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn guard(&self) -> Result<()> {
        self.status()
    }

    /** Records `e` as the sticky error unless it is a per-call capability
     * report. */
    fn fail<T>(&mut self, e: Error) -> Result<T> {
        if e != Error::Unsupported {
            self.error.get_or_insert(e);
        }
        Err(e)
    }

    fn bad<T>(&mut self) -> Result<T> {
        self.fail(Error::BadArgument)
    }

    /** Poisons unconditionally, even for `Unsupported`: used where the
     * failure is a declaration the rest of the function depends on. */
    fn fail_hard<T>(&mut self, e: Error) -> Result<T> {
        self.error.get_or_insert(e);
        Err(e)
    }

    // Validation helpers.

    fn regs(&self) -> &RegRequest {
        &self.frames.last().expect("validated: enter was called").regs
    }

    fn check_entered(&mut self) -> Result<()> {
        if self.frames.is_empty() {
            return self.bad();
        }
        Ok(())
    }

    fn check_reg(&mut self, r: Reg) -> Result<()> {
        let ok = match r {
            Reg::R(n) => n < self.regs().scratches,
            Reg::S(n) => n < self.regs().saveds,
            // The stack pointer is only addressable through memory.
            Reg::Sp => false,
        };
        if ok { Ok(()) } else { self.bad() }
    }

    fn check_mem_base(&mut self, r: Reg) -> Result<()> {
        let ok = match r {
            Reg::R(n) => n < self.regs().scratches,
            Reg::S(n) => n < self.regs().saveds,
            Reg::Sp => true,
        };
        if ok { Ok(()) } else { self.bad() }
    }

    fn check_mem(&mut self, m: &Mem) -> Result<()> {
        if let Some(base) = m.base {
            self.check_mem_base(base)?;
        }
        if let Some((index, shift)) = m.index {
            if index == Reg::Sp || shift > 3 || m.base.is_none() {
                return self.bad();
            }
            self.check_reg(index)?;
        }
        Ok(())
    }

    fn check_src(&mut self, op: &Operand) -> Result<()> {
        match op {
            Operand::Reg(r) => self.check_reg(*r),
            Operand::Imm(_) => Ok(()),
            Operand::Mem(m) => self.check_mem(m),
        }
    }

    fn check_dst(&mut self, op: &Operand) -> Result<()> {
        match op {
            Operand::Reg(r) => self.check_reg(*r),
            Operand::Imm(_) => self.bad(),
            Operand::Mem(m) => self.check_mem(m),
        }
    }

    fn check_freg(&mut self, f: FReg) -> Result<()> {
        let ok = match f {
            FReg::FR(n) => n < self.regs().fscratches,
            FReg::FS(n) => n < self.regs().fsaveds,
        };
        if ok { Ok(()) } else { self.bad() }
    }

    fn check_fsrc(&mut self, op: &FOperand) -> Result<()> {
        match op {
            FOperand::Reg(f) => self.check_freg(*f),
            FOperand::Imm(_) => Ok(()),
            FOperand::Mem(m) => self.check_mem(m),
        }
    }

    fn check_fdst(&mut self, op: &FOperand) -> Result<()> {
        match op {
            FOperand::Reg(f) => self.check_freg(*f),
            FOperand::Imm(_) => self.bad(),
            FOperand::Mem(m) => self.check_mem(m),
        }
    }

    fn check_fpu(&mut self) -> Result<()> {
        if cpu::features().fpu { Ok(()) } else { self.fail(Error::Unsupported) }
    }

    /** Whether `cond` can be consumed from the pending flag window. */
    fn check_window(&mut self, cond: Condition) -> Result<()> {
        match self.pending_flags {
            Some(request) if request.covers(cond) => Ok(()),
            _ => self.bad(),
        }
    }

    /** Appends `inst` and updates the flag window. */
    fn push(&mut self, inst: Inst, window: WindowEffect) {
        match window {
            WindowEffect::Produce(request) => self.pending_flags = Some(request),
            WindowEffect::Preserve => {}
            WindowEffect::Destroy => self.pending_flags = None,
        }
        self.insts.push(inst);
    }

    // Function entry and frame queries.

    /**
     * Declares a function: its signature, register budget and local stack
     * size. Must precede any other emission; calling it again begins a new
     * function in the same code blob.
     */
    pub fn enter(
        &mut self,
        options: EnterOptions,
        sig: Signature,
        regs: RegRequest,
        local_size: u32,
    ) -> Result<()> {
        self.guard()?;
        if regs.scratches > Native::MAX_SCRATCHES
            || regs.saveds > Native::MAX_SAVEDS
            || regs.fscratches > Native::MAX_FSCRATCHES
            || regs.fsaveds > Native::MAX_FSAVEDS
        {
            return self.fail_hard(Error::Unsupported);
        }
        if local_size > MAX_LOCAL_SIZE {
            return self.fail_hard(Error::Unsupported);
        }
        if options.keep > 0 && !options.reg_arg {
            return self.bad();
        }
        if options.keep > regs.saveds {
            return self.bad();
        }
        let word_args = sig.word_arg_count() as u8;
        let arg_budget = if options.reg_arg { regs.scratches } else { regs.saveds };
        if word_args > arg_budget {
            return self.bad();
        }
        if sig.float_arg_count() as u8 > regs.fscratches {
            return self.bad();
        }
        if sig.float_arg_count() > 0 || sig.ret().map_or(false, |k| k.is_float()) {
            self.check_fpu()?;
        }
        let frame = FrameLayout::new(options, sig, regs, local_size);
        debug!(
            "enter: {} args, {}+{} regs, {}+{} float regs, {} locals",
            sig.args().len(),
            regs.scratches,
            regs.saveds,
            regs.fscratches,
            regs.fsaveds,
            local_size
        );
        self.frames.push(frame);
        let frame = (self.frames.len() - 1) as u32;
        self.push(Inst::Enter { frame }, WindowEffect::Destroy);
        Ok(())
    }

    // Integer operations.

    pub fn op0(&mut self, op: Op0) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        if matches!(
            op,
            Op0::LMulUw | Op0::LMulSw | Op0::DivmodUw | Op0::DivmodSw
                | Op0::DivUw | Op0::DivSw
        ) && self.regs().scratches < 2
        {
            return self.bad();
        }
        let window = if matches!(op, Op0::Nop | Op0::Endbr) {
            WindowEffect::Preserve
        } else {
            WindowEffect::Destroy
        };
        self.push(Inst::Op0 { op }, window);
        Ok(())
    }

    pub fn op1(
        &mut self,
        op: Op1,
        prec: Precision,
        flags: FlagRequest,
        dst: Operand,
        src: Operand,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_dst(&dst)?;
        self.check_src(&src)?;
        // Only `Not` can set flags, and only the zero flag.
        let flags_ok = match op {
            Op1::Not => flags.var.is_none(),
            _ => flags.is_none(),
        };
        if !flags_ok {
            return self.bad();
        }
        // In-place memory complement cannot also report flags.
        if op == Op1::Not && dst == src && !dst.is_reg() && !flags.is_none() {
            return self.bad();
        }
        let window = if flags.is_none() {
            WindowEffect::Destroy
        } else {
            WindowEffect::Produce(flags)
        };
        self.push(Inst::Op1 { op, prec, flags, dst, src }, window);
        Ok(())
    }

    pub fn op2(
        &mut self,
        op: Op2,
        prec: Precision,
        flags: FlagRequest,
        dst: Operand,
        src1: Operand,
        src2: Operand,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_dst(&dst)?;
        self.emit_op2(op, prec, flags, Some(dst), src1, src2)
    }

    /** The flags-only form: like [`op2`] but writes no result.
     *
     * [`op2`]: Compiler::op2 */
    pub fn op2u(
        &mut self,
        op: Op2,
        prec: Precision,
        flags: FlagRequest,
        src1: Operand,
        src2: Operand,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        if flags.is_none() {
            return self.bad();
        }
        self.emit_op2(op, prec, flags, None, src1, src2)
    }

    fn emit_op2(
        &mut self,
        op: Op2,
        prec: Precision,
        flags: FlagRequest,
        dst: Option<Operand>,
        src1: Operand,
        src2: Operand,
    ) -> Result<()> {
        self.check_entered()?;
        self.check_src(&src1)?;
        self.check_src(&src2)?;
        if !allowed_flags(op, flags) {
            return self.bad();
        }
        // Carry consumers need a live carry flag.
        if op.uses_carry() {
            match self.pending_flags {
                Some(r) if r.var == Some(FlagGroup::Carry) => {}
                _ => return self.bad(),
            }
        }
        let window = if flags.is_none() {
            WindowEffect::Destroy
        } else {
            WindowEffect::Produce(flags)
        };
        self.push(Inst::Op2 { op, prec, flags, dst, src1, src2 }, window);
        Ok(())
    }

    /** Stores `cond` as 0/1 into `dst` (`or = true` accumulates with OR
     * instead). The Mov form preserves the flag window. */
    pub fn op_flags(
        &mut self,
        or: bool,
        prec: Precision,
        dst: Operand,
        cond: Condition,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_dst(&dst)?;
        self.check_window(cond)?;
        let window = if or { WindowEffect::Destroy } else { WindowEffect::Preserve };
        self.push(Inst::OpFlags { or, prec, dst, cond }, window);
        Ok(())
    }

    /** Branchless `dst = cond ? src1 : src2`, consuming the flag window
     * (which it preserves, so consumers can be chained). */
    pub fn select(
        &mut self,
        cond: Condition,
        prec: Precision,
        dst: Reg,
        src1: Operand,
        src2: Reg,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_reg(dst)?;
        self.check_src(&src1)?;
        self.check_reg(src2)?;
        self.check_window(cond)?;
        self.push(
            Inst::Select { cond, prec, dst, src1, src2 },
            WindowEffect::Preserve,
        );
        Ok(())
    }

    pub fn fselect(
        &mut self,
        cond: Condition,
        fprec: FPrecision,
        dst: FReg,
        src1: FOperand,
        src2: FReg,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_fpu()?;
        self.check_freg(dst)?;
        self.check_fsrc(&src1)?;
        self.check_freg(src2)?;
        self.check_window(cond)?;
        self.push(
            Inst::FSelect { cond, fprec, dst, src1, src2 },
            WindowEffect::Preserve,
        );
        Ok(())
    }

    // Floating point operations.

    pub fn fop1(
        &mut self,
        op: FOp1,
        fprec: FPrecision,
        dst: FOperand,
        src: FOperand,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_fpu()?;
        self.check_fdst(&dst)?;
        self.check_fsrc(&src)?;
        self.push(Inst::FOp1 { op, fprec, dst, src }, WindowEffect::Destroy);
        Ok(())
    }

    pub fn fop2(
        &mut self,
        op: FOp2,
        fprec: FPrecision,
        dst: FOperand,
        src1: FOperand,
        src2: FOperand,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_fpu()?;
        self.check_fdst(&dst)?;
        self.check_fsrc(&src1)?;
        self.check_fsrc(&src2)?;
        self.push(
            Inst::FOp2 { op, fprec, dst, src1, src2 },
            WindowEffect::Destroy,
        );
        Ok(())
    }

    /** Compares two float operands, producing the float flag group. The
     * result of `Equal`/`NotEqual` is unpredictable if an operand was NaN;
     * check `Unordered` first when that matters. */
    pub fn fcmp(
        &mut self,
        fprec: FPrecision,
        src1: FOperand,
        src2: FOperand,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_fpu()?;
        self.check_fsrc(&src1)?;
        self.check_fsrc(&src2)?;
        let request = FlagRequest { zero: false, var: Some(FlagGroup::Float) };
        self.push(
            Inst::FCmp { fprec, src1, src2 },
            WindowEffect::Produce(request),
        );
        Ok(())
    }

    /** Converts between `f32` and `f64`; `fprec` is the *destination*
     * precision, `src` has the other one. */
    pub fn fcvt(
        &mut self,
        fprec: FPrecision,
        dst: FOperand,
        src: FOperand,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_fpu()?;
        self.check_fdst(&dst)?;
        self.check_fsrc(&src)?;
        self.push(Inst::Fcvt { fprec, dst, src }, WindowEffect::Destroy);
        Ok(())
    }

    pub fn fcvt_from_word(
        &mut self,
        fprec: FPrecision,
        dst: FOperand,
        prec: Precision,
        src: Operand,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_fpu()?;
        self.check_fdst(&dst)?;
        self.check_src(&src)?;
        self.push(
            Inst::FcvtFromWord { fprec, dst, prec, src },
            WindowEffect::Destroy,
        );
        Ok(())
    }

    /** Float to integer, truncating toward zero. */
    pub fn fcvt_to_word(
        &mut self,
        prec: Precision,
        dst: Operand,
        fprec: FPrecision,
        src: FOperand,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_fpu()?;
        self.check_dst(&dst)?;
        self.check_fsrc(&src)?;
        self.push(
            Inst::FcvtToWord { prec, dst, fprec, src },
            WindowEffect::Destroy,
        );
        Ok(())
    }

    // Labels, jumps and calls.

    /** A label bound to the address of the next emitted instruction.
     * Control may arrive here from elsewhere, so the flag window does not
     * survive a label. */
    pub fn label(&mut self) -> Result<Label> {
        self.guard()?;
        self.check_entered()?;
        self.pending_flags = None;
        Ok(self.relocs.new_label(self.insts.len() as u32))
    }

    /**
     * A deferred control transfer: conditional on the pending flag window
     * if `cond` is given. Bind the target with [`set_label`] or
     * [`set_target`]; a `rewritable` jump keeps a patchable encoding for
     * [`CompiledCode::set_jump_addr`].
     *
     * [`set_label`]: Compiler::set_label
     * [`set_target`]: Compiler::set_target
     */
    pub fn jump(&mut self, cond: Option<Condition>, rewritable: bool) -> Result<Jump> {
        self.guard()?;
        self.check_entered()?;
        if let Some(cond) = cond {
            self.check_window(cond)?;
        }
        let record = JumpRecord {
            kind: JumpKind::Branch { cond },
            rewritable,
            target: JumpTarget::Unset,
            frame: (self.frames.len() - 1) as u32,
        };
        let jump = self.relocs.new_jump(record);
        self.push(Inst::Jump(jump), WindowEffect::Preserve);
        Ok(jump)
    }

    /** Fused compare and conditional jump: `if src1 <cond> src2 goto ..`.
     * `cond` must be an integer comparison. */
    pub fn cmp(
        &mut self,
        cond: Condition,
        prec: Precision,
        src1: Operand,
        src2: Operand,
        rewritable: bool,
    ) -> Result<Jump> {
        self.guard()?;
        if cond.is_float() || cond.group() == FlagGroup::Atomic {
            return self.bad();
        }
        let flags = FlagRequest::for_condition(cond);
        self.op2u(Op2::Sub, prec, flags, src1, src2)?;
        self.jump(Some(cond), rewritable)
    }

    /** A deferred call. Arguments must already be in `R0..`/`FR0..`; a
     * word result appears in `R0`, a float result in `FR0`. */
    pub fn call(&mut self, kind: CallKind, rewritable: bool) -> Result<Jump> {
        self.guard()?;
        self.check_entered()?;
        let kind = self.call_jump_kind(kind)?;
        let record = JumpRecord {
            kind,
            rewritable,
            target: JumpTarget::Unset,
            frame: (self.frames.len() - 1) as u32,
        };
        let jump = self.relocs.new_jump(record);
        self.push(Inst::Jump(jump), WindowEffect::Destroy);
        Ok(jump)
    }

    fn call_jump_kind(&mut self, kind: CallKind) -> Result<JumpKind> {
        Ok(match kind {
            CallKind::Call(sig) => {
                self.check_call_sig(&sig)?;
                JumpKind::Call(sig)
            }
            CallKind::TailCall(sig) => {
                self.check_call_sig(&sig)?;
                JumpKind::TailCall(sig)
            }
            CallKind::FastCall => JumpKind::FastCall,
        })
    }

    fn check_call_sig(&mut self, sig: &Signature) -> Result<()> {
        if sig.word_arg_count() as u8 > self.regs().scratches {
            return self.bad();
        }
        if sig.float_arg_count() as u8 > self.regs().fscratches {
            return self.bad();
        }
        if sig.float_arg_count() > 0 || sig.ret().map_or(false, |k| k.is_float()) {
            self.check_fpu()?;
        }
        Ok(())
    }

    /** Binds `jump` to `label`. May be re-bound until generation. */
    pub fn set_label(&mut self, jump: Jump, label: Label) -> Result<()> {
        self.guard()?;
        if !self.relocs.contains_jump(jump) || !self.relocs.contains_label(label) {
            return self.bad();
        }
        self.relocs.jump_mut(jump).target = JumpTarget::Label(label);
        Ok(())
    }

    /** Points `jump` at a raw native address outside this compilation. */
    pub fn set_target(&mut self, jump: Jump, target: u64) -> Result<()> {
        self.guard()?;
        if !self.relocs.contains_jump(jump) {
            return self.bad();
        }
        self.relocs.jump_mut(jump).target = JumpTarget::Addr(target);
        Ok(())
    }

    /** Jump to a computed target: register, memory, or absolute address. */
    pub fn ijump(&mut self, src: Operand) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_src(&src)?;
        self.push(
            Inst::IJump { kind: IJumpKind::Jump, src },
            WindowEffect::Preserve,
        );
        Ok(())
    }

    /** Call a computed target. */
    pub fn icall(&mut self, kind: CallKind, src: Operand) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_src(&src)?;
        let kind = match self.call_jump_kind(kind)? {
            JumpKind::Call(sig) => IJumpKind::Call(sig),
            JumpKind::TailCall(sig) => IJumpKind::TailCall(sig),
            JumpKind::FastCall => IJumpKind::FastCall,
            JumpKind::Branch { .. } => unreachable!(),
        };
        self.push(Inst::IJump { kind, src }, WindowEffect::Destroy);
        Ok(())
    }

    /** Captures the return address of the innermost fast call into `dst`.
     * Must be the first instruction of a fast-called helper. */
    pub fn fast_enter(&mut self, dst: Operand) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_dst(&dst)?;
        self.push(Inst::FastEnter { dst }, WindowEffect::Destroy);
        Ok(())
    }

    /** Returns from a fast call through the address in `src`. */
    pub fn fast_return(&mut self, src: Operand) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_src(&src)?;
        self.push(Inst::FastReturn { src }, WindowEffect::Destroy);
        Ok(())
    }

    // Returns.

    pub fn ret_void(&mut self) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.push(Inst::Ret { src: None }, WindowEffect::Destroy);
        Ok(())
    }

    /** Return `src`, moved with the given `Mov`-family operation. */
    pub fn ret(&mut self, op: Op1, src: Operand) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        if !op.is_mov() {
            return self.bad();
        }
        self.check_src(&src)?;
        self.push(Inst::Ret { src: Some((op, src)) }, WindowEffect::Destroy);
        Ok(())
    }

    pub fn ret_float(&mut self, fprec: FPrecision, src: FOperand) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_fpu()?;
        self.check_fsrc(&src)?;
        self.push(Inst::RetFloat { fprec, src }, WindowEffect::Destroy);
        Ok(())
    }

    /** Tears down the frame like a return, then transfers to `src`
     * instead of the caller. */
    pub fn return_to(&mut self, src: Operand) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_src(&src)?;
        self.push(Inst::ReturnTo { src }, WindowEffect::Destroy);
        Ok(())
    }

    // Constants and put-labels.

    /** Loads `init` into `dst` through an encoding whose immediate can be
     * overwritten after generation with [`CompiledCode::set_const`]. */
    pub fn const_(&mut self, dst: Operand, init: i64) -> Result<Const> {
        self.guard()?;
        self.check_entered()?;
        self.check_dst(&dst)?;
        let id = self.relocs.new_const();
        self.push(Inst::Const { id, dst, init }, WindowEffect::Destroy);
        Ok(id)
    }

    /** Materializes the (future) address of a label into `dst`. Bind the
     * label with [`set_put_label`] before generating.
     *
     * [`set_put_label`]: Compiler::set_put_label */
    pub fn put_label(&mut self, dst: Operand) -> Result<PutLabel> {
        self.guard()?;
        self.check_entered()?;
        self.check_dst(&dst)?;
        let id = self.relocs.new_put_label();
        self.push(Inst::PutLabel { id, dst }, WindowEffect::Destroy);
        Ok(id)
    }

    /** Binds `put` to `label`; exactly once. */
    pub fn set_put_label(&mut self, put: PutLabel, label: Label) -> Result<()> {
        self.guard()?;
        if !self.relocs.contains_label(label) {
            return self.bad();
        }
        match self.relocs.put_label_mut(put).label {
            Some(_) => self.bad(),
            None => {
                self.relocs.put_label_mut(put).label = Some(label);
                Ok(())
            }
        }
    }

    // Atomics.

    /** The load half of a load-link/store-conditional pair. `op` selects
     * the access width (`Mov` or an unsigned narrowing variant). */
    pub fn atomic_load(&mut self, op: Op1, dst: Reg, mem: Reg) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_atomic_op(op)?;
        self.check_reg(dst)?;
        self.check_reg(mem)?;
        if !cpu::features().cmpxchg {
            return self.fail(Error::Unsupported);
        }
        self.push(Inst::AtomicLoad { op, dst, mem }, WindowEffect::Destroy);
        Ok(())
    }

    /**
     * The store half: stores `src` to `[mem]` only if the location still
     * holds the value the paired load put in `temp`. Success is reported
     * through `AtomicStored`; on failure the caller retries the whole
     * load..store sequence. Nothing retries automatically.
     */
    pub fn atomic_store(
        &mut self,
        op: Op1,
        src: Reg,
        mem: Reg,
        temp: Reg,
    ) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_atomic_op(op)?;
        self.check_reg(src)?;
        self.check_reg(mem)?;
        self.check_reg(temp)?;
        if temp == src || temp == mem {
            return self.bad();
        }
        if !cpu::features().cmpxchg {
            return self.fail(Error::Unsupported);
        }
        let request = FlagRequest { zero: false, var: Some(FlagGroup::Atomic) };
        self.push(
            Inst::AtomicStore { op, src, mem, temp },
            WindowEffect::Produce(request),
        );
        Ok(())
    }

    fn check_atomic_op(&mut self, op: Op1) -> Result<()> {
        match op {
            Op1::Mov | Op1::MovU8 | Op1::MovU16 | Op1::MovU32 => Ok(()),
            _ => self.bad(),
        }
    }

    // SIMD. All of these report `Unsupported` (without poisoning the
    // compiler and without touching the destination) when the CPU or the
    // backend cannot express the description.

    fn check_simd(&mut self, desc: &SimdDesc) -> Result<()> {
        self.check_entered()?;
        if !desc.is_coherent() {
            return self.bad();
        }
        if !cpu::features().sse2 {
            return Err(Error::Unsupported);
        }
        if desc.width == VecWidth::V256 && !Native::SUPPORTS_V256 {
            return Err(Error::Unsupported);
        }
        Ok(())
    }

    fn check_simd_data(&mut self, data: &SimdOperand) -> Result<()> {
        match data {
            SimdOperand::Reg(r) => self.check_reg(*r),
            SimdOperand::FReg(f) => self.check_freg(*f),
            SimdOperand::Imm(_) => Ok(()),
            SimdOperand::Mem(m) => self.check_mem(m),
        }
    }

    /** Whole-register move between `vreg` and memory or another vector
     * register; `store` selects the direction. */
    pub fn simd_mov(
        &mut self,
        desc: SimdDesc,
        store: bool,
        vreg: FReg,
        data: SimdOperand,
    ) -> Result<()> {
        self.guard()?;
        self.check_simd(&desc)?;
        self.check_freg(vreg)?;
        self.check_simd_data(&data)?;
        if matches!(data, SimdOperand::Reg(_) | SimdOperand::Imm(_)) {
            return self.bad();
        }
        self.push(
            Inst::SimdMov { desc, store, vreg, data },
            WindowEffect::Destroy,
        );
        Ok(())
    }

    /** Broadcasts a scalar to every lane of `vreg`. */
    pub fn simd_replicate(
        &mut self,
        desc: SimdDesc,
        vreg: FReg,
        src: SimdOperand,
    ) -> Result<()> {
        self.guard()?;
        self.check_simd(&desc)?;
        self.check_freg(vreg)?;
        self.check_simd_data(&src)?;
        match (&src, desc.float) {
            // A float scalar comes from a vector register or memory;
            // zero is the only immediate with a lane-independent pattern.
            (SimdOperand::Reg(_), true) => return self.bad(),
            (SimdOperand::Imm(i), true) if *i != 0 => return self.bad(),
            (SimdOperand::FReg(_), false) => return self.bad(),
            _ => {}
        }
        self.push(
            Inst::SimdReplicate { desc, vreg, src },
            WindowEffect::Destroy,
        );
        Ok(())
    }

    /** Moves a single lane between `vreg` and an integer register or
     * memory; `store` extracts, otherwise inserts. */
    pub fn simd_lane_mov(
        &mut self,
        desc: SimdDesc,
        store: bool,
        vreg: FReg,
        lane: u8,
        data: SimdOperand,
    ) -> Result<()> {
        self.guard()?;
        self.check_simd(&desc)?;
        self.check_freg(vreg)?;
        self.check_simd_data(&data)?;
        if usize::from(lane) >= desc.lane_count() {
            return self.bad();
        }
        if matches!(data, SimdOperand::FReg(_)) {
            return self.bad();
        }
        if store && matches!(data, SimdOperand::Imm(_)) {
            return self.bad();
        }
        if !cpu::features().sse41 {
            return Err(Error::Unsupported);
        }
        self.push(
            Inst::SimdLaneMov { desc, store, vreg, lane, data },
            WindowEffect::Destroy,
        );
        Ok(())
    }

    /** Broadcasts one lane of `src` to every lane of `vreg`. */
    pub fn simd_lane_replicate(
        &mut self,
        desc: SimdDesc,
        vreg: FReg,
        src: FReg,
        lane: u8,
    ) -> Result<()> {
        self.guard()?;
        self.check_simd(&desc)?;
        self.check_freg(vreg)?;
        self.check_freg(src)?;
        if usize::from(lane) >= desc.lane_count() {
            return self.bad();
        }
        if !matches!(desc.lane, LaneSize::L32 | LaneSize::L64) {
            return Err(Error::Unsupported);
        }
        self.push(
            Inst::SimdLaneReplicate { desc, vreg, src, lane },
            WindowEffect::Destroy,
        );
        Ok(())
    }

    /** Widens the low lanes of `src` into `vreg`; `desc.lane` is the
     * destination lane size, `from` the source lane size. */
    pub fn simd_extend(
        &mut self,
        desc: SimdDesc,
        from: LaneSize,
        sign: bool,
        vreg: FReg,
        src: SimdOperand,
    ) -> Result<()> {
        self.guard()?;
        self.check_simd(&desc)?;
        self.check_freg(vreg)?;
        self.check_simd_data(&src)?;
        if from.bytes() >= desc.lane.bytes() {
            return self.bad();
        }
        if matches!(src, SimdOperand::Reg(_) | SimdOperand::Imm(_)) {
            return self.bad();
        }
        if !cpu::features().sse41 {
            return Err(Error::Unsupported);
        }
        self.push(
            Inst::SimdExtend { desc, from, sign, vreg, src },
            WindowEffect::Destroy,
        );
        Ok(())
    }

    /** Gathers the sign bit of every lane into an integer register. */
    pub fn simd_sign(&mut self, desc: SimdDesc, vreg: FReg, dst: Reg) -> Result<()> {
        self.guard()?;
        self.check_simd(&desc)?;
        self.check_freg(vreg)?;
        self.check_reg(dst)?;
        if desc.lane == LaneSize::L16 {
            return Err(Error::Unsupported);
        }
        self.push(Inst::SimdSign { desc, vreg, dst }, WindowEffect::Destroy);
        Ok(())
    }

    // Memory access, locals, literal pool.

    /** An explicit load or store with alignment hints. With `probe_only`
     * nothing is emitted; the return value reports supportability. */
    pub fn mem(&mut self, access: MemAccess, reg: Reg, mem: Mem) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        if !access.op.is_mov() {
            return self.bad();
        }
        self.check_reg(reg)?;
        self.check_mem(&mem)?;
        if access.probe_only {
            // Every form and alignment is supported here; other targets
            // report `Unsupported` for what they cannot do.
            return Ok(());
        }
        let inst = if access.load {
            Inst::Op1 {
                op: access.op,
                prec: Precision::P64,
                flags: FlagRequest::NONE,
                dst: Operand::Reg(reg),
                src: Operand::Mem(mem),
            }
        } else {
            Inst::Op1 {
                op: access.op,
                prec: Precision::P64,
                flags: FlagRequest::NONE,
                dst: Operand::Mem(mem),
                src: Operand::Reg(reg),
            }
        };
        self.push(inst, WindowEffect::Destroy);
        Ok(())
    }

    /** `dst = address of byte `offset` of this frame's locals`; valid at
     * any program point of the function. */
    pub fn get_local_base(&mut self, dst: Operand, offset: u32) -> Result<()> {
        self.guard()?;
        self.check_entered()?;
        self.check_dst(&dst)?;
        if offset > self.frames.last().expect("entered").local_size {
            return self.bad();
        }
        self.push(
            Inst::LocalBase { dst, offset: offset as i32 },
            WindowEffect::Destroy,
        );
        Ok(())
    }

    /** Reserves literal-pool capacity ahead of generation. */
    pub fn alloc_memory(&mut self, size: usize) -> Result<()> {
        self.guard()?;
        self.pool_reserved += size;
        Ok(())
    }

    // Generation.

    /**
     * The second pass: lowers the instruction buffer to native code and
     * resolves every label, jump, constant and put-label. On success the
     * compiler transitions to `GENERATED` and refuses further emission.
     */
    pub fn generate(&mut self) -> Result<CompiledCode> {
        self.guard()?;
        if self.frames.is_empty() {
            return self.bad();
        }
        debug!(
            "generate: {} instructions, {} labels, {} jumps, {} consts, {} put-labels",
            self.insts.len(),
            self.relocs.labels.len(),
            self.relocs.jumps.len(),
            self.relocs.consts.len(),
            self.relocs.put_labels.len()
        );
        match codegen::generate(
            &self.insts,
            &self.relocs,
            &self.frames,
            self.pool_reserved,
        ) {
            Ok(code) => {
                // Further emission is refused, as is re-generation.
                self.error = Some(Error::Compiled);
                Ok(code)
            }
            Err(e) => self.fail(e),
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

/** Which flag requests each two-operand opcode supports. */
fn allowed_flags(op: Op2, flags: FlagRequest) -> bool {
    use FlagGroup::*;
    if flags.is_none() {
        return true;
    }
    let var_ok = match flags.var {
        None => true,
        Some(g) => match op {
            Op2::Add => matches!(g, Carry | Overflow),
            Op2::Addc | Op2::Subc => g == Carry,
            Op2::Sub => matches!(g, Carry | Overflow | Unsigned | Signed),
            Op2::Mul => g == Overflow,
            _ => false,
        },
    };
    let zero_ok = !flags.zero || !matches!(op, Op2::Mul | Op2::Rotl | Op2::Rotr);
    var_ok && zero_ok
}

//-----------------------------------------------------------------------------
