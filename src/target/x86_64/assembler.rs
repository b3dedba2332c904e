//! Byte-level assembly of our chosen subset of x86_64. One method call on
//! an [`Assembler`] writes one instruction, so documentation about the
//! x86_64 instruction set applies directly to the code we assemble.
//!
//! We make no attempt to be exhaustive: the subset is what the [`Encoder`]
//! needs to lower the architecture-neutral instruction records. Where we
//! have freedom we choose regularity over the shortest encoding.
//!
//! [`Encoder`]: super::Encoder

use crate::buffer::{Buffer, VecU8};
use crate::ir::LaneSize;
use crate::ir::Precision::{self, P32, P64};

/**
 * All x86_64 general purpose registers. All names include a leading `R`
 * and omit a trailing `X`; this is not intended to imply anything about
 * the operand width, which is specified per instruction.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(clippy::upper_case_acronyms)]
pub enum Register {
    RA = 0,
    RC = 1,
    RD = 2,
    RB = 3,
    RSP = 4,
    RBP = 5,
    RSI = 6,
    RDI = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

use Register::*;

/** An SSE vector register, `xmm0` to `xmm15`. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Xmm(pub u8);

//-----------------------------------------------------------------------------

/**
 * A memory operand: `[base + (index << shift) + disp]`. `RSP` cannot be an
 * index. A missing base addresses `[disp]` absolutely.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Addr {
    pub base: Option<Register>,
    pub index: Option<(Register, u8)>,
    pub disp: i32,
}

impl Addr {
    pub fn base(base: Register, disp: i32) -> Self {
        Addr { base: Some(base), index: None, disp }
    }

    pub fn indexed(base: Register, index: Register, shift: u8, disp: i32) -> Self {
        assert!(index != RSP && shift <= 3);
        Addr { base: Some(base), index: Some((index, shift)), disp }
    }

    pub fn absolute(disp: i32) -> Self {
        Addr { base: None, index: None, disp }
    }
}

/** A ModR/M operand: a register or a memory reference. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Rm {
    Reg(Register),
    Mem(Addr),
}

impl From<Register> for Rm {
    fn from(r: Register) -> Self {
        Rm::Reg(r)
    }
}

impl From<Addr> for Rm {
    fn from(a: Addr) -> Self {
        Rm::Mem(a)
    }
}

/** A ModR/M operand of a vector instruction. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum XmmRm {
    Reg(Xmm),
    Mem(Addr),
}

impl From<Xmm> for XmmRm {
    fn from(x: Xmm) -> Self {
        XmmRm::Reg(x)
    }
}

impl From<Addr> for XmmRm {
    fn from(a: Addr) -> Self {
        XmmRm::Mem(a)
    }
}

//-----------------------------------------------------------------------------

/** The group-1 arithmetic operations, encoded by their opcode-row index. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AluOp {
    Add = 0,
    Or = 1,
    Adc = 2,
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

/** The group-2 shift and rotate operations, encoded by their `/r` digit. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShiftOp {
    Rol = 0,
    Ror = 1,
    Shl = 4,
    Shr = 5,
    Sar = 7,
}

/** x86 condition codes, by encoding. Bit 0 inverts. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(clippy::upper_case_acronyms)]
pub enum Cc {
    O = 0x0,
    NO = 0x1,
    B = 0x2,
    AE = 0x3,
    Z = 0x4,
    NZ = 0x5,
    BE = 0x6,
    A = 0x7,
    S = 0x8,
    NS = 0x9,
    P = 0xA,
    NP = 0xB,
    L = 0xC,
    GE = 0xD,
    LE = 0xE,
    G = 0xF,
}

impl Cc {
    pub fn invert(self) -> Self {
        ALL_CCS[(self as usize) ^ 1]
    }
}

const ALL_CCS: [Cc; 16] = [
    Cc::O, Cc::NO, Cc::B, Cc::AE, Cc::Z, Cc::NZ, Cc::BE, Cc::A,
    Cc::S, Cc::NS, Cc::P, Cc::NP, Cc::L, Cc::GE, Cc::LE, Cc::G,
];

/** Whether a byte-sized access to this register id requires a REX prefix
 * even when no extension bit is set (`spl`, `bpl`, `sil`, `dil`). */
fn byte_needs_rex(id: u8) -> bool {
    (4..8).contains(&id)
}

//-----------------------------------------------------------------------------

/**
 * An assembler writing to a growable byte buffer. The generic writers
 * take the `reg` field and the ModR/M operand as raw register ids so the
 * general-purpose and vector instruction methods can share them; call the
 * per-instruction methods instead.
 */
pub struct Assembler {
    buffer: VecU8,
}

impl Assembler {
    pub fn new() -> Self {
        Assembler { buffer: VecU8::new() }
    }

    /** The current write position: the offset the next instruction gets. */
    pub fn pos(&self) -> usize {
        self.buffer.get_pos()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.into_bytes()
    }

    // Generic writers.

    fn imm8(&mut self, imm: i8) {
        self.buffer.write(u64::from(imm as u8), 1);
    }

    fn imm32(&mut self, imm: i32) {
        self.buffer.write(u64::from(imm as u32), 4);
    }

    fn imm64(&mut self, imm: i64) {
        self.buffer.write(imm as u64, 8);
    }

    fn modrm(&mut self, mode: u8, reg: u8, rm: u8) {
        self.buffer.write_byte(mode << 6 | (reg & 7) << 3 | (rm & 7));
    }

    fn sib(&mut self, scale: u8, index: u8, base: u8) {
        self.buffer.write_byte(scale << 6 | (index & 7) << 3 | (base & 7));
    }

    fn rex(&mut self, w: bool, r: bool, x: bool, b: bool, force: bool) {
        let byte = 0x40
            | (w as u8) << 3
            | (r as u8) << 2
            | (x as u8) << 1
            | (b as u8);
        if byte != 0x40 || force {
            self.buffer.write_byte(byte);
        }
    }

    /** The ModR/M byte and, for memory operands, the SIB byte and
     * displacement. The REX prefix must already be written. */
    fn rm_operand(&mut self, reg: u8, rm: RawRm) {
        match rm {
            RawRm::Reg(id) => self.modrm(3, reg, id),
            RawRm::Mem(a) => {
                let base = a.base.map(|r| r as u8);
                let index = a.index.map(|(r, s)| (r as u8, s));
                match (base, index) {
                    (None, _) => {
                        // [disp32]: SIB with no base and no index.
                        self.modrm(0, reg, 4);
                        self.sib(0, 4, 5);
                        self.imm32(a.disp);
                    }
                    (Some(b), None) if b & 7 != 4 => {
                        let mode = self.disp_mode(b, a.disp);
                        self.modrm(mode, reg, b);
                        self.disp(mode, a.disp);
                    }
                    (Some(b), index) => {
                        // RSP/R12 bases and every indexed form need a SIB.
                        let (i, s) = index.unwrap_or((4, 0));
                        debug_assert!(i & 0xF != 4, "RSP cannot be an index");
                        let mode = self.disp_mode(b, a.disp);
                        self.modrm(mode, reg, 4);
                        self.sib(s, i, b);
                        self.disp(mode, a.disp);
                    }
                }
            }
        }
    }

    /** Picks the shortest displacement mode `base` permits. */
    fn disp_mode(&self, base: u8, disp: i32) -> u8 {
        if disp == 0 && base & 7 != 5 {
            0
        } else if i8::try_from(disp).is_ok() {
            1
        } else {
            2
        }
    }

    fn disp(&mut self, mode: u8, disp: i32) {
        match mode {
            0 => {}
            1 => self.imm8(disp as i8),
            _ => self.imm32(disp),
        }
    }

    /** Writes prefix, REX, opcode bytes and the ModR/M operand. */
    fn instr(
        &mut self,
        prefix: Option<u8>,
        w: bool,
        opcode: &[u8],
        reg: u8,
        rm: RawRm,
        force_rex: bool,
    ) {
        if let Some(p) = prefix {
            self.buffer.write_byte(p);
        }
        let (x, b) = match rm {
            RawRm::Reg(id) => (false, id >= 8),
            RawRm::Mem(a) => (
                a.index.map_or(false, |(r, _)| r as u8 >= 8),
                a.base.map_or(false, |r| r as u8 >= 8),
            ),
        };
        self.rex(w, reg >= 8, x, b, force_rex);
        for &byte in opcode {
            self.buffer.write_byte(byte);
        }
        self.rm_operand(reg, rm);
    }

    /** Like [`instr`], but with a RIP-relative operand whose displacement
     * is written as 0 for later patching. Returns the displacement's
     * offset; no immediate may follow it.
     *
     * [`instr`]: Assembler::instr */
    fn instr_rip(&mut self, prefix: Option<u8>, w: bool, opcode: &[u8], reg: u8) -> usize {
        if let Some(p) = prefix {
            self.buffer.write_byte(p);
        }
        self.rex(w, reg >= 8, false, false, false);
        for &byte in opcode {
            self.buffer.write_byte(byte);
        }
        self.modrm(0, reg, 5);
        let pos = self.pos();
        self.imm32(0);
        pos
    }

    /** An opcode with the register encoded in its low three bits. */
    fn instr_plus_reg(&mut self, w: bool, base: u8, rd: u8) {
        self.rex(w, false, false, rd >= 8, false);
        self.buffer.write_byte(base | (rd & 7));
    }

    // Moves.

    /** Move register to register. */
    pub fn mov_rr(&mut self, prec: Precision, dst: Register, src: Register) {
        self.instr(None, prec == P64, &[0x8B], dst as u8, RawRm::Reg(src as u8), false);
    }

    /** Move memory to register, at the full operand width. */
    pub fn load(&mut self, prec: Precision, dst: Register, src: Addr) {
        self.instr(None, prec == P64, &[0x8B], dst as u8, RawRm::Mem(src), false);
    }

    /** Move register to memory, at the full operand width. */
    pub fn store(&mut self, prec: Precision, dst: Addr, src: Register) {
        self.instr(None, prec == P64, &[0x89], src as u8, RawRm::Mem(dst), false);
    }

    /** Store the low byte of `src`. */
    pub fn store8(&mut self, dst: Addr, src: Register) {
        let force = byte_needs_rex(src as u8);
        self.instr(None, false, &[0x88], src as u8, RawRm::Mem(dst), force);
    }

    /** Store the low 16 bits of `src`. */
    pub fn store16(&mut self, dst: Addr, src: Register) {
        self.instr(Some(0x66), false, &[0x89], src as u8, RawRm::Mem(dst), false);
    }

    /** Store the low 32 bits of `src`. */
    pub fn store32(&mut self, dst: Addr, src: Register) {
        self.instr(None, false, &[0x89], src as u8, RawRm::Mem(dst), false);
    }

    /** Zero-extending byte load (or register narrowing, with `Rm::Reg`). */
    pub fn movzx8(&mut self, prec: Precision, dst: Register, src: Rm) {
        let force = matches!(src, Rm::Reg(r) if byte_needs_rex(r as u8));
        self.instr(None, prec == P64, &[0x0F, 0xB6], dst as u8, src.raw(), force);
    }

    pub fn movsx8(&mut self, prec: Precision, dst: Register, src: Rm) {
        let force = matches!(src, Rm::Reg(r) if byte_needs_rex(r as u8));
        self.instr(None, prec == P64, &[0x0F, 0xBE], dst as u8, src.raw(), force);
    }

    pub fn movzx16(&mut self, prec: Precision, dst: Register, src: Rm) {
        self.instr(None, prec == P64, &[0x0F, 0xB7], dst as u8, src.raw(), false);
    }

    pub fn movsx16(&mut self, prec: Precision, dst: Register, src: Rm) {
        self.instr(None, prec == P64, &[0x0F, 0xBF], dst as u8, src.raw(), false);
    }

    /** 32-bit move; the upper half of `dst` becomes zero. */
    pub fn mov32(&mut self, dst: Register, src: Rm) {
        self.instr(None, false, &[0x8B], dst as u8, src.raw(), false);
    }

    pub fn movsx32(&mut self, dst: Register, src: Rm) {
        self.instr(None, true, &[0x63], dst as u8, src.raw(), false);
    }

    /**
     * Move constant to register, using the shortest of the `B8`, `C7` and
     * `movabs` encodings. Never touches the status flags.
     */
    pub fn const_(&mut self, prec: Precision, dst: Register, mut imm: i64) {
        if prec == P32 {
            imm &= 0xFFFF_FFFF;
        }
        if i64::from(imm as u32) == imm {
            self.instr_plus_reg(false, 0xB8, dst as u8);
            self.imm32(imm as i32);
        } else if i64::from(imm as i32) == imm {
            self.instr(None, true, &[0xC7], 0, RawRm::Reg(dst as u8), false);
            self.imm32(imm as i32);
        } else {
            self.instr_plus_reg(true, 0xB8, dst as u8);
            self.imm64(imm);
        }
    }

    /** `movabs dst, imm64` unconditionally, so the immediate sits at a
     * fixed, patchable position, which is returned. */
    pub fn const64(&mut self, dst: Register, imm: i64) -> usize {
        self.instr_plus_reg(true, 0xB8, dst as u8);
        let pos = self.pos();
        self.imm64(imm);
        pos
    }

    /** Move a sign-extended 32-bit constant to memory. */
    pub fn store_imm(&mut self, prec: Precision, dst: Addr, imm: i32) {
        self.instr(None, prec == P64, &[0xC7], 0, RawRm::Mem(dst), false);
        self.imm32(imm);
    }

    /** Load the address of a memory operand. */
    pub fn lea(&mut self, prec: Precision, dst: Register, src: Addr) {
        self.instr(None, prec == P64, &[0x8D], dst as u8, RawRm::Mem(src), false);
    }

    // Arithmetic.

    /** Op register into register or memory. */
    pub fn alu_rm_r(&mut self, op: AluOp, prec: Precision, dst: Rm, src: Register) {
        self.instr(None, prec == P64, &[0x01 | (op as u8) << 3], src as u8, dst.raw(), false);
    }

    /** Op register or memory into register. */
    pub fn alu_r_rm(&mut self, op: AluOp, prec: Precision, dst: Register, src: Rm) {
        self.instr(None, prec == P64, &[0x03 | (op as u8) << 3], dst as u8, src.raw(), false);
    }

    /** Op a sign-extended 32-bit constant into register or memory. */
    pub fn alu_imm(&mut self, op: AluOp, prec: Precision, dst: Rm, imm: i32) {
        self.instr(None, prec == P64, &[0x81], op as u8, dst.raw(), false);
        self.imm32(imm);
    }

    /** `test rm, reg`: AND, setting flags only. */
    pub fn test(&mut self, prec: Precision, rm: Rm, reg: Register) {
        self.instr(None, prec == P64, &[0x85], reg as u8, rm.raw(), false);
    }

    pub fn test_imm(&mut self, prec: Precision, rm: Rm, imm: i32) {
        self.instr(None, prec == P64, &[0xF7], 0, rm.raw(), false);
        self.imm32(imm);
    }

    /** Two-operand signed multiply. */
    pub fn imul(&mut self, prec: Precision, dst: Register, src: Rm) {
        self.instr(None, prec == P64, &[0x0F, 0xAF], dst as u8, src.raw(), false);
    }

    /** One's complement, in place. */
    pub fn not_(&mut self, prec: Precision, rm: Rm) {
        self.instr(None, prec == P64, &[0xF7], 2, rm.raw(), false);
    }

    /** Widening unsigned multiply of `RD:RA = RA * rm`. */
    pub fn mul1(&mut self, prec: Precision, rm: Rm) {
        self.instr(None, prec == P64, &[0xF7], 4, rm.raw(), false);
    }

    /** Widening signed multiply of `RD:RA = RA * rm`. */
    pub fn imul1(&mut self, prec: Precision, rm: Rm) {
        self.instr(None, prec == P64, &[0xF7], 5, rm.raw(), false);
    }

    /** Unsigned divide of `RD:RA`; quotient in `RA`, remainder in `RD`. */
    pub fn div(&mut self, prec: Precision, rm: Rm) {
        self.instr(None, prec == P64, &[0xF7], 6, rm.raw(), false);
    }

    pub fn idiv(&mut self, prec: Precision, rm: Rm) {
        self.instr(None, prec == P64, &[0xF7], 7, rm.raw(), false);
    }

    /** Sign-extend `RA` into `RD` (`cdq`/`cqo`). */
    pub fn cdq(&mut self, prec: Precision) {
        self.rex(prec == P64, false, false, false, false);
        self.buffer.write_byte(0x99);
    }

    /** Shift or rotate by `CL`. The count is masked to the width. */
    pub fn shift_cl(&mut self, op: ShiftOp, prec: Precision, rm: Rm) {
        self.instr(None, prec == P64, &[0xD3], op as u8, rm.raw(), false);
    }

    pub fn shift_imm(&mut self, op: ShiftOp, prec: Precision, rm: Rm, imm: u8) {
        assert!((imm as usize) < prec.bits());
        self.instr(None, prec == P64, &[0xC1], op as u8, rm.raw(), false);
        self.imm8(imm as i8);
    }

    /** Index of the highest set bit; `Z` set (and `dst` undefined) if the
     * source was zero. */
    pub fn bsr(&mut self, prec: Precision, dst: Register, src: Rm) {
        self.instr(None, prec == P64, &[0x0F, 0xBD], dst as u8, src.raw(), false);
    }

    pub fn bsf(&mut self, prec: Precision, dst: Register, src: Rm) {
        self.instr(None, prec == P64, &[0x0F, 0xBC], dst as u8, src.raw(), false);
    }

    pub fn lzcnt(&mut self, prec: Precision, dst: Register, src: Rm) {
        self.instr(Some(0xF3), prec == P64, &[0x0F, 0xBD], dst as u8, src.raw(), false);
    }

    pub fn tzcnt(&mut self, prec: Precision, dst: Register, src: Rm) {
        self.instr(Some(0xF3), prec == P64, &[0x0F, 0xBC], dst as u8, src.raw(), false);
    }

    /** Conditional move. A 32-bit `cmov` zeroes the upper half of `dst`
     * whether or not the move happens. */
    pub fn cmov(&mut self, cc: Cc, prec: Precision, dst: Register, src: Rm) {
        self.instr(None, prec == P64, &[0x0F, 0x40 | cc as u8], dst as u8, src.raw(), false);
    }

    /** Store `cc` as a byte; the rest of `dst` is unchanged. */
    pub fn setcc(&mut self, cc: Cc, dst: Register) {
        let force = byte_needs_rex(dst as u8);
        self.instr(None, false, &[0x0F, 0x90 | cc as u8], 0, RawRm::Reg(dst as u8), force);
    }

    /** Exchange two registers. Touches no flags. */
    pub fn xchg(&mut self, prec: Precision, a: Register, b: Register) {
        self.instr(None, prec == P64, &[0x87], b as u8, RawRm::Reg(a as u8), false);
    }

    // Stack and control flow.

    pub fn push(&mut self, rd: Register) {
        self.instr_plus_reg(false, 0x50, rd as u8);
    }

    pub fn pop(&mut self, rd: Register) {
        self.instr_plus_reg(false, 0x58, rd as u8);
    }

    pub fn ret(&mut self) {
        self.buffer.write_byte(0xC3);
    }

    /** Jump to a register or memory target. */
    pub fn jmp_rm(&mut self, rm: Rm) {
        self.instr(None, false, &[0xFF], 4, rm.raw(), false);
    }

    /** Call a register or memory target. */
    pub fn call_rm(&mut self, rm: Rm) {
        self.instr(None, false, &[0xFF], 2, rm.raw(), false);
    }

    /** `jmp rel32` with a zero displacement; returns its offset. */
    pub fn jmp_rel32(&mut self) -> usize {
        self.buffer.write_byte(0xE9);
        let pos = self.pos();
        self.imm32(0);
        pos
    }

    /** `call rel32` with a zero displacement; returns its offset. */
    pub fn call_rel32(&mut self) -> usize {
        self.buffer.write_byte(0xE8);
        let pos = self.pos();
        self.imm32(0);
        pos
    }

    /** `jcc rel32` with a zero displacement; returns its offset. */
    pub fn jcc_rel32(&mut self, cc: Cc) -> usize {
        self.buffer.write_byte(0x0F);
        self.buffer.write_byte(0x80 | cc as u8);
        let pos = self.pos();
        self.imm32(0);
        pos
    }

    /** A short conditional branch whose displacement byte (returned) must
     * be fixed with [`patch_short`].
     *
     * [`patch_short`]: Assembler::patch_short */
    pub fn jcc_short(&mut self, cc: Cc) -> usize {
        self.buffer.write_byte(0x70 | cc as u8);
        let pos = self.pos();
        self.buffer.write_byte(0);
        pos
    }

    /** Points the short branch at `disp_pos` to the current position. */
    pub fn patch_short(&mut self, disp_pos: usize) {
        let disp = self.pos() as i64 - (disp_pos + 1) as i64;
        let disp = i8::try_from(disp).expect("short branch out of range");
        let pos = self.pos();
        self.buffer.set_pos(disp_pos);
        self.imm8(disp);
        self.buffer.set_pos(pos);
    }

    // Miscellaneous.

    pub fn nop(&mut self) {
        self.buffer.write_byte(0x90);
    }

    pub fn int3(&mut self) {
        self.buffer.write_byte(0xCC);
    }

    pub fn endbr64(&mut self) {
        for byte in [0xF3, 0x0F, 0x1E, 0xFA] {
            self.buffer.write_byte(byte);
        }
    }

    pub fn mfence(&mut self) {
        for byte in [0x0F, 0xAE, 0xF0] {
            self.buffer.write_byte(byte);
        }
    }

    /** `lock cmpxchg [dst], src` at an access width of 1, 2, 4 or 8
     * bytes. Compares with `RA` and reports success in `Z`. */
    pub fn lock_cmpxchg(&mut self, bytes: usize, dst: Addr, src: Register) {
        self.buffer.write_byte(0xF0);
        match bytes {
            1 => {
                let force = byte_needs_rex(src as u8);
                self.instr(None, false, &[0x0F, 0xB0], src as u8, RawRm::Mem(dst), force);
            }
            2 => self.instr(Some(0x66), false, &[0x0F, 0xB1], src as u8, RawRm::Mem(dst), false),
            4 => self.instr(None, false, &[0x0F, 0xB1], src as u8, RawRm::Mem(dst), false),
            _ => self.instr(None, true, &[0x0F, 0xB1], src as u8, RawRm::Mem(dst), false),
        }
    }

    // Scalar floating point (SSE2).

    fn sprefix(double: bool) -> Option<u8> {
        Some(if double { 0xF2 } else { 0xF3 })
    }

    fn pprefix(double: bool) -> Option<u8> {
        if double { Some(0x66) } else { None }
    }

    /** `movss`/`movsd` into a vector register. */
    pub fn movs_load(&mut self, double: bool, dst: Xmm, src: XmmRm) {
        self.instr(Self::sprefix(double), false, &[0x0F, 0x10], dst.0, src.raw(), false);
    }

    /** `movss`/`movsd` to memory. */
    pub fn movs_store(&mut self, double: bool, dst: Addr, src: Xmm) {
        self.instr(Self::sprefix(double), false, &[0x0F, 0x11], src.0, RawRm::Mem(dst), false);
    }

    /** `movss`/`movsd` from a RIP-relative literal; returns the
     * displacement's offset. */
    pub fn movs_rip(&mut self, double: bool, dst: Xmm) -> usize {
        self.instr_rip(Self::sprefix(double), false, &[0x0F, 0x10], dst.0)
    }

    /** Unaligned 128-bit vector load. */
    pub fn movups_load(&mut self, dst: Xmm, src: Addr) {
        self.instr(None, false, &[0x0F, 0x10], dst.0, RawRm::Mem(src), false);
    }

    pub fn movups_store(&mut self, dst: Addr, src: Xmm) {
        self.instr(None, false, &[0x0F, 0x11], src.0, RawRm::Mem(dst), false);
    }

    /** Whole-register vector move. */
    pub fn movaps(&mut self, dst: Xmm, src: Xmm) {
        self.instr(None, false, &[0x0F, 0x28], dst.0, RawRm::Reg(src.0), false);
    }

    /** `addss` .. `divsd`: `opcode` is the common low byte (0x58 add,
     * 0x5C sub, 0x59 mul, 0x5E div). */
    pub fn fop(&mut self, opcode: u8, double: bool, dst: Xmm, src: XmmRm) {
        self.instr(Self::sprefix(double), false, &[0x0F, opcode], dst.0, src.raw(), false);
    }

    /** `ucomiss`/`ucomisd`: compare, setting `Z`/`P`/`C`. */
    pub fn ucomis(&mut self, double: bool, a: Xmm, b: XmmRm) {
        self.instr(Self::pprefix(double), false, &[0x0F, 0x2E], a.0, b.raw(), false);
    }

    /** `xorps`/`xorpd` against a RIP-relative mask. */
    pub fn xorp_rip(&mut self, double: bool, dst: Xmm) -> usize {
        self.instr_rip(Self::pprefix(double), false, &[0x0F, 0x57], dst.0)
    }

    /** `andps`/`andpd` against a RIP-relative mask. */
    pub fn andp_rip(&mut self, double: bool, dst: Xmm) -> usize {
        self.instr_rip(Self::pprefix(double), false, &[0x0F, 0x54], dst.0)
    }

    /** The zero idiom. */
    pub fn xorps(&mut self, dst: Xmm, src: Xmm) {
        self.instr(None, false, &[0x0F, 0x57], dst.0, RawRm::Reg(src.0), false);
    }

    /** `cvtss2sd`/`cvtsd2ss`; `to_double` names the destination. */
    pub fn cvtf2f(&mut self, to_double: bool, dst: Xmm, src: XmmRm) {
        self.instr(Self::sprefix(!to_double), false, &[0x0F, 0x5A], dst.0, src.raw(), false);
    }

    /** `cvtsi2ss`/`cvtsi2sd` from a 32- or 64-bit integer. */
    pub fn cvti2f(&mut self, double: bool, dst: Xmm, prec: Precision, src: Rm) {
        self.instr(Self::sprefix(double), prec == P64, &[0x0F, 0x2A], dst.0, src.raw(), false);
    }

    /** `cvttss2si`/`cvttsd2si`: truncation toward zero. */
    pub fn cvtf2i(&mut self, prec: Precision, dst: Register, double: bool, src: XmmRm) {
        self.instr(Self::sprefix(double), prec == P64, &[0x0F, 0x2C], dst as u8, src.raw(), false);
    }

    // Vector data movement (SSE2/SSE4.1).

    /** `movd`/`movq` general register to vector register. */
    pub fn movd_to(&mut self, prec: Precision, dst: Xmm, src: Register) {
        self.instr(Some(0x66), prec == P64, &[0x0F, 0x6E], dst.0, RawRm::Reg(src as u8), false);
    }

    /** `movd`/`movq` vector register to general register. */
    pub fn movd_from(&mut self, prec: Precision, dst: Register, src: Xmm) {
        self.instr(Some(0x66), prec == P64, &[0x0F, 0x7E], src.0, RawRm::Reg(dst as u8), false);
    }

    pub fn pshufd(&mut self, dst: Xmm, src: Xmm, order: u8) {
        self.instr(Some(0x66), false, &[0x0F, 0x70], dst.0, RawRm::Reg(src.0), false);
        self.imm8(order as i8);
    }

    pub fn pshuflw(&mut self, dst: Xmm, src: Xmm, order: u8) {
        self.instr(Some(0xF2), false, &[0x0F, 0x70], dst.0, RawRm::Reg(src.0), false);
        self.imm8(order as i8);
    }

    pub fn punpcklbw(&mut self, dst: Xmm, src: Xmm) {
        self.instr(Some(0x66), false, &[0x0F, 0x60], dst.0, RawRm::Reg(src.0), false);
    }

    pub fn shufps(&mut self, dst: Xmm, src: Xmm, order: u8) {
        self.instr(None, false, &[0x0F, 0xC6], dst.0, RawRm::Reg(src.0), false);
        self.imm8(order as i8);
    }

    /** `pextrb`/`pextrw`/`pextrd`/`pextrq` lane to register or memory
     * (SSE4.1). */
    pub fn pextr(&mut self, lane: LaneSize, dst: Rm, src: Xmm, index: u8) {
        let (w, opcode) = match lane {
            LaneSize::L8 => (false, 0x14),
            LaneSize::L16 => (false, 0x15),
            LaneSize::L32 => (false, 0x16),
            LaneSize::L64 => (true, 0x16),
        };
        let force = lane == LaneSize::L8
            && matches!(dst, Rm::Reg(r) if byte_needs_rex(r as u8));
        self.instr(Some(0x66), w, &[0x0F, 0x3A, opcode], src.0, dst.raw(), force);
        self.imm8(index as i8);
    }

    /** `pinsrb`/`pinsrw`/`pinsrd`/`pinsrq` register or memory into a lane
     * (`pinsrw` is SSE2, the rest SSE4.1). */
    pub fn pinsr(&mut self, lane: LaneSize, dst: Xmm, src: Rm, index: u8) {
        let (w, opcode): (bool, &[u8]) = match lane {
            LaneSize::L8 => (false, &[0x0F, 0x3A, 0x20]),
            LaneSize::L16 => (false, &[0x0F, 0xC4]),
            LaneSize::L32 => (false, &[0x0F, 0x3A, 0x22]),
            LaneSize::L64 => (true, &[0x0F, 0x3A, 0x22]),
        };
        let force = lane == LaneSize::L8
            && matches!(src, Rm::Reg(r) if byte_needs_rex(r as u8));
        self.instr(Some(0x66), w, opcode, dst.0, src.raw(), force);
        self.imm8(index as i8);
    }

    /** `pmovsx*`/`pmovzx*`: widen the low lanes (SSE4.1). */
    pub fn pmovx(&mut self, sign: bool, from: LaneSize, to: LaneSize, dst: Xmm, src: XmmRm) {
        let offset = match (from, to) {
            (LaneSize::L8, LaneSize::L16) => 0,
            (LaneSize::L8, LaneSize::L32) => 1,
            (LaneSize::L8, LaneSize::L64) => 2,
            (LaneSize::L16, LaneSize::L32) => 3,
            (LaneSize::L16, LaneSize::L64) => 4,
            (LaneSize::L32, LaneSize::L64) => 5,
            _ => panic!("not a widening lane pair"),
        };
        let base = if sign { 0x20 } else { 0x30 };
        self.instr(Some(0x66), false, &[0x0F, 0x38, base + offset], dst.0, src.raw(), false);
    }

    /** Gather the byte sign bits into a general register. */
    pub fn pmovmskb(&mut self, dst: Register, src: Xmm) {
        self.instr(Some(0x66), false, &[0x0F, 0xD7], dst as u8, RawRm::Reg(src.0), false);
    }

    /** Gather the 32- or 64-bit lane sign bits into a general register. */
    pub fn movmskp(&mut self, double: bool, dst: Register, src: Xmm) {
        self.instr(Self::pprefix(double), false, &[0x0F, 0x50], dst as u8, RawRm::Reg(src.0), false);
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Assembler::new()
    }
}

/** The untyped form [`Assembler::instr`] consumes. */
#[derive(Debug, Copy, Clone)]
enum RawRm {
    Reg(u8),
    Mem(Addr),
}

impl Rm {
    fn raw(self) -> RawRm {
        match self {
            Rm::Reg(r) => RawRm::Reg(r as u8),
            Rm::Mem(a) => RawRm::Mem(a),
        }
    }
}

impl XmmRm {
    fn raw(self) -> RawRm {
        match self {
            XmmRm::Reg(x) => RawRm::Reg(x.0),
            XmmRm::Mem(a) => RawRm::Mem(a),
        }
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;
    use AluOp::*;
    use ShiftOp::*;

    use std::cmp::max;

    use iced_x86::{
        Decoder, Formatter, FormatterOperandOptions, FormatterOptionsProvider, Instruction,
        NasmFormatter, NumberFormattingOptions, OpKind,
    };

    pub const ALL_REGISTERS: [Register; 16] = [
        RA, RC, RD, RB, RSP, RBP, RSI, RDI, R8, R9, R10, R11, R12, R13, R14, R15,
    ];

    /** Formats branch targets as full-width hex, matching the other operand kinds' defaults. */
    struct BranchHexOptionsProvider;

    impl FormatterOptionsProvider for BranchHexOptionsProvider {
        fn operand_options(
            &mut self,
            instruction: &Instruction,
            _operand: u32,
            _instruction_operand: Option<u32>,
            _options: &mut FormatterOperandOptions,
            number_options: &mut NumberFormattingOptions<'_>,
        ) {
            if matches!(
                instruction.op0_kind(),
                OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64
            ) {
                number_options.leading_zeros = true;
                number_options.small_hex_numbers_in_decimal = false;
            }
        }
    }

    /**
     * Disassembles `code_bytes` and compares the result to `expected`,
     * reporting differences line by line.
     */
    pub fn disassemble(code_bytes: &[u8], expected: Vec<&str>) -> Result<(), Vec<String>> {
        // Disassemble the code.
        let mut decoder = Decoder::new(64, code_bytes, 0);
        decoder.set_ip(0);
        let mut formatter = NasmFormatter::with_options(None, Some(Box::new(BranchHexOptionsProvider)));
        let mut ips = Vec::new();
        let mut byteses = Vec::new();
        let mut observed = Vec::new();
        for instruction in decoder {
            let start = instruction.ip() as usize;
            let len = instruction.len();
            ips.push(start);
            byteses.push(
                code_bytes[start..][..len]
                    .iter()
                    .rev()
                    .map(|b| format!("{:02X}", b))
                    .collect::<Vec<String>>()
                    .join(" "),
            );
            let mut assembly = String::with_capacity(80);
            formatter.format(&instruction, &mut assembly);
            observed.push(assembly);
        }

        // Search for differences.
        let mut error = false;
        for i in 0..max(expected.len(), observed.len()) {
            let e_line = if i < expected.len() { expected[i] } else { "missing" };
            let o_line = if i < observed.len() { &observed[i] } else { "missing" };
            if e_line != o_line {
                println!("Difference in line {}", i + 1);
                println!("{:016X}   {:>32}   {}", ips[i], byteses[i], o_line);
                println!("{:>16}   {:>32}   {}", "Expected", "", e_line);
                error = true;
            }
        }
        if error { Err(observed) } else { Ok(()) }
    }

    fn with_assembler(f: impl FnOnce(&mut Assembler), expected: Vec<&str>) {
        let mut a = Assembler::new();
        f(&mut a);
        disassemble(&a.into_bytes(), expected).unwrap();
    }

    const DISP: i32 = 0x12345678;

    /** Test that the registers are named correctly. */
    #[test]
    fn regs() {
        with_assembler(
            |a| {
                for &r in &ALL_REGISTERS {
                    a.mov_rr(P32, r, r);
                }
            },
            vec![
                "mov eax,eax",
                "mov ecx,ecx",
                "mov edx,edx",
                "mov ebx,ebx",
                "mov esp,esp",
                "mov ebp,ebp",
                "mov esi,esi",
                "mov edi,edi",
                "mov r8d,r8d",
                "mov r9d,r9d",
                "mov r10d,r10d",
                "mov r11d,r11d",
                "mov r12d,r12d",
                "mov r13d,r13d",
                "mov r14d,r14d",
                "mov r15d,r15d",
            ],
        );
    }

    /** Test that we can assemble all the sizes of constant. */
    #[test]
    fn const_() {
        with_assembler(
            |a| {
                for &c in &[0, 1000, 0x76543210, -1, 0x76543210FEDCBA98] {
                    a.const_(P64, R8, c);
                }
                a.const_(P32, R15, -1);
                a.const64(RA, 42);
            },
            vec![
                "mov r8d,0",
                "mov r8d,3E8h",
                "mov r8d,76543210h",
                "mov r8,0FFFFFFFFFFFFFFFFh",
                "mov r8,76543210FEDCBA98h",
                "mov r15d,0FFFFFFFFh",
                "mov rax,2Ah",
            ],
        );
    }

    /** Test every addressing mode, including the SIB special cases. */
    #[test]
    fn addressing() {
        with_assembler(
            |a| {
                a.load(P64, RA, Addr::base(RB, 0));
                a.load(P64, RA, Addr::base(RSP, 0));
                a.load(P64, RA, Addr::base(RBP, 0));
                a.load(P64, RA, Addr::base(R12, 0x10));
                a.load(P64, RA, Addr::base(R13, 0));
                a.load(P64, RA, Addr::base(RB, -0x18));
                a.load(P64, RA, Addr::base(RB, DISP));
                a.load(P64, RA, Addr::indexed(RB, RC, 3, 8));
                a.load(P64, RA, Addr::indexed(RSP, R9, 0, 0));
                a.store(P64, Addr::indexed(R8, R12, 2, 4), R10);
                a.load(P64, RA, Addr::absolute(0x1000));
            },
            vec![
                "mov rax,[rbx]",
                "mov rax,[rsp]",
                "mov rax,[rbp]",
                "mov rax,[r12+10h]",
                "mov rax,[r13]",
                "mov rax,[rbx-18h]",
                "mov rax,[rbx+12345678h]",
                "mov rax,[rbx+rcx*8+8]",
                "mov rax,[rsp+r9]",
                "mov [r8+r12*4+4],r10",
                "mov rax,[1000h]",
            ],
        );
    }

    /** Test that the AluOps are named correctly, in every mode. */
    #[test]
    fn alu() {
        with_assembler(
            |a| {
                for &op in &[Add, Or, Adc, Sbb, And, Sub, Xor, Cmp] {
                    a.alu_r_rm(op, P64, R10, Rm::Reg(R9));
                }
                a.alu_rm_r(Add, P32, Rm::Mem(Addr::base(R8, DISP)), R10);
                a.alu_r_rm(Sub, P64, R9, Rm::Mem(Addr::base(R8, DISP)));
                a.alu_imm(Cmp, P64, Rm::Reg(RB), 100);
                a.test(P64, Rm::Reg(RA), RA);
                a.test_imm(P32, Rm::Reg(RC), 7);
            },
            vec![
                "add r10,r9",
                "or r10,r9",
                "adc r10,r9",
                "sbb r10,r9",
                "and r10,r9",
                "sub r10,r9",
                "xor r10,r9",
                "cmp r10,r9",
                "add [r8+12345678h],r10d",
                "sub r9,[r8+12345678h]",
                "cmp rbx,64h",
                "test rax,rax",
                "test ecx,7",
            ],
        );
    }

    /** Test shifts, multiplies and divides. */
    #[test]
    fn muldiv_shift() {
        with_assembler(
            |a| {
                for &op in &[Rol, Ror, Shl, Shr, Sar] {
                    a.shift_cl(op, P64, Rm::Reg(R8));
                }
                a.shift_imm(Shl, P32, Rm::Reg(R8), 7);
                a.imul(P64, R8, Rm::Reg(R9));
                a.mul1(P64, Rm::Reg(RD));
                a.imul1(P64, Rm::Reg(RD));
                a.div(P64, Rm::Reg(R10));
                a.idiv(P64, Rm::Reg(R10));
                a.cdq(P64);
                a.not_(P64, Rm::Reg(RA));
            },
            vec![
                "rol r8,cl",
                "ror r8,cl",
                "shl r8,cl",
                "shr r8,cl",
                "sar r8,cl",
                "shl r8d,7",
                "imul r8,r9",
                "mul rdx",
                "imul rdx",
                "div r10",
                "idiv r10",
                "cqo",
                "not rax",
            ],
        );
    }

    /** Test narrow loads and stores. */
    #[test]
    fn narrow() {
        with_assembler(
            |a| {
                a.movzx8(P64, R9, Rm::Mem(Addr::base(R8, DISP)));
                a.movsx8(P64, R9, Rm::Mem(Addr::base(R8, DISP)));
                a.movzx16(P64, R9, Rm::Mem(Addr::base(R8, DISP)));
                a.movsx16(P64, R9, Rm::Mem(Addr::base(R8, DISP)));
                a.mov32(R9, Rm::Mem(Addr::base(R8, DISP)));
                a.movsx32(R9, Rm::Mem(Addr::base(R8, DISP)));
                a.store8(Addr::base(R8, DISP), R9);
                a.store8(Addr::base(R8, DISP), RSI);
                a.store16(Addr::base(R8, DISP), R9);
                a.store32(Addr::base(R8, DISP), R9);
                a.movzx8(P64, RA, Rm::Reg(RSI));
            },
            vec![
                "movzx r9,byte [r8+12345678h]",
                "movsx r9,byte [r8+12345678h]",
                "movzx r9,word [r8+12345678h]",
                "movsx r9,word [r8+12345678h]",
                "mov r9d,[r8+12345678h]",
                "movsxd r9,[r8+12345678h]",
                "mov [r8+12345678h],r9b",
                "mov [r8+12345678h],sil",
                "mov [r8+12345678h],r9w",
                "mov [r8+12345678h],r9d",
                "movzx rax,sil",
            ],
        );
    }

    /** Test conditional moves, set-byte, and bit scans. */
    #[test]
    fn conditionals() {
        with_assembler(
            |a| {
                a.cmov(Cc::G, P64, R8, Rm::Reg(R9));
                a.cmov(Cc::Z, P32, RA, Rm::Reg(RC));
                a.setcc(Cc::Z, RA);
                a.setcc(Cc::L, RSI);
                a.bsr(P64, RA, Rm::Reg(RC));
                a.bsf(P64, RA, Rm::Reg(RC));
                a.lzcnt(P64, RA, Rm::Reg(RC));
                a.tzcnt(P32, RA, Rm::Reg(RC));
                a.xchg(P64, RC, R10);
            },
            vec![
                "cmovg r8,r9",
                "cmove eax,ecx",
                "sete al",
                "setl sil",
                "bsr rax,rcx",
                "bsf rax,rcx",
                "lzcnt rax,rcx",
                "tzcnt eax,ecx",
                "xchg rcx,r10",
            ],
        );
    }

    /** Test the control-flow instructions. */
    #[test]
    fn control_flow() {
        with_assembler(
            |a| {
                a.push(R8);
                a.pop(R9);
                a.jmp_rm(Rm::Reg(R10));
                a.call_rm(Rm::Reg(R10));
                a.jmp_rel32();
                a.call_rel32();
                a.jcc_rel32(Cc::Z);
                a.ret();
                a.lea(P64, RD, Addr::base(RSP, 8));
            },
            vec![
                "push r8",
                "pop r9",
                "jmp r10",
                "call r10",
                "jmp 000000000000000Fh",
                "call 0000000000000014h",
                "je near 000000000000001Ah",
                "ret",
                "lea rdx,[rsp+8]",
            ],
        );
    }

    /** Test that short branches patch to the right displacement. */
    #[test]
    fn short_branches() {
        let mut a = Assembler::new();
        let skip = a.jcc_short(Cc::NZ);
        a.nop();
        a.nop();
        a.patch_short(skip);
        a.ret();
        disassemble(
            &a.into_bytes(),
            vec!["jne short 0000000000000004h", "nop", "nop", "ret"],
        )
        .unwrap();
    }

    /** Test the atomic and fence instructions. */
    #[test]
    fn atomics() {
        with_assembler(
            |a| {
                a.lock_cmpxchg(8, Addr::base(RDI, 0), RSI);
                a.lock_cmpxchg(4, Addr::base(RDI, 0), RSI);
                a.lock_cmpxchg(2, Addr::base(RDI, 0), RSI);
                a.lock_cmpxchg(1, Addr::base(RDI, 0), RSI);
                a.mfence();
                a.endbr64();
                a.int3();
            },
            vec![
                "lock cmpxchg [rdi],rsi",
                "lock cmpxchg [rdi],esi",
                "lock cmpxchg [rdi],si",
                "lock cmpxchg [rdi],sil",
                "mfence",
                "endbr64",
                "int3",
            ],
        );
    }

    /** Test the scalar floating point instructions. */
    #[test]
    fn scalar_float() {
        with_assembler(
            |a| {
                a.movs_load(true, Xmm(0), XmmRm::Reg(Xmm(1)));
                a.movs_load(false, Xmm(8), XmmRm::Mem(Addr::base(RA, 0x20)));
                a.movs_store(true, Addr::base(RA, 0x20), Xmm(15));
                a.fop(0x58, true, Xmm(0), XmmRm::Reg(Xmm(1)));
                a.fop(0x5C, false, Xmm(0), XmmRm::Reg(Xmm(1)));
                a.fop(0x59, true, Xmm(0), XmmRm::Reg(Xmm(8)));
                a.fop(0x5E, false, Xmm(0), XmmRm::Reg(Xmm(1)));
                a.ucomis(true, Xmm(0), XmmRm::Reg(Xmm(1)));
                a.ucomis(false, Xmm(0), XmmRm::Reg(Xmm(1)));
                a.cvtf2f(true, Xmm(0), XmmRm::Reg(Xmm(1)));
                a.cvtf2f(false, Xmm(0), XmmRm::Reg(Xmm(1)));
                a.cvti2f(true, Xmm(0), P64, Rm::Reg(RDI));
                a.cvtf2i(P64, RA, true, XmmRm::Reg(Xmm(0)));
                a.xorps(Xmm(0), Xmm(0));
            },
            vec![
                "movsd xmm0,xmm1",
                "movss xmm8,[rax+20h]",
                "movsd [rax+20h],xmm15",
                "addsd xmm0,xmm1",
                "subss xmm0,xmm1",
                "mulsd xmm0,xmm8",
                "divss xmm0,xmm1",
                "ucomisd xmm0,xmm1",
                "ucomiss xmm0,xmm1",
                "cvtss2sd xmm0,xmm1",
                "cvtsd2ss xmm0,xmm1",
                "cvtsi2sd xmm0,rdi",
                "cvttsd2si rax,xmm0",
                "xorps xmm0,xmm0",
            ],
        );
    }

    /** Test the vector data movement instructions. */
    #[test]
    fn vectors() {
        with_assembler(
            |a| {
                a.movups_load(Xmm(0), Addr::base(RB, 0));
                a.movups_store(Addr::base(RB, 0), Xmm(15));
                a.movaps(Xmm(1), Xmm(2));
                a.movd_to(P32, Xmm(0), RA);
                a.movd_to(P64, Xmm(0), RA);
                a.movd_from(P64, RA, Xmm(0));
                a.pshufd(Xmm(0), Xmm(1), 0x44);
                a.pshuflw(Xmm(0), Xmm(1), 0);
                a.punpcklbw(Xmm(0), Xmm(0));
                a.shufps(Xmm(0), Xmm(0), 0);
                a.pextr(LaneSize::L32, Rm::Reg(RA), Xmm(1), 3);
                a.pextr(LaneSize::L64, Rm::Reg(RA), Xmm(1), 1);
                a.pinsr(LaneSize::L8, Xmm(0), Rm::Reg(RA), 15);
                a.pinsr(LaneSize::L16, Xmm(0), Rm::Reg(RA), 2);
                a.pmovx(true, LaneSize::L8, LaneSize::L64, Xmm(0), XmmRm::Reg(Xmm(1)));
                a.pmovx(false, LaneSize::L16, LaneSize::L32, Xmm(0), XmmRm::Reg(Xmm(1)));
                a.pmovmskb(RA, Xmm(0));
                a.movmskp(false, RA, Xmm(0));
                a.movmskp(true, RA, Xmm(0));
            },
            vec![
                "movups xmm0,[rbx]",
                "movups [rbx],xmm15",
                "movaps xmm1,xmm2",
                "movd xmm0,eax",
                "movq xmm0,rax",
                "movq rax,xmm0",
                "pshufd xmm0,xmm1,44h",
                "pshuflw xmm0,xmm1,0",
                "punpcklbw xmm0,xmm0",
                "shufps xmm0,xmm0,0",
                "pextrd eax,xmm1,3",
                "pextrq rax,xmm1,1",
                "pinsrb xmm0,eax,0Fh",
                "pinsrw xmm0,eax,2",
                "pmovsxbq xmm0,xmm1",
                "pmovzxwd xmm0,xmm1",
                "pmovmskb eax,xmm0",
                "movmskps eax,xmm0",
                "movmskpd eax,xmm0",
            ],
        );
    }

    /** Test that RIP-relative operands report the displacement offset. */
    #[test]
    fn rip_relative() {
        let mut a = Assembler::new();
        let d1 = a.movs_rip(true, Xmm(0));
        let d2 = a.xorp_rip(true, Xmm(0));
        let d3 = a.andp_rip(true, Xmm(1));
        assert_eq!(d1, 4);
        assert_eq!(d2, d1 + 8);
        assert_eq!(d3, d2 + 8);
        let bytes = a.into_bytes();
        // movsd xmm0, [rip+0]; xorpd xmm0, [rip+0]; andpd xmm1, [rip+0]
        assert_eq!(&bytes[..4], &[0xF2, 0x0F, 0x10, 0x05]);
        assert_eq!(&bytes[8..12], &[0x66, 0x0F, 0x57, 0x05]);
        assert_eq!(&bytes[16..20], &[0x66, 0x0F, 0x54, 0x0D]);
        assert_eq!(bytes.len(), 24);
    }
}
