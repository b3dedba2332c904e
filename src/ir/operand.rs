use super::{FReg, Reg};

/**
 * A memory reference: `base + (index << shift) + disp`, with zero, one or
 * two registers. The shift must be 0..=3. Targets whose addressing modes are
 * narrower legalize through their temporary register.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Mem {
    pub base: Option<Reg>,
    pub index: Option<(Reg, u8)>,
    pub disp: i64,
}

impl Mem {
    /** `[disp]` — an absolute address. */
    pub fn absolute(disp: i64) -> Self {
        Mem { base: None, index: None, disp }
    }

    /** `[base + disp]`. */
    pub fn base(base: Reg, disp: i64) -> Self {
        Mem { base: Some(base), index: None, disp }
    }

    /** `[base + (index << shift) + disp]`. */
    pub fn indexed(base: Reg, index: Reg, shift: u8, disp: i64) -> Self {
        Mem { base: Some(base), index: Some((index, shift)), disp }
    }

    /** Every register this reference reads. */
    pub fn regs(&self) -> impl Iterator<Item = Reg> + '_ {
        self.base.iter().copied().chain(self.index.iter().map(|&(r, _)| r))
    }
}

//-----------------------------------------------------------------------------

/** An integer operand: register, immediate, or memory reference. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Reg),
    Imm(i64),
    Mem(Mem),
}

impl Operand {
    pub fn is_reg(&self) -> bool {
        matches!(self, Operand::Reg(_))
    }

    pub fn is_imm(&self) -> bool {
        matches!(self, Operand::Imm(_))
    }
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Self {
        Operand::Reg(r)
    }
}

impl From<i64> for Operand {
    fn from(imm: i64) -> Self {
        Operand::Imm(imm)
    }
}

impl From<Mem> for Operand {
    fn from(m: Mem) -> Self {
        Operand::Mem(m)
    }
}

//-----------------------------------------------------------------------------

/** A floating point operand. Immediates go through the literal pool. */
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum FOperand {
    Reg(FReg),
    Imm(f64),
    Mem(Mem),
}

impl FOperand {
    pub fn is_reg(&self) -> bool {
        matches!(self, FOperand::Reg(_))
    }
}

impl From<FReg> for FOperand {
    fn from(r: FReg) -> Self {
        FOperand::Reg(r)
    }
}

impl From<f64> for FOperand {
    fn from(imm: f64) -> Self {
        FOperand::Imm(imm)
    }
}

impl From<Mem> for FOperand {
    fn from(m: Mem) -> Self {
        FOperand::Mem(m)
    }
}

//-----------------------------------------------------------------------------

/**
 * An operand of a SIMD data movement operation, which may name either
 * register file.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SimdOperand {
    Reg(Reg),
    FReg(FReg),
    Imm(i64),
    Mem(Mem),
}

impl From<Reg> for SimdOperand {
    fn from(r: Reg) -> Self {
        SimdOperand::Reg(r)
    }
}

impl From<FReg> for SimdOperand {
    fn from(r: FReg) -> Self {
        SimdOperand::FReg(r)
    }
}

impl From<i64> for SimdOperand {
    fn from(imm: i64) -> Self {
        SimdOperand::Imm(imm)
    }
}

impl From<Mem> for SimdOperand {
    fn from(m: Mem) -> Self {
        SimdOperand::Mem(m)
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use Reg::*;

    #[test]
    fn mem_regs() {
        let m = Mem::indexed(R(0), S(1), 3, -16);
        let regs: Vec<Reg> = m.regs().collect();
        assert_eq!(regs, vec![R(0), S(1)]);
        assert!(Mem::absolute(0x1000).regs().next().is_none());
    }
}
