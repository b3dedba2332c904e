//! A retargetable, low-level just-in-time code generation backend.
//!
//! Client code builds a program out of an architecture-neutral instruction
//! set (virtual registers, arithmetic/logic/memory/float/SIMD operations,
//! labels and jumps) on a [`Compiler`], then calls
//! [`generate`](Compiler::generate) to obtain native machine code pinned in
//! executable memory. Labels, jumps, constants and put-labels are deferred
//! to generation time; rewritable jumps and constants can be re-patched in
//! the generated code afterwards.
//!
//! ```no_run
//! use lirjit::{
//!     ArgKind, Compiler, EnterOptions, FlagRequest, Op1, Op2, Operand,
//!     Precision, Reg, RegRequest, Signature,
//! };
//!
//! // fn add(a, b) -> a + b
//! let mut c = Compiler::new();
//! c.enter(
//!     EnterOptions::default(),
//!     Signature::returns(ArgKind::Word).arg(ArgKind::Word).arg(ArgKind::Word),
//!     RegRequest::words(2, 2),
//!     0,
//! ).unwrap();
//! c.op2(
//!     Op2::Add,
//!     Precision::P64,
//!     FlagRequest::NONE,
//!     Operand::Reg(Reg::R(0)),
//!     Operand::Reg(Reg::S(0)),
//!     Operand::Reg(Reg::S(1)),
//! ).unwrap();
//! c.ret(Op1::Mov, Operand::Reg(Reg::R(0))).unwrap();
//! let code = c.generate().unwrap();
//! let f: extern "C" fn(i64, i64) -> i64 =
//!     unsafe { std::mem::transmute(code.addr()) };
//! assert_eq!(f(2, 40), 42);
//! ```

pub mod abi;
pub mod buffer;
pub mod codegen;
pub mod compiler;
pub mod cpu;
pub mod error;
pub mod ir;
pub mod reloc;
pub mod target;

pub use abi::{ArgKind, EnterOptions, RegRequest, Signature};
pub use codegen::CompiledCode;
pub use compiler::{CallKind, Compiler, MemAccess};
pub use cpu::platform_name;
pub use error::{Error, Result};
pub use ir::{
    Condition, FOp1, FOp2, FOperand, FPrecision, FReg, FlagGroup, FlagRequest,
    LaneSize, Mem, Op0, Op1, Op2, Operand, Precision, Reg, SimdDesc,
    SimdOperand, VecWidth,
};
pub use reloc::{Const, Jump, Label, PutLabel};
