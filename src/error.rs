use thiserror::Error;

/// Everything that can go wrong while building or generating code.
///
/// `Unsupported` is a per-call capability report and never poisons the
/// [`Compiler`]; every other variant becomes the sticky error and turns all
/// later emission calls into no-ops that return it again.
///
/// [`Compiler`]: crate::Compiler
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An internal buffer could not grow.
    #[error("cannot allocate compiler memory")]
    AllocFailed,

    /// Executable memory could not be allocated or re-protected.
    #[error("cannot allocate executable memory")]
    ExecAllocFailed,

    /// The requested operation is unavailable on the current target CPU.
    /// Callers may probe with this and fall back to another sequence.
    #[error("operation not supported on this target")]
    Unsupported,

    /// Code has already been generated; the compiler accepts no further
    /// instructions.
    #[error("code already generated")]
    Compiled,

    /// An argument violates the emission contract: an unallocated register,
    /// an illegal operand combination, a dead flag window, a double-bound
    /// label.
    #[error("bad argument")]
    BadArgument,
}

pub type Result<T> = std::result::Result<T, Error>;
