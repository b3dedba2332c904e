//! A placeholder encoder for architectures without a backend. Register
//! budgets match the reference backend so the emission API validates the
//! same programs everywhere; generation itself reports `Unsupported`.

use crate::abi::FrameLayout;
use crate::cpu::CpuFeatures;
use crate::error::{Error, Result};
use crate::ir::Inst;
use crate::reloc::Relocs;

use super::{CodeEncoder, Site};

pub struct Encoder;

impl CodeEncoder for Encoder {
    const MAX_SCRATCHES: u8 = 7;
    const MAX_SAVEDS: u8 = 6;
    const MAX_FSCRATCHES: u8 = 8;
    const MAX_FSAVEDS: u8 = 2;
    const SUPPORTS_V256: bool = false;

    fn new(_features: CpuFeatures) -> Self {
        Encoder
    }

    fn reserve_pool(&mut self, _bytes: usize) {}

    fn offset(&self) -> usize {
        0
    }

    fn encode(
        &mut self,
        _inst: &Inst,
        _relocs: &Relocs,
        _frames: &[FrameLayout],
    ) -> Result<Option<Site>> {
        Err(Error::Unsupported)
    }

    fn finish(self) -> Result<Vec<u8>> {
        Err(Error::Unsupported)
    }
}
