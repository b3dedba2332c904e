//! The second pass: lowers the instruction buffer to native bytes through
//! the target encoder, resolves every deferred-resolution record, and pins
//! the result in executable memory.

use log::{debug, trace};

use crate::abi::FrameLayout;
use crate::buffer::ExecImage;
use crate::cpu;
use crate::error::{Error, Result};
use crate::ir::Inst;
use crate::reloc::{Const, Jump, JumpTarget, Label, PutLabel, Relocs};
use crate::target::{CodeEncoder, Native, Site};

/** A jump's resolved patch site. */
#[derive(Debug, Copy, Clone)]
struct JumpSite {
    /** Offset of the patchable field within the code. */
    site_off: usize,
    /** Whether the field is an absolute imm64 (re-patchable) rather than a
     * displacement. */
    absolute: bool,
    rewritable: bool,
}

/**
 * The product of `generate`: owns the executable image and answers
 * address queries and post-generation patches. Addresses remain valid for
 * the lifetime of this object.
 */
pub struct CompiledCode {
    image: ExecImage,
    label_offs: Vec<usize>,
    jump_sites: Vec<Option<JumpSite>>,
    const_offs: Vec<usize>,
    put_label_offs: Vec<usize>,
}

impl CompiledCode {
    /** The entry address of the generated code. */
    pub fn addr(&self) -> usize {
        self.image.base()
    }

    pub fn size(&self) -> usize {
        self.image.len()
    }

    pub fn code(&self) -> &[u8] {
        self.image.as_slice()
    }

    /** The native address `label` resolved to. */
    pub fn label_addr(&self, label: Label) -> usize {
        self.image.base() + self.label_offs[label.0 as usize]
    }

    /** The patchable address of `jump`, as used by [`set_jump_addr`].
     *
     * [`set_jump_addr`]: CompiledCode::set_jump_addr */
    pub fn jump_addr(&self, jump: Jump) -> usize {
        let site = self.jump_sites[jump.0 as usize].expect("jump was never emitted");
        self.image.base() + site.site_off
    }

    /** The address of the embedded immediate of `konst`. */
    pub fn const_addr(&self, konst: Const) -> usize {
        self.image.base() + self.const_offs[konst.0 as usize]
    }

    /**
     * Re-targets a rewritable jump in the already generated code. Only the
     * patched jump's control transfer changes; no other code is affected.
     */
    pub fn set_jump_addr(&mut self, jump: Jump, target: usize) -> Result<()> {
        let site = match self.jump_sites.get(jump.0 as usize) {
            Some(Some(site)) if site.rewritable && site.absolute => *site,
            _ => return Err(Error::BadArgument),
        };
        self.image.patch8(site.site_off, target as u64)
    }

    /**
     * Overwrites the immediate a `const_` embedded, observable on the next
     * execution of the instruction.
     */
    pub fn set_const(&mut self, konst: Const, value: i64) -> Result<()> {
        let off = match self.const_offs.get(konst.0 as usize) {
            Some(&off) => off,
            None => return Err(Error::BadArgument),
        };
        self.image.patch8(off, value as u64)
    }

    /** The address a `put_label` will materialize, for diagnostics. */
    pub fn put_label_addr(&self, put: PutLabel) -> usize {
        self.image.base() + self.put_label_offs[put.0 as usize]
    }
}

//-----------------------------------------------------------------------------

/**
 * Walks the instruction buffer once, lowering to native bytes and
 * collecting patch sites; then resolves labels, copies the bytes into
 * executable memory, resolves absolute references against the final base
 * address, and flips the pages executable.
 */
pub fn generate(
    insts: &[Inst],
    relocs: &Relocs,
    frames: &[FrameLayout],
    pool_reserve: usize,
) -> Result<CompiledCode> {
    let mut enc = Native::new(*cpu::features());
    enc.reserve_pool(pool_reserve);

    let mut label_offs = vec![0usize; relocs.labels.len()];
    let mut jump_sites: Vec<Option<(Site, bool)>> = vec![None; relocs.jumps.len()];
    let mut const_offs = vec![0usize; relocs.consts.len()];
    let mut put_sites = vec![0usize; relocs.put_labels.len()];

    // Pass 1: lower every instruction, remembering where labels fall and
    // which bytes each deferred record must patch. Label positions are
    // nondecreasing in arena order, so a cursor suffices.
    let mut next_label = 0;
    for (i, inst) in insts.iter().enumerate() {
        while next_label < relocs.labels.len()
            && relocs.labels[next_label].pos as usize == i
        {
            label_offs[next_label] = enc.offset();
            next_label += 1;
        }
        let site = enc.encode(inst, relocs, frames)?;
        match (inst, site) {
            (Inst::Jump(j), Some(site)) => {
                let rewritable = relocs.jump(*j).rewritable;
                jump_sites[j.0 as usize] = Some((site, rewritable));
            }
            (Inst::Const { id, .. }, Some(Site::Abs64 { imm_pos })) => {
                const_offs[id.0 as usize] = imm_pos;
            }
            (Inst::PutLabel { id, .. }, Some(Site::Abs64 { imm_pos })) => {
                put_sites[id.0 as usize] = imm_pos;
            }
            (_, None) => {}
            _ => unreachable!("encoder returned a site for the wrong record"),
        }
    }
    while next_label < relocs.labels.len() {
        label_offs[next_label] = enc.offset();
        next_label += 1;
    }

    let mut bytes = enc.finish()?;
    debug!("generated {} bytes for {} instructions", bytes.len(), insts.len());

    // Resolve label-relative displacements in place.
    for (j, slot) in jump_sites.iter().enumerate() {
        let record = relocs.jump(Jump(j as u32));
        if let Some((Site::Rel32 { disp_pos }, _)) = slot {
            let target = match record.target {
                JumpTarget::Label(l) => label_offs[l.0 as usize],
                // The encoder uses the absolute form for everything else.
                _ => return Err(Error::BadArgument),
            };
            let disp = (target as i64) - ((disp_pos + 4) as i64);
            if i32::try_from(disp).is_err() {
                return Err(Error::Unsupported);
            }
            bytes[*disp_pos..disp_pos + 4]
                .copy_from_slice(&(disp as i32).to_le_bytes());
            trace!("jump {} -> offset {:#x}", j, target);
        }
    }

    // Pin the final address, then resolve absolute references against it.
    let mut image = ExecImage::new(&bytes)?;
    let base = image.base();
    for (j, slot) in jump_sites.iter().enumerate() {
        let record = relocs.jump(Jump(j as u32));
        if let Some((Site::Abs64 { imm_pos }, rewritable)) = slot {
            let target = match record.target {
                JumpTarget::Label(l) => base + label_offs[l.0 as usize],
                JumpTarget::Addr(a) => a as usize,
                JumpTarget::Unset if *rewritable => 0,
                JumpTarget::Unset => return Err(Error::BadArgument),
            };
            image.patch8(*imm_pos, target as u64)?;
        }
    }
    for (p, &imm_pos) in put_sites.iter().enumerate() {
        let record = relocs.put_label(PutLabel(p as u32));
        let label = record.label.ok_or(Error::BadArgument)?;
        let target = base + label_offs[label.0 as usize];
        image.patch8(imm_pos, target as u64)?;
    }

    image.make_exec()?;
    debug!("code pinned at {:#x}", base);

    Ok(CompiledCode {
        image,
        label_offs,
        jump_sites: jump_sites
            .into_iter()
            .map(|slot| {
                slot.map(|(site, rewritable)| match site {
                    Site::Rel32 { disp_pos } => JumpSite {
                        site_off: disp_pos,
                        absolute: false,
                        rewritable,
                    },
                    Site::Abs64 { imm_pos } => JumpSite {
                        site_off: imm_pos,
                        absolute: true,
                        rewritable,
                    },
                })
            })
            .collect(),
        const_offs,
        put_label_offs: put_sites,
    })
}

//-----------------------------------------------------------------------------
