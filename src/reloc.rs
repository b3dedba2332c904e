//! Deferred-resolution records. Labels, jumps, constants and put-labels are
//! created during emission holding instruction-buffer positions, and are
//! resolved to native addresses by the code generator. Records live in
//! arenas owned by the compiler; handles are stable integer indices, so
//! buffer growth never invalidates a reference.

use crate::abi::Signature;
use crate::ir::Condition;

/** The native address of a program point, known only after generation. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub(crate) u32);

/** A deferred control transfer, bound to a [`Label`] or a raw address. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Jump(pub(crate) u32);

/** An immediate embedded in the instruction stream, patchable after
 * generation. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Const(pub(crate) u32);

/** Materializes the address of a [`Label`] into an operand. */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PutLabel(pub(crate) u32);

//-----------------------------------------------------------------------------

/** Where a [`Jump`] transfers control to. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JumpTarget {
    /** Not yet bound; must be bound before the code runs, unless the jump
     * is rewritable and patched after generation. */
    Unset,
    Label(Label),
    /** A raw native address outside the code being generated. */
    Addr(u64),
}

/** What a [`Jump`] does when taken. */
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum JumpKind {
    /** A branch, conditional on the pending flag window if `cond` is set. */
    Branch { cond: Option<Condition> },
    /** An ABI call. */
    Call(Signature),
    /** An ABI call that reuses and discards the caller's frame. */
    TailCall(Signature),
    /** A call sharing the caller's register file. */
    FastCall,
}

impl JumpKind {
    pub fn is_call(&self) -> bool {
        !matches!(self, JumpKind::Branch { .. })
    }
}

#[derive(Debug, Clone)]
pub struct JumpRecord {
    pub kind: JumpKind,
    /** Rewritable jumps keep a canonically patchable encoding so
     * `set_jump_addr` can re-target them after generation. */
    pub rewritable: bool,
    pub target: JumpTarget,
    /** The frame layout in effect where the jump was emitted. */
    pub frame: u32,
}

#[derive(Debug, Copy, Clone)]
pub struct LabelRecord {
    /** Instruction-buffer position: the label binds the address of the
     * next instruction emitted after it. */
    pub pos: u32,
}

#[derive(Debug, Copy, Clone)]
pub struct ConstRecord;

#[derive(Debug, Copy, Clone)]
pub struct PutLabelRecord {
    /** Bound exactly once, before generation. */
    pub label: Option<Label>,
}

//-----------------------------------------------------------------------------

/** The arenas, in insertion order. */
#[derive(Debug, Default)]
pub struct Relocs {
    pub labels: Vec<LabelRecord>,
    pub jumps: Vec<JumpRecord>,
    pub consts: Vec<ConstRecord>,
    pub put_labels: Vec<PutLabelRecord>,
}

impl Relocs {
    pub fn new_label(&mut self, pos: u32) -> Label {
        let id = Label(self.labels.len() as u32);
        self.labels.push(LabelRecord { pos });
        id
    }

    pub fn new_jump(&mut self, record: JumpRecord) -> Jump {
        let id = Jump(self.jumps.len() as u32);
        self.jumps.push(record);
        id
    }

    pub fn new_const(&mut self) -> Const {
        let id = Const(self.consts.len() as u32);
        self.consts.push(ConstRecord);
        id
    }

    pub fn new_put_label(&mut self) -> PutLabel {
        let id = PutLabel(self.put_labels.len() as u32);
        self.put_labels.push(PutLabelRecord { label: None });
        id
    }

    pub fn contains_label(&self, label: Label) -> bool {
        (label.0 as usize) < self.labels.len()
    }

    pub fn contains_jump(&self, jump: Jump) -> bool {
        (jump.0 as usize) < self.jumps.len()
    }

    pub fn jump(&self, jump: Jump) -> &JumpRecord {
        &self.jumps[jump.0 as usize]
    }

    pub fn jump_mut(&mut self, jump: Jump) -> &mut JumpRecord {
        &mut self.jumps[jump.0 as usize]
    }

    pub fn label(&self, label: Label) -> &LabelRecord {
        &self.labels[label.0 as usize]
    }

    pub fn put_label(&self, put: PutLabel) -> &PutLabelRecord {
        &self.put_labels[put.0 as usize]
    }

    pub fn put_label_mut(&mut self, put: PutLabel) -> &mut PutLabelRecord {
        &mut self.put_labels[put.0 as usize]
    }
}

//-----------------------------------------------------------------------------
