use memmap::{Mmap, MmapMut};

use crate::error::{Error, Result};

/// Page-aligned memory holding generated code, writable or executable but
/// never both. Protection changes happen in place, so code addresses handed
/// out while the image was executable stay valid across a re-patch.
enum State {
    Writable(MmapMut),
    Executable(Mmap),
    /// A protection change failed and took the mapping with it.
    Poisoned,
}

/// Owns the executable copy of a generated function and performs the
/// W^X transitions that runtime re-patching (`set_jump_addr`, `set_const`)
/// requires.
pub struct ExecImage {
    state: State,
    len: usize,
}

impl ExecImage {
    /// Maps fresh anonymous pages and fills them with `bytes`. The image
    /// starts out writable; call [`make_exec`] once patching is done.
    ///
    /// [`make_exec`]: ExecImage::make_exec
    pub fn new(bytes: &[u8]) -> Result<Self> {
        let mut memory = MmapMut::map_anon(bytes.len().max(1))
            .map_err(|_| Error::ExecAllocFailed)?;
        memory[..bytes.len()].copy_from_slice(bytes);
        Ok(ExecImage { state: State::Writable(memory), len: bytes.len() })
    }

    /// The virtual address of the first byte. Stable for the image's
    /// whole lifetime.
    pub fn base(&self) -> usize {
        match &self.state {
            State::Writable(m) => m.as_ptr() as usize,
            State::Executable(m) => m.as_ptr() as usize,
            State::Poisoned => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.state {
            State::Writable(m) => &m[..self.len],
            State::Executable(m) => &m[..self.len],
            State::Poisoned => &[],
        }
    }

    pub fn is_executable(&self) -> bool {
        matches!(self.state, State::Executable(_))
    }

    /// Transitions the pages read+execute.
    pub fn make_exec(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Poisoned) {
            State::Writable(m) => match m.make_exec() {
                Ok(m) => {
                    self.state = State::Executable(m);
                    Ok(())
                }
                Err(_) => Err(Error::ExecAllocFailed),
            },
            State::Executable(m) => {
                self.state = State::Executable(m);
                Ok(())
            }
            State::Poisoned => Err(Error::ExecAllocFailed),
        }
    }

    /// Transitions the pages read+write.
    fn make_mut(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Poisoned) {
            State::Executable(m) => match m.make_mut() {
                Ok(m) => {
                    self.state = State::Writable(m);
                    Ok(())
                }
                Err(_) => Err(Error::ExecAllocFailed),
            },
            State::Writable(m) => {
                self.state = State::Writable(m);
                Ok(())
            }
            State::Poisoned => Err(Error::ExecAllocFailed),
        }
    }

    /// Overwrites `bytes.len()` bytes at `offset`, flipping the protection
    /// around the write and back again if the image was executable.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        assert!(offset + bytes.len() <= self.len);
        let was_exec = self.is_executable();
        self.make_mut()?;
        match &mut self.state {
            State::Writable(m) => m[offset..offset + bytes.len()].copy_from_slice(bytes),
            _ => unreachable!(),
        }
        if was_exec {
            self.make_exec()?;
        }
        Ok(())
    }

    /// Overwrites the 8 bytes at `offset` with `value`, little-endian.
    pub fn patch8(&mut self, offset: usize, value: u64) -> Result<()> {
        self.patch(offset, &value.to_le_bytes())
    }
}

//-----------------------------------------------------------------------------
