use std::ops::{Deref, DerefMut};

use super::Buffer;

/// A growable [`Buffer`] backing the first assembly pass. Writing past the
/// end extends the underlying `Vec` with zero bytes.
#[allow(clippy::module_name_repetitions)]
pub struct VecU8 {
    buffer: Vec<u8>,
    pos: usize,
}

impl VecU8 {
    pub fn new() -> Self {
        VecU8 { buffer: Vec::new(), pos: 0 }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        VecU8 { buffer: Vec::with_capacity(capacity), pos: 0 }
    }

    /// The bytes written so far, regardless of the write pointer.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for VecU8 {
    fn default() -> Self {
        VecU8::new()
    }
}

impl Deref for VecU8 {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for VecU8 {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Buffer for VecU8 {
    fn get_pos(&self) -> usize {
        self.pos
    }

    fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn write_byte(&mut self, byte: u8) {
        if self.pos == self.buffer.len() {
            self.buffer.push(byte);
        } else {
            self.buffer[self.pos] = byte;
        }
        self.pos += 1;
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api() {
        let mut buffer = VecU8::new();
        // Pre-extend: the shared API test rewinds and overwrites.
        buffer.write(0, 8);
        super::super::tests::api(buffer);
    }

    #[test]
    fn grows() {
        let mut buffer = VecU8::new();
        for i in 0..1000 {
            buffer.write_byte(i as u8);
        }
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.read_byte(999), 231);
    }
}
