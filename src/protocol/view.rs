//! Bounds-checked packet view
//!
//! Every read copies a fixed number of bytes out of the packet and fails
//! instead of reading past the end, so parsers never index raw slices
//! with untrusted offsets.

/// Immutable window over packet bytes
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    buffer: &'a [u8],
}

impl<'a> PacketView<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bytes left after `offset` (0 if past the end)
    pub fn remaining(&self, offset: usize) -> usize {
        self.buffer.len().saturating_sub(offset)
    }

    /// Copy `N` bytes starting at `offset`
    pub fn read<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let end = offset.checked_add(N)?;
        let bytes = self.buffer.get(offset..end)?;
        bytes.try_into().ok()
    }

    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        self.buffer.get(offset).copied()
    }

    /// Big-endian u16 at `offset`
    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        self.read::<2>(offset).map(u16::from_be_bytes)
    }
}
