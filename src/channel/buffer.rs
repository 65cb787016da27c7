//! Fixed-capacity transfer buffer.

use crate::error::{PipeError, Result};

/// Byte buffer allocated once per session and reused for every read/write.
///
/// The capacity is fixed at construction; there is no way to grow it.
pub struct TransferBuffer {
    buf: Box<[u8]>,
}

impl TransferBuffer {
    /// Allocate a zeroed buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PipeError::invalid("transfer buffer capacity must be non-zero"));
        }
        Ok(Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl std::fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferBuffer")
            .field("capacity", &self.buf.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_fixed() {
        let mut buffer = TransferBuffer::new(1024).unwrap();
        assert_eq!(buffer.capacity(), 1024);
        assert_eq!(buffer.as_mut_slice().len(), 1024);
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(TransferBuffer::new(0).is_err());
    }
}
