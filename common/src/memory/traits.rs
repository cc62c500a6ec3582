use crate::error::MemoryError;

/// Represents the size of memory access operations, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemAccessSize {
    Byte = 1,
    HalfWord = 2,
    Word = 4,
    DoubleWord = 8,
}

impl MemAccessSize {
    pub const fn bytes(self) -> usize {
        self as usize
    }
}

/// A trait for processing guest memory operations.
///
/// Implementors only provide the raw byte-level entry points. Every typed
/// accessor is built on top of them and converts between the guest's
/// big-endian byte order and host integers, so guest-visible layout never
/// depends on the host.
///
/// All accessors take `&mut self`: reading may allocate pages on demand or
/// seed speculative blocks.
pub trait MemoryProcessor {
    /// Reads `buf.len()` bytes starting at `address` into `buf`, without reordering.
    fn read_into(&mut self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Writes `buf` starting at `address`, without reordering.
    fn write_from(&mut self, address: u32, buf: &[u8]) -> Result<(), MemoryError>;

    /// Reads a value from memory at the specified address.
    ///
    /// # Arguments
    ///
    /// * `address` - The memory address to read from.
    /// * `size` - The size of the memory access operation.
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the zero-extended value or an error.
    fn read(&mut self, address: u32, size: MemAccessSize) -> Result<u64, MemoryError> {
        let mut buf = [0u8; 8];
        let len = size.bytes();
        self.read_into(address, &mut buf[..len])?;
        Ok(buf[..len]
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | byte as u64))
    }

    /// Writes the low `size` bytes of `value` to memory at the specified address.
    fn write(&mut self, address: u32, size: MemAccessSize, value: u64) -> Result<(), MemoryError> {
        let bytes = value.to_be_bytes();
        self.write_from(address, &bytes[8 - size.bytes()..])
    }

    fn read_byte(&mut self, address: u32) -> Result<u8, MemoryError> {
        Ok(self.read(address, MemAccessSize::Byte)? as u8)
    }

    fn read_half(&mut self, address: u32) -> Result<u16, MemoryError> {
        Ok(self.read(address, MemAccessSize::HalfWord)? as u16)
    }

    fn read_word(&mut self, address: u32) -> Result<u32, MemoryError> {
        Ok(self.read(address, MemAccessSize::Word)? as u32)
    }

    fn read_dword(&mut self, address: u32) -> Result<u64, MemoryError> {
        self.read(address, MemAccessSize::DoubleWord)
    }

    fn write_byte(&mut self, address: u32, value: u8) -> Result<(), MemoryError> {
        self.write(address, MemAccessSize::Byte, value as u64)
    }

    fn write_half(&mut self, address: u32, value: u16) -> Result<(), MemoryError> {
        self.write(address, MemAccessSize::HalfWord, value as u64)
    }

    fn write_word(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        self.write(address, MemAccessSize::Word, value as u64)
    }

    fn write_dword(&mut self, address: u32, value: u64) -> Result<(), MemoryError> {
        self.write(address, MemAccessSize::DoubleWord, value)
    }

    /// Copies a block out of memory: single bytes up to the first 8-byte
    /// boundary, then double words, then the remaining tail bytes.
    fn read_bytes(&mut self, address: u32, size: usize) -> Result<Vec<u8>, MemoryError> {
        let mut data = vec![0; size];
        let mut done = 0;
        while done < size {
            let addr = address.wrapping_add(done as u32);
            let step = if addr & 7 == 0 && size - done >= 8 { 8 } else { 1 };
            self.read_into(addr, &mut data[done..done + step])?;
            done += step;
        }
        Ok(data)
    }

    /// Copies a block into memory with the same granularity as [`Self::read_bytes`].
    fn write_bytes(&mut self, address: u32, data: &[u8]) -> Result<(), MemoryError> {
        let mut done = 0;
        while done < data.len() {
            let addr = address.wrapping_add(done as u32);
            let step = if addr & 7 == 0 && data.len() - done >= 8 { 8 } else { 1 };
            self.write_from(addr, &data[done..done + step])?;
            done += step;
        }
        Ok(())
    }

    /// Reads a NUL-terminated string of at most `max_len` bytes.
    fn read_string(&mut self, address: u32, max_len: usize) -> Result<String, MemoryError> {
        let mut bytes = Vec::new();
        for i in 0..max_len {
            let byte = self.read_byte(address.wrapping_add(i as u32))?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Writes `value` followed by a NUL terminator.
    fn write_string(&mut self, address: u32, value: &str) -> Result<(), MemoryError> {
        self.write_bytes(address, value.as_bytes())?;
        self.write_byte(address.wrapping_add(value.len() as u32), 0)
    }
}
