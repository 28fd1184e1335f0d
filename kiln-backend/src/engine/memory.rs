//! Engine memory
//!
//! One flat little-endian byte array. Globals are laid out from the
//! bottom once per engine; stack frames grow upward above them and are
//! released when a call returns. Address 0 is never handed out so a
//! null pointer always faults.

use kiln_common::ExecutionError;

/// First address handed out; everything below faults
pub const NULL_GUARD: u64 = 16;

/// Function addresses live outside the data space
pub const FUNCTION_BASE: u64 = 0xF000_0000_0000_0000;

pub struct Memory {
    bytes: Vec<u8>,
    globals_end: u64,
    stack_top: u64,
}

fn align_up(value: u64, align: u64) -> Option<u64> {
    if align <= 1 {
        Some(value)
    } else {
        value.div_ceil(align).checked_mul(align)
    }
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
            globals_end: NULL_GUARD,
            stack_top: NULL_GUARD,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Reserve static storage; only valid before the first stack frame
    pub fn alloc_global(&mut self, size: u64, align: u64) -> Result<u64, ExecutionError> {
        let end = align_up(self.globals_end, align)
            .and_then(|address| address.checked_add(size.max(1)).map(|end| (address, end)))
            .filter(|(_, end)| *end <= self.size());
        let Some((address, end)) = end else {
            return Err(ExecutionError::backend(format!(
                "global data of {size} bytes does not fit in {} bytes of engine memory",
                self.size()
            )));
        };
        self.globals_end = end;
        self.stack_top = end;
        Ok(address)
    }

    /// Current stack top, to hand back to [`Memory::release`]
    pub fn stack_mark(&self) -> u64 {
        self.stack_top
    }

    pub fn push_frame(&mut self, size: u64, align: u64) -> Result<u64, ExecutionError> {
        let end = align_up(self.stack_top, align)
            .and_then(|base| base.checked_add(size).map(|end| (base, end)))
            .filter(|(_, end)| *end <= self.size());
        let Some((base, end)) = end else {
            return Err(ExecutionError::backend(format!(
                "stack overflow: frame of {size} bytes does not fit below {}",
                self.size()
            )));
        };
        self.stack_top = end;
        Ok(base)
    }

    pub fn release(&mut self, mark: u64) {
        self.stack_top = mark.max(self.globals_end);
    }

    /// Drop every frame
    pub fn reset_stack(&mut self) {
        self.stack_top = self.globals_end;
    }

    fn range(&self, address: u64, len: u64) -> Result<std::ops::Range<usize>, ExecutionError> {
        let end = address.checked_add(len);
        match end {
            Some(end) if address >= NULL_GUARD && end <= self.stack_top.max(self.globals_end) => {
                Ok(address as usize..end as usize)
            }
            _ if address < NULL_GUARD => Err(ExecutionError::backend(format!(
                "null pointer access at address {address:#x}"
            ))),
            _ => Err(ExecutionError::backend(format!(
                "out of bounds access of {len} bytes at address {address:#x}"
            ))),
        }
    }

    pub fn read(&self, address: u64, len: u64) -> Result<&[u8], ExecutionError> {
        let range = self.range(address, len)?;
        Ok(&self.bytes[range])
    }

    pub fn write(&mut self, address: u64, data: &[u8]) -> Result<(), ExecutionError> {
        let range = self.range(address, data.len() as u64)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Little-endian unsigned load of `len` (at most 8) bytes
    pub fn load_uint(&self, address: u64, len: u64) -> Result<u64, ExecutionError> {
        let bytes = self.read(address, len)?;
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn store_uint(&mut self, address: u64, len: u64, value: u64) -> Result<(), ExecutionError> {
        let bytes = value.to_le_bytes();
        self.write(address, &bytes[..len as usize])
    }

    /// Bytes from `address` up to (not including) the first NUL
    pub fn read_c_string(&self, address: u64) -> Result<Vec<u8>, ExecutionError> {
        let start = self.range(address, 1)?.start;
        let limit = self.stack_top.max(self.globals_end) as usize;
        let tail = &self.bytes[start..limit];
        match tail.iter().position(|&b| b == 0) {
            Some(len) => Ok(tail[..len].to_vec()),
            None => Err(ExecutionError::backend(format!(
                "unterminated string at address {address:#x}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_faults() {
        let memory = Memory::new(64);
        assert!(memory.read(0, 4).is_err());
    }

    #[test]
    fn test_globals_then_stack() {
        let mut memory = Memory::new(128);
        let global = memory.alloc_global(3, 1).unwrap();
        assert_eq!(global, NULL_GUARD);
        memory.write(global, b"hi\0").unwrap();
        assert_eq!(memory.read_c_string(global).unwrap(), b"hi".to_vec());

        let mark = memory.stack_mark();
        let frame = memory.push_frame(8, 8).unwrap();
        assert_eq!(frame % 8, 0);
        memory.store_uint(frame, 4, 0xDEAD_BEEF).unwrap();
        assert_eq!(memory.load_uint(frame, 4).unwrap(), 0xDEAD_BEEF);

        memory.release(mark);
        assert!(memory.load_uint(frame, 4).is_err());
        assert!(memory.push_frame(1024, 8).is_err());
    }

    #[test]
    fn test_huge_requests_fail_cleanly() {
        let mut memory = Memory::new(64);
        assert!(memory.alloc_global(u64::MAX, 8).is_err());
        assert!(memory.push_frame(u64::MAX - 4, 16).is_err());
        assert!(memory.alloc_global(4, 1 << 63).is_err());
        assert_eq!(memory.alloc_global(4, 4).unwrap(), NULL_GUARD);
    }
}
