//! Parse binary data
//!
//! Big-endian cursor-based reading of font table data. Scopes carry their
//! start offset so offset fields inside tables can be resolved relative to
//! the enclosing subtable.

use crate::error::ParseError;

/// A slice of font data with a known base, from which typed reads are made.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReadScope<'a> {
    base: usize,
    data: &'a [u8],
}

/// A read cursor over a [ReadScope].
#[derive(Clone)]
pub struct ReadCtxt<'a> {
    scope: ReadScope<'a>,
    offset: usize,
}

/// Types that can be read from a [ReadCtxt].
pub trait ReadBinary {
    type HostType: Sized;

    fn read(ctxt: &mut ReadCtxt<'_>) -> Result<Self::HostType, ParseError>;
}

impl<'a> ReadScope<'a> {
    pub fn new(data: &'a [u8]) -> ReadScope<'a> {
        ReadScope { base: 0, data }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// A sub-scope starting `offset` bytes into this scope.
    pub fn offset(&self, offset: usize) -> Result<ReadScope<'a>, ParseError> {
        let data = self.data.get(offset..).ok_or(ParseError::BadOffset)?;
        Ok(ReadScope {
            base: self.base + offset,
            data,
        })
    }

    pub fn ctxt(&self) -> ReadCtxt<'a> {
        ReadCtxt {
            scope: *self,
            offset: 0,
        }
    }

    pub fn read<T: ReadBinary>(&self) -> Result<T::HostType, ParseError> {
        T::read(&mut self.ctxt())
    }
}

impl<'a> ReadCtxt<'a> {
    pub fn scope(&self) -> ReadScope<'a> {
        self.scope
    }

    /// Bytes remaining in this context.
    pub fn bytes_available(&self) -> usize {
        self.scope.data.len().saturating_sub(self.offset)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ParseError> {
        let end = self.offset.checked_add(len).ok_or(ParseError::BadEof)?;
        let bytes = self
            .scope
            .data
            .get(self.offset..end)
            .ok_or(ParseError::BadEof)?;
        self.offset = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        self.read_bytes(len).map(drop)
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ParseError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, ParseError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, ParseError> {
        Ok(self.read_u32()? as i32)
    }

    /// Read a count followed by that many u16 values.
    pub fn read_counted_u16s(&mut self) -> Result<Vec<u16>, ParseError> {
        let count = usize::from(self.read_u16()?);
        self.read_u16s(count)
    }

    pub fn read_u16s(&mut self, count: usize) -> Result<Vec<u16>, ParseError> {
        // Bound the allocation by the data actually present.
        if count > self.bytes_available() / 2 {
            return Err(ParseError::BadEof);
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_u16()?);
        }
        Ok(values)
    }

    pub fn read_i16s(&mut self, count: usize) -> Result<Vec<i16>, ParseError> {
        if count > self.bytes_available() / 2 {
            return Err(ParseError::BadEof);
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_i16()?);
        }
        Ok(values)
    }

    pub fn read_u32s(&mut self, count: usize) -> Result<Vec<u32>, ParseError> {
        if count > self.bytes_available() / 4 {
            return Err(ParseError::BadEof);
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_u32()?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_scalars() {
        let data = [0x12, 0x34, 0x56, 0x78, 0xFF];
        let scope = ReadScope::new(&data);
        let mut ctxt = scope.ctxt();
        assert_eq!(ctxt.read_u16().unwrap(), 0x1234);
        assert_eq!(ctxt.read_u16().unwrap(), 0x5678);
        assert_eq!(ctxt.read_i8().unwrap(), -1);
        assert_eq!(ctxt.read_u8(), Err(ParseError::BadEof));
    }

    #[test]
    fn test_offset_out_of_bounds() {
        let data = [0u8; 4];
        let scope = ReadScope::new(&data);
        assert!(scope.offset(5).is_err());
        assert!(scope.offset(4).is_ok());
    }

    #[test]
    fn test_counted_array_overflow() {
        // Count claims more elements than bytes present.
        let data = [0x00, 0xFF, 0x00, 0x01];
        let scope = ReadScope::new(&data);
        let mut ctxt = scope.ctxt();
        assert_eq!(ctxt.read_counted_u16s(), Err(ParseError::BadEof));
    }
}
