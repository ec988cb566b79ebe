//! Bounds-checked byte access in the target file's word width and byte order.
//!
//! [`ByteCursor`] reads sequentially from a shared buffer; [`ByteWriter`] writes into a fixed,
//! pre-sized slice. Neither ever indexes outside its buffer: every access is checked and
//! reported as a [`BoundsError`] or [`WriteError`].

use serde::Serialize;

use crate::error::{BoundsError, WriteError};
use crate::header::{ElfClass, ElfData};

/// Class and byte order of a file, which together fix the encoding of every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Encoding {
    pub class: ElfClass,
    pub data: ElfData,
}

impl Encoding {
    pub const ELF32_LSB: Self = Self::new(ElfClass::Elf32, ElfData::Lsb);
    pub const ELF32_MSB: Self = Self::new(ElfClass::Elf32, ElfData::Msb);
    pub const ELF64_LSB: Self = Self::new(ElfClass::Elf64, ElfData::Lsb);
    pub const ELF64_MSB: Self = Self::new(ElfClass::Elf64, ElfData::Msb);

    pub const fn new(class: ElfClass, data: ElfData) -> Self {
        Self { class, data }
    }

    /// Size in bytes of an address/offset/xword field.
    pub const fn word_size(self) -> usize {
        match self.class {
            ElfClass::Elf32 => 4,
            ElfClass::Elf64 => 8,
        }
    }

    pub const fn is_64(self) -> bool {
        matches!(self.class, ElfClass::Elf64)
    }
}

/// Sequential reader over an immutable byte buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    encoding: Encoding,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], encoding: Encoding) -> Self {
        Self {
            data,
            pos: 0,
            encoding,
        }
    }

    /// Cursor positioned at `offset`. The position itself is checked on first read.
    pub fn at(data: &'a [u8], offset: usize, encoding: Encoding) -> Self {
        Self {
            data,
            pos: offset,
            encoding,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BoundsError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| BoundsError::new("read", self.pos as u64, len as u64, self.data.len()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], BoundsError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, BoundsError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, BoundsError> {
        let b = self.take::<2>()?;
        Ok(match self.encoding.data {
            ElfData::Lsb => u16::from_le_bytes(b),
            ElfData::Msb => u16::from_be_bytes(b),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32, BoundsError> {
        let b = self.take::<4>()?;
        Ok(match self.encoding.data {
            ElfData::Lsb => u32::from_le_bytes(b),
            ElfData::Msb => u32::from_be_bytes(b),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64, BoundsError> {
        let b = self.take::<8>()?;
        Ok(match self.encoding.data {
            ElfData::Lsb => u64::from_le_bytes(b),
            ElfData::Msb => u64::from_be_bytes(b),
        })
    }

    /// Reads an `Addr`/`Off`/`Xword` field: 4 bytes for ELF32, 8 for ELF64.
    pub fn read_word(&mut self) -> Result<u64, BoundsError> {
        match self.encoding.class {
            ElfClass::Elf32 => self.read_u32().map(u64::from),
            ElfClass::Elf64 => self.read_u64(),
        }
    }

    /// Reads an `Sword`/`Sxword` field (relocation addends).
    pub fn read_sword(&mut self) -> Result<i64, BoundsError> {
        match self.encoding.class {
            ElfClass::Elf32 => self.read_u32().map(|v| i64::from(v as i32)),
            ElfClass::Elf64 => self.read_u64().map(|v| v as i64),
        }
    }
}

/// Writer over a fixed-size mutable slice.
#[derive(Debug)]
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    encoding: Encoding,
}

impl<'a> ByteWriter<'a> {
    pub fn new(buf: &'a mut [u8], encoding: Encoding) -> Self {
        Self {
            buf,
            pos: 0,
            encoding,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        let end = self
            .pos
            .checked_add(bytes.len())
            .filter(|&end| end <= self.buf.len())
            .ok_or(WriteError::OutOfRange {
                offset: self.pos as u64,
                len: bytes.len() as u64,
                available: self.buf.len() as u64,
            })?;
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), WriteError> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), WriteError> {
        match self.encoding.data {
            ElfData::Lsb => self.write_bytes(&value.to_le_bytes()),
            ElfData::Msb => self.write_bytes(&value.to_be_bytes()),
        }
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), WriteError> {
        match self.encoding.data {
            ElfData::Lsb => self.write_bytes(&value.to_le_bytes()),
            ElfData::Msb => self.write_bytes(&value.to_be_bytes()),
        }
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), WriteError> {
        match self.encoding.data {
            ElfData::Lsb => self.write_bytes(&value.to_le_bytes()),
            ElfData::Msb => self.write_bytes(&value.to_be_bytes()),
        }
    }

    /// Writes a class-width unsigned field; `field` names it in overflow errors.
    pub fn write_word(&mut self, field: &'static str, value: u64) -> Result<(), WriteError> {
        match self.encoding.class {
            ElfClass::Elf32 => {
                let narrow =
                    u32::try_from(value).map_err(|_| WriteError::ValueOverflow { field, value })?;
                self.write_u32(narrow)
            }
            ElfClass::Elf64 => self.write_u64(value),
        }
    }

    pub fn write_sword(&mut self, field: &'static str, value: i64) -> Result<(), WriteError> {
        match self.encoding.class {
            ElfClass::Elf32 => {
                let narrow =
                    i32::try_from(value).map_err(|_| WriteError::SignedOverflow { field, value })?;
                self.write_u32(narrow as u32)
            }
            ElfClass::Elf64 => self.write_u64(value as u64),
        }
    }
}

/// Rounds `value` up to a multiple of `align` (`0` and `1` mean unaligned).
pub fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_both_byte_orders() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let mut le = ByteCursor::new(&data, Encoding::ELF32_LSB);
        assert_eq!(le.read_u32().unwrap(), 0x7856_3412);
        let mut be = ByteCursor::new(&data, Encoding::ELF32_MSB);
        assert_eq!(be.read_u16().unwrap(), 0x1234);
        assert_eq!(be.read_u16().unwrap(), 0x5678);
        assert_eq!(be.remaining(), 0);
    }

    #[test]
    fn test_word_width_follows_class() {
        let data = [1u8, 0, 0, 0, 0, 0, 0, 0];
        let mut c32 = ByteCursor::new(&data, Encoding::ELF32_LSB);
        assert_eq!(c32.read_word().unwrap(), 1);
        assert_eq!(c32.position(), 4);
        let mut c64 = ByteCursor::new(&data, Encoding::ELF64_LSB);
        assert_eq!(c64.read_word().unwrap(), 1);
        assert_eq!(c64.position(), 8);
    }

    #[test]
    fn test_signed_word_sign_extends() {
        let data = (-8i32).to_le_bytes();
        let mut c = ByteCursor::new(&data, Encoding::ELF32_LSB);
        assert_eq!(c.read_sword().unwrap(), -8);
    }

    #[test]
    fn test_read_past_end_is_bounds_error() {
        let data = [0u8; 3];
        let mut c = ByteCursor::at(&data, 2, Encoding::ELF64_LSB);
        let err = c.read_u16().unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.len, 2);
        assert_eq!(err.available, 3);

        let mut far = ByteCursor::at(&data, usize::MAX, Encoding::ELF64_LSB);
        assert!(far.read_u8().is_err());
    }

    #[test]
    fn test_writer_overflow_and_range() {
        let mut buf = [0u8; 6];
        let mut w = ByteWriter::new(&mut buf, Encoding::ELF32_MSB);
        w.write_word("e_entry", 0x0102_0304).unwrap();
        assert!(matches!(
            w.write_word("e_entry", 1 << 40),
            Err(WriteError::ValueOverflow { field: "e_entry", .. })
        ));
        assert!(matches!(
            w.write_u32(0),
            Err(WriteError::OutOfRange { offset: 4, len: 4, available: 6 })
        ));
        w.write_u16(0xaabb).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 0xaa, 0xbb]);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(17, 16), 32);
        assert_eq!(align_up(5, 0), 5);
        assert_eq!(align_up(5, 1), 5);
    }
}
