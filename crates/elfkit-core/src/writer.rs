//! Serialization of a model back to bytes.
//!
//! The output starts as a copy of the model's image, so padding and any bytes no structure
//! describes are carried over. The file header, program headers, section contents and section
//! headers are then written at their recorded offsets.

use crate::cursor::ByteWriter;
use crate::error::{ElfResult, WriteError};
use crate::file::ElfFile;
use crate::header::FileHeader;
use crate::layout::verify;
use crate::program::ProgramHeader;
use crate::section::Section;

/// Serialize `file`. Edited models must satisfy every layout invariant.
pub fn serialize(file: &ElfFile) -> ElfResult<Vec<u8>> {
    if file.edited {
        verify(file)?;
    }
    emit(&file.header, &file.segments, &file.sections, file.image.bytes())
}

/// Write every structure over a copy of `image`, growing it as needed.
pub(crate) fn emit(
    header: &FileHeader,
    segments: &[ProgramHeader],
    sections: &[Section],
    image: &[u8],
) -> ElfResult<Vec<u8>> {
    let encoding = header.encoding;
    for (index, section) in sections.iter().enumerate() {
        let actual = section.data.len() as u64;
        if section.header.has_file_contents() && actual != section.header.sh_size {
            return Err(WriteError::ContentSize {
                index,
                declared: section.header.sh_size,
                actual,
            }
            .into());
        }
    }

    let phentsize = u64::from(header.e_phentsize);
    let shentsize = u64::from(header.e_shentsize);
    let mut end = (image.len() as u64).max(FileHeader::size(encoding) as u64);
    if !segments.is_empty() {
        end = end.max(table_end(header.e_phoff, phentsize, segments.len())?);
    }
    for section in sections {
        end = end.max(section.header.file_end());
    }
    if !sections.is_empty() {
        end = end.max(table_end(header.e_shoff, shentsize, sections.len())?);
    }
    let len = to_usize(end, 0, end)?;

    let mut out = vec![0u8; len];
    out[..image.len()].copy_from_slice(image);
    header.write(&mut ByteWriter::new(&mut out, encoding))?;

    for (i, segment) in segments.iter().enumerate() {
        let offset = header.e_phoff + phentsize * i as u64;
        segment.write(&mut ByteWriter::new(tail(&mut out, offset)?, encoding), encoding.class)?;
    }
    for section in sections.iter().filter(|s| s.header.has_file_contents()) {
        let dest = tail(&mut out, section.header.sh_offset)?;
        ByteWriter::new(dest, encoding).write_bytes(&section.data)?;
    }
    for (i, section) in sections.iter().enumerate() {
        let offset = header.e_shoff + shentsize * i as u64;
        section
            .header
            .write(&mut ByteWriter::new(tail(&mut out, offset)?, encoding))?;
    }
    Ok(out)
}

fn table_end(offset: u64, entsize: u64, count: usize) -> Result<u64, WriteError> {
    entsize
        .checked_mul(count as u64)
        .and_then(|len| offset.checked_add(len))
        .ok_or(WriteError::OutOfRange {
            offset,
            len: entsize.saturating_mul(count as u64),
            available: u64::MAX,
        })
}

fn to_usize(value: u64, offset: u64, len: u64) -> Result<usize, WriteError> {
    usize::try_from(value).map_err(|_| WriteError::OutOfRange {
        offset,
        len,
        available: usize::MAX as u64,
    })
}

fn tail(out: &mut [u8], offset: u64) -> Result<&mut [u8], WriteError> {
    let available = out.len() as u64;
    let start = to_usize(offset, offset, 0)?;
    out.get_mut(start..).ok_or(WriteError::OutOfRange {
        offset,
        len: 0,
        available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Encoding;
    use crate::error::ElfError;
    use crate::header::{ElfMachine, ElfType};
    use crate::section::{SectionHeader, SectionType};

    fn text(offset: u64, data: Vec<u8>) -> Section {
        let mut header = SectionHeader::null();
        header.sh_type = SectionType::Progbits;
        header.sh_offset = offset;
        header.sh_size = data.len() as u64;
        Section { header, data }
    }

    #[test]
    fn test_emit_keeps_image_bytes_between_structures() {
        let encoding = Encoding::ELF64_LSB;
        let mut header = FileHeader::new(encoding, ElfType::Rel, ElfMachine::X86_64);
        header.e_shoff = 0x50;
        header.e_shnum = 2;
        let sections = vec![Section { header: SectionHeader::null(), data: Vec::new() }, text(0x40, vec![0xc3; 4])];
        let mut image = vec![0u8; 0x50];
        image[0x48] = 0xaa;

        let out = emit(&header, &[], &sections, &image).unwrap();
        assert_eq!(out.len(), 0x50 + 2 * 64);
        assert_eq!(&out[0x40..0x44], &[0xc3; 4]);
        assert_eq!(out[0x48], 0xaa);
        assert_eq!(FileHeader::parse(&out).unwrap(), header);
    }

    #[test]
    fn test_emit_rejects_content_size_mismatch() {
        let encoding = Encoding::ELF32_LSB;
        let header = FileHeader::new(encoding, ElfType::Rel, ElfMachine::I386);
        let mut section = text(0x40, vec![1, 2, 3]);
        section.header.sh_size = 8;
        let err = emit(&header, &[], &[section], &[]).unwrap_err();
        assert_eq!(
            err,
            ElfError::Write(WriteError::ContentSize {
                index: 0,
                declared: 8,
                actual: 3
            })
        );
    }

    #[test]
    fn test_table_end_overflow() {
        assert!(table_end(u64::MAX - 1, 64, 2).is_err());
        assert_eq!(table_end(0x100, 56, 3).unwrap(), 0x100 + 168);
    }
}
