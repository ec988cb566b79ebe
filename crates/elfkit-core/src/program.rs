//! Program header table.
//!
//! Program headers describe segments: the file ranges mapped into memory and the metadata
//! (interpreter, dynamic table, notes) a loader consumes. The ELF32 and ELF64 records hold the
//! same fields in a different order; `p_flags` moves right behind `p_type` in ELF64.

use serde::Serialize;

use crate::cursor::{ByteCursor, ByteWriter, Encoding};
use crate::error::{BoundsError, ElfResult, FormatError, WriteError};
use crate::header::{ElfClass, FileHeader};

/// Program header type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgramType {
    /// Unused entry
    Null,
    /// Loadable segment
    Load,
    /// Dynamic linking information
    Dynamic,
    /// Interpreter path
    Interp,
    /// Auxiliary information
    Note,
    /// Reserved (unused)
    Shlib,
    /// Program header table
    Phdr,
    /// Thread-local storage template
    Tls,
    /// GNU stack permissions
    GnuStack,
    /// GNU relocation read-only
    GnuRelro,
    /// GNU property
    GnuProperty,
    /// GNU exception handling
    GnuEhFrame,
    /// Unknown type
    Unknown(u32),
}

impl From<u32> for ProgramType {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Null,
            1 => Self::Load,
            2 => Self::Dynamic,
            3 => Self::Interp,
            4 => Self::Note,
            5 => Self::Shlib,
            6 => Self::Phdr,
            7 => Self::Tls,
            0x6474_e550 => Self::GnuEhFrame,
            0x6474_e551 => Self::GnuStack,
            0x6474_e552 => Self::GnuRelro,
            0x6474_e553 => Self::GnuProperty,
            other => Self::Unknown(other),
        }
    }
}

impl ProgramType {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Null => 0,
            Self::Load => 1,
            Self::Dynamic => 2,
            Self::Interp => 3,
            Self::Note => 4,
            Self::Shlib => 5,
            Self::Phdr => 6,
            Self::Tls => 7,
            Self::GnuEhFrame => 0x6474_e550,
            Self::GnuStack => 0x6474_e551,
            Self::GnuRelro => 0x6474_e552,
            Self::GnuProperty => 0x6474_e553,
            Self::Unknown(v) => v,
        }
    }
}

/// Program header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProgramFlags(pub u32);

impl ProgramFlags {
    /// Execute permission
    pub const PF_X: u32 = 0x1;
    /// Write permission
    pub const PF_W: u32 = 0x2;
    /// Read permission
    pub const PF_R: u32 = 0x4;

    /// Check if executable.
    pub fn is_executable(self) -> bool {
        self.0 & Self::PF_X != 0
    }

    /// Check if writable.
    pub fn is_writable(self) -> bool {
        self.0 & Self::PF_W != 0
    }

    /// Check if readable.
    pub fn is_readable(self) -> bool {
        self.0 & Self::PF_R != 0
    }

    /// `readelf`-style permission string, e.g. `R E`.
    pub fn permissions(self) -> String {
        let mut s = String::with_capacity(3);
        s.push(if self.is_readable() { 'R' } else { ' ' });
        s.push(if self.is_writable() { 'W' } else { ' ' });
        s.push(if self.is_executable() { 'E' } else { ' ' });
        s
    }
}

/// Program header, for either class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgramHeader {
    /// Segment type
    pub p_type: ProgramType,
    /// Segment flags
    pub p_flags: ProgramFlags,
    /// File offset of segment
    pub p_offset: u64,
    /// Virtual address in memory
    pub p_vaddr: u64,
    /// Physical address (usually same as vaddr)
    pub p_paddr: u64,
    /// Size in file
    pub p_filesz: u64,
    /// Size in memory (may be larger than filesz for BSS)
    pub p_memsz: u64,
    /// Alignment (must be power of 2)
    pub p_align: u64,
}

impl ProgramHeader {
    /// Size of one program header record for `encoding`'s class.
    pub const fn size(encoding: Encoding) -> usize {
        match encoding.class {
            ElfClass::Elf32 => 32,
            ElfClass::Elf64 => 56,
        }
    }

    /// Parse one record at the cursor position.
    pub fn parse(cur: &mut ByteCursor<'_>) -> Result<Self, BoundsError> {
        let p_type = ProgramType::from(cur.read_u32()?);
        match cur.encoding().class {
            ElfClass::Elf32 => {
                let p_offset = cur.read_word()?;
                let p_vaddr = cur.read_word()?;
                let p_paddr = cur.read_word()?;
                let p_filesz = cur.read_word()?;
                let p_memsz = cur.read_word()?;
                let p_flags = ProgramFlags(cur.read_u32()?);
                let p_align = cur.read_word()?;
                Ok(Self {
                    p_type,
                    p_flags,
                    p_offset,
                    p_vaddr,
                    p_paddr,
                    p_filesz,
                    p_memsz,
                    p_align,
                })
            }
            ElfClass::Elf64 => Ok(Self {
                p_type,
                p_flags: ProgramFlags(cur.read_u32()?),
                p_offset: cur.read_word()?,
                p_vaddr: cur.read_word()?,
                p_paddr: cur.read_word()?,
                p_filesz: cur.read_word()?,
                p_memsz: cur.read_word()?,
                p_align: cur.read_word()?,
            }),
        }
    }

    /// Write one record at the writer position.
    pub fn write(&self, out: &mut ByteWriter<'_>, class: ElfClass) -> Result<(), WriteError> {
        out.write_u32(self.p_type.to_u32())?;
        if class == ElfClass::Elf64 {
            out.write_u32(self.p_flags.0)?;
        }
        out.write_word("p_offset", self.p_offset)?;
        out.write_word("p_vaddr", self.p_vaddr)?;
        out.write_word("p_paddr", self.p_paddr)?;
        out.write_word("p_filesz", self.p_filesz)?;
        out.write_word("p_memsz", self.p_memsz)?;
        if class == ElfClass::Elf32 {
            out.write_u32(self.p_flags.0)?;
        }
        out.write_word("p_align", self.p_align)
    }

    /// Check if this is a loadable segment.
    pub fn is_load(&self) -> bool {
        matches!(self.p_type, ProgramType::Load)
    }

    /// Check if this is the dynamic segment.
    pub fn is_dynamic(&self) -> bool {
        matches!(self.p_type, ProgramType::Dynamic)
    }

    /// Get the BSS size (memory size beyond file size).
    pub fn bss_size(&self) -> u64 {
        self.p_memsz.saturating_sub(self.p_filesz)
    }

    /// Check alignment validity.
    pub fn is_valid_alignment(&self) -> bool {
        self.p_align == 0 || self.p_align.is_power_of_two()
    }

    /// End of the segment's file image (exclusive).
    pub fn file_end(&self) -> u64 {
        self.p_offset.saturating_add(self.p_filesz)
    }

    /// Whether `vaddr` falls inside the segment's memory image.
    pub fn contains_vaddr(&self, vaddr: u64) -> bool {
        vaddr >= self.p_vaddr && vaddr - self.p_vaddr < self.p_memsz
    }

    /// Whether the file range `[offset, offset + size)` lies inside the segment's file image.
    /// Empty ranges count when they sit on the segment's boundary.
    pub fn covers_file_range(&self, offset: u64, size: u64) -> bool {
        let end = offset.saturating_add(size);
        if size == 0 {
            return offset >= self.p_offset && offset <= self.file_end() && self.p_filesz > 0;
        }
        offset >= self.p_offset && end <= self.file_end()
    }

    /// `offset` and `vaddr` agree modulo `p_align`, and the file image fits in memory.
    pub fn is_consistent(&self) -> bool {
        if self.p_filesz > self.p_memsz {
            return false;
        }
        self.p_align <= 1 || self.p_offset % self.p_align == self.p_vaddr % self.p_align
    }
}

/// Parse all program headers described by `header`.
pub fn parse_program_headers(data: &[u8], header: &FileHeader) -> ElfResult<Vec<ProgramHeader>> {
    let phnum = usize::from(header.e_phnum);
    if phnum == 0 {
        return Ok(Vec::new());
    }
    let record = ProgramHeader::size(header.encoding);
    let phentsize = usize::from(header.e_phentsize);
    if phentsize < record {
        return Err(FormatError::EntrySizeTooSmall {
            table: "program header table",
            found: phentsize as u64,
            minimum: record as u64,
        }
        .into());
    }

    let table_len = (phentsize as u64) * (phnum as u64);
    let in_bounds = usize::try_from(header.e_phoff)
        .ok()
        .and_then(|off| off.checked_add(table_len as usize))
        .is_some_and(|end| end <= data.len());
    if !in_bounds {
        return Err(
            BoundsError::new("program header table", header.e_phoff, table_len, data.len()).into(),
        );
    }

    let base = header.e_phoff as usize;
    let mut headers = Vec::with_capacity(phnum);
    for i in 0..phnum {
        let mut cur = ByteCursor::at(data, base + i * phentsize, header.encoding);
        headers.push(ProgramHeader::parse(&mut cur)?);
    }
    Ok(headers)
}
