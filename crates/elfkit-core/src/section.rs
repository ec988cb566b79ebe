//! Section header table.
//!
//! Section headers describe the file's sections for linking and debugging. Names are stored
//! twice: the raw `sh_name` offset into the section name string table, and the resolved text,
//! filled in once every header has been read.

use core::fmt;

use serde::Serialize;

use crate::cursor::{ByteCursor, ByteWriter, Encoding};
use crate::error::{BoundsError, ElfResult, FormatError, Warning, WriteError};
use crate::header::{ElfClass, FileHeader};
use crate::strtab::StringTable;

/// Special section indices.
pub mod section_index {
    /// Undefined symbol
    pub const SHN_UNDEF: u16 = 0;
    /// Start of the reserved range
    pub const SHN_LORESERVE: u16 = 0xff00;
    /// Absolute value
    pub const SHN_ABS: u16 = 0xfff1;
    /// Common symbol
    pub const SHN_COMMON: u16 = 0xfff2;
    /// Real index lives elsewhere (section 0 or `SHT_SYMTAB_SHNDX`)
    pub const SHN_XINDEX: u16 = 0xffff;
}

/// Index of a section in the section header table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SectionIndex(pub usize);

impl fmt::Display for SectionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// Section header type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SectionType {
    /// Inactive section
    Null,
    /// Program data
    Progbits,
    /// Symbol table
    Symtab,
    /// String table
    Strtab,
    /// Relocation with addends
    Rela,
    /// Symbol hash table
    Hash,
    /// Dynamic linking information
    Dynamic,
    /// Notes
    Note,
    /// Uninitialized data (BSS)
    Nobits,
    /// Relocation without addends
    Rel,
    /// Reserved
    Shlib,
    /// Dynamic linker symbol table
    Dynsym,
    /// Array of constructors
    InitArray,
    /// Array of destructors
    FiniArray,
    /// Array of pre-constructors
    PreinitArray,
    /// Section group
    Group,
    /// Extended symbol table index
    SymtabShndx,
    /// GNU hash table
    GnuHash,
    /// GNU version definition
    GnuVerdef,
    /// GNU version requirements
    GnuVerneed,
    /// GNU version symbol table
    GnuVersym,
    /// Unknown type
    Unknown(u32),
}

impl From<u32> for SectionType {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Null,
            1 => Self::Progbits,
            2 => Self::Symtab,
            3 => Self::Strtab,
            4 => Self::Rela,
            5 => Self::Hash,
            6 => Self::Dynamic,
            7 => Self::Note,
            8 => Self::Nobits,
            9 => Self::Rel,
            10 => Self::Shlib,
            11 => Self::Dynsym,
            14 => Self::InitArray,
            15 => Self::FiniArray,
            16 => Self::PreinitArray,
            17 => Self::Group,
            18 => Self::SymtabShndx,
            0x6fff_fff6 => Self::GnuHash,
            0x6fff_fffd => Self::GnuVerdef,
            0x6fff_fffe => Self::GnuVerneed,
            0x6fff_ffff => Self::GnuVersym,
            other => Self::Unknown(other),
        }
    }
}

impl SectionType {
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Null => 0,
            Self::Progbits => 1,
            Self::Symtab => 2,
            Self::Strtab => 3,
            Self::Rela => 4,
            Self::Hash => 5,
            Self::Dynamic => 6,
            Self::Note => 7,
            Self::Nobits => 8,
            Self::Rel => 9,
            Self::Shlib => 10,
            Self::Dynsym => 11,
            Self::InitArray => 14,
            Self::FiniArray => 15,
            Self::PreinitArray => 16,
            Self::Group => 17,
            Self::SymtabShndx => 18,
            Self::GnuHash => 0x6fff_fff6,
            Self::GnuVerdef => 0x6fff_fffd,
            Self::GnuVerneed => 0x6fff_fffe,
            Self::GnuVersym => 0x6fff_ffff,
            Self::Unknown(v) => v,
        }
    }

    /// Short upper-case name used in reports (`PROGBITS`, `SYMTAB`, ...).
    pub fn label(self) -> String {
        match self {
            Self::Null => "NULL".into(),
            Self::Progbits => "PROGBITS".into(),
            Self::Symtab => "SYMTAB".into(),
            Self::Strtab => "STRTAB".into(),
            Self::Rela => "RELA".into(),
            Self::Hash => "HASH".into(),
            Self::Dynamic => "DYNAMIC".into(),
            Self::Note => "NOTE".into(),
            Self::Nobits => "NOBITS".into(),
            Self::Rel => "REL".into(),
            Self::Shlib => "SHLIB".into(),
            Self::Dynsym => "DYNSYM".into(),
            Self::InitArray => "INIT_ARRAY".into(),
            Self::FiniArray => "FINI_ARRAY".into(),
            Self::PreinitArray => "PREINIT_ARRAY".into(),
            Self::Group => "GROUP".into(),
            Self::SymtabShndx => "SYMTAB_SHNDX".into(),
            Self::GnuHash => "GNU_HASH".into(),
            Self::GnuVerdef => "VERDEF".into(),
            Self::GnuVerneed => "VERNEED".into(),
            Self::GnuVersym => "VERSYM".into(),
            Self::Unknown(v) => format!("{v:#x}"),
        }
    }
}

/// Section header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SectionFlags(pub u64);

impl SectionFlags {
    /// Writable
    pub const SHF_WRITE: u64 = 0x1;
    /// Occupies memory during execution
    pub const SHF_ALLOC: u64 = 0x2;
    /// Executable
    pub const SHF_EXECINSTR: u64 = 0x4;
    /// Might be merged
    pub const SHF_MERGE: u64 = 0x10;
    /// Contains null-terminated strings
    pub const SHF_STRINGS: u64 = 0x20;
    /// Section holds index
    pub const SHF_INFO_LINK: u64 = 0x40;
    /// Preserve link order
    pub const SHF_LINK_ORDER: u64 = 0x80;
    /// OS-specific handling required
    pub const SHF_OS_NONCONFORMING: u64 = 0x100;
    /// Section is member of a group
    pub const SHF_GROUP: u64 = 0x200;
    /// Thread-local storage
    pub const SHF_TLS: u64 = 0x400;

    pub fn is_writable(self) -> bool {
        self.0 & Self::SHF_WRITE != 0
    }

    pub fn is_allocated(self) -> bool {
        self.0 & Self::SHF_ALLOC != 0
    }

    pub fn is_executable(self) -> bool {
        self.0 & Self::SHF_EXECINSTR != 0
    }

    pub fn is_tls(self) -> bool {
        self.0 & Self::SHF_TLS != 0
    }

    /// `readelf`-style flag letters, e.g. `AX`.
    pub fn letters(self) -> String {
        const LETTERS: [(u64, char); 9] = [
            (SectionFlags::SHF_WRITE, 'W'),
            (SectionFlags::SHF_ALLOC, 'A'),
            (SectionFlags::SHF_EXECINSTR, 'X'),
            (SectionFlags::SHF_MERGE, 'M'),
            (SectionFlags::SHF_STRINGS, 'S'),
            (SectionFlags::SHF_INFO_LINK, 'I'),
            (SectionFlags::SHF_LINK_ORDER, 'L'),
            (SectionFlags::SHF_GROUP, 'G'),
            (SectionFlags::SHF_TLS, 'T'),
        ];
        LETTERS
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|&(_, c)| c)
            .collect()
    }
}

/// Section header, for either class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionHeader {
    /// Resolved section name (empty until resolved, or when unresolvable)
    pub name: String,
    /// Section name (index into string table)
    pub sh_name: u32,
    /// Section type
    pub sh_type: SectionType,
    /// Section flags
    pub sh_flags: SectionFlags,
    /// Virtual address in memory
    pub sh_addr: u64,
    /// Offset in file
    pub sh_offset: u64,
    /// Size in bytes
    pub sh_size: u64,
    /// Link to another section
    pub sh_link: u32,
    /// Additional section information
    pub sh_info: u32,
    /// Section alignment
    pub sh_addralign: u64,
    /// Entry size if section holds table
    pub sh_entsize: u64,
}

impl SectionHeader {
    /// Size of one section header record for `encoding`'s class.
    pub const fn size(encoding: Encoding) -> usize {
        match encoding.class {
            ElfClass::Elf32 => 40,
            ElfClass::Elf64 => 64,
        }
    }

    /// The all-zero header of section 0.
    pub fn null() -> Self {
        Self {
            name: String::new(),
            sh_name: 0,
            sh_type: SectionType::Null,
            sh_flags: SectionFlags(0),
            sh_addr: 0,
            sh_offset: 0,
            sh_size: 0,
            sh_link: 0,
            sh_info: 0,
            sh_addralign: 0,
            sh_entsize: 0,
        }
    }

    /// Parse one record at the cursor position. The class only changes the word width.
    pub fn parse(cur: &mut ByteCursor<'_>) -> Result<Self, BoundsError> {
        Ok(Self {
            name: String::new(),
            sh_name: cur.read_u32()?,
            sh_type: SectionType::from(cur.read_u32()?),
            sh_flags: SectionFlags(cur.read_word()?),
            sh_addr: cur.read_word()?,
            sh_offset: cur.read_word()?,
            sh_size: cur.read_word()?,
            sh_link: cur.read_u32()?,
            sh_info: cur.read_u32()?,
            sh_addralign: cur.read_word()?,
            sh_entsize: cur.read_word()?,
        })
    }

    pub fn write(&self, out: &mut ByteWriter<'_>) -> Result<(), WriteError> {
        out.write_u32(self.sh_name)?;
        out.write_u32(self.sh_type.to_u32())?;
        out.write_word("sh_flags", self.sh_flags.0)?;
        out.write_word("sh_addr", self.sh_addr)?;
        out.write_word("sh_offset", self.sh_offset)?;
        out.write_word("sh_size", self.sh_size)?;
        out.write_u32(self.sh_link)?;
        out.write_u32(self.sh_info)?;
        out.write_word("sh_addralign", self.sh_addralign)?;
        out.write_word("sh_entsize", self.sh_entsize)
    }

    /// Check if this is a symbol table section.
    pub fn is_symtab(&self) -> bool {
        matches!(self.sh_type, SectionType::Symtab | SectionType::Dynsym)
    }

    /// Check if this is a relocation section.
    pub fn is_relocation(&self) -> bool {
        matches!(self.sh_type, SectionType::Rel | SectionType::Rela)
    }

    /// Check if this is a string table section.
    pub fn is_strtab(&self) -> bool {
        matches!(self.sh_type, SectionType::Strtab)
    }

    pub fn is_nobits(&self) -> bool {
        matches!(self.sh_type, SectionType::Nobits)
    }

    pub fn is_group(&self) -> bool {
        matches!(self.sh_type, SectionType::Group)
    }

    /// Whether `sh_size` describes bytes stored in the file. `NULL` headers (whose `sh_size`
    /// may carry the extended section count) and `NOBITS` sections store none.
    pub fn has_file_contents(&self) -> bool {
        !matches!(self.sh_type, SectionType::Null | SectionType::Nobits)
    }

    /// Bytes the section occupies in the file.
    pub fn file_size(&self) -> u64 {
        if self.has_file_contents() { self.sh_size } else { 0 }
    }

    pub fn file_end(&self) -> u64 {
        self.sh_offset.saturating_add(self.file_size())
    }

    /// Effective alignment: `0` is treated as `1`.
    pub fn alignment(&self) -> u64 {
        self.sh_addralign.max(1)
    }

    /// `sh_info` holds a section index (the relocated section, or any `SHF_INFO_LINK` target).
    pub fn info_is_section_index(&self) -> bool {
        self.is_relocation() || self.sh_flags.0 & SectionFlags::SHF_INFO_LINK != 0
    }

    /// `sh_link` holds a section index, going by the section type.
    pub fn link_is_section_index(&self) -> bool {
        if self.sh_flags.0 & SectionFlags::SHF_LINK_ORDER != 0 {
            return true;
        }
        matches!(
            self.sh_type,
            SectionType::Symtab
                | SectionType::Dynsym
                | SectionType::Rel
                | SectionType::Rela
                | SectionType::Hash
                | SectionType::GnuHash
                | SectionType::Dynamic
                | SectionType::Group
                | SectionType::SymtabShndx
                | SectionType::GnuVerdef
                | SectionType::GnuVerneed
                | SectionType::GnuVersym
        )
    }
}

/// A section header together with its file contents.
///
/// `data` is empty for `NOBITS` sections; otherwise its length always equals `sh_size` in a
/// consistent model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub header: SectionHeader,
    pub data: Vec<u8>,
}

impl Section {
    pub fn name(&self) -> &str {
        &self.header.name
    }
}

/// Number of section headers, honouring extended numbering.
fn section_count(data: &[u8], header: &FileHeader) -> ElfResult<usize> {
    if header.e_shnum != 0 {
        return Ok(usize::from(header.e_shnum));
    }
    // e_shnum == 0 with a table present: the real count is section 0's sh_size.
    let first = read_header_at(data, header, 0)?;
    Ok(usize::try_from(first.sh_size).unwrap_or(usize::MAX))
}

fn read_header_at(data: &[u8], header: &FileHeader, index: usize) -> ElfResult<SectionHeader> {
    let record = SectionHeader::size(header.encoding) as u64;
    let entsize = u64::from(header.e_shentsize);
    let offset = header
        .e_shoff
        .checked_add(entsize.saturating_mul(index as u64))
        .filter(|off| off.saturating_add(record) <= data.len() as u64)
        .ok_or_else(|| BoundsError::new("section header", header.e_shoff, record, data.len()))?;
    let mut cur = ByteCursor::at(data, offset as usize, header.encoding);
    Ok(SectionHeader::parse(&mut cur)?)
}

/// Parse all section headers described by `header`. Names are left unresolved.
pub fn parse_section_headers(data: &[u8], header: &FileHeader) -> ElfResult<Vec<SectionHeader>> {
    if header.e_shoff == 0 {
        return Ok(Vec::new());
    }
    let record = SectionHeader::size(header.encoding);
    let shentsize = usize::from(header.e_shentsize);
    if shentsize < record {
        return Err(FormatError::EntrySizeTooSmall {
            table: "section header table",
            found: shentsize as u64,
            minimum: record as u64,
        }
        .into());
    }

    let shnum = section_count(data, header)?;
    let table_len = (shentsize as u64).saturating_mul(shnum as u64);
    if header.e_shoff.saturating_add(table_len) > data.len() as u64 {
        return Err(
            BoundsError::new("section header table", header.e_shoff, table_len, data.len()).into(),
        );
    }

    let base = header.e_shoff as usize;
    let mut headers = Vec::with_capacity(shnum);
    for i in 0..shnum {
        let mut cur = ByteCursor::at(data, base + i * shentsize, header.encoding);
        headers.push(SectionHeader::parse(&mut cur)?);
    }
    Ok(headers)
}

/// Index of the section name string table, honouring `SHN_XINDEX`.
pub fn name_table_index(header: &FileHeader, headers: &[SectionHeader]) -> usize {
    if header.e_shstrndx == section_index::SHN_XINDEX {
        headers.first().map_or(0, |h| h.sh_link as usize)
    } else {
        usize::from(header.e_shstrndx)
    }
}

/// Fill in `name` for every header from the section name table's contents.
///
/// Missing tables and unresolvable offsets leave names empty and are reported as warnings.
pub fn resolve_section_names(
    headers: &mut [SectionHeader],
    shstrndx: usize,
    names: Option<&[u8]>,
) -> Vec<Warning> {
    let mut warnings = Vec::new();
    let Some(names) = names else {
        if shstrndx != 0 {
            warnings.push(Warning::SectionNameTableMissing { index: shstrndx });
        }
        return warnings;
    };
    let table = StringTable::new(names);
    for (index, header) in headers.iter_mut().enumerate() {
        match table.get(header.sh_name) {
            Ok(name) => header.name = name.into_owned(),
            Err(_) => warnings.push(Warning::UnresolvedSectionName {
                section: index,
                offset: header.sh_name,
            }),
        }
    }
    warnings
}

/// Contents of a `SHT_GROUP` section: a flag word followed by member section indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub flags: u32,
    pub members: Vec<u32>,
}

impl Group {
    /// `GRP_COMDAT`
    pub const COMDAT: u32 = 0x1;

    pub fn parse(data: &[u8], encoding: Encoding) -> Result<Self, BoundsError> {
        let mut cur = ByteCursor::new(data, encoding);
        let flags = cur.read_u32()?;
        let mut members = Vec::with_capacity(cur.remaining() / 4);
        while cur.remaining() >= 4 {
            members.push(cur.read_u32()?);
        }
        Ok(Self { flags, members })
    }

    /// Encode back into `len` bytes; trailing bytes not covered by a word are zero.
    pub fn encode(&self, encoding: Encoding, len: usize) -> Result<Vec<u8>, WriteError> {
        let mut out = vec![0u8; len];
        let mut w = ByteWriter::new(&mut out, encoding);
        w.write_u32(self.flags)?;
        for member in &self.members {
            w.write_u32(*member)?;
        }
        Ok(out)
    }

    /// Size in bytes of the encoded group.
    pub fn encoded_len(&self) -> usize {
        4 * (1 + self.members.len())
    }
}
