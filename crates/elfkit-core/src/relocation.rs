//! Relocation tables (REL and RELA).
//!
//! A relocation section links (`sh_link`) to the symbol table its entries index and names in
//! `sh_info` the section the relocations apply to. Relocations are parsed and re-encoded only;
//! applying them is a linker's job.

use serde::Serialize;

use crate::cursor::{ByteCursor, ByteWriter, Encoding};
use crate::error::{BoundsError, ElfResult, FormatError, Parsed, Warning, WriteError};
use crate::header::ElfClass;
use crate::section::{SectionHeader, SectionType};
use crate::symbol::entry_size;

/// x86_64 relocation types, used to label entries in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum X86_64RelocationType {
    /// No relocation
    None,
    /// Direct 64-bit (S + A)
    R64,
    /// PC-relative 32-bit signed (S + A - P)
    Pc32,
    /// GOT entry 32-bit (G + GOT + A)
    Got32,
    /// PLT entry 32-bit (L + A - P)
    Plt32,
    /// Runtime copy
    Copy,
    /// Create GOT entry (S)
    GlobDat,
    /// Create PLT entry (S)
    JumpSlot,
    /// Base-relative (B + A)
    Relative,
    /// 32-bit GOT PC-relative
    Gotpcrel,
    /// Direct 32-bit zero-extended
    R32,
    /// Direct 32-bit sign-extended
    R32S,
    /// TLS module ID
    DtpMod64,
    /// TLS offset
    DtpOff64,
    /// TLS offset
    TpOff64,
    /// Indirect function
    IRelative,
    /// Relaxable GOT PC-relative
    RexGotpcrelx,
    /// Unknown relocation type
    Unknown(u32),
}

impl From<u32> for X86_64RelocationType {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::None,
            1 => Self::R64,
            2 => Self::Pc32,
            3 => Self::Got32,
            4 => Self::Plt32,
            5 => Self::Copy,
            6 => Self::GlobDat,
            7 => Self::JumpSlot,
            8 => Self::Relative,
            9 => Self::Gotpcrel,
            10 => Self::R32,
            11 => Self::R32S,
            16 => Self::DtpMod64,
            17 => Self::DtpOff64,
            18 => Self::TpOff64,
            37 => Self::IRelative,
            42 => Self::RexGotpcrelx,
            other => Self::Unknown(other),
        }
    }
}

impl X86_64RelocationType {
    /// Conventional `R_X86_64_*` name.
    pub fn name(self) -> String {
        let short = match self {
            Self::None => "NONE",
            Self::R64 => "64",
            Self::Pc32 => "PC32",
            Self::Got32 => "GOT32",
            Self::Plt32 => "PLT32",
            Self::Copy => "COPY",
            Self::GlobDat => "GLOB_DAT",
            Self::JumpSlot => "JUMP_SLOT",
            Self::Relative => "RELATIVE",
            Self::Gotpcrel => "GOTPCREL",
            Self::R32 => "32",
            Self::R32S => "32S",
            Self::DtpMod64 => "DTPMOD64",
            Self::DtpOff64 => "DTPOFF64",
            Self::TpOff64 => "TPOFF64",
            Self::IRelative => "IRELATIVE",
            Self::RexGotpcrelx => "REX_GOTPCRELX",
            Self::Unknown(v) => return format!("R_X86_64_{v}"),
        };
        format!("R_X86_64_{short}")
    }
}

/// One relocation entry, for either class and either shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Relocation {
    /// Location to relocate
    pub offset: u64,
    /// Index into the linked symbol table
    pub symbol: u32,
    /// Processor-specific relocation type
    pub kind: u32,
    /// Explicit addend (`Some` exactly for RELA entries)
    pub addend: Option<i64>,
}

impl Relocation {
    /// Size of one record for `encoding`'s class and the REL/RELA shape.
    pub const fn size(encoding: Encoding, explicit_addend: bool) -> usize {
        match (encoding.class, explicit_addend) {
            (ElfClass::Elf32, false) => 8,
            (ElfClass::Elf32, true) => 12,
            (ElfClass::Elf64, false) => 16,
            (ElfClass::Elf64, true) => 24,
        }
    }

    /// Split an `r_info` field into (symbol, type).
    pub fn unpack_info(info: u64, class: ElfClass) -> (u32, u32) {
        match class {
            ElfClass::Elf32 => ((info >> 8) as u32, (info & 0xff) as u32),
            ElfClass::Elf64 => ((info >> 32) as u32, (info & 0xffff_ffff) as u32),
        }
    }

    /// Build an `r_info` field; ELF32 fields that do not fit are rejected.
    pub fn pack_info(symbol: u32, kind: u32, class: ElfClass) -> Result<u64, WriteError> {
        match class {
            ElfClass::Elf32 => {
                if symbol > 0x00ff_ffff {
                    return Err(WriteError::ValueOverflow {
                        field: "r_info symbol",
                        value: u64::from(symbol),
                    });
                }
                if kind > 0xff {
                    return Err(WriteError::ValueOverflow {
                        field: "r_info type",
                        value: u64::from(kind),
                    });
                }
                Ok((u64::from(symbol) << 8) | u64::from(kind))
            }
            ElfClass::Elf64 => Ok((u64::from(symbol) << 32) | u64::from(kind)),
        }
    }

    pub fn parse(cur: &mut ByteCursor<'_>, explicit_addend: bool) -> Result<Self, BoundsError> {
        let offset = cur.read_word()?;
        let (symbol, kind) = Self::unpack_info(cur.read_word()?, cur.encoding().class);
        let addend = if explicit_addend {
            Some(cur.read_sword()?)
        } else {
            None
        };
        Ok(Self {
            offset,
            symbol,
            kind,
            addend,
        })
    }

    pub fn write(&self, out: &mut ByteWriter<'_>, class: ElfClass) -> Result<(), WriteError> {
        out.write_word("r_offset", self.offset)?;
        out.write_word("r_info", Self::pack_info(self.symbol, self.kind, class)?)?;
        if let Some(addend) = self.addend {
            out.write_sword("r_addend", addend)?;
        }
        Ok(())
    }
}

/// A parsed relocation section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocationTable {
    /// Section holding the table
    pub section: usize,
    /// Symbol table the entries index (`sh_link`)
    pub symtab: usize,
    /// Section the relocations apply to (`sh_info`)
    pub target: usize,
    /// RELA (`true`) or REL (`false`)
    pub explicit_addend: bool,
    /// Bytes per entry
    pub entry_size: usize,
    pub entries: Vec<Relocation>,
}

impl RelocationTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse the relocation table held by section `index`.
///
/// `symbol_count` is the size of the linked symbol table when known; entries indexing past it
/// are reported as warnings.
pub fn parse_relocations(
    header: &SectionHeader,
    data: &[u8],
    index: usize,
    symbol_count: Option<usize>,
    encoding: Encoding,
) -> ElfResult<Parsed<RelocationTable>> {
    let explicit_addend = match header.sh_type {
        SectionType::Rela => true,
        SectionType::Rel => false,
        _ => {
            return Err(FormatError::WrongSectionType {
                index,
                expected: "relocation table",
            }
            .into());
        }
    };
    let record = Relocation::size(encoding, explicit_addend);
    let entsize = entry_size(header, data.len(), record, "relocation table")?;

    let mut warnings = Vec::new();
    let mut entries = Vec::with_capacity(data.len() / entsize);
    for entry in 0..data.len() / entsize {
        let mut cur = ByteCursor::at(data, entry * entsize, encoding);
        let reloc = Relocation::parse(&mut cur, explicit_addend)?;
        if let Some(count) = symbol_count.filter(|&count| reloc.symbol as usize >= count) {
            warnings.push(Warning::SymbolIndexOutOfRange {
                table: index,
                entry,
                symbol: reloc.symbol,
                count,
            });
        }
        entries.push(reloc);
    }

    Ok(Parsed::new(
        RelocationTable {
            section: index,
            symtab: header.sh_link as usize,
            target: header.sh_info as usize,
            explicit_addend,
            entry_size: entsize,
            entries,
        },
        warnings,
    ))
}

/// Encode a relocation table; padding past each record is taken from `template`.
pub fn encode_relocations(
    table: &RelocationTable,
    template: &[u8],
    encoding: Encoding,
) -> Result<Vec<u8>, WriteError> {
    let entsize = table.entry_size;
    let mut out = vec![0u8; table.entries.len() * entsize];
    let shared = out.len().min(template.len());
    out[..shared].copy_from_slice(&template[..shared]);
    for (i, reloc) in table.entries.iter().enumerate() {
        let start = i * entsize;
        let mut w = ByteWriter::new(&mut out[start..start + entsize], encoding);
        reloc.write(&mut w, encoding.class)?;
    }
    Ok(out)
}
