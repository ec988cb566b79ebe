//! Symbol tables.
//!
//! Symbols represent named entities (functions, variables, sections, files) in an ELF file.
//! A symbol table section links (`sh_link`) to the string table holding its names and records
//! in `sh_info` the index of its first non-local symbol.

use core::fmt;

use serde::Serialize;

use crate::cursor::{ByteCursor, ByteWriter, Encoding};
use crate::error::{ElfResult, FormatError, Parsed, Warning, WriteError};
use crate::header::ElfClass;
use crate::section::{SectionHeader, section_index};
use crate::strtab::StringTable;

/// Index of a symbol within its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolIndex(pub usize);

impl fmt::Display for SymbolIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Symbol binding (scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SymbolBinding {
    /// Local (not visible outside object file)
    Local,
    /// Global (visible everywhere)
    Global,
    /// Weak (like global, but may be overridden)
    Weak,
    /// Unique global (GNU extension)
    GnuUnique,
    /// Unknown binding
    Unknown(u8),
}

impl From<u8> for SymbolBinding {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Local,
            1 => Self::Global,
            2 => Self::Weak,
            10 => Self::GnuUnique,
            other => Self::Unknown(other),
        }
    }
}

impl SymbolBinding {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Local => 0,
            Self::Global => 1,
            Self::Weak => 2,
            Self::GnuUnique => 10,
            Self::Unknown(v) => v,
        }
    }
}

/// Symbol type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SymbolType {
    /// Unspecified type
    NoType,
    /// Data object (variable)
    Object,
    /// Function
    Func,
    /// Section
    Section,
    /// Source file name
    File,
    /// Common symbol
    Common,
    /// TLS data object
    Tls,
    /// Indirect function (GNU extension)
    IFunc,
    /// Unknown type
    Unknown(u8),
}

impl From<u8> for SymbolType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::NoType,
            1 => Self::Object,
            2 => Self::Func,
            3 => Self::Section,
            4 => Self::File,
            5 => Self::Common,
            6 => Self::Tls,
            10 => Self::IFunc,
            other => Self::Unknown(other),
        }
    }
}

impl SymbolType {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::NoType => 0,
            Self::Object => 1,
            Self::Func => 2,
            Self::Section => 3,
            Self::File => 4,
            Self::Common => 5,
            Self::Tls => 6,
            Self::IFunc => 10,
            Self::Unknown(v) => v,
        }
    }
}

/// Symbol visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SymbolVisibility {
    /// Default visibility (binding determines visibility)
    Default,
    /// Internal (processor-specific)
    Internal,
    /// Hidden (not exported)
    Hidden,
    /// Protected (exported but not preemptible)
    Protected,
}

impl From<u8> for SymbolVisibility {
    fn from(value: u8) -> Self {
        match value & 0x3 {
            0 => Self::Default,
            1 => Self::Internal,
            2 => Self::Hidden,
            _ => Self::Protected,
        }
    }
}

/// Symbol table entry, for either class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    /// Resolved name (empty when unnamed or unresolvable)
    pub name: String,
    /// Symbol name (index into string table)
    pub st_name: u32,
    /// Symbol info (type and binding)
    pub st_info: u8,
    /// Symbol visibility
    pub st_other: u8,
    /// Section index
    pub st_shndx: u16,
    /// Symbol value (address)
    pub st_value: u64,
    /// Symbol size
    pub st_size: u64,
}

impl Symbol {
    /// Size of one symbol record for `encoding`'s class.
    pub const fn size(encoding: Encoding) -> usize {
        match encoding.class {
            ElfClass::Elf32 => 16,
            ElfClass::Elf64 => 24,
        }
    }

    /// The reserved all-zero symbol at index 0.
    pub fn null() -> Self {
        Self {
            name: String::new(),
            st_name: 0,
            st_info: 0,
            st_other: 0,
            st_shndx: 0,
            st_value: 0,
            st_size: 0,
        }
    }

    /// Pack binding and type into an `st_info` byte.
    pub fn make_info(binding: SymbolBinding, symbol_type: SymbolType) -> u8 {
        (binding.to_u8() << 4) | (symbol_type.to_u8() & 0xf)
    }

    /// Parse one record at the cursor position. Names are resolved separately.
    pub fn parse(cur: &mut ByteCursor<'_>) -> Result<Self, crate::error::BoundsError> {
        let st_name = cur.read_u32()?;
        match cur.encoding().class {
            ElfClass::Elf32 => {
                let st_value = cur.read_word()?;
                let st_size = cur.read_word()?;
                Ok(Self {
                    name: String::new(),
                    st_name,
                    st_info: cur.read_u8()?,
                    st_other: cur.read_u8()?,
                    st_shndx: cur.read_u16()?,
                    st_value,
                    st_size,
                })
            }
            ElfClass::Elf64 => Ok(Self {
                name: String::new(),
                st_name,
                st_info: cur.read_u8()?,
                st_other: cur.read_u8()?,
                st_shndx: cur.read_u16()?,
                st_value: cur.read_word()?,
                st_size: cur.read_word()?,
            }),
        }
    }

    pub fn write(&self, out: &mut ByteWriter<'_>, class: ElfClass) -> Result<(), WriteError> {
        out.write_u32(self.st_name)?;
        if class == ElfClass::Elf32 {
            out.write_word("st_value", self.st_value)?;
            out.write_word("st_size", self.st_size)?;
        }
        out.write_u8(self.st_info)?;
        out.write_u8(self.st_other)?;
        out.write_u16(self.st_shndx)?;
        if class == ElfClass::Elf64 {
            out.write_word("st_value", self.st_value)?;
            out.write_word("st_size", self.st_size)?;
        }
        Ok(())
    }

    /// Get the symbol binding.
    pub fn binding(&self) -> SymbolBinding {
        SymbolBinding::from(self.st_info >> 4)
    }

    /// Get the symbol type.
    pub fn symbol_type(&self) -> SymbolType {
        SymbolType::from(self.st_info & 0xf)
    }

    /// Get the symbol visibility.
    pub fn visibility(&self) -> SymbolVisibility {
        SymbolVisibility::from(self.st_other)
    }

    /// Check if this is an undefined symbol.
    pub fn is_undefined(&self) -> bool {
        self.st_shndx == section_index::SHN_UNDEF
    }

    /// Check if this symbol is defined (has a value).
    pub fn is_defined(&self) -> bool {
        !self.is_undefined() && self.st_shndx != section_index::SHN_COMMON
    }

    /// Check if this is a function symbol.
    pub fn is_function(&self) -> bool {
        matches!(self.symbol_type(), SymbolType::Func)
    }

    /// Check if this is a local symbol.
    pub fn is_local(&self) -> bool {
        matches!(self.binding(), SymbolBinding::Local)
    }

    /// Check if this is a global symbol.
    pub fn is_global(&self) -> bool {
        matches!(self.binding(), SymbolBinding::Global)
    }

    /// Check if this is a weak symbol.
    pub fn is_weak(&self) -> bool {
        matches!(self.binding(), SymbolBinding::Weak)
    }

    /// Every field is zero.
    pub fn is_null(&self) -> bool {
        self.st_name == 0
            && self.st_info == 0
            && self.st_other == 0
            && self.st_shndx == 0
            && self.st_value == 0
            && self.st_size == 0
    }

    /// The ordinary section this symbol is defined in, if `st_shndx` names one.
    pub fn section(&self) -> Option<usize> {
        match self.st_shndx {
            section_index::SHN_UNDEF => None,
            idx if idx >= section_index::SHN_LORESERVE => None,
            idx => Some(usize::from(idx)),
        }
    }
}

/// A parsed symbol table section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolTable {
    /// Section holding the table
    pub section: usize,
    /// Linked string table (`sh_link`)
    pub strtab: usize,
    /// Index of the first non-local symbol (`sh_info`)
    pub first_global: usize,
    /// Bytes per entry (`sh_entsize`, or the record size when zero)
    pub entry_size: usize,
    pub symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    /// First symbol named `name`.
    pub fn find(&self, name: &str) -> Option<(usize, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, s)| s.name == name)
    }
}

/// Effective entry size for a table section, rejecting sizes below the record size and
/// contents that are not a whole number of entries.
pub(crate) fn entry_size(
    header: &SectionHeader,
    data_len: usize,
    record: usize,
    table: &'static str,
) -> ElfResult<usize> {
    let entsize = if header.sh_entsize == 0 {
        record
    } else {
        usize::try_from(header.sh_entsize).unwrap_or(usize::MAX)
    };
    if entsize < record {
        return Err(FormatError::EntrySizeTooSmall {
            table,
            found: header.sh_entsize,
            minimum: record as u64,
        }
        .into());
    }
    if data_len % entsize != 0 {
        return Err(FormatError::InconsistentSize {
            table,
            size: data_len as u64,
            entry_size: entsize as u64,
        }
        .into());
    }
    Ok(entsize)
}

/// Parse the symbol table held by section `index`.
///
/// `strtab` is the contents of the linked string table, or `None` when `sh_link` does not
/// name one. A non-zero symbol 0 and unresolvable names are warnings.
pub fn parse_symbols(
    header: &SectionHeader,
    data: &[u8],
    index: usize,
    strtab: Option<&[u8]>,
    encoding: Encoding,
) -> ElfResult<Parsed<SymbolTable>> {
    if !header.is_symtab() {
        return Err(FormatError::WrongSectionType {
            index,
            expected: "symbol table",
        }
        .into());
    }
    let entsize = entry_size(header, data.len(), Symbol::size(encoding), "symbol table")?;
    let count = data.len() / entsize;
    let mut warnings = Vec::new();

    let mut symbols = Vec::with_capacity(count);
    for i in 0..count {
        let mut cur = ByteCursor::at(data, i * entsize, encoding);
        symbols.push(Symbol::parse(&mut cur)?);
    }
    if symbols.first().is_some_and(|s| !s.is_null()) {
        warnings.push(Warning::NonZeroNullSymbol { table: index });
    }

    match strtab {
        Some(strtab) => {
            let names = StringTable::new(strtab);
            for (i, sym) in symbols.iter_mut().enumerate() {
                match names.get(sym.st_name) {
                    Ok(name) => sym.name = name.into_owned(),
                    Err(_) => warnings.push(Warning::UnresolvedSymbolName {
                        table: index,
                        symbol: i,
                        offset: sym.st_name,
                    }),
                }
            }
        }
        None => warnings.push(Warning::MissingStringTable {
            table: index,
            link: header.sh_link,
        }),
    }

    Ok(Parsed::new(
        SymbolTable {
            section: index,
            strtab: header.sh_link as usize,
            first_global: header.sh_info as usize,
            entry_size: entsize,
            symbols,
        },
        warnings,
    ))
}

/// Encode a symbol table.
///
/// Entry `i` starts from the bytes of entry `i` in `template` (the table's previous contents),
/// so padding past the record survives; entries beyond the template start zeroed.
pub fn encode_symbols(
    table: &SymbolTable,
    template: &[u8],
    encoding: Encoding,
) -> Result<Vec<u8>, WriteError> {
    let entsize = table.entry_size;
    let mut out = vec![0u8; table.symbols.len() * entsize];
    let shared = out.len().min(template.len());
    out[..shared].copy_from_slice(&template[..shared]);
    for (i, sym) in table.symbols.iter().enumerate() {
        let start = i * entsize;
        let mut w = ByteWriter::new(&mut out[start..start + entsize], encoding);
        sym.write(&mut w, encoding.class)?;
    }
    Ok(out)
}
