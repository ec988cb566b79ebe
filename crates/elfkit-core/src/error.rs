//! Error and warning taxonomy.
//!
//! Fatal conditions are split by cause: [`FormatError`] for files that are not ELF or use an
//! encoding we cannot read, [`BoundsError`] for offsets or lengths outside a buffer,
//! [`LayoutError`] for edits that would leave the file inconsistent, and [`WriteError`] for
//! inconsistencies detected while serializing. Non-fatal anomalies found by the tolerant table
//! parsers are reported as [`Warning`]s inside a [`Parsed`] value.

use core::fmt;

use serde::Serialize;
use thiserror::Error;

/// Result type for ELF operations.
pub type ElfResult<T> = Result<T, ElfError>;

/// Top-level error for every fallible operation in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElfError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Bounds(#[from] BoundsError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Write(#[from] WriteError),
    /// A warning promoted to an error by [`crate::config::ReadMode::Strict`].
    #[error("rejected in strict mode: {0}")]
    Rejected(Warning),
}

/// The input is not an ELF file we can interpret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("invalid ELF magic: {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("unsupported ELF class: {0}")]
    UnsupportedClass(u8),
    #[error("unsupported data encoding: {0}")]
    UnsupportedEncoding(u8),
    #[error("unsupported ELF version: {0}")]
    UnsupportedVersion(u8),
    #[error("{table} entry size {found} is smaller than {minimum}")]
    EntrySizeTooSmall {
        table: &'static str,
        found: u64,
        minimum: u64,
    },
    #[error("{table} size {size} is not a multiple of entry size {entry_size}")]
    InconsistentSize {
        table: &'static str,
        size: u64,
        entry_size: u64,
    },
    #[error("section {index} is not a {expected}")]
    WrongSectionType { index: usize, expected: &'static str },
}

/// An offset/length pair reaches outside the buffer it addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{what} at {offset:#x}+{len:#x} exceeds the {available:#x} available bytes")]
pub struct BoundsError {
    pub what: &'static str,
    pub offset: u64,
    pub len: u64,
    pub available: u64,
}

impl BoundsError {
    pub fn new(what: &'static str, offset: u64, len: u64, available: usize) -> Self {
        Self {
            what,
            offset,
            len,
            available: available as u64,
        }
    }
}

/// A file region that takes part in the overlap check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Region {
    FileHeader,
    ProgramHeaders,
    SectionHeaders,
    Section(usize),
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileHeader => write!(f, "file header"),
            Self::ProgramHeaders => write!(f, "program header table"),
            Self::SectionHeaders => write!(f, "section header table"),
            Self::Section(index) => write!(f, "section {index}"),
        }
    }
}

/// The field holding a cross reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Reference {
    SectionNameTable,
    SectionLink { section: usize },
    SectionInfo { section: usize },
    Symbol { table: usize, symbol: usize },
    Relocation { table: usize, entry: usize },
    GroupMember { group: usize },
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SectionNameTable => write!(f, "e_shstrndx"),
            Self::SectionLink { section } => write!(f, "sh_link of section {section}"),
            Self::SectionInfo { section } => write!(f, "sh_info of section {section}"),
            Self::Symbol { table, symbol } => {
                write!(f, "symbol {symbol} of table {table}")
            }
            Self::Relocation { table, entry } => {
                write!(f, "relocation {entry} of table {table}")
            }
            Self::GroupMember { group } => write!(f, "member list of group {group}"),
        }
    }
}

/// An edit cannot be laid out, or would leave the model inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("{first} overlaps {second}")]
    Overlap { first: Region, second: Region },
    #[error("section {index} at offset {offset:#x} violates alignment {align}")]
    Misaligned { index: usize, offset: u64, align: u64 },
    #[error("{from} refers to missing index {target}")]
    DanglingReference { from: Reference, target: u64 },
    #[error("edit would split segment {segment} at section {section}")]
    SegmentSplit { segment: usize, section: usize },
    #[error("segment {segment} violates its offset/address or size invariants")]
    SegmentInvariant { segment: usize },
    #[error("entry point {entry:#x} is outside every loadable segment")]
    EntryOutsideSegments { entry: u64 },
    #[error("no section with index {0}")]
    NoSuchSection(usize),
    #[error("symbol table {table} has no symbol {index}")]
    NoSuchSymbol { table: usize, index: usize },
    #[error("section {0} is reserved and cannot be edited")]
    ReservedSection(usize),
    #[error("section {0} has no file contents")]
    NoFileContents(usize),
    #[error("file has no section name string table")]
    NoSectionNameTable,
    #[error("no allocated section holds {len} bytes at {addr:#x}")]
    UnmappedAddress { addr: u64, len: u64 },
    #[error("unsupported edit: {0}")]
    Unsupported(&'static str),
}

/// Serialization found the model and the output buffer in disagreement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("{field} value {value:#x} does not fit the target word")]
    ValueOverflow { field: &'static str, value: u64 },
    #[error("{field} value {value} does not fit the target signed word")]
    SignedOverflow { field: &'static str, value: i64 },
    #[error("write of {len} bytes at {offset:#x} exceeds the {available} byte buffer")]
    OutOfRange { offset: u64, len: u64, available: u64 },
    #[error("section {index} holds {actual} bytes but its header declares {declared}")]
    ContentSize {
        index: usize,
        declared: u64,
        actual: u64,
    },
}

/// A non-fatal anomaly found while reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Warning {
    /// `e_shstrndx` does not name an existing section.
    SectionNameTableMissing { index: usize },
    UnresolvedSectionName { section: usize, offset: u32 },
    UnresolvedSymbolName {
        table: usize,
        symbol: usize,
        offset: u32,
    },
    /// Symbol 0 is reserved and must be all zero.
    NonZeroNullSymbol { table: usize },
    /// A symbol table's `sh_link` does not name a string table.
    MissingStringTable { table: usize, link: u32 },
    SymbolIndexOutOfRange {
        table: usize,
        entry: usize,
        symbol: u32,
        count: usize,
    },
    /// A symbol or relocation table could not be decoded at all.
    MalformedTable { section: usize, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SectionNameTableMissing { index } => {
                write!(f, "section name table index {index} is out of range")
            }
            Self::UnresolvedSectionName { section, offset } => {
                write!(f, "section {section}: name offset {offset:#x} is unresolvable")
            }
            Self::UnresolvedSymbolName {
                table,
                symbol,
                offset,
            } => write!(
                f,
                "symbol {symbol} of table {table}: name offset {offset:#x} is unresolvable"
            ),
            Self::NonZeroNullSymbol { table } => {
                write!(f, "symbol table {table}: reserved symbol 0 is not all zero")
            }
            Self::MissingStringTable { table, link } => {
                write!(f, "symbol table {table}: sh_link {link} is not a string table")
            }
            Self::SymbolIndexOutOfRange {
                table,
                entry,
                symbol,
                count,
            } => write!(
                f,
                "relocation {entry} of table {table}: symbol index {symbol} >= {count}"
            ),
            Self::MalformedTable { section, reason } => {
                write!(f, "section {section}: {reason}")
            }
        }
    }
}

/// A successfully parsed value plus the warnings collected on the way.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Parsed<T> {
    pub fn new(value: T, warnings: Vec<Warning>) -> Self {
        Self { value, warnings }
    }

    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn into_parts(self) -> (T, Vec<Warning>) {
        (self.value, self.warnings)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Parsed<U> {
        Parsed {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}
