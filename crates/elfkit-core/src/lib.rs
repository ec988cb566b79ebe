//! # elfkit-core
//!
//! Read, modify and re-serialize ELF files.
//!
//! Files are parsed into an owned [`ElfFile`] model: file header, program headers, sections with
//! their contents, and the original byte image. String, symbol and relocation tables are decoded
//! on demand. Structural edits go through the layout planner, which recomputes every offset and
//! size they invalidate and checks the result before the edit is committed.
//!
//! # Supported
//!
//! - ELF32 and ELF64, little- and big-endian
//! - `REL` and `RELA` relocation tables (entries are decoded, never applied)
//! - Extended section numbering (`e_shnum == 0`, `e_shstrndx == SHN_XINDEX`)
//!
//! An unedited model serializes back to its input byte for byte.

pub mod builder;
pub mod config;
pub mod cursor;
pub mod edit;
pub mod error;
pub mod file;
pub mod header;
pub mod layout;
pub mod program;
pub mod relocation;
pub mod section;
pub mod strtab;
pub mod symbol;
pub mod writer;

pub use builder::ElfBuilder;
pub use config::{Options, ReadMode};
pub use cursor::Encoding;
pub use edit::{NewSection, NewSymbol, Removal};
pub use error::{
    BoundsError, ElfError, ElfResult, FormatError, LayoutError, Parsed, Reference, Region,
    Warning, WriteError,
};
pub use file::ElfFile;
pub use header::{ElfClass, ElfData, ElfMachine, ElfOsAbi, ElfType, FileHeader};
pub use program::{ProgramFlags, ProgramHeader, ProgramType};
pub use relocation::{Relocation, RelocationTable, X86_64RelocationType};
pub use section::{Section, SectionFlags, SectionHeader, SectionIndex, SectionType};
pub use strtab::StringTable;
pub use symbol::{Symbol, SymbolBinding, SymbolIndex, SymbolTable, SymbolType, SymbolVisibility};

/// ELF magic bytes: "\x7fELF"
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Size of ELF identification array
pub const EI_NIDENT: usize = 16;
