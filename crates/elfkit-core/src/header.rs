//! ELF identification and file header.
//!
//! The file header is the first structure in any ELF file. Its identification bytes fix the
//! class (word width) and data encoding (byte order) used by every later structure, so it is
//! parsed before anything else and carries the file's [`Encoding`].

use serde::Serialize;

use crate::cursor::{ByteCursor, ByteWriter, Encoding};
use crate::error::{BoundsError, ElfResult, FormatError, WriteError};
use crate::{EI_NIDENT, ELF_MAGIC};

/// Indices into the e_ident array.
mod ident {
    pub const EI_CLASS: usize = 4;
    pub const EI_DATA: usize = 5;
    pub const EI_VERSION: usize = 6;
    pub const EI_OSABI: usize = 7;
    pub const EI_ABIVERSION: usize = 8;
}

/// The only defined identification version.
pub const EV_CURRENT: u8 = 1;

/// ELF class (32-bit or 64-bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ElfClass {
    /// 32-bit objects
    Elf32 = 1,
    /// 64-bit objects
    Elf64 = 2,
}

impl TryFrom<u8> for ElfClass {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Elf32),
            2 => Ok(Self::Elf64),
            _ => Err(value),
        }
    }
}

/// ELF data encoding (endianness).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ElfData {
    /// Little-endian (2's complement)
    Lsb = 1,
    /// Big-endian (2's complement)
    Msb = 2,
}

impl TryFrom<u8> for ElfData {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Lsb),
            2 => Ok(Self::Msb),
            _ => Err(value),
        }
    }
}

/// ELF OS/ABI identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElfOsAbi {
    /// UNIX System V ABI
    SysV,
    /// HP-UX
    HpUx,
    /// NetBSD
    NetBsd,
    /// GNU/Linux
    Gnu,
    /// Sun Solaris
    Solaris,
    /// IBM AIX
    Aix,
    /// SGI Irix
    Irix,
    /// FreeBSD
    FreeBsd,
    /// ARM EABI
    ArmAeabi,
    /// Standalone (embedded)
    Standalone,
    /// Unknown ABI
    Unknown(u8),
}

impl From<u8> for ElfOsAbi {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::SysV,
            1 => Self::HpUx,
            2 => Self::NetBsd,
            3 => Self::Gnu,
            6 => Self::Solaris,
            7 => Self::Aix,
            8 => Self::Irix,
            9 => Self::FreeBsd,
            64 => Self::ArmAeabi,
            255 => Self::Standalone,
            other => Self::Unknown(other),
        }
    }
}

impl ElfOsAbi {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::SysV => 0,
            Self::HpUx => 1,
            Self::NetBsd => 2,
            Self::Gnu => 3,
            Self::Solaris => 6,
            Self::Aix => 7,
            Self::Irix => 8,
            Self::FreeBsd => 9,
            Self::ArmAeabi => 64,
            Self::Standalone => 255,
            Self::Unknown(v) => v,
        }
    }
}

/// ELF object file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElfType {
    /// No file type
    None,
    /// Relocatable file
    Rel,
    /// Executable file
    Exec,
    /// Shared object file
    Dyn,
    /// Core file
    Core,
    /// Unknown type
    Unknown(u16),
}

impl From<u16> for ElfType {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Rel,
            2 => Self::Exec,
            3 => Self::Dyn,
            4 => Self::Core,
            other => Self::Unknown(other),
        }
    }
}

impl ElfType {
    pub fn to_u16(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Rel => 1,
            Self::Exec => 2,
            Self::Dyn => 3,
            Self::Core => 4,
            Self::Unknown(v) => v,
        }
    }
}

/// ELF machine architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ElfMachine {
    /// No machine
    None,
    /// SPARC
    Sparc,
    /// Intel 80386
    I386,
    /// MIPS
    Mips,
    /// PowerPC
    Ppc,
    /// PowerPC 64-bit
    Ppc64,
    /// IBM S/390
    S390,
    /// ARM
    Arm,
    /// AMD x86-64
    X86_64,
    /// ARM AARCH64
    Aarch64,
    /// RISC-V
    RiscV,
    /// LoongArch
    LoongArch,
    /// Unknown machine
    Unknown(u16),
}

impl From<u16> for ElfMachine {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::None,
            2 => Self::Sparc,
            3 => Self::I386,
            8 => Self::Mips,
            20 => Self::Ppc,
            21 => Self::Ppc64,
            22 => Self::S390,
            40 => Self::Arm,
            62 => Self::X86_64,
            183 => Self::Aarch64,
            243 => Self::RiscV,
            258 => Self::LoongArch,
            other => Self::Unknown(other),
        }
    }
}

impl ElfMachine {
    /// Convert to the raw u16 value.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Sparc => 2,
            Self::I386 => 3,
            Self::Mips => 8,
            Self::Ppc => 20,
            Self::Ppc64 => 21,
            Self::S390 => 22,
            Self::Arm => 40,
            Self::X86_64 => 62,
            Self::Aarch64 => 183,
            Self::RiscV => 243,
            Self::LoongArch => 258,
            Self::Unknown(v) => v,
        }
    }
}

/// ELF file header, for either class.
///
/// The identification bytes are kept verbatim (padding included) so an unmodified header
/// serializes back to the exact input bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    /// ELF identification bytes
    pub e_ident: [u8; EI_NIDENT],
    /// Class and byte order decoded from `e_ident`
    pub encoding: Encoding,
    /// Object file type
    pub e_type: ElfType,
    /// Machine architecture
    pub e_machine: ElfMachine,
    /// Object file version
    pub e_version: u32,
    /// Entry point virtual address
    pub e_entry: u64,
    /// Program header table file offset
    pub e_phoff: u64,
    /// Section header table file offset
    pub e_shoff: u64,
    /// Processor-specific flags
    pub e_flags: u32,
    /// ELF header size in bytes
    pub e_ehsize: u16,
    /// Program header table entry size
    pub e_phentsize: u16,
    /// Program header table entry count
    pub e_phnum: u16,
    /// Section header table entry size
    pub e_shentsize: u16,
    /// Section header table entry count (0 when extended numbering is in use)
    pub e_shnum: u16,
    /// Section header string table index (`SHN_XINDEX` when extended)
    pub e_shstrndx: u16,
}

impl FileHeader {
    /// Size of the file header for `encoding`'s class.
    pub const fn size(encoding: Encoding) -> usize {
        match encoding.class {
            ElfClass::Elf32 => 52,
            ElfClass::Elf64 => 64,
        }
    }

    /// Parse a file header from the start of `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The buffer is shorter than the identification bytes or the header
    /// - The magic bytes are invalid
    /// - The class, data encoding or identification version is not recognized
    pub fn parse(data: &[u8]) -> ElfResult<Self> {
        if data.len() < EI_NIDENT {
            return Err(BoundsError::new("identification", 0, EI_NIDENT as u64, data.len()).into());
        }

        let mut e_ident = [0u8; EI_NIDENT];
        e_ident.copy_from_slice(&data[..EI_NIDENT]);

        if e_ident[..4] != ELF_MAGIC {
            let mut magic = [0u8; 4];
            magic.copy_from_slice(&e_ident[..4]);
            return Err(FormatError::BadMagic(magic).into());
        }
        let class =
            ElfClass::try_from(e_ident[ident::EI_CLASS]).map_err(FormatError::UnsupportedClass)?;
        let byte_order =
            ElfData::try_from(e_ident[ident::EI_DATA]).map_err(FormatError::UnsupportedEncoding)?;
        if e_ident[ident::EI_VERSION] != EV_CURRENT {
            return Err(FormatError::UnsupportedVersion(e_ident[ident::EI_VERSION]).into());
        }

        let encoding = Encoding::new(class, byte_order);
        let size = Self::size(encoding);
        if data.len() < size {
            return Err(BoundsError::new("file header", 0, size as u64, data.len()).into());
        }

        let mut cur = ByteCursor::at(data, EI_NIDENT, encoding);
        Ok(Self {
            e_ident,
            encoding,
            e_type: ElfType::from(cur.read_u16()?),
            e_machine: ElfMachine::from(cur.read_u16()?),
            e_version: cur.read_u32()?,
            e_entry: cur.read_word()?,
            e_phoff: cur.read_word()?,
            e_shoff: cur.read_word()?,
            e_flags: cur.read_u32()?,
            e_ehsize: cur.read_u16()?,
            e_phentsize: cur.read_u16()?,
            e_phnum: cur.read_u16()?,
            e_shentsize: cur.read_u16()?,
            e_shnum: cur.read_u16()?,
            e_shstrndx: cur.read_u16()?,
        })
    }

    /// Write the header at the writer's position. Exact inverse of [`FileHeader::parse`].
    pub fn write(&self, out: &mut ByteWriter<'_>) -> Result<(), WriteError> {
        out.write_bytes(&self.e_ident)?;
        out.write_u16(self.e_type.to_u16())?;
        out.write_u16(self.e_machine.to_u16())?;
        out.write_u32(self.e_version)?;
        out.write_word("e_entry", self.e_entry)?;
        out.write_word("e_phoff", self.e_phoff)?;
        out.write_word("e_shoff", self.e_shoff)?;
        out.write_u32(self.e_flags)?;
        out.write_u16(self.e_ehsize)?;
        out.write_u16(self.e_phentsize)?;
        out.write_u16(self.e_phnum)?;
        out.write_u16(self.e_shentsize)?;
        out.write_u16(self.e_shnum)?;
        out.write_u16(self.e_shstrndx)
    }

    pub fn class(&self) -> ElfClass {
        self.encoding.class
    }

    pub fn data(&self) -> ElfData {
        self.encoding.data
    }

    /// Get the OS/ABI from the identification bytes.
    pub fn osabi(&self) -> ElfOsAbi {
        ElfOsAbi::from(self.e_ident[ident::EI_OSABI])
    }

    /// Get the ABI version from the identification bytes.
    pub fn abi_version(&self) -> u8 {
        self.e_ident[ident::EI_ABIVERSION]
    }

    /// Check if this is a relocatable object.
    pub fn is_relocatable(&self) -> bool {
        matches!(self.e_type, ElfType::Rel)
    }

    /// Check if this is a shared object (library).
    pub fn is_shared_object(&self) -> bool {
        matches!(self.e_type, ElfType::Dyn)
    }

    /// Check if this is an executable.
    pub fn is_executable(&self) -> bool {
        matches!(self.e_type, ElfType::Exec)
    }

    /// A minimal header for a fresh file of the given encoding: identification, sizes, and
    /// `EV_CURRENT`; every table is empty.
    pub fn new(encoding: Encoding, e_type: ElfType, e_machine: ElfMachine) -> Self {
        let mut e_ident = [0u8; EI_NIDENT];
        e_ident[..4].copy_from_slice(&ELF_MAGIC);
        e_ident[ident::EI_CLASS] = encoding.class as u8;
        e_ident[ident::EI_DATA] = encoding.data as u8;
        e_ident[ident::EI_VERSION] = EV_CURRENT;
        Self {
            e_ident,
            encoding,
            e_type,
            e_machine,
            e_version: u32::from(EV_CURRENT),
            e_entry: 0,
            e_phoff: 0,
            e_shoff: 0,
            e_flags: 0,
            e_ehsize: Self::size(encoding) as u16,
            e_phentsize: crate::program::ProgramHeader::size(encoding) as u16,
            e_phnum: 0,
            e_shentsize: crate::section::SectionHeader::size(encoding) as u16,
            e_shnum: 0,
            e_shstrndx: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ElfError;

    fn make_valid_header() -> [u8; 64] {
        let mut header = [0u8; 64];
        // Magic
        header[0..4].copy_from_slice(&ELF_MAGIC);
        // Class = ELF64
        header[4] = 2;
        // Data = LSB
        header[5] = 1;
        // Version
        header[6] = 1;
        // OS/ABI = GNU
        header[7] = 3;
        // Type = DYN (shared object) - little endian
        header[16] = 3;
        // Machine = x86_64 (0x3e = 62)
        header[18] = 0x3e;
        // Version
        header[20] = 1;
        // e_entry = 0x1040
        header[24] = 0x40;
        header[25] = 0x10;
        // e_ehsize = 64
        header[52] = 64;
        header
    }

    #[test]
    fn test_parse_valid_header() {
        let data = make_valid_header();
        let header = FileHeader::parse(&data).unwrap();

        assert_eq!(header.class(), ElfClass::Elf64);
        assert_eq!(header.data(), ElfData::Lsb);
        assert_eq!(header.osabi(), ElfOsAbi::Gnu);
        assert!(header.is_shared_object());
        assert_eq!(header.e_machine, ElfMachine::X86_64);
        assert_eq!(header.e_entry, 0x1040);
        assert_eq!(header.e_ehsize, 64);
    }

    #[test]
    fn test_write_is_inverse_of_parse() {
        let data = make_valid_header();
        let header = FileHeader::parse(&data).unwrap();
        let mut out = [0u8; 64];
        header.write(&mut ByteWriter::new(&mut out, header.encoding)).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_big_endian_elf32() {
        let mut data = [0u8; 52];
        data[0..4].copy_from_slice(&ELF_MAGIC);
        data[4] = 1;
        data[5] = 2;
        data[6] = 1;
        // e_type = EXEC, e_machine = PPC, big-endian
        data[17] = 2;
        data[19] = 20;
        // e_entry = 0x10000074
        data[24..28].copy_from_slice(&[0x10, 0x00, 0x00, 0x74]);
        let header = FileHeader::parse(&data).unwrap();
        assert_eq!(header.encoding, Encoding::ELF32_MSB);
        assert!(header.is_executable());
        assert_eq!(header.e_machine, ElfMachine::Ppc);
        assert_eq!(header.e_entry, 0x1000_0074);
    }

    #[test]
    fn test_invalid_magic() {
        let mut data = make_valid_header();
        data[0] = 0x00;
        assert!(matches!(
            FileHeader::parse(&data),
            Err(ElfError::Format(FormatError::BadMagic([0x00, b'E', b'L', b'F'])))
        ));
    }

    #[test]
    fn test_bad_class_encoding_and_version() {
        let mut data = make_valid_header();
        data[4] = 3;
        assert!(matches!(
            FileHeader::parse(&data),
            Err(ElfError::Format(FormatError::UnsupportedClass(3)))
        ));

        let mut data = make_valid_header();
        data[5] = 0;
        assert!(matches!(
            FileHeader::parse(&data),
            Err(ElfError::Format(FormatError::UnsupportedEncoding(0)))
        ));

        let mut data = make_valid_header();
        data[6] = 2;
        assert!(matches!(
            FileHeader::parse(&data),
            Err(ElfError::Format(FormatError::UnsupportedVersion(2)))
        ));
    }

    #[test]
    fn test_buffer_too_small() {
        let data = make_valid_header();
        assert!(matches!(
            FileHeader::parse(&data[..32]),
            Err(ElfError::Bounds(BoundsError { len: 64, available: 32, .. }))
        ));
        assert!(matches!(
            FileHeader::parse(&data[..8]),
            Err(ElfError::Bounds(BoundsError { len: 16, available: 8, .. }))
        ));
    }

    #[test]
    fn test_elf32_header_fits_in_52_bytes() {
        let header = FileHeader::new(Encoding::ELF32_LSB, ElfType::Rel, ElfMachine::I386);
        let mut out = [0u8; 52];
        header.write(&mut ByteWriter::new(&mut out, header.encoding)).unwrap();
        let back = FileHeader::parse(&out).unwrap();
        assert_eq!(back, header);
        assert_eq!(back.e_ehsize, 52);
        assert_eq!(back.e_phentsize, 32);
        assert_eq!(back.e_shentsize, 40);
    }

    #[test]
    fn test_elf_type_conversion() {
        assert_eq!(ElfType::from(0u16), ElfType::None);
        assert_eq!(ElfType::from(1u16), ElfType::Rel);
        assert_eq!(ElfType::from(2u16), ElfType::Exec);
        assert_eq!(ElfType::from(3u16), ElfType::Dyn);
        assert_eq!(ElfType::from(4u16), ElfType::Core);
        assert!(matches!(ElfType::from(99u16), ElfType::Unknown(99)));
        assert_eq!(ElfType::Unknown(0xfe00).to_u16(), 0xfe00);
    }

    #[test]
    fn test_elf_machine_conversion() {
        assert_eq!(ElfMachine::from(0u16), ElfMachine::None);
        assert_eq!(ElfMachine::from(3u16), ElfMachine::I386);
        assert_eq!(ElfMachine::from(62u16), ElfMachine::X86_64);
        assert_eq!(ElfMachine::from(183u16), ElfMachine::Aarch64);
        assert!(matches!(ElfMachine::from(999u16), ElfMachine::Unknown(999)));
        for raw in [2u16, 8, 20, 21, 22, 40, 243, 258] {
            assert_eq!(ElfMachine::from(raw).to_u16(), raw);
        }
    }
}
