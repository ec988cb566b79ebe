//! Building fresh ELF images.
//!
//! [`ElfBuilder`] lays out a file from section descriptions and load segments. Sections of a
//! segment are placed contiguously and receive addresses derived from the segment's virtual
//! address; `.shstrtab` is appended automatically. The result is parsed back and verified
//! before it is returned.

use crate::cursor::{Encoding, align_up};
use crate::edit::NewSection;
use crate::error::{ElfResult, LayoutError, WriteError};
use crate::file::ElfFile;
use crate::header::{ElfMachine, ElfType, FileHeader};
use crate::layout::{congruent_after, verify};
use crate::program::{ProgramFlags, ProgramHeader, ProgramType};
use crate::relocation::{Relocation, RelocationTable, encode_relocations};
use crate::section::{Section, SectionHeader, SectionIndex, SectionType, section_index};
use crate::strtab::append_string;
use crate::symbol::{Symbol, SymbolTable, encode_symbols};
use crate::writer::emit;

#[derive(Debug, Clone, Copy)]
struct SegmentSpec {
    first: usize,
    last: usize,
    flags: u32,
    vaddr: u64,
    align: u64,
}

/// Builder for a new ELF file.
#[derive(Debug, Clone)]
pub struct ElfBuilder {
    encoding: Encoding,
    e_type: ElfType,
    machine: ElfMachine,
    sections: Vec<NewSection>,
    segments: Vec<SegmentSpec>,
    entry: u64,
}

impl ElfBuilder {
    pub fn new(encoding: Encoding, e_type: ElfType, machine: ElfMachine) -> Self {
        Self {
            encoding,
            e_type,
            machine,
            sections: Vec::new(),
            segments: Vec::new(),
            entry: 0,
        }
    }

    /// Add a section; returns the index it will have in the output.
    pub fn section(&mut self, section: NewSection) -> SectionIndex {
        self.sections.push(section);
        SectionIndex(self.sections.len())
    }

    /// Map sections `first..=last` into one `PT_LOAD` segment at `vaddr`.
    pub fn load_segment(
        &mut self,
        first: SectionIndex,
        last: SectionIndex,
        flags: u32,
        vaddr: u64,
        align: u64,
    ) -> &mut Self {
        self.segments.push(SegmentSpec {
            first: first.0,
            last: last.0,
            flags,
            vaddr,
            align,
        });
        self
    }

    pub fn entry(&mut self, addr: u64) -> &mut Self {
        self.entry = addr;
        self
    }

    fn segment_of(&self, index: usize) -> Option<usize> {
        self.segments
            .iter()
            .position(|s| (s.first..=s.last).contains(&index))
    }

    pub fn build(&self) -> ElfResult<Vec<u8>> {
        let encoding = self.encoding;
        let count = self.sections.len() + 2;
        for spec in &self.segments {
            if spec.first == 0 || spec.first > spec.last || spec.last > self.sections.len() {
                return Err(LayoutError::NoSuchSection(spec.last).into());
            }
        }

        let mut names = Vec::new();
        append_string(&mut names, "", false)?;
        let mut sections = vec![Section {
            header: SectionHeader::null(),
            data: Vec::new(),
        }];
        for spec in &self.sections {
            let sh_name = append_string(&mut names, &spec.name, true)?;
            sections.push(spec.clone().into_section(sh_name));
        }
        let shstrtab_name = append_string(&mut names, ".shstrtab", true)?;
        sections.push(
            NewSection::new(".shstrtab", SectionType::Strtab, names).into_section(shstrtab_name),
        );

        let mut header = FileHeader::new(encoding, self.e_type, self.machine);
        header.e_entry = self.entry;
        header.e_phnum = u16::try_from(self.segments.len())
            .map_err(|_| LayoutError::Unsupported("more than 65535 segments"))?;
        let phdr_len = self.segments.len() * ProgramHeader::size(encoding);
        let mut cursor = FileHeader::size(encoding) as u64;
        if !self.segments.is_empty() {
            header.e_phoff = cursor;
            cursor += phdr_len as u64;
        }

        // Per segment: (offset of first member, end of file image, end of memory image).
        let mut extents: Vec<Option<(u64, u64, u64)>> = vec![None; self.segments.len()];
        for (i, section) in sections.iter_mut().enumerate().skip(1) {
            let h = &mut section.header;
            let align = h.alignment();
            match self.segment_of(i) {
                Some(s) => {
                    let spec = self.segments[s];
                    let offset = match extents[s] {
                        None => congruent_after(cursor, spec.vaddr, spec.align.max(align)),
                        Some(_) => align_up(cursor, align),
                    };
                    let (start, file_end, mem_end) = *extents[s].get_or_insert((offset, offset, offset));
                    h.sh_offset = offset;
                    h.sh_addr = spec.vaddr + (offset - start);
                    let file_end = file_end.max(offset + h.file_size());
                    let mem_end = mem_end.max(offset + h.sh_size);
                    extents[s] = Some((start, file_end, mem_end));
                }
                None => h.sh_offset = align_up(cursor, align),
            }
            if h.file_size() > 0 {
                cursor = h.sh_offset + h.file_size();
            }
        }

        let segments = self
            .segments
            .iter()
            .zip(&extents)
            .map(|(spec, extent)| {
                let (start, file_end, mem_end) = extent.unwrap_or((cursor, cursor, cursor));
                ProgramHeader {
                    p_type: ProgramType::Load,
                    p_flags: ProgramFlags(spec.flags),
                    p_offset: start,
                    p_vaddr: spec.vaddr,
                    p_paddr: spec.vaddr,
                    p_filesz: file_end - start,
                    p_memsz: mem_end - start,
                    p_align: spec.align,
                }
            })
            .collect::<Vec<_>>();

        header.e_shoff = align_up(cursor, encoding.word_size() as u64);
        let shstrndx = count - 1;
        if count >= usize::from(section_index::SHN_LORESERVE) {
            header.e_shnum = 0;
            sections[0].header.sh_size = count as u64;
        } else {
            header.e_shnum = count as u16;
        }
        if shstrndx >= usize::from(section_index::SHN_LORESERVE) {
            header.e_shstrndx = section_index::SHN_XINDEX;
            sections[0].header.sh_link = shstrndx as u32;
        } else {
            header.e_shstrndx = shstrndx as u16;
        }

        let bytes = emit(&header, &segments, &sections, &[])?;
        let parsed = ElfFile::parse(&bytes)?;
        verify(&parsed.value)?;
        Ok(bytes)
    }
}

/// Encode `symbols` as the contents of a symbol table section.
pub fn symbol_table_bytes(encoding: Encoding, symbols: &[Symbol]) -> Result<Vec<u8>, WriteError> {
    let table = SymbolTable {
        section: 0,
        strtab: 0,
        first_global: 0,
        entry_size: Symbol::size(encoding),
        symbols: symbols.to_vec(),
    };
    encode_symbols(&table, &[], encoding)
}

/// Encode `entries` as the contents of a REL or RELA section.
pub fn relocation_table_bytes(
    encoding: Encoding,
    explicit_addend: bool,
    entries: &[Relocation],
) -> Result<Vec<u8>, WriteError> {
    let table = RelocationTable {
        section: 0,
        symtab: 0,
        target: 0,
        explicit_addend,
        entry_size: Relocation::size(encoding, explicit_addend),
        entries: entries.to_vec(),
    };
    encode_relocations(&table, &[], encoding)
}

/// Build a string table from `strings`; returns the blob and each string's offset.
pub fn string_table_bytes(strings: &[&str]) -> Result<(Vec<u8>, Vec<u32>), WriteError> {
    let mut blob = Vec::new();
    append_string(&mut blob, "", false)?;
    let offsets = strings
        .iter()
        .map(|s| append_string(&mut blob, s, true))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((blob, offsets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SectionFlags;

    #[test]
    fn test_build_relocatable_without_segments() {
        let mut builder = ElfBuilder::new(Encoding::ELF64_LSB, ElfType::Rel, ElfMachine::X86_64);
        builder.section(
            NewSection::new(".text", SectionType::Progbits, vec![0x90; 5])
                .with_flags(SectionFlags::SHF_ALLOC | SectionFlags::SHF_EXECINSTR)
                .with_align(16),
        );
        let bytes = builder.build().unwrap();
        let file = ElfFile::parse(&bytes).unwrap().value;
        assert_eq!(file.sections().len(), 3);
        assert_eq!(file.sections()[1].name(), ".text");
        assert_eq!(file.sections()[1].header.sh_offset, 64);
        assert_eq!(file.sections()[2].name(), ".shstrtab");
        assert!(file.segments().is_empty());
    }

    #[test]
    fn test_build_segment_addresses() {
        let mut builder = ElfBuilder::new(Encoding::ELF32_MSB, ElfType::Exec, ElfMachine::Ppc);
        let text = builder.section(
            NewSection::new(".text", SectionType::Progbits, vec![0; 0x20])
                .with_flags(SectionFlags::SHF_ALLOC | SectionFlags::SHF_EXECINSTR)
                .with_align(4),
        );
        let bss = builder.section(
            NewSection::nobits(".bss", 0x40)
                .with_flags(SectionFlags::SHF_ALLOC | SectionFlags::SHF_WRITE)
                .with_align(4),
        );
        builder
            .load_segment(text, bss, ProgramFlags::PF_R | ProgramFlags::PF_X, 0x1000_0000, 0x1000)
            .entry(0x1000_0000);
        let bytes = builder.build().unwrap();
        let file = ElfFile::parse(&bytes).unwrap().value;

        let seg = file.segments()[0];
        assert_eq!(seg.p_offset % 0x1000, seg.p_vaddr % 0x1000);
        assert_eq!(seg.p_filesz, 0x20);
        assert_eq!(seg.p_memsz, 0x60);
        assert_eq!(file.sections()[text.0].header.sh_addr, 0x1000_0000);
        assert_eq!(file.sections()[bss.0].header.sh_addr, 0x1000_0020);
        assert_eq!(file.header().e_entry, 0x1000_0000);
    }

    #[test]
    fn test_string_table_bytes() {
        let (blob, offsets) = string_table_bytes(&["main", "ain", "x"]).unwrap();
        assert_eq!(blob, b"\0main\0x\0");
        assert_eq!(offsets, vec![1, 2, 6]);
    }
}
