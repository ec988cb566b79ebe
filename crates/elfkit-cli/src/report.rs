//! Human-readable and JSON views of a parsed file.

use std::io::{self, Write};

use elfkit_core::{ElfFile, ElfResult, FileHeader, ProgramHeader, SectionHeader};
use elfkit_core::{RelocationTable, SymbolTable};
use serde::Serialize;

use crate::structured_log::sha256_hex;

/// JSON dump of an [`ElfFile`]: headers, decoded tables and diagnostics.
#[derive(Debug, Serialize)]
pub struct FileReport<'a> {
    pub header: &'a FileHeader,
    pub segments: &'a [ProgramHeader],
    pub sections: Vec<SectionEntry<'a>>,
    pub symbol_tables: Vec<SymbolTable>,
    pub relocation_tables: Vec<RelocationTable>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SectionEntry<'a> {
    pub index: usize,
    #[serde(flatten)]
    pub header: &'a SectionHeader,
    /// Digest of the section's file contents; absent for `NOBITS` and empty sections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl<'a> FileReport<'a> {
    pub fn from_file(file: &'a ElfFile) -> ElfResult<Self> {
        let sections = file
            .sections()
            .iter()
            .enumerate()
            .map(|(index, section)| SectionEntry {
                index,
                header: &section.header,
                sha256: (!section.data.is_empty()).then(|| sha256_hex(&section.data)),
            })
            .collect();
        let symbol_tables = file
            .symbol_table_indices()
            .into_iter()
            .map(|i| file.symbol_table(i).map(|parsed| parsed.value))
            .collect::<ElfResult<Vec<_>>>()?;
        let relocation_tables = file
            .relocation_table_indices()
            .into_iter()
            .map(|i| file.relocation_table(i).map(|parsed| parsed.value))
            .collect::<ElfResult<Vec<_>>>()?;
        Ok(Self {
            header: file.header(),
            segments: file.segments(),
            sections,
            symbol_tables,
            relocation_tables,
            warnings: file.diagnostics().iter().map(ToString::to_string).collect(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Print the file header, program headers and section headers in a `readelf`-like layout.
pub fn write_plain(file: &ElfFile, out: &mut dyn Write) -> io::Result<()> {
    write_file_header(file, out)?;
    writeln!(out)?;
    write_program_headers(file, out)?;
    writeln!(out)?;
    write_section_headers(file, out)
}

fn write_file_header(file: &ElfFile, out: &mut dyn Write) -> io::Result<()> {
    let h = file.header();
    let shstrndx = file
        .shstrndx()
        .map_or_else(|| "none".to_string(), |i| i.0.to_string());
    writeln!(out, "ELF Header:")?;
    writeln!(out, "  {:<36}{:?}", "Class:", h.class())?;
    writeln!(out, "  {:<36}{:?}", "Data:", h.data())?;
    writeln!(out, "  {:<36}{:?}", "OS/ABI:", h.osabi())?;
    writeln!(out, "  {:<36}{:?}", "Type:", h.e_type)?;
    writeln!(out, "  {:<36}{:?}", "Machine:", h.e_machine)?;
    writeln!(out, "  {:<36}{:#x}", "Entry point address:", h.e_entry)?;
    writeln!(out, "  {:<36}{} (bytes into file)", "Start of program headers:", h.e_phoff)?;
    writeln!(out, "  {:<36}{} (bytes into file)", "Start of section headers:", h.e_shoff)?;
    writeln!(out, "  {:<36}{:#x}", "Flags:", h.e_flags)?;
    writeln!(out, "  {:<36}{}", "Number of program headers:", file.segments().len())?;
    writeln!(out, "  {:<36}{}", "Number of section headers:", file.sections().len())?;
    writeln!(out, "  {:<36}{}", "Section header string table index:", shstrndx)
}

fn write_program_headers(file: &ElfFile, out: &mut dyn Write) -> io::Result<()> {
    if file.segments().is_empty() {
        return writeln!(out, "There are no program headers in this file.");
    }
    writeln!(out, "Program Headers:")?;
    writeln!(
        out,
        "  {:<14} {:<8} {:<18} {:<8} {:<8} {:<3} Align",
        "Type", "Offset", "VirtAddr", "FileSiz", "MemSiz", "Flg"
    )?;
    for p in file.segments() {
        writeln!(
            out,
            "  {:<14} {:#08x} {:#018x} {:#08x} {:#08x} {} {:#x}",
            format!("{:?}", p.p_type),
            p.p_offset,
            p.p_vaddr,
            p.p_filesz,
            p.p_memsz,
            p.p_flags.permissions(),
            p.p_align,
        )?;
    }
    Ok(())
}

fn write_section_headers(file: &ElfFile, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "Section Headers:")?;
    writeln!(
        out,
        "  [Nr] {:<17} {:<15} {:<16} {:<6} {:<6} ES Flg Lk Inf Al",
        "Name", "Type", "Address", "Off", "Size"
    )?;
    for (i, section) in file.sections().iter().enumerate() {
        let h = &section.header;
        writeln!(
            out,
            "  [{i:>2}] {:<17} {:<15} {:016x} {:06x} {:06x} {:02x} {:>3} {:>2} {:>3} {}",
            h.name,
            h.sh_type.label(),
            h.sh_addr,
            h.sh_offset,
            h.sh_size,
            h.sh_entsize,
            h.sh_flags.letters(),
            h.sh_link,
            h.sh_info,
            h.sh_addralign,
        )?;
    }
    Ok(())
}
