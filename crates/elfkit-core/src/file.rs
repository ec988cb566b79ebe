//! The in-memory ELF model.
//!
//! [`ElfFile`] owns the file header, program headers, sections (header plus contents) and the
//! original byte image. The image supplies every byte no structure covers, so an unedited model
//! serializes back to its input byte for byte.

use std::cell::RefCell;

use crate::config::Options;
use crate::cursor::Encoding;
use crate::error::{BoundsError, ElfError, ElfResult, FormatError, LayoutError, Parsed, Warning};
use crate::header::FileHeader;
use crate::program::{ProgramHeader, parse_program_headers};
use crate::relocation::{RelocationTable, parse_relocations};
use crate::section::{
    Section, SectionHeader, SectionIndex, SectionType, name_table_index, parse_section_headers,
    resolve_section_names,
};
use crate::strtab::{NameCache, StringTable};
use crate::symbol::{Symbol, SymbolIndex, SymbolTable, parse_symbols};

/// A parsed ELF file.
#[derive(Debug, Clone)]
pub struct ElfFile {
    pub(crate) header: FileHeader,
    pub(crate) segments: Vec<ProgramHeader>,
    pub(crate) sections: Vec<Section>,
    /// Resolved section name table index; 0 when the file has none.
    pub(crate) shstrndx: usize,
    pub(crate) image: Image,
    pub(crate) names: RefCell<NameCache>,
    pub(crate) options: Options,
    pub(crate) edited: bool,
}

/// Background bytes of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Image(Vec<u8>);

impl Image {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Zero `[start, start + len)`. A range reaching the end of the image truncates it instead.
    pub(crate) fn vacate(&mut self, start: u64, len: u64) {
        let total = self.0.len() as u64;
        if len == 0 || start >= total {
            return;
        }
        let end = start.saturating_add(len);
        if end >= total {
            self.0.truncate(start as usize);
        } else {
            self.0[start as usize..end as usize].fill(0);
        }
    }
}

impl ElfFile {
    /// Parse with default [`Options`].
    pub fn parse(bytes: &[u8]) -> ElfResult<Parsed<ElfFile>> {
        Self::parse_with(bytes, Options::default())
    }

    /// Parse `bytes` into a model.
    ///
    /// Header, table and section content bounds are checked up front and are fatal. Name
    /// resolution and symbol/relocation table anomalies become warnings, or an
    /// [`ElfError::Rejected`] in strict mode.
    pub fn parse_with(bytes: &[u8], options: Options) -> ElfResult<Parsed<ElfFile>> {
        let header = FileHeader::parse(bytes)?;
        let segments = parse_program_headers(bytes, &header)?;
        let mut headers = parse_section_headers(bytes, &header)?;

        let mut sections = Vec::with_capacity(headers.len());
        for header in &headers {
            sections.push(read_contents(bytes, header)?);
        }

        let shstrndx = name_table_index(&header, &headers);
        let names = headers
            .get(shstrndx)
            .filter(|_| shstrndx != 0)
            .and_then(|_| sections.get(shstrndx).map(Vec::as_slice));
        let mut warnings = resolve_section_names(&mut headers, shstrndx, names);
        let shstrndx = if names.is_some() { shstrndx } else { 0 };

        let sections = headers
            .into_iter()
            .zip(sections)
            .map(|(header, data)| Section { header, data })
            .collect();

        let file = ElfFile {
            header,
            segments,
            sections,
            shstrndx,
            image: Image::new(bytes.to_vec()),
            names: RefCell::new(NameCache::default()),
            options,
            edited: false,
        };
        warnings.extend(file.diagnostics());

        if options.read_mode.is_strict() {
            if let Some(first) = warnings.first() {
                return Err(ElfError::Rejected(first.clone()));
            }
        }
        Ok(Parsed::new(file, warnings))
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn encoding(&self) -> Encoding {
        self.header.encoding
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Program headers in table order.
    pub fn segments(&self) -> &[ProgramHeader] {
        &self.segments
    }

    /// Sections in table order, section 0 included.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, index: SectionIndex) -> Option<&Section> {
        self.sections.get(index.0)
    }

    /// The section name string table, when the file has one.
    pub fn shstrndx(&self) -> Option<SectionIndex> {
        (self.shstrndx != 0).then_some(SectionIndex(self.shstrndx))
    }

    /// Whether any modification has been applied since parsing.
    pub fn is_edited(&self) -> bool {
        self.edited
    }

    /// Bytes outside every structure are taken from this image when serializing.
    pub fn image(&self) -> &[u8] {
        self.image.bytes()
    }

    pub(crate) fn section_or_err(&self, index: SectionIndex) -> Result<&Section, LayoutError> {
        self.sections
            .get(index.0)
            .ok_or(LayoutError::NoSuchSection(index.0))
    }

    /// First section named `name`.
    pub fn section_by_name(&self, name: &str) -> Option<SectionIndex> {
        self.sections
            .iter()
            .position(|s| s.header.name == name)
            .filter(|&i| i != 0 || name.is_empty())
            .map(SectionIndex)
    }

    /// Indices of every `SYMTAB` and `DYNSYM` section.
    pub fn symbol_table_indices(&self) -> Vec<SectionIndex> {
        self.indices_where(SectionHeader::is_symtab)
    }

    /// Indices of every `REL` and `RELA` section.
    pub fn relocation_table_indices(&self) -> Vec<SectionIndex> {
        self.indices_where(SectionHeader::is_relocation)
    }

    fn indices_where(&self, pred: impl Fn(&SectionHeader) -> bool) -> Vec<SectionIndex> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, s)| pred(&s.header))
            .map(|(i, _)| SectionIndex(i))
            .collect()
    }

    /// String table held by section `index`.
    pub fn string_table(&self, index: SectionIndex) -> ElfResult<StringTable<'_>> {
        let section = self.section_or_err(index)?;
        if !section.header.is_strtab() {
            return Err(FormatError::WrongSectionType {
                index: index.0,
                expected: "string table",
            }
            .into());
        }
        Ok(StringTable::new(&section.data))
    }

    /// Contents of the string table `sh_link` names, if it names one.
    fn linked_strings(&self, header: &SectionHeader) -> Option<&[u8]> {
        self.sections
            .get(header.sh_link as usize)
            .filter(|s| header.sh_link != 0 && s.header.is_strtab())
            .map(|s| s.data.as_slice())
    }

    /// String at `offset` of table `table`, resolved through the name cache.
    pub fn string_at(&self, table: SectionIndex, offset: u32) -> ElfResult<String> {
        if let Some(hit) = self.names.borrow().get(table.0, offset) {
            return Ok(hit.to_owned());
        }
        let text = self.string_table(table)?.get(offset)?.into_owned();
        self.names.borrow_mut().insert(table.0, offset, text.clone());
        Ok(text)
    }

    /// Decode the symbol table held by section `index`.
    pub fn symbol_table(&self, index: SectionIndex) -> ElfResult<Parsed<SymbolTable>> {
        let section = self.section_or_err(index)?;
        let strings = self.linked_strings(&section.header);
        parse_symbols(&section.header, &section.data, index.0, strings, self.encoding())
    }

    /// Decode the relocation table held by section `index`.
    pub fn relocation_table(&self, index: SectionIndex) -> ElfResult<Parsed<RelocationTable>> {
        let section = self.section_or_err(index)?;
        let symbol_count = self
            .sections
            .get(section.header.sh_link as usize)
            .filter(|s| s.header.is_symtab())
            .and_then(|s| symbol_count(&s.header, self.encoding()));
        parse_relocations(&section.header, &section.data, index.0, symbol_count, self.encoding())
    }

    /// First symbol named `name`, searching `SYMTAB` sections before `DYNSYM` ones.
    pub fn find_symbol(&self, name: &str) -> Option<(SectionIndex, SymbolIndex, Symbol)> {
        let mut tables = self.symbol_table_indices();
        tables.sort_by_key(|&i| self.sections[i.0].header.sh_type != SectionType::Symtab);
        tables.into_iter().find_map(|table| {
            let parsed = self.symbol_table(table).ok()?;
            let (i, sym) = parsed.value.find(name)?;
            Some((table, SymbolIndex(i), sym.clone()))
        })
    }

    /// Warnings from every symbol and relocation table. Tables that cannot be decoded at all
    /// are reported as [`Warning::MalformedTable`].
    pub fn diagnostics(&self) -> Vec<Warning> {
        let mut warnings = Vec::new();
        for (i, section) in self.sections.iter().enumerate() {
            let index = SectionIndex(i);
            let result = if section.header.is_symtab() {
                self.symbol_table(index).map(|p| p.warnings)
            } else if section.header.is_relocation() {
                self.relocation_table(index).map(|p| p.warnings)
            } else {
                continue;
            };
            match result {
                Ok(found) => warnings.extend(found),
                Err(err) => warnings.push(Warning::MalformedTable {
                    section: i,
                    reason: err.to_string(),
                }),
            }
        }
        warnings
    }

    /// Serialize the model. Edited models are checked against every layout invariant first.
    pub fn to_bytes(&self) -> ElfResult<Vec<u8>> {
        crate::writer::serialize(self)
    }
}

/// Number of entries in a symbol table section, when its entry size is usable.
pub(crate) fn symbol_count(header: &SectionHeader, encoding: Encoding) -> Option<usize> {
    let entsize = if header.sh_entsize == 0 {
        Symbol::size(encoding) as u64
    } else {
        header.sh_entsize
    };
    usize::try_from(header.sh_size / entsize).ok()
}

fn read_contents(bytes: &[u8], header: &SectionHeader) -> ElfResult<Vec<u8>> {
    if !header.has_file_contents() {
        return Ok(Vec::new());
    }
    let start = header.sh_offset;
    let end = start.checked_add(header.sh_size);
    match end {
        Some(end) if end <= bytes.len() as u64 => Ok(bytes[start as usize..end as usize].to_vec()),
        _ => Err(BoundsError::new("section contents", start, header.sh_size, bytes.len()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vacate_zeroes_or_truncates() {
        let mut image = Image::new(vec![1, 2, 3, 4, 5, 6]);
        image.vacate(1, 2);
        assert_eq!(image.bytes(), &[1, 0, 0, 4, 5, 6]);
        image.vacate(4, 10);
        assert_eq!(image.bytes(), &[1, 0, 0, 4]);
        image.vacate(9, 1);
        assert_eq!(image.bytes().len(), 4);
        image.vacate(2, 0);
        assert_eq!(image.bytes(), &[1, 0, 0, 4]);
    }

    #[test]
    fn test_read_contents_bounds() {
        let mut header = SectionHeader::null();
        header.sh_type = SectionType::Progbits;
        header.sh_offset = 4;
        header.sh_size = 4;
        assert_eq!(read_contents(&[0, 1, 2, 3, 4, 5, 6, 7], &header).unwrap(), vec![4, 5, 6, 7]);
        assert!(matches!(
            read_contents(&[0; 7], &header),
            Err(ElfError::Bounds(BoundsError { what: "section contents", .. }))
        ));

        header.sh_type = SectionType::Nobits;
        header.sh_size = 1 << 40;
        assert!(read_contents(&[], &header).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_non_elf() {
        assert!(matches!(
            ElfFile::parse(b"#!/bin/sh\necho hi\n"),
            Err(ElfError::Format(FormatError::BadMagic(_)))
        ));
    }
}
