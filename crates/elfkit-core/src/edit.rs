//! Structural edits on [`ElfFile`].
//!
//! Every operation works on a clone of the model and commits only once the layout planner has
//! accepted the result, so a failed edit leaves the file untouched.

use crate::error::{BoundsError, ElfResult, FormatError, LayoutError, Reference};
use crate::file::ElfFile;
use crate::layout::{LayoutSnapshot, relayout};
use crate::relocation::{encode_relocations, parse_relocations};
use crate::section::{
    Group, Section, SectionFlags, SectionHeader, SectionIndex, SectionType, section_index,
};
use crate::strtab::append_string;
use crate::symbol::{
    Symbol, SymbolBinding, SymbolIndex, SymbolTable, SymbolType, encode_symbols, parse_symbols,
};

/// Description of a section to add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSection {
    pub name: String,
    pub section_type: SectionType,
    pub flags: SectionFlags,
    pub addr: u64,
    pub data: Vec<u8>,
    /// Memory size of a `NOBITS` section; ignored otherwise.
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
}

impl NewSection {
    pub fn new(name: impl Into<String>, section_type: SectionType, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            section_type,
            flags: SectionFlags(0),
            addr: 0,
            size: data.len() as u64,
            data,
            link: 0,
            info: 0,
            addralign: 1,
            entsize: 0,
        }
    }

    pub fn nobits(name: impl Into<String>, size: u64) -> Self {
        Self {
            size,
            ..Self::new(name, SectionType::Nobits, Vec::new())
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: u64) -> Self {
        self.flags = SectionFlags(flags);
        self
    }

    #[must_use]
    pub fn with_addr(mut self, addr: u64) -> Self {
        self.addr = addr;
        self
    }

    #[must_use]
    pub fn with_link(mut self, link: SectionIndex) -> Self {
        self.link = link.0 as u32;
        self
    }

    #[must_use]
    pub fn with_info(mut self, info: u32) -> Self {
        self.info = info;
        self
    }

    #[must_use]
    pub fn with_align(mut self, addralign: u64) -> Self {
        self.addralign = addralign;
        self
    }

    #[must_use]
    pub fn with_entsize(mut self, entsize: u64) -> Self {
        self.entsize = entsize;
        self
    }

    pub(crate) fn into_section(self, sh_name: u32) -> Section {
        let nobits = self.section_type == SectionType::Nobits;
        let header = SectionHeader {
            name: self.name,
            sh_name,
            sh_type: self.section_type,
            sh_flags: self.flags,
            sh_addr: self.addr,
            sh_offset: 0,
            sh_size: if nobits { self.size } else { self.data.len() as u64 },
            sh_link: self.link,
            sh_info: self.info,
            sh_addralign: self.addralign,
            sh_entsize: self.entsize,
        };
        let data = if nobits { Vec::new() } else { self.data };
        Section { header, data }
    }
}

/// How [`ElfFile::remove_section`] treats sections and symbols that depend on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Removal {
    /// Fail with [`LayoutError::DanglingReference`] if anything refers to the section.
    #[default]
    Strict,
    /// Also remove every section whose `sh_link` or section `sh_info` points at a removed
    /// section, drop symbols defined in removed sections and drop group members.
    Cascade,
}

/// Description of a symbol to add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSymbol {
    pub name: String,
    pub binding: SymbolBinding,
    pub symbol_type: SymbolType,
    pub other: u8,
    pub shndx: u16,
    pub value: u64,
    pub size: u64,
}

impl NewSymbol {
    /// An undefined symbol with default visibility.
    pub fn new(name: impl Into<String>, binding: SymbolBinding, symbol_type: SymbolType) -> Self {
        Self {
            name: name.into(),
            binding,
            symbol_type,
            other: 0,
            shndx: section_index::SHN_UNDEF,
            value: 0,
            size: 0,
        }
    }

    #[must_use]
    pub fn defined_in(mut self, section: SectionIndex) -> Self {
        self.shndx = u16::try_from(section.0)
            .ok()
            .filter(|&i| i < section_index::SHN_LORESERVE)
            .unwrap_or(section_index::SHN_XINDEX);
        self
    }

    #[must_use]
    pub fn absolute(mut self) -> Self {
        self.shndx = section_index::SHN_ABS;
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: u64) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_other(mut self, other: u8) -> Self {
        self.other = other;
        self
    }
}

/// Position of `old` once the sorted indices in `removed` are gone.
fn renumbered(removed: &[usize], old: usize) -> usize {
    old - removed.partition_point(|&r| r < old)
}

impl ElfFile {
    /// Run `edit` on a copy of the model and keep the copy only if it succeeds.
    fn transact<R>(&mut self, edit: impl FnOnce(&mut ElfFile) -> ElfResult<R>) -> ElfResult<R> {
        let mut next = self.clone();
        let out = edit(&mut next)?;
        *self = next;
        Ok(out)
    }

    fn editable(&self, index: SectionIndex) -> Result<&Section, LayoutError> {
        let section = self.section_or_err(index)?;
        if index.0 == 0 || section.header.sh_type == SectionType::Null {
            return Err(LayoutError::ReservedSection(index.0));
        }
        Ok(section)
    }

    /// Append `name` to the section name table.
    fn intern_section_name(&mut self, name: &str) -> ElfResult<u32> {
        let table = self.shstrndx;
        if table == 0 {
            return Err(LayoutError::NoSectionNameTable.into());
        }
        self.append_to_strtab(table, name)
    }

    fn append_to_strtab(&mut self, table: usize, text: &str) -> ElfResult<u32> {
        let dedup = self.options.dedup_strings;
        let section = self
            .sections
            .get_mut(table)
            .filter(|s| s.header.is_strtab())
            .ok_or(FormatError::WrongSectionType {
                index: table,
                expected: "string table",
            })?;
        let offset = append_string(&mut section.data, text, dedup)?;
        section.header.sh_size = section.data.len() as u64;
        self.names.borrow_mut().invalidate(table);
        Ok(offset)
    }

    fn store_symbols(&mut self, table: &SymbolTable) -> ElfResult<()> {
        let encoding = self.encoding();
        let section = &mut self.sections[table.section];
        section.data = encode_symbols(table, &section.data, encoding)?;
        section.header.sh_size = section.data.len() as u64;
        section.header.sh_info = table.first_global as u32;
        Ok(())
    }

    /// Decode a symbol table without resolving names.
    fn raw_symbols(&self, index: usize) -> ElfResult<SymbolTable> {
        let section = &self.sections[index];
        Ok(parse_symbols(&section.header, &section.data, index, None, self.encoding())?.value)
    }

    /// Add a section at the end of the section table and of the file layout.
    pub fn add_section(&mut self, section: NewSection) -> ElfResult<SectionIndex> {
        self.transact(|file| {
            if section.section_type == SectionType::Null {
                return Err(LayoutError::Unsupported("adding a NULL section").into());
            }
            let mut snapshot = LayoutSnapshot::capture(file);
            let sh_name = file.intern_section_name(&section.name)?;
            let index = file.sections.len();
            file.sections.push(section.into_section(sh_name));
            snapshot.push_new();
            relayout(file, &snapshot)?;
            Ok(SectionIndex(index))
        })
    }

    /// Remove a section, renumbering every reference to the sections after it.
    ///
    /// Returns the removed indices, as they were before the edit.
    pub fn remove_section(
        &mut self,
        index: SectionIndex,
        mode: Removal,
    ) -> ElfResult<Vec<SectionIndex>> {
        self.transact(|file| {
            file.editable(index)?;
            let removed = match mode {
                Removal::Strict => {
                    file.check_unreferenced(index.0)?;
                    vec![index.0]
                }
                Removal::Cascade => file.dependents(index.0),
            };
            if file.shstrndx != 0 && removed.contains(&file.shstrndx) {
                return Err(LayoutError::DanglingReference {
                    from: Reference::SectionNameTable,
                    target: file.shstrndx as u64,
                }
                .into());
            }

            let mut snapshot = LayoutSnapshot::capture(file);
            let symbol_maps = file.drop_symbols(&removed)?;
            file.remap_relocations(&removed, &symbol_maps)?;
            file.rewrite_groups(&removed, &symbol_maps)?;

            let names: Vec<u32> = removed.iter().map(|&r| file.sections[r].header.sh_name).collect();
            for &r in removed.iter().rev() {
                file.sections.remove(r);
                snapshot.remove(r);
            }
            for section in &mut file.sections {
                let h = &mut section.header;
                if h.link_is_section_index() && h.sh_link != 0 {
                    h.sh_link = renumbered(&removed, h.sh_link as usize) as u32;
                }
                if h.info_is_section_index() && h.sh_info != 0 {
                    h.sh_info = renumbered(&removed, h.sh_info as usize) as u32;
                }
            }
            if file.shstrndx != 0 {
                file.shstrndx = renumbered(&removed, file.shstrndx);
            }
            file.reclaim_section_names(names);
            file.names.borrow_mut().clear();

            relayout(file, &snapshot)?;
            Ok(removed.into_iter().map(SectionIndex).collect())
        })
    }

    /// Fail on the first reference to `target` from another section, symbol or group.
    fn check_unreferenced(&self, target: usize) -> ElfResult<()> {
        let dangling = |from| LayoutError::DanglingReference {
            from,
            target: target as u64,
        };
        for (i, section) in self.sections.iter().enumerate() {
            if i == target {
                continue;
            }
            let h = &section.header;
            if h.link_is_section_index() && h.sh_link as usize == target {
                return Err(dangling(Reference::SectionLink { section: i }).into());
            }
            if h.info_is_section_index() && h.sh_info as usize == target {
                return Err(dangling(Reference::SectionInfo { section: i }).into());
            }
            if h.is_symtab() {
                let table = self.raw_symbols(i)?;
                if let Some(k) = table.symbols.iter().position(|s| s.section() == Some(target)) {
                    return Err(dangling(Reference::Symbol { table: i, symbol: k }).into());
                }
            }
            if h.is_group() {
                let group = Group::parse(&section.data, self.encoding())?;
                if group.members.contains(&(target as u32)) {
                    return Err(dangling(Reference::GroupMember { group: i }).into());
                }
            }
        }
        Ok(())
    }

    /// `target` plus every section linked to a removed one, transitively. Sorted.
    fn dependents(&self, target: usize) -> Vec<usize> {
        let mut removed = vec![target];
        loop {
            let before = removed.len();
            for (i, section) in self.sections.iter().enumerate().skip(1) {
                if removed.contains(&i) {
                    continue;
                }
                let h = &section.header;
                let by_link = h.link_is_section_index()
                    && h.sh_link != 0
                    && removed.contains(&(h.sh_link as usize));
                let by_info = h.info_is_section_index()
                    && h.sh_info != 0
                    && removed.contains(&(h.sh_info as usize));
                if by_link || by_info {
                    removed.push(i);
                }
            }
            if removed.len() == before {
                break;
            }
        }
        removed.sort_unstable();
        removed
    }

    /// Drop symbols defined in removed sections and renumber `st_shndx` in every surviving
    /// symbol table. Returns, per rewritten table, the old-to-new symbol index map.
    fn drop_symbols(&mut self, removed: &[usize]) -> ElfResult<Vec<(usize, Vec<Option<u32>>)>> {
        let mut maps = Vec::new();
        for i in 0..self.sections.len() {
            if removed.contains(&i) || !self.sections[i].header.is_symtab() {
                continue;
            }
            let dynamic = self.sections[i].header.sh_type == SectionType::Dynsym;
            let mut table = self.raw_symbols(i)?;
            let mut map = Vec::with_capacity(table.len());
            let mut kept = Vec::with_capacity(table.len());
            let mut first_global = 0;
            let mut changed = false;
            for (k, mut sym) in std::mem::take(&mut table.symbols).into_iter().enumerate() {
                match sym.section() {
                    Some(s) if removed.contains(&s) => {
                        if dynamic {
                            return Err(LayoutError::DanglingReference {
                                from: Reference::Symbol { table: i, symbol: k },
                                target: s as u64,
                            }
                            .into());
                        }
                        map.push(None);
                        changed = true;
                        continue;
                    }
                    Some(s) => {
                        let new = renumbered(removed, s);
                        changed |= new != s;
                        sym.st_shndx = new as u16;
                    }
                    None => {}
                }
                if k < table.first_global {
                    first_global += 1;
                }
                map.push(Some(kept.len() as u32));
                kept.push(sym);
            }
            if changed {
                table.symbols = kept;
                table.first_global = first_global;
                self.store_symbols(&table)?;
                maps.push((i, map));
            }
        }
        Ok(maps)
    }

    /// Rewrite symbol indices of relocation tables whose symbol table lost entries.
    fn remap_relocations(
        &mut self,
        removed: &[usize],
        symbol_maps: &[(usize, Vec<Option<u32>>)],
    ) -> ElfResult<()> {
        let encoding = self.encoding();
        for i in 0..self.sections.len() {
            let header = &self.sections[i].header;
            if removed.contains(&i) || !header.is_relocation() {
                continue;
            }
            let Some((_, map)) = symbol_maps.iter().find(|(t, _)| *t == header.sh_link as usize)
            else {
                continue;
            };
            let section = &self.sections[i];
            let mut table =
                parse_relocations(&section.header, &section.data, i, None, encoding)?.value;
            for (entry, reloc) in table.entries.iter_mut().enumerate() {
                match map.get(reloc.symbol as usize) {
                    Some(Some(new)) => reloc.symbol = *new,
                    Some(None) => {
                        return Err(LayoutError::DanglingReference {
                            from: Reference::Relocation { table: i, entry },
                            target: u64::from(reloc.symbol),
                        }
                        .into());
                    }
                    None => {}
                }
            }
            let section = &mut self.sections[i];
            section.data = encode_relocations(&table, &section.data, encoding)?;
        }
        Ok(())
    }

    /// Drop removed members from groups, renumber the rest, and remap group signatures.
    fn rewrite_groups(
        &mut self,
        removed: &[usize],
        symbol_maps: &[(usize, Vec<Option<u32>>)],
    ) -> ElfResult<()> {
        let encoding = self.encoding();
        for i in 0..self.sections.len() {
            if removed.contains(&i) || !self.sections[i].header.is_group() {
                continue;
            }
            let link = self.sections[i].header.sh_link as usize;
            if let Some((_, map)) = symbol_maps.iter().find(|(t, _)| *t == link) {
                let signature = self.sections[i].header.sh_info;
                match map.get(signature as usize) {
                    Some(Some(new)) => self.sections[i].header.sh_info = *new,
                    Some(None) => {
                        return Err(LayoutError::DanglingReference {
                            from: Reference::SectionInfo { section: i },
                            target: u64::from(signature),
                        }
                        .into());
                    }
                    None => {}
                }
            }

            let section = &mut self.sections[i];
            let mut group = Group::parse(&section.data, encoding)?;
            let members: Vec<u32> = group
                .members
                .iter()
                .filter(|&&m| !removed.contains(&(m as usize)))
                .map(|&m| renumbered(removed, m as usize) as u32)
                .collect();
            if members != group.members {
                group.members = members;
                section.data = group.encode(encoding, group.encoded_len())?;
                section.header.sh_size = section.data.len() as u64;
            }
        }
        Ok(())
    }

    /// Truncate names of removed sections that sit at the tail of the section name table and
    /// are not shared with any remaining header.
    fn reclaim_section_names(&mut self, mut offsets: Vec<u32>) {
        let table = self.shstrndx;
        if table == 0 {
            return;
        }
        let shared = self
            .sections
            .iter()
            .any(|s| s.header.link_is_section_index() && s.header.sh_link as usize == table);
        if shared {
            return;
        }
        offsets.sort_unstable_by(|a, b| b.cmp(a));
        for offset in offsets {
            let start = offset as usize;
            let data = &self.sections[table].data;
            if start == 0 || start >= data.len() || data[start - 1] != 0 {
                continue;
            }
            let at_tail = data[start..]
                .iter()
                .position(|&b| b == 0)
                .is_some_and(|nul| start + nul + 1 == data.len());
            if !at_tail || self.sections.iter().any(|s| s.header.sh_name >= offset) {
                continue;
            }
            let section = &mut self.sections[table];
            section.data.truncate(start);
            section.header.sh_size = start as u64;
        }
    }

    /// Zero-extend or truncate a section. `NOBITS` sections only change size.
    pub fn resize_section(&mut self, index: SectionIndex, size: u64) -> ElfResult<()> {
        self.transact(|file| {
            file.editable(index)?;
            let snapshot = LayoutSnapshot::capture(file);
            let section = &mut file.sections[index.0];
            if !section.header.is_nobits() {
                let len = usize::try_from(size)
                    .map_err(|_| BoundsError::new("section contents", 0, size, usize::MAX))?;
                if let Some(extra) = len.checked_sub(section.data.len()) {
                    section.data.try_reserve_exact(extra).map_err(|_| {
                        BoundsError::new("section contents", 0, size, section.data.len())
                    })?;
                }
                section.data.resize(len, 0);
            }
            section.header.sh_size = size;
            file.names.borrow_mut().invalidate(index.0);
            relayout(file, &snapshot)?;
            Ok(())
        })
    }

    /// Replace a section's contents.
    pub fn set_section_data(&mut self, index: SectionIndex, data: Vec<u8>) -> ElfResult<()> {
        self.transact(|file| {
            if file.editable(index)?.header.is_nobits() {
                return Err(LayoutError::NoFileContents(index.0).into());
            }
            let snapshot = LayoutSnapshot::capture(file);
            let section = &mut file.sections[index.0];
            section.header.sh_size = data.len() as u64;
            section.data = data;
            file.names.borrow_mut().invalidate(index.0);
            relayout(file, &snapshot)?;
            Ok(())
        })
    }

    pub fn rename_section(&mut self, index: SectionIndex, name: &str) -> ElfResult<()> {
        self.transact(|file| {
            file.editable(index)?;
            let snapshot = LayoutSnapshot::capture(file);
            let sh_name = file.intern_section_name(name)?;
            let header = &mut file.sections[index.0].header;
            header.sh_name = sh_name;
            header.name = name.to_owned();
            relayout(file, &snapshot)?;
            Ok(())
        })
    }

    /// Overwrite bytes inside a section without touching the layout.
    pub fn patch_bytes(&mut self, index: SectionIndex, offset: u64, bytes: &[u8]) -> ElfResult<()> {
        let section = self.editable(index)?;
        if !section.header.has_file_contents() {
            return Err(LayoutError::NoFileContents(index.0).into());
        }
        let available = section.data.len();
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start.checked_add(bytes.len()).is_some_and(|end| end <= available))
            .ok_or_else(|| BoundsError::new("patch", offset, bytes.len() as u64, available))?;
        self.sections[index.0].data[start..start + bytes.len()].copy_from_slice(bytes);
        self.names.borrow_mut().invalidate(index.0);
        self.edited = true;
        Ok(())
    }

    /// Overwrite bytes at a virtual address, through the allocated section holding them.
    pub fn patch_address(&mut self, addr: u64, bytes: &[u8]) -> ElfResult<SectionIndex> {
        let len = bytes.len() as u64;
        let index = self
            .sections
            .iter()
            .position(|s| {
                let h = &s.header;
                h.sh_flags.is_allocated()
                    && h.has_file_contents()
                    && addr >= h.sh_addr
                    && addr
                        .checked_add(len)
                        .is_some_and(|end| end <= h.sh_addr.saturating_add(h.sh_size))
            })
            .ok_or(LayoutError::UnmappedAddress { addr, len })?;
        let offset = addr - self.sections[index].header.sh_addr;
        self.patch_bytes(SectionIndex(index), offset, bytes)?;
        Ok(SectionIndex(index))
    }

    fn symbol_table_for_edit(&self, table: SectionIndex) -> ElfResult<SymbolTable> {
        let section = self.section_or_err(table)?;
        if !section.header.is_symtab() {
            return Err(FormatError::WrongSectionType {
                index: table.0,
                expected: "symbol table",
            }
            .into());
        }
        self.raw_symbols(table.0)
    }

    /// Give a symbol a new name, appended to the table's string table.
    pub fn rename_symbol(
        &mut self,
        table: SectionIndex,
        symbol: SymbolIndex,
        name: &str,
    ) -> ElfResult<()> {
        self.transact(|file| {
            let mut symbols = file.symbol_table_for_edit(table)?;
            if symbol.0 == 0 || symbol.0 >= symbols.len() {
                return Err(LayoutError::NoSuchSymbol {
                    table: table.0,
                    index: symbol.0,
                }
                .into());
            }
            let snapshot = LayoutSnapshot::capture(file);
            let st_name = file.append_to_strtab(symbols.strtab, name)?;
            symbols.symbols[symbol.0].st_name = st_name;
            file.store_symbols(&symbols)?;
            relayout(file, &snapshot)?;
            Ok(())
        })
    }

    /// Add a symbol to a `SHT_SYMTAB` table.
    ///
    /// Local symbols are inserted before the first global one, shifting later symbol indices in
    /// relocation tables and group signatures; other bindings are appended.
    pub fn add_symbol(&mut self, table: SectionIndex, symbol: NewSymbol) -> ElfResult<SymbolIndex> {
        self.transact(|file| {
            let mut symbols = file.symbol_table_for_edit(table)?;
            if file.sections[table.0].header.sh_type == SectionType::Dynsym {
                return Err(LayoutError::Unsupported("adding dynamic symbols").into());
            }
            if symbol.shndx == section_index::SHN_XINDEX {
                return Err(LayoutError::Unsupported("extended symbol section indices").into());
            }
            let snapshot = LayoutSnapshot::capture(file);
            let st_name = file.append_to_strtab(symbols.strtab, &symbol.name)?;
            let entry = Symbol {
                name: symbol.name,
                st_name,
                st_info: Symbol::make_info(symbol.binding, symbol.symbol_type),
                st_other: symbol.other,
                st_shndx: symbol.shndx,
                st_value: symbol.value,
                st_size: symbol.size,
            };

            let position = if symbol.binding == SymbolBinding::Local {
                let position = symbols.first_global.min(symbols.len());
                symbols.symbols.insert(position, entry);
                symbols.first_global = position + 1;
                file.shift_symbol_indices(table.0, position)?;
                position
            } else {
                symbols.symbols.push(entry);
                symbols.len() - 1
            };
            file.store_symbols(&symbols)?;
            relayout(file, &snapshot)?;
            Ok(SymbolIndex(position))
        })
    }

    /// Bump every reference to a symbol of `table` at or past `from`.
    fn shift_symbol_indices(&mut self, table: usize, from: usize) -> ElfResult<()> {
        let encoding = self.encoding();
        for i in 0..self.sections.len() {
            let header = &self.sections[i].header;
            if header.sh_link as usize != table {
                continue;
            }
            if header.is_relocation() {
                let section = &self.sections[i];
                let mut relocations =
                    parse_relocations(&section.header, &section.data, i, None, encoding)?.value;
                for reloc in &mut relocations.entries {
                    if reloc.symbol as usize >= from {
                        reloc.symbol += 1;
                    }
                }
                let section = &mut self.sections[i];
                section.data = encode_relocations(&relocations, &section.data, encoding)?;
            } else if header.is_group() && header.sh_info as usize >= from {
                self.sections[i].header.sh_info += 1;
            }
        }
        Ok(())
    }

    /// Change `e_entry`. With loadable segments present the address must fall inside one.
    pub fn set_entry_point(&mut self, addr: u64) -> ElfResult<()> {
        let mut loads = self.segments.iter().filter(|p| p.is_load()).peekable();
        if loads.peek().is_some() && !loads.any(|p| p.contains_vaddr(addr)) {
            return Err(LayoutError::EntryOutsideSegments { entry: addr }.into());
        }
        self.header.e_entry = addr;
        self.edited = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renumbered() {
        let removed = [3, 5];
        assert_eq!(renumbered(&removed, 1), 1);
        assert_eq!(renumbered(&removed, 4), 3);
        assert_eq!(renumbered(&removed, 7), 5);
    }

    #[test]
    fn test_new_section_into_section() {
        let section = NewSection::new(".note.x", SectionType::Note, vec![1, 2, 3])
            .with_align(4)
            .into_section(9);
        assert_eq!(section.header.sh_name, 9);
        assert_eq!(section.header.sh_size, 3);
        assert_eq!(section.header.sh_addralign, 4);
        assert_eq!(section.data, vec![1, 2, 3]);

        let bss = NewSection::nobits(".bss", 0x100).into_section(1);
        assert!(bss.data.is_empty());
        assert_eq!(bss.header.sh_size, 0x100);
    }

    #[test]
    fn test_new_symbol_section_index() {
        let sym = NewSymbol::new("f", SymbolBinding::Global, SymbolType::Func)
            .defined_in(SectionIndex(2));
        assert_eq!(sym.shndx, 2);
        let far = NewSymbol::new("g", SymbolBinding::Global, SymbolType::Func)
            .defined_in(SectionIndex(0x1_0000));
        assert_eq!(far.shndx, section_index::SHN_XINDEX);
        assert_eq!(far.absolute().shndx, section_index::SHN_ABS);
    }
}
