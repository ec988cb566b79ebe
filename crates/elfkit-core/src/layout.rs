//! Layout planning and verification.
//!
//! After a structural edit the model holds correct sizes but stale offsets. [`relayout`]
//! recomputes section offsets, segment ranges, the section header table position and the
//! header's section counts, zero-fills vacated bytes in the image, and then runs [`verify`].
//!
//! Placement walks sections in their old file order with a cursor. A section keeps its old
//! offset whenever it still fits; otherwise it moves forward, congruent to its old offset
//! modulo the alignment of every segment containing it, so addresses stay valid. All members
//! of a segment must move by the same amount or the edit is rejected with
//! [`LayoutError::SegmentSplit`].

use crate::cursor::align_up;
use crate::error::{LayoutError, Reference, Region};
use crate::file::ElfFile;
use crate::header::FileHeader;
use crate::section::{Group, SectionHeader, section_index};
use crate::symbol::parse_symbols;

/// A file range occupied by a section before an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub offset: u64,
    pub size: u64,
}

impl Placement {
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/// File placements recorded before an edit, kept index-aligned with the section list.
#[derive(Debug, Clone)]
pub struct LayoutSnapshot {
    /// Old placement per current section; `None` for sections added by the edit.
    live: Vec<Option<Placement>>,
    removed: Vec<Placement>,
    section_headers: Placement,
}

impl LayoutSnapshot {
    pub fn capture(file: &ElfFile) -> Self {
        let live = file
            .sections
            .iter()
            .map(|s| {
                Some(Placement {
                    offset: s.header.sh_offset,
                    size: s.header.file_size(),
                })
            })
            .collect();
        Self {
            live,
            removed: Vec::new(),
            section_headers: section_header_table(file),
        }
    }

    /// Mirror the removal of section `index`.
    pub fn remove(&mut self, index: usize) {
        if index < self.live.len() {
            if let Some(old) = self.live.remove(index) {
                self.removed.push(old);
            }
        }
    }

    /// Mirror a section appended to the end of the table.
    pub fn push_new(&mut self) {
        self.live.push(None);
    }

    fn old(&self, index: usize) -> Option<Placement> {
        self.live.get(index).copied().flatten()
    }
}

fn section_header_table(file: &ElfFile) -> Placement {
    let count = file.sections.len() as u64;
    Placement {
        offset: file.header.e_shoff,
        size: if count == 0 {
            0
        } else {
            count * u64::from(file.header.e_shentsize)
        },
    }
}

/// Smallest offset `>= cursor` that is congruent to `target` modulo `modulus`.
pub fn congruent_after(cursor: u64, target: u64, modulus: u64) -> u64 {
    if modulus <= 1 {
        return cursor;
    }
    let base = cursor - cursor % modulus + target % modulus;
    if base >= cursor { base } else { base + modulus }
}

fn shift(offset: u64, delta: i128) -> Option<u64> {
    u64::try_from(i128::from(offset) + delta).ok()
}

/// Ranges that never move: the file header and the program header table.
fn fixed_regions(header: &FileHeader) -> Vec<(u64, u64)> {
    let mut regions = vec![(0, FileHeader::size(header.encoding) as u64)];
    if header.e_phnum > 0 {
        let len = u64::from(header.e_phnum) * u64::from(header.e_phentsize);
        regions.push((header.e_phoff, header.e_phoff.saturating_add(len)));
    }
    regions
}

fn clear_of(regions: &[(u64, u64)], offset: u64, size: u64) -> bool {
    let end = offset.saturating_add(size);
    regions.iter().all(|&(start, stop)| end <= start || offset >= stop)
}

/// Next offset past `cursor` for a section of `size` bytes, stepping over fixed regions.
fn place_after(
    cursor: u64,
    size: u64,
    regions: &[(u64, u64)],
    next: impl Fn(u64) -> u64,
) -> u64 {
    let mut offset = next(cursor);
    while let Some(&(_, stop)) = regions
        .iter()
        .find(|&&(start, stop)| offset < stop && start < offset.saturating_add(size))
    {
        offset = next(stop);
    }
    offset
}

/// Recompute the layout after an edit, then check every postcondition.
pub fn relayout(file: &mut ElfFile, snapshot: &LayoutSnapshot) -> Result<(), LayoutError> {
    sync_section_counts(file);
    let moved = place_sections(file, snapshot);
    update_segments(file, snapshot)?;
    vacate(file, snapshot, &moved);
    place_section_headers(file);
    file.edited = true;
    verify(file)
}

/// Assign offsets; returns the indices of sections whose offset changed.
fn place_sections(file: &mut ElfFile, snapshot: &LayoutSnapshot) -> Vec<usize> {
    let regions = fixed_regions(&file.header);
    let count = file.sections.len();

    // Segments each section belonged to before the edit.
    let mut segments_of: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (i, members) in segments_of.iter_mut().enumerate().skip(1) {
        let Some(old) = snapshot.old(i) else { continue };
        for (s, seg) in file.segments.iter().enumerate() {
            if seg.covers_file_range(old.offset, old.size) {
                members.push(s);
            }
        }
    }

    let is_null = |h: &SectionHeader| matches!(h.sh_type, crate::section::SectionType::Null);
    let mut order: Vec<usize> = (1..count)
        .filter(|&i| snapshot.old(i).is_some() && !is_null(&file.sections[i].header))
        .collect();
    order.sort_by_key(|&i| (snapshot.old(i).map_or(0, |p| p.offset), i));
    order.extend((1..count).filter(|&i| snapshot.old(i).is_none()));

    let mut deltas: Vec<Option<i128>> = vec![None; file.segments.len()];
    let mut moved = Vec::new();
    let mut cursor = 0u64;
    for i in order {
        let header = &file.sections[i].header;
        let size = header.file_size();
        let align = header.alignment();
        let offset = match snapshot.old(i) {
            Some(old) => {
                let shifted = segments_of[i]
                    .iter()
                    .find_map(|&s| deltas[s])
                    .and_then(|d| shift(old.offset, d));
                if size == 0 {
                    shifted.unwrap_or(old.offset)
                } else {
                    let fits = |off: u64| {
                        off >= cursor && off % align == 0 && clear_of(&regions, off, size)
                    };
                    match shifted.filter(|&off| fits(off)) {
                        Some(off) => off,
                        None if fits(old.offset) => old.offset,
                        None => {
                            let modulus = segments_of[i]
                                .iter()
                                .map(|&s| file.segments[s].p_align)
                                .fold(align, u64::max);
                            place_after(cursor, size, &regions, |c| {
                                congruent_after(c, old.offset, modulus)
                            })
                        }
                    }
                }
            }
            None if size == 0 => align_up(cursor, align),
            None => place_after(cursor, size, &regions, |c| align_up(c, align)),
        };

        if let Some(old) = snapshot.old(i) {
            if offset != old.offset {
                moved.push(i);
            }
            if size > 0 {
                for &s in &segments_of[i] {
                    deltas[s].get_or_insert(i128::from(offset) - i128::from(old.offset));
                }
            }
        }
        if size > 0 {
            cursor = cursor.max(offset + size);
        }
        file.sections[i].header.sh_offset = offset;
    }
    moved
}

/// Move and resize every segment with its member sections.
fn update_segments(file: &mut ElfFile, snapshot: &LayoutSnapshot) -> Result<(), LayoutError> {
    for (s, seg) in file.segments.iter_mut().enumerate() {
        let members: Vec<usize> = (1..file.sections.len())
            .filter(|&i| {
                snapshot
                    .old(i)
                    .is_some_and(|old| old.size > 0 && seg.covers_file_range(old.offset, old.size))
            })
            .collect();
        let Some(&first) = members
            .iter()
            .min_by_key(|&&i| snapshot.old(i).map_or(0, |p| p.offset))
        else {
            continue;
        };

        let mut delta: Option<i128> = None;
        for &i in &members {
            let old = snapshot.old(i).map_or(0, |p| p.offset);
            let d = i128::from(file.sections[i].header.sh_offset) - i128::from(old);
            match delta {
                Some(expected) if expected != d => {
                    return Err(LayoutError::SegmentSplit { segment: s, section: i });
                }
                _ => delta = Some(d),
            }
        }
        let delta = delta.unwrap_or(0);
        let first_old = snapshot.old(first).map_or(0, |p| p.offset);
        if delta != 0 && seg.p_offset != first_old {
            return Err(LayoutError::SegmentSplit { segment: s, section: first });
        }

        let old_start = seg.p_offset;
        let old_end = seg.file_end();
        let new_start = shift(old_start, delta).ok_or(LayoutError::SegmentInvariant { segment: s })?;

        let removed_end = snapshot
            .removed
            .iter()
            .filter(|p| p.size > 0 && seg.covers_file_range(p.offset, p.size))
            .map(Placement::end)
            .max()
            .unwrap_or(0);
        let (last, last_old_end) = members
            .iter()
            .map(|&i| (i, snapshot.old(i).map_or(0, |p| p.end())))
            .max_by_key(|&(_, end)| end)
            .unwrap_or((first, 0));
        let new_member_end = |i: usize| {
            let h = &file.sections[i].header;
            h.sh_offset + h.file_size()
        };
        let new_end = if old_end == last_old_end.max(removed_end) {
            members.iter().map(|&i| new_member_end(i)).max().unwrap_or(new_start)
        } else {
            let growth = i128::from(new_member_end(last)) - i128::from(last_old_end);
            shift(old_end, growth).ok_or(LayoutError::SegmentInvariant { segment: s })?
        };

        let new_filesz = new_end
            .checked_sub(new_start)
            .ok_or(LayoutError::SegmentInvariant { segment: s })?;
        if new_filesz > seg.p_filesz {
            let old_file_vend = seg.p_vaddr.saturating_add(seg.p_filesz);
            let new_file_vend = seg.p_vaddr.saturating_add(new_filesz);
            let covered = file.sections.iter().position(|section| {
                let h = &section.header;
                h.is_nobits()
                    && h.sh_size > 0
                    && h.sh_flags.is_allocated()
                    && !h.sh_flags.is_tls()
                    && seg.contains_vaddr(h.sh_addr)
                    && h.sh_addr >= old_file_vend
                    && h.sh_addr < new_file_vend
            });
            if let Some(section) = covered {
                return Err(LayoutError::SegmentSplit { segment: s, section });
            }
        }
        // The zero-filled tail keeps its addresses when the file image shrinks.
        if new_filesz >= seg.p_filesz || seg.p_memsz <= seg.p_filesz {
            let memsz =
                i128::from(seg.p_memsz) + i128::from(new_filesz) - i128::from(seg.p_filesz);
            seg.p_memsz = u64::try_from(memsz.max(0)).unwrap_or(u64::MAX).max(new_filesz);
        }
        seg.p_filesz = new_filesz;
        seg.p_offset = new_start;
    }
    Ok(())
}

/// Zero-fill the ranges that moved, shrank or were removed, and the old section header table.
fn vacate(file: &mut ElfFile, snapshot: &LayoutSnapshot, moved: &[usize]) {
    let mut ranges: Vec<Placement> = snapshot.removed.clone();
    for (i, section) in file.sections.iter().enumerate() {
        let Some(old) = snapshot.old(i) else { continue };
        if moved.contains(&i) {
            ranges.push(old);
        } else if section.header.file_size() < old.size {
            ranges.push(Placement {
                offset: old.offset + section.header.file_size(),
                size: old.size - section.header.file_size(),
            });
        }
    }
    ranges.push(snapshot.section_headers);
    ranges.sort_by_key(|p| std::cmp::Reverse(p.offset));
    for range in ranges {
        file.image.vacate(range.offset, range.size);
    }
}

/// Keep `e_shnum`/`e_shstrndx` in step with the section list, using section 0 for values that
/// do not fit the header fields.
fn sync_section_counts(file: &mut ElfFile) {
    let count = file.sections.len();
    let header = &mut file.header;
    if count == 0 {
        header.e_shoff = 0;
        header.e_shnum = 0;
        header.e_shstrndx = 0;
        return;
    }
    if header.e_shentsize == 0 {
        header.e_shentsize = SectionHeader::size(header.encoding) as u16;
    }

    let was_extended = header.e_shnum == 0;
    let zero = &mut file.sections[0].header;
    if count >= usize::from(section_index::SHN_LORESERVE) {
        header.e_shnum = 0;
        zero.sh_size = count as u64;
    } else {
        if was_extended {
            zero.sh_size = 0;
        }
        header.e_shnum = count as u16;
    }

    let shstrndx = file.shstrndx;
    if shstrndx >= usize::from(section_index::SHN_LORESERVE) {
        header.e_shstrndx = section_index::SHN_XINDEX;
        zero.sh_link = shstrndx as u32;
    } else {
        if header.e_shstrndx == section_index::SHN_XINDEX {
            zero.sh_link = 0;
        }
        header.e_shstrndx = shstrndx as u16;
    }
}

/// Put the section header table right after the last byte of data, aligned to the word size.
fn place_section_headers(file: &mut ElfFile) {
    if file.sections.is_empty() {
        file.header.e_shoff = 0;
        return;
    }
    let data_end = file
        .sections
        .iter()
        .map(|s| s.header.file_end())
        .chain(fixed_regions(&file.header).into_iter().map(|(_, end)| end))
        .max()
        .unwrap_or(0);
    file.header.e_shoff = align_up(data_end, file.encoding().word_size() as u64);
}

/// Check every layout invariant of `file`: alignment, non-overlap of file regions, segment
/// invariants, cross references and the entry point.
pub fn verify(file: &ElfFile) -> Result<(), LayoutError> {
    for (i, section) in file.sections.iter().enumerate().skip(1) {
        let h = &section.header;
        if h.file_size() > 0 && h.sh_offset % h.alignment() != 0 {
            return Err(LayoutError::Misaligned {
                index: i,
                offset: h.sh_offset,
                align: h.sh_addralign,
            });
        }
    }

    check_overlap(file)?;

    for (s, seg) in file.segments.iter().enumerate() {
        if !seg.is_consistent() {
            return Err(LayoutError::SegmentInvariant { segment: s });
        }
    }

    check_references(file)?;

    let entry = file.header.e_entry;
    let mut loads = file.segments.iter().filter(|p| p.is_load()).peekable();
    if entry != 0 && loads.peek().is_some() && !loads.any(|p| p.contains_vaddr(entry)) {
        return Err(LayoutError::EntryOutsideSegments { entry });
    }
    Ok(())
}

fn check_overlap(file: &ElfFile) -> Result<(), LayoutError> {
    let header = &file.header;
    let mut regions: Vec<(u64, u64, Region)> =
        vec![(0, FileHeader::size(header.encoding) as u64, Region::FileHeader)];
    if let Some(&(start, end)) = fixed_regions(header).get(1) {
        regions.push((start, end, Region::ProgramHeaders));
    }
    let table = section_header_table(file);
    if table.size > 0 {
        regions.push((table.offset, table.end(), Region::SectionHeaders));
    }
    for (i, section) in file.sections.iter().enumerate() {
        if section.header.file_size() > 0 {
            regions.push((section.header.sh_offset, section.header.file_end(), Region::Section(i)));
        }
    }
    regions.sort_by_key(|&(start, end, _)| (start, end));

    let mut reach: Option<(u64, Region)> = None;
    for (start, end, region) in regions {
        if let Some((stop, previous)) = reach {
            if start < stop {
                return Err(LayoutError::Overlap {
                    first: previous,
                    second: region,
                });
            }
        }
        if reach.is_none_or(|(stop, _)| end > stop) {
            reach = Some((end, region));
        }
    }
    Ok(())
}

fn check_references(file: &ElfFile) -> Result<(), LayoutError> {
    let count = file.sections.len();
    let dangling = |from: Reference, target: u64| LayoutError::DanglingReference { from, target };

    if file.shstrndx != 0 && file.shstrndx >= count {
        return Err(dangling(Reference::SectionNameTable, file.shstrndx as u64));
    }
    for (i, section) in file.sections.iter().enumerate() {
        let h = &section.header;
        if h.link_is_section_index() && h.sh_link as usize >= count {
            return Err(dangling(Reference::SectionLink { section: i }, u64::from(h.sh_link)));
        }
        if h.info_is_section_index() && h.sh_info as usize >= count {
            return Err(dangling(Reference::SectionInfo { section: i }, u64::from(h.sh_info)));
        }
        if h.is_symtab() {
            let Ok(table) = parse_symbols(h, &section.data, i, None, file.encoding()) else {
                continue;
            };
            for (k, sym) in table.value.symbols.iter().enumerate() {
                if let Some(target) = sym.section().filter(|&t| t >= count) {
                    return Err(dangling(Reference::Symbol { table: i, symbol: k }, target as u64));
                }
            }
        }
        if h.is_group() {
            let Ok(group) = Group::parse(&section.data, file.encoding()) else {
                continue;
            };
            if let Some(&bad) = group.members.iter().find(|&&m| m == 0 || m as usize >= count) {
                return Err(dangling(Reference::GroupMember { group: i }, u64::from(bad)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_congruent_after() {
        assert_eq!(congruent_after(0x1234, 0x2010, 0x1000), 0x2010);
        assert_eq!(congruent_after(0x2011, 0x2010, 0x1000), 0x3010);
        assert_eq!(congruent_after(0x2010, 0x2010, 0x1000), 0x2010);
        assert_eq!(congruent_after(17, 3, 1), 17);
    }

    #[test]
    fn test_place_after_skips_fixed_regions() {
        let regions = [(0, 64), (64, 120)];
        assert_eq!(place_after(0, 8, &regions, |c| align_up(c, 8)), 120);
        assert_eq!(place_after(100, 8, &regions, |c| align_up(c, 16)), 128);
        assert_eq!(place_after(130, 8, &regions, |c| c), 130);
    }

    #[test]
    fn test_clear_of() {
        let regions = [(0, 64)];
        assert!(clear_of(&regions, 64, 10));
        assert!(!clear_of(&regions, 60, 10));
        assert!(clear_of(&[], 0, 10));
    }

    #[test]
    fn test_shift() {
        assert_eq!(shift(0x1000, -0x800), Some(0x800));
        assert_eq!(shift(0x10, -0x20), None);
    }
}
