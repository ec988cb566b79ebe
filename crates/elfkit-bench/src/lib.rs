//! Synthetic inputs shared by the elfkit benchmarks.

use elfkit_core::builder::{string_table_bytes, symbol_table_bytes};
use elfkit_core::{
    ElfBuilder, ElfMachine, ElfResult, ElfType, Encoding, NewSection, ProgramFlags, SectionFlags,
    SectionIndex, SectionType, Symbol, SymbolBinding, SymbolType,
};

pub const TEXT_ADDR: u64 = 0x40_0000;

/// A relocatable-style file with `count` small code sections, a symbol per section and one
/// load segment covering the first section.
pub fn synthetic(encoding: Encoding, count: usize) -> ElfResult<Vec<u8>> {
    let names: Vec<String> = (0..count).map(|i| format!("fn_{i}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (strtab, offsets) = string_table_bytes(&name_refs)?;

    let mut symbols = vec![Symbol::null()];
    for (i, &st_name) in offsets.iter().enumerate() {
        symbols.push(Symbol {
            name: String::new(),
            st_name,
            st_info: Symbol::make_info(SymbolBinding::Global, SymbolType::Func),
            st_other: 0,
            st_shndx: u16::try_from(i + 1).unwrap_or(0),
            st_value: 0,
            st_size: 16,
        });
    }

    let mut builder = ElfBuilder::new(encoding, ElfType::Exec, ElfMachine::X86_64);
    let mut first = None;
    for i in 0..count {
        let index = builder.section(
            NewSection::new(format!(".text.fn_{i}"), SectionType::Progbits, vec![0x90; 16])
                .with_flags(SectionFlags::SHF_ALLOC | SectionFlags::SHF_EXECINSTR)
                .with_align(16),
        );
        first.get_or_insert(index);
    }
    let strtab_index = SectionIndex(count + 2);
    builder.section(
        NewSection::new(".symtab", SectionType::Symtab, symbol_table_bytes(encoding, &symbols)?)
            .with_link(strtab_index)
            .with_info(1)
            .with_align(encoding.word_size() as u64)
            .with_entsize(Symbol::size(encoding) as u64),
    );
    builder.section(NewSection::new(".strtab", SectionType::Strtab, strtab));
    if let Some(first) = first {
        builder
            .load_segment(first, first, ProgramFlags::PF_R | ProgramFlags::PF_X, TEXT_ADDR, 0x1000)
            .entry(TEXT_ADDR);
    }
    builder.build()
}
