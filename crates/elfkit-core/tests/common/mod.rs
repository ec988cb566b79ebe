//! Synthetic ELF fixtures shared by the integration tests.

#![allow(dead_code)]

use elfkit_core::builder::{relocation_table_bytes, string_table_bytes, symbol_table_bytes};
use elfkit_core::section::Group;
use elfkit_core::{
    ElfBuilder, ElfFile, ElfMachine, ElfType, Encoding, NewSection, ProgramFlags, Relocation,
    SectionFlags, SectionIndex, SectionType, Symbol, SymbolBinding, SymbolType,
};

pub const ENCODINGS: [Encoding; 4] = [
    Encoding::ELF32_LSB,
    Encoding::ELF32_MSB,
    Encoding::ELF64_LSB,
    Encoding::ELF64_MSB,
];

pub const TEXT: SectionIndex = SectionIndex(1);
pub const RODATA: SectionIndex = SectionIndex(2);
pub const DATA: SectionIndex = SectionIndex(3);
pub const BSS: SectionIndex = SectionIndex(4);
pub const COMMENT: SectionIndex = SectionIndex(5);
pub const SYMTAB: SectionIndex = SectionIndex(6);
pub const STRTAB: SectionIndex = SectionIndex(7);
pub const RELA_TEXT: SectionIndex = SectionIndex(8);
pub const SHSTRTAB: SectionIndex = SectionIndex(9);

pub const TEXT_ADDR: u64 = 0x10000;
pub const DATA_ADDR: u64 = 0x20000;

/// Symbol indices in the fixture's `.symtab`.
pub const SYM_TEXT_SECTION: usize = 1;
pub const SYM_COUNTER: usize = 2;
pub const SYM_MAIN: usize = 3;
pub const SYM_PUTS: usize = 4;

fn symbol(st_name: u32, binding: SymbolBinding, kind: SymbolType, shndx: u16, value: u64) -> Symbol {
    Symbol {
        name: String::new(),
        st_name,
        st_info: Symbol::make_info(binding, kind),
        st_other: 0,
        st_shndx: shndx,
        st_value: value,
        st_size: 0,
    }
}

fn alloc(flags: u64) -> u64 {
    SectionFlags::SHF_ALLOC | flags
}

/// A small executable: two load segments, a symbol table and a RELA table for `.text`.
pub fn sample(encoding: Encoding) -> Vec<u8> {
    let (strtab, names) = string_table_bytes(&["counter", "main", "puts"]).unwrap();
    let symbols = [
        Symbol::null(),
        symbol(0, SymbolBinding::Local, SymbolType::Section, 1, TEXT_ADDR),
        symbol(names[0], SymbolBinding::Local, SymbolType::Object, 3, DATA_ADDR),
        symbol(names[1], SymbolBinding::Global, SymbolType::Func, 1, TEXT_ADDR),
        symbol(names[2], SymbolBinding::Global, SymbolType::Func, 0, 0),
    ];
    let relocations = [
        Relocation {
            offset: TEXT_ADDR + 1,
            symbol: SYM_PUTS as u32,
            kind: 4,
            addend: Some(-4),
        },
        Relocation {
            offset: TEXT_ADDR + 8,
            symbol: SYM_TEXT_SECTION as u32,
            kind: 2,
            addend: Some(0x10),
        },
    ];
    let word = encoding.word_size() as u64;

    let mut builder = ElfBuilder::new(encoding, ElfType::Exec, ElfMachine::X86_64);
    let text = builder.section(
        NewSection::new(".text", SectionType::Progbits, vec![0x90; 0x40])
            .with_flags(alloc(SectionFlags::SHF_EXECINSTR))
            .with_align(16),
    );
    let rodata = builder.section(
        NewSection::new(".rodata", SectionType::Progbits, b"hello, world!\0\0\0".to_vec())
            .with_flags(alloc(0))
            .with_align(8),
    );
    let data = builder.section(
        NewSection::new(".data", SectionType::Progbits, vec![0x11; 0x10])
            .with_flags(alloc(SectionFlags::SHF_WRITE))
            .with_align(8),
    );
    let bss = builder.section(
        NewSection::nobits(".bss", 0x100)
            .with_flags(alloc(SectionFlags::SHF_WRITE))
            .with_align(8),
    );
    builder.section(
        NewSection::new(".comment", SectionType::Progbits, b"GCC: (elfkit) 1.0\0".to_vec())
            .with_flags(SectionFlags::SHF_MERGE | SectionFlags::SHF_STRINGS)
            .with_entsize(1),
    );
    builder.section(
        NewSection::new(".symtab", SectionType::Symtab, symbol_table_bytes(encoding, &symbols).unwrap())
            .with_link(STRTAB)
            .with_info(SYM_MAIN as u32)
            .with_align(word)
            .with_entsize(Symbol::size(encoding) as u64),
    );
    builder.section(NewSection::new(".strtab", SectionType::Strtab, strtab));
    builder.section(
        NewSection::new(
            ".rela.text",
            SectionType::Rela,
            relocation_table_bytes(encoding, true, &relocations).unwrap(),
        )
        .with_flags(SectionFlags::SHF_INFO_LINK)
        .with_link(SYMTAB)
        .with_info(TEXT.0 as u32)
        .with_align(word)
        .with_entsize(Relocation::size(encoding, true) as u64),
    );
    builder
        .load_segment(text, rodata, ProgramFlags::PF_R | ProgramFlags::PF_X, TEXT_ADDR, 0x1000)
        .load_segment(data, bss, ProgramFlags::PF_R | ProgramFlags::PF_W, DATA_ADDR, 0x1000)
        .entry(TEXT_ADDR);
    builder.build().unwrap()
}

/// A relocatable object whose `.rela.text` applies to section 3, so removing section 1 shifts
/// its target to 2.
pub fn object_with_leading_notes(encoding: Encoding) -> Vec<u8> {
    let (strtab, names) = string_table_bytes(&["f"]).unwrap();
    let symbols = [
        Symbol::null(),
        symbol(names[0], SymbolBinding::Global, SymbolType::Func, 3, 0),
    ];
    let relocations = [Relocation {
        offset: 4,
        symbol: 1,
        kind: 2,
        addend: Some(-4),
    }];
    let word = encoding.word_size() as u64;

    let mut builder = ElfBuilder::new(encoding, ElfType::Rel, ElfMachine::X86_64);
    builder.section(NewSection::new(".comment", SectionType::Progbits, b"x\0".to_vec()));
    builder.section(
        NewSection::new(".note.first", SectionType::Note, vec![0; 16]).with_align(4),
    );
    builder.section(
        NewSection::new(".text", SectionType::Progbits, vec![0xc3; 12])
            .with_flags(alloc(SectionFlags::SHF_EXECINSTR))
            .with_align(16),
    );
    builder.section(
        NewSection::new(".symtab", SectionType::Symtab, symbol_table_bytes(encoding, &symbols).unwrap())
            .with_link(SectionIndex(5))
            .with_info(1)
            .with_align(word)
            .with_entsize(Symbol::size(encoding) as u64),
    );
    builder.section(NewSection::new(".strtab", SectionType::Strtab, strtab));
    builder.section(
        NewSection::new(
            ".rela.text",
            SectionType::Rela,
            relocation_table_bytes(encoding, true, &relocations).unwrap(),
        )
        .with_flags(SectionFlags::SHF_INFO_LINK)
        .with_link(SectionIndex(4))
        .with_info(3)
        .with_align(word)
        .with_entsize(Relocation::size(encoding, true) as u64),
    );
    builder.build().unwrap()
}

pub fn parse(bytes: &[u8]) -> ElfFile {
    let parsed = ElfFile::parse(bytes).unwrap();
    assert!(parsed.warnings.is_empty(), "unexpected warnings: {:?}", parsed.warnings);
    parsed.value
}

/// Every section with file contents is aligned and no two overlap.
pub fn assert_sane_layout(bytes: &[u8]) {
    let file = ElfFile::parse(bytes).unwrap().value;
    let mut ranges = Vec::new();
    for (i, section) in file.sections().iter().enumerate().skip(1) {
        let h = &section.header;
        if h.file_size() == 0 {
            continue;
        }
        assert_eq!(h.sh_offset % h.alignment(), 0, "section {i} misaligned");
        ranges.push((h.sh_offset, h.file_end(), i));
    }
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "sections {} and {} overlap", pair[0].2, pair[1].2);
    }
    elfkit_core::layout::verify(&file).unwrap();
}

/// A relocatable object with a COMDAT group holding `.text.f`, whose signature symbol sits
/// after a local defined in `.data`.
pub fn object_with_group(encoding: Encoding) -> Vec<u8> {
    let (strtab, names) = string_table_bytes(&["d", "f"]).unwrap();
    let symbols = [
        Symbol::null(),
        symbol(names[0], SymbolBinding::Local, SymbolType::Object, 3, 0),
        symbol(names[1], SymbolBinding::Global, SymbolType::Func, 4, 0),
    ];
    let group = Group {
        flags: Group::COMDAT,
        members: vec![4],
    };
    let word = encoding.word_size() as u64;

    let mut builder = ElfBuilder::new(encoding, ElfType::Rel, ElfMachine::X86_64);
    builder.section(NewSection::new(".comment", SectionType::Progbits, b"x\0".to_vec()));
    builder.section(
        NewSection::new(
            ".group",
            SectionType::Group,
            group.encode(encoding, group.encoded_len()).unwrap(),
        )
        .with_link(SectionIndex(5))
        .with_info(2)
        .with_align(4)
        .with_entsize(4),
    );
    builder.section(
        NewSection::new(".data", SectionType::Progbits, vec![0x22; 8])
            .with_flags(alloc(SectionFlags::SHF_WRITE))
            .with_align(8),
    );
    builder.section(
        NewSection::new(".text.f", SectionType::Progbits, vec![0xc3; 4])
            .with_flags(alloc(SectionFlags::SHF_EXECINSTR | SectionFlags::SHF_GROUP))
            .with_align(16),
    );
    builder.section(
        NewSection::new(".symtab", SectionType::Symtab, symbol_table_bytes(encoding, &symbols).unwrap())
            .with_link(SectionIndex(6))
            .with_info(2)
            .with_align(word)
            .with_entsize(Symbol::size(encoding) as u64),
    );
    builder.section(NewSection::new(".strtab", SectionType::Strtab, strtab));
    builder.build().unwrap()
}

/// A shared object whose `.dynsym` exports `f` from `.text`.
pub fn object_with_dynsym(encoding: Encoding) -> Vec<u8> {
    let (dynstr, names) = string_table_bytes(&["f"]).unwrap();
    let symbols = [
        Symbol::null(),
        symbol(names[0], SymbolBinding::Global, SymbolType::Func, 1, 0),
    ];
    let word = encoding.word_size() as u64;

    let mut builder = ElfBuilder::new(encoding, ElfType::Dyn, ElfMachine::X86_64);
    builder.section(
        NewSection::new(".text", SectionType::Progbits, vec![0xc3; 8])
            .with_flags(alloc(SectionFlags::SHF_EXECINSTR))
            .with_align(16),
    );
    builder.section(
        NewSection::new(".dynsym", SectionType::Dynsym, symbol_table_bytes(encoding, &symbols).unwrap())
            .with_flags(alloc(0))
            .with_link(SectionIndex(3))
            .with_info(1)
            .with_align(word)
            .with_entsize(Symbol::size(encoding) as u64),
    );
    builder.section(
        NewSection::new(".dynstr", SectionType::Strtab, dynstr).with_flags(alloc(0)),
    );
    builder.build().unwrap()
}
