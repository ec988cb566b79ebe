#![no_main]
use elfkit_core::{ElfFile, NewSection, Removal, SectionIndex, SectionType};
use libfuzzer_sys::fuzz_target;

// Input: 2 control bytes, then an ELF image. Edits either fail cleanly or leave a file that
// parses again.
fuzz_target!(|data: &[u8]| {
    let [op, arg, image @ ..] = data else {
        return;
    };
    let Ok(parsed) = ElfFile::parse(image) else {
        return;
    };
    let mut file = parsed.value;
    let before = file.clone().to_bytes();
    let count = file.sections().len().max(1);
    let index = SectionIndex(usize::from(*arg) % count);

    let edited = match op % 5 {
        0 => file
            .add_section(NewSection::new(".fuzz", SectionType::Progbits, vec![*arg; 8]))
            .map(|_| ()),
        1 => file.remove_section(index, Removal::Strict).map(|_| ()),
        2 => file.remove_section(index, Removal::Cascade).map(|_| ()),
        3 => file.resize_section(index, u64::from(*arg) * 8),
        _ => file.rename_section(index, ".fuzz.renamed"),
    };

    let Ok(bytes) = file.to_bytes() else {
        return;
    };
    if edited.is_err() {
        // Failed edits leave the model untouched.
        assert_eq!(Some(&bytes), before.as_ref().ok());
        return;
    }
    ElfFile::parse(&bytes).expect("edited output must parse");
});
