#![no_main]
use elfkit_core::ElfFile;
use libfuzzer_sys::fuzz_target;

// Anything that parses must serialize back to exactly the input.
fuzz_target!(|data: &[u8]| {
    let Ok(parsed) = ElfFile::parse(data) else {
        return;
    };
    let file = parsed.value;
    let out = file.to_bytes().expect("unedited model must serialize");
    assert_eq!(out, data);

    for index in file.symbol_table_indices() {
        let _ = file.symbol_table(index);
    }
    for index in file.relocation_table_indices() {
        let _ = file.relocation_table(index);
    }
    let _ = file.diagnostics();
});
