//! Integration tests: the `elfkit` binary end to end.
//!
//! Validates:
//! 1. Without edits the output is byte-identical to the input.
//! 2. `--json` writes a model dump; `--silent` suppresses the report.
//! 3. Edits apply and the result parses back.
//! 4. Each error family maps to its exit code and leaves no output file.
//! 5. `--log` records parse/edit/write/error events with artifact digests.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use elfkit_cli::structured_log::{LogEntry, LogLevel, sha256_hex};
use elfkit_core::builder::{string_table_bytes, symbol_table_bytes};
use elfkit_core::{
    ElfBuilder, ElfFile, ElfMachine, ElfType, Encoding, NewSection, ProgramFlags, SectionFlags,
    SectionIndex, SectionType, Symbol, SymbolBinding, SymbolType,
};

const TEXT_ADDR: u64 = 0x40_0000;

fn unique_tmp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after UNIX_EPOCH")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Executable with `.text`, `.data`, `.comment`, `.symtab` and `.strtab`.
fn sample() -> Vec<u8> {
    let encoding = Encoding::ELF64_LSB;
    let (strtab, names) = string_table_bytes(&["main", "buffer"]).expect("string table");
    let symbols = [
        Symbol::null(),
        Symbol {
            name: String::new(),
            st_name: names[0],
            st_info: Symbol::make_info(SymbolBinding::Global, SymbolType::Func),
            st_other: 0,
            st_shndx: 1,
            st_value: TEXT_ADDR,
            st_size: 0x20,
        },
        Symbol {
            name: String::new(),
            st_name: names[1],
            st_info: Symbol::make_info(SymbolBinding::Global, SymbolType::Object),
            st_other: 0,
            st_shndx: 2,
            st_value: TEXT_ADDR + 0x20,
            st_size: 0x10,
        },
    ];

    let mut builder = ElfBuilder::new(encoding, ElfType::Exec, ElfMachine::X86_64);
    let text = builder.section(
        NewSection::new(".text", SectionType::Progbits, vec![0xc3; 0x20])
            .with_flags(SectionFlags::SHF_ALLOC | SectionFlags::SHF_EXECINSTR)
            .with_align(16),
    );
    let data = builder.section(
        NewSection::new(".data", SectionType::Progbits, vec![0; 0x10])
            .with_flags(SectionFlags::SHF_ALLOC | SectionFlags::SHF_WRITE)
            .with_align(8),
    );
    builder.section(NewSection::new(".comment", SectionType::Progbits, b"elfkit\0".to_vec()));
    builder.section(
        NewSection::new(
            ".symtab",
            SectionType::Symtab,
            symbol_table_bytes(encoding, &symbols).expect("symbols"),
        )
        .with_link(SectionIndex(5))
        .with_info(1)
        .with_align(8)
        .with_entsize(Symbol::size(encoding) as u64),
    );
    builder.section(NewSection::new(".strtab", SectionType::Strtab, strtab));
    builder
        .load_segment(text, data, ProgramFlags::PF_R | ProgramFlags::PF_X, TEXT_ADDR, 0x1000)
        .entry(TEXT_ADDR);
    builder.build().expect("build sample")
}

fn write_sample(dir: &Path) -> PathBuf {
    let path = dir.join("sample.elf");
    std::fs::write(&path, sample()).expect("write sample");
    path
}

fn elfkit(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_elfkit"))
        .args(args)
        .env_remove("ELFKIT_MODE")
        .output()
        .expect("elfkit should execute")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 temp path")
}

fn read_log(path: &Path) -> Vec<LogEntry> {
    std::fs::read_to_string(path)
        .expect("read log")
        .lines()
        .map(|line| serde_json::from_str(line).expect("log line is a LogEntry"))
        .collect()
}

#[test]
fn unedited_output_is_identical() {
    let dir = unique_tmp_dir("elfkit-identity");
    let input = write_sample(&dir);

    let output = elfkit(&["-f", path_str(&input)]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ELF Header:"));
    assert!(stdout.contains("Program Headers:"));
    assert!(stdout.contains(".text"));
    assert!(stdout.contains(".strtab"));

    let written = std::fs::read(dir.join("sample.elf_modified")).expect("default output path");
    assert_eq!(written, std::fs::read(&input).unwrap());
}

#[test]
fn json_dump_describes_the_model() {
    let dir = unique_tmp_dir("elfkit-json");
    let input = write_sample(&dir);

    let output = elfkit(&["-f", path_str(&input), "-j", "-s"]);
    assert!(output.status.success());
    assert!(output.stdout.is_empty(), "--silent should suppress the report");

    let text = std::fs::read_to_string(dir.join("sample.elf.json")).expect("json output");
    let dump: serde_json::Value = serde_json::from_str(&text).expect("valid JSON");
    assert_eq!(dump["header"]["e_entry"], TEXT_ADDR);
    assert_eq!(dump["sections"].as_array().unwrap().len(), 7);
    assert_eq!(dump["sections"][1]["name"], ".text");
    assert_eq!(dump["sections"][1]["sha256"], sha256_hex(&[0xc3; 0x20]));
    assert_eq!(dump["symbol_tables"][0]["symbols"][1]["name"], "main");
    assert_eq!(dump["segments"].as_array().unwrap().len(), 1);
    assert!(dump["warnings"].as_array().unwrap().is_empty());
}

#[test]
fn edits_apply_in_order() {
    let dir = unique_tmp_dir("elfkit-edits");
    let input = write_sample(&dir);
    let out = dir.join("edited.elf");
    let blob = dir.join("blob.bin");
    std::fs::write(&blob, [1u8, 2, 3, 4]).unwrap();
    let add = format!(".note.elfkit={}", path_str(&blob));

    let output = elfkit(&[
        "-f",
        path_str(&input),
        "-s",
        "-o",
        path_str(&out),
        "--remove-section",
        ".comment",
        "--rename-section",
        ".data=.mydata",
        "--add-section",
        &add,
        "--rename-symbol",
        "main=start",
        "--patch",
        "0x400004=9090",
        "--set-entry",
        "0x400010",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let bytes = std::fs::read(&out).expect("edited output");
    let file = ElfFile::parse(&bytes).unwrap().value;
    assert_eq!(file.section_by_name(".comment"), None);
    assert!(file.section_by_name(".mydata").is_some());
    let note = file.section_by_name(".note.elfkit").expect("added section");
    assert_eq!(file.sections()[note.0].data, vec![1, 2, 3, 4]);
    assert!(file.find_symbol("start").is_some());
    assert!(file.find_symbol("main").is_none());
    let text = file.section_by_name(".text").unwrap();
    assert_eq!(&file.sections()[text.0].data[4..6], &[0x90, 0x90]);
    assert_eq!(file.header().e_entry, 0x40_0010);
    elfkit_core::layout::verify(&file).unwrap();
}

#[test]
fn cascade_removal_takes_dependents() {
    let dir = unique_tmp_dir("elfkit-cascade");
    let input = write_sample(&dir);
    let out = dir.join("cascaded.elf");

    let strict = elfkit(&[
        "-f",
        path_str(&input),
        "-s",
        "-o",
        path_str(&out),
        "--remove-section",
        ".strtab",
    ]);
    assert_eq!(strict.status.code(), Some(4));
    assert!(!out.exists(), "failed runs must not write output");

    let cascade = elfkit(&[
        "-f",
        path_str(&input),
        "-s",
        "-o",
        path_str(&out),
        "--remove-section",
        ".strtab",
        "--cascade",
    ]);
    assert!(cascade.status.success(), "{}", String::from_utf8_lossy(&cascade.stderr));
    let file = ElfFile::parse(&std::fs::read(&out).unwrap()).unwrap().value;
    assert_eq!(file.section_by_name(".strtab"), None);
    assert_eq!(file.section_by_name(".symtab"), None);
    assert!(file.section_by_name(".text").is_some());
}

#[test]
fn error_families_map_to_exit_codes() {
    let dir = unique_tmp_dir("elfkit-errors");

    let not_elf = dir.join("not_elf");
    std::fs::write(&not_elf, b"MZ\x90\x00 definitely not an ELF file, just some bytes...").unwrap();
    let output = elfkit(&["-f", path_str(&not_elf), "-s"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!dir.join("not_elf_modified").exists());

    let truncated = dir.join("truncated");
    let bytes = sample();
    std::fs::write(&truncated, &bytes[..bytes.len() - 8]).unwrap();
    let output = elfkit(&["-f", path_str(&truncated), "-s"]);
    assert_eq!(output.status.code(), Some(3));

    let input = write_sample(&dir);
    let output = elfkit(&[
        "-f",
        path_str(&input),
        "-s",
        "--resize-section",
        ".data=0xffffffffffffffff",
    ]);
    assert_eq!(output.status.code(), Some(3));
    assert!(!dir.join("sample.elf_modified").exists());

    let output = elfkit(&["-f", path_str(&input), "-s", "--remove-section", ".nope"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains(".nope"));

    let output = elfkit(&["-f", path_str(&dir.join("missing")), "-s"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn log_records_the_run() {
    let dir = unique_tmp_dir("elfkit-log");
    let input = write_sample(&dir);
    let out = dir.join("out.elf");
    let log = dir.join("run.jsonl");

    let output = elfkit(&[
        "-f",
        path_str(&input),
        "-s",
        "-o",
        path_str(&out),
        "--log",
        path_str(&log),
        "--rename-section",
        ".comment=.note",
    ]);
    assert!(output.status.success());

    let entries = read_log(&log);
    let events: Vec<&str> = entries.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(events, ["parse", "edit", "write"]);
    assert!(entries.iter().all(|e| e.trace_id.starts_with("elfkit::")));

    let parse = &entries[0];
    assert_eq!(parse.mode.as_deref(), Some("tolerant"));
    let details = parse.details.as_ref().unwrap();
    assert_eq!(details["sha256"], sha256_hex(&std::fs::read(&input).unwrap()));

    let write = &entries[2];
    assert_eq!(write.exit_code, Some(0));
    assert_eq!(write.artifact_refs.as_ref().unwrap(), &[path_str(&out).to_string()]);
    let details = write.details.as_ref().unwrap();
    assert_eq!(details["sha256"], sha256_hex(&std::fs::read(&out).unwrap()));
    assert_eq!(details["edits"], 1);
}

#[test]
fn failures_are_logged_with_exit_code() {
    let dir = unique_tmp_dir("elfkit-log-error");
    let input = write_sample(&dir);
    let log = dir.join("run.jsonl");

    let output = elfkit(&[
        "-f",
        path_str(&input),
        "-s",
        "--log",
        path_str(&log),
        "--mode",
        "strict",
        "--resize-section",
        ".text=0x3000",
    ]);
    assert_eq!(output.status.code(), Some(4));

    let entries = read_log(&log);
    let last = entries.last().unwrap();
    assert_eq!(last.event, "error");
    assert_eq!(last.level, LogLevel::Error);
    assert_eq!(last.exit_code, Some(4));
    assert_eq!(last.mode.as_deref(), Some("strict"));
    assert_eq!(last.details.as_ref().unwrap()["kind"], "layout");
}
