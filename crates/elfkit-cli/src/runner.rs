//! One tool invocation: parse, apply the requested edits, report, write.
//!
//! Edits always apply in the same order regardless of how the arguments were given: section
//! removals, section renames, resizes, added sections, symbol renames, address patches, and
//! finally the entry point. Output is written to a temporary file next to the destination and
//! renamed into place, so a failed run never leaves a partial file behind.

use std::fs::{self, Permissions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use elfkit_core::{ElfFile, NewSection, Options, Removal, SectionIndex, SectionType};
use serde_json::json;

use crate::error::CliError;
use crate::report::{self, FileReport};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, sha256_hex};

/// Edits requested on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditPlan {
    pub remove_sections: Vec<String>,
    /// Remove dependent sections and symbols too, instead of refusing.
    pub cascade: bool,
    pub rename_sections: Vec<(String, String)>,
    pub resize_sections: Vec<(String, u64)>,
    /// Section name and the file holding its contents.
    pub add_sections: Vec<(String, PathBuf)>,
    pub rename_symbols: Vec<(String, String)>,
    pub patches: Vec<(u64, Vec<u8>)>,
    pub entry: Option<u64>,
}

impl EditPlan {
    pub fn is_empty(&self) -> bool {
        self.remove_sections.is_empty()
            && self.rename_sections.is_empty()
            && self.resize_sections.is_empty()
            && self.add_sections.is_empty()
            && self.rename_symbols.is_empty()
            && self.patches.is_empty()
            && self.entry.is_none()
    }
}

/// Everything one run needs besides its output streams.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Write a JSON dump of the model instead of the binary.
    pub json: bool,
    /// Skip the plain header report.
    pub silent: bool,
    pub options: Options,
    pub plan: EditPlan,
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output: PathBuf,
    pub sha256: String,
    pub len: usize,
    pub edits: usize,
    pub warnings: usize,
}

/// Run the tool once. Failures are logged as an `error` event before being returned.
pub fn run(
    opts: &RunOptions,
    out: &mut dyn Write,
    log: &mut LogEmitter,
) -> Result<RunSummary, CliError> {
    let started = Instant::now();
    let result = execute(opts, out, log, started);
    if let Err(err) = &result {
        let entry = log
            .entry(LogLevel::Error, "error")
            .with_mode(mode_name(opts.options))
            .with_outcome(Outcome::Fail)
            .with_exit_code(err.exit_code())
            .with_duration_ms(elapsed_ms(started))
            .with_details(json!({ "kind": err.kind(), "message": err.to_string() }));
        // The run already failed; a log failure must not replace its error.
        let _ = log.emit_entry(entry).and_then(|()| log.flush());
    }
    result
}

fn execute(
    opts: &RunOptions,
    out: &mut dyn Write,
    log: &mut LogEmitter,
    started: Instant,
) -> Result<RunSummary, CliError> {
    let mode = mode_name(opts.options);
    let bytes = fs::read(&opts.input).map_err(|e| CliError::io(&opts.input, e))?;
    let (mut file, warnings) = ElfFile::parse_with(&bytes, opts.options)?.into_parts();

    let entry = log
        .entry(LogLevel::Info, "parse")
        .with_mode(mode)
        .with_outcome(Outcome::Pass)
        .with_artifacts(vec![opts.input.display().to_string()])
        .with_details(json!({
            "sha256": sha256_hex(&bytes),
            "bytes": bytes.len(),
            "encoding": file.encoding(),
            "sections": file.sections().len(),
            "segments": file.segments().len(),
        }));
    emit(log, entry)?;
    for warning in &warnings {
        let entry = log
            .entry(LogLevel::Warn, "warning")
            .with_details(json!({ "message": warning.to_string(), "warning": warning }));
        emit(log, entry)?;
    }

    let edits = apply(&mut file, &opts.plan, log)?;

    if !opts.silent {
        report::write_plain(&file, out).map_err(|e| CliError::io("<stdout>", e))?;
    }

    let (path, data, permissions) = if opts.json {
        let path = opts
            .output
            .clone()
            .unwrap_or_else(|| derived_path(&opts.input, ".json"));
        let json = FileReport::from_file(&file)?.to_json()?;
        (path, json.into_bytes(), None)
    } else {
        let path = opts
            .output
            .clone()
            .unwrap_or_else(|| derived_path(&opts.input, "_modified"));
        let permissions = fs::metadata(&opts.input).ok().map(|m| m.permissions());
        (path, file.to_bytes()?, permissions)
    };
    write_atomic(&path, &data, permissions)?;

    let summary = RunSummary {
        output: path,
        sha256: sha256_hex(&data),
        len: data.len(),
        edits,
        warnings: warnings.len(),
    };
    let entry = log
        .entry(LogLevel::Info, "write")
        .with_mode(mode)
        .with_outcome(Outcome::Pass)
        .with_exit_code(0)
        .with_duration_ms(elapsed_ms(started))
        .with_artifacts(vec![summary.output.display().to_string()])
        .with_details(json!({
            "sha256": summary.sha256,
            "bytes": summary.len,
            "edits": summary.edits,
            "json": opts.json,
        }));
    emit(log, entry)?;
    log.flush().map_err(CliError::Log)?;
    Ok(summary)
}

/// Apply `plan` to `file` in the fixed edit order; returns the number of edits made.
pub fn apply(file: &mut ElfFile, plan: &EditPlan, log: &mut LogEmitter) -> Result<usize, CliError> {
    let mut edits = 0;
    let mode = if plan.cascade {
        Removal::Cascade
    } else {
        Removal::Strict
    };

    for name in &plan.remove_sections {
        let index = section_named(file, name)?;
        let removed = file.remove_section(index, mode)?;
        let removed: Vec<usize> = removed.iter().map(|i| i.0).collect();
        log_edit(log, "remove_section", json!({ "section": name, "removed": removed }))?;
        edits += 1;
    }
    for (old, new) in &plan.rename_sections {
        let index = section_named(file, old)?;
        file.rename_section(index, new)?;
        log_edit(log, "rename_section", json!({ "from": old, "to": new }))?;
        edits += 1;
    }
    for (name, size) in &plan.resize_sections {
        let index = section_named(file, name)?;
        file.resize_section(index, *size)?;
        log_edit(log, "resize_section", json!({ "section": name, "size": size }))?;
        edits += 1;
    }
    for (name, path) in &plan.add_sections {
        let data = fs::read(path).map_err(|e| CliError::io(path, e))?;
        let len = data.len();
        let index = file.add_section(NewSection::new(name.as_str(), SectionType::Progbits, data))?;
        log_edit(
            log,
            "add_section",
            json!({ "section": name, "index": index.0, "bytes": len }),
        )?;
        edits += 1;
    }
    for (old, new) in &plan.rename_symbols {
        let (table, symbol, _) = file
            .find_symbol(old)
            .ok_or_else(|| CliError::NoSuchSymbol(old.clone()))?;
        file.rename_symbol(table, symbol, new)?;
        log_edit(
            log,
            "rename_symbol",
            json!({ "from": old, "to": new, "table": table.0, "symbol": symbol.0 }),
        )?;
        edits += 1;
    }
    for (addr, bytes) in &plan.patches {
        let section = file.patch_address(*addr, bytes)?;
        log_edit(
            log,
            "patch",
            json!({ "addr": addr, "bytes": bytes.len(), "section": section.0 }),
        )?;
        edits += 1;
    }
    if let Some(entry) = plan.entry {
        file.set_entry_point(entry)?;
        log_edit(log, "set_entry", json!({ "entry": entry }))?;
        edits += 1;
    }
    Ok(edits)
}

fn section_named(file: &ElfFile, name: &str) -> Result<SectionIndex, CliError> {
    file.section_by_name(name)
        .filter(|i| i.0 != 0)
        .ok_or_else(|| CliError::NoSuchSection(name.to_string()))
}

fn log_edit(log: &mut LogEmitter, op: &str, args: serde_json::Value) -> Result<(), CliError> {
    let entry = log
        .entry(LogLevel::Info, "edit")
        .with_outcome(Outcome::Pass)
        .with_details(json!({ "op": op, "args": args }));
    emit(log, entry)
}

fn emit(log: &mut LogEmitter, entry: LogEntry) -> Result<(), CliError> {
    log.emit_entry(entry).map_err(CliError::Log)
}

fn mode_name(options: Options) -> &'static str {
    if options.read_mode.is_strict() {
        "strict"
    } else {
        "tolerant"
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Default output path: the input's file name plus `suffix`, in the input's directory.
pub fn derived_path(input: &Path, suffix: &str) -> PathBuf {
    let name = input
        .file_name()
        .map_or_else(|| "elf".into(), |n| n.to_string_lossy().into_owned());
    input.with_file_name(format!("{name}{suffix}"))
}

/// Write `data` to a sibling temporary file, then rename it over `path`.
fn write_atomic(path: &Path, data: &[u8], permissions: Option<Permissions>) -> Result<(), CliError> {
    let name = path
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    let tmp = path.with_file_name(format!(".{name}.{}.tmp", std::process::id()));
    let result = fs::write(&tmp, data)
        .and_then(|()| match permissions {
            Some(p) => fs::set_permissions(&tmp, p),
            None => Ok(()),
        })
        .and_then(|()| fs::rename(&tmp, path));
    if let Err(source) = result {
        let _ = fs::remove_file(&tmp);
        return Err(CliError::io(path, source));
    }
    Ok(())
}

/// Identifier for one invocation, used in log trace ids.
pub fn run_id() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}-{secs}", std::process::id())
}

// ---------------------------------------------------------------------------
// Argument parsers
// ---------------------------------------------------------------------------

fn split_pair(arg: &str) -> Result<(&str, &str), CliError> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(CliError::argument(arg, "expected KEY=VALUE")),
    }
}

/// Decimal, or hexadecimal with a `0x` prefix.
pub fn parse_number(arg: &str) -> Result<u64, CliError> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    parsed.map_err(|_| CliError::argument(arg, "expected a decimal or 0x-prefixed number"))
}

/// Hex digit pairs, optionally prefixed with `0x`: `90c3` is `[0x90, 0xc3]`.
pub fn parse_hex_bytes(arg: &str) -> Result<Vec<u8>, CliError> {
    let digits = arg.strip_prefix("0x").unwrap_or(arg);
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.is_ascii() {
        return Err(CliError::argument(arg, "expected an even number of hex digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::argument(arg, "expected an even number of hex digits"))
        })
        .collect()
}

/// `OLD=NEW`; the new name may not be empty.
pub fn parse_rename(arg: &str) -> Result<(String, String), CliError> {
    let (old, new) = split_pair(arg)?;
    if new.is_empty() {
        return Err(CliError::argument(arg, "the new name is empty"));
    }
    Ok((old.to_string(), new.to_string()))
}

/// `NAME=SIZE`
pub fn parse_resize(arg: &str) -> Result<(String, u64), CliError> {
    let (name, size) = split_pair(arg)?;
    Ok((name.to_string(), parse_number(size)?))
}

/// `NAME=PATH`
pub fn parse_add(arg: &str) -> Result<(String, PathBuf), CliError> {
    let (name, path) = split_pair(arg)?;
    if path.is_empty() {
        return Err(CliError::argument(arg, "missing contents path"));
    }
    Ok((name.to_string(), PathBuf::from(path)))
}

/// `ADDR=HEXBYTES`
pub fn parse_patch(arg: &str) -> Result<(u64, Vec<u8>), CliError> {
    let (addr, bytes) = split_pair(arg)?;
    Ok((parse_number(addr)?, parse_hex_bytes(bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_accept_decimal_and_hex() {
        assert_eq!(parse_number("4096").unwrap(), 4096);
        assert_eq!(parse_number("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_number("0XfF").unwrap(), 0xff);
        assert!(parse_number("ten").is_err());
        assert!(parse_number("0x").is_err());
    }

    #[test]
    fn hex_bytes() {
        assert_eq!(parse_hex_bytes("90c3").unwrap(), vec![0x90, 0xc3]);
        assert_eq!(parse_hex_bytes("0xCC").unwrap(), vec![0xcc]);
        assert!(parse_hex_bytes("abc").is_err());
        assert!(parse_hex_bytes("zz").is_err());
        assert!(parse_hex_bytes("").is_err());
    }

    #[test]
    fn pairs() {
        assert_eq!(
            parse_rename(".data=.mydata").unwrap(),
            (".data".to_string(), ".mydata".to_string())
        );
        assert_eq!(parse_resize(".bss=0x200").unwrap(), (".bss".to_string(), 0x200));
        assert_eq!(
            parse_patch("0x10000=9090").unwrap(),
            (0x10000, vec![0x90, 0x90])
        );
        assert_eq!(
            parse_add(".note.x=/tmp/x.bin").unwrap(),
            (".note.x".to_string(), PathBuf::from("/tmp/x.bin"))
        );
        assert!(parse_rename("no-equals").is_err());
        assert!(parse_rename("=.x").is_err());
        assert!(parse_rename(".x=").is_err());
        assert!(parse_add(".x=").is_err());
    }

    #[test]
    fn derived_paths_sit_next_to_the_input() {
        assert_eq!(
            derived_path(Path::new("/tmp/bin/a.out"), "_modified"),
            PathBuf::from("/tmp/bin/a.out_modified")
        );
        assert_eq!(derived_path(Path::new("ls"), ".json"), PathBuf::from("ls.json"));
    }

    #[test]
    fn empty_plan() {
        let mut plan = EditPlan::default();
        assert!(plan.is_empty());
        plan.cascade = true;
        assert!(plan.is_empty());
        plan.entry = Some(0x1000);
        assert!(!plan.is_empty());
    }
}
