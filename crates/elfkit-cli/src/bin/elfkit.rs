//! CLI entrypoint for elfkit.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use elfkit_cli::runner::{
    self, EditPlan, RunOptions, parse_add, parse_number, parse_patch, parse_rename, parse_resize,
};
use elfkit_cli::structured_log::LogEmitter;
use elfkit_core::{Options, ReadMode};

/// Inspect, edit and rewrite ELF files.
///
/// Without edits the written file is byte-identical to the input.
#[derive(Debug, Parser)]
#[command(name = "elfkit")]
#[command(about = "Inspect, edit and rewrite ELF files")]
struct Cli {
    /// Input ELF file.
    #[arg(short = 'f', long = "file")]
    file: PathBuf,
    /// Write a JSON dump of the model instead of the binary.
    #[arg(short = 'j', long)]
    json: bool,
    /// Do not print the header report.
    #[arg(short = 's', long)]
    silent: bool,
    /// Output path (default: `<input>_modified`, or `<input>.json` with `--json`).
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
    /// Read mode; overrides ELFKIT_MODE.
    #[arg(long, value_parser = ["strict", "tolerant"])]
    mode: Option<String>,
    /// Always append new names instead of reusing existing string table entries.
    #[arg(long)]
    no_dedup: bool,
    /// Structured JSONL log path.
    #[arg(long)]
    log: Option<PathBuf>,
    /// New entry point address.
    #[arg(long, value_name = "ADDR", value_parser = parse_number)]
    set_entry: Option<u64>,
    /// Remove the named section.
    #[arg(long, value_name = "NAME")]
    remove_section: Vec<String>,
    /// Let removals take dependent sections and symbols with them.
    #[arg(long)]
    cascade: bool,
    #[arg(long, value_name = "OLD=NEW", value_parser = parse_rename)]
    rename_section: Vec<(String, String)>,
    #[arg(long, value_name = "NAME=SIZE", value_parser = parse_resize)]
    resize_section: Vec<(String, u64)>,
    /// Append a PROGBITS section with the contents of PATH.
    #[arg(long, value_name = "NAME=PATH", value_parser = parse_add)]
    add_section: Vec<(String, PathBuf)>,
    #[arg(long, value_name = "OLD=NEW", value_parser = parse_rename)]
    rename_symbol: Vec<(String, String)>,
    /// Overwrite bytes at a virtual address, e.g. `0x401000=9090`.
    #[arg(long, value_name = "ADDR=HEXBYTES", value_parser = parse_patch)]
    patch: Vec<(u64, Vec<u8>)>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut options = Options::from_env();
    if let Some(mode) = &cli.mode {
        options = options.with_read_mode(ReadMode::from_str_loose(mode));
    }
    if cli.no_dedup {
        options = options.with_dedup_strings(false);
    }

    let run_id = runner::run_id();
    let mut log = match &cli.log {
        Some(path) => match LogEmitter::to_file(path, &run_id) {
            Ok(log) => log,
            Err(err) => {
                eprintln!("elfkit: {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => LogEmitter::sink(&run_id),
    };

    let opts = RunOptions {
        input: cli.file,
        output: cli.output,
        json: cli.json,
        silent: cli.silent,
        options,
        plan: EditPlan {
            remove_sections: cli.remove_section,
            cascade: cli.cascade,
            rename_sections: cli.rename_section,
            resize_sections: cli.resize_section,
            add_sections: cli.add_section,
            rename_symbols: cli.rename_symbol,
            patches: cli.patch,
            entry: cli.set_entry,
        },
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match runner::run(&opts, &mut out, &mut log) {
        Ok(summary) => {
            if !opts.silent {
                eprintln!(
                    "elfkit: wrote {} ({} bytes, {} edits)",
                    summary.output.display(),
                    summary.len,
                    summary.edits
                );
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("elfkit: {err}");
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}
