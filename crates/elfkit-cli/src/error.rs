//! Errors surfaced by the command-line tool, and their exit codes.

use std::path::PathBuf;

use elfkit_core::ElfError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Elf(#[from] ElfError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("log: {0}")]
    Log(#[source] std::io::Error),
    #[error("invalid argument `{arg}`: {reason}")]
    Argument { arg: String, reason: &'static str },
    #[error("no section named `{0}`")]
    NoSuchSection(String),
    #[error("no symbol named `{0}`")]
    NoSuchSymbol(String),
}

impl CliError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn argument(arg: &str, reason: &'static str) -> Self {
        Self::Argument {
            arg: arg.to_string(),
            reason,
        }
    }

    /// Process exit status: 2 format, 3 bounds, 4 layout, 5 write, 1 anything else.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Elf(ElfError::Format(_) | ElfError::Rejected(_)) => 2,
            Self::Elf(ElfError::Bounds(_)) => 3,
            Self::Elf(ElfError::Layout(_)) => 4,
            Self::Elf(ElfError::Write(_)) => 5,
            _ => 1,
        }
    }

    /// Stable short name of the error family, used in log records.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Elf(ElfError::Format(_)) => "format",
            Self::Elf(ElfError::Rejected(_)) => "rejected",
            Self::Elf(ElfError::Bounds(_)) => "bounds",
            Self::Elf(ElfError::Layout(_)) => "layout",
            Self::Elf(ElfError::Write(_)) => "write",
            Self::Json(_) => "json",
            Self::Log(_) => "log",
            Self::Argument { .. } => "argument",
            Self::NoSuchSection(_) | Self::NoSuchSymbol(_) => "lookup",
        }
    }
}
