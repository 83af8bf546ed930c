// This module defines error types for the coverage pipeline using the thiserror crate for
// idiomatic Rust error handling. CoverageError is the main error enum covering the failure
// scenarios of collection, encoding and emission: an output module that was never attached
// (an internal invariant violation), regions referencing files missing from the file table,
// regions whose span is inverted, malformed coverage-mapping bytes handed to the reader,
// LLVM builder failures, x86-64 encoding failures, object file writing failures, test IR
// parse errors and I/O. Each variant carries enough context (file ids, offsets, reasons)
// to be actionable from a log line. CompileResult<T> is the convenience alias used by every
// fallible operation in the crate.

//! Error types for coverage collection and emission.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

use crate::core::adaptor::FileId;

/// Main error type for coverage instrumentation.
#[derive(Error, Debug)]
pub enum CoverageError {
    /// The writer ran before the code generator attached its output module.
    ///
    /// This never happens under correct orchestration; callers treat it as an
    /// internal compiler error.
    #[error("internal error: output module should be initialized before coverage data is written")]
    ModuleNotInitialized,

    #[error("region references file {file:?} which is not part of the coverage file table")]
    UnknownFile {
        file: FileId,
    },

    #[error("invalid region {start_line}:{start_column} -> {end_line}:{end_column}")]
    InvalidRegion {
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    },

    #[error("malformed coverage mapping at byte {offset}: {reason}")]
    MalformedMapping {
        offset: usize,
        reason: String,
    },

    #[error("LLVM emission failed: {reason}")]
    Llvm {
        reason: String,
    },

    #[error("counter increment encoding failed: {reason}")]
    Encoding {
        reason: String,
    },

    #[error("object file emission failed: {0}")]
    Object(#[from] object::write::Error),

    #[error("test IR parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<inkwell::builder::BuilderError> for CoverageError {
    fn from(err: inkwell::builder::BuilderError) -> Self {
        Self::Llvm {
            reason: err.to_string(),
        }
    }
}

impl From<iced_x86::IcedError> for CoverageError {
    fn from(err: iced_x86::IcedError) -> Self {
        Self::Encoding {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for coverage operations.
pub type CompileResult<T> = Result<T, CoverageError>;
