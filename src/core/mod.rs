// This module gathers the infrastructure shared by collection, instrumentation and
// emission: the IrAdaptor trait through which the pipeline reads any tree IR (element
// identity, kinds, children, byte ranges and the offset to line/column service), the
// CoverageError type with its CompileResult alias, and the arena-backed CoverageSession
// that interns derived symbol names and accumulates statistics for one compilation.

//! Core infrastructure.
//!
//! # Key Components
//!
//! ## IR access (`adaptor`)
//! - Dense ids for files, functions and elements
//! - Closed element kind set driving region collection
//!
//! ## Errors (`error`)
//! - `thiserror`-derived `CoverageError`
//!
//! ## Session (`session`)
//! - Arena-based name interning using `bumpalo`
//! - Coverage statistics

pub mod adaptor;
pub mod error;
pub mod session;

pub use adaptor::{
    ElementId, ElementKind, FileId, FuncId, IrAdaptor, LineColumn, SourceRange,
};
pub use error::{CompileResult, CoverageError};
pub use session::{CoverageSession, SessionStats};
