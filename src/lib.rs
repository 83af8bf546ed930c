//! covmap - source coverage instrumentation for a native compiler backend.
//!
//! Walks a typed IR tree, decides which source regions get an execution
//! counter, places counter increments while code is generated, and writes the
//! regions in the LLVM coverage mapping format so `llvm-profdata` and
//! `llvm-cov` can report on the instrumented binary.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use covmap::core::CoverageSession;
//! use covmap::coverage::{CoverageConfig, CoverageManager};
//! use covmap::test_ir::{TestIR, TestIRAdaptor};
//!
//! let ir = TestIR::parse(&source)?;
//! let adaptor = TestIRAdaptor::new(&ir);
//!
//! let arena = Bump::new();
//! let session = CoverageSession::new(&arena);
//! let mut manager = CoverageManager::new(&session, CoverageConfig::enabled(), "main");
//! manager.collect_regions(&adaptor);
//!
//! let object = covmap::codegen::native::compile_to_object(&adaptor, &manager)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - IR adaptor trait, errors, session
//! - [`coverage`] - region model, collectors, instrumentation gate, manager
//! - [`mapping`] - coverage mapping encoder and decoder
//! - [`llvm`] - LLVM module emission (inkwell)
//! - [`x64`] / [`object_file`] - native x86-64 emission (iced-x86, object)
//! - [`codegen`] - evaluation-order walk and native driver
//! - [`test_ir`] - textual test IR and its adaptor

pub mod codegen;
pub mod core;
pub mod coverage;
pub mod llvm;
pub mod mapping;
pub mod object_file;
pub mod test_ir;
pub mod x64;

pub use crate::core::{CompileResult, CoverageError, CoverageSession, IrAdaptor};
pub use crate::coverage::{CoverageConfig, CoverageManager, RegionGranularity};
