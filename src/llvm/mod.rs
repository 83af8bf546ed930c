//! LLVM backend glue: counter placement, coverage globals and lowering.
//!
//! # Example
//! ```ignore
//! use bumpalo::Bump;
//! use covmap::core::CoverageSession;
//! use covmap::coverage::{CoverageConfig, CoverageManager};
//! use inkwell::context::Context;
//!
//! let arena = Bump::new();
//! let session = CoverageSession::new(&arena);
//! let mut manager = CoverageManager::new(&session, CoverageConfig::enabled(), "main");
//! manager.collect_regions(&adaptor);
//!
//! let context = Context::create();
//! let module = covmap::llvm::lower_to_module(&context, &adaptor, &manager, None)?;
//! ```

pub mod lowering;
pub mod placer;
pub mod sink;

pub use lowering::{lower_module, lower_to_module};
pub use placer::LlvmCounterPlacer;
pub use sink::LlvmCoverageSink;
