//! Source coverage: region model, collection, and counter placement.
//!
//! Collection runs once per module after the IR is final. The resulting
//! region table drives both the per-function instrumentors used during code
//! generation and the mapping records written into the output.

pub mod collector;
pub mod config;
pub mod instrumentation;
pub mod manager;
pub mod module_collector;
pub mod region;

pub use collector::{CollectorStats, RegionCollector};
pub use config::{CoverageConfig, RegionGranularity};
pub use instrumentation::{
    CounterIncrement, CounterPlacer, InstrumentationGate, Instrumentor, NoopInstrumentor,
};
pub use manager::CoverageManager;
pub use module_collector::{collect_module, ModuleCollector};
pub use region::{CounterId, FileRegionInfo, FunctionRegions, Region, RegionKind, SourceSpan};
