//! LLVM coverage mapping format: encoding, decoding and naming conventions.

pub mod format;
pub mod leb128;
pub mod reader;
pub mod writer;

pub use format::{name_ref, ObjectFormat};
pub use reader::{read_coverage_mapping, DecodedFunction, DecodedMapping};
pub use writer::{
    CoverageMapping, CoverageMappingWriter, CoverageSink, DescriptorKind, FunctionRecord,
    RegionDescriptor,
};
