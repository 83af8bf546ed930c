//! Constants and naming conventions of the LLVM coverage mapping format.
//!
//! Only the layout read by `llvm-cov` for `CovMapVersion::Version4` is
//! produced: uncompressed filenames, one covmap header per module and
//! standalone function records in the covfun section.

use md5::{Digest, Md5};

/// `CovMapVersion::Version4`, stored zero-based.
pub const COVERAGE_MAPPING_VERSION: u32 = 3;

/// Name of the module-level mapping global.
pub const COVERAGE_MAPPING_VAR: &str = "__llvm_coverage_mapping";

/// Prefix of per-function record globals; the suffix is the hex name ref and `u`.
pub const FUNCTION_RECORD_PREFIX: &str = "__covrec_";

/// Prefix of per-function name globals consumed by the profiling intrinsics.
pub const PROFILE_NAME_PREFIX: &str = "__profn_";

/// Separator between function names in the profile names blob.
pub const PROFILE_NAME_SEPARATOR: u8 = 0x01;

/// Prefix of per-function counter arrays.
pub const PROFILE_COUNTERS_PREFIX: &str = "__profc_";

/// Covmap and covfun records are 8-byte aligned.
pub const RECORD_ALIGNMENT: usize = 8;

/// Size of the covmap header: four `u32` fields.
pub const COVMAP_HEADER_SIZE: usize = 16;

/// Size of a function record header: name ref, data size, hash, filenames ref.
pub const FUNCTION_RECORD_HEADER_SIZE: usize = 8 + 4 + 8 + 8;

/// Low bits of a counter that hold its kind.
pub const COUNTER_TAG_BITS: u32 = 2;
pub const COUNTER_TAG_MASK: u64 = (1 << COUNTER_TAG_BITS) - 1;
/// Counter kind of a direct counter reference.
pub const COUNTER_KIND_REFERENCE: u64 = 1;
/// Bits taken by the counter tag plus the expansion flag in a region header.
pub const COUNTER_AND_EXPANSION_TAG_BITS: u32 = 3;
/// Expansion flag, after the counter tag is shifted out.
pub const EXPANSION_REGION_BIT: u64 = 1;
/// Set in the encoded end column of gap regions.
pub const GAP_REGION_BIT: u32 = 1 << 31;

/// Object file flavor, which decides the coverage section names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFormat {
    Elf,
    MachO,
    Coff,
}

/// Section names for one object file flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageSections {
    pub covmap: &'static str,
    pub covfun: &'static str,
    pub counters: &'static str,
    pub names: &'static str,
}

impl ObjectFormat {
    /// Object flavor used for a target triple.
    pub fn from_triple(triple: &str) -> Self {
        if triple.contains("apple") || triple.contains("darwin") || triple.contains("macos") || triple.contains("ios") {
            ObjectFormat::MachO
        } else if triple.contains("windows") || triple.contains("win32") {
            ObjectFormat::Coff
        } else {
            ObjectFormat::Elf
        }
    }

    pub fn sections(self) -> CoverageSections {
        match self {
            ObjectFormat::Elf => CoverageSections {
                covmap: "__llvm_covmap",
                covfun: "__llvm_covfun",
                counters: "__llvm_prf_cnts",
                names: "__llvm_prf_names",
            },
            ObjectFormat::MachO => CoverageSections {
                covmap: "__LLVM_COV,__llvm_covmap",
                covfun: "__LLVM_COV,__llvm_covfun",
                counters: "__DATA,__llvm_prf_cnts",
                names: "__DATA,__llvm_prf_names",
            },
            ObjectFormat::Coff => CoverageSections {
                covmap: ".lcovmap$M",
                covfun: ".lcovfun$M",
                counters: ".lprfc$M",
                names: ".lprfn$M",
            },
        }
    }
}

/// MD5-based 64-bit hash used for name refs and filename table refs.
///
/// The value is the first eight digest bytes read as a little-endian integer,
/// matching `IndexedInstrProf::ComputeHash`.
pub fn md5_hash(bytes: &[u8]) -> u64 {
    let digest = Md5::digest(bytes);
    let mut low = [0u8; 8];
    low.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(low)
}

/// Name ref of a function: the hash of its linkage name.
pub fn name_ref(function_name: &str) -> u64 {
    md5_hash(function_name.as_bytes())
}

/// Symbol name of the covfun record of a function.
pub fn function_record_symbol(name_ref: u64) -> String {
    format!("{}{:X}u", FUNCTION_RECORD_PREFIX, name_ref)
}

pub fn align_to(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}
