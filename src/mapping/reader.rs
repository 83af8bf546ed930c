//! Coverage mapping decoder.
//!
//! Reads covmap and covfun section contents back into region descriptors,
//! following the same rules `llvm-cov` applies to version 4 mappings. Used to
//! check emitted objects and by `covmap show`.

use crate::core::error::{CompileResult, CoverageError};
use crate::mapping::format::{
    align_to, md5_hash, COUNTER_KIND_REFERENCE, COUNTER_TAG_BITS, COUNTER_TAG_MASK,
    COVERAGE_MAPPING_VERSION, COVMAP_HEADER_SIZE, EXPANSION_REGION_BIT,
    FUNCTION_RECORD_HEADER_SIZE, GAP_REGION_BIT, RECORD_ALIGNMENT,
};
use crate::mapping::leb128::read_uleb128;
use crate::mapping::writer::{DescriptorKind, RegionDescriptor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFunction {
    pub name_ref: u64,
    pub structural_hash: u64,
    pub filenames_ref: u64,
    /// Global file ids, indexed by local id.
    pub file_ids: Vec<u32>,
    /// Regions grouped by local file id, each group in start order.
    pub regions: Vec<RegionDescriptor>,
}

impl DecodedFunction {
    /// Highest counter id referenced plus one.
    pub fn num_counters(&self) -> u32 {
        self.regions
            .iter()
            .filter(|r| r.kind != DescriptorKind::Expansion)
            .map(|r| r.counter_id + 1)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMapping {
    pub version: u32,
    pub filenames: Vec<String>,
    pub functions: Vec<DecodedFunction>,
}

fn malformed(offset: usize, reason: impl Into<String>) -> CoverageError {
    CoverageError::MalformedMapping {
        offset,
        reason: reason.into(),
    }
}

fn read_bytes<'b>(bytes: &'b [u8], pos: &mut usize, len: usize) -> CompileResult<&'b [u8]> {
    let slice = pos
        .checked_add(len)
        .and_then(|end| bytes.get(*pos..end))
        .ok_or_else(|| malformed(*pos, format!("expected {} more bytes", len)))?;
    *pos += len;
    Ok(slice)
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> CompileResult<u32> {
    let raw = read_bytes(bytes, pos, 4)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> CompileResult<u64> {
    let raw = read_bytes(bytes, pos, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Ok(u64::from_le_bytes(buf))
}

fn read_u32_leb(bytes: &[u8], pos: &mut usize) -> CompileResult<u32> {
    let start = *pos;
    let value = read_uleb128(bytes, pos)?;
    u32::try_from(value).map_err(|_| malformed(start, format!("value {} does not fit in 32 bits", value)))
}

/// Decode the filenames blob.
pub fn read_filenames(bytes: &[u8]) -> CompileResult<Vec<String>> {
    let mut pos = 0;
    let count = read_uleb128(bytes, &mut pos)?;
    let uncompressed_len = read_uleb128(bytes, &mut pos)?;
    let compressed_len = read_uleb128(bytes, &mut pos)?;
    if compressed_len != 0 {
        return Err(malformed(pos, "compressed filenames are not supported"));
    }

    let payload_start = pos;
    let mut filenames = Vec::new();
    for _ in 0..count {
        let len = read_uleb128(bytes, &mut pos)? as usize;
        let at = pos;
        let raw = read_bytes(bytes, &mut pos, len)?;
        let name = std::str::from_utf8(raw).map_err(|e| malformed(at, e.to_string()))?;
        filenames.push(name.to_string());
    }

    if (pos - payload_start) as u64 != uncompressed_len {
        return Err(malformed(
            payload_start,
            format!("filenames take {} bytes, header says {}", pos - payload_start, uncompressed_len),
        ));
    }
    Ok(filenames)
}

/// Decode the mapping payload of one function.
pub fn read_mapping_data(data: &[u8]) -> CompileResult<(Vec<u32>, Vec<RegionDescriptor>)> {
    let mut pos = 0;

    let num_files = read_uleb128(data, &mut pos)?;
    let mut file_ids = Vec::new();
    for _ in 0..num_files {
        file_ids.push(read_u32_leb(data, &mut pos)?);
    }

    let num_expressions = read_uleb128(data, &mut pos)?;
    if num_expressions != 0 {
        return Err(malformed(pos, "counter expressions are not supported"));
    }

    let mut regions = Vec::new();
    for file_id in 0..file_ids.len() as u32 {
        let num_regions = read_uleb128(data, &mut pos)?;
        let mut line = 0u32;
        for _ in 0..num_regions {
            let at = pos;
            let header = read_uleb128(data, &mut pos)?;
            let line_delta = read_u32_leb(data, &mut pos)?;
            let start_column = read_u32_leb(data, &mut pos)?;
            let line_count = read_u32_leb(data, &mut pos)?;
            let mut end_column = read_u32_leb(data, &mut pos)?;

            line = line
                .checked_add(line_delta)
                .ok_or_else(|| malformed(at, "line number overflow"))?;
            let end_line = line
                .checked_add(line_count)
                .ok_or_else(|| malformed(at, "line number overflow"))?;

            let (kind, counter_id, expanded_file_id) = if header & COUNTER_TAG_MASK == COUNTER_KIND_REFERENCE {
                let counter_id = u32::try_from(header >> COUNTER_TAG_BITS)
                    .map_err(|_| malformed(at, "counter id does not fit in 32 bits"))?;
                if end_column & GAP_REGION_BIT != 0 {
                    end_column &= !GAP_REGION_BIT;
                    (DescriptorKind::Gap, counter_id, 0)
                } else {
                    (DescriptorKind::Code, counter_id, 0)
                }
            } else if header & COUNTER_TAG_MASK == 0 && (header >> COUNTER_TAG_BITS) & EXPANSION_REGION_BIT != 0 {
                let expanded = u32::try_from(header >> (COUNTER_TAG_BITS + 1))
                    .map_err(|_| malformed(at, "expanded file id does not fit in 32 bits"))?;
                if expanded as usize >= file_ids.len() {
                    return Err(malformed(at, format!("expansion into unknown file {}", expanded)));
                }
                (DescriptorKind::Expansion, 0, expanded)
            } else {
                return Err(malformed(at, format!("unsupported region header {:#x}", header)));
            };

            regions.push(RegionDescriptor {
                file_id,
                start_line: line,
                start_column,
                end_line,
                end_column,
                kind,
                counter_id,
                expanded_file_id,
            });
        }
    }

    if pos != data.len() {
        return Err(malformed(pos, "trailing bytes after mapping regions"));
    }
    Ok((file_ids, regions))
}

/// Decode the contents of a covmap and a covfun section.
pub fn read_coverage_mapping(covmap: &[u8], covfun: &[u8]) -> CompileResult<DecodedMapping> {
    let mut pos = 0;
    if covmap.len() < COVMAP_HEADER_SIZE {
        return Err(malformed(0, "covmap section is shorter than its header"));
    }
    let _num_records = read_u32(covmap, &mut pos)?;
    let filenames_len = read_u32(covmap, &mut pos)? as usize;
    let coverage_len = read_u32(covmap, &mut pos)?;
    let version = read_u32(covmap, &mut pos)?;

    if version != COVERAGE_MAPPING_VERSION {
        return Err(malformed(12, format!("unsupported mapping version {}", version)));
    }
    if coverage_len != 0 {
        return Err(malformed(8, "inline function records are not supported"));
    }

    let encoded_filenames = read_bytes(covmap, &mut pos, filenames_len)?;
    let filenames = read_filenames(encoded_filenames)?;
    let expected_ref = md5_hash(encoded_filenames);

    let mut functions = Vec::new();
    let mut pos = 0;
    while pos < covfun.len() {
        if covfun[pos..].iter().all(|&b| b == 0) {
            break;
        }

        let record_start = pos;
        let name_ref = read_u64(covfun, &mut pos)?;
        let data_len = read_u32(covfun, &mut pos)? as usize;
        let structural_hash = read_u64(covfun, &mut pos)?;
        let filenames_ref = read_u64(covfun, &mut pos)?;
        debug_assert_eq!(pos - record_start, FUNCTION_RECORD_HEADER_SIZE);

        if filenames_ref != expected_ref {
            return Err(malformed(
                record_start,
                "function record refers to a different filenames table",
            ));
        }

        let data = read_bytes(covfun, &mut pos, data_len)?;
        let (file_ids, regions) = read_mapping_data(data).map_err(|e| match e {
            CoverageError::MalformedMapping { offset, reason } => CoverageError::MalformedMapping {
                offset: pos - data_len + offset,
                reason,
            },
            other => other,
        })?;

        if let Some(&bad) = file_ids.iter().find(|&&id| id as usize >= filenames.len()) {
            return Err(malformed(record_start, format!("file id {} is out of range", bad)));
        }

        functions.push(DecodedFunction {
            name_ref,
            structural_hash,
            filenames_ref,
            file_ids,
            regions,
        });
        pos = align_to(pos, RECORD_ALIGNMENT);
    }

    Ok(DecodedMapping {
        version,
        filenames,
        functions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_version_is_rejected() {
        let mut covmap = Vec::new();
        for field in [0u32, 0, 0, 5] {
            covmap.extend_from_slice(&field.to_le_bytes());
        }
        let err = read_coverage_mapping(&covmap, &[]).unwrap_err();
        assert!(matches!(err, CoverageError::MalformedMapping { offset: 12, .. }));
    }

    #[test]
    fn test_expansion_header_decodes() {
        // Two files; file 0 holds an expansion into file 1, file 1 one code region.
        let data = [2, 0, 1, 0, 1, 0x0c, 2, 1, 0, 9, 1, 0x01, 1, 1, 0, 4];
        let (file_ids, regions) = read_mapping_data(&data).unwrap();

        assert_eq!(file_ids, vec![0, 1]);
        assert_eq!(regions[0].kind, DescriptorKind::Expansion);
        assert_eq!(regions[0].expanded_file_id, 1);
        assert_eq!((regions[0].start_line, regions[0].end_column), (2, 9));
        assert_eq!(regions[1].file_id, 1);
        assert_eq!(regions[1].counter_id, 0);
    }

    #[test]
    fn test_truncated_record_is_malformed() {
        let err = read_mapping_data(&[1, 0, 0, 1, 0x01, 3]).unwrap_err();
        assert!(matches!(err, CoverageError::MalformedMapping { .. }));
    }
}
