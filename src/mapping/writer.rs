// This module turns the module-level region table into LLVM coverage mapping records. It
// assigns every file a dense id in first-seen order, lowers each function's enumerated
// regions to descriptors that use a per-function file subset, and encodes each function's
// mapping payload: the subset's global ids, an empty expression list, then one run of
// regions per local file sorted by start position with line numbers delta-encoded against
// the previous region of the same run. The resulting CoverageMapping is handed to a
// CoverageSink, which places the bytes into the output module (LLVM globals or object
// file sections). Counter ids are written explicitly in each region header, so the sort
// never changes which counter a region reads.

//! Coverage mapping encoder.

use hashbrown::HashMap;

use crate::core::adaptor::FileId;
use crate::core::error::{CompileResult, CoverageError};
use crate::coverage::region::{FileRegionInfo, FunctionRegions, RegionKind};
use crate::mapping::format::{
    align_to, md5_hash, name_ref, COUNTER_AND_EXPANSION_TAG_BITS, COUNTER_KIND_REFERENCE,
    COUNTER_TAG_BITS, COVERAGE_MAPPING_VERSION, EXPANSION_REGION_BIT, FUNCTION_RECORD_HEADER_SIZE,
    GAP_REGION_BIT, PROFILE_NAME_SEPARATOR, RECORD_ALIGNMENT,
};
use crate::mapping::leb128::write_uleb128;

/// Kind of an encoded region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Code,
    Gap,
    Expansion,
}

/// One region as it appears in a function record.
///
/// `file_id` and `expanded_file_id` index the function's file subset;
/// `expanded_file_id` is 0 unless the kind is `Expansion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionDescriptor {
    pub file_id: u32,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub kind: DescriptorKind,
    pub counter_id: u32,
    pub expanded_file_id: u32,
}

/// Encoded coverage record of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
    pub name: String,
    pub name_ref: u64,
    pub structural_hash: u64,
    pub num_counters: u32,
    /// Global file ids of the function's file subset, indexed by local id.
    pub file_ids: Vec<u32>,
    /// Descriptors in counter enumeration order.
    pub regions: Vec<RegionDescriptor>,
    /// Encoded mapping payload.
    pub mapping_data: Vec<u8>,
}

impl FunctionRecord {
    /// The packed covfun record, padded to the record alignment.
    pub fn covfun_bytes(&self, filenames_ref: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(align_to(
            FUNCTION_RECORD_HEADER_SIZE + self.mapping_data.len(),
            RECORD_ALIGNMENT,
        ));
        out.extend_from_slice(&self.name_ref.to_le_bytes());
        out.extend_from_slice(&(self.mapping_data.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.structural_hash.to_le_bytes());
        out.extend_from_slice(&filenames_ref.to_le_bytes());
        out.extend_from_slice(&self.mapping_data);
        out.resize(align_to(out.len(), RECORD_ALIGNMENT), 0);
        out
    }
}

/// Coverage records of a whole module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageMapping {
    pub version: u32,
    pub filenames: Vec<String>,
    pub encoded_filenames: Vec<u8>,
    /// Hash of `encoded_filenames`, shared by every function record.
    pub filenames_ref: u64,
    pub functions: Vec<FunctionRecord>,
}

impl CoverageMapping {
    /// The four covmap header fields.
    pub fn covmap_header(&self) -> [u32; 4] {
        [0, self.encoded_filenames.len() as u32, 0, self.version]
    }

    /// Filenames padded to the record alignment, as stored after the header.
    pub fn padded_filenames(&self) -> Vec<u8> {
        let mut out = self.encoded_filenames.clone();
        // The header is 16 bytes, so aligning the blob aligns the record.
        out.resize(align_to(out.len(), RECORD_ALIGNMENT), 0);
        out
    }

    /// Contents of the covmap section.
    pub fn covmap_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for field in self.covmap_header() {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&self.padded_filenames());
        out
    }

    /// Contents of the covfun section: every function record back to back.
    pub fn covfun_bytes(&self) -> Vec<u8> {
        self.functions
            .iter()
            .flat_map(|f| f.covfun_bytes(self.filenames_ref))
            .collect()
    }

    /// Contents of the profile names section, listing every recorded function.
    pub fn names_bytes(&self) -> Vec<u8> {
        encode_function_names(self.functions.iter().map(|f| f.name.as_str()))
    }
}

/// Output layer that stores the coverage records in the compiled module.
pub trait CoverageSink {
    fn emit_coverage(&mut self, mapping: &CoverageMapping) -> CompileResult<()>;
}

/// Dense file table in first-seen order.
struct FileTable<'a> {
    names: HashMap<FileId, &'a str>,
    ids: HashMap<FileId, u32>,
    order: Vec<&'a str>,
}

impl<'a> FileTable<'a> {
    fn new(infos: &'a [FileRegionInfo]) -> Self {
        Self {
            names: infos.iter().map(|i| (i.file, i.file_name.as_str())).collect(),
            ids: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn id(&mut self, file: FileId) -> CompileResult<u32> {
        if let Some(&id) = self.ids.get(&file) {
            return Ok(id);
        }
        let name = self
            .names
            .get(&file)
            .copied()
            .ok_or(CoverageError::UnknownFile { file })?;
        let id = self.order.len() as u32;
        self.order.push(name);
        self.ids.insert(file, id);
        Ok(id)
    }
}

pub struct CoverageMappingWriter;

impl CoverageMappingWriter {
    /// Encode `infos` and hand the result to `sink`. Does nothing for an empty table.
    pub fn write(infos: &[FileRegionInfo], sink: &mut dyn CoverageSink) -> CompileResult<()> {
        let Some(mapping) = Self::build(infos)? else {
            log::debug!("No coverage regions to write");
            return Ok(());
        };

        log::debug!(
            "Writing coverage mapping: {} files, {} functions",
            mapping.filenames.len(),
            mapping.functions.len()
        );
        sink.emit_coverage(&mapping)
    }

    /// Encode `infos`; `None` for an empty table.
    pub fn build(infos: &[FileRegionInfo]) -> CompileResult<Option<CoverageMapping>> {
        if infos.is_empty() {
            return Ok(None);
        }

        let mut table = FileTable::new(infos);
        let mut functions = Vec::new();
        for info in infos {
            table.id(info.file)?;
            for regions in &info.functions {
                functions.push(encode_function(regions, &mut table)?);
            }
        }

        let filenames: Vec<String> = table.order.iter().map(|s| s.to_string()).collect();
        let encoded_filenames = encode_filenames(&filenames);
        let filenames_ref = md5_hash(&encoded_filenames);

        Ok(Some(CoverageMapping {
            version: COVERAGE_MAPPING_VERSION,
            filenames,
            encoded_filenames,
            filenames_ref,
            functions,
        }))
    }
}

/// Uncompressed filenames blob.
pub fn encode_filenames(filenames: &[String]) -> Vec<u8> {
    let mut payload = Vec::new();
    for name in filenames {
        write_uleb128(&mut payload, name.len() as u64);
        payload.extend_from_slice(name.as_bytes());
    }

    let mut out = Vec::with_capacity(payload.len() + 8);
    write_uleb128(&mut out, filenames.len() as u64);
    write_uleb128(&mut out, payload.len() as u64);
    // Compressed size; zero means the payload is stored as is.
    write_uleb128(&mut out, 0);
    out.extend_from_slice(&payload);
    out
}

/// Uncompressed profile names blob, the names joined by a 0x01 byte.
pub fn encode_function_names<'n>(names: impl IntoIterator<Item = &'n str>) -> Vec<u8> {
    let mut joined = Vec::new();
    for name in names {
        if !joined.is_empty() {
            joined.push(PROFILE_NAME_SEPARATOR);
        }
        joined.extend_from_slice(name.as_bytes());
    }

    let mut out = Vec::with_capacity(joined.len() + 4);
    write_uleb128(&mut out, joined.len() as u64);
    // Compressed size; zero means the names are stored as is.
    write_uleb128(&mut out, 0);
    out.extend_from_slice(&joined);
    out
}

fn encode_function(regions: &FunctionRegions, table: &mut FileTable<'_>) -> CompileResult<FunctionRecord> {
    let mut file_ids: Vec<u32> = Vec::new();
    let mut local_id = |global: u32| -> u32 {
        match file_ids.iter().position(|&g| g == global) {
            Some(local) => local as u32,
            None => {
                file_ids.push(global);
                (file_ids.len() - 1) as u32
            }
        }
    };

    let mut descriptors = Vec::with_capacity(regions.num_counters() as usize);
    for (counter_id, region) in regions.enumerate() {
        let file_id = local_id(table.id(region.file())?);
        let (start, end) = (region.span.start(), region.span.end());
        let (kind, expanded_file_id) = match region.kind {
            RegionKind::Code => (DescriptorKind::Code, 0),
            RegionKind::Gap => (DescriptorKind::Gap, 0),
            RegionKind::Expansion { expanded_file } => {
                (DescriptorKind::Expansion, local_id(table.id(expanded_file)?))
            }
        };
        descriptors.push(RegionDescriptor {
            file_id,
            start_line: start.line,
            start_column: start.column,
            end_line: end.line,
            end_column: end.column,
            kind,
            counter_id,
            expanded_file_id,
        });
    }

    let mapping_data = encode_mapping_data(&file_ids, &descriptors);
    Ok(FunctionRecord {
        name: regions.name().to_string(),
        name_ref: name_ref(regions.name()),
        structural_hash: regions.structural_hash(),
        num_counters: regions.num_counters(),
        file_ids,
        regions: descriptors,
        mapping_data,
    })
}

/// Encode the mapping payload of one function.
pub fn encode_mapping_data(file_ids: &[u32], regions: &[RegionDescriptor]) -> Vec<u8> {
    let mut out = Vec::new();

    write_uleb128(&mut out, file_ids.len() as u64);
    for &id in file_ids {
        write_uleb128(&mut out, u64::from(id));
    }
    // No counter expressions.
    write_uleb128(&mut out, 0);

    for local in 0..file_ids.len() as u32 {
        let mut run: Vec<&RegionDescriptor> = regions.iter().filter(|r| r.file_id == local).collect();
        run.sort_by_key(|r| (r.start_line, r.start_column));

        write_uleb128(&mut out, run.len() as u64);
        let mut prev_line = 0;
        for region in run {
            write_uleb128(&mut out, region_header(region));
            write_uleb128(&mut out, u64::from(region.start_line - prev_line));
            write_uleb128(&mut out, u64::from(region.start_column));
            write_uleb128(&mut out, u64::from(region.end_line - region.start_line));
            let end_column = match region.kind {
                DescriptorKind::Gap => region.end_column | GAP_REGION_BIT,
                _ => region.end_column,
            };
            write_uleb128(&mut out, u64::from(end_column));
            prev_line = region.start_line;
        }
    }

    out
}

fn region_header(region: &RegionDescriptor) -> u64 {
    match region.kind {
        DescriptorKind::Code | DescriptorKind::Gap => {
            (u64::from(region.counter_id) << COUNTER_TAG_BITS) | COUNTER_KIND_REFERENCE
        }
        DescriptorKind::Expansion => {
            (EXPANSION_REGION_BIT << COUNTER_TAG_BITS)
                | (u64::from(region.expanded_file_id) << COUNTER_AND_EXPANSION_TAG_BITS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adaptor::{ElementId, FuncId, LineColumn};
    use crate::coverage::region::{Region, SourceSpan};

    fn region(file: u32, sl: u32, sc: u32, el: u32, ec: u32, kind: RegionKind) -> Region {
        let span = SourceSpan::new(
            FileId(file),
            LineColumn { line: sl, column: sc },
            LineColumn { line: el, column: ec },
        )
        .unwrap();
        Region::new(span, kind)
    }

    struct Capture(Vec<CoverageMapping>);

    impl CoverageSink for Capture {
        fn emit_coverage(&mut self, mapping: &CoverageMapping) -> CompileResult<()> {
            self.0.push(mapping.clone());
            Ok(())
        }
    }

    #[test]
    fn test_empty_table_leaves_sink_untouched() {
        let mut sink = Capture(Vec::new());
        CoverageMappingWriter::write(&[], &mut sink).unwrap();
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_filenames_encoding() {
        let encoded = encode_filenames(&["a.kt".to_string(), "bb.kt".to_string()]);
        assert_eq!(
            encoded,
            [&[2, 11, 0, 4][..], b"a.kt", &[5], b"bb.kt"].concat()
        );
    }

    #[test]
    fn test_function_names_encoding() {
        assert_eq!(
            encode_function_names(["main", "f"]),
            [&[6, 0][..], b"main", &[0x01], b"f"].concat()
        );
        assert_eq!(encode_function_names([]), vec![0, 0]);
    }

    #[test]
    fn test_mapping_payload_bytes() {
        let mut regions = FunctionRegions::new(FuncId(0), "f");
        regions.record(ElementId(0), region(0, 3, 5, 3, 10, RegionKind::Code));
        regions.record_gap(region(0, 3, 10, 4, 5, RegionKind::Gap));
        let mut info = FileRegionInfo::new(FileId(0), "a.kt");
        info.functions.push(regions);

        let mapping = CoverageMappingWriter::build(&[info]).unwrap().unwrap();
        let record = &mapping.functions[0];

        assert_eq!(
            record.mapping_data,
            vec![
                1, 0, // one file, global id 0
                0,    // no expressions
                2,    // two regions
                0x01, 3, 5, 0, 10, // counter 0, 3:5 -> 3:10
                0x05, 0, 10, 1, 0x85, 0x80, 0x80, 0x80, 0x08, // counter 1, gap 3:10 -> 4:5
            ]
        );
        assert_eq!(record.num_counters, 2);
        assert_eq!(mapping.covmap_header(), [0, 8, 0, 3]);
        assert_eq!(mapping.covmap_bytes().len(), 16 + 8);
        assert_eq!(mapping.covfun_bytes().len() % 8, 0);
        assert_eq!(mapping.names_bytes(), [&[1, 0][..], b"f"].concat());
    }

    #[test]
    fn test_expansion_into_unknown_file_is_an_error() {
        let mut regions = FunctionRegions::new(FuncId(0), "f");
        regions.record(
            ElementId(0),
            region(0, 1, 1, 1, 4, RegionKind::Expansion { expanded_file: FileId(9) }),
        );
        let mut info = FileRegionInfo::new(FileId(0), "a.kt");
        info.functions.push(regions);

        let err = CoverageMappingWriter::build(&[info]).unwrap_err();
        assert!(matches!(err, CoverageError::UnknownFile { file: FileId(9) }));
    }
}
