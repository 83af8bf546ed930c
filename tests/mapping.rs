//! Encoding collected regions and decoding them back.

use bumpalo::Bump;
use std::path::Path;

use covmap::core::{CoverageError, CoverageSession, ElementId, FileId, FuncId, LineColumn};
use covmap::coverage::{
    CoverageConfig, CoverageManager, FileRegionInfo, FunctionRegions, Region, RegionKind, SourceSpan,
};
use covmap::mapping::{
    name_ref, read_coverage_mapping, CoverageMappingWriter, DescriptorKind, RegionDescriptor,
};
use covmap::test_ir::{TestIR, TestIRAdaptor};

fn span(file: FileId, start: (u32, u32), end: (u32, u32)) -> SourceSpan {
    SourceSpan::new(
        file,
        LineColumn { line: start.0, column: start.1 },
        LineColumn { line: end.0, column: end.1 },
    )
    .unwrap()
}

fn descriptor(kind: DescriptorKind, counter_id: u32, start: (u32, u32), end: (u32, u32)) -> RegionDescriptor {
    RegionDescriptor {
        file_id: 0,
        start_line: start.0,
        start_column: start.1,
        end_line: end.0,
        end_column: end.1,
        kind,
        counter_id,
        expanded_file_id: 0,
    }
}

#[test]
fn test_code_and_gap_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();

    let file = FileId(0);
    let mut regions = FunctionRegions::new(FuncId(0), "main");
    regions.record(ElementId(1), Region::new(span(file, (3, 5), (3, 10)), RegionKind::Code));
    regions.record_gap(Region::new(span(file, (3, 10), (4, 5)), RegionKind::Gap));
    let mut info = FileRegionInfo::new(file, "a.kt");
    info.functions.push(regions);

    let mapping = CoverageMappingWriter::build(&[info]).unwrap().unwrap();
    let decoded = read_coverage_mapping(&mapping.covmap_bytes(), &mapping.covfun_bytes()).unwrap();

    assert_eq!(decoded.filenames, vec!["a.kt".to_string()]);
    assert_eq!(decoded.functions.len(), 1);
    let function = &decoded.functions[0];
    assert_eq!(function.name_ref, name_ref("main"));
    assert_eq!(function.structural_hash, 0);
    assert_eq!(function.file_ids, vec![0]);
    assert_eq!(function.num_counters(), 2);
    assert_eq!(
        function.regions,
        vec![
            descriptor(DescriptorKind::Code, 0, (3, 5), (3, 10)),
            descriptor(DescriptorKind::Gap, 1, (3, 10), (4, 5)),
        ]
    );
}

#[test]
fn test_expansion_region_round_trip() {
    let main_file = FileId(0);
    let header = FileId(1);
    let mut regions = FunctionRegions::new(FuncId(0), "main");
    regions.record(ElementId(1), Region::new(span(header, (1, 1), (1, 8)), RegionKind::Code));
    regions.record(
        ElementId(2),
        Region::new(
            span(main_file, (2, 3), (2, 9)),
            RegionKind::Expansion { expanded_file: header },
        ),
    );
    let mut info = FileRegionInfo::new(main_file, "a.kt");
    info.functions.push(regions);
    let infos = vec![info, FileRegionInfo::new(header, "inc.kt")];

    let mapping = CoverageMappingWriter::build(&infos).unwrap().unwrap();
    let decoded = read_coverage_mapping(&mapping.covmap_bytes(), &mapping.covfun_bytes()).unwrap();

    assert_eq!(decoded.filenames, vec!["a.kt".to_string(), "inc.kt".to_string()]);
    let function = &decoded.functions[0];
    // The first region lives in the header, which becomes local file 0.
    assert_eq!(function.file_ids, vec![1, 0]);
    let expansion = function
        .regions
        .iter()
        .find(|r| r.kind == DescriptorKind::Expansion)
        .unwrap();
    assert_eq!(expansion.file_id, 1);
    assert_eq!(expansion.expanded_file_id, 0);
    assert_eq!(function.num_counters(), 1);
}

#[test]
fn test_region_in_unknown_file_is_rejected() {
    let mut regions = FunctionRegions::new(FuncId(0), "main");
    regions.record(ElementId(1), Region::new(span(FileId(5), (1, 1), (1, 2)), RegionKind::Code));
    let mut info = FileRegionInfo::new(FileId(0), "a.kt");
    info.functions.push(regions);

    let err = CoverageMappingWriter::build(&[info]).unwrap_err();
    assert!(matches!(err, CoverageError::UnknownFile { file } if file == FileId(5)));
}

#[test]
fn test_empty_table_writes_nothing() {
    assert!(CoverageMappingWriter::build(&[]).unwrap().is_none());
}

#[test]
fn test_collected_module_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();

    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/tir/sample.tir");
    let ir = TestIR::parse(&std::fs::read_to_string(path).unwrap()).unwrap();
    let adaptor = TestIRAdaptor::new(&ir);
    let arena = Bump::new();
    let session = CoverageSession::new(&arena);
    let mut manager = CoverageManager::new(&session, CoverageConfig::enabled(), "app");
    manager.collect_regions(&adaptor);

    let mapping = CoverageMappingWriter::build(manager.file_region_info())
        .unwrap()
        .unwrap();
    let decoded = read_coverage_mapping(&mapping.covmap_bytes(), &mapping.covfun_bytes()).unwrap();

    assert_eq!(decoded.filenames, mapping.filenames);
    assert_eq!(decoded.functions.len(), 3);
    for (record, function) in mapping.functions.iter().zip(&decoded.functions) {
        assert_eq!(function.name_ref, name_ref(&record.name));
        assert_eq!(function.filenames_ref, mapping.filenames_ref);
        assert_eq!(function.file_ids, record.file_ids);
        assert_eq!(function.num_counters(), record.num_counters);

        let mut expected = record.regions.clone();
        expected.sort_by_key(|r| (r.file_id, r.start_line, r.start_column));
        assert_eq!(function.regions, expected);
    }

    let main = &decoded.functions[0];
    assert_eq!(main.file_ids.len(), 2);
    assert_eq!(
        main.regions
            .iter()
            .filter(|r| r.kind == DescriptorKind::Gap)
            .count(),
        1
    );
}
