//! Coverage instrumentation through the native backend.

use bumpalo::Bump;
use object::{Object, ObjectSection, ObjectSymbol, RelocationTarget};
use std::path::Path;

use covmap::codegen::native::compile_to_object;
use covmap::core::CoverageSession;
use covmap::coverage::{CoverageConfig, CoverageManager, RegionGranularity};
use covmap::mapping::{name_ref, read_coverage_mapping, DescriptorKind};
use covmap::test_ir::{TestIR, TestIRAdaptor};

fn load_sample() -> TestIR {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/tir/sample.tir");
    TestIR::parse(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn compile(ir: &TestIR, config: CoverageConfig) -> Vec<u8> {
    let adaptor = TestIRAdaptor::new(ir);
    let arena = Bump::new();
    let session = CoverageSession::new(&arena);
    let mut manager = CoverageManager::new(&session, config, ir.module.as_str());
    manager.collect_regions(&adaptor);
    compile_to_object(&adaptor, &manager).unwrap()
}

#[test]
fn test_object_mapping_decodes() {
    let _ = env_logger::builder().is_test(true).try_init();

    let ir = load_sample();
    let bytes = compile(&ir, CoverageConfig::enabled());
    let file = object::File::parse(&*bytes).unwrap();

    let covmap = file.section_by_name("__llvm_covmap").unwrap();
    let covfun = file.section_by_name("__llvm_covfun").unwrap();
    let mapping = read_coverage_mapping(covmap.data().unwrap(), covfun.data().unwrap()).unwrap();

    assert_eq!(mapping.filenames, vec!["src/app.kt".to_string(), "src/util.kt".to_string()]);
    let refs: Vec<u64> = mapping.functions.iter().map(|f| f.name_ref).collect();
    assert_eq!(refs, vec![name_ref("main"), name_ref("local"), name_ref("util")]);

    let main = &mapping.functions[0];
    assert_eq!(main.num_counters(), 8);
    assert_eq!(main.file_ids, vec![0, 1]);
    let helper = main.regions.iter().find(|r| r.file_id == 1).unwrap();
    assert_eq!(helper.kind, DescriptorKind::Code);
    assert_eq!((helper.start_line, helper.start_column), (1, 3));
}

#[test]
fn test_object_lists_recorded_function_names() {
    let ir = load_sample();
    let bytes = compile(&ir, CoverageConfig::enabled());
    let file = object::File::parse(&*bytes).unwrap();

    let names = file.section_by_name("__llvm_prf_names").unwrap();
    let joined = b"main\x01local\x01util";
    assert_eq!(names.data().unwrap(), [&[joined.len() as u8, 0][..], joined].concat());
}

#[test]
fn test_counter_relocations_match_regions() {
    let ir = load_sample();
    let bytes = compile(&ir, CoverageConfig::enabled());
    let file = object::File::parse(&*bytes).unwrap();

    let counters = file.section_by_name("__llvm_prf_cnts").unwrap();
    // main: 7 regions + 1 gap, local: 1, util: 1
    assert_eq!(counters.size(), 10 * 8);

    let text = file.section_by_name(".text").unwrap();
    let mut main_slots = Vec::new();
    let mut total = 0;
    for (_, reloc) in text.relocations() {
        total += 1;
        let RelocationTarget::Symbol(index) = reloc.target() else {
            panic!("relocation without symbol");
        };
        let symbol = file.symbol_by_index(index).unwrap();
        if symbol.name().unwrap() == "__profc_main" {
            main_slots.push((reloc.addend() + 4) / 8);
        }
    }

    // The shared call is reached twice but incremented once.
    assert_eq!(total, 9);
    main_slots.sort_unstable();
    assert_eq!(main_slots, (0..7).collect::<Vec<i64>>());

    for name in ["main", "local", "util"] {
        assert!(file.symbol_by_name(name).is_some(), "missing {name}");
    }
    assert!(file.symbol_by_name("inlined").is_none());
    assert!(file.symbol_by_name("corefn").is_some());
}

#[test]
fn test_uncovered_object_has_no_coverage_sections() {
    let ir = load_sample();
    let bytes = compile(&ir, CoverageConfig::default());
    let file = object::File::parse(&*bytes).unwrap();

    assert!(file.section_by_name("__llvm_covmap").is_none());
    assert!(file.section_by_name("__llvm_covfun").is_none());
    assert!(file.section_by_name("__llvm_prf_names").is_none());
    assert!(file.section_by_name("__llvm_prf_cnts").is_none());
    assert_eq!(file.section_by_name(".text").unwrap().relocations().count(), 0);
}

#[test]
fn test_branch_granularity_uses_fewer_counters() {
    let ir = load_sample();
    let config = CoverageConfig::enabled().with_granularity(RegionGranularity::Branches);
    let bytes = compile(&ir, config);
    let file = object::File::parse(&*bytes).unwrap();

    let covmap = file.section_by_name("__llvm_covmap").unwrap();
    let covfun = file.section_by_name("__llvm_covfun").unwrap();
    let mapping = read_coverage_mapping(covmap.data().unwrap(), covfun.data().unwrap()).unwrap();

    // compute, flag, log, const 0 (branch result), inline block, helper + gap
    assert_eq!(mapping.functions[0].num_counters(), 7);
    // `local` only reads a value and has no regions left.
    assert_eq!(mapping.functions.len(), 2);
}
