//! Coverage instrumentation through the LLVM backend.

use bumpalo::Bump;
use inkwell::context::Context;
use std::path::Path;

use covmap::core::CoverageSession;
use covmap::coverage::{CoverageConfig, CoverageManager};
use covmap::llvm::lower_to_module;
use covmap::mapping::format::function_record_symbol;
use covmap::mapping::name_ref;
use covmap::test_ir::{TestIR, TestIRAdaptor};

const TRIPLE: &str = "x86_64-unknown-linux-gnu";

fn load_sample() -> TestIR {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/tir/sample.tir");
    TestIR::parse(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_instrumented_module_has_coverage_globals() {
    let _ = env_logger::builder().is_test(true).try_init();

    let ir = load_sample();
    let adaptor = TestIRAdaptor::new(&ir);
    let arena = Bump::new();
    let session = CoverageSession::new(&arena);
    let mut manager = CoverageManager::new(&session, CoverageConfig::enabled(), "app");
    manager.collect_regions(&adaptor);

    let context = Context::create();
    let module = lower_to_module(&context, &adaptor, &manager, Some(TRIPLE)).unwrap();
    let text = module.print_to_string().to_string();

    assert!(text.contains("@__llvm_coverage_mapping = private constant"), "{text}");
    assert!(text.contains("section \"__llvm_covmap\""), "{text}");
    assert!(text.contains("section \"__llvm_covfun\""), "{text}");
    for name in ["main", "local", "util"] {
        let record = function_record_symbol(name_ref(name));
        assert!(
            text.contains(&format!("@{} = linkonce_odr hidden constant", record)),
            "missing record {record} for {name}:\n{text}"
        );
        assert!(text.contains(&format!("@__profn_{name} = private constant")), "{text}");
    }
    assert!(text.contains("@llvm.used = appending global [4 x ptr]"), "{text}");

    // One increment per explicit region of main; the gap is never incremented.
    let main_increments = text
        .matches("call void @llvm.instrprof.increment(ptr @__profn_main, i64 0, i32 8, i32 ")
        .count();
    assert_eq!(main_increments, 7);
    assert!(text.contains("call void @llvm.instrprof.increment(ptr @__profn_main, i64 0, i32 8, i32 0)"));
    assert!(!text.contains("i32 8, i32 7)"));

    let stats = session.stats();
    assert_eq!(stats.functions_instrumented, 3);
    assert_eq!(stats.increments_placed, 9);
}

#[test]
fn test_disabled_coverage_leaves_module_untouched() {
    let ir = load_sample();
    let adaptor = TestIRAdaptor::new(&ir);
    let arena = Bump::new();
    let session = CoverageSession::new(&arena);
    let mut manager = CoverageManager::new(&session, CoverageConfig::default(), "app");
    manager.collect_regions(&adaptor);

    let context = Context::create();
    let module = lower_to_module(&context, &adaptor, &manager, Some(TRIPLE)).unwrap();
    let text = module.print_to_string().to_string();

    assert!(module.get_function("main").is_some());
    assert!(!text.contains("__llvm_coverage_mapping"));
    assert!(!text.contains("llvm.instrprof.increment"));
    assert!(!text.contains("llvm.used"));
    assert_eq!(session.stats().increments_placed, 0);
}

#[test]
fn test_mach_o_records_have_no_comdat() {
    let ir = TestIR::parse(r#"module m file "a.kt" { fun f @0..9 { call g @1..4 } }"#).unwrap();
    let adaptor = TestIRAdaptor::new(&ir);
    let arena = Bump::new();
    let session = CoverageSession::new(&arena);
    let mut manager = CoverageManager::new(&session, CoverageConfig::enabled(), "m");
    manager.collect_regions(&adaptor);

    let context = Context::create();
    let module = lower_to_module(&context, &adaptor, &manager, Some("arm64-apple-macosx14.0.0")).unwrap();
    let text = module.print_to_string().to_string();

    assert!(text.contains("section \"__LLVM_COV,__llvm_covmap\""), "{text}");
    assert!(text.contains("section \"__LLVM_COV,__llvm_covfun\""), "{text}");
    assert!(!text.contains("comdat"), "{text}");
}
