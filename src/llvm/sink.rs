// This module stores coverage mapping records in an LLVM module as the globals the LLVM
// coverage toolchain looks for. The module-level record becomes the private constant
// __llvm_coverage_mapping, a struct of the four-field covmap header and the encoded
// filenames, placed in the covmap section. Every function record becomes a packed
// __covrec_<NAMEREF>u constant in the covfun section with linkonce_odr linkage and hidden
// visibility, so identical records from several objects fold at link time. All of them
// are appended to llvm.used, merging with an existing llvm.used array if the module
// already has one, so that nothing strips them before the object is written. Section
// names follow the module's target triple.

//! Coverage mapping globals for LLVM modules.

use inkwell::module::{Linkage, Module};
use inkwell::values::{AsValueRef, BasicValueEnum, GlobalValue, PointerValue};
use inkwell::{AddressSpace, GlobalVisibility};
use llvm_sys::core::{LLVMGetNumOperands, LLVMGetOperand};

use crate::core::error::{CompileResult, CoverageError};
use crate::mapping::format::{
    function_record_symbol, CoverageSections, ObjectFormat, COVERAGE_MAPPING_VAR,
};
use crate::mapping::writer::{CoverageMapping, CoverageSink, FunctionRecord};

const LLVM_USED: &str = "llvm.used";
const LLVM_METADATA_SECTION: &str = "llvm.metadata";
const RECORD_ALIGNMENT: u32 = 8;

/// Sink writing coverage globals into an LLVM module.
///
/// The module is attached by the code generator once it exists; writing
/// through an unattached sink is an internal error.
#[derive(Default)]
pub struct LlvmCoverageSink<'m, 'ctx> {
    module: Option<&'m Module<'ctx>>,
}

impl<'m, 'ctx> LlvmCoverageSink<'m, 'ctx> {
    pub fn new() -> Self {
        Self { module: None }
    }

    pub fn attached(module: &'m Module<'ctx>) -> Self {
        Self { module: Some(module) }
    }
}

impl CoverageSink for LlvmCoverageSink<'_, '_> {
    fn emit_coverage(&mut self, mapping: &CoverageMapping) -> CompileResult<()> {
        let module = self.module.ok_or(CoverageError::ModuleNotInitialized)?;

        let triple = module.get_triple();
        let format = ObjectFormat::from_triple(&triple.as_str().to_string_lossy());
        let sections = format.sections();

        let mut used = Vec::with_capacity(mapping.functions.len() + 1);
        used.push(emit_mapping_header(module, mapping, &sections));
        for record in &mapping.functions {
            used.push(emit_function_record(module, record, mapping.filenames_ref, &sections, format));
        }

        append_to_used(module, &used);
        log::debug!(
            "Emitted {} coverage records into section {}",
            mapping.functions.len(),
            sections.covfun
        );
        Ok(())
    }
}

fn emit_mapping_header<'ctx>(
    module: &Module<'ctx>,
    mapping: &CoverageMapping,
    sections: &CoverageSections,
) -> GlobalValue<'ctx> {
    let context = module.get_context();
    let i32_type = context.i32_type();

    let header_fields: Vec<BasicValueEnum> = mapping
        .covmap_header()
        .iter()
        .map(|&field| i32_type.const_int(u64::from(field), false).into())
        .collect();
    let header = context.const_struct(&header_fields, false);
    let filenames = context.const_string(&mapping.encoded_filenames, false);
    let value = context.const_struct(&[header.into(), filenames.into()], false);

    let global = module.add_global(value.get_type(), None, COVERAGE_MAPPING_VAR);
    global.set_initializer(&value);
    global.set_constant(true);
    global.set_linkage(Linkage::Private);
    global.set_section(Some(sections.covmap));
    global.set_alignment(RECORD_ALIGNMENT);
    global
}

fn emit_function_record<'ctx>(
    module: &Module<'ctx>,
    record: &FunctionRecord,
    filenames_ref: u64,
    sections: &CoverageSections,
    format: ObjectFormat,
) -> GlobalValue<'ctx> {
    let context = module.get_context();
    let i32_type = context.i32_type();
    let i64_type = context.i64_type();

    let fields: [BasicValueEnum; 5] = [
        i64_type.const_int(record.name_ref, false).into(),
        i32_type.const_int(record.mapping_data.len() as u64, false).into(),
        i64_type.const_int(record.structural_hash, false).into(),
        i64_type.const_int(filenames_ref, false).into(),
        context.const_string(&record.mapping_data, false).into(),
    ];
    let value = context.const_struct(&fields, true);

    let name = function_record_symbol(record.name_ref);
    let global = module.add_global(value.get_type(), None, &name);
    global.set_initializer(&value);
    global.set_constant(true);
    global.set_linkage(Linkage::LinkOnceODR);
    global.set_visibility(GlobalVisibility::Hidden);
    global.set_section(Some(sections.covfun));
    global.set_alignment(RECORD_ALIGNMENT);
    if format != ObjectFormat::MachO {
        global.set_comdat(module.get_or_insert_comdat(&name));
    }

    log::trace!("Coverage record {} for {}", name, record.name);
    global
}

/// Add `globals` to `llvm.used`, keeping entries already present.
fn append_to_used<'ctx>(module: &Module<'ctx>, globals: &[GlobalValue<'ctx>]) {
    let context = module.get_context();
    let ptr_type = context.ptr_type(AddressSpace::default());

    let mut entries: Vec<PointerValue<'ctx>> = Vec::new();
    if let Some(existing) = module.get_global(LLVM_USED) {
        if let Some(BasicValueEnum::ArrayValue(array)) = existing.get_initializer() {
            let raw = array.as_value_ref();
            // SAFETY: `raw` is a constant array of pointers; every operand is a
            // pointer-typed constant owned by the same context.
            unsafe {
                let count = LLVMGetNumOperands(raw);
                for idx in 0..count.max(0) as u32 {
                    entries.push(PointerValue::new(LLVMGetOperand(raw, idx)));
                }
            }
        }
        // SAFETY: the old array is replaced below and nothing else refers to it.
        unsafe { existing.delete() };
    }
    entries.extend(globals.iter().map(|g| g.as_pointer_value()));

    let array = ptr_type.const_array(&entries);
    let used = module.add_global(array.get_type(), None, LLVM_USED);
    used.set_initializer(&array);
    used.set_linkage(Linkage::Appending);
    used.set_section(Some(LLVM_METADATA_SECTION));
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;

    #[test]
    fn test_unattached_sink_reports_internal_error() {
        let mapping = CoverageMapping {
            version: 3,
            filenames: vec!["a.kt".into()],
            encoded_filenames: vec![1, 5, 0, 4, b'a', b'.', b'k', b't'],
            filenames_ref: 0,
            functions: Vec::new(),
        };
        let err = LlvmCoverageSink::new().emit_coverage(&mapping).unwrap_err();
        assert!(matches!(err, CoverageError::ModuleNotInitialized));
        assert!(err.to_string().starts_with("internal error"));
    }

    #[test]
    fn test_existing_used_entries_are_kept() {
        let context = Context::create();
        let module = context.create_module("m");
        let keep = module.add_global(context.i8_type(), None, "keep_me");
        keep.set_initializer(&context.i8_type().const_zero());
        append_to_used(&module, &[keep]);

        let other = module.add_global(context.i8_type(), None, "other");
        other.set_initializer(&context.i8_type().const_zero());
        append_to_used(&module, &[other]);

        let ir = module.print_to_string().to_string();
        assert!(ir.contains("@llvm.used = appending global [2 x ptr] [ptr @keep_me, ptr @other]"), "{ir}");
    }
}
