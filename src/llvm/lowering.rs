// This module lowers an IR module into an LLVM module carrying coverage instrumentation.
// Every function with a body of its own becomes a `void ()` LLVM function whose entry
// block receives the counter increments the instrumentor places while the codegen walk
// visits the body, followed by a return. The IR has no value semantics to translate, so
// the increments are the whole body; what matters downstream is that the intrinsic calls,
// the profile name globals and the coverage mapping globals agree with each other. After
// all functions are lowered, the manager writes the region table into the module through
// an LlvmCoverageSink.

//! LLVM lowering driver.

use inkwell::context::Context;
use inkwell::module::Module;

use crate::codegen::{functions_to_lower, walk_function};
use crate::core::adaptor::IrAdaptor;
use crate::core::error::{CompileResult, CoverageError};
use crate::coverage::manager::CoverageManager;
use crate::llvm::placer::LlvmCounterPlacer;
use crate::llvm::sink::LlvmCoverageSink;

/// Lower every function of the adaptor's module into `module`.
pub fn lower_module<'ctx, A: IrAdaptor + ?Sized>(
    context: &'ctx Context,
    module: &Module<'ctx>,
    adaptor: &A,
    manager: &CoverageManager<'_, '_>,
) -> CompileResult<()> {
    let builder = context.create_builder();
    let fn_type = context.void_type().fn_type(&[], false);

    for func in functions_to_lower(adaptor) {
        let name = adaptor.func_link_name(func);
        let function = module.add_function(name, fn_type, None);
        let entry = context.append_basic_block(function, "entry");
        builder.position_at_end(entry);

        {
            let mut placer = LlvmCounterPlacer::new(module, &builder, manager.session());
            let mut instrumentor = manager.instrumentation_for(Some(func), &mut placer);
            walk_function(adaptor, func, instrumentor.as_mut())?;
        }

        builder.build_return(None)?;
        log::debug!("Lowered {}", name);
    }

    let mut sink = LlvmCoverageSink::attached(module);
    manager.write_region_info(&mut sink)?;

    module.verify().map_err(|e| CoverageError::Llvm {
        reason: e.to_string(),
    })
}

/// Create a module for `adaptor`'s IR and lower it.
pub fn lower_to_module<'ctx, A: IrAdaptor + ?Sized>(
    context: &'ctx Context,
    adaptor: &A,
    manager: &CoverageManager<'_, '_>,
    triple: Option<&str>,
) -> CompileResult<Module<'ctx>> {
    let module = context.create_module(adaptor.module_name());
    if let Some(triple) = triple {
        module.set_triple(&inkwell::targets::TargetTriple::create(triple));
    }
    lower_module(context, &module, adaptor, manager)?;
    Ok(module)
}
