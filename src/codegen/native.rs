//! Native (x86-64 ELF) compilation driver.

use crate::codegen::{functions_to_lower, walk_function};
use crate::core::adaptor::IrAdaptor;
use crate::core::error::CompileResult;
use crate::coverage::manager::CoverageManager;
use crate::object_file::{ObjectCoverageSink, ObjectModule};
use crate::x64::counter_placer::X64CounterPlacer;

/// Compile every function of the adaptor's module into an ELF object.
pub fn compile_to_object<A: IrAdaptor + ?Sized>(
    adaptor: &A,
    manager: &CoverageManager<'_, '_>,
) -> CompileResult<Vec<u8>> {
    let mut module = ObjectModule::new_elf_x86_64();

    for func in functions_to_lower(adaptor) {
        let mut placer = X64CounterPlacer::new(manager.session(), adaptor.func_link_name(func))?;
        placer.emit_prologue()?;
        {
            let mut instrumentor = manager.instrumentation_for(Some(func), &mut placer);
            walk_function(adaptor, func, instrumentor.as_mut())?;
        }
        placer.emit_epilogue()?;
        module.add_function(&placer.finish())?;
    }

    {
        let mut sink = ObjectCoverageSink::attached(&mut module);
        manager.write_region_info(&mut sink)?;
    }

    module.write()
}
