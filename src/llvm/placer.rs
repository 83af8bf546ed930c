//! Counter placement through `llvm.instrprof.increment`.

use hashbrown::HashMap;
use inkwell::builder::Builder;
use inkwell::intrinsics::Intrinsic;
use inkwell::module::{Linkage, Module};
use inkwell::values::{BasicMetadataValueEnum, FunctionValue, GlobalValue};

use crate::core::error::{CompileResult, CoverageError};
use crate::core::session::CoverageSession;
use crate::coverage::instrumentation::{CounterIncrement, CounterPlacer};

const INCREMENT_INTRINSIC: &str = "llvm.instrprof.increment";

/// Emits one intrinsic call per counter increment at the builder's position.
///
/// The profiling lowering pass later turns the calls into counter array
/// updates and creates the per-function profile data.
pub struct LlvmCounterPlacer<'a, 'ctx, 'arena> {
    module: &'a Module<'ctx>,
    builder: &'a Builder<'ctx>,
    session: &'a CoverageSession<'arena>,
    name_vars: HashMap<&'arena str, GlobalValue<'ctx>>,
    increment: Option<FunctionValue<'ctx>>,
}

impl<'a, 'ctx, 'arena> LlvmCounterPlacer<'a, 'ctx, 'arena> {
    pub fn new(
        module: &'a Module<'ctx>,
        builder: &'a Builder<'ctx>,
        session: &'a CoverageSession<'arena>,
    ) -> Self {
        Self {
            module,
            builder,
            session,
            name_vars: HashMap::new(),
            increment: None,
        }
    }

    /// The `__profn_` global holding a function's name, created on first use.
    fn name_var(&mut self, function_name: &str) -> GlobalValue<'ctx> {
        let symbol = self.session.profile_name_symbol(function_name);
        if let Some(&global) = self.name_vars.get(symbol) {
            return global;
        }

        let global = match self.module.get_global(symbol) {
            Some(global) => global,
            None => {
                let context = self.module.get_context();
                let name = context.const_string(function_name.as_bytes(), false);
                let global = self.module.add_global(name.get_type(), None, symbol);
                global.set_initializer(&name);
                global.set_constant(true);
                global.set_linkage(Linkage::Private);
                global
            }
        };
        self.name_vars.insert(symbol, global);
        global
    }

    fn increment_intrinsic(&mut self) -> CompileResult<FunctionValue<'ctx>> {
        if let Some(decl) = self.increment {
            return Ok(decl);
        }

        let decl = Intrinsic::find(INCREMENT_INTRINSIC)
            .and_then(|intrinsic| intrinsic.get_declaration(self.module, &[]))
            .ok_or_else(|| CoverageError::Llvm {
                reason: format!("intrinsic {} is not available", INCREMENT_INTRINSIC),
            })?;
        self.increment = Some(decl);
        Ok(decl)
    }
}

impl CounterPlacer for LlvmCounterPlacer<'_, '_, '_> {
    fn place(&mut self, increment: &CounterIncrement<'_>) -> CompileResult<()> {
        let name_var = self.name_var(increment.function_name);
        let decl = self.increment_intrinsic()?;

        let context = self.module.get_context();
        let i32_type = context.i32_type();
        let args: [BasicMetadataValueEnum; 4] = [
            name_var.as_pointer_value().into(),
            context.i64_type().const_int(increment.function_hash, false).into(),
            i32_type.const_int(u64::from(increment.num_counters), false).into(),
            i32_type.const_int(u64::from(increment.counter_id), false).into(),
        ];
        self.builder.build_call(decl, &args, "")?;

        self.session.record_increment_placed();
        Ok(())
    }
}
