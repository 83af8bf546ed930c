// This module provides the CoverageManager, the single object the compiler driver talks to
// for coverage. It owns the configuration, the name of the module being compiled, the
// module-level region table and the instrumentation gate built over it. The driver calls
// collect_regions() once after the IR is final, asks instrumentation_for() once per
// function while generating code, and calls write_region_info() once before the output is
// sealed. With coverage disabled every call is a no-op and every instrumentor is the no-op
// one. The scope policy lives here: a file is covered when its module is the module being
// compiled, or one of the libraries named in the configuration when that list is not
// empty.

//! Coverage orchestration for one compilation.

use crate::core::adaptor::{FileId, FuncId, IrAdaptor};
use crate::core::error::CompileResult;
use crate::core::session::CoverageSession;
use crate::coverage::config::CoverageConfig;
use crate::coverage::instrumentation::{CounterPlacer, InstrumentationGate, Instrumentor, NoopInstrumentor};
use crate::coverage::module_collector::ModuleCollector;
use crate::coverage::region::{FileRegionInfo, FunctionRegions};
use crate::mapping::writer::{CoverageMappingWriter, CoverageSink};

pub struct CoverageManager<'s, 'arena> {
    session: &'s CoverageSession<'arena>,
    config: CoverageConfig,
    current_module: String,
    table: Vec<FileRegionInfo>,
    gate: InstrumentationGate,
}

impl<'s, 'arena> CoverageManager<'s, 'arena> {
    pub fn new(
        session: &'s CoverageSession<'arena>,
        config: CoverageConfig,
        current_module: impl Into<String>,
    ) -> Self {
        Self {
            session,
            config,
            current_module: current_module.into(),
            table: Vec::new(),
            gate: InstrumentationGate::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    pub fn session(&self) -> &'s CoverageSession<'arena> {
        self.session
    }

    /// Whether code from `file` is instrumented.
    pub fn is_covered<A: IrAdaptor + ?Sized>(&self, adaptor: &A, file: FileId) -> bool {
        let module = adaptor.file_module(file);
        if self.config.libraries_to_cover.is_empty() {
            module == self.current_module
        } else {
            self.config.libraries_to_cover.iter().any(|lib| lib == module)
        }
    }

    /// Collect the regions of every in-scope file of the module.
    pub fn collect_regions<A: IrAdaptor + ?Sized>(&mut self, adaptor: &A) {
        if !self.config.enabled {
            return;
        }

        let (infos, stats) = {
            let in_scope = |file: FileId| self.is_covered(adaptor, file);
            let mut collector = ModuleCollector::new(adaptor, &in_scope, self.config.granularity);
            let infos = collector.collect();
            (infos, collector.stats())
        };
        self.session
            .record_skipped(stats.undefined_offsets, stats.inlined_blocks_skipped);

        for mut info in infos {
            info.functions.retain(|regions| {
                if self.gate.lookup(&self.table, regions.function()).is_some() {
                    log::warn!("Regions of {} were already collected", regions.name());
                    return false;
                }
                true
            });

            for regions in &info.functions {
                self.session.record_function_collected(
                    regions.name(),
                    regions.region_count(),
                    regions.gaps().len(),
                );
                let dump = regions.dump(adaptor);
                log::debug!("{}", dump.trim_end());
                if self.config.dump_regions {
                    print!("{}", dump);
                }
            }
            match self.table.iter_mut().find(|existing| existing.file == info.file) {
                Some(existing) => existing.functions.append(&mut info.functions),
                None => {
                    self.session.record_file_in_scope();
                    self.table.push(info);
                }
            }
        }

        self.gate = InstrumentationGate::new(&self.table);
    }

    /// Instrumentor for the function being generated.
    pub fn instrumentation_for<'a>(
        &'a self,
        function: Option<FuncId>,
        placer: &'a mut dyn CounterPlacer,
    ) -> Box<dyn Instrumentor + 'a> {
        if !self.config.enabled {
            return Box::new(NoopInstrumentor);
        }
        if function.is_some_and(|f| self.gate.lookup(&self.table, f).is_some()) {
            self.session.record_function_instrumented();
        }
        self.gate.instrumentation_for(&self.table, function, placer)
    }

    /// Write the collected regions through `sink`.
    pub fn write_region_info(&self, sink: &mut dyn CoverageSink) -> CompileResult<()> {
        if !self.config.enabled {
            return Ok(());
        }
        CoverageMappingWriter::write(&self.table, sink)
    }

    pub fn file_region_info(&self) -> &[FileRegionInfo] {
        &self.table
    }

    /// Collected regions of `function`.
    pub fn function_regions(&self, function: FuncId) -> Option<&FunctionRegions> {
        self.gate.lookup(&self.table, function)
    }
}
