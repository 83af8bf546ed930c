// This module connects collected regions to code generation. The code generator asks the
// gate for an instrumentor once per function it lowers, then reports every IR element it
// reaches in evaluation order. For elements that own a region the instrumentor hands a
// CounterIncrement to a backend-supplied CounterPlacer, which materializes the increment
// at the generator's current position (an LLVM intrinsic call, or an x86-64 memory
// increment). Functions without regions, and compilations without coverage, get the
// NoopInstrumentor, so the generator never branches on whether coverage is on. Lookup is
// by FuncId through an index built once after collection.

//! Counter placement during code generation.

use hashbrown::{HashMap, HashSet};

use crate::core::adaptor::{ElementId, FuncId};
use crate::core::error::CompileResult;
use crate::coverage::region::{CounterId, FileRegionInfo, FunctionRegions};

/// Parameters of one counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterIncrement<'a> {
    /// Linkage name of the instrumented function.
    pub function_name: &'a str,
    pub function_hash: u64,
    /// Size of the function's counter array.
    pub num_counters: u32,
    pub counter_id: CounterId,
}

/// Backend callback that emits one counter increment at the current position.
pub trait CounterPlacer {
    fn place(&mut self, increment: &CounterIncrement<'_>) -> CompileResult<()>;
}

impl<F> CounterPlacer for F
where
    F: FnMut(&CounterIncrement<'_>) -> CompileResult<()>,
{
    fn place(&mut self, increment: &CounterIncrement<'_>) -> CompileResult<()> {
        self(increment)
    }
}

/// Per-function hook invoked by the code generator.
pub trait Instrumentor {
    /// Called each time code generation reaches `element`.
    fn on_element_reached(&mut self, element: ElementId) -> CompileResult<()>;
}

/// Instrumentor that places nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInstrumentor;

impl Instrumentor for NoopInstrumentor {
    fn on_element_reached(&mut self, _element: ElementId) -> CompileResult<()> {
        Ok(())
    }
}

/// Instrumentor for one function with regions.
pub struct RegionInstrumentor<'a> {
    regions: &'a FunctionRegions,
    placer: &'a mut dyn CounterPlacer,
    placed: HashSet<ElementId>,
}

impl<'a> RegionInstrumentor<'a> {
    pub fn new(regions: &'a FunctionRegions, placer: &'a mut dyn CounterPlacer) -> Self {
        Self {
            regions,
            placer,
            placed: HashSet::new(),
        }
    }
}

impl Instrumentor for RegionInstrumentor<'_> {
    fn on_element_reached(&mut self, element: ElementId) -> CompileResult<()> {
        let Some(counter_id) = self.regions.counter_id(element) else {
            return Ok(());
        };

        if !self.placed.insert(element) {
            log::trace!("Counter {} of {} already placed", counter_id, self.regions.name());
            return Ok(());
        }

        log::trace!("Placing counter {} of {}", counter_id, self.regions.name());
        self.placer.place(&CounterIncrement {
            function_name: self.regions.name(),
            function_hash: self.regions.structural_hash(),
            num_counters: self.regions.num_counters(),
            counter_id,
        })
    }
}

/// Identity index from functions to their collected regions.
#[derive(Debug, Default, Clone)]
pub struct InstrumentationGate {
    /// FuncId to (file slot, function slot) in the region table.
    index: HashMap<FuncId, (usize, usize)>,
}

impl InstrumentationGate {
    /// Index every function of `table`.
    pub fn new(table: &[FileRegionInfo]) -> Self {
        let mut index = HashMap::new();
        for (file_slot, info) in table.iter().enumerate() {
            for (func_slot, regions) in info.functions.iter().enumerate() {
                index.insert(regions.function(), (file_slot, func_slot));
            }
        }
        Self { index }
    }

    /// Regions of `function`, if it was collected.
    pub fn lookup<'t>(
        &self,
        table: &'t [FileRegionInfo],
        function: FuncId,
    ) -> Option<&'t FunctionRegions> {
        let &(file_slot, func_slot) = self.index.get(&function)?;
        table.get(file_slot)?.functions.get(func_slot)
    }

    /// Instrumentor for `function`; the no-op one if it has no regions.
    pub fn instrumentation_for<'a>(
        &self,
        table: &'a [FileRegionInfo],
        function: Option<FuncId>,
        placer: &'a mut dyn CounterPlacer,
    ) -> Box<dyn Instrumentor + 'a> {
        match function.and_then(|f| self.lookup(table, f)) {
            Some(regions) => Box::new(RegionInstrumentor::new(regions, placer)),
            None => Box::new(NoopInstrumentor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::adaptor::{FileId, LineColumn};
    use crate::coverage::region::{Region, RegionKind, SourceSpan};

    fn table() -> Vec<FileRegionInfo> {
        let span = SourceSpan::new(
            FileId(0),
            LineColumn { line: 1, column: 1 },
            LineColumn { line: 1, column: 4 },
        )
        .unwrap();
        let mut regions = FunctionRegions::new(FuncId(3), "f");
        regions.record(ElementId(10), Region::new(span, RegionKind::Code));
        regions.record(ElementId(11), Region::new(span, RegionKind::Code));
        regions.record_gap(Region::new(span, RegionKind::Gap));

        let mut info = FileRegionInfo::new(FileId(0), "a.kt");
        info.functions.push(regions);
        vec![info]
    }

    #[test]
    fn test_increment_carries_full_counter_count() {
        let table = table();
        let gate = InstrumentationGate::new(&table);
        let mut placed = Vec::new();
        let mut placer = |inc: &CounterIncrement<'_>| -> CompileResult<()> {
            placed.push((inc.function_name.to_string(), inc.num_counters, inc.counter_id));
            Ok(())
        };

        {
            let mut instr = gate.instrumentation_for(&table, Some(FuncId(3)), &mut placer);
            instr.on_element_reached(ElementId(11)).unwrap();
            instr.on_element_reached(ElementId(99)).unwrap();
            instr.on_element_reached(ElementId(11)).unwrap();
            instr.on_element_reached(ElementId(10)).unwrap();
        }

        assert_eq!(placed, vec![("f".to_string(), 3, 1), ("f".to_string(), 3, 0)]);
    }

    #[test]
    fn test_unknown_function_gets_noop() {
        let table = table();
        let gate = InstrumentationGate::new(&table);
        let mut calls = 0;
        let mut placer = |_: &CounterIncrement<'_>| -> CompileResult<()> {
            calls += 1;
            Ok(())
        };

        {
            let mut instr = gate.instrumentation_for(&table, Some(FuncId(4)), &mut placer);
            instr.on_element_reached(ElementId(10)).unwrap();
        }
        {
            let mut instr = gate.instrumentation_for(&table, None, &mut placer);
            instr.on_element_reached(ElementId(10)).unwrap();
        }

        assert_eq!(calls, 0);
    }
}
