//! Module-level region collection.
//!
//! Runs the region collector over every coverable function of every in-scope
//! file and groups the results per file. Nested function declarations are
//! listed by the adaptor alongside top-level ones, so each gets its own
//! [`FunctionRegions`].

use crate::core::adaptor::{FileId, IrAdaptor};
use crate::coverage::collector::{CollectorStats, RegionCollector};
use crate::coverage::config::RegionGranularity;
use crate::coverage::region::FileRegionInfo;

pub struct ModuleCollector<'a, A: IrAdaptor + ?Sized> {
    adaptor: &'a A,
    in_scope: &'a dyn Fn(FileId) -> bool,
    collector: RegionCollector<'a, A>,
}

impl<'a, A: IrAdaptor + ?Sized> ModuleCollector<'a, A> {
    pub fn new(
        adaptor: &'a A,
        in_scope: &'a dyn Fn(FileId) -> bool,
        granularity: RegionGranularity,
    ) -> Self {
        Self {
            adaptor,
            in_scope,
            collector: RegionCollector::new(adaptor, in_scope, granularity),
        }
    }

    /// Collect every in-scope file, in the adaptor's file order.
    pub fn collect(&mut self) -> Vec<FileRegionInfo> {
        let adaptor = self.adaptor;
        let mut infos = Vec::new();

        for file in adaptor.files() {
            if !(self.in_scope)(file) {
                log::trace!("File {} is not in coverage scope", adaptor.file_name(file));
                continue;
            }

            let mut info = FileRegionInfo::new(file, adaptor.file_name(file));
            for func in adaptor.file_functions(file) {
                if !RegionCollector::is_coverable(adaptor, func) {
                    log::trace!("Function {} is not coverable", adaptor.func_link_name(func));
                    continue;
                }

                let regions = self.collector.collect(func);
                if regions.is_empty() {
                    log::debug!("Function {} has no regions", regions.name());
                    continue;
                }
                info.functions.push(regions);
            }
            infos.push(info);
        }

        infos
    }

    pub fn stats(&self) -> CollectorStats {
        self.collector.stats()
    }
}

/// Collect the region table of a whole module.
pub fn collect_module<A: IrAdaptor + ?Sized>(
    adaptor: &A,
    in_scope: &dyn Fn(FileId) -> bool,
    granularity: RegionGranularity,
) -> Vec<FileRegionInfo> {
    ModuleCollector::new(adaptor, in_scope, granularity).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_ir::{TestIR, TestIRAdaptor};

    const MODULE: &str = r#"
        module app
        file "a.kt" {
          fun outer @0..30 {
            call f @1..4
            fun inner @10..20 { call g @12..15 }
          }
          inline fun inl @0..5 { call h @1..2 }
          extern fun ext
          fun empty @21..22 { }
        }
        file "b.kt" { }
        file "lib.kt" in stdlib { fun libfun @0..9 { call k @1..3 } }
    "#;

    #[test]
    fn test_module_collection_filters_scope_and_functions() {
        let ir = TestIR::parse(MODULE).unwrap();
        let adaptor = TestIRAdaptor::new(&ir);
        let in_scope = |file: FileId| adaptor.file_module(file) == "app";

        let infos = collect_module(&adaptor, &in_scope, RegionGranularity::Leaves);

        let files: Vec<_> = infos.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(files, vec!["a.kt", "b.kt"]);

        let names: Vec<_> = infos[0].functions.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["outer", "inner"]);
        assert!(infos[1].functions.is_empty());

        // The nested declaration is not part of the outer function's regions.
        assert_eq!(infos[0].functions[0].region_count(), 1);
        assert_eq!(infos[0].functions[1].region_count(), 1);
    }

    #[test]
    fn test_empty_scope_yields_empty_table() {
        let ir = TestIR::parse(MODULE).unwrap();
        let adaptor = TestIRAdaptor::new(&ir);
        let in_scope = |_: FileId| false;

        assert!(collect_module(&adaptor, &in_scope, RegionGranularity::Leaves).is_empty());
    }
}
