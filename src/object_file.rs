// This module writes the native output: an x86-64 ELF relocatable object built with the
// object crate. Function code goes to .text with one global symbol per function and an
// R_X86_64_PC32 relocation for every counter increment. Counter arrays are zero-filled
// local symbols in __llvm_prf_cnts, sized from the increments that reference them. The
// coverage mapping records are stored verbatim in __llvm_covmap and __llvm_covfun, each
// record padded to 8 bytes, which is the same layout the LLVM backend produces. The names
// of the recorded functions go to __llvm_prf_names, where llvm-cov resolves the name refs
// of the function records. ObjectCoverageSink is the CoverageSink
// side of the module and mirrors the LLVM sink: it must be attached to a module before
// the manager writes through it.

//! ELF object emission for natively generated code.

use hashbrown::HashMap;
use object::write::{Object, Relocation, SectionId, StandardSection, Symbol, SymbolId, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, RelocationEncoding, RelocationFlags, RelocationKind,
    SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

use crate::core::error::{CompileResult, CoverageError};
use crate::mapping::format::{CoverageSections, ObjectFormat, RECORD_ALIGNMENT};
use crate::mapping::writer::{CoverageMapping, CoverageSink};
use crate::x64::counter_placer::{CounterArray, X64FunctionCode, COUNTER_SIZE};

const FUNCTION_ALIGNMENT: u64 = 16;

/// Relocatable object under construction.
pub struct ObjectModule {
    object: Object<'static>,
    sections: CoverageSections,
    text: SectionId,
    counters_section: Option<SectionId>,
    counters: HashMap<String, (SymbolId, u32)>,
    has_coverage: bool,
}

impl ObjectModule {
    /// An empty x86-64 ELF object.
    pub fn new_elf_x86_64() -> Self {
        let mut object = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        let text = object.section_id(StandardSection::Text);
        Self {
            object,
            sections: ObjectFormat::Elf.sections(),
            text,
            counters_section: None,
            counters: HashMap::new(),
            has_coverage: false,
        }
    }

    fn counters_section(&mut self) -> SectionId {
        if let Some(section) = self.counters_section {
            return section;
        }
        let section = self.object.add_section(
            Vec::new(),
            self.sections.counters.as_bytes().to_vec(),
            SectionKind::Data,
        );
        self.counters_section = Some(section);
        section
    }

    /// The symbol of a zero-initialized counter array, allocated on first use.
    fn counter_array(&mut self, array: &CounterArray) -> CompileResult<SymbolId> {
        if let Some(&(symbol, size)) = self.counters.get(&array.symbol) {
            if size != array.num_counters {
                return Err(CoverageError::Encoding {
                    reason: format!(
                        "counter array {} used with {} and {} counters",
                        array.symbol, size, array.num_counters
                    ),
                });
            }
            return Ok(symbol);
        }

        let section = self.counters_section();
        let symbol = self.object.add_symbol(Symbol {
            name: array.symbol.as_bytes().to_vec(),
            value: 0,
            size: 0,
            kind: SymbolKind::Data,
            scope: SymbolScope::Compilation,
            weak: false,
            section: SymbolSection::Undefined,
            flags: SymbolFlags::None,
        });
        let zeros = vec![0u8; array.num_counters as usize * COUNTER_SIZE as usize];
        self.object.add_symbol_data(symbol, section, &zeros, COUNTER_SIZE);
        self.counters.insert(array.symbol.clone(), (symbol, array.num_counters));
        Ok(symbol)
    }

    /// Add one function's code, its symbol and its counter relocations.
    pub fn add_function(&mut self, function: &X64FunctionCode) -> CompileResult<()> {
        let mut arrays = HashMap::new();
        for array in &function.counters {
            arrays.insert(array.symbol.as_str(), self.counter_array(array)?);
        }

        let symbol = self.object.add_symbol(Symbol {
            name: function.name.as_bytes().to_vec(),
            value: 0,
            size: 0,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Undefined,
            flags: SymbolFlags::None,
        });
        let offset = self
            .object
            .add_symbol_data(symbol, self.text, &function.code, FUNCTION_ALIGNMENT);

        for reloc in &function.relocations {
            let target = arrays.get(reloc.symbol.as_str()).copied().ok_or_else(|| {
                CoverageError::Encoding {
                    reason: format!("relocation against unknown counter array {}", reloc.symbol),
                }
            })?;
            self.object.add_relocation(
                self.text,
                Relocation {
                    offset: offset + reloc.offset,
                    symbol: target,
                    addend: reloc.addend,
                    flags: RelocationFlags::Generic {
                        kind: RelocationKind::Relative,
                        encoding: RelocationEncoding::Generic,
                        size: 32,
                    },
                },
            )?;
        }

        log::debug!(
            "Added {} ({} bytes, {} counter references)",
            function.name,
            function.code.len(),
            function.relocations.len()
        );
        Ok(())
    }

    fn add_coverage(&mut self, mapping: &CoverageMapping) {
        let covmap = self.object.add_section(
            Vec::new(),
            self.sections.covmap.as_bytes().to_vec(),
            SectionKind::ReadOnlyData,
        );
        self.object
            .append_section_data(covmap, &mapping.covmap_bytes(), RECORD_ALIGNMENT as u64);

        let covfun = self.object.add_section(
            Vec::new(),
            self.sections.covfun.as_bytes().to_vec(),
            SectionKind::ReadOnlyData,
        );
        for record in &mapping.functions {
            self.object.append_section_data(
                covfun,
                &record.covfun_bytes(mapping.filenames_ref),
                RECORD_ALIGNMENT as u64,
            );
        }

        let names = self.object.add_section(
            Vec::new(),
            self.sections.names.as_bytes().to_vec(),
            SectionKind::ReadOnlyData,
        );
        self.object.append_section_data(names, &mapping.names_bytes(), 1);
        self.has_coverage = true;
    }

    /// Serialize the object.
    pub fn write(self) -> CompileResult<Vec<u8>> {
        Ok(self.object.write()?)
    }
}

/// Sink storing coverage records in an [`ObjectModule`].
#[derive(Default)]
pub struct ObjectCoverageSink<'m> {
    module: Option<&'m mut ObjectModule>,
}

impl<'m> ObjectCoverageSink<'m> {
    pub fn new() -> Self {
        Self { module: None }
    }

    pub fn attached(module: &'m mut ObjectModule) -> Self {
        Self { module: Some(module) }
    }
}

impl CoverageSink for ObjectCoverageSink<'_> {
    fn emit_coverage(&mut self, mapping: &CoverageMapping) -> CompileResult<()> {
        let module = self
            .module
            .as_deref_mut()
            .ok_or(CoverageError::ModuleNotInitialized)?;
        if module.has_coverage {
            return Err(CoverageError::Encoding {
                reason: "coverage mapping already written to this object".to_string(),
            });
        }
        module.add_coverage(mapping);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::{Object as _, ObjectSection as _, ObjectSymbol as _};

    #[test]
    fn test_function_and_counters_land_in_sections() {
        let mut module = ObjectModule::new_elf_x86_64();
        let function = X64FunctionCode {
            name: "f".to_string(),
            code: vec![0x48, 0xff, 0x05, 0, 0, 0, 0, 0xc3],
            relocations: vec![crate::x64::CounterRelocation {
                offset: 3,
                symbol: "__profc_f".to_string(),
                addend: -4,
            }],
            counters: vec![CounterArray {
                symbol: "__profc_f".to_string(),
                num_counters: 2,
            }],
        };
        module.add_function(&function).unwrap();
        let bytes = module.write().unwrap();

        let file = object::File::parse(&*bytes).unwrap();
        let counters = file.section_by_name("__llvm_prf_cnts").unwrap();
        assert_eq!(counters.size(), 16);
        assert!(file.symbol_by_name("f").is_some());

        let text = file.section_by_name(".text").unwrap();
        let relocs: Vec<_> = text.relocations().collect();
        assert_eq!(relocs.len(), 1);
        assert_eq!(relocs[0].0, 3);
        assert_eq!(relocs[0].1.addend(), -4);
    }

    #[test]
    fn test_unattached_sink_reports_internal_error() {
        let mapping = CoverageMapping {
            version: 3,
            filenames: Vec::new(),
            encoded_filenames: vec![0, 0, 0],
            filenames_ref: 0,
            functions: Vec::new(),
        };
        let err = ObjectCoverageSink::new().emit_coverage(&mapping).unwrap_err();
        assert!(matches!(err, CoverageError::ModuleNotInitialized));
    }
}
