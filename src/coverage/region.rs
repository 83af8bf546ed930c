//! Coverage region model.
//!
//! A [`Region`] is a source span tagged with how the coverage format should
//! treat it. [`FunctionRegions`] owns all regions of one function and defines
//! the counter enumeration: explicit regions in recording order, then gaps.
//! The counter id of a region is its slot in that enumeration, so the id seen
//! by the instrumentation pass is the id written into the mapping.

use hashbrown::HashMap;
use std::fmt::Write as _;

use crate::core::adaptor::{ElementId, FileId, FuncId, IrAdaptor, LineColumn, SourceRange};
use crate::core::error::{CompileResult, CoverageError};

/// Dense per-function counter index.
pub type CounterId = u32;

/// Line/column span of a region inside one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
///
/// Only [`SourceSpan::new`] builds one, so the start never lies after the end.
pub struct SourceSpan {
    file: FileId,
    start_line: u32,
    start_column: u32,
    end_line: u32,
    end_column: u32,
}

impl SourceSpan {
    /// Build a span, rejecting a start that lies after the end.
    pub fn new(
        file: FileId,
        start: LineColumn,
        end: LineColumn,
    ) -> CompileResult<Self> {
        if start > end {
            return Err(CoverageError::InvalidRegion {
                start_line: start.line,
                start_column: start.column,
                end_line: end.line,
                end_column: end.column,
            });
        }

        Ok(Self {
            file,
            start_line: start.line,
            start_column: start.column,
            end_line: end.line,
            end_column: end.column,
        })
    }

    /// Derive a span from byte offsets through the adaptor's line table.
    pub fn from_range<A: IrAdaptor + ?Sized>(
        adaptor: &A,
        file: FileId,
        range: SourceRange,
    ) -> CompileResult<Self> {
        Self::new(
            file,
            adaptor.line_column(file, range.start),
            adaptor.line_column(file, range.end),
        )
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn start(&self) -> LineColumn {
        LineColumn { line: self.start_line, column: self.start_column }
    }

    pub fn end(&self) -> LineColumn {
        LineColumn { line: self.end_line, column: self.end_column }
    }
}

/// How the coverage format treats a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Executable code whose hit count matters.
    Code,
    /// Span between tracked regions; never flagged as uncovered on its own.
    Gap,
    /// Span standing for the content of another file.
    Expansion { expanded_file: FileId },
}

impl RegionKind {
    pub fn name(&self) -> &'static str {
        match self {
            RegionKind::Code => "Code",
            RegionKind::Gap => "Gap",
            RegionKind::Expansion { .. } => "Expansion",
        }
    }
}

/// Tracked source span with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub span: SourceSpan,
    pub kind: RegionKind,
}

impl Region {
    pub fn new(span: SourceSpan, kind: RegionKind) -> Self {
        Self { span, kind }
    }

    pub fn file(&self) -> FileId {
        self.span.file()
    }

    /// Render as `file[ expand to other]: Kind l, c -> l, c`.
    pub fn dump<A: IrAdaptor + ?Sized>(&self, adaptor: &A) -> String {
        let mut out = String::from(adaptor.file_name(self.span.file()));
        if let RegionKind::Expansion { expanded_file } = self.kind {
            let _ = write!(out, " expand to {}", adaptor.file_name(expanded_file));
        }
        let (start, end) = (self.span.start(), self.span.end());
        let _ = write!(
            out,
            ": {} {}, {} -> {}, {}",
            self.kind.name(),
            start.line,
            start.column,
            end.line,
            end.column
        );
        out
    }
}

/// All regions of one function plus their counter enumeration.
#[derive(Debug, Clone)]
pub struct FunctionRegions {
    function: FuncId,
    name: String,
    /// Explicit regions, one slot per tracked element, in recording order.
    regions: Vec<Region>,
    /// Element owning each slot of `regions`.
    elements: Vec<ElementId>,
    index: HashMap<ElementId, CounterId>,
    gaps: Vec<Region>,
    structural_hash: u64,
}

impl FunctionRegions {
    /// Structural hash written for every function.
    ///
    /// Profile-guided matching across builds is not supported, so the hash is
    /// a constant rather than a fingerprint of the region shape.
    pub const PLACEHOLDER_STRUCTURAL_HASH: u64 = 0;

    pub fn new(function: FuncId, name: impl Into<String>) -> Self {
        Self {
            function,
            name: name.into(),
            regions: Vec::new(),
            elements: Vec::new(),
            index: HashMap::new(),
            gaps: Vec::new(),
            structural_hash: Self::PLACEHOLDER_STRUCTURAL_HASH,
        }
    }

    /// Record the region of `element`. Returns false if it already had one.
    pub fn record(&mut self, element: ElementId, region: Region) -> bool {
        if self.index.contains_key(&element) {
            return false;
        }
        let slot = self.regions.len() as CounterId;
        self.index.insert(element, slot);
        self.regions.push(region);
        self.elements.push(element);
        true
    }

    pub fn record_gap(&mut self, region: Region) {
        self.gaps.push(region);
    }

    pub fn function(&self) -> FuncId {
        self.function
    }

    /// Linkage name of the function.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn structural_hash(&self) -> u64 {
        self.structural_hash
    }

    pub fn region_for(&self, element: ElementId) -> Option<&Region> {
        self.index
            .get(&element)
            .map(|&slot| &self.regions[slot as usize])
    }

    /// Counter id assigned to the region of `element`.
    pub fn counter_id(&self, element: ElementId) -> Option<CounterId> {
        self.index.get(&element).copied()
    }

    /// Explicit regions with their owning elements, in recording order.
    pub fn regions(&self) -> impl Iterator<Item = (ElementId, &Region)> + '_ {
        self.elements.iter().copied().zip(self.regions.iter())
    }

    pub fn gaps(&self) -> &[Region] {
        &self.gaps
    }

    /// Number of explicit (element-owned) regions.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Number of counters the function needs: one per enumerated region.
    pub fn num_counters(&self) -> u32 {
        (self.regions.len() + self.gaps.len()) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty() && self.gaps.is_empty()
    }

    /// Regions in counter order: explicit regions, then gaps.
    pub fn enumerate(&self) -> impl Iterator<Item = (CounterId, &Region)> + '_ {
        self.regions
            .iter()
            .chain(self.gaps.iter())
            .enumerate()
            .map(|(idx, region)| (idx as CounterId, region))
    }

    /// Human-readable listing of every region, one per line.
    pub fn dump<A: IrAdaptor + ?Sized>(&self, adaptor: &A) -> String {
        let mut out = format!("{} regions:\n", self.name);
        for (element, region) in self.regions() {
            let _ = writeln!(
                out,
                "{} -> ({})",
                adaptor.describe_element(element),
                region.dump(adaptor)
            );
        }
        for gap in &self.gaps {
            let _ = writeln!(out, "<gap> -> ({})", gap.dump(adaptor));
        }
        out
    }
}

/// Functions collected for one file.
#[derive(Debug, Clone)]
pub struct FileRegionInfo {
    pub file: FileId,
    pub file_name: String,
    pub functions: Vec<FunctionRegions>,
}

impl FileRegionInfo {
    pub fn new(file: FileId, file_name: impl Into<String>) -> Self {
        Self {
            file,
            file_name: file_name.into(),
            functions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> SourceSpan {
        SourceSpan::new(
            FileId(0),
            LineColumn { line: sl, column: sc },
            LineColumn { line: el, column: ec },
        )
        .unwrap()
    }

    #[test]
    fn test_inverted_span_is_rejected() {
        let result = SourceSpan::new(
            FileId(0),
            LineColumn { line: 4, column: 1 },
            LineColumn { line: 3, column: 9 },
        );
        assert!(matches!(result, Err(CoverageError::InvalidRegion { .. })));
    }

    #[test]
    fn test_record_is_idempotent_per_element() {
        let mut regions = FunctionRegions::new(FuncId(0), "f");
        let region = Region::new(span(1, 1, 1, 5), RegionKind::Code);

        assert!(regions.record(ElementId(7), region));
        assert!(!regions.record(ElementId(7), Region::new(span(2, 1, 2, 3), RegionKind::Code)));
        assert_eq!(regions.region_count(), 1);
        assert_eq!(regions.region_for(ElementId(7)), Some(&region));
    }

    #[test]
    fn test_enumeration_places_gaps_after_regions() {
        let mut regions = FunctionRegions::new(FuncId(0), "f");
        regions.record_gap(Region::new(span(1, 4, 1, 6), RegionKind::Gap));
        regions.record(ElementId(3), Region::new(span(1, 1, 1, 4), RegionKind::Code));
        regions.record(ElementId(1), Region::new(span(1, 6, 1, 9), RegionKind::Code));

        let kinds: Vec<_> = regions.enumerate().map(|(id, r)| (id, r.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (0, RegionKind::Code),
                (1, RegionKind::Code),
                (2, RegionKind::Gap),
            ]
        );
        assert_eq!(regions.counter_id(ElementId(1)), Some(1));
        assert_eq!(regions.num_counters(), 3);
    }

    #[test]
    fn test_identical_regions_keep_distinct_counters() {
        let mut regions = FunctionRegions::new(FuncId(0), "f");
        let same = Region::new(span(2, 1, 2, 8), RegionKind::Code);
        regions.record(ElementId(0), same);
        regions.record(ElementId(1), same);

        assert_eq!(regions.counter_id(ElementId(0)), Some(0));
        assert_eq!(regions.counter_id(ElementId(1)), Some(1));
    }
}
