// This module implements the per-function region collector: a depth-first walk over one
// function body that decides which IR elements get a coverage region. The walk dispatches
// on the closed ElementKind set: calls always get a Code region, each arm of a conditional
// gets one for its condition (unless the condition is a literal constant, which marks a
// compiler-synthesized else arm) and one for its result, leaf expressions get one under the
// Leaves granularity, and returnable blocks wrapping inlined code push their source file on
// a file stack so that everything inside is attributed to the inlined file. Inlined blocks
// without provenance or from files outside the coverage scope are not entered at all.
// Elements with undefined offsets are skipped with a warning. All mutable state of one
// walk lives in a TraversalContext created per collect() call; recording is keyed by
// element identity, and a shared subtree reached twice is walked once.

//! Region collection for a single function.

use hashbrown::HashSet;

use crate::core::adaptor::{ElementId, ElementKind, FileId, FuncId, IrAdaptor, SourceRange};
use crate::coverage::config::RegionGranularity;
use crate::coverage::region::{FunctionRegions, Region, RegionKind, SourceSpan};

/// Counts of elements the collector had to leave out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectorStats {
    /// Elements whose source offsets were undefined or inverted.
    pub undefined_offsets: usize,
    /// Inlined blocks with missing or out-of-scope provenance.
    pub inlined_blocks_skipped: usize,
}

impl std::ops::AddAssign for CollectorStats {
    fn add_assign(&mut self, rhs: Self) {
        self.undefined_offsets += rhs.undefined_offsets;
        self.inlined_blocks_skipped += rhs.inlined_blocks_skipped;
    }
}

/// Walk state of one function.
struct TraversalContext {
    file_stack: Vec<FileId>,
    regions: FunctionRegions,
    visited: HashSet<ElementId>,
    stats: CollectorStats,
}

impl TraversalContext {
    fn new(file: FileId, regions: FunctionRegions) -> Self {
        Self {
            file_stack: vec![file],
            regions,
            visited: HashSet::new(),
            stats: CollectorStats::default(),
        }
    }

    fn current_file(&self) -> FileId {
        // The declaring file is never popped.
        self.file_stack[self.file_stack.len() - 1]
    }
}

/// Collects the coverage regions of individual functions.
///
/// The scope predicate decides whether inlined code is entered; the module
/// collector hands the same predicate to every instance so file filtering and
/// inlined-block filtering always agree.
pub struct RegionCollector<'a, A: IrAdaptor + ?Sized> {
    adaptor: &'a A,
    in_scope: &'a dyn Fn(FileId) -> bool,
    granularity: RegionGranularity,
    stats: CollectorStats,
}

impl<'a, A: IrAdaptor + ?Sized> RegionCollector<'a, A> {
    pub fn new(
        adaptor: &'a A,
        in_scope: &'a dyn Fn(FileId) -> bool,
        granularity: RegionGranularity,
    ) -> Self {
        Self {
            adaptor,
            in_scope,
            granularity,
            stats: CollectorStats::default(),
        }
    }

    /// Whether `func` has a body of its own to instrument.
    pub fn is_coverable(adaptor: &A, func: FuncId) -> bool {
        !adaptor.func_is_inline(func) && !adaptor.func_is_external(func)
    }

    /// Totals over every function collected by this instance.
    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    /// Collect the regions of one function body.
    pub fn collect(&mut self, func: FuncId) -> FunctionRegions {
        let name = self.adaptor.func_link_name(func);
        let mut ctx = TraversalContext::new(
            self.adaptor.func_file(func),
            FunctionRegions::new(func, name),
        );

        if let Some(body) = self.adaptor.func_body(func) {
            self.visit(&mut ctx, body);
        }

        self.stats += ctx.stats;
        ctx.regions
    }

    fn visit(&self, ctx: &mut TraversalContext, element: ElementId) {
        if !ctx.visited.insert(element) {
            log::trace!(
                "Element {} already visited",
                self.adaptor.describe_element(element)
            );
            return;
        }

        match self.adaptor.element_kind(element) {
            ElementKind::Call => {
                self.record(ctx, element, RegionKind::Code);
                self.visit_children(ctx, element);
            }
            ElementKind::When => self.visit_children(ctx, element),
            ElementKind::Branch { condition, result } => {
                self.visit_branch(ctx, condition, result);
            }
            ElementKind::Const
            | ElementKind::GetValue
            | ElementKind::Break
            | ElementKind::Continue => {
                if self.granularity == RegionGranularity::Leaves {
                    self.record(ctx, element, RegionKind::Code);
                }
                self.visit_children(ctx, element);
            }
            ElementKind::Variable { initializer } => {
                if let Some(init) = initializer {
                    self.visit(ctx, init);
                }
            }
            ElementKind::InlinedBlock { source_file } => {
                self.visit_inlined_block(ctx, element, source_file);
            }
            // Collected separately as a function of its own.
            ElementKind::FunctionDecl(_) => {}
            ElementKind::Other => self.visit_children(ctx, element),
        }
    }

    fn visit_children(&self, ctx: &mut TraversalContext, element: ElementId) {
        for child in self.adaptor.element_children(element) {
            self.visit(ctx, child);
        }
    }

    fn visit_branch(&self, ctx: &mut TraversalContext, condition: ElementId, result: ElementId) {
        // A constant condition is the synthesized `else` arm: no region for it.
        let has_condition = if self.adaptor.element_kind(condition) != ElementKind::Const {
            self.record(ctx, condition, RegionKind::Code);
            self.visit(ctx, condition);
            ctx.regions.region_for(condition).is_some()
        } else {
            false
        };

        self.record(ctx, result, RegionKind::Code);
        self.visit(ctx, result);

        if has_condition && ctx.regions.region_for(result).is_some() {
            self.record_gap_between(ctx, condition, result);
        }
    }

    /// Gap from the end of a branch condition to the start of its result.
    fn record_gap_between(&self, ctx: &mut TraversalContext, condition: ElementId, result: ElementId) {
        let (Some(cond), Some(res)) = (
            self.adaptor.element_range(condition),
            self.adaptor.element_range(result),
        ) else {
            return;
        };

        if cond.end >= res.start {
            return;
        }

        let file = ctx.current_file();
        match SourceSpan::from_range(self.adaptor, file, SourceRange::new(cond.end, res.start)) {
            Ok(span) => ctx.regions.record_gap(Region::new(span, RegionKind::Gap)),
            Err(e) => log::warn!("Skipping gap region in {}: {}", ctx.regions.name(), e),
        }
    }

    fn visit_inlined_block(
        &self,
        ctx: &mut TraversalContext,
        block: ElementId,
        source_file: Option<FileId>,
    ) {
        let file = match source_file {
            Some(file) if (self.in_scope)(file) => file,
            Some(file) => {
                log::debug!(
                    "Not covering inlined block {} from out-of-scope file {}",
                    self.adaptor.describe_element(block),
                    self.adaptor.file_name(file)
                );
                ctx.stats.inlined_blocks_skipped += 1;
                return;
            }
            None => {
                log::debug!(
                    "Not covering inlined block {} without source file",
                    self.adaptor.describe_element(block)
                );
                ctx.stats.inlined_blocks_skipped += 1;
                return;
            }
        };

        log::trace!(
            "Inlined block {} from {}",
            self.adaptor.describe_element(block),
            self.adaptor.file_name(file)
        );
        self.record(ctx, block, RegionKind::Code);

        ctx.file_stack.push(file);
        self.visit_children(ctx, block);
        ctx.file_stack.pop();
    }

    /// Record a region for `element` in the current file.
    fn record(&self, ctx: &mut TraversalContext, element: ElementId, kind: RegionKind) {
        if ctx.regions.region_for(element).is_some() {
            return;
        }

        let Some(range) = self.adaptor.element_range(element) else {
            log::warn!(
                "Skipping {} in {}: undefined source offsets",
                self.adaptor.describe_element(element),
                ctx.regions.name()
            );
            ctx.stats.undefined_offsets += 1;
            return;
        };

        match SourceSpan::from_range(self.adaptor, ctx.current_file(), range) {
            Ok(span) => {
                ctx.regions.record(element, Region::new(span, kind));
            }
            Err(e) => {
                log::warn!(
                    "Skipping {} in {}: {}",
                    self.adaptor.describe_element(element),
                    ctx.regions.name(),
                    e
                );
                ctx.stats.undefined_offsets += 1;
            }
        }
    }
}
