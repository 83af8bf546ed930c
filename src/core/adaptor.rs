// This module defines the IrAdaptor trait, which serves as the bridge between the coverage
// pipeline and any tree-shaped typed intermediate representation. The trait exposes the
// minimal set of queries the collector and the code generation walk need: the module's
// files and their owning module names, the function declarations of each file together with
// their linkage names and inline/external flags, function bodies, element kinds, child
// iteration, byte-offset ranges and the per-file offset to line/column mapping. Element,
// function and file identities are dense integer ids assigned by the IR, so every map in
// the coverage pipeline is keyed by identity rather than by structural equality of nodes.
// ElementKind is the closed set of element shapes the collector distinguishes; everything
// else maps to ElementKind::Other and is only walked through.

//! IR adaptor responsibilities.
//!
//! The adaptor is the glue between the coverage pipeline and the compiler's IR.
//! The pipeline assumes:
//! - Every element, function and file has a stable integer identity.
//! - Element children can be enumerated in evaluation order.
//! - Byte offsets may be undefined for synthetic elements.
//! - Inlined code is wrapped in a block that may carry the file it came from.

use std::fmt;

/// Identity of an IR element (expression, statement or body).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u32);

/// Identity of a function declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

/// Identity of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

/// Byte-offset range of an element within its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRange {
    pub start: u32,
    pub end: u32,
}

impl SourceRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineColumn {
    pub line: u32,
    pub column: u32,
}

/// Element shapes the coverage collector distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Function or constructor call.
    Call,
    /// Multi-branch choice; children are `Branch` elements.
    When,
    /// One arm of a `When`.
    Branch {
        condition: ElementId,
        result: ElementId,
    },
    /// Literal constant.
    Const,
    /// Variable read.
    GetValue,
    Break,
    Continue,
    /// Local variable declaration.
    Variable {
        initializer: Option<ElementId>,
    },
    /// Returnable block wrapping an inlined function body.
    InlinedBlock {
        source_file: Option<FileId>,
    },
    /// Nested (local) function declaration.
    FunctionDecl(FuncId),
    /// Anything the collector does not track.
    Other,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Call => "CALL",
            ElementKind::When => "WHEN",
            ElementKind::Branch { .. } => "BRANCH",
            ElementKind::Const => "CONST",
            ElementKind::GetValue => "GET_VAR",
            ElementKind::Break => "BREAK",
            ElementKind::Continue => "CONTINUE",
            ElementKind::Variable { .. } => "VAR",
            ElementKind::InlinedBlock { .. } => "RETURNABLE_BLOCK",
            ElementKind::FunctionDecl(_) => "FUN",
            ElementKind::Other => "ELEMENT",
        };
        f.write_str(name)
    }
}

/// Bridge between a tree IR and the coverage pipeline.
///
/// Implementations are expected to be cheap to query; the collector calls
/// `element_kind` and `element_children` once per visited element.
///
/// ```ignore
/// for file in adaptor.files() {
///     for func in adaptor.file_functions(file) {
///         if let Some(body) = adaptor.func_body(func) {
///             let _ = adaptor.element_children(body).count();
///         }
///     }
/// }
/// ```
pub trait IrAdaptor {
    /// Name of the module currently being compiled.
    fn module_name(&self) -> &str;

    /// Iterator over all files of the module, in declaration order.
    fn files(&self) -> Box<dyn Iterator<Item = FileId> + '_>;

    fn file_name(&self, file: FileId) -> &str;

    /// Name of the module (library) the file belongs to.
    fn file_module(&self, file: FileId) -> &str;

    /// Function declarations of a file, top-level and nested, in declaration order.
    fn file_functions(&self, file: FileId) -> Box<dyn Iterator<Item = FuncId> + '_>;

    /// Linkage name of the function.
    fn func_link_name(&self, func: FuncId) -> &str;

    /// File the function is declared in.
    fn func_file(&self, func: FuncId) -> FileId;

    fn func_is_inline(&self, func: FuncId) -> bool;

    fn func_is_external(&self, func: FuncId) -> bool;

    fn func_body(&self, func: FuncId) -> Option<ElementId>;

    fn element_kind(&self, element: ElementId) -> ElementKind;

    fn element_children(&self, element: ElementId) -> Box<dyn Iterator<Item = ElementId> + '_>;

    /// Byte offsets of the element, `None` when undefined (synthetic code).
    fn element_range(&self, element: ElementId) -> Option<SourceRange>;

    /// Map a byte offset of `file` to a 1-based line and column.
    fn line_column(&self, file: FileId, offset: u32) -> LineColumn;

    /// Short human-readable rendering used by region dumps.
    fn describe_element(&self, element: ElementId) -> String {
        match self.element_range(element) {
            Some(range) => format!("{} @{}..{}", self.element_kind(element), range.start, range.end),
            None => format!("{} @?", self.element_kind(element)),
        }
    }
}
