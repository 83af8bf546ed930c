//! TestIR adaptor implementation.
//!
//! This adaptor lets the coverage pipeline run on TestIR, so collection,
//! instrumentation and emission can be tested from short text snippets.

use super::{Operation, TestIR};
use crate::core::adaptor::{
    ElementId, ElementKind, FileId, FuncId, IrAdaptor, LineColumn, SourceRange,
};

/// Adaptor that implements IrAdaptor for TestIR
pub struct TestIRAdaptor<'ir> {
    ir: &'ir TestIR,
}

impl<'ir> TestIRAdaptor<'ir> {
    pub fn new(ir: &'ir TestIR) -> Self {
        Self { ir }
    }

    /// Look up a function by linkage name.
    pub fn function(&self, name: &str) -> Option<FuncId> {
        self.ir.function_index(name).map(FuncId)
    }

    /// Look up a file by name.
    pub fn file(&self, name: &str) -> Option<FileId> {
        self.ir.file_index(name).map(FileId)
    }

    /// Elements of a function body in pre-order, first occurrence only.
    pub fn body_elements(&self, func: FuncId) -> Vec<ElementId> {
        let mut seen = vec![false; self.ir.elements.len()];
        let mut order = Vec::new();
        let mut stack: Vec<u32> = self.ir.functions[func.0 as usize].body.into_iter().collect();
        while let Some(idx) = stack.pop() {
            if std::mem::replace(&mut seen[idx as usize], true) {
                continue;
            }
            order.push(ElementId(idx));
            let elem = &self.ir.elements[idx as usize];
            if !matches!(elem.op, Operation::Fun(_)) {
                stack.extend(elem.children.iter().rev());
            }
        }
        order
    }

    /// First element whose operation matches `pred`, in pre-order of `func`.
    pub fn find_element(
        &self,
        func: FuncId,
        pred: impl Fn(&Operation) -> bool,
    ) -> Option<ElementId> {
        self.body_elements(func)
            .into_iter()
            .find(|e| pred(&self.ir.elements[e.0 as usize].op))
    }
}

impl IrAdaptor for TestIRAdaptor<'_> {
    fn module_name(&self) -> &str {
        &self.ir.module
    }

    fn files(&self) -> Box<dyn Iterator<Item = FileId> + '_> {
        Box::new((0..self.ir.files.len() as u32).map(FileId))
    }

    fn file_name(&self, file: FileId) -> &str {
        &self.ir.files[file.0 as usize].name
    }

    fn file_module(&self, file: FileId) -> &str {
        &self.ir.files[file.0 as usize].module
    }

    fn file_functions(&self, file: FileId) -> Box<dyn Iterator<Item = FuncId> + '_> {
        Box::new(
            self.ir.files[file.0 as usize]
                .functions
                .iter()
                .map(|&idx| FuncId(idx)),
        )
    }

    fn func_link_name(&self, func: FuncId) -> &str {
        &self.ir.functions[func.0 as usize].name
    }

    fn func_file(&self, func: FuncId) -> FileId {
        FileId(self.ir.functions[func.0 as usize].file)
    }

    fn func_is_inline(&self, func: FuncId) -> bool {
        self.ir.functions[func.0 as usize].inline
    }

    fn func_is_external(&self, func: FuncId) -> bool {
        self.ir.functions[func.0 as usize].external
    }

    fn func_body(&self, func: FuncId) -> Option<ElementId> {
        self.ir.functions[func.0 as usize].body.map(ElementId)
    }

    fn element_kind(&self, element: ElementId) -> ElementKind {
        let elem = &self.ir.elements[element.0 as usize];
        match &elem.op {
            Operation::Call(_) => ElementKind::Call,
            Operation::When => ElementKind::When,
            Operation::Branch => ElementKind::Branch {
                condition: ElementId(elem.children[0]),
                result: ElementId(elem.children[1]),
            },
            Operation::Const(_) => ElementKind::Const,
            Operation::Get(_) => ElementKind::GetValue,
            Operation::Break => ElementKind::Break,
            Operation::Continue => ElementKind::Continue,
            Operation::Var(_) => ElementKind::Variable {
                initializer: elem.children.first().copied().map(ElementId),
            },
            Operation::Inline(file) => ElementKind::InlinedBlock {
                source_file: file.map(FileId),
            },
            Operation::Fun(func) => ElementKind::FunctionDecl(FuncId(*func)),
            Operation::Body | Operation::Block | Operation::Return => ElementKind::Other,
        }
    }

    fn element_children(&self, element: ElementId) -> Box<dyn Iterator<Item = ElementId> + '_> {
        Box::new(
            self.ir.elements[element.0 as usize]
                .children
                .iter()
                .map(|&idx| ElementId(idx)),
        )
    }

    fn element_range(&self, element: ElementId) -> Option<SourceRange> {
        self.ir.elements[element.0 as usize]
            .range
            .map(|(start, end)| SourceRange::new(start, end))
    }

    fn line_column(&self, file: FileId, offset: u32) -> LineColumn {
        self.ir.line_column(file.0, offset)
    }

    fn describe_element(&self, element: ElementId) -> String {
        let elem = &self.ir.elements[element.0 as usize];
        let operand = match &elem.op {
            Operation::Call(name)
            | Operation::Const(name)
            | Operation::Get(name)
            | Operation::Var(name) => format!(" {name}"),
            Operation::Inline(Some(file)) => format!(" \"{}\"", self.ir.files[*file as usize].name),
            Operation::Fun(func) => format!(" {}", self.ir.functions[*func as usize].name),
            _ => String::new(),
        };
        let range = match elem.range {
            Some((start, end)) => format!("@{start}..{end}"),
            None => "@?".to_string(),
        };
        format!("{}{} {}", elem.op.name(), operand, range)
    }
}
