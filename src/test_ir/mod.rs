//! Test IR (TIR) for exercising coverage collection without a full front end.
//!
//! TIR describes a module as files of function declarations whose bodies are
//! small expression trees. Every element carries the byte offsets it spans in
//! its file, and every file carries its line-start table, which is all the
//! coverage pipeline needs from a real IR.
//!
//! # TIR Format
//!
//! ```text
//! ; Comments start with semicolon
//! module main
//! file "a.kt" lines 0 20 41 {
//!   fun main @0..59 {
//!     %c = call foo @21..30 { const 1 @25..26 }
//!     when @31..58 {
//!       branch { get x @35..36  call bar @38..43 }
//!       branch { const true @?  const 0 @50..51 }
//!     }
//!     use %c
//!     inline "b.kt" @44..49 { call baz @2..7 }
//!   }
//!   extern fun ext
//! }
//! file "b.kt" in stdlib lines 0 10 { }
//! ```
//!
//! `@?` marks undefined offsets. Files without `in <module>` belong to the
//! module named by the `module` line.

pub mod adaptor;
pub mod parser;

pub use adaptor::TestIRAdaptor;

use crate::core::adaptor::LineColumn;

#[derive(Debug, Clone, PartialEq)]
pub struct TestIR {
    pub module: String,
    pub files: Vec<File>,
    pub functions: Vec<Function>,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub name: String,
    pub module: String,
    /// Byte offset of the first character of each line; starts with 0.
    pub line_starts: Vec<u32>,
    /// Functions declared in this file, nested ones included, in declaration order.
    pub functions: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub file: u32,
    pub inline: bool,
    pub external: bool,
    pub body: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub op: Operation,
    pub range: Option<(u32, u32)>,
    pub children: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Function body container.
    Body,
    Block,
    Call(String),
    When,
    /// Children are exactly `[condition, result]`.
    Branch,
    Const(String),
    Get(String),
    Break,
    Continue,
    /// Variable declaration; the optional single child is the initializer.
    Var(String),
    Return,
    /// Inlined body, optionally tagged with the file index it came from.
    Inline(Option<u32>),
    /// Nested function declaration (function index).
    Fun(u32),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Body => "body",
            Operation::Block => "block",
            Operation::Call(_) => "call",
            Operation::When => "when",
            Operation::Branch => "branch",
            Operation::Const(_) => "const",
            Operation::Get(_) => "get",
            Operation::Break => "break",
            Operation::Continue => "continue",
            Operation::Var(_) => "var",
            Operation::Return => "return",
            Operation::Inline(_) => "inline",
            Operation::Fun(_) => "fun",
        }
    }
}

impl TestIR {
    pub fn new() -> Self {
        Self {
            module: "main".to_string(),
            files: Vec::new(),
            functions: Vec::new(),
            elements: Vec::new(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        parser::parse_ir(text)
    }

    pub fn file_index(&self, name: &str) -> Option<u32> {
        self.files
            .iter()
            .position(|f| f.name == name)
            .map(|idx| idx as u32)
    }

    pub fn function_index(&self, name: &str) -> Option<u32> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|idx| idx as u32)
    }

    /// Map a byte offset in `file` to a 1-based line and column.
    pub fn line_column(&self, file: u32, offset: u32) -> LineColumn {
        let starts = &self.files[file as usize].line_starts;
        let line_idx = starts.partition_point(|&start| start <= offset).max(1) - 1;
        LineColumn {
            line: line_idx as u32 + 1,
            column: offset - starts[line_idx] + 1,
        }
    }
}

impl Default for TestIR {
    fn default() -> Self {
        Self::new()
    }
}
