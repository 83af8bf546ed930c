//! TIR (Test IR) parser implementation.

use super::*;
use std::collections::HashMap;

pub fn parse_ir(text: &str) -> Result<TestIR, String> {
    let parser = Parser::new(text);
    parser.parse()
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    ir: TestIR,

    // Global references resolved once all files are known
    file_resolves: Vec<Resolve<'a>>,

    // Per-function labels for `use %name`
    labels: HashMap<&'a str, u32>,
}

#[derive(Debug)]
struct Resolve<'a> {
    name: &'a str,
    index: u32,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            ir: TestIR::new(),
            file_resolves: Vec::new(),
            labels: HashMap::new(),
        }
    }

    fn parse(mut self) -> Result<TestIR, String> {
        self.skip_whitespace();

        if self.peek_keyword("module") {
            self.read_identifier()?;
            self.ir.module = self.read_identifier()?.to_string();
            self.skip_whitespace();
        }

        while !self.is_eof() {
            if let Err(e) = self.parse_file() {
                let context_start = self.pos.saturating_sub(20);
                let context_end = (self.pos + 20).min(self.text.len());
                log::error!(
                    "Error parsing TIR at position {}: {} (near '{}')",
                    self.pos,
                    e,
                    self.text.get(context_start..context_end).unwrap_or("")
                );
                return Err(e);
            }
            self.skip_whitespace();
        }

        self.resolve_file_references()?;

        Ok(self.ir)
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                // Skip comment line
                while let Some(ch) = self.current_char() {
                    self.advance();
                    if ch == '\n' {
                        break;
                    }
                }
            } else if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), String> {
        if !self.try_read(ch) {
            return Err(format!(
                "Expected '{}' but found {:?}",
                ch,
                self.current_char()
            ));
        }
        Ok(())
    }

    fn is_ident_char(ch: char) -> bool {
        ch.is_alphanumeric() || matches!(ch, '_' | '.' | ':' | '$' | '<' | '>')
    }

    fn read_identifier(&mut self) -> Result<&'a str, String> {
        self.skip_whitespace();
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' => {}
            Some(ch) => return Err(format!("Expected identifier but found '{}'", ch)),
            None => return Err("Expected identifier but found EOF".to_string()),
        }

        while let Some(ch) = self.current_char() {
            if Self::is_ident_char(ch) {
                self.advance();
            } else {
                break;
            }
        }

        Ok(&self.text[start..self.pos])
    }

    /// Check whether the next identifier is `keyword` without consuming it.
    fn peek_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let rest = &self.text[self.pos..];
        rest.starts_with(keyword)
            && !rest[keyword.len()..]
                .chars()
                .next()
                .is_some_and(Self::is_ident_char)
    }

    /// Identifier following the current one, without consuming either.
    fn peek_second_keyword(&mut self) -> Option<&'a str> {
        let saved = self.pos;
        let second = self
            .read_identifier()
            .and_then(|_| self.read_identifier())
            .ok();
        self.pos = saved;
        second
    }

    fn read_number(&mut self) -> Result<u32, String> {
        self.skip_whitespace();
        let start = self.pos;

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        let digits = &self.text[start..self.pos];
        if digits.is_empty() {
            return Err(format!("Expected number but found {:?}", self.current_char()));
        }

        digits
            .parse::<u32>()
            .map_err(|e| format!("Invalid number '{}': {}", digits, e))
    }

    fn read_string(&mut self) -> Result<&'a str, String> {
        self.expect('"')?;
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch == '"' {
                let value = &self.text[start..self.pos];
                self.advance();
                return Ok(value);
            }
            self.advance();
        }
        Err("Unterminated string literal".to_string())
    }

    /// Read a constant token such as `42`, `-1`, `true` or `"text"`.
    fn read_token(&mut self) -> Result<&'a str, String> {
        self.skip_whitespace();
        let start = self.pos;
        if self.current_char() == Some('"') {
            self.read_string()?;
            return Ok(&self.text[start..self.pos]);
        }
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() || matches!(ch, '{' | '}' | '@' | ';') {
                break;
            }
            self.advance();
        }
        if start == self.pos {
            return Err(format!("Expected constant but found {:?}", self.current_char()));
        }
        Ok(&self.text[start..self.pos])
    }

    /// Parse an optional `@start..end` or `@?` range.
    fn parse_range(&mut self) -> Result<Option<(u32, u32)>, String> {
        if !self.try_read('@') {
            return Ok(None);
        }
        if self.try_read('?') {
            return Ok(None);
        }
        let start = self.read_number()?;
        self.expect('.')?;
        self.expect('.')?;
        let end = self.read_number()?;
        Ok(Some((start, end)))
    }

    fn parse_file(&mut self) -> Result<(), String> {
        let keyword = self.read_identifier()?;
        if keyword != "file" {
            return Err(format!("Expected 'file' but found '{}'", keyword));
        }

        let name = self.read_string()?.to_string();
        if self.ir.file_index(&name).is_some() {
            return Err(format!("Duplicate file '{}'", name));
        }

        let mut module = self.ir.module.clone();
        if self.peek_keyword("in") {
            self.read_identifier()?;
            module = self.read_identifier()?.to_string();
        }

        let mut line_starts = vec![0];
        if self.peek_keyword("lines") {
            self.read_identifier()?;
            line_starts.clear();
            loop {
                self.skip_whitespace();
                if !self.current_char().is_some_and(|ch| ch.is_ascii_digit()) {
                    break;
                }
                let start = self.read_number()?;
                if line_starts.last().is_some_and(|&prev| prev >= start) {
                    return Err(format!("Line starts of '{}' must increase", name));
                }
                line_starts.push(start);
            }
            if line_starts.first() != Some(&0) {
                return Err(format!("Line starts of '{}' must begin at 0", name));
            }
        }

        let file_idx = self.ir.files.len() as u32;
        self.ir.files.push(File {
            name,
            module,
            line_starts,
            functions: Vec::new(),
        });

        self.expect('{')?;
        while !self.try_read('}') {
            if self.is_eof() {
                return Err("Unexpected EOF in file".to_string());
            }
            self.parse_function(file_idx)?;
        }

        Ok(())
    }

    /// Parse `[inline|extern] fun name [@range] [{ ... }]`, returning its index.
    fn parse_function(&mut self, file: u32) -> Result<u32, String> {
        let mut inline = false;
        let mut external = false;

        let mut keyword = self.read_identifier()?;
        loop {
            match keyword {
                "inline" => inline = true,
                "extern" => external = true,
                "fun" => break,
                other => return Err(format!("Expected function declaration but found '{}'", other)),
            }
            keyword = self.read_identifier()?;
        }

        let name = self.read_identifier()?.to_string();
        let range = self.parse_range()?;

        let func_idx = self.ir.functions.len() as u32;
        self.ir.functions.push(Function {
            name,
            file,
            inline,
            external,
            body: None,
        });
        self.ir.files[file as usize].functions.push(func_idx);

        self.skip_whitespace();
        if self.current_char() == Some('{') {
            if external {
                return Err("External functions cannot have a body".to_string());
            }

            // Labels are scoped to one function body.
            let outer_labels = std::mem::take(&mut self.labels);
            let body = self.push_element(Operation::Body, range);
            let children = self.parse_children(file)?;
            self.ir.elements[body as usize].children = children;
            self.ir.functions[func_idx as usize].body = Some(body);
            self.labels = outer_labels;
        }

        Ok(func_idx)
    }

    fn push_element(&mut self, op: Operation, range: Option<(u32, u32)>) -> u32 {
        let idx = self.ir.elements.len() as u32;
        self.ir.elements.push(Element {
            op,
            range,
            children: Vec::new(),
        });
        idx
    }

    /// Parse `{ element* }`.
    fn parse_children(&mut self, file: u32) -> Result<Vec<u32>, String> {
        self.expect('{')?;
        let mut children = Vec::new();
        while !self.try_read('}') {
            if self.is_eof() {
                return Err("Unexpected EOF in element list".to_string());
            }
            children.push(self.parse_element(file)?);
        }
        Ok(children)
    }

    fn parse_element(&mut self, file: u32) -> Result<u32, String> {
        self.skip_whitespace();

        let mut label = None;
        if self.try_read('%') {
            label = Some(self.read_identifier()?);
            self.expect('=')?;
        }

        // Nested function declarations
        if self.peek_keyword("fun")
            || ((self.peek_keyword("inline") || self.peek_keyword("extern"))
                && matches!(self.peek_second_keyword(), Some("fun" | "inline" | "extern")))
        {
            let func = self.parse_function(file)?;
            let element = self.push_element(Operation::Fun(func), None);
            return self.finish_label(label, element);
        }

        let keyword = self.read_identifier()?;
        let mut file_ref = None;
        let op = match keyword {
            "use" => {
                if label.is_some() {
                    return Err("'use' cannot be labelled".to_string());
                }
                self.expect('%')?;
                let name = self.read_identifier()?;
                return self
                    .labels
                    .get(name)
                    .copied()
                    .ok_or_else(|| format!("Unknown label '%{}'", name));
            }
            "block" => Operation::Block,
            "call" => Operation::Call(self.read_identifier()?.to_string()),
            "when" => Operation::When,
            "branch" => Operation::Branch,
            "const" => Operation::Const(self.read_token()?.to_string()),
            "get" => Operation::Get(self.read_identifier()?.to_string()),
            "break" => Operation::Break,
            "continue" => Operation::Continue,
            "var" => Operation::Var(self.read_identifier()?.to_string()),
            "return" => Operation::Return,
            "inline" => {
                self.skip_whitespace();
                if self.current_char() == Some('"') {
                    file_ref = Some(self.read_string()?);
                }
                Operation::Inline(None)
            }
            other => return Err(format!("Unknown element '{}'", other)),
        };

        let range = self.parse_range()?;
        let element = self.push_element(op, range);

        if let Some(name) = file_ref {
            self.file_resolves.push(Resolve { name, index: element });
        }

        self.skip_whitespace();
        if self.current_char() == Some('{') {
            let children = self.parse_children(file)?;
            self.ir.elements[element as usize].children = children;
        }

        self.check_arity(element)?;
        self.finish_label(label, element)
    }

    fn finish_label(&mut self, label: Option<&'a str>, element: u32) -> Result<u32, String> {
        if let Some(name) = label {
            if self.labels.insert(name, element).is_some() {
                return Err(format!("Duplicate label '%{}'", name));
            }
        }
        Ok(element)
    }

    fn check_arity(&self, element: u32) -> Result<(), String> {
        let elem = &self.ir.elements[element as usize];
        let count = elem.children.len();
        match elem.op {
            Operation::Branch if count != 2 => Err(format!(
                "branch needs exactly two children (condition, result), found {}",
                count
            )),
            Operation::Var(_) if count > 1 => Err(format!(
                "var takes at most one initializer, found {}",
                count
            )),
            Operation::When
                if elem
                    .children
                    .iter()
                    .any(|&c| self.ir.elements[c as usize].op != Operation::Branch) =>
            {
                Err("when may only contain branch elements".to_string())
            }
            _ => Ok(()),
        }
    }

    fn resolve_file_references(&mut self) -> Result<(), String> {
        for resolve in &self.file_resolves {
            let file = self
                .ir
                .file_index(resolve.name)
                .ok_or_else(|| format!("Unknown file '{}' in inline block", resolve.name))?;
            self.ir.elements[resolve.index as usize].op = Operation::Inline(Some(file));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_structure() {
        let ir = parse_ir(
            r#"
            module app
            file "a.kt" lines 0 20 {
              fun main @0..30 {
                %x = call foo @2..10 { const 1 @6..7 }
                when @11..29 {
                  branch { get y @13..14  break @16..21 }
                  branch { const true @?  continue @22..28 }
                }
                use %x
              }
              extern fun ext
            }
            file "lib.kt" in stdlib { inline fun helper { return @0..5 } }
            "#,
        )
        .unwrap();

        assert_eq!(ir.module, "app");
        assert_eq!(ir.files.len(), 2);
        assert_eq!(ir.files[1].module, "stdlib");
        assert_eq!(ir.functions.len(), 3);
        assert!(ir.functions[1].external);
        assert!(ir.functions[2].inline);

        let body = &ir.elements[ir.functions[0].body.unwrap() as usize];
        assert_eq!(body.children.len(), 3);
        // `use %x` refers back to the call element
        assert_eq!(body.children[0], body.children[2]);
        assert_eq!(ir.elements[body.children[0] as usize].op, Operation::Call("foo".into()));
    }

    #[test]
    fn test_inline_file_forward_reference() {
        let ir = parse_ir(
            r#"
            file "a.kt" { fun f { inline "b.kt" @0..4 { call g @1..2 } } }
            file "b.kt" { }
            "#,
        )
        .unwrap();

        let inline = ir
            .elements
            .iter()
            .find(|e| matches!(e.op, Operation::Inline(_)))
            .unwrap();
        assert_eq!(inline.op, Operation::Inline(Some(1)));
    }

    #[test]
    fn test_nested_function_declaration() {
        let ir = parse_ir(r#"file "a.kt" { fun outer @0..20 { fun inner @5..15 { return @6..12 } } }"#)
            .unwrap();

        assert_eq!(ir.files[0].functions, vec![0, 1]);
        let body = &ir.elements[ir.functions[0].body.unwrap() as usize];
        assert_eq!(ir.elements[body.children[0] as usize].op, Operation::Fun(1));
    }

    #[test]
    fn test_branch_arity_is_checked() {
        let err = parse_ir(r#"file "a.kt" { fun f { when { branch { const 1 } } } }"#).unwrap_err();
        assert!(err.contains("exactly two children"), "{err}");
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let err = parse_ir(r#"file "a.kt" { fun f { use %nope } }"#).unwrap_err();
        assert!(err.contains("Unknown label"), "{err}");
    }
}
