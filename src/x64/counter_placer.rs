// This module provides the x86-64 counter placer used by the native code generator. It
// encodes machine code for one function with iced-x86: a frame-pointer prologue and
// epilogue built through the code_asm CodeAssembler, and one `inc qword ptr [rip+disp32]`
// per counter increment encoded directly with the Encoder so the displacement offset of
// each instruction can be read back. The displacement is left zero in the code and a
// PC-relative 32-bit relocation against the function's __profc_ counter array is recorded
// instead, with an addend selecting the 8-byte slot of the counter. The object writer
// turns these relocations into R_X86_64_PC32 entries and allocates the counter arrays.

//! x86-64 counter increments using iced-x86.

use iced_x86::code_asm::{rbp, rsp, CodeAssembler};
use iced_x86::{Code, Encoder, IcedError, Instruction, MemoryOperand, Register};

use crate::core::error::CompileResult;
use crate::core::session::CoverageSession;
use crate::coverage::instrumentation::{CounterIncrement, CounterPlacer};

/// Size of one counter slot.
pub const COUNTER_SIZE: u64 = 8;

/// PC-relative reference from the code to a counter slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRelocation {
    /// Offset of the 32-bit displacement field within the function code.
    pub offset: u64,
    /// Counter array symbol.
    pub symbol: String,
    pub addend: i64,
}

/// A counter array the function's code refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterArray {
    pub symbol: String,
    pub num_counters: u32,
}

/// Encoded machine code of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X64FunctionCode {
    pub name: String,
    pub code: Vec<u8>,
    pub relocations: Vec<CounterRelocation>,
    pub counters: Vec<CounterArray>,
}

/// Encodes one function and places its counter increments.
pub struct X64CounterPlacer<'s, 'arena> {
    session: &'s CoverageSession<'arena>,
    name: String,
    encoder: Encoder,
    position: u64,
    relocations: Vec<CounterRelocation>,
    counters: Vec<CounterArray>,
}

impl<'s, 'arena> X64CounterPlacer<'s, 'arena> {
    pub fn new(session: &'s CoverageSession<'arena>, name: impl Into<String>) -> CompileResult<Self> {
        Ok(Self {
            session,
            name: name.into(),
            encoder: Encoder::try_new(64)?,
            position: 0,
            relocations: Vec::new(),
            counters: Vec::new(),
        })
    }

    fn emit(&mut self, instruction: &Instruction) -> CompileResult<usize> {
        let len = self.encoder.encode(instruction, self.position)?;
        self.position += len as u64;
        Ok(len)
    }

    fn emit_asm(
        &mut self,
        build: impl FnOnce(&mut CodeAssembler) -> Result<(), IcedError>,
    ) -> CompileResult<()> {
        let mut asm = CodeAssembler::new(64)?;
        build(&mut asm)?;
        for instruction in asm.instructions() {
            self.emit(instruction)?;
        }
        Ok(())
    }

    /// `push rbp; mov rbp, rsp`
    pub fn emit_prologue(&mut self) -> CompileResult<()> {
        self.emit_asm(|a| {
            a.push(rbp)?;
            a.mov(rbp, rsp)
        })
    }

    /// `pop rbp; ret`
    pub fn emit_epilogue(&mut self) -> CompileResult<()> {
        self.emit_asm(|a| {
            a.pop(rbp)?;
            a.ret()
        })
    }

    /// Finish the function, zeroing the displacement of every counter reference.
    pub fn finish(mut self) -> X64FunctionCode {
        let mut code = self.encoder.take_buffer();
        for reloc in &self.relocations {
            let start = reloc.offset as usize;
            code[start..start + 4].fill(0);
        }

        X64FunctionCode {
            name: self.name,
            code,
            relocations: self.relocations,
            counters: self.counters,
        }
    }
}

impl CounterPlacer for X64CounterPlacer<'_, '_> {
    fn place(&mut self, increment: &CounterIncrement<'_>) -> CompileResult<()> {
        let symbol = self.session.counter_symbol(increment.function_name);
        if !self.counters.iter().any(|c| c.symbol == symbol) {
            self.counters.push(CounterArray {
                symbol: symbol.to_string(),
                num_counters: increment.num_counters,
            });
        }

        let start = self.position;
        // The target only has to be in range; the relocation supplies the real one.
        let instruction = Instruction::with1(
            Code::Inc_rm64,
            MemoryOperand::with_base_displ(Register::RIP, start as i64),
        )?;
        self.emit(&instruction)?;

        let displacement = self.encoder.get_constant_offsets().displacement_offset() as u64;
        self.relocations.push(CounterRelocation {
            offset: start + displacement,
            symbol: symbol.to_string(),
            // PC-relative from the end of the displacement field.
            addend: i64::from(increment.counter_id) * COUNTER_SIZE as i64 - 4,
        });

        self.session.record_increment_placed();
        Ok(())
    }
}
