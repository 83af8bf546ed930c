//! x86-64 specific code.
//!
//! This module contains the native counter placer: instruction encoding
//! using iced-x86 and the counter relocations the object writer resolves.

pub mod counter_placer;

pub use counter_placer::{CounterArray, CounterRelocation, X64CounterPlacer, X64FunctionCode};
