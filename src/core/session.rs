// This module provides arena-based session management for one coverage-instrumented
// compilation unit using the bumpalo crate. CoverageSession owns a reference to the arena
// and interns the symbol names the backends derive from function link names (profile name
// variables, counter arrays, coverage records), so each name is built once per session and
// handed out as a plain &'arena str. It also accumulates SessionStats: files in scope,
// functions collected, explicit and gap regions recorded, elements skipped because of
// undefined offsets or out-of-scope inlined sources, functions instrumented and counter
// increments placed. The statistics are what the CLI prints after a run and what tests use
// to check that skip rules fired. Interior mutability (RefCell) keeps the session shareable
// by & reference between the manager and the backend placers, which is all a
// single-threaded compilation needs.

//! Arena-based coverage session management.
//!
//! All interned names share the session lifetime.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

use crate::mapping::format::{PROFILE_COUNTERS_PREFIX, PROFILE_NAME_PREFIX};

/// Arena-based coverage session.
pub struct CoverageSession<'arena> {
    /// Arena allocator for interned names.
    arena: &'arena Bump,

    /// Coverage statistics.
    stats: RefCell<SessionStats>,

    /// String interning for symbol names.
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CoverageSession<'arena> {
    /// Create a new session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Name of the private global holding a function's PGO name.
    pub fn profile_name_symbol(&self, function_name: &str) -> &'arena str {
        self.intern_str(&format!("{PROFILE_NAME_PREFIX}{function_name}"))
    }

    /// Name of the counter array of a function.
    pub fn counter_symbol(&self, function_name: &str) -> &'arena str {
        self.intern_str(&format!("{PROFILE_COUNTERS_PREFIX}{function_name}"))
    }

    pub fn record_file_in_scope(&self) {
        self.stats.borrow_mut().files_in_scope += 1;
    }

    /// Record the outcome of collecting one function.
    pub fn record_function_collected(&self, name: &str, regions: usize, gaps: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_collected += 1;
        stats.regions_recorded += regions;
        stats.gaps_recorded += gaps;

        if stats.largest_function_regions < regions + gaps {
            stats.largest_function_regions = regions + gaps;
            stats.largest_function_name = name.to_string();
        }
    }

    pub fn record_skipped(&self, undefined_offsets: usize, inlined_blocks: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.elements_skipped += undefined_offsets;
        stats.inlined_blocks_skipped += inlined_blocks;
    }

    pub fn record_function_instrumented(&self) {
        self.stats.borrow_mut().functions_instrumented += 1;
    }

    pub fn record_increment_placed(&self) {
        self.stats.borrow_mut().increments_placed += 1;
    }

    /// Get a snapshot of the statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Coverage statistics for one session.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub files_in_scope: usize,
    pub functions_collected: usize,
    pub regions_recorded: usize,
    pub gaps_recorded: usize,
    pub elements_skipped: usize,
    pub inlined_blocks_skipped: usize,
    pub functions_instrumented: usize,
    pub increments_placed: usize,
    pub largest_function_regions: usize,
    pub largest_function_name: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Coverage Statistics:")?;
        writeln!(f, "  Files in scope: {}", self.files_in_scope)?;
        writeln!(f, "  Functions collected: {}", self.functions_collected)?;
        writeln!(f, "  Regions recorded: {}", self.regions_recorded)?;
        writeln!(f, "  Gap regions recorded: {}", self.gaps_recorded)?;
        writeln!(f, "  Elements skipped (undefined offsets): {}", self.elements_skipped)?;
        writeln!(f, "  Inlined blocks skipped: {}", self.inlined_blocks_skipped)?;
        writeln!(f, "  Functions instrumented: {}", self.functions_instrumented)?;
        writeln!(f, "  Counter increments placed: {}", self.increments_placed)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} regions)",
                self.largest_function_name, self.largest_function_regions
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_str_returns_same_slice() {
        let arena = Bump::new();
        let session = CoverageSession::new(&arena);

        let a = session.counter_symbol("main");
        let b = session.intern_str("__profc_main");
        assert_eq!(a, "__profc_main");
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn test_stats_track_largest_function() {
        let arena = Bump::new();
        let session = CoverageSession::new(&arena);

        session.record_function_collected("small", 2, 0);
        session.record_function_collected("big", 7, 1);
        session.record_skipped(3, 1);

        let stats = session.stats();
        assert_eq!(stats.functions_collected, 2);
        assert_eq!(stats.regions_recorded, 9);
        assert_eq!(stats.gaps_recorded, 1);
        assert_eq!(stats.elements_skipped, 3);
        assert_eq!(stats.largest_function_name, "big");
        assert!(stats.to_string().contains("Largest function: big (8 regions)"));
    }
}
