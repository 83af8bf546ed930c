//! Coverage configuration.

use clap::ValueEnum;

/// Which elements get a region of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RegionGranularity {
    /// Calls and branch arms only.
    Branches,
    /// Calls, branch arms and leaf expressions (constants, reads, jumps).
    #[default]
    Leaves,
}

/// Per-compilation coverage settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageConfig {
    pub enabled: bool,
    /// Modules whose files are instrumented. Empty means the current module only.
    pub libraries_to_cover: Vec<String>,
    pub granularity: RegionGranularity,
    /// Print every collected function's regions to stdout.
    pub dump_regions: bool,
}

impl CoverageConfig {
    /// Coverage enabled for the current module with default settings.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_libraries<I, S>(mut self, libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.libraries_to_cover = libraries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_granularity(mut self, granularity: RegionGranularity) -> Self {
        self.granularity = granularity;
        self
    }
}
