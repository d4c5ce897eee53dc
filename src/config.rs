//! Constants and analysis settings.

use std::path::{Path, PathBuf};

/// Suffix a file must carry to be treated as a SystemTap trace
pub const TRACE_SUFFIX: &str = ".stap";

/// Fork map side file written by the probe kernel module
pub const FORK_MAP_FILE: &str = "all.lkm";

// Fixed-width date/time field at the start of every trace line,
// e.g. "Thu May  7 14:58:43 2015.390178", followed by one separator.
pub const TIMESTAMP_WIDTH: usize = 31;
// Applied after the weekday is dropped and whitespace collapsed
pub const TIMESTAMP_FORMAT: &str = "%b %d %H:%M:%S %Y";

/// Settings for analyzing one trace file
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub trace_suffix: String,
    /// Explicit fork map; `None` looks for `all.lkm` next to the trace
    pub fork_map: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            trace_suffix: TRACE_SUFFIX.to_string(),
            fork_map: None,
        }
    }
}

/// Whether `path` ends with `suffix`, compared on the path's text
pub fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.to_str().is_some_and(|p| p.ends_with(suffix))
}

impl AnalysisConfig {
    pub fn is_trace(&self, path: &Path) -> bool {
        has_suffix(path, &self.trace_suffix)
    }

    /// Resolve the fork map path for a given trace file
    pub fn fork_map_for(&self, trace_path: &Path) -> PathBuf {
        match &self.fork_map {
            Some(path) => path.clone(),
            None => trace_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(FORK_MAP_FILE),
        }
    }
}
