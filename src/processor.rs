use crate::config::AnalysisConfig;
use crate::correlator::{ProcessCorrelator, ProcessRecord};
use crate::database::{self, Database};
use crate::forkmap::ForkMap;
use crate::stream::StapParser;
use crate::types::TraceEvent;
use anyhow::{Context, Result};
use duckdb::Appender;
use log::{debug, info};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, Instant};

pub type TraceProcess = ProcessRecord<BufReader<File>>;

#[derive(Debug, Clone, Default)]
pub struct ProcessStats {
    pub total_lines: usize,
    pub parsed_lines: usize,
    pub failed_lines: usize,
    pub processes: usize,
    pub calls: usize,
    pub time_parsing: Duration,
    pub time_db_insert: Duration,
}

impl ProcessStats {
    pub fn merge(&mut self, other: &ProcessStats) {
        self.total_lines += other.total_lines;
        self.parsed_lines += other.parsed_lines;
        self.failed_lines += other.failed_lines;
        self.processes += other.processes;
        self.calls += other.calls;
        self.time_parsing += other.time_parsing;
        self.time_db_insert += other.time_db_insert;
    }
}

/// Sorted processes of one trace, with their call views still open on it
pub struct Analysis {
    pub processes: Vec<TraceProcess>,
    pub stats: ProcessStats,
}

/// Correlate one trace file.
///
/// Returns `None` when the file does not carry the trace suffix; the fork
/// map is only read once the trace is accepted.
pub fn analyze_trace(path: &Path, config: &AnalysisConfig) -> Result<Option<Analysis>> {
    if !config.is_trace(path) {
        debug!("Not a trace file: {}", path.display());
        return Ok(None);
    }

    let fork_map_path = config.fork_map_for(path);
    let fork_map = ForkMap::load(&fork_map_path).context(format!(
        "Failed to read fork map: {}",
        fork_map_path.display()
    ))?;

    let parser = StapParser::open(path)
        .context(format!("Failed to open file: {}", path.display()))?;

    let mut correlator =
        ProcessCorrelator::new(&fork_map).with_suffix(config.trace_suffix.as_str());
    correlator.handles_path(path);

    let parse_start = Instant::now();
    let mut stats = ProcessStats::default();

    let mut correlated = correlator.parse(&parser);
    for event in correlated.by_ref() {
        match event.context(format!("Failed to read trace: {}", path.display()))? {
            TraceEvent::Process(_) => stats.processes += 1,
            TraceEvent::ApiCall(_) => stats.calls += 1,
        }
    }
    let parse_stats = correlated.stats();
    stats.total_lines = parse_stats.total_lines;
    stats.parsed_lines = parse_stats.parsed_lines;
    stats.failed_lines = parse_stats.failed_lines;

    let processes = correlator.run().unwrap_or_default();
    stats.time_parsing = parse_start.elapsed();

    info!(
        "{}: {} processes, {} calls ({} lines skipped)",
        path.display(),
        stats.processes,
        stats.calls,
        stats.failed_lines
    );

    Ok(Some(Analysis { processes, stats }))
}

fn trace_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
}

/// Analyze a single trace file and insert its processes and calls
pub fn process_file(db: &Database, path: &Path, config: &AnalysisConfig) -> Result<ProcessStats> {
    let Some(analysis) = analyze_trace(path, config)? else {
        return Ok(ProcessStats::default());
    };
    let mut stats = analysis.stats;

    let db_start = Instant::now();
    if !analysis.processes.is_empty() {
        db.append_batch(trace_name(path), &analysis.processes)?;
    }
    stats.time_db_insert = db_start.elapsed();

    Ok(stats)
}

/// Process a file using provided appenders (for reuse across multiple files)
pub fn process_file_with_appenders(
    process_appender: &mut Appender,
    call_appender: &mut Appender,
    path: &Path,
    config: &AnalysisConfig,
) -> Result<ProcessStats> {
    let Some(analysis) = analyze_trace(path, config)? else {
        return Ok(ProcessStats::default());
    };
    let mut stats = analysis.stats;

    let db_start = Instant::now();
    database::append_processes(
        process_appender,
        call_appender,
        trace_name(path),
        &analysis.processes,
    )?;
    stats.time_db_insert = db_start.elapsed();

    Ok(stats)
}
