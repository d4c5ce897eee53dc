//! Groups a trace's calls by process.
//!
//! SystemTap traces carry no process lifecycle events, so the correlator
//! synthesizes one the first time each pid appears and looks its parent up
//! in the fork map recorded by the probe module.

use crate::config::{TRACE_SUFFIX, has_suffix};
use crate::error::Result;
use crate::forkmap::ForkMap;
use crate::stream::{FilteredView, ParseStats, StapEvents, StapParser};
use crate::types::{CallEvent, EventKind, ProcessEvent, TraceEvent};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::io::{BufRead, Seek};
use std::path::Path;

/// One distinct pid seen in the trace
#[derive(Debug, Clone)]
pub struct ProcessRecord<R> {
    pub pid: i64,
    /// `None` when the fork map has no record for this pid
    pub ppid: Option<i64>,
    pub process_name: String,
    pub first_seen: NaiveDateTime,
    pub calls: FilteredView<R>,
}

pub struct ProcessCorrelator<'f, R> {
    fork_map: &'f ForkMap,
    trace_suffix: String,
    seen: HashSet<i64>,
    processes: Vec<ProcessRecord<R>>,
    matched: bool,
}

impl<'f, R: BufRead + Seek> ProcessCorrelator<'f, R> {
    pub fn new(fork_map: &'f ForkMap) -> Self {
        Self {
            fork_map,
            trace_suffix: TRACE_SUFFIX.to_string(),
            seen: HashSet::new(),
            processes: Vec::new(),
            matched: false,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.trace_suffix = suffix.into();
        self
    }

    /// Whether `path` is a trace this correlator understands.
    /// A match arms `run`; without one it returns nothing.
    pub fn handles_path(&mut self, path: &Path) -> bool {
        let matches = has_suffix(path, &self.trace_suffix);
        if matches {
            self.matched = true;
        }
        matches
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    /// Correlate one traversal of `parser`, yielding a synthetic process
    /// event ahead of the first call of every new pid.
    pub fn parse<'c>(&'c mut self, parser: &StapParser<R>) -> Correlated<'c, 'f, R> {
        Correlated {
            correlator: self,
            parser: parser.clone(),
            events: parser.iter(),
            pending: None,
        }
    }

    /// Sort the discovered processes by first appearance and hand them over.
    /// Processes seen at the same instant keep their discovery order.
    pub fn run(self) -> Option<Vec<ProcessRecord<R>>> {
        if !self.matched {
            return None;
        }

        let mut processes = self.processes;
        processes.sort_by_key(|p| p.first_seen);
        Some(processes)
    }

    fn observe(&mut self, event: &CallEvent, parser: &StapParser<R>) -> Option<ProcessEvent> {
        if !self.seen.insert(event.pid) {
            return None;
        }

        let ppid = self.fork_map.parent_of(event.pid);
        self.processes.push(ProcessRecord {
            pid: event.pid,
            ppid,
            process_name: event.process_name.clone(),
            first_seen: event.timestamp,
            calls: FilteredView::new(parser.clone(), event.pid),
        });

        Some(ProcessEvent {
            pid: event.pid,
            ppid,
            process_name: event.process_name.clone(),
            first_seen: event.timestamp,
            kind: EventKind::Process,
        })
    }
}

/// The correlated event stream of one traversal
pub struct Correlated<'c, 'f, R> {
    correlator: &'c mut ProcessCorrelator<'f, R>,
    parser: StapParser<R>,
    events: StapEvents<R>,
    pending: Option<CallEvent>,
}

impl<R: BufRead + Seek> Correlated<'_, '_, R> {
    pub fn stats(&self) -> ParseStats {
        self.events.stats()
    }
}

impl<R: BufRead + Seek> Iterator for Correlated<'_, '_, R> {
    type Item = Result<TraceEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.pending.take() {
            return Some(Ok(TraceEvent::ApiCall(event)));
        }

        let event = match self.events.next()? {
            Ok(event) => event,
            Err(e) => return Some(Err(e)),
        };

        match self.correlator.observe(&event, &self.parser) {
            Some(process) => {
                self.pending = Some(event);
                Some(Ok(TraceEvent::Process(process)))
            }
            None => Some(Ok(TraceEvent::ApiCall(event))),
        }
    }
}
