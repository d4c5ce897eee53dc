//! Restartable iteration over a SystemTap trace.
//!
//! A `StapParser` shares one reader between any number of traversals. Each
//! traversal starts at the beginning of the source and keeps its own byte
//! offset, seeking the reader back to it when another traversal moved it.
//! Nothing is cached: memory stays bounded no matter how large the trace is.

use crate::error::{Result, TraceError};
use crate::parser;
use crate::types::CallEvent;
use log::debug;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub total_lines: usize,
    pub parsed_lines: usize,
    pub failed_lines: usize,
}

struct Shared<R> {
    reader: R,
    /// Current reader offset, `None` until the first read
    position: Option<u64>,
}

pub struct StapParser<R> {
    source: Arc<Mutex<Shared<R>>>,
}

// Clones share the underlying reader
impl<R> Clone for StapParser<R> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<R> fmt::Debug for StapParser<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StapParser").finish_non_exhaustive()
    }
}

impl StapParser<BufReader<File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead + Seek> StapParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            source: Arc::new(Mutex::new(Shared {
                reader,
                position: None,
            })),
        }
    }

    /// Start a new traversal from the beginning of the trace
    pub fn iter(&self) -> StapEvents<R> {
        StapEvents {
            source: Arc::clone(&self.source),
            offset: 0,
            buf: Vec::new(),
            stats: ParseStats::default(),
            done: false,
        }
    }
}

impl<'a, R: BufRead + Seek> IntoIterator for &'a StapParser<R> {
    type Item = Result<CallEvent>;
    type IntoIter = StapEvents<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One traversal over the trace. Lines that fail to tokenize are skipped
/// and counted; I/O errors end the traversal after being yielded.
pub struct StapEvents<R> {
    source: Arc<Mutex<Shared<R>>>,
    offset: u64,
    buf: Vec<u8>,
    stats: ParseStats,
    done: bool,
}

impl<R: BufRead + Seek> StapEvents<R> {
    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    /// Read the line at this traversal's offset into `buf`.
    /// Returns false at end of input.
    fn read_line(&mut self) -> Result<bool> {
        let mut shared = self.source.lock().map_err(|_| TraceError::Poisoned)?;

        if shared.position != Some(self.offset) {
            if let Err(e) = shared.reader.seek(SeekFrom::Start(self.offset)) {
                shared.position = None;
                return Err(e.into());
            }
            shared.position = Some(self.offset);
        }

        self.buf.clear();
        let read = match shared.reader.read_until(b'\n', &mut self.buf) {
            Ok(read) => read,
            Err(e) => {
                shared.position = None;
                return Err(e.into());
            }
        };

        self.offset += read as u64;
        shared.position = Some(self.offset);
        Ok(read > 0)
    }
}

impl<R: BufRead + Seek> Iterator for StapEvents<R> {
    type Item = Result<CallEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            match self.read_line() {
                Ok(true) => {}
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }

            self.stats.total_lines += 1;
            let line = String::from_utf8_lossy(&self.buf);
            let line = line.trim_end_matches(['\n', '\r']);

            match parser::parse_line(line) {
                Ok(event) => {
                    self.stats.parsed_lines += 1;
                    return Some(Ok(event));
                }
                Err(e) => {
                    self.stats.failed_lines += 1;
                    debug!("Skipping line {}: {}", self.stats.total_lines, e);
                }
            }
        }
    }
}

/// A restartable view of one process's calls over a shared trace.
/// Every traversal rescans the trace from its start.
pub struct FilteredView<R> {
    parser: StapParser<R>,
    pid: i64,
}

impl<R> fmt::Debug for FilteredView<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredView")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl<R> Clone for FilteredView<R> {
    fn clone(&self) -> Self {
        Self {
            parser: self.parser.clone(),
            pid: self.pid,
        }
    }
}

impl<R: BufRead + Seek> FilteredView<R> {
    pub fn new(parser: StapParser<R>, pid: i64) -> Self {
        Self { parser, pid }
    }

    pub fn pid(&self) -> i64 {
        self.pid
    }

    pub fn iter(&self) -> FilteredCalls<R> {
        FilteredCalls {
            events: self.parser.iter(),
            pid: self.pid,
        }
    }
}

impl<'a, R: BufRead + Seek> IntoIterator for &'a FilteredView<R> {
    type Item = Result<CallEvent>;
    type IntoIter = FilteredCalls<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct FilteredCalls<R> {
    events: StapEvents<R>,
    pid: i64,
}

impl<R: BufRead + Seek> Iterator for FilteredCalls<R> {
    type Item = Result<CallEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        for item in self.events.by_ref() {
            match item {
                Ok(mut event) if event.pid == self.pid => {
                    event.kind = None;
                    return Some(Ok(event));
                }
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicBool, Ordering};

    const TRACE: &str = "\
Thu May  7 14:58:43 2015.390178 python@7f798cb95240[2114] open(\"/tmp/a\", O_RDONLY) = 3 (0)
Thu May  7 14:58:43 2015.390200 sh@400123[2115] getpid() = 2115 (0)
this line is not a trace record
Thu May  7 14:58:43 2015.390300 python@7f798cb95240[2114] close(3) = 0 (0)
";

    fn parser() -> StapParser<Cursor<Vec<u8>>> {
        StapParser::new(Cursor::new(TRACE.as_bytes().to_vec()))
    }

    #[test]
    fn test_iter_skips_malformed_lines() {
        let parser = parser();
        let mut events = parser.iter();

        let apis: Vec<String> = events
            .by_ref()
            .map(|e| e.expect("Should read").api)
            .collect();

        assert_eq!(apis, vec!["open", "getpid", "close"]);
        assert_eq!(
            events.stats(),
            ParseStats {
                total_lines: 4,
                parsed_lines: 3,
                failed_lines: 1,
            }
        );
    }

    #[test]
    fn test_every_traversal_restarts() {
        let parser = parser();

        let first: Vec<CallEvent> = parser.iter().map(|e| e.unwrap()).collect();
        let second: Vec<CallEvent> = parser.iter().map(|e| e.unwrap()).collect();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_interleaved_traversals_keep_own_cursor() {
        let parser = parser();
        let mut a = parser.iter();
        let mut b = parser.iter();

        assert_eq!(a.next().unwrap().unwrap().api, "open");
        assert_eq!(b.next().unwrap().unwrap().api, "open");
        assert_eq!(a.next().unwrap().unwrap().api, "getpid");
        assert_eq!(a.next().unwrap().unwrap().api, "close");
        assert_eq!(b.next().unwrap().unwrap().api, "getpid");
        assert!(a.next().is_none());
        assert_eq!(b.next().unwrap().unwrap().api, "close");
        assert!(b.next().is_none());
    }

    /// Reader whose next seek fails after moving the cursor to the end
    struct FailingSeek {
        inner: Cursor<Vec<u8>>,
        fail: Arc<AtomicBool>,
    }

    impl Read for FailingSeek {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl BufRead for FailingSeek {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            self.inner.fill_buf()
        }

        fn consume(&mut self, amt: usize) {
            self.inner.consume(amt)
        }
    }

    impl Seek for FailingSeek {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            if self.fail.swap(false, Ordering::SeqCst) {
                let end = self.inner.get_ref().len() as u64;
                self.inner.set_position(end);
                return Err(io::Error::other("seek failed"));
            }
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_failed_seek_does_not_strand_other_traversals() {
        let fail = Arc::new(AtomicBool::new(false));
        let parser = StapParser::new(FailingSeek {
            inner: Cursor::new(TRACE.as_bytes().to_vec()),
            fail: Arc::clone(&fail),
        });

        let mut a = parser.iter();
        assert_eq!(a.next().unwrap().unwrap().api, "open");

        fail.store(true, Ordering::SeqCst);
        let mut b = parser.iter();
        assert!(matches!(b.next(), Some(Err(TraceError::Io(_)))));
        assert!(b.next().is_none());

        // The reader was left at the end; `a` has to seek back to its own offset
        assert_eq!(a.next().unwrap().unwrap().api, "getpid");
        assert_eq!(a.next().unwrap().unwrap().api, "close");
        assert!(a.next().is_none());
    }

    #[test]
    fn test_filtered_view_strips_kind_and_restarts() {
        let view = FilteredView::new(parser(), 2114);

        let first: Vec<CallEvent> = view.iter().map(|e| e.unwrap()).collect();
        let second: Vec<CallEvent> = (&view).into_iter().map(|e| e.unwrap()).collect();

        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|e| e.pid == 2114 && e.kind.is_none()));
        assert_eq!(first, second);
    }

    #[test]
    fn test_top_level_events_keep_kind() {
        let parser = parser();
        assert!(
            parser
                .iter()
                .all(|e| e.unwrap().kind == Some(EventKind::ApiCall))
        );
    }

    #[test]
    fn test_crlf_lines() {
        let text = "Thu May  7 14:58:43 2015.390178 sh@1[5] exit(0) = 0 (0)\r\n";
        let parser = StapParser::new(Cursor::new(text.as_bytes().to_vec()));
        let events: Vec<CallEvent> = parser.iter().map(|e| e.unwrap()).collect();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, "0");
    }
}
