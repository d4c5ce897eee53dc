//! JSON export of the per-process call log.

use crate::correlator::ProcessRecord;
use crate::error::OutputError;
use crate::types::CallEvent;
use chrono::NaiveDateTime;
use log::{debug, info};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufWriter, Seek, Write};
use std::path::Path;

/// A process with its calls replayed from the trace
#[derive(Debug, Serialize)]
pub struct ProcessReport {
    pub pid: i64,
    pub ppid: Option<i64>,
    pub process_name: String,
    pub first_seen: NaiveDateTime,
    pub calls: Vec<CallEvent>,
}

/// Materialize every process's calls, keeping the process order
pub fn to_report<R: BufRead + Seek>(
    processes: &[ProcessRecord<R>],
) -> Result<Vec<ProcessReport>, OutputError> {
    processes
        .iter()
        .map(|process| {
            let calls = process.calls.iter().collect::<Result<Vec<_>, _>>()?;
            Ok(ProcessReport {
                pid: process.pid,
                ppid: process.ppid,
                process_name: process.process_name.clone(),
                first_seen: process.first_seen,
                calls,
            })
        })
        .collect()
}

/// Write the report as pretty-printed JSON
pub fn write_report<R: BufRead + Seek>(
    processes: &[ProcessRecord<R>],
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();
    info!("Writing report to: {}", output_path.display());

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating parent directories: {}", parent.display());
            std::fs::create_dir_all(parent)?;
        }
    }

    let report = to_report(processes)?;

    let mut writer = BufWriter::new(File::create(output_path)?);
    serde_json::to_writer_pretty(&mut writer, &report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::ProcessCorrelator;
    use crate::forkmap::ForkMap;
    use crate::stream::StapParser;
    use serde_json::{Value, json};
    use std::io::Cursor;

    const TRACE: &str = "\
Thu May  7 14:58:43 2015.000100 sh@400123[10] open(\"/etc\", 0) = 3 (0)
Thu May  7 14:58:43 2015.000200 sh@400123[10] getdents([1, 2], 3) = 0 (0)
";

    fn processes() -> Vec<ProcessRecord<Cursor<Vec<u8>>>> {
        let parser = StapParser::new(Cursor::new(TRACE.as_bytes().to_vec()));
        let forks = ForkMap::default();
        let mut correlator = ProcessCorrelator::new(&forks);
        correlator.handles_path(Path::new("t.stap"));
        for event in correlator.parse(&parser) {
            event.expect("Should correlate");
        }
        correlator.run().expect("Trace was matched")
    }

    #[test]
    fn test_report_shape() {
        let report = to_report(&processes()).expect("Failed to build report");
        let value = serde_json::to_value(&report).expect("Failed to serialize");

        assert_eq!(value[0]["pid"], json!(10));
        assert_eq!(value[0]["ppid"], Value::Null);
        assert_eq!(value[0]["first_seen"], json!("2015-05-07T14:58:43.000100"));

        let calls = value[0]["calls"].as_array().expect("calls is an array");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0]["api"], json!("open"));
        assert_eq!(calls[0]["arguments"], json!({"p0": "/etc", "p1": "0"}));
        assert_eq!(calls[1]["arguments"], json!({"p0": ["1", "2"], "p1": "3"}));
        // Calls replayed through a process view carry no type tag
        assert!(calls[0].get("type").is_none());
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested/report.json");

        write_report(&processes(), &path).expect("Failed to write report");

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("Report exists"))
                .expect("Report is JSON");
        assert_eq!(written.as_array().map(Vec::len), Some(1));
    }
}
