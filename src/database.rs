use crate::correlator::ProcessRecord;
use crate::types::CallEvent;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use duckdb::{Appender, Connection, params};
use std::io::{BufRead, Seek};
use std::sync::{Arc, Mutex};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub fn format_time(time: &NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Initialize a new database with schema
    pub fn init(path: &str) -> Result<Self> {
        let conn =
            Connection::open(path).context(format!("Failed to open database at {}", path))?;

        // Create tables
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS processes (
                trace_file VARCHAR,
                pid BIGINT,
                ppid BIGINT,
                process_name VARCHAR,
                first_seen VARCHAR
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS calls (
                trace_file VARCHAR,
                pid BIGINT,
                timestamp VARCHAR,
                process_name VARCHAR,
                instruction_pointer VARCHAR,
                api VARCHAR,
                arguments TEXT,
                return_value VARCHAR,
                status VARCHAR
            )
            "#,
            [],
        )?;

        // Create indexes
        conn.execute("CREATE INDEX IF NOT EXISTS idx_call_pid ON calls(pid)", [])?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_call_api ON calls(api)", [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_process_pid ON processes(pid)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get a clone of the connection for concurrent access
    pub fn get_connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Append every process and, through its view, every call it made.
    /// Returns the number of calls written.
    pub fn append_batch<R: BufRead + Seek>(
        &self,
        trace_file: &str,
        processes: &[ProcessRecord<R>],
    ) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let mut process_appender = conn.appender("processes")?;
        let mut call_appender = conn.appender("calls")?;

        let calls = append_processes(
            &mut process_appender,
            &mut call_appender,
            trace_file,
            processes,
        )?;

        process_appender.flush()?;
        call_appender.flush()?;
        Ok(calls)
    }

    pub fn count_processes(&self) -> Result<usize> {
        self.count("processes")
    }

    pub fn count_calls(&self) -> Result<usize> {
        self.count("calls")
    }

    fn count(&self, table: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("SELECT COUNT(*) FROM {}", table))?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Write processes and their calls with caller-owned appenders (one pair per worker)
pub fn append_processes<R: BufRead + Seek>(
    process_appender: &mut Appender,
    call_appender: &mut Appender,
    trace_file: &str,
    processes: &[ProcessRecord<R>],
) -> Result<usize> {
    let mut calls = 0;

    for process in processes {
        process_appender.append_row(params![
            trace_file,
            process.pid,
            process.ppid,
            &process.process_name,
            format_time(&process.first_seen),
        ])?;

        for call in &process.calls {
            append_call(call_appender, trace_file, &call?)?;
            calls += 1;
        }
    }

    Ok(calls)
}

pub fn append_call(appender: &mut Appender, trace_file: &str, call: &CallEvent) -> Result<()> {
    let arguments =
        serde_json::to_string(&call.arguments).context("Failed to encode call arguments")?;

    appender.append_row(params![
        trace_file,
        call.pid,
        format_time(&call.timestamp),
        &call.process_name,
        &call.instruction_pointer,
        &call.api,
        arguments,
        &call.return_value,
        &call.status,
    ])?;

    Ok(())
}
