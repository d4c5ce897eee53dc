use crate::config::AnalysisConfig;
use crate::database::Database;
use crate::processor::{self, ProcessStats};
use anyhow::Result;
use crossbeam::channel;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, warn};
use std::path::PathBuf;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::thread;
use std::time::Instant;

/// Number of worker threads used for `num_files` traces
pub fn worker_count(num_files: usize) -> usize {
    num_cpus::get().min(num_files.max(1))
}

/// Load many independent traces at once, one trace per job.
/// Each trace is still correlated on a single thread.
pub fn process_files_parallel(
    db: Arc<Database>,
    files: Vec<PathBuf>,
    config: &AnalysisConfig,
) -> Result<ProcessStats> {
    let num_threads = worker_count(files.len());
    let num_files = files.len();
    let (sender, receiver) = channel::unbounded::<PathBuf>();

    // Send all files to the channel
    for file in files {
        sender.send(file)?;
    }
    drop(sender); // Close the channel

    // Setup progress bars
    let multi_progress = MultiProgress::new();
    let overall_progress = multi_progress.add(ProgressBar::new(num_files as u64));
    overall_progress.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} traces ({percent}%) | {msg}",
            )?
            .progress_chars("#>-"),
    );

    // Shared statistics counters
    let files_processed = Arc::new(AtomicUsize::new(0));
    let lines_processed = Arc::new(AtomicUsize::new(0));
    let totals = Arc::new(Mutex::new(ProcessStats::default()));
    let start_time = Instant::now();

    // Spawn worker threads
    let mut handles = vec![];

    for worker_id in 0..num_threads {
        let receiver = receiver.clone();
        let db_clone = Arc::clone(&db);
        let totals = Arc::clone(&totals);
        let files_done = Arc::clone(&files_processed);
        let lines_done = Arc::clone(&lines_processed);
        let progress = overall_progress.clone();
        let config = config.clone();

        let handle = thread::spawn(move || -> Result<()> {
            // Clone connection for this worker
            let worker_conn = {
                let main_conn = db_clone.get_connection();
                let conn = main_conn.lock().unwrap();
                conn.try_clone()?
            };

            // Create ONE appender pair for this worker
            let mut process_appender = worker_conn.appender("processes")?;
            let mut call_appender = worker_conn.appender("calls")?;

            while let Ok(file_path) = receiver.recv() {
                let file_name = file_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown");

                match processor::process_file_with_appenders(
                    &mut process_appender,
                    &mut call_appender,
                    &file_path,
                    &config,
                ) {
                    Ok(stats) => {
                        let current_lines = lines_done
                            .fetch_add(stats.total_lines, Ordering::SeqCst)
                            + stats.total_lines;
                        totals.lock().unwrap().merge(&stats);

                        let done = files_done.fetch_add(1, Ordering::SeqCst) + 1;

                        let elapsed = start_time.elapsed().as_secs_f64();
                        let lines_per_sec = if elapsed > 0.0 {
                            current_lines as f64 / elapsed
                        } else {
                            0.0
                        };

                        progress.set_position(done as u64);
                        progress.set_message(format!(
                            "{:.1}K lines/sec | Last: {}",
                            lines_per_sec / 1000.0,
                            file_name
                        ));
                    }
                    Err(e) => {
                        warn!(
                            "[Worker {}] Error processing {}: {:#}",
                            worker_id,
                            file_path.display(),
                            e
                        );
                    }
                }
            }

            // Flush once when worker is done with all files
            process_appender.flush()?;
            call_appender.flush()?;

            Ok(())
        });

        handles.push(handle);
    }

    // Wait for all workers to complete
    for (i, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Worker {} returned error: {:#}", i, e),
            Err(_) => error!("Worker {} panicked", i),
        }
    }

    overall_progress.finish_with_message("Complete!");

    let totals = totals.lock().unwrap().clone();
    Ok(totals)
}
