use stap_to_duckdb::config::AnalysisConfig;
use stap_to_duckdb::{database, parallel_processor, processor, report};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "stap-to-duckdb")]
#[command(about = "Parse SystemTap call traces into per-process DuckDB tables", long_about = None)]
struct Args {
    /// Output database path
    #[arg(short, long, env = "STAP_DB")]
    output: PathBuf,

    /// Fork map file (defaults to all.lkm next to each trace)
    #[arg(long)]
    fork_map: Option<PathBuf>,

    /// Also write the process list of a single trace as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Sequential mode (disable parallel processing)
    #[arg(short, long)]
    sequential: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Input trace files (*.stap)
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    if args.files.is_empty() {
        eprintln!("Error: No input files specified");
        std::process::exit(1);
    }

    let config = AnalysisConfig {
        fork_map: args.fork_map.clone(),
        ..Default::default()
    };

    if let Some(json_path) = &args.json {
        let [trace] = args.files.as_slice() else {
            anyhow::bail!("--json takes exactly one trace file");
        };
        let analysis = processor::analyze_trace(trace, &config)?
            .with_context(|| format!("Not a trace file: {}", trace.display()))?;
        report::write_report(&analysis.processes, json_path)?;
        println!("Report:       {}", json_path.display());
    }

    // Delete existing database if it exists
    if args.output.exists() {
        std::fs::remove_file(&args.output).context("Failed to delete existing database")?;
    }

    let db = Arc::new(database::Database::init(
        args.output.to_str().unwrap_or("output.db"),
    )?);

    println!("Processing {} file(s)...", args.files.len());

    let start = std::time::Instant::now();
    let total_stats = if args.sequential {
        let mut total_stats = processor::ProcessStats::default();

        for file_path in &args.files {
            println!("Processing: {}", file_path.display());
            let stats = processor::process_file(&db, file_path, &config)?;
            total_stats.merge(&stats);

            println!(
                "  Lines: {} total, {} parsed, {} failed | {} processes, {} calls",
                stats.total_lines,
                stats.parsed_lines,
                stats.failed_lines,
                stats.processes,
                stats.calls
            );
        }
        total_stats
    } else {
        println!(
            "Using {} threads",
            parallel_processor::worker_count(args.files.len())
        );
        parallel_processor::process_files_parallel(Arc::clone(&db), args.files.clone(), &config)?
    };

    let elapsed = start.elapsed();

    println!("\n=== Summary ===");
    println!("Total lines:  {}", total_stats.total_lines);
    println!("Parsed:       {}", total_stats.parsed_lines);
    println!("Failed:       {}", total_stats.failed_lines);
    println!("Processes:    {}", total_stats.processes);
    println!("Calls:        {}", total_stats.calls);
    println!("Time:         {:.2}s", elapsed.as_secs_f64());
    println!(
        "Throughput:   {:.1}K lines/sec",
        total_stats.total_lines as f64 / elapsed.as_secs_f64() / 1000.0
    );

    println!("\n=== Time Breakdown ===");
    let total_work = total_stats.time_parsing + total_stats.time_db_insert;
    let share = |part: std::time::Duration| {
        if total_work.is_zero() {
            0.0
        } else {
            part.as_secs_f64() / total_work.as_secs_f64() * 100.0
        }
    };
    println!(
        "Parsing:      {:.2}s ({:.1}%)",
        total_stats.time_parsing.as_secs_f64(),
        share(total_stats.time_parsing)
    );
    println!(
        "DB Insert:    {:.2}s ({:.1}%)",
        total_stats.time_db_insert.as_secs_f64(),
        share(total_stats.time_db_insert)
    );
    println!("Total Work:   {:.2}s", total_work.as_secs_f64());

    println!("\nDatabase:     {}", args.output.display());
    println!("Processes in DB: {}", db.count_processes()?);
    println!("Calls in DB:     {}", db.count_calls()?);

    Ok(())
}
