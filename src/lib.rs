// Re-export modules for benchmarking and testing
pub mod config;
pub mod correlator;
pub mod database;
pub mod error;
pub mod forkmap;
pub mod parallel_processor;
pub mod parser;
pub mod processor;
pub mod report;
pub mod stream;
pub mod types;
