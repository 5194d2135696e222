//! Example: sandboxed file-to-file pipeline
//!
//! Reads a JSON array or JSON-lines file in fixed-size blocks, reassembles
//! the records, counts them, and writes them back out as compact JSON lines.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --example file_to_file -- ./data journal.json journal.jsonl
//! ```
//!
//! The first argument is the directory registered as the `data` anchor; the
//! other two are paths inside it.

use std::env;
use std::path::PathBuf;

use streamflow_core::middleware::{
    BytesToJson, ExecutionTimer, FnMiddleware, JsonRecordAggregator, JsonToBytes, RowCounter,
    Sha256Hasher,
};
use streamflow_core::{AppConfig, Pipeline, Regime, StreamClient, settings};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: file_to_file <anchor_dir> <input> <output>");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  file_to_file ./data journal.json journal.jsonl");
        std::process::exit(1);
    }

    let mut config = AppConfig::default();
    config.anchors.insert("data".into(), PathBuf::from(&args[1]));
    let client = StreamClient::new(config)?;

    let source_uri = format!("data/{}", args[2]);
    let mut source = client.get_stream(&source_uri, false, settings! { "chunk_size" => 256 })?;
    let mut sink = client.get_stream(&format!("data/{}", args[3]), true, settings! {})?;

    let mut hasher = Sha256Hasher::new();
    let mut aggregate = JsonRecordAggregator::new();
    let mut decode = BytesToJson::new();
    let mut count = RowCounter::new();
    let mut timer = ExecutionTimer::new();
    let mut encode = JsonToBytes::new();
    let mut newline = FnMiddleware::new("Newline", Regime::Bytes, Regime::Bytes, |payload| {
        let mut line = payload
            .as_bytes()
            .map(|b| b.to_vec())
            .unwrap_or_default();
        line.push(b'\n');
        Ok(vec![line.into()])
    });

    let report = Pipeline::new()
        .with(&mut hasher)
        .with(&mut aggregate)
        .with(&mut decode)
        .with(&mut count)
        .with(&mut timer)
        .with(&mut encode)
        .with(&mut newline)
        .run(source.as_mut(), sink.as_mut())?;

    println!("Blocks read:     {}", report.records_read);
    println!("Records written: {}", report.records_written);
    println!("Records counted: {}", count.count());
    println!("Input sha256:    {}", hasher.hex_digest());
    println!("Stream span:     {}", timer.readable_time());
    println!("Wall time:       {:?}", report.elapsed);
    Ok(())
}
