//! Example: HTTP source to local sink
//!
//! Fetches a JSON-lines endpoint line by line, probes its headers first,
//! guards the content type, and writes each record as hex-encoded
//! MessagePack into an anchored directory.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example http_streaming -- https://example.com/events.jsonl ./out
//! ```

use std::env;
use std::path::PathBuf;

use streamflow_core::middleware::{
    ContentTypeGuard, HeaderInspector, JsonToMsgpack, RowCounter, ToHex,
};
use streamflow_core::streaming::{HeaderProbe, HttpStream};
use streamflow_core::{AppConfig, Pipeline, StreamClient, settings};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: http_streaming <url> <output_dir>");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  http_streaming https://example.com/events.jsonl ./out");
        std::process::exit(1);
    }
    let url = &args[1];

    let mut config = AppConfig::default();
    config.anchors.insert("out".into(), PathBuf::from(&args[2]));
    let client = StreamClient::new(config)?;

    let http = HttpStream::new(
        url.as_str(),
        settings! { "use_lines" => true, "timeout" => 10, "retries" => 2 },
    )?;
    let mut source = HeaderProbe::new(http);
    let mut sink = client.get_stream("out/events.hex", true, settings! {})?;

    let mut inspect = HeaderInspector::new();
    let mut guard = ContentTypeGuard::new("json");
    let mut count = RowCounter::new();
    let mut pack = JsonToMsgpack::new();
    let mut hex = ToHex::new();

    let report = Pipeline::new()
        .with(&mut inspect)
        .with(&mut guard)
        .with(&mut count)
        .with(&mut pack)
        .with(&mut hex)
        .run(&mut source, sink.as_mut())?;

    println!("Probed headers:  {}", source.headers().len());
    println!("Lines fetched:   {}", report.records_read);
    println!("Records written: {}", report.records_written);
    println!("Wall time:       {:?}", report.elapsed);
    Ok(())
}
