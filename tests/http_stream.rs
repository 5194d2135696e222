//! Integration tests for the HTTP adapter against a local mock server.
//!
//! The mock server runs on its own tokio runtime; the blocking client is
//! driven from the test thread, outside any async context.

#![cfg(feature = "http")]

use serde_json::json;
use streamflow_core::streaming::{DataStream, HeaderProbe, HttpStream, Session};
use streamflow_core::{AppConfig, Envelope, Result, StreamClient, StreamError, settings};
use tokio::runtime::Runtime;
use wiremock::matchers::{body_string, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Starts a mock server with `mocks` mounted.
fn serve(mocks: Vec<Mock>) -> (Runtime, MockServer) {
    let rt = Runtime::new().expect("runtime");
    let server = rt.block_on(async {
        let server = MockServer::start().await;
        for mock in mocks {
            mock.mount(&server).await;
        }
        server
    });
    (rt, server)
}

fn drain(stream: &mut dyn DataStream) -> Vec<Envelope> {
    let mut session = Session::open(stream).expect("open");
    let envelopes = session
        .read()
        .expect("read")
        .collect::<Result<Vec<_>>>()
        .expect("envelopes");
    session.finish().expect("close");
    envelopes
}

fn text(envelope: &Envelope) -> &str {
    std::str::from_utf8(envelope.payload().as_bytes().expect("bytes")).expect("utf-8")
}

#[test]
fn bytes_mode_yields_fixed_blocks() {
    let (_rt, server) = serve(vec![
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(ResponseTemplate::new(200).set_body_string("0123456789")),
    ]);

    let mut stream = HttpStream::new(
        format!("{}/blob", server.uri()),
        settings! { "chunk_size" => 4 },
    )
    .expect("stream");
    let envelopes = drain(&mut stream);

    let parts: Vec<_> = envelopes.iter().map(text).collect();
    assert_eq!(parts, vec!["0123", "4567", "89"]);
    assert_eq!(envelopes[0].metadata["status"], 200);
    assert_eq!(envelopes[2].metadata["chunk_index"], 2);
    assert!(!stream.is_open());
}

#[test]
fn lines_are_trimmed_and_blanks_skipped() {
    let (_rt, server) = serve(vec![
        Mock::given(method("GET"))
            .and(path("/events.jsonl"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"a\":1}\r\n\n{\"b\":2}\n")),
    ]);

    let mut stream = HttpStream::new(
        format!("{}/events.jsonl", server.uri()),
        settings! { "read_mode" => "lines" },
    )
    .expect("stream");
    let lines: Vec<_> = drain(&mut stream).iter().map(|e| text(e).to_string()).collect();
    assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
}

#[test]
fn error_status_fails_at_open() {
    let (_rt, server) = serve(vec![
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404)),
    ]);

    let mut stream =
        HttpStream::new(format!("{}/missing", server.uri()), settings! {}).expect("stream");
    let err = stream.open().expect_err("404");
    match err {
        StreamError::ResourceUnavailable { resource, reason } => {
            assert!(resource.ends_with("/missing"));
            assert!(reason.contains("404"));
        }
        other => panic!("expected ResourceUnavailable, got {other}"),
    }
    assert!(!stream.is_open());
}

#[test]
fn exists_uses_head_without_opening() {
    let (_rt, server) = serve(vec![
        Mock::given(method("HEAD"))
            .and(path("/present"))
            .respond_with(ResponseTemplate::new(200)),
        Mock::given(method("HEAD"))
            .and(path("/absent"))
            .respond_with(ResponseTemplate::new(404)),
    ]);

    let present =
        HttpStream::new(format!("{}/present", server.uri()), settings! {}).expect("stream");
    let absent =
        HttpStream::new(format!("{}/absent", server.uri()), settings! {}).expect("stream");
    assert!(present.exists().expect("probe"));
    assert!(!absent.exists().expect("probe"));
    assert!(!present.is_open());
}

#[test]
fn unreachable_host_is_not_an_error_for_exists() {
    let stream = HttpStream::new("http://127.0.0.1:9/nothing", settings! { "timeout" => 1 })
        .expect("stream");
    assert!(!stream.exists().expect("probe"));
}

#[test]
fn transport_failure_surfaces_after_retries() {
    let mut stream = HttpStream::new(
        "http://127.0.0.1:9/nothing",
        settings! { "timeout" => 1, "retries" => 1 },
    )
    .expect("stream");
    let err = stream.open().expect_err("nothing listens on port 9");
    assert!(matches!(err, StreamError::Transport(_)));
    assert!(!stream.is_open());
}

#[test]
fn body_and_params_are_sent() {
    let (_rt, server) = serve(vec![
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(query_param("limit", "5"))
            .and(body_string("system:Sol"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hit\n")),
    ]);

    let mut stream = HttpStream::new(
        format!("{}/search", server.uri()),
        settings! {
            "method" => "post",
            "params" => json!({"limit": "5"}),
            "request_body" => "system:Sol",
            "use_lines" => true,
        },
    )
    .expect("stream");
    let envelopes = drain(&mut stream);
    assert_eq!(envelopes.len(), 1);
    assert_eq!(text(&envelopes[0]), "hit");
}

#[test]
fn header_probe_stamps_every_envelope() {
    let (_rt, server) = serve(vec![
        Mock::given(method("HEAD"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).insert_header("X-Feed-Version", "7")),
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("a\nb\n")),
    ]);

    let inner = HttpStream::new(format!("{}/feed", server.uri()), settings! { "use_lines" => true })
        .expect("stream");
    let mut probed = HeaderProbe::new(inner);
    let envelopes = drain(&mut probed);

    assert_eq!(envelopes.len(), 2);
    for envelope in &envelopes {
        assert_eq!(envelope.metadata["x-feed-version"], "7");
    }
    assert_eq!(probed.headers()["x-feed-version"], "7");
}

#[test]
fn client_applies_protocol_tier() {
    let (_rt, server) = serve(vec![
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(ResponseTemplate::new(200).set_body_string("abcdef")),
    ]);

    let config = AppConfig::from_toml_str(
        r#"
        chunk_size = 1024

        [protocols.http]
        chunk_size = 2
        "#,
    )
    .expect("config");
    let client = StreamClient::new(config).expect("client");

    let mut stream = client
        .get_stream(&format!("{}/blob", server.uri()), false, settings! {})
        .expect("stream");
    assert_eq!(stream.chunk_size(), 2);
    assert_eq!(drain(stream.as_mut()).len(), 3);

    let sink = client.get_stream(&format!("{}/blob", server.uri()), true, settings! {});
    assert!(matches!(sink.err(), Some(StreamError::Unsupported { .. })));
}
