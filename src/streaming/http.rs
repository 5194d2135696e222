//! HTTP/HTTPS source stream using reqwest.

use std::io::BufReader;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contract::{BASE_FIELDS, FieldKind, FieldSpec, ReadMode, StreamContract};
use crate::error::{Result, StreamError};

use super::chunker::{Chunker, LineStyle};
use super::stream::{DataStream, EnvelopeStream, StreamAdapter, StreamCore, StreamMode, StreamSpec};

const DEFAULT_USER_AGENT: &str = concat!("streamflow-core/", env!("CARGO_PKG_VERSION"));

/// Methods that may carry `request_body`.
const BODY_METHODS: [Method; 4] = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

/// Settings for [`HttpStream`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpContract {
    /// Bytes per block read (default: 1024).
    pub chunk_size: usize,
    /// Read line by line regardless of `read_mode`.
    pub use_lines: bool,
    /// Read strategy (default: bytes).
    pub read_mode: ReadMode,
    /// Connect and read timeout in seconds (default: 30).
    pub timeout: f64,
    /// Retries for transient transport failures (default: 3).
    pub retries: u32,
    /// Verify TLS certificates (default: true).
    pub verify_ssl: bool,
    /// Extra request headers.
    pub headers: IndexMap<String, String>,
    /// `User-Agent` used when `headers` does not set one.
    pub user_agent: String,
    /// Request method (default: GET).
    pub method: String,
    /// Query parameters.
    pub params: IndexMap<String, String>,
    /// Body sent with POST, PUT, PATCH, or DELETE.
    pub request_body: Option<String>,
}

impl Default for HttpContract {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            use_lines: false,
            read_mode: ReadMode::Bytes,
            timeout: 30.0,
            retries: 3,
            verify_ssl: true,
            headers: IndexMap::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            method: "GET".to_string(),
            params: IndexMap::new(),
            request_body: None,
        }
    }
}

impl HttpContract {
    /// Parsed request method.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Configuration`] for an invalid method token.
    pub fn method(&self) -> Result<Method> {
        Method::from_str(&self.method.to_ascii_uppercase()).map_err(|_| {
            StreamError::config(Self::NAME, format!("invalid method '{}'", self.method))
        })
    }

    /// Request headers, with `User-Agent` injected unless already present.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Configuration`] for an invalid header name or value.
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len() + 1);
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StreamError::config(Self::NAME, format!("header '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StreamError::config(Self::NAME, format!("header '{name}': {e}")))?;
            map.insert(name, value);
        }
        if !map.contains_key(USER_AGENT) {
            let agent = HeaderValue::from_str(&self.user_agent)
                .map_err(|e| StreamError::config(Self::NAME, format!("user_agent: {e}")))?;
            map.insert(USER_AGENT, agent);
        }
        Ok(map)
    }

    /// Request timeout as a [`Duration`].
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Configuration`] unless `timeout` is a positive
    /// number of seconds that fits in a `Duration`.
    pub fn timeout(&self) -> Result<Duration> {
        match Duration::try_from_secs_f64(self.timeout) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            _ => Err(StreamError::config(
                Self::NAME,
                format!("timeout {} is not a usable number of seconds", self.timeout),
            )),
        }
    }

    fn client(&self) -> Result<Client> {
        let timeout = self.timeout()?;
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .danger_accept_invalid_certs(!self.verify_ssl)
            .default_headers(self.header_map()?)
            .build()?;
        Ok(client)
    }
}

impl StreamContract for HttpContract {
    const NAME: &'static str = "HttpContract";

    fn fields() -> &'static [FieldSpec] {
        const FIELDS: [FieldSpec; 11] = [
            BASE_FIELDS[0],
            BASE_FIELDS[1],
            FieldSpec::new("read_mode", FieldKind::Str),
            FieldSpec::new("timeout", FieldKind::Float),
            FieldSpec::new("retries", FieldKind::Int),
            FieldSpec::new("verify_ssl", FieldKind::Bool),
            FieldSpec::new("headers", FieldKind::Container),
            FieldSpec::new("user_agent", FieldKind::Str),
            FieldSpec::new("method", FieldKind::Str),
            FieldSpec::new("params", FieldKind::Container),
            FieldSpec::new("request_body", FieldKind::Str),
        ];
        &FIELDS
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn use_lines(&self) -> bool {
        self.use_lines
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StreamError::config(Self::NAME, "chunk_size must be > 0"));
        }
        self.timeout()?;
        self.method()?;
        self.header_map()?;
        Ok(())
    }
}

/// Read-only stream over one HTTP exchange.
///
/// `open()` sends the request and keeps the response body as the handle, so
/// a failing status surfaces at open time rather than on the first read.
pub struct HttpStream {
    core: StreamCore<HttpContract>,
    client: Option<Client>,
    response: Option<BufReader<Response>>,
}

impl HttpStream {
    /// Builds a closed source stream for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Configuration`] if the settings do not hydrate.
    pub fn new(url: impl Into<String>, settings: crate::Settings) -> Result<Self> {
        Self::from_spec(StreamSpec::new(url).settings(settings))
    }

    /// Hydrated settings.
    #[must_use]
    pub fn contract(&self) -> &HttpContract {
        self.core.contract()
    }

    /// Headers of the open response.
    #[must_use]
    pub fn response_headers(&self) -> Option<&HeaderMap> {
        self.response.as_ref().map(|r| r.get_ref().headers())
    }

    fn request(&self, client: &Client) -> Result<RequestBuilder> {
        let contract = self.core.contract();
        let method = contract.method()?;
        let mut request = client.request(method.clone(), self.core.resource());
        if !contract.params.is_empty() {
            request = request.query(&contract.params);
        }
        if let Some(body) = &contract.request_body {
            if BODY_METHODS.contains(&method) {
                request = request.body(body.clone());
            }
        }
        Ok(request)
    }

    /// Sends the request, retrying connect and timeout failures.
    fn send_with_retry(&self, client: &Client) -> Result<Response> {
        let retries = self.core.contract().retries;
        let mut last_error = None;

        for attempt in 0..=retries {
            if attempt > 0 {
                // 100ms, 200ms, 400ms, ...
                let delay_ms = 100u64 << (attempt - 1).min(10);
                thread::sleep(Duration::from_millis(delay_ms));
            }

            match self.request(client)?.send() {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let transient = e.is_connect() || e.is_timeout();
                    if transient && attempt < retries {
                        warn!(
                            url = self.core.resource(),
                            attempt,
                            error = %e,
                            "transient HTTP failure, retrying"
                        );
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error.map_or_else(
            || StreamError::unavailable(self.core.resource(), "max retries exceeded"),
            StreamError::from,
        ))
    }
}

impl StreamAdapter for HttpStream {
    type Contract = HttpContract;

    fn from_spec(spec: StreamSpec) -> Result<Self> {
        if spec.mode == StreamMode::Sink {
            return Err(StreamError::Unsupported {
                adapter: "HttpStream",
                capability: "sink mode",
            });
        }
        Ok(Self {
            core: StreamCore::from_spec(spec)?,
            client: None,
            response: None,
        })
    }
}

impl DataStream for HttpStream {
    fn logical(&self) -> &str {
        self.core.logical()
    }

    fn resource(&self) -> &str {
        self.core.resource()
    }

    fn mode(&self) -> StreamMode {
        self.core.mode()
    }

    fn chunk_size(&self) -> usize {
        self.core.contract().chunk_size
    }

    fn is_open(&self) -> bool {
        self.response.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.response.is_some() {
            return Ok(());
        }
        let client = self.core.contract().client()?;
        let response = self.send_with_retry(&client)?;
        let status = response.status();
        if !status.is_success() {
            drop(response);
            return Err(StreamError::unavailable(
                self.core.resource(),
                format!("HTTP {status}"),
            ));
        }
        debug!(url = self.core.resource(), %status, "opened HTTP stream");
        self.client = Some(client);
        self.response = Some(BufReader::new(response));
        Ok(())
    }

    fn read(&mut self) -> Result<EnvelopeStream<'_>> {
        let contract = self.core.contract();
        let mode = contract.read_mode.effective(contract.use_lines);
        let chunk_size = contract.chunk_size;
        let Some(response) = self.response.as_mut() else {
            return Err(self.core.not_open());
        };
        let status = response.get_ref().status().as_u16();
        let content_type = response
            .get_ref()
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut chunker = Chunker::new(response, mode, chunk_size, "HttpStream")
            .line_style(LineStyle::Trimmed)
            .stamp("uri", self.core.logical())
            .stamp("status", status);
        if let Some(content_type) = content_type {
            chunker = chunker.stamp("content-type", content_type);
        }
        Ok(chunker.boxed())
    }

    fn close(&mut self) -> Result<()> {
        if self.response.take().is_some() {
            debug!(url = self.core.resource(), "closed HTTP stream");
        }
        self.client = None;
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        let temporary;
        let client = match &self.client {
            Some(client) => client,
            None => {
                temporary = self.core.contract().client()?;
                &temporary
            }
        };
        Ok(match client.head(self.core.resource()).send() {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url = self.core.resource(), error = %e, "HEAD probe failed");
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::hydrate;
    use crate::settings;

    #[test]
    fn defaults() {
        let contract: HttpContract = hydrate(&crate::Settings::new()).unwrap();
        assert_eq!(contract.chunk_size, 1024);
        assert_eq!(contract.retries, 3);
        assert!(contract.verify_ssl);
        assert_eq!(contract.method().unwrap(), Method::GET);
    }

    #[test]
    fn integer_timeout_is_widened() {
        let contract: HttpContract = hydrate(&settings! { "timeout" => 5 }).unwrap();
        assert!((contract.timeout - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_positive_timeout_is_rejected() {
        let err = hydrate::<HttpContract>(&settings! { "timeout" => 0 }).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn timeout_beyond_duration_range_is_rejected() {
        let err = HttpStream::new("http://127.0.0.1:9/x", settings! { "timeout" => 1e20 })
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Configuration { .. }));

        let contract: HttpContract = hydrate(&settings! { "timeout" => 0.25 }).unwrap();
        assert_eq!(contract.timeout().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn user_agent_is_injected_unless_present() {
        let contract: HttpContract = hydrate(&settings! { "user_agent" => "agent/1.0" }).unwrap();
        assert_eq!(contract.header_map().unwrap()[USER_AGENT], "agent/1.0");

        let contract: HttpContract = hydrate(&settings! {
            "user_agent" => "agent/1.0",
            "headers" => serde_json::json!({"user-agent": "custom/2.0"}),
        })
        .unwrap();
        assert_eq!(contract.header_map().unwrap()[USER_AGENT], "custom/2.0");
    }

    #[test]
    fn invalid_header_fails_construction() {
        let err = hydrate::<HttpContract>(&settings! {
            "headers" => serde_json::json!({"bad header": "x"}),
        })
        .unwrap_err();
        assert!(matches!(err, StreamError::Configuration { .. }));
    }

    #[test]
    fn sink_mode_is_unsupported() {
        let err = HttpStream::from_spec(StreamSpec::new("http://localhost/x").sink())
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Unsupported { .. }));
    }

    #[test]
    fn read_before_open_is_misuse() {
        let mut stream = HttpStream::new("http://localhost/x", crate::Settings::new()).unwrap();
        assert!(!stream.is_open());
        assert!(matches!(stream.read().err(), Some(StreamError::NotOpen { .. })));
        stream.close().unwrap();
    }
}
