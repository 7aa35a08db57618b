use crate::core::config::DEFAULT_MAX_BODY_BYTES;
use crate::core::errors::HttpError;
use crate::core::kernel::interceptor::{Interceptor, Next};
use crate::core::kernel::sign::FilePartPolicy;
use crate::core::types::{HttpRequest, HttpResponse, MediaType, Part, RequestBody};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Request bodies at or above this size are not captured
pub const MAX_LOGGED_REQUEST_BYTES: u64 = 2 * 1024;

/// Multipart text values at or above this size are not captured
pub const MAX_LOGGED_PART_BYTES: u64 = 1024;

static CORRELATION_ID: AtomicU64 = AtomicU64::new(1000);

/// Next id shared by a request line and its response line
pub fn next_correlation_id() -> u64 {
    CORRELATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// What was captured of a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyCapture {
    None,
    Text(String),
    Omitted(String),
    Multipart(Vec<PartRecord>),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartRecord {
    File {
        name: String,
        file_name: Option<String>,
        content_type: Option<String>,
        size: u64,
    },
    Text {
        name: String,
        value: Option<String>,
        size: u64,
    },
}

impl fmt::Display for PartRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File {
                name,
                file_name,
                content_type,
                size,
            } => write!(
                f,
                "{} (file {}, {}, {} bytes)",
                name,
                file_name.as_deref().unwrap_or("-"),
                content_type.as_deref().unwrap_or("unknown type"),
                size
            ),
            Self::Text {
                name,
                value: Some(value),
                ..
            } => write!(f, "{}={}", name, value),
            Self::Text { name, size, .. } => write!(f, "{}=({}-byte value omitted)", name, size),
        }
    }
}

impl fmt::Display for BodyCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "(no body)"),
            Self::Text(text) => write!(f, "{}", text),
            Self::Omitted(reason) => write!(f, "(body omitted: {})", reason),
            Self::Multipart(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
            Self::Error(e) => write!(f, "(body unreadable: {})", e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub id: u64,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: BodyCapture,
}

#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub id: u64,
    pub status: u16,
    pub url: String,
    pub elapsed: Duration,
    pub body: BodyCapture,
}

impl ResponseRecord {
    pub fn elapsed_ms(&self) -> String {
        format!("{:.2}", self.elapsed.as_secs_f64() * 1000.0)
    }
}

/// Writes one record per request and per response to `tracing`.
///
/// Bodies are read through the response's buffered view, so the caller still
/// receives every byte.
#[derive(Debug, Clone)]
pub struct TrafficLogger {
    max_body_bytes: u64,
}

impl Default for TrafficLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl TrafficLogger {
    pub fn new() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn log_request(&self, id: u64, request: &HttpRequest) -> RequestRecord {
        let record = RequestRecord {
            id,
            method: request.method.to_string(),
            url: request.url.to_string(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("<binary>").to_string()))
                .collect(),
            body: capture_request_body(request),
        };

        info!(
            target: "lanbase::traffic",
            id = record.id,
            method = %record.method,
            url = %record.url,
            headers = ?record.headers,
            "--> {}\n{}",
            record.method,
            record.body
        );
        record
    }

    pub async fn log_response(
        &self,
        id: u64,
        response: &mut HttpResponse,
        elapsed: Duration,
    ) -> ResponseRecord {
        let body = self.capture_response_body(response).await;
        let record = ResponseRecord {
            id,
            status: response.status.as_u16(),
            url: response.url.to_string(),
            elapsed,
            body,
        };

        info!(
            target: "lanbase::traffic",
            id = record.id,
            status = record.status,
            url = %record.url,
            elapsed_ms = %record.elapsed_ms(),
            "<-- {} ({}ms)\n{}",
            record.status,
            record.elapsed_ms(),
            record.body
        );
        record
    }

    async fn capture_response_body(&self, response: &mut HttpResponse) -> BodyCapture {
        if response.body.content_length() == Some(0) {
            return BodyCapture::None;
        }
        let Some(media) = response.body.content_type().cloned() else {
            return BodyCapture::Omitted("unknown content type".to_string());
        };
        if !media.is_plaintext() {
            return BodyCapture::Omitted(format!("{} body", media));
        }

        let wanted = usize::try_from(self.max_body_bytes.saturating_add(1)).unwrap_or(usize::MAX);
        if let Err(e) = response.body.request(wanted).await {
            return BodyCapture::Error(e.to_string());
        }
        let buffered = response.body.peek();
        if buffered.len() as u64 > self.max_body_bytes {
            return BodyCapture::Omitted(format!("larger than {} bytes", self.max_body_bytes));
        }
        if buffered.is_empty() {
            return BodyCapture::None;
        }
        BodyCapture::Text(render_text(&media, buffered))
    }
}

fn render_text(media: &MediaType, data: &[u8]) -> String {
    if media.is_json() {
        if let Ok(value) = serde_json::from_slice::<Value>(data) {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                return pretty;
            }
        }
    }
    String::from_utf8_lossy(data).into_owned()
}

fn capture_request_body(request: &HttpRequest) -> BodyCapture {
    match &request.body {
        RequestBody::Empty => BodyCapture::None,
        RequestBody::Form(form) => {
            let encoded = form.encode();
            if (encoded.len() as u64) < MAX_LOGGED_REQUEST_BYTES {
                BodyCapture::Text(encoded)
            } else {
                BodyCapture::Omitted(format!("{}-byte body", encoded.len()))
            }
        }
        RequestBody::Bytes { content_type, data } => {
            if content_type.as_ref().is_some_and(MediaType::is_binary_upload) {
                return BodyCapture::Omitted(format!("{}-byte binary body", data.len()));
            }
            if (data.len() as u64) >= MAX_LOGGED_REQUEST_BYTES {
                return BodyCapture::Omitted(format!("{}-byte body", data.len()));
            }
            match content_type {
                Some(media) => BodyCapture::Text(render_text(media, data)),
                None => BodyCapture::Text(String::from_utf8_lossy(data).into_owned()),
            }
        }
        RequestBody::Multipart(multipart) => {
            BodyCapture::Multipart(multipart.parts.iter().map(part_record).collect())
        }
        RequestBody::Stream { content_length, .. } => BodyCapture::Omitted(match content_length {
            Some(len) => format!("{}-byte streamed body", len),
            None => "streamed body of unknown length".to_string(),
        }),
    }
}

/// Parts are classified the way the sign interceptor classifies them by default
fn part_record(part: &Part) -> PartRecord {
    let size = part.len();
    match part.in_memory() {
        Some(bytes) if !FilePartPolicy::default().is_file(part) => PartRecord::Text {
            name: part.name.clone(),
            value: (size < MAX_LOGGED_PART_BYTES)
                .then(|| String::from_utf8_lossy(bytes).into_owned()),
            size,
        },
        _ => PartRecord::File {
            name: part.name.clone(),
            file_name: part.file_name.clone(),
            content_type: part.content_type.as_ref().map(|m| m.to_string()),
            size,
        },
    }
}

#[async_trait]
impl Interceptor for TrafficLogger {
    async fn intercept(
        &self,
        request: HttpRequest,
        next: Next<'_>,
    ) -> Result<HttpResponse, HttpError> {
        let id = next_correlation_id();
        self.log_request(id, &request);
        let started = Instant::now();

        match next.run(request).await {
            Ok(mut response) => {
                self.log_response(id, &mut response, started.elapsed()).await;
                Ok(response)
            }
            Err(e) => {
                let elapsed = started.elapsed();
                error!(
                    target: "lanbase::traffic",
                    id,
                    elapsed_ms = %format!("{:.2}", elapsed.as_secs_f64() * 1000.0),
                    error = %e,
                    "<-- HTTP FAILED"
                );
                Err(e)
            }
        }
    }
}
