use crate::core::errors::{ApiError, HttpError};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Parsed `Content-Type` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    raw: String,
    kind: String,
    subtype: String,
    charset: Option<String>,
}

impl MediaType {
    /// Parse `type/subtype; param=value` and return `None` when there is no `/`
    pub fn parse(value: &str) -> Option<Self> {
        let mut sections = value.split(';');
        let essence = sections.next()?.trim();
        let (kind, subtype) = essence.split_once('/')?;
        let kind = kind.trim().to_ascii_lowercase();
        let subtype = subtype.trim().to_ascii_lowercase();
        if kind.is_empty() || subtype.is_empty() {
            return None;
        }

        let charset = sections.find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"').to_string())
        });

        Some(Self {
            raw: value.trim().to_string(),
            kind,
            subtype,
            charset,
        })
    }

    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
    }

    pub fn json() -> Self {
        Self {
            raw: "application/json; charset=utf-8".to_string(),
            kind: "application".to_string(),
            subtype: "json".to_string(),
            charset: Some("utf-8".to_string()),
        }
    }

    pub fn form() -> Self {
        Self {
            raw: "application/x-www-form-urlencoded".to_string(),
            kind: "application".to_string(),
            subtype: "x-www-form-urlencoded".to_string(),
            charset: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_json(&self) -> bool {
        self.subtype.contains("json")
    }

    pub fn is_text(&self) -> bool {
        self.kind == "text"
    }

    pub fn is_form(&self) -> bool {
        self.kind == "application" && self.subtype == "x-www-form-urlencoded"
    }

    /// Text-like bodies that are safe to print
    pub fn is_plaintext(&self) -> bool {
        self.is_text()
            || self.is_json()
            || self.subtype.contains("xml")
            || self.subtype.contains("html")
    }

    /// Raw streams and media uploads
    pub fn is_binary_upload(&self) -> bool {
        self.kind == "image" || self.kind == "video" || self.subtype.contains("octet-stream")
    }

    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.raw).ok()
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Key-sorted request parameters.
///
/// `Value::Null` stands for an absent value and never reaches the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalParams(BTreeMap<String, Value>);

impl CanonicalParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Insert only when the key is missing or holds null
    pub fn put_if_missing(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let entry = self.0.entry(key.into()).or_insert(Value::Null);
        if entry.is_null() {
            *entry = value.into();
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Wire form of every present value, in key order
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), value_to_wire(v)))
            .collect()
    }

    /// JSON object of every present value, in key order
    pub fn into_json_object(self) -> Map<String, Value> {
        self.0.into_iter().filter(|(_, v)| !v.is_null()).collect()
    }
}

/// Strings stay raw, everything else is rendered as compact JSON
pub fn value_to_wire(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A repeated key keeps its first value
impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for CanonicalParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = BTreeMap::new();
        for (key, value) in iter {
            params.entry(key.into()).or_insert_with(|| value.into());
        }
        Self(params)
    }
}

impl From<Map<String, Value>> for CanonicalParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map.into_iter().collect())
    }
}

/// URL-encoded form fields in wire order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormBody {
    fields: Vec<(String, String)>,
}

impl FormBody {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    pub fn parse(encoded: &[u8]) -> Self {
        Self {
            fields: url::form_urlencoded::parse(encoded).into_owned().collect(),
        }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.fields.iter())
            .finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormBody {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartData {
    Bytes(Bytes),
    /// Streamed from disk when sent, never read by interceptors
    File { path: PathBuf, length: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<MediaType>,
    pub data: PartData,
}

impl Part {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            content_type: None,
            data: PartData::Bytes(Bytes::from(value.into())),
        }
    }

    pub fn bytes(
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<MediaType>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: Some(file_name.into()),
            content_type,
            data: PartData::Bytes(data.into()),
        }
    }

    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: Option<MediaType>,
        path: impl Into<PathBuf>,
        length: u64,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: Some(file_name.into()),
            content_type,
            data: PartData::File {
                path: path.into(),
                length,
            },
        }
    }

    pub fn len(&self) -> u64 {
        match &self.data {
            PartData::Bytes(b) => b.len() as u64,
            PartData::File { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self.data, PartData::File { .. })
    }

    /// In-memory bytes, `None` for file-backed parts
    pub fn in_memory(&self) -> Option<&Bytes> {
        match &self.data {
            PartData::Bytes(b) => Some(b),
            PartData::File { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartBody {
    pub parts: Vec<Part>,
}

impl MultipartBody {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    #[must_use]
    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }
}

/// Exactly one body per request
#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Form(FormBody),
    Bytes {
        content_type: Option<MediaType>,
        data: Bytes,
    },
    Multipart(MultipartBody),
    /// One-shot body that can be sent but never inspected
    Stream {
        content_type: Option<MediaType>,
        content_length: Option<u64>,
        body: reqwest::Body,
    },
}

impl RequestBody {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, HttpError> {
        let data = serde_json::to_vec(value)?;
        Ok(Self::Bytes {
            content_type: Some(MediaType::json()),
            data: Bytes::from(data),
        })
    }

    pub fn form<K: Into<String>, V: Into<String>>(fields: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::Form(fields.into_iter().collect())
    }

    pub fn content_type(&self) -> Option<MediaType> {
        match self {
            Self::Empty => None,
            Self::Form(_) => Some(MediaType::form()),
            Self::Bytes { content_type, .. } | Self::Stream { content_type, .. } => {
                content_type.clone()
            }
            Self::Multipart(_) => MediaType::parse("multipart/form-data"),
        }
    }

    /// Known length in bytes, `None` when only the transport can tell
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Form(form) => Some(form.encode().len() as u64),
            Self::Bytes { data, .. } => Some(data.len() as u64),
            Self::Multipart(_) => None,
            Self::Stream { content_length, .. } => *content_length,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Outgoing request as seen by interceptors
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// Whole-call deadline, overriding the client default when set
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url, body: RequestBody) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declared body type, headers first
    pub fn content_type(&self) -> Option<MediaType> {
        MediaType::from_headers(&self.headers).or_else(|| self.body.content_type())
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }
}

/// Response body with a pull-based buffered view.
///
/// Bytes pulled through [`ResponseBody::request`] stay in the buffer, so
/// anything peeked by an interceptor is still delivered to the final reader.
pub struct ResponseBody {
    content_type: Option<MediaType>,
    content_length: Option<u64>,
    buffer: BytesMut,
    source: Option<BoxStream<'static, Result<Bytes, HttpError>>>,
    failure: Option<HttpError>,
}

impl ResponseBody {
    pub fn from_stream(
        content_type: Option<MediaType>,
        content_length: Option<u64>,
        source: BoxStream<'static, Result<Bytes, HttpError>>,
    ) -> Self {
        Self {
            content_type,
            content_length,
            buffer: BytesMut::new(),
            source: Some(source),
            failure: None,
        }
    }

    pub fn from_bytes(content_type: Option<MediaType>, data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        Self {
            content_type,
            content_length: Some(data.len() as u64),
            buffer: BytesMut::from(&data[..]),
            source: None,
            failure: None,
        }
    }

    pub fn empty() -> Self {
        Self::from_bytes(None, Bytes::new())
    }

    pub fn content_type(&self) -> Option<&MediaType> {
        self.content_type.as_ref()
    }

    /// Length declared by the server, if any
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Buffer at least `byte_count` bytes.
    ///
    /// Returns `Ok(false)` when the source ends first. A source failure is kept
    /// and re-raised by the consuming readers.
    pub async fn request(&mut self, byte_count: usize) -> Result<bool, HttpError> {
        if let Some(failure) = &self.failure {
            return Err(HttpError::Body(failure.to_string()));
        }
        while self.buffer.len() < byte_count {
            let Some(source) = self.source.as_mut() else {
                return Ok(false);
            };
            match source.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    let message = e.to_string();
                    self.source = None;
                    self.failure = Some(e);
                    return Err(HttpError::Body(message));
                }
                None => {
                    self.source = None;
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Bytes buffered so far, without consuming them
    pub fn peek(&self) -> &[u8] {
        &self.buffer
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drain the whole body
    pub async fn bytes(mut self) -> Result<Bytes, HttpError> {
        if let Some(failure) = self.failure.take() {
            return Err(failure);
        }
        if let Some(mut source) = self.source.take() {
            while let Some(chunk) = source.next().await {
                self.buffer.extend_from_slice(&chunk?);
            }
        }
        Ok(self.buffer.freeze())
    }

    pub async fn text(self) -> Result<String, HttpError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, HttpError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.source.is_none())
            .finish()
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub url: Url,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, url: Url, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            url,
            body,
        }
    }

    pub fn from_reqwest(response: reqwest::Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let content_type = MediaType::from_headers(&headers);
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let source = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(HttpError::from))
            .boxed();

        Self {
            status,
            headers,
            url,
            body: ResponseBody::from_stream(content_type, content_length, source),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Unwrapped form of any API envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: String,
    pub code: String,
}

impl<T> BaseResponse<T> {
    /// Success with data yields the data; success without it is an error
    pub fn into_result(self) -> Result<T, ApiError> {
        if !self.success {
            return Err(ApiError::Business {
                code: self.code,
                message: self.message,
            });
        }
        self.data.ok_or(ApiError::EmptyData { code: self.code })
    }
}
