use crate::core::errors::HttpError;
use crate::core::types::{HttpRequest, HttpResponse, MultipartBody, PartData, RequestBody};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, trace};

/// A link in the request pipeline.
///
/// Implementations may rewrite the request before calling [`Next::run`] and
/// inspect the response after it returns.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        request: HttpRequest,
        next: Next<'_>,
    ) -> Result<HttpResponse, HttpError>;
}

/// Sends a fully prepared request
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Remainder of the chain after the current interceptor
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub(crate) fn new(interceptors: &'a [Arc<dyn Interceptor>], transport: &'a dyn Transport) -> Self {
        Self {
            interceptors,
            transport,
        }
    }

    pub async fn run(self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        match self.interceptors.split_first() {
            Some((current, rest)) => {
                current
                    .intercept(request, Next::new(rest, self.transport))
                    .await
            }
            None => self.transport.execute(request).await,
        }
    }
}

/// Transport over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    /// Deadline applied when the request carries none
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(client: Client, timeout: Option<Duration>) -> Self {
        Self { client, timeout }
    }

    async fn multipart_form(body: MultipartBody) -> Result<multipart::Form, HttpError> {
        let mut form = multipart::Form::new();
        for part in body.parts {
            let mut wire = match part.data {
                PartData::Bytes(bytes) => multipart::Part::bytes(bytes.to_vec()),
                PartData::File { path, length } => {
                    let file = tokio::fs::File::open(&path).await?;
                    multipart::Part::stream_with_length(reqwest::Body::from(file), length)
                }
            };
            if let Some(file_name) = part.file_name {
                wire = wire.file_name(file_name);
            }
            if let Some(content_type) = part.content_type {
                wire = wire.mime_str(content_type.as_str()).map_err(|e| {
                    HttpError::InvalidRequest(format!("Invalid part content type: {}", e))
                })?;
            }
            form = form.part(part.name, wire);
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let HttpRequest {
            method,
            url,
            mut headers,
            body,
            timeout,
        } = request;

        let mut builder = self.client.request(method, url);
        if let Some(deadline) = timeout.or(self.timeout) {
            builder = builder.timeout(deadline);
        }

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Form(form) => {
                headers
                    .entry(CONTENT_TYPE)
                    .or_insert(reqwest::header::HeaderValue::from_static(
                        "application/x-www-form-urlencoded",
                    ));
                builder.body(form.encode())
            }
            RequestBody::Bytes { content_type, data } => {
                if let Some(value) = content_type.and_then(|ct| ct.header_value()) {
                    headers.entry(CONTENT_TYPE).or_insert(value);
                }
                builder.body(data)
            }
            RequestBody::Multipart(multipart) => {
                // reqwest writes its own boundary
                headers.remove(CONTENT_TYPE);
                builder.multipart(Self::multipart_form(multipart).await?)
            }
            RequestBody::Stream {
                content_type, body, ..
            } => {
                if let Some(value) = content_type.and_then(|ct| ct.header_value()) {
                    headers.entry(CONTENT_TYPE).or_insert(value);
                }
                builder.body(body)
            }
        };

        let response = builder.headers(headers).send().await?;
        trace!(status = %response.status(), "transport response");
        Ok(HttpResponse::from_reqwest(response))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::core::types::{MediaType, ResponseBody};
    use parking_lot::Mutex;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;

    /// What the mock transport saw of a request
    #[derive(Debug, Clone)]
    pub struct Seen {
        pub url: url::Url,
        pub headers: HeaderMap,
        pub body: Option<bytes::Bytes>,
    }

    /// Transport answering every request with one canned JSON body
    pub struct MockTransport {
        pub status: StatusCode,
        pub body: &'static str,
        pub seen: Mutex<Vec<Seen>>,
    }

    impl MockTransport {
        pub fn json(body: &'static str) -> Self {
            Self {
                status: StatusCode::OK,
                body,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let body = match &request.body {
                RequestBody::Bytes { data, .. } => Some(data.clone()),
                RequestBody::Form(form) => Some(bytes::Bytes::from(form.encode())),
                _ => None,
            };
            self.seen.lock().push(Seen {
                url: request.url.clone(),
                headers: request.headers.clone(),
                body,
            });
            Ok(HttpResponse::new(
                self.status,
                HeaderMap::new(),
                request.url,
                ResponseBody::from_bytes(Some(MediaType::json()), self.body),
            ))
        }
    }
}
