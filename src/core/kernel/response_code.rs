use crate::core::config::{DEFAULT_CODE_FIELD, DEFAULT_MAX_BODY_BYTES};
use crate::core::errors::HttpError;
use crate::core::kernel::interceptor::{Interceptor, Next};
use crate::core::kernel::scanner;
use crate::core::types::{HttpRequest, HttpResponse};
use async_trait::async_trait;
use tracing::{debug, instrument, warn};

/// Reacts to the business code found in a response body.
///
/// Called on the transport's task, before the response reaches the caller.
pub trait ResponseCodeHandler: Send + Sync {
    /// Top-level field holding the code
    fn code_field(&self) -> &str {
        DEFAULT_CODE_FIELD
    }

    fn handle_response_code(&self, code: &str);
}

impl<F> ResponseCodeHandler for F
where
    F: Fn(&str) + Send + Sync,
{
    fn handle_response_code(&self, code: &str) {
        self(code);
    }
}

/// Peeks at JSON responses and reports their business code.
///
/// The body handed onward is unaffected; failures never fail the request.
pub struct ResponseCodeInterceptor<H> {
    handler: H,
    max_bytes: u64,
}

impl<H: ResponseCodeHandler> ResponseCodeInterceptor<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            max_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Scan `response` and notify the handler. Returns the code found.
    pub async fn inspect(&self, response: &mut HttpResponse) -> Option<String> {
        let is_json = response
            .body
            .content_type()
            .is_some_and(|media| media.is_json());
        if !is_json {
            return None;
        }
        if response
            .body
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            debug!(
                content_length = ?response.body.content_length(),
                "response too large for code scan"
            );
            return None;
        }

        let wanted = usize::try_from(self.max_bytes.saturating_add(1)).unwrap_or(usize::MAX);
        if let Err(e) = response.body.request(wanted).await {
            warn!(error = %e, "failed to buffer response for code scan");
            return None;
        }

        let code = scanner::scan_slice(
            response.body.peek(),
            self.handler.code_field(),
            self.max_bytes,
        )
        .filter(|code| !code.is_empty())?;

        self.handler.handle_response_code(&code);
        Some(code)
    }
}

#[async_trait]
impl<H: ResponseCodeHandler + 'static> Interceptor for ResponseCodeInterceptor<H> {
    #[instrument(skip_all, fields(url = %request.url))]
    async fn intercept(
        &self,
        request: HttpRequest,
        next: Next<'_>,
    ) -> Result<HttpResponse, HttpError> {
        let mut response = next.run(request).await?;
        if let Some(code) = self.inspect(&mut response).await {
            debug!(code = %code, "response code");
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{MediaType, ResponseBody};
    use bytes::Bytes;
    use futures_util::stream::{self, StreamExt};
    use parking_lot::Mutex;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;
    use std::sync::Arc;

    fn response(body: ResponseBody) -> HttpResponse {
        HttpResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            "http://h/".parse().unwrap(),
            body,
        )
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync) {
        let codes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&codes);
        (codes, move |code: &str| sink.lock().push(code.to_string()))
    }

    #[tokio::test]
    async fn test_reports_code_and_keeps_body() {
        let (codes, handler) = recorder();
        let interceptor = ResponseCodeInterceptor::new(handler);
        let json = r#"{"errorCode":-1001,"errorMsg":"login first","data":null}"#;
        let mut resp = response(ResponseBody::from_bytes(Some(MediaType::json()), json));

        assert_eq!(interceptor.inspect(&mut resp).await.as_deref(), Some("-1001"));
        assert_eq!(*codes.lock(), vec!["-1001".to_string()]);
        assert_eq!(resp.body.text().await.unwrap(), json);
    }

    #[tokio::test]
    async fn test_streamed_body_stays_readable() {
        let (codes, handler) = recorder();
        let interceptor = ResponseCodeInterceptor::new(handler);
        let chunks = vec![
            Ok(Bytes::from_static(b"{\"errorCode\":")),
            Ok(Bytes::from_static(b"0,\"data\":[1,2]}")),
        ];
        let mut resp = response(ResponseBody::from_stream(
            Some(MediaType::json()),
            None,
            stream::iter(chunks).boxed(),
        ));

        interceptor.inspect(&mut resp).await;
        assert_eq!(*codes.lock(), vec!["0".to_string()]);
        assert_eq!(
            resp.body.text().await.unwrap(),
            r#"{"errorCode":0,"data":[1,2]}"#
        );
    }

    #[tokio::test]
    async fn test_non_json_and_oversize_are_ignored() {
        let (codes, handler) = recorder();
        let interceptor = ResponseCodeInterceptor::new(handler).with_max_bytes(8);

        let mut html = response(ResponseBody::from_bytes(
            MediaType::parse("text/html"),
            r#"{"errorCode":1}"#,
        ));
        assert_eq!(interceptor.inspect(&mut html).await, None);

        let mut big = response(ResponseBody::from_bytes(
            Some(MediaType::json()),
            r#"{"errorCode":1}"#,
        ));
        assert_eq!(interceptor.inspect(&mut big).await, None);
        assert!(codes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_custom_code_field() {
        struct Watch(Mutex<Option<String>>);
        impl ResponseCodeHandler for Watch {
            fn code_field(&self) -> &str {
                "code"
            }
            fn handle_response_code(&self, code: &str) {
                *self.0.lock() = Some(code.to_string());
            }
        }

        let interceptor = ResponseCodeInterceptor::new(Watch(Mutex::new(None)));
        let mut resp = response(ResponseBody::from_bytes(
            Some(MediaType::json()),
            r#"{"errorCode":1,"code":"E42"}"#,
        ));
        interceptor.inspect(&mut resp).await;
        assert_eq!(interceptor.handler.0.lock().as_deref(), Some("E42"));
    }

    #[tokio::test]
    async fn test_broken_stream_is_swallowed() {
        let (codes, handler) = recorder();
        let interceptor = ResponseCodeInterceptor::new(handler);
        let chunks = vec![Err(HttpError::Body("reset".to_string()))];
        let mut resp = response(ResponseBody::from_stream(
            Some(MediaType::json()),
            None,
            stream::iter(chunks).boxed(),
        ));

        assert_eq!(interceptor.inspect(&mut resp).await, None);
        assert!(codes.lock().is_empty());
    }
}
