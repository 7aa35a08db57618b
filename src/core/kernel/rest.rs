use crate::core::config::{PipelineConfig, DEFAULT_TIMEOUT_SECONDS};
use crate::core::errors::HttpError;
use crate::core::kernel::interceptor::{Interceptor, Next, ReqwestTransport, Transport};
use crate::core::types::{HttpRequest, HttpResponse, MultipartBody, RequestBody};
use once_cell::sync::OnceCell;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, trace};
use url::Url;

/// Settings of the shared connection pool
#[derive(Clone, Debug)]
pub struct ClientFactoryConfig {
    /// Connect timeout in seconds
    pub connect_timeout_seconds: u64,
    /// Whole-request deadline in seconds, used when a client has no override
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl Default for ClientFactoryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            user_agent: format!("lanbase/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientFactoryConfig {
    /// Set both timeouts
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.connect_timeout_seconds = timeout_seconds;
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

impl From<&PipelineConfig> for ClientFactoryConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self::default().with_timeout(config.default_timeout_seconds)
    }
}

static SHARED_FACTORY: OnceCell<Arc<ClientFactory>> = OnceCell::new();

/// Builds service clients over one shared connection pool.
///
/// The factory does not cache what it builds; [`crate::core::registry`] does.
#[derive(Debug)]
pub struct ClientFactory {
    client: Client,
    config: ClientFactoryConfig,
}

impl ClientFactory {
    /// Create a factory with its own connection pool
    ///
    /// # Arguments
    /// * `config` - Pool-wide timeouts and user agent
    pub fn new(config: ClientFactoryConfig) -> Result<Self, HttpError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                HttpError::InvalidRequest(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Process-wide factory, created on first use with default settings
    pub fn shared() -> Result<Arc<Self>, HttpError> {
        SHARED_FACTORY
            .get_or_try_init(|| Self::new(ClientFactoryConfig::default()).map(Arc::new))
            .map(Arc::clone)
    }

    pub fn config(&self) -> &ClientFactoryConfig {
        &self.config
    }

    /// Build a typed service over a new interceptor chain
    ///
    /// # Arguments
    /// * `base_url` - Root every relative path is joined onto
    /// * `timeout_override_seconds` - Positive values replace the default deadline for this client only
    /// * `interceptors` - Run in the given order, outermost first
    pub fn build_client<S: From<ServiceClient>>(
        &self,
        base_url: &str,
        timeout_override_seconds: u64,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<S, HttpError> {
        self.build_service_client(base_url, timeout_override_seconds, interceptors)
            .map(S::from)
    }

    pub fn build_service_client(
        &self,
        base_url: &str,
        timeout_override_seconds: u64,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Result<ServiceClient, HttpError> {
        let base_url = Url::parse(base_url)?;
        let seconds = if timeout_override_seconds > 0 {
            timeout_override_seconds
        } else {
            self.config.timeout_seconds
        };
        // The connect timeout belongs to the shared pool; the override is a
        // per-request deadline that also covers connecting.
        let transport = ReqwestTransport::new(self.client.clone(), Some(Duration::from_secs(seconds)));

        trace!(base_url = %base_url, timeout_seconds = seconds, chain = interceptors.len(), "building service client");
        Ok(ServiceClient::new(base_url, interceptors, Arc::new(transport)))
    }
}

/// Executes requests through an interceptor chain against one base URL
#[derive(Clone)]
pub struct ServiceClient {
    base_url: Url,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("base_url", &self.base_url.as_str())
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    pub fn new(
        base_url: Url,
        interceptors: Vec<Arc<dyn Interceptor>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            base_url,
            interceptors: interceptors.into(),
            transport,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` against the base URL
    pub fn url(&self, path: &str) -> Result<Url, HttpError> {
        Ok(self.base_url.join(path)?)
    }

    /// Run `request` through the chain and return the raw response
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        Next::new(&self.interceptors, self.transport.as_ref())
            .run(request)
            .await
    }

    /// Run `request` and decode a JSON body
    pub async fn send_json<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, HttpError> {
        let response = self.execute(request).await?;
        Self::handle_response(response).await
    }

    /// GET `path` with the given query parameters
    ///
    /// # Arguments
    /// * `path` - Path relative to the base URL
    /// * `query` - Query parameters as key-value pairs
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, HttpError> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        self.send_json(HttpRequest::get(url)).await
    }

    /// POST url-encoded `fields` to `path`
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: &[(&str, &str)],
    ) -> Result<T, HttpError> {
        let url = self.url(path)?;
        let body = RequestBody::form(fields.iter().copied());
        self.send_json(HttpRequest::post(url, body)).await
    }

    /// POST `body` serialized as JSON to `path`
    pub async fn post_json<B: Serialize + ?Sized + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        let url = self.url(path)?;
        let body = RequestBody::json(body)?;
        self.send_json(HttpRequest::post(url, body)).await
    }

    /// POST a multipart body to `path`
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        body: MultipartBody,
    ) -> Result<T, HttpError> {
        let url = self.url(path)?;
        self.send_json(HttpRequest::post(url, RequestBody::Multipart(body)))
            .await
    }

    /// Issue an arbitrary method with an optional body
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<T, HttpError> {
        let url = self.url(path)?;
        self.send_json(HttpRequest::new(method, url).with_body(body))
            .await
    }

    /// Map non-2xx statuses to errors and decode the body
    async fn handle_response<T: DeserializeOwned>(response: HttpResponse) -> Result<T, HttpError> {
        let status = response.status;
        if !status.is_success() {
            let body = response.body.text().await.unwrap_or_default();
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response.body.json().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::interceptor::mock::MockTransport;
    use serde_json::Value;

    fn client(transport: Arc<MockTransport>) -> ServiceClient {
        ServiceClient::new("http://h/api/".parse().unwrap(), Vec::new(), transport)
    }

    #[test]
    fn test_url_joins_relative_paths() {
        let client = client(Arc::new(MockTransport::json("{}")));
        assert_eq!(
            client.url("user/login").unwrap().as_str(),
            "http://h/api/user/login"
        );
        assert_eq!(client.url("/root").unwrap().as_str(), "http://h/root");
    }

    #[tokio::test]
    async fn test_get_json_decodes_and_sends_query() {
        let transport = Arc::new(MockTransport::json(r#"{"ok":true}"#));
        let value: Value = client(Arc::clone(&transport))
            .get_json("article/list/0/json", &[("page_size", "10")])
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
        let seen = transport.seen.lock();
        assert_eq!(
            seen[0].url.as_str(),
            "http://h/api/article/list/0/json?page_size=10"
        );
    }

    #[tokio::test]
    async fn test_post_form_encodes_fields() {
        let transport = Arc::new(MockTransport::json("{}"));
        let _: Value = client(Arc::clone(&transport))
            .post_form("user/login", &[("username", "u"), ("password", "p")])
            .await
            .unwrap();
        let seen = transport.seen.lock();
        assert_eq!(seen[0].body.as_deref(), Some(&b"username=u&password=p"[..]));
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let transport = Arc::new(MockTransport {
            status: reqwest::StatusCode::BAD_GATEWAY,
            ..MockTransport::json("upstream down")
        });
        let result: Result<Value, _> = client(transport).get_json("x", &[]).await;
        match result {
            Err(HttpError::Status { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let transport = Arc::new(MockTransport::json("not json"));
        let result: Result<Value, _> = client(transport).get_json("x", &[]).await;
        assert!(matches!(result, Err(HttpError::Json(_))));
    }

    #[test]
    fn test_factory_builds_client_with_override() {
        let factory = ClientFactory::new(ClientFactoryConfig::default()).unwrap();
        let service: ServiceClient = factory
            .build_client("https://www.wanandroid.com/", 5, Vec::new())
            .unwrap();
        assert_eq!(service.base_url().as_str(), "https://www.wanandroid.com/");
        assert!(factory.build_service_client("not a url", 0, Vec::new()).is_err());
    }

    #[test]
    fn test_factory_config_follows_pipeline_timeout() {
        let config = ClientFactoryConfig::from(&PipelineConfig::unsigned().with_default_timeout(9));
        assert_eq!(config.timeout_seconds, 9);
        assert_eq!(config.connect_timeout_seconds, 9);

        let defaults = ClientFactoryConfig::from(&PipelineConfig::unsigned());
        assert_eq!(defaults.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    }
}
