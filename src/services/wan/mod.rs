//! The wanandroid.com open API as an [`ApiGroup`].

pub mod presenter;
pub mod types;

pub use presenter::{LoginPresenter, LoginView};
pub use types::{Article, ArticleList, Banner, LoginResponse, WanResponse, LOGIN_EXPIRED_CODE};

use crate::core::config::{PipelineConfig, ServiceConfig};
use crate::core::errors::HttpError;
use crate::core::kernel::{
    CanonicalParamSigner, Interceptor, ResponseCodeHandler, ResponseCodeInterceptor,
    ServiceClient, SignInterceptor, TrafficLogger,
};
use crate::core::registry::{ApiGroup, ServiceRegistry};
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub const WAN_BASE_URL: &str = "https://www.wanandroid.com/";

/// Environment prefix read by [`registry`]
pub const ENV_PREFIX: &str = "LANBASE";

static REGISTRY: Lazy<ServiceRegistry<WanApi>> =
    Lazy::new(|| ServiceRegistry::new(WanApi::new(config_from_env(ENV_PREFIX))));

/// Pipeline settings from `{prefix}_*`; a missing group URL keeps the rest
fn config_from_env(prefix: &str) -> PipelineConfig {
    let config = PipelineConfig::from_env(prefix).unwrap_or_else(|e| {
        warn!(error = %e, "using default pipeline configuration");
        PipelineConfig::unsigned()
    });
    match ServiceConfig::from_env(prefix, WanApi::GROUP) {
        Ok(service) => config.with_service(WanApi::GROUP, service),
        Err(e) => {
            debug!(error = %e, base_url = WAN_BASE_URL, "using default wan endpoint");
            config
        }
    }
}

/// Process-wide wan registry, configured from `LANBASE_*` variables
pub fn registry() -> &'static ServiceRegistry<WanApi> {
    &REGISTRY
}

type ExpiredCallback = Arc<dyn Fn() + Send + Sync>;

/// Watches responses for the session-expired code
#[derive(Clone)]
pub struct LoginExpiredHandler {
    code_field: String,
    expired: Arc<AtomicU64>,
    on_expired: Option<ExpiredCallback>,
}

impl LoginExpiredHandler {
    pub fn new(code_field: impl Into<String>) -> Self {
        Self {
            code_field: code_field.into(),
            expired: Arc::new(AtomicU64::new(0)),
            on_expired: None,
        }
    }

    pub fn on_expired(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_expired = Some(Arc::new(callback));
        self
    }

    /// How many expired-session responses were seen
    pub fn expired_count(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }
}

impl ResponseCodeHandler for LoginExpiredHandler {
    fn code_field(&self) -> &str {
        &self.code_field
    }

    fn handle_response_code(&self, code: &str) {
        if code != LOGIN_EXPIRED_CODE {
            return;
        }
        self.expired.fetch_add(1, Ordering::Relaxed);
        warn!(code, "session expired");
        if let Some(callback) = &self.on_expired {
            callback();
        }
    }
}

/// Endpoint group for wanandroid.com
pub struct WanApi {
    config: PipelineConfig,
    login_expired: LoginExpiredHandler,
}

impl WanApi {
    pub const GROUP: &'static str = "wan";

    pub fn new(config: PipelineConfig) -> Self {
        let login_expired = LoginExpiredHandler::new(config.code_field.clone());
        Self {
            config,
            login_expired,
        }
    }

    /// Replace the session-expired handler
    pub fn with_login_expired(mut self, handler: LoginExpiredHandler) -> Self {
        self.login_expired = handler;
        self
    }

    pub fn login_expired(&self) -> &LoginExpiredHandler {
        &self.login_expired
    }
}

impl ApiGroup for WanApi {
    type Service = WanService;

    fn name(&self) -> &str {
        Self::GROUP
    }

    fn base_url(&self) -> String {
        self.config
            .service(Self::GROUP)
            .map_or_else(|| WAN_BASE_URL.to_string(), |service| service.base_url.clone())
    }

    fn timeout_seconds(&self) -> u64 {
        match self.config.service(Self::GROUP) {
            Some(service) if service.timeout_seconds > 0 => service.timeout_seconds,
            _ => self.config.default_timeout_seconds,
        }
    }

    fn register_interceptors(&self, interceptors: &mut Vec<Arc<dyn Interceptor>>) {
        if self.config.has_sign_secret() {
            let signer = CanonicalParamSigner::new(self.config.sign_secret.clone())
                .with_algorithm(self.config.sign_algorithm);
            interceptors.push(Arc::new(SignInterceptor::new(signer)));
        }
        interceptors.push(Arc::new(
            ResponseCodeInterceptor::new(self.login_expired.clone())
                .with_max_bytes(self.config.max_body_bytes),
        ));
    }

    fn log_interceptor(&self) -> Option<Arc<dyn Interceptor>> {
        Some(Arc::new(
            TrafficLogger::new().with_max_body_bytes(self.config.max_body_bytes),
        ))
    }
}

/// Typed calls against wanandroid.com
#[derive(Debug, Clone)]
pub struct WanService {
    client: ServiceClient,
}

impl From<ServiceClient> for WanService {
    fn from(client: ServiceClient) -> Self {
        Self { client }
    }
}

impl WanService {
    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    /// `POST user/login` with form fields
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<WanResponse<LoginResponse>, HttpError> {
        self.client
            .post_form("user/login", &[("username", username), ("password", password)])
            .await
    }

    /// `GET article/list/{page}/json`
    pub async fn article_list(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<WanResponse<ArticleList>, HttpError> {
        let path = format!("article/list/{}/json", page);
        let page_size = page_size.to_string();
        self.client
            .get_json(&path, &[("page_size", page_size.as_str())])
            .await
    }

    /// `GET banner/json`
    pub async fn banner(&self) -> Result<WanResponse<Vec<Banner>>, HttpError> {
        self.client.get_json("banner/json", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DEFAULT_TIMEOUT_SECONDS;

    #[test]
    fn test_group_reads_service_config() {
        let config = PipelineConfig::unsigned()
            .with_service("wan", ServiceConfig::new("http://localhost:9000/").with_timeout(3));
        let api = WanApi::new(config);
        assert_eq!(api.base_url(), "http://localhost:9000/");
        assert_eq!(api.timeout_seconds(), 3);

        let defaults = WanApi::new(PipelineConfig::unsigned());
        assert_eq!(defaults.base_url(), WAN_BASE_URL);
        assert_eq!(defaults.timeout_seconds(), DEFAULT_TIMEOUT_SECONDS);

        let pipeline_default = WanApi::new(PipelineConfig::unsigned().with_default_timeout(4));
        assert_eq!(pipeline_default.timeout_seconds(), 4);
    }

    #[test]
    fn test_env_secret_survives_missing_group_url() {
        std::env::set_var("LBWANENV_SIGN_SECRET", "topsecret");
        std::env::set_var("LBWANENV_TIMEOUT_SECONDS", "7");
        std::env::remove_var("LBWANENV_WAN_BASE_URL");

        let api = WanApi::new(config_from_env("LBWANENV"));
        assert_eq!(api.base_url(), WAN_BASE_URL);
        assert_eq!(api.timeout_seconds(), 7);

        let mut chain = Vec::new();
        api.register_interceptors(&mut chain);
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_env_group_url_is_applied() {
        std::env::set_var("LBWANURL_SIGN_SECRET", "");
        std::env::set_var("LBWANURL_WAN_BASE_URL", "http://localhost:9100/");

        let api = WanApi::new(config_from_env("LBWANURL"));
        assert_eq!(api.base_url(), "http://localhost:9100/");

        let mut chain = Vec::new();
        api.register_interceptors(&mut chain);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_signing_only_with_secret() {
        let mut chain = Vec::new();
        WanApi::new(PipelineConfig::unsigned()).register_interceptors(&mut chain);
        assert_eq!(chain.len(), 1);

        let mut signed = Vec::new();
        WanApi::new(PipelineConfig::new("s".to_string())).register_interceptors(&mut signed);
        assert_eq!(signed.len(), 2);
    }

    #[test]
    fn test_login_expired_handler_counts_only_its_code() {
        let fired = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&fired);
        let handler = LoginExpiredHandler::new("errorCode").on_expired(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        handler.handle_response_code("0");
        handler.handle_response_code("-1001");
        assert_eq!(handler.expired_count(), 1);
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }
}
