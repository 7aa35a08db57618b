/// `lanbase` Kernel - the outbound request pipeline
///
/// Every request built by a [`ServiceClient`] runs through an ordered chain of
/// [`Interceptor`]s before it reaches the shared transport. The kernel holds
/// the chain plumbing and the stock interceptors; it knows nothing about any
/// particular API.
///
/// # Architecture
///
/// ## Transport Layer
/// - `ClientFactory`: one shared connection pool, per-client deadlines
/// - `ServiceClient`: a base URL plus its interceptor chain
/// - `ReqwestTransport`: the innermost link that talks to the network
///
/// ## Interceptors
/// - `SignInterceptor`: rewrites query, form, JSON and multipart parameters through a `ParamSigner`
/// - `ResponseCodeInterceptor`: peeks at JSON responses for a business code
/// - `TrafficLogger`: request and response records with correlation ids
///
/// ## Signing
/// - `sign` / `sign_with`: canonical digest over key-sorted values plus a secret
/// - `CanonicalParamSigner`: stamps `timestamp` and `nonce`, then writes `sign`
///
/// The conventional chain order is sign, then response-code scan, then log, so
/// the logger sees the request exactly as it goes on the wire.
///
/// # Example
/// ```rust,no_run
/// use lanbase::core::kernel::*;
/// use secrecy::Secret;
/// use serde_json::Value;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let factory = ClientFactory::shared()?;
/// let signer = CanonicalParamSigner::new(Secret::new("secret".to_string()));
/// let chain: Vec<Arc<dyn Interceptor>> = vec![
///     Arc::new(SignInterceptor::new(signer)),
///     Arc::new(ResponseCodeInterceptor::new(|code: &str| println!("code {}", code))),
///     Arc::new(TrafficLogger::new()),
/// ];
/// let client = factory.build_service_client("https://www.wanandroid.com/", 0, chain)?;
///
/// let banners: Value = client.get_json("banner/json", &[]).await?;
/// # Ok(())
/// # }
/// ```
pub mod interceptor;
pub mod logging;
pub mod response_code;
pub mod rest;
pub mod scanner;
pub mod sign;
pub mod signer;

// Re-export key types for convenience
pub use interceptor::{Interceptor, Next, ReqwestTransport, Transport};
pub use logging::{next_correlation_id, BodyCapture, PartRecord, RequestRecord, ResponseRecord, TrafficLogger};
pub use response_code::{ResponseCodeHandler, ResponseCodeInterceptor};
pub use rest::{ClientFactory, ClientFactoryConfig, ServiceClient};
pub use scanner::{scan, scan_slice, DEFAULT_MAX_SCAN_BYTES};
pub use sign::{FilePartPolicy, SignInterceptor};
pub use signer::{sign, sign_with, CanonicalParamSigner, ParamSigner, SignAlgorithm};
