use crate::core::errors::HttpError;
use crate::core::kernel::interceptor::Interceptor;
use crate::core::kernel::logging::TrafficLogger;
use crate::core::kernel::rest::{ClientFactory, ServiceClient};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::info;

/// One logical API: where it lives and which interceptors it needs.
///
/// The registry appends the traffic logger after the business interceptors,
/// so it always sees the final wire form of a request.
pub trait ApiGroup: Send + Sync + 'static {
    type Service: From<ServiceClient> + Send + Sync;

    /// Name used in logs
    fn name(&self) -> &str;

    fn base_url(&self) -> String;

    /// Per-group deadline in seconds; zero keeps the factory default
    fn timeout_seconds(&self) -> u64 {
        0
    }

    /// Business interceptors, in the order they should run
    fn register_interceptors(&self, _interceptors: &mut Vec<Arc<dyn Interceptor>>) {}

    /// Trailing logger; return `None` to disable traffic logging for the group
    fn log_interceptor(&self) -> Option<Arc<dyn Interceptor>> {
        Some(Arc::new(TrafficLogger::new()))
    }
}

/// Lazily built, process-lifetime service for one [`ApiGroup`]
pub struct ServiceRegistry<G: ApiGroup> {
    group: G,
    factory: Option<Arc<ClientFactory>>,
    service: OnceCell<G::Service>,
}

impl<G: ApiGroup> ServiceRegistry<G> {
    pub const fn new(group: G) -> Self {
        Self {
            group,
            factory: None,
            service: OnceCell::new(),
        }
    }

    /// Build through `factory` instead of the shared one
    pub fn with_factory(group: G, factory: Arc<ClientFactory>) -> Self {
        Self {
            group,
            factory: Some(factory),
            service: OnceCell::new(),
        }
    }

    pub fn group(&self) -> &G {
        &self.group
    }

    /// The service, built on first call.
    ///
    /// Concurrent first callers block until one of them finishes building; all
    /// of them observe the same instance. A failed build is not cached.
    pub fn get(&self) -> Result<&G::Service, HttpError> {
        self.service.get_or_try_init(|| self.build())
    }

    fn build(&self) -> Result<G::Service, HttpError> {
        let factory = match &self.factory {
            Some(factory) => Arc::clone(factory),
            None => ClientFactory::shared()?,
        };

        let mut interceptors: Vec<Arc<dyn Interceptor>> = Vec::new();
        self.group.register_interceptors(&mut interceptors);
        if let Some(logger) = self.group.log_interceptor() {
            interceptors.push(logger);
        }

        let base_url = self.group.base_url();
        info!(
            group = self.group.name(),
            base_url = %base_url,
            interceptors = interceptors.len(),
            "building service"
        );
        factory.build_client(&base_url, self.group.timeout_seconds(), interceptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counted {
        client: ServiceClient,
    }

    impl From<ServiceClient> for Counted {
        fn from(client: ServiceClient) -> Self {
            Self { client }
        }
    }

    struct TestGroup {
        builds: AtomicUsize,
        url: &'static str,
    }

    impl ApiGroup for TestGroup {
        type Service = Counted;

        fn name(&self) -> &str {
            "test"
        }

        fn base_url(&self) -> String {
            self.builds.fetch_add(1, Ordering::SeqCst);
            self.url.to_string()
        }

        fn log_interceptor(&self) -> Option<Arc<dyn Interceptor>> {
            None
        }
    }

    fn registry(url: &'static str) -> ServiceRegistry<TestGroup> {
        ServiceRegistry::new(TestGroup {
            builds: AtomicUsize::new(0),
            url,
        })
    }

    #[test]
    fn test_get_builds_once() {
        let registry = registry("http://h/");
        let first = registry.get().unwrap() as *const Counted;
        let second = registry.get().unwrap() as *const Counted;
        assert_eq!(first, second);
        assert_eq!(registry.group().builds.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get().unwrap().client.base_url().as_str(), "http://h/");
    }

    #[test]
    fn test_concurrent_get_observes_one_instance() {
        let registry = Arc::new(registry("http://h/"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get().unwrap() as *const Counted as usize)
            })
            .collect();

        let addresses: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(registry.group().builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_build_is_retried() {
        let registry = registry("not a url");
        assert!(registry.get().is_err());
        assert!(registry.get().is_err());
        assert_eq!(registry.group().builds.load(Ordering::SeqCst), 2);
    }
}
