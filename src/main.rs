use lanbase::core::kernel::{ClientFactory, ClientFactoryConfig};
use lanbase::services::wan::{self, LoginPresenter, LoginResponse, LoginView};
use lanbase::utils::logging::init_from_config;
use lanbase::{
    ConsumerView, Dispatcher, MainContext, PipelineConfig, ServiceConfig, ServiceRegistry, WanApi,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

/// Console stand-in for a login screen
struct ConsoleLogin {
    done: Mutex<Option<oneshot::Sender<()>>>,
}

impl ConsoleLogin {
    fn finish(&self) {
        if let Some(done) = self.done.lock().take() {
            let _ = done.send(());
        }
    }
}

impl ConsumerView for ConsoleLogin {
    fn show_loading(&self, message: &str) {
        println!("{}", message);
    }

    fn hide_loading(&self) {
        println!("done");
    }
}

impl LoginView for ConsoleLogin {
    fn login_success(&self, user: &LoginResponse) {
        println!("Logged in as {} (id {})", user.username, user.id);
        self.finish();
    }

    fn login_failure(&self, message: &str) {
        println!("Login failed: {}", message);
        self.finish();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Example usage - set LANBASE_SIGN_SECRET (may be empty) and optionally LANBASE_WAN_BASE_URL
    let mut config =
        PipelineConfig::from_env(wan::ENV_PREFIX).unwrap_or_else(|_| PipelineConfig::unsigned());
    if let Ok(service) = ServiceConfig::from_env(wan::ENV_PREFIX, WanApi::GROUP) {
        config = config.with_service(WanApi::GROUP, service);
    }
    init_from_config(&config)?;

    let factory = Arc::new(ClientFactory::new(ClientFactoryConfig::from(&config))?);
    let registry = ServiceRegistry::with_factory(WanApi::new(config), factory);
    let service = registry.get()?.clone();

    let main_context = MainContext::start("lanbase-main")?;
    let presenter = LoginPresenter::new(Dispatcher::new(main_context, Handle::current()), service);

    let (done, finished) = oneshot::channel();
    let view = Arc::new(ConsoleLogin {
        done: Mutex::new(Some(done)),
    });
    presenter.attach_view(&view);

    let username = std::env::var("WAN_USERNAME").unwrap_or_else(|_| "guest".to_string());
    let password = std::env::var("WAN_PASSWORD").unwrap_or_default();
    presenter.login(&username, &password);

    if tokio::time::timeout(Duration::from_secs(30), finished).await.is_err() {
        println!("No answer within 30 seconds");
    }
    presenter.detach_view();

    Ok(())
}
