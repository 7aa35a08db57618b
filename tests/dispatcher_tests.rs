use lanbase::core::kernel::ClientFactory;
use lanbase::services::wan::presenter::LOGIN_LOADING_MESSAGE;
use lanbase::services::wan::{LoginPresenter, LoginResponse, LoginView, WanApi};
use lanbase::{ConsumerView, Dispatcher, MainContext, PipelineConfig, ServiceConfig, ServiceRegistry};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, PartialEq)]
enum Outcome {
    Success(i64),
    Failure(String),
}

/// Login screen that records every callback and the thread it ran on
struct RecordingLogin {
    main: MainContext,
    outcomes: mpsc::UnboundedSender<Outcome>,
    shown: AtomicUsize,
    hidden: AtomicUsize,
    off_main: AtomicBool,
}

impl RecordingLogin {
    fn new(main: MainContext) -> (Arc<Self>, mpsc::UnboundedReceiver<Outcome>) {
        let (outcomes, receiver) = mpsc::unbounded_channel();
        let view = Arc::new(Self {
            main,
            outcomes,
            shown: AtomicUsize::new(0),
            hidden: AtomicUsize::new(0),
            off_main: AtomicBool::new(false),
        });
        (view, receiver)
    }

    fn check_thread(&self) {
        if !self.main.is_current() {
            self.off_main.store(true, Ordering::SeqCst);
        }
    }
}

impl ConsumerView for RecordingLogin {
    fn show_loading(&self, message: &str) {
        self.check_thread();
        assert_eq!(message, LOGIN_LOADING_MESSAGE);
        self.shown.fetch_add(1, Ordering::SeqCst);
    }

    fn hide_loading(&self) {
        self.check_thread();
        self.hidden.fetch_add(1, Ordering::SeqCst);
    }
}

impl LoginView for RecordingLogin {
    fn login_success(&self, user: &LoginResponse) {
        self.check_thread();
        let _ = self.outcomes.send(Outcome::Success(user.id));
    }

    fn login_failure(&self, message: &str) {
        self.check_thread();
        let _ = self.outcomes.send(Outcome::Failure(message.to_string()));
    }
}

async fn mount_login(server: &MockServer, body: serde_json::Value, delay: Duration) {
    Mock::given(method("POST"))
        .and(path("/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body).set_delay(delay))
        .mount(server)
        .await;
}

fn presenter(server: &MockServer, main: &MainContext) -> LoginPresenter<RecordingLogin> {
    let config = PipelineConfig::unsigned()
        .with_service(WanApi::GROUP, ServiceConfig::new(server.uri()));
    let registry =
        ServiceRegistry::with_factory(WanApi::new(config), ClientFactory::shared().unwrap());
    let service = registry.get().unwrap().clone();
    LoginPresenter::new(Dispatcher::new(main.clone(), Handle::current()), service)
}

async fn next_outcome(outcomes: &mut mpsc::UnboundedReceiver<Outcome>) -> Outcome {
    timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .expect("no delivery within five seconds")
        .expect("view dropped")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_success_delivered_once_on_main() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        json!({"errorCode": 0, "errorMsg": "", "data": {"id": 7, "username": "alice"}}),
        Duration::ZERO,
    )
    .await;

    let main = MainContext::start("dispatch-success").unwrap();
    let presenter = presenter(&server, &main);
    let (view, mut outcomes) = RecordingLogin::new(main.clone());
    presenter.attach_view(&view);

    assert!(presenter.login("alice", "pw").is_some());
    assert_eq!(next_outcome(&mut outcomes).await, Outcome::Success(7));

    sleep(Duration::from_millis(100)).await;
    main.flush().await;
    assert!(outcomes.try_recv().is_err());
    assert_eq!(view.shown.load(Ordering::SeqCst), 1);
    assert_eq!(view.hidden.load(Ordering::SeqCst), 1);
    assert!(!view.off_main.load(Ordering::SeqCst));
    assert_eq!(presenter.dispatcher().in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_business_error_delivers_backend_message() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        json!({"errorCode": -1, "errorMsg": "bad credentials", "data": null}),
        Duration::ZERO,
    )
    .await;

    let main = MainContext::start("dispatch-business").unwrap();
    let presenter = presenter(&server, &main);
    let (view, mut outcomes) = RecordingLogin::new(main.clone());
    presenter.attach_view(&view);

    presenter.login("alice", "wrong");
    assert_eq!(
        next_outcome(&mut outcomes).await,
        Outcome::Failure("bad credentials".to_string())
    );

    sleep(Duration::from_millis(100)).await;
    main.flush().await;
    assert!(outcomes.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_success_without_data_is_an_error() {
    let server = MockServer::start().await;
    mount_login(&server, json!({"errorCode": 0, "errorMsg": ""}), Duration::ZERO).await;

    let main = MainContext::start("dispatch-empty").unwrap();
    let presenter = presenter(&server, &main);
    let (view, mut outcomes) = RecordingLogin::new(main.clone());
    presenter.attach_view(&view);

    presenter.login("alice", "pw");
    assert_eq!(
        next_outcome(&mut outcomes).await,
        Outcome::Failure("No response data".to_string())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_detach_suppresses_every_pending_delivery() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        json!({"errorCode": 0, "data": {"id": 1}}),
        Duration::from_millis(300),
    )
    .await;

    let main = MainContext::start("dispatch-detach").unwrap();
    let presenter = presenter(&server, &main);
    let (view, mut outcomes) = RecordingLogin::new(main.clone());
    presenter.attach_view(&view);

    let pending: Vec<_> = (0..10)
        .filter_map(|_| presenter.login("alice", "pw"))
        .collect();
    assert_eq!(pending.len(), 10);

    presenter.detach_view();
    assert_eq!(presenter.dispatcher().in_flight(), 0);
    assert!(pending.iter().all(|disposable| disposable.is_disposed()));

    sleep(Duration::from_millis(600)).await;
    main.flush().await;
    assert!(outcomes.try_recv().is_err());
    assert_eq!(view.hidden.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_login_without_view_is_dropped() {
    let server = MockServer::start().await;
    mount_login(&server, json!({"errorCode": 0, "data": {"id": 1}}), Duration::ZERO).await;

    let main = MainContext::start("dispatch-no-view").unwrap();
    let presenter = presenter(&server, &main);

    assert!(presenter.login("alice", "pw").is_none());
    sleep(Duration::from_millis(100)).await;
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropped_view_receives_nothing() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        json!({"errorCode": 0, "data": {"id": 1}}),
        Duration::from_millis(200),
    )
    .await;

    let main = MainContext::start("dispatch-dropped").unwrap();
    let presenter = presenter(&server, &main);
    let (view, mut outcomes) = RecordingLogin::new(main.clone());
    presenter.attach_view(&view);
    presenter.login("alice", "pw");
    drop(view);

    sleep(Duration::from_millis(500)).await;
    main.flush().await;
    assert!(outcomes.try_recv().is_err());
}
