use crate::core::dispatch::{ApiCallback, Disposable, Dispatcher};
use crate::core::errors::ApiError;
use crate::core::traits::ConsumerView;
use crate::services::wan::types::LoginResponse;
use crate::services::wan::WanService;
use std::sync::Arc;
use tracing::info;

pub const LOGIN_LOADING_MESSAGE: &str = "Logging in...";

/// Screen that hosts the login form
pub trait LoginView: ConsumerView {
    fn login_success(&self, user: &LoginResponse);

    fn login_failure(&self, message: &str);
}

struct LoginCallback;

impl<V: LoginView + ?Sized> ApiCallback<V, LoginResponse> for LoginCallback {
    fn on_success(&mut self, view: &V, user: LoginResponse) {
        info!(user_id = user.id, "login succeeded");
        view.login_success(&user);
    }

    fn on_error(&mut self, view: &V, error: ApiError) {
        view.login_failure(&error.to_string());
    }
}

/// Drives the login form through a [`Dispatcher`]
pub struct LoginPresenter<V: LoginView + ?Sized> {
    dispatcher: Dispatcher<V>,
    service: WanService,
}

impl<V: LoginView + ?Sized> LoginPresenter<V> {
    pub fn new(dispatcher: Dispatcher<V>, service: WanService) -> Self {
        Self {
            dispatcher,
            service,
        }
    }

    pub fn attach_view(&self, view: &Arc<V>) {
        self.dispatcher.attach(view);
    }

    pub fn detach_view(&self) {
        self.dispatcher.detach();
    }

    pub fn dispatcher(&self) -> &Dispatcher<V> {
        &self.dispatcher
    }

    /// Submit the credentials; `None` when no view is attached
    pub fn login(&self, username: &str, password: &str) -> Option<Disposable> {
        let service = self.service.clone();
        let username = username.to_string();
        let password = password.to_string();

        self.dispatcher.send_with_loading(
            async move { service.login(&username, &password).await },
            LOGIN_LOADING_MESSAGE,
            LoginCallback,
        )
    }
}
