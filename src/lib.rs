pub mod core;
pub mod services;
pub mod utils;

pub use core::{
    config::{PipelineConfig, ServiceConfig},
    dispatch::{callback, ApiCallback, Disposable, Dispatcher, MainContext, TaskRunner},
    errors::{ApiError, HttpError},
    registry::{ApiGroup, ServiceRegistry},
    traits::{ConsumerView, Envelope},
    types::*,
};
pub use services::wan::{WanApi, WanService};
