use crate::core::types::BaseResponse;

/// Contract every API envelope satisfies.
///
/// Implementors only say how their wire shape maps onto [`BaseResponse`];
/// unwrapping and error classification happen in the dispatcher.
pub trait Envelope: Send + 'static {
    type Data: Send + 'static;

    fn into_base(self) -> BaseResponse<Self::Data>;
}

impl<T: Send + 'static> Envelope for BaseResponse<T> {
    type Data = T;

    fn into_base(self) -> BaseResponse<T> {
        self
    }
}

/// A consumer the dispatcher can deliver to.
///
/// Loading hooks default to no-ops for consumers without a progress indicator.
pub trait ConsumerView: Send + Sync + 'static {
    fn show_loading(&self, _message: &str) {}

    fn hide_loading(&self) {}
}
