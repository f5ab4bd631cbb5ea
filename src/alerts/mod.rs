pub mod buffer;
pub mod channels;
pub mod dispatcher;

pub use buffer::NotificationBuffer;
pub use channels::{
    ConsolidatedToast, NotificationStore, PushNotification, PushNotifier, ToastAction, ToastItem,
    ToastPresenter,
};
pub use dispatcher::{ChannelDispatcher, DispatchReport, PushOutcome};
