//! Outbound notification — channel seam, templates, and audit trail

pub mod channel;
pub mod dispatcher;

pub use channel::{ChannelError, HttpMessageChannel, MessageChannel};
pub use dispatcher::{normalize_phone, render_alert, DispatchOutcome, NotificationDispatcher};
