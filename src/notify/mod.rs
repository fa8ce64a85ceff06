/// Real-time notification fan-out and persistent notification state
pub mod events;
pub mod store;

pub use events::{channel, ChannelEvent, ChannelPayload, EventLog, EventLogConfig};
pub use store::{Notification, NotificationStore};
