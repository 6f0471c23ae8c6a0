pub mod broker;
pub mod delivery_filter;

pub use broker::NotificationBroker;
pub use delivery_filter::{DeliveryFilter, FilterVerdict};
