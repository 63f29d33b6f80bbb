//! Subscriptions module - webhook subscription records and local bookkeeping.

mod subscription_store;
mod subscriptions_model;

pub use subscription_store::SubscriptionStore;
pub use subscriptions_model::{parse_remote_time, EventType, Subscription};
