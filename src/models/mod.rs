pub mod subscription;
pub mod task;

pub use subscription::{Subscription, SubscriptionPatch};
pub use task::NotificationTask;
