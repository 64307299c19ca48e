use async_trait::async_trait;
use tracing::info;

use crate::model::ChangeEvent;

/// Consumer of the change events produced by a run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, source_hash: &str, event: &ChangeEvent);
}

/// Reports each event as one human-readable log line.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, source_hash: &str, event: &ChangeEvent) {
        info!(source_hash, kind = event.as_str(), "{}", describe(event));
    }
}

pub fn describe(event: &ChangeEvent) -> String {
    match event {
        ChangeEvent::NewItem { link, price, title } => {
            format!("NEW ITEM: {title} at {price} ({link})")
        }
        ChangeEvent::PriceChanged {
            link,
            old_price,
            new_price,
            title,
        } => format!("PRICE CHANGE: {title} {old_price} -> {new_price} ({link})"),
    }
}
