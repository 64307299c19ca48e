use chrono::{DateTime, Utc};

use crate::model::{ChangeEvent, NormalizedItem, SnapshotKey, SnapshotRecord};
use crate::snapshot::Snapshot;

/// Merge freshly extracted items for one source into the snapshot.
///
/// Unknown keys are inserted and reported as `NewItem`; known keys with a
/// different price get the new price and `now` and are reported as
/// `PriceChanged`. Equal prices leave the record untouched, so feeding the
/// same items twice produces no events the second time.
pub fn reconcile<'a, I>(
    snapshot: &mut Snapshot,
    source_hash: &str,
    items: I,
    now: DateTime<Utc>,
) -> Vec<ChangeEvent>
where
    I: IntoIterator<Item = &'a NormalizedItem>,
{
    let mut events = Vec::new();
    for item in items {
        let key = SnapshotKey::new(source_hash, item.link.as_str());
        match snapshot.get_mut(&key) {
            Some(record) if record.price != item.price => {
                events.push(ChangeEvent::PriceChanged {
                    link: item.link.clone(),
                    old_price: record.price,
                    new_price: item.price,
                    title: item.title.clone(),
                });
                record.price = item.price;
                record.updated_at = now;
            }
            Some(_) => {}
            None => {
                snapshot.upsert(SnapshotRecord {
                    source_hash: source_hash.to_string(),
                    item_id: item.link.clone(),
                    price: item.price,
                    updated_at: now,
                });
                events.push(ChangeEvent::NewItem {
                    link: item.link.clone(),
                    price: item.price,
                    title: item.title.clone(),
                });
            }
        }
    }
    events
}
