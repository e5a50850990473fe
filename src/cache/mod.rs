//! Short-TTL read-through cache of per-venue/per-date slot listings, with
//! explicit invalidation on any mutation that changes availability.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::domain::{Slot, VenueId};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    venue_id: VenueId,
    date: NaiveDate,
}

#[async_trait]
pub trait AvailabilityCache: Send + Sync {
    async fn get(&self, venue_id: VenueId, date: NaiveDate) -> Result<Option<Vec<Slot>>>;
    async fn put(&self, venue_id: VenueId, date: NaiveDate, snapshots: Vec<Slot>, ttl: Duration) -> Result<()>;
    async fn invalidate(&self, venue_id: VenueId, date: NaiveDate) -> Result<()>;
}

struct Entry {
    snapshots: Vec<Slot>,
    expires_at: Instant,
}

pub struct InMemoryAvailabilityCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
}

impl InMemoryAvailabilityCache {
    pub fn new() -> Self {
        InMemoryAvailabilityCache { entries: RwLock::new(HashMap::new()) }
    }
}

impl Default for InMemoryAvailabilityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AvailabilityCache for InMemoryAvailabilityCache {
    async fn get(&self, venue_id: VenueId, date: NaiveDate) -> Result<Option<Vec<Slot>>> {
        let key = CacheKey { venue_id, date };
        let entries = self.entries.read().expect("cache lock poisoned");
        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.snapshots.clone())),
            _ => Ok(None),
        }
    }

    async fn put(&self, venue_id: VenueId, date: NaiveDate, snapshots: Vec<Slot>, ttl: Duration) -> Result<()> {
        let key = CacheKey { venue_id, date };
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(key, Entry { snapshots, expires_at: Instant::now() + ttl });
        Ok(())
    }

    async fn invalidate(&self, venue_id: VenueId, date: NaiveDate) -> Result<()> {
        let key = CacheKey { venue_id, date };
        let mut entries = self.entries.write().expect("cache lock poisoned");
        if entries.remove(&key).is_some() {
            log::debug!("availability cache invalidated venue={:?} date={}", venue_id, date);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::SlotId;
    use crate::domain::SlotStatus;
    use chrono::Utc;

    fn sample_slot(venue_id: VenueId, date: NaiveDate) -> Slot {
        let now = Utc::now();
        Slot {
            id: SlotId::generate(),
            venue_id,
            date,
            start_time: now + chrono::Duration::hours(2),
            end_time: now + chrono::Duration::hours(3),
            capacity: 4,
            remaining_capacity: 4,
            status: SlotStatus::Available,
            unit_price: None,
            currency: None,
            held_until: None,
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn miss_then_put_then_hit() {
        let cache = InMemoryAvailabilityCache::new();
        let venue = VenueId::generate();
        let date = Utc::now().date_naive();

        assert!(cache.get(venue, date).await.unwrap().is_none());

        let slot = sample_slot(venue, date);
        cache.put(venue, date, vec![slot.clone()], Duration::from_secs(60)).await.unwrap();

        let hit = cache.get(venue, date).await.unwrap().unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].id, slot.id);
    }

    #[tokio::test]
    async fn invalidate_clears_the_entry() {
        let cache = InMemoryAvailabilityCache::new();
        let venue = VenueId::generate();
        let date = Utc::now().date_naive();

        cache.put(venue, date, vec![sample_slot(venue, date)], Duration::from_secs(60)).await.unwrap();
        cache.invalidate(venue, date).await.unwrap();
        assert!(cache.get(venue, date).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let cache = InMemoryAvailabilityCache::new();
        let venue = VenueId::generate();
        let date = Utc::now().date_naive();

        cache.put(venue, date, vec![sample_slot(venue, date)], Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(venue, date).await.unwrap().is_none());
    }
}
