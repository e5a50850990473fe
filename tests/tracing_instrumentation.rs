//! The Coordinator's entry points are spanned with `#[tracing::instrument]`
//! (see DESIGN.md); this confirms the span and its fields actually reach
//! a subscriber rather than being dead attributes.

use std::sync::Arc;

use chrono::Utc;
use reservation_engine::cache::InMemoryAvailabilityCache;
use reservation_engine::config::Config;
use reservation_engine::coordinator::{Coordinator, CreateBookingInput, Services};
use reservation_engine::domain::{Role, Slot, SlotId, SlotStatus, UserId, UserIdentity, VenueId};
use reservation_engine::events::InMemoryEventBus;
use reservation_engine::lock::InMemoryLockManager;
use reservation_engine::queue::InMemoryJobQueue;
use reservation_engine::storage::InMemoryStorage;
use tracing_test::traced_test;

#[traced_test]
#[tokio::test]
async fn create_booking_emits_a_traced_span() {
    let storage = Arc::new(InMemoryStorage::new());
    let config = Arc::new(Config::default());
    let services = Services {
        storage: storage.clone(),
        lock_manager: Arc::new(InMemoryLockManager::new()),
        cache: Arc::new(InMemoryAvailabilityCache::new()),
        queue: Arc::new(InMemoryJobQueue::new()),
        event_bus: Arc::new(InMemoryEventBus::new(config.event_bus_subscriber_buffer)),
        config,
    };
    let coordinator = Coordinator::new(services);

    let now = Utc::now();
    let venue_id = VenueId::generate();
    let slot = Slot {
        id: SlotId::generate(),
        venue_id,
        date: now.date_naive(),
        start_time: now + chrono::Duration::hours(2),
        end_time: now + chrono::Duration::hours(3),
        capacity: 1,
        remaining_capacity: 1,
        status: SlotStatus::Available,
        unit_price: None,
        currency: None,
        held_until: None,
        metadata: Default::default(),
        created_at: now,
        updated_at: now,
    };
    let slot_id = slot.id;
    storage.seed_slot(slot).await;

    let user = UserIdentity { user_id: UserId::generate(), role: Role::Member, is_active: true };
    storage.seed_user(user.clone()).await;

    coordinator
        .create_booking(CreateBookingInput { user_id: user.user_id, slot_id, venue_id, guest_count: 1, notes: None, deadline: None })
        .await
        .expect("booking should succeed");

    assert!(logs_contain("acquiring slot lock for create_booking"));
}
