use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use reservation_engine::cache::InMemoryAvailabilityCache;
use reservation_engine::config::Config;
use reservation_engine::coordinator::{Coordinator, CreateBookingInput, Services};
use reservation_engine::domain::{Role, Slot, SlotStatus, UserIdentity, VenueId};
use reservation_engine::events::{EventBus, Filter, InMemoryEventBus, Topic};
use reservation_engine::lock::InMemoryLockManager;
use reservation_engine::logger;
use reservation_engine::queue::InMemoryJobQueue;
use reservation_engine::storage::InMemoryStorage;

/// Demo bootstrap for the booking coordination core. Seeds one venue
/// with a single slot and a single user, then books it — exercising the
/// full Coordinator -> Lock Manager -> storage -> Cache -> Job Queue ->
/// Event Bus pipeline described in the system overview.
#[derive(Parser, Debug)]
#[command(name = "reservation-engine", about = "Booking coordination core demo")]
struct Cli {
    /// Number of guests to request on the demo booking.
    #[arg(long, default_value_t = 2)]
    guest_count: u32,
}

#[tokio::main]
async fn main() {
    logger::init();
    let cli = Cli::parse();

    let config = Arc::new(Config::from_env());
    log::info!("booting reservation engine demo with guest_count={}", cli.guest_count);

    let storage = Arc::new(InMemoryStorage::new());
    let event_bus = Arc::new(InMemoryEventBus::new(config.event_bus_subscriber_buffer));

    let services = Services {
        storage: storage.clone(),
        lock_manager: Arc::new(InMemoryLockManager::new()),
        cache: Arc::new(InMemoryAvailabilityCache::new()),
        queue: Arc::new(InMemoryJobQueue::new()),
        event_bus: event_bus.clone(),
        config: config.clone(),
    };
    let coordinator = Coordinator::new(services);
    coordinator.spawn_reclaim_job();

    let venue_id = VenueId::generate();
    let user = UserIdentity { user_id: reservation_engine::domain::UserId::generate(), role: Role::Member, is_active: true };
    storage.seed_user(user.clone()).await;

    let now = Utc::now();
    let slot = Slot {
        id: reservation_engine::domain::SlotId::generate(),
        venue_id,
        date: (now + chrono::Duration::hours(2)).date_naive(),
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
    };
    let slot_id = slot.id;
    storage.seed_slot(slot).await;

    let mut booking_updates = event_bus.subscribe(Topic::BookingUpdated, Filter::ByUser(user.user_id));

    let result = coordinator
        .create_booking(CreateBookingInput {
            user_id: user.user_id,
            slot_id,
            venue_id,
            guest_count: cli.guest_count,
            notes: None,
            deadline: None,
        })
        .await;

    match result {
        Ok(booking) => {
            log::info!("booking confirmed code={} guest_count={}", booking.confirmation_code, booking.guest_count);
            if let Some(update) = booking_updates.next().await {
                log::info!("received event bus update: {:?}", update);
            }
        }
        Err(e) => log::error!("booking failed code={} status={}: {}", e.code(), e.status_equivalent(), e),
    }
}
