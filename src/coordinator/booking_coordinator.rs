use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use super::services::Services;
use crate::cache::AvailabilityCache;
use crate::domain::booking::{generate_confirmation_code, BookingStatus};
use crate::domain::slot::SlotStatus;
use crate::domain::{Booking, BookingId, Role, Slot, SlotId, UserId, VenueId};
use crate::error::{CoreError, Result};
use crate::events::{BookingUpdate, Event, EventBus, SlotUpdate};
use crate::lock::{LeaseToken, LockManager};
use crate::queue::{JobHandler, JobOptions, JobQueue, RateLimit, Schedule};
use crate::storage::{Storage, Transaction};

/// RAII guard over an acquired slot lease. `release` is the normal,
/// logged release path run on every ordinary exit of
/// `create_booking_locked`. If the guard is instead dropped without
/// `release` ever running — the owning future was cancelled mid-flight by
/// `tokio::time::timeout` — the lease is released from a detached task
/// instead of being left to expire on its own TTL, per spec §5 ("on
/// expiry the transaction is rolled back and the distributed lock
/// released").
struct SlotLockGuard {
    lock_manager: Arc<dyn LockManager>,
    key: String,
    token: Option<LeaseToken>,
}

impl SlotLockGuard {
    fn new(lock_manager: Arc<dyn LockManager>, key: String, token: LeaseToken) -> Self {
        SlotLockGuard { lock_manager, key, token: Some(token) }
    }

    /// Consumes the guard, releasing the lease and logging the outcome.
    /// Takes the token out of the guard first, so the `Drop` impl below
    /// sees `None` and does nothing when this runs to completion.
    async fn release(mut self) {
        let token = self.token.take().expect("token is only cleared by release/drop, both of which consume the guard");
        match self.lock_manager.release(&self.key, &token).await {
            Ok(true) => {}
            Ok(false) => log::warn!("releasing slot lock found it already expired or stolen key={}", self.key),
            Err(e) => log::warn!("releasing slot lock errored key={}: {}", self.key, e),
        }
    }
}

impl Drop for SlotLockGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            let lock_manager = self.lock_manager.clone();
            let key = self.key.clone();
            tokio::spawn(async move {
                if let Err(e) = lock_manager.release(&key, &token).await {
                    log::warn!("releasing slot lock on cancellation errored key={}: {}", key, e);
                }
            });
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateBookingInput {
    pub user_id: UserId,
    pub slot_id: SlotId,
    pub venue_id: VenueId,
    pub guest_count: u32,
    pub notes: Option<String>,
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct CancelBookingInput {
    pub booking_id: BookingId,
    pub caller_user_id: UserId,
    pub caller_role: Role,
    pub reason: Option<String>,
    pub deadline: Option<Duration>,
}

/// The transactional state-transition engine. Every public method opens
/// its own storage transaction, runs post-commit side effects
/// best-effort, and never leaves a lock held or a transaction open on
/// return.
#[derive(Clone)]
pub struct Coordinator {
    services: Services,
}

impl Coordinator {
    pub fn new(services: Services) -> Self {
        Coordinator { services }
    }

    #[tracing::instrument(skip(self, input), fields(slot_id = %input.slot_id, guest_count = input.guest_count))]
    pub async fn create_booking(&self, input: CreateBookingInput) -> Result<Booking> {
        match input.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.create_booking_locked(input)).await.map_err(CoreError::from)?,
            None => self.create_booking_locked(input).await,
        }
    }

    async fn create_booking_locked(&self, input: CreateBookingInput) -> Result<Booking> {
        tracing::debug!(slot_id = %input.slot_id, "acquiring slot lock for create_booking");
        let lock_key = format!("booking:slot:{}", input.slot_id);
        let ttl = self.services.config.slot_lock_ttl;
        let token = self.services.lock_manager.acquire(&lock_key, ttl).await?.ok_or(CoreError::SlotLocked)?;
        let guard = SlotLockGuard::new(self.services.lock_manager.clone(), lock_key, token);

        let mut result = self.try_create_booking(&input).await;
        if matches!(result, Err(CoreError::SerializationConflict)) {
            log::warn!("serialization conflict creating booking, retrying once slot={:?}", input.slot_id);
            result = self.try_create_booking(&input).await;
            if matches!(result, Err(CoreError::SerializationConflict)) {
                log::warn!("serialization conflict persisted after retry slot={:?}", input.slot_id);
                result = Err(CoreError::SlotLocked);
            }
        }

        guard.release().await;
        result
    }

    async fn try_create_booking(&self, input: &CreateBookingInput) -> Result<Booking> {
        let mut tx = self.services.storage.begin().await?;

        let outcome = self.create_booking_tx(tx.as_mut(), input).await;
        match outcome {
            // `commit` is self-cleaning on failure (see `Transaction::commit`):
            // a `SerializationConflict` here has already left the slot row
            // untouched, so there is nothing for a `rollback` call to undo.
            Ok((booking, slot)) => match tx.commit().await {
                Ok(()) => {
                    self.after_create_booking(input, &booking, &slot).await;
                    Ok(booking)
                }
                Err(e) => Err(e),
            },
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn create_booking_tx(&self, tx: &mut dyn Transaction, input: &CreateBookingInput) -> Result<(Booking, Slot)> {
        let now = Utc::now();

        let user = tx.get_active_user(input.user_id).await?.filter(|u| u.is_active).ok_or(CoreError::UserNotFound)?;
        let _ = user;

        let confirmed_count = tx.count_confirmed_bookings(input.user_id).await?;
        if confirmed_count >= self.services.config.max_concurrent_bookings_per_user {
            return Err(CoreError::MaxBookingsReached);
        }

        let mut slot = tx.lock_slot_for_update(input.slot_id).await?.ok_or(CoreError::SlotNotFound)?;

        if slot.status == SlotStatus::Blocked {
            return Err(CoreError::SlotBlocked);
        }
        if slot.remaining_capacity < input.guest_count {
            return Err(CoreError::InsufficientCapacity);
        }
        if slot.end_time <= now {
            return Err(CoreError::SlotInPast);
        }
        let horizon = now + chrono::Duration::days(self.services.config.max_booking_advance_days);
        if slot.start_time > horizon {
            return Err(CoreError::AdvanceLimitExceeded);
        }
        if tx.find_confirmed_booking(input.user_id, input.slot_id).await?.is_some() {
            return Err(CoreError::DuplicateBooking);
        }

        let total_price = slot.unit_price.map(|price| price * Decimal::from(input.guest_count));

        let booking = Booking {
            id: BookingId::generate(),
            confirmation_code: generate_confirmation_code(),
            user_id: input.user_id,
            slot_id: input.slot_id,
            venue_id: input.venue_id,
            guest_count: input.guest_count,
            notes: input.notes.clone(),
            booking_date: slot.date,
            status: BookingStatus::Confirmed,
            total_price,
            confirmed_at: Some(now),
            cancelled_at: None,
            completed_at: None,
            cancellation_reason: None,
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        };
        tx.insert_booking(booking.clone()).await?;

        slot.debit(input.guest_count, now);
        tx.update_slot(slot.clone()).await?;

        Ok((booking, slot))
    }

    async fn after_create_booking(&self, input: &CreateBookingInput, booking: &Booking, slot: &Slot) {
        if let Err(e) = self.services.cache.invalidate(input.venue_id, slot.date).await {
            log::warn!("cache invalidate failed after create_booking booking={:?}: {}", booking.id, e);
        }

        let payload = serde_json::json!({
            "bookingId": booking.id,
            "userId": booking.user_id,
            "confirmationCode": booking.confirmation_code,
        });
        if let Err(e) = self.services.queue.enqueue("booking:confirmed", payload, JobOptions::default()).await {
            log::warn!("enqueue booking:confirmed failed booking={:?}: {}", booking.id, e);
        }

        self.services.event_bus.publish(Event::SlotUpdated(SlotUpdate {
            slot_id: slot.id,
            venue_id: slot.venue_id,
            status: slot.status,
            remaining_capacity: slot.remaining_capacity,
        }));
        self.services.event_bus.publish(Event::BookingUpdated(BookingUpdate {
            booking_id: booking.id,
            status: booking.status,
            confirmation_code: booking.confirmation_code.clone(),
            user_id: booking.user_id,
        }));
    }

    #[tracing::instrument(skip(self, input), fields(booking_id = %input.booking_id))]
    pub async fn cancel_booking(&self, input: CancelBookingInput) -> Result<Booking> {
        match input.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.cancel_booking_inner(input)).await.map_err(CoreError::from)?,
            None => self.cancel_booking_inner(input).await,
        }
    }

    async fn cancel_booking_inner(&self, input: CancelBookingInput) -> Result<Booking> {
        let mut tx = self.services.storage.begin().await?;
        let now = Utc::now();

        let outcome = self.cancel_booking_tx(tx.as_mut(), &input, now).await;
        match outcome {
            // see the matching comment in `try_create_booking`: `commit` is
            // self-cleaning on failure, so a failed commit here needs no
            // rollback to undo a partially-applied slot write.
            Ok((booking, slot)) => match tx.commit().await {
                Ok(()) => {
                    if let Err(e) = self.services.cache.invalidate(slot.venue_id, slot.date).await {
                        log::warn!("cache invalidate failed after cancel_booking booking={:?}: {}", booking.id, e);
                    }
                    let payload = serde_json::json!({"bookingId": booking.id, "userId": booking.user_id});
                    if let Err(e) = self.services.queue.enqueue("booking:cancelled", payload, JobOptions::default()).await {
                        log::warn!("enqueue booking:cancelled failed booking={:?}: {}", booking.id, e);
                    }
                    self.services.event_bus.publish(Event::SlotUpdated(SlotUpdate {
                        slot_id: slot.id,
                        venue_id: slot.venue_id,
                        status: slot.status,
                        remaining_capacity: slot.remaining_capacity,
                    }));
                    Ok(booking)
                }
                Err(e) => Err(e),
            },
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn cancel_booking_tx(&self, tx: &mut dyn Transaction, input: &CancelBookingInput, now: DateTime<Utc>) -> Result<(Booking, Slot)> {
        let mut booking = tx.get_booking(input.booking_id).await?.ok_or(CoreError::BookingNotFound)?;

        if booking.user_id != input.caller_user_id && input.caller_role != Role::Admin {
            return Err(CoreError::Unauthorized);
        }

        let mut slot = tx.lock_slot_for_update(booking.slot_id).await?.ok_or(CoreError::SlotNotFound)?;

        let window = chrono::Duration::hours(self.services.config.booking_cancellation_window_hours);
        if !booking.is_cancellable(slot.start_time, now, window) {
            return Err(CoreError::CancellationNotAllowed);
        }

        booking.cancel(input.reason.clone(), now);
        tx.update_booking(booking.clone()).await?;

        slot.credit(booking.guest_count, now);
        tx.update_slot(slot.clone()).await?;

        Ok((booking, slot))
    }

    pub async fn block_slot(&self, slot_id: SlotId, blocked_by: UserId, caller_role: Role, reason: Option<String>) -> Result<Slot> {
        if caller_role != Role::Admin {
            return Err(CoreError::Unauthorized);
        }

        let mut tx = self.services.storage.begin().await?;
        let now = Utc::now();

        let outcome = async {
            let mut slot = tx.lock_slot_for_update(slot_id).await?.ok_or(CoreError::SlotNotFound)?;
            if slot.status != SlotStatus::Blocked {
                slot.block(now);
                slot.metadata.insert("blockedBy".to_string(), serde_json::json!(blocked_by.to_string()));
                if let Some(reason) = &reason {
                    slot.metadata.insert("blockReason".to_string(), serde_json::json!(reason));
                }
                tx.update_slot(slot.clone()).await?;
            }
            Ok::<Slot, CoreError>(slot)
        }
        .await;

        self.finish_admin_slot_mutation(tx, outcome).await
    }

    pub async fn unblock_slot(&self, slot_id: SlotId, caller_role: Role) -> Result<Slot> {
        if caller_role != Role::Admin {
            return Err(CoreError::Unauthorized);
        }

        let mut tx = self.services.storage.begin().await?;
        let now = Utc::now();

        let outcome = async {
            let mut slot = tx.lock_slot_for_update(slot_id).await?.ok_or(CoreError::SlotNotFound)?;
            slot.unblock(now);
            slot.metadata.remove("blockedBy");
            slot.metadata.remove("blockReason");
            tx.update_slot(slot.clone()).await?;
            Ok::<Slot, CoreError>(slot)
        }
        .await;

        self.finish_admin_slot_mutation(tx, outcome).await
    }

    async fn finish_admin_slot_mutation(&self, mut tx: Box<dyn Transaction>, outcome: Result<Slot>) -> Result<Slot> {
        match outcome {
            // see the matching comment in `try_create_booking`: `commit` is
            // self-cleaning on failure, so a failed commit here needs no
            // rollback to undo a partially-applied slot write.
            Ok(slot) => match tx.commit().await {
                Ok(()) => {
                    if let Err(e) = self.services.cache.invalidate(slot.venue_id, slot.date).await {
                        log::warn!("cache invalidate failed after admin slot mutation slot={:?}: {}", slot.id, e);
                    }
                    self.services.event_bus.publish(Event::SlotUpdated(SlotUpdate {
                        slot_id: slot.id,
                        venue_id: slot.venue_id,
                        status: slot.status,
                        remaining_capacity: slot.remaining_capacity,
                    }));
                    Ok(slot)
                }
                Err(e) => Err(e),
            },
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    pub async fn get_available_slots(&self, venue_id: VenueId, date: NaiveDate) -> Result<Vec<Slot>> {
        if let Some(cached) = self.services.cache.get(venue_id, date).await? {
            return Ok(cached);
        }

        let mut tx = self.services.storage.begin().await?;
        let now = Utc::now();
        let slots = tx.list_available_slots(venue_id, date, now).await?;
        tx.commit().await?;

        self.services.cache.put(venue_id, date, slots.clone(), self.services.config.availability_cache_ttl).await?;
        Ok(slots)
    }

    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking> {
        let mut tx = self.services.storage.begin().await?;
        let booking = tx.get_booking(booking_id).await?;
        tx.commit().await?;
        booking.ok_or(CoreError::BookingNotFound)
    }

    pub async fn get_booking_by_confirmation_code(&self, code: &str) -> Result<Booking> {
        let mut tx = self.services.storage.begin().await?;
        let booking = tx.get_booking_by_confirmation_code(code).await?;
        tx.commit().await?;
        booking.ok_or(CoreError::BookingNotFound)
    }

    pub async fn list_user_bookings(&self, user_id: UserId) -> Result<Vec<Booking>> {
        let mut tx = self.services.storage.begin().await?;
        let bookings = tx.list_user_bookings(user_id).await?;
        tx.commit().await?;
        Ok(bookings)
    }

    /// Registers the worker for `slot:reclaim-expired-holds` and schedules
    /// its recurring trigger. Call once at bootstrap.
    pub fn spawn_reclaim_job(&self) {
        let coordinator = self.clone();
        let handler: JobHandler = Arc::new(move |_payload, _attempt| {
            let coordinator = coordinator.clone();
            Box::pin(async move { coordinator.reclaim_expired_holds().await.map_err(|e| e.to_string()) })
        });
        self.services.queue.register_worker(
            "slot:reclaim-expired-holds",
            handler,
            1,
            RateLimit { max: 1, window: Duration::from_secs(1) },
        );

        let schedule = Schedule::parse_cron("*/5 * * * *").expect("reclaim schedule pattern is a fixed constant");
        let queue = self.services.queue.clone();
        tokio::spawn(async move {
            let options = JobOptions { schedule: Some(schedule), ..Default::default() };
            if let Err(e) = queue.enqueue("slot:reclaim-expired-holds", serde_json::json!({}), options).await {
                log::error!("failed to schedule slot:reclaim-expired-holds: {}", e);
            }
        });
    }

    async fn reclaim_expired_holds(&self) -> Result<()> {
        let now = Utc::now();
        let candidates = self.services.storage.find_expired_holds(now).await?;
        for slot_id in candidates {
            if let Err(e) = self.reclaim_one(slot_id, now).await {
                log::warn!("failed to reclaim expired hold slot={:?}: {}", slot_id, e);
            }
        }
        Ok(())
    }

    async fn reclaim_one(&self, slot_id: SlotId, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.services.storage.begin().await?;

        let outcome = async {
            let mut slot = tx.lock_slot_for_update(slot_id).await?.ok_or(CoreError::SlotNotFound)?;
            if slot.status == SlotStatus::Held && slot.held_until.is_some_and(|t| t < now) {
                slot.expire_hold(now);
                tx.update_slot(slot.clone()).await?;
            }
            Ok::<Slot, CoreError>(slot)
        }
        .await;

        match outcome {
            Ok(slot) => match tx.commit().await {
                Ok(()) => {
                    if let Err(e) = self.services.cache.invalidate(slot.venue_id, slot.date).await {
                        log::warn!("cache invalidate failed after reclaim slot={:?}: {}", slot.id, e);
                    }
                    self.services.event_bus.publish(Event::SlotUpdated(SlotUpdate {
                        slot_id: slot.id,
                        venue_id: slot.venue_id,
                        status: slot.status,
                        remaining_capacity: slot.remaining_capacity,
                    }));
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }
}
