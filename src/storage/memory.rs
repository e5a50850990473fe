use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::traits::{Storage, Transaction};
use crate::domain::booking::BookingStatus;
use crate::domain::slot::SlotStatus;
use crate::domain::{Booking, BookingId, Slot, SlotId, UserId, UserIdentity, VenueId};
use crate::error::{CoreError, Result};

/// In-memory stand-in for the relational store the core assumes: row-level
/// exclusive locks are emulated with one `tokio::sync::Mutex` per slot
/// (held for the lifetime of a transaction, exactly like `SELECT ...
/// FOR UPDATE`), and a SERIALIZABLE write-skew abort is emulated on the
/// one cross-row predicate the core actually relies on — the per-user
/// concurrent-confirmed-booking count read in step 4 of `CreateBooking`,
/// which a transaction on a *different* slot can invalidate. A per-user
/// version counter, snapshotted at the read and re-checked at commit,
/// detects that race and returns `CoreError::SerializationConflict`
/// rather than silently admitting write skew.
pub struct InMemoryStorage {
    slots: Arc<RwLock<HashMap<SlotId, Arc<Mutex<Slot>>>>>,
    users: Arc<RwLock<HashMap<UserId, UserIdentity>>>,
    bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
    confirmation_codes: Arc<RwLock<HashMap<String, BookingId>>>,
    user_booking_versions: Arc<RwLock<HashMap<UserId, u64>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage {
            slots: Arc::new(RwLock::new(HashMap::new())),
            users: Arc::new(RwLock::new(HashMap::new())),
            bookings: Arc::new(RwLock::new(HashMap::new())),
            confirmation_codes: Arc::new(RwLock::new(HashMap::new())),
            user_booking_versions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Slot provisioning happens upstream of the core; this is the seam
    /// a bootstrap/demo/test uses to populate the store.
    pub async fn seed_slot(&self, slot: Slot) {
        self.slots.write().await.insert(slot.id, Arc::new(Mutex::new(slot)));
    }

    pub async fn seed_user(&self, user: UserIdentity) {
        self.users.write().await.insert(user.user_id, user);
    }

    pub async fn get_slot_snapshot(&self, slot_id: SlotId) -> Option<Slot> {
        let slots = self.slots.read().await;
        match slots.get(&slot_id) {
            Some(cell) => Some(cell.lock().await.clone()),
            None => None,
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(InMemoryTransaction {
            slots: self.slots.clone(),
            users: self.users.clone(),
            bookings: self.bookings.clone(),
            confirmation_codes: self.confirmation_codes.clone(),
            user_booking_versions: self.user_booking_versions.clone(),
            held_slot: None,
            pending_slot_write: None,
            pending_booking_inserts: Vec::new(),
            pending_booking_updates: Vec::new(),
            version_check: None,
            bump_users_on_commit: Vec::new(),
        }))
    }

    async fn find_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<SlotId>> {
        let slots = self.slots.read().await;
        let mut out = Vec::new();
        for (id, cell) in slots.iter() {
            let slot = cell.lock().await;
            if slot.status == SlotStatus::Held && slot.held_until.is_some_and(|t| t < now) {
                out.push(*id);
            }
        }
        Ok(out)
    }
}

struct InMemoryTransaction {
    slots: Arc<RwLock<HashMap<SlotId, Arc<Mutex<Slot>>>>>,
    users: Arc<RwLock<HashMap<UserId, UserIdentity>>>,
    bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
    confirmation_codes: Arc<RwLock<HashMap<String, BookingId>>>,
    user_booking_versions: Arc<RwLock<HashMap<UserId, u64>>>,

    /// The row lock taken by `lock_slot_for_update`. Held for the
    /// lifetime of the transaction exactly like `SELECT ... FOR UPDATE`,
    /// but never written through directly: `update_slot` only buffers its
    /// argument in `pending_slot_write` below, and `commit` applies it to
    /// the cell only after every check has passed. That means dropping
    /// this guard without ever applying the pending write — whether via
    /// `rollback`, a failed `commit`, or the transaction being dropped
    /// outright by a cancelled future — leaves the slot exactly as it was
    /// when this transaction began, with no separate restore step needed.
    held_slot: Option<(SlotId, OwnedMutexGuard<Slot>)>,
    pending_slot_write: Option<Slot>,
    pending_booking_inserts: Vec<Booking>,
    pending_booking_updates: Vec<Booking>,
    version_check: Option<(UserId, u64)>,
    bump_users_on_commit: Vec<UserId>,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn get_active_user(&mut self, user_id: UserId) -> Result<Option<UserIdentity>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn count_confirmed_bookings(&mut self, user_id: UserId) -> Result<u32> {
        let count = self
            .bookings
            .read()
            .await
            .values()
            .filter(|b| b.user_id == user_id && b.status == BookingStatus::Confirmed)
            .count() as u32;

        let version = *self.user_booking_versions.read().await.get(&user_id).unwrap_or(&0);
        self.version_check = Some((user_id, version));
        Ok(count)
    }

    async fn lock_slot_for_update(&mut self, slot_id: SlotId) -> Result<Option<Slot>> {
        let cell = match self.slots.read().await.get(&slot_id) {
            Some(cell) => cell.clone(),
            None => return Ok(None),
        };
        let guard = cell.lock_owned().await;
        let snapshot = guard.clone();
        self.held_slot = Some((slot_id, guard));
        Ok(Some(snapshot))
    }

    async fn find_confirmed_booking(&mut self, user_id: UserId, slot_id: SlotId) -> Result<Option<Booking>> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .find(|b| b.user_id == user_id && b.slot_id == slot_id && b.status == BookingStatus::Confirmed)
            .cloned())
    }

    async fn insert_booking(&mut self, booking: Booking) -> Result<()> {
        if booking.status == BookingStatus::Confirmed {
            self.bump_users_on_commit.push(booking.user_id);
        }
        self.pending_booking_inserts.push(booking);
        Ok(())
    }

    async fn update_slot(&mut self, slot: Slot) -> Result<()> {
        match &self.held_slot {
            Some((id, _guard)) if *id == slot.id => {
                self.pending_slot_write = Some(slot);
                Ok(())
            }
            _ => Err(CoreError::Internal("update_slot called without a held row lock for this slot".to_string())),
        }
    }

    async fn get_booking(&mut self, booking_id: BookingId) -> Result<Option<Booking>> {
        Ok(self.bookings.read().await.get(&booking_id).cloned())
    }

    async fn get_booking_by_confirmation_code(&mut self, code: &str) -> Result<Option<Booking>> {
        let codes = self.confirmation_codes.read().await;
        match codes.get(code) {
            Some(id) => Ok(self.bookings.read().await.get(id).cloned()),
            None => Ok(None),
        }
    }

    async fn list_user_bookings(&mut self, user_id: UserId) -> Result<Vec<Booking>> {
        Ok(self.bookings.read().await.values().filter(|b| b.user_id == user_id).cloned().collect())
    }

    async fn update_booking(&mut self, booking: Booking) -> Result<()> {
        if booking.status == BookingStatus::Cancelled {
            self.bump_users_on_commit.push(booking.user_id);
        }
        self.pending_booking_updates.push(booking);
        Ok(())
    }

    async fn list_available_slots(&mut self, venue_id: VenueId, date: NaiveDate, now: DateTime<Utc>) -> Result<Vec<Slot>> {
        let slots = self.slots.read().await;
        let mut out = Vec::new();
        for cell in slots.values() {
            let slot = cell.lock().await;
            if slot.venue_id == venue_id && slot.date == date && slot.matches_availability_filter(now) {
                out.push(slot.clone());
            }
        }
        out.sort_by_key(|s| s.start_time);
        Ok(out)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = *self;

        // Every check below must run — and pass — before the buffered slot
        // write (if any) is applied to the shared cell. An early `Err`
        // return here leaves `held_slot`'s guard untouched, so dropping
        // `this` at the end of this function releases the row lock with
        // the slot exactly as it was pre-transaction. Callers do not need
        // to (and must not) follow a failed `commit` with `rollback`.
        if let Some((user_id, seen_version)) = this.version_check {
            let current = *this.user_booking_versions.read().await.get(&user_id).unwrap_or(&0);
            if current != seen_version {
                log::warn!("serialization conflict detected for user={:?}", user_id);
                return Err(CoreError::SerializationConflict);
            }
        }

        {
            let mut bookings = this.bookings.write().await;
            let mut codes = this.confirmation_codes.write().await;

            for booking in &this.pending_booking_inserts {
                if codes.contains_key(&booking.confirmation_code) {
                    return Err(CoreError::Internal("confirmation code collision".to_string()));
                }
            }
            for booking in this.pending_booking_inserts {
                codes.insert(booking.confirmation_code.clone(), booking.id);
                bookings.insert(booking.id, booking);
            }
            for booking in this.pending_booking_updates {
                bookings.insert(booking.id, booking);
            }
        }

        // Every check has passed: now it is safe to make this
        // transaction's slot write visible, and only now.
        if let Some((_, mut guard)) = this.held_slot.take() {
            if let Some(new_slot) = this.pending_slot_write.take() {
                *guard = new_slot;
            }
            drop(guard); // releases the row lock now that the new value is visible
        }

        if !this.bump_users_on_commit.is_empty() {
            let mut versions = this.user_booking_versions.write().await;
            for user_id in this.bump_users_on_commit {
                *versions.entry(user_id).or_insert(0) += 1;
            }
        }

        let _ = this.users; // kept alive only for the lifetime of this transaction's reads
        let _ = this.slots;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // The slot row is only ever mutated inside `commit`, after every
        // check passes, so there is nothing to undo here: dropping `self`
        // (and with it `held_slot`'s guard) just releases the row lock,
        // leaving the slot exactly as it was when this transaction began.
        Ok(())
    }
}
