use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{Booking, BookingId, Slot, SlotId, UserId, UserIdentity, VenueId};
use crate::error::Result;

/// A relational store supporting row-level exclusive locks and
/// SERIALIZABLE transactions. `begin` is the only entry point — every
/// read the coordinator needs happens inside a transaction, one
/// connection per request.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Non-transactional discovery read used only by the
    /// `slot:reclaim-expired-holds` job to find candidates; the actual
    /// state transition for each candidate still happens inside its own
    /// row-locked transaction.
    async fn find_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<SlotId>>;
}

/// One logical transaction. Mirrors a `SELECT ... FOR UPDATE` + commit
/// cursor: `lock_slot_for_update` takes the row-level exclusive lock,
/// everything else is plain reads/writes scoped to it, and `commit`/
/// `rollback` consume the handle so it cannot be reused afterward — one
/// linear procedure passing one handle, not callbacks.
#[async_trait]
pub trait Transaction: Send {
    async fn get_active_user(&mut self, user_id: UserId) -> Result<Option<UserIdentity>>;

    /// Count of the user's confirmed bookings. Also snapshots the
    /// version used to detect a cross-slot write-skew conflict against
    /// this same predicate at commit time.
    async fn count_confirmed_bookings(&mut self, user_id: UserId) -> Result<u32>;

    async fn lock_slot_for_update(&mut self, slot_id: SlotId) -> Result<Option<Slot>>;

    async fn find_confirmed_booking(&mut self, user_id: UserId, slot_id: SlotId) -> Result<Option<Booking>>;

    async fn insert_booking(&mut self, booking: Booking) -> Result<()>;

    async fn update_slot(&mut self, slot: Slot) -> Result<()>;

    async fn get_booking(&mut self, booking_id: BookingId) -> Result<Option<Booking>>;

    async fn get_booking_by_confirmation_code(&mut self, code: &str) -> Result<Option<Booking>>;

    async fn list_user_bookings(&mut self, user_id: UserId) -> Result<Vec<Booking>>;

    async fn update_booking(&mut self, booking: Booking) -> Result<()>;

    async fn list_available_slots(&mut self, venue_id: VenueId, date: NaiveDate, now: DateTime<Utc>) -> Result<Vec<Slot>>;

    /// Commits the transaction. Returns `CoreError::SerializationConflict`
    /// if a concurrent transaction committed a change to a predicate this
    /// one read — callers retry once on this specific error.
    ///
    /// Self-cleaning: an `Err` return means none of this transaction's
    /// writes ever became visible to another reader, equivalent to the
    /// transaction never having run. Callers do not call `rollback` after
    /// a failed `commit` — an implementation must guarantee on its own
    /// that no partial effect (in particular a row-locked mutation) leaks
    /// out before every check inside `commit` has passed.
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
